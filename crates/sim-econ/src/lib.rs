#![deny(warnings)]

//! Settlement arithmetic for the energy market.
//!
//! Every monthly money flow in the simulation reduces to one of these
//! helpers: production cost from assigned producers, distributor profit,
//! contract pricing, the distributor's own monthly cost, and the penalty a
//! consumer owes after a missed payment. All results are integer currency
//! amounts; fractional intermediate values are floored exactly (integer or
//! `Decimal` arithmetic, never floats).

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;

/// Divisor applied to the summed producer energy cost.
const COST_RATIO: i64 = 10;

/// Errors produced by settlement helpers.
#[derive(Debug, Error, PartialEq)]
pub enum EconError {
    /// Contract pricing with active contracts needs at least one of them.
    #[error("contract price requested for zero active contracts")]
    NoActiveContracts,
    /// A cost overflowed the integer currency range.
    #[error("cost out of representable range")]
    OutOfRange,
}

/// Monthly production cost over the assigned producers:
/// floor(sum(energy_i * price_i) / 10).
///
/// Example:
/// assert_eq!(production_cost(&[(100, Decimal::ONE)]).unwrap(), 10);
pub fn production_cost(producers: &[(i64, Decimal)]) -> Result<i64, EconError> {
    let mut sum = Decimal::ZERO;
    for &(energy, price_kw) in producers {
        sum += price_kw * Decimal::from(energy);
    }
    (sum / Decimal::from(COST_RATIO))
        .floor()
        .to_i64()
        .ok_or(EconError::OutOfRange)
}

/// Distributor profit: floor(0.2 * production cost).
pub fn profit(production_cost: i64) -> i64 {
    production_cost / 5
}

/// Contract rate offered while the distributor has no active contracts.
pub fn contract_price_no_customers(
    infrastructure_cost: i64,
    production_cost: i64,
    profit: i64,
) -> i64 {
    infrastructure_cost + production_cost + profit
}

/// Contract rate offered with `active_contracts >= 1` active contracts:
/// floor(infrastructure / n) + production cost + profit.
pub fn contract_price(
    infrastructure_cost: i64,
    active_contracts: i64,
    production_cost: i64,
    profit: i64,
) -> Result<i64, EconError> {
    if active_contracts < 1 {
        return Err(EconError::NoActiveContracts);
    }
    Ok(infrastructure_cost / active_contracts + production_cost + profit)
}

/// What the distributor itself pays each month.
pub fn monthly_cost(infrastructure_cost: i64, production_cost: i64, active_contracts: i64) -> i64 {
    infrastructure_cost + production_cost * active_contracts
}

/// Amount due the month after a missed payment:
/// floor(1.2 * old bill) + new bill.
///
/// Example:
/// assert_eq!(penalty_payment(110, 112), 244);
pub fn penalty_payment(old_bill: i64, new_bill: i64) -> i64 {
    old_bill * 12 / 10 + new_bill
}
