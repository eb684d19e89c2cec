#![deny(warnings)]

//! Producer selection for distributors.
//!
//! Each distributor covers its energy need by greedily taking producers in
//! the order its policy ranks them. The three policies are total orders over
//! producers (every tie-break chain ends in ascending id), so selection is
//! deterministic and, absent producer changes, idempotent. The greedy walk
//! stops as soon as the remaining need is no longer strictly positive;
//! a distributor whose need cannot be met keeps whatever was picked.

use rust_decimal::Decimal;
use sim_core::StrategyKind;
use std::cmp::Ordering;

/// A producer as seen by the selection pass. The caller only offers
/// producers that still have spare distributor slots.
#[derive(Clone, Copy, Debug)]
pub struct Candidate {
    pub id: u32,
    pub price_kw: Decimal,
    pub energy_per_distributor: i64,
    pub renewable: bool,
}

/// Policy ranking between two candidates.
fn compare(kind: StrategyKind, a: &Candidate, b: &Candidate) -> Ordering {
    match kind {
        // Cheapest first, largest offer first among equals.
        StrategyKind::Price => a
            .price_kw
            .cmp(&b.price_kw)
            .then(b.energy_per_distributor.cmp(&a.energy_per_distributor))
            .then(a.id.cmp(&b.id)),
        // Renewable first, then as PRICE.
        StrategyKind::Green => b
            .renewable
            .cmp(&a.renewable)
            .then(a.price_kw.cmp(&b.price_kw))
            .then(b.energy_per_distributor.cmp(&a.energy_per_distributor))
            .then(a.id.cmp(&b.id)),
        // Largest offer first.
        StrategyKind::Quantity => b
            .energy_per_distributor
            .cmp(&a.energy_per_distributor)
            .then(a.id.cmp(&b.id)),
    }
}

/// Greedily pick producers until `energy_needed` is covered or the
/// candidates run out. Returns producer ids in pick order.
pub fn pick_producers(
    kind: StrategyKind,
    energy_needed: i64,
    candidates: &[Candidate],
) -> Vec<u32> {
    let mut ranked: Vec<Candidate> = candidates.to_vec();
    ranked.sort_by(|a, b| compare(kind, a, b));

    let mut picked = Vec::new();
    let mut needed = energy_needed;
    for c in &ranked {
        if needed <= 0 {
            break;
        }
        needed -= c.energy_per_distributor;
        picked.push(c.id);
    }
    picked
}
