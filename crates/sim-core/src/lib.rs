#![deny(warnings)]

//! Core domain models for the energy-market simulation.
//!
//! This crate defines the serializable scenario schema (what the JSON loader
//! produces), the mutable entity state the runtime drives month by month, and
//! validation helpers that guarantee basic invariants before a run starts.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;

/// Kinds of energy a producer can offer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EnergyType {
    Wind,
    Solar,
    Hydro,
    Coal,
    Nuclear,
}

impl EnergyType {
    /// Whether this energy type counts as renewable for the GREEN strategy.
    pub fn is_renewable(self) -> bool {
        matches!(self, EnergyType::Wind | EnergyType::Solar | EnergyType::Hydro)
    }
}

/// Producer-ranking policy a distributor uses to cover its energy need.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StrategyKind {
    Price,
    Green,
    Quantity,
}

/// Consumer record as it appears in the scenario file.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerRecord {
    pub id: u32,
    pub initial_budget: i64,
    pub monthly_income: i64,
}

/// Distributor record as it appears in the scenario file.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributorRecord {
    pub id: u32,
    /// Length offered on every contract this distributor issues.
    pub contract_length: i64,
    pub initial_budget: i64,
    pub initial_infrastructure_cost: i64,
    #[serde(rename = "energyNeededKW")]
    pub energy_needed_kw: i64,
    pub producer_strategy: StrategyKind,
}

/// Producer record as it appears in the scenario file.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerRecord {
    pub id: u32,
    pub energy_type: EnergyType,
    pub max_distributors: u32,
    #[serde(rename = "priceKW")]
    pub price_kw: Decimal,
    pub energy_per_distributor: i64,
}

/// Per-turn infrastructure-cost override for one distributor.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributorChange {
    pub id: u32,
    pub infrastructure_cost: i64,
}

/// Per-turn offered-energy override for one producer.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerChange {
    pub id: u32,
    pub energy_per_distributor: i64,
}

/// Updates applied before one simulated turn.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyUpdate {
    #[serde(default)]
    pub new_consumers: Vec<ConsumerRecord>,
    #[serde(default)]
    pub distributor_changes: Vec<DistributorChange>,
    #[serde(default)]
    pub producer_changes: Vec<ProducerChange>,
}

/// Entities present when the simulation starts.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialData {
    #[serde(default)]
    pub consumers: Vec<ConsumerRecord>,
    #[serde(default)]
    pub distributors: Vec<DistributorRecord>,
    #[serde(default)]
    pub producers: Vec<ProducerRecord>,
}

/// A full scenario: initial entities plus the scheduled updates per turn.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub number_of_turns: u32,
    pub initial_data: InitialData,
    #[serde(default)]
    pub monthly_updates: Vec<MonthlyUpdate>,
}

/// A fixed-rate, fixed-length agreement held by the issuing distributor.
///
/// `id` is a process-unique serial so a consumer renewing with the same
/// distributor is never confused with its still-listed lapsed contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contract {
    pub id: u64,
    pub consumer_id: u32,
    /// Locked at issuance; never tracks later rate changes.
    pub monthly_cost: i64,
    /// Counts down to 0, then to -1 on the round the distributor retires it.
    pub remaining_months: i64,
}

/// The consumer-side view of its active contract. Remaining months live on
/// the distributor's copy only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContractRef {
    pub contract_id: u64,
    pub distributor_id: u32,
    pub monthly_cost: i64,
}

/// Mutable consumer state.
#[derive(Clone, Debug)]
pub struct Consumer {
    pub id: u32,
    pub budget: i64,
    pub monthly_income: i64,
    pub bankrupt: bool,
    pub missed_payment: bool,
    pub contract: Option<ContractRef>,
    /// Cost and distributor of the last bill, for the penalty carry-over.
    pub previous_cost: i64,
    pub previous_distributor: Option<u32>,
}

impl Consumer {
    pub fn from_record(r: &ConsumerRecord) -> Self {
        Self {
            id: r.id,
            budget: r.initial_budget,
            monthly_income: r.monthly_income,
            bankrupt: false,
            missed_payment: false,
            contract: None,
            previous_cost: 0,
            previous_distributor: None,
        }
    }
}

/// Mutable distributor state.
#[derive(Clone, Debug)]
pub struct Distributor {
    pub id: u32,
    pub contract_length: i64,
    pub budget: i64,
    pub infrastructure_cost: i64,
    pub energy_needed_kw: i64,
    pub strategy: StrategyKind,
    /// Derived from the assigned producers; fixed between strategy runs.
    pub production_cost: i64,
    pub profit: i64,
    pub current_contract_rate: i64,
    pub bankrupt: bool,
    pub contracts: Vec<Contract>,
    /// Producers currently drawn from, in pick order.
    pub producers: Vec<u32>,
}

impl Distributor {
    pub fn from_record(r: &DistributorRecord) -> Self {
        Self {
            id: r.id,
            contract_length: r.contract_length,
            budget: r.initial_budget,
            infrastructure_cost: r.initial_infrastructure_cost,
            energy_needed_kw: r.energy_needed_kw,
            strategy: r.producer_strategy,
            production_cost: 0,
            profit: 0,
            current_contract_rate: 0,
            bankrupt: false,
            contracts: Vec::new(),
            producers: Vec::new(),
        }
    }

    /// Contracts with remaining months >= 0 (not yet fully lapsed).
    pub fn active_contract_count(&self) -> i64 {
        self.contracts
            .iter()
            .filter(|c| c.remaining_months >= 0)
            .count() as i64
    }

    pub fn find_contract(&self, contract_id: u64) -> Option<&Contract> {
        self.contracts.iter().find(|c| c.id == contract_id)
    }
}

/// Mutable producer state.
#[derive(Clone, Debug)]
pub struct Producer {
    pub id: u32,
    pub energy_type: EnergyType,
    pub max_distributors: u32,
    pub price_kw: Decimal,
    pub energy_per_distributor: i64,
    /// Current subscribers; doubles as the change-notification registry.
    pub subscribers: BTreeSet<u32>,
    /// Append-only snapshot per round; index 0 (the initial round) is
    /// reserved and omitted from the output.
    pub monthly_history: Vec<Vec<u32>>,
}

impl Producer {
    pub fn from_record(r: &ProducerRecord) -> Self {
        Self {
            id: r.id,
            energy_type: r.energy_type,
            max_distributors: r.max_distributors,
            price_kw: r.price_kw,
            energy_per_distributor: r.energy_per_distributor,
            subscribers: BTreeSet::new(),
            monthly_history: Vec::new(),
        }
    }

    pub fn has_capacity(&self) -> bool {
        self.subscribers.len() < self.max_distributors as usize
    }

    /// Record this round's subscriber set (already sorted, BTreeSet order).
    pub fn record_month(&mut self) {
        self.monthly_history
            .push(self.subscribers.iter().copied().collect());
    }
}

/// Final per-consumer result.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerOutput {
    pub id: u32,
    pub is_bankrupt: bool,
    pub budget: i64,
}

/// Final per-contract result, reported under the issuing distributor.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractOutput {
    pub consumer_id: u32,
    pub price: i64,
    pub remained_contract_months: i64,
}

/// Final per-distributor result.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributorOutput {
    pub id: u32,
    #[serde(rename = "energyNeededKW")]
    pub energy_needed_kw: i64,
    pub contract_cost: i64,
    pub budget: i64,
    pub producer_strategy: StrategyKind,
    pub is_bankrupt: bool,
    pub contracts: Vec<ContractOutput>,
}

/// One month of a producer's subscriber history.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerMonthlyStats {
    pub month: u32,
    pub distributors_ids: Vec<u32>,
}

/// Final per-producer result.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerOutput {
    pub id: u32,
    pub max_distributors: u32,
    #[serde(rename = "priceKW")]
    pub price_kw: Decimal,
    pub energy_type: EnergyType,
    pub energy_per_distributor: i64,
    pub monthly_stats: Vec<ProducerMonthlyStats>,
}

/// Full simulation result.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationOutput {
    pub consumers: Vec<ConsumerOutput>,
    pub distributors: Vec<DistributorOutput>,
    pub energy_producers: Vec<ProducerOutput>,
}

/// Validation errors for scenario invariants.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Budgets, incomes and costs must be non-negative.
    #[error("negative monetary value on {entity} {id}")]
    NegativeMoney { entity: &'static str, id: u32 },
    /// Offered/needed energy must be non-negative.
    #[error("negative energy value on {entity} {id}")]
    NegativeEnergy { entity: &'static str, id: u32 },
    /// Contracts must run for at least one month.
    #[error("distributor {0} has contract length < 1")]
    ContractLengthTooShort(u32),
    /// A producer must be able to serve at least one distributor.
    #[error("producer {0} has maxDistributors < 1")]
    NoDistributorSlots(u32),
    /// Ids must be unique within an entity class.
    #[error("duplicate {entity} id {id}")]
    DuplicateId { entity: &'static str, id: u32 },
    /// One update entry is required per declared turn.
    #[error("{got} monthly updates for {turns} turns")]
    MissingUpdates { turns: u32, got: usize },
}

/// Validate a consumer record.
pub fn validate_consumer_record(r: &ConsumerRecord) -> Result<(), ValidationError> {
    if r.initial_budget < 0 || r.monthly_income < 0 {
        return Err(ValidationError::NegativeMoney {
            entity: "consumer",
            id: r.id,
        });
    }
    Ok(())
}

/// Validate a distributor record.
pub fn validate_distributor_record(r: &DistributorRecord) -> Result<(), ValidationError> {
    if r.contract_length < 1 {
        return Err(ValidationError::ContractLengthTooShort(r.id));
    }
    if r.initial_budget < 0 || r.initial_infrastructure_cost < 0 {
        return Err(ValidationError::NegativeMoney {
            entity: "distributor",
            id: r.id,
        });
    }
    if r.energy_needed_kw < 0 {
        return Err(ValidationError::NegativeEnergy {
            entity: "distributor",
            id: r.id,
        });
    }
    Ok(())
}

/// Validate a producer record.
pub fn validate_producer_record(r: &ProducerRecord) -> Result<(), ValidationError> {
    if r.max_distributors < 1 {
        return Err(ValidationError::NoDistributorSlots(r.id));
    }
    if r.price_kw < Decimal::ZERO {
        return Err(ValidationError::NegativeMoney {
            entity: "producer",
            id: r.id,
        });
    }
    if r.energy_per_distributor < 0 {
        return Err(ValidationError::NegativeEnergy {
            entity: "producer",
            id: r.id,
        });
    }
    Ok(())
}

/// Validate a whole scenario, including id uniqueness and update coverage.
pub fn validate_scenario(s: &Scenario) -> Result<(), ValidationError> {
    if s.monthly_updates.len() < s.number_of_turns as usize {
        return Err(ValidationError::MissingUpdates {
            turns: s.number_of_turns,
            got: s.monthly_updates.len(),
        });
    }
    let mut seen: HashSet<u32> = HashSet::new();
    for r in &s.initial_data.consumers {
        validate_consumer_record(r)?;
        if !seen.insert(r.id) {
            return Err(ValidationError::DuplicateId {
                entity: "consumer",
                id: r.id,
            });
        }
    }
    seen.clear();
    for r in &s.initial_data.distributors {
        validate_distributor_record(r)?;
        if !seen.insert(r.id) {
            return Err(ValidationError::DuplicateId {
                entity: "distributor",
                id: r.id,
            });
        }
    }
    seen.clear();
    for r in &s.initial_data.producers {
        validate_producer_record(r)?;
        if !seen.insert(r.id) {
            return Err(ValidationError::DuplicateId {
                entity: "producer",
                id: r.id,
            });
        }
    }
    for update in &s.monthly_updates {
        for r in &update.new_consumers {
            validate_consumer_record(r)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn scenario_json() -> &'static str {
        r#"{
            "numberOfTurns": 1,
            "initialData": {
                "consumers": [{"id": 0, "initialBudget": 500, "monthlyIncome": 100}],
                "distributors": [{
                    "id": 0, "contractLength": 2, "initialBudget": 1000,
                    "initialInfrastructureCost": 100, "energyNeededKW": 50,
                    "producerStrategy": "PRICE"
                }],
                "producers": [{
                    "id": 0, "energyType": "WIND", "maxDistributors": 5,
                    "priceKW": 1.0, "energyPerDistributor": 100
                }]
            },
            "monthlyUpdates": [
                {
                    "newConsumers": [],
                    "distributorChanges": [{"id": 0, "infrastructureCost": 200}],
                    "producerChanges": [{"id": 0, "energyPerDistributor": 40}]
                }
            ]
        }"#
    }

    #[test]
    fn scenario_deserializes_wire_names() {
        let s: Scenario = serde_json::from_str(scenario_json()).unwrap();
        assert_eq!(s.number_of_turns, 1);
        assert_eq!(s.initial_data.distributors[0].energy_needed_kw, 50);
        assert_eq!(s.initial_data.distributors[0].producer_strategy, StrategyKind::Price);
        assert_eq!(s.initial_data.producers[0].energy_type, EnergyType::Wind);
        assert_eq!(s.monthly_updates[0].producer_changes[0].energy_per_distributor, 40);
        validate_scenario(&s).unwrap();
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let s: Scenario =
            serde_json::from_str(r#"{"numberOfTurns": 0, "initialData": {}}"#).unwrap();
        assert!(s.initial_data.consumers.is_empty());
        assert!(s.initial_data.distributors.is_empty());
        assert!(s.monthly_updates.is_empty());
        validate_scenario(&s).unwrap();
    }

    #[test]
    fn output_serializes_wire_names() {
        let out = DistributorOutput {
            id: 3,
            energy_needed_kw: 50,
            contract_cost: 112,
            budget: 1002,
            producer_strategy: StrategyKind::Green,
            is_bankrupt: false,
            contracts: vec![ContractOutput {
                consumer_id: 1,
                price: 112,
                remained_contract_months: 1,
            }],
        };
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["energyNeededKW"], 50);
        assert_eq!(json["producerStrategy"], "GREEN");
        assert_eq!(json["contracts"][0]["remainedContractMonths"], 1);
    }

    #[test]
    fn renewability_split() {
        assert!(EnergyType::Wind.is_renewable());
        assert!(EnergyType::Solar.is_renewable());
        assert!(EnergyType::Hydro.is_renewable());
        assert!(!EnergyType::Coal.is_renewable());
        assert!(!EnergyType::Nuclear.is_renewable());
    }

    #[test]
    fn duplicate_ids_rejected() {
        let mut s: Scenario = serde_json::from_str(scenario_json()).unwrap();
        let dup = s.initial_data.consumers[0].clone();
        s.initial_data.consumers.push(dup);
        assert_eq!(
            validate_scenario(&s),
            Err(ValidationError::DuplicateId {
                entity: "consumer",
                id: 0
            })
        );
    }

    #[test]
    fn update_coverage_enforced() {
        let mut s: Scenario = serde_json::from_str(scenario_json()).unwrap();
        s.number_of_turns = 5;
        assert_eq!(
            validate_scenario(&s),
            Err(ValidationError::MissingUpdates { turns: 5, got: 1 })
        );
    }

    #[test]
    fn active_contract_count_ignores_lapsed() {
        let mut d = Distributor::from_record(&DistributorRecord {
            id: 0,
            contract_length: 3,
            initial_budget: 100,
            initial_infrastructure_cost: 10,
            energy_needed_kw: 10,
            producer_strategy: StrategyKind::Price,
        });
        d.contracts.push(Contract {
            id: 1,
            consumer_id: 0,
            monthly_cost: 10,
            remaining_months: 2,
        });
        d.contracts.push(Contract {
            id: 2,
            consumer_id: 1,
            monthly_cost: 10,
            remaining_months: 0,
        });
        d.contracts.push(Contract {
            id: 3,
            consumer_id: 2,
            monthly_cost: 10,
            remaining_months: -1,
        });
        assert_eq!(d.active_contract_count(), 2);
    }

    proptest! {
        #[test]
        fn non_negative_consumer_records_validate(budget in 0i64..1_000_000,
                                                  income in 0i64..1_000_000) {
            let r = ConsumerRecord { id: 1, initial_budget: budget, monthly_income: income };
            prop_assert!(validate_consumer_record(&r).is_ok());
        }

        #[test]
        fn negative_budget_rejected(budget in -1_000_000i64..0) {
            let r = ConsumerRecord { id: 1, initial_budget: budget, monthly_income: 0 };
            prop_assert!(validate_consumer_record(&r).is_err());
        }
    }
}
