#![deny(warnings)]

//! Monthly round driver for the energy market.
//!
//! [`Simulation`] owns all entity state for one run (no global lookup) and
//! replays the scenario: an initial round, then one round per declared turn
//! with the turn's scheduled updates applied at fixed points. The ordering
//! inside a round is load-bearing: consumers and distributors settle against
//! production costs fixed at the start of the round, and producer changes
//! (with the resulting re-selection) only take effect from the next round.

use sim_core::{
    Consumer, ConsumerOutput, Contract, ContractOutput, ContractRef, Distributor,
    DistributorOutput, MonthlyUpdate, Producer, ProducerMonthlyStats, ProducerOutput, Scenario,
    SimulationOutput,
};
use sim_strategy::Candidate;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Full state of one simulation run. Entity maps are keyed by id, so every
/// order-sensitive sweep over them runs in ascending-id order.
#[derive(Clone, Debug)]
pub struct Simulation {
    number_of_turns: u32,
    updates: Vec<MonthlyUpdate>,
    consumers: BTreeMap<u32, Consumer>,
    distributors: BTreeMap<u32, Distributor>,
    producers: BTreeMap<u32, Producer>,
    next_contract_id: u64,
}

impl Simulation {
    /// Build the entity maps from a scenario. The scenario should already
    /// have passed `sim_core::validate_scenario`.
    pub fn new(scenario: Scenario) -> Self {
        if scenario.initial_data.consumers.is_empty() {
            warn!("scenario has no initial consumers");
        }
        if scenario.initial_data.distributors.is_empty() {
            warn!("scenario has no distributors; nothing will run");
        }
        let consumers = scenario
            .initial_data
            .consumers
            .iter()
            .map(|r| (r.id, Consumer::from_record(r)))
            .collect();
        let distributors = scenario
            .initial_data
            .distributors
            .iter()
            .map(|r| (r.id, Distributor::from_record(r)))
            .collect();
        let producers = scenario
            .initial_data
            .producers
            .iter()
            .map(|r| (r.id, Producer::from_record(r)))
            .collect();
        Self {
            number_of_turns: scenario.number_of_turns,
            updates: scenario.monthly_updates,
            consumers,
            distributors,
            producers,
            next_contract_id: 0,
        }
    }

    /// Run the whole game: initial round plus `number_of_turns` update
    /// rounds, stopping early once every distributor is bankrupt.
    pub fn run(&mut self) {
        info!(
            consumers = self.consumers.len(),
            distributors = self.distributors.len(),
            producers = self.producers.len(),
            turns = self.number_of_turns,
            "starting simulation"
        );
        // Vacuously true for a scenario with no distributors.
        if self.all_distributors_bankrupt() {
            debug!("no solvent distributors; skipping all rounds");
            return;
        }

        // Initial round: id order matters here because producers have
        // limited capacity, so earlier distributors get first pick.
        let distributor_ids: Vec<u32> = self.distributors.keys().copied().collect();
        for &id in &distributor_ids {
            self.apply_strategy(id);
            self.compute_production_cost(id);
        }
        self.compute_contract_rates();
        self.consumer_phase();
        self.distributor_phase();
        self.producer_phase();

        for turn in 0..self.number_of_turns as usize {
            if self.all_distributors_bankrupt() {
                debug!(turn, "all distributors bankrupt; stopping early");
                break;
            }
            self.apply_entity_updates(turn);
            self.compute_contract_rates();
            self.consumer_phase();
            self.distributor_phase();
            // Producer changes land after settlement; re-selection is
            // deferred and drained once, in id order, so a distributor never
            // reacts to a half-applied batch.
            let pending = self.apply_producer_changes(turn);
            for id in pending {
                if self.distributors.get(&id).is_some_and(|d| !d.bankrupt) {
                    self.apply_strategy(id);
                    self.compute_production_cost(id);
                }
            }
            self.producer_phase();
        }
    }

    /// Final state in the output schema.
    pub fn snapshot(&self) -> SimulationOutput {
        let consumers = self
            .consumers
            .values()
            .map(|c| ConsumerOutput {
                id: c.id,
                is_bankrupt: c.bankrupt,
                budget: c.budget,
            })
            .collect();
        let distributors = self
            .distributors
            .values()
            .map(|d| DistributorOutput {
                id: d.id,
                energy_needed_kw: d.energy_needed_kw,
                contract_cost: d.current_contract_rate,
                budget: d.budget,
                producer_strategy: d.strategy,
                is_bankrupt: d.bankrupt,
                contracts: d
                    .contracts
                    .iter()
                    .map(|c| ContractOutput {
                        consumer_id: c.consumer_id,
                        price: c.monthly_cost,
                        remained_contract_months: c.remaining_months,
                    })
                    .collect(),
            })
            .collect();
        let energy_producers = self
            .producers
            .values()
            .map(|p| ProducerOutput {
                id: p.id,
                max_distributors: p.max_distributors,
                price_kw: p.price_kw,
                energy_type: p.energy_type,
                energy_per_distributor: p.energy_per_distributor,
                // Index 0 is the initial round and is not reported.
                monthly_stats: p
                    .monthly_history
                    .iter()
                    .enumerate()
                    .skip(1)
                    .map(|(month, ids)| ProducerMonthlyStats {
                        month: month as u32,
                        distributors_ids: ids.clone(),
                    })
                    .collect(),
            })
            .collect();
        SimulationOutput {
            consumers,
            distributors,
            energy_producers,
        }
    }

    fn all_distributors_bankrupt(&self) -> bool {
        self.distributors.values().all(|d| d.bankrupt)
    }

    /// Detach from all current producers and rebuild the association from
    /// scratch with the distributor's ranking policy.
    fn apply_strategy(&mut self, distributor_id: u32) {
        let Some(d) = self.distributors.get_mut(&distributor_id) else {
            return;
        };
        for pid in d.producers.drain(..) {
            if let Some(p) = self.producers.get_mut(&pid) {
                p.subscribers.remove(&distributor_id);
            }
        }
        let candidates: Vec<Candidate> = self
            .producers
            .values()
            .filter(|p| p.has_capacity())
            .map(|p| Candidate {
                id: p.id,
                price_kw: p.price_kw,
                energy_per_distributor: p.energy_per_distributor,
                renewable: p.energy_type.is_renewable(),
            })
            .collect();
        let picked = sim_strategy::pick_producers(d.strategy, d.energy_needed_kw, &candidates);
        for pid in picked {
            if let Some(p) = self.producers.get_mut(&pid) {
                p.subscribers.insert(distributor_id);
            }
            d.producers.push(pid);
        }
    }

    fn compute_production_cost(&mut self, distributor_id: u32) {
        let Some(d) = self.distributors.get_mut(&distributor_id) else {
            return;
        };
        let inputs: Vec<_> = d
            .producers
            .iter()
            .filter_map(|pid| self.producers.get(pid))
            .map(|p| (p.energy_per_distributor, p.price_kw))
            .collect();
        match sim_econ::production_cost(&inputs) {
            Ok(cost) => {
                d.production_cost = cost;
                d.profit = sim_econ::profit(cost);
            }
            Err(err) => {
                warn!(distributor = distributor_id, %err, "production cost not updated");
            }
        }
    }

    /// Rate offered this round, a pure function of the current cost fields.
    fn compute_contract_rates(&mut self) {
        for d in self.distributors.values_mut() {
            if d.bankrupt {
                continue;
            }
            let active = d.active_contract_count();
            d.current_contract_rate = if active == 0 {
                sim_econ::contract_price_no_customers(
                    d.infrastructure_cost,
                    d.production_cost,
                    d.profit,
                )
            } else {
                sim_econ::contract_price(
                    d.infrastructure_cost,
                    active,
                    d.production_cost,
                    d.profit,
                )
                .unwrap_or_else(|_| {
                    sim_econ::contract_price_no_customers(
                        d.infrastructure_cost,
                        d.production_cost,
                        d.profit,
                    )
                })
            };
        }
    }

    fn consumer_phase(&mut self) {
        let ids: Vec<u32> = self.consumers.keys().copied().collect();
        for id in ids {
            self.process_consumer_month(id);
        }
    }

    fn process_consumer_month(&mut self, consumer_id: u32) {
        {
            let Some(c) = self.consumers.get_mut(&consumer_id) else {
                return;
            };
            if c.bankrupt {
                return;
            }
            c.budget += c.monthly_income;
        }

        let (needs_new, forgive) = {
            let c = &self.consumers[&consumer_id];
            match c.contract {
                None => (true, false),
                Some(r) => match self.distributors.get(&r.distributor_id) {
                    // Switching away from a dead distributor forgives the
                    // pending penalty; it can no longer be paid.
                    None => (true, true),
                    Some(d) if d.bankrupt => (true, true),
                    Some(d) => match d.find_contract(r.contract_id) {
                        Some(held) if held.remaining_months > 0 => (false, false),
                        _ => (true, false),
                    },
                },
            }
        };
        if forgive {
            if let Some(c) = self.consumers.get_mut(&consumer_id) {
                if c.missed_payment {
                    c.missed_payment = false;
                    debug!(consumer = consumer_id, "penalty forgiven, distributor bankrupt");
                }
            }
        }
        if needs_new {
            self.sign_cheapest_contract(consumer_id);
        }

        let (current, missed, previous_cost, previous_distributor, budget) = {
            let c = &self.consumers[&consumer_id];
            let Some(r) = c.contract else {
                // Nobody left to contract with; the all-bankrupt check ends
                // the run at the next turn boundary.
                return;
            };
            (
                r,
                c.missed_payment,
                c.previous_cost,
                c.previous_distributor,
                c.budget,
            )
        };

        if missed {
            let due = sim_econ::penalty_payment(previous_cost, current.monthly_cost);
            if due > budget {
                if let Some(c) = self.consumers.get_mut(&consumer_id) {
                    c.bankrupt = true;
                }
                debug!(consumer = consumer_id, due, budget, "bankrupt on penalty");
            } else {
                if let Some(c) = self.consumers.get_mut(&consumer_id) {
                    c.budget -= due;
                    c.missed_payment = false;
                }
                let penalty_part = due - current.monthly_cost;
                match previous_distributor {
                    Some(prev) if prev != current.distributor_id => {
                        self.credit_distributor(prev, penalty_part);
                        self.credit_distributor(current.distributor_id, current.monthly_cost);
                    }
                    _ => self.credit_distributor(current.distributor_id, due),
                }
            }
        } else if current.monthly_cost <= budget {
            if let Some(c) = self.consumers.get_mut(&consumer_id) {
                c.budget -= current.monthly_cost;
            }
            self.credit_distributor(current.distributor_id, current.monthly_cost);
        } else {
            if let Some(c) = self.consumers.get_mut(&consumer_id) {
                c.missed_payment = true;
            }
            debug!(consumer = consumer_id, "missed payment");
        }

        if let Some(c) = self.consumers.get_mut(&consumer_id) {
            c.previous_cost = current.monthly_cost;
            c.previous_distributor = Some(current.distributor_id);
        }
    }

    /// Sign with the cheapest solvent distributor; first minimum in id order
    /// wins ties.
    fn sign_cheapest_contract(&mut self, consumer_id: u32) {
        let mut best: Option<(i64, u32)> = None;
        for d in self.distributors.values() {
            if d.bankrupt {
                continue;
            }
            let better = match best {
                None => true,
                Some((rate, _)) => d.current_contract_rate < rate,
            };
            if better {
                best = Some((d.current_contract_rate, d.id));
            }
        }
        let Some((_, distributor_id)) = best else {
            if let Some(c) = self.consumers.get_mut(&consumer_id) {
                c.contract = None;
            }
            debug!(consumer = consumer_id, "no solvent distributor available");
            return;
        };
        let contract_id = self.next_contract_id;
        self.next_contract_id += 1;
        let Some(d) = self.distributors.get_mut(&distributor_id) else {
            return;
        };
        let rate = d.current_contract_rate;
        d.contracts.push(Contract {
            id: contract_id,
            consumer_id,
            monthly_cost: rate,
            remaining_months: d.contract_length,
        });
        if let Some(c) = self.consumers.get_mut(&consumer_id) {
            c.contract = Some(ContractRef {
                contract_id,
                distributor_id,
                monthly_cost: rate,
            });
        }
    }

    fn credit_distributor(&mut self, distributor_id: u32, amount: i64) {
        match self.distributors.get_mut(&distributor_id) {
            Some(d) if !d.bankrupt => d.budget += amount,
            _ => debug!(distributor = distributor_id, amount, "payment dropped"),
        }
    }

    fn distributor_phase(&mut self) {
        let ids: Vec<u32> = self.distributors.keys().copied().collect();
        for id in ids {
            self.process_distributor_month(id);
        }
    }

    fn process_distributor_month(&mut self, distributor_id: u32) {
        let Some(d) = self.distributors.get_mut(&distributor_id) else {
            return;
        };
        if d.bankrupt {
            return;
        }
        for c in &mut d.contracts {
            c.remaining_months -= 1;
        }
        let active = d.active_contract_count();
        d.budget -= sim_econ::monthly_cost(d.infrastructure_cost, d.production_cost, active);
        // Fully lapsed contracts are kept through remaining == 0 so the
        // terminal month is still reported, then dropped at -1.
        let consumers = &self.consumers;
        d.contracts.retain(|c| {
            c.remaining_months >= 0
                && consumers.get(&c.consumer_id).is_some_and(|x| !x.bankrupt)
        });
        if d.budget < 0 {
            d.bankrupt = true;
            d.contracts.clear();
            for pid in d.producers.drain(..) {
                if let Some(p) = self.producers.get_mut(&pid) {
                    p.subscribers.remove(&distributor_id);
                }
            }
            debug!(distributor = distributor_id, budget = d.budget, "bankrupt");
        }
    }

    fn producer_phase(&mut self) {
        for p in self.producers.values_mut() {
            p.record_month();
        }
    }

    /// New consumers and infrastructure-cost overrides for this turn.
    fn apply_entity_updates(&mut self, turn: usize) {
        let Some(update) = self.updates.get(turn).cloned() else {
            warn!(turn, "no update entry for this turn");
            return;
        };
        for record in &update.new_consumers {
            if self
                .consumers
                .insert(record.id, Consumer::from_record(record))
                .is_some()
            {
                warn!(consumer = record.id, "new consumer replaces existing id");
            }
        }
        for change in &update.distributor_changes {
            match self.distributors.get_mut(&change.id) {
                Some(d) if !d.bankrupt => d.infrastructure_cost = change.infrastructure_cost,
                Some(_) => debug!(distributor = change.id, "cost change for bankrupt distributor"),
                None => warn!(distributor = change.id, "cost change for unknown distributor"),
            }
        }
    }

    /// Offered-energy overrides; returns the distributors to re-select,
    /// collected from each changed producer's subscriber set.
    fn apply_producer_changes(&mut self, turn: usize) -> BTreeSet<u32> {
        let mut pending = BTreeSet::new();
        let Some(update) = self.updates.get(turn).cloned() else {
            return pending;
        };
        for change in &update.producer_changes {
            match self.producers.get_mut(&change.id) {
                Some(p) => {
                    p.energy_per_distributor = change.energy_per_distributor;
                    pending.extend(p.subscribers.iter().copied());
                }
                None => warn!(producer = change.id, "change for unknown producer"),
            }
        }
        pending
    }
}
