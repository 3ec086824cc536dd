//! Roster Validation
//!
//! Two independent, side-effect free checks that every roster mutation must pass:
//! - **Formation**: role cardinality windows plus an exact main-slot count.
//! - **Budget**: catalog-priced total of the main slots against the ceiling.
//!
//! `RosterValidator` bundles both with a bounded formation cache keyed by the
//! multiset of role ids. The cache only memoizes; a cached report is identical
//! to a freshly computed one.

use super::catalog::PriceCatalog;
use super::types::{round_cents, EntityId, Role, RosterSlot};
use crate::config::RosterRules;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormationReport {
    pub valid: bool,
    /// Every violated rule, in rule order.
    pub issues: Vec<String>,
    /// Slot count per raw role id.
    pub role_counts: BTreeMap<u8, usize>,
}

impl FormationReport {
    pub fn error_message(&self) -> Option<String> {
        if self.issues.is_empty() {
            None
        } else {
            Some(format!("Formation invalid: {}", self.issues.join("; ")))
        }
    }

    pub fn count(&self, role: Role) -> usize {
        self.role_counts.get(&role.id()).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityCost {
    pub entity_id: EntityId,
    pub cost: f64,
    pub listed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BudgetReport {
    pub valid: bool,
    pub error: Option<String>,
    pub total_cost: f64,
    /// `ceiling - total_cost`, floored at zero.
    pub remaining_budget: f64,
    pub ceiling: f64,
    pub entity_costs: Vec<EntityCost>,
}

pub fn validate_formation(slots: &[RosterSlot], rules: &RosterRules) -> FormationReport {
    let mut role_counts: BTreeMap<u8, usize> = BTreeMap::new();
    for slot in slots {
        *role_counts.entry(slot.role_id).or_insert(0) += 1;
    }

    let mut issues = Vec::new();

    if slots.len() != rules.main_size {
        issues.push(format!(
            "Team must have exactly {} players, found {}",
            rules.main_size,
            slots.len()
        ));
    }

    for window in &rules.windows {
        let count = role_counts.get(&window.role.id()).copied().unwrap_or(0);
        let name = window.role.name();

        if count < window.min {
            issues.push(format!(
                "Not enough {}s: minimum {}, found {}",
                name, window.min, count
            ));
        }
        if count > window.max {
            issues.push(format!(
                "Too many {}s: maximum {}, found {}",
                name, window.max, count
            ));
        }
    }

    for (role_id, count) in &role_counts {
        if Role::from_id(*role_id).is_none() {
            issues.push(format!("Unknown role id {} on {} slot(s)", role_id, count));
        }
    }

    FormationReport {
        valid: issues.is_empty(),
        issues,
        role_counts,
    }
}

pub fn validate_budget(
    slots: &[RosterSlot],
    catalog: &PriceCatalog,
    rules: &RosterRules,
) -> BudgetReport {
    let entity_costs: Vec<EntityCost> = slots
        .iter()
        .map(|slot| {
            let (cost, listed) = catalog.lookup(slot.entity_id);
            EntityCost {
                entity_id: slot.entity_id,
                cost,
                listed,
            }
        })
        .collect();

    let total_cost = round_cents(entity_costs.iter().map(|entry| entry.cost).sum());
    let ceiling = rules.budget_ceiling;
    let valid = total_cost <= ceiling;

    BudgetReport {
        valid,
        error: (!valid).then(|| {
            format!(
                "Team cost {:.1} exceeds budget limit {:.1}",
                total_cost, ceiling
            )
        }),
        total_cost,
        remaining_budget: round_cents((ceiling - total_cost).max(0.0)),
        ceiling,
        entity_costs,
    }
}

/// Bounded memo of formation reports, evicting the oldest entry on overflow.
pub struct FormationCache {
    capacity: usize,
    state: Mutex<CacheState>,
}

#[derive(Default)]
struct CacheState {
    reports: HashMap<Vec<u8>, FormationReport>,
    order: VecDeque<Vec<u8>>,
    hits: u64,
    misses: u64,
}

impl FormationCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn validate(&self, slots: &[RosterSlot], rules: &RosterRules) -> FormationReport {
        if self.capacity == 0 {
            return validate_formation(slots, rules);
        }

        let mut key: Vec<u8> = slots.iter().map(|slot| slot.role_id).collect();
        key.sort_unstable();

        if let Ok(mut state) = self.state.lock() {
            if let Some(report) = state.reports.get(&key).cloned() {
                state.hits += 1;
                return report;
            }
            state.misses += 1;
        }

        let report = validate_formation(slots, rules);

        if let Ok(mut state) = self.state.lock() {
            if !state.reports.contains_key(&key) {
                state.order.push_back(key.clone());
                state.reports.insert(key, report.clone());
                while state.reports.len() > self.capacity {
                    match state.order.pop_front() {
                        Some(oldest) => {
                            state.reports.remove(&oldest);
                        }
                        None => break,
                    }
                }
            }
        }

        report
    }

    pub fn len(&self) -> usize {
        self.state.lock().map(|state| state.reports.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// (hits, misses)
    pub fn stats(&self) -> (u64, u64) {
        self.state
            .lock()
            .map(|state| (state.hits, state.misses))
            .unwrap_or((0, 0))
    }
}

/// Formation and budget checks bound to one rule set and catalog.
pub struct RosterValidator {
    rules: RosterRules,
    catalog: Arc<PriceCatalog>,
    cache: FormationCache,
}

impl RosterValidator {
    pub fn new(rules: RosterRules, catalog: Arc<PriceCatalog>) -> Self {
        let cache = FormationCache::new(rules.formation_cache_size);
        Self {
            rules,
            catalog,
            cache,
        }
    }

    pub fn rules(&self) -> &RosterRules {
        &self.rules
    }

    pub fn catalog(&self) -> &PriceCatalog {
        &self.catalog
    }

    pub fn formation(&self, slots: &[RosterSlot]) -> FormationReport {
        self.cache.validate(slots, &self.rules)
    }

    pub fn budget(&self, slots: &[RosterSlot]) -> BudgetReport {
        validate_budget(slots, &self.catalog, &self.rules)
    }

    pub fn cache(&self) -> &FormationCache {
        &self.cache
    }
}
