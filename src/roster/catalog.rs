use super::types::EntityId;

use std::collections::HashMap;

/// Per-entity price lookup used by the budget check.
///
/// Unknown entities are charged `default_price` instead of being rejected.
/// This leniency is deliberate: rosters may reference entities that the
/// catalog has not been loaded with yet.
#[derive(Debug, Clone)]
pub struct PriceCatalog {
    prices: HashMap<EntityId, f64>,
    default_price: f64,
}

impl PriceCatalog {
    pub fn new(default_price: f64) -> Self {
        Self {
            prices: HashMap::new(),
            default_price,
        }
    }

    pub fn from_prices<I>(prices: I, default_price: f64) -> Self
    where
        I: IntoIterator<Item = (EntityId, f64)>,
    {
        Self {
            prices: prices.into_iter().collect(),
            default_price,
        }
    }

    pub fn insert(&mut self, entity_id: EntityId, price: f64) {
        self.prices.insert(entity_id, price);
    }

    /// Returns the listed price and whether it came from the catalog.
    pub fn lookup(&self, entity_id: EntityId) -> (f64, bool) {
        match self.prices.get(&entity_id) {
            Some(price) => (*price, true),
            None => (self.default_price, false),
        }
    }

    pub fn price(&self, entity_id: EntityId) -> f64 {
        self.lookup(entity_id).0
    }

    pub fn default_price(&self) -> f64 {
        self.default_price
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}
