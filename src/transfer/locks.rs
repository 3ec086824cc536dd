use crate::roster::types::RosterKey;

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

const PRUNE_THRESHOLD: usize = 10_000;

/// One async mutex per roster key.
///
/// Holding the guard serializes every read-validate-write sequence for that
/// roster within this process. Keys that nobody holds are pruned once the
/// table grows past a threshold.
#[derive(Default)]
pub struct KeyedLocks {
    locks: DashMap<RosterKey, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &RosterKey) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        if self.locks.len() > PRUNE_THRESHOLD {
            self.prune();
        }

        lock.lock_owned().await
    }

    /// Drops entries whose mutex is referenced only by the table.
    pub fn prune(&self) {
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
