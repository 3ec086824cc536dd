//! In-memory storage collaborator.
//!
//! Keeps the same physical layout a sharded backend would: every table is a
//! `Shard ID -> RosterKey -> rows` map, and every call is served from the shard
//! named by its route. Used by the benchmark binary and as the test backend,
//! so it carries simulated latency, fault injection and read/write counters.

use super::partitioner::Route;
use super::protocol::{RosterSnapshot, RosterStore};
use crate::roster::types::{now_ms, EpochRef, Roster, RosterKey, TenantKey};
use crate::transfer::types::TransferRecord;

use anyhow::Result;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type ShardTable<V> = Arc<DashMap<u32, DashMap<RosterKey, V>>>;

pub struct InMemoryRosterStore {
    /// Structure: `Shard ID -> RosterKey -> latest Roster`.
    latest: ShardTable<Roster>,
    /// Structure: `Shard ID -> RosterKey -> snapshots in insertion order`.
    history: ShardTable<Vec<RosterSnapshot>>,
    /// Structure: `Shard ID -> RosterKey -> append-only transfer log`.
    transfers: ShardTable<Vec<TransferRecord>>,

    latency: Mutex<Option<Duration>>,
    /// `Some(n)`: let `n` more writes through, then fail one.
    write_fault: Mutex<Option<u32>>,
    fail_reads: AtomicBool,

    reads: AtomicU64,
    writes: AtomicU64,
}

impl InMemoryRosterStore {
    pub fn new() -> Self {
        Self {
            latest: Arc::new(DashMap::new()),
            history: Arc::new(DashMap::new()),
            transfers: Arc::new(DashMap::new()),
            latency: Mutex::new(None),
            write_fault: Mutex::new(None),
            fail_reads: AtomicBool::new(false),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Every call sleeps for `latency` before touching the tables.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.set_latency(Some(latency));
        self
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut current) = self.latency.lock() {
            *current = latency;
        }
    }

    /// The next write fails.
    pub fn fail_next_write(&self) {
        self.fail_write_after(0);
    }

    /// Lets `successful` writes through, then fails exactly one.
    pub fn fail_write_after(&self, successful: u32) {
        if let Ok(mut fault) = self.write_fault.lock() {
            *fault = Some(successful);
        }
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Writes that reached the tables.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn roster_count(&self) -> usize {
        self.latest.iter().map(|shard| shard.value().len()).sum()
    }

    /// Number of latest rosters held by each shard that has any.
    pub fn shard_sizes(&self) -> Vec<(u32, usize)> {
        let mut sizes: Vec<(u32, usize)> = self
            .latest
            .iter()
            .map(|shard| (*shard.key(), shard.value().len()))
            .collect();
        sizes.sort_unstable();
        sizes
    }

    pub fn has_shard(&self, shard: u32) -> bool {
        self.latest
            .get(&shard)
            .map(|map| !map.is_empty())
            .unwrap_or(false)
    }

    async fn simulate_latency(&self) {
        let latency = self.latency.lock().ok().and_then(|latency| *latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn begin_read(&self, operation: &str) -> Result<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("injected read failure during {}", operation));
        }
        Ok(())
    }

    fn begin_write(&self, operation: &str) -> Result<()> {
        if let Ok(mut fault) = self.write_fault.lock() {
            match *fault {
                Some(0) => {
                    *fault = None;
                    tracing::debug!("Injecting write failure into {}", operation);
                    return Err(anyhow::anyhow!("injected write failure during {}", operation));
                }
                Some(remaining) => *fault = Some(remaining - 1),
                None => {}
            }
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Default for InMemoryRosterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RosterStore for InMemoryRosterStore {
    async fn get_roster(&self, route: Route, key: &RosterKey) -> Result<Option<Roster>> {
        self.simulate_latency().await;
        self.begin_read("get_roster")?;

        let Some(shard) = self.latest.get(&route.shard.0) else {
            return Ok(None);
        };
        let roster = shard.get(key).map(|entry| entry.value().clone());
        Ok(roster)
    }

    async fn list_rosters(&self, route: Route, tenant: &TenantKey) -> Result<Vec<Roster>> {
        self.simulate_latency().await;
        self.begin_read("list_rosters")?;

        let Some(shard) = self.latest.get(&route.shard.0) else {
            return Ok(Vec::new());
        };
        let mut rosters: Vec<Roster> = shard
            .iter()
            .filter(|entry| &entry.key().tenant == tenant)
            .map(|entry| entry.value().clone())
            .collect();
        rosters.sort_by_key(|roster| roster.key.team_no);
        Ok(rosters)
    }

    async fn put_roster_latest(&self, route: Route, roster: &Roster, epoch: &EpochRef) -> Result<()> {
        self.simulate_latency().await;
        self.begin_write("put_roster_latest")?;

        let mut stored = roster.clone();
        stored.epoch = *epoch;

        let shard = self
            .latest
            .entry(route.shard.0)
            .or_insert_with(DashMap::new);
        shard.insert(stored.key.clone(), stored);
        Ok(())
    }

    async fn append_roster_history(&self, route: Route, epoch: &EpochRef, roster: &Roster) -> Result<()> {
        self.simulate_latency().await;
        self.begin_write("append_roster_history")?;

        let shard = self
            .history
            .entry(route.shard.0)
            .or_insert_with(DashMap::new);
        shard
            .entry(roster.key.clone())
            .or_default()
            .push(RosterSnapshot::of(roster, *epoch, now_ms()));
        Ok(())
    }

    async fn close_roster_history(
        &self,
        route: Route,
        key: &RosterKey,
        prior_epoch: &EpochRef,
        closed_by: &EpochRef,
    ) -> Result<bool> {
        self.simulate_latency().await;
        self.begin_write("close_roster_history")?;

        let Some(shard) = self.history.get(&route.shard.0) else {
            return Ok(false);
        };
        let Some(mut snapshots) = shard.get_mut(key) else {
            return Ok(false);
        };

        let open = snapshots
            .iter_mut()
            .rev()
            .find(|snapshot| snapshot.is_open() && snapshot.from_epoch.same_gameset(prior_epoch));

        match open {
            Some(snapshot) => {
                snapshot.to_epoch = Some(*closed_by);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn append_transfer_record(&self, route: Route, record: &TransferRecord) -> Result<()> {
        self.simulate_latency().await;
        self.begin_write("append_transfer_record")?;

        let shard = self
            .transfers
            .entry(route.shard.0)
            .or_insert_with(DashMap::new);
        shard
            .entry(record.key.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn transfer_records(&self, route: Route, key: &RosterKey) -> Result<Vec<TransferRecord>> {
        self.simulate_latency().await;
        self.begin_read("transfer_records")?;

        let Some(shard) = self.transfers.get(&route.shard.0) else {
            return Ok(Vec::new());
        };
        let records = shard
            .get(key)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        Ok(records)
    }

    async fn roster_history(&self, route: Route, key: &RosterKey) -> Result<Vec<RosterSnapshot>> {
        self.simulate_latency().await;
        self.begin_read("roster_history")?;

        let Some(shard) = self.history.get(&route.shard.0) else {
            return Ok(Vec::new());
        };
        let snapshots = shard
            .get(key)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        Ok(snapshots)
    }
}
