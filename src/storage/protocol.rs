//! Storage Collaborator Protocol
//!
//! The narrow contract the engine consumes from the backing store. Every call
//! carries the [`Route`] computed by the partition router; implementations are
//! expected to pick a physical node or connection pool from `route.shard`.
//!
//! Rows cross this boundary as typed [`Roster`], [`RosterSnapshot`] and
//! [`TransferRecord`] values. Mapping to and from a driver's column names is
//! the implementation's job, never the engine's.
//!
//! Writes are independent: nothing here is transactional. The engine's
//! cross-epoch commit issues three of them in sequence (close prior history,
//! append new history, move the latest pointer) and a failure between them
//! leaves history and latest disagreeing.

use super::partitioner::Route;
use crate::roster::types::{EpochRef, Roster, RosterKey, RosterSlot, TenantKey};
use crate::transfer::types::TransferRecord;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// One epoch-scoped entry of a roster's history log.
///
/// `to_epoch` stays `None` while the snapshot is the open (current) one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RosterSnapshot {
    pub key: RosterKey,
    pub from_epoch: EpochRef,
    pub to_epoch: Option<EpochRef>,
    pub valuation: f64,
    pub remaining_budget: f64,
    pub main_slots: Vec<RosterSlot>,
    pub reserve_slots: Vec<RosterSlot>,
    pub recorded_at: u64,
}

impl RosterSnapshot {
    pub fn of(roster: &Roster, epoch: EpochRef, recorded_at: u64) -> Self {
        Self {
            key: roster.key.clone(),
            from_epoch: epoch,
            to_epoch: None,
            valuation: roster.valuation,
            remaining_budget: roster.remaining_budget,
            main_slots: roster.main_slots.clone(),
            reserve_slots: roster.reserve_slots.clone(),
            recorded_at,
        }
    }

    pub fn is_open(&self) -> bool {
        self.to_epoch.is_none()
    }
}

pub trait RosterStore: Send + Sync + 'static {
    fn get_roster(
        &self,
        route: Route,
        key: &RosterKey,
    ) -> impl Future<Output = Result<Option<Roster>>> + Send;

    fn list_rosters(
        &self,
        route: Route,
        tenant: &TenantKey,
    ) -> impl Future<Output = Result<Vec<Roster>>> + Send;

    /// Upserts the read-optimized "latest" projection, stamped with `epoch`.
    fn put_roster_latest(
        &self,
        route: Route,
        roster: &Roster,
        epoch: &EpochRef,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Opens a new history snapshot scoped to `epoch`.
    fn append_roster_history(
        &self,
        route: Route,
        epoch: &EpochRef,
        roster: &Roster,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Marks the open snapshot that started in `prior_epoch`'s gameset as closed
    /// at `closed_by`. Returns `false` when there was nothing to close.
    fn close_roster_history(
        &self,
        route: Route,
        key: &RosterKey,
        prior_epoch: &EpochRef,
        closed_by: &EpochRef,
    ) -> impl Future<Output = Result<bool>> + Send;

    fn append_transfer_record(
        &self,
        route: Route,
        record: &TransferRecord,
    ) -> impl Future<Output = Result<()>> + Send;

    fn transfer_records(
        &self,
        route: Route,
        key: &RosterKey,
    ) -> impl Future<Output = Result<Vec<TransferRecord>>> + Send;

    fn roster_history(
        &self,
        route: Route,
        key: &RosterKey,
    ) -> impl Future<Output = Result<Vec<RosterSnapshot>>> + Send;
}
