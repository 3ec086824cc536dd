//! Transfer State Machine
//!
//! Orchestrates every roster mutation: route the tenant, lock the roster,
//! read it, validate the candidate state, then persist it with the strategy the
//! epoch transition calls for.
//!
//! ## Transfer preconditions (checked in order, first failure wins)
//! 1. Non-empty, equally sized in/out lists.
//! 2. The roster exists.
//! 3. Enough free transfers left.
//! 4. Every outgoing entity is owned.
//! 5. No incoming entity is already on the team or listed twice.
//! 6. The candidate main slots pass the formation check.
//! 7. The candidate main slots pass the budget check.
//!
//! Outgoing entities leave the main slots; reserves are carried over unchanged.
//! Nothing is written unless all seven pass.
//!
//! ## Commit strategy
//! - **Same gameset**: the latest projection is updated in place.
//! - **New gameset**: the prior history snapshot is closed, a new one is opened
//!   and the latest projection moves. These are three independent writes; a
//!   failure part-way leaves history and latest disagreeing and is logged at
//!   ERROR level with the stage reached. No repair is attempted here.
//!
//! Both branches finish by appending an immutable [`TransferRecord`].

use super::locks::KeyedLocks;
use super::types::*;
use crate::config::{ConfigError, EngineConfig};
use crate::executor::controller::ConcurrencyController;
use crate::metrics::MetricsCollector;
use crate::roster::catalog::PriceCatalog;
use crate::roster::types::{
    now_ms, round_cents, EntityId, EpochRef, Roster, RosterKey, RosterSlot, TenantKey,
};
use crate::roster::validator::RosterValidator;
use crate::storage::partitioner::{PartitionRouter, Route};
use crate::storage::protocol::{RosterSnapshot, RosterStore};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

pub struct TransferEngine<S: RosterStore> {
    store: Arc<S>,
    router: Arc<PartitionRouter>,
    validator: Arc<RosterValidator>,
    metrics: Arc<MetricsCollector>,
    locks: KeyedLocks,
}

impl<S: RosterStore> TransferEngine<S> {
    pub fn new(
        store: Arc<S>,
        router: Arc<PartitionRouter>,
        validator: Arc<RosterValidator>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            store,
            router,
            validator,
            metrics,
            locks: KeyedLocks::new(),
        }
    }

    /// Builds router and validator from a validated config.
    pub fn from_config(
        config: &EngineConfig,
        store: Arc<S>,
        catalog: Arc<PriceCatalog>,
        metrics: Arc<MetricsCollector>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let router = Arc::new(PartitionRouter::new(&config.router)?);
        let validator = Arc::new(RosterValidator::new(config.rules.clone(), catalog));
        Ok(Self::new(store, router, validator, metrics))
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn router(&self) -> &PartitionRouter {
        &self.router
    }

    pub fn validator(&self) -> &RosterValidator {
        &self.validator
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    // ============================================================
    // Mutations
    // ============================================================

    /// First save of a team. The draft must satisfy every rule a transfer does.
    pub async fn create_roster(
        &self,
        tenant: &TenantKey,
        team_no: u32,
        draft: RosterDraft,
        epoch: EpochRef,
    ) -> TransferOutcome {
        let started = Instant::now();
        let result = self.try_create(tenant, team_no, draft, epoch).await;
        self.observe("create_roster", started, &result);
        result.into()
    }

    pub async fn transfer(&self, request: TransferRequest) -> TransferOutcome {
        let started = Instant::now();
        let result = self.try_transfer(&request).await;
        self.observe("transfer", started, &result);
        result.into()
    }

    async fn try_create(
        &self,
        tenant: &TenantKey,
        team_no: u32,
        draft: RosterDraft,
        epoch: EpochRef,
    ) -> Result<TransferReceipt, TransferRejection> {
        let rules = self.validator.rules();

        if draft.reserve_slots.len() > rules.reserve_limit {
            return Err(TransferRejection::new(
                TransferErrorCode::ReserveLimitExceeded,
                format!(
                    "Too many reserve players: maximum {}, found {}",
                    rules.reserve_limit,
                    draft.reserve_slots.len()
                ),
                RejectionDetail::ReserveLimit {
                    reserve_size: draft.reserve_slots.len(),
                    limit: rules.reserve_limit,
                },
            ));
        }

        let repeated = repeated_ids(
            draft
                .main_slots
                .iter()
                .chain(draft.reserve_slots.iter())
                .map(|slot| slot.entity_id),
        );
        if !repeated.is_empty() {
            let listed: Vec<String> = repeated.iter().map(|id| id.to_string()).collect();
            return Err(TransferRejection::new(
                TransferErrorCode::InvalidPlayerOwnership,
                format!("Players can fill only one slot: {}", listed.join(", ")),
                RejectionDetail::Ownership {
                    invalid_entities: repeated,
                },
            ));
        }

        let budget_ceiling = rules.budget_ceiling;
        let transfers_allowed = rules.transfers_allowed;
        let valuation = self.check_candidate(&draft.main_slots)?;

        let key = RosterKey::new(tenant.clone(), team_no);
        let route = self.router.route(tenant);
        let _guard = self.locks.acquire(&key).await;

        let existing = self
            .store
            .get_roster(route, &key)
            .await
            .map_err(|err| storage_failure("get_roster", &key, err))?;
        if existing.is_some() {
            return Err(TransferRejection::new(
                TransferErrorCode::TeamAlreadyExists,
                format!("Team {} already exists for user {}", team_no, tenant),
                RejectionDetail::None,
            ));
        }

        let roster = Roster {
            key: key.clone(),
            epoch,
            main_slots: draft.main_slots,
            reserve_slots: draft.reserve_slots,
            valuation,
            remaining_budget: round_cents(budget_ceiling - valuation),
            captain_id: draft.captain_id,
            vice_captain_id: draft.vice_captain_id,
            booster: draft.booster,
            transfers_allowed,
            transfers_made: 0,
            updated_at: now_ms(),
        };

        self.store
            .put_roster_latest(route, &roster, &epoch)
            .await
            .map_err(|err| storage_failure("put_roster_latest", &key, err))?;
        if let Err(err) = self.store.append_roster_history(route, &epoch, &roster).await {
            tracing::error!(
                "Team {} saved without its opening history snapshot for {}",
                key,
                epoch
            );
            return Err(storage_failure("append_roster_history", &key, err));
        }

        let record = TransferRecord {
            transfer_id: TransferId::new(),
            key: key.clone(),
            action: TransferAction::Create,
            epoch,
            from_epoch: None,
            epoch_changed: false,
            entities_in: roster.main_slots.clone(),
            entities_out: Vec::new(),
            prior_main: Vec::new(),
            new_main: roster.main_slots.clone(),
            transfers_made: 0,
            booster: roster.booster,
            created_at: roster.updated_at,
        };
        self.append_record(route, &record).await?;

        tracing::debug!("Created team {} on {} (valuation {:.1})", key, route.shard, valuation);

        Ok(self.receipt(&record, route, &roster))
    }

    async fn try_transfer(
        &self,
        request: &TransferRequest,
    ) -> Result<TransferReceipt, TransferRejection> {
        let (count_in, count_out) = (request.entities_in.len(), request.entities_out.len());
        let count_detail = RejectionDetail::CountMismatch {
            entities_in: count_in,
            entities_out: count_out,
        };
        if count_in == 0 || count_out == 0 {
            return Err(TransferRejection::new(
                TransferErrorCode::TransferCountMismatch,
                "Invalid transfer: players in and players out cannot be empty",
                count_detail,
            ));
        }
        if count_in != count_out {
            return Err(TransferRejection::new(
                TransferErrorCode::TransferCountMismatch,
                format!(
                    "Transfer count mismatch: {} in, {} out; both sides must have the same count",
                    count_in, count_out
                ),
                count_detail,
            ));
        }

        let key = request.key();
        let route = self.router.route(&request.tenant);
        let _guard = self.locks.acquire(&key).await;

        let current = self
            .store
            .get_roster(route, &key)
            .await
            .map_err(|err| storage_failure("get_roster", &key, err))?
            .ok_or_else(|| {
                TransferRejection::new(
                    TransferErrorCode::TeamNotFound,
                    format!("Team {} not found for user {}", request.team_no, request.tenant),
                    RejectionDetail::None,
                )
            })?;

        let transfers_left = current.transfers_left();
        if count_out > transfers_left as usize {
            return Err(TransferRejection::new(
                TransferErrorCode::TransferLimitExceeded,
                format!(
                    "Transfer limit exceeded. You have {} free transfers left but trying to make {} transfers.",
                    transfers_left, count_out
                ),
                RejectionDetail::TransferLimit {
                    transfers_left,
                    transfers_requested: count_out,
                },
            ));
        }

        let invalid_entities: Vec<EntityId> = request
            .entities_out
            .iter()
            .copied()
            .filter(|entity_id| !current.owns(*entity_id))
            .collect();
        if !invalid_entities.is_empty() {
            let listed: Vec<String> = invalid_entities.iter().map(|id| id.to_string()).collect();
            return Err(TransferRejection::new(
                TransferErrorCode::InvalidPlayerOwnership,
                format!("Cannot transfer players you don't own: {}", listed.join(", ")),
                RejectionDetail::Ownership { invalid_entities },
            ));
        }

        let incoming_ids = request.entities_in.iter().map(|slot| slot.entity_id);
        let mut already_held: Vec<EntityId> = incoming_ids
            .clone()
            .filter(|entity_id| current.owns(*entity_id))
            .collect();
        already_held.extend(repeated_ids(incoming_ids));
        already_held.sort_unstable();
        already_held.dedup();
        if !already_held.is_empty() {
            let listed: Vec<String> = already_held.iter().map(|id| id.to_string()).collect();
            return Err(TransferRejection::new(
                TransferErrorCode::InvalidPlayerOwnership,
                format!("Cannot bring in players already on the team: {}", listed.join(", ")),
                RejectionDetail::Ownership {
                    invalid_entities: already_held,
                },
            ));
        }

        let outgoing: HashSet<EntityId> = request.entities_out.iter().copied().collect();
        let mut main_slots: Vec<RosterSlot> = current
            .main_slots
            .iter()
            .filter(|slot| !outgoing.contains(&slot.entity_id))
            .copied()
            .collect();
        main_slots.extend(request.entities_in.iter().copied());
        let reserve_slots = current.reserve_slots.clone();

        let valuation = self.check_candidate(&main_slots)?;

        let target = request.target_epoch;
        let epoch_changed = !target.same_gameset(&current.epoch);
        let transfers_made = current.transfers_made + count_out as u32;

        let updated = Roster {
            key: key.clone(),
            epoch: target,
            main_slots,
            reserve_slots,
            valuation,
            remaining_budget: round_cents(self.validator.rules().budget_ceiling - valuation),
            captain_id: request.captain_id.unwrap_or(current.captain_id),
            vice_captain_id: request.vice_captain_id.unwrap_or(current.vice_captain_id),
            booster: request.booster.or(current.booster),
            transfers_allowed: current.transfers_allowed,
            transfers_made,
            updated_at: now_ms(),
        };

        if epoch_changed {
            self.commit_cross_epoch(route, &current, &updated).await?;
        } else {
            self.store
                .put_roster_latest(route, &updated, &target)
                .await
                .map_err(|err| storage_failure("put_roster_latest", &key, err))?;
        }

        let record = TransferRecord {
            transfer_id: TransferId::new(),
            key: key.clone(),
            action: TransferAction::Transfer,
            epoch: target,
            from_epoch: Some(current.epoch),
            epoch_changed,
            entities_in: request.entities_in.clone(),
            entities_out: request.entities_out.clone(),
            prior_main: current.main_slots.clone(),
            new_main: updated.main_slots.clone(),
            transfers_made,
            booster: updated.booster,
            created_at: updated.updated_at,
        };
        self.append_record(route, &record).await?;

        tracing::debug!(
            "Committed transfer {} for {}: {} out, {} made, epoch {} -> {}",
            record.transfer_id,
            key,
            count_out,
            transfers_made,
            current.epoch,
            target
        );

        Ok(self.receipt(&record, route, &updated))
    }

    /// Formation then budget; returns the valuation of a passing candidate.
    fn check_candidate(&self, main_slots: &[RosterSlot]) -> Result<f64, TransferRejection> {
        let formation = self.validator.formation(main_slots);
        if !formation.valid {
            let message = formation
                .error_message()
                .unwrap_or_else(|| "Formation invalid".to_string());
            return Err(TransferRejection::new(
                TransferErrorCode::InvalidFormation,
                message,
                RejectionDetail::Formation {
                    issues: formation.issues,
                    role_counts: formation.role_counts,
                },
            ));
        }

        let budget = self.validator.budget(main_slots);
        if !budget.valid {
            let message = budget
                .error
                .unwrap_or_else(|| "Budget exceeded".to_string());
            return Err(TransferRejection::new(
                TransferErrorCode::BudgetExceeded,
                message,
                RejectionDetail::Budget {
                    required_budget: budget.total_cost,
                    available_budget: budget.ceiling,
                },
            ));
        }

        Ok(budget.total_cost)
    }

    async fn commit_cross_epoch(
        &self,
        route: Route,
        current: &Roster,
        updated: &Roster,
    ) -> Result<(), TransferRejection> {
        let key = &updated.key;
        let target = &updated.epoch;

        let closed = self
            .store
            .close_roster_history(route, key, &current.epoch, target)
            .await
            .map_err(|err| storage_failure("close_roster_history", key, err))?;
        if !closed {
            tracing::debug!("No open history snapshot for {} in {}", key, current.epoch);
        }

        if let Err(err) = self.store.append_roster_history(route, target, updated).await {
            tracing::error!(
                "Epoch transition for {} stopped after closing {}: history has no open snapshot",
                key,
                current.epoch
            );
            return Err(storage_failure("append_roster_history", key, err));
        }

        if let Err(err) = self.store.put_roster_latest(route, updated, target).await {
            tracing::error!(
                "Epoch transition for {} stopped after opening {}: latest still points at {}",
                key,
                target,
                current.epoch
            );
            return Err(storage_failure("put_roster_latest", key, err));
        }

        tracing::info!("Team {} moved from {} to {}", key, current.epoch, target);
        Ok(())
    }

    async fn append_record(
        &self,
        route: Route,
        record: &TransferRecord,
    ) -> Result<(), TransferRejection> {
        self.store
            .append_transfer_record(route, record)
            .await
            .map_err(|err| {
                tracing::error!(
                    "Roster {} committed but transfer record {} was not written",
                    record.key,
                    record.transfer_id
                );
                storage_failure("append_transfer_record", &record.key, err)
            })
    }

    fn receipt(&self, record: &TransferRecord, route: Route, roster: &Roster) -> TransferReceipt {
        TransferReceipt {
            success: true,
            transfer_id: record.transfer_id.clone(),
            partition: route.partition,
            shard: route.shard,
            epoch_changed: record.epoch_changed,
            new_transfers_made: roster.transfers_made,
            new_transfers_left: roster.transfers_left(),
            new_valuation: roster.valuation,
            new_remaining_budget: roster.remaining_budget,
        }
    }

    fn observe<T>(&self, operation: &str, started: Instant, result: &Result<T, TransferRejection>) {
        let failed = matches!(result, Err(rejection) if rejection.code == TransferErrorCode::SystemError);
        self.metrics.record(operation, started.elapsed(), !failed);

        if let Err(rejection) = result {
            self.metrics.record_rejection(rejection.code.as_str());
            if rejection.code.is_validation() {
                tracing::debug!("{} rejected: {}", operation, rejection);
            }
        }
    }

    // ============================================================
    // Controller-driven entry points
    // ============================================================

    /// Runs [`Self::transfer`] through the controller.
    ///
    /// Storage failures reach the controller as operation errors so they count
    /// toward its breaker; business rejections do not.
    pub async fn submit_transfer(
        self: &Arc<Self>,
        controller: &ConcurrencyController,
        request: TransferRequest,
    ) -> TransferOutcome {
        let engine = self.clone();
        let pending = controller.execute(move || async move {
            into_operation_result(engine.transfer(request).await)
        });
        self.settle(pending.await)
    }

    /// Runs [`Self::create_roster`] through the controller.
    pub async fn submit_create(
        self: &Arc<Self>,
        controller: &ConcurrencyController,
        tenant: TenantKey,
        team_no: u32,
        draft: RosterDraft,
        epoch: EpochRef,
    ) -> TransferOutcome {
        let engine = self.clone();
        let pending = controller.execute(move || async move {
            into_operation_result(engine.create_roster(&tenant, team_no, draft, epoch).await)
        });
        self.settle(pending.await)
    }

    fn settle(
        &self,
        result: Result<TransferOutcome, crate::executor::types::ControllerError>,
    ) -> TransferOutcome {
        match result {
            Ok(outcome) => outcome,
            Err(err) => {
                let admission = err.is_admission();
                let rejection = TransferRejection::from_controller(err);
                // Operation failures were already counted by `observe`.
                if admission {
                    self.metrics.record_rejection(rejection.code.as_str());
                }
                TransferOutcome::Rejected(rejection)
            }
        }
    }

    // ============================================================
    // Read projections
    // ============================================================

    pub async fn current_roster(&self, tenant: &TenantKey, team_no: u32) -> anyhow::Result<Option<Roster>> {
        let key = RosterKey::new(tenant.clone(), team_no);
        let route = self.router.route(tenant);
        self.timed("get_roster", self.store.get_roster(route, &key)).await
    }

    /// Every team of a tenant with its transfer and budget bookkeeping.
    pub async fn team_summaries(&self, tenant: &TenantKey) -> anyhow::Result<Vec<TeamSummary>> {
        let route = self.router.route(tenant);
        let rosters = self
            .timed("team_summaries", self.store.list_rosters(route, tenant))
            .await?;
        let ceiling = self.validator.rules().budget_ceiling;
        Ok(rosters
            .iter()
            .map(|roster| TeamSummary::from_roster(roster, ceiling))
            .collect())
    }

    pub async fn transfer_history(
        &self,
        tenant: &TenantKey,
        team_no: u32,
    ) -> anyhow::Result<Vec<TransferRecord>> {
        let key = RosterKey::new(tenant.clone(), team_no);
        let route = self.router.route(tenant);
        self.timed("transfer_history", self.store.transfer_records(route, &key))
            .await
    }

    pub async fn roster_history(
        &self,
        tenant: &TenantKey,
        team_no: u32,
    ) -> anyhow::Result<Vec<RosterSnapshot>> {
        let key = RosterKey::new(tenant.clone(), team_no);
        let route = self.router.route(tenant);
        self.timed("roster_history", self.store.roster_history(route, &key))
            .await
    }

    async fn timed<T>(
        &self,
        operation: &str,
        read: impl std::future::Future<Output = anyhow::Result<T>>,
    ) -> anyhow::Result<T> {
        let started = Instant::now();
        let result = read.await;
        self.metrics.record(operation, started.elapsed(), result.is_ok());
        if let Err(err) = &result {
            tracing::warn!("{} failed: {:#}", operation, err);
        }
        result
    }
}

fn storage_failure(operation: &str, key: &RosterKey, err: anyhow::Error) -> TransferRejection {
    tracing::error!("Storage failure during {} for {}: {:#}", operation, key, err);
    TransferRejection::system(format!("Storage failure during {}: {:#}", operation, err))
}

/// Ids that occur more than once, ascending.
fn repeated_ids(ids: impl Iterator<Item = EntityId>) -> Vec<EntityId> {
    let mut seen = HashSet::new();
    let mut repeated: Vec<EntityId> = ids.filter(|id| !seen.insert(*id)).collect();
    repeated.sort_unstable();
    repeated.dedup();
    repeated
}

fn into_operation_result(outcome: TransferOutcome) -> anyhow::Result<TransferOutcome> {
    match outcome {
        TransferOutcome::Rejected(rejection) if rejection.code == TransferErrorCode::SystemError => {
            Err(anyhow::Error::new(rejection))
        }
        outcome => Ok(outcome),
    }
}
