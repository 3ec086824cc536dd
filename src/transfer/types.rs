use crate::executor::types::ControllerError;
use crate::roster::types::{
    BoosterSelection, EntityId, EpochRef, Roster, RosterKey, RosterSlot, TenantKey,
};
use crate::storage::partitioner::{PartitionId, ShardId};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Unique identifier of a committed roster mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TransferId(pub String);

impl TransferId {
    /// Random v4 UUID.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Initial selection submitted when a team is first saved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RosterDraft {
    pub main_slots: Vec<RosterSlot>,
    pub reserve_slots: Vec<RosterSlot>,
    pub captain_id: EntityId,
    pub vice_captain_id: EntityId,
    pub booster: Option<BoosterSelection>,
}

/// A swap of owned entities for new ones, scoped to a target epoch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferRequest {
    pub tenant: TenantKey,
    pub team_no: u32,
    pub entities_in: Vec<RosterSlot>,
    pub entities_out: Vec<EntityId>,
    pub target_epoch: EpochRef,
    /// Keeps the current captain when `None`.
    pub captain_id: Option<EntityId>,
    pub vice_captain_id: Option<EntityId>,
    /// Keeps the current booster when `None`.
    pub booster: Option<BoosterSelection>,
}

impl TransferRequest {
    pub fn key(&self) -> RosterKey {
        RosterKey::new(self.tenant.clone(), self.team_no)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferErrorCode {
    TransferCountMismatch,
    TeamNotFound,
    TransferLimitExceeded,
    InvalidPlayerOwnership,
    InvalidFormation,
    BudgetExceeded,
    TeamAlreadyExists,
    ReserveLimitExceeded,
    SystemError,
    QueueFull,
    CircuitOpen,
}

impl TransferErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            TransferErrorCode::TransferCountMismatch => "TRANSFER_COUNT_MISMATCH",
            TransferErrorCode::TeamNotFound => "TEAM_NOT_FOUND",
            TransferErrorCode::TransferLimitExceeded => "TRANSFER_LIMIT_EXCEEDED",
            TransferErrorCode::InvalidPlayerOwnership => "INVALID_PLAYER_OWNERSHIP",
            TransferErrorCode::InvalidFormation => "INVALID_FORMATION",
            TransferErrorCode::BudgetExceeded => "BUDGET_EXCEEDED",
            TransferErrorCode::TeamAlreadyExists => "TEAM_ALREADY_EXISTS",
            TransferErrorCode::ReserveLimitExceeded => "RESERVE_LIMIT_EXCEEDED",
            TransferErrorCode::SystemError => "SYSTEM_ERROR",
            TransferErrorCode::QueueFull => "QUEUE_FULL",
            TransferErrorCode::CircuitOpen => "CIRCUIT_OPEN",
        }
    }

    /// Business-rule outcomes, as opposed to infrastructure failures and admission rejections.
    pub fn is_validation(self) -> bool {
        !matches!(
            self,
            TransferErrorCode::SystemError
                | TransferErrorCode::QueueFull
                | TransferErrorCode::CircuitOpen
        )
    }
}

impl fmt::Display for TransferErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnostic context attached to a rejection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectionDetail {
    None,
    CountMismatch {
        entities_in: usize,
        entities_out: usize,
    },
    TransferLimit {
        transfers_left: u32,
        transfers_requested: usize,
    },
    Ownership {
        invalid_entities: Vec<EntityId>,
    },
    Formation {
        issues: Vec<String>,
        role_counts: BTreeMap<u8, usize>,
    },
    Budget {
        required_budget: f64,
        available_budget: f64,
    },
    ReserveLimit {
        reserve_size: usize,
        limit: usize,
    },
    Admission {
        retry_in_ms: Option<u64>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, thiserror::Error)]
#[error("{code}: {error}")]
pub struct TransferRejection {
    pub success: bool,
    #[serde(rename = "error_code")]
    pub code: TransferErrorCode,
    pub error: String,
    pub detail: RejectionDetail,
}

impl TransferRejection {
    pub fn new(code: TransferErrorCode, error: impl Into<String>, detail: RejectionDetail) -> Self {
        Self {
            success: false,
            code,
            error: error.into(),
            detail,
        }
    }

    pub fn system(error: impl fmt::Display) -> Self {
        Self::new(
            TransferErrorCode::SystemError,
            error.to_string(),
            RejectionDetail::None,
        )
    }

    /// Folds a controller failure back into a rejection.
    ///
    /// An operation that failed with a `TransferRejection` is recovered as-is.
    pub fn from_controller(err: ControllerError) -> Self {
        match err {
            ControllerError::QueueFull { .. } => Self::new(
                TransferErrorCode::QueueFull,
                err.to_string(),
                RejectionDetail::Admission { retry_in_ms: None },
            ),
            ControllerError::CircuitOpen { retry_in } => Self::new(
                TransferErrorCode::CircuitOpen,
                err.to_string(),
                RejectionDetail::Admission {
                    retry_in_ms: Some(retry_in.as_millis() as u64),
                },
            ),
            ControllerError::Operation(inner) => match inner.downcast::<TransferRejection>() {
                Ok(rejection) => rejection,
                Err(other) => Self::system(format!("{:#}", other)),
            },
            ControllerError::Cancelled => Self::system(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferReceipt {
    pub success: bool,
    pub transfer_id: TransferId,
    pub partition: PartitionId,
    pub shard: ShardId,
    pub epoch_changed: bool,
    pub new_transfers_made: u32,
    pub new_transfers_left: u32,
    pub new_valuation: f64,
    pub new_remaining_budget: f64,
}

/// Result of every roster mutation. Rejections are values, never panics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TransferOutcome {
    Committed(TransferReceipt),
    Rejected(TransferRejection),
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TransferOutcome::Committed(_))
    }

    pub fn code(&self) -> Option<TransferErrorCode> {
        match self {
            TransferOutcome::Committed(_) => None,
            TransferOutcome::Rejected(rejection) => Some(rejection.code),
        }
    }

    pub fn receipt(&self) -> Option<&TransferReceipt> {
        match self {
            TransferOutcome::Committed(receipt) => Some(receipt),
            TransferOutcome::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<&TransferRejection> {
        match self {
            TransferOutcome::Committed(_) => None,
            TransferOutcome::Rejected(rejection) => Some(rejection),
        }
    }
}

impl From<Result<TransferReceipt, TransferRejection>> for TransferOutcome {
    fn from(result: Result<TransferReceipt, TransferRejection>) -> Self {
        match result {
            Ok(receipt) => TransferOutcome::Committed(receipt),
            Err(rejection) => TransferOutcome::Rejected(rejection),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferAction {
    Create,
    Transfer,
}

/// Append-only audit entry. Snapshots are copies, never shared with the live roster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferRecord {
    pub transfer_id: TransferId,
    pub key: RosterKey,
    pub action: TransferAction,
    pub epoch: EpochRef,
    pub from_epoch: Option<EpochRef>,
    pub epoch_changed: bool,
    pub entities_in: Vec<RosterSlot>,
    pub entities_out: Vec<EntityId>,
    pub prior_main: Vec<RosterSlot>,
    pub new_main: Vec<RosterSlot>,
    pub transfers_made: u32,
    pub booster: Option<BoosterSelection>,
    pub created_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferCounters {
    pub free_limit: u32,
    pub free_made: u32,
    pub extra_made: u32,
    pub total_made: u32,
    pub left: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BudgetSummary {
    pub limit: f64,
    pub utilized: f64,
    pub left: f64,
}

/// Read projection of one team for reporting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TeamSummary {
    pub team_no: u32,
    pub epoch: EpochRef,
    pub transfers: TransferCounters,
    pub budget: BudgetSummary,
    pub formation: BTreeMap<u8, usize>,
    pub captain_id: EntityId,
    pub vice_captain_id: EntityId,
    pub booster: Option<BoosterSelection>,
    pub main_slots: Vec<RosterSlot>,
    pub reserve_slots: Vec<RosterSlot>,
}

impl TeamSummary {
    pub fn from_roster(roster: &Roster, budget_limit: f64) -> Self {
        let mut formation = BTreeMap::new();
        for slot in &roster.main_slots {
            *formation.entry(slot.role_id).or_insert(0) += 1;
        }

        Self {
            team_no: roster.key.team_no,
            epoch: roster.epoch,
            transfers: TransferCounters {
                free_limit: roster.transfers_allowed,
                free_made: roster.transfers_made.min(roster.transfers_allowed),
                extra_made: roster.transfers_made.saturating_sub(roster.transfers_allowed),
                total_made: roster.transfers_made,
                left: roster.transfers_left(),
            },
            budget: BudgetSummary {
                limit: budget_limit,
                utilized: roster.valuation,
                left: roster.remaining_budget,
            },
            formation,
            captain_id: roster.captain_id,
            vice_captain_id: roster.vice_captain_id,
            booster: roster.booster,
            main_slots: roster.main_slots.clone(),
            reserve_slots: roster.reserve_slots.clone(),
        }
    }
}
