use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Reasons the controller did not hand back an operation's value.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Backpressure: the wait queue already holds `limit` operations.
    #[error("queue full: {limit} operations already waiting")]
    QueueFull { limit: usize },
    /// The breaker is open; the operation was never invoked.
    #[error("circuit breaker open, retry in {}ms", .retry_in.as_millis())]
    CircuitOpen { retry_in: Duration },
    /// The operation ran and failed. Counted toward the breaker.
    #[error("operation failed: {0:#}")]
    Operation(#[source] anyhow::Error),
    /// The operation was dropped before it produced a value (runtime shutdown or panic).
    #[error("operation cancelled before completion")]
    Cancelled,
}

impl ControllerError {
    /// True for rejections issued before the operation was started.
    pub fn is_admission(&self) -> bool {
        matches!(
            self,
            ControllerError::QueueFull { .. } | ControllerError::CircuitOpen { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
}

/// Point-in-time view of the controller for reporting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControllerMetrics {
    pub running: usize,
    pub queued: usize,
    pub completed: u64,
    /// Errors since the breaker last reset.
    pub errors: u64,
    pub total_errors: u64,
    pub rejected_queue_full: u64,
    pub rejected_circuit_open: u64,
    pub breaker: BreakerState,
    /// Completions in the most recent full one-second window.
    pub throughput: u64,
    /// Completions per second since the controller started.
    pub ops_per_sec: f64,
    /// Cumulative average over successful operations.
    pub avg_latency_ms: f64,
    pub peak_concurrency: usize,
}
