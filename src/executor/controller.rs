//! Bounded Concurrency Controller
//!
//! Wraps arbitrary async operations with three guards:
//! 1. **Circuit breaker**: after `circuit_breaker_threshold` errors the breaker
//!    opens and every call fails fast until `reset_timeout` has passed since the
//!    last error. The first call after that closes it and clears the error count.
//! 2. **Queue limit**: at most `queue_limit` operations wait for a slot; the next
//!    one is rejected immediately.
//! 3. **Concurrency limit**: at most `max_concurrency` operations run at once.
//!    Waiting operations are started in FIFO order.
//!
//! Admission happens synchronously inside [`ConcurrencyController::execute`], so a
//! rejected call never touches the queue and never invokes its operation.
//! Admitted operations run as spawned tokio tasks; a drop guard frees the slot and
//! dispatches the next waiter whether the operation succeeded, failed or panicked.

use super::types::{BreakerState, ControllerError, ControllerMetrics};
use crate::config::ControllerConfig;
use crate::metrics::MetricsCollector;

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

type JobFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type Job = Box<dyn FnOnce(SlotGuard) -> JobFuture + Send>;

const THROUGHPUT_WINDOW: Duration = Duration::from_secs(1);

struct ControllerState {
    running: usize,
    queue: VecDeque<Job>,
    completed: u64,
    errors: u64,
    total_errors: u64,
    rejected_queue_full: u64,
    rejected_circuit_open: u64,
    breaker: BreakerState,
    last_error_at: Option<Instant>,
    peak_concurrency: usize,
    total_latency: Duration,
    window_start: Instant,
    window_completed: u64,
    last_window_completed: u64,
    started: Instant,
}

impl ControllerState {
    fn new(now: Instant) -> Self {
        Self {
            running: 0,
            queue: VecDeque::new(),
            completed: 0,
            errors: 0,
            total_errors: 0,
            rejected_queue_full: 0,
            rejected_circuit_open: 0,
            breaker: BreakerState::Closed,
            last_error_at: None,
            peak_concurrency: 0,
            total_latency: Duration::ZERO,
            window_start: now,
            window_completed: 0,
            last_window_completed: 0,
            started: now,
        }
    }

    fn roll_window(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.window_start);
        if elapsed >= THROUGHPUT_WINDOW {
            // An idle gap longer than one window means the last full window was empty.
            self.last_window_completed = if elapsed < THROUGHPUT_WINDOW * 2 {
                self.window_completed
            } else {
                0
            };
            self.window_completed = 0;
            self.window_start = now;
        }
    }
}

struct Inner {
    config: ControllerConfig,
    state: Mutex<ControllerState>,
    metrics: Arc<MetricsCollector>,
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn finish(&self, succeeded: bool, latency: Duration) {
        let now = Instant::now();
        {
            let mut state = self.lock_state();
            state.running = state.running.saturating_sub(1);
            state.roll_window(now);

            if succeeded {
                state.completed += 1;
                state.window_completed += 1;
                state.total_latency += latency;
            } else {
                state.errors += 1;
                state.total_errors += 1;
                state.last_error_at = Some(now);

                if state.breaker == BreakerState::Closed
                    && state.errors >= self.config.circuit_breaker_threshold
                {
                    state.breaker = BreakerState::Open;
                    tracing::warn!(
                        "Circuit breaker OPEN after {} errors (cool-down {}ms)",
                        state.errors,
                        self.config.reset_timeout_ms
                    );
                }
            }
        }

        self.metrics.record("controller.execute", latency, succeeded);
    }
}

/// Frees the slot of one running operation when dropped.
struct SlotGuard {
    inner: Arc<Inner>,
    started: Instant,
    succeeded: bool,
}

impl SlotGuard {
    fn release(mut self, succeeded: bool) {
        self.succeeded = succeeded;
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.inner.finish(self.succeeded, self.started.elapsed());
        dispatch(&self.inner);
    }
}

fn dispatch(inner: &Arc<Inner>) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        tracing::warn!("No tokio runtime available, queued operations stay parked");
        return;
    };

    loop {
        let job = {
            let mut state = inner.lock_state();
            if state.running >= inner.config.max_concurrency {
                return;
            }
            let Some(job) = state.queue.pop_front() else {
                return;
            };
            state.running += 1;
            state.peak_concurrency = state.peak_concurrency.max(state.running);
            job
        };

        let guard = SlotGuard {
            inner: inner.clone(),
            started: Instant::now(),
            succeeded: false,
        };
        runtime.spawn(job(guard));
    }
}

/// Cloneable handle; clones share one queue, one breaker and one set of counters.
#[derive(Clone)]
pub struct ConcurrencyController {
    inner: Arc<Inner>,
}

impl ConcurrencyController {
    pub fn new(config: ControllerConfig, metrics: Arc<MetricsCollector>) -> Self {
        tracing::info!(
            "Concurrency controller: max {} in flight, queue limit {}, breaker threshold {}",
            config.max_concurrency,
            config.queue_limit,
            config.circuit_breaker_threshold
        );
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(ControllerState::new(Instant::now())),
                metrics,
            }),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    /// Admits `op` or rejects it on the spot, then resolves to its result.
    ///
    /// Admission runs before this returns, so the order of `execute` calls is the
    /// order in which queued operations start, even if the futures are awaited
    /// in a different order.
    pub fn execute<F, Fut, T>(
        &self,
        op: F,
    ) -> impl Future<Output = Result<T, ControllerError>> + Send + use<F, Fut, T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let admitted = self.admit(op);

        async move {
            let receiver = admitted?;
            receiver.await.unwrap_or(Err(ControllerError::Cancelled))
        }
    }

    fn admit<F, Fut, T>(
        &self,
        op: F,
    ) -> Result<oneshot::Receiver<Result<T, ControllerError>>, ControllerError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let config = &self.inner.config;
        let receiver = {
            let mut state = self.inner.lock_state();

            if state.breaker == BreakerState::Open {
                let reset_timeout = config.reset_timeout();
                let since_error = state
                    .last_error_at
                    .map(|at| at.elapsed())
                    .unwrap_or(reset_timeout);

                if since_error < reset_timeout {
                    state.rejected_circuit_open += 1;
                    let retry_in = reset_timeout - since_error;
                    tracing::debug!("Rejecting operation: circuit open for another {:?}", retry_in);
                    return Err(ControllerError::CircuitOpen { retry_in });
                }

                state.breaker = BreakerState::Closed;
                state.errors = 0;
                tracing::info!("Circuit breaker CLOSED after {:?} cool-down", since_error);
            }

            // A free slot admits straight through; the bound applies to waiters only.
            let slot_free = state.running < config.max_concurrency;
            if !slot_free && state.queue.len() >= config.queue_limit {
                state.rejected_queue_full += 1;
                tracing::warn!(
                    "Rejecting operation: {} already queued (limit {})",
                    state.queue.len(),
                    config.queue_limit
                );
                return Err(ControllerError::QueueFull {
                    limit: config.queue_limit,
                });
            }

            let (sender, receiver) = oneshot::channel();
            let job: Job = Box::new(move |guard: SlotGuard| -> JobFuture {
                Box::pin(async move {
                    let result = op().await;
                    // Counters settle before the caller sees the result.
                    guard.release(result.is_ok());
                    // The caller may have dropped its future.
                    let _ = sender.send(result.map_err(ControllerError::Operation));
                })
            });
            state.queue.push_back(job);
            receiver
        };

        dispatch(&self.inner);
        Ok(receiver)
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.inner.lock_state().breaker
    }

    pub fn metrics(&self) -> ControllerMetrics {
        let now = Instant::now();
        let mut state = self.inner.lock_state();
        state.roll_window(now);

        let uptime = now.duration_since(state.started).as_secs_f64();
        let ops_per_sec = if uptime > 0.0 {
            round2(state.completed as f64 / uptime)
        } else {
            0.0
        };
        let avg_latency_ms = if state.completed > 0 {
            round2(state.total_latency.as_secs_f64() * 1000.0 / state.completed as f64)
        } else {
            0.0
        };

        ControllerMetrics {
            running: state.running,
            queued: state.queue.len(),
            completed: state.completed,
            errors: state.errors,
            total_errors: state.total_errors,
            rejected_queue_full: state.rejected_queue_full,
            rejected_circuit_open: state.rejected_circuit_open,
            breaker: state.breaker,
            throughput: state.last_window_completed,
            ops_per_sec,
            avg_latency_ms,
            peak_concurrency: state.peak_concurrency,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
