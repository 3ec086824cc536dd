//! Executor Module Tests
//!
//! ## Test Scopes
//! - **Admission**: queue-full backpressure and circuit-open fail-fast.
//! - **Breaker lifecycle**: trip, cool-down (on a paused clock) and reset.
//! - **Dispatch**: FIFO start order, concurrency cap, slot release on panic.

#[cfg(test)]
mod tests {
    use crate::config::ControllerConfig;
    use crate::executor::controller::ConcurrencyController;
    use crate::executor::types::{BreakerState, ControllerError};
    use crate::metrics::MetricsCollector;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::Semaphore;

    fn controller(max_concurrency: usize, queue_limit: usize, threshold: u64) -> ConcurrencyController {
        let config = ControllerConfig {
            max_concurrency,
            queue_limit,
            circuit_breaker_threshold: threshold,
            reset_timeout_ms: 1_000,
        };
        ConcurrencyController::new(config, Arc::new(MetricsCollector::new()))
    }

    // ============================================================
    // TEST 1: Admission - Queue Limit
    // ============================================================

    #[tokio::test]
    async fn test_queue_full_rejects_before_queued_work_runs() {
        // ARRANGE: one slot, three waiting places, every operation blocks on a gate
        let controller = controller(1, 3, 50);
        let gate = Arc::new(Semaphore::new(0));
        let started = Arc::new(AtomicUsize::new(0));

        let blocking_op = || {
            let gate = gate.clone();
            let started = started.clone();
            move || async move {
                started.fetch_add(1, Ordering::SeqCst);
                let _permit = gate.acquire().await?;
                Ok::<(), anyhow::Error>(())
            }
        };

        // ACT: one in flight plus queue_limit waiting
        let pending: Vec<_> = (0..4)
            .map(|_| controller.execute(blocking_op()))
            .collect();
        let overflow = controller.execute(blocking_op()).await;

        // ASSERT: the extra submission bounces, nothing queued has started
        assert!(matches!(overflow, Err(ControllerError::QueueFull { limit: 3 })));
        assert!(started.load(Ordering::SeqCst) <= 1);

        let metrics = controller.metrics();
        assert_eq!(metrics.running, 1);
        assert_eq!(metrics.queued, 3);
        assert_eq!(metrics.rejected_queue_full, 1);

        // ACT: open the gate and drain
        gate.add_permits(4);
        for result in pending {
            assert!(result.await.is_ok());
        }

        // ASSERT
        assert_eq!(started.load(Ordering::SeqCst), 4);
        assert_eq!(controller.metrics().completed, 4);
    }

    #[tokio::test]
    async fn test_zero_queue_limit_still_runs_on_free_slot() {
        // ARRANGE: one slot, no waiting places
        let controller = controller(1, 0, 50);
        let gate = Arc::new(Semaphore::new(0));

        // ACT: an idle controller takes the first operation straight into its slot
        let idle = controller.execute(|| async { Ok::<u32, anyhow::Error>(1) }).await;

        // ASSERT
        assert_eq!(idle.unwrap(), 1);
        assert_eq!(controller.metrics().rejected_queue_full, 0);

        // ACT: occupy the slot, then submit another
        let held = {
            let gate = gate.clone();
            controller.execute(move || async move {
                let _permit = gate.acquire().await?;
                Ok::<(), anyhow::Error>(())
            })
        };
        let overflow = controller.execute(|| async { Ok::<(), anyhow::Error>(()) }).await;

        // ASSERT: with the slot busy there is nowhere to wait
        assert!(matches!(overflow, Err(ControllerError::QueueFull { limit: 0 })));
        assert_eq!(controller.metrics().running, 1);

        gate.add_permits(1);
        assert!(held.await.is_ok());
        assert_eq!(controller.metrics().completed, 2);
    }

    // ============================================================
    // TEST 2: Circuit Breaker Lifecycle
    // ============================================================

    #[tokio::test(start_paused = true)]
    async fn test_breaker_trips_fails_fast_and_resets() {
        // ARRANGE
        let controller = controller(2, 10, 3);
        let invoked = Arc::new(AtomicUsize::new(0));

        // ACT: drive threshold failures
        for _ in 0..3 {
            let result = controller
                .execute(|| async { Err::<(), _>(anyhow::anyhow!("backend unavailable")) })
                .await;
            assert!(matches!(result, Err(ControllerError::Operation(_))));
        }

        // ASSERT: breaker is open
        assert_eq!(controller.breaker_state(), BreakerState::Open);

        // ACT: call immediately after the trip
        let invoked_clone = invoked.clone();
        let rejected = controller
            .execute(move || {
                invoked_clone.fetch_add(1, Ordering::SeqCst);
                async { Ok::<(), anyhow::Error>(()) }
            })
            .await;

        // ASSERT: fail fast, operation never invoked
        match rejected {
            Err(ControllerError::CircuitOpen { retry_in }) => {
                assert!(retry_in <= Duration::from_millis(1_000));
            }
            other => panic!("expected CircuitOpen, got {:?}", other),
        }
        assert_eq!(invoked.load(Ordering::SeqCst), 0);

        // ACT: let the cool-down elapse, then succeed
        tokio::time::advance(Duration::from_millis(1_001)).await;
        let invoked_clone = invoked.clone();
        let recovered = controller
            .execute(move || {
                invoked_clone.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, anyhow::Error>(42) }
            })
            .await;

        // ASSERT: call admitted, error budget cleared
        assert_eq!(recovered.unwrap(), 42);
        assert_eq!(invoked.load(Ordering::SeqCst), 1);
        assert_eq!(controller.breaker_state(), BreakerState::Closed);

        let metrics = controller.metrics();
        assert_eq!(metrics.errors, 0);
        assert_eq!(metrics.total_errors, 3);
        assert_eq!(metrics.rejected_circuit_open, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_stays_open_before_timeout() {
        // ARRANGE
        let controller = controller(1, 10, 1);
        let _ = controller
            .execute(|| async { Err::<(), _>(anyhow::anyhow!("write failed")) })
            .await;

        // ACT: half the cool-down
        tokio::time::advance(Duration::from_millis(500)).await;
        let result = controller.execute(|| async { Ok::<(), anyhow::Error>(()) }).await;

        // ASSERT
        match result {
            Err(ControllerError::CircuitOpen { retry_in }) => {
                assert!(retry_in <= Duration::from_millis(500));
            }
            other => panic!("expected CircuitOpen, got {:?}", other),
        }
        assert_eq!(controller.breaker_state(), BreakerState::Open);
    }

    #[tokio::test]
    async fn test_successes_do_not_reset_error_count() {
        // ARRANGE
        let controller = controller(1, 10, 5);

        // ACT: errors interleaved with successes
        for round in 0..4 {
            let _ = controller
                .execute(move || async move {
                    if round % 2 == 0 {
                        Err(anyhow::anyhow!("flaky"))
                    } else {
                        Ok(())
                    }
                })
                .await;
        }

        // ASSERT: errors accumulate until a breaker reset
        let metrics = controller.metrics();
        assert_eq!(metrics.errors, 2);
        assert_eq!(metrics.completed, 2);
        assert_eq!(metrics.breaker, BreakerState::Closed);
    }

    // ============================================================
    // TEST 3: Dispatch
    // ============================================================

    #[tokio::test]
    async fn test_queued_operations_start_in_fifo_order() {
        // ARRANGE
        let controller = controller(1, 100, 50);
        let order = Arc::new(Mutex::new(Vec::new()));

        // ACT
        let pending: Vec<_> = (0..6)
            .map(|index| {
                let order = order.clone();
                controller.execute(move || async move {
                    order.lock().unwrap().push(index);
                    tokio::task::yield_now().await;
                    Ok::<_, anyhow::Error>(index)
                })
            })
            .collect();

        let mut results = Vec::new();
        for result in pending {
            results.push(result.await.unwrap());
        }

        // ASSERT
        assert_eq!(results, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_concurrency_cap_and_peak() {
        // ARRANGE
        let controller = controller(3, 100, 50);
        let gate = Arc::new(Semaphore::new(0));

        // ACT
        let pending: Vec<_> = (0..6)
            .map(|_| {
                let gate = gate.clone();
                controller.execute(move || async move {
                    let _permit = gate.acquire().await?;
                    Ok::<(), anyhow::Error>(())
                })
            })
            .collect();

        // ASSERT: admission already placed three in flight
        let metrics = controller.metrics();
        assert_eq!(metrics.running, 3);
        assert_eq!(metrics.queued, 3);

        gate.add_permits(6);
        for result in pending {
            assert!(result.await.is_ok());
        }

        let metrics = controller.metrics();
        assert_eq!(metrics.running, 0);
        assert_eq!(metrics.completed, 6);
        assert_eq!(metrics.peak_concurrency, 3);
    }

    #[tokio::test]
    async fn test_panicking_operation_releases_its_slot() {
        // ARRANGE
        let controller = controller(1, 10, 50);

        // ACT
        let crashed = controller
            .execute(|| async {
                if true {
                    panic!("operation blew up");
                }
                Ok::<(), anyhow::Error>(())
            })
            .await;
        let next = controller.execute(|| async { Ok::<_, anyhow::Error>("still serving") }).await;

        // ASSERT
        assert!(matches!(crashed, Err(ControllerError::Cancelled)));
        assert_eq!(next.unwrap(), "still serving");

        let metrics = controller.metrics();
        assert_eq!(metrics.running, 0);
        assert_eq!(metrics.total_errors, 1);
    }

    #[tokio::test]
    async fn test_controller_records_into_injected_collector() {
        // ARRANGE
        let collector = Arc::new(MetricsCollector::new());
        let controller = ConcurrencyController::new(ControllerConfig::default(), collector.clone());

        // ACT
        controller.execute(|| async { Ok::<(), anyhow::Error>(()) }).await.unwrap();

        // ASSERT
        assert_eq!(collector.calls("controller.execute"), 1);
    }
}
