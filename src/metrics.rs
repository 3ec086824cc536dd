//! Operation Metrics
//!
//! An explicit collector handed (as `Arc<MetricsCollector>`) to the components
//! that want their timings recorded. Nothing here is process-global: two engines
//! with two collectors never see each other's samples.
//!
//! Lifecycle: `record*` while running, `report()` to export, `reset()` to start
//! a fresh measurement window.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct OperationSamples {
    durations_ms: Vec<f64>,
    failures: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationReport {
    pub operation: String,
    pub total_calls: usize,
    pub failures: u64,
    pub avg_ms: f64,
    pub median_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsReport {
    pub uptime_ms: u64,
    pub operations: BTreeMap<String, OperationReport>,
    /// Rejections by error code: business rules, SYSTEM_ERROR and admission.
    pub rejections: BTreeMap<String, u64>,
    pub total_calls: usize,
    pub total_failures: u64,
    pub total_rejections: u64,
    /// Failures as a percentage of all recorded calls.
    pub error_rate: f64,
}

pub struct MetricsCollector {
    started: Mutex<Instant>,
    operations: DashMap<String, OperationSamples>,
    rejections: DashMap<String, u64>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            started: Mutex::new(Instant::now()),
            operations: DashMap::new(),
            rejections: DashMap::new(),
        }
    }

    pub fn record(&self, operation: &str, duration: Duration, succeeded: bool) {
        let mut samples = self.operations.entry(operation.to_string()).or_default();
        samples.durations_ms.push(duration.as_secs_f64() * 1000.0);
        if !succeeded {
            samples.failures += 1;
        }
    }

    pub fn record_rejection(&self, code: &str) {
        *self.rejections.entry(code.to_string()).or_insert(0) += 1;
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.operations
            .get(operation)
            .map(|samples| samples.durations_ms.len())
            .unwrap_or(0)
    }

    pub fn rejections(&self, code: &str) -> u64 {
        self.rejections.get(code).map(|count| *count).unwrap_or(0)
    }

    pub fn report(&self) -> MetricsReport {
        let uptime_ms = self
            .started
            .lock()
            .map(|started| started.elapsed().as_millis() as u64)
            .unwrap_or(0);

        let mut operations = BTreeMap::new();
        let mut total_calls = 0;
        let mut total_failures = 0;

        for entry in self.operations.iter() {
            let samples = entry.value();
            total_calls += samples.durations_ms.len();
            total_failures += samples.failures;
            if let Some(report) = summarize(entry.key(), samples) {
                operations.insert(entry.key().clone(), report);
            }
        }

        let rejections: BTreeMap<String, u64> = self
            .rejections
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        let total_rejections = rejections.values().sum();

        let error_rate = if total_calls > 0 {
            round2(total_failures as f64 / total_calls as f64 * 100.0)
        } else {
            0.0
        };

        MetricsReport {
            uptime_ms,
            operations,
            rejections,
            total_calls,
            total_failures,
            total_rejections,
            error_rate,
        }
    }

    pub fn reset(&self) {
        self.operations.clear();
        self.rejections.clear();
        if let Ok(mut started) = self.started.lock() {
            *started = Instant::now();
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn summarize(operation: &str, samples: &OperationSamples) -> Option<OperationReport> {
    if samples.durations_ms.is_empty() {
        return None;
    }

    let mut sorted = samples.durations_ms.clone();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    let at = |quantile: f64| sorted[((n as f64 * quantile) as usize).min(n - 1)];

    Some(OperationReport {
        operation: operation.to_string(),
        total_calls: n,
        failures: samples.failures,
        avg_ms: round2(sorted.iter().sum::<f64>() / n as f64),
        median_ms: round2(sorted[n / 2]),
        min_ms: round2(sorted[0]),
        max_ms: round2(sorted[n - 1]),
        p95_ms: round2(at(0.95)),
        p99_ms: round2(at(0.99)),
    })
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_percentiles() {
        let metrics = MetricsCollector::new();
        for ms in 1..=100 {
            metrics.record("transfer", Duration::from_millis(ms), true);
        }

        let report = metrics.report();
        let transfer = &report.operations["transfer"];

        assert_eq!(transfer.total_calls, 100);
        assert_eq!(transfer.min_ms, 1.0);
        assert_eq!(transfer.max_ms, 100.0);
        assert_eq!(transfer.median_ms, 51.0);
        assert_eq!(transfer.p95_ms, 96.0);
        assert_eq!(transfer.p99_ms, 100.0);
        assert_eq!(transfer.avg_ms, 50.5);
    }

    #[test]
    fn test_error_rate_and_rejections() {
        let metrics = MetricsCollector::new();
        metrics.record("save", Duration::from_millis(2), true);
        metrics.record("save", Duration::from_millis(2), true);
        metrics.record("save", Duration::from_millis(2), true);
        metrics.record("save", Duration::from_millis(2), false);
        metrics.record_rejection("INVALID_FORMATION");
        metrics.record_rejection("INVALID_FORMATION");

        let report = metrics.report();

        assert_eq!(report.total_calls, 4);
        assert_eq!(report.total_failures, 1);
        assert_eq!(report.error_rate, 25.0);
        assert_eq!(report.rejections["INVALID_FORMATION"], 2);
        assert_eq!(report.total_rejections, 2);
    }

    #[test]
    fn test_reset_clears_everything() {
        let metrics = MetricsCollector::new();
        metrics.record("transfer", Duration::from_millis(5), false);
        metrics.record_rejection("BUDGET_EXCEEDED");

        metrics.reset();
        let report = metrics.report();

        assert!(report.operations.is_empty());
        assert!(report.rejections.is_empty());
        assert_eq!(report.error_rate, 0.0);
    }

    #[test]
    fn test_collectors_are_independent() {
        let first = MetricsCollector::new();
        let second = MetricsCollector::new();

        first.record("transfer", Duration::from_millis(1), true);

        assert_eq!(first.calls("transfer"), 1);
        assert_eq!(second.calls("transfer"), 0);
    }
}
