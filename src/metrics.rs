use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::ErrorKind;

/// One record per executed (or failed) unit, consumed by the harness.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitEvent {
    pub task_name: String,
    pub unit_index: usize,
    pub success: bool,
    pub latency: Duration,
    pub error_kind: Option<ErrorKind>,
}

/// Receiver of unit events. The engine emits; it never aggregates.
#[async_trait]
pub trait EventSink: Send + Sync + 'static {
    async fn record(&self, event: UnitEvent);
}

/// Sink that only logs each event at debug level.
#[derive(Debug, Default, Clone)]
pub struct TracingSink;

#[async_trait]
impl EventSink for TracingSink {
    async fn record(&self, event: UnitEvent) {
        tracing::debug!(
            task = %event.task_name,
            unit = event.unit_index,
            success = event.success,
            latency_us = event.latency.as_micros() as u64,
            error_kind = ?event.error_kind,
            "unit completed"
        );
    }
}

#[derive(Default, Clone)]
struct TaskStats {
    latencies: Vec<Duration>,
    failures: BTreeMap<String, u64>,
}

/// Latency and failure counts per task.
#[derive(Default, Clone)]
pub struct Metrics {
    tasks: BTreeMap<String, TaskStats>,
}

/// Shared [`Metrics`] collector usable as an [`EventSink`].
#[derive(Default, Clone)]
pub struct ConcurrentMetrics {
    metrics: Arc<Mutex<Metrics>>,
}

impl ConcurrentMetrics {
    pub async fn get_metrics(&self) -> Metrics {
        self.metrics.lock().await.clone()
    }
}

#[async_trait]
impl EventSink for ConcurrentMetrics {
    async fn record(&self, event: UnitEvent) {
        self.metrics.lock().await.record(&event);
    }
}

impl Metrics {
    pub fn record(&mut self, event: &UnitEvent) {
        let stats = self.tasks.entry(event.task_name.clone()).or_default();
        if event.success {
            stats.latencies.push(event.latency);
        } else {
            let kind = event
                .error_kind
                .map(|k| k.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            *stats.failures.entry(kind).or_default() += 1;
        }
    }

    pub fn succeeded(&self, task: &str) -> usize {
        self.tasks.get(task).map_or(0, |s| s.latencies.len())
    }

    pub fn failed(&self, task: &str) -> u64 {
        self.tasks
            .get(task)
            .map_or(0, |s| s.failures.values().sum())
    }

    pub fn total_units(&self) -> u64 {
        self.tasks
            .values()
            .map(|s| s.latencies.len() as u64 + s.failures.values().sum::<u64>())
            .sum()
    }

    fn format_duration(nanos: f64) -> String {
        if nanos < 1_000.0 {
            format!("{:.2} ns", nanos)
        } else if nanos < 1_000_000.0 {
            format!("{:.2} µs", nanos / 1_000.0)
        } else if nanos < 1_000_000_000.0 {
            format!("{:.2} ms", nanos / 1_000_000.0)
        } else {
            format!("{:.2} s", nanos / 1_000_000_000.0)
        }
    }

    /// `(min, max, p50, p95, p99)` of the successful latencies.
    fn calculate_stats(latencies: &[Duration]) -> Option<[String; 5]> {
        if latencies.is_empty() {
            return None;
        }

        let mut sorted: Vec<_> = latencies.to_vec();
        sorted.sort_unstable();

        let last = (sorted.len() - 1) as u64;
        let at = |pct: u64| sorted[(last * pct / 100) as usize].as_nanos() as f64;

        Some([
            Self::format_duration(sorted[0].as_nanos() as f64),
            Self::format_duration(sorted[sorted.len() - 1].as_nanos() as f64),
            Self::format_duration(at(50)),
            Self::format_duration(at(95)),
            Self::format_duration(at(99)),
        ])
    }
}

impl Display for Metrics {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\nDetailed Latency Statistics:")?;
        writeln!(
            f,
            "{:<24} {:<10} {:<10} {:<12} {:<12} {:<12} {:<12} {:<12}",
            "Task", "Count", "Failed", "Min", "Max", "Median", "P95", "P99"
        )?;
        writeln!(f, "{:-<110}", "")?;

        for (task, stats) in &self.tasks {
            let failed: u64 = stats.failures.values().sum();
            let [min, max, p50, p95, p99] = Self::calculate_stats(&stats.latencies)
                .unwrap_or_else(|| std::array::from_fn(|_| "N/A".to_string()));
            writeln!(
                f,
                "{:<24} {:<10} {:<10} {:<12} {:<12} {:<12} {:<12} {:<12}",
                task,
                stats.latencies.len(),
                failed,
                min,
                max,
                p50,
                p95,
                p99
            )?;
            for (kind, count) in &stats.failures {
                writeln!(f, "  {:<22} {} failures", kind, count)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(task: &str, success: bool) -> UnitEvent {
        UnitEvent {
            task_name: task.to_string(),
            unit_index: 0,
            success,
            latency: Duration::from_micros(150),
            error_kind: (!success).then_some(ErrorKind::Timeout),
        }
    }

    #[tokio::test]
    async fn concurrent_metrics_counts_per_task() {
        let metrics = ConcurrentMetrics::default();
        metrics.record(event("read", true)).await;
        metrics.record(event("read", false)).await;
        metrics.record(event("write", true)).await;

        let snapshot = metrics.get_metrics().await;
        assert_eq!(snapshot.succeeded("read"), 1);
        assert_eq!(snapshot.failed("read"), 1);
        assert_eq!(snapshot.succeeded("write"), 1);
        assert_eq!(snapshot.total_units(), 3);

        let table = snapshot.to_string();
        assert!(table.contains("read"));
        assert!(table.contains("timeout"));
    }

    #[test]
    fn stats_for_single_sample() {
        let stats = Metrics::calculate_stats(&[Duration::from_millis(2)]).unwrap();
        assert!(stats.iter().all(|s| s == "2.00 ms"));
        assert!(Metrics::calculate_stats(&[]).is_none());
    }
}
