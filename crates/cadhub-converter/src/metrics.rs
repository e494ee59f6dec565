//! Per-process conversion counters and duration percentiles.
//!
//! Counters are atomics; duration samples sit behind a mutex.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use cadhub_entity::job::FailureKind;

use crate::formats::Strategy;

/// Maximum number of duration samples to keep in memory.
const MAX_DURATION_SAMPLES: usize = 1000;

/// Conversion metrics collector shared by every worker in the process.
#[derive(Debug, Default)]
pub struct ConversionMetrics {
    started: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    no_geometry: AtomicU64,
    cad_kernel_runs: AtomicU64,
    external_tool_runs: AtomicU64,
    direct_mesh_runs: AtomicU64,
    total_output_bytes: AtomicU64,
    duration_samples: Mutex<VecDeque<Duration>>,
}

impl ConversionMetrics {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a strategy started.
    pub fn record_started(&self, strategy: Strategy) {
        self.started.fetch_add(1, Ordering::Relaxed);
        let per_strategy = match strategy {
            Strategy::CadKernel => &self.cad_kernel_runs,
            Strategy::ExternalTool => &self.external_tool_runs,
            Strategy::DirectMesh => &self.direct_mesh_runs,
        };
        per_strategy.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful conversion.
    pub fn record_success(&self, duration: Duration, output_bytes: u64) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        self.total_output_bytes
            .fetch_add(output_bytes, Ordering::Relaxed);
        self.add_duration_sample(duration);
    }

    /// Record a failed conversion.
    pub fn record_failure(&self, kind: FailureKind) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        match kind {
            FailureKind::Timeout => {
                self.timed_out.fetch_add(1, Ordering::Relaxed);
            }
            FailureKind::NoGeometryFound => {
                self.no_geometry.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    /// Record an external tool run that hit its time limit.
    pub fn record_timeout(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    fn add_duration_sample(&self, duration: Duration) {
        if let Ok(mut samples) = self.duration_samples.lock() {
            if samples.len() >= MAX_DURATION_SAMPLES {
                samples.pop_front();
            }
            samples.push_back(duration);
        }
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let durations: Vec<Duration> = self
            .duration_samples
            .lock()
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();

        let (p50, p95, p99) = percentiles(&durations);

        MetricsSnapshot {
            conversions_started: self.started.load(Ordering::Relaxed),
            conversions_succeeded: self.succeeded.load(Ordering::Relaxed),
            conversions_failed: self.failed.load(Ordering::Relaxed),
            conversions_timed_out: self.timed_out.load(Ordering::Relaxed),
            no_geometry_found: self.no_geometry.load(Ordering::Relaxed),
            cad_kernel_runs: self.cad_kernel_runs.load(Ordering::Relaxed),
            external_tool_runs: self.external_tool_runs.load(Ordering::Relaxed),
            direct_mesh_runs: self.direct_mesh_runs.load(Ordering::Relaxed),
            total_output_bytes: self.total_output_bytes.load(Ordering::Relaxed),
            duration_p50_ms: p50.map(as_millis),
            duration_p95_ms: p95.map(as_millis),
            duration_p99_ms: p99.map(as_millis),
            sample_count: durations.len() as u64,
        }
    }
}

fn percentiles(durations: &[Duration]) -> (Option<Duration>, Option<Duration>, Option<Duration>) {
    if durations.is_empty() {
        return (None, None, None);
    }

    let mut sorted = durations.to_vec();
    sorted.sort();
    let len = sorted.len();

    let p50 = sorted.get(len * 50 / 100).copied();
    let p95 = sorted.get(len * 95 / 100).copied();
    let p99 = sorted.get(len.saturating_sub(1) * 99 / 100).copied();

    (p50, p95, p99)
}

fn as_millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

/// Serializable metrics snapshot, exposed by the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Strategies started.
    pub conversions_started: u64,
    /// Conversions that produced an output.
    pub conversions_succeeded: u64,
    /// Conversions that failed for any reason.
    pub conversions_failed: u64,
    /// Failures caused by a time limit.
    pub conversions_timed_out: u64,
    /// CAD documents without exportable shapes.
    pub no_geometry_found: u64,
    /// CAD kernel strategy runs.
    pub cad_kernel_runs: u64,
    /// External tool strategy runs.
    pub external_tool_runs: u64,
    /// Direct mesh strategy runs.
    pub direct_mesh_runs: u64,
    /// Bytes of `.glb` output produced.
    pub total_output_bytes: u64,
    /// P50 duration of successful conversions.
    pub duration_p50_ms: Option<u64>,
    /// P95 duration of successful conversions.
    pub duration_p95_ms: Option<u64>,
    /// P99 duration of successful conversions.
    pub duration_p99_ms: Option<u64>,
    /// Number of duration samples collected.
    pub sample_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_by_outcome_and_strategy() {
        let m = ConversionMetrics::new();
        m.record_started(Strategy::CadKernel);
        m.record_started(Strategy::DirectMesh);
        m.record_started(Strategy::DirectMesh);
        m.record_success(Duration::from_secs(2), 1000);
        m.record_failure(FailureKind::NoGeometryFound);
        m.record_failure(FailureKind::Timeout);

        let snap = m.snapshot();
        assert_eq!(snap.conversions_started, 3);
        assert_eq!(snap.cad_kernel_runs, 1);
        assert_eq!(snap.direct_mesh_runs, 2);
        assert_eq!(snap.conversions_succeeded, 1);
        assert_eq!(snap.conversions_failed, 2);
        assert_eq!(snap.conversions_timed_out, 1);
        assert_eq!(snap.no_geometry_found, 1);
        assert_eq!(snap.total_output_bytes, 1000);
    }

    #[test]
    fn test_percentiles_are_ordered() {
        let m = ConversionMetrics::new();
        for i in 1..=100 {
            m.record_success(Duration::from_millis(i * 10), 100);
        }

        let snap = m.snapshot();
        let p50 = snap.duration_p50_ms.expect("p50");
        let p95 = snap.duration_p95_ms.expect("p95");
        assert!(p95 > p50);
        assert_eq!(snap.sample_count, 100);
    }

    #[test]
    fn test_empty_percentiles() {
        let snap = ConversionMetrics::new().snapshot();
        assert!(snap.duration_p50_ms.is_none());
        assert!(snap.duration_p99_ms.is_none());
    }

    #[test]
    fn test_samples_are_bounded() {
        let m = ConversionMetrics::new();
        for _ in 0..(MAX_DURATION_SAMPLES + 10) {
            m.record_success(Duration::from_millis(1), 0);
        }
        assert_eq!(m.snapshot().sample_count, MAX_DURATION_SAMPLES as u64);
    }
}
