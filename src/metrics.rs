use crate::error::ComputeError;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// The fixed percentile ranks reported in a [`MetricsSnapshot`].
pub const SNAPSHOT_RANKS: [f64; 4] = [50.0, 95.0, 99.0, 99.9];

/// Latency percentiles, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub p999: f64,
}

/// Summary statistics for one completed run. Built exactly once, after the
/// join barrier (or cancellation) resolves, and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub failed_requests: u64,
    /// `failed / total`, exactly 0.0 when no requests were attempted.
    pub error_rate: f64,
    /// Maximum latency observed, in seconds. Zero when no response was
    /// received at all.
    pub max_latency: f64,
    pub percentiles: Percentiles,
}

#[derive(Default)]
struct Inner {
    latencies: Vec<Duration>,
    total_requests: u64,
    failed_requests: u64,
}

/// Thread-safe accumulator of per-request outcomes.
///
/// The full latency sample set is retained for the duration of a run so that
/// percentiles can be interpolated exactly; it is bounded by the run's total
/// request count, which is caller-controlled.
#[derive(Default)]
pub struct LatencyAggregator {
    inner: Mutex<Inner>,
}

impl LatencyAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a request that received an HTTP response (of any status).
    /// Increments the total count and appends the latency sample together,
    /// under one lock.
    pub fn record_latency(&self, latency: Duration) {
        let mut inner = self.lock();
        inner.total_requests += 1;
        inner.latencies.push(latency);
    }

    /// Records a request that failed before a response was received
    /// (transport error or token-acquisition failure). No latency sample is
    /// taken; total and failed counts increment atomically.
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.total_requests += 1;
        inner.failed_requests += 1;
    }

    pub fn total_requests(&self) -> u64 {
        self.lock().total_requests
    }

    pub fn failed_requests(&self) -> u64 {
        self.lock().failed_requests
    }

    pub fn sample_count(&self) -> usize {
        self.lock().latencies.len()
    }

    /// `failed / total`; defined as 0.0 when nothing was attempted.
    pub fn error_rate(&self) -> f64 {
        let inner = self.lock();
        if inner.total_requests == 0 {
            return 0.0;
        }
        inner.failed_requests as f64 / inner.total_requests as f64
    }

    /// Maximum recorded latency, or zero when no sample exists.
    pub fn max_latency(&self) -> Duration {
        self.lock().latencies.iter().copied().max().unwrap_or_default()
    }

    /// Percentile of the recorded latency set by linear interpolation
    /// between the closest ranks. An empty sample set yields zero rather
    /// than an error, so a run cancelled before any response still produces
    /// an all-zero snapshot.
    pub fn percentile(&self, rank: f64) -> Result<Duration, ComputeError> {
        let mut samples: Vec<f64> = self
            .lock()
            .latencies
            .iter()
            .map(|l| l.as_secs_f64())
            .collect();
        samples.sort_by(|a, b| a.total_cmp(b));
        percentile_of_sorted(&samples, rank).map(Duration::from_secs_f64)
    }

    /// Derives the final [`MetricsSnapshot`]. Idempotent and side-effect
    /// free: repeated calls return consistent results as long as no further
    /// outcomes are recorded in between.
    pub fn snapshot(&self) -> Result<MetricsSnapshot, ComputeError> {
        let inner = self.lock();

        let mut samples: Vec<f64> = inner.latencies.iter().map(|l| l.as_secs_f64()).collect();
        samples.sort_by(|a, b| a.total_cmp(b));

        let mut ranks = [0.0f64; SNAPSHOT_RANKS.len()];
        for (slot, rank) in ranks.iter_mut().zip(SNAPSHOT_RANKS) {
            *slot = percentile_of_sorted(&samples, rank)?;
        }

        let error_rate = if inner.total_requests == 0 {
            0.0
        } else {
            inner.failed_requests as f64 / inner.total_requests as f64
        };

        Ok(MetricsSnapshot {
            total_requests: inner.total_requests,
            failed_requests: inner.failed_requests,
            error_rate,
            max_latency: samples.last().copied().unwrap_or(0.0),
            percentiles: Percentiles {
                p50: ranks[0],
                p95: ranks[1],
                p99: ranks[2],
                p999: ranks[3],
            },
        })
    }
}

/// Linear-interpolation percentile over an ascending-sorted sample set.
/// Returns zero for an empty set; rejects ranks outside 0-100.
fn percentile_of_sorted(sorted: &[f64], rank: f64) -> Result<f64, ComputeError> {
    if !(0.0..=100.0).contains(&rank) {
        return Err(ComputeError::InvalidRank(rank));
    }
    match sorted {
        [] => Ok(0.0),
        [only] => Ok(*only),
        _ => {
            let position = rank / 100.0 * (sorted.len() - 1) as f64;
            let lower = position.floor() as usize;
            let upper = position.ceil() as usize;
            let fraction = position - lower as f64;
            Ok(sorted[lower] + fraction * (sorted[upper] - sorted[lower]))
        }
    }
}
