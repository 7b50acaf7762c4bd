//! # Call Metrics
//!
//! Counters and a latency histogram for `execute_kw` round trips, recorded by
//! the session and readable at any time through `Session::metrics`.
//!
//! ## Design Principles
//! 1. **Accumulator Pattern**: Atomic counters aggregate events without locks.
//! 2. **Fixed Buckets**: Histogram buckets live in a contiguous array.
//! 3. **Plain Snapshots**: Readers get owned structs, never references into
//!    live counters.
//!
//! ## Notes
//! - Bucket boundaries are in milliseconds; remote calls are network bound.
//! - `Ordering::Relaxed` is enough: no reader needs cross-field consistency.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Default latency bucket boundaries in milliseconds.
pub const DEFAULT_LATENCY_BUCKETS_MS: [u64; 10] = [5, 10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000];

/// Snapshot of all call metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Calls issued.
    pub calls_total: u64,
    /// Calls answered with a remote fault.
    pub faults_total: u64,
    /// Calls that failed below the RPC layer.
    pub transport_errors_total: u64,
    /// Calls currently awaiting a response.
    pub inflight: u64,
    pub latency: LatencySnapshot,
}

/// Snapshot of the latency histogram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatencySnapshot {
    /// Bucket boundaries in milliseconds.
    pub bounds_ms: Vec<u64>,
    /// Bucket counts, including the overflow bucket at the end.
    pub buckets: Vec<u64>,
    pub samples: u64,
    pub sum_ms: u64,
}

/// How a call ended, for accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Fault,
    TransportError,
}

/// Thread-safe metrics aggregator shared by every caller of a session.
#[derive(Debug)]
pub struct CallMetrics {
    calls_total: AtomicU64,
    faults_total: AtomicU64,
    transport_errors_total: AtomicU64,
    inflight: AtomicU64,
    latency: LatencyHistogram,
}

impl Default for CallMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CallMetrics {
    /// Creates an aggregator with the default latency buckets.
    pub fn new() -> Self {
        Self::with_latency_buckets(DEFAULT_LATENCY_BUCKETS_MS.to_vec())
    }

    /// Creates an aggregator with custom, ascending millisecond buckets.
    pub fn with_latency_buckets(bounds_ms: Vec<u64>) -> Self {
        CallMetrics {
            calls_total: AtomicU64::new(0),
            faults_total: AtomicU64::new(0),
            transport_errors_total: AtomicU64::new(0),
            inflight: AtomicU64::new(0),
            latency: LatencyHistogram::new(bounds_ms),
        }
    }

    /// Records the start of a call.
    pub fn record_call_start(&self) {
        self.calls_total.fetch_add(1, Ordering::Relaxed);
        self.inflight.fetch_add(1, Ordering::Relaxed);
    }

    /// Records the end of a call with its latency and outcome.
    pub fn record_call_end(&self, latency: Duration, outcome: CallOutcome) {
        self.inflight.fetch_sub(1, Ordering::Relaxed);
        self.latency.record(latency);
        match outcome {
            CallOutcome::Success => {}
            CallOutcome::Fault => {
                self.faults_total.fetch_add(1, Ordering::Relaxed);
            }
            CallOutcome::TransportError => {
                self.transport_errors_total.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            calls_total: self.calls_total.load(Ordering::Relaxed),
            faults_total: self.faults_total.load(Ordering::Relaxed),
            transport_errors_total: self.transport_errors_total.load(Ordering::Relaxed),
            inflight: self.inflight.load(Ordering::Relaxed),
            latency: self.latency.snapshot(),
        }
    }
}

/// Fixed-bucket latency histogram.
///
/// Linear bucket scan; the list is short and stays hot in cache.
#[derive(Debug)]
pub struct LatencyHistogram {
    bounds_ms: Vec<u64>,
    buckets: Vec<AtomicU64>,
    sum_ms: AtomicU64,
    samples: AtomicU64,
}

impl LatencyHistogram {
    /// Creates a histogram with `bounds_ms.len() + 1` buckets (last is overflow).
    pub fn new(bounds_ms: Vec<u64>) -> Self {
        let buckets = (0..=bounds_ms.len()).map(|_| AtomicU64::new(0)).collect();
        LatencyHistogram {
            bounds_ms,
            buckets,
            sum_ms: AtomicU64::new(0),
            samples: AtomicU64::new(0),
        }
    }

    /// Adds one sample to the first bucket whose bound is >= the latency.
    pub fn record(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.samples.fetch_add(1, Ordering::Relaxed);
        self.sum_ms.fetch_add(millis, Ordering::Relaxed);

        let idx = self
            .bounds_ms
            .iter()
            .position(|bound| millis <= *bound)
            .unwrap_or(self.bounds_ms.len());
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LatencySnapshot {
        LatencySnapshot {
            bounds_ms: self.bounds_ms.clone(),
            buckets: self
                .buckets
                .iter()
                .map(|bucket| bucket.load(Ordering::Relaxed))
                .collect(),
            samples: self.samples.load(Ordering::Relaxed),
            sum_ms: self.sum_ms.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histogram_buckets_and_overflow() {
        let histogram = LatencyHistogram::new(vec![10, 100]);
        histogram.record(Duration::from_millis(3));
        histogram.record(Duration::from_millis(10));
        histogram.record(Duration::from_millis(50));
        histogram.record(Duration::from_secs(2));

        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.buckets, vec![2, 1, 1]);
        assert_eq!(snapshot.samples, 4);
        assert_eq!(snapshot.sum_ms, 3 + 10 + 50 + 2_000);
    }

    #[test]
    fn call_outcomes_are_counted() {
        let metrics = CallMetrics::new();
        metrics.record_call_start();
        metrics.record_call_start();
        metrics.record_call_start();
        assert_eq!(metrics.snapshot().inflight, 3);

        metrics.record_call_end(Duration::from_millis(1), CallOutcome::Success);
        metrics.record_call_end(Duration::from_millis(1), CallOutcome::Fault);
        metrics.record_call_end(Duration::from_millis(1), CallOutcome::TransportError);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.calls_total, 3);
        assert_eq!(snapshot.faults_total, 1);
        assert_eq!(snapshot.transport_errors_total, 1);
        assert_eq!(snapshot.inflight, 0);
        assert_eq!(snapshot.latency.samples, 3);
    }
}
