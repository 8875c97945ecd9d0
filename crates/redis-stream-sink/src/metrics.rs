//! Lock-free sink metrics
//!
//! Counters use `AtomicU64` with relaxed ordering on the hot path; observe
//! them through [`SinkMetrics::snapshot`].

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the delivery pipeline
#[derive(Debug, Default)]
pub struct SinkMetrics {
    /// Events accepted by the normalizer
    pub events_received: AtomicU64,
    /// Events skipped (unsupported kind or malformed)
    pub events_skipped: AtomicU64,
    /// Stream entries acknowledged by the destination
    pub records_delivered: AtomicU64,
    /// Batches fully delivered
    pub batches_delivered: AtomicU64,
    /// Batches that exhausted their retry budget
    pub batches_failed: AtomicU64,
    /// Flush retries performed
    pub retries: AtomicU64,
    /// Cumulative flush latency in microseconds (successful attempts)
    pub flush_latency_us: AtomicU64,
}

impl SinkMetrics {
    /// Create a zeroed metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture a point-in-time snapshot of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            events_skipped: self.events_skipped.load(Ordering::Relaxed),
            records_delivered: self.records_delivered.load(Ordering::Relaxed),
            batches_delivered: self.batches_delivered.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            flush_latency_us: self.flush_latency_us.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of [`SinkMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Events accepted by the normalizer
    pub events_received: u64,
    /// Events skipped (unsupported kind or malformed)
    pub events_skipped: u64,
    /// Stream entries acknowledged by the destination
    pub records_delivered: u64,
    /// Batches fully delivered
    pub batches_delivered: u64,
    /// Batches that exhausted their retry budget
    pub batches_failed: u64,
    /// Flush retries performed
    pub retries: u64,
    /// Cumulative flush latency in microseconds
    pub flush_latency_us: u64,
}

impl MetricsSnapshot {
    /// Average latency of a delivered batch in milliseconds
    pub fn avg_flush_latency_ms(&self) -> f64 {
        if self.batches_delivered == 0 {
            return 0.0;
        }
        (self.flush_latency_us as f64 / self.batches_delivered as f64) / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reads_counters() {
        let metrics = SinkMetrics::new();
        metrics.events_received.fetch_add(10, Ordering::Relaxed);
        metrics.batches_delivered.fetch_add(2, Ordering::Relaxed);
        metrics.flush_latency_us.fetch_add(4_000, Ordering::Relaxed);

        let snap = metrics.snapshot();
        assert_eq!(snap.events_received, 10);
        assert_eq!(snap.batches_delivered, 2);
        assert_eq!(snap.avg_flush_latency_ms(), 2.0);
    }

    #[test]
    fn avg_latency_handles_zero_batches() {
        assert_eq!(MetricsSnapshot::default().avg_flush_latency_ms(), 0.0);
    }
}
