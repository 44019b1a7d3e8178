//! Metrics collection for scan execution.

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics observed over one coordinator's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanMetrics {
    /// Waves executed.
    pub waves: u64,

    /// Per-range scans dispatched across all waves.
    pub ranges_scanned: u64,

    /// Rows received from replicas before deduplication.
    pub rows_merged: u64,

    /// Rows returned to callers after truncation.
    pub rows_returned: u64,

    /// Read-repair writes scheduled.
    pub repairs_scheduled: u64,

    /// Read-repair writes that failed or timed out.
    pub repair_failures: u64,
}

/// Thread-safe collector behind [`ScanMetrics`].
#[derive(Debug, Default)]
pub struct ScanMetricsCollector {
    waves: AtomicU64,
    ranges_scanned: AtomicU64,
    rows_merged: AtomicU64,
    rows_returned: AtomicU64,
    repairs_scheduled: AtomicU64,
    repair_failures: AtomicU64,
}

impl ScanMetricsCollector {
    /// Create a collector with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one executed wave and the ranges it scanned.
    pub fn record_wave(&self, ranges: u64, rows_merged: u64) {
        self.waves.fetch_add(1, Ordering::Relaxed);
        self.ranges_scanned.fetch_add(ranges, Ordering::Relaxed);
        self.rows_merged.fetch_add(rows_merged, Ordering::Relaxed);
    }

    /// Record rows returned to the caller.
    pub fn record_returned(&self, rows: u64) {
        self.rows_returned.fetch_add(rows, Ordering::Relaxed);
    }

    /// Record scheduled repair writes.
    pub fn record_repairs(&self, count: u64) {
        self.repairs_scheduled.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a failed or timed out repair write.
    pub fn record_repair_failure(&self) {
        self.repair_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot the current counters.
    pub fn snapshot(&self) -> ScanMetrics {
        ScanMetrics {
            waves: self.waves.load(Ordering::Relaxed),
            ranges_scanned: self.ranges_scanned.load(Ordering::Relaxed),
            rows_merged: self.rows_merged.load(Ordering::Relaxed),
            rows_returned: self.rows_returned.load(Ordering::Relaxed),
            repairs_scheduled: self.repairs_scheduled.load(Ordering::Relaxed),
            repair_failures: self.repair_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let collector = ScanMetricsCollector::new();
        collector.record_wave(4, 12);
        collector.record_wave(2, 3);
        collector.record_repairs(1);
        collector.record_repair_failure();
        collector.record_returned(10);

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.waves, 2);
        assert_eq!(snapshot.ranges_scanned, 6);
        assert_eq!(snapshot.rows_merged, 15);
        assert_eq!(snapshot.rows_returned, 10);
        assert_eq!(snapshot.repairs_scheduled, 1);
        assert_eq!(snapshot.repair_failures, 1);
    }
}
