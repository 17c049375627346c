//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//!
//! NOTE: All atomics use Relaxed ordering intentionally—these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
pub const METRICS_BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
pub const METRICS_NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    METRICS_BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Estimate a percentile from cumulative bucket counts.
///
/// Returns the upper bound of the bucket containing the percentile rank
/// (the last bound for the overflow bucket).
fn percentile_from_buckets(buckets: &[u64; METRICS_NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }
    let rank = ((total as f64) * percentile).ceil() as u64;
    let mut seen = 0u64;
    for (i, &count) in buckets.iter().enumerate() {
        seen += count;
        if seen >= rank {
            return if i < METRICS_BUCKET_BOUNDS.len() {
                METRICS_BUCKET_BOUNDS[i]
            } else {
                // Overflow bucket - report the largest bound we track
                METRICS_BUCKET_BOUNDS[METRICS_BUCKET_BOUNDS.len() - 1]
            };
        }
    }
    METRICS_BUCKET_BOUNDS[METRICS_BUCKET_BOUNDS.len() - 1]
}

/// Metrics collector for the reconciliation service
#[derive(Debug, Default)]
pub struct Metrics {
    detections_total: AtomicU64,
    entries_total: AtomicU64,
    exits_total: AtomicU64,
    duplicate_entries_total: AtomicU64,
    exits_corrected_total: AtomicU64,
    exits_ignored_total: AtomicU64,
    errors_total: AtomicU64,
    /// Occupancy flags force-reset by the engine during event handling
    flags_corrected_total: AtomicU64,
    audit_runs_total: AtomicU64,
    audit_corrections_total: AtomicU64,
    notify_published_total: AtomicU64,
    notify_dropped_total: AtomicU64,
    lat_buckets: [AtomicU64; METRICS_NUM_BUCKETS],
    lat_sum_us: AtomicU64,
    lat_max_us: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one processed detection event and its handling latency
    pub fn record_detection(&self, latency_us: u64) {
        self.detections_total.fetch_add(1, Ordering::Relaxed);
        self.lat_buckets[bucket_index(latency_us)].fetch_add(1, Ordering::Relaxed);
        self.lat_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        update_atomic_max(&self.lat_max_us, latency_us);
    }

    pub fn record_entry(&self) {
        self.entries_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_exit(&self) {
        self.exits_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate_entry(&self) {
        self.duplicate_entries_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_exit_corrected(&self) {
        self.exits_corrected_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_exit_ignored(&self) {
        self.exits_ignored_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flag_corrected(&self) {
        self.flags_corrected_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_audit(&self, corrections: u64) {
        self.audit_runs_total.fetch_add(1, Ordering::Relaxed);
        self.audit_corrections_total.fetch_add(corrections, Ordering::Relaxed);
    }

    pub fn record_notify_published(&self) {
        self.notify_published_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_notify_dropped(&self) {
        self.notify_dropped_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot all counters into a reportable summary
    pub fn report(&self) -> MetricsSummary {
        let mut lat_buckets = [0u64; METRICS_NUM_BUCKETS];
        for (i, bucket) in self.lat_buckets.iter().enumerate() {
            lat_buckets[i] = bucket.load(Ordering::Relaxed);
        }
        let lat_count: u64 = lat_buckets.iter().sum();
        let lat_sum_us = self.lat_sum_us.load(Ordering::Relaxed);

        MetricsSummary {
            detections_total: self.detections_total.load(Ordering::Relaxed),
            entries_total: self.entries_total.load(Ordering::Relaxed),
            exits_total: self.exits_total.load(Ordering::Relaxed),
            duplicate_entries_total: self.duplicate_entries_total.load(Ordering::Relaxed),
            exits_corrected_total: self.exits_corrected_total.load(Ordering::Relaxed),
            exits_ignored_total: self.exits_ignored_total.load(Ordering::Relaxed),
            errors_total: self.errors_total.load(Ordering::Relaxed),
            flags_corrected_total: self.flags_corrected_total.load(Ordering::Relaxed),
            audit_runs_total: self.audit_runs_total.load(Ordering::Relaxed),
            audit_corrections_total: self.audit_corrections_total.load(Ordering::Relaxed),
            notify_published_total: self.notify_published_total.load(Ordering::Relaxed),
            notify_dropped_total: self.notify_dropped_total.load(Ordering::Relaxed),
            lat_avg_us: if lat_count > 0 { lat_sum_us / lat_count } else { 0 },
            lat_p50_us: percentile_from_buckets(&lat_buckets, 0.50),
            lat_p95_us: percentile_from_buckets(&lat_buckets, 0.95),
            lat_p99_us: percentile_from_buckets(&lat_buckets, 0.99),
            lat_max_us: self.lat_max_us.load(Ordering::Relaxed),
            lat_buckets,
        }
    }
}

/// Point-in-time snapshot of all metrics
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub detections_total: u64,
    pub entries_total: u64,
    pub exits_total: u64,
    pub duplicate_entries_total: u64,
    pub exits_corrected_total: u64,
    pub exits_ignored_total: u64,
    pub errors_total: u64,
    pub flags_corrected_total: u64,
    pub audit_runs_total: u64,
    pub audit_corrections_total: u64,
    pub notify_published_total: u64,
    pub notify_dropped_total: u64,
    pub lat_avg_us: u64,
    pub lat_p50_us: u64,
    pub lat_p95_us: u64,
    pub lat_p99_us: u64,
    pub lat_max_us: u64,
    pub lat_buckets: [u64; METRICS_NUM_BUCKETS],
}

impl MetricsSummary {
    /// Log the summary as a single structured event
    pub fn log(&self) {
        info!(
            detections = %self.detections_total,
            entries = %self.entries_total,
            exits = %self.exits_total,
            duplicates = %self.duplicate_entries_total,
            exits_corrected = %self.exits_corrected_total,
            exits_ignored = %self.exits_ignored_total,
            errors = %self.errors_total,
            flags_corrected = %self.flags_corrected_total,
            audit_runs = %self.audit_runs_total,
            audit_corrections = %self.audit_corrections_total,
            notify_published = %self.notify_published_total,
            notify_dropped = %self.notify_dropped_total,
            lat_avg_us = %self.lat_avg_us,
            lat_p95_us = %self.lat_p95_us,
            lat_max_us = %self.lat_max_us,
            "metrics_summary"
        );
    }
}
