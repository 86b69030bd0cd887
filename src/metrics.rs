//! Metrics and observability for aspire-duck-sync.
//!
//! Counters are kept in-process for run summaries and mirrored to the
//! `metrics` facade, so an installed recorder sees them too.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Metrics collector for sync operations.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Entity syncs attempted
    pub entities_total: AtomicU64,
    /// Entity syncs that completed
    pub entities_success: AtomicU64,
    /// Entity syncs that failed
    pub entities_failed: AtomicU64,
    /// Records received from the API
    pub records_fetched: AtomicU64,
    /// Rows written to the warehouse
    pub rows_written: AtomicU64,
    /// Tables replaced in the warehouse
    pub tables_written: AtomicU64,
    /// Total entity sync duration in milliseconds
    pub sync_duration_ms: AtomicU64,
    /// HTTP requests sent to the API
    pub api_requests: AtomicU64,
    /// Retry count
    pub retries: AtomicU64,
}

impl Metrics {
    /// Create new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one entity sync.
    pub fn record_entity(&self, success: bool, fetched: u64, duration_ms: u64) {
        self.entities_total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.entities_success.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("aspire_sync_entities_success_total").increment(1);
        } else {
            self.entities_failed.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("aspire_sync_entities_failed_total").increment(1);
        }
        self.records_fetched.fetch_add(fetched, Ordering::Relaxed);
        self.sync_duration_ms.fetch_add(duration_ms, Ordering::Relaxed);
        metrics::counter!("aspire_sync_records_fetched_total").increment(fetched);
        metrics::histogram!("aspire_sync_entity_duration_ms").record(duration_ms as f64);
    }

    /// Record a table replacement.
    pub fn record_table_write(&self, rows: u64) {
        self.tables_written.fetch_add(1, Ordering::Relaxed);
        self.rows_written.fetch_add(rows, Ordering::Relaxed);
        metrics::counter!("aspire_sync_rows_written_total").increment(rows);
    }

    /// Record an API request.
    pub fn record_api_request(&self) {
        self.api_requests.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("aspire_sync_api_requests_total").increment(1);
    }

    /// Record a retry.
    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("aspire_sync_retries_total").increment(1);
    }

    /// Get snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            entities_total: self.entities_total.load(Ordering::Relaxed),
            entities_success: self.entities_success.load(Ordering::Relaxed),
            entities_failed: self.entities_failed.load(Ordering::Relaxed),
            records_fetched: self.records_fetched.load(Ordering::Relaxed),
            rows_written: self.rows_written.load(Ordering::Relaxed),
            tables_written: self.tables_written.load(Ordering::Relaxed),
            sync_duration_ms: self.sync_duration_ms.load(Ordering::Relaxed),
            api_requests: self.api_requests.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }

    /// Reset all metrics.
    pub fn reset(&self) {
        for counter in [
            &self.entities_total,
            &self.entities_success,
            &self.entities_failed,
            &self.records_fetched,
            &self.rows_written,
            &self.tables_written,
            &self.sync_duration_ms,
            &self.api_requests,
            &self.retries,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Entity syncs attempted
    pub entities_total: u64,
    /// Entity syncs that completed
    pub entities_success: u64,
    /// Entity syncs that failed
    pub entities_failed: u64,
    /// Records received from the API
    pub records_fetched: u64,
    /// Rows written to the warehouse
    pub rows_written: u64,
    /// Tables replaced in the warehouse
    pub tables_written: u64,
    /// Total entity sync duration in milliseconds
    pub sync_duration_ms: u64,
    /// HTTP requests sent to the API
    pub api_requests: u64,
    /// Retry count
    pub retries: u64,
}

impl MetricsSnapshot {
    /// Calculate success rate.
    pub fn success_rate(&self) -> f64 {
        if self.entities_total == 0 {
            0.0
        } else {
            self.entities_success as f64 / self.entities_total as f64
        }
    }

    /// Calculate fetched records per second.
    pub fn records_per_second(&self) -> f64 {
        if self.sync_duration_ms == 0 {
            0.0
        } else {
            (self.records_fetched as f64 * 1000.0) / self.sync_duration_ms as f64
        }
    }
}

/// Timer for measuring operation duration.
pub struct Timer {
    start: Instant,
    label: String,
}

impl Timer {
    /// Start a new timer.
    pub fn start(label: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            label: label.into(),
        }
    }

    /// Get elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Stop timer and log duration.
    pub fn stop(self) -> u64 {
        let elapsed = self.elapsed_ms();
        tracing::debug!("{} completed in {}ms", self.label, elapsed);
        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = Metrics::new();

        metrics.record_entity(true, 100, 1000);
        metrics.record_entity(false, 0, 500);
        metrics.record_table_write(100);
        metrics.record_table_write(40);
        metrics.record_api_request();
        metrics.record_retry();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.entities_total, 2);
        assert_eq!(snapshot.entities_success, 1);
        assert_eq!(snapshot.entities_failed, 1);
        assert_eq!(snapshot.records_fetched, 100);
        assert_eq!(snapshot.rows_written, 140);
        assert_eq!(snapshot.tables_written, 2);
        assert_eq!(snapshot.api_requests, 1);
        assert_eq!(snapshot.retries, 1);

        metrics.reset();
        assert_eq!(metrics.snapshot().entities_total, 0);
    }

    #[test]
    fn test_metrics_calculations() {
        let snapshot = MetricsSnapshot {
            entities_total: 10,
            entities_success: 8,
            entities_failed: 2,
            records_fetched: 1000,
            sync_duration_ms: 5000,
            ..Default::default()
        };

        assert!((snapshot.success_rate() - 0.8).abs() < 0.001);
        assert!((snapshot.records_per_second() - 200.0).abs() < 0.001);
    }
}
