//! Process-wide bridge counters.
//!
//! Updated via atomic add from every pipeline; read as a consistent-enough
//! snapshot by the metrics endpoint. These counters and the exclusion
//! engine's tables are the only process-wide mutable state.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter set shared by all pipelines.
#[derive(Debug, Default)]
pub struct BridgeMetrics {
    messages_sent: AtomicU64,
    messages_failed: AtomicU64,
    messages_excluded: AtomicU64,
    records_stored: AtomicU64,
    store_failures: AtomicU64,
    store_tasks_dropped: AtomicU64,
    transformations_succeeded: AtomicU64,
    transformations_failed: AtomicU64,
    transformation_retries: AtomicU64,
    dead_lettered: AtomicU64,
    dlq_received: AtomicU64,
}

impl BridgeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_failure(&self) {
        self.messages_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_excluded(&self) {
        self.messages_excluded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stored(&self) {
        self.records_stored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_failure(&self) {
        self.store_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_dropped(&self) {
        self.store_tasks_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transformation_success(&self) {
        self.transformations_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transformation_failure(&self) {
        self.transformations_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transformation_retry(&self) {
        self.transformation_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dead_letter(&self) {
        self.dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dlq_received(&self) {
        self.dlq_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time view for the metrics endpoint.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_failed: self.messages_failed.load(Ordering::Relaxed),
            messages_excluded: self.messages_excluded.load(Ordering::Relaxed),
            records_stored: self.records_stored.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            store_tasks_dropped: self.store_tasks_dropped.load(Ordering::Relaxed),
            transformations_succeeded: self.transformations_succeeded.load(Ordering::Relaxed),
            transformations_failed: self.transformations_failed.load(Ordering::Relaxed),
            transformation_retries: self.transformation_retries.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            dlq_received: self.dlq_received.load(Ordering::Relaxed),
        }
    }
}

/// Serialisable counter snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub messages_sent: u64,
    pub messages_failed: u64,
    pub messages_excluded: u64,
    pub records_stored: u64,
    pub store_failures: u64,
    pub store_tasks_dropped: u64,
    pub transformations_succeeded: u64,
    pub transformations_failed: u64,
    pub transformation_retries: u64,
    pub dead_lettered: u64,
    pub dlq_received: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = BridgeMetrics::new();
        metrics.record_sent();
        metrics.record_sent();
        metrics.record_excluded();
        metrics.record_store_dropped();

        let snap = metrics.snapshot();
        assert_eq!(snap.messages_sent, 2);
        assert_eq!(snap.messages_excluded, 1);
        assert_eq!(snap.store_tasks_dropped, 1);
        assert_eq!(snap.messages_failed, 0);
    }
}
