use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Atomic counters tracking broker outcomes.
///
/// All counters use relaxed ordering. For a point-in-time view, call
/// [`snapshot`](Self::snapshot).
#[derive(Debug, Default)]
pub struct BrokerMetrics {
    /// Items accepted and persisted.
    pub ingested: AtomicU64,
    /// Uploads rejected by validation.
    pub ingest_rejected: AtomicU64,
    /// Blobs removed after a failed metadata insert.
    pub ingest_rollbacks: AtomicU64,
    /// Views spent and delivered.
    pub views_granted: AtomicU64,
    /// Consume calls answered with expired.
    pub views_denied_expired: AtomicU64,
    /// Consume calls answered with not found.
    pub views_denied_not_found: AtomicU64,
    /// Views spent but not delivered.
    pub access_errors: AtomicU64,
    /// Deferred deletions scheduled.
    pub deletions_scheduled: AtomicU64,
    /// Deferred deletions that removed the blob and marked the row.
    pub deferred_deletions_completed: AtomicU64,
    /// Deferred deletions that failed and were left to the reaper.
    pub deferred_deletions_failed: AtomicU64,
    /// Reclamation sweeps run.
    pub sweeps: AtomicU64,
    /// Blobs deleted by reclamation sweeps.
    pub swept_items: AtomicU64,
    /// Sweep candidates with a blob or metadata failure.
    pub sweep_failures: AtomicU64,
    /// Uploads turned away by the rate limiter.
    pub rate_limited: AtomicU64,
}

impl BrokerMetrics {
    pub fn increment_ingested(&self) {
        self.ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_ingest_rejected(&self) {
        self.ingest_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_ingest_rollbacks(&self) {
        self.ingest_rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_views_granted(&self) {
        self.views_granted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_views_denied_expired(&self) {
        self.views_denied_expired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_views_denied_not_found(&self) {
        self.views_denied_not_found.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_access_errors(&self) {
        self.access_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_deletions_scheduled(&self) {
        self.deletions_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_deferred_deletions_completed(&self) {
        self.deferred_deletions_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_deferred_deletions_failed(&self) {
        self.deferred_deletions_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_sweeps(&self) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    /// Add `n` to the swept items counter.
    pub fn add_swept_items(&self, n: u64) {
        self.swept_items.fetch_add(n, Ordering::Relaxed);
    }

    /// Add `n` to the sweep failures counter.
    pub fn add_sweep_failures(&self, n: u64) {
        self.sweep_failures.fetch_add(n, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ingested: self.ingested.load(Ordering::Relaxed),
            ingest_rejected: self.ingest_rejected.load(Ordering::Relaxed),
            ingest_rollbacks: self.ingest_rollbacks.load(Ordering::Relaxed),
            views_granted: self.views_granted.load(Ordering::Relaxed),
            views_denied_expired: self.views_denied_expired.load(Ordering::Relaxed),
            views_denied_not_found: self.views_denied_not_found.load(Ordering::Relaxed),
            access_errors: self.access_errors.load(Ordering::Relaxed),
            deletions_scheduled: self.deletions_scheduled.load(Ordering::Relaxed),
            deferred_deletions_completed: self.deferred_deletions_completed.load(Ordering::Relaxed),
            deferred_deletions_failed: self.deferred_deletions_failed.load(Ordering::Relaxed),
            sweeps: self.sweeps.load(Ordering::Relaxed),
            swept_items: self.swept_items.load(Ordering::Relaxed),
            sweep_failures: self.sweep_failures.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of [`BrokerMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub ingested: u64,
    pub ingest_rejected: u64,
    pub ingest_rollbacks: u64,
    pub views_granted: u64,
    pub views_denied_expired: u64,
    pub views_denied_not_found: u64,
    pub access_errors: u64,
    pub deletions_scheduled: u64,
    pub deferred_deletions_completed: u64,
    pub deferred_deletions_failed: u64,
    pub sweeps: u64,
    pub swept_items: u64,
    pub sweep_failures: u64,
    pub rate_limited: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        assert_eq!(BrokerMetrics::default().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn increments_show_in_snapshot() {
        let m = BrokerMetrics::default();
        m.increment_ingested();
        m.increment_ingested();
        m.increment_views_granted();
        m.increment_rate_limited();
        m.add_swept_items(3);

        let snap = m.snapshot();
        assert_eq!(snap.ingested, 2);
        assert_eq!(snap.views_granted, 1);
        assert_eq!(snap.rate_limited, 1);
        assert_eq!(snap.swept_items, 3);
        assert_eq!(snap.access_errors, 0);
    }

    #[test]
    fn snapshot_serializes_with_field_names() {
        let m = BrokerMetrics::default();
        m.increment_sweeps();
        let json = serde_json::to_value(m.snapshot()).unwrap();
        assert_eq!(json["sweeps"], 1);
        assert_eq!(json["deferred_deletions_failed"], 0);
    }
}
