use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use ephemera_blob::BlobStore;
use ephemera_core::ItemId;
use ephemera_store::MetadataStore;

use crate::metrics::BrokerMetrics;

/// Runs "wait, then delete" jobs for items whose last view was just spent.
///
/// At most one job per item is pending at a time. Jobs are not durable: a
/// restart drops them and the [`Reaper`](crate::Reaper) picks the items up
/// on its next pass.
#[derive(Clone)]
pub struct DeletionScheduler {
    store: Arc<dyn MetadataStore>,
    blobs: Arc<dyn BlobStore>,
    metrics: Arc<BrokerMetrics>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    pending: Arc<DashMap<ItemId, ()>>,
}

impl DeletionScheduler {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        blobs: Arc<dyn BlobStore>,
        metrics: Arc<BrokerMetrics>,
    ) -> Self {
        Self {
            store,
            blobs,
            metrics,
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
            pending: Arc::new(DashMap::new()),
        }
    }

    /// Number of jobs waiting or running.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Delete `blob_path` after `delay`, then mark the item removed.
    ///
    /// Returns `false` without scheduling if a job for `id` is already
    /// pending or the scheduler is shutting down.
    pub fn schedule(&self, id: ItemId, blob_path: String, delay: Duration) -> bool {
        if self.tracker.is_closed() || self.pending.insert(id, ()).is_some() {
            return false;
        }
        self.metrics.increment_deletions_scheduled();
        debug!(item_id = %id, delay_secs = delay.as_secs(), "deferred deletion scheduled");

        let this = self.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                biased;
                () = tokio::time::sleep(delay) => this.run(id, &blob_path).await,
                () = this.cancel.cancelled() => {
                    debug!(item_id = %id, "deferred deletion cancelled by shutdown");
                }
            }
            this.pending.remove(&id);
        });
        true
    }

    async fn run(&self, id: ItemId, blob_path: &str) {
        if let Err(e) = self.blobs.remove(blob_path).await {
            self.metrics.increment_deferred_deletions_failed();
            warn!(item_id = %id, error = %e, "deferred blob deletion failed; leaving to reaper");
            return;
        }

        match self.store.mark_removed(&id).await {
            Ok(_) => {
                self.metrics.increment_deferred_deletions_completed();
                info!(item_id = %id, "deferred deletion complete");
            }
            Err(e) => {
                self.metrics.increment_deferred_deletions_failed();
                warn!(item_id = %id, error = %e, "blob deleted but metadata update failed");
            }
        }
    }

    /// Stop accepting jobs, cancel those still waiting, and wait up to
    /// `timeout` for in-flight deletions.
    ///
    /// Returns `true` if everything finished in time.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.tracker.close();
        self.cancel.cancel();
        let drained = tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .is_ok();
        if drained {
            info!("deletion scheduler shut down");
        } else {
            warn!(pending = self.pending(), "deletion scheduler shutdown timed out");
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use chrono::Utc;
    use ephemera_blob::{MemoryBlobStore, UrlSigner};
    use ephemera_core::NewItem;
    use ephemera_store_memory::MemoryMetadataStore;

    use super::*;

    struct Fixture {
        store: Arc<MemoryMetadataStore>,
        blobs: Arc<MemoryBlobStore>,
        metrics: Arc<BrokerMetrics>,
        scheduler: DeletionScheduler,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryMetadataStore::new());
        let signer = UrlSigner::new(vec![9u8; 32], "http://localhost").unwrap();
        let blobs = Arc::new(MemoryBlobStore::new(signer));
        let metrics = Arc::new(BrokerMetrics::default());
        let scheduler = DeletionScheduler::new(
            Arc::clone(&store) as Arc<dyn MetadataStore>,
            Arc::clone(&blobs) as Arc<dyn BlobStore>,
            Arc::clone(&metrics),
        );
        Fixture {
            store,
            blobs,
            metrics,
            scheduler,
        }
    }

    async fn seed(f: &Fixture) -> (ItemId, String) {
        let id = ItemId::new();
        let path = format!("{id}/a.png");
        f.blobs
            .put(&path, Bytes::from_static(b"x"), "image/png")
            .await
            .unwrap();
        f.store
            .insert(&NewItem {
                id,
                name: "a.png".into(),
                content_type: "image/png".into(),
                blob_path: path.clone(),
                expiry_at: None,
                max_views: Some(1),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        (id, path)
    }

    #[tokio::test(start_paused = true)]
    async fn deletes_after_delay_and_marks_removed() {
        let f = fixture();
        let (id, path) = seed(&f).await;

        assert!(f.scheduler.schedule(id, path.clone(), Duration::from_secs(305)));

        tokio::time::advance(Duration::from_secs(304)).await;
        tokio::task::yield_now().await;
        assert!(f.blobs.contains(&path), "blob must survive until the delay elapses");

        tokio::time::advance(Duration::from_secs(2)).await;
        f.scheduler.shutdown(Duration::from_secs(5)).await;

        assert!(!f.blobs.contains(&path));
        let item = f.store.get(&id).await.unwrap().unwrap();
        assert!(item.is_removed);
        assert!(item.blob_path.is_none());
        assert!(!item.is_active);

        let snap = f.metrics.snapshot();
        assert_eq!(snap.deletions_scheduled, 1);
        assert_eq!(snap.deferred_deletions_completed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_schedules_are_ignored() {
        let f = fixture();
        let (id, path) = seed(&f).await;

        assert!(f.scheduler.schedule(id, path.clone(), Duration::from_secs(10)));
        assert!(!f.scheduler.schedule(id, path.clone(), Duration::from_secs(10)));
        assert_eq!(f.scheduler.pending(), 1);
        assert_eq!(f.metrics.snapshot().deletions_scheduled, 1);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(f.scheduler.shutdown(Duration::from_secs(5)).await);
        assert_eq!(f.scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_waiting_jobs() {
        let f = fixture();
        let (id, path) = seed(&f).await;

        f.scheduler.schedule(id, path.clone(), Duration::from_secs(300));
        assert!(f.scheduler.shutdown(Duration::from_secs(1)).await);

        assert!(f.blobs.contains(&path), "cancelled job leaves blob for the reaper");
        assert!(!f.store.get(&id).await.unwrap().unwrap().is_removed);
        assert!(!f.scheduler.schedule(id, path, Duration::from_secs(1)));
    }
}
