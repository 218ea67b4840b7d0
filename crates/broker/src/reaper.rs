use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{info, instrument, warn};

use ephemera_blob::BlobStore;
use ephemera_core::{Clock, ItemId, ReclaimCandidate};
use ephemera_store::MetadataStore;

use crate::error::BrokerError;
use crate::metrics::BrokerMetrics;

/// Batch and fan-out limits for a reclamation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaperConfig {
    /// Most candidates examined per pass.
    pub batch_size: usize,
    /// Most candidates processed at once.
    pub concurrency: usize,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            concurrency: 16,
        }
    }
}

/// Result for one reclaimed item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepOutcome {
    pub id: ItemId,
    /// The blob delete call succeeded (including "already gone").
    pub removed: bool,
    /// The row was marked removed.
    pub marked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of one reclamation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    pub deleted: usize,
    pub details: Vec<SweepOutcome>,
}

/// Deletes blobs of items that have reached the end of their lifecycle.
///
/// Safe to run repeatedly and concurrently with itself: reclaimed rows lose
/// their blob path and drop out of later candidate lists, and both the blob
/// delete and the metadata mark are idempotent.
#[derive(Clone)]
pub struct Reaper {
    store: Arc<dyn MetadataStore>,
    blobs: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
    config: ReaperConfig,
    metrics: Arc<BrokerMetrics>,
}

impl Reaper {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        blobs: Arc<dyn BlobStore>,
        clock: Arc<dyn Clock>,
        config: ReaperConfig,
        metrics: Arc<BrokerMetrics>,
    ) -> Self {
        Self {
            store,
            blobs,
            clock,
            config,
            metrics,
        }
    }

    pub fn config(&self) -> ReaperConfig {
        self.config
    }

    /// Run one reclamation pass.
    ///
    /// Only listing candidates can fail the pass. Per-item failures are
    /// recorded in the report and do not affect other items.
    #[instrument(skip_all)]
    pub async fn sweep(&self) -> Result<SweepReport, BrokerError> {
        let now = self.clock.now();
        let candidates = self
            .store
            .list_reclaimable(now, self.config.batch_size)
            .await?;
        let examined = candidates.len();

        let details: Vec<SweepOutcome> = stream::iter(candidates)
            .map(|candidate| self.reclaim(candidate))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let deleted = details.iter().filter(|o| o.removed).count();
        let failures = details.iter().filter(|o| o.error.is_some()).count();

        self.metrics.increment_sweeps();
        self.metrics.add_swept_items(deleted as u64);
        self.metrics.add_sweep_failures(failures as u64);

        info!(examined, deleted, failures, "reclamation sweep complete");

        Ok(SweepReport {
            examined,
            deleted,
            details,
        })
    }

    async fn reclaim(&self, candidate: ReclaimCandidate) -> SweepOutcome {
        let ReclaimCandidate { id, blob_path } = candidate;
        let mut errors = Vec::new();

        let removed = match self.blobs.remove(&blob_path).await {
            Ok(_) => true,
            Err(e) => {
                warn!(item_id = %id, error = %e, "sweep: blob delete failed");
                errors.push(format!("blob: {e}"));
                false
            }
        };

        // Marked regardless of the blob outcome; a blob that survives here
        // is orphaned rather than retried.
        let marked = match self.store.mark_removed(&id).await {
            Ok(_) => true,
            Err(e) => {
                warn!(item_id = %id, error = %e, "sweep: metadata update failed");
                errors.push(format!("metadata: {e}"));
                false
            }
        };

        SweepOutcome {
            id,
            removed,
            marked,
            error: (!errors.is_empty()).then(|| errors.join("; ")),
        }
    }
}
