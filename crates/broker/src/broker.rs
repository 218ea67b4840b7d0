use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use ephemera_blob::BlobStore;
use ephemera_core::{ItemId, ShareableItem};
use ephemera_store::MetadataStore;

use crate::access::{AccessBroker, AccessGrant};
use crate::deletion::DeletionScheduler;
use crate::error::BrokerError;
use crate::ingest::{IngestReceipt, IngestRequest, IngestService};
use crate::metrics::BrokerMetrics;
use crate::reaper::{Reaper, SweepReport};

/// The assembled access-control subsystem. Built with
/// [`BrokerBuilder`](crate::BrokerBuilder).
pub struct Broker {
    pub(crate) store: Arc<dyn MetadataStore>,
    pub(crate) blobs: Arc<dyn BlobStore>,
    pub(crate) ingest: IngestService,
    pub(crate) access: AccessBroker,
    pub(crate) scheduler: DeletionScheduler,
    pub(crate) reaper: Reaper,
    pub(crate) metrics: Arc<BrokerMetrics>,
}

impl Broker {
    /// See [`IngestService::ingest`].
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestReceipt, BrokerError> {
        self.ingest.ingest(request).await
    }

    /// See [`AccessBroker::consume`].
    pub async fn consume(&self, id: &ItemId) -> Result<AccessGrant, BrokerError> {
        self.access.consume(id).await
    }

    /// See [`Reaper::sweep`].
    pub async fn sweep(&self) -> Result<SweepReport, BrokerError> {
        self.reaper.sweep().await
    }

    /// Take an item out of circulation. Its blob is left for the reaper.
    ///
    /// Returns `true` if the item was active.
    pub async fn deactivate(&self, id: &ItemId) -> Result<bool, BrokerError> {
        let changed = self.store.deactivate(id).await?;
        if changed {
            info!(item_id = %id, "item deactivated");
        }
        Ok(changed)
    }

    /// Look up an item's metadata.
    pub async fn item(&self, id: &ItemId) -> Result<Option<ShareableItem>, BrokerError> {
        Ok(self.store.get(id).await?)
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    pub fn metrics(&self) -> &Arc<BrokerMetrics> {
        &self.metrics
    }

    pub fn ingest_service(&self) -> &IngestService {
        &self.ingest
    }

    pub fn access_broker(&self) -> &AccessBroker {
        &self.access
    }

    pub fn reaper(&self) -> &Reaper {
        &self.reaper
    }

    pub fn scheduler(&self) -> &DeletionScheduler {
        &self.scheduler
    }

    /// Stop background deletions, waiting up to `timeout` for those in flight.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.scheduler.shutdown(timeout).await
    }
}
