use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, instrument};

use ephemera_blob::BlobStore;
use ephemera_core::{AccessPolicy, Clock, ConsumeStatus, ItemId};
use ephemera_store::MetadataStore;

use crate::deletion::DeletionScheduler;
use crate::error::BrokerError;
use crate::metrics::BrokerMetrics;

/// A delivered view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessGrant {
    pub id: ItemId,
    /// Time-bounded retrieval link.
    pub url: String,
    /// Views left after this one, `None` when unlimited.
    pub remaining_views: Option<u32>,
    pub expiry_at: Option<DateTime<Utc>>,
    /// Seconds until the item's own expiry, or the default window.
    pub seconds_left: u64,
    /// How long `url` stays valid.
    pub link_ttl: Duration,
    /// This was the last view the item allows.
    pub will_deactivate: bool,
}

/// Decides, per request, whether one view may be spent.
#[derive(Clone)]
pub struct AccessBroker {
    store: Arc<dyn MetadataStore>,
    blobs: Arc<dyn BlobStore>,
    policy: AccessPolicy,
    clock: Arc<dyn Clock>,
    scheduler: DeletionScheduler,
    metrics: Arc<BrokerMetrics>,
}

impl AccessBroker {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        blobs: Arc<dyn BlobStore>,
        policy: AccessPolicy,
        clock: Arc<dyn Clock>,
        scheduler: DeletionScheduler,
        metrics: Arc<BrokerMetrics>,
    ) -> Self {
        Self {
            store,
            blobs,
            policy,
            clock,
            scheduler,
            metrics,
        }
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Spend one view of `id` and issue a retrieval link for it.
    ///
    /// Once the store has reported success the view stays spent, even if
    /// issuing the link fails afterwards. Callers that time out must assume
    /// the view was consumed.
    #[instrument(skip_all, fields(item_id = %id))]
    pub async fn consume(&self, id: &ItemId) -> Result<AccessGrant, BrokerError> {
        let now = self.clock.now();
        let record = self.store.consume(id, now).await?;

        match record.status {
            ConsumeStatus::NotFound => {
                self.metrics.increment_views_denied_not_found();
                debug!("consume denied: not found");
                return Err(BrokerError::NotFound);
            }
            ConsumeStatus::Expired => {
                self.metrics.increment_views_denied_expired();
                debug!("consume denied: expired");
                return Err(BrokerError::Expired);
            }
            ConsumeStatus::Ok => {}
        }

        let Some(blob_path) = record.blob_path else {
            self.metrics.increment_access_errors();
            error!("view consumed but item has no blob path");
            return Err(BrokerError::Access("item has no stored content".into()));
        };

        let seconds_left = self.policy.seconds_left(record.expiry_at, now);
        let link_ttl = self.policy.link_lifetime(seconds_left);

        if record.will_deactivate {
            self.scheduler.schedule(
                *id,
                blob_path.clone(),
                self.policy.deletion_delay(link_ttl),
            );
        }

        let url = match self.blobs.signed_url(&blob_path, link_ttl).await {
            Ok(url) => url,
            Err(e) => {
                self.metrics.increment_access_errors();
                error!(error = %e, "view consumed but signed link could not be issued");
                return Err(BrokerError::Access(e.to_string()));
            }
        };

        self.metrics.increment_views_granted();
        debug!(
            remaining_views = ?record.remaining_views,
            seconds_left,
            link_ttl_secs = link_ttl.as_secs(),
            will_deactivate = record.will_deactivate,
            "view granted"
        );

        Ok(AccessGrant {
            id: *id,
            url,
            remaining_views: record.remaining_views,
            expiry_at: record.expiry_at,
            seconds_left,
            link_ttl,
            will_deactivate: record.will_deactivate,
        })
    }
}
