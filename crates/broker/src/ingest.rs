use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use ephemera_blob::BlobStore;
use ephemera_core::{
    Clock, IngestPolicy, ItemId, NewItem, blob_path_for, infer_content_type, validate_file_name,
};
use ephemera_store::MetadataStore;

use crate::error::BrokerError;
use crate::metrics::BrokerMetrics;

/// An upload to be turned into a shareable item.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub file_name: String,
    pub data: Bytes,
    /// Requested time-to-live. Policy default when `None`.
    pub ttl_seconds: Option<u64>,
    /// Requested view ceiling. Policy default when `None`.
    pub max_views: Option<u32>,
}

/// What a successful ingest hands back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReceipt {
    pub id: ItemId,
    pub content_type: String,
    pub expiry_at: DateTime<Utc>,
    pub max_views: u32,
}

impl IngestReceipt {
    /// Path of the share page for this item, to be joined to a base URL.
    #[must_use]
    pub fn share_path(&self) -> String {
        format!("/view/{}", self.id)
    }
}

/// Validates uploads and persists blob and metadata together.
#[derive(Clone)]
pub struct IngestService {
    store: Arc<dyn MetadataStore>,
    blobs: Arc<dyn BlobStore>,
    policy: IngestPolicy,
    clock: Arc<dyn Clock>,
    metrics: Arc<BrokerMetrics>,
}

impl IngestService {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        blobs: Arc<dyn BlobStore>,
        policy: IngestPolicy,
        clock: Arc<dyn Clock>,
        metrics: Arc<BrokerMetrics>,
    ) -> Self {
        Self {
            store,
            blobs,
            policy,
            clock,
            metrics,
        }
    }

    pub fn policy(&self) -> &IngestPolicy {
        &self.policy
    }

    fn validate(&self, request: &IngestRequest) -> Result<(u64, u32), BrokerError> {
        validate_file_name(&request.file_name)?;
        let (ttl_seconds, max_views) = self.policy.resolve(request.ttl_seconds, request.max_views);
        self.policy
            .validate(request.data.len(), ttl_seconds, max_views)?;
        Ok((ttl_seconds, max_views))
    }

    /// Persist a new item.
    ///
    /// The blob is written first. If the metadata insert then fails, the blob
    /// is removed again before the error is returned.
    #[instrument(skip_all, fields(file_name = %request.file_name, size = request.data.len()))]
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestReceipt, BrokerError> {
        let (ttl_seconds, max_views) = match self.validate(&request) {
            Ok(bounds) => bounds,
            Err(e) => {
                self.metrics.increment_ingest_rejected();
                return Err(e);
            }
        };

        let id = ItemId::new();
        let blob_path = blob_path_for(&id, &request.file_name);
        let content_type = infer_content_type(&request.file_name).to_owned();
        let now = self.clock.now();
        let expiry_at = IngestPolicy::expiry_for(now, ttl_seconds);

        self.blobs
            .put(&blob_path, request.data, &content_type)
            .await?;

        let item = NewItem {
            id,
            name: request.file_name,
            content_type: content_type.clone(),
            blob_path: blob_path.clone(),
            expiry_at: Some(expiry_at),
            max_views: Some(max_views),
            created_at: now,
        };

        if let Err(e) = self.store.insert(&item).await {
            self.metrics.increment_ingest_rollbacks();
            if let Err(rollback) = self.blobs.remove(&blob_path).await {
                warn!(
                    item_id = %id,
                    blob_path = %blob_path,
                    error = %rollback,
                    "failed to roll back blob after metadata insert failure"
                );
            }
            return Err(e.into());
        }

        self.metrics.increment_ingested();
        info!(item_id = %id, ttl_seconds, max_views, "item ingested");

        Ok(IngestReceipt {
            id,
            content_type,
            expiry_at,
            max_views,
        })
    }
}
