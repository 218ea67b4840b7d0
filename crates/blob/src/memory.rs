use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use crate::error::BlobError;
use crate::signer::UrlSigner;
use crate::store::{BlobStore, StoredBlob, validate_blob_path};

/// In-memory [`BlobStore`] backed by a [`DashMap`].
///
/// Links are signed with a [`UrlSigner`] and served by the HTTP layer.
#[derive(Debug, Clone)]
pub struct MemoryBlobStore {
    blobs: Arc<DashMap<String, StoredBlob>>,
    signer: UrlSigner,
}

impl MemoryBlobStore {
    pub fn new(signer: UrlSigner) -> Self {
        Self {
            blobs: Arc::new(DashMap::new()),
            signer,
        }
    }

    /// Whether a blob is stored at `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.blobs.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, path: &str, data: Bytes, content_type: &str) -> Result<(), BlobError> {
        validate_blob_path(path)?;
        self.blobs.insert(
            path.to_owned(),
            StoredBlob {
                data,
                content_type: content_type.to_owned(),
            },
        );
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<StoredBlob>, BlobError> {
        validate_blob_path(path)?;
        Ok(self.blobs.get(path).map(|entry| entry.value().clone()))
    }

    async fn remove(&self, path: &str) -> Result<(), BlobError> {
        validate_blob_path(path)?;
        self.blobs.remove(path);
        Ok(())
    }

    async fn signed_url(&self, path: &str, ttl: Duration) -> Result<String, BlobError> {
        validate_blob_path(path)?;
        self.signer.url(path, ttl)
    }
}
