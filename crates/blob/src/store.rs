use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::BlobError;

/// Bytes and content type of a stored blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub data: Bytes,
    pub content_type: String,
}

/// Durable byte storage keyed by path.
///
/// Paths are relative, `/`-separated, and never contain `.` or `..`
/// segments; see [`validate_blob_path`].
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` at `path`, replacing anything already there.
    async fn put(&self, path: &str, data: Bytes, content_type: &str) -> Result<(), BlobError>;

    /// Fetch a blob. Returns `None` if nothing is stored at `path`.
    async fn get(&self, path: &str) -> Result<Option<StoredBlob>, BlobError>;

    /// Delete a blob. Removing a missing blob is not an error.
    async fn remove(&self, path: &str) -> Result<(), BlobError>;

    /// Issue a retrieval URL that stays valid for at least `ttl` and is
    /// rejected afterwards.
    async fn signed_url(&self, path: &str, ttl: Duration) -> Result<String, BlobError>;
}

/// Reject paths that could address anything outside the store's namespace.
pub fn validate_blob_path(path: &str) -> Result<(), BlobError> {
    if path.is_empty() || path.starts_with('/') || path.contains('\\') {
        return Err(BlobError::InvalidPath(path.to_owned()));
    }
    let bad_segment = path
        .split('/')
        .any(|seg| seg.is_empty() || seg == "." || seg == ".." || seg.chars().any(char::is_control));
    if bad_segment {
        return Err(BlobError::InvalidPath(path.to_owned()));
    }
    Ok(())
}
