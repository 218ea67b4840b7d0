use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, warn};

use ephemera_core::infer_content_type;

use crate::error::BlobError;
use crate::signer::UrlSigner;
use crate::store::{BlobStore, StoredBlob, validate_blob_path};

fn storage(e: &std::io::Error) -> BlobError {
    BlobError::Storage(e.to_string())
}

/// Filesystem [`BlobStore`] rooted at a directory.
///
/// Each blob is a file at `{root}/{path}`. Writes go to a temporary sibling
/// and are renamed into place. The content type is re-derived from the file
/// extension on read.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    signer: UrlSigner,
}

impl LocalBlobStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub async fn new(root: impl Into<PathBuf>, signer: UrlSigner) -> Result<Self, BlobError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| storage(&e))?;
        debug!(root = %root.display(), "local blob store ready");
        Ok(Self { root, signer })
    }

    fn file_path(&self, path: &str) -> Result<PathBuf, BlobError> {
        validate_blob_path(path)?;
        Ok(self.root.join(Path::new(path)))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, path: &str, data: Bytes, _content_type: &str) -> Result<(), BlobError> {
        let target = self.file_path(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| storage(&e))?;
        }

        let mut tmp = target.clone().into_os_string();
        tmp.push(".partial");
        let written = match tokio::fs::write(&tmp, &data).await {
            Ok(()) => tokio::fs::rename(&tmp, &target).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp).await
                && cleanup.kind() != ErrorKind::NotFound
            {
                warn!(path = %path, error = %cleanup, "failed to remove partial blob");
            }
            return Err(storage(&e));
        }
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<StoredBlob>, BlobError> {
        let target = self.file_path(path)?;
        match tokio::fs::read(&target).await {
            Ok(data) => Ok(Some(StoredBlob {
                data: Bytes::from(data),
                content_type: infer_content_type(path).to_owned(),
            })),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage(&e)),
        }
    }

    async fn remove(&self, path: &str) -> Result<(), BlobError> {
        let target = self.file_path(path)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(storage(&e)),
        }

        // Drop the per-item directory once empty; a non-empty or missing
        // directory is fine.
        if let Some(parent) = target.parent()
            && parent != self.root
        {
            let _ = tokio::fs::remove_dir(parent).await;
        }
        Ok(())
    }

    async fn signed_url(&self, path: &str, ttl: Duration) -> Result<String, BlobError> {
        validate_blob_path(path)?;
        self.signer.url(path, ttl)
    }
}
