use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use tracing::{debug, error};

use crate::error::BlobError;
use crate::store::{BlobStore, StoredBlob, validate_blob_path};

/// Configuration for the S3 blob backend.
#[derive(Debug, Clone)]
pub struct S3BlobConfig {
    pub bucket: String,
    pub region: String,
    /// Endpoint override (e.g. `LocalStack` or `MinIO`).
    pub endpoint_url: Option<String>,
    /// Key prefix prepended to every blob path.
    pub prefix: Option<String>,
}

/// S3-backed [`BlobStore`]. Retrieval links are native presigned GETs.
#[derive(Debug, Clone)]
pub struct S3BlobStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
}

fn storage(op: &str, e: impl std::fmt::Display) -> BlobError {
    let msg = e.to_string();
    error!(operation = op, error = %msg, "S3 request failed");
    BlobError::Storage(format!("{op}: {msg}"))
}

impl S3BlobStore {
    /// Build a client from the environment's credential chain.
    pub async fn new(config: S3BlobConfig) -> Self {
        let mut loader =
            aws_config::from_env().region(aws_config::Region::new(config.region.clone()));
        if let Some(endpoint) = &config.endpoint_url {
            debug!(endpoint = %endpoint, "using custom S3 endpoint");
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.endpoint_url.is_some())
            .build();

        Self::with_client(
            aws_sdk_s3::Client::from_conf(s3_config),
            config.bucket,
            config.prefix,
        )
    }

    /// Wrap an already configured client.
    pub fn with_client(
        client: aws_sdk_s3::Client,
        bucket: impl Into<String>,
        prefix: Option<String>,
    ) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.unwrap_or_default(),
        }
    }

    fn key(&self, path: &str) -> Result<String, BlobError> {
        validate_blob_path(path)?;
        Ok(format!("{}{path}", self.prefix))
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, path: &str, data: Bytes, content_type: &str) -> Result<(), BlobError> {
        let key = self.key(path)?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| storage("put_object", e))?;
        debug!(bucket = %self.bucket, key = %key, "S3 object uploaded");
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<StoredBlob>, BlobError> {
        let key = self.key(path)?;
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_key()) => {
                return Ok(None);
            }
            Err(e) => return Err(storage("get_object", e)),
        };

        let content_type = output
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_owned();
        let data = output
            .body
            .collect()
            .await
            .map_err(|e| storage("get_object body", e))?
            .into_bytes();

        Ok(Some(StoredBlob { data, content_type }))
    }

    async fn remove(&self, path: &str) -> Result<(), BlobError> {
        let key = self.key(path)?;
        // DeleteObject succeeds for keys that are already gone.
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| storage("delete_object", e))?;
        debug!(bucket = %self.bucket, key = %key, "S3 object deleted");
        Ok(())
    }

    async fn signed_url(&self, path: &str, ttl: Duration) -> Result<String, BlobError> {
        let key = self.key(path)?;
        let presigning =
            PresigningConfig::expires_in(ttl).map_err(|e| BlobError::Signing(e.to_string()))?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .presigned(presigning)
            .await
            .map_err(|e| BlobError::Signing(e.to_string()))?;
        Ok(request.uri().to_string())
    }
}

#[cfg(test)]
mod tests {
    use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};

    use super::*;

    fn store(prefix: Option<&str>) -> S3BlobStore {
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new("AKIDTEST", "secret", None, None, "test"))
            .build();
        S3BlobStore::with_client(
            aws_sdk_s3::Client::from_conf(config),
            "shares",
            prefix.map(str::to_owned),
        )
    }

    #[test]
    fn keys_carry_the_prefix() {
        assert_eq!(
            store(Some("uploads/")).key("item-1/shot.png").unwrap(),
            "uploads/item-1/shot.png"
        );
        assert_eq!(store(None).key("item-1/shot.png").unwrap(), "item-1/shot.png");
    }

    #[test]
    fn keys_reject_escaping_paths() {
        let store = store(Some("uploads/"));
        for path in ["", "/abs", "../x", "a//b", "a\\b"] {
            assert!(
                matches!(store.key(path), Err(BlobError::InvalidPath(_))),
                "{path:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn invalid_paths_fail_before_any_request() {
        let store = store(None);
        assert!(matches!(
            store.remove("../secret").await,
            Err(BlobError::InvalidPath(_))
        ));
        assert!(matches!(
            store.signed_url("/etc/passwd", Duration::from_secs(60)).await,
            Err(BlobError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn presigned_link_targets_prefixed_key() {
        let url = store(Some("uploads/"))
            .signed_url("item-1/shot.png", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(url.contains("uploads/item-1/shot.png?"), "{url}");
        assert!(url.contains("X-Amz-Expires=60"), "{url}");
    }
}
