use std::sync::Arc;

use tracing::warn;

#[cfg(feature = "s3")]
use ephemera_blob::{S3BlobConfig, S3BlobStore};
use ephemera_blob::{BlobStore, LocalBlobStore, MemoryBlobStore, UrlSigner};

use crate::config::BlobConfig;
use crate::error::ServerError;

/// Build the link signer for self-hosted blob backends.
///
/// Uses the configured hex secret, or a random one when none is set.
pub fn create_signer(config: &BlobConfig, base_url: &str) -> Result<UrlSigner, ServerError> {
    match config.signing_secret.as_deref() {
        Some(secret) => UrlSigner::from_hex(secret, base_url)
            .map_err(|e| ServerError::Config(format!("blob signing secret: {e}"))),
        None => {
            warn!("no blob signing secret configured, generating a random one; links will not survive a restart");
            UrlSigner::random(base_url)
                .map_err(|e| ServerError::Config(format!("blob signing secret: {e}")))
        }
    }
}

/// Construct a `BlobStore` from configuration.
///
/// Returns the signer alongside the store when the backend issues links served
/// by this process (`GET /v1/blobs/...`).
pub async fn create_blob_store(
    config: &BlobConfig,
    base_url: &str,
) -> Result<(Arc<dyn BlobStore>, Option<UrlSigner>), ServerError> {
    match config.backend.as_str() {
        "memory" => {
            let signer = create_signer(config, base_url)?;
            let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new(signer.clone()));
            Ok((store, Some(signer)))
        }
        "local" => {
            let signer = create_signer(config, base_url)?;
            let store = LocalBlobStore::new(&config.root, signer.clone())
                .await
                .map_err(|e| ServerError::Config(format!("local blob store: {e}")))?;
            let store: Arc<dyn BlobStore> = Arc::new(store);
            Ok((store, Some(signer)))
        }
        #[cfg(feature = "s3")]
        "s3" => create_s3(config).await,
        other => Err(ServerError::Config(format!(
            "unsupported blob backend: {other} (is the feature enabled?)"
        ))),
    }
}

#[cfg(feature = "s3")]
async fn create_s3(
    config: &BlobConfig,
) -> Result<(Arc<dyn BlobStore>, Option<UrlSigner>), ServerError> {
    let bucket = config
        .bucket
        .clone()
        .ok_or_else(|| ServerError::Config("s3 backend requires 'bucket' in [blob]".into()))?;
    let s3_config = S3BlobConfig {
        bucket,
        region: config
            .region
            .clone()
            .unwrap_or_else(|| "us-east-1".to_owned()),
        endpoint_url: config.endpoint_url.clone(),
        prefix: config.prefix.clone(),
    };
    let store: Arc<dyn BlobStore> = Arc::new(S3BlobStore::new(s3_config).await);
    Ok((store, None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_secret_is_used() {
        let config = BlobConfig {
            signing_secret: Some("00112233445566778899aabbccddeeff".into()),
            ..BlobConfig::default()
        };
        let a = create_signer(&config, "http://x").unwrap();
        let b = create_signer(&config, "http://x").unwrap();
        let now = chrono::Utc::now();
        let ttl = std::time::Duration::from_secs(60);
        assert_eq!(
            a.url_at("id/a.png", ttl, now).unwrap(),
            b.url_at("id/a.png", ttl, now).unwrap()
        );
    }

    #[test]
    fn bad_secret_is_config_error() {
        let config = BlobConfig {
            signing_secret: Some("not-hex".into()),
            ..BlobConfig::default()
        };
        assert!(matches!(
            create_signer(&config, "http://x"),
            Err(ServerError::Config(_))
        ));
    }

    #[tokio::test]
    async fn local_backend_creates_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("blobs");
        let config = BlobConfig {
            backend: "local".into(),
            root: root.to_string_lossy().into_owned(),
            ..BlobConfig::default()
        };
        let (store, signer) = create_blob_store(&config, "http://x").await.unwrap();
        assert!(signer.is_some());
        store
            .put("id/a.txt", bytes::Bytes::from_static(b"hi"), "text/plain")
            .await
            .unwrap();
        assert!(root.join("id").join("a.txt").exists());
    }

    #[tokio::test]
    async fn unknown_backend_is_config_error() {
        let config = BlobConfig {
            backend: "ftp".into(),
            ..BlobConfig::default()
        };
        assert!(create_blob_store(&config, "http://x").await.is_err());
    }
}
