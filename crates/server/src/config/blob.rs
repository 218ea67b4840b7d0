use serde::Deserialize;

/// Blob store backend configuration.
#[derive(Debug, Deserialize)]
pub struct BlobConfig {
    /// Which backend to use: `"memory"`, `"local"`, or `"s3"`.
    #[serde(default = "default_blob_backend")]
    pub backend: String,
    /// Root directory for the local backend.
    #[serde(default = "default_root")]
    pub root: String,
    /// S3 bucket name.
    pub bucket: Option<String>,
    /// S3 region.
    pub region: Option<String>,
    /// S3 endpoint override (`MinIO`, `LocalStack`).
    pub endpoint_url: Option<String>,
    /// Key prefix for S3 objects.
    pub prefix: Option<String>,
    /// Hex-encoded HMAC secret for signing blob links (memory and local backends).
    ///
    /// Falls back to `EPHEMERA_SIGNING_KEY`. If neither is set a random secret
    /// is generated on startup and issued links do not survive a restart.
    pub signing_secret: Option<String>,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            backend: default_blob_backend(),
            root: default_root(),
            bucket: None,
            region: None,
            endpoint_url: None,
            prefix: None,
            signing_secret: None,
        }
    }
}

fn default_blob_backend() -> String {
    "memory".to_owned()
}

fn default_root() -> String {
    "./data/blobs".to_owned()
}
