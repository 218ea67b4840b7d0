use serde::Deserialize;

/// Metadata store backend configuration.
#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    /// Which backend to use: `"memory"`, `"postgres"`, or `"redis"`.
    #[serde(default = "default_store_backend")]
    pub backend: String,
    /// Connection URL for the backend (ignored for memory).
    pub url: Option<String>,
    /// Key prefix (Redis) or table prefix (`PostgreSQL`).
    pub prefix: Option<String>,
    /// Connection pool size.
    pub pool_size: Option<u32>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            url: None,
            prefix: None,
            pool_size: None,
        }
    }
}

fn default_store_backend() -> String {
    "memory".to_owned()
}
