use std::sync::Arc;

use ephemera_store::MetadataStore;
use ephemera_store_memory::MemoryMetadataStore;
#[cfg(feature = "postgres")]
use ephemera_store_postgres::{PostgresConfig, PostgresMetadataStore};
#[cfg(feature = "redis")]
use ephemera_store_redis::{RedisConfig, RedisMetadataStore};

use crate::config::StoreConfig;
use crate::error::ServerError;

/// Construct a `MetadataStore` from configuration.
pub async fn create_store(config: &StoreConfig) -> Result<Arc<dyn MetadataStore>, ServerError> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryMetadataStore::new())),
        #[cfg(feature = "redis")]
        "redis" => create_redis(config),
        #[cfg(feature = "postgres")]
        "postgres" => create_postgres(config).await,
        other => Err(ServerError::Config(format!(
            "unsupported store backend: {other} (is the feature enabled?)"
        ))),
    }
}

#[cfg(feature = "redis")]
fn create_redis(config: &StoreConfig) -> Result<Arc<dyn MetadataStore>, ServerError> {
    let defaults = RedisConfig::default();
    let redis_config = RedisConfig {
        url: config.url.clone().unwrap_or(defaults.url),
        prefix: config.prefix.clone().unwrap_or(defaults.prefix),
        pool_size: config
            .pool_size
            .map_or(defaults.pool_size, |n| n as usize),
        ..RedisConfig::default()
    };
    let store = RedisMetadataStore::new(&redis_config)
        .map_err(|e| ServerError::Config(format!("redis store: {e}")))?;
    Ok(Arc::new(store))
}

#[cfg(feature = "postgres")]
async fn create_postgres(config: &StoreConfig) -> Result<Arc<dyn MetadataStore>, ServerError> {
    let url = config
        .url
        .as_deref()
        .ok_or_else(|| ServerError::Config("postgres backend requires 'url' in [store]".into()))?;
    let defaults = PostgresConfig::default();
    let pg_config = PostgresConfig {
        url: url.to_owned(),
        table_prefix: config.prefix.clone().unwrap_or(defaults.table_prefix),
        pool_size: config.pool_size.unwrap_or(defaults.pool_size),
        ..PostgresConfig::default()
    };
    let store = PostgresMetadataStore::new(pg_config)
        .await
        .map_err(|e| ServerError::Config(format!("postgres store: {e}")))?;
    Ok(Arc::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_backend_is_always_available() {
        let store = create_store(&StoreConfig::default()).await.unwrap();
        assert!(store.get(&ephemera_core::ItemId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_backend_is_config_error() {
        let config = StoreConfig {
            backend: "cassandra".into(),
            ..StoreConfig::default()
        };
        let err = create_store(&config).await.err().unwrap();
        assert!(err.to_string().contains("unsupported store backend: cassandra"));
    }
}
