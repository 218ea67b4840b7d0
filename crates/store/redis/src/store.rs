use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_redis::{Config, Pool, Runtime};
use redis::{AsyncCommands, Script};

use ephemera_core::{ConsumeRecord, ConsumeStatus, ItemId, NewItem, ReclaimCandidate, ShareableItem};
use ephemera_store::error::StoreError;
use ephemera_store::store::MetadataStore;

use crate::config::RedisConfig;
use crate::scripts;

fn backend(e: redis::RedisError) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn parse_ms(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    raw.parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .ok_or_else(|| StoreError::Serialization(format!("invalid timestamp: {raw}")))
}

fn parse_u32(raw: &str, field: &str) -> Result<u32, StoreError> {
    raw.parse()
        .map_err(|_| StoreError::Serialization(format!("invalid {field}: {raw}")))
}

fn non_empty(raw: String) -> Option<String> {
    (!raw.is_empty()).then_some(raw)
}

/// Redis-backed implementation of [`MetadataStore`].
///
/// Uses a `deadpool-redis` connection pool; see [`scripts`] for the hash
/// layout and the Lua scripts that keep each operation atomic.
pub struct RedisMetadataStore {
    pool: Pool,
    keys: RedisConfig,
}

impl RedisMetadataStore {
    /// Create a new `RedisMetadataStore` from the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if the pool cannot be created.
    pub fn new(config: &RedisConfig) -> Result<Self, StoreError> {
        let cfg = Config::from_url(&config.url);
        let pool = cfg
            .builder()
            .map(|b| {
                b.max_size(config.pool_size)
                    .wait_timeout(Some(config.connection_timeout))
                    .runtime(Runtime::Tokio1)
                    .build()
            })
            .map_err(|e| StoreError::Connection(e.to_string()))?
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Ok(Self {
            pool,
            keys: config.clone(),
        })
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }
}

fn item_from_hash(mut fields: HashMap<String, String>) -> Result<ShareableItem, StoreError> {
    let mut take = |name: &str| {
        fields
            .remove(name)
            .ok_or_else(|| StoreError::Serialization(format!("missing field: {name}")))
    };

    let id = ItemId::parse(&take("id")?).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let name = take("name")?;
    let content_type = take("content_type")?;
    let views = parse_u32(&take("views")?, "views")?;
    let is_active = take("is_active")? == "1";
    let is_removed = take("is_removed")? == "1";
    let created_at = parse_ms(&take("created_ms")?)?;

    let blob_path = fields.remove("blob_path");
    let expiry_at = fields.remove("expiry_ms").map(|v| parse_ms(&v)).transpose()?;
    let max_views = fields
        .remove("max_views")
        .map(|v| parse_u32(&v, "max_views"))
        .transpose()?;

    Ok(ShareableItem {
        id,
        name,
        content_type,
        blob_path,
        expiry_at,
        max_views,
        views,
        is_active,
        is_removed,
        created_at,
    })
}

#[async_trait]
impl MetadataStore for RedisMetadataStore {
    async fn insert(&self, item: &NewItem) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let created: i64 = Script::new(scripts::INSERT)
            .key(self.keys.item_key(&item.id))
            .key(self.keys.held_key())
            .arg(item.id.to_string())
            .arg(&item.name)
            .arg(&item.content_type)
            .arg(&item.blob_path)
            .arg(
                item.expiry_at
                    .map(|at| at.timestamp_millis().to_string())
                    .unwrap_or_default(),
            )
            .arg(item.max_views.map(|v| v.to_string()).unwrap_or_default())
            .arg(item.created_at.timestamp_millis())
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;

        if created == 0 {
            return Err(StoreError::Conflict(item.id.to_string()));
        }
        Ok(())
    }

    async fn get(&self, id: &ItemId) -> Result<Option<ShareableItem>, StoreError> {
        let mut conn = self.conn().await?;
        let fields: HashMap<String, String> =
            conn.hgetall(self.keys.item_key(id)).await.map_err(backend)?;

        if fields.is_empty() {
            return Ok(None);
        }
        item_from_hash(fields).map(Some)
    }

    async fn consume(&self, id: &ItemId, now: DateTime<Utc>) -> Result<ConsumeRecord, StoreError> {
        let mut conn = self.conn().await?;
        let reply: Vec<String> = Script::new(scripts::CONSUME)
            .key(self.keys.item_key(id))
            .arg(now.timestamp_millis())
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;

        let [status, blob_path, expiry_ms, remaining, last]: [String; 5] = reply
            .try_into()
            .map_err(|v: Vec<String>| {
                StoreError::Serialization(format!("unexpected consume reply of {} fields", v.len()))
            })?;

        let status: ConsumeStatus = status.parse().map_err(StoreError::Serialization)?;
        match status {
            ConsumeStatus::NotFound => return Ok(ConsumeRecord::not_found()),
            ConsumeStatus::Expired => return Ok(ConsumeRecord::expired()),
            ConsumeStatus::Ok => {}
        }

        Ok(ConsumeRecord {
            status,
            blob_path: non_empty(blob_path),
            expiry_at: non_empty(expiry_ms).map(|v| parse_ms(&v)).transpose()?,
            remaining_views: non_empty(remaining)
                .map(|v| parse_u32(&v, "remaining_views"))
                .transpose()?,
            will_deactivate: last == "1",
        })
    }

    async fn mark_removed(&self, id: &ItemId) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let changed: i64 = Script::new(scripts::MARK_REMOVED)
            .key(self.keys.item_key(id))
            .key(self.keys.held_key())
            .arg(id.to_string())
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(changed == 1)
    }

    async fn deactivate(&self, id: &ItemId) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let changed: i64 = Script::new(scripts::DEACTIVATE)
            .key(self.keys.item_key(id))
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(changed == 1)
    }

    async fn list_reclaimable(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ReclaimCandidate>, StoreError> {
        let mut conn = self.conn().await?;
        let flat: Vec<String> = Script::new(scripts::RECLAIMABLE)
            .key(self.keys.held_key())
            .arg(now.timestamp_millis())
            .arg(limit)
            .arg(self.keys.item_key_prefix())
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;

        flat.chunks_exact(2)
            .map(|pair| {
                Ok(ReclaimCandidate {
                    id: ItemId::parse(&pair[0])
                        .map_err(|e| StoreError::Serialization(e.to_string()))?,
                    blob_path: pair[1].clone(),
                })
            })
            .collect()
    }
}


#[cfg(all(test, feature = "integration"))]
mod integration_tests {
    use super::*;

    fn test_config() -> RedisConfig {
        RedisConfig {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            prefix: format!("ephemera-test-{}", uuid::Uuid::new_v4()),
            ..RedisConfig::default()
        }
    }

    #[tokio::test]
    async fn store_conformance() {
        let store = RedisMetadataStore::new(&test_config()).expect("pool creation should succeed");
        ephemera_store::testing::run_store_conformance_tests(&store)
            .await
            .expect("conformance tests should pass");
    }
}
