use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;

use ephemera_core::{ConsumeRecord, ConsumeStatus, ItemId, NewItem, ReclaimCandidate, ShareableItem};
use ephemera_store::error::StoreError;
use ephemera_store::store::MetadataStore;

use crate::config::PostgresConfig;
use crate::migrations;

type ItemRow = (
    String,
    String,
    String,
    Option<String>,
    Option<DateTime<Utc>>,
    Option<i32>,
    i32,
    bool,
    bool,
    DateTime<Utc>,
);

type ConsumeRow = (
    String,
    Option<String>,
    Option<DateTime<Utc>>,
    Option<i32>,
    bool,
);

/// Build `PgConnectOptions` from a [`PostgresConfig`], applying SSL settings
/// when configured.
pub(crate) fn build_connect_options(
    config: &PostgresConfig,
) -> Result<sqlx::postgres::PgConnectOptions, StoreError> {
    let mut options: sqlx::postgres::PgConnectOptions = config
        .url
        .parse()
        .map_err(|e: sqlx::Error| StoreError::Connection(e.to_string()))?;

    if let Some(ref mode) = config.ssl_mode {
        let ssl_mode = match mode.as_str() {
            "disable" => sqlx::postgres::PgSslMode::Disable,
            "prefer" => sqlx::postgres::PgSslMode::Prefer,
            "require" => sqlx::postgres::PgSslMode::Require,
            "verify-ca" => sqlx::postgres::PgSslMode::VerifyCa,
            "verify-full" => sqlx::postgres::PgSslMode::VerifyFull,
            other => {
                return Err(StoreError::Connection(format!("unknown ssl_mode: {other}")));
            }
        };
        options = options.ssl_mode(ssl_mode);
    }

    if let Some(ref path) = config.ssl_root_cert {
        options = options.ssl_root_cert(path);
    }

    Ok(options)
}

fn parse_id(raw: &str) -> Result<ItemId, StoreError> {
    ItemId::parse(raw).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn to_u32(value: i32, field: &str) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Serialization(format!("negative {field}: {value}")))
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// PostgreSQL-backed implementation of [`MetadataStore`].
///
/// Consumption goes through the `consume_item` PL/pgSQL function installed by
/// [`migrations::run_migrations`], which takes a row lock, decides, and
/// updates in one call.
pub struct PostgresMetadataStore {
    pool: PgPool,
    config: Arc<PostgresConfig>,
}

impl PostgresMetadataStore {
    /// Connect, create the pool, and run migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if pool creation fails, or
    /// [`StoreError::Backend`] if migrations fail.
    pub async fn new(config: PostgresConfig) -> Result<Self, StoreError> {
        let connect_options = build_connect_options(&config)?;
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.pool_size)
            .connect_with(connect_options)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Self::from_pool(pool, config).await
    }

    /// Create a store from an existing pool. Runs migrations on creation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if migrations fail.
    pub async fn from_pool(pool: PgPool, config: PostgresConfig) -> Result<Self, StoreError> {
        migrations::run_migrations(&pool, &config)
            .await
            .map_err(backend)?;
        debug!(table = %config.items_table(), "postgres metadata store ready");

        Ok(Self {
            pool,
            config: Arc::new(config),
        })
    }
}

#[async_trait]
impl MetadataStore for PostgresMetadataStore {
    async fn insert(&self, item: &NewItem) -> Result<(), StoreError> {
        let table = self.config.items_table();
        let max_views = item
            .max_views
            .map(i32::try_from)
            .transpose()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let query = format!(
            "INSERT INTO {table} \
             (id, name, content_type, blob_path, expiry_at, max_views, views, is_active, is_removed, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, 0, TRUE, FALSE, $7) \
             ON CONFLICT (id) DO NOTHING"
        );

        let result = sqlx::query(&query)
            .bind(item.id.to_string())
            .bind(&item.name)
            .bind(&item.content_type)
            .bind(&item.blob_path)
            .bind(item.expiry_at)
            .bind(max_views)
            .bind(item.created_at)
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(item.id.to_string()));
        }
        Ok(())
    }

    async fn get(&self, id: &ItemId) -> Result<Option<ShareableItem>, StoreError> {
        let table = self.config.items_table();
        let query = format!(
            "SELECT id, name, content_type, blob_path, expiry_at, max_views, views, \
             is_active, is_removed, created_at \
             FROM {table} WHERE id = $1"
        );

        let row: Option<ItemRow> = sqlx::query_as(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        let Some((
            raw_id,
            name,
            content_type,
            blob_path,
            expiry_at,
            max_views,
            views,
            is_active,
            is_removed,
            created_at,
        )) = row
        else {
            return Ok(None);
        };

        Ok(Some(ShareableItem {
            id: parse_id(&raw_id)?,
            name,
            content_type,
            blob_path,
            expiry_at,
            max_views: max_views.map(|v| to_u32(v, "max_views")).transpose()?,
            views: to_u32(views, "views")?,
            is_active,
            is_removed,
            created_at,
        }))
    }

    async fn consume(&self, id: &ItemId, now: DateTime<Utc>) -> Result<ConsumeRecord, StoreError> {
        let function = self.config.consume_function();
        let query = format!(
            "SELECT status, blob_path, expiry_at, remaining_views, will_deactivate \
             FROM {function}($1, $2)"
        );

        let (status, blob_path, expiry_at, remaining_views, will_deactivate): ConsumeRow =
            sqlx::query_as(&query)
                .bind(id.to_string())
                .bind(now)
                .fetch_one(&self.pool)
                .await
                .map_err(backend)?;

        let status: ConsumeStatus = status.parse().map_err(StoreError::Serialization)?;
        if status != ConsumeStatus::Ok {
            return Ok(match status {
                ConsumeStatus::NotFound => ConsumeRecord::not_found(),
                _ => ConsumeRecord::expired(),
            });
        }

        Ok(ConsumeRecord {
            status,
            blob_path,
            expiry_at,
            remaining_views: remaining_views
                .map(|v| to_u32(v, "remaining_views"))
                .transpose()?,
            will_deactivate,
        })
    }

    async fn mark_removed(&self, id: &ItemId) -> Result<bool, StoreError> {
        let table = self.config.items_table();
        let query = format!(
            "UPDATE {table} \
             SET blob_path = NULL, is_removed = TRUE, is_active = FALSE \
             WHERE id = $1 AND (NOT is_removed OR blob_path IS NOT NULL OR is_active)"
        );

        let result = sqlx::query(&query)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        Ok(result.rows_affected() > 0)
    }

    async fn deactivate(&self, id: &ItemId) -> Result<bool, StoreError> {
        let table = self.config.items_table();
        let query = format!("UPDATE {table} SET is_active = FALSE WHERE id = $1 AND is_active");

        let result = sqlx::query(&query)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_reclaimable(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ReclaimCandidate>, StoreError> {
        let table = self.config.items_table();
        let query = format!(
            "SELECT id, blob_path FROM {table} \
             WHERE blob_path IS NOT NULL \
               AND (NOT is_active \
                    OR (expiry_at IS NOT NULL AND expiry_at <= $1) \
                    OR (max_views IS NOT NULL AND views >= max_views)) \
             ORDER BY created_at \
             LIMIT $2"
        );

        let rows: Vec<(String, String)> = sqlx::query_as(&query)
            .bind(now)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        rows.into_iter()
            .map(|(raw_id, blob_path)| {
                Ok(ReclaimCandidate {
                    id: parse_id(&raw_id)?,
                    blob_path,
                })
            })
            .collect()
    }
}

#[cfg(all(test, feature = "integration"))]
mod integration_tests {
    use super::*;

    fn test_config() -> PostgresConfig {
        PostgresConfig {
            url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost:5432/ephemera_test".to_string()),
            table_prefix: format!("test_{}_", uuid::Uuid::new_v4().simple()),
            ..PostgresConfig::default()
        }
    }

    #[tokio::test]
    async fn store_conformance() {
        let store = PostgresMetadataStore::new(test_config())
            .await
            .expect("pool creation should succeed");
        ephemera_store::testing::run_store_conformance_tests(&store)
            .await
            .expect("conformance tests should pass");
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let config = test_config();
        let store = PostgresMetadataStore::new(config.clone())
            .await
            .expect("pool creation should succeed");
        migrations::run_migrations(&store.pool, &config)
            .await
            .expect("second migration run should succeed");
    }
}
