use std::time::Duration;

use ephemera_core::ItemId;

/// Connection settings and key layout for the Redis metadata store.
///
/// Every key is wrapped in a `{prefix}` hash tag. The consume and reclaim
/// scripts touch an item hash together with the shared held set, so all of
/// them must hash to one slot.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g. `redis://127.0.0.1:6379`).
    pub url: String,

    /// Namespace for every key; becomes the hash tag.
    pub prefix: String,

    /// Number of connections in the `deadpool-redis` pool.
    pub pool_size: usize,

    /// Timeout for acquiring a pooled connection.
    pub connection_timeout: Duration,
}

impl RedisConfig {
    /// Prefix of every item hash; the item id is appended.
    pub fn item_key_prefix(&self) -> String {
        format!("{{{}}}:item:", self.prefix)
    }

    /// Hash holding one item's metadata.
    pub fn item_key(&self, id: &ItemId) -> String {
        format!("{}{id}", self.item_key_prefix())
    }

    /// Sorted set of items whose blob may still be on storage.
    pub fn held_key(&self) -> String {
        format!("{{{}}}:items:held", self.prefix)
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: String::from("redis://127.0.0.1:6379"),
            prefix: String::from("ephemera"),
            pool_size: 16,
            connection_timeout: Duration::from_secs(3),
        }
    }
}
