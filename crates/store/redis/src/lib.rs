//! Redis metadata backend for Ephemera.
//!
//! Each item is a Redis hash. Every operation that reads and then writes an
//! item runs as one Lua script, so Redis executes it without interleaving
//! and a consume is a single `EVALSHA` round trip.
//!
//! A set of item ids that still hold a blob backs reclamation scans. The
//! reclaim script reads item hashes that are not declared in `KEYS`, so the
//! backend targets standalone or Sentinel deployments, not Redis Cluster.
//!
//! # Example
//!
//! ```ignore
//! use ephemera_store_redis::{RedisConfig, RedisMetadataStore};
//!
//! let config = RedisConfig::default();
//! let store = RedisMetadataStore::new(&config)?;
//! ```

mod config;
mod scripts;
mod store;

pub use config::RedisConfig;
pub use store::RedisMetadataStore;
