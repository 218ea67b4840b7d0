use std::time::Duration;

use serde::Deserialize;

use ephemera_broker::ReaperConfig;
use ephemera_core::{AccessPolicy, IngestPolicy};

/// Upload bounds.
#[derive(Debug, Deserialize)]
pub struct IngestConfig {
    /// Decoded payload ceiling in megabytes.
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
    #[serde(default = "default_min_ttl")]
    pub min_ttl_seconds: u64,
    #[serde(default = "default_max_ttl")]
    pub max_ttl_seconds: u64,
    #[serde(default = "default_min_views")]
    pub min_views: u32,
    #[serde(default = "default_max_views")]
    pub max_views: u32,
    /// TTL applied when an upload omits `expirySeconds`.
    #[serde(default = "default_ttl")]
    pub default_ttl_seconds: u64,
    /// View ceiling applied when an upload omits `maxViews`.
    #[serde(default = "default_views")]
    pub default_max_views: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_upload_mb: default_max_upload_mb(),
            min_ttl_seconds: default_min_ttl(),
            max_ttl_seconds: default_max_ttl(),
            min_views: default_min_views(),
            max_views: default_max_views(),
            default_ttl_seconds: default_ttl(),
            default_max_views: default_views(),
        }
    }
}

impl IngestConfig {
    pub fn policy(&self) -> IngestPolicy {
        IngestPolicy {
            max_upload_bytes: self.max_upload_mb.saturating_mul(1024 * 1024),
            min_ttl_seconds: self.min_ttl_seconds,
            max_ttl_seconds: self.max_ttl_seconds,
            min_views: self.min_views,
            max_views: self.max_views,
            default_ttl_seconds: self.default_ttl_seconds,
            default_max_views: self.default_max_views,
        }
    }
}

/// Signed link lifetime and deferred deletion timing.
#[derive(Debug, Deserialize)]
pub struct AccessConfig {
    /// Ceiling on any issued signed link.
    #[serde(default = "default_max_link")]
    pub max_link_seconds: u64,
    /// `secondsLeft` reported for items without an expiry.
    #[serde(default = "default_window")]
    pub default_window_seconds: u64,
    /// Extra wait after a final link expires before its blob is deleted.
    #[serde(default = "default_grace")]
    pub deletion_grace_seconds: u64,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            max_link_seconds: default_max_link(),
            default_window_seconds: default_window(),
            deletion_grace_seconds: default_grace(),
        }
    }
}

impl AccessConfig {
    pub fn policy(&self) -> AccessPolicy {
        AccessPolicy {
            max_link_seconds: self.max_link_seconds,
            default_window_seconds: self.default_window_seconds,
            deletion_grace_seconds: self.deletion_grace_seconds,
        }
    }
}

/// Reclamation sweeper configuration.
#[derive(Debug, Deserialize)]
pub struct SweeperConfig {
    /// Run the sweeper periodically in the background.
    #[serde(default = "default_sweeper_enabled")]
    pub enabled: bool,
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,
    /// Most candidates examined per pass.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Most blob deletions in flight at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Shared secret for `POST /v1/sweep` and `DELETE /v1/items/{id}`.
    ///
    /// Falls back to `EPHEMERA_SWEEP_SECRET`. When unset, both endpoints
    /// reject every request.
    pub secret: Option<String>,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: default_sweeper_enabled(),
            interval_seconds: default_interval(),
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            secret: None,
        }
    }
}

impl SweeperConfig {
    pub fn reaper_config(&self) -> ReaperConfig {
        ReaperConfig {
            batch_size: self.batch_size,
            concurrency: self.concurrency,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds.max(1))
    }
}

fn default_max_upload_mb() -> usize {
    8
}

fn default_min_ttl() -> u64 {
    60
}

fn default_max_ttl() -> u64 {
    7 * 24 * 60 * 60
}

fn default_min_views() -> u32 {
    1
}

fn default_max_views() -> u32 {
    50
}

fn default_ttl() -> u64 {
    3600
}

fn default_views() -> u32 {
    1
}

fn default_max_link() -> u64 {
    300
}

fn default_window() -> u64 {
    300
}

fn default_grace() -> u64 {
    5
}

fn default_sweeper_enabled() -> bool {
    true
}

fn default_interval() -> u64 {
    300
}

fn default_batch_size() -> usize {
    1000
}

fn default_concurrency() -> usize {
    16
}
