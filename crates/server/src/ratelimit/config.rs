use serde::Deserialize;

/// Per-origin upload rate limit, the `[rate_limit]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Whether uploads are rate limited at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Maximum uploads admitted per origin per window.
    #[serde(default = "default_requests")]
    pub requests_per_window: u64,
    /// Window duration in seconds.
    #[serde(default = "default_window")]
    pub window_seconds: u64,
    /// Upper bound on distinct origins tracked at once.
    #[serde(default = "default_max_tracked")]
    pub max_tracked_origins: usize,
    /// Identify origins by the first `X-Forwarded-For` entry.
    ///
    /// Only enable this behind a proxy that overwrites the header.
    #[serde(default = "default_trust_forwarded")]
    pub trust_forwarded_for: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            requests_per_window: default_requests(),
            window_seconds: default_window(),
            max_tracked_origins: default_max_tracked(),
            trust_forwarded_for: default_trust_forwarded(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_requests() -> u64 {
    5
}

fn default_window() -> u64 {
    60
}

fn default_max_tracked() -> usize {
    10_000
}

fn default_trust_forwarded() -> bool {
    true
}
