use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use super::config::RateLimitConfig;

/// Bucket shared by new origins once the tracking table is full.
pub const OVERFLOW_BUCKET: &str = "_overflow";

/// Result of an admitted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitResult {
    /// The configured limit per window.
    pub limit: u64,
    /// Requests left in the current window.
    pub remaining: u64,
    /// Seconds until the current window resets.
    pub reset_after: u64,
}

/// Error returned when an origin has used up its window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitExceeded {
    /// Seconds until the caller can retry.
    pub retry_after: u64,
    /// The configured limit.
    pub limit: u64,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u64,
}

/// In-process fixed-window rate limiter keyed by origin.
///
/// State lives in this process only. Several instances behind a load
/// balancer each admit their own quota.
#[derive(Debug)]
pub struct RateLimiter {
    windows: DashMap<String, Window>,
    limit: u64,
    window: Duration,
    max_tracked: usize,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            windows: DashMap::new(),
            limit: config.requests_per_window.max(1),
            window: Duration::from_secs(config.window_seconds.max(1)),
            max_tracked: config.max_tracked_origins.max(1),
        }
    }

    /// Number of origins currently tracked.
    pub fn tracked(&self) -> usize {
        self.windows.len()
    }

    /// Count one request from `origin`, admitting it if the window has room.
    pub fn check(&self, origin: &str) -> Result<RateLimitResult, RateLimitExceeded> {
        let now = Instant::now();
        let key = self.bucket_for(origin, now);

        let mut entry = self.windows.entry(key).or_insert(Window {
            started: now,
            count: 0,
        });
        let window = entry.value_mut();

        if now.duration_since(window.started) >= self.window {
            *window = Window {
                started: now,
                count: 0,
            };
        }

        let reset_after = self.seconds_until_reset(window.started, now);
        if window.count >= self.limit {
            return Err(RateLimitExceeded {
                retry_after: reset_after.max(1),
                limit: self.limit,
            });
        }

        window.count += 1;
        Ok(RateLimitResult {
            limit: self.limit,
            remaining: self.limit - window.count,
            reset_after,
        })
    }

    /// Drop windows that have already rolled over.
    pub fn prune(&self, now: Instant) {
        self.windows
            .retain(|_, w| now.duration_since(w.started) < self.window);
    }

    fn bucket_for(&self, origin: &str, now: Instant) -> String {
        if self.windows.contains_key(origin) || self.windows.len() < self.max_tracked {
            return origin.to_owned();
        }
        self.prune(now);
        if self.windows.len() < self.max_tracked {
            origin.to_owned()
        } else {
            tracing::warn!(
                tracked = self.windows.len(),
                "rate limiter table full, using overflow bucket"
            );
            OVERFLOW_BUCKET.to_owned()
        }
    }

    fn seconds_until_reset(&self, started: Instant, now: Instant) -> u64 {
        let left = self.window.saturating_sub(now.duration_since(started));
        left.as_secs() + u64::from(left.subsec_nanos() > 0)
    }
}
