use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Bounds applied to every upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestPolicy {
    /// Largest accepted payload, in bytes.
    pub max_upload_bytes: usize,
    pub min_ttl_seconds: u64,
    pub max_ttl_seconds: u64,
    pub min_views: u32,
    pub max_views: u32,
    /// TTL used when the request omits one.
    pub default_ttl_seconds: u64,
    /// View ceiling used when the request omits one.
    pub default_max_views: u32,
}

impl Default for IngestPolicy {
    fn default() -> Self {
        Self {
            max_upload_bytes: 8 * 1024 * 1024,
            min_ttl_seconds: 60,
            max_ttl_seconds: 7 * 24 * 3600,
            min_views: 1,
            max_views: 50,
            default_ttl_seconds: 3600,
            default_max_views: 1,
        }
    }
}

impl IngestPolicy {
    /// Fill in defaults for omitted bounds.
    #[must_use]
    pub fn resolve(&self, ttl_seconds: Option<u64>, max_views: Option<u32>) -> (u64, u32) {
        (
            ttl_seconds.unwrap_or(self.default_ttl_seconds),
            max_views.unwrap_or(self.default_max_views),
        )
    }

    /// Reject payloads and bounds outside policy.
    pub fn validate(
        &self,
        payload_len: usize,
        ttl_seconds: u64,
        max_views: u32,
    ) -> Result<(), ValidationError> {
        if payload_len == 0 {
            return Err(ValidationError::EmptyPayload);
        }
        if payload_len > self.max_upload_bytes {
            return Err(ValidationError::PayloadTooLarge {
                size: payload_len,
                max: self.max_upload_bytes,
            });
        }
        if !(self.min_ttl_seconds..=self.max_ttl_seconds).contains(&ttl_seconds) {
            return Err(ValidationError::TtlOutOfRange {
                value: ttl_seconds,
                min: self.min_ttl_seconds,
                max: self.max_ttl_seconds,
            });
        }
        if !(self.min_views..=self.max_views).contains(&max_views) {
            return Err(ValidationError::ViewsOutOfRange {
                value: max_views,
                min: self.min_views,
                max: self.max_views,
            });
        }
        Ok(())
    }

    /// Absolute expiry for a TTL starting at `now`.
    #[must_use]
    pub fn expiry_for(now: DateTime<Utc>, ttl_seconds: u64) -> DateTime<Utc> {
        i64::try_from(ttl_seconds)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Lifetime arithmetic for issued access links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    /// Hard ceiling on a signed link's validity.
    pub max_link_seconds: u64,
    /// Reported `secondsLeft` for items without an expiry.
    pub default_window_seconds: u64,
    /// Extra wait after a link lapses before its blob is deleted.
    pub deletion_grace_seconds: u64,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            max_link_seconds: 300,
            default_window_seconds: 300,
            deletion_grace_seconds: 5,
        }
    }
}

impl AccessPolicy {
    /// Whole seconds until `expiry_at`, rounded up and floored at zero.
    #[must_use]
    pub fn seconds_left(&self, expiry_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> u64 {
        let Some(expiry_at) = expiry_at else {
            return self.default_window_seconds;
        };
        let remaining_ms = (expiry_at - now).num_milliseconds();
        if remaining_ms <= 0 {
            return 0;
        }
        u64::try_from(remaining_ms).map_or(0, |ms| ms.div_ceil(1000))
    }

    /// Validity of the signed link: `seconds_left` clamped to `[1, max_link_seconds]`.
    #[must_use]
    pub fn link_lifetime(&self, seconds_left: u64) -> Duration {
        Duration::from_secs(seconds_left.clamp(1, self.max_link_seconds.max(1)))
    }

    /// How long to wait before deleting a blob whose last link was just issued.
    #[must_use]
    pub fn deletion_delay(&self, link_lifetime: Duration) -> Duration {
        link_lifetime + Duration::from_secs(self.deletion_grace_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bounds() {
        let p = IngestPolicy::default();
        assert_eq!(p.max_upload_bytes, 8 * 1024 * 1024);
        assert_eq!((p.min_ttl_seconds, p.max_ttl_seconds), (60, 604_800));
        assert_eq!((p.min_views, p.max_views), (1, 50));
        assert_eq!(p.resolve(None, None), (3600, 1));
        assert_eq!(p.resolve(Some(120), Some(4)), (120, 4));
    }

    #[test]
    fn validate_accepts_edges() {
        let p = IngestPolicy::default();
        assert!(p.validate(1, 60, 1).is_ok());
        assert!(p.validate(p.max_upload_bytes, 604_800, 50).is_ok());
    }

    #[test]
    fn validate_rejects_out_of_range() {
        let p = IngestPolicy::default();
        assert_eq!(p.validate(0, 3600, 1), Err(ValidationError::EmptyPayload));
        assert!(matches!(
            p.validate(p.max_upload_bytes + 1, 3600, 1),
            Err(ValidationError::PayloadTooLarge { .. })
        ));
        assert!(matches!(
            p.validate(10, 59, 1),
            Err(ValidationError::TtlOutOfRange { value: 59, .. })
        ));
        assert!(matches!(
            p.validate(10, 604_801, 1),
            Err(ValidationError::TtlOutOfRange { .. })
        ));
        assert!(matches!(
            p.validate(10, 3600, 0),
            Err(ValidationError::ViewsOutOfRange { value: 0, .. })
        ));
        assert!(matches!(
            p.validate(10, 3600, 51),
            Err(ValidationError::ViewsOutOfRange { value: 51, .. })
        ));
    }

    #[test]
    fn seconds_left_rounds_up() {
        let p = AccessPolicy::default();
        let now = Utc::now();
        assert_eq!(p.seconds_left(Some(now + TimeDelta::milliseconds(1)), now), 1);
        assert_eq!(p.seconds_left(Some(now + TimeDelta::milliseconds(1500)), now), 2);
        assert_eq!(p.seconds_left(Some(now + TimeDelta::seconds(3600)), now), 3600);
    }

    #[test]
    fn seconds_left_floors_at_zero_and_defaults() {
        let p = AccessPolicy::default();
        let now = Utc::now();
        assert_eq!(p.seconds_left(Some(now), now), 0);
        assert_eq!(p.seconds_left(Some(now - TimeDelta::seconds(5)), now), 0);
        assert_eq!(p.seconds_left(None, now), 300);
    }

    #[test]
    fn link_lifetime_is_clamped() {
        let p = AccessPolicy::default();
        assert_eq!(p.link_lifetime(0), Duration::from_secs(1));
        assert_eq!(p.link_lifetime(42), Duration::from_secs(42));
        assert_eq!(p.link_lifetime(3600), Duration::from_secs(300));
    }

    #[test]
    fn deletion_delay_adds_grace() {
        let p = AccessPolicy::default();
        assert_eq!(
            p.deletion_delay(Duration::from_secs(300)),
            Duration::from_secs(305)
        );
    }
}
