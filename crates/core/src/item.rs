use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ItemId;

/// One uploaded payload plus its access policy and consumption state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ShareableItem {
    pub id: ItemId,
    /// Display name supplied at upload.
    pub name: String,
    pub content_type: String,
    /// Key into the blob store. Cleared once the blob has been reclaimed.
    pub blob_path: Option<String>,
    /// Absolute expiry. `None` means view count is the only bound.
    pub expiry_at: Option<DateTime<Utc>>,
    /// Ceiling on successful consumptions. `None` means unlimited.
    pub max_views: Option<u32>,
    /// Successful consumptions so far.
    pub views: u32,
    /// `false` once the item is logically gone. Never flips back.
    pub is_active: bool,
    /// `true` only after the blob has been deleted.
    pub is_removed: bool,
    pub created_at: DateTime<Utc>,
}

impl ShareableItem {
    /// Whether the time bound has passed.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry_at.is_some_and(|at| at <= now)
    }

    /// Whether every permitted view has been spent.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.max_views.is_some_and(|max| self.views >= max)
    }

    /// Views still available, or `None` when unlimited.
    #[must_use]
    pub fn remaining_views(&self) -> Option<u32> {
        self.max_views.map(|max| max.saturating_sub(self.views))
    }

    /// Eligibility for reclamation: inactive, expired, or exhausted.
    #[must_use]
    pub fn is_reclaimable(&self, now: DateTime<Utc>) -> bool {
        !self.is_active || self.is_expired(now) || self.is_exhausted()
    }

    /// Apply the consume state machine to this row in place.
    ///
    /// Backends without a native transactional primitive call this while
    /// holding exclusive access to the row; the others encode the same
    /// rules in a stored procedure or script.
    pub fn try_consume(&mut self, now: DateTime<Utc>) -> ConsumeRecord {
        if self.is_removed {
            return ConsumeRecord::not_found();
        }
        if !self.is_active || self.is_expired(now) || self.is_exhausted() {
            return ConsumeRecord::expired();
        }

        self.views += 1;
        let will_deactivate = self.max_views == Some(self.views);
        if will_deactivate {
            self.is_active = false;
        }

        ConsumeRecord {
            status: ConsumeStatus::Ok,
            blob_path: self.blob_path.clone(),
            expiry_at: self.expiry_at,
            remaining_views: self.remaining_views(),
            will_deactivate,
        }
    }

    /// Apply the terminal "blob reclaimed" transition.
    ///
    /// Returns `true` if the row changed.
    pub fn mark_removed(&mut self) -> bool {
        let changed = !self.is_removed || self.blob_path.is_some() || self.is_active;
        self.blob_path = None;
        self.is_removed = true;
        self.is_active = false;
        changed
    }

    /// Project the fields the sweeper needs, if the row is still holding a blob.
    #[must_use]
    pub fn reclaim_candidate(&self, now: DateTime<Utc>) -> Option<ReclaimCandidate> {
        let blob_path = self.blob_path.as_ref()?;
        self.is_reclaimable(now).then(|| ReclaimCandidate {
            id: self.id,
            blob_path: blob_path.clone(),
        })
    }
}

/// Everything needed to create a new item record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItem {
    pub id: ItemId,
    pub name: String,
    pub content_type: String,
    pub blob_path: String,
    pub expiry_at: Option<DateTime<Utc>>,
    pub max_views: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl From<NewItem> for ShareableItem {
    fn from(new: NewItem) -> Self {
        Self {
            id: new.id,
            name: new.name,
            content_type: new.content_type,
            blob_path: Some(new.blob_path),
            expiry_at: new.expiry_at,
            max_views: new.max_views,
            views: 0,
            is_active: true,
            is_removed: false,
            created_at: new.created_at,
        }
    }
}

/// A row the sweeper should reclaim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReclaimCandidate {
    pub id: ItemId,
    pub blob_path: String,
}

/// Outcome of the atomic consume operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ConsumeStatus {
    /// One view was spent.
    Ok,
    /// No such item, or its blob is already gone.
    NotFound,
    /// Inactive, past its expiry, or out of views. Nothing was mutated.
    Expired,
}

impl ConsumeStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::NotFound => "not_found",
            Self::Expired => "expired",
        }
    }
}

impl std::str::FromStr for ConsumeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(Self::Ok),
            "not_found" => Ok(Self::NotFound),
            "expired" => Ok(Self::Expired),
            other => Err(format!("unknown consume status: {other}")),
        }
    }
}

/// What a metadata store reports back from one consume round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumeRecord {
    pub status: ConsumeStatus,
    pub blob_path: Option<String>,
    pub expiry_at: Option<DateTime<Utc>>,
    pub remaining_views: Option<u32>,
    /// This consumption was the last one the policy permits.
    pub will_deactivate: bool,
}

impl ConsumeRecord {
    #[must_use]
    pub fn not_found() -> Self {
        Self::denied(ConsumeStatus::NotFound)
    }

    #[must_use]
    pub fn expired() -> Self {
        Self::denied(ConsumeStatus::Expired)
    }

    fn denied(status: ConsumeStatus) -> Self {
        Self {
            status,
            blob_path: None,
            expiry_at: None,
            remaining_views: None,
            will_deactivate: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    fn item(max_views: Option<u32>, ttl_secs: Option<i64>, now: DateTime<Utc>) -> ShareableItem {
        let id = ItemId::new();
        ShareableItem::from(NewItem {
            id,
            name: "shot.png".into(),
            content_type: "image/png".into(),
            blob_path: format!("{id}/shot.png"),
            expiry_at: ttl_secs.map(|s| now + TimeDelta::seconds(s)),
            max_views,
            created_at: now,
        })
    }

    #[test]
    fn new_item_starts_active_with_zero_views() {
        let now = Utc::now();
        let it = item(Some(3), Some(60), now);
        assert!(it.is_active);
        assert!(!it.is_removed);
        assert_eq!(it.views, 0);
        assert_eq!(it.remaining_views(), Some(3));
        assert!(!it.is_reclaimable(now));
    }

    #[test]
    fn consume_counts_down_and_deactivates_on_last_view() {
        let now = Utc::now();
        let mut it = item(Some(2), Some(60), now);

        let first = it.try_consume(now);
        assert_eq!(first.status, ConsumeStatus::Ok);
        assert_eq!(first.remaining_views, Some(1));
        assert!(!first.will_deactivate);
        assert!(it.is_active);

        let second = it.try_consume(now);
        assert_eq!(second.status, ConsumeStatus::Ok);
        assert_eq!(second.remaining_views, Some(0));
        assert!(second.will_deactivate);
        assert!(!it.is_active);

        let third = it.try_consume(now);
        assert_eq!(third.status, ConsumeStatus::Expired);
        assert_eq!(it.views, 2);
    }

    #[test]
    fn expired_item_is_not_mutated() {
        let now = Utc::now();
        let mut it = item(Some(5), Some(1), now);
        let later = now + TimeDelta::seconds(2);

        let rec = it.try_consume(later);
        assert_eq!(rec, ConsumeRecord::expired());
        assert_eq!(it.views, 0);
        assert!(it.is_active);
        assert!(it.is_reclaimable(later));
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let now = Utc::now();
        let mut it = item(None, Some(10), now);
        let at_expiry = now + TimeDelta::seconds(10);
        assert!(it.is_expired(at_expiry));
        assert_eq!(it.try_consume(at_expiry).status, ConsumeStatus::Expired);
    }

    #[test]
    fn unlimited_views_never_deactivate() {
        let now = Utc::now();
        let mut it = item(None, None, now);
        for _ in 0..100 {
            let rec = it.try_consume(now);
            assert_eq!(rec.status, ConsumeStatus::Ok);
            assert_eq!(rec.remaining_views, None);
            assert!(!rec.will_deactivate);
        }
        assert_eq!(it.views, 100);
        assert!(!it.is_reclaimable(now));
    }

    #[test]
    fn removed_item_reports_not_found() {
        let now = Utc::now();
        let mut it = item(Some(1), Some(60), now);
        assert!(it.mark_removed());
        assert!(it.blob_path.is_none());
        assert_eq!(it.try_consume(now), ConsumeRecord::not_found());
        assert!(!it.mark_removed());
    }

    #[test]
    fn reclaim_candidate_requires_blob_and_eligibility() {
        let now = Utc::now();
        let mut it = item(Some(1), Some(60), now);
        assert!(it.reclaim_candidate(now).is_none());

        it.try_consume(now);
        let candidate = it.reclaim_candidate(now).unwrap();
        assert_eq!(candidate.id, it.id);

        it.mark_removed();
        assert!(it.reclaim_candidate(now).is_none());
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            ConsumeStatus::Ok,
            ConsumeStatus::NotFound,
            ConsumeStatus::Expired,
        ] {
            assert_eq!(status.as_str().parse::<ConsumeStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<ConsumeStatus>().is_err());
    }
}
