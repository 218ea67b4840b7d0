use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ephemera_core::{ConsumeRecord, ItemId, NewItem, ReclaimCandidate, ShareableItem};

use crate::error::StoreError;

/// Durable record keeping for shareable items.
///
/// Implementations must be `Send + Sync` and safe for concurrent access from
/// many tasks and many processes. Every method that takes `now` uses it as
/// the only notion of current time, so expiry decisions stay consistent with
/// the caller's clock.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Create a record in the ACTIVE state with zero views.
    ///
    /// Returns [`StoreError::Conflict`] if the id is already taken.
    async fn insert(&self, item: &NewItem) -> Result<(), StoreError>;

    /// Fetch a record. Removed records are still returned.
    async fn get(&self, id: &ItemId) -> Result<Option<ShareableItem>, StoreError>;

    /// Atomically check and, if permitted, spend one view.
    ///
    /// - missing or removed row: `NotFound`
    /// - inactive, `expiry_at <= now`, or `views >= max_views`: `Expired`,
    ///   with no mutation
    /// - otherwise `views += 1`; if that reaches `max_views` the row is
    ///   deactivated in the same step and `will_deactivate` is set
    ///
    /// The decision and the write must happen in a single round trip.
    async fn consume(&self, id: &ItemId, now: DateTime<Utc>) -> Result<ConsumeRecord, StoreError>;

    /// Record that the blob is gone: `blob_path = null`, `is_removed = true`,
    /// `is_active = false`.
    ///
    /// Idempotent. Returns `true` if the row existed and was not already in
    /// that state.
    async fn mark_removed(&self, id: &ItemId) -> Result<bool, StoreError>;

    /// Flip an item to inactive without touching its views.
    ///
    /// Returns `true` if the item was active.
    async fn deactivate(&self, id: &ItemId) -> Result<bool, StoreError>;

    /// Up to `limit` rows that still hold a blob and are eligible for
    /// reclamation at `now`.
    async fn list_reclaimable(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ReclaimCandidate>, StoreError>;
}
