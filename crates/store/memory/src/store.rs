use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use ephemera_core::{ConsumeRecord, ItemId, NewItem, ReclaimCandidate, ShareableItem};
use ephemera_store::error::StoreError;
use ephemera_store::store::MetadataStore;

/// In-memory [`MetadataStore`] backed by a [`DashMap`].
///
/// `consume` runs the state machine while holding the entry's shard write
/// lock, which makes it atomic within one process. Suitable for tests and
/// single-instance deployments only; state is lost on restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryMetadataStore {
    items: Arc<DashMap<ItemId, ShareableItem>>,
}

impl MemoryMetadataStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held, removed ones included.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn insert(&self, item: &NewItem) -> Result<(), StoreError> {
        match self.items.entry(item.id) {
            Entry::Occupied(_) => Err(StoreError::Conflict(item.id.to_string())),
            Entry::Vacant(vacant) => {
                vacant.insert(ShareableItem::from(item.clone()));
                Ok(())
            }
        }
    }

    async fn get(&self, id: &ItemId) -> Result<Option<ShareableItem>, StoreError> {
        Ok(self.items.get(id).map(|entry| entry.value().clone()))
    }

    async fn consume(&self, id: &ItemId, now: DateTime<Utc>) -> Result<ConsumeRecord, StoreError> {
        match self.items.get_mut(id) {
            Some(mut entry) => Ok(entry.try_consume(now)),
            None => Ok(ConsumeRecord::not_found()),
        }
    }

    async fn mark_removed(&self, id: &ItemId) -> Result<bool, StoreError> {
        Ok(self
            .items
            .get_mut(id)
            .is_some_and(|mut entry| entry.mark_removed()))
    }

    async fn deactivate(&self, id: &ItemId) -> Result<bool, StoreError> {
        let Some(mut entry) = self.items.get_mut(id) else {
            return Ok(false);
        };
        let was_active = entry.is_active;
        entry.is_active = false;
        Ok(was_active)
    }

    async fn list_reclaimable(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ReclaimCandidate>, StoreError> {
        Ok(self
            .items
            .iter()
            .filter_map(|entry| entry.value().reclaim_candidate(now))
            .take(limit)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeDelta;
    use ephemera_core::ConsumeStatus;
    use ephemera_store::testing::run_store_conformance_tests;

    use super::*;

    fn new_item(max_views: Option<u32>) -> NewItem {
        let id = ItemId::new();
        let now = Utc::now();
        NewItem {
            id,
            name: "a.png".into(),
            content_type: "image/png".into(),
            blob_path: format!("{id}/a.png"),
            expiry_at: Some(now + TimeDelta::hours(1)),
            max_views,
            created_at: now,
        }
    }

    #[tokio::test]
    async fn conformance() {
        let store = MemoryMetadataStore::new();
        run_store_conformance_tests(&store).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn spawned_racers_share_one_last_view() {
        let store = Arc::new(MemoryMetadataStore::new());
        let item = new_item(Some(1));
        store.insert(&item).await.unwrap();

        let now = Utc::now();
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let store = Arc::clone(&store);
                let id = item.id;
                tokio::spawn(async move { store.consume(&id, now).await })
            })
            .collect();

        let mut ok = 0;
        for result in futures::future::join_all(handles).await {
            if result.unwrap().unwrap().status == ConsumeStatus::Ok {
                ok += 1;
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(store.get(&item.id).await.unwrap().unwrap().views, 1);
    }

    #[tokio::test]
    async fn clones_share_state() {
        let store = MemoryMetadataStore::new();
        let clone = store.clone();
        store.insert(&new_item(Some(1))).await.unwrap();
        assert_eq!(clone.len(), 1);
        assert!(!clone.is_empty());
    }
}
