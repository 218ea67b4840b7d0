use chrono::{DateTime, TimeDelta, Utc};
use futures::future::join_all;

use ephemera_core::{ConsumeStatus, ItemId, NewItem};

use crate::error::StoreError;
use crate::store::MetadataStore;

fn new_item(now: DateTime<Utc>, ttl_secs: Option<i64>, max_views: Option<u32>) -> NewItem {
    let id = ItemId::new();
    NewItem {
        id,
        name: "conformance.png".into(),
        content_type: "image/png".into(),
        blob_path: format!("{id}/conformance.png"),
        expiry_at: ttl_secs.map(|s| now + TimeDelta::seconds(s)),
        max_views,
        created_at: now,
    }
}

/// Run the full metadata store conformance test suite.
///
/// Call this from your backend's test module with a fresh store instance.
/// Every test works on freshly generated ids, so the suite can run against
/// a shared database.
///
/// # Errors
///
/// Returns an error if a store operation fails. Behavioural mismatches panic.
pub async fn run_store_conformance_tests(store: &dyn MetadataStore) -> Result<(), StoreError> {
    test_get_missing(store).await?;
    test_insert_and_get(store).await?;
    test_insert_duplicate(store).await?;
    test_consume_missing(store).await?;
    test_consume_counts_down(store).await?;
    test_consume_expired(store).await?;
    test_consume_unlimited(store).await?;
    test_consume_after_deactivate(store).await?;
    test_consume_after_removed(store).await?;
    test_mark_removed_idempotent(store).await?;
    test_list_reclaimable(store).await?;
    test_list_reclaimable_limit(store).await?;
    test_concurrent_last_view(store).await?;
    Ok(())
}

async fn test_get_missing(store: &dyn MetadataStore) -> Result<(), StoreError> {
    let found = store.get(&ItemId::new()).await?;
    assert!(found.is_none(), "get on missing id should return None");
    Ok(())
}

async fn test_insert_and_get(store: &dyn MetadataStore) -> Result<(), StoreError> {
    let now = Utc::now();
    let new = new_item(now, Some(3600), Some(3));
    store.insert(&new).await?;

    let item = store.get(&new.id).await?.expect("inserted item should exist");
    assert_eq!(item.id, new.id);
    assert_eq!(item.name, new.name);
    assert_eq!(item.content_type, new.content_type);
    assert_eq!(item.blob_path.as_deref(), Some(new.blob_path.as_str()));
    assert_eq!(item.max_views, Some(3));
    assert_eq!(item.views, 0);
    assert!(item.is_active);
    assert!(!item.is_removed);
    let expiry = item.expiry_at.expect("expiry should be stored");
    let drift = (expiry - new.expiry_at.unwrap_or(expiry)).num_milliseconds().abs();
    assert!(drift <= 1, "expiry should round-trip to the millisecond");
    Ok(())
}

async fn test_insert_duplicate(store: &dyn MetadataStore) -> Result<(), StoreError> {
    let new = new_item(Utc::now(), Some(3600), Some(1));
    store.insert(&new).await?;
    let err = store.insert(&new).await;
    assert!(
        matches!(err, Err(StoreError::Conflict(_))),
        "duplicate insert should conflict, got {err:?}"
    );
    Ok(())
}

async fn test_consume_missing(store: &dyn MetadataStore) -> Result<(), StoreError> {
    let rec = store.consume(&ItemId::new(), Utc::now()).await?;
    assert_eq!(rec.status, ConsumeStatus::NotFound);
    Ok(())
}

async fn test_consume_counts_down(store: &dyn MetadataStore) -> Result<(), StoreError> {
    let now = Utc::now();
    let new = new_item(now, Some(3600), Some(3));
    store.insert(&new).await?;

    for expected_remaining in [2, 1, 0] {
        let rec = store.consume(&new.id, now).await?;
        assert_eq!(rec.status, ConsumeStatus::Ok);
        assert_eq!(rec.remaining_views, Some(expected_remaining));
        assert_eq!(rec.will_deactivate, expected_remaining == 0);
        assert_eq!(rec.blob_path.as_deref(), Some(new.blob_path.as_str()));
        assert!(rec.expiry_at.is_some());
    }

    let rec = store.consume(&new.id, now).await?;
    assert_eq!(rec.status, ConsumeStatus::Expired, "fourth view must be denied");

    let item = store.get(&new.id).await?.expect("item should exist");
    assert_eq!(item.views, 3);
    assert!(!item.is_active);
    Ok(())
}

async fn test_consume_expired(store: &dyn MetadataStore) -> Result<(), StoreError> {
    let now = Utc::now();
    let new = new_item(now, Some(60), Some(5));
    store.insert(&new).await?;

    let later = now + TimeDelta::seconds(61);
    let rec = store.consume(&new.id, later).await?;
    assert_eq!(rec.status, ConsumeStatus::Expired);

    let item = store.get(&new.id).await?.expect("item should exist");
    assert_eq!(item.views, 0, "expired consume must not mutate");
    assert!(item.is_active, "expired consume must not deactivate");
    Ok(())
}

async fn test_consume_unlimited(store: &dyn MetadataStore) -> Result<(), StoreError> {
    let now = Utc::now();
    let new = new_item(now, None, None);
    store.insert(&new).await?;

    for _ in 0..5 {
        let rec = store.consume(&new.id, now).await?;
        assert_eq!(rec.status, ConsumeStatus::Ok);
        assert_eq!(rec.remaining_views, None);
        assert_eq!(rec.expiry_at, None);
        assert!(!rec.will_deactivate);
    }
    let item = store.get(&new.id).await?.expect("item should exist");
    assert_eq!(item.views, 5);
    assert!(item.is_active);
    Ok(())
}

async fn test_consume_after_deactivate(store: &dyn MetadataStore) -> Result<(), StoreError> {
    let now = Utc::now();
    let new = new_item(now, Some(3600), Some(5));
    store.insert(&new).await?;

    assert!(store.deactivate(&new.id).await?);
    assert!(!store.deactivate(&new.id).await?, "second deactivate is a no-op");
    assert!(!store.deactivate(&ItemId::new()).await?);

    let rec = store.consume(&new.id, now).await?;
    assert_eq!(rec.status, ConsumeStatus::Expired);
    Ok(())
}

async fn test_consume_after_removed(store: &dyn MetadataStore) -> Result<(), StoreError> {
    let now = Utc::now();
    let new = new_item(now, Some(3600), Some(5));
    store.insert(&new).await?;
    store.mark_removed(&new.id).await?;

    let rec = store.consume(&new.id, now).await?;
    assert_eq!(rec.status, ConsumeStatus::NotFound);
    Ok(())
}

async fn test_mark_removed_idempotent(store: &dyn MetadataStore) -> Result<(), StoreError> {
    let now = Utc::now();
    let new = new_item(now, Some(3600), Some(1));
    store.insert(&new).await?;

    assert!(store.mark_removed(&new.id).await?);
    assert!(!store.mark_removed(&new.id).await?, "second mark is a no-op");
    assert!(!store.mark_removed(&ItemId::new()).await?);

    let item = store.get(&new.id).await?.expect("removed rows are kept");
    assert!(item.blob_path.is_none());
    assert!(item.is_removed);
    assert!(!item.is_active);
    Ok(())
}

async fn test_list_reclaimable(store: &dyn MetadataStore) -> Result<(), StoreError> {
    let now = Utc::now();

    let live = new_item(now, Some(3600), Some(2));
    let exhausted = new_item(now, Some(3600), Some(1));
    let expired = new_item(now - TimeDelta::seconds(120), Some(60), Some(3));
    let deactivated = new_item(now, None, None);
    let removed = new_item(now, Some(3600), Some(1));
    for item in [&live, &exhausted, &expired, &deactivated, &removed] {
        store.insert(item).await?;
    }
    store.consume(&exhausted.id, now).await?;
    store.deactivate(&deactivated.id).await?;
    store.consume(&removed.id, now).await?;
    store.mark_removed(&removed.id).await?;

    let candidates = store.list_reclaimable(now, 10_000).await?;
    let ids: Vec<ItemId> = candidates.iter().map(|c| c.id).collect();

    assert!(!ids.contains(&live.id), "live item must not be reclaimed");
    assert!(ids.contains(&exhausted.id), "exhausted item is reclaimable");
    assert!(ids.contains(&expired.id), "expired item is reclaimable");
    assert!(ids.contains(&deactivated.id), "deactivated item is reclaimable");
    assert!(!ids.contains(&removed.id), "removed item has no blob left");

    let exhausted_candidate = candidates
        .iter()
        .find(|c| c.id == exhausted.id)
        .expect("exhausted candidate present");
    assert_eq!(exhausted_candidate.blob_path, exhausted.blob_path);
    Ok(())
}

async fn test_list_reclaimable_limit(store: &dyn MetadataStore) -> Result<(), StoreError> {
    let now = Utc::now();
    for _ in 0..3 {
        let item = new_item(now, None, None);
        store.insert(&item).await?;
        store.deactivate(&item.id).await?;
    }
    let candidates = store.list_reclaimable(now, 2).await?;
    assert!(candidates.len() <= 2, "limit must be honoured");
    assert!(!candidates.is_empty());
    Ok(())
}

async fn test_concurrent_last_view(store: &dyn MetadataStore) -> Result<(), StoreError> {
    let now = Utc::now();
    let new = new_item(now, Some(3600), Some(2));
    store.insert(&new).await?;
    store.consume(&new.id, now).await?;

    // One slot left; race sixteen viewers for it.
    let results = join_all((0..16).map(|_| store.consume(&new.id, now))).await;
    let mut granted = 0;
    let mut deactivations = 0;
    for rec in results {
        let rec = rec?;
        match rec.status {
            ConsumeStatus::Ok => {
                granted += 1;
                if rec.will_deactivate {
                    deactivations += 1;
                }
            }
            ConsumeStatus::Expired => {}
            ConsumeStatus::NotFound => panic!("racing consume must not report not_found"),
        }
    }
    assert_eq!(granted, 1, "exactly one racer may win the last view");
    assert_eq!(deactivations, 1, "exactly one racer may see will_deactivate");

    let item = store.get(&new.id).await?.expect("item should exist");
    assert_eq!(item.views, 2);
    Ok(())
}
