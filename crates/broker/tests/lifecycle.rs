use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};

use ephemera_blob::{BlobError, BlobStore, MemoryBlobStore, StoredBlob, UrlSigner};
use ephemera_broker::{Broker, BrokerBuilder, BrokerError, IngestRequest, ReaperConfig};
use ephemera_core::{
    Clock, ConsumeRecord, ItemId, ManualClock, NewItem, ReclaimCandidate, ShareableItem,
    ValidationError,
};
use ephemera_store::{MetadataStore, StoreError};
use ephemera_store_memory::MemoryMetadataStore;

struct Harness {
    broker: Arc<Broker>,
    store: Arc<MemoryMetadataStore>,
    blobs: Arc<MemoryBlobStore>,
    clock: Arc<ManualClock>,
}

fn signer() -> UrlSigner {
    UrlSigner::new(vec![42u8; 32], "http://share.test").unwrap()
}

fn harness() -> Harness {
    let store = Arc::new(MemoryMetadataStore::new());
    let blobs = Arc::new(MemoryBlobStore::new(signer()));
    let clock = Arc::new(ManualClock::starting_now());
    let broker = BrokerBuilder::new()
        .store(Arc::clone(&store) as Arc<dyn MetadataStore>)
        .blobs(Arc::clone(&blobs) as Arc<dyn BlobStore>)
        .clock(Arc::clone(&clock) as Arc<dyn Clock>)
        .build()
        .unwrap();
    Harness {
        broker: Arc::new(broker),
        store,
        blobs,
        clock,
    }
}

fn upload(name: &str, ttl: u64, views: u32) -> IngestRequest {
    IngestRequest {
        file_name: name.into(),
        data: Bytes::from_static(b"\x89PNG\r\n\x1a\n"),
        ttl_seconds: Some(ttl),
        max_views: Some(views),
    }
}

async fn blob_path(h: &Harness, id: &ItemId) -> Option<String> {
    h.store.get(id).await.unwrap().and_then(|i| i.blob_path)
}

#[tokio::test]
async fn single_view_item_is_spent_by_first_consume() {
    let h = harness();
    let receipt = h.broker.ingest(upload("shot.png", 3600, 1)).await.unwrap();
    assert_eq!(receipt.content_type, "image/png");
    assert_eq!(receipt.share_path(), format!("/view/{}", receipt.id));

    let grant = h.broker.consume(&receipt.id).await.unwrap();
    assert_eq!(grant.remaining_views, Some(0));
    assert!(grant.will_deactivate);
    assert!(grant.url.starts_with("http://share.test/v1/blobs/"));

    let again = h.broker.consume(&receipt.id).await;
    assert!(matches!(again, Err(BrokerError::Expired)));
}

#[tokio::test]
async fn time_expiry_beats_remaining_views() {
    let h = harness();
    let receipt = h.broker.ingest(upload("shot.png", 60, 5)).await.unwrap();

    h.clock.advance(TimeDelta::seconds(61));
    let result = h.broker.consume(&receipt.id).await;
    assert!(matches!(result, Err(BrokerError::Expired)));

    let item = h.store.get(&receipt.id).await.unwrap().unwrap();
    assert_eq!(item.views, 0);
}

#[tokio::test]
async fn one_second_ttl_item_expires() {
    // Inserted directly: ingest policy does not allow TTLs under a minute.
    let h = harness();
    let now = h.clock.now();
    let id = ItemId::new();
    let path = format!("{id}/a.png");
    h.blobs
        .put(&path, Bytes::from_static(b"x"), "image/png")
        .await
        .unwrap();
    h.store
        .insert(&NewItem {
            id,
            name: "a.png".into(),
            content_type: "image/png".into(),
            blob_path: path,
            expiry_at: Some(now + TimeDelta::seconds(1)),
            max_views: Some(5),
            created_at: now,
        })
        .await
        .unwrap();

    h.clock.advance(TimeDelta::seconds(2));
    assert!(matches!(h.broker.consume(&id).await, Err(BrokerError::Expired)));
}

#[tokio::test]
async fn three_views_then_sweeper_reclaims() {
    let h = harness();
    let receipt = h.broker.ingest(upload("shot.png", 3600, 3)).await.unwrap();
    let path = blob_path(&h, &receipt.id).await.unwrap();

    let mut remaining = Vec::new();
    for _ in 0..3 {
        let grant = h.broker.consume(&receipt.id).await.unwrap();
        remaining.push(grant.remaining_views);
    }
    assert_eq!(remaining, vec![Some(2), Some(1), Some(0)]);

    let report = h.broker.sweep().await.unwrap();
    assert_eq!(report.examined, 1);
    assert_eq!(report.deleted, 1);
    assert_eq!(report.details[0].id, receipt.id);
    assert!(report.details[0].marked);
    assert!(!h.blobs.contains(&path));

    let item = h.store.get(&receipt.id).await.unwrap().unwrap();
    assert!(item.is_removed);
    assert!(matches!(
        h.broker.consume(&receipt.id).await,
        Err(BrokerError::NotFound)
    ));
}

#[tokio::test]
async fn unknown_id_is_not_found() {
    let h = harness();
    assert!(matches!(
        h.broker.consume(&ItemId::new()).await,
        Err(BrokerError::NotFound)
    ));
    assert_eq!(h.broker.metrics().snapshot().views_denied_not_found, 1);
}

#[tokio::test]
async fn k_views_then_always_expired() {
    let h = harness();
    let receipt = h.broker.ingest(upload("a.gif", 3600, 4)).await.unwrap();
    let mut ok = 0;
    for _ in 0..10 {
        if h.broker.consume(&receipt.id).await.is_ok() {
            ok += 1;
        }
    }
    assert_eq!(ok, 4);
    assert_eq!(h.broker.metrics().snapshot().views_denied_expired, 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_viewers_get_exactly_one_last_view() {
    let h = harness();
    let receipt = h.broker.ingest(upload("a.png", 3600, 2)).await.unwrap();
    h.broker.consume(&receipt.id).await.unwrap();

    let handles: Vec<_> = (0..24)
        .map(|_| {
            let broker = Arc::clone(&h.broker);
            let id = receipt.id;
            tokio::spawn(async move { broker.consume(&id).await })
        })
        .collect();

    let mut ok = 0;
    let mut expired = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(grant) => {
                assert!(grant.will_deactivate);
                ok += 1;
            }
            Err(BrokerError::Expired) => expired += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(expired, 23);
    assert_eq!(h.broker.metrics().snapshot().deletions_scheduled, 1);
}

#[tokio::test]
async fn link_lifetime_is_bounded_by_expiry_and_ceiling() {
    let h = harness();

    let long = h.broker.ingest(upload("a.png", 7200, 5)).await.unwrap();
    let grant = h.broker.consume(&long.id).await.unwrap();
    assert_eq!(grant.link_ttl, Duration::from_secs(300));
    assert_eq!(grant.seconds_left, 7200);

    let short = h.broker.ingest(upload("b.png", 60, 5)).await.unwrap();
    h.clock.advance(TimeDelta::milliseconds(59_500));
    let grant = h.broker.consume(&short.id).await.unwrap();
    assert_eq!(grant.seconds_left, 1);
    assert_eq!(grant.link_ttl, Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn last_view_schedules_deferred_deletion() {
    let h = harness();
    let receipt = h.broker.ingest(upload("a.png", 3600, 1)).await.unwrap();
    let path = blob_path(&h, &receipt.id).await.unwrap();

    let grant = h.broker.consume(&receipt.id).await.unwrap();
    assert_eq!(grant.link_ttl, Duration::from_secs(300));

    tokio::time::advance(Duration::from_secs(300)).await;
    tokio::task::yield_now().await;
    assert!(h.blobs.contains(&path), "blob must outlive the issued link");

    tokio::time::advance(Duration::from_secs(6)).await;
    assert!(h.broker.shutdown(Duration::from_secs(5)).await);

    assert!(!h.blobs.contains(&path));
    let item = h.store.get(&receipt.id).await.unwrap().unwrap();
    assert!(item.is_removed);
    assert!(item.blob_path.is_none());

    let report = h.broker.sweep().await.unwrap();
    assert_eq!(report.examined, 0, "nothing left for the sweeper");
}

#[tokio::test]
async fn sweeping_twice_is_idempotent() {
    let h = harness();
    let exhausted = h.broker.ingest(upload("a.png", 3600, 1)).await.unwrap();
    let expiring = h.broker.ingest(upload("b.png", 60, 3)).await.unwrap();
    let live = h.broker.ingest(upload("c.png", 3600, 3)).await.unwrap();
    h.broker.consume(&exhausted.id).await.unwrap();
    h.clock.advance(TimeDelta::seconds(120));

    let first = h.broker.sweep().await.unwrap();
    assert_eq!(first.examined, 2);
    assert_eq!(first.deleted, 2);

    let second = h.broker.sweep().await.unwrap();
    assert_eq!(second.examined, 0);
    assert_eq!(second.deleted, 0);
    assert!(second.details.is_empty());

    assert!(blob_path(&h, &live.id).await.is_some());
    assert!(blob_path(&h, &expiring.id).await.is_none());
    let metrics = h.broker.metrics().snapshot();
    assert_eq!(metrics.sweeps, 2);
    assert_eq!(metrics.swept_items, 2);
    assert_eq!(metrics.sweep_failures, 0);
}

#[tokio::test]
async fn concurrent_sweeps_do_not_corrupt_rows() {
    let h = harness();
    let mut ids = Vec::new();
    for i in 0..20 {
        let r = h
            .broker
            .ingest(upload(&format!("f{i}.png"), 3600, 1))
            .await
            .unwrap();
        h.broker.consume(&r.id).await.unwrap();
        ids.push(r.id);
    }

    let (a, b) = tokio::join!(h.broker.sweep(), h.broker.sweep());
    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(a.details.iter().chain(&b.details).all(|o| o.error.is_none()));

    for id in ids {
        let item = h.store.get(&id).await.unwrap().unwrap();
        assert!(item.is_removed && item.blob_path.is_none() && !item.is_active);
    }
    assert!(h.blobs.is_empty());
}

#[tokio::test]
async fn deactivated_item_is_expired_and_reclaimed() {
    let h = harness();
    let receipt = h.broker.ingest(upload("a.png", 3600, 5)).await.unwrap();

    assert!(h.broker.deactivate(&receipt.id).await.unwrap());
    assert!(!h.broker.deactivate(&receipt.id).await.unwrap());
    assert!(matches!(
        h.broker.consume(&receipt.id).await,
        Err(BrokerError::Expired)
    ));

    let report = h.broker.sweep().await.unwrap();
    assert_eq!(report.deleted, 1);
}

#[tokio::test]
async fn validation_rejects_before_any_write() {
    let h = harness();
    let cases = [
        (upload("a.png", 59, 1), "ttl"),
        (upload("a.png", 3600, 51), "views"),
        (upload("../a.png", 3600, 1), "name"),
        (
            IngestRequest {
                data: Bytes::new(),
                ..upload("a.png", 3600, 1)
            },
            "empty",
        ),
        (
            IngestRequest {
                data: Bytes::from(vec![0u8; 8 * 1024 * 1024 + 1]),
                ..upload("a.png", 3600, 1)
            },
            "size",
        ),
    ];
    for (request, label) in cases {
        let err = h.broker.ingest(request).await.unwrap_err();
        assert!(
            matches!(err, BrokerError::Validation(_)),
            "{label}: expected validation error, got {err}"
        );
    }
    assert!(h.store.is_empty());
    assert!(h.blobs.is_empty());
    assert_eq!(h.broker.metrics().snapshot().ingest_rejected, 5);
}

#[tokio::test]
async fn defaults_apply_when_bounds_omitted() {
    let h = harness();
    let receipt = h
        .broker
        .ingest(IngestRequest {
            file_name: "notes.txt".into(),
            data: Bytes::from_static(b"hello"),
            ttl_seconds: None,
            max_views: None,
        })
        .await
        .unwrap();
    assert_eq!(receipt.max_views, 1);
    assert_eq!(receipt.content_type, "application/octet-stream");
    assert_eq!((receipt.expiry_at - h.clock.now()).num_seconds(), 3600);
}

/// A metadata store whose inserts always fail.
struct FailingInsertStore(MemoryMetadataStore);

#[async_trait]
impl MetadataStore for FailingInsertStore {
    async fn insert(&self, _item: &NewItem) -> Result<(), StoreError> {
        Err(StoreError::Connection("database unavailable".into()))
    }
    async fn get(&self, id: &ItemId) -> Result<Option<ShareableItem>, StoreError> {
        self.0.get(id).await
    }
    async fn consume(&self, id: &ItemId, now: DateTime<Utc>) -> Result<ConsumeRecord, StoreError> {
        self.0.consume(id, now).await
    }
    async fn mark_removed(&self, id: &ItemId) -> Result<bool, StoreError> {
        self.0.mark_removed(id).await
    }
    async fn deactivate(&self, id: &ItemId) -> Result<bool, StoreError> {
        self.0.deactivate(id).await
    }
    async fn list_reclaimable(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ReclaimCandidate>, StoreError> {
        self.0.list_reclaimable(now, limit).await
    }
}

#[tokio::test]
async fn failed_insert_rolls_back_blob() {
    let blobs = Arc::new(MemoryBlobStore::new(signer()));
    let broker = BrokerBuilder::new()
        .store(Arc::new(FailingInsertStore(MemoryMetadataStore::new())))
        .blobs(Arc::clone(&blobs) as Arc<dyn BlobStore>)
        .build()
        .unwrap();

    let err = broker.ingest(upload("a.png", 3600, 1)).await.unwrap_err();
    assert!(matches!(err, BrokerError::Store(_)));
    assert!(err.is_transient());
    assert!(blobs.is_empty(), "orphaned blob must be rolled back");
    assert_eq!(broker.metrics().snapshot().ingest_rollbacks, 1);
}

/// A blob store that stores fine but cannot sign links.
struct UnsignableBlobs(MemoryBlobStore);

#[async_trait]
impl BlobStore for UnsignableBlobs {
    async fn put(&self, path: &str, data: Bytes, content_type: &str) -> Result<(), BlobError> {
        self.0.put(path, data, content_type).await
    }
    async fn get(&self, path: &str) -> Result<Option<StoredBlob>, BlobError> {
        self.0.get(path).await
    }
    async fn remove(&self, path: &str) -> Result<(), BlobError> {
        self.0.remove(path).await
    }
    async fn signed_url(&self, _path: &str, _ttl: Duration) -> Result<String, BlobError> {
        Err(BlobError::Signing("signer offline".into()))
    }
}

#[tokio::test]
async fn signing_failure_still_spends_the_view() {
    let store = Arc::new(MemoryMetadataStore::new());
    let broker = BrokerBuilder::new()
        .store(Arc::clone(&store) as Arc<dyn MetadataStore>)
        .blobs(Arc::new(UnsignableBlobs(MemoryBlobStore::new(signer()))))
        .build()
        .unwrap();

    let receipt = broker.ingest(upload("a.png", 3600, 2)).await.unwrap();
    let err = broker.consume(&receipt.id).await.unwrap_err();
    assert!(matches!(err, BrokerError::Access(_)));

    let item = store.get(&receipt.id).await.unwrap().unwrap();
    assert_eq!(item.views, 1, "view stays consumed after a delivery failure");
    assert_eq!(broker.metrics().snapshot().access_errors, 1);
}

#[tokio::test]
async fn sweep_respects_batch_size() {
    let store = Arc::new(MemoryMetadataStore::new());
    let broker = BrokerBuilder::new()
        .store(Arc::clone(&store) as Arc<dyn MetadataStore>)
        .blobs(Arc::new(MemoryBlobStore::new(signer())))
        .reaper_config(ReaperConfig {
            batch_size: 3,
            concurrency: 2,
        })
        .build()
        .unwrap();

    for i in 0..5 {
        let r = broker
            .ingest(upload(&format!("{i}.png"), 3600, 1))
            .await
            .unwrap();
        broker.deactivate(&r.id).await.unwrap();
    }

    assert_eq!(broker.sweep().await.unwrap().examined, 3);
    assert_eq!(broker.sweep().await.unwrap().examined, 2);
    assert_eq!(broker.sweep().await.unwrap().examined, 0);
}

#[test]
fn builder_requires_stores() {
    let err = BrokerBuilder::new().build().err().unwrap();
    assert!(matches!(err, BrokerError::Configuration(_)));

    let err = BrokerBuilder::new()
        .store(Arc::new(MemoryMetadataStore::new()))
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, BrokerError::Configuration(_)));
}

#[test]
fn builder_rejects_inverted_policy() {
    let policy = ephemera_core::IngestPolicy {
        min_views: 10,
        max_views: 5,
        ..ephemera_core::IngestPolicy::default()
    };
    let err = BrokerBuilder::new()
        .store(Arc::new(MemoryMetadataStore::new()))
        .blobs(Arc::new(MemoryBlobStore::new(signer())))
        .ingest_policy(policy)
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, BrokerError::Configuration(_)));
}

#[test]
fn validation_error_converts() {
    let err: BrokerError = ValidationError::EmptyPayload.into();
    assert!(!err.is_transient());
}
