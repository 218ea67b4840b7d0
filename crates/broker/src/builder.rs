use std::sync::Arc;

use ephemera_blob::BlobStore;
use ephemera_core::{AccessPolicy, Clock, IngestPolicy, SystemClock};
use ephemera_store::MetadataStore;

use crate::access::AccessBroker;
use crate::broker::Broker;
use crate::deletion::DeletionScheduler;
use crate::error::BrokerError;
use crate::ingest::IngestService;
use crate::metrics::BrokerMetrics;
use crate::reaper::{Reaper, ReaperConfig};

/// Fluent builder for constructing a [`Broker`].
///
/// A [`MetadataStore`] and a [`BlobStore`] must be supplied. Policies default
/// to [`IngestPolicy::default`] and [`AccessPolicy::default`], and time comes
/// from the system clock.
pub struct BrokerBuilder {
    store: Option<Arc<dyn MetadataStore>>,
    blobs: Option<Arc<dyn BlobStore>>,
    ingest_policy: IngestPolicy,
    access_policy: AccessPolicy,
    reaper_config: ReaperConfig,
    clock: Arc<dyn Clock>,
    metrics: Option<Arc<BrokerMetrics>>,
}

impl Default for BrokerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BrokerBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            blobs: None,
            ingest_policy: IngestPolicy::default(),
            access_policy: AccessPolicy::default(),
            reaper_config: ReaperConfig::default(),
            clock: Arc::new(SystemClock),
            metrics: None,
        }
    }

    /// Set the metadata store implementation.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn MetadataStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the blob store implementation.
    #[must_use]
    pub fn blobs(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    #[must_use]
    pub fn ingest_policy(mut self, policy: IngestPolicy) -> Self {
        self.ingest_policy = policy;
        self
    }

    #[must_use]
    pub fn access_policy(mut self, policy: AccessPolicy) -> Self {
        self.access_policy = policy;
        self
    }

    #[must_use]
    pub fn reaper_config(mut self, config: ReaperConfig) -> Self {
        self.reaper_config = config;
        self
    }

    /// Override the time source (tests use a manual clock).
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Share an existing metrics instance instead of creating one.
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<BrokerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Consume the builder and produce a configured [`Broker`].
    ///
    /// Returns [`BrokerError::Configuration`] if a store is missing or a
    /// policy is internally inconsistent.
    pub fn build(self) -> Result<Broker, BrokerError> {
        let store = self
            .store
            .ok_or_else(|| BrokerError::Configuration("metadata store is required".into()))?;
        let blobs = self
            .blobs
            .ok_or_else(|| BrokerError::Configuration("blob store is required".into()))?;

        let ip = &self.ingest_policy;
        if ip.min_ttl_seconds > ip.max_ttl_seconds || ip.min_views > ip.max_views {
            return Err(BrokerError::Configuration(
                "ingest policy minimums exceed maximums".into(),
            ));
        }
        if ip.min_views == 0 {
            return Err(BrokerError::Configuration(
                "ingest policy must allow at least one view".into(),
            ));
        }
        if self.access_policy.max_link_seconds == 0 {
            return Err(BrokerError::Configuration(
                "max link lifetime must be positive".into(),
            ));
        }

        let metrics = self.metrics.unwrap_or_default();
        let scheduler =
            DeletionScheduler::new(Arc::clone(&store), Arc::clone(&blobs), Arc::clone(&metrics));

        let ingest = IngestService::new(
            Arc::clone(&store),
            Arc::clone(&blobs),
            self.ingest_policy,
            Arc::clone(&self.clock),
            Arc::clone(&metrics),
        );
        let access = AccessBroker::new(
            Arc::clone(&store),
            Arc::clone(&blobs),
            self.access_policy,
            Arc::clone(&self.clock),
            scheduler.clone(),
            Arc::clone(&metrics),
        );
        let reaper = Reaper::new(
            Arc::clone(&store),
            Arc::clone(&blobs),
            self.clock,
            self.reaper_config,
            Arc::clone(&metrics),
        );

        Ok(Broker {
            store,
            blobs,
            ingest,
            access,
            scheduler,
            reaper,
            metrics,
        })
    }
}
