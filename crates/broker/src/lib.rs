//! Ephemeral access control.
//!
//! - [`IngestService`] validates uploads and writes blob plus metadata,
//!   rolling the blob back if the metadata insert fails.
//! - [`AccessBroker`] spends one view per call through the store's atomic
//!   consume, issues a short-lived link, and schedules deletion after the
//!   last permitted view.
//! - [`DeletionScheduler`] runs those delayed deletions in the background.
//! - [`Reaper`] reclaims every blob whose item has reached the end of its
//!   lifecycle, as the backstop for anything the scheduler missed.

pub mod access;
pub mod broker;
pub mod builder;
pub mod deletion;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod reaper;

pub use access::{AccessBroker, AccessGrant};
pub use broker::Broker;
pub use builder::BrokerBuilder;
pub use deletion::DeletionScheduler;
pub use error::BrokerError;
pub use ingest::{IngestReceipt, IngestRequest, IngestService};
pub use metrics::{BrokerMetrics, MetricsSnapshot};
pub use reaper::{Reaper, ReaperConfig, SweepOutcome, SweepReport};
