use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use ephemera_broker::{MetricsSnapshot, SweepOutcome, SweepReport};

/// Health check response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service status indicator.
    #[schema(example = "ok")]
    pub status: String,
    /// Current broker metrics snapshot.
    pub metrics: MetricsResponse,
}

/// Broker counters.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MetricsResponse {
    /// Uploads stored.
    #[schema(example = 42)]
    pub ingested: u64,
    /// Uploads rejected by validation.
    pub ingest_rejected: u64,
    /// Uploads whose blob was removed after a metadata write failed.
    pub ingest_rollbacks: u64,
    /// Views granted.
    #[schema(example = 40)]
    pub views_granted: u64,
    /// Views refused because the item was expired or exhausted.
    pub views_denied_expired: u64,
    /// Views refused because the item does not exist.
    pub views_denied_not_found: u64,
    /// Views spent whose link could not be issued.
    pub access_errors: u64,
    /// Deferred deletions scheduled after a final view.
    pub deletions_scheduled: u64,
    /// Deferred deletions that removed their blob.
    pub deferred_deletions_completed: u64,
    /// Deferred deletions that failed.
    pub deferred_deletions_failed: u64,
    /// Reclamation passes run.
    pub sweeps: u64,
    /// Items reclaimed by the sweeper.
    pub swept_items: u64,
    /// Sweeper blob deletions that failed.
    pub sweep_failures: u64,
    /// Uploads refused by the rate limiter.
    pub rate_limited: u64,
}

impl From<MetricsSnapshot> for MetricsResponse {
    fn from(s: MetricsSnapshot) -> Self {
        Self {
            ingested: s.ingested,
            ingest_rejected: s.ingest_rejected,
            ingest_rollbacks: s.ingest_rollbacks,
            views_granted: s.views_granted,
            views_denied_expired: s.views_denied_expired,
            views_denied_not_found: s.views_denied_not_found,
            access_errors: s.access_errors,
            deletions_scheduled: s.deletions_scheduled,
            deferred_deletions_completed: s.deferred_deletions_completed,
            deferred_deletions_failed: s.deferred_deletions_failed,
            sweeps: s.sweeps,
            swept_items: s.swept_items,
            sweep_failures: s.sweep_failures,
            rate_limited: s.rate_limited,
        }
    }
}

/// Generic failure body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Always `false`.
    pub ok: bool,
    /// Human-readable error message.
    #[schema(example = "Too many uploads. Please wait a minute.")]
    pub error: String,
}

/// Upload a file as a new shareable item.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    /// Original file name; becomes part of the blob key.
    #[schema(example = "screenshot.png")]
    pub file_name: Option<String>,
    /// File contents, standard base64.
    pub file_base64: Option<String>,
    /// Seconds until the item expires. Policy default when omitted.
    #[schema(example = 3600)]
    pub expiry_seconds: Option<u64>,
    /// Number of views allowed. Policy default when omitted.
    #[schema(example = 1)]
    pub max_views: Option<u32>,
}

/// Successful upload.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub ok: bool,
    /// Item identifier.
    pub id: String,
    /// Link to hand to viewers.
    #[schema(example = "https://share.example.com/view/3f8e2a4c-9b1d-4e7a-8c55-0d1f2e3a4b5c")]
    pub share_url: String,
}

/// Spend one view of an item.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConsumeRequest {
    /// Item identifier.
    pub id: Option<String>,
}

/// A granted view.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeResponse {
    /// Always `true`.
    pub ok: bool,
    /// Short-lived retrieval link.
    pub file_url: String,
    /// Views left after this one; `null` when unlimited.
    pub remaining_views: Option<u32>,
    /// When the item expires; `null` when it never does.
    pub expiry_at: Option<DateTime<Utc>>,
    /// Seconds until expiry, or the default window for items without one.
    #[schema(example = 300)]
    pub seconds_left: u64,
}

/// A refused view.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConsumeFailure {
    /// Always `false`.
    pub ok: bool,
    /// One of `not_found`, `expired`, `error`.
    #[schema(example = "expired")]
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Per-item result of a sweep.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SweepItemResponse {
    pub id: String,
    /// The blob delete call succeeded.
    pub removed: bool,
    /// The item was marked removed.
    pub marked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<SweepOutcome> for SweepItemResponse {
    fn from(o: SweepOutcome) -> Self {
        Self {
            id: o.id.to_string(),
            removed: o.removed,
            marked: o.marked,
            error: o.error,
        }
    }
}

/// Result of a reclamation pass.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SweepResponse {
    pub ok: bool,
    /// Candidates found.
    pub examined: usize,
    /// Candidates whose blob was deleted.
    pub deleted: usize,
    pub details: Vec<SweepItemResponse>,
}

impl From<SweepReport> for SweepResponse {
    fn from(r: SweepReport) -> Self {
        Self {
            ok: true,
            examined: r.examined,
            deleted: r.deleted,
            details: r.details.into_iter().map(Into::into).collect(),
        }
    }
}

/// Result of deactivating an item.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeactivateResponse {
    pub ok: bool,
    /// `false` when the item was already inactive.
    pub deactivated: bool,
}

/// Signature parameters of a blob link.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BlobQuery {
    /// Unix milliseconds at and after which the link is refused.
    pub expires: Option<i64>,
    /// Hex HMAC signature.
    pub sig: Option<String>,
}
