use thiserror::Error;

use ephemera_blob::BlobError;
use ephemera_core::ValidationError;
use ephemera_store::StoreError;

/// Errors surfaced by broker operations.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Bad input. Nothing was written.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// No such item, or its blob is already gone.
    #[error("item not found")]
    NotFound,

    /// The item's time or view bound has been reached.
    #[error("item expired")]
    Expired,

    /// A view was spent but could not be delivered.
    #[error("access error: {0}")]
    Access(String),

    /// The metadata store failed or is unreachable.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The blob store failed or is unreachable.
    #[error("blob error: {0}")]
    Blob(#[from] BlobError),

    /// The broker was misconfigured (e.g. missing required components).
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl BrokerError {
    /// Whether a later retry could succeed without changing the request.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Blob(_))
    }
}
