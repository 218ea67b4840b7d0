use thiserror::Error;

/// Errors that can occur during blob storage operations.
#[derive(Debug, Error)]
pub enum BlobError {
    /// The path is empty, absolute, or escapes its directory.
    #[error("invalid blob path: {0}")]
    InvalidPath(String),

    /// A storage backend error occurred.
    #[error("blob storage error: {0}")]
    Storage(String),

    /// A retrieval link could not be issued.
    #[error("signing error: {0}")]
    Signing(String),
}
