use thiserror::Error;

/// Rejections raised before any storage is touched.
///
/// Every variant is safe to retry once the input has been corrected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("payload is empty")]
    EmptyPayload,

    #[error("payload of {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("expiry of {value}s is outside the allowed range [{min}, {max}]")]
    TtlOutOfRange { value: u64, min: u64, max: u64 },

    #[error("view limit of {value} is outside the allowed range [{min}, {max}]")]
    ViewsOutOfRange { value: u32, min: u32, max: u32 },

    #[error("invalid file name: {0}")]
    InvalidFileName(String),

    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    #[error("invalid item id: {0}")]
    InvalidId(String),
}
