pub mod error;
pub mod local;
pub mod memory;
#[cfg(feature = "s3")]
pub mod s3;
pub mod signer;
pub mod store;

pub use error::BlobError;
pub use local::LocalBlobStore;
pub use memory::MemoryBlobStore;
#[cfg(feature = "s3")]
pub use s3::{S3BlobConfig, S3BlobStore};
pub use signer::UrlSigner;
pub use store::{BlobStore, StoredBlob, validate_blob_path};
