//! Metadata store abstraction for Ephemera.
//!
//! The [`MetadataStore`] trait is the contract the broker relies on. Its
//! central operation, [`MetadataStore::consume`], must perform the whole
//! read-decide-write of a view consumption as one indivisible step in the
//! backing store. In-process locking is not an acceptable substitute,
//! since several service instances may share one store.
//!
//! Backends verify themselves against [`testing::run_store_conformance_tests`].

pub mod error;
pub mod store;
pub mod testing;

pub use error::StoreError;
pub use store::MetadataStore;
