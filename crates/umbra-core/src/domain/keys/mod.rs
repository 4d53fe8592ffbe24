//! Key lifecycle domain
//!
//! Storage, retrieval, rotation and generation of symmetric keys over a
//! [`SecureStorage`] delegate.

pub mod entity;
pub mod manager;
pub mod repository;

pub use entity::{KeyMetadata, KeyRecord, RotationOutcome};
pub use manager::{KeyLifecycleManager, REENCRYPTION_FAILED};
pub use repository::{SecureStorage, StorageError};
