//! Secure storage delegate
//!
//! Defines the byte-level storage interface the key lifecycle manager persists
//! records through.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::crypto::entity::SecretBytes;

/// Errors raised by storage delegates and record decoding
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Key already exists: {0}")]
    AlreadyExists(String),

    #[error("Stored record for '{id}' is corrupt: {reason}")]
    CorruptRecord { id: String, reason: String },

    #[error("Secure storage backend error: {0}")]
    Backend(String),

    #[error("Secure storage unavailable: {0}")]
    Unavailable(String),
}

/// Secure storage for opaque key envelopes
#[async_trait]
pub trait SecureStorage: Send + Sync {
    /// Read the bytes stored under `id`
    async fn get(&self, id: &str) -> Result<Option<SecretBytes>, StorageError>;

    /// Create or replace the bytes stored under `id` in a single write
    async fn put(&self, id: &str, bytes: &SecretBytes) -> Result<(), StorageError>;

    /// Remove `id`; returns whether anything was stored
    async fn remove(&self, id: &str) -> Result<bool, StorageError>;

    /// Every stored identifier, in no particular order
    async fn list_ids(&self) -> Result<Vec<String>, StorageError>;
}
