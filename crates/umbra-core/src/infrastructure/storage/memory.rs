//! In-memory secure storage
//!
//! Holds envelopes for the lifetime of the process only. Used when no
//! persistent backend is configured, and in tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::crypto::entity::SecretBytes;
use crate::domain::keys::repository::{SecureStorage, StorageError};

#[derive(Debug, Default)]
pub struct InMemorySecureStorage {
    entries: Mutex<HashMap<String, SecretBytes>>,
}

impl InMemorySecureStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, SecretBytes>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SecureStorage for InMemorySecureStorage {
    async fn get(&self, id: &str) -> Result<Option<SecretBytes>, StorageError> {
        Ok(self.entries().get(id).map(SecretBytes::duplicate))
    }

    async fn put(&self, id: &str, bytes: &SecretBytes) -> Result<(), StorageError> {
        // The replaced envelope is zeroed as it drops
        self.entries().insert(id.to_string(), bytes.duplicate());
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<bool, StorageError> {
        Ok(self.entries().remove(id).is_some())
    }

    async fn list_ids(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.entries().keys().cloned().collect())
    }
}
