//! Key lifecycle manager
//!
//! Owns the key store and serializes every mutation per identifier. Rotation
//! is all-or-nothing: the replacement record is written in one storage call
//! only after any requested re-encryption has succeeded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::entity::{GENERATED_ID_PREFIX, KeyMetadata, KeyRecord, RotationOutcome};
use super::repository::{SecureStorage, StorageError};
use crate::domain::crypto::entity::{
    DEFAULT_KEY_SIZE_BITS, MAX_KEY_SIZE_BITS, OperationConfig, SecretBytes,
};
use crate::domain::crypto::erased::ErasedCryptoService;
use crate::domain::crypto::local::{EngineError, LocalCryptoEngine};
use crate::domain::crypto::service::CryptoService;
use crate::error::{ErrorKind, SecurityError, SecurityResult};
use crate::infrastructure::primitives::{PrimitivesGateway, RustCryptoPrimitives};
use crate::infrastructure::storage::InMemorySecureStorage;

/// Reason prefix for failures during rotation re-encryption
pub const REENCRYPTION_FAILED: &str = "re-encryption failed";

type LockMap = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

/// Per-identifier lock held for the length of one mutation
///
/// On release, map entries nobody else holds or waits on are pruned, so the
/// map only ever contains identifiers with a mutation in flight.
struct KeyLock<'a> {
    locks: &'a LockMap,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyLock<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Released under the map lock so no new waiter can clone the entry in between
        drop(self.guard.take());
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}

/// Stores, retrieves, rotates and generates keys
///
/// # Concurrency
///
/// `store`, `delete`, `rotate` and `generate` hold an async lock for their
/// identifier for the whole operation, so two rotations of the same key never
/// interleave. Operations on different identifiers run independently. Reads do
/// not lock: the store only ever sees whole-record replacements.
pub struct KeyLifecycleManager {
    storage: Arc<dyn SecureStorage>,
    primitives: Arc<dyn PrimitivesGateway>,
    engine: ErasedCryptoService,
    default_size_bits: u32,
    locks: LockMap,
}

impl std::fmt::Debug for KeyLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyLifecycleManager").finish_non_exhaustive()
    }
}

impl KeyLifecycleManager {
    /// Create a manager that re-encrypts with a local engine over `primitives`
    pub fn new(storage: Arc<dyn SecureStorage>, primitives: Arc<dyn PrimitivesGateway>) -> Self {
        let engine = ErasedCryptoService::new(LocalCryptoEngine::new(primitives.clone()));
        Self::with_engine(storage, primitives, engine)
    }

    /// Create a manager that re-encrypts through `engine` (for example a bridge client)
    pub fn with_engine(
        storage: Arc<dyn SecureStorage>,
        primitives: Arc<dyn PrimitivesGateway>,
        engine: ErasedCryptoService,
    ) -> Self {
        Self {
            storage,
            primitives,
            engine,
            default_size_bits: DEFAULT_KEY_SIZE_BITS,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Use `size_bits` for [`KeyLifecycleManager::generate_default`]
    pub fn with_default_key_size(mut self, size_bits: u32) -> SecurityResult<Self> {
        Self::validate_size(size_bits)?;
        self.default_size_bits = size_bits;
        Ok(self)
    }

    pub fn default_key_size_bits(&self) -> u32 {
        self.default_size_bits
    }

    /// Non-persistent manager for tests and ephemeral sessions
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemorySecureStorage::new()),
            Arc::new(RustCryptoPrimitives::new()),
        )
    }

    async fn lock(&self, id: &str) -> KeyLock<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(id.to_string()).or_default().clone()
        };
        KeyLock {
            locks: &self.locks,
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Identifiers currently tracked by the lock map
    #[cfg(test)]
    pub(crate) fn tracked_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn validate_id(id: &str) -> SecurityResult<()> {
        if id.trim().is_empty() {
            return Err(SecurityError::invalid_input("Key identifier must not be empty"));
        }
        Ok(())
    }

    fn validate_size(size_bits: u32) -> SecurityResult<usize> {
        if size_bits == 0 || size_bits % 8 != 0 || size_bits > MAX_KEY_SIZE_BITS {
            return Err(EngineError::InvalidKeySize(size_bits).into());
        }
        Ok((size_bits / 8) as usize)
    }

    async fn load(&self, id: &str) -> SecurityResult<KeyRecord> {
        let envelope = self
            .storage
            .get(id)
            .await?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        Ok(KeyRecord::from_envelope(id, &envelope)?)
    }

    async fn ensure_absent(&self, id: &str) -> SecurityResult<()> {
        if self.storage.get(id).await?.is_some() {
            return Err(StorageError::AlreadyExists(id.to_string()).into());
        }
        Ok(())
    }

    async fn persist(&self, record: &KeyRecord) -> SecurityResult<()> {
        let envelope = record.to_envelope()?;
        self.storage.put(&record.id, &envelope).await?;
        Ok(())
    }

    fn random_key(&self, size_bytes: usize) -> SecurityResult<SecretBytes> {
        Ok(self
            .primitives
            .random_bytes(size_bytes)
            .map_err(EngineError::KeyGeneration)?)
    }

    /// Store new key material under `id`
    ///
    /// Identifiers are unique: storing over an existing id is invalid input.
    /// Use [`KeyLifecycleManager::rotate`] to replace material.
    pub async fn store(&self, id: &str, key: &SecretBytes) -> SecurityResult<()> {
        Self::validate_id(id)?;
        if key.is_empty() {
            return Err(SecurityError::invalid_input("Key material must not be empty"));
        }

        let _guard = self.lock(id).await;
        self.ensure_absent(id).await?;
        self.persist(&KeyRecord::new(id, key.duplicate())).await?;

        info!(
            key_id = %id,
            bits = key.len() * 8,
            fingerprint = %key.fingerprint(),
            "Key stored"
        );
        Ok(())
    }

    /// Copy of the material stored under `id`
    pub async fn retrieve(&self, id: &str) -> SecurityResult<SecretBytes> {
        Self::validate_id(id)?;
        let record = self.load(id).await?;
        debug!(key_id = %id, version = record.metadata.version, "Key retrieved");
        Ok(record.material)
    }

    pub async fn metadata(&self, id: &str) -> SecurityResult<KeyMetadata> {
        Self::validate_id(id)?;
        Ok(self.load(id).await?.metadata)
    }

    pub async fn delete(&self, id: &str) -> SecurityResult<()> {
        Self::validate_id(id)?;
        let _guard = self.lock(id).await;
        if !self.storage.remove(id).await? {
            return Err(StorageError::NotFound(id.to_string()).into());
        }
        info!(key_id = %id, "Key deleted");
        Ok(())
    }

    /// All stored identifiers, sorted
    pub async fn list(&self) -> SecurityResult<Vec<String>> {
        let mut ids = self.storage.list_ids().await?;
        ids.sort();
        Ok(ids)
    }

    /// Replace the key under `id` with fresh material of the same size
    ///
    /// # Arguments
    ///
    /// * `id` - identifier of an existing key
    /// * `ciphertext` - optional data encrypted under the old key; it is
    ///   decrypted and re-encrypted under the new key
    ///
    /// Nothing is written unless every step succeeds. A re-encryption failure
    /// carries a reason starting with `re-encryption failed`.
    pub async fn rotate(
        &self,
        id: &str,
        ciphertext: Option<&SecretBytes>,
    ) -> SecurityResult<RotationOutcome> {
        Self::validate_id(id)?;
        let _guard = self.lock(id).await;

        let old = self.load(id).await?;
        let size_bytes = Self::validate_size(old.metadata.size_bits)?;
        let new_key = self.random_key(size_bytes)?;

        let reencrypted = match ciphertext {
            Some(ciphertext) => Some(
                self.reencrypt(id, ciphertext, &old.material, &new_key)
                    .await?,
            ),
            None => None,
        };

        let replacement = KeyRecord {
            id: id.to_string(),
            material: new_key.duplicate(),
            metadata: old.metadata.rotated(),
        };
        self.persist(&replacement).await?;

        info!(
            key_id = %id,
            version = replacement.metadata.version,
            fingerprint = %new_key.fingerprint(),
            "Key rotated"
        );
        Ok(RotationOutcome {
            new_key,
            reencrypted,
        })
    }

    async fn reencrypt(
        &self,
        id: &str,
        ciphertext: &SecretBytes,
        old_key: &SecretBytes,
        new_key: &SecretBytes,
    ) -> SecurityResult<SecretBytes> {
        let config = OperationConfig::default();
        let failed = |kind: ErrorKind, err: SecurityError| {
            warn!(key_id = %id, error = %err, "Rotation aborted, key unchanged");
            SecurityError::new(kind, format!("{}: {}", REENCRYPTION_FAILED, err.reason()))
                .with_source(err)
        };

        let plaintext = self
            .engine
            .decrypt(ciphertext, old_key, &config)
            .await
            .map_err(|e| failed(ErrorKind::DecryptionFailed, e))?;
        let reencrypted = self
            .engine
            .encrypt(&plaintext.data, new_key, &config)
            .await
            .map_err(|e| failed(ErrorKind::EncryptionFailed, e))?;
        Ok(reencrypted.into_data())
    }

    /// Generate and store a key of `size_bits`
    ///
    /// Without an explicit id a `key-<uuid>` identifier is assigned.
    pub async fn generate(
        &self,
        size_bits: u32,
        id: Option<&str>,
    ) -> SecurityResult<(String, SecretBytes)> {
        let size_bytes = Self::validate_size(size_bits)?;
        let id = match id {
            Some(id) => id.to_string(),
            None => format!("{}{}", GENERATED_ID_PREFIX, Uuid::new_v4()),
        };
        Self::validate_id(&id)?;

        let _guard = self.lock(&id).await;
        self.ensure_absent(&id).await?;
        let key = self.random_key(size_bytes)?;
        self.persist(&KeyRecord::new(id.clone(), key.duplicate()))
            .await?;

        info!(
            key_id = %id,
            bits = size_bits,
            fingerprint = %key.fingerprint(),
            "Key generated"
        );
        Ok((id, key))
    }

    /// Generate and store a key of the configured default size
    pub async fn generate_default(
        &self,
        id: Option<&str>,
    ) -> SecurityResult<(String, SecretBytes)> {
        self.generate(self.default_size_bits, id).await
    }
}
