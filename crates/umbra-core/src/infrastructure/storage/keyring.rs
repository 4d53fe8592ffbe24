//! OS keyring secure storage
//!
//! Stores each key envelope as one credential in the operating system's
//! credential store (macOS Keychain, Windows Credential Manager, Linux Secret
//! Service). The keyring cannot enumerate entries, so an extra index
//! credential lists the stored identifiers.
//!
//! A key credential and the index are two separate writes. When the index
//! update fails, the key credential is put back the way it was before the
//! call, so a failed `put` or `remove` leaves both unchanged.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use keyring::Entry;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, warn};
use zeroize::Zeroizing;

use crate::domain::crypto::entity::SecretBytes;
use crate::domain::keys::repository::{SecureStorage, StorageError};

/// Service name used for keyring storage
pub const DEFAULT_KEYRING_SERVICE: &str = "umbra";

/// Keyring user holding the identifier index
pub const INDEX_USER: &str = "__umbra_key_index__";

/// Blocking access to the named credentials of one keyring service
pub trait CredentialStore: Send + Sync + 'static {
    fn read(&self, user: &str) -> Result<Option<String>, StorageError>;

    fn write(&self, user: &str, secret: &str) -> Result<(), StorageError>;

    /// `false` when there was nothing to delete
    fn delete(&self, user: &str) -> Result<bool, StorageError>;
}

/// Credentials in the platform keyring, through the `keyring` crate
#[derive(Debug, Clone)]
pub struct OsCredentialStore {
    service: String,
}

impl OsCredentialStore {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self, user: &str) -> Result<Entry, StorageError> {
        Entry::new(&self.service, user)
            .map_err(|e| StorageError::Backend(format!("Failed to create keyring entry: {}", e)))
    }
}

impl CredentialStore for OsCredentialStore {
    fn read(&self, user: &str) -> Result<Option<String>, StorageError> {
        match self.entry(user)?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(map_keyring_error("read credential", e)),
        }
    }

    fn write(&self, user: &str, secret: &str) -> Result<(), StorageError> {
        self.entry(user)?
            .set_password(secret)
            .map_err(|e| map_keyring_error("write credential", e))
    }

    fn delete(&self, user: &str) -> Result<bool, StorageError> {
        match self.entry(user)?.delete_password() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(map_keyring_error("delete credential", e)),
        }
    }
}

fn map_keyring_error(action: &str, err: keyring::Error) -> StorageError {
    match err {
        keyring::Error::NoStorageAccess(_) | keyring::Error::PlatformFailure(_) => {
            StorageError::Unavailable(format!("Failed to {}: {}", action, err))
        }
        other => StorageError::Backend(format!("Failed to {}: {}", action, other)),
    }
}

/// OS keyring-backed storage delegate
///
/// All keyring calls block, so each one runs on the blocking thread pool.
/// Writes and removals hold the index lock for their whole duration.
pub struct KeyringSecureStorage {
    service: String,
    credentials: Arc<dyn CredentialStore>,
    index_lock: Mutex<()>,
}

impl std::fmt::Debug for KeyringSecureStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyringSecureStorage")
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

impl Default for KeyringSecureStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyringSecureStorage {
    pub fn new() -> Self {
        Self::with_service(DEFAULT_KEYRING_SERVICE)
    }

    /// Use a custom keyring service name (separate namespaces, tests)
    pub fn with_service(service: &str) -> Self {
        Self::with_credentials(service, Arc::new(OsCredentialStore::new(service)))
    }

    /// Store credentials through `credentials` instead of the platform keyring
    pub fn with_credentials(service: &str, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            service: service.to_string(),
            credentials,
            index_lock: Mutex::new(()),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    async fn blocking<T, F>(&self, task: F) -> Result<T, StorageError>
    where
        F: FnOnce(&dyn CredentialStore) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let credentials = self.credentials.clone();
        tokio::task::spawn_blocking(move || task(credentials.as_ref()))
            .await
            .map_err(|e| StorageError::Backend(format!("Task join error: {}", e)))?
    }

    async fn read_credential(&self, id: &str) -> Result<Option<Zeroizing<String>>, StorageError> {
        let user = id.to_string();
        let secret = self.blocking(move |store| store.read(&user)).await?;
        Ok(secret.map(Zeroizing::new))
    }

    async fn write_credential(
        &self,
        id: &str,
        secret: Zeroizing<String>,
    ) -> Result<(), StorageError> {
        let user = id.to_string();
        self.blocking(move |store| store.write(&user, &secret)).await
    }

    async fn delete_credential(&self, id: &str) -> Result<bool, StorageError> {
        let user = id.to_string();
        self.blocking(move |store| store.delete(&user)).await
    }

    async fn read_index(&self) -> Result<Vec<String>, StorageError> {
        match self.read_credential(INDEX_USER).await? {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| StorageError::CorruptRecord {
                id: INDEX_USER.to_string(),
                reason: e.to_string(),
            }),
            None => Ok(Vec::new()),
        }
    }

    async fn write_index(&self, ids: Vec<String>) -> Result<(), StorageError> {
        let raw = serde_json::to_string(&ids).map_err(|e| StorageError::Backend(e.to_string()))?;
        self.write_credential(INDEX_USER, Zeroizing::new(raw)).await
    }

    async fn index_insert(&self, id: &str) -> Result<(), StorageError> {
        let mut ids = self.read_index().await?;
        if !ids.iter().any(|existing| existing == id) {
            ids.push(id.to_string());
            self.write_index(ids).await?;
        }
        Ok(())
    }

    async fn index_remove(&self, id: &str) -> Result<(), StorageError> {
        let mut ids = self.read_index().await?;
        let before = ids.len();
        ids.retain(|existing| existing != id);
        if ids.len() != before {
            self.write_index(ids).await?;
        }
        Ok(())
    }

    /// Put credential `id` back to `previous` after a failed index update
    async fn restore(&self, id: &str, previous: Option<Zeroizing<String>>) {
        let restored = match previous {
            Some(previous) => self.write_credential(id, previous).await,
            None => self.delete_credential(id).await.map(|_| ()),
        };
        match restored {
            Ok(()) => warn!(key_id = %id, "Key index update failed, credential restored"),
            Err(e) => error!(
                key_id = %id,
                error = %e,
                "Key index update failed and the credential could not be restored"
            ),
        }
    }
}

#[async_trait]
impl SecureStorage for KeyringSecureStorage {
    async fn get(&self, id: &str) -> Result<Option<SecretBytes>, StorageError> {
        let Some(encoded) = self.read_credential(id).await? else {
            return Ok(None);
        };
        BASE64
            .decode(encoded.as_bytes())
            .map(|bytes| Some(SecretBytes::new(bytes)))
            .map_err(|e| StorageError::CorruptRecord {
                id: id.to_string(),
                reason: e.to_string(),
            })
    }

    async fn put(&self, id: &str, bytes: &SecretBytes) -> Result<(), StorageError> {
        let encoded = Zeroizing::new(BASE64.encode(bytes.expose()));

        let _index = self.index_lock.lock().await;
        let previous = self.read_credential(id).await?;
        self.write_credential(id, encoded).await?;

        if let Err(err) = self.index_insert(id).await {
            self.restore(id, previous).await;
            return Err(err);
        }
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<bool, StorageError> {
        let _index = self.index_lock.lock().await;
        let Some(previous) = self.read_credential(id).await? else {
            // Drop a stale index entry left by an earlier crash
            self.index_remove(id).await?;
            return Ok(false);
        };
        let removed = self.delete_credential(id).await?;

        if let Err(err) = self.index_remove(id).await {
            self.restore(id, Some(previous)).await;
            return Err(err);
        }
        Ok(removed)
    }

    async fn list_ids(&self) -> Result<Vec<String>, StorageError> {
        self.read_index().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Mutex as StdMutex, PoisonError};

    /// In-process credentials; every access to `failing` errors
    #[derive(Default)]
    struct FakeCredentials {
        entries: StdMutex<HashMap<String, String>>,
        failing: StdMutex<Option<String>>,
    }

    impl FakeCredentials {
        fn fail_on(&self, user: Option<&str>) {
            *self.failing.lock().unwrap_or_else(PoisonError::into_inner) = user.map(String::from);
        }

        fn check(&self, user: &str) -> Result<(), StorageError> {
            let failing = self.failing.lock().unwrap_or_else(PoisonError::into_inner);
            if failing.as_deref() == Some(user) {
                return Err(StorageError::Unavailable(format!("{} is locked", user)));
            }
            Ok(())
        }

        fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
            self.entries.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    impl CredentialStore for FakeCredentials {
        fn read(&self, user: &str) -> Result<Option<String>, StorageError> {
            self.check(user)?;
            Ok(self.entries().get(user).cloned())
        }

        fn write(&self, user: &str, secret: &str) -> Result<(), StorageError> {
            self.check(user)?;
            self.entries().insert(user.to_string(), secret.to_string());
            Ok(())
        }

        fn delete(&self, user: &str) -> Result<bool, StorageError> {
            self.check(user)?;
            Ok(self.entries().remove(user).is_some())
        }
    }

    fn fake_storage() -> (Arc<FakeCredentials>, KeyringSecureStorage) {
        let credentials = Arc::new(FakeCredentials::default());
        let storage = KeyringSecureStorage::with_credentials("umbra-test", credentials.clone());
        (credentials, storage)
    }

    fn envelope(data: &[u8]) -> SecretBytes {
        SecretBytes::from_slice(data)
    }

    #[tokio::test]
    async fn test_credentials_and_index_stay_in_step() {
        let (credentials, storage) = fake_storage();

        storage.put("a", &envelope(b"one")).await.unwrap();
        storage.put("b", &envelope(b"two")).await.unwrap();
        storage.put("a", &envelope(b"three")).await.unwrap();
        assert_eq!(storage.list_ids().await.unwrap(), vec!["a", "b"]);
        assert_eq!(storage.get("a").await.unwrap().unwrap().expose(), b"three");

        assert!(storage.remove("a").await.unwrap());
        assert!(!storage.remove("a").await.unwrap());
        assert_eq!(storage.list_ids().await.unwrap(), vec!["b"]);
        assert!(storage.get("a").await.unwrap().is_none());
        assert!(!credentials.entries().contains_key("a"));
    }

    #[tokio::test]
    async fn test_failed_index_write_undoes_new_credential() {
        let (credentials, storage) = fake_storage();
        credentials.fail_on(Some(INDEX_USER));

        let err = storage.put("fresh", &envelope(b"key")).await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable(_)));
        assert!(!credentials.entries().contains_key("fresh"));

        credentials.fail_on(None);
        assert!(storage.get("fresh").await.unwrap().is_none());
        assert!(storage.list_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_index_write_restores_replaced_credential() {
        let (credentials, storage) = fake_storage();
        storage.put("kept", &envelope(b"old")).await.unwrap();

        credentials.fail_on(Some(INDEX_USER));
        assert!(storage.put("kept", &envelope(b"new")).await.is_err());

        credentials.fail_on(None);
        assert_eq!(storage.get("kept").await.unwrap().unwrap().expose(), b"old");
        assert_eq!(storage.list_ids().await.unwrap(), vec!["kept"]);
    }

    #[tokio::test]
    async fn test_failed_index_write_restores_removed_credential() {
        let (credentials, storage) = fake_storage();
        storage.put("kept", &envelope(b"material")).await.unwrap();

        credentials.fail_on(Some(INDEX_USER));
        assert!(storage.remove("kept").await.is_err());

        credentials.fail_on(None);
        assert_eq!(
            storage.get("kept").await.unwrap().unwrap().expose(),
            b"material"
        );
        assert_eq!(storage.list_ids().await.unwrap(), vec!["kept"]);
    }

    #[tokio::test]
    async fn test_corrupt_credential_is_reported() {
        let (credentials, storage) = fake_storage();
        credentials
            .entries()
            .insert("bad".to_string(), "not base64!".to_string());

        let err = storage.get("bad").await.unwrap_err();
        assert!(matches!(err, StorageError::CorruptRecord { .. }));
    }

    // Keyring tests require a running secret service and are
    // typically run manually or in integration test environments
    #[tokio::test]
    #[ignore = "Requires OS keyring access"]
    async fn test_keyring_storage() {
        let storage = KeyringSecureStorage::with_service("umbra-test");
        let _ = storage.remove("test-key").await;

        assert!(storage.get("test-key").await.unwrap().is_none());

        storage
            .put("test-key", &SecretBytes::from_slice(b"envelope"))
            .await
            .unwrap();
        assert_eq!(
            storage.get("test-key").await.unwrap().unwrap().expose(),
            b"envelope"
        );
        assert!(storage.list_ids().await.unwrap().contains(&"test-key".to_string()));

        assert!(storage.remove("test-key").await.unwrap());
        assert!(!storage.list_ids().await.unwrap().contains(&"test-key".to_string()));
    }
}
