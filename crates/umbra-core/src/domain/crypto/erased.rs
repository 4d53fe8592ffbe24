//! Type-erased crypto service
//!
//! One concrete type for every engine so callers can hold "some crypto service"
//! without naming the engine.

use async_trait::async_trait;
use std::sync::Arc;

use super::entity::{CryptoOutput, KeyPair, OperationConfig, SecretBytes};
use super::service::CryptoService;
use crate::error::SecurityResult;

/// Shared handle to any [`CryptoService`]
///
/// Cloning shares the underlying engine. Results and failures pass through
/// unchanged.
#[derive(Clone)]
pub struct ErasedCryptoService {
    inner: Arc<dyn CryptoService>,
}

impl ErasedCryptoService {
    pub fn new<S>(service: S) -> Self
    where
        S: CryptoService + 'static,
    {
        Self {
            inner: Arc::new(service),
        }
    }

    /// Wrap an engine that is already shared
    pub fn from_arc(inner: Arc<dyn CryptoService>) -> Self {
        Self { inner }
    }
}

impl std::fmt::Debug for ErasedCryptoService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ErasedCryptoService")
    }
}

#[async_trait]
impl CryptoService for ErasedCryptoService {
    async fn encrypt(
        &self,
        data: &SecretBytes,
        key: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<CryptoOutput> {
        self.inner.encrypt(data, key, config).await
    }

    async fn decrypt(
        &self,
        data: &SecretBytes,
        key: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<CryptoOutput> {
        self.inner.decrypt(data, key, config).await
    }

    async fn encrypt_asymmetric(
        &self,
        data: &SecretBytes,
        public_key: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<CryptoOutput> {
        self.inner.encrypt_asymmetric(data, public_key, config).await
    }

    async fn decrypt_asymmetric(
        &self,
        data: &SecretBytes,
        private_key: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<CryptoOutput> {
        self.inner.decrypt_asymmetric(data, private_key, config).await
    }

    async fn hash(
        &self,
        data: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<CryptoOutput> {
        self.inner.hash(data, config).await
    }

    async fn verify_hash(
        &self,
        data: &SecretBytes,
        expected: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<bool> {
        self.inner.verify_hash(data, expected, config).await
    }

    async fn generate_mac(
        &self,
        data: &SecretBytes,
        key: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<CryptoOutput> {
        self.inner.generate_mac(data, key, config).await
    }

    async fn verify_mac(
        &self,
        data: &SecretBytes,
        mac: &SecretBytes,
        key: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<bool> {
        self.inner.verify_mac(data, mac, key, config).await
    }

    async fn sign(
        &self,
        data: &SecretBytes,
        private_key: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<CryptoOutput> {
        self.inner.sign(data, private_key, config).await
    }

    async fn verify_signature(
        &self,
        data: &SecretBytes,
        signature: &SecretBytes,
        public_key: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<bool> {
        self.inner
            .verify_signature(data, signature, public_key, config)
            .await
    }

    async fn generate_key(&self, config: &OperationConfig) -> SecurityResult<SecretBytes> {
        self.inner.generate_key(config).await
    }

    async fn generate_key_pair(&self, config: &OperationConfig) -> SecurityResult<KeyPair> {
        self.inner.generate_key_pair(config).await
    }

    async fn generate_random_bytes(&self, length: usize) -> SecurityResult<SecretBytes> {
        self.inner.generate_random_bytes(length).await
    }
}
