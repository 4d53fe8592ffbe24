//! Cryptographic service interface
//!
//! The capability contract every engine implements. Call sites depend on this
//! trait (usually through [`super::ErasedCryptoService`]) and never on a concrete
//! engine type.

use async_trait::async_trait;

use super::entity::{CryptoOutput, KeyPair, OperationConfig, SecretBytes};
use crate::error::SecurityResult;

/// Capability set shared by the local engine, the bridge client and the adapters
///
/// Implementations are stateless per call and safe to use from many tasks at
/// once. Every failure is a [`crate::error::SecurityError`] that has already been
/// translated into the unified taxonomy.
#[async_trait]
pub trait CryptoService: Send + Sync {
    /// Symmetric encryption
    ///
    /// Without an IV in `config` the engine generates one and returns
    /// `IV || ciphertext+tag`.
    async fn encrypt(
        &self,
        data: &SecretBytes,
        key: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<CryptoOutput>;

    /// Symmetric decryption; the inverse of [`CryptoService::encrypt`]
    async fn decrypt(
        &self,
        data: &SecretBytes,
        key: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<CryptoOutput>;

    /// Encrypt for the holder of the private key matching `public_key`
    async fn encrypt_asymmetric(
        &self,
        data: &SecretBytes,
        public_key: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<CryptoOutput>;

    async fn decrypt_asymmetric(
        &self,
        data: &SecretBytes,
        private_key: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<CryptoOutput>;

    async fn hash(&self, data: &SecretBytes, config: &OperationConfig)
    -> SecurityResult<CryptoOutput>;

    /// Recompute the digest of `data` and compare it in constant time
    async fn verify_hash(
        &self,
        data: &SecretBytes,
        expected: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<bool>;

    async fn generate_mac(
        &self,
        data: &SecretBytes,
        key: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<CryptoOutput>;

    async fn verify_mac(
        &self,
        data: &SecretBytes,
        mac: &SecretBytes,
        key: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<bool>;

    async fn sign(
        &self,
        data: &SecretBytes,
        private_key: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<CryptoOutput>;

    async fn verify_signature(
        &self,
        data: &SecretBytes,
        signature: &SecretBytes,
        public_key: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<bool>;

    /// Symmetric key of `config.key_size_bits()` (default 256) bits
    async fn generate_key(&self, config: &OperationConfig) -> SecurityResult<SecretBytes>;

    async fn generate_key_pair(&self, config: &OperationConfig) -> SecurityResult<KeyPair>;

    /// `length` bytes from the secure random source; zero is invalid input
    async fn generate_random_bytes(&self, length: usize) -> SecurityResult<SecretBytes>;
}
