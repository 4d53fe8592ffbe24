//! Local crypto engine
//!
//! In-process implementation of [`CryptoService`] built directly on a
//! [`PrimitivesGateway`]. Primitive work is CPU-bound and runs inline on the
//! calling task.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::asymmetric;
use super::entity::{
    Algorithm, CryptoOutput, DEFAULT_KEY_SIZE_BITS, IV_SIZE, KeyPair, MAX_KEY_SIZE_BITS,
    MAX_RANDOM_BYTES, META_ALGORITHM, META_IV_PREPENDED, OperationConfig, SecretBytes,
};
use super::service::CryptoService;
use crate::error::SecurityResult;
use crate::infrastructure::primitives::{PrimitiveError, PrimitivesGateway, RustCryptoPrimitives};

/// Errors raised by the local engine's own validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("Key must not be empty")]
    EmptyKey,

    #[error("Invalid key material: expected {expected} bytes, got {actual}")]
    InvalidKeyMaterial { expected: usize, actual: usize },

    #[error("Invalid signature length: expected {expected}, got {actual}")]
    InvalidSignatureLength { expected: usize, actual: usize },

    #[error("Ciphertext too short: need at least {minimum} bytes, got {actual}")]
    CiphertextTooShort { minimum: usize, actual: usize },

    #[error("Invalid key size: {0} bits (must be a positive multiple of 8, at most 4096)")]
    InvalidKeySize(u32),

    #[error("Invalid length: {0}")]
    InvalidLength(usize),

    #[error("Algorithm {algorithm} is not supported for {operation}")]
    UnsupportedAlgorithm {
        operation: &'static str,
        algorithm: Algorithm,
    },

    #[error("Public key is a low-order point")]
    WeakPublicKey,

    #[error("Key agreement was not contributory")]
    NonContributoryAgreement,

    #[error("Malformed public key: {0}")]
    MalformedPublicKey(String),

    #[error("Key generation failed: {0}")]
    KeyGeneration(PrimitiveError),
}

/// Crypto engine running in the current process
#[derive(Clone)]
pub struct LocalCryptoEngine {
    primitives: Arc<dyn PrimitivesGateway>,
}

impl std::fmt::Debug for LocalCryptoEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCryptoEngine").finish_non_exhaustive()
    }
}

impl Default for LocalCryptoEngine {
    fn default() -> Self {
        Self::new(Arc::new(RustCryptoPrimitives::new()))
    }
}

impl LocalCryptoEngine {
    pub fn new(primitives: Arc<dyn PrimitivesGateway>) -> Self {
        Self { primitives }
    }

    /// The gateway this engine delegates to
    pub fn primitives(&self) -> &Arc<dyn PrimitivesGateway> {
        &self.primitives
    }

    fn algorithm(
        config: &OperationConfig,
        operation: &'static str,
        default: Algorithm,
        allowed: &[Algorithm],
    ) -> Result<Algorithm, EngineError> {
        let algorithm = config.algorithm_or(default);
        if allowed.contains(&algorithm) {
            Ok(algorithm)
        } else {
            Err(EngineError::UnsupportedAlgorithm {
                operation,
                algorithm,
            })
        }
    }

    fn require_key(key: &SecretBytes) -> Result<(), EngineError> {
        if key.is_empty() {
            return Err(EngineError::EmptyKey);
        }
        Ok(())
    }

    fn key_size_bytes(config: &OperationConfig) -> Result<usize, EngineError> {
        let bits = config.key_size_bits().unwrap_or(DEFAULT_KEY_SIZE_BITS);
        if bits == 0 || bits % 8 != 0 || bits > MAX_KEY_SIZE_BITS {
            return Err(EngineError::InvalidKeySize(bits));
        }
        Ok((bits / 8) as usize)
    }
}

#[async_trait]
impl CryptoService for LocalCryptoEngine {
    async fn encrypt(
        &self,
        data: &SecretBytes,
        key: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<CryptoOutput> {
        let algorithm = Self::algorithm(config, "encrypt", Algorithm::Aes256Gcm, &[
            Algorithm::Aes256Gcm,
        ])?;
        Self::require_key(key)?;
        debug!(operation = "encrypt", bytes = data.len(), "Encrypting locally");

        if let Some(iv) = config.iv() {
            let ciphertext =
                self.primitives
                    .encrypt_aes_gcm(data.expose(), key.expose(), iv, config.aad())?;
            return Ok(
                CryptoOutput::new(ciphertext).with_metadata(META_ALGORITHM, algorithm.as_str())
            );
        }

        let iv = self.primitives.random_bytes(IV_SIZE)?;
        let ciphertext =
            self.primitives
                .encrypt_aes_gcm(data.expose(), key.expose(), iv.expose(), config.aad())?;

        let mut combined = Vec::with_capacity(IV_SIZE + ciphertext.len());
        combined.extend_from_slice(iv.expose());
        combined.extend_from_slice(ciphertext.expose());

        Ok(CryptoOutput::new(SecretBytes::new(combined))
            .with_metadata(META_ALGORITHM, algorithm.as_str())
            .with_metadata(META_IV_PREPENDED, "true"))
    }

    async fn decrypt(
        &self,
        data: &SecretBytes,
        key: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<CryptoOutput> {
        let algorithm = Self::algorithm(config, "decrypt", Algorithm::Aes256Gcm, &[
            Algorithm::Aes256Gcm,
        ])?;
        Self::require_key(key)?;
        debug!(operation = "decrypt", bytes = data.len(), "Decrypting locally");

        let plaintext = match config.iv() {
            Some(iv) => {
                self.primitives
                    .decrypt_aes_gcm(data.expose(), key.expose(), iv, config.aad())?
            }
            None => {
                if data.len() < IV_SIZE {
                    return Err(EngineError::CiphertextTooShort {
                        minimum: IV_SIZE,
                        actual: data.len(),
                    }
                    .into());
                }
                let (iv, body) = data.expose().split_at(IV_SIZE);
                self.primitives
                    .decrypt_aes_gcm(body, key.expose(), iv, config.aad())?
            }
        };

        Ok(CryptoOutput::new(plaintext).with_metadata(META_ALGORITHM, algorithm.as_str()))
    }

    async fn encrypt_asymmetric(
        &self,
        data: &SecretBytes,
        public_key: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<CryptoOutput> {
        let algorithm = Self::algorithm(config, "encrypt_asymmetric", Algorithm::X25519, &[
            Algorithm::X25519,
        ])?;
        Self::require_key(public_key)?;

        let sealed = asymmetric::seal(
            self.primitives.as_ref(),
            data.expose(),
            public_key.expose(),
            config.aad(),
        )?;
        Ok(CryptoOutput::new(sealed).with_metadata(META_ALGORITHM, algorithm.as_str()))
    }

    async fn decrypt_asymmetric(
        &self,
        data: &SecretBytes,
        private_key: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<CryptoOutput> {
        let algorithm = Self::algorithm(config, "decrypt_asymmetric", Algorithm::X25519, &[
            Algorithm::X25519,
        ])?;
        Self::require_key(private_key)?;

        let plaintext = asymmetric::open(
            self.primitives.as_ref(),
            data.expose(),
            private_key.expose(),
            config.aad(),
        )?;
        Ok(CryptoOutput::new(plaintext).with_metadata(META_ALGORITHM, algorithm.as_str()))
    }

    async fn hash(
        &self,
        data: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<CryptoOutput> {
        let algorithm = Self::algorithm(config, "hash", Algorithm::Sha256, &[Algorithm::Sha256])?;
        let digest = self.primitives.sha256(data.expose());
        Ok(CryptoOutput::new(digest).with_metadata(META_ALGORITHM, algorithm.as_str()))
    }

    async fn verify_hash(
        &self,
        data: &SecretBytes,
        expected: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<bool> {
        Self::algorithm(config, "verify_hash", Algorithm::Sha256, &[Algorithm::Sha256])?;
        let digest = self.primitives.sha256(data.expose());
        Ok(digest.ct_eq(expected.expose()))
    }

    async fn generate_mac(
        &self,
        data: &SecretBytes,
        key: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<CryptoOutput> {
        let algorithm = Self::algorithm(config, "generate_mac", Algorithm::HmacSha256, &[
            Algorithm::HmacSha256,
        ])?;
        Self::require_key(key)?;
        let mac = self.primitives.hmac_sha256(data.expose(), key.expose())?;
        Ok(CryptoOutput::new(mac).with_metadata(META_ALGORITHM, algorithm.as_str()))
    }

    async fn verify_mac(
        &self,
        data: &SecretBytes,
        mac: &SecretBytes,
        key: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<bool> {
        Self::algorithm(config, "verify_mac", Algorithm::HmacSha256, &[
            Algorithm::HmacSha256,
        ])?;
        Self::require_key(key)?;
        let computed = self.primitives.hmac_sha256(data.expose(), key.expose())?;
        Ok(computed.ct_eq(mac.expose()))
    }

    async fn sign(
        &self,
        data: &SecretBytes,
        private_key: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<CryptoOutput> {
        let algorithm =
            Self::algorithm(config, "sign", Algorithm::Ed25519, &[Algorithm::Ed25519])?;
        Self::require_key(private_key)?;
        let signature = asymmetric::sign(data.expose(), private_key.expose())?;
        Ok(CryptoOutput::new(signature).with_metadata(META_ALGORITHM, algorithm.as_str()))
    }

    async fn verify_signature(
        &self,
        data: &SecretBytes,
        signature: &SecretBytes,
        public_key: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<bool> {
        Self::algorithm(config, "verify_signature", Algorithm::Ed25519, &[
            Algorithm::Ed25519,
        ])?;
        Self::require_key(public_key)?;
        asymmetric::verify(data.expose(), signature.expose(), public_key.expose())
    }

    async fn generate_key(&self, config: &OperationConfig) -> SecurityResult<SecretBytes> {
        Self::algorithm(config, "generate_key", Algorithm::Aes256Gcm, &[
            Algorithm::Aes256Gcm,
            Algorithm::HmacSha256,
        ])?;
        let size = Self::key_size_bytes(config)?;
        let key = self
            .primitives
            .random_bytes(size)
            .map_err(EngineError::KeyGeneration)?;
        debug!(bits = size * 8, "Generated symmetric key");
        Ok(key)
    }

    async fn generate_key_pair(&self, config: &OperationConfig) -> SecurityResult<KeyPair> {
        let algorithm = config.algorithm_or(Algorithm::X25519);
        asymmetric::generate_key_pair(self.primitives.as_ref(), algorithm)
    }

    async fn generate_random_bytes(&self, length: usize) -> SecurityResult<SecretBytes> {
        if length == 0 || length > MAX_RANDOM_BYTES {
            return Err(EngineError::InvalidLength(length).into());
        }
        Ok(self.primitives.random_bytes(length)?)
    }
}
