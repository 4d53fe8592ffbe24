//! Primitives gateway
//!
//! The narrow call surface to the trusted primitive routines. Everything above
//! this module talks to primitives through [`PrimitivesGateway`] only, so the
//! implementation can be swapped (hardware-backed, FIPS module, test double).

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::domain::crypto::entity::{AES_KEY_SIZE, IV_SIZE, MAX_RANDOM_BYTES, SecretBytes};

type HmacSha256 = Hmac<Sha256>;

/// Errors raised by the primitive routines
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrimitiveError {
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Invalid IV length: expected {expected}, got {actual}")]
    InvalidIvLength { expected: usize, actual: usize },

    #[error("Cipher failure during encryption: {0}")]
    EncryptFailure(String),

    #[error("Authentication tag invalid")]
    AuthenticationTagInvalid,

    #[error("MAC key rejected: {0}")]
    MacKeyRejected(String),

    #[error("Invalid random byte count: {0}")]
    InvalidByteCount(usize),

    #[error("Secure random source unavailable: {0}")]
    RandomSourceUnavailable(String),
}

/// Primitive cryptographic routines
pub trait PrimitivesGateway: Send + Sync {
    fn encrypt_aes_gcm(
        &self,
        data: &[u8],
        key: &[u8],
        iv: &[u8],
        aad: Option<&[u8]>,
    ) -> Result<SecretBytes, PrimitiveError>;

    fn decrypt_aes_gcm(
        &self,
        data: &[u8],
        key: &[u8],
        iv: &[u8],
        aad: Option<&[u8]>,
    ) -> Result<SecretBytes, PrimitiveError>;

    fn sha256(&self, data: &[u8]) -> SecretBytes;

    fn hmac_sha256(&self, data: &[u8], key: &[u8]) -> Result<SecretBytes, PrimitiveError>;

    /// Bytes from a cryptographically secure source; `count` must be non-zero
    fn random_bytes(&self, count: usize) -> Result<SecretBytes, PrimitiveError>;
}

/// Gateway backed by the RustCrypto crates and the OS random source
#[derive(Debug, Default, Clone, Copy)]
pub struct RustCryptoPrimitives;

impl RustCryptoPrimitives {
    pub fn new() -> Self {
        Self
    }

    fn cipher(key: &[u8]) -> Result<Aes256Gcm, PrimitiveError> {
        if key.len() != AES_KEY_SIZE {
            return Err(PrimitiveError::InvalidKeyLength {
                expected: AES_KEY_SIZE,
                actual: key.len(),
            });
        }
        Aes256Gcm::new_from_slice(key).map_err(|_| PrimitiveError::InvalidKeyLength {
            expected: AES_KEY_SIZE,
            actual: key.len(),
        })
    }

    fn check_iv(iv: &[u8]) -> Result<(), PrimitiveError> {
        if iv.len() != IV_SIZE {
            return Err(PrimitiveError::InvalidIvLength {
                expected: IV_SIZE,
                actual: iv.len(),
            });
        }
        Ok(())
    }
}

impl PrimitivesGateway for RustCryptoPrimitives {
    fn encrypt_aes_gcm(
        &self,
        data: &[u8],
        key: &[u8],
        iv: &[u8],
        aad: Option<&[u8]>,
    ) -> Result<SecretBytes, PrimitiveError> {
        let cipher = Self::cipher(key)?;
        Self::check_iv(iv)?;

        let payload = Payload {
            msg: data,
            aad: aad.unwrap_or_default(),
        };
        cipher
            .encrypt(Nonce::from_slice(iv), payload)
            .map(SecretBytes::new)
            .map_err(|e| PrimitiveError::EncryptFailure(e.to_string()))
    }

    fn decrypt_aes_gcm(
        &self,
        data: &[u8],
        key: &[u8],
        iv: &[u8],
        aad: Option<&[u8]>,
    ) -> Result<SecretBytes, PrimitiveError> {
        let cipher = Self::cipher(key)?;
        Self::check_iv(iv)?;

        let payload = Payload {
            msg: data,
            aad: aad.unwrap_or_default(),
        };
        cipher
            .decrypt(Nonce::from_slice(iv), payload)
            .map(SecretBytes::new)
            .map_err(|_| PrimitiveError::AuthenticationTagInvalid)
    }

    fn sha256(&self, data: &[u8]) -> SecretBytes {
        SecretBytes::new(Sha256::digest(data).to_vec())
    }

    fn hmac_sha256(&self, data: &[u8], key: &[u8]) -> Result<SecretBytes, PrimitiveError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
            .map_err(|e| PrimitiveError::MacKeyRejected(e.to_string()))?;
        mac.update(data);
        Ok(SecretBytes::new(mac.finalize().into_bytes().to_vec()))
    }

    fn random_bytes(&self, count: usize) -> Result<SecretBytes, PrimitiveError> {
        if count == 0 || count > MAX_RANDOM_BYTES {
            return Err(PrimitiveError::InvalidByteCount(count));
        }
        let mut bytes = vec![0u8; count];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| PrimitiveError::RandomSourceUnavailable(e.to_string()))?;
        Ok(SecretBytes::new(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aes_gcm_roundtrip_with_aad() {
        let primitives = RustCryptoPrimitives::new();
        let key = [7u8; AES_KEY_SIZE];
        let iv = [1u8; IV_SIZE];

        let ciphertext = primitives
            .encrypt_aes_gcm(b"payload", &key, &iv, Some(b"header"))
            .unwrap();
        let plaintext = primitives
            .decrypt_aes_gcm(ciphertext.expose(), &key, &iv, Some(b"header"))
            .unwrap();
        assert_eq!(plaintext.expose(), b"payload");

        let wrong_aad = primitives.decrypt_aes_gcm(ciphertext.expose(), &key, &iv, Some(b"other"));
        assert_eq!(wrong_aad.unwrap_err(), PrimitiveError::AuthenticationTagInvalid);
    }

    #[test]
    fn test_aes_gcm_rejects_short_key() {
        let primitives = RustCryptoPrimitives::new();
        let err = primitives
            .encrypt_aes_gcm(b"x", &[0u8; 16], &[0u8; IV_SIZE], None)
            .unwrap_err();
        assert_eq!(
            err,
            PrimitiveError::InvalidKeyLength {
                expected: 32,
                actual: 16
            }
        );
    }

    #[test]
    fn test_sha256_known_vector() {
        let digest = RustCryptoPrimitives::new().sha256(b"abc");
        assert_eq!(
            hex::encode(digest.expose()),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hmac_sha256_known_vector() {
        // RFC 4231 test case 2
        let mac = RustCryptoPrimitives::new()
            .hmac_sha256(b"what do ya want for nothing?", b"Jefe")
            .unwrap();
        assert_eq!(
            hex::encode(mac.expose()),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_random_bytes() {
        let primitives = RustCryptoPrimitives::new();
        assert_eq!(
            primitives.random_bytes(0).unwrap_err(),
            PrimitiveError::InvalidByteCount(0)
        );
        assert_eq!(
            primitives.random_bytes(usize::MAX).unwrap_err(),
            PrimitiveError::InvalidByteCount(usize::MAX)
        );
        assert_eq!(
            primitives.random_bytes(MAX_RANDOM_BYTES + 1).unwrap_err(),
            PrimitiveError::InvalidByteCount(MAX_RANDOM_BYTES + 1)
        );
        let a = primitives.random_bytes(32).unwrap();
        let b = primitives.random_bytes(32).unwrap();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }
}
