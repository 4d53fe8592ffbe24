//! Crypto domain entities
//!
//! Byte buffers that zero themselves on drop, the per-call operation
//! configuration, and the success payloads returned by every engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::SecurityError;

/// Size of an AES-256 key in bytes
pub const AES_KEY_SIZE: usize = 32;

/// Size of the AES-GCM initialization vector in bytes
pub const IV_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag in bytes
pub const TAG_SIZE: usize = 16;

/// Default key size for generated symmetric keys
pub const DEFAULT_KEY_SIZE_BITS: u32 = 256;

/// Upper bound accepted for generated symmetric keys
pub const MAX_KEY_SIZE_BITS: u32 = 4096;

/// Largest buffer a single random-bytes request may ask for
pub const MAX_RANDOM_BYTES: usize = 1024 * 1024;

/// Metadata key set when the engine generated the IV and prepended it
pub const META_IV_PREPENDED: &str = "iv_prepended";

/// Metadata key naming the algorithm that produced an output
pub const META_ALGORITHM: &str = "algorithm";

/// Owned key material, plaintext, ciphertext, digest or signature
///
/// Never cloned implicitly: use [`SecretBytes::duplicate`] when a second owner is
/// genuinely needed. The backing memory is zeroed when the buffer is dropped.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretBytes {
    bytes: Vec<u8>,
}

impl SecretBytes {
    /// Take ownership of a byte vector
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Copy bytes out of a borrowed slice
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }

    /// An empty buffer
    pub fn empty() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Get the raw bytes (use carefully)
    pub fn expose(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Explicit copy; both buffers are zeroed independently on drop
    pub fn duplicate(&self) -> Self {
        Self::from_slice(&self.bytes)
    }

    /// Move the bytes out; the emptied buffer is dropped as usual
    pub(crate) fn into_vec(mut self) -> Vec<u8> {
        std::mem::take(&mut self.bytes)
    }

    /// Constant-time comparison
    pub fn ct_eq(&self, other: &[u8]) -> bool {
        constant_time_eq(&self.bytes, other)
    }

    /// Short, non-reversible fingerprint suitable for logs
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(&self.bytes);
        hex::encode(&digest[..4])
    }
}

impl From<Vec<u8>> for SecretBytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<&[u8]> for SecretBytes {
    fn from(bytes: &[u8]) -> Self {
        Self::from_slice(bytes)
    }
}

impl PartialEq for SecretBytes {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq(&self.bytes, &other.bytes)
    }
}

impl Eq for SecretBytes {}

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretBytes")
            .field("len", &self.bytes.len())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Length-independent comparison: a length mismatch is `false`, and equal
/// lengths are compared without early exit.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// Algorithms understood by the crypto service interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    Aes256Gcm,
    Sha256,
    HmacSha256,
    X25519,
    Ed25519,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aes256Gcm => "aes256_gcm",
            Self::Sha256 => "sha256",
            Self::HmacSha256 => "hmac_sha256",
            Self::X25519 => "x25519",
            Self::Ed25519 => "ed25519",
        }
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = SecurityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "aes256_gcm" | "aes_256_gcm" | "aes_gcm" => Ok(Self::Aes256Gcm),
            "sha256" | "sha_256" => Ok(Self::Sha256),
            "hmac_sha256" => Ok(Self::HmacSha256),
            "x25519" => Ok(Self::X25519),
            "ed25519" => Ok(Self::Ed25519),
            other => Err(SecurityError::invalid_input(format!(
                "Unknown algorithm '{}'",
                other
            ))),
        }
    }
}

/// How a single operation should run
///
/// Absent fields mean "engine default". A configuration is never mutated after
/// construction; the `with_*` methods consume it and return a rebuilt value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    algorithm: Option<Algorithm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iv: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    aad: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key_size_bits: Option<u32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    options: BTreeMap<String, String>,
}

impl OperationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    pub fn with_iv(mut self, iv: impl Into<Vec<u8>>) -> Self {
        self.iv = Some(iv.into());
        self
    }

    pub fn with_aad(mut self, aad: impl Into<Vec<u8>>) -> Self {
        self.aad = Some(aad.into());
        self
    }

    pub fn with_key_size_bits(mut self, bits: u32) -> Self {
        self.key_size_bits = Some(bits);
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    /// Algorithm, falling back to `default` when unset
    pub fn algorithm_or(&self, default: Algorithm) -> Algorithm {
        self.algorithm.unwrap_or(default)
    }

    pub fn iv(&self) -> Option<&[u8]> {
        self.iv.as_deref()
    }

    pub fn aad(&self) -> Option<&[u8]> {
        self.aad.as_deref()
    }

    pub fn key_size_bits(&self) -> Option<u32> {
        self.key_size_bits
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    pub fn options(&self) -> &BTreeMap<String, String> {
        &self.options
    }
}

/// Success payload of a crypto operation
#[derive(Debug, PartialEq, Eq)]
pub struct CryptoOutput {
    pub data: SecretBytes,
    pub metadata: BTreeMap<String, String>,
}

impl CryptoOutput {
    pub fn new(data: SecretBytes) -> Self {
        Self {
            data,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Consume the output, keeping only the bytes
    pub fn into_data(self) -> SecretBytes {
        self.data
    }
}

/// An asymmetric key pair produced by `generate_key_pair`
#[derive(Debug)]
pub struct KeyPair {
    pub algorithm: Algorithm,
    pub public_key: SecretBytes,
    pub private_key: SecretBytes,
}
