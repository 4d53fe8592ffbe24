//! Bridge wire protocol
//!
//! Newline-delimited JSON. Each line is one [`ClientMessage`] (client to helper)
//! or one [`BridgeReply`] (helper to client).

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::str::FromStr;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::domain::crypto::entity::OperationConfig;

/// Protocol version returned by `ping`
pub const PROTOCOL_VERSION: &str = "1";

// Operation names
pub const OP_PING: &str = "ping";
pub const OP_ENCRYPT: &str = "encrypt";
pub const OP_DECRYPT: &str = "decrypt";
pub const OP_ENCRYPT_ASYMMETRIC: &str = "encrypt_asymmetric";
pub const OP_DECRYPT_ASYMMETRIC: &str = "decrypt_asymmetric";
pub const OP_HASH: &str = "hash";
pub const OP_VERIFY_HASH: &str = "verify_hash";
pub const OP_GENERATE_MAC: &str = "generate_mac";
pub const OP_VERIFY_MAC: &str = "verify_mac";
pub const OP_SIGN: &str = "sign";
pub const OP_VERIFY_SIGNATURE: &str = "verify_signature";
pub const OP_GENERATE_KEY: &str = "generate_key";
pub const OP_GENERATE_KEY_PAIR: &str = "generate_key_pair";
pub const OP_GENERATE_RANDOM_BYTES: &str = "generate_random_bytes";

/// Metadata key carrying the requested length of `generate_random_bytes`
pub const META_LENGTH: &str = "length";

/// Host-side byte buffer: base64 on the wire, zeroed on drop
#[derive(Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct HostBuffer(Vec<u8>);

impl HostBuffer {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Move the bytes out, leaving this buffer empty
    pub(crate) fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.0)
    }
}

impl std::fmt::Debug for HostBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HostBuffer({} bytes)", self.0.len())
    }
}

impl Serialize for HostBuffer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut encoded = BASE64.encode(&self.0);
        let result = serializer.serialize_str(&encoded);
        encoded.zeroize();
        result
    }
}

impl<'de> Deserialize<'de> for HostBuffer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut encoded = String::deserialize(deserializer)?;
        let decoded = BASE64.decode(encoded.as_bytes());
        encoded.zeroize();
        decoded.map(HostBuffer).map_err(serde::de::Error::custom)
    }
}

/// A call to execute on the helper
#[derive(Debug, Serialize, Deserialize)]
pub struct BridgeRequest {
    pub request_id: Uuid,
    pub operation: String,
    #[serde(default)]
    pub arguments: Vec<HostBuffer>,
    #[serde(default)]
    pub config: OperationConfig,
}

/// Messages sent from client to helper
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Request(BridgeRequest),
    Cancel { request_id: Uuid },
}

/// The helper's answer to one request
///
/// A successful reply carries no error fields; a failed reply carries both
/// `error_code` and `error_reason` and no payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct BridgeReply {
    pub request_id: Uuid,
    pub success: bool,
    #[serde(default)]
    pub payload: Vec<HostBuffer>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
}

impl BridgeReply {
    pub fn success(
        request_id: Uuid,
        payload: Vec<HostBuffer>,
        metadata: BTreeMap<String, String>,
    ) -> Self {
        Self {
            request_id,
            success: true,
            payload,
            metadata,
            error_code: None,
            error_reason: None,
        }
    }

    pub fn failure(request_id: Uuid, code: RemoteErrorCode, reason: impl Into<String>) -> Self {
        Self {
            request_id,
            success: false,
            payload: Vec::new(),
            metadata: BTreeMap::new(),
            error_code: Some(code.as_str().to_string()),
            error_reason: Some(reason.into()),
        }
    }
}

/// Error codes understood on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorCode {
    InvalidFormat,
    InvalidKey,
    EncryptionFailed,
    DecryptionFailed,
    KeyGenerationFailed,
    VerificationFailed,
    RandomGenerationFailed,
    StorageFailed,
    ServiceUnavailable,
    Timeout,
    UnsupportedOperation,
    NotImplemented,
    InternalError,
}

impl RemoteErrorCode {
    pub const ALL: [RemoteErrorCode; 13] = [
        Self::InvalidFormat,
        Self::InvalidKey,
        Self::EncryptionFailed,
        Self::DecryptionFailed,
        Self::KeyGenerationFailed,
        Self::VerificationFailed,
        Self::RandomGenerationFailed,
        Self::StorageFailed,
        Self::ServiceUnavailable,
        Self::Timeout,
        Self::UnsupportedOperation,
        Self::NotImplemented,
        Self::InternalError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidFormat => "invalid_format",
            Self::InvalidKey => "invalid_key",
            Self::EncryptionFailed => "encryption_failed",
            Self::DecryptionFailed => "decryption_failed",
            Self::KeyGenerationFailed => "key_generation_failed",
            Self::VerificationFailed => "verification_failed",
            Self::RandomGenerationFailed => "random_generation_failed",
            Self::StorageFailed => "storage_failed",
            Self::ServiceUnavailable => "service_unavailable",
            Self::Timeout => "timeout",
            Self::UnsupportedOperation => "unsupported_operation",
            Self::NotImplemented => "not_implemented",
            Self::InternalError => "internal_error",
        }
    }
}

impl std::fmt::Display for RemoteErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A remote error code this build does not recognise
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown remote error code '{0}'")]
pub struct UnknownRemoteCode(pub String);

impl FromStr for RemoteErrorCode {
    type Err = UnknownRemoteCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| UnknownRemoteCode(s.to_string()))
    }
}

/// Failures of the bridge channel itself
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("Helper could not be started: {0}")]
    SpawnFailed(String),

    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    #[error("Channel I/O error: {0}")]
    Io(String),

    #[error("Request {request_id} timed out after {after_ms}ms")]
    Timeout { request_id: Uuid, after_ms: u64 },

    #[error("Malformed reply: {0}")]
    MalformedReply(String),

    #[error("Could not encode message: {0}")]
    Encode(String),

    #[error("Remote failure [{code}]: {reason}")]
    Remote { code: String, reason: String },
}

/// Serialize a message as one protocol line (trailing newline included)
///
/// Lines carry base64 key material, so the buffer is wiped when dropped.
pub fn encode_line<T: Serialize>(message: &T) -> Result<Zeroizing<Vec<u8>>, BridgeError> {
    let mut line = serde_json::to_vec(message).map_err(|e| BridgeError::Encode(e.to_string()))?;
    line.push(b'\n');
    Ok(Zeroizing::new(line))
}

/// Read the next protocol line into `line`, wiping the previous one first
pub async fn read_line<R>(reader: &mut R, line: &mut Zeroizing<String>) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    line.zeroize();
    reader.read_line(line).await
}
