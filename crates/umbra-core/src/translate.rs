//! Security error translator
//!
//! The only place source-domain errors are mapped into [`ErrorKind`]. Each
//! function is total over its source type; the matches carry no wildcard arm so
//! a new source variant fails to compile until it is mapped here.

use crate::bridge::protocol::{BridgeError, RemoteErrorCode};
use crate::domain::crypto::local::EngineError;
use crate::domain::keys::repository::StorageError;
use crate::error::{ErrorKind, SecurityError};
use crate::infrastructure::primitives::PrimitiveError;

/// Map a primitive routine failure
pub fn from_primitive(err: PrimitiveError) -> SecurityError {
    let kind = match &err {
        PrimitiveError::InvalidKeyLength { .. } => ErrorKind::InvalidInput,
        PrimitiveError::InvalidIvLength { .. } => ErrorKind::InvalidInput,
        PrimitiveError::EncryptFailure(_) => ErrorKind::EncryptionFailed,
        PrimitiveError::AuthenticationTagInvalid => ErrorKind::DecryptionFailed,
        PrimitiveError::MacKeyRejected(_) => ErrorKind::HashOrMacVerificationFailed,
        PrimitiveError::InvalidByteCount(_) => ErrorKind::InvalidInput,
        PrimitiveError::RandomSourceUnavailable(_) => ErrorKind::RandomGenerationFailed,
    };
    SecurityError::new(kind, err.to_string()).with_source(err)
}

/// Map a local engine validation failure
pub fn from_engine(err: EngineError) -> SecurityError {
    let kind = match &err {
        EngineError::EmptyKey => ErrorKind::InvalidInput,
        EngineError::InvalidKeyMaterial { .. } => ErrorKind::InvalidInput,
        EngineError::InvalidSignatureLength { .. } => ErrorKind::InvalidInput,
        EngineError::CiphertextTooShort { .. } => ErrorKind::InvalidInput,
        EngineError::InvalidKeySize(_) => ErrorKind::InvalidInput,
        EngineError::InvalidLength(_) => ErrorKind::InvalidInput,
        EngineError::UnsupportedAlgorithm { .. } => ErrorKind::NotImplemented,
        EngineError::WeakPublicKey => ErrorKind::InvalidInput,
        EngineError::NonContributoryAgreement => ErrorKind::DecryptionFailed,
        EngineError::MalformedPublicKey(_) => ErrorKind::InvalidInput,
        EngineError::KeyGeneration(_) => ErrorKind::KeyGenerationFailed,
    };
    SecurityError::new(kind, err.to_string()).with_source(err)
}

/// Map a known remote error code, keeping the remote reason verbatim
pub fn from_remote_code(code: RemoteErrorCode, reason: impl Into<String>) -> SecurityError {
    let kind = match code {
        RemoteErrorCode::InvalidFormat => ErrorKind::InvalidInput,
        RemoteErrorCode::InvalidKey => ErrorKind::InvalidInput,
        RemoteErrorCode::EncryptionFailed => ErrorKind::EncryptionFailed,
        RemoteErrorCode::DecryptionFailed => ErrorKind::DecryptionFailed,
        RemoteErrorCode::KeyGenerationFailed => ErrorKind::KeyGenerationFailed,
        RemoteErrorCode::VerificationFailed => ErrorKind::HashOrMacVerificationFailed,
        RemoteErrorCode::RandomGenerationFailed => ErrorKind::RandomGenerationFailed,
        RemoteErrorCode::StorageFailed => ErrorKind::StorageOperationFailed,
        RemoteErrorCode::ServiceUnavailable => ErrorKind::ChannelUnavailable,
        RemoteErrorCode::Timeout => ErrorKind::TimedOut,
        RemoteErrorCode::UnsupportedOperation => ErrorKind::NotImplemented,
        RemoteErrorCode::NotImplemented => ErrorKind::NotImplemented,
        RemoteErrorCode::InternalError => ErrorKind::InternalError,
    };
    SecurityError::new(kind, reason)
}

/// Map a remote error code as received on the wire
///
/// Codes this build does not know become [`ErrorKind::UnmappedSourceError`];
/// the unknown code is kept as the error source.
pub fn from_remote(code: &str, reason: impl Into<String>) -> SecurityError {
    match code.parse::<RemoteErrorCode>() {
        Ok(known) => from_remote_code(known, reason),
        Err(unknown) => {
            SecurityError::new(ErrorKind::UnmappedSourceError, reason).with_source(unknown)
        }
    }
}

/// Map a bridge channel failure
pub fn from_bridge(err: BridgeError) -> SecurityError {
    let kind = match &err {
        BridgeError::Remote { code, reason } => return from_remote(code, reason.clone()),
        BridgeError::SpawnFailed(_) => ErrorKind::ChannelUnavailable,
        BridgeError::ChannelClosed(_) => ErrorKind::ChannelUnavailable,
        BridgeError::Io(_) => ErrorKind::ChannelUnavailable,
        BridgeError::Timeout { .. } => ErrorKind::TimedOut,
        BridgeError::MalformedReply(_) => ErrorKind::InternalError,
        BridgeError::Encode(_) => ErrorKind::InternalError,
    };
    SecurityError::new(kind, err.to_string()).with_source(err)
}

/// Map a storage delegate failure
pub fn from_storage(err: StorageError) -> SecurityError {
    let kind = match &err {
        StorageError::NotFound(_) => ErrorKind::StorageOperationFailed,
        StorageError::AlreadyExists(_) => ErrorKind::InvalidInput,
        StorageError::CorruptRecord { .. } => ErrorKind::StorageOperationFailed,
        StorageError::Backend(_) => ErrorKind::StorageOperationFailed,
        StorageError::Unavailable(_) => ErrorKind::StorageOperationFailed,
    };
    SecurityError::new(kind, err.to_string()).with_source(err)
}

/// Map a unified kind onto the wire domain (used by the helper when replying)
pub fn to_remote(kind: ErrorKind) -> RemoteErrorCode {
    match kind {
        ErrorKind::InvalidInput => RemoteErrorCode::InvalidFormat,
        ErrorKind::EncryptionFailed => RemoteErrorCode::EncryptionFailed,
        ErrorKind::DecryptionFailed => RemoteErrorCode::DecryptionFailed,
        ErrorKind::KeyGenerationFailed => RemoteErrorCode::KeyGenerationFailed,
        ErrorKind::HashOrMacVerificationFailed => RemoteErrorCode::VerificationFailed,
        ErrorKind::RandomGenerationFailed => RemoteErrorCode::RandomGenerationFailed,
        ErrorKind::StorageOperationFailed => RemoteErrorCode::StorageFailed,
        ErrorKind::ChannelUnavailable => RemoteErrorCode::ServiceUnavailable,
        ErrorKind::TimedOut => RemoteErrorCode::Timeout,
        ErrorKind::NotImplemented => RemoteErrorCode::NotImplemented,
        ErrorKind::WrongInterface => RemoteErrorCode::UnsupportedOperation,
        ErrorKind::InternalError => RemoteErrorCode::InternalError,
        ErrorKind::UnmappedSourceError => RemoteErrorCode::InternalError,
    }
}

impl From<PrimitiveError> for SecurityError {
    fn from(err: PrimitiveError) -> Self {
        from_primitive(err)
    }
}

impl From<EngineError> for SecurityError {
    fn from(err: EngineError) -> Self {
        from_engine(err)
    }
}

impl From<BridgeError> for SecurityError {
    fn from(err: BridgeError) -> Self {
        from_bridge(err)
    }
}

impl From<StorageError> for SecurityError {
    fn from(err: StorageError) -> Self {
        from_storage(err)
    }
}
