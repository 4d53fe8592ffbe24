//! Translator tests

use std::error::Error as _;
use uuid::Uuid;

use crate::bridge::protocol::{BridgeError, RemoteErrorCode, UnknownRemoteCode};
use crate::domain::crypto::entity::Algorithm;
use crate::domain::crypto::local::EngineError;
use crate::domain::keys::repository::StorageError;
use crate::error::{ErrorKind, SecurityError};
use crate::infrastructure::primitives::PrimitiveError;
use crate::translate;

#[test]
fn test_every_primitive_error_is_mapped() {
    let cases = [
        (
            PrimitiveError::InvalidKeyLength {
                expected: 32,
                actual: 3,
            },
            ErrorKind::InvalidInput,
        ),
        (
            PrimitiveError::InvalidIvLength {
                expected: 12,
                actual: 4,
            },
            ErrorKind::InvalidInput,
        ),
        (
            PrimitiveError::EncryptFailure("aead".into()),
            ErrorKind::EncryptionFailed,
        ),
        (
            PrimitiveError::AuthenticationTagInvalid,
            ErrorKind::DecryptionFailed,
        ),
        (
            PrimitiveError::MacKeyRejected("len".into()),
            ErrorKind::HashOrMacVerificationFailed,
        ),
        (PrimitiveError::InvalidByteCount(0), ErrorKind::InvalidInput),
        (
            PrimitiveError::RandomSourceUnavailable("getrandom".into()),
            ErrorKind::RandomGenerationFailed,
        ),
    ];

    for (source, kind) in cases {
        let reason = source.to_string();
        let err = translate::from_primitive(source);
        assert_eq!(err.kind(), kind, "{}", reason);
        assert_eq!(err.reason(), reason);
        assert!(err.source().is_some());
    }
}

#[test]
fn test_every_engine_error_is_mapped() {
    let cases = [
        (EngineError::EmptyKey, ErrorKind::InvalidInput),
        (
            EngineError::InvalidKeyMaterial {
                expected: 32,
                actual: 1,
            },
            ErrorKind::InvalidInput,
        ),
        (
            EngineError::InvalidSignatureLength {
                expected: 64,
                actual: 2,
            },
            ErrorKind::InvalidInput,
        ),
        (
            EngineError::CiphertextTooShort {
                minimum: 12,
                actual: 5,
            },
            ErrorKind::InvalidInput,
        ),
        (EngineError::InvalidKeySize(7), ErrorKind::InvalidInput),
        (EngineError::InvalidLength(0), ErrorKind::InvalidInput),
        (
            EngineError::UnsupportedAlgorithm {
                operation: "hash",
                algorithm: Algorithm::Ed25519,
            },
            ErrorKind::NotImplemented,
        ),
        (EngineError::WeakPublicKey, ErrorKind::InvalidInput),
        (
            EngineError::NonContributoryAgreement,
            ErrorKind::DecryptionFailed,
        ),
        (
            EngineError::MalformedPublicKey("bad point".into()),
            ErrorKind::InvalidInput,
        ),
        (
            EngineError::KeyGeneration(PrimitiveError::RandomSourceUnavailable("x".into())),
            ErrorKind::KeyGenerationFailed,
        ),
    ];

    for (source, kind) in cases {
        let reason = source.to_string();
        let err = translate::from_engine(source);
        assert_eq!(err.kind(), kind, "{}", reason);
        assert_eq!(err.reason(), reason);
    }
}

#[test]
fn test_every_remote_code_is_mapped() {
    for code in RemoteErrorCode::ALL {
        let err = translate::from_remote(code.as_str(), "remote reason");
        assert_ne!(err.kind(), ErrorKind::UnmappedSourceError, "{}", code);
        assert_eq!(err.reason(), "remote reason");
    }

    assert_eq!(
        translate::from_remote("invalid_key", "bad").kind(),
        ErrorKind::InvalidInput
    );
    assert_eq!(
        translate::from_remote("verification_failed", "bad").kind(),
        ErrorKind::HashOrMacVerificationFailed
    );
    assert_eq!(
        translate::from_remote("service_unavailable", "down").kind(),
        ErrorKind::ChannelUnavailable
    );
    assert_eq!(
        translate::from_remote("unsupported_operation", "nope").kind(),
        ErrorKind::NotImplemented
    );
}

#[test]
fn test_unknown_remote_code_is_unmapped() {
    let err = translate::from_remote("quantum_decoherence", "cosmic ray");
    assert_eq!(err.kind(), ErrorKind::UnmappedSourceError);
    assert_eq!(err.reason(), "cosmic ray");

    let source = err.source().unwrap();
    assert_eq!(
        source.to_string(),
        UnknownRemoteCode("quantum_decoherence".into()).to_string()
    );
}

#[test]
fn test_every_bridge_error_is_mapped() {
    let cases = [
        (
            BridgeError::SpawnFailed("not found".into()),
            ErrorKind::ChannelUnavailable,
        ),
        (
            BridgeError::ChannelClosed("eof".into()),
            ErrorKind::ChannelUnavailable,
        ),
        (BridgeError::Io("reset".into()), ErrorKind::ChannelUnavailable),
        (
            BridgeError::Timeout {
                request_id: Uuid::nil(),
                after_ms: 5,
            },
            ErrorKind::TimedOut,
        ),
        (
            BridgeError::MalformedReply("garbage".into()),
            ErrorKind::InternalError,
        ),
        (BridgeError::Encode("nan".into()), ErrorKind::InternalError),
    ];

    for (source, kind) in cases {
        let reason = source.to_string();
        assert_eq!(translate::from_bridge(source).kind(), kind, "{}", reason);
    }
}

#[test]
fn test_remote_bridge_error_keeps_remote_reason() {
    let err = translate::from_bridge(BridgeError::Remote {
        code: "decryption_failed".into(),
        reason: "Authentication tag invalid".into(),
    });
    assert_eq!(err.kind(), ErrorKind::DecryptionFailed);
    assert_eq!(err.reason(), "Authentication tag invalid");
}

#[test]
fn test_every_storage_error_is_mapped() {
    let cases = [
        (
            StorageError::NotFound("k".into()),
            ErrorKind::StorageOperationFailed,
        ),
        (
            StorageError::AlreadyExists("k".into()),
            ErrorKind::InvalidInput,
        ),
        (
            StorageError::CorruptRecord {
                id: "k".into(),
                reason: "eof".into(),
            },
            ErrorKind::StorageOperationFailed,
        ),
        (
            StorageError::Backend("locked".into()),
            ErrorKind::StorageOperationFailed,
        ),
        (
            StorageError::Unavailable("no dbus".into()),
            ErrorKind::StorageOperationFailed,
        ),
    ];

    for (source, kind) in cases {
        let reason = source.to_string();
        let err: SecurityError = source.into();
        assert_eq!(err.kind(), kind, "{}", reason);
        assert_eq!(err.reason(), reason);
    }
}

#[test]
fn test_to_remote_round_trips_through_from_remote() {
    for kind in ErrorKind::ALL {
        let code = translate::to_remote(kind);
        let back = translate::from_remote_code(code, "r").kind();
        match kind {
            ErrorKind::WrongInterface => assert_eq!(back, ErrorKind::NotImplemented),
            ErrorKind::UnmappedSourceError => assert_eq!(back, ErrorKind::InternalError),
            _ => assert_eq!(back, kind),
        }
    }
}
