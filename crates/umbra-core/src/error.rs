//! Error types for Umbra
//!
//! Every failure that leaves a component is a [`SecurityError`]: one kind from the
//! unified taxonomy plus the original reason string. Source-domain errors
//! (primitives, engine, bridge, storage, remote codes) are converted by
//! [`crate::translate`] and never inspected again after that.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Result type alias using Umbra's [`SecurityError`]
pub type SecurityResult<T> = std::result::Result<T, SecurityError>;

/// Shorthand kept for call sites that import `umbra_core::Result`
pub type Result<T> = SecurityResult<T>;

/// The lower-level error a [`SecurityError`] replaced
pub type SourceError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Unified taxonomy of security failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or missing arguments
    InvalidInput,
    EncryptionFailed,
    DecryptionFailed,
    KeyGenerationFailed,
    /// Hash, MAC or signature verification could not be performed
    HashOrMacVerificationFailed,
    RandomGenerationFailed,
    /// Key store CRUD failure, including "key not found"
    StorageOperationFailed,
    /// Cross-process channel is down or the helper is unreachable
    ChannelUnavailable,
    /// A bridged call exceeded its deadline; the channel stays usable
    TimedOut,
    NotImplemented,
    /// The request belongs to another interface (e.g. key lifecycle)
    WrongInterface,
    InternalError,
    /// Translator fallback for source values this build does not know
    UnmappedSourceError,
}

impl ErrorKind {
    /// Every kind, in code order
    pub const ALL: [ErrorKind; 13] = [
        Self::InvalidInput,
        Self::EncryptionFailed,
        Self::DecryptionFailed,
        Self::KeyGenerationFailed,
        Self::HashOrMacVerificationFailed,
        Self::RandomGenerationFailed,
        Self::StorageOperationFailed,
        Self::ChannelUnavailable,
        Self::TimedOut,
        Self::NotImplemented,
        Self::WrongInterface,
        Self::InternalError,
        Self::UnmappedSourceError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::EncryptionFailed => "encryption_failed",
            Self::DecryptionFailed => "decryption_failed",
            Self::KeyGenerationFailed => "key_generation_failed",
            Self::HashOrMacVerificationFailed => "hash_or_mac_verification_failed",
            Self::RandomGenerationFailed => "random_generation_failed",
            Self::StorageOperationFailed => "storage_operation_failed",
            Self::ChannelUnavailable => "channel_unavailable",
            Self::TimedOut => "timed_out",
            Self::NotImplemented => "not_implemented",
            Self::WrongInterface => "wrong_interface",
            Self::InternalError => "internal_error",
            Self::UnmappedSourceError => "unmapped_source_error",
        }
    }

    /// Stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput => "SEC001",
            Self::EncryptionFailed => "SEC100",
            Self::DecryptionFailed => "SEC101",
            Self::KeyGenerationFailed => "SEC102",
            Self::HashOrMacVerificationFailed => "SEC103",
            Self::RandomGenerationFailed => "SEC104",
            Self::StorageOperationFailed => "SEC200",
            Self::ChannelUnavailable => "SEC300",
            Self::TimedOut => "SEC301",
            Self::NotImplemented => "SEC400",
            Self::WrongInterface => "SEC401",
            Self::InternalError => "SEC900",
            Self::UnmappedSourceError => "SEC999",
        }
    }

    /// Severity used when the kind is reported without an explicit override
    pub fn default_severity(&self) -> Severity {
        match self {
            Self::InvalidInput | Self::WrongInterface | Self::NotImplemented => Severity::Warning,
            Self::TimedOut => Severity::Warning,
            Self::EncryptionFailed
            | Self::DecryptionFailed
            | Self::KeyGenerationFailed
            | Self::HashOrMacVerificationFailed
            | Self::StorageOperationFailed
            | Self::UnmappedSourceError => Severity::Error,
            Self::RandomGenerationFailed | Self::ChannelUnavailable | Self::InternalError => {
                Severity::Critical
            }
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How loudly the host should surface a reported error
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        };
        write!(f, "{}", s)
    }
}

/// A failure expressed in the unified taxonomy
#[derive(Debug, Clone, Error)]
#[error("{kind}: {reason}")]
pub struct SecurityError {
    kind: ErrorKind,
    reason: String,
    #[source]
    source: Option<SourceError>,
}

impl SecurityError {
    /// Create an error of the given kind
    pub fn new(kind: ErrorKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
            source: None,
        }
    }

    /// Attach the lower-level error this one replaced
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, reason)
    }

    pub fn encryption_failed(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::EncryptionFailed, reason)
    }

    pub fn decryption_failed(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::DecryptionFailed, reason)
    }

    pub fn key_generation_failed(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::KeyGenerationFailed, reason)
    }

    pub fn storage(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::StorageOperationFailed, reason)
    }

    pub fn channel_unavailable(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::ChannelUnavailable, reason)
    }

    pub fn not_implemented(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotImplemented, reason)
    }

    pub fn wrong_interface(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::WrongInterface, reason)
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, reason)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The original, untranslated reason string
    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn severity(&self) -> Severity {
        self.kind.default_severity()
    }

    /// Get suggestion for how to recover from this error
    pub fn suggestion(&self) -> Option<String> {
        match self.kind {
            ErrorKind::ChannelUnavailable => {
                Some("Restart the security helper and retry the operation".to_string())
            }
            ErrorKind::TimedOut => Some(
                "Retry the operation or raise bridge.request_timeout_ms in config.toml".to_string(),
            ),
            ErrorKind::WrongInterface => {
                Some("Use KeyLifecycleManager for key storage operations".to_string())
            }
            ErrorKind::StorageOperationFailed => {
                Some("Check the key identifier with KeyLifecycleManager::list".to_string())
            }
            _ => None,
        }
    }
}
