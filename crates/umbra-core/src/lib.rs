//! Umbra Core Library
//!
//! This crate provides the security service layer for Umbra, including:
//! - The capability-based crypto service interface and its adapters
//! - A local engine over a narrow primitives gateway
//! - The cross-process bridge to the isolated helper (client and server)
//! - Key lifecycle management (store, rotate, re-encrypt, generate)
//! - One error taxonomy with a single translator per source domain
//! - A request-routing provider facade and error reporting

pub mod bridge;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod reporting;
pub mod translate;

pub use error::{ErrorKind, Result, SecurityError, SecurityResult, Severity};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::bridge::{BridgeClient, BridgeServer};
    pub use crate::config::UmbraConfig;
    pub use crate::domain::crypto::{
        Algorithm, CryptoOutput, CryptoService, ErasedCryptoService, KeyPair, LocalCryptoEngine,
        OperationConfig, SecretBytes, TransformingCryptoService,
    };
    pub use crate::domain::keys::{KeyLifecycleManager, SecureStorage};
    pub use crate::domain::provider::{
        OperationKind, ProviderResult, SecurityProvider, SecurityRequest,
    };
    pub use crate::error::{ErrorKind, SecurityError, SecurityResult, Severity};
    pub use crate::infrastructure::primitives::{PrimitivesGateway, RustCryptoPrimitives};
    pub use crate::infrastructure::storage::{InMemorySecureStorage, KeyringSecureStorage};
}

#[cfg(test)]
mod crypto_tests;
#[cfg(test)]
mod translate_tests;
