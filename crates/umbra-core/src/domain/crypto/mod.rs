//! Cryptographic service domain
//!
//! - `service` - the [`CryptoService`] capability interface
//! - `local` - in-process engine over the primitives gateway
//! - `erased` / `transforming` - adapters over any engine

pub mod asymmetric;
pub mod entity;
pub mod erased;
pub mod local;
pub mod service;
pub mod transforming;

pub use entity::{
    Algorithm, CryptoOutput, KeyPair, OperationConfig, SecretBytes, constant_time_eq,
};
pub use erased::ErasedCryptoService;
pub use local::{EngineError, LocalCryptoEngine};
pub use service::CryptoService;
pub use transforming::{TransformingCryptoService, TransformingCryptoServiceBuilder};
