//! Security provider facade

pub mod request;
pub mod service;

pub use request::{OperationKind, ProviderOutput, ProviderResult, SecurityRequest};
pub use service::SecurityProvider;
