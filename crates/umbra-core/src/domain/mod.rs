//! Domain layer
//!
//! - `crypto` - the crypto service interface, local engine and adapters
//! - `keys` - key lifecycle manager and storage contract
//! - `provider` - request routing facade

pub mod crypto;
pub mod keys;
pub mod provider;
