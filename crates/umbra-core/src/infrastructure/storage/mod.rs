//! Secure-storage delegates

pub mod keyring;
pub mod memory;

pub use keyring::{CredentialStore, KeyringSecureStorage, OsCredentialStore};
pub use memory::InMemorySecureStorage;
