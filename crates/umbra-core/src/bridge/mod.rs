//! Cross-process security bridge
//!
//! Carries [`crate::domain::crypto::CryptoService`] calls between the host
//! process and the isolated helper. The client proxies the interface; the
//! server adapts incoming requests onto a local engine.

pub mod client;
pub mod codec;
pub mod protocol;
pub mod server;

pub use client::{BridgeClient, DEFAULT_REQUEST_TIMEOUT, RequestState};
pub use protocol::{
    BridgeError, BridgeReply, BridgeRequest, ClientMessage, HostBuffer, PROTOCOL_VERSION,
    RemoteErrorCode,
};
pub use server::BridgeServer;
