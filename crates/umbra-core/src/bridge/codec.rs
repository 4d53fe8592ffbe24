//! Conversion between interface values and wire buffers
//!
//! The only module that turns [`SecretBytes`] into [`HostBuffer`] and back.
//! Client-side decoding is strict: any reply whose shape does not match the
//! operation is a [`BridgeError::MalformedReply`].

use std::collections::BTreeMap;

use super::protocol::{BridgeError, BridgeReply, HostBuffer};
use crate::domain::crypto::entity::{
    Algorithm, CryptoOutput, KeyPair, META_ALGORITHM, SecretBytes,
};

/// Copy a borrowed secret into a wire buffer
pub fn to_host(bytes: &SecretBytes) -> HostBuffer {
    HostBuffer::new(bytes.expose().to_vec())
}

/// Move an owned secret into a wire buffer
pub fn into_host(bytes: SecretBytes) -> HostBuffer {
    HostBuffer::new(bytes.into_vec())
}

/// Move a wire buffer into a secret
pub fn from_host(mut buffer: HostBuffer) -> SecretBytes {
    SecretBytes::new(buffer.take())
}

/// Convert exactly `arity` wire arguments into secrets
pub fn decode_arguments(
    arguments: Vec<HostBuffer>,
    arity: usize,
) -> Result<Vec<SecretBytes>, String> {
    if arguments.len() != arity {
        return Err(format!(
            "expected {} argument(s), got {}",
            arity,
            arguments.len()
        ));
    }
    Ok(arguments.into_iter().map(from_host).collect())
}

/// Check a reply's success/error fields for consistency
///
/// Failed replies become [`BridgeError::Remote`] carrying the raw code and
/// reason; translation into the unified taxonomy happens in the caller.
pub fn check_reply(reply: BridgeReply) -> Result<BridgeReply, BridgeError> {
    if reply.success {
        if reply.error_code.is_some() || reply.error_reason.is_some() {
            return Err(BridgeError::MalformedReply(
                "successful reply carries error fields".to_string(),
            ));
        }
        return Ok(reply);
    }

    if !reply.payload.is_empty() {
        return Err(BridgeError::MalformedReply(
            "failed reply carries a payload".to_string(),
        ));
    }
    match (&reply.error_code, &reply.error_reason) {
        (Some(code), Some(reason)) => Err(BridgeError::Remote {
            code: code.clone(),
            reason: reason.clone(),
        }),
        _ => Err(BridgeError::MalformedReply(
            "failed reply is missing error_code or error_reason".to_string(),
        )),
    }
}

fn take_payload(reply: BridgeReply, arity: usize) -> Result<ReplyParts, BridgeError> {
    let reply = check_reply(reply)?;
    if reply.payload.len() != arity {
        return Err(BridgeError::MalformedReply(format!(
            "expected {} payload buffer(s), got {}",
            arity,
            reply.payload.len()
        )));
    }
    let BridgeReply {
        payload, metadata, ..
    } = reply;
    Ok(ReplyParts {
        buffers: payload.into_iter().map(from_host).collect(),
        metadata,
    })
}

struct ReplyParts {
    buffers: Vec<SecretBytes>,
    metadata: BTreeMap<String, String>,
}

/// Values a successful reply can decode into
pub trait FromReply: Sized {
    fn from_reply(reply: BridgeReply) -> Result<Self, BridgeError>;
}

/// Values a server-side result can encode from
pub trait IntoPayload {
    fn into_payload(self) -> (Vec<HostBuffer>, BTreeMap<String, String>);
}

impl FromReply for CryptoOutput {
    fn from_reply(reply: BridgeReply) -> Result<Self, BridgeError> {
        let ReplyParts {
            mut buffers,
            metadata,
        } = take_payload(reply, 1)?;
        let data = buffers.pop().unwrap_or_else(SecretBytes::empty);
        Ok(CryptoOutput { data, metadata })
    }
}

impl IntoPayload for CryptoOutput {
    fn into_payload(self) -> (Vec<HostBuffer>, BTreeMap<String, String>) {
        let CryptoOutput { data, metadata } = self;
        (vec![into_host(data)], metadata)
    }
}

impl FromReply for SecretBytes {
    fn from_reply(reply: BridgeReply) -> Result<Self, BridgeError> {
        let ReplyParts { mut buffers, .. } = take_payload(reply, 1)?;
        Ok(buffers.pop().unwrap_or_else(SecretBytes::empty))
    }
}

impl IntoPayload for SecretBytes {
    fn into_payload(self) -> (Vec<HostBuffer>, BTreeMap<String, String>) {
        (vec![into_host(self)], BTreeMap::new())
    }
}

impl FromReply for bool {
    fn from_reply(reply: BridgeReply) -> Result<Self, BridgeError> {
        let ReplyParts { buffers, .. } = take_payload(reply, 1)?;
        match buffers.first().map(SecretBytes::expose) {
            Some([0]) => Ok(false),
            Some([1]) => Ok(true),
            _ => Err(BridgeError::MalformedReply(
                "verification result must be a single 0 or 1 byte".to_string(),
            )),
        }
    }
}

impl IntoPayload for bool {
    fn into_payload(self) -> (Vec<HostBuffer>, BTreeMap<String, String>) {
        (vec![HostBuffer::new(vec![u8::from(self)])], BTreeMap::new())
    }
}

impl FromReply for KeyPair {
    fn from_reply(reply: BridgeReply) -> Result<Self, BridgeError> {
        let ReplyParts { buffers, metadata } = take_payload(reply, 2)?;
        let algorithm = metadata
            .get(META_ALGORITHM)
            .ok_or_else(|| BridgeError::MalformedReply("key pair reply has no algorithm".into()))?
            .parse::<Algorithm>()
            .map_err(|e| BridgeError::MalformedReply(e.reason().to_string()))?;

        let mut buffers = buffers.into_iter();
        match (buffers.next(), buffers.next()) {
            (Some(public_key), Some(private_key)) => Ok(KeyPair {
                algorithm,
                public_key,
                private_key,
            }),
            _ => Err(BridgeError::MalformedReply(
                "key pair reply must carry two buffers".to_string(),
            )),
        }
    }
}

impl IntoPayload for KeyPair {
    fn into_payload(self) -> (Vec<HostBuffer>, BTreeMap<String, String>) {
        let KeyPair {
            algorithm,
            public_key,
            private_key,
        } = self;
        let mut metadata = BTreeMap::new();
        metadata.insert(META_ALGORITHM.to_string(), algorithm.as_str().to_string());
        (vec![into_host(public_key), into_host(private_key)], metadata)
    }
}
