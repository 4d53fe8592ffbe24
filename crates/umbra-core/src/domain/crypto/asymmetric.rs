//! X25519 sealing and Ed25519 signing
//!
//! Sealed messages use an ephemeral X25519 agreement with the recipient's public
//! key; the AES-256-GCM key is SHA-256 over a context label, the shared secret
//! and both public keys. Wire layout: `ephemeral_public(32) || IV(12) ||
//! ciphertext+tag`.

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use super::entity::{Algorithm, IV_SIZE, KeyPair, SecretBytes, TAG_SIZE};
use super::local::EngineError;
use crate::error::SecurityResult;
use crate::infrastructure::primitives::PrimitivesGateway;

/// Size of X25519 public and private keys in bytes
pub const X25519_KEY_SIZE: usize = 32;

/// Size of an Ed25519 private key (seed) in bytes
pub const ED25519_PRIVATE_KEY_SIZE: usize = 32;

/// Size of an Ed25519 public key in bytes
pub const ED25519_PUBLIC_KEY_SIZE: usize = 32;

/// Size of an Ed25519 signature in bytes
pub const SIGNATURE_SIZE: usize = 64;

/// Smallest well-formed sealed message (empty plaintext)
pub const SEALED_MIN_SIZE: usize = X25519_KEY_SIZE + IV_SIZE + TAG_SIZE;

const SEAL_CONTEXT: &[u8] = b"umbra-x25519-aes256gcm-v1";

fn key_array(bytes: &[u8]) -> Result<Zeroizing<[u8; 32]>, EngineError> {
    if bytes.len() != 32 {
        return Err(EngineError::InvalidKeyMaterial {
            expected: 32,
            actual: bytes.len(),
        });
    }
    let mut array = Zeroizing::new([0u8; 32]);
    array.copy_from_slice(bytes);
    Ok(array)
}

fn key_generation_seed(primitives: &dyn PrimitivesGateway) -> SecurityResult<Zeroizing<[u8; 32]>> {
    let seed = primitives
        .random_bytes(32)
        .map_err(EngineError::KeyGeneration)?;
    Ok(key_array(seed.expose())?)
}

/// Generate an X25519 or Ed25519 key pair from the gateway's secure RNG
pub fn generate_key_pair(
    primitives: &dyn PrimitivesGateway,
    algorithm: Algorithm,
) -> SecurityResult<KeyPair> {
    match algorithm {
        Algorithm::X25519 => {
            let seed = key_generation_seed(primitives)?;
            let secret = StaticSecret::from(*seed);
            let public = PublicKey::from(&secret);
            let private = Zeroizing::new(secret.to_bytes());
            Ok(KeyPair {
                algorithm,
                public_key: SecretBytes::from_slice(public.as_bytes()),
                private_key: SecretBytes::from_slice(&private[..]),
            })
        }
        Algorithm::Ed25519 => {
            let seed = key_generation_seed(primitives)?;
            let signing_key = SigningKey::from_bytes(&seed);
            let private = Zeroizing::new(signing_key.to_bytes());
            Ok(KeyPair {
                algorithm,
                public_key: SecretBytes::from_slice(&signing_key.verifying_key().to_bytes()),
                private_key: SecretBytes::from_slice(&private[..]),
            })
        }
        other => Err(EngineError::UnsupportedAlgorithm {
            operation: "generate_key_pair",
            algorithm: other,
        }
        .into()),
    }
}

fn derive_seal_key(
    primitives: &dyn PrimitivesGateway,
    shared: &[u8],
    ephemeral_public: &[u8],
    recipient_public: &[u8],
) -> SecretBytes {
    let mut material = Zeroizing::new(Vec::with_capacity(
        SEAL_CONTEXT.len() + shared.len() + ephemeral_public.len() + recipient_public.len(),
    ));
    material.extend_from_slice(SEAL_CONTEXT);
    material.extend_from_slice(shared);
    material.extend_from_slice(ephemeral_public);
    material.extend_from_slice(recipient_public);
    primitives.sha256(&material)
}

/// Encrypt `data` for the owner of `recipient_public`
pub fn seal(
    primitives: &dyn PrimitivesGateway,
    data: &[u8],
    recipient_public: &[u8],
    aad: Option<&[u8]>,
) -> SecurityResult<SecretBytes> {
    let recipient = PublicKey::from(*key_array(recipient_public)?);

    let seed = primitives.random_bytes(32)?;
    let ephemeral = StaticSecret::from(*key_array(seed.expose())?);
    let ephemeral_public = PublicKey::from(&ephemeral);

    let shared = ephemeral.diffie_hellman(&recipient);
    if !shared.was_contributory() {
        return Err(EngineError::WeakPublicKey.into());
    }

    let key = derive_seal_key(
        primitives,
        shared.as_bytes(),
        ephemeral_public.as_bytes(),
        recipient.as_bytes(),
    );
    let iv = primitives.random_bytes(IV_SIZE)?;
    let ciphertext = primitives.encrypt_aes_gcm(data, key.expose(), iv.expose(), aad)?;

    let mut sealed = Vec::with_capacity(X25519_KEY_SIZE + IV_SIZE + ciphertext.len());
    sealed.extend_from_slice(ephemeral_public.as_bytes());
    sealed.extend_from_slice(iv.expose());
    sealed.extend_from_slice(ciphertext.expose());
    Ok(SecretBytes::new(sealed))
}

/// Decrypt a message produced by [`seal`] with the recipient's private key
pub fn open(
    primitives: &dyn PrimitivesGateway,
    data: &[u8],
    private_key: &[u8],
    aad: Option<&[u8]>,
) -> SecurityResult<SecretBytes> {
    if data.len() < SEALED_MIN_SIZE {
        return Err(EngineError::CiphertextTooShort {
            minimum: SEALED_MIN_SIZE,
            actual: data.len(),
        }
        .into());
    }

    let secret = StaticSecret::from(*key_array(private_key)?);
    let recipient_public = PublicKey::from(&secret);

    let (ephemeral_bytes, rest) = data.split_at(X25519_KEY_SIZE);
    let (iv, ciphertext) = rest.split_at(IV_SIZE);
    let ephemeral_public = PublicKey::from(*key_array(ephemeral_bytes)?);

    let shared = secret.diffie_hellman(&ephemeral_public);
    if !shared.was_contributory() {
        return Err(EngineError::NonContributoryAgreement.into());
    }

    let key = derive_seal_key(
        primitives,
        shared.as_bytes(),
        ephemeral_public.as_bytes(),
        recipient_public.as_bytes(),
    );
    Ok(primitives.decrypt_aes_gcm(ciphertext, key.expose(), iv, aad)?)
}

/// Sign `data` with an Ed25519 private key (32-byte seed)
pub fn sign(data: &[u8], private_key: &[u8]) -> SecurityResult<SecretBytes> {
    let seed = key_array(private_key)?;
    let signing_key = SigningKey::from_bytes(&seed);
    let signature = signing_key.sign(data);
    Ok(SecretBytes::from_slice(&signature.to_bytes()))
}

/// Verify an Ed25519 signature; a mismatch is `Ok(false)`
pub fn verify(data: &[u8], signature: &[u8], public_key: &[u8]) -> SecurityResult<bool> {
    if signature.len() != SIGNATURE_SIZE {
        return Err(EngineError::InvalidSignatureLength {
            expected: SIGNATURE_SIZE,
            actual: signature.len(),
        }
        .into());
    }
    let key_bytes = key_array(public_key)?;
    let verifying_key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| EngineError::MalformedPublicKey(e.to_string()))?;

    let mut sig_bytes = [0u8; SIGNATURE_SIZE];
    sig_bytes.copy_from_slice(signature);
    let signature = Signature::from_bytes(&sig_bytes);

    Ok(verifying_key.verify_strict(data, &signature).is_ok())
}
