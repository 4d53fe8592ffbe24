//! Key lifecycle entities

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use super::repository::StorageError;
use crate::domain::crypto::entity::SecretBytes;

/// Prefix of identifiers produced by `KeyLifecycleManager::generate`
pub const GENERATED_ID_PREFIX: &str = "key-";

/// Bookkeeping stored alongside key material
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMetadata {
    pub created_at: DateTime<Utc>,
    pub rotated_at: Option<DateTime<Utc>>,
    /// Starts at 1 and increases by one per rotation
    pub version: u32,
    pub size_bits: u32,
}

impl KeyMetadata {
    pub fn new(size_bits: u32) -> Self {
        Self {
            created_at: Utc::now(),
            rotated_at: None,
            version: 1,
            size_bits,
        }
    }

    /// Metadata for the record that replaces this one on rotation
    pub fn rotated(&self) -> Self {
        Self {
            created_at: self.created_at,
            rotated_at: Some(Utc::now()),
            version: self.version.saturating_add(1),
            size_bits: self.size_bits,
        }
    }
}

/// A stored key: identifier, material and metadata
#[derive(Debug)]
pub struct KeyRecord {
    pub id: String,
    pub material: SecretBytes,
    pub metadata: KeyMetadata,
}

impl KeyRecord {
    pub fn new(id: impl Into<String>, material: SecretBytes) -> Self {
        let size_bits = u32::try_from(material.len().saturating_mul(8)).unwrap_or(u32::MAX);
        Self {
            id: id.into(),
            material,
            metadata: KeyMetadata::new(size_bits),
        }
    }

    /// Serialize into the opaque envelope handed to secure storage
    pub fn to_envelope(&self) -> Result<SecretBytes, StorageError> {
        let envelope = KeyEnvelope {
            id: self.id.clone(),
            material: BASE64.encode(self.material.expose()),
            metadata: self.metadata.clone(),
        };
        serde_json::to_vec(&envelope)
            .map(SecretBytes::new)
            .map_err(|e| StorageError::CorruptRecord {
                id: self.id.clone(),
                reason: e.to_string(),
            })
    }

    /// Decode an envelope previously written by [`KeyRecord::to_envelope`]
    pub fn from_envelope(id: &str, bytes: &SecretBytes) -> Result<Self, StorageError> {
        let corrupt = |reason: String| StorageError::CorruptRecord {
            id: id.to_string(),
            reason,
        };

        let envelope: KeyEnvelope =
            serde_json::from_slice(bytes.expose()).map_err(|e| corrupt(e.to_string()))?;
        if envelope.id != id {
            return Err(corrupt(format!("envelope belongs to '{}'", envelope.id)));
        }
        let material = BASE64
            .decode(envelope.material.as_bytes())
            .map_err(|e| corrupt(e.to_string()))?;

        Ok(Self {
            id: id.to_string(),
            material: SecretBytes::new(material),
            metadata: envelope.metadata.clone(),
        })
    }
}

#[derive(Serialize, Deserialize)]
struct KeyEnvelope {
    id: String,
    material: String,
    metadata: KeyMetadata,
}

impl Drop for KeyEnvelope {
    fn drop(&mut self) {
        self.material.zeroize();
    }
}

/// Result of a successful rotation
#[derive(Debug)]
pub struct RotationOutcome {
    pub new_key: SecretBytes,
    /// Present when ciphertext was supplied for re-encryption
    pub reencrypted: Option<SecretBytes>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_preserves_material_and_metadata() {
        let record = KeyRecord::new("db-key", SecretBytes::from_slice(&[9u8; 32]));
        assert_eq!(record.metadata.size_bits, 256);
        assert_eq!(record.metadata.version, 1);

        let envelope = record.to_envelope().unwrap();
        let decoded = KeyRecord::from_envelope("db-key", &envelope).unwrap();
        assert_eq!(decoded.material, record.material);
        assert_eq!(decoded.metadata, record.metadata);
    }

    #[test]
    fn test_envelope_rejects_foreign_id() {
        let record = KeyRecord::new("a", SecretBytes::from_slice(b"k"));
        let envelope = record.to_envelope().unwrap();
        let err = KeyRecord::from_envelope("b", &envelope).unwrap_err();
        assert!(matches!(err, StorageError::CorruptRecord { .. }));
    }

    #[test]
    fn test_rotated_metadata() {
        let metadata = KeyMetadata::new(256);
        let next = metadata.rotated();
        assert_eq!(next.version, 2);
        assert_eq!(next.created_at, metadata.created_at);
        assert!(next.rotated_at.is_some());
    }
}
