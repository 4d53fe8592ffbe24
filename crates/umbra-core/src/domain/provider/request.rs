//! Provider request and result envelopes

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::domain::crypto::entity::{CryptoOutput, KeyPair, OperationConfig, SecretBytes};
use crate::error::SecurityError;

/// Option key read by `random_bytes`
pub const OPTION_LENGTH: &str = "length";

/// Operation kinds the provider routes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    SymmetricEncrypt,
    SymmetricDecrypt,
    AsymmetricEncrypt,
    AsymmetricDecrypt,
    Hash,
    VerifyHash,
    Mac,
    VerifyMac,
    Sign,
    VerifySignature,
    GenerateKey,
    GenerateKeyPair,
    RandomBytes,
    DeriveKey,
    StoreKey,
    RetrieveKey,
    DeleteKey,
    RotateKey,
    ListKeys,
}

impl OperationKind {
    pub const ALL: [OperationKind; 19] = [
        Self::SymmetricEncrypt,
        Self::SymmetricDecrypt,
        Self::AsymmetricEncrypt,
        Self::AsymmetricDecrypt,
        Self::Hash,
        Self::VerifyHash,
        Self::Mac,
        Self::VerifyMac,
        Self::Sign,
        Self::VerifySignature,
        Self::GenerateKey,
        Self::GenerateKeyPair,
        Self::RandomBytes,
        Self::DeriveKey,
        Self::StoreKey,
        Self::RetrieveKey,
        Self::DeleteKey,
        Self::RotateKey,
        Self::ListKeys,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SymmetricEncrypt => "symmetric_encrypt",
            Self::SymmetricDecrypt => "symmetric_decrypt",
            Self::AsymmetricEncrypt => "asymmetric_encrypt",
            Self::AsymmetricDecrypt => "asymmetric_decrypt",
            Self::Hash => "hash",
            Self::VerifyHash => "verify_hash",
            Self::Mac => "mac",
            Self::VerifyMac => "verify_mac",
            Self::Sign => "sign",
            Self::VerifySignature => "verify_signature",
            Self::GenerateKey => "generate_key",
            Self::GenerateKeyPair => "generate_key_pair",
            Self::RandomBytes => "random_bytes",
            Self::DeriveKey => "derive_key",
            Self::StoreKey => "store_key",
            Self::RetrieveKey => "retrieve_key",
            Self::DeleteKey => "delete_key",
            Self::RotateKey => "rotate_key",
            Self::ListKeys => "list_keys",
        }
    }

    /// Kinds served by the key lifecycle manager rather than the provider
    pub fn is_key_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::StoreKey | Self::RetrieveKey | Self::DeleteKey | Self::RotateKey | Self::ListKeys
        )
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = SecurityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| SecurityError::invalid_input(format!("Unknown operation kind '{}'", s)))
    }
}

/// One request to the provider
///
/// Which payload fields are required depends on the kind:
///
/// | kind | data | key | comparand |
/// |------|------|-----|-----------|
/// | symmetric / asymmetric encrypt & decrypt, mac, sign | yes | yes | - |
/// | hash | yes | - | - |
/// | verify_hash | yes | - | expected digest |
/// | verify_mac | yes | yes | mac |
/// | verify_signature | yes | public key | signature |
#[derive(Debug)]
pub struct SecurityRequest {
    pub kind: OperationKind,
    pub config: OperationConfig,
    pub data: Option<SecretBytes>,
    pub key: Option<SecretBytes>,
    pub comparand: Option<SecretBytes>,
}

impl SecurityRequest {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            config: OperationConfig::default(),
            data: None,
            key: None,
            comparand: None,
        }
    }

    pub fn with_config(mut self, config: OperationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_data(mut self, data: impl Into<SecretBytes>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn with_key(mut self, key: impl Into<SecretBytes>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_comparand(mut self, comparand: impl Into<SecretBytes>) -> Self {
        self.comparand = Some(comparand.into());
        self
    }
}

/// Typed success value of [`super::SecurityProvider::execute`]
#[derive(Debug)]
pub enum ProviderOutput {
    Output(CryptoOutput),
    Bytes(SecretBytes),
    Verified(bool),
    KeyPair(KeyPair),
}

/// Flattened envelope returned by [`super::SecurityProvider::perform`]
///
/// Exactly one of success or `error` holds: a successful result never
/// carries an error and a failed one carries no data.
#[derive(Debug)]
pub struct ProviderResult {
    pub success: bool,
    pub data: Option<SecretBytes>,
    pub metadata: BTreeMap<String, String>,
    pub verified: Option<bool>,
    pub key_pair: Option<KeyPair>,
    pub error: Option<SecurityError>,
}

impl ProviderResult {
    fn empty(success: bool) -> Self {
        Self {
            success,
            data: None,
            metadata: BTreeMap::new(),
            verified: None,
            key_pair: None,
            error: None,
        }
    }
}

impl From<Result<ProviderOutput, SecurityError>> for ProviderResult {
    fn from(result: Result<ProviderOutput, SecurityError>) -> Self {
        match result {
            Ok(ProviderOutput::Output(output)) => {
                let CryptoOutput { data, metadata } = output;
                Self {
                    data: Some(data),
                    metadata,
                    ..Self::empty(true)
                }
            }
            Ok(ProviderOutput::Bytes(bytes)) => Self {
                data: Some(bytes),
                ..Self::empty(true)
            },
            Ok(ProviderOutput::Verified(verified)) => Self {
                verified: Some(verified),
                ..Self::empty(true)
            },
            Ok(ProviderOutput::KeyPair(pair)) => Self {
                key_pair: Some(pair),
                ..Self::empty(true)
            },
            Err(error) => Self {
                error: Some(error),
                ..Self::empty(false)
            },
        }
    }
}
