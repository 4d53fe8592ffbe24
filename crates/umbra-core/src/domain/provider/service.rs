//! Security provider
//!
//! Facade that turns one `{kind, configuration, payload}` request into exactly
//! one crypto service call. Key lifecycle kinds are rejected here; callers use
//! [`crate::domain::keys::KeyLifecycleManager`] for those.

use std::sync::Arc;
use tracing::debug;

use super::request::{OPTION_LENGTH, OperationKind, ProviderOutput, ProviderResult, SecurityRequest};
use crate::domain::crypto::entity::{MAX_RANDOM_BYTES, SecretBytes};
use crate::domain::crypto::erased::ErasedCryptoService;
use crate::domain::crypto::service::CryptoService;
use crate::error::{SecurityError, SecurityResult};
use crate::reporting::{ErrorReport, ErrorSink, TracingErrorSink};

const COMPONENT: &str = "provider";

/// Routes provider requests to a crypto service
#[derive(Clone)]
pub struct SecurityProvider {
    service: ErasedCryptoService,
    sink: Arc<dyn ErrorSink>,
}

impl std::fmt::Debug for SecurityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityProvider")
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

fn required<'a>(
    field: Option<&'a SecretBytes>,
    name: &str,
    kind: OperationKind,
) -> SecurityResult<&'a SecretBytes> {
    field.ok_or_else(|| SecurityError::invalid_input(format!("{} requires {}", kind, name)))
}

impl SecurityProvider {
    /// Provider reporting failures through `tracing`
    pub fn new(service: ErasedCryptoService) -> Self {
        Self::with_sink(service, Arc::new(TracingErrorSink))
    }

    pub fn with_sink(service: ErasedCryptoService, sink: Arc<dyn ErrorSink>) -> Self {
        Self { service, sink }
    }

    /// Execute a request and flatten the outcome into a [`ProviderResult`]
    pub async fn perform(&self, request: SecurityRequest) -> ProviderResult {
        self.execute(request).await.into()
    }

    /// Execute a request, returning the typed outcome
    ///
    /// Every failure is also handed to the error sink.
    pub async fn execute(&self, request: SecurityRequest) -> SecurityResult<ProviderOutput> {
        let kind = request.kind;
        debug!(operation = %kind, "Provider request");
        let result = self.route(request).await;
        if let Err(err) = &result {
            self.sink.report(ErrorReport::new(err.clone(), COMPONENT));
        }
        result
    }

    async fn route(&self, request: SecurityRequest) -> SecurityResult<ProviderOutput> {
        let SecurityRequest {
            kind,
            config,
            data,
            key,
            comparand,
        } = request;
        let data = data.as_ref();
        let key = key.as_ref();
        let comparand = comparand.as_ref();
        let service = &self.service;

        let output = match kind {
            OperationKind::SymmetricEncrypt => ProviderOutput::Output(
                service
                    .encrypt(required(data, "data", kind)?, required(key, "key", kind)?, &config)
                    .await?,
            ),
            OperationKind::SymmetricDecrypt => ProviderOutput::Output(
                service
                    .decrypt(required(data, "data", kind)?, required(key, "key", kind)?, &config)
                    .await?,
            ),
            OperationKind::AsymmetricEncrypt => ProviderOutput::Output(
                service
                    .encrypt_asymmetric(
                        required(data, "data", kind)?,
                        required(key, "public key", kind)?,
                        &config,
                    )
                    .await?,
            ),
            OperationKind::AsymmetricDecrypt => ProviderOutput::Output(
                service
                    .decrypt_asymmetric(
                        required(data, "data", kind)?,
                        required(key, "private key", kind)?,
                        &config,
                    )
                    .await?,
            ),
            OperationKind::Hash => {
                ProviderOutput::Output(service.hash(required(data, "data", kind)?, &config).await?)
            }
            OperationKind::VerifyHash => ProviderOutput::Verified(
                service
                    .verify_hash(
                        required(data, "data", kind)?,
                        required(comparand, "expected digest", kind)?,
                        &config,
                    )
                    .await?,
            ),
            OperationKind::Mac => ProviderOutput::Output(
                service
                    .generate_mac(required(data, "data", kind)?, required(key, "key", kind)?, &config)
                    .await?,
            ),
            OperationKind::VerifyMac => ProviderOutput::Verified(
                service
                    .verify_mac(
                        required(data, "data", kind)?,
                        required(comparand, "mac", kind)?,
                        required(key, "key", kind)?,
                        &config,
                    )
                    .await?,
            ),
            OperationKind::Sign => ProviderOutput::Output(
                service
                    .sign(
                        required(data, "data", kind)?,
                        required(key, "private key", kind)?,
                        &config,
                    )
                    .await?,
            ),
            OperationKind::VerifySignature => ProviderOutput::Verified(
                service
                    .verify_signature(
                        required(data, "data", kind)?,
                        required(comparand, "signature", kind)?,
                        required(key, "public key", kind)?,
                        &config,
                    )
                    .await?,
            ),
            OperationKind::GenerateKey => {
                ProviderOutput::Bytes(service.generate_key(&config).await?)
            }
            OperationKind::GenerateKeyPair => {
                ProviderOutput::KeyPair(service.generate_key_pair(&config).await?)
            }
            OperationKind::RandomBytes => {
                let length = random_length(config.option(OPTION_LENGTH))?;
                ProviderOutput::Bytes(service.generate_random_bytes(length).await?)
            }
            OperationKind::DeriveKey => {
                return Err(SecurityError::not_implemented(
                    "Key derivation is not available",
                ));
            }
            OperationKind::StoreKey
            | OperationKind::RetrieveKey
            | OperationKind::DeleteKey
            | OperationKind::RotateKey
            | OperationKind::ListKeys => {
                return Err(SecurityError::wrong_interface(format!(
                    "{} is a key lifecycle operation; use KeyLifecycleManager",
                    kind
                )));
            }
        };
        Ok(output)
    }
}

/// Parse the requested random length; only positive integers up to
/// [`MAX_RANDOM_BYTES`] are accepted
fn random_length(raw: Option<&str>) -> SecurityResult<usize> {
    let raw = raw.ok_or_else(|| {
        SecurityError::invalid_input(format!("random_bytes requires option '{}'", OPTION_LENGTH))
    })?;
    let length: i64 = raw
        .trim()
        .parse()
        .map_err(|_| SecurityError::invalid_input(format!("Invalid length '{}'", raw)))?;
    if length <= 0 {
        return Err(SecurityError::invalid_input(format!(
            "Length must be positive, got {}",
            length
        )));
    }
    match usize::try_from(length) {
        Ok(length) if length <= MAX_RANDOM_BYTES => Ok(length),
        _ => Err(SecurityError::invalid_input(format!(
            "Length {} exceeds the limit of {} bytes",
            length, MAX_RANDOM_BYTES
        ))),
    }
}
