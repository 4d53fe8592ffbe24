//! Transforming crypto service
//!
//! Wraps one engine and rewrites inputs, outputs and failures on the way
//! through. Unset transforms are identity and pass the caller's buffers along
//! without copying them.

use async_trait::async_trait;
use std::sync::Arc;

use super::entity::{CryptoOutput, KeyPair, OperationConfig, SecretBytes};
use super::service::CryptoService;
use crate::error::{SecurityError, SecurityResult};

/// Rewrites a data or key argument before the wrapped engine sees it
pub type InputTransform = Arc<dyn Fn(&SecretBytes) -> SecretBytes + Send + Sync>;

/// Rewrites a successful [`CryptoOutput`]
pub type OutputTransform = Arc<dyn Fn(CryptoOutput) -> CryptoOutput + Send + Sync>;

/// Rewrites every failure
pub type ErrorTransform = Arc<dyn Fn(SecurityError) -> SecurityError + Send + Sync>;

/// Adapter applying optional transforms around a wrapped [`CryptoService`]
///
/// - `input_data` applies to the data argument of every operation that has one
/// - `input_key` applies to key arguments (symmetric keys, public and private keys)
/// - `output` applies to operations returning [`CryptoOutput`]
/// - `error` applies to every failure
#[derive(Clone)]
pub struct TransformingCryptoService<S> {
    inner: S,
    input_data: Option<InputTransform>,
    input_key: Option<InputTransform>,
    output: Option<OutputTransform>,
    error: Option<ErrorTransform>,
}

/// Builder for [`TransformingCryptoService`]
pub struct TransformingCryptoServiceBuilder<S> {
    service: TransformingCryptoService<S>,
}

impl<S: CryptoService> TransformingCryptoService<S> {
    /// An adapter with every transform unset
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            input_data: None,
            input_key: None,
            output: None,
            error: None,
        }
    }

    pub fn builder(inner: S) -> TransformingCryptoServiceBuilder<S> {
        TransformingCryptoServiceBuilder {
            service: Self::new(inner),
        }
    }

    /// The wrapped engine
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn data(&self, data: &SecretBytes) -> Option<SecretBytes> {
        self.input_data.as_ref().map(|transform| transform(data))
    }

    fn key(&self, key: &SecretBytes) -> Option<SecretBytes> {
        self.input_key.as_ref().map(|transform| transform(key))
    }

    fn finish_output(&self, result: SecurityResult<CryptoOutput>) -> SecurityResult<CryptoOutput> {
        match result {
            Ok(output) => Ok(match &self.output {
                Some(transform) => transform(output),
                None => output,
            }),
            Err(err) => Err(self.map_error(err)),
        }
    }

    fn finish<T>(&self, result: SecurityResult<T>) -> SecurityResult<T> {
        result.map_err(|err| self.map_error(err))
    }

    fn map_error(&self, err: SecurityError) -> SecurityError {
        match &self.error {
            Some(transform) => transform(err),
            None => err,
        }
    }
}

impl<S: CryptoService> TransformingCryptoServiceBuilder<S> {
    pub fn input_data<F>(mut self, transform: F) -> Self
    where
        F: Fn(&SecretBytes) -> SecretBytes + Send + Sync + 'static,
    {
        self.service.input_data = Some(Arc::new(transform));
        self
    }

    pub fn input_key<F>(mut self, transform: F) -> Self
    where
        F: Fn(&SecretBytes) -> SecretBytes + Send + Sync + 'static,
    {
        self.service.input_key = Some(Arc::new(transform));
        self
    }

    pub fn output<F>(mut self, transform: F) -> Self
    where
        F: Fn(CryptoOutput) -> CryptoOutput + Send + Sync + 'static,
    {
        self.service.output = Some(Arc::new(transform));
        self
    }

    pub fn error<F>(mut self, transform: F) -> Self
    where
        F: Fn(SecurityError) -> SecurityError + Send + Sync + 'static,
    {
        self.service.error = Some(Arc::new(transform));
        self
    }

    pub fn build(self) -> TransformingCryptoService<S> {
        self.service
    }
}

#[async_trait]
impl<S: CryptoService> CryptoService for TransformingCryptoService<S> {
    async fn encrypt(
        &self,
        data: &SecretBytes,
        key: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<CryptoOutput> {
        let data_owned = self.data(data);
        let key_owned = self.key(key);
        let data = data_owned.as_ref().unwrap_or(data);
        let key = key_owned.as_ref().unwrap_or(key);
        self.finish_output(self.inner.encrypt(data, key, config).await)
    }

    async fn decrypt(
        &self,
        data: &SecretBytes,
        key: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<CryptoOutput> {
        let data_owned = self.data(data);
        let key_owned = self.key(key);
        let data = data_owned.as_ref().unwrap_or(data);
        let key = key_owned.as_ref().unwrap_or(key);
        self.finish_output(self.inner.decrypt(data, key, config).await)
    }

    async fn encrypt_asymmetric(
        &self,
        data: &SecretBytes,
        public_key: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<CryptoOutput> {
        let data_owned = self.data(data);
        let key_owned = self.key(public_key);
        let data = data_owned.as_ref().unwrap_or(data);
        let public_key = key_owned.as_ref().unwrap_or(public_key);
        self.finish_output(self.inner.encrypt_asymmetric(data, public_key, config).await)
    }

    async fn decrypt_asymmetric(
        &self,
        data: &SecretBytes,
        private_key: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<CryptoOutput> {
        let data_owned = self.data(data);
        let key_owned = self.key(private_key);
        let data = data_owned.as_ref().unwrap_or(data);
        let private_key = key_owned.as_ref().unwrap_or(private_key);
        self.finish_output(self.inner.decrypt_asymmetric(data, private_key, config).await)
    }

    async fn hash(
        &self,
        data: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<CryptoOutput> {
        let data_owned = self.data(data);
        let data = data_owned.as_ref().unwrap_or(data);
        self.finish_output(self.inner.hash(data, config).await)
    }

    async fn verify_hash(
        &self,
        data: &SecretBytes,
        expected: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<bool> {
        let data_owned = self.data(data);
        let data = data_owned.as_ref().unwrap_or(data);
        self.finish(self.inner.verify_hash(data, expected, config).await)
    }

    async fn generate_mac(
        &self,
        data: &SecretBytes,
        key: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<CryptoOutput> {
        let data_owned = self.data(data);
        let key_owned = self.key(key);
        let data = data_owned.as_ref().unwrap_or(data);
        let key = key_owned.as_ref().unwrap_or(key);
        self.finish_output(self.inner.generate_mac(data, key, config).await)
    }

    async fn verify_mac(
        &self,
        data: &SecretBytes,
        mac: &SecretBytes,
        key: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<bool> {
        let data_owned = self.data(data);
        let key_owned = self.key(key);
        let data = data_owned.as_ref().unwrap_or(data);
        let key = key_owned.as_ref().unwrap_or(key);
        self.finish(self.inner.verify_mac(data, mac, key, config).await)
    }

    async fn sign(
        &self,
        data: &SecretBytes,
        private_key: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<CryptoOutput> {
        let data_owned = self.data(data);
        let key_owned = self.key(private_key);
        let data = data_owned.as_ref().unwrap_or(data);
        let private_key = key_owned.as_ref().unwrap_or(private_key);
        self.finish_output(self.inner.sign(data, private_key, config).await)
    }

    async fn verify_signature(
        &self,
        data: &SecretBytes,
        signature: &SecretBytes,
        public_key: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<bool> {
        let data_owned = self.data(data);
        let key_owned = self.key(public_key);
        let data = data_owned.as_ref().unwrap_or(data);
        let public_key = key_owned.as_ref().unwrap_or(public_key);
        self.finish(
            self.inner
                .verify_signature(data, signature, public_key, config)
                .await,
        )
    }

    async fn generate_key(&self, config: &OperationConfig) -> SecurityResult<SecretBytes> {
        self.finish(self.inner.generate_key(config).await)
    }

    async fn generate_key_pair(&self, config: &OperationConfig) -> SecurityResult<KeyPair> {
        self.finish(self.inner.generate_key_pair(config).await)
    }

    async fn generate_random_bytes(&self, length: usize) -> SecurityResult<SecretBytes> {
        self.finish(self.inner.generate_random_bytes(length).await)
    }
}
