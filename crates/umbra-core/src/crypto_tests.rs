//! Crypto service tests

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::domain::crypto::entity::{
    AES_KEY_SIZE, Algorithm, CryptoOutput, IV_SIZE, MAX_RANDOM_BYTES, META_ALGORITHM,
    META_IV_PREPENDED, OperationConfig, SecretBytes, TAG_SIZE,
};
use crate::domain::crypto::{
    CryptoService, ErasedCryptoService, LocalCryptoEngine, TransformingCryptoService,
};
use crate::error::{ErrorKind, SecurityError};
use crate::infrastructure::primitives::{PrimitiveError, PrimitivesGateway, RustCryptoPrimitives};

fn aes_key() -> SecretBytes {
    SecretBytes::from_slice(&[0x42; AES_KEY_SIZE])
}

fn bytes(data: &[u8]) -> SecretBytes {
    SecretBytes::from_slice(data)
}

/// Gateway whose random source is always unavailable
struct NoEntropy;

impl PrimitivesGateway for NoEntropy {
    fn encrypt_aes_gcm(
        &self,
        data: &[u8],
        key: &[u8],
        iv: &[u8],
        aad: Option<&[u8]>,
    ) -> Result<SecretBytes, PrimitiveError> {
        RustCryptoPrimitives.encrypt_aes_gcm(data, key, iv, aad)
    }

    fn decrypt_aes_gcm(
        &self,
        data: &[u8],
        key: &[u8],
        iv: &[u8],
        aad: Option<&[u8]>,
    ) -> Result<SecretBytes, PrimitiveError> {
        RustCryptoPrimitives.decrypt_aes_gcm(data, key, iv, aad)
    }

    fn sha256(&self, data: &[u8]) -> SecretBytes {
        RustCryptoPrimitives.sha256(data)
    }

    fn hmac_sha256(&self, data: &[u8], key: &[u8]) -> Result<SecretBytes, PrimitiveError> {
        RustCryptoPrimitives.hmac_sha256(data, key)
    }

    fn random_bytes(&self, _count: usize) -> Result<SecretBytes, PrimitiveError> {
        Err(PrimitiveError::RandomSourceUnavailable(
            "entropy pool closed".to_string(),
        ))
    }
}

#[tokio::test]
async fn test_encrypt_decrypt_roundtrip() {
    let engine = LocalCryptoEngine::default();
    let key = aes_key();
    let config = OperationConfig::default();

    let sealed = engine
        .encrypt(&bytes(b"Hello, World!"), &key, &config)
        .await
        .unwrap();
    assert_eq!(sealed.data.len(), IV_SIZE + 13 + TAG_SIZE);
    assert_eq!(
        sealed.metadata.get(META_IV_PREPENDED).map(String::as_str),
        Some("true")
    );
    assert_eq!(
        sealed.metadata.get(META_ALGORITHM).map(String::as_str),
        Some("aes256_gcm")
    );

    let opened = engine.decrypt(&sealed.data, &key, &config).await.unwrap();
    assert_eq!(opened.data.expose(), b"Hello, World!");
}

#[tokio::test]
async fn test_encrypt_produces_fresh_iv() {
    let engine = LocalCryptoEngine::default();
    let key = aes_key();
    let config = OperationConfig::default();

    let a = engine.encrypt(&bytes(b"same"), &key, &config).await.unwrap();
    let b = engine.encrypt(&bytes(b"same"), &key, &config).await.unwrap();
    assert_ne!(a.data, b.data);
}

#[tokio::test]
async fn test_encrypt_with_explicit_iv_and_aad() {
    let engine = LocalCryptoEngine::default();
    let key = aes_key();
    let config = OperationConfig::new()
        .with_iv(vec![7u8; IV_SIZE])
        .with_aad(b"header".to_vec());

    let sealed = engine.encrypt(&bytes(b"body"), &key, &config).await.unwrap();
    assert_eq!(sealed.data.len(), 4 + TAG_SIZE);
    assert!(!sealed.metadata.contains_key(META_IV_PREPENDED));

    let opened = engine.decrypt(&sealed.data, &key, &config).await.unwrap();
    assert_eq!(opened.data.expose(), b"body");

    let wrong_aad = config.clone().with_aad(b"other".to_vec());
    let err = engine
        .decrypt(&sealed.data, &key, &wrong_aad)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DecryptionFailed);
}

#[tokio::test]
async fn test_decrypt_with_wrong_key_fails() {
    let engine = LocalCryptoEngine::default();
    let config = OperationConfig::default();
    let sealed = engine
        .encrypt(&bytes(b"secret"), &aes_key(), &config)
        .await
        .unwrap();

    let other = SecretBytes::from_slice(&[0x24; AES_KEY_SIZE]);
    let err = engine.decrypt(&sealed.data, &other, &config).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DecryptionFailed);
}

#[tokio::test]
async fn test_decrypt_short_ciphertext_is_invalid_input() {
    let engine = LocalCryptoEngine::default();
    let err = engine
        .decrypt(&bytes(&[1, 2, 3]), &aes_key(), &OperationConfig::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[tokio::test]
async fn test_encrypt_rejects_bad_keys() {
    let engine = LocalCryptoEngine::default();
    let config = OperationConfig::default();

    let err = engine
        .encrypt(&bytes(b"x"), &SecretBytes::empty(), &config)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let err = engine
        .encrypt(&bytes(b"x"), &bytes(&[1; 16]), &config)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[tokio::test]
async fn test_unsupported_algorithm_is_not_implemented() {
    let engine = LocalCryptoEngine::default();
    let config = OperationConfig::new().with_algorithm(Algorithm::Ed25519);
    let err = engine.hash(&bytes(b"x"), &config).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotImplemented);
}

#[tokio::test]
async fn test_hash_and_verify_hash() {
    let engine = LocalCryptoEngine::default();
    let config = OperationConfig::default();

    let digest = engine.hash(&bytes(b"abc"), &config).await.unwrap();
    assert_eq!(
        hex::encode(digest.data.expose()),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );

    assert!(
        engine
            .verify_hash(&bytes(b"abc"), &digest.data, &config)
            .await
            .unwrap()
    );
    assert!(
        !engine
            .verify_hash(&bytes(b"abd"), &digest.data, &config)
            .await
            .unwrap()
    );
    assert!(
        !engine
            .verify_hash(&bytes(b"abc"), &bytes(&digest.data.expose()[..16]), &config)
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_mac_and_verify_mac() {
    let engine = LocalCryptoEngine::default();
    let config = OperationConfig::default();
    let key = bytes(b"webhook-secret");

    let mac = engine
        .generate_mac(&bytes(b"payload"), &key, &config)
        .await
        .unwrap();
    assert_eq!(mac.data.len(), 32);

    assert!(
        engine
            .verify_mac(&bytes(b"payload"), &mac.data, &key, &config)
            .await
            .unwrap()
    );
    assert!(
        !engine
            .verify_mac(&bytes(b"payload"), &mac.data, &bytes(b"other"), &config)
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_asymmetric_roundtrip_through_engine() {
    let engine = LocalCryptoEngine::default();
    let config = OperationConfig::default();

    let pair = engine.generate_key_pair(&config).await.unwrap();
    assert_eq!(pair.algorithm, Algorithm::X25519);

    let sealed = engine
        .encrypt_asymmetric(&bytes(b"to bob"), &pair.public_key, &config)
        .await
        .unwrap();
    let opened = engine
        .decrypt_asymmetric(&sealed.data, &pair.private_key, &config)
        .await
        .unwrap();
    assert_eq!(opened.data.expose(), b"to bob");
}

#[tokio::test]
async fn test_sign_and_verify_through_engine() {
    let engine = LocalCryptoEngine::default();
    let config = OperationConfig::new().with_algorithm(Algorithm::Ed25519);

    let pair = engine.generate_key_pair(&config).await.unwrap();
    let signature = engine
        .sign(&bytes(b"release"), &pair.private_key, &config)
        .await
        .unwrap();

    assert!(
        engine
            .verify_signature(&bytes(b"release"), &signature.data, &pair.public_key, &config)
            .await
            .unwrap()
    );
    assert!(
        !engine
            .verify_signature(&bytes(b"relapse"), &signature.data, &pair.public_key, &config)
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_generate_key_sizes() {
    let engine = LocalCryptoEngine::default();

    let key = engine.generate_key(&OperationConfig::default()).await.unwrap();
    assert_eq!(key.len(), 32);

    let key = engine
        .generate_key(&OperationConfig::new().with_key_size_bits(128))
        .await
        .unwrap();
    assert_eq!(key.len(), 16);

    for bits in [0, 7, 8192] {
        let err = engine
            .generate_key(&OperationConfig::new().with_key_size_bits(bits))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput, "{} bits", bits);
    }
}

#[tokio::test]
async fn test_generate_random_bytes() {
    let engine = LocalCryptoEngine::default();
    assert_eq!(engine.generate_random_bytes(24).await.unwrap().len(), 24);

    let err = engine.generate_random_bytes(0).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[tokio::test]
async fn test_oversized_random_request_is_rejected() {
    let engine = LocalCryptoEngine::default();
    for length in [MAX_RANDOM_BYTES + 1, usize::MAX] {
        let err = engine.generate_random_bytes(length).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput, "{}", length);
    }
    let largest = engine.generate_random_bytes(MAX_RANDOM_BYTES).await.unwrap();
    assert_eq!(largest.len(), MAX_RANDOM_BYTES);
}

#[tokio::test]
async fn test_random_source_failures() {
    let engine = LocalCryptoEngine::new(Arc::new(NoEntropy));

    let err = engine.generate_random_bytes(8).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RandomGenerationFailed);

    let err = engine
        .generate_key(&OperationConfig::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::KeyGenerationFailed);

    let err = engine
        .generate_key_pair(&OperationConfig::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::KeyGenerationFailed);
}

#[tokio::test]
async fn test_erased_service_passes_results_through() {
    let erased = ErasedCryptoService::new(LocalCryptoEngine::default());
    let shared = erased.clone();
    let config = OperationConfig::default();
    let key = aes_key();

    let sealed = erased.encrypt(&bytes(b"erased"), &key, &config).await.unwrap();
    let opened = shared.decrypt(&sealed.data, &key, &config).await.unwrap();
    assert_eq!(opened.data.expose(), b"erased");

    let err = shared.generate_random_bytes(0).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(format!("{:?}", erased), "ErasedCryptoService");
}

#[tokio::test]
async fn test_erased_service_from_arc() {
    let engine: Arc<dyn CryptoService> = Arc::new(LocalCryptoEngine::default());
    let erased = ErasedCryptoService::from_arc(engine);
    let digest = erased
        .hash(&bytes(b"abc"), &OperationConfig::default())
        .await
        .unwrap();
    assert_eq!(digest.data.len(), 32);
}

#[tokio::test]
async fn test_transforming_service_identity() {
    let adapter = TransformingCryptoService::new(LocalCryptoEngine::default());
    let config = OperationConfig::default();

    let direct = LocalCryptoEngine::default()
        .hash(&bytes(b"same"), &config)
        .await
        .unwrap();
    let through = adapter.hash(&bytes(b"same"), &config).await.unwrap();
    assert_eq!(direct, through);

    let err = adapter.generate_random_bytes(0).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[tokio::test]
async fn test_transforming_service_rewrites_inputs_and_outputs() {
    let key_calls = Arc::new(AtomicUsize::new(0));
    let counter = key_calls.clone();

    let adapter = TransformingCryptoService::builder(LocalCryptoEngine::default())
        .input_data(|data| {
            let mut upper = data.expose().to_vec();
            upper.make_ascii_uppercase();
            SecretBytes::new(upper)
        })
        .input_key(move |key| {
            counter.fetch_add(1, Ordering::SeqCst);
            key.duplicate()
        })
        .output(|output| output.with_metadata("source", "transformed"))
        .build();
    let config = OperationConfig::default();

    let digest = adapter.hash(&bytes(b"abc"), &config).await.unwrap();
    let expected = LocalCryptoEngine::default()
        .hash(&bytes(b"ABC"), &config)
        .await
        .unwrap();
    assert_eq!(digest.data, expected.data);
    assert_eq!(
        digest.metadata.get("source").map(String::as_str),
        Some("transformed")
    );

    let mac = adapter
        .generate_mac(&bytes(b"abc"), &bytes(b"k"), &config)
        .await
        .unwrap();
    assert_eq!(mac.data.len(), 32);
    assert_eq!(key_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_transforming_service_rewrites_errors() {
    let adapter = TransformingCryptoService::builder(LocalCryptoEngine::default())
        .error(|err| SecurityError::internal(format!("wrapped: {}", err.reason())))
        .build();

    let err = adapter
        .decrypt(&bytes(&[0; 4]), &aes_key(), &OperationConfig::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InternalError);
    assert!(err.reason().starts_with("wrapped: Ciphertext too short"));

    let err = adapter
        .verify_mac(&bytes(b"x"), &bytes(b"y"), &SecretBytes::empty(), &OperationConfig::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InternalError);
}

#[tokio::test]
async fn test_transforming_output_skips_bool_results() {
    let adapter = TransformingCryptoService::builder(LocalCryptoEngine::default())
        .output(|_| CryptoOutput::new(SecretBytes::from_slice(b"replaced")))
        .build();
    let config = OperationConfig::default();

    let digest = LocalCryptoEngine::default()
        .hash(&bytes(b"abc"), &config)
        .await
        .unwrap();
    assert!(
        adapter
            .verify_hash(&bytes(b"abc"), &digest.data, &config)
            .await
            .unwrap()
    );
    let replaced = adapter.hash(&bytes(b"abc"), &config).await.unwrap();
    assert_eq!(replaced.data.expose(), b"replaced");
}

#[test]
fn test_services_are_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<LocalCryptoEngine>();
    assert_send_sync::<ErasedCryptoService>();
    assert_send_sync::<TransformingCryptoService<LocalCryptoEngine>>();
}
