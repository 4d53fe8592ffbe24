//! Umbra Core Integration Tests

use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::duplex;
use tokio_util::sync::CancellationToken;
use umbra_core::{
    ErrorKind,
    bridge::{BridgeClient, BridgeServer},
    config::BridgeConfig,
    domain::crypto::{
        CryptoService, ErasedCryptoService, LocalCryptoEngine, OperationConfig, SecretBytes,
    },
    domain::keys::KeyLifecycleManager,
    domain::provider::{OperationKind, SecurityProvider, SecurityRequest},
};

fn bridged_client() -> (BridgeClient, CancellationToken) {
    let (client_side, server_side) = duplex(64 * 1024);
    let (client_read, client_write) = tokio::io::split(client_side);
    let (server_read, server_write) = tokio::io::split(server_side);

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    let server = BridgeServer::new(LocalCryptoEngine::default());
    tokio::spawn(async move { server.serve(server_read, server_write, token).await });

    (
        BridgeClient::connect(client_read, client_write, Duration::from_secs(5)),
        shutdown,
    )
}

#[tokio::test]
async fn test_store_then_retrieve_returns_same_key() {
    let manager = KeyLifecycleManager::in_memory();
    let key = SecretBytes::from_slice(&[0x33; 32]);

    manager.store("k1", &key).await.unwrap();
    let retrieved = manager.retrieve("k1").await.unwrap();
    assert_eq!(retrieved.len(), 32);
    assert_eq!(retrieved, key);
}

#[tokio::test]
async fn test_encrypt_then_decrypt_hello() {
    let key = SecretBytes::from_slice(&[0x44; 32]);
    let config = OperationConfig::default();
    let (client, _shutdown) = bridged_client();

    let engines: Vec<ErasedCryptoService> = vec![
        ErasedCryptoService::new(LocalCryptoEngine::default()),
        ErasedCryptoService::new(client),
    ];
    for engine in engines {
        let sealed = engine
            .encrypt(&SecretBytes::from_slice(b"hello"), &key, &config)
            .await
            .unwrap();
        assert!(sealed.data.len() >= 12 + 5);

        let opened = engine.decrypt(&sealed.data, &key, &config).await.unwrap();
        assert_eq!(opened.data.expose(), b"hello");
    }
}

#[tokio::test]
async fn test_rotate_missing_key_leaves_store_unchanged() {
    let manager = KeyLifecycleManager::in_memory();
    manager
        .store("other", &SecretBytes::from_slice(&[1; 32]))
        .await
        .unwrap();

    let err = manager.rotate("k1", None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StorageOperationFailed);
    assert_eq!(manager.list().await.unwrap(), vec!["other".to_string()]);
}

#[tokio::test]
async fn test_unreachable_helper_is_channel_unavailable() {
    // Peer end dropped before any call is made
    let (client_side, helper_side) = duplex(1024);
    drop(helper_side);
    let (read, write) = tokio::io::split(client_side);
    let client = BridgeClient::connect(read, write, Duration::from_secs(5));

    let err = tokio::time::timeout(Duration::from_secs(2), client.ping())
        .await
        .expect("call must resolve rather than hang")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ChannelUnavailable);

    // Helper binary that cannot be started
    let config = BridgeConfig {
        helper_path: "/nonexistent/umbra-helper".into(),
        ..BridgeConfig::default()
    };
    let err = BridgeClient::spawn_helper(&config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ChannelUnavailable);
}

#[tokio::test]
async fn test_random_bytes_lengths() {
    let provider = SecurityProvider::new(ErasedCryptoService::new(LocalCryptoEngine::default()));
    let request = |length: &str| {
        SecurityRequest::new(OperationKind::RandomBytes)
            .with_config(OperationConfig::new().with_option("length", length))
    };

    for length in ["0", "-1"] {
        let result = provider.perform(request(length)).await;
        assert_eq!(result.error.unwrap().kind(), ErrorKind::InvalidInput);
    }

    let first = provider.perform(request("16")).await.data.unwrap();
    let second = provider.perform(request("16")).await.data.unwrap();
    assert_eq!(first.len(), 16);
    assert_eq!(second.len(), 16);
    assert_ne!(first, second);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_rotations_through_bridge() {
    let (client, _shutdown) = bridged_client();
    let engine = ErasedCryptoService::new(client);
    let manager = Arc::new(KeyLifecycleManager::with_engine(
        Arc::new(umbra_core::infrastructure::storage::InMemorySecureStorage::new()),
        Arc::new(umbra_core::infrastructure::primitives::RustCryptoPrimitives::new()),
        engine.clone(),
    ));

    let key = SecretBytes::from_slice(&[0x77; 32]);
    manager.store("shared", &key).await.unwrap();
    let ciphertext = engine
        .encrypt(
            &SecretBytes::from_slice(b"rotate me"),
            &key,
            &OperationConfig::default(),
        )
        .await
        .unwrap()
        .data;

    let rotations = join_all((0..8).map(|_| {
        let manager = manager.clone();
        async move { manager.rotate("shared", None).await }
    }))
    .await;
    assert!(rotations.iter().all(Result::is_ok));
    assert_eq!(manager.metadata("shared").await.unwrap().version, 9);

    // The ciphertext was made under the original key and no longer opens
    let err = manager
        .rotate("shared", Some(&ciphertext))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DecryptionFailed);
    assert_eq!(manager.metadata("shared").await.unwrap().version, 9);
}
