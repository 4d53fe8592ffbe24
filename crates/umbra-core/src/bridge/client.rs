//! Client side of the bridge
//!
//! Proxies [`CryptoService`] calls to the helper process and correlates
//! replies by request id.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use super::codec::{FromReply, to_host};
use super::protocol::{
    BridgeError, BridgeReply, BridgeRequest, ClientMessage, META_LENGTH, OP_DECRYPT,
    OP_DECRYPT_ASYMMETRIC, OP_ENCRYPT, OP_ENCRYPT_ASYMMETRIC, OP_GENERATE_KEY,
    OP_GENERATE_KEY_PAIR, OP_GENERATE_MAC, OP_GENERATE_RANDOM_BYTES, OP_HASH, OP_PING, OP_SIGN,
    OP_VERIFY_HASH, OP_VERIFY_MAC, OP_VERIFY_SIGNATURE, encode_line, read_line,
};
use crate::config::BridgeConfig;
use crate::domain::crypto::entity::{CryptoOutput, KeyPair, OperationConfig, SecretBytes};
use crate::domain::crypto::service::CryptoService;
use crate::error::{SecurityError, SecurityResult};

/// Default per-request deadline
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type ReplySender = oneshot::Sender<Result<BridgeReply, BridgeError>>;
type PendingRequests = Arc<Mutex<HashMap<Uuid, ReplySender>>>;

/// Lifecycle of one bridged call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    Sent,
    AwaitingReply,
    Completed,
    TimedOut,
    ChannelError,
    Cancelled,
}

/// Client side of the cross-process bridge
///
/// Implements [`CryptoService`] by sending each call to the helper and
/// awaiting the correlated reply. Any number of calls may be in flight on the
/// one channel.
pub struct BridgeClient {
    outbound: mpsc::UnboundedSender<ClientMessage>,
    pending: PendingRequests,
    connected: Arc<AtomicBool>,
    request_timeout: Duration,
    helper: Option<Mutex<Child>>,
}

impl std::fmt::Debug for BridgeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeClient")
            .field("connected", &self.is_connected())
            .field("pending", &self.pending_requests())
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

fn lock_pending(
    pending: &Mutex<HashMap<Uuid, ReplySender>>,
) -> std::sync::MutexGuard<'_, HashMap<Uuid, ReplySender>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mark the channel down and fail every waiting call
fn fail_all(pending: &PendingRequests, connected: &AtomicBool, reason: &str) {
    connected.store(false, Ordering::SeqCst);
    let drained: Vec<_> = lock_pending(pending).drain().collect();
    if !drained.is_empty() {
        error!(count = drained.len(), reason, "Bridge channel lost with requests in flight");
    }
    for (_, sender) in drained {
        let _ = sender.send(Err(BridgeError::ChannelClosed(reason.to_string())));
    }
}

impl BridgeClient {
    /// Run the client over an already-connected byte stream pair
    ///
    /// Must be called from within a tokio runtime: the reader and writer
    /// tasks are spawned immediately.
    pub fn connect<R, W>(reader: R, writer: W, request_timeout: Duration) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound, rx) = mpsc::unbounded_channel();
        let pending: PendingRequests = Arc::new(Mutex::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(true));

        Self::spawn_writer(writer, rx, pending.clone(), connected.clone());
        Self::spawn_reader(reader, pending.clone(), connected.clone());

        Self {
            outbound,
            pending,
            connected,
            request_timeout,
            helper: None,
        }
    }

    /// Launch the helper process and talk to it over its stdin/stdout
    pub fn spawn_helper(config: &BridgeConfig) -> SecurityResult<Self> {
        let mut child = Command::new(&config.helper_path)
            .args(&config.helper_args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                BridgeError::SpawnFailed(format!("{}: {}", config.helper_path.display(), e))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BridgeError::SpawnFailed("helper stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::SpawnFailed("helper stdout not captured".to_string()))?;

        info!(
            helper = %config.helper_path.display(),
            pid = child.id(),
            "Security helper started"
        );

        let mut client = Self::connect(stdout, stdin, config.request_timeout());
        client.helper = Some(Mutex::new(child));
        Ok(client)
    }

    fn spawn_writer<W>(
        writer: W,
        mut rx: mpsc::UnboundedReceiver<ClientMessage>,
        pending: PendingRequests,
        connected: Arc<AtomicBool>,
    ) where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        tokio::spawn(async move {
            let mut writer = BufWriter::new(writer);
            while let Some(message) = rx.recv().await {
                let line = match encode_line(&message) {
                    Ok(line) => line,
                    Err(e) => {
                        error!(error = %e, "Dropping unencodable bridge message");
                        continue;
                    }
                };
                let written = async {
                    writer.write_all(&line).await?;
                    writer.flush().await
                }
                .await;
                if let Err(e) = written {
                    fail_all(&pending, &connected, &format!("write failed: {}", e));
                    return;
                }
            }
            let _ = writer.shutdown().await;
        });
    }

    fn spawn_reader<R>(reader: R, pending: PendingRequests, connected: Arc<AtomicBool>)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        tokio::spawn(async move {
            let mut reader = BufReader::new(reader);
            let mut line = Zeroizing::new(String::new());
            let reason = loop {
                match read_line(&mut reader, &mut line).await {
                    Ok(0) => break "helper closed the channel".to_string(),
                    Ok(_) => {
                        let trimmed = line.trim();
                        if !trimmed.is_empty() {
                            Self::route_reply(&pending, trimmed);
                        }
                    }
                    Err(e) => break format!("read failed: {}", e),
                }
            };
            fail_all(&pending, &connected, &reason);
        });
    }

    fn route_reply(pending: &PendingRequests, line: &str) {
        let value: serde_json::Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                error!(error = %e, "Discarding unparsable bridge reply");
                return;
            }
        };
        let request_id = match value
            .get("request_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
        {
            Some(id) => id,
            None => {
                error!("Discarding bridge reply without a request id");
                return;
            }
        };

        let Some(sender) = lock_pending(pending).remove(&request_id) else {
            debug!(%request_id, "Discarding late reply for unknown request");
            return;
        };

        let reply = serde_json::from_value::<BridgeReply>(value).map_err(|e| {
            error!(%request_id, error = %e, "Malformed bridge reply");
            BridgeError::MalformedReply(e.to_string())
        });
        let _ = sender.send(reply);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Number of calls currently awaiting a reply
    pub fn pending_requests(&self) -> usize {
        lock_pending(&self.pending).len()
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// OS process id of the spawned helper, if this client launched one
    pub fn helper_pid(&self) -> Option<u32> {
        self.helper
            .as_ref()
            .and_then(|child| child.lock().unwrap_or_else(PoisonError::into_inner).id())
    }

    /// Liveness probe; returns the helper's protocol version
    pub async fn ping(&self) -> SecurityResult<String> {
        let version: SecretBytes = self
            .call(OP_PING, Vec::new(), &OperationConfig::default())
            .await?;
        String::from_utf8(version.expose().to_vec())
            .map_err(|_| SecurityError::internal("ping reply is not valid UTF-8"))
    }

    async fn call<T: FromReply>(
        &self,
        operation: &'static str,
        arguments: Vec<&SecretBytes>,
        config: &OperationConfig,
    ) -> SecurityResult<T> {
        if !self.is_connected() {
            return Err(BridgeError::ChannelClosed("bridge channel is down".to_string()).into());
        }

        let request_id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        let mut in_flight = InFlight::new(self, request_id);

        lock_pending(&self.pending).insert(request_id, tx);
        if !self.is_connected() {
            in_flight.state = RequestState::ChannelError;
            lock_pending(&self.pending).remove(&request_id);
            return Err(BridgeError::ChannelClosed("bridge channel is down".to_string()).into());
        }

        let request = ClientMessage::Request(BridgeRequest {
            request_id,
            operation: operation.to_string(),
            arguments: arguments.into_iter().map(to_host).collect(),
            config: config.clone(),
        });
        if self.outbound.send(request).is_err() {
            in_flight.state = RequestState::ChannelError;
            lock_pending(&self.pending).remove(&request_id);
            return Err(BridgeError::ChannelClosed("bridge writer stopped".to_string()).into());
        }
        in_flight.state = RequestState::Sent;
        debug!(%request_id, operation, "Bridge request sent");

        in_flight.state = RequestState::AwaitingReply;
        match timeout(self.request_timeout, rx).await {
            Err(_) => {
                in_flight.state = RequestState::TimedOut;
                warn!(%request_id, operation, "Bridge request timed out");
                Err(BridgeError::Timeout {
                    request_id,
                    after_ms: self.request_timeout.as_millis() as u64,
                }
                .into())
            }
            Ok(Err(_)) => {
                in_flight.state = RequestState::ChannelError;
                Err(BridgeError::ChannelClosed("reply channel dropped".to_string()).into())
            }
            Ok(Ok(Err(e))) => {
                in_flight.state = match e {
                    BridgeError::ChannelClosed(_) | BridgeError::Io(_) => RequestState::ChannelError,
                    _ => RequestState::Completed,
                };
                Err(e.into())
            }
            Ok(Ok(Ok(reply))) => {
                in_flight.state = RequestState::Completed;
                T::from_reply(reply).map_err(|e| {
                    if let BridgeError::MalformedReply(reason) = &e {
                        error!(%request_id, operation, reason = %reason, "Malformed bridge reply");
                    }
                    e.into()
                })
            }
        }
    }
}

/// Tracks one outstanding call; cleans up when the call ends in any way
///
/// If the future is dropped before a reply arrives (or the call timed out)
/// the pending entry is removed and the helper is told to cancel.
struct InFlight<'a> {
    client: &'a BridgeClient,
    request_id: Uuid,
    state: RequestState,
}

impl<'a> InFlight<'a> {
    fn new(client: &'a BridgeClient, request_id: Uuid) -> Self {
        Self {
            client,
            request_id,
            state: RequestState::Idle,
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let abandoned = match self.state {
            RequestState::Completed | RequestState::ChannelError | RequestState::Idle => false,
            RequestState::Sent | RequestState::AwaitingReply => {
                self.state = RequestState::Cancelled;
                warn!(request_id = %self.request_id, "Bridge request abandoned by caller");
                true
            }
            RequestState::TimedOut | RequestState::Cancelled => true,
        };
        if !abandoned {
            return;
        }

        lock_pending(&self.client.pending).remove(&self.request_id);
        let _ = self.client.outbound.send(ClientMessage::Cancel {
            request_id: self.request_id,
        });
    }
}

#[async_trait]
impl CryptoService for BridgeClient {
    async fn encrypt(
        &self,
        data: &SecretBytes,
        key: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<CryptoOutput> {
        self.call(OP_ENCRYPT, vec![data, key], config).await
    }

    async fn decrypt(
        &self,
        data: &SecretBytes,
        key: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<CryptoOutput> {
        self.call(OP_DECRYPT, vec![data, key], config).await
    }

    async fn encrypt_asymmetric(
        &self,
        data: &SecretBytes,
        public_key: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<CryptoOutput> {
        self.call(OP_ENCRYPT_ASYMMETRIC, vec![data, public_key], config)
            .await
    }

    async fn decrypt_asymmetric(
        &self,
        data: &SecretBytes,
        private_key: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<CryptoOutput> {
        self.call(OP_DECRYPT_ASYMMETRIC, vec![data, private_key], config)
            .await
    }

    async fn hash(
        &self,
        data: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<CryptoOutput> {
        self.call(OP_HASH, vec![data], config).await
    }

    async fn verify_hash(
        &self,
        data: &SecretBytes,
        expected: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<bool> {
        self.call(OP_VERIFY_HASH, vec![data, expected], config).await
    }

    async fn generate_mac(
        &self,
        data: &SecretBytes,
        key: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<CryptoOutput> {
        self.call(OP_GENERATE_MAC, vec![data, key], config).await
    }

    async fn verify_mac(
        &self,
        data: &SecretBytes,
        mac: &SecretBytes,
        key: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<bool> {
        self.call(OP_VERIFY_MAC, vec![data, mac, key], config).await
    }

    async fn sign(
        &self,
        data: &SecretBytes,
        private_key: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<CryptoOutput> {
        self.call(OP_SIGN, vec![data, private_key], config).await
    }

    async fn verify_signature(
        &self,
        data: &SecretBytes,
        signature: &SecretBytes,
        public_key: &SecretBytes,
        config: &OperationConfig,
    ) -> SecurityResult<bool> {
        self.call(OP_VERIFY_SIGNATURE, vec![data, signature, public_key], config)
            .await
    }

    async fn generate_key(&self, config: &OperationConfig) -> SecurityResult<SecretBytes> {
        self.call(OP_GENERATE_KEY, Vec::new(), config).await
    }

    async fn generate_key_pair(&self, config: &OperationConfig) -> SecurityResult<KeyPair> {
        self.call(OP_GENERATE_KEY_PAIR, Vec::new(), config).await
    }

    async fn generate_random_bytes(&self, length: usize) -> SecurityResult<SecretBytes> {
        let config = OperationConfig::new().with_option(META_LENGTH, length.to_string());
        self.call(OP_GENERATE_RANDOM_BYTES, Vec::new(), &config)
            .await
    }
}
