//! Server side of the bridge
//!
//! Runs inside the helper process. Reads [`ClientMessage`] lines, executes each
//! request against a local [`CryptoService`] on its own task, and writes
//! replies through a single writer task.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use super::codec::{IntoPayload, decode_arguments};
use super::protocol::{
    BridgeError, BridgeReply, BridgeRequest, ClientMessage, HostBuffer, META_LENGTH, OP_DECRYPT,
    OP_DECRYPT_ASYMMETRIC, OP_ENCRYPT, OP_ENCRYPT_ASYMMETRIC, OP_GENERATE_KEY,
    OP_GENERATE_KEY_PAIR, OP_GENERATE_MAC, OP_GENERATE_RANDOM_BYTES, OP_HASH, OP_PING, OP_SIGN,
    OP_VERIFY_HASH, OP_VERIFY_MAC, OP_VERIFY_SIGNATURE, PROTOCOL_VERSION, RemoteErrorCode,
    encode_line, read_line,
};
use crate::domain::crypto::entity::{MAX_RANDOM_BYTES, OperationConfig, SecretBytes};
use crate::domain::crypto::service::CryptoService;
use crate::error::SecurityResult;
use crate::translate;

type Payload = (Vec<HostBuffer>, BTreeMap<String, String>);
type Failure = (RemoteErrorCode, String);
type RunningTasks = Arc<Mutex<HashMap<Uuid, AbortHandle>>>;

fn lock_tasks(
    tasks: &Mutex<HashMap<Uuid, AbortHandle>>,
) -> std::sync::MutexGuard<'_, HashMap<Uuid, AbortHandle>> {
    tasks.lock().unwrap_or_else(PoisonError::into_inner)
}

fn abort_all(tasks: &Mutex<HashMap<Uuid, AbortHandle>>) {
    for (_, handle) in lock_tasks(tasks).drain() {
        handle.abort();
    }
}

/// Serves bridge requests against a local engine
#[derive(Clone)]
pub struct BridgeServer {
    service: Arc<dyn CryptoService>,
}

impl std::fmt::Debug for BridgeServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeServer").finish_non_exhaustive()
    }
}

impl BridgeServer {
    pub fn new<S>(service: S) -> Self
    where
        S: CryptoService + 'static,
    {
        Self {
            service: Arc::new(service),
        }
    }

    /// Serve until the reader reaches EOF or `shutdown` is cancelled
    ///
    /// At EOF, requests already accepted run to completion and their replies
    /// are written. On shutdown or a read failure they are aborted.
    pub async fn serve<R, W>(
        &self,
        reader: R,
        writer: W,
        shutdown: CancellationToken,
    ) -> Result<(), BridgeError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (replies, rx) = mpsc::unbounded_channel::<BridgeReply>();
        let mut writer_task = tokio::spawn(Self::write_replies(writer, rx));
        let tasks: RunningTasks = Arc::new(Mutex::new(HashMap::new()));

        info!(version = PROTOCOL_VERSION, "Bridge server ready");

        let mut reader = BufReader::new(reader);
        let mut line = Zeroizing::new(String::new());
        let (outcome, drain) = loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Bridge server shutting down");
                    break (Ok(()), false);
                }
                result = read_line(&mut reader, &mut line) => match result {
                    Ok(0) => {
                        info!("Bridge client closed the channel");
                        break (Ok(()), true);
                    }
                    Ok(_) => {
                        let trimmed = line.trim();
                        if !trimmed.is_empty() {
                            self.handle_line(trimmed, &replies, &tasks);
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Bridge read failed");
                        break (Err(BridgeError::Io(e.to_string())), false);
                    }
                }
            }
        };

        // Request tasks hold the remaining reply senders; the writer stops
        // once they have all finished or been aborted.
        drop(replies);
        if drain {
            let running = lock_tasks(&tasks).len();
            if running > 0 {
                debug!(running, "Draining in-flight requests");
            }
            tokio::select! {
                _ = &mut writer_task => return outcome,
                _ = shutdown.cancelled() => abort_all(&tasks),
            }
        } else {
            abort_all(&tasks);
        }
        let _ = writer_task.await;
        outcome
    }

    async fn write_replies<W>(writer: W, mut rx: mpsc::UnboundedReceiver<BridgeReply>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut writer = BufWriter::new(writer);
        while let Some(reply) = rx.recv().await {
            let line = match encode_line(&reply) {
                Ok(line) => line,
                Err(e) => {
                    error!(request_id = %reply.request_id, error = %e, "Dropping unencodable reply");
                    continue;
                }
            };
            let written = async {
                writer.write_all(&line).await?;
                writer.flush().await
            }
            .await;
            if let Err(e) = written {
                error!(error = %e, "Failed to write bridge reply");
                return;
            }
        }
    }

    fn handle_line(
        &self,
        line: &str,
        replies: &mpsc::UnboundedSender<BridgeReply>,
        tasks: &RunningTasks,
    ) {
        let message = match serde_json::from_str::<ClientMessage>(line) {
            Ok(message) => message,
            Err(e) => {
                Self::reject_unparsable(line, &e, replies);
                return;
            }
        };

        match message {
            ClientMessage::Cancel { request_id } => {
                if let Some(handle) = lock_tasks(tasks).remove(&request_id) {
                    handle.abort();
                    debug!(%request_id, "Request cancelled by client");
                }
            }
            ClientMessage::Request(request) => {
                let request_id = request.request_id;
                debug!(%request_id, operation = %request.operation, "Bridge request received");

                let service = self.service.clone();
                let replies = replies.clone();
                let finished = tasks.clone();

                let mut running = lock_tasks(tasks);
                let handle = tokio::spawn(async move {
                    let reply = dispatch(service.as_ref(), request).await;
                    lock_tasks(&finished).remove(&request_id);
                    let _ = replies.send(reply);
                });
                running.insert(request_id, handle.abort_handle());
            }
        }
    }

    fn reject_unparsable(
        line: &str,
        err: &serde_json::Error,
        replies: &mpsc::UnboundedSender<BridgeReply>,
    ) {
        let request_id = serde_json::from_str::<serde_json::Value>(line)
            .ok()
            .and_then(|v| v.get("request_id").and_then(|id| id.as_str()).map(str::to_owned))
            .and_then(|id| Uuid::parse_str(&id).ok());

        match request_id {
            Some(request_id) => {
                warn!(%request_id, error = %err, "Rejecting malformed request");
                let _ = replies.send(BridgeReply::failure(
                    request_id,
                    RemoteErrorCode::InvalidFormat,
                    format!("malformed request: {}", err),
                ));
            }
            None => warn!(error = %err, "Ignoring unparsable bridge message"),
        }
    }
}

/// Execute one request and build its reply
pub async fn dispatch(service: &dyn CryptoService, request: BridgeRequest) -> BridgeReply {
    let BridgeRequest {
        request_id,
        operation,
        arguments,
        config,
    } = request;

    match execute(service, &operation, arguments, &config).await {
        Ok((payload, metadata)) => BridgeReply::success(request_id, payload, metadata),
        Err((code, reason)) => {
            debug!(%request_id, %operation, %code, "Bridge request failed");
            BridgeReply::failure(request_id, code, reason)
        }
    }
}

fn args<const N: usize>(arguments: Vec<HostBuffer>) -> Result<[SecretBytes; N], Failure> {
    decode_arguments(arguments, N)
        .map_err(|reason| (RemoteErrorCode::InvalidFormat, reason))?
        .try_into()
        .map_err(|_| (RemoteErrorCode::InvalidFormat, format!("expected {} argument(s)", N)))
}

fn encode<T: IntoPayload>(result: SecurityResult<T>) -> Result<Payload, Failure> {
    result
        .map(IntoPayload::into_payload)
        .map_err(|err| (translate::to_remote(err.kind()), err.reason().to_string()))
}

fn random_length(config: &OperationConfig) -> Result<usize, Failure> {
    let invalid = |reason: String| (RemoteErrorCode::InvalidFormat, reason);
    let raw = config
        .option(META_LENGTH)
        .ok_or_else(|| invalid("missing length".to_string()))?;
    let length = raw
        .parse::<i64>()
        .map_err(|_| invalid(format!("length '{}' is not an integer", raw)))?;
    if length <= 0 {
        return Err(invalid(format!("length must be positive, got {}", length)));
    }
    match usize::try_from(length) {
        Ok(length) if length <= MAX_RANDOM_BYTES => Ok(length),
        _ => Err(invalid(format!(
            "length {} exceeds the limit of {} bytes",
            length, MAX_RANDOM_BYTES
        ))),
    }
}

async fn execute(
    service: &dyn CryptoService,
    operation: &str,
    arguments: Vec<HostBuffer>,
    config: &OperationConfig,
) -> Result<Payload, Failure> {
    match operation {
        OP_PING => {
            let [] = args::<0>(arguments)?;
            encode(Ok(SecretBytes::from_slice(PROTOCOL_VERSION.as_bytes())))
        }
        OP_ENCRYPT => {
            let [data, key] = args(arguments)?;
            encode(service.encrypt(&data, &key, config).await)
        }
        OP_DECRYPT => {
            let [data, key] = args(arguments)?;
            encode(service.decrypt(&data, &key, config).await)
        }
        OP_ENCRYPT_ASYMMETRIC => {
            let [data, public_key] = args(arguments)?;
            encode(service.encrypt_asymmetric(&data, &public_key, config).await)
        }
        OP_DECRYPT_ASYMMETRIC => {
            let [data, private_key] = args(arguments)?;
            encode(service.decrypt_asymmetric(&data, &private_key, config).await)
        }
        OP_HASH => {
            let [data] = args(arguments)?;
            encode(service.hash(&data, config).await)
        }
        OP_VERIFY_HASH => {
            let [data, expected] = args(arguments)?;
            encode(service.verify_hash(&data, &expected, config).await)
        }
        OP_GENERATE_MAC => {
            let [data, key] = args(arguments)?;
            encode(service.generate_mac(&data, &key, config).await)
        }
        OP_VERIFY_MAC => {
            let [data, mac, key] = args(arguments)?;
            encode(service.verify_mac(&data, &mac, &key, config).await)
        }
        OP_SIGN => {
            let [data, private_key] = args(arguments)?;
            encode(service.sign(&data, &private_key, config).await)
        }
        OP_VERIFY_SIGNATURE => {
            let [data, signature, public_key] = args(arguments)?;
            encode(
                service
                    .verify_signature(&data, &signature, &public_key, config)
                    .await,
            )
        }
        OP_GENERATE_KEY => {
            let [] = args::<0>(arguments)?;
            encode(service.generate_key(config).await)
        }
        OP_GENERATE_KEY_PAIR => {
            let [] = args::<0>(arguments)?;
            encode(service.generate_key_pair(config).await)
        }
        OP_GENERATE_RANDOM_BYTES => {
            let [] = args::<0>(arguments)?;
            let length = random_length(config)?;
            encode(service.generate_random_bytes(length).await)
        }
        other => {
            warn!(operation = other, "Unsupported bridge operation");
            Err((
                RemoteErrorCode::UnsupportedOperation,
                format!("unknown operation '{}'", other),
            ))
        }
    }
}
