//! Socket client for a remote pty host

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, trace, warn};
use url::Url;
use uuid::Uuid;

use stackdeck_protocol::{
    ClientCodec, ClientMessage, ErrorCode, Geometry, OutputChunk, ServerMessage, ServiceAction,
    ServiceInfo, SessionId, PROTOCOL_VERSION,
};
use stackdeck_utils::{Result, StackdeckError};

use crate::config::HostConfig;
use crate::host::{OutputStream, PtyHost};
use crate::services::ServiceManager;

/// Outgoing message queue depth
const OUTGOING_CAPACITY: usize = 100;

/// Trait alias for streams that can be used with Framed
pub trait StreamTrait: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> StreamTrait for T {}

type Transport = Framed<Box<dyn StreamTrait>, ClientCodec>;

/// State shared between callers and the connection task
struct Shared {
    /// Requests awaiting `Ack`/`Error`, by request id
    pending: Mutex<HashMap<u64, oneshot::Sender<Result<()>>>>,
    /// Output routing, live from `open` until `close` or `PtyExited`
    outputs: Mutex<HashMap<SessionId, mpsc::UnboundedSender<OutputChunk>>>,
    /// Streams created at `open`, handed out once by `subscribe`
    streams: Mutex<HashMap<SessionId, OutputStream>>,
    services: watch::Sender<Vec<ServiceInfo>>,
}

/// `PtyHost` and `ServiceManager` backed by a socket connection
pub struct RemotePtyHost {
    outgoing: mpsc::Sender<ClientMessage>,
    shared: Arc<Shared>,
    next_request_id: AtomicU64,
    request_timeout: Duration,
    task_handle: JoinHandle<()>,
}

impl RemotePtyHost {
    /// Connect using the `[host]` configuration section
    pub async fn connect_with_config(config: &HostConfig) -> Result<Self> {
        Self::connect(&config.address(), config.request_timeout()).await
    }

    /// Connect to `unix:///path`, `tcp://host:port` or a bare socket path
    /// and perform the handshake
    pub async fn connect(address: &str, request_timeout: Duration) -> Result<Self> {
        let stream = open_stream(address).await?;
        let mut framed: Transport = Framed::new(stream, ClientCodec::new());

        handshake(&mut framed, request_timeout).await?;

        let (outgoing_tx, outgoing_rx) = mpsc::channel(OUTGOING_CAPACITY);
        let (services_tx, _) = watch::channel(Vec::new());
        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            outputs: Mutex::new(HashMap::new()),
            streams: Mutex::new(HashMap::new()),
            services: services_tx,
        });

        let task_handle = tokio::spawn(connection_task(framed, outgoing_rx, Arc::clone(&shared)));
        info!(address = %address, "Connected to pty host");

        Ok(Self {
            outgoing: outgoing_tx,
            shared,
            next_request_id: AtomicU64::new(1),
            request_timeout,
            task_handle,
        })
    }

    /// Service status pushed by the host
    pub fn services(&self) -> watch::Receiver<Vec<ServiceInfo>> {
        self.shared.services.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        !self.task_handle.is_finished()
    }

    /// Send a request and wait for its `Ack` or `Error`
    async fn request(&self, build: impl FnOnce(u64) -> ClientMessage) -> Result<()> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().insert(request_id, tx);

        if self.outgoing.send(build(request_id)).await.is_err() {
            self.shared.pending.lock().remove(&request_id);
            return Err(StackdeckError::ConnectionClosed);
        }

        match timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(StackdeckError::ConnectionClosed),
            Err(_) => {
                self.shared.pending.lock().remove(&request_id);
                Err(StackdeckError::ConnectionTimeout {
                    seconds: self.request_timeout.as_secs(),
                })
            }
        }
    }

    fn forget_session(&self, session_id: SessionId) {
        self.shared.outputs.lock().remove(&session_id);
        self.shared.streams.lock().remove(&session_id);
    }
}

impl Drop for RemotePtyHost {
    fn drop(&mut self) {
        self.task_handle.abort();
    }
}

impl std::fmt::Debug for RemotePtyHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemotePtyHost")
            .field("connected", &self.is_connected())
            .field("pending", &self.shared.pending.lock().len())
            .field("sessions", &self.shared.outputs.lock().len())
            .finish()
    }
}

#[async_trait]
impl PtyHost for RemotePtyHost {
    async fn open(&self, session_id: SessionId, geometry: Geometry, cwd: Option<&Path>) -> Result<()> {
        // Route output before the host can produce any
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.outputs.lock().insert(session_id, tx);
        self.shared.streams.lock().insert(session_id, rx);

        let cwd = cwd.map(|p| p.to_string_lossy().into_owned());
        let result = self
            .request(|request_id| ClientMessage::OpenPty {
                request_id,
                session_id,
                cols: geometry.cols,
                rows: geometry.rows,
                cwd,
            })
            .await;

        if result.is_err() {
            self.forget_session(session_id);
        }
        result
    }

    async fn write(&self, session_id: SessionId, data: &str) -> Result<()> {
        let data = data.as_bytes().to_vec();
        self.request(|request_id| ClientMessage::Input {
            request_id,
            session_id,
            data,
        })
        .await
    }

    async fn resize(&self, session_id: SessionId, geometry: Geometry) -> Result<()> {
        self.request(|request_id| ClientMessage::ResizePty {
            request_id,
            session_id,
            cols: geometry.cols,
            rows: geometry.rows,
        })
        .await
    }

    async fn close(&self, session_id: SessionId) -> Result<()> {
        self.forget_session(session_id);
        self.request(|request_id| ClientMessage::ClosePty {
            request_id,
            session_id,
        })
        .await
    }

    async fn subscribe(&self, session_id: SessionId) -> Result<OutputStream> {
        self.shared
            .streams
            .lock()
            .remove(&session_id)
            .ok_or_else(|| StackdeckError::SessionNotFound(session_id.to_string()))
    }
}

#[async_trait]
impl ServiceManager for RemotePtyHost {
    async fn control(&self, name: &str, action: ServiceAction) -> Result<()> {
        let name = name.to_string();
        self.request(|request_id| ClientMessage::ServiceControl {
            request_id,
            name,
            action,
        })
        .await
    }
}

/// Parse the address and open the socket
async fn open_stream(address: &str) -> Result<Box<dyn StreamTrait>> {
    if address.starts_with("tcp://") {
        let url = Url::parse(address).map_err(|e| {
            StackdeckError::Connection(format!("Invalid TCP URL '{}': {}", address, e))
        })?;
        let host = url
            .host_str()
            .ok_or_else(|| StackdeckError::Connection("Missing host in TCP URL".into()))?;
        let port = url
            .port()
            .ok_or_else(|| StackdeckError::Connection("Missing port in TCP URL".into()))?;

        let addr = format!("{}:{}", host, port);
        let stream = TcpStream::connect(&addr).await.map_err(|e| {
            StackdeckError::Connection(format!("Failed to connect to {}: {}", addr, e))
        })?;
        return Ok(Box::new(stream));
    }

    let path = if address.starts_with("unix://") {
        let url = Url::parse(address)
            .map_err(|e| StackdeckError::Connection(format!("Invalid Unix URL: {}", e)))?;
        PathBuf::from(url.path())
    } else {
        PathBuf::from(address)
    };

    if !path.exists() {
        return Err(StackdeckError::ServerNotRunning { path });
    }

    let stream = UnixStream::connect(&path).await.map_err(|e| {
        StackdeckError::Connection(format!("Failed to connect to {}: {}", path.display(), e))
    })?;
    Ok(Box::new(stream))
}

async fn handshake(framed: &mut Transport, wait: Duration) -> Result<()> {
    framed
        .send(ClientMessage::Connect {
            client_id: Uuid::new_v4(),
            protocol_version: PROTOCOL_VERSION,
        })
        .await
        .map_err(|e| StackdeckError::Connection(format!("Failed to send handshake: {}", e)))?;

    let reply = timeout(wait, framed.next())
        .await
        .map_err(|_| StackdeckError::ConnectionTimeout {
            seconds: wait.as_secs(),
        })?;

    match reply {
        Some(Ok(ServerMessage::Connected {
            server_version,
            protocol_version,
        })) => {
            if protocol_version != PROTOCOL_VERSION {
                return Err(StackdeckError::ProtocolMismatch {
                    client: PROTOCOL_VERSION,
                    server: protocol_version,
                });
            }
            debug!(server_version = %server_version, "Handshake complete");
            Ok(())
        }
        Some(Ok(ServerMessage::Error { code, message, .. })) => {
            Err(StackdeckError::host(code.to_string(), message))
        }
        Some(Ok(other)) => Err(StackdeckError::protocol(format!(
            "Unexpected handshake reply: {:?}",
            other
        ))),
        Some(Err(e)) => Err(StackdeckError::protocol(e.to_string())),
        None => Err(StackdeckError::ConnectionClosed),
    }
}

/// Map a host error reply onto the error taxonomy
fn host_error(code: ErrorCode, message: String) -> StackdeckError {
    match code {
        ErrorCode::SpawnFailed => StackdeckError::SpawnFailed(message),
        ErrorCode::SessionNotFound => StackdeckError::SessionNotFound(message),
        _ => StackdeckError::host(code.to_string(), message),
    }
}

/// Background task that handles the actual socket I/O
async fn connection_task(
    mut framed: Transport,
    mut outgoing: mpsc::Receiver<ClientMessage>,
    shared: Arc<Shared>,
) {
    loop {
        tokio::select! {
            msg = outgoing.recv() => {
                let Some(msg) = msg else {
                    debug!("Pty host client dropped");
                    break;
                };
                if let Err(e) = framed.send(msg).await {
                    error!(error = %e, "Failed to send message to pty host");
                    break;
                }
            }

            result = framed.next() => match result {
                Some(Ok(msg)) => dispatch(&shared, msg),
                Some(Err(e)) => {
                    error!(error = %e, "Failed to receive message from pty host");
                    break;
                }
                None => {
                    info!("Pty host closed connection");
                    break;
                }
            }
        }
    }

    // Dropping the senders fails waiting requests and ends output streams
    shared.pending.lock().clear();
    shared.outputs.lock().clear();
}

fn dispatch(shared: &Shared, msg: ServerMessage) {
    match msg {
        ServerMessage::Ack { request_id } => {
            if let Some(tx) = shared.pending.lock().remove(&request_id) {
                let _ = tx.send(Ok(()));
            }
        }
        ServerMessage::Error {
            request_id: Some(request_id),
            code,
            message,
        } => {
            if let Some(tx) = shared.pending.lock().remove(&request_id) {
                let _ = tx.send(Err(host_error(code, message)));
            }
        }
        ServerMessage::Error {
            request_id: None,
            code,
            message,
        } => {
            warn!(%code, message = %message, "Pty host error");
        }
        ServerMessage::Output { session_id, data } => {
            let sender = shared.outputs.lock().get(&session_id).cloned();
            match sender {
                Some(tx) => {
                    trace!(session_id = %session_id, bytes = data.len(), "Routing output");
                    if tx.send(OutputChunk::new(session_id, data)).is_err() {
                        trace!(session_id = %session_id, "Output stream dropped by subscriber");
                    }
                }
                None => trace!(session_id = %session_id, "Output for unknown session"),
            }
        }
        ServerMessage::PtyExited {
            session_id,
            exit_code,
        } => {
            debug!(session_id = %session_id, ?exit_code, "Pty exited");
            shared.outputs.lock().remove(&session_id);
        }
        ServerMessage::ServiceStatus { services } => {
            trace!(count = services.len(), "Service status update");
            shared.services.send_replace(services);
        }
        ServerMessage::Connected { .. } | ServerMessage::Pong => {}
    }
}
