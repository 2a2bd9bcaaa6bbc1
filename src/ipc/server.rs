//! Unix domain socket server for IPC
//!
//! Provides request-response status queries and pushes session events to
//! subscribed clients.

use std::future::pending;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, error, info, warn};

use crate::events::SessionEvent;

use super::protocol::{Notification, Request, Response, SessionStatus, MAX_MESSAGE_LEN};

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    state: Arc<RwLock<ServerState>>,
    shutdown_tx: broadcast::Sender<()>,
    /// Source of session events for subscribed clients
    event_tx: broadcast::Sender<SessionEvent>,
}

/// Shared server state
struct ServerState {
    status: SessionStatus,
    start_time: std::time::Instant,
}

/// One decoded frame from a client
type Incoming = std::result::Result<Request, String>;

impl Server {
    /// Create a new IPC server
    pub fn new(socket_path: &Path, event_tx: broadcast::Sender<SessionEvent>) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        let state = Arc::new(RwLock::new(ServerState {
            status: SessionStatus::default(),
            start_time: std::time::Instant::now(),
        }));

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            state,
            shutdown_tx,
            event_tx,
        })
    }

    /// Fold a session event into the status snapshot
    pub async fn apply(&self, event: &SessionEvent) {
        let mut state = self.state.write().await;
        let old_phase = state.status.phase;
        state.status.apply(event);

        if old_phase != state.status.phase {
            debug!(
                from = %old_phase,
                to = %state.status.phase,
                "IPC server: phase updated"
            );
        }
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let state = Arc::clone(&self.state);
                    let event_tx = self.event_tx.clone();
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, state, event_tx) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client(
        stream: UnixStream,
        state: Arc<RwLock<ServerState>>,
        event_tx: broadcast::Sender<SessionEvent>,
    ) -> Result<()> {
        let (reader, mut writer) = stream.into_split();

        // Reads are not cancel safe, so they get their own task
        let (incoming_tx, mut incoming_rx) = mpsc::channel::<Incoming>(8);
        let reader_task = tokio::spawn(Self::read_requests(reader, incoming_tx));

        let mut events: Option<broadcast::Receiver<SessionEvent>> = None;

        loop {
            tokio::select! {
                incoming = incoming_rx.recv() => {
                    let response = match incoming {
                        Some(Ok(request)) => {
                            debug!(?request, "received request");
                            let (response, subscribe) = Self::process_request(request, &state).await;
                            if subscribe && events.is_none() {
                                debug!("client subscribed to notifications");
                                events = Some(event_tx.subscribe());
                            }
                            response
                        }
                        Some(Err(message)) => Response::Error {
                            code: "bad_request".to_string(),
                            message,
                        },
                        None => break,
                    };
                    Self::send_message(&mut writer, &response).await?;
                }
                event = next_event(&mut events) => match event {
                    Ok(event) => {
                        Self::send_message(&mut writer, &Notification::SessionEvent { event }).await?;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        events = None;
                    }
                },
            }
        }

        reader_task.await.context("request reader panicked")?
    }

    /// Decode length-prefixed requests until the client disconnects
    async fn read_requests<R: AsyncRead + Unpin>(
        mut reader: R,
        incoming_tx: mpsc::Sender<Incoming>,
    ) -> Result<()> {
        let mut len_buf = [0u8; 4];

        loop {
            // Read message length (4-byte little-endian)
            match reader.read_exact(&mut len_buf).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("client disconnected");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }

            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_MESSAGE_LEN {
                warn!(len, "message too large, disconnecting");
                return Ok(());
            }

            // Read message body
            let mut msg_buf = vec![0u8; len];
            reader.read_exact(&mut msg_buf).await?;

            let incoming = serde_json::from_slice::<Request>(&msg_buf).map_err(|e| e.to_string());
            if incoming_tx.send(incoming).await.is_err() {
                return Ok(());
            }
        }
    }

    /// Send a length-prefixed JSON message
    async fn send_message<W, T>(writer: &mut W, msg: &T) -> Result<()>
    where
        W: AsyncWrite + Unpin,
        T: serde::Serialize,
    {
        let msg_bytes = serde_json::to_vec(msg)?;
        let msg_len = (msg_bytes.len() as u32).to_le_bytes();

        writer.write_all(&msg_len).await?;
        writer.write_all(&msg_bytes).await?;

        Ok(())
    }

    /// Process a request and return a response
    /// Returns (Response, should_subscribe)
    async fn process_request(
        request: Request,
        state: &Arc<RwLock<ServerState>>,
    ) -> (Response, bool) {
        match request {
            Request::Ping => (Response::Pong, false),

            Request::GetStatus => {
                let mut state = state.write().await;
                state.status.uptime_secs = state.start_time.elapsed().as_secs();
                (Response::Status(state.status.clone()), false)
            }

            Request::Subscribe => (Response::Subscribed, true),
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Next event for a subscribed client; never resolves otherwise
async fn next_event(
    events: &mut Option<broadcast::Receiver<SessionEvent>>,
) -> std::result::Result<SessionEvent, broadcast::error::RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => pending().await,
    }
}
