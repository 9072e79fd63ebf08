//! Switchboard production server.
//!
//! Real-time message routing hub: clients connect over WebSocket, receive a
//! hub-assigned identity, and exchange JSON envelopes by direct routing,
//! broadcast, or two-party rooms. Routed and broadcast messages are kept as
//! history in a durable store, or in a bounded in-memory ring when no durable
//! store is available.
//!
//! # Architecture
//!
//! The [`HubDriver`] follows the Sans-IO pattern: it owns the connection
//! registry and room state, consumes [`HubEvent`]s and returns
//! [`HubAction`]s. [`Server`] is the production glue that executes those
//! actions with Tokio, tokio-tungstenite and a [`Storage`] backend.
//!
//! # Components
//!
//! - [`HubDriver`]: Action-based router and room state machine (no I/O)
//! - [`Server`]: Production runtime that executes driver actions
//! - [`WsTransport`]: TCP listener plus WebSocket handshake
//! - [`storage`]: history store capability and its backends
//! - [`SystemEnv`]: Production environment (real time, crypto RNG)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod driver;
pub mod env;
mod error;
mod registry;
pub mod storage;
mod system_env;
mod transport;

use std::{net::SocketAddr, sync::Arc, time::Duration};

pub use driver::{
    DriverConfig, HubAction, HubDriver, HubEvent, LogLevel, SHUTDOWN_NOTICE,
};
pub use error::{HubError, ServerError};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
pub use registry::{Connection, ConnectionRegistry};
pub use storage::{
    ChaoticStorage, HubStorage, MemoryStorage, RedbStorage, Storage, StorageConfig, StorageError,
    StorageKind,
};
use switchboard_proto::{Identity, ServerMessage};
pub use system_env::SystemEnv;
use tokio::{
    net::TcpStream,
    sync::{Mutex, mpsc, watch},
    task::JoinSet,
};
use tokio_tungstenite::tungstenite::Message;
pub use transport::{WsStream, WsTransport, handshake};

/// How long shutdown waits for connections to finish closing.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Driver as run in production.
type Driver<S> = HubDriver<SystemEnv, S, SessionHandle>;

/// Driver shared by every connection task. One lock serializes all events.
type SharedDriver<S> = Arc<Mutex<Driver<S>>>;

/// Command for a connection's writer task.
#[derive(Debug)]
enum Outbound {
    Text(String),
    Close,
}

/// Transport handle stored in the registry for each connection.
///
/// Feeds the connection's single writer task, so everything sent to one
/// connection goes out in the order it was queued. Sending never blocks; if
/// the writer is gone the frame is dropped.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl SessionHandle {
    fn channel() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a text frame. Returns `false` if the connection is gone.
    pub fn send_text(&self, text: String) -> bool {
        self.tx.send(Outbound::Text(text)).is_ok()
    }

    /// Ask the writer to close the connection after flushing queued frames.
    pub fn close(&self) -> bool {
        self.tx.send(Outbound::Close).is_ok()
    }
}

/// Triggers graceful shutdown of a running [`Server`].
///
/// Cloneable; calling [`ShutdownHandle::shutdown`] more than once (for
/// example from a signal handler and from application code) is harmless.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Request shutdown.
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    /// Whether shutdown was requested.
    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:8080")
    pub bind_address: String,
    /// History store selection
    pub storage: StorageConfig,
    /// Driver configuration (limits)
    pub driver: DriverConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            storage: StorageConfig::default(),
            driver: DriverConfig::default(),
        }
    }
}

/// Production switchboard server.
///
/// Wraps [`HubDriver`] with the WebSocket transport and system environment.
pub struct Server<S: Storage = HubStorage> {
    driver: Driver<S>,
    transport: WsTransport,
    shutdown: ShutdownHandle,
}

impl Server<HubStorage> {
    /// Open the configured history store and bind the listener.
    ///
    /// An unusable durable store is not an error: the hub falls back to the
    /// in-memory store. The memory history limit is clamped to the ring
    /// capacity.
    pub async fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        let storage = HubStorage::connect(&config.storage);

        let mut driver_config = config.driver;
        driver_config.memory_history_limit =
            driver_config.memory_history_limit.min(config.storage.memory_capacity.max(1));

        Self::with_storage(&config.bind_address, storage, driver_config).await
    }
}

impl<S: Storage> Server<S> {
    /// Bind a server around an already constructed store.
    pub async fn with_storage(
        bind_address: &str,
        storage: S,
        config: DriverConfig,
    ) -> Result<Self, ServerError> {
        let driver = HubDriver::new(SystemEnv::new(), storage, config);
        let transport = WsTransport::bind(bind_address).await?;
        let (tx, _) = watch::channel(false);

        Ok(Self { driver, transport, shutdown: ShutdownHandle { tx: Arc::new(tx) } })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.transport.local_addr()
    }

    /// Handle that stops [`Server::run`].
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Run the server, accepting connections and processing frames.
    ///
    /// Returns once shutdown was requested and every connection has been told
    /// and closed. The listener is released as soon as shutdown is observed,
    /// so later connection attempts are refused rather than left pending.
    pub async fn run(self) -> Result<(), ServerError> {
        let Self { driver, transport, shutdown } = self;
        tracing::info!("Server starting on {}", transport.local_addr()?);

        let driver: SharedDriver<S> = Arc::new(Mutex::new(driver));
        let mut stop = shutdown.tx.subscribe();
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                () = stopped(&mut stop) => break,
                Some(_) = connections.join_next(), if !connections.is_empty() => {},
                accepted = transport.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!(%peer, "accepted TCP connection");
                        let driver = Arc::clone(&driver);

                        connections.spawn(async move {
                            if let Err(e) = handle_connection(stream, peer, driver).await {
                                tracing::debug!(%peer, "connection ended with error: {}", e);
                            }
                        });
                    },
                    Err(e) => {
                        tracing::error!("Accept error: {}", e);
                    },
                },
            }
        }

        drop(transport);

        {
            let mut guard = driver.lock().await;
            let actions = guard.process_event(HubEvent::Shutdown)?;
            execute_actions(&driver, &mut guard, actions);
            debug_assert_eq!(guard.connection_count(), 0);
        }

        // Let writers flush the notice and close frames
        let drain = async { while connections.join_next().await.is_some() {} };
        if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
            tracing::warn!("connections still open after {:?}, aborting", SHUTDOWN_GRACE);
            connections.abort_all();
        }

        tracing::info!("Server stopped");
        Ok(())
    }
}

/// Resolves once shutdown is requested (or every handle is gone).
async fn stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopping| *stopping).await;
}

/// Handle a single WebSocket connection from handshake to disconnect.
async fn handle_connection<S: Storage>(
    stream: TcpStream,
    peer: SocketAddr,
    driver: SharedDriver<S>,
) -> Result<(), ServerError> {
    let ws = handshake(stream).await?;
    let (mut sink, mut source) = ws.split();
    let (handle, outbound) = SessionHandle::channel();

    let accepted = {
        let mut guard = driver.lock().await;
        match guard.accept_connection(handle) {
            Ok((identity, actions)) => {
                execute_actions(&driver, &mut guard, actions);
                Ok(identity)
            },
            Err(e) => Err(e),
        }
    };

    let identity = match accepted {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!(%peer, "refusing connection: {}", e);
            // Best effort; the peer may already be gone
            let _ = sink.close().await;
            return Err(e.into());
        },
    };

    let mut writer = tokio::spawn(write_loop(sink, outbound));

    let reason = loop {
        tokio::select! {
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    dispatch_frame(&driver, &identity, text.as_str().to_owned()).await;
                },
                Some(Ok(Message::Binary(bytes))) => {
                    let text = String::from_utf8_lossy(&bytes).into_owned();
                    dispatch_frame(&driver, &identity, text).await;
                },
                Some(Ok(Message::Close(_))) | None => break "closed by peer".to_string(),
                // Ping/pong are answered by tungstenite
                Some(Ok(_)) => {},
                Some(Err(e)) => break format!("read error: {e}"),
            },
            _ = &mut writer => break "closed by hub".to_string(),
        }
    };

    let mut guard = driver.lock().await;
    let actions = guard.process_event(HubEvent::ConnectionClosed { identity, reason })?;
    execute_actions(&driver, &mut guard, actions);

    Ok(())
}

async fn dispatch_frame<S: Storage>(driver: &SharedDriver<S>, identity: &Identity, text: String) {
    let mut guard = driver.lock().await;
    match guard.process_event(HubEvent::FrameReceived { identity: identity.clone(), text }) {
        Ok(actions) => execute_actions(driver, &mut guard, actions),
        Err(e) => tracing::debug!(%identity, "frame dropped: {}", e),
    }
}

/// Drain one connection's outbound queue into its socket.
///
/// Ends on `Close`, on a write error, or when every handle is dropped (the
/// connection left the registry). Closing the sink sends the close frame.
async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(command) = outbound.recv().await {
        match command {
            Outbound::Text(text) => {
                if let Err(e) = sink.send(Message::text(text)).await {
                    tracing::debug!("write failed, writer exiting: {}", e);
                    return;
                }
            },
            Outbound::Close => break,
        }
    }

    let _ = sink.close().await;
}

/// Execute hub actions.
///
/// Called with the driver lock held. Sends only enqueue, so nothing here waits
/// on a peer. Store access runs on the blocking pool and never holds the lock.
fn execute_actions<S: Storage>(
    shared: &SharedDriver<S>,
    driver: &mut Driver<S>,
    actions: Vec<HubAction>,
) {
    for action in actions {
        match action {
            HubAction::Send { to, message } => deliver(driver, &to, &message),

            HubAction::Close { identity } => {
                if let Some(handle) = driver.take_connection(&identity) {
                    tracing::debug!(%identity, "closing connection");
                    handle.close();
                }
            },

            HubAction::Persist { record } => {
                let storage = driver.storage().clone();
                tokio::task::spawn_blocking(move || {
                    if let Err(e) = storage.insert(&record) {
                        tracing::warn!(sender = %record.sender_id, "failed to persist message: {}", e);
                    }
                });
            },

            HubAction::FetchHistory { requester, limit } => {
                let storage = driver.storage().clone();
                let shared = Arc::clone(shared);

                tokio::spawn(async move {
                    let participant = requester.clone();
                    let result =
                        tokio::task::spawn_blocking(move || storage.query(&participant, limit))
                            .await;

                    let reply = match result {
                        Ok(Ok(history)) => ServerMessage::MessageHistory { history },
                        Ok(Err(e)) => {
                            tracing::warn!(%requester, "history query failed: {}", e);
                            ServerMessage::error(format!("Failed to load history: {e}"))
                        },
                        Err(e) => {
                            tracing::error!(%requester, "history task failed: {}", e);
                            ServerMessage::error("Failed to load history")
                        },
                    };

                    // Requester may have left while the query ran
                    let driver = shared.lock().await;
                    deliver(&driver, &requester, &reply);
                });
            },

            HubAction::ReleaseStorage => {
                if let Err(e) = driver.storage().close() {
                    tracing::warn!("failed to close history store: {}", e);
                }
            },

            HubAction::Log { level, message } => match level {
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
            },
        }
    }
}

/// Encode and enqueue one envelope. Missing or broken recipients are not errors.
fn deliver<S: Storage>(driver: &Driver<S>, to: &Identity, message: &ServerMessage) {
    let Some(handle) = driver.handle(to) else {
        tracing::debug!(%to, "recipient gone, dropping envelope");
        return;
    };

    match message.encode() {
        Ok(text) => {
            if !handle.send_text(text) {
                tracing::debug!(%to, "writer closed, dropping envelope");
            }
        },
        Err(e) => tracing::error!(%to, "failed to encode envelope: {}", e),
    }
}
