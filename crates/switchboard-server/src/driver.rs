//! Hub driver.
//!
//! Ties together the connection registry, envelope decoding, room state and
//! the history store. The driver is Sans-IO: it consumes [`HubEvent`]s and
//! returns [`HubAction`]s for the runtime to execute. It never sends a frame,
//! touches the store, or reads a clock other than through its
//! [`Environment`].
//!
//! Every registry mutation for an event happens before the actions are
//! returned, so persistence and history queries (which the runtime runs off
//! the event path) can never observe or block a half-applied update.

use serde_json::Value;
use switchboard_proto::{
    ClientMessage, Identity, MessageRecord, ProtocolError, RoomId, ServerMessage,
};

use crate::{
    env::Environment,
    error::HubError,
    registry::ConnectionRegistry,
    storage::{Storage, StorageKind},
};

/// Text sent to every connection when the hub stops.
pub const SHUTDOWN_NOTICE: &str = "Server is shutting down";

/// Driver configuration
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Maximum concurrent connections
    pub max_connections: usize,
    /// History records returned when the durable store is active
    pub durable_history_limit: usize,
    /// History records returned when the in-memory store is active
    pub memory_history_limit: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self { max_connections: 10_000, durable_history_limit: 100, memory_history_limit: 50 }
    }
}

/// Events that the hub driver processes.
///
/// Produced by the runtime (production server or a test harness). New
/// connections go through [`HubDriver::accept_connection`] instead, since they
/// carry the transport handle and return the assigned identity.
#[derive(Debug, Clone)]
pub enum HubEvent {
    /// A text frame arrived from a registered connection
    FrameReceived {
        /// Connection that sent the frame
        identity: Identity,
        /// Raw frame text
        text: String,
    },

    /// A connection was closed (by peer or error)
    ConnectionClosed {
        /// Connection that was closed
        identity: Identity,
        /// Reason for closure
        reason: String,
    },

    /// Stop the hub. Safe to deliver more than once.
    Shutdown,
}

/// Actions that the hub driver produces.
///
/// Executed in order by the runtime. Sends addressed to the same identity
/// must reach the transport in the order they appear here.
#[derive(Debug, Clone, PartialEq)]
pub enum HubAction {
    /// Deliver an envelope to one connection
    Send {
        /// Target identity
        to: Identity,
        /// Envelope to deliver
        message: ServerMessage,
    },

    /// Close a connection's transport and release its registry entry
    Close {
        /// Connection to close
        identity: Identity,
    },

    /// Write a record to the history store (fire-and-forget)
    Persist {
        /// Record to write
        record: MessageRecord,
    },

    /// Query history and reply to the requester with `message-history`
    FetchHistory {
        /// Connection that asked
        requester: Identity,
        /// Maximum number of records
        limit: usize,
    },

    /// Close the history store
    ReleaseStorage,

    /// Log a message (for debugging/monitoring)
    Log {
        /// Log level
        level: LogLevel,
        /// Message to log
        message: String,
    },
}

/// Log levels for hub actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational message
    Info,
}

/// Action-based hub driver.
///
/// Owns the registry exclusively. The runtime serializes all calls (one
/// mutex), so handlers run to completion without interleaving.
pub struct HubDriver<E, S, H>
where
    E: Environment,
    S: Storage,
{
    registry: ConnectionRegistry<H, E::Instant>,
    storage: S,
    env: E,
    config: DriverConfig,
    shutting_down: bool,
}

impl<E, S, H> HubDriver<E, S, H>
where
    E: Environment,
    S: Storage,
{
    /// Create a new hub driver.
    pub fn new(env: E, storage: S, config: DriverConfig) -> Self {
        Self { registry: ConnectionRegistry::new(), storage, env, config, shutting_down: false }
    }

    /// Register a new connection and assign it an identity.
    ///
    /// The new connection is told its identity first, then every connection
    /// (including the new one) receives the updated roster.
    ///
    /// # Errors
    ///
    /// - `HubError::ShuttingDown` after [`HubEvent::Shutdown`]
    /// - `HubError::CapacityExceeded` when `max_connections` are registered
    ///
    /// The handle is dropped on error; the runtime closes the transport.
    pub fn accept_connection(&mut self, handle: H) -> Result<(Identity, Vec<HubAction>), HubError> {
        if self.shutting_down {
            return Err(HubError::ShuttingDown);
        }
        if self.registry.len() >= self.config.max_connections {
            return Err(HubError::CapacityExceeded { limit: self.config.max_connections });
        }

        let identity = self.fresh_identity();
        let registered = self.registry.register(identity.clone(), handle, self.env.now());
        debug_assert!(registered, "fresh identity must not be registered");

        let mut actions = vec![
            log(LogLevel::Info, format!("connection {identity} registered")),
            send(&identity, ServerMessage::RegisterSuccess { id: identity.clone() }),
        ];
        actions.extend(self.roster_fanout());

        Ok((identity, actions))
    }

    /// Process a hub event and return actions to execute.
    ///
    /// # Errors
    ///
    /// - `HubError::UnknownConnection` for a frame from an unregistered identity
    /// - `HubError::ShuttingDown` for a frame that arrives after shutdown
    ///
    /// Bad client input is not an error here: it becomes an `error` envelope
    /// addressed to the sender.
    pub fn process_event(&mut self, event: HubEvent) -> Result<Vec<HubAction>, HubError> {
        match event {
            HubEvent::FrameReceived { identity, text } => self.handle_frame(identity, &text),
            HubEvent::ConnectionClosed { identity, reason } => {
                Ok(self.handle_connection_closed(&identity, &reason))
            },
            HubEvent::Shutdown => Ok(self.handle_shutdown()),
        }
    }

    /// Remove a connection and hand back its transport handle.
    ///
    /// Called by the runtime when executing [`HubAction::Close`].
    pub fn take_connection(&mut self, identity: &Identity) -> Option<H> {
        self.registry.unregister(identity).map(|conn| conn.handle)
    }

    /// Transport handle of a registered connection.
    pub fn handle(&self, identity: &Identity) -> Option<&H> {
        self.registry.handle(identity)
    }

    /// Read-only view of the registry.
    pub fn registry(&self) -> &ConnectionRegistry<H, E::Instant> {
        &self.registry
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Whether shutdown has been processed.
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    /// History store.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Number of history records a `get-history` request returns.
    pub fn history_limit(&self) -> usize {
        match self.storage.kind() {
            StorageKind::Durable => self.config.durable_history_limit,
            StorageKind::Memory => self.config.memory_history_limit,
        }
    }

    fn fresh_identity(&self) -> Identity {
        loop {
            let identity = Identity::from_random(self.env.random_u128());
            if !self.registry.contains(&identity) {
                return identity;
            }
        }
    }

    fn roster_fanout(&self) -> Vec<HubAction> {
        let users = self.registry.roster();
        users
            .iter()
            .map(|to| send(to, ServerMessage::UserList { users: users.clone() }))
            .collect()
    }

    fn to_others(&self, sender: &Identity, message: &ServerMessage) -> Vec<HubAction> {
        self.registry.others(sender).map(|to| send(to, message.clone())).collect()
    }

    fn handle_frame(&mut self, sender: Identity, text: &str) -> Result<Vec<HubAction>, HubError> {
        if self.shutting_down {
            return Err(HubError::ShuttingDown);
        }
        if !self.registry.contains(&sender) {
            return Err(HubError::UnknownConnection(sender));
        }

        let message = match ClientMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                return Ok(vec![
                    log(LogLevel::Debug, format!("rejected frame from {sender}: {e}")),
                    send(&sender, ServerMessage::error(e.to_string())),
                ]);
            },
        };

        let actions = match message {
            ClientMessage::Route { to, payload } => self.handle_route(&sender, to, payload),
            ClientMessage::Broadcast { payload } => self.handle_broadcast(&sender, payload),
            ClientMessage::GetHistory {} => vec![HubAction::FetchHistory {
                requester: sender,
                limit: self.history_limit(),
            }],
            ClientMessage::StartTyping {} => {
                self.to_others(&sender, &ServerMessage::UserTyping { id: sender.clone() })
            },
            ClientMessage::StopTyping {} => {
                self.to_others(&sender, &ServerMessage::UserStoppedTyping { id: sender.clone() })
            },
            ClientMessage::JoinRoom { with } => self.handle_join_room(&sender, with),
            ClientMessage::RoomMessage { payload } => self.handle_room_message(&sender, payload),
        };

        Ok(actions)
    }

    fn handle_route(
        &mut self,
        sender: &Identity,
        to: Option<Identity>,
        payload: Value,
    ) -> Vec<HubAction> {
        let Some(to) = to else {
            return vec![send(sender, missing_field("route", "to"))];
        };

        if !self.registry.contains(&to) {
            return vec![send(sender, ServerMessage::error(format!("Recipient not found: {to}")))];
        }

        let record = MessageRecord::direct(
            sender.clone(),
            to.clone(),
            payload.clone(),
            self.env.wall_clock_millis(),
        );

        vec![
            HubAction::Persist { record },
            send(&to, ServerMessage::Message { from: sender.clone(), payload, is_broadcast: None }),
        ]
    }

    fn handle_broadcast(&mut self, sender: &Identity, payload: Value) -> Vec<HubAction> {
        let record =
            MessageRecord::broadcast(sender.clone(), payload.clone(), self.env.wall_clock_millis());

        let message =
            ServerMessage::Message { from: sender.clone(), payload, is_broadcast: Some(true) };

        let mut actions = vec![HubAction::Persist { record }];
        actions.extend(self.to_others(sender, &message));
        actions
    }

    /// Open a room between `sender` and `with`.
    ///
    /// A previous room of either side is overwritten; the displaced partner is
    /// not notified.
    fn handle_join_room(&mut self, sender: &Identity, with: Option<Identity>) -> Vec<HubAction> {
        let Some(partner) = with else {
            return vec![send(sender, missing_field("join-room", "with"))];
        };

        if &partner == sender {
            return vec![send(sender, ServerMessage::error("Cannot join a room with yourself"))];
        }
        if !self.registry.contains(&partner) {
            return vec![send(sender, ServerMessage::error(format!("User not found: {partner}")))];
        }

        let room_id = RoomId::between(sender, &partner);
        self.registry.set_room(sender, room_id.clone());
        self.registry.set_room(&partner, room_id.clone());

        vec![
            log(LogLevel::Debug, format!("{sender} and {partner} joined room {room_id}")),
            send(sender, ServerMessage::JoinedRoom {
                room_id: room_id.clone(),
                with: partner.clone(),
            }),
            send(&partner, ServerMessage::JoinedRoom { room_id, with: sender.clone() }),
        ]
    }

    fn handle_room_message(&mut self, sender: &Identity, payload: Value) -> Vec<HubAction> {
        let Some(room_id) = self.registry.room_of(sender) else {
            return vec![send(sender, ServerMessage::error("Not in a room"))];
        };

        // Partner may have moved to another room; nothing to deliver then
        match self.registry.partner_in(room_id, sender) {
            Some(partner) => vec![send(partner, ServerMessage::Message {
                from: sender.clone(),
                payload,
                is_broadcast: Some(false),
            })],
            None => Vec::new(),
        }
    }

    fn handle_connection_closed(&mut self, identity: &Identity, reason: &str) -> Vec<HubAction> {
        let Some(conn) = self.registry.unregister(identity) else {
            return Vec::new();
        };

        let session = self.env.now() - conn.connected_at;
        let mut actions = vec![log(
            LogLevel::Info,
            format!("connection {identity} closed after {session:?}: {reason}"),
        )];
        if self.shutting_down {
            return actions;
        }

        actions.extend(self.roster_fanout());

        if let Some(room_id) = conn.room_id {
            if let Some(partner) = self.registry.partner_in(&room_id, identity).cloned() {
                self.registry.clear_room(&partner);
                actions.push(send(&partner, ServerMessage::PartnerLeftRoom { room_id }));
            }
        }

        actions.extend(self.to_others(identity, &ServerMessage::UserStoppedTyping {
            id: identity.clone(),
        }));

        actions
    }

    fn handle_shutdown(&mut self) -> Vec<HubAction> {
        if self.shutting_down {
            return Vec::new();
        }
        self.shutting_down = true;

        let roster = self.registry.roster();
        let mut actions = vec![log(
            LogLevel::Info,
            format!("shutting down, closing {} connection(s)", roster.len()),
        )];

        for identity in roster {
            actions.push(send(&identity, ServerMessage::info(SHUTDOWN_NOTICE)));
            actions.push(HubAction::Close { identity });
        }
        actions.push(HubAction::ReleaseStorage);

        actions
    }
}

fn send(to: &Identity, message: ServerMessage) -> HubAction {
    HubAction::Send { to: to.clone(), message }
}

fn log(level: LogLevel, message: String) -> HubAction {
    HubAction::Log { level, message }
}

fn missing_field(kind: &str, field: &str) -> ServerMessage {
    let err = ProtocolError::InvalidFields {
        kind: kind.to_string(),
        reason: format!("missing \"{field}\" field"),
    };
    ServerMessage::error(err.to_string())
}
