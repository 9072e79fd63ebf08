//! Connection registry for identity and room membership tracking.
//!
//! The registry is the single owner of per-connection state: the assigned
//! identity, the current room (if any), when the connection was accepted, and
//! the transport handle. The handle is just one field; the registry never
//! touches it beyond storing and returning it.
//!
//! Rooms are not stored separately. A room exists while two connections carry
//! the same [`RoomId`], so the partner lookup is a scan. Entries are kept in a
//! `BTreeMap` so rosters and fan-out order are deterministic.

use std::collections::BTreeMap;

use switchboard_proto::{Identity, RoomId};

/// One registered connection.
#[derive(Debug, Clone)]
pub struct Connection<H, I> {
    /// Hub-assigned identity
    pub identity: Identity,
    /// Current two-party room, if any
    pub room_id: Option<RoomId>,
    /// When the connection was accepted
    pub connected_at: I,
    /// Transport handle used by the runtime to deliver frames
    pub handle: H,
}

/// Registry mapping identities to live connections.
#[derive(Debug)]
pub struct ConnectionRegistry<H, I> {
    connections: BTreeMap<Identity, Connection<H, I>>,
}

impl<H, I> Default for ConnectionRegistry<H, I> {
    fn default() -> Self {
        Self { connections: BTreeMap::new() }
    }
}

impl<H, I> ConnectionRegistry<H, I> {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection.
    ///
    /// Returns `false` (and drops nothing) if the identity is already taken.
    pub fn register(&mut self, identity: Identity, handle: H, connected_at: I) -> bool {
        if self.connections.contains_key(&identity) {
            return false;
        }

        self.connections.insert(
            identity.clone(),
            Connection { identity, room_id: None, connected_at, handle },
        );
        true
    }

    /// Remove a connection. `None` if it was never registered or already gone.
    pub fn unregister(&mut self, identity: &Identity) -> Option<Connection<H, I>> {
        self.connections.remove(identity)
    }

    /// Remove every connection, in identity order.
    pub fn drain(&mut self) -> Vec<Connection<H, I>> {
        std::mem::take(&mut self.connections).into_values().collect()
    }

    /// Check if an identity is registered.
    pub fn contains(&self, identity: &Identity) -> bool {
        self.connections.contains_key(identity)
    }

    /// Connection state. `None` if not registered.
    pub fn get(&self, identity: &Identity) -> Option<&Connection<H, I>> {
        self.connections.get(identity)
    }

    /// Transport handle of a registered connection.
    pub fn handle(&self, identity: &Identity) -> Option<&H> {
        self.connections.get(identity).map(|c| &c.handle)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Every registered identity, sorted.
    pub fn roster(&self) -> Vec<Identity> {
        self.connections.keys().cloned().collect()
    }

    /// Every registered identity except `excluded`.
    pub fn others<'a>(&'a self, excluded: &'a Identity) -> impl Iterator<Item = &'a Identity> + 'a {
        self.connections.keys().filter(move |id| *id != excluded)
    }

    /// Current room of a connection.
    pub fn room_of(&self, identity: &Identity) -> Option<&RoomId> {
        self.connections.get(identity).and_then(|c| c.room_id.as_ref())
    }

    /// Set the room of a connection, replacing any previous one.
    ///
    /// Returns `false` if the identity is not registered.
    pub fn set_room(&mut self, identity: &Identity, room_id: RoomId) -> bool {
        match self.connections.get_mut(identity) {
            Some(conn) => {
                conn.room_id = Some(room_id);
                true
            },
            None => false,
        }
    }

    /// Clear the room of a connection. No-op if unregistered or not in a room.
    pub fn clear_room(&mut self, identity: &Identity) {
        if let Some(conn) = self.connections.get_mut(identity) {
            conn.room_id = None;
        }
    }

    /// The other connection currently carrying `room_id`.
    pub fn partner_in(&self, room_id: &RoomId, excluded: &Identity) -> Option<&Identity> {
        self.connections
            .values()
            .find(|c| &c.identity != excluded && c.room_id.as_ref() == Some(room_id))
            .map(|c| &c.identity)
    }
}
