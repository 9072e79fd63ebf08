//! Outbound (hub → client) envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Identity, MessageRecord, RoomId};

/// Message sent by the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Identity assigned to a freshly accepted connection.
    RegisterSuccess {
        /// Assigned identity
        id: Identity,
    },

    /// Full roster of registered identities.
    UserList {
        /// Every currently registered identity
        users: Vec<Identity>,
    },

    /// Routed, broadcast, or room message.
    Message {
        /// Sender identity
        from: Identity,
        /// Opaque application payload
        payload: Value,
        /// Present for broadcasts (`true`) and room messages (`false`)
        #[serde(rename = "isBroadcast", default, skip_serializing_if = "Option::is_none")]
        is_broadcast: Option<bool>,
    },

    /// Reply to `get-history`.
    MessageHistory {
        /// Records in ascending timestamp order
        history: Vec<MessageRecord>,
    },

    /// Another connection started typing.
    UserTyping {
        /// Typing identity
        id: Identity,
    },

    /// Another connection stopped typing (or left).
    UserStoppedTyping {
        /// Identity that stopped
        id: Identity,
    },

    /// A two-party room was opened.
    JoinedRoom {
        /// Canonical room token
        #[serde(rename = "roomId")]
        room_id: RoomId,
        /// The other participant
        with: Identity,
    },

    /// The room partner disconnected.
    PartnerLeftRoom {
        /// Room that dissolved
        #[serde(rename = "roomId")]
        room_id: RoomId,
    },

    /// Informational notice (e.g. shutdown).
    Info {
        /// Human-readable text
        message: String,
    },

    /// Request failed. Only the requester receives it.
    Error {
        /// Human-readable reason
        message: String,
    },
}

impl ServerMessage {
    /// Error envelope with the given text.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { message: message.into() }
    }

    /// Info envelope with the given text.
    pub fn info(message: impl Into<String>) -> Self {
        Self::Info { message: message.into() }
    }

    /// Serialize to a JSON text frame.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
