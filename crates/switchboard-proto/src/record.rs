//! Persisted message records.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Identity;

/// One routed or broadcast message as written to the history store.
///
/// Created once at dispatch time and never mutated. Room messages and typing
/// signals are never recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    /// Connection that sent the message
    pub sender_id: Identity,
    /// Direct recipient. `None` for broadcasts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<Identity>,
    /// Opaque application payload
    pub payload: Value,
    /// Whether the message went to every connection
    pub is_broadcast: bool,
    /// Dispatch time in Unix milliseconds (UTC)
    pub timestamp: u64,
}

impl MessageRecord {
    /// Record for a direct message.
    pub fn direct(sender: Identity, recipient: Identity, payload: Value, timestamp: u64) -> Self {
        Self {
            sender_id: sender,
            recipient_id: Some(recipient),
            payload,
            is_broadcast: false,
            timestamp,
        }
    }

    /// Record for a broadcast.
    pub fn broadcast(sender: Identity, payload: Value, timestamp: u64) -> Self {
        Self { sender_id: sender, recipient_id: None, payload, is_broadcast: true, timestamp }
    }

    /// Whether `participant` may see this record in its history.
    ///
    /// True for broadcasts and for direct messages it sent or received.
    pub fn is_visible_to(&self, participant: &Identity) -> bool {
        self.is_broadcast
            || &self.sender_id == participant
            || self.recipient_id.as_ref() == Some(participant)
    }
}
