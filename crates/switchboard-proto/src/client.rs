//! Inbound (client → hub) envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Identity, ProtocolError};

/// Message sent by a client.
///
/// The `type` field selects the variant. Unknown extra fields are ignored and
/// `payload` may be any JSON value (missing means `null`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Deliver `payload` to a single connection.
    Route {
        /// Target identity
        #[serde(default)]
        to: Option<Identity>,
        /// Opaque application payload
        #[serde(default)]
        payload: Value,
    },

    /// Deliver `payload` to every other connection.
    Broadcast {
        /// Opaque application payload
        #[serde(default)]
        payload: Value,
    },

    /// Ask for the sender's message history.
    GetHistory {},

    /// Sender started typing.
    StartTyping {},

    /// Sender stopped typing.
    StopTyping {},

    /// Open a two-party room with another connection.
    JoinRoom {
        /// Partner identity
        #[serde(default)]
        with: Option<Identity>,
    },

    /// Deliver `payload` to the sender's current room partner.
    RoomMessage {
        /// Opaque application payload
        #[serde(default)]
        payload: Value,
    },
}

impl ClientMessage {
    /// Every `type` value the hub understands.
    pub const KNOWN_TYPES: [&'static str; 7] = [
        "route",
        "broadcast",
        "get-history",
        "start-typing",
        "stop-typing",
        "join-room",
        "room-message",
    ];

    /// Decode one text frame.
    ///
    /// Distinguishes malformed JSON, a missing `type`, an unknown `type`, and a
    /// known `type` whose fields are the wrong shape, so the error reply can
    /// name the actual problem.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        let kind = match &value {
            Value::Object(map) => match map.get("type") {
                Some(Value::String(kind)) => kind.clone(),
                _ => return Err(ProtocolError::MissingType),
            },
            _ => return Err(ProtocolError::Malformed("expected a JSON object".to_string())),
        };

        if !Self::KNOWN_TYPES.contains(&kind.as_str()) {
            return Err(ProtocolError::UnknownType(kind));
        }

        serde_json::from_value(value)
            .map_err(|e| ProtocolError::InvalidFields { kind, reason: e.to_string() })
    }

    /// Wire name of this message's `type`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Route { .. } => "route",
            Self::Broadcast { .. } => "broadcast",
            Self::GetHistory {} => "get-history",
            Self::StartTyping {} => "start-typing",
            Self::StopTyping {} => "stop-typing",
            Self::JoinRoom { .. } => "join-room",
            Self::RoomMessage { .. } => "room-message",
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_route() {
        let msg = ClientMessage::decode(r#"{"type":"route","to":"b1","payload":"hi"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Route { to: Some(Identity::from("b1")), payload: json!("hi") });
    }

    #[test]
    fn ignores_extra_fields() {
        let msg = ClientMessage::decode(r#"{"type":"get-history","page":3,"x":null}"#).unwrap();
        assert_eq!(msg, ClientMessage::GetHistory {});
    }

    #[test]
    fn missing_payload_is_null() {
        let msg = ClientMessage::decode(r#"{"type":"broadcast"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Broadcast { payload: Value::Null });
    }

    #[test]
    fn join_room_without_partner_decodes_to_none() {
        let msg = ClientMessage::decode(r#"{"type":"join-room"}"#).unwrap();
        assert_eq!(msg, ClientMessage::JoinRoom { with: None });
    }

    #[test]
    fn rejects_non_json() {
        let err = ClientMessage::decode("hello there").unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
        assert!(err.to_string().starts_with("Invalid message format"));
    }

    #[test]
    fn rejects_non_object() {
        let err = ClientMessage::decode("[1,2,3]").unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn rejects_missing_type() {
        assert_eq!(ClientMessage::decode(r#"{"to":"b1"}"#), Err(ProtocolError::MissingType));
        assert_eq!(ClientMessage::decode(r#"{"type":7}"#), Err(ProtocolError::MissingType));
    }

    #[test]
    fn rejects_unknown_type() {
        assert_eq!(
            ClientMessage::decode(r#"{"type":"teleport"}"#),
            Err(ProtocolError::UnknownType("teleport".to_string()))
        );
    }

    #[test]
    fn rejects_wrong_field_shape() {
        let err = ClientMessage::decode(r#"{"type":"route","to":5}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidFields { ref kind, .. } if kind == "route"));
    }

    #[test]
    fn kind_matches_wire_name() {
        for kind in ClientMessage::KNOWN_TYPES {
            let msg = ClientMessage::decode(&format!(r#"{{"type":"{kind}"}}"#)).unwrap();
            assert_eq!(msg.kind(), kind);
        }
    }
}
