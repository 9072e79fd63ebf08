//! Protocol error types.

use thiserror::Error;

/// Errors raised while decoding an inbound envelope.
///
/// The `Display` output is sent verbatim as the `message` of the `error`
/// envelope, so it names the offending input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame is not well-formed JSON (or not a JSON object).
    #[error("Invalid message format: {0}")]
    Malformed(String),

    /// Frame is a JSON object without a string `type` field.
    #[error("Invalid message format: missing \"type\" field")]
    MissingType,

    /// `type` names no known handler.
    #[error("Unknown message type: {0}")]
    UnknownType(String),

    /// Known `type` whose remaining fields have the wrong shape.
    #[error("Invalid {kind} message: {reason}")]
    InvalidFields {
        /// Envelope type that failed
        kind: String,
        /// Deserializer diagnostic
        reason: String,
    },
}
