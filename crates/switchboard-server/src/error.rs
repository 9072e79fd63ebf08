//! Server error types.
//!
//! [`HubError`] comes from the driver and is always contained to a single
//! connection. [`ServerError`] is what the runtime surfaces; only the startup
//! variants (`Config`, bind-time `Transport`) are fatal.

use switchboard_proto::Identity;
use thiserror::Error;

/// Errors from [`HubDriver`](crate::HubDriver) processing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HubError {
    /// Event referenced an identity the registry does not hold.
    ///
    /// Happens when a frame races with its own connection's disconnect. The
    /// runtime logs and drops the frame.
    #[error("unknown connection: {0}")]
    UnknownConnection(Identity),

    /// Registry is full; the new connection is refused.
    #[error("connection limit reached ({limit})")]
    CapacityExceeded {
        /// Configured maximum
        limit: usize,
    },

    /// Hub is shutting down and no longer accepts connections.
    #[error("hub is shutting down")]
    ShuttingDown,
}

/// Errors that can occur in the server runtime.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration error (invalid bind address, etc.).
    ///
    /// Fatal: prevents startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport/network error (bind failure, accept failure, handshake).
    ///
    /// Fatal at bind time, per-connection afterwards.
    #[error("transport error: {0}")]
    Transport(String),

    /// Driver error.
    #[error("driver error: {0}")]
    Driver(#[from] HubError),
}
