//! Storage error types.

use thiserror::Error;

/// Errors from a history store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Backend I/O failure (open, transaction, table access).
    ///
    /// May be transient. The hub logs it and carries on.
    #[error("storage I/O error: {0}")]
    Io(String),

    /// Record could not be encoded or decoded.
    #[error("storage serialization error: {0}")]
    Serialization(String),

    /// Store was closed by shutdown.
    #[error("storage closed")]
    Closed,
}
