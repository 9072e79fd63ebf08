//! History storage for routed and broadcast messages.
//!
//! The hub consumes persistence through the narrow [`Storage`] capability:
//! insert one record, query one participant's records. The trait is
//! synchronous; the runtime calls it from blocking tasks so a slow store never
//! stalls registry updates.
//!
//! Two interchangeable backends exist: [`RedbStorage`] (durable) and
//! [`MemoryStorage`] (bounded ring with oldest-first eviction). [`HubStorage`]
//! picks one at construction time and falls back to memory when the durable
//! store cannot be opened.

mod chaotic;
mod error;
mod memory;
mod redb;

use std::path::PathBuf;

pub use chaotic::ChaoticStorage;
pub use error::StorageError;
pub use memory::MemoryStorage;
use switchboard_proto::{Identity, MessageRecord};

pub use self::redb::RedbStorage;

/// Which kind of backend is serving history.
///
/// The driver only uses this to pick the history limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// Survives restarts
    Durable,
    /// Bounded, lost on restart
    Memory,
}

/// History store capability.
///
/// Must be Clone (the runtime hands clones to blocking tasks), Send + Sync, and
/// synchronous. Implementations share internal state via Arc, so clones see
/// the same records.
pub trait Storage: Clone + Send + Sync + 'static {
    /// Backend kind.
    fn kind(&self) -> StorageKind;

    /// Append one record.
    ///
    /// Failure never affects delivery; the caller logs and drops it.
    fn insert(&self, record: &MessageRecord) -> Result<(), StorageError>;

    /// Records visible to `participant`.
    ///
    /// Visible means `recipientId == participant`, `senderId == participant`,
    /// or `isBroadcast`. Returns at most `limit` records: the most recent
    /// ones, in ascending timestamp order.
    fn query(
        &self,
        participant: &Identity,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, StorageError>;

    /// Release backend resources. Idempotent.
    ///
    /// Later calls to `insert`/`query` return [`StorageError::Closed`].
    fn close(&self) -> Result<(), StorageError>;
}

/// Store selection.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Durable store location. `None` selects the in-memory store.
    pub path: Option<PathBuf>,
    /// Ring capacity of the in-memory store
    pub memory_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { path: None, memory_capacity: MemoryStorage::DEFAULT_CAPACITY }
    }
}

/// Store chosen at startup.
#[derive(Clone)]
pub enum HubStorage {
    /// Redb-backed store
    Durable(RedbStorage),
    /// In-memory ring
    Memory(MemoryStorage),
}

impl HubStorage {
    /// Open the configured store.
    ///
    /// With a path, tries the durable store first. If that fails the hub logs
    /// a warning and continues with the in-memory store instead of refusing to
    /// start.
    pub fn connect(config: &StorageConfig) -> Self {
        let Some(path) = &config.path else {
            tracing::info!(capacity = config.memory_capacity, "using in-memory history store");
            return Self::Memory(MemoryStorage::with_capacity(config.memory_capacity));
        };

        match RedbStorage::open(path) {
            Ok(storage) => {
                tracing::info!(path = %path.display(), "using durable history store");
                Self::Durable(storage)
            },
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "durable store unavailable, falling back to in-memory history"
                );
                Self::Memory(MemoryStorage::with_capacity(config.memory_capacity))
            },
        }
    }
}

impl Storage for HubStorage {
    fn kind(&self) -> StorageKind {
        match self {
            Self::Durable(s) => s.kind(),
            Self::Memory(s) => s.kind(),
        }
    }

    fn insert(&self, record: &MessageRecord) -> Result<(), StorageError> {
        match self {
            Self::Durable(s) => s.insert(record),
            Self::Memory(s) => s.insert(record),
        }
    }

    fn query(
        &self,
        participant: &Identity,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, StorageError> {
        match self {
            Self::Durable(s) => s.query(participant, limit),
            Self::Memory(s) => s.query(participant, limit),
        }
    }

    fn close(&self) -> Result<(), StorageError> {
        match self {
            Self::Durable(s) => s.close(),
            Self::Memory(s) => s.close(),
        }
    }
}
