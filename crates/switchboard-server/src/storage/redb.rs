//! Redb-backed durable history store.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety. Records
//! survive hub restarts.

#![allow(clippy::disallowed_types, reason = "Guards the database handle for close()")]

use std::{
    path::Path,
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use switchboard_proto::{Identity, MessageRecord};

use super::{Storage, StorageError, StorageKind};

/// Table: messages
/// Key: (timestamp_ms: u64, sequence: u64) as big-endian bytes [16 bytes]
/// Value: CBOR-encoded MessageRecord
const MESSAGES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("messages");

/// Durable store backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc). The
/// sequence half of the key breaks timestamp ties in insertion order.
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<RwLock<Option<Database>>>,
    next_sequence: Arc<AtomicU64>,
}

impl RedbStorage {
    /// Open or create a Redb database at the given path.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(|e| StorageError::Io(e.to_string()))?;

        let txn = db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let _ = txn.open_table(MESSAGES).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        let next_sequence = {
            let txn = db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
            let table = txn.open_table(MESSAGES).map_err(|e| StorageError::Io(e.to_string()))?;
            // Keys sort by timestamp first, so the newest key need not carry
            // the highest sequence once the wall clock has stepped back
            let mut next: u64 = 0;
            for entry in table.iter().map_err(|e| StorageError::Io(e.to_string()))? {
                let (key, _) = entry.map_err(|e| StorageError::Io(e.to_string()))?;
                next = next.max(decode_record_key(key.value()).1 + 1);
            }
            next
        };

        Ok(Self {
            db: Arc::new(RwLock::new(Some(db))),
            next_sequence: Arc::new(AtomicU64::new(next_sequence)),
        })
    }

    /// Total number of stored records.
    pub fn len(&self) -> Result<u64, StorageError> {
        let guard = self.db.read().unwrap_or_else(PoisonError::into_inner);
        let db = guard.as_ref().ok_or(StorageError::Closed)?;

        let txn = db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(MESSAGES).map_err(|e| StorageError::Io(e.to_string()))?;
        table.len().map_err(|e| StorageError::Io(e.to_string()))
    }

    /// Whether no records are stored.
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

impl Storage for RedbStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::Durable
    }

    fn insert(&self, record: &MessageRecord) -> Result<(), StorageError> {
        let guard = self.db.read().unwrap_or_else(PoisonError::into_inner);
        let db = guard.as_ref().ok_or(StorageError::Closed)?;

        let mut bytes = Vec::new();
        ciborium::into_writer(record, &mut bytes)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let key = encode_record_key(record.timestamp, sequence);

        let txn = db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let mut table =
                txn.open_table(MESSAGES).map_err(|e| StorageError::Io(e.to_string()))?;
            table
                .insert(key.as_slice(), bytes.as_slice())
                .map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }

    fn query(
        &self,
        participant: &Identity,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, StorageError> {
        let guard = self.db.read().unwrap_or_else(PoisonError::into_inner);
        let db = guard.as_ref().ok_or(StorageError::Closed)?;

        let txn = db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(MESSAGES).map_err(|e| StorageError::Io(e.to_string()))?;

        let mut records = Vec::with_capacity(limit.min(1024));
        if limit == 0 {
            return Ok(records);
        }

        // Newest first, then flipped to ascending
        for entry in table.iter().map_err(|e| StorageError::Io(e.to_string()))?.rev() {
            let (_, value) = entry.map_err(|e| StorageError::Io(e.to_string()))?;
            let record: MessageRecord = ciborium::from_reader(value.value())
                .map_err(|e| StorageError::Serialization(e.to_string()))?;

            if record.is_visible_to(participant) {
                records.push(record);
                if records.len() == limit {
                    break;
                }
            }
        }

        records.reverse();
        Ok(records)
    }

    fn close(&self) -> Result<(), StorageError> {
        let mut guard = self.db.write().unwrap_or_else(PoisonError::into_inner);
        // Dropping the last handle releases the file lock
        guard.take();
        Ok(())
    }
}

/// Encode record key as big-endian bytes so keys sort chronologically.
fn encode_record_key(timestamp: u64, sequence: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&timestamp.to_be_bytes());
    key[8..].copy_from_slice(&sequence.to_be_bytes());
    key
}

/// Decode record key into `(timestamp, sequence)`.
///
/// Keys shorter than 16 bytes decode as zero.
fn decode_record_key(key: &[u8]) -> (u64, u64) {
    let mut timestamp = [0u8; 8];
    let mut sequence = [0u8; 8];
    if key.len() >= 16 {
        timestamp.copy_from_slice(&key[..8]);
        sequence.copy_from_slice(&key[8..16]);
    }
    (u64::from_be_bytes(timestamp), u64::from_be_bytes(sequence))
}
