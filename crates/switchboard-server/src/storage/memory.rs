#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use switchboard_proto::{Identity, MessageRecord};

use super::{Storage, StorageError, StorageKind};

/// Bounded in-memory history store.
///
/// Keeps at most `capacity` records in insertion order and evicts the oldest
/// when full. Stands in for the durable store when none is configured or it
/// cannot be opened. State lives behind `Arc<Mutex<>>`, so clones share it.
/// A poisoned lock is recovered rather than propagated; the ring holds no
/// invariant a panicking writer could break halfway.
#[derive(Clone)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryStorageInner>>,
}

struct MemoryStorageInner {
    records: VecDeque<MessageRecord>,
    capacity: usize,
    closed: bool,
}

impl MemoryStorage {
    /// Ring capacity used when none is configured.
    pub const DEFAULT_CAPACITY: usize = 100;

    /// Create an empty store with [`Self::DEFAULT_CAPACITY`].
    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// Create an empty store holding at most `capacity` records (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(MemoryStorageInner {
                records: VecDeque::with_capacity(capacity),
                capacity,
                closed: false,
            })),
        }
    }

    /// Maximum number of retained records.
    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    /// Number of retained records.
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    /// Whether no records are retained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, MemoryStorageInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::Memory
    }

    fn insert(&self, record: &MessageRecord) -> Result<(), StorageError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(StorageError::Closed);
        }

        if inner.records.len() == inner.capacity {
            inner.records.pop_front();
        }
        inner.records.push_back(record.clone());

        debug_assert!(inner.records.len() <= inner.capacity);
        Ok(())
    }

    fn query(
        &self,
        participant: &Identity,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, StorageError> {
        let inner = self.lock();
        if inner.closed {
            return Err(StorageError::Closed);
        }

        let mut visible: Vec<MessageRecord> =
            inner.records.iter().filter(|r| r.is_visible_to(participant)).cloned().collect();
        drop(inner);

        // Stable, so equal timestamps keep insertion order
        visible.sort_by_key(|r| r.timestamp);
        let skip = visible.len().saturating_sub(limit);
        Ok(visible.split_off(skip))
    }

    fn close(&self) -> Result<(), StorageError> {
        let mut inner = self.lock();
        inner.closed = true;
        inner.records.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn direct(from: &str, to: &str, ts: u64) -> MessageRecord {
        MessageRecord::direct(Identity::from(from), Identity::from(to), json!(ts), ts)
    }

    fn broadcast(from: &str, ts: u64) -> MessageRecord {
        MessageRecord::broadcast(Identity::from(from), json!(ts), ts)
    }

    #[test]
    fn new_storage_is_empty() {
        let storage = MemoryStorage::new();
        assert!(storage.is_empty());
        assert_eq!(storage.capacity(), MemoryStorage::DEFAULT_CAPACITY);
    }

    #[test]
    fn query_filters_by_participant() {
        let storage = MemoryStorage::new();
        storage.insert(&direct("a", "b", 1)).unwrap();
        storage.insert(&broadcast("a", 2)).unwrap();
        storage.insert(&direct("b", "c", 3)).unwrap();

        let a: Vec<u64> =
            storage.query(&Identity::from("a"), 10).unwrap().iter().map(|r| r.timestamp).collect();
        assert_eq!(a, vec![1, 2]);

        let c: Vec<u64> =
            storage.query(&Identity::from("c"), 10).unwrap().iter().map(|r| r.timestamp).collect();
        assert_eq!(c, vec![2, 3]);
    }

    #[test]
    fn evicts_oldest_when_full() {
        let storage = MemoryStorage::with_capacity(3);
        for ts in 0..5 {
            storage.insert(&broadcast("a", ts)).unwrap();
        }

        assert_eq!(storage.len(), 3);
        let kept: Vec<u64> =
            storage.query(&Identity::from("z"), 10).unwrap().iter().map(|r| r.timestamp).collect();
        assert_eq!(kept, vec![2, 3, 4]);
    }

    #[test]
    fn limit_keeps_most_recent_in_ascending_order() {
        let storage = MemoryStorage::new();
        for ts in 0..10 {
            storage.insert(&broadcast("a", ts)).unwrap();
        }

        let recent: Vec<u64> =
            storage.query(&Identity::from("a"), 4).unwrap().iter().map(|r| r.timestamp).collect();
        assert_eq!(recent, vec![6, 7, 8, 9]);
    }

    #[test]
    fn out_of_order_timestamps_are_sorted() {
        let storage = MemoryStorage::new();
        storage.insert(&broadcast("a", 5)).unwrap();
        storage.insert(&broadcast("a", 3)).unwrap();

        let order: Vec<u64> =
            storage.query(&Identity::from("a"), 10).unwrap().iter().map(|r| r.timestamp).collect();
        assert_eq!(order, vec![3, 5]);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let storage = MemoryStorage::with_capacity(0);
        storage.insert(&broadcast("a", 1)).unwrap();
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn close_is_idempotent_and_rejects_later_use() {
        let storage = MemoryStorage::new();
        storage.insert(&broadcast("a", 1)).unwrap();

        storage.close().unwrap();
        storage.close().unwrap();

        assert_eq!(storage.insert(&broadcast("a", 2)), Err(StorageError::Closed));
        assert_eq!(storage.query(&Identity::from("a"), 10), Err(StorageError::Closed));
    }
}
