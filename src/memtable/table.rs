//! MemTable implementation
//!
//! BTreeMap-based memtable with RwLock for concurrency.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use crate::wal::Operation;

use super::MemTableEntry;

/// In-memory table for recent writes
///
/// `size` approximates the bytes held: key length plus value length
/// for every live entry, key length alone for a tombstone.
pub struct MemTable {
    data: RwLock<BTreeMap<Vec<u8>, MemTableEntry>>,
    size: AtomicUsize,
    entry_count: AtomicUsize,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            size: AtomicUsize::new(0),
            entry_count: AtomicUsize::new(0),
        }
    }

    /// Get an entry by key (read lock)
    pub fn get(&self, key: &[u8]) -> Option<MemTableEntry> {
        self.data.read().get(key).cloned()
    }

    /// Put a key-value pair (write lock); returns the new size
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> usize {
        let mut data = self.data.write();
        self.insert_locked(&mut data, key, MemTableEntry::Value(value))
    }

    /// Delete a key (write lock, inserts tombstone); returns the new size
    pub fn delete(&self, key: Vec<u8>) -> usize {
        let mut data = self.data.write();
        self.insert_locked(&mut data, key, MemTableEntry::Tombstone)
    }

    /// Apply a list of operations under a single write lock
    ///
    /// Readers observe either none or all of them.
    pub fn apply(&self, operations: Vec<Operation>) -> usize {
        let mut data = self.data.write();
        for op in operations {
            match op {
                Operation::Put { key, value } => {
                    self.insert_locked(&mut data, key, MemTableEntry::Value(value));
                }
                Operation::Delete { key } => {
                    self.insert_locked(&mut data, key, MemTableEntry::Tombstone);
                }
            }
        }
        self.size.load(Ordering::SeqCst)
    }

    /// Copy out the entries in `[start, end)`, tombstones included
    ///
    /// `None` bounds are unbounded.
    pub fn range(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> Vec<(Vec<u8>, MemTableEntry)> {
        let lower = start.map_or(Bound::Unbounded, Bound::Included);
        let upper = end.map_or(Bound::Unbounded, Bound::Excluded);

        // BTreeMap::range panics on an inverted range
        if let (Some(s), Some(e)) = (start, end) {
            if s >= e {
                return Vec::new();
            }
        }

        self.data
            .read()
            .range::<[u8], _>((lower, upper))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Get approximate size in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::SeqCst)
    }

    /// Get entry count (tombstones included)
    pub fn entry_count(&self) -> usize {
        self.entry_count.load(Ordering::SeqCst)
    }

    /// Check if the memtable holds no entries
    pub fn is_empty(&self) -> bool {
        self.entry_count() == 0
    }

    /// Check if should flush (size >= limit)
    pub fn should_flush(&self, size_limit: usize) -> bool {
        self.size() >= size_limit
    }

    /// Snapshot of all entries in sorted key order (for flush)
    pub fn iter(&self) -> Vec<(Vec<u8>, MemTableEntry)> {
        self.range(None, None)
    }

    /// Clear all entries (after successful flush)
    pub fn clear(&self) {
        let mut data = self.data.write();
        data.clear();
        self.size.store(0, Ordering::SeqCst);
        self.entry_count.store(0, Ordering::SeqCst);
    }

    /// Insert under an already-held write lock; returns the new size
    ///
    /// Every mutation holds the write lock, so the counters are only
    /// ever updated by one thread at a time.
    fn insert_locked(
        &self,
        data: &mut BTreeMap<Vec<u8>, MemTableEntry>,
        key: Vec<u8>,
        entry: MemTableEntry,
    ) -> usize {
        let key_len = key.len();
        let new_len = entry_len(&entry);
        let mut size = self.size.load(Ordering::SeqCst);

        match data.insert(key, entry) {
            Some(old) => size = size - entry_len(&old) + new_len,
            None => {
                self.entry_count.fetch_add(1, Ordering::SeqCst);
                size += key_len + new_len;
            }
        }

        self.size.store(size, Ordering::SeqCst);
        size
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

fn entry_len(entry: &MemTableEntry) -> usize {
    match entry {
        MemTableEntry::Value(v) => v.len(),
        MemTableEntry::Tombstone => 0,
    }
}
