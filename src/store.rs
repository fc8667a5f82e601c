//! Store Facade
//!
//! The public contract: point reads and writes, atomic batches, and
//! ordered range/prefix iteration over one on-disk engine.
//!
//! Sizes are checked here, before anything reaches the engine. Every
//! engine failure is returned as [`StoreError::Engine`] carrying the name
//! of the operation that hit it.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::batch::Batch;
use crate::config::Config;
use crate::engine::Engine;
use crate::error::{Result, StoreError};
use crate::iterator::{prefix_successor, ScanIterator};
use crate::storage::CacheStats;

/// Largest accepted key, in bytes
pub const MAX_KEY_SIZE: usize = 1 << 14;

/// Largest accepted value, in bytes
pub const MAX_VALUE_SIZE: usize = 1 << 16;

/// Source of per-process store ids; batches carry the id of their store
static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// Reject a key longer than [`MAX_KEY_SIZE`]
pub fn check_key(key: &[u8]) -> Result<()> {
    if key.len() > MAX_KEY_SIZE {
        return Err(StoreError::KeyTooLarge {
            size: key.len(),
            max: MAX_KEY_SIZE,
        });
    }
    Ok(())
}

/// Reject a key or value over its limit; the key is checked first
pub fn check_sizes(key: &[u8], value: &[u8]) -> Result<()> {
    check_key(key)?;
    if value.len() > MAX_VALUE_SIZE {
        return Err(StoreError::ValueTooLarge {
            size: value.len(),
            max: MAX_VALUE_SIZE,
        });
    }
    Ok(())
}

/// Counters describing a store's current state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Keys (including tombstones) not yet flushed
    pub memtable_entries: usize,
    /// Approximate bytes held by the memtable
    pub memtable_bytes: usize,
    pub sstable_count: usize,
    pub cache: CacheStats,
}

/// Durable ordered key-value store bound to one directory
///
/// `Store` is `Send + Sync`; share it behind an `Arc` to use it from
/// several threads.
pub struct Store {
    id: u64,
    engine: Engine,
}

impl Store {
    /// Open (or create) the store at `path` with default settings
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(Config::builder().data_dir(path.as_ref()).build())
    }

    /// Open (or create) a store described by `config`
    pub fn open_with_config(config: Config) -> Result<Self> {
        let engine = Engine::open(config).map_err(|e| StoreError::engine("open", e))?;
        let id = NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed);

        tracing::info!(
            store = id,
            path = %engine.data_dir().display(),
            sstables = engine.sstable_count(),
            "store opened"
        );

        Ok(Self { id, engine })
    }

    /// Value stored under `key`
    ///
    /// Returns [`StoreError::NotFound`] if the key was never written or
    /// has been deleted. An empty stored value is returned as-is.
    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<Vec<u8>> {
        self.engine
            .get(key.as_ref())
            .map_err(|e| StoreError::engine("get", e))?
            .ok_or(StoreError::NotFound)
    }

    /// Store `value` under `key`, replacing any previous value
    pub fn put(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        let (key, value) = (key.as_ref(), value.as_ref());
        check_sizes(key, value)?;
        self.engine
            .put(key, value)
            .map_err(|e| StoreError::engine("put", e))
    }

    /// Remove `key`; deleting a missing key succeeds
    pub fn delete(&self, key: impl AsRef<[u8]>) -> Result<()> {
        let key = key.as_ref();
        check_key(key)?;
        self.engine
            .delete(key)
            .map_err(|e| StoreError::engine("delete", e))
    }

    /// Start an empty batch bound to this store
    pub fn begin_batch(&self) -> Batch {
        Batch::new(self.id)
    }

    /// Apply every operation of `batch` as one atomic write
    ///
    /// A batch from another store is rejected first. A poisoned batch
    /// returns its recorded size error and writes nothing.
    pub fn commit_batch(&self, batch: Batch) -> Result<()> {
        if batch.store_id() != self.id {
            return Err(StoreError::BatchOwnership {
                batch_store: batch.store_id(),
                store: self.id,
            });
        }

        let operations = batch.into_operations()?;
        let count = operations.len();
        self.engine
            .write(operations)
            .map_err(|e| StoreError::engine("commit batch", e))?;

        tracing::trace!(store = self.id, operations = count, "batch committed");
        Ok(())
    }

    /// Iterate over keys in `[start, end)`
    ///
    /// An empty bound leaves that side open, so `range_scan("", "")`
    /// visits every key.
    pub fn range_scan(&self, start: impl AsRef<[u8]>, end: impl AsRef<[u8]>) -> Result<ScanIterator> {
        let (start, end) = (start.as_ref(), end.as_ref());
        let start = (!start.is_empty()).then_some(start);
        let end = (!end.is_empty()).then_some(end);

        let inner = self.engine.scan(start, end);
        Ok(ScanIterator::new(inner, "range scan".to_string()))
    }

    /// Iterate over every key beginning with `prefix`
    pub fn prefix_scan(&self, prefix: impl AsRef<[u8]>) -> Result<ScanIterator> {
        let prefix = prefix.as_ref();
        let end = prefix_successor(prefix);
        let start = (!prefix.is_empty()).then_some(prefix);

        let inner = self.engine.scan(start, end.as_deref());
        Ok(ScanIterator::new(inner, "prefix scan".to_string()))
    }

    /// Write the memtable out to a new SSTable
    pub fn flush(&self) -> Result<()> {
        self.engine.flush().map_err(|e| StoreError::engine("flush", e))
    }

    /// Merge all SSTables into one, dropping deleted keys
    pub fn compact(&self) -> Result<()> {
        self.engine
            .compact()
            .map_err(|e| StoreError::engine("compact", e))
    }

    /// Flush pending writes and release the engine
    pub fn close(self) -> Result<()> {
        let id = self.id;
        self.engine
            .close()
            .map_err(|e| StoreError::engine("close", e))?;
        tracing::info!(store = id, "store closed");
        Ok(())
    }

    /// Directory holding this store's files
    pub fn path(&self) -> &Path {
        self.engine.data_dir()
    }

    /// Process-unique id of this store
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current memtable, SSTable and block cache counters
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            memtable_entries: self.engine.memtable_entry_count(),
            memtable_bytes: self.engine.memtable_size(),
            sstable_count: self.engine.sstable_count(),
            cache: self.engine.cache_stats(),
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.id)
            .field("path", &self.path())
            .finish()
    }
}
