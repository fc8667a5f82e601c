//! Engine Module
//!
//! The ordered key-value engine behind a [`Store`](crate::Store).
//!
//! ## Responsibilities
//! - Coordinate WAL, MemTable, and Storage
//! - Apply multi-operation writes atomically
//! - Serve point lookups and snapshot range scans
//! - Trigger flushes when MemTable is full, compaction when tables pile up
//! - Manage crash recovery on startup

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::memtable::MemTable;
use crate::storage::{CacheStats, EntrySource, MergeIterator, StorageManager};
use crate::wal::{Operation, WalRecovery, WalWriter};

/// The storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (write/flush/compact): Serialized by `write_lock`
///   - Only ONE write operation at a time
///   - Must acquire: write_lock → WAL → memtable → storage (write)
///
/// - **Reads** (get): Concurrent
///   - No write_lock needed
///   - MemTable uses internal RwLock (many concurrent readers)
///   - SSTable readers lock only their own file handle
///
/// - **Scans**: take `write_lock` just long enough to copy the memtable
///   range and the SSTable list, so the snapshot never straddles a flush
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Directory for all data files (SSTables)
    storage_dir: PathBuf,

    /// Write-ahead log for durability (exclusive access needed)
    wal: Mutex<WalWriter>,

    /// In-memory table for recent writes (internal RwLock)
    memtable: MemTable,

    /// Persistent storage manager (internal RwLock on sstables vec)
    storage: StorageManager,

    /// Serializes write operations and scan snapshots
    write_lock: Mutex<()>,
}

impl Engine {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const WAL_FILENAME: &'static str = "wal.log";
    const SSTABLE_DIR: &'static str = "sstables";

    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Open/create data directory
    /// 2. Load existing SSTables
    /// 3. Recover from WAL if exists, flush recovered data
    /// 4. Ready to serve requests
    pub fn open(config: Config) -> EngineResult<Self> {
        config.validate()?;

        // Step 1: Create data directory if it doesn't exist
        fs::create_dir_all(&config.data_dir)?;

        // Step 2: Compute paths (derived from data_dir, not configurable)
        let storage_dir = config.data_dir.join(Self::SSTABLE_DIR);
        let wal_path = config.data_dir.join(Self::WAL_FILENAME);

        // Step 3: Open storage manager (loads existing SSTables)
        let storage = StorageManager::open_with_config(&storage_dir, &config)?;

        // Step 4: Create memtable
        let memtable = MemTable::new();

        // Step 5: Recover from WAL if it exists
        let recovered = if wal_path.exists() {
            let (entries, recovery_result) = WalRecovery::recover(&wal_path)?;

            if recovery_result.entries_recovered > 0 || recovery_result.entries_corrupted > 0 {
                tracing::info!(
                    "WAL recovery: {} entries recovered, {} corrupted, last_lsn={}",
                    recovery_result.entries_recovered,
                    recovery_result.entries_corrupted,
                    recovery_result.last_lsn
                );
            }

            // Each entry is one atomic write
            for entry in entries {
                memtable.apply(entry.operations);
            }

            // Flush recovered data to an SSTable before the WAL is reset
            if !memtable.is_empty() {
                tracing::info!("Flushing {} recovered entries to SSTable", memtable.entry_count());
                storage.flush(&memtable)?;
                memtable.clear();
            }
            recovery_result.entries_recovered > 0
        } else {
            false
        };

        // Step 6: Open WAL; recovered entries are now durable in SSTables
        let mut wal = WalWriter::open(&wal_path, config.wal_sync_strategy)?;
        if recovered {
            wal.truncate()?;
        }

        tracing::debug!(
            "Engine opened at {} ({} SSTables)",
            config.data_dir.display(),
            storage.sstable_count()
        );

        Ok(Self {
            config,
            storage_dir,
            wal: Mutex::new(wal),
            memtable,
            storage,
            write_lock: Mutex::new(()),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> EngineResult<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    /// Get a value by key
    ///
    /// Search order:
    /// 1. MemTable (most recent writes)
    /// 2. SSTables (newest to oldest)
    pub fn get(&self, key: &[u8]) -> EngineResult<Option<Vec<u8>>> {
        if let Some(entry) = self.memtable.get(key) {
            return Ok(entry.into_value());
        }
        self.storage.get(key)
    }

    /// Put a key-value pair
    pub fn put(&self, key: &[u8], value: &[u8]) -> EngineResult<()> {
        self.write(vec![Operation::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        }])
    }

    /// Delete a key
    pub fn delete(&self, key: &[u8]) -> EngineResult<()> {
        self.write(vec![Operation::Delete { key: key.to_vec() }])
    }

    /// Apply operations atomically
    ///
    /// Steps:
    /// 1. Acquire write lock
    /// 2. Append ONE WAL record holding every operation (durability)
    /// 3. Apply all operations to MemTable under one lock
    /// 4. Check if flush needed
    ///
    /// An error means nothing was written. Once the WAL append succeeds
    /// the write is committed: a failure of the flush (or compaction) it
    /// triggers is not returned here. The data stays in the WAL and the
    /// MemTable, the next write over the limit retries, and an explicit
    /// [`flush`](Self::flush) or [`close`](Self::close) returns the error
    /// if it persists.
    pub fn write(&self, operations: Vec<Operation>) -> EngineResult<()> {
        if operations.is_empty() {
            return Ok(());
        }

        let _write_guard = self.write_lock.lock();

        // Step 1: Write to WAL first (durability guarantee)
        self.wal.lock().append_batch(&operations)?;

        // Step 2: Write to MemTable
        let new_size = self.memtable.apply(operations);

        // Step 3: Check if flush is needed
        if new_size >= self.config.memtable_size_limit {
            if let Err(e) = self.flush_internal() {
                tracing::warn!("Flush after write failed, will retry: {}", e);
            }
        }

        Ok(())
    }

    /// Iterate over live entries in `[start, end)` as of now
    ///
    /// `None` bounds are unbounded. Later writes are not visible to the
    /// returned iterator.
    pub fn scan(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> EngineIterator {
        let (mem_entries, tables) = {
            let _write_guard = self.write_lock.lock();
            (self.memtable.range(start, end), self.storage.snapshot())
        };

        let mut sources: Vec<EntrySource> = Vec::with_capacity(tables.len() + 1);
        sources.push(Box::new(
            mem_entries
                .into_iter()
                .map(|(k, entry)| Ok::<_, EngineError>((k, entry.into_value()))),
        ));
        for table in &tables {
            sources.push(Box::new(table.scan(start, end)));
        }

        EngineIterator {
            inner: MergeIterator::new(sources),
            error: None,
        }
    }

    /// Flush memtable to disk (public API)
    ///
    /// Forces a flush regardless of memtable size
    pub fn flush(&self) -> EngineResult<()> {
        let _write_guard = self.write_lock.lock();
        self.flush_internal()
    }

    /// Merge all SSTables into one
    pub fn compact(&self) -> EngineResult<()> {
        let _write_guard = self.write_lock.lock();
        self.storage.compact()?;
        Ok(())
    }

    /// Internal flush implementation (called with write lock held)
    ///
    /// Also runs a compaction that is due, so a retry after a failed
    /// compaction does not need new data in the memtable.
    fn flush_internal(&self) -> EngineResult<()> {
        if !self.memtable.is_empty() {
            // Step 1: Flush memtable to SSTable
            self.storage.flush(&self.memtable)?;

            // Step 2: Clear memtable
            self.memtable.clear();

            // Step 3: Truncate WAL (entries are now durable in SSTable)
            self.wal.lock().truncate()?;
        }

        // Step 4: Keep the table count bounded
        if self.storage.sstable_count() >= self.config.compaction_trigger {
            self.storage.compact()?;
        }

        Ok(())
    }

    /// Close the engine gracefully
    ///
    /// Flushes any pending data and syncs to disk
    pub fn close(self) -> EngineResult<()> {
        self.flush()?;
        self.wal.lock().sync()?;
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the storage directory path (where SSTables are stored)
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Get the current memtable size
    pub fn memtable_size(&self) -> usize {
        self.memtable.size()
    }

    /// Get the memtable entry count
    pub fn memtable_entry_count(&self) -> usize {
        self.memtable.entry_count()
    }

    /// Get the number of SSTables
    pub fn sstable_count(&self) -> usize {
        self.storage.sstable_count()
    }

    /// Get block cache counters
    pub fn cache_stats(&self) -> CacheStats {
        self.storage.cache_stats()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Ordered cursor over a scan snapshot
///
/// Yields live `(key, value)` pairs; tombstones are skipped. A storage
/// error ends iteration and is kept for [`take_error`](Self::take_error).
pub struct EngineIterator {
    inner: MergeIterator,
    error: Option<EngineError>,
}

impl EngineIterator {
    /// The error that ended iteration, if any
    pub fn take_error(&mut self) -> Option<EngineError> {
        self.error.take()
    }
}

impl Iterator for EngineIterator {
    type Item = (Vec<u8>, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.error.is_some() {
            return None;
        }
        loop {
            match self.inner.next()? {
                Ok((key, Some(value))) => return Some((key, value)),
                Ok((_, None)) => continue,
                Err(e) => {
                    self.error = Some(e);
                    return None;
                }
            }
        }
    }
}
