//! Storage Manager
//!
//! Manages multiple SSTables and coordinates reads/writes.
//!
//! ## Responsibilities
//! - Discover existing SSTables on startup
//! - Search SSTables newest → oldest for reads
//! - Create new SSTables from MemTable flushes
//! - Compact all SSTables into one
//! - Own the block cache shared by every reader

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::memtable::{MemTable, MemTableEntry};

use super::cache::{BlockCache, CacheStats};
use super::merge::{EntrySource, MergeIterator};
use super::{SSTable, SSTableBuilder, SSTableReader};

/// Manages the storage layer
///
/// ## Concurrency:
/// - `sstables`: Protected by RwLock (many concurrent readers, exclusive writer)
/// - `next_sstable_id`: Atomic counter (lock-free)
/// - Readers are `Arc`-shared, so a snapshot of the list stays readable
///   after a flush or compaction replaces it
/// - All methods use `&self` (no exclusive access needed)
pub struct StorageManager {
    /// Directory where SSTables are stored
    data_dir: PathBuf,

    /// Open SSTable readers, ordered newest → oldest
    sstables: RwLock<Vec<Arc<SSTableReader>>>,

    /// Next ID for creating new SSTables (atomic, lock-free)
    next_sstable_id: AtomicU64,

    cache: Arc<BlockCache>,
    block_size: usize,
    bloom_bits_per_key: usize,
}

impl StorageManager {
    /// Open or create storage with default SSTable settings
    pub fn open(path: &Path) -> EngineResult<Self> {
        Self::open_with_config(path, &Config::default())
    }

    /// Open or create storage in the given directory
    ///
    /// On startup:
    /// 1. Create directory if it doesn't exist
    /// 2. Discover existing SSTable files
    ///    (unfinished `*.tmp` outputs are deleted)
    /// 3. Open readers for each (loads indexes and bloom filters into RAM)
    /// 4. Delete tables already merged into a compaction output
    /// 5. Order by ID descending (newest first)
    pub fn open_with_config(path: &Path, config: &Config) -> EngineResult<Self> {
        fs::create_dir_all(path)?;
        let cache = Arc::new(BlockCache::new(config.block_cache_capacity));

        let mut sstable_ids: Vec<u64> = Vec::new();
        for entry in fs::read_dir(path)? {
            let file_path = entry?.path();
            if !file_path.is_file() {
                continue;
            }
            if file_path.extension().map_or(false, |ext| ext == "tmp") {
                // Output of a flush or compaction that never finished
                tracing::info!("Removing unfinished table {}", file_path.display());
                fs::remove_file(&file_path)?;
            } else if let Some(id) = Self::parse_sstable_id(&file_path) {
                sstable_ids.push(id);
            }
        }
        // Newest first (highest ID first)
        sstable_ids.sort_unstable_by(|a, b| b.cmp(a));

        let mut sstables = Vec::new();
        for &id in &sstable_ids {
            let sstable_path = Self::sstable_path_with_dir(path, id);
            let reader = SSTableReader::open_with_cache(&sstable_path, id, Arc::clone(&cache))?;
            sstables.push(Arc::new(reader));
        }

        // A crash between writing a compaction output and deleting its
        // inputs leaves the inputs behind; they are fully covered
        let covered = sstables.iter().map(|t| t.covers_through()).max().unwrap_or(0);
        if covered > 0 {
            let (stale, live): (Vec<_>, Vec<_>) =
                sstables.into_iter().partition(|t| t.id() <= covered);
            for table in stale {
                tracing::info!("Removing SSTable {} left over from compaction", table.id());
                fs::remove_file(table.path())?;
            }
            sstables = live;
        }

        // Next ID = max + 1, or 1 if no SSTables exist
        let next_id = sstable_ids.first().map(|&id| id + 1).unwrap_or(1);

        Ok(Self {
            data_dir: path.to_path_buf(),
            sstables: RwLock::new(sstables),
            next_sstable_id: AtomicU64::new(next_id),
            cache,
            block_size: config.block_size,
            bloom_bits_per_key: config.bloom_bits_per_key,
        })
    }

    /// Get a value by key (searches all SSTables newest → oldest)
    ///
    /// Returns:
    /// - `Ok(Some(value))`: key found with value
    /// - `Ok(None)`: key not found, or found tombstone (deleted)
    pub fn get(&self, key: &[u8]) -> EngineResult<Option<Vec<u8>>> {
        let sstables = self.sstables.read();

        for reader in sstables.iter() {
            match reader.get(key)? {
                Some(MemTableEntry::Value(value)) => return Ok(Some(value)),
                Some(MemTableEntry::Tombstone) => return Ok(None),
                None => continue,
            }
        }

        Ok(None)
    }

    /// Flush a MemTable to a new SSTable
    ///
    /// Creates a new SSTable file from the MemTable's sorted entries,
    /// opens a reader for it, and adds it to the front of the list.
    pub fn flush(&self, memtable: &MemTable) -> EngineResult<SSTable> {
        if memtable.is_empty() {
            return Err(EngineError::Storage(
                "Cannot flush empty MemTable".to_string(),
            ));
        }

        let id = self.next_sstable_id.fetch_add(1, Ordering::SeqCst);
        let path = self.sstable_path(id);

        let built = self
            .write_memtable(&path, memtable)
            .and_then(|metadata| {
                let reader = SSTableReader::open_with_cache(&path, id, Arc::clone(&self.cache))?;
                Ok((metadata, reader))
            });
        let (metadata, reader) = match built {
            Ok(built) => built,
            Err(e) => {
                Self::discard_output(&path);
                return Err(e);
            }
        };
        self.sstables.write().insert(0, Arc::new(reader));

        tracing::debug!(
            "Flushed {} entries to SSTable {} ({} bytes)",
            metadata.entry_count,
            id,
            metadata.file_size
        );
        Ok(metadata)
    }

    /// Merge every SSTable into one
    ///
    /// The output is the oldest table left, so tombstones are dropped.
    /// Returns `None` when there are fewer than two tables. Must not run
    /// concurrently with `flush` (the engine's write lock serializes them).
    pub fn compact(&self) -> EngineResult<Option<SSTable>> {
        let inputs = self.snapshot();
        if inputs.len() < 2 {
            return Ok(None);
        }

        let covers_through = inputs.iter().map(|t| t.id()).max().unwrap_or(0);
        let id = self.next_sstable_id.fetch_add(1, Ordering::SeqCst);
        let path = self.sstable_path(id);

        let built = self
            .write_merged(&path, &inputs, covers_through)
            .and_then(|metadata| {
                let reader = SSTableReader::open_with_cache(&path, id, Arc::clone(&self.cache))?;
                Ok((metadata, Arc::new(reader)))
            });
        let (metadata, reader) = match built {
            Ok(built) => built,
            Err(e) => {
                Self::discard_output(&path);
                return Err(e);
            }
        };

        // Swap: inputs out, output in at the oldest position
        {
            let mut sstables = self.sstables.write();
            sstables.retain(|t| t.id() > covers_through);
            sstables.push(reader);
        }

        for table in &inputs {
            self.cache.evict_table(table.id());
            fs::remove_file(table.path())?;
        }

        tracing::info!(
            "Compacted {} SSTables into SSTable {} ({} entries)",
            inputs.len(),
            id,
            metadata.entry_count
        );
        Ok(Some(metadata))
    }

    /// Current readers, newest first
    pub fn snapshot(&self) -> Vec<Arc<SSTableReader>> {
        self.sstables.read().clone()
    }

    /// Get the number of SSTables
    pub fn sstable_count(&self) -> usize {
        self.sstables.read().len()
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Get the next SSTable ID (for testing/debugging)
    pub fn next_sstable_id(&self) -> u64 {
        self.next_sstable_id.load(Ordering::SeqCst)
    }

    /// Get block cache counters
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Write a memtable's entries (already sorted) into a table at `path`
    fn write_memtable(&self, path: &Path, memtable: &MemTable) -> EngineResult<SSTable> {
        let mut builder = self.builder(path)?;
        for (key, entry) in memtable.iter() {
            match entry {
                MemTableEntry::Value(v) => builder.add(&key, &v)?,
                MemTableEntry::Tombstone => builder.add_tombstone(&key)?,
            }
        }
        builder.finish()
    }

    /// Remove whatever a failed flush or compaction left at `path`
    ///
    /// Best effort; `open` also deletes leftover `*.tmp` files.
    fn discard_output(path: &Path) {
        let _ = fs::remove_file(SSTableBuilder::temp_path(path));
        let _ = fs::remove_file(path);
    }

    /// Write the live entries of `inputs` into one table at `path`
    fn write_merged(
        &self,
        path: &Path,
        inputs: &[Arc<SSTableReader>],
        covers_through: u64,
    ) -> EngineResult<SSTable> {
        let sources: Vec<EntrySource> = inputs
            .iter()
            .map(|t| Box::new(t.iter()) as EntrySource)
            .collect();

        let mut builder = self.builder(path)?;
        builder.set_covers_through(covers_through);
        for item in MergeIterator::new(sources) {
            let (key, value) = item?;
            if let Some(value) = value {
                builder.add(&key, &value)?;
            }
        }
        builder.finish()
    }

    fn builder(&self, path: &Path) -> EngineResult<SSTableBuilder> {
        SSTableBuilder::with_options(path, self.block_size, self.bloom_bits_per_key)
    }

    /// Generate the file path for an SSTable with given ID
    fn sstable_path(&self, id: u64) -> PathBuf {
        Self::sstable_path_with_dir(&self.data_dir, id)
    }

    /// Generate SSTable path given a directory and ID
    fn sstable_path_with_dir(dir: &Path, id: u64) -> PathBuf {
        dir.join(format!("sstable_{:06}.sst", id))
    }

    /// Parse SSTable ID from filename
    /// "sstable_000042.sst" → Some(42)
    fn parse_sstable_id(path: &Path) -> Option<u64> {
        if path.extension()? != "sst" {
            return None;
        }
        let name = path.file_stem()?.to_string_lossy();
        let id_str = name.strip_prefix("sstable_")?;
        id_str.parse().ok()
    }
}
