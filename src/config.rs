//! Configuration for tradestore
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{EngineError, EngineResult};

/// 1 MiB, for readability of the defaults below
const MIB: usize = 1024 * 1024;

/// Main configuration for a store instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files (WAL, SSTables, etc.)
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── wal.log          (write-ahead log)
    ///     └── sstables/        (SSTable files)
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync WAL
    pub wal_sync_strategy: WalSyncStrategy,

    // -------------------------------------------------------------------------
    // MemTable Configuration
    // -------------------------------------------------------------------------
    /// Max size of memtable before flush (in bytes)
    pub memtable_size_limit: usize,

    // -------------------------------------------------------------------------
    // SSTable Configuration
    // -------------------------------------------------------------------------
    /// Shared block cache capacity (in bytes)
    pub block_cache_capacity: usize,

    /// Bloom filter bits per key; 0 disables the filter
    pub bloom_bits_per_key: usize,

    /// Target size of an SSTable data block (in bytes)
    pub block_size: usize,

    /// Number of SSTables that triggers a full compaction
    pub compaction_trigger: usize,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./tradestore_data"),
            wal_sync_strategy: WalSyncStrategy::EveryWrite,
            memtable_size_limit: 4 * MIB,
            block_cache_capacity: 512 * MIB,
            bloom_bits_per_key: 10,
            block_size: 4 * 1024,
            compaction_trigger: 8,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> EngineResult<()> {
        if self.memtable_size_limit == 0 {
            return Err(EngineError::Config("memtable_size_limit must be > 0".into()));
        }
        if self.block_size == 0 {
            return Err(EngineError::Config("block_size must be > 0".into()));
        }
        if self.compaction_trigger < 2 {
            return Err(EngineError::Config("compaction_trigger must be >= 2".into()));
        }
        if let WalSyncStrategy::EveryNEntries { count: 0 } = self.wal_sync_strategy {
            return Err(EngineError::Config("WAL sync count must be > 0".into()));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set the memtable size limit (in bytes)
    pub fn memtable_size_limit(mut self, size: usize) -> Self {
        self.config.memtable_size_limit = size;
        self
    }

    /// Set the block cache capacity (in bytes)
    pub fn block_cache_capacity(mut self, bytes: usize) -> Self {
        self.config.block_cache_capacity = bytes;
        self
    }

    /// Set the bloom filter density
    pub fn bloom_bits_per_key(mut self, bits: usize) -> Self {
        self.config.bloom_bits_per_key = bits;
        self
    }

    /// Set the SSTable data block size (in bytes)
    pub fn block_size(mut self, bytes: usize) -> Self {
        self.config.block_size = bytes;
        self
    }

    /// Set the SSTable count that triggers compaction
    pub fn compaction_trigger(mut self, tables: usize) -> Self {
        self.config.compaction_trigger = tables;
        self
    }

    /// Finish building the config
    pub fn build(self) -> Config {
        self.config
    }
}
