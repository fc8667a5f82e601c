//! Storage Module
//!
//! Persistent storage layer using block-based SSTables.
//!
//! ## Responsibilities
//! - Persist data to disk in sorted format
//! - Efficient range scans and point lookups
//! - Bloom filters for negative lookups
//! - Shared LRU block cache
//! - Full compaction when the table count grows

pub mod bloom;
pub mod cache;
mod manager;
mod merge;
mod sstable;

pub use bloom::BloomFilter;
pub use cache::{BlockCache, CacheStats};
pub use manager::StorageManager;
pub use merge::{EntrySource, KvEntry, MergeIterator};
pub use sstable::{
    Block, BlockEntry, BlockHandle, SSTable, SSTableBuilder, SSTableIterator, SSTableReader,
};

#[cfg(test)]
pub(crate) use sstable::encode_entry;
