//! SSTable Module
//!
//! Sorted String Table - immutable on-disk sorted key-value storage.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (6 bytes)                                        │
//! │   Magic: "TSST" (4) | Version: u16 (2)                  │
//! ├─────────────────────────────────────────────────────────┤
//! │ Data Blocks (~block_size each)                          │
//! │   [KeyLen: u32][ValLen: u32][Key][Value]                │
//! │   ... repeated for each entry ...                       │
//! │   (ValLen = u32::MAX means tombstone, no value bytes)   │
//! ├─────────────────────────────────────────────────────────┤
//! │ Index Block                                             │
//! │   [MinKeyLen: u32][MinKey]                              │
//! │   [KeyLen: u32][Offset: u64][Len: u32][CRC: u32][LastKey]│
//! │   ... one per data block ...                            │
//! ├─────────────────────────────────────────────────────────┤
//! │ Bloom Filter Block                                      │
//! ├─────────────────────────────────────────────────────────┤
//! │ Footer (56 bytes)                                       │
//! │   IndexOffset u64 | IndexLen u64 | BloomOffset u64 |    │
//! │   BloomLen u64 | EntryCount u64 | CoversThrough u64 |   │
//! │   MetaCRC u32 | Magic (4)                               │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! `CoversThrough` is non-zero only for compaction output: it is the
//! highest SSTable id merged into this table.

mod block;
mod builder;
mod iterator;
mod reader;

use std::path::PathBuf;

pub use block::{Block, BlockEntry};
pub use builder::SSTableBuilder;
pub use iterator::SSTableIterator;
pub use reader::SSTableReader;

#[cfg(test)]
pub(crate) use block::encode_entry;

// =============================================================================
// Shared Constants (used by builder, reader, iterator)
// =============================================================================

/// Magic bytes identifying an SSTable file
pub(crate) const MAGIC: &[u8; 4] = b"TSST";

/// Current SSTable format version
pub(crate) const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) = 6 bytes
pub(crate) const HEADER_SIZE: u64 = 6;

/// Footer size: six u64 fields + MetaCRC (4) + Magic (4) = 56 bytes
pub(crate) const FOOTER_SIZE: u64 = 56;

/// Sentinel value indicating a tombstone (deleted key)
pub(crate) const TOMBSTONE_MARKER: u32 = u32::MAX;

pub(crate) const DEFAULT_BLOCK_SIZE: usize = 4 * 1024;

pub(crate) const DEFAULT_BLOOM_BITS_PER_KEY: usize = 10;

// =============================================================================
// Block Handle
// =============================================================================

/// Index entry locating one data block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHandle {
    /// Largest key stored in the block
    pub last_key: Vec<u8>,
    pub offset: u64,
    pub len: u32,
    /// CRC32 of the block bytes
    pub crc: u32,
}

// =============================================================================
// SSTable Metadata
// =============================================================================

/// Metadata describing a finished SSTable, returned by the builder
#[derive(Debug, Clone)]
pub struct SSTable {
    /// Path to the SSTable file
    pub path: PathBuf,
    /// Number of entries in this SSTable (tombstones included)
    pub entry_count: u64,
    /// Smallest key (for range filtering)
    pub min_key: Vec<u8>,
    /// Largest key (for range filtering)
    pub max_key: Vec<u8>,
    /// Number of data blocks
    pub block_count: usize,
    /// Highest table id merged into this one (0 if not a compaction output)
    pub covers_through: u64,
    /// File size in bytes
    pub file_size: u64,
}

impl SSTable {
    /// Get the number of entries
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Quick check if a key might be in this SSTable (range check)
    /// Returns false if key is definitely outside [min_key, max_key]
    pub fn might_contain(&self, key: &[u8]) -> bool {
        self.entry_count > 0 && key >= self.min_key.as_slice() && key <= self.max_key.as_slice()
    }
}
