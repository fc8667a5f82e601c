//! SSTable Reader
//!
//! Opens SSTable files and serves point lookups and range scans. The
//! block index and bloom filter live in memory; data blocks are read
//! through the shared block cache.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::{EngineError, EngineResult};
use crate::memtable::MemTableEntry;
use crate::storage::bloom::BloomFilter;
use crate::storage::cache::BlockCache;

use super::iterator::SSTableIterator;
use super::{Block, BlockHandle, FOOTER_SIZE, HEADER_SIZE, MAGIC, VERSION};

/// Reader for SSTable files
///
/// `&self` everywhere: the file handle sits behind a mutex so one
/// reader can serve concurrent lookups.
pub struct SSTableReader {
    id: u64,
    path: PathBuf,
    file: Mutex<File>,
    /// One handle per data block, ordered by key
    index: Vec<BlockHandle>,
    bloom: Option<BloomFilter>,
    min_key: Vec<u8>,
    entry_count: u64,
    covers_through: u64,
    file_size: u64,
    cache: Arc<BlockCache>,
}

impl SSTableReader {
    /// Open an SSTable without block caching
    pub fn open(path: &Path) -> EngineResult<Self> {
        Self::open_with_cache(path, 0, Arc::new(BlockCache::disabled()))
    }

    /// Open an SSTable whose blocks go through `cache` under `id`
    pub fn open_with_cache(path: &Path, id: u64, cache: Arc<BlockCache>) -> EngineResult<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();

        if file_size < HEADER_SIZE + FOOTER_SIZE {
            return Err(corrupt(path, format!("file too small ({} bytes)", file_size)));
        }

        // Read and validate header
        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;
        if &header[0..4] != MAGIC {
            return Err(corrupt(path, format!("invalid magic {:?}", &header[0..4])));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != VERSION {
            return Err(corrupt(path, format!("unsupported version {}", version)));
        }

        // Read footer
        file.seek(SeekFrom::Start(file_size - FOOTER_SIZE))?;
        let mut footer = [0u8; FOOTER_SIZE as usize];
        file.read_exact(&mut footer)?;

        if &footer[52..56] != MAGIC {
            return Err(corrupt(path, "invalid footer magic".to_string()));
        }
        let index_offset = le_u64(&footer, 0);
        let index_len = le_u64(&footer, 8);
        let bloom_offset = le_u64(&footer, 16);
        let bloom_len = le_u64(&footer, 24);
        let entry_count = le_u64(&footer, 32);
        let covers_through = le_u64(&footer, 40);
        let meta_crc = le_u32(&footer, 48);

        let data_end = file_size - FOOTER_SIZE;
        let layout_ok = index_offset >= HEADER_SIZE
            && index_offset.checked_add(index_len) == Some(bloom_offset)
            && bloom_offset.checked_add(bloom_len) == Some(data_end);
        if !layout_ok {
            return Err(corrupt(path, "footer offsets out of bounds".to_string()));
        }

        // Index + bloom are contiguous
        let mut meta = vec![0u8; (index_len + bloom_len) as usize];
        file.seek(SeekFrom::Start(index_offset))?;
        file.read_exact(&mut meta)?;
        if crc32fast::hash(&meta) != meta_crc {
            return Err(corrupt(path, "index checksum mismatch".to_string()));
        }

        let (index_bytes, bloom_bytes) = meta.split_at(index_len as usize);
        let (min_key, index) = parse_index(index_bytes, index_offset)
            .ok_or_else(|| corrupt(path, "malformed index block".to_string()))?;
        let bloom = BloomFilter::decode(bloom_bytes);

        Ok(Self {
            id,
            path: path.to_path_buf(),
            file: Mutex::new(file),
            index,
            bloom,
            min_key,
            entry_count,
            covers_through,
            file_size,
            cache,
        })
    }

    /// Point lookup
    ///
    /// Returns:
    /// - `Ok(Some(Value(v)))`: key found with value
    /// - `Ok(Some(Tombstone))`: key deleted in this table
    /// - `Ok(None)`: key not in this table
    pub fn get(&self, key: &[u8]) -> EngineResult<Option<MemTableEntry>> {
        if !self.might_contain(key) {
            return Ok(None);
        }

        let idx = self.index.partition_point(|h| h.last_key.as_slice() < key);
        if idx >= self.index.len() {
            return Ok(None);
        }

        let block = self.load_block(idx)?;
        Ok(block.get(key).map(|e| match &e.value {
            Some(v) => MemTableEntry::Value(v.to_vec()),
            None => MemTableEntry::Tombstone,
        }))
    }

    /// False only if the key is definitely not in this table
    ///
    /// Range check against [min_key, max_key], then the bloom filter.
    pub fn might_contain(&self, key: &[u8]) -> bool {
        let in_range = match self.max_key() {
            Some(max) => key >= self.min_key.as_slice() && key <= max,
            None => false, // Empty SSTable
        };
        in_range && self.bloom.as_ref().map_or(true, |b| b.may_contain(key))
    }

    /// Iterate over entries in `[start, end)`; tombstones included
    pub fn scan(self: &Arc<Self>, start: Option<&[u8]>, end: Option<&[u8]>) -> SSTableIterator {
        SSTableIterator::new(Arc::clone(self), start, end)
    }

    /// Iterate over all entries (for compaction, debugging)
    pub fn iter(self: &Arc<Self>) -> SSTableIterator {
        self.scan(None, None)
    }

    /// Get the minimum key in this SSTable
    pub fn min_key(&self) -> Option<&[u8]> {
        self.max_key().map(|_| self.min_key.as_slice())
    }

    /// Get the maximum key in this SSTable
    pub fn max_key(&self) -> Option<&[u8]> {
        self.index.last().map(|h| h.last_key.as_slice())
    }

    /// Number of entries (tombstones included)
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Number of data blocks
    pub fn block_count(&self) -> usize {
        self.index.len()
    }

    /// True if the table carries a bloom filter
    pub fn has_bloom_filter(&self) -> bool {
        self.bloom.is_some()
    }

    /// Table id (also the block cache namespace)
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Path of the SSTable file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File size in bytes
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Highest table id merged into this one (0 if not a compaction output)
    pub fn covers_through(&self) -> u64 {
        self.covers_through
    }

    pub(super) fn block_handles(&self) -> &[BlockHandle] {
        &self.index
    }

    /// Fetch a data block through the cache
    pub(super) fn load_block(&self, idx: usize) -> EngineResult<Arc<Block>> {
        let handle = &self.index[idx];
        self.cache
            .get_or_load((self.id, handle.offset), || self.read_block(handle))
    }

    fn read_block(&self, handle: &BlockHandle) -> EngineResult<Block> {
        let mut buf = vec![0u8; handle.len as usize];
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(handle.offset))?;
            file.read_exact(&mut buf)?;
        }

        if crc32fast::hash(&buf) != handle.crc {
            return Err(corrupt(
                &self.path,
                format!("block checksum mismatch at offset {}", handle.offset),
            ));
        }
        Block::decode(Bytes::from(buf))
    }
}

/// Parse the index block: min key, then block handles
fn parse_index(data: &[u8], data_end: u64) -> Option<(Vec<u8>, Vec<BlockHandle>)> {
    let mut pos = 0usize;

    let min_len = le_u32_at(data, pos)? as usize;
    pos += 4;
    let min_key = data.get(pos..pos + min_len)?.to_vec();
    pos += min_len;

    let mut index = Vec::new();
    while pos < data.len() {
        let key_len = le_u32_at(data, pos)? as usize;
        let offset = u64::from_le_bytes(data.get(pos + 4..pos + 12)?.try_into().ok()?);
        let len = le_u32_at(data, pos + 12)?;
        let crc = le_u32_at(data, pos + 16)?;
        pos += 20;
        let last_key = data.get(pos..pos + key_len)?.to_vec();
        pos += key_len;

        if offset.checked_add(u64::from(len))? > data_end {
            return None;
        }
        index.push(BlockHandle {
            last_key,
            offset,
            len,
            crc,
        });
    }

    Some((min_key, index))
}

fn le_u32_at(data: &[u8], pos: usize) -> Option<u32> {
    Some(u32::from_le_bytes(data.get(pos..pos + 4)?.try_into().ok()?))
}

fn le_u64(buf: &[u8; FOOTER_SIZE as usize], pos: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[pos..pos + 8]);
    u64::from_le_bytes(b)
}

fn le_u32(buf: &[u8; FOOTER_SIZE as usize], pos: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[pos..pos + 4]);
    u32::from_le_bytes(b)
}

fn corrupt(path: &Path, reason: String) -> EngineError {
    EngineError::Storage(format!("corrupt SSTable {}: {}", path.display(), reason))
}
