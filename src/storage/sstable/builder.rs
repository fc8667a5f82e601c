//! SSTable Builder
//!
//! Writes sorted key-value entries to a new SSTable file.
//!
//! The table is built under `<name>.tmp` and renamed into place only
//! after it is complete and synced, so a crash never leaves a partial
//! table under a name the storage manager will open.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{EngineError, EngineResult};
use crate::storage::bloom::BloomFilter;

use super::block::encode_entry;
use super::{
    BlockHandle, SSTable, DEFAULT_BLOCK_SIZE, DEFAULT_BLOOM_BITS_PER_KEY, HEADER_SIZE, MAGIC,
    VERSION,
};

/// Builder for creating new SSTables from sorted entries
pub struct SSTableBuilder {
    /// Final file path
    path: PathBuf,
    /// Path written to until `finish`
    temp_path: PathBuf,
    /// Buffered writer for performance
    writer: BufWriter<File>,
    block_size: usize,
    bloom_bits_per_key: usize,
    /// Encoded entries of the block being filled
    block_buf: Vec<u8>,
    /// Current write position
    current_offset: u64,
    /// One handle per finished data block
    index: Vec<BlockHandle>,
    /// Bloom hashes of every key added
    key_hashes: Vec<u32>,
    entry_count: u64,
    min_key: Option<Vec<u8>>,
    last_key: Option<Vec<u8>>,
    covers_through: u64,
}

impl SSTableBuilder {
    /// Create a builder with the default block size and bloom density
    pub fn new(path: &Path) -> EngineResult<Self> {
        Self::with_options(path, DEFAULT_BLOCK_SIZE, DEFAULT_BLOOM_BITS_PER_KEY)
    }

    /// Create a builder; `bloom_bits_per_key == 0` writes no filter
    ///
    /// Writes header immediately; call `add()`/`add_tombstone()` in
    /// strictly increasing key order, then `finish()`.
    pub fn with_options(path: &Path, block_size: usize, bloom_bits_per_key: usize) -> EngineResult<Self> {
        let temp_path = Self::temp_path(path);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)?;

        let mut writer = BufWriter::new(file);
        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;

        Ok(Self {
            path: path.to_path_buf(),
            temp_path,
            writer,
            block_size: block_size.max(1),
            bloom_bits_per_key,
            block_buf: Vec::with_capacity(block_size),
            current_offset: HEADER_SIZE,
            index: Vec::new(),
            key_hashes: Vec::new(),
            entry_count: 0,
            min_key: None,
            last_key: None,
            covers_through: 0,
        })
    }

    /// Where the table for `path` is written before it is complete
    pub fn temp_path(path: &Path) -> PathBuf {
        let mut name = OsString::from(path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Mark this table as the compaction output of tables up to `id`
    pub fn set_covers_through(&mut self, id: u64) {
        self.covers_through = id;
    }

    /// Add a key-value pair (must be called in sorted key order)
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> EngineResult<()> {
        self.write_entry(key, Some(value))
    }

    /// Add a tombstone (must be called in sorted key order)
    pub fn add_tombstone(&mut self, key: &[u8]) -> EngineResult<()> {
        self.write_entry(key, None)
    }

    /// Number of entries added so far
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Internal: write an entry (value=None means tombstone)
    fn write_entry(&mut self, key: &[u8], value: Option<&[u8]>) -> EngineResult<()> {
        if let Some(last) = &self.last_key {
            if key <= last.as_slice() {
                return Err(EngineError::Storage(
                    "SSTable keys must be added in strictly increasing order".to_string(),
                ));
            }
        }

        if self.min_key.is_none() {
            self.min_key = Some(key.to_vec());
        }
        self.last_key = Some(key.to_vec());

        encode_entry(&mut self.block_buf, key, value);
        self.key_hashes.push(BloomFilter::hash(key));
        self.entry_count += 1;

        if self.block_buf.len() >= self.block_size {
            self.finish_block()?;
        }
        Ok(())
    }

    /// Write the pending block and record its handle
    fn finish_block(&mut self) -> EngineResult<()> {
        if self.block_buf.is_empty() {
            return Ok(());
        }

        let len = u32::try_from(self.block_buf.len())
            .map_err(|_| EngineError::Storage("data block exceeds 4 GiB".to_string()))?;
        let crc = crc32fast::hash(&self.block_buf);
        self.writer.write_all(&self.block_buf)?;

        self.index.push(BlockHandle {
            last_key: self.last_key.clone().unwrap_or_default(),
            offset: self.current_offset,
            len,
            crc,
        });
        self.current_offset += u64::from(len);
        self.block_buf.clear();
        Ok(())
    }

    /// Finish building: write index, bloom filter, footer; return metadata
    pub fn finish(mut self) -> EngineResult<SSTable> {
        self.finish_block()?;

        // Index block
        let mut index_bytes = Vec::new();
        let min_key = self.min_key.clone().unwrap_or_default();
        index_bytes.extend_from_slice(&(min_key.len() as u32).to_le_bytes());
        index_bytes.extend_from_slice(&min_key);
        for handle in &self.index {
            index_bytes.extend_from_slice(&(handle.last_key.len() as u32).to_le_bytes());
            index_bytes.extend_from_slice(&handle.offset.to_le_bytes());
            index_bytes.extend_from_slice(&handle.len.to_le_bytes());
            index_bytes.extend_from_slice(&handle.crc.to_le_bytes());
            index_bytes.extend_from_slice(&handle.last_key);
        }
        let index_offset = self.current_offset;
        self.writer.write_all(&index_bytes)?;

        // Bloom filter block
        let bloom_bytes = if self.bloom_bits_per_key > 0 {
            BloomFilter::from_hashes(&self.key_hashes, self.bloom_bits_per_key).encode()
        } else {
            Vec::new()
        };
        let bloom_offset = index_offset + index_bytes.len() as u64;
        self.writer.write_all(&bloom_bytes)?;

        let mut meta_hasher = crc32fast::Hasher::new();
        meta_hasher.update(&index_bytes);
        meta_hasher.update(&bloom_bytes);
        let meta_crc = meta_hasher.finalize();

        // Footer
        self.writer.write_all(&index_offset.to_le_bytes())?;
        self.writer.write_all(&(index_bytes.len() as u64).to_le_bytes())?;
        self.writer.write_all(&bloom_offset.to_le_bytes())?;
        self.writer.write_all(&(bloom_bytes.len() as u64).to_le_bytes())?;
        self.writer.write_all(&self.entry_count.to_le_bytes())?;
        self.writer.write_all(&self.covers_through.to_le_bytes())?;
        self.writer.write_all(&meta_crc.to_le_bytes())?;
        self.writer.write_all(MAGIC)?;

        self.writer.flush()?;
        let file = self.writer.into_inner().map_err(|e| {
            EngineError::Storage(format!("Failed to flush SSTable: {}", e))
        })?;
        file.sync_all()?;
        let file_size = file.metadata()?.len();
        drop(file);

        fs::rename(&self.temp_path, &self.path)?;
        sync_parent_dir(&self.path)?;

        Ok(SSTable {
            path: self.path,
            entry_count: self.entry_count,
            max_key: self.last_key.unwrap_or_default(),
            min_key,
            block_count: self.index.len(),
            covers_through: self.covers_through,
            file_size,
        })
    }
}

/// Make a rename in the table's directory durable
#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> EngineResult<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> EngineResult<()> {
    Ok(())
}
