//! Data Block
//!
//! A decoded SSTable data block. Keys and values are slices of the
//! block's `Bytes`, so decoding does not copy entry data.

use bytes::Bytes;

use crate::error::{EngineError, EngineResult};

use super::TOMBSTONE_MARKER;

/// One entry of a data block; `value == None` is a tombstone
#[derive(Debug, Clone)]
pub struct BlockEntry {
    pub key: Bytes,
    pub value: Option<Bytes>,
}

/// Decoded, immutable data block
#[derive(Debug)]
pub struct Block {
    data: Bytes,
    entries: Vec<BlockEntry>,
}

impl Block {
    /// Parse `[KeyLen u32][ValLen u32][Key][Value]` entries
    pub fn decode(data: Bytes) -> EngineResult<Self> {
        let mut entries = Vec::new();
        let mut pos = 0usize;

        while pos < data.len() {
            let key_len = read_u32(&data, pos)? as usize;
            let val_len = read_u32(&data, pos + 4)?;
            pos += 8;

            let key_end = pos + key_len;
            if key_end > data.len() {
                return Err(corrupt("key overruns block"));
            }
            let key = data.slice(pos..key_end);
            pos = key_end;

            let value = if val_len == TOMBSTONE_MARKER {
                None
            } else {
                let val_end = pos + val_len as usize;
                if val_end > data.len() {
                    return Err(corrupt("value overruns block"));
                }
                let v = data.slice(pos..val_end);
                pos = val_end;
                Some(v)
            };

            entries.push(BlockEntry { key, value });
        }

        Ok(Self { data, entries })
    }

    /// Entry lookup by exact key
    pub fn get(&self, key: &[u8]) -> Option<&BlockEntry> {
        let idx = self.seek(key);
        self.entries.get(idx).filter(|e| e.key.as_ref() == key)
    }

    /// Index of the first entry with key >= `target`
    pub fn seek(&self, target: &[u8]) -> usize {
        self.entries.partition_point(|e| e.key.as_ref() < target)
    }

    /// Entry at position `idx`, if any
    pub fn entry(&self, idx: usize) -> Option<&BlockEntry> {
        self.entries.get(idx)
    }

    /// Number of entries in the block
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the block holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Approximate memory held, charged against the block cache
    pub fn charge(&self) -> usize {
        self.data.len() + self.entries.len() * std::mem::size_of::<BlockEntry>()
    }
}

/// Append one encoded entry to a block buffer
pub(crate) fn encode_entry(buf: &mut Vec<u8>, key: &[u8], value: Option<&[u8]>) {
    let val_len = match value {
        Some(v) => v.len() as u32,
        None => TOMBSTONE_MARKER,
    };
    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
    buf.extend_from_slice(&val_len.to_le_bytes());
    buf.extend_from_slice(key);
    if let Some(v) = value {
        buf.extend_from_slice(v);
    }
}

fn read_u32(data: &[u8], pos: usize) -> EngineResult<u32> {
    data.get(pos..pos + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| corrupt("truncated entry header"))
}

fn corrupt(reason: &str) -> EngineError {
    EngineError::Storage(format!("corrupt data block: {}", reason))
}
