//! SSTable Iterator
//!
//! Ordered iteration over the entries of one SSTable within a key range.

use std::sync::Arc;

use bytes::Bytes;

use crate::error::EngineResult;

use super::{Block, SSTableReader};

/// Iterator over SSTable entries in sorted key order
///
/// Owns an `Arc` of its table, so it stays valid after the table is
/// dropped from the live set by a compaction.
pub struct SSTableIterator {
    table: Arc<SSTableReader>,
    /// Exclusive upper bound
    end: Option<Vec<u8>>,
    /// Index of the block being read (or the next to load)
    block_idx: usize,
    block: Option<Arc<Block>>,
    entry_idx: usize,
    /// Start key, consumed when the first block is positioned
    seek_key: Option<Vec<u8>>,
    done: bool,
}

impl SSTableIterator {
    pub(super) fn new(table: Arc<SSTableReader>, start: Option<&[u8]>, end: Option<&[u8]>) -> Self {
        // First block whose last key reaches the start key
        let block_idx = match start {
            Some(s) => table
                .block_handles()
                .partition_point(|h| h.last_key.as_slice() < s),
            None => 0,
        };

        Self {
            table,
            end: end.map(<[u8]>::to_vec),
            block_idx,
            block: None,
            entry_idx: 0,
            seek_key: start.map(<[u8]>::to_vec),
            done: false,
        }
    }

    /// Current block entry, cloned out so `self` can be mutated
    fn current(&self) -> Option<Option<(Bytes, Option<Bytes>)>> {
        self.block
            .as_ref()
            .map(|b| b.entry(self.entry_idx).map(|e| (e.key.clone(), e.value.clone())))
    }
}

impl Iterator for SSTableIterator {
    /// (key, Option<value>): None value means tombstone
    type Item = EngineResult<(Vec<u8>, Option<Vec<u8>>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }

            match self.current() {
                // No block loaded: load the next one
                None => {
                    if self.block_idx >= self.table.block_handles().len() {
                        self.done = true;
                        return None;
                    }
                    match self.table.load_block(self.block_idx) {
                        Ok(block) => {
                            self.entry_idx = match self.seek_key.take() {
                                Some(start) => block.seek(&start),
                                None => 0,
                            };
                            self.block = Some(block);
                        }
                        Err(e) => {
                            self.done = true;
                            return Some(Err(e));
                        }
                    }
                }
                // Block exhausted: move on
                Some(None) => {
                    self.block = None;
                    self.block_idx += 1;
                }
                Some(Some((key, value))) => {
                    self.entry_idx += 1;
                    if let Some(end) = &self.end {
                        if key.as_ref() >= end.as_slice() {
                            self.done = true;
                            return None;
                        }
                    }
                    return Some(Ok((key.to_vec(), value.map(|v| v.to_vec()))));
                }
            }
        }
    }
}
