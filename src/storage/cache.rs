//! Block Cache
//!
//! Byte-bounded LRU cache of decoded SSTable data blocks, shared by
//! every reader of a store. Keeps repeated point lookups and scans over
//! hot key ranges off the disk.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::EngineResult;

use super::sstable::Block;

/// Cache key: (SSTable id, block offset)
pub type BlockKey = (u64, u64);

/// Snapshot of cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub used_bytes: usize,
    pub capacity: usize,
}

struct CacheEntry {
    block: Arc<Block>,
    charge: usize,
    /// Position in the recency order
    tick: u64,
}

#[derive(Default)]
struct CacheState {
    map: HashMap<BlockKey, CacheEntry>,
    /// tick → key, oldest first
    recency: BTreeMap<u64, BlockKey>,
    next_tick: u64,
    used: usize,
    /// Tables removed by compaction; their blocks are never cached again
    retired: HashSet<u64>,
}

/// LRU block cache with a byte capacity
pub struct BlockCache {
    capacity: usize,
    state: Mutex<CacheState>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl BlockCache {
    /// Create a cache holding at most `capacity` bytes of blocks
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(CacheState::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// A cache that never retains anything
    pub fn disabled() -> Self {
        Self::new(0)
    }

    /// Look up a block, refreshing its recency
    pub fn get(&self, key: BlockKey) -> Option<Arc<Block>> {
        let mut state = self.state.lock();
        let tick = state.next_tick;

        let found = match state.map.get_mut(&key) {
            Some(entry) => {
                let old_tick = entry.tick;
                entry.tick = tick;
                Some((old_tick, Arc::clone(&entry.block)))
            }
            None => None,
        };

        match found {
            Some((old_tick, block)) => {
                state.recency.remove(&old_tick);
                state.recency.insert(tick, key);
                state.next_tick += 1;
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(block)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert a block, evicting least recently used blocks over capacity
    ///
    /// A block larger than the whole cache, or one from a retired
    /// table, is not retained.
    pub fn insert(&self, key: BlockKey, block: Arc<Block>) {
        let charge = block.charge();
        if charge > self.capacity {
            return;
        }

        let mut state = self.state.lock();
        if state.retired.contains(&key.0) {
            return;
        }
        if let Some(old) = state.map.remove(&key) {
            state.recency.remove(&old.tick);
            state.used -= old.charge;
        }

        let tick = state.next_tick;
        state.next_tick += 1;
        state.recency.insert(tick, key);
        state.map.insert(key, CacheEntry { block, charge, tick });
        state.used += charge;

        while state.used > self.capacity {
            let Some((_, victim)) = state.recency.pop_first() else {
                break;
            };
            if let Some(evicted) = state.map.remove(&victim) {
                state.used -= evicted.charge;
            }
        }
    }

    /// Return the cached block or load, cache and return it
    pub fn get_or_load<F>(&self, key: BlockKey, load: F) -> EngineResult<Arc<Block>>
    where
        F: FnOnce() -> EngineResult<Block>,
    {
        if let Some(block) = self.get(key) {
            return Ok(block);
        }
        let block = Arc::new(load()?);
        self.insert(key, Arc::clone(&block));
        Ok(block)
    }

    /// Drop every block belonging to a table (after it is deleted)
    ///
    /// The table is retired: iterators still reading it load its blocks
    /// without putting them back in the cache.
    pub fn evict_table(&self, table_id: u64) {
        let mut state = self.state.lock();
        state.retired.insert(table_id);
        let victims: Vec<BlockKey> = state
            .map
            .keys()
            .filter(|(id, _)| *id == table_id)
            .copied()
            .collect();

        for key in victims {
            if let Some(entry) = state.map.remove(&key) {
                state.recency.remove(&entry.tick);
                state.used -= entry.charge;
            }
        }
    }

    /// Snapshot of the counters and current usage
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: state.map.len(),
            used_bytes: state.used,
            capacity: self.capacity,
        }
    }
}
