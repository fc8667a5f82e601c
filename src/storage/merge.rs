//! Merge Iterator
//!
//! Combines several sorted entry sources into one sorted stream. Sources
//! are ordered newest first; when several hold the same key, the newest
//! version wins and the older ones are skipped.

use crate::error::{EngineError, EngineResult};

/// (key, Option<value>): None value means tombstone
pub type KvEntry = (Vec<u8>, Option<Vec<u8>>);

/// A sorted, duplicate-free stream of entries
pub type EntrySource = Box<dyn Iterator<Item = EngineResult<KvEntry>> + Send>;

/// K-way merge over sorted sources
///
/// The first source error ends the stream: it is yielded once, then
/// the iterator is exhausted.
pub struct MergeIterator {
    sources: Vec<EntrySource>,
    /// Next unconsumed entry of each source
    heads: Vec<Option<KvEntry>>,
    pending_error: Option<EngineError>,
    done: bool,
}

impl MergeIterator {
    /// `sources[0]` is the newest
    pub fn new(sources: Vec<EntrySource>) -> Self {
        let mut merge = Self {
            heads: vec![None; sources.len()],
            sources,
            pending_error: None,
            done: false,
        };
        for i in 0..merge.sources.len() {
            merge.pull(i);
        }
        merge
    }

    /// Refill the head of source `i`
    fn pull(&mut self, i: usize) {
        if self.pending_error.is_some() {
            self.heads[i] = None;
            return;
        }
        self.heads[i] = match self.sources[i].next() {
            Some(Ok(entry)) => Some(entry),
            Some(Err(e)) => {
                self.pending_error = Some(e);
                None
            }
            None => None,
        };
    }

    /// Index of the source holding the smallest key (newest on ties)
    fn winner(&self) -> Option<usize> {
        let mut winner: Option<usize> = None;
        for (i, head) in self.heads.iter().enumerate() {
            let Some((key, _)) = head else { continue };
            let better = match winner.and_then(|w| self.heads[w].as_ref()) {
                Some((best, _)) => key < best,
                None => true,
            };
            if better {
                winner = Some(i);
            }
        }
        winner
    }
}

impl Iterator for MergeIterator {
    type Item = EngineResult<KvEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(e) = self.pending_error.take() {
            self.done = true;
            return Some(Err(e));
        }

        let Some(w) = self.winner() else {
            self.done = true;
            return None;
        };
        let entry = self.heads[w].take()?;

        // Skip older versions of the same key
        for i in 0..self.heads.len() {
            let shadowed = matches!(&self.heads[i], Some((k, _)) if *k == entry.0);
            if shadowed {
                self.pull(i);
            }
        }
        self.pull(w);

        Some(Ok(entry))
    }
}
