//! Scoped Iterator
//!
//! Single-pass cursor returned by [`Store::range_scan`](crate::Store::range_scan)
//! and [`Store::prefix_scan`](crate::Store::prefix_scan).
//!
//! ```text
//! let mut it = store.prefix_scan("order:")?;
//! while it.next()? {
//!     handle(it.key()?, it.value()?);
//! }
//! it.close()?;
//! ```
//!
//! Using the cursor after `close` returns [`StoreError::IteratorClosed`].
//! Dropping it without `close` still releases the snapshot, but any
//! error met during traversal is then lost.

use crate::engine::EngineIterator;
use crate::error::{Result, StoreError};

/// Cursor over a point-in-time view of a key range
pub struct ScanIterator {
    /// `None` once closed
    inner: Option<EngineIterator>,
    current: Option<(Vec<u8>, Vec<u8>)>,
    /// Names the scan in wrapped engine errors
    context: String,
}

impl ScanIterator {
    /// Wrap an engine cursor; `context` names the scan in errors
    pub(crate) fn new(inner: EngineIterator, context: String) -> Self {
        Self {
            inner: Some(inner),
            current: None,
            context,
        }
    }

    /// Advance; `Ok(false)` when the range is exhausted
    ///
    /// A storage failure also ends the range; `close` reports it.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<bool> {
        let inner = self.inner.as_mut().ok_or(StoreError::IteratorClosed)?;
        self.current = inner.next();
        Ok(self.current.is_some())
    }

    /// Key of the current entry
    pub fn key(&self) -> Result<&[u8]> {
        self.entry().map(|(k, _)| k.as_slice())
    }

    /// Value of the current entry
    pub fn value(&self) -> Result<&[u8]> {
        self.entry().map(|(_, v)| v.as_slice())
    }

    /// Release the snapshot and report any error met while iterating
    ///
    /// Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        let Some(mut inner) = self.inner.take() else {
            return Ok(());
        };
        self.current = None;

        let error = inner.take_error();
        drop(inner);

        match error {
            Some(e) => Err(StoreError::engine(self.context.clone(), e)),
            None => Ok(()),
        }
    }

    /// True after `close`
    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Drain the remaining entries, then close
    pub fn collect_remaining(mut self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut entries = Vec::new();
        while self.next()? {
            if let Some(entry) = self.current.take() {
                entries.push(entry);
            }
        }
        self.close()?;
        Ok(entries)
    }

    fn entry(&self) -> Result<&(Vec<u8>, Vec<u8>)> {
        if self.inner.is_none() {
            return Err(StoreError::IteratorClosed);
        }
        self.current.as_ref().ok_or(StoreError::IteratorNotPositioned)
    }
}

impl std::fmt::Debug for ScanIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanIterator")
            .field("context", &self.context)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Smallest key greater than every key starting with `prefix`
///
/// Trailing `0xFF` bytes cannot be incremented and are dropped; `None`
/// means no upper bound (empty or all-`0xFF` prefix).
pub fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xFF {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}
