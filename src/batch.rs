//! Batch Accumulator
//!
//! Collects puts and deletes for one atomic commit.
//!
//! ## Lifecycle
//! `open → (adding operations) → committed | discarded`
//!
//! - `put`/`delete` take `&self` and may be called from several threads
//!   at once; one mutex guards both the operation list and the recorded
//!   error, so they never disagree
//! - The first size violation poisons the batch: later adds are ignored
//!   and the commit returns that error without writing anything
//! - A batch is consumed by [`Store::commit_batch`](crate::Store::commit_batch);
//!   dropping it uncommitted discards it

use parking_lot::Mutex;

use crate::error::{Result, StoreError};
use crate::store::{check_key, check_sizes};
use crate::wal::Operation;

#[derive(Default)]
struct BatchState {
    operations: Vec<Operation>,
    /// First validation failure; set at most once
    error: Option<StoreError>,
}

/// Pending writes bound to the store that created them
pub struct Batch {
    store_id: u64,
    state: Mutex<BatchState>,
}

impl Batch {
    /// Empty batch owned by store `store_id`
    pub(crate) fn new(store_id: u64) -> Self {
        Self {
            store_id,
            state: Mutex::new(BatchState::default()),
        }
    }

    /// Queue a put; a no-op once the batch is poisoned
    pub fn put(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) {
        let (key, value) = (key.as_ref(), value.as_ref());
        let mut state = self.state.lock();
        if state.error.is_some() {
            return;
        }
        if let Err(e) = check_sizes(key, value) {
            state.error = Some(e);
            return;
        }
        state.operations.push(Operation::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        });
    }

    /// Queue a delete; a no-op once the batch is poisoned
    pub fn delete(&self, key: impl AsRef<[u8]>) {
        let key = key.as_ref();
        let mut state = self.state.lock();
        if state.error.is_some() {
            return;
        }
        if let Err(e) = check_key(key) {
            state.error = Some(e);
            return;
        }
        state.operations.push(Operation::Delete { key: key.to_vec() });
    }

    /// Number of queued operations
    pub fn len(&self) -> usize {
        self.state.lock().operations.len()
    }

    /// True if nothing is queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once a size violation has been recorded
    pub fn is_poisoned(&self) -> bool {
        self.state.lock().error.is_some()
    }

    /// Id of the store that created this batch
    pub fn store_id(&self) -> u64 {
        self.store_id
    }

    /// Consume the batch: its operations, or its recorded error
    pub(crate) fn into_operations(self) -> Result<Vec<Operation>> {
        let state = self.state.into_inner();
        match state.error {
            Some(e) => Err(e),
            None => Ok(state.operations),
        }
    }
}

impl std::fmt::Debug for Batch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Batch")
            .field("store_id", &self.store_id)
            .field("operations", &state.operations.len())
            .field("poisoned", &state.error.is_some())
            .finish()
    }
}
