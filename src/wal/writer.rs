//! WAL Writer
//!
//! Handles appending entries to the WAL file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::WalSyncStrategy;
use crate::error::{EngineError, EngineResult};

use super::entry::now_millis;
use super::{Operation, WalEntry, WalRecovery};

/// Writes entries to the WAL file
///
/// The file never keeps bytes past the last acknowledged record: a
/// failed append is cut off before the error is returned, so a later
/// record is never written behind a torn one.
pub struct WalWriter {
    path: PathBuf,
    file: File,
    /// End of the last acknowledged record
    len: u64,
    /// Set when a failed append could not be cut off; appends are refused
    failed: bool,
    /// LSN the next appended entry will receive
    next_lsn: u64,
    sync_strategy: WalSyncStrategy,
    /// Entries written since the last fsync
    unsynced: usize,
}

impl WalWriter {
    /// Open or create a WAL file
    ///
    /// LSNs continue after the last valid entry already in the file. A
    /// torn tail is cut off so new records follow the last valid one.
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> EngineResult<Self> {
        let existing = path.exists() && std::fs::metadata(path)?.len() > 0;
        let (last_lsn, valid_len) = if existing {
            let (result, valid_len) = WalRecovery::valid_prefix(path)?;
            (result.last_lsn, valid_len)
        } else {
            (0, 0)
        };

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        if file.metadata()?.len() > valid_len {
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
            len: valid_len,
            failed: false,
            next_lsn: last_lsn + 1,
            sync_strategy,
            unsynced: 0,
        })
    }

    /// Append a single operation; returns its LSN
    pub fn append(&mut self, operation: Operation) -> EngineResult<u64> {
        self.append_batch(std::slice::from_ref(&operation))
    }

    /// Append several operations as one atomic record; returns its LSN
    pub fn append_batch(&mut self, operations: &[Operation]) -> EngineResult<u64> {
        if self.failed {
            return Err(EngineError::WalCorruption(format!(
                "{} has an unremovable partial record; writer disabled",
                self.path.display()
            )));
        }

        let lsn = self.next_lsn;
        let bytes = WalEntry::encode_record(lsn, now_millis(), operations)?;

        // Bytes past `len` are left over from a failed write
        if self.file.metadata()?.len() > self.len {
            self.rollback()?;
        }

        let should_sync = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => self.unsynced + 1 >= count,
        };

        // One write per record so a crash can only tear the tail
        let mut written = self.file.write_all(&bytes).map_err(EngineError::from);
        if written.is_ok() && should_sync {
            written = self.sync();
        }
        if let Err(e) = written {
            self.rollback()?;
            return Err(e);
        }

        self.len += bytes.len() as u64;
        self.next_lsn += 1;
        if !should_sync {
            self.unsynced += 1;
        }

        Ok(lsn)
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> EngineResult<()> {
        self.file.flush()?;
        self.file.sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Discard all entries (after their data is durable elsewhere)
    ///
    /// The next entry gets LSN 1 again, as it would after reopening an
    /// empty log.
    pub fn truncate(&mut self) -> EngineResult<()> {
        self.file.set_len(0)?;
        self.file.sync_all()?;
        self.len = 0;
        self.failed = false;
        self.next_lsn = 1;
        self.unsynced = 0;
        Ok(())
    }

    /// Entries written since the last fsync
    pub fn uncommitted_count(&self) -> usize {
        self.unsynced
    }

    /// Get the LSN the next entry will receive
    pub fn current_lsn(&self) -> u64 {
        self.next_lsn
    }

    /// Byte length of the acknowledged records
    pub fn len(&self) -> u64 {
        self.len
    }

    /// True if no record has been acknowledged since open or truncate
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get the WAL file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cut the file back to the last acknowledged record
    fn rollback(&mut self) -> EngineResult<()> {
        if let Err(e) = self.file.set_len(self.len) {
            self.failed = true;
            return Err(e.into());
        }
        Ok(())
    }
}
