//! WAL Reader
//!
//! Handles reading entries from the WAL file.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use crate::error::{EngineError, EngineResult};

use super::entry::decode_header;
use super::{WalEntry, HEADER_SIZE};

/// Outcome of reading one record
pub(super) enum Record {
    /// A valid entry
    Entry(WalEntry),
    /// Clean end of file on a record boundary
    End,
    /// The file ends in the middle of a record (partial write)
    Torn,
    /// A complete record whose checksum or body is invalid
    Corrupt(String),
}

/// Reads entries from the WAL file
pub struct WalReader {
    reader: BufReader<File>,
    /// Offset of the next unread record
    position: u64,
    file_len: u64,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> EngineResult<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        Ok(Self {
            reader: BufReader::new(file),
            position: 0,
            file_len,
        })
    }

    /// Read the next entry from the WAL
    ///
    /// Returns `Ok(None)` at a clean end of file. A torn or corrupt
    /// record is reported as `WalCorruption`.
    pub fn next_entry(&mut self) -> EngineResult<Option<WalEntry>> {
        match self.read_record()? {
            Record::Entry(entry) => Ok(Some(entry)),
            Record::End => Ok(None),
            Record::Torn => Err(EngineError::WalCorruption(format!(
                "partial record at offset {}",
                self.position
            ))),
            Record::Corrupt(reason) => Err(EngineError::WalCorruption(reason)),
        }
    }

    /// Iterate over all valid entries
    pub fn entries(self) -> WalIterator {
        WalIterator {
            reader: self,
            done: false,
        }
    }

    /// Offset just past the last record returned as valid
    pub fn position(&self) -> u64 {
        self.position
    }

    pub(super) fn read_record(&mut self) -> EngineResult<Record> {
        let remaining = self.file_len.saturating_sub(self.position);
        if remaining == 0 {
            return Ok(Record::End);
        }
        if remaining < HEADER_SIZE as u64 {
            return Ok(Record::Torn);
        }

        let mut header = [0u8; HEADER_SIZE];
        if let Err(e) = self.reader.read_exact(&mut header) {
            return match e.kind() {
                ErrorKind::UnexpectedEof => Ok(Record::Torn),
                _ => Err(e.into()),
            };
        }
        let (lsn, crc, len) = decode_header(&header);

        if (len as u64) > remaining - HEADER_SIZE as u64 {
            return Ok(Record::Torn);
        }

        let mut body = vec![0u8; len as usize];
        if let Err(e) = self.reader.read_exact(&mut body) {
            return match e.kind() {
                ErrorKind::UnexpectedEof => Ok(Record::Torn),
                _ => Err(e.into()),
            };
        }

        match WalEntry::from_parts(lsn, crc, &body) {
            Ok(entry) => {
                self.position += (HEADER_SIZE + body.len()) as u64;
                Ok(Record::Entry(entry))
            }
            Err(EngineError::WalCorruption(reason)) => Ok(Record::Corrupt(reason)),
            Err(e) => Err(e),
        }
    }
}

/// Iterator over WAL entries
///
/// Yields each valid entry, then at most one error for a torn or
/// corrupt record, then stops.
pub struct WalIterator {
    reader: WalReader,
    done: bool,
}

impl Iterator for WalIterator {
    type Item = EngineResult<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
