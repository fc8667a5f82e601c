//! WAL Entry definitions
//!
//! Defines the structure of individual WAL records.
//!
//! A record is `[LSN (8)][CRC (4)][Len (4)][body]`. The body is the
//! bincode encoding of the timestamp and the operation list; the CRC
//! covers the LSN, the length and the body, so a flipped bit anywhere in
//! the record is detected.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Size of the fixed record header: LSN (8) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 16;

/// A single entry in the WAL
///
/// An entry carries one or more operations. A batch commit is written
/// as one entry, so it is replayed either completely or not at all.
#[derive(Debug, Clone, PartialEq)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,

    /// The operations to apply, in order
    pub operations: Vec<Operation>,

    /// Timestamp (unix millis) when entry was created
    pub timestamp: u64,
}

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Put a key-value pair
    Put { key: Vec<u8>, value: Vec<u8> },

    /// Delete a key
    Delete { key: Vec<u8> },
}

impl Operation {
    /// The key this operation touches
    pub fn key(&self) -> &[u8] {
        match self {
            Operation::Put { key, .. } | Operation::Delete { key } => key,
        }
    }
}

/// Borrowed body used when encoding (bincode encodes slices like Vecs)
#[derive(Serialize)]
struct BodyRef<'a> {
    timestamp: u64,
    operations: &'a [Operation],
}

/// Owned body used when decoding
#[derive(Deserialize)]
struct Body {
    timestamp: u64,
    operations: Vec<Operation>,
}

impl WalEntry {
    /// Create an entry holding a single operation
    pub fn new(lsn: u64, operation: Operation) -> Self {
        Self::batch(lsn, vec![operation])
    }

    /// Create an entry holding several operations applied atomically
    pub fn batch(lsn: u64, operations: Vec<Operation>) -> Self {
        Self {
            lsn,
            operations,
            timestamp: now_millis(),
        }
    }

    /// Encode the full record (header + body)
    pub fn serialize(&self) -> EngineResult<Vec<u8>> {
        Self::encode_record(self.lsn, self.timestamp, &self.operations)
    }

    /// Encode a record straight from borrowed operations
    pub(super) fn encode_record(lsn: u64, timestamp: u64, operations: &[Operation]) -> EngineResult<Vec<u8>> {
        let body = bincode::serialize(&BodyRef {
            timestamp,
            operations,
        })?;
        let len = u32::try_from(body.len()).map_err(|_| {
            EngineError::Serialization(format!("WAL entry too large: {} bytes", body.len()))
        })?;
        let crc = checksum(lsn, len, &body);

        let mut bytes = Vec::with_capacity(HEADER_SIZE + body.len());
        bytes.extend_from_slice(&lsn.to_le_bytes());
        bytes.extend_from_slice(&crc.to_le_bytes());
        bytes.extend_from_slice(&len.to_le_bytes());
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    /// Decode a complete record, verifying its checksum
    pub fn deserialize(bytes: &[u8]) -> EngineResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(EngineError::WalCorruption(format!(
                "record shorter than header: {} bytes",
                bytes.len()
            )));
        }

        let header: &[u8; HEADER_SIZE] = bytes[..HEADER_SIZE]
            .try_into()
            .map_err(|_| EngineError::WalCorruption("bad header slice".into()))?;
        let (lsn, crc, len) = decode_header(header);

        let body = &bytes[HEADER_SIZE..];
        if body.len() != len as usize {
            return Err(EngineError::WalCorruption(format!(
                "record length mismatch: header says {}, found {}",
                len,
                body.len()
            )));
        }

        Self::from_parts(lsn, crc, body)
    }

    /// Number of bytes `serialize` will produce
    pub fn serialized_size(&self) -> EngineResult<usize> {
        let body_len = bincode::serialized_size(&self.body_ref())?;
        Ok(HEADER_SIZE + body_len as usize)
    }

    /// CRC32 over LSN, body length and body
    pub fn compute_crc(&self) -> EngineResult<u32> {
        let body = self.encode_body()?;
        Ok(checksum(self.lsn, body.len() as u32, &body))
    }

    /// Rebuild an entry from a decoded header and its body bytes
    pub(super) fn from_parts(lsn: u64, crc: u32, body: &[u8]) -> EngineResult<Self> {
        let actual = checksum(lsn, body.len() as u32, body);
        if actual != crc {
            return Err(EngineError::WalCorruption(format!(
                "CRC mismatch at LSN {}: expected {:#010x}, got {:#010x}",
                lsn, crc, actual
            )));
        }

        let decoded: Body = bincode::deserialize(body)
            .map_err(|e| EngineError::WalCorruption(format!("undecodable body at LSN {}: {}", lsn, e)))?;

        Ok(Self {
            lsn,
            operations: decoded.operations,
            timestamp: decoded.timestamp,
        })
    }

    fn body_ref(&self) -> BodyRef<'_> {
        BodyRef {
            timestamp: self.timestamp,
            operations: &self.operations,
        }
    }

    fn encode_body(&self) -> EngineResult<Vec<u8>> {
        Ok(bincode::serialize(&self.body_ref())?)
    }
}

/// Current unix time in milliseconds
pub(super) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Split a header into (lsn, crc, body length)
pub(super) fn decode_header(header: &[u8; HEADER_SIZE]) -> (u64, u32, u32) {
    let mut lsn = [0u8; 8];
    let mut crc = [0u8; 4];
    let mut len = [0u8; 4];
    lsn.copy_from_slice(&header[0..8]);
    crc.copy_from_slice(&header[8..12]);
    len.copy_from_slice(&header[12..16]);
    (
        u64::from_le_bytes(lsn),
        u32::from_le_bytes(crc),
        u32::from_le_bytes(len),
    )
}

fn checksum(lsn: u64, len: u32, body: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&lsn.to_le_bytes());
    hasher.update(&len.to_le_bytes());
    hasher.update(body);
    hasher.finalize()
}
