//! Error types for tradestore
//!
//! Two layers:
//! - [`EngineError`]: failures raised inside the storage engine (I/O,
//!   WAL/SSTable corruption, serialization)
//! - [`StoreError`]: the public error taxonomy of the [`Store`](crate::Store)
//!   contract; engine failures reach callers wrapped with the name of
//!   the operation that hit them

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Result type alias for engine internals
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Public error type for Store operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // Lookup
    // -------------------------------------------------------------------------
    #[error("key not found")]
    NotFound,

    // -------------------------------------------------------------------------
    // Size Limits (checked before any engine access)
    // -------------------------------------------------------------------------
    #[error("key too large: {size} bytes (max {max})")]
    KeyTooLarge { size: usize, max: usize },

    #[error("value too large: {size} bytes (max {max})")]
    ValueTooLarge { size: usize, max: usize },

    // -------------------------------------------------------------------------
    // Engine Failures
    // -------------------------------------------------------------------------
    #[error("engine error during {context}: {source}")]
    Engine {
        context: String,
        #[source]
        source: EngineError,
    },

    // -------------------------------------------------------------------------
    // Contract Violations
    // -------------------------------------------------------------------------
    #[error("batch belongs to store #{batch_store}, cannot commit on store #{store}")]
    BatchOwnership { batch_store: u64, store: u64 },

    #[error("iterator is closed")]
    IteratorClosed,

    #[error("iterator is not positioned on an entry")]
    IteratorNotPositioned,
}

impl StoreError {
    /// Wrap an engine failure with the operation that produced it
    pub fn engine(context: impl Into<String>, source: EngineError) -> Self {
        StoreError::Engine {
            context: context.into(),
            source,
        }
    }

    /// True for `NotFound`, so callers can branch without matching
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }
}

/// Error type for storage engine internals
#[derive(Debug, Error)]
pub enum EngineError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // WAL Errors
    // -------------------------------------------------------------------------
    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for EngineError {
    fn from(e: bincode::Error) -> Self {
        EngineError::Serialization(e.to_string())
    }
}
