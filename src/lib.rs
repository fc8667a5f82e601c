//! # tradestore
//!
//! An embedded, durable, ordered key-value store with:
//! - Size-checked point reads and writes
//! - Atomic multi-operation batches
//! - Snapshot range and prefix scans in byte order
//! - Write-Ahead Logging (WAL) and crash recovery
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Store                                │
//! │        (size checks, batches, iterators, error mapping)      │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                        Engine                                │
//! │            (Single Writer / Multi Reader)                    │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │     WAL     │          │  MemTable   │
//!   │  (Append)   │          │  (RwLock)   │
//!   └─────────────┘          └──────┬──────┘
//!                                   │
//!                                   ▼
//!                           ┌─────────────┐
//!                           │   Storage   │
//!                           │  (SSTables, │
//!                           │ block cache)│
//!                           └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use tradestore::Store;
//!
//! # fn main() -> tradestore::Result<()> {
//! let store = Store::open("/tmp/tradingstore")?;
//! store.put("order:1", b"BUY 10 AAPL")?;
//!
//! let batch = store.begin_batch();
//! batch.put("order:2", b"SELL 5 MSFT");
//! batch.delete("order:1");
//! store.commit_batch(batch)?;
//!
//! let mut it = store.prefix_scan("order:")?;
//! while it.next()? {
//!     println!("{}", String::from_utf8_lossy(it.key()?));
//! }
//! it.close()?;
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod wal;
pub mod memtable;
pub mod storage;
pub mod engine;

pub mod batch;
pub mod iterator;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{EngineError, Result, StoreError};
pub use config::{Config, WalSyncStrategy};
pub use engine::Engine;
pub use batch::Batch;
pub use iterator::{prefix_successor, ScanIterator};
pub use store::{Store, StoreStats, MAX_KEY_SIZE, MAX_VALUE_SIZE};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of tradestore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
