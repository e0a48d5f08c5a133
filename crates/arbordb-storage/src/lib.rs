//! `ArborDB` Storage
//!
//! The ordered, transactional key-value layer underneath query execution.
//!
//! # Core Traits
//!
//! - [`StorageEngine`] - entry point; begins read and write transactions
//! - [`Transaction`] - point reads and writes plus the batched [`Transaction::scan`]
//!   primitive used by index traversals
//! - [`Cursor`] - positioned traversal that steps forward and backward
//!
//! Keys within a logical table are ordered bytewise. A scan is bounded by a
//! [`KeyRange`], runs in a [`Direction`], and can resume strictly after the
//! last key it returned, which lets callers page through a range without
//! holding a borrow of the transaction.
//!
//! # Example
//!
//! ```
//! use arbordb_storage::backends::RedbEngine;
//! use arbordb_storage::{Direction, KeyRange, StorageEngine, Transaction};
//!
//! let engine = RedbEngine::in_memory()?;
//!
//! let mut tx = engine.begin_write()?;
//! tx.put("users", b"user:1", b"Alice")?;
//! tx.put("users", b"user:2", b"Bob")?;
//! tx.commit()?;
//!
//! let tx = engine.begin_read()?;
//! let newest = tx.scan("users", &KeyRange::all(), None, Direction::Backward, 1)?;
//! assert_eq!(newest, vec![(b"user:2".to_vec(), b"Bob".to_vec())]);
//! # Ok::<(), arbordb_storage::StorageError>(())
//! ```

// Deny unwrap in library code to ensure proper error handling
#![deny(clippy::unwrap_used)]

pub mod backends;
pub mod engine;

pub use engine::{
    Cursor, CursorResult, Direction, KeyRange, KeyValue, StorageEngine, StorageError,
    StorageResult, Transaction,
};
