//! Redb storage backend.
//!
//! Redb is a pure-Rust embedded database with ACID transactions. All logical
//! tables share one physical table; see [`tables`] for the key layout.

mod engine;
pub mod tables;
mod transaction;

pub use engine::{RedbConfig, RedbEngine};
pub use transaction::{RedbCursor, RedbTransaction};
