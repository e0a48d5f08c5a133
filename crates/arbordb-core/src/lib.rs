//! `ArborDB` Core
//!
//! Shared building blocks for the `ArborDB` execution engine.
//!
//! # Overview
//!
//! - **Values**: the [`Value`] enum and its [`ValueType`] tags, the nullable
//!   scalars that flow through rows and key columns
//! - **Key encoding**: an order-preserving byte encoding for index keys, with
//!   support for descending columns ([`encoding`])
//! - **Index metadata**: [`IndexDef`] describes the physical layout of an
//!   index, including hierarchical-key columns and spatial composition
//!   ([`index`])
//!
//! # Example
//!
//! ```
//! use arbordb_core::{IndexBuilder, Value, ValueType};
//!
//! let index = IndexBuilder::new("orders", "by_customer")
//!     .column("customer_id", ValueType::Int)
//!     .descending_column("placed_at", ValueType::Int)
//!     .hkey_column("order_id", ValueType::Int)
//!     .build()
//!     .unwrap();
//!
//! let row = vec![Value::Int(7), Value::Int(1_700_000_000), Value::Int(42)];
//! let key = index.encode_key(&row).unwrap();
//! assert_eq!(
//!     index.decode_key(&key).unwrap(),
//!     row
//! );
//! ```

// Deny unwrap in library code to ensure proper error handling
#![deny(clippy::unwrap_used)]

pub mod encoding;
pub mod error;
pub mod index;
pub mod types;

pub use error::{CoreError, CoreResult};
pub use index::{ColumnKind, IndexBuilder, IndexColumn, IndexDef, Space, SpatialLayout};
pub use types::{Value, ValueType};
