//! `ArborDB` Query Execution
//!
//! A pull-based execution engine: immutable [`Operator`](exec::Operator)
//! plans instantiate trees of stateful [`Cursor`](exec::Cursor)s that pull
//! rows from ordered index storage on demand.
//!
//! # Overview
//!
//! - [`exec::Row`] / [`exec::RowType`]: shared, immutable tuples
//! - [`exec::QueryBindings`]: parameter and correlation environment
//! - [`exec::QueryContext`]: per-execution session, cancellation and config
//! - [`exec::Operator`]: plan nodes (index scan, select, project, partial
//!   aggregation, bounded sort, partitioned parallel map)
//! - [`exec::executor`]: entry points that drive both cursor protocols
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use arbordb_core::{Value, ValueType};
//! use arbordb_query::exec::{
//!     executor, EngineAdapter, Expression, Operator, QueryBindings, QueryContext, Row, RowType,
//! };
//! use arbordb_storage::backends::RedbEngine;
//!
//! let row_type = RowType::new(vec![ValueType::Int, ValueType::String]);
//! let rows = vec![
//!     Row::new(Arc::clone(&row_type), vec![Value::Int(1), Value::from("a")])?,
//!     Row::new(Arc::clone(&row_type), vec![Value::Int(2), Value::from("b")])?,
//! ];
//! let plan = Operator::select(
//!     Operator::values(row_type, rows)?,
//!     Expression::field(0).gt(Expression::literal(1i64)),
//! )?;
//!
//! let engine = Arc::new(RedbEngine::in_memory()?);
//! let ctx = QueryContext::new(EngineAdapter::new(engine));
//! let out = executor::execute(&plan, &ctx, QueryBindings::new())?;
//! assert_eq!(out.len(), 1);
//! assert_eq!(out[0].value(1), Some(&Value::from("b")));
//! # Ok::<(), arbordb_query::QueryError>(())
//! ```

// Deny unwrap in library code to ensure proper error handling
#![deny(clippy::unwrap_used)]

pub mod error;
pub mod exec;

pub use error::{QueryError, QueryResult};
