//! Query execution.
//!
//! Plans are trees of [`Operator`]s, built once and never mutated. Running a
//! plan instantiates a matching tree of [`Cursor`]s through
//! [`Operator::cursor`]; rows are pulled from the root one `next()` at a
//! time.
//!
//! # Architecture
//!
//! - [`row`]: shared rows and their row types
//! - [`bindings`]: parameter environments and the cursors yielding them
//! - [`context`]: per-execution session, cancellation, configuration
//! - [`adapter`]: storage sessions and batched key traversals
//! - [`cursor`]: the cursor state machine
//! - [`expression`] / [`functions`]: scalar expressions and aggregates
//! - [`operators`]: the plan/cursor pairs
//! - [`executor`]: top-level drivers

pub mod adapter;
pub mod bindings;
pub mod context;
pub mod cursor;
pub mod executor;
pub mod expression;
pub mod functions;
pub mod operator;
pub mod operators;
pub mod row;

pub use adapter::{EngineAdapter, KeyTraversal, StoreAdapter, TransactionMode};
pub use bindings::{
    Binding, BoxedBindingsCursor, MultipleBindingsCursor, QueryBindings, QueryBindingsCursor,
    SingletonBindingsCursor, MAX_BINDING_POSITION,
};
pub use context::{
    CancellationToken, ExecutionConfig, ExecutionStats, QueryContext, DEFAULT_MAX_ROWS_IN_MEMORY,
};
pub use cursor::{BoxedCursor, Cursor, CursorBase, CursorState};
pub use expression::{ArithmeticOp, CompareOp, Expression};
pub use functions::{Accumulator, AggregateFunction, FunctionRegistry};
pub use operator::Operator;
pub use operators::{
    key_range_partitions, AggregateCall, DuplicatePolicy, IndexBound, IndexKeyRange, SortKey,
};
pub use row::{Row, RowOrigin, RowType};
