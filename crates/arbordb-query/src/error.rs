//! Error types for query execution.

use arbordb_core::CoreError;
use arbordb_storage::StorageError;
use thiserror::Error;

use crate::exec::CursorState;

/// Result type for query execution.
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors raised while building plans or running cursors.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Cooperative cancellation was observed.
    #[error("query execution was cancelled")]
    Cancelled,

    /// A cursor method was called in a state that does not allow it.
    #[error("cursor protocol violation: {cursor} cannot {action} while {state}")]
    ProtocolViolation {
        /// The cursor that rejected the call.
        cursor: &'static str,
        /// The attempted call.
        action: &'static str,
        /// The state the cursor was in.
        state: CursorState,
    },

    /// The plan is malformed; raised while building operators.
    #[error("invalid plan: {0}")]
    Plan(String),

    /// Values of incompatible types met at runtime.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// Arithmetic or accumulation overflowed.
    #[error("numeric overflow in {0}")]
    Overflow(String),

    /// Integer division or remainder by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// An aggregate function name is not registered.
    #[error("unknown aggregate function: {0}")]
    UnknownFunction(String),

    /// An expression read a binding position that holds nothing.
    #[error("no binding at position {0}")]
    UnboundBinding(usize),

    /// An operator would exceed a configured resource limit.
    #[error("resource limit exceeded: {0}")]
    ResourceLimit(String),

    /// A partition worker could not be started or ended abnormally.
    #[error("partition worker {worker} failed: {message}")]
    WorkerFailed {
        /// Index of the worker.
        worker: usize,
        /// What went wrong.
        message: String,
    },

    /// Storage layer error.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Value or key encoding error.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl QueryError {
    /// Returns `true` for [`QueryError::Cancelled`].
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns `true` for [`QueryError::ProtocolViolation`].
    #[must_use]
    pub const fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::ProtocolViolation { .. })
    }

    pub(crate) fn plan(message: impl Into<String>) -> Self {
        Self::Plan(message.into())
    }
}
