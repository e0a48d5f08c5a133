//! The cursor protocol.
//!
//! A [`Cursor`] is the runtime half of an [`Operator`](super::Operator):
//! a stateful iterator that owns its child cursors. Every cursor moves
//! through the same state machine:
//!
//! ```text
//! construct -> Idle -open-> Active -close-> Idle -destroy-> Destroyed
//!                            |
//!                            +-- next() reports exhaustion --> Idle
//! ```
//!
//! `next` is legal only while `Active`; `close` is legal from `Active` or
//! `Idle` and may be repeated; nothing is legal once `Destroyed`. The outer
//! bindings protocol (`open_bindings` / `next_bindings` / `close_bindings`)
//! yields the binding sets each `open`/`next`/`close` cycle runs against.

use std::fmt;
use std::sync::Arc;

use super::bindings::QueryBindings;
use super::row::{Row, RowType};
use crate::error::{QueryError, QueryResult};

/// The state of a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Constructed or closed; `open` is legal, `next` is not.
    Idle,
    /// Open and able to produce rows.
    Active,
    /// Terminal; every call fails.
    Destroyed,
}

impl CursorState {
    /// Returns true if the cursor is active.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    /// Returns true if the cursor is idle.
    #[must_use]
    pub const fn is_idle(self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Returns true if the cursor has been destroyed.
    #[must_use]
    pub const fn is_destroyed(self) -> bool {
        matches!(self, Self::Destroyed)
    }
}

impl fmt::Display for CursorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::Destroyed => "destroyed",
        })
    }
}

/// The cursor trait for pull-based query execution.
///
/// The `Send` bound lets a cursor tree be built on one thread and driven on
/// another, which is how partition workers run their sub-plans. Cursors are
/// not `Sync`; they hold mutable per-run state.
pub trait Cursor: Send {
    /// Starts a run against the current binding set. Legal only while idle.
    fn open(&mut self) -> QueryResult<()>;

    /// Returns the next row, or `None` once the input is exhausted, at which
    /// point the cursor is idle again.
    fn next(&mut self) -> QueryResult<Option<Row>>;

    /// Ends the current run and closes every child. Idempotent.
    fn close(&mut self) -> QueryResult<()>;

    /// Releases the cursor and its children for good.
    fn destroy(&mut self) -> QueryResult<()>;

    /// The current state.
    fn state(&self) -> CursorState;

    /// Starts the bindings protocol.
    fn open_bindings(&mut self) -> QueryResult<()>;

    /// Advances to the next binding set, or `None` when there are no more.
    fn next_bindings(&mut self) -> QueryResult<Option<Arc<QueryBindings>>>;

    /// Ends the bindings protocol.
    fn close_bindings(&mut self) -> QueryResult<()>;

    /// The row type every produced row conforms to.
    fn row_type(&self) -> &Arc<RowType>;

    /// The name of this cursor type.
    fn name(&self) -> &'static str;
}

/// A boxed cursor for dynamic dispatch.
pub type BoxedCursor = Box<dyn Cursor>;

/// Shared state bookkeeping for cursors.
///
/// Every transition goes through here so that each cursor rejects illegal
/// calls the same way.
#[derive(Debug)]
pub struct CursorBase {
    name: &'static str,
    row_type: Arc<RowType>,
    state: CursorState,
    bindings: Option<Arc<QueryBindings>>,
    rows_produced: u64,
}

impl CursorBase {
    /// Creates an idle base.
    #[must_use]
    pub fn new(name: &'static str, row_type: Arc<RowType>) -> Self {
        Self { name, row_type, state: CursorState::Idle, bindings: None, rows_produced: 0 }
    }

    /// The cursor name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// The output row type.
    #[must_use]
    pub fn row_type(&self) -> &Arc<RowType> {
        &self.row_type
    }

    /// The current state.
    #[must_use]
    pub const fn state(&self) -> CursorState {
        self.state
    }

    /// The error for `action` in the current state.
    #[must_use]
    pub fn violation(&self, action: &'static str) -> QueryError {
        QueryError::ProtocolViolation { cursor: self.name, action, state: self.state }
    }

    /// Idle to active.
    ///
    /// # Errors
    ///
    /// Fails unless idle.
    pub fn begin_open(&mut self) -> QueryResult<()> {
        if !self.state.is_idle() {
            return Err(self.violation("open"));
        }
        self.state = CursorState::Active;
        Ok(())
    }

    /// Checks that `next` is legal.
    ///
    /// # Errors
    ///
    /// Fails unless active.
    pub fn check_next(&self) -> QueryResult<()> {
        if self.state.is_active() {
            Ok(())
        } else {
            Err(self.violation("next"))
        }
    }

    /// Active to idle on exhaustion.
    pub fn finish(&mut self) {
        if self.state.is_active() {
            self.state = CursorState::Idle;
        }
    }

    /// Wraps the result of producing one row: counts it, or goes idle when
    /// the input is exhausted.
    pub fn produced(&mut self, row: Option<Row>) -> Option<Row> {
        match row {
            Some(_) => self.rows_produced += 1,
            None => self.finish(),
        }
        row
    }

    /// Active or idle to idle.
    ///
    /// # Errors
    ///
    /// Fails once destroyed.
    pub fn begin_close(&mut self) -> QueryResult<()> {
        self.ensure_live("close")?;
        self.state = CursorState::Idle;
        Ok(())
    }

    /// Fails with a protocol violation once destroyed.
    ///
    /// # Errors
    ///
    /// See above.
    pub fn ensure_live(&self, action: &'static str) -> QueryResult<()> {
        if self.state.is_destroyed() {
            Err(self.violation(action))
        } else {
            Ok(())
        }
    }

    /// Marks the cursor destroyed.
    pub fn set_destroyed(&mut self) {
        self.state = CursorState::Destroyed;
        self.bindings = None;
    }

    /// Records the binding set the next run uses.
    pub fn set_bindings(&mut self, bindings: Option<Arc<QueryBindings>>) {
        self.bindings = bindings;
    }

    /// The binding set of the current run.
    ///
    /// # Errors
    ///
    /// Fails if no binding set has been supplied yet.
    pub fn bindings(&self) -> QueryResult<&Arc<QueryBindings>> {
        self.bindings.as_ref().ok_or_else(|| self.violation("read bindings"))
    }

    /// Rows produced since construction.
    #[must_use]
    pub const fn rows_produced(&self) -> u64 {
        self.rows_produced
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use arbordb_core::ValueType;

    use super::*;

    fn base() -> CursorBase {
        CursorBase::new("TestCursor", RowType::new(vec![ValueType::Int]))
    }

    #[test]
    fn cursor_state_transitions() {
        let mut base = base();
        assert!(base.state().is_idle());
        assert!(base.check_next().is_err());

        base.begin_open().unwrap();
        assert!(base.state().is_active());
        assert!(base.begin_open().unwrap_err().is_protocol_violation());
        base.check_next().unwrap();

        assert!(base.produced(None).is_none());
        assert!(base.state().is_idle());
        assert!(base.check_next().is_err());

        base.begin_close().unwrap();
        base.begin_close().unwrap();
        base.ensure_live("destroy").unwrap();
        base.set_destroyed();
        assert!(base.begin_close().is_err());
        assert!(base.begin_open().is_err());
    }

    #[test]
    fn violation_names_cursor_and_state() {
        let base = base();
        let message = base.violation("next").to_string();
        assert!(message.contains("TestCursor"));
        assert!(message.contains("idle"));
    }

    #[test]
    fn bindings_must_be_supplied() {
        let mut base = base();
        assert!(base.bindings().is_err());
        base.set_bindings(Some(Arc::new(QueryBindings::new())));
        assert!(base.bindings().is_ok());
    }
}
