//! Query bindings and the cursors that supply them.
//!
//! [`QueryBindings`] maps small integer positions to a bound row or a scalar
//! parameter. Bindings form a tree: a fork inherits every position of its
//! parent and can shadow or add positions of its own, which is how each
//! partition of a parallel map sees its own partition value while sharing
//! the statement parameters.
//!
//! A [`QueryBindingsCursor`] yields the binding sets a cursor tree runs
//! against, one `open`/`next`/`close` cycle per set.

use std::collections::HashMap;
use std::sync::Arc;

use arbordb_core::Value;

use super::cursor::CursorState;
use super::row::Row;
use crate::error::{QueryError, QueryResult};

/// Largest binding position a plan may reference.
pub const MAX_BINDING_POSITION: usize = 255;

/// The content of one binding position.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// A correlated or partition row.
    Row(Row),
    /// A scalar parameter.
    Value(Value),
}

/// A parameter environment.
#[derive(Debug, Default)]
pub struct QueryBindings {
    parent: Option<Arc<QueryBindings>>,
    slots: HashMap<usize, Binding>,
    depth: usize,
}

impl QueryBindings {
    /// Creates an empty root environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a child environment that falls back to `parent`.
    #[must_use]
    pub fn fork(parent: &Arc<Self>) -> Self {
        Self { parent: Some(Arc::clone(parent)), slots: HashMap::new(), depth: parent.depth + 1 }
    }

    /// The environment this one was forked from.
    #[must_use]
    pub fn parent(&self) -> Option<&Arc<Self>> {
        self.parent.as_ref()
    }

    /// Number of forks between this environment and the root.
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// Binds `position`, shadowing any binding inherited from a parent.
    pub fn set(&mut self, position: usize, binding: Binding) {
        self.slots.insert(position, binding);
    }

    /// Binds a row at `position`.
    pub fn set_row(&mut self, position: usize, row: Row) {
        self.set(position, Binding::Row(row));
    }

    /// Binds a scalar at `position`.
    pub fn set_value(&mut self, position: usize, value: impl Into<Value>) {
        self.set(position, Binding::Value(value.into()));
    }

    /// Looks `position` up here, then in each ancestor.
    #[must_use]
    pub fn get(&self, position: usize) -> Option<&Binding> {
        let mut scope = Some(self);
        while let Some(bindings) = scope {
            if let Some(binding) = bindings.slots.get(&position) {
                return Some(binding);
            }
            scope = bindings.parent.as_deref();
        }
        None
    }

    /// Returns `true` if `position` is bound here or in an ancestor.
    #[must_use]
    pub fn is_bound(&self, position: usize) -> bool {
        self.get(position).is_some()
    }

    /// The row bound at `position`.
    ///
    /// # Errors
    ///
    /// Fails if nothing is bound there, or a scalar is.
    pub fn row(&self, position: usize) -> QueryResult<&Row> {
        match self.get(position) {
            Some(Binding::Row(row)) => Ok(row),
            Some(Binding::Value(value)) => Err(QueryError::TypeMismatch(format!(
                "binding {position} holds the value {value}, not a row"
            ))),
            None => Err(QueryError::UnboundBinding(position)),
        }
    }

    /// The scalar bound at `position`.
    ///
    /// # Errors
    ///
    /// Fails if nothing is bound there, or a row is.
    pub fn value(&self, position: usize) -> QueryResult<&Value> {
        match self.get(position) {
            Some(Binding::Value(value)) => Ok(value),
            Some(Binding::Row(_)) => Err(QueryError::TypeMismatch(format!(
                "binding {position} holds a row, not a value"
            ))),
            None => Err(QueryError::UnboundBinding(position)),
        }
    }
}

/// Source of the binding sets a cursor tree executes against.
pub trait QueryBindingsCursor: Send {
    /// Starts producing binding sets.
    fn open_bindings(&mut self) -> QueryResult<()>;

    /// The next binding set, or `None` once all have been produced.
    fn next_bindings(&mut self) -> QueryResult<Option<Arc<QueryBindings>>>;

    /// Stops producing binding sets. Safe to call more than once.
    fn close_bindings(&mut self) -> QueryResult<()>;
}

/// A boxed bindings cursor.
pub type BoxedBindingsCursor = Box<dyn QueryBindingsCursor>;

fn not_open(cursor: &'static str) -> QueryError {
    QueryError::ProtocolViolation { cursor, action: "advance bindings", state: CursorState::Idle }
}

/// Yields one binding set per open.
#[derive(Debug)]
pub struct SingletonBindingsCursor {
    bindings: Arc<QueryBindings>,
    open: bool,
    pending: bool,
}

impl SingletonBindingsCursor {
    /// Wraps a single binding set.
    #[must_use]
    pub fn new(bindings: Arc<QueryBindings>) -> Self {
        Self { bindings, open: false, pending: false }
    }

    /// Boxes a cursor over `bindings`.
    #[must_use]
    pub fn boxed(bindings: Arc<QueryBindings>) -> BoxedBindingsCursor {
        Box::new(Self::new(bindings))
    }
}

impl QueryBindingsCursor for SingletonBindingsCursor {
    fn open_bindings(&mut self) -> QueryResult<()> {
        self.open = true;
        self.pending = true;
        Ok(())
    }

    fn next_bindings(&mut self) -> QueryResult<Option<Arc<QueryBindings>>> {
        if !self.open {
            return Err(not_open("SingletonBindingsCursor"));
        }
        if std::mem::take(&mut self.pending) {
            Ok(Some(Arc::clone(&self.bindings)))
        } else {
            Ok(None)
        }
    }

    fn close_bindings(&mut self) -> QueryResult<()> {
        self.open = false;
        self.pending = false;
        Ok(())
    }
}

/// Yields a fixed list of binding sets, one per correlated invocation.
#[derive(Debug)]
pub struct MultipleBindingsCursor {
    sets: Vec<Arc<QueryBindings>>,
    next: usize,
    open: bool,
}

impl MultipleBindingsCursor {
    /// Wraps the binding sets, yielded in order.
    #[must_use]
    pub fn new(sets: Vec<Arc<QueryBindings>>) -> Self {
        Self { sets, next: 0, open: false }
    }
}

impl QueryBindingsCursor for MultipleBindingsCursor {
    fn open_bindings(&mut self) -> QueryResult<()> {
        self.open = true;
        self.next = 0;
        Ok(())
    }

    fn next_bindings(&mut self) -> QueryResult<Option<Arc<QueryBindings>>> {
        if !self.open {
            return Err(not_open("MultipleBindingsCursor"));
        }
        let set = self.sets.get(self.next).cloned();
        if set.is_some() {
            self.next += 1;
        }
        Ok(set)
    }

    fn close_bindings(&mut self) -> QueryResult<()> {
        self.open = false;
        Ok(())
    }
}
