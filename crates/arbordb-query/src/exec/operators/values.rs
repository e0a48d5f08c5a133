//! Literal row source.

use std::sync::Arc;

use crate::error::{QueryError, QueryResult};
use crate::exec::bindings::{BoxedBindingsCursor, QueryBindings};
use crate::exec::cursor::{Cursor, CursorBase, CursorState};
use crate::exec::row::{Row, RowType};

/// Plan node producing a fixed list of rows.
#[derive(Debug)]
pub struct ValuesPlan {
    row_type: Arc<RowType>,
    rows: Arc<[Row]>,
}

impl ValuesPlan {
    /// Creates the plan, checking every row against `row_type`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Plan`] if a row has a different shape.
    pub fn new(row_type: Arc<RowType>, rows: Vec<Row>) -> QueryResult<Self> {
        for (i, row) in rows.iter().enumerate() {
            if !row.row_type().is_compatible(&row_type) {
                return Err(QueryError::plan(format!(
                    "values row {i} does not match the declared row type"
                )));
            }
        }
        Ok(Self { row_type, rows: rows.into() })
    }

    /// The output row type.
    #[must_use]
    pub fn row_type(&self) -> &Arc<RowType> {
        &self.row_type
    }

    /// The rows produced on every run.
    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }
}

/// Cursor over a [`ValuesPlan`].
pub struct ValuesCursor {
    base: CursorBase,
    rows: Arc<[Row]>,
    position: usize,
    bindings: BoxedBindingsCursor,
}

impl ValuesCursor {
    /// Creates an idle cursor.
    #[must_use]
    pub fn new(plan: &ValuesPlan, bindings: BoxedBindingsCursor) -> Self {
        Self {
            base: CursorBase::new("Values", Arc::clone(&plan.row_type)),
            rows: Arc::clone(&plan.rows),
            position: 0,
            bindings,
        }
    }
}

impl Cursor for ValuesCursor {
    fn open(&mut self) -> QueryResult<()> {
        self.base.begin_open()?;
        self.position = 0;
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<Row>> {
        self.base.check_next()?;
        let row = self.rows.get(self.position).cloned();
        self.position += 1;
        Ok(self.base.produced(row))
    }

    fn close(&mut self) -> QueryResult<()> {
        self.base.begin_close()
    }

    fn destroy(&mut self) -> QueryResult<()> {
        self.base.ensure_live("destroy")?;
        let closed = self.close();
        self.base.set_destroyed();
        closed.and(self.bindings.close_bindings())
    }

    fn state(&self) -> CursorState {
        self.base.state()
    }

    fn open_bindings(&mut self) -> QueryResult<()> {
        self.base.ensure_live("open bindings")?;
        self.bindings.open_bindings()
    }

    fn next_bindings(&mut self) -> QueryResult<Option<Arc<QueryBindings>>> {
        self.base.ensure_live("next bindings")?;
        let next = self.bindings.next_bindings()?;
        self.base.set_bindings(next.clone());
        Ok(next)
    }

    fn close_bindings(&mut self) -> QueryResult<()> {
        self.base.ensure_live("close bindings")?;
        self.bindings.close_bindings()
    }

    fn row_type(&self) -> &Arc<RowType> {
        self.base.row_type()
    }

    fn name(&self) -> &'static str {
        self.base.name()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use arbordb_core::{Value, ValueType};

    use super::*;
    use crate::exec::bindings::SingletonBindingsCursor;

    fn cursor() -> ValuesCursor {
        let row_type = RowType::new(vec![ValueType::Int]);
        let rows: Vec<Row> = (1..=3).map(|i| Row::new(Arc::clone(&row_type), vec![Value::Int(i)]).unwrap()).collect();
        let plan = ValuesPlan::new(row_type, rows).unwrap();
        ValuesCursor::new(&plan, SingletonBindingsCursor::boxed(Arc::new(QueryBindings::new())))
    }

    #[test]
    fn values_replays_each_run() {
        let mut c = cursor();
        for _ in 0..2 {
            c.open().unwrap();
            let mut seen = Vec::new();
            while let Some(row) = c.next().unwrap() {
                seen.push(row.value(0).cloned().unwrap());
            }
            assert_eq!(seen, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
            assert!(c.state().is_idle());
            c.close().unwrap();
        }
    }

    #[test]
    fn values_rejects_foreign_rows() {
        let row = Row::new(RowType::new(vec![ValueType::String]), vec![Value::from("x")]).unwrap();
        assert!(ValuesPlan::new(RowType::new(vec![ValueType::Int]), vec![row]).is_err());
    }

    #[test]
    fn values_protocol() {
        let plan = crate::exec::operators::test_support::int_rows(&[&[Some(1)], &[Some(2)]]);
        crate::exec::operators::test_support::check_protocol(
            &plan,
            &crate::exec::operators::test_support::context(),
        );
    }
}
