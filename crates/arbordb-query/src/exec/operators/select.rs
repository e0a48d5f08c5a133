//! Streaming predicate filter.

use std::sync::Arc;

use arbordb_core::{Value, ValueType};

use crate::error::{QueryError, QueryResult};
use crate::exec::bindings::QueryBindings;
use crate::exec::cursor::{BoxedCursor, Cursor, CursorBase, CursorState};
use crate::exec::expression::Expression;
use crate::exec::operator::Operator;
use crate::exec::row::{Row, RowType};

/// Plan node keeping the input rows whose predicate is true.
#[derive(Debug)]
pub struct SelectPlan {
    input: Operator,
    predicate: Expression,
}

impl SelectPlan {
    /// Creates the plan.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Plan`] unless the predicate is a boolean over
    /// the input row type.
    pub fn new(input: Operator, predicate: Expression) -> QueryResult<Self> {
        let ty = predicate.result_type(input.row_type())?;
        if ty != ValueType::Bool {
            return Err(QueryError::plan(format!("select predicate has type {ty}, not Bool")));
        }
        Ok(Self { input, predicate })
    }

    /// The input plan.
    #[must_use]
    pub fn input(&self) -> &Operator {
        &self.input
    }

    /// The predicate.
    #[must_use]
    pub fn predicate(&self) -> &Expression {
        &self.predicate
    }
}

/// Cursor over a [`SelectPlan`].
pub struct SelectCursor {
    base: CursorBase,
    plan: Arc<SelectPlan>,
    input: BoxedCursor,
}

impl SelectCursor {
    /// Creates an idle cursor over an input cursor.
    #[must_use]
    pub fn new(plan: Arc<SelectPlan>, input: BoxedCursor) -> Self {
        let row_type = Arc::clone(input.row_type());
        Self { base: CursorBase::new("Select", row_type), plan, input }
    }
}

impl Cursor for SelectCursor {
    fn open(&mut self) -> QueryResult<()> {
        self.base.begin_open()?;
        if let Err(e) = self.input.open() {
            self.base.finish();
            return Err(e);
        }
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<Row>> {
        self.base.check_next()?;
        while let Some(row) = self.input.next()? {
            // Rows whose predicate is null are dropped like false ones.
            let keep = self.plan.predicate.evaluate(Some(&row), self.base.bindings()?)?;
            if keep == Value::Bool(true) {
                return Ok(self.base.produced(Some(row)));
            }
        }
        Ok(self.base.produced(None))
    }

    fn close(&mut self) -> QueryResult<()> {
        self.base.begin_close()?;
        self.input.close()
    }

    fn destroy(&mut self) -> QueryResult<()> {
        self.base.ensure_live("destroy")?;
        let closed = self.close();
        self.base.set_destroyed();
        closed.and(self.input.destroy())
    }

    fn state(&self) -> CursorState {
        self.base.state()
    }

    fn open_bindings(&mut self) -> QueryResult<()> {
        self.base.ensure_live("open bindings")?;
        self.input.open_bindings()
    }

    fn next_bindings(&mut self) -> QueryResult<Option<Arc<QueryBindings>>> {
        self.base.ensure_live("next bindings")?;
        let next = self.input.next_bindings()?;
        self.base.set_bindings(next.clone());
        Ok(next)
    }

    fn close_bindings(&mut self) -> QueryResult<()> {
        self.base.ensure_live("close bindings")?;
        self.input.close_bindings()
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
    use arbordb_core::ValueType;

    use super::*;
    use crate::exec::operators::test_support::{check_protocol, context, int_rows, ints, run};

    #[test]
    fn select_keeps_only_true_rows() {
        let input = int_rows(&[&[Some(1)], &[None], &[Some(3)], &[Some(0)]]);
        let plan =
            Operator::select(input, Expression::field(0).gt(Expression::literal(0i64))).unwrap();
        assert_eq!(run(&plan, &context()), vec![ints(&[1]), ints(&[3])]);
    }

    #[test]
    fn select_reads_bindings() {
        let input = int_rows(&[&[Some(1)], &[Some(2)], &[Some(3)]]);
        let plan =
            Operator::select(input, Expression::field(0).ge(Expression::bound(0, ValueType::Int)))
                .unwrap();
        let mut bindings = QueryBindings::new();
        bindings.set_value(0, 2i64);
        let rows = crate::exec::executor::execute(&plan, &context(), bindings).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn select_rejects_non_boolean_predicates() {
        let input = int_rows(&[&[Some(1)]]);
        assert!(matches!(
            Operator::select(input, Expression::field(0)),
            Err(QueryError::Plan(_))
        ));
    }

    #[test]
    fn select_protocol() {
        let input = int_rows(&[&[Some(1)], &[Some(2)]]);
        let plan =
            Operator::select(input, Expression::field(0).eq(Expression::literal(2i64))).unwrap();
        check_protocol(&plan, &context());
    }
}
