//! Streaming projection.

use std::sync::Arc;

use arbordb_core::Value;

use crate::error::QueryResult;
use crate::exec::bindings::QueryBindings;
use crate::exec::cursor::{BoxedCursor, Cursor, CursorBase, CursorState};
use crate::exec::expression::Expression;
use crate::exec::operator::Operator;
use crate::exec::row::{Row, RowType};

/// Plan node computing one output row per input row.
#[derive(Debug)]
pub struct ProjectPlan {
    input: Operator,
    expressions: Vec<Expression>,
    row_type: Arc<RowType>,
}

impl ProjectPlan {
    /// Creates the plan; the output row type is inferred from the
    /// expressions.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Plan`](crate::QueryError::Plan) if an expression
    /// does not type-check against the input.
    pub fn new(input: Operator, expressions: Vec<Expression>) -> QueryResult<Self> {
        let fields = expressions
            .iter()
            .map(|e| e.result_type(input.row_type()))
            .collect::<QueryResult<Vec<_>>>()?;
        Ok(Self { input, expressions, row_type: RowType::new(fields) })
    }

    /// The input plan.
    #[must_use]
    pub fn input(&self) -> &Operator {
        &self.input
    }

    /// The projected expressions.
    #[must_use]
    pub fn expressions(&self) -> &[Expression] {
        &self.expressions
    }

    /// The output row type.
    #[must_use]
    pub fn row_type(&self) -> &Arc<RowType> {
        &self.row_type
    }
}

/// Cursor over a [`ProjectPlan`].
pub struct ProjectCursor {
    base: CursorBase,
    plan: Arc<ProjectPlan>,
    input: BoxedCursor,
}

impl ProjectCursor {
    /// Creates an idle cursor over an input cursor.
    #[must_use]
    pub fn new(plan: Arc<ProjectPlan>, input: BoxedCursor) -> Self {
        let base = CursorBase::new("Project", Arc::clone(&plan.row_type));
        Self { base, plan, input }
    }
}

impl Cursor for ProjectCursor {
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
        let Some(input_row) = self.input.next()? else {
            return Ok(self.base.produced(None));
        };
        let bindings = self.base.bindings()?;
        let values = self
            .plan
            .expressions
            .iter()
            .map(|expr| expr.evaluate(Some(&input_row), bindings))
            .collect::<QueryResult<Vec<Value>>>()?;
        let row = Row::new(Arc::clone(&self.plan.row_type), values)?;
        Ok(self.base.produced(Some(row)))
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
    use crate::error::QueryError;
    use crate::exec::operators::test_support::{check_protocol, context, int_rows, run};

    #[test]
    fn project_computes_expressions() {
        let input = int_rows(&[&[Some(2), Some(3)], &[Some(5), None]]);
        let plan = Operator::project(
            input,
            vec![
                Expression::field(1),
                Expression::field(0).times(Expression::literal(10i64)),
                Expression::field(1).is_null(),
            ],
        )
        .unwrap();
        assert_eq!(plan.row_type().fields(), &[ValueType::Int, ValueType::Int, ValueType::Bool]);
        assert_eq!(
            run(&plan, &context()),
            vec![
                vec![Value::Int(3), Value::Int(20), Value::Bool(false)],
                vec![Value::Null, Value::Int(50), Value::Bool(true)],
            ]
        );
    }

    #[test]
    fn project_surfaces_evaluation_errors() {
        let input = int_rows(&[&[Some(1), Some(0)]]);
        let plan =
            Operator::project(input, vec![Expression::field(0).divide(Expression::field(1))])
                .unwrap();
        let err = crate::exec::executor::execute(&plan, &context(), QueryBindings::new());
        assert!(matches!(err, Err(QueryError::DivisionByZero)));
    }

    #[test]
    fn project_protocol() {
        let input = int_rows(&[&[Some(1)], &[Some(2)]]);
        let plan = Operator::project(input, vec![Expression::field(0)]).unwrap();
        check_protocol(&plan, &context());
    }
}
