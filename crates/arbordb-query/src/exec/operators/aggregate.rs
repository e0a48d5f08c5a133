//! Partial streaming aggregation over input ordered by the group key.
//!
//! The group key is the leading `group_fields` fields of each input row.
//! Because the input is sorted on that key, one group is open at a time: a
//! group boundary is noticed on the first row of the next group, which
//! emits the previous group, and the last group is flushed when the input
//! runs out.

use std::fmt;
use std::sync::Arc;

use arbordb_core::Value;

use crate::error::{QueryError, QueryResult};
use crate::exec::bindings::QueryBindings;
use crate::exec::cursor::{BoxedCursor, Cursor, CursorBase, CursorState};
use crate::exec::functions::{Accumulator, AggregateFunction, FunctionRegistry};
use crate::exec::operator::Operator;
use crate::exec::row::{Row, RowType};

/// One aggregate to compute per group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateCall {
    /// Registered function name.
    pub function: String,
    /// Input field, or `None` to count rows.
    pub argument: Option<usize>,
}

impl AggregateCall {
    /// Aggregates input field `field` with `function`.
    #[must_use]
    pub fn new(function: impl Into<String>, field: usize) -> Self {
        Self { function: function.into(), argument: Some(field) }
    }

    /// `count(*)`.
    #[must_use]
    pub fn count_rows() -> Self {
        Self { function: "count".into(), argument: None }
    }
}

/// Plan node for sorted-input grouping.
pub struct AggregatePlan {
    input: Operator,
    group_fields: usize,
    calls: Vec<AggregateCall>,
    functions: Vec<Arc<dyn AggregateFunction>>,
    row_type: Arc<RowType>,
}

impl AggregatePlan {
    /// Resolves the calls against `registry` and builds the output row type:
    /// the group fields followed by one field per call.
    ///
    /// # Errors
    ///
    /// Fails with [`QueryError::UnknownFunction`] for unregistered names and
    /// [`QueryError::Plan`] for out-of-range fields or unsupported types.
    pub fn new(
        input: Operator,
        group_fields: usize,
        calls: Vec<AggregateCall>,
        registry: &FunctionRegistry,
    ) -> QueryResult<Self> {
        let input_type = input.row_type();
        if group_fields > input_type.arity() {
            return Err(QueryError::plan(format!(
                "{group_fields} group fields requested from a row of arity {}",
                input_type.arity()
            )));
        }
        let mut fields = input_type.fields()[..group_fields].to_vec();
        let mut functions = Vec::with_capacity(calls.len());
        for call in &calls {
            let function = registry.get_or_error(&call.function)?;
            let argument_type = match call.argument {
                Some(field) => Some(input_type.field_type(field).ok_or_else(|| {
                    QueryError::plan(format!(
                        "{} argument {field} out of range for arity {}",
                        call.function,
                        input_type.arity()
                    ))
                })?),
                None => None,
            };
            fields.push(function.result_type(argument_type)?);
            functions.push(function);
        }
        Ok(Self { input, group_fields, calls, functions, row_type: RowType::new(fields) })
    }

    /// The input plan.
    #[must_use]
    pub fn input(&self) -> &Operator {
        &self.input
    }

    /// Number of leading input fields forming the group key.
    #[must_use]
    pub const fn group_fields(&self) -> usize {
        self.group_fields
    }

    /// The aggregate calls.
    #[must_use]
    pub fn calls(&self) -> &[AggregateCall] {
        &self.calls
    }

    /// The output row type.
    #[must_use]
    pub fn row_type(&self) -> &Arc<RowType> {
        &self.row_type
    }
}

impl fmt::Debug for AggregatePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregatePlan")
            .field("input", &self.input)
            .field("group_fields", &self.group_fields)
            .field("calls", &self.calls)
            .finish_non_exhaustive()
    }
}

struct Slot {
    accumulator: Box<dyn Accumulator>,
    seen: bool,
}

/// Cursor over an [`AggregatePlan`].
pub struct AggregateCursor {
    base: CursorBase,
    plan: Arc<AggregatePlan>,
    input: BoxedCursor,
    group: Option<Vec<Value>>,
    slots: Vec<Slot>,
    input_done: bool,
}

impl AggregateCursor {
    /// Creates an idle cursor over an input cursor.
    #[must_use]
    pub fn new(plan: Arc<AggregatePlan>, input: BoxedCursor) -> Self {
        let base = CursorBase::new("Aggregate", Arc::clone(&plan.row_type));
        Self { base, plan, input, group: None, slots: Vec::new(), input_done: false }
    }

    fn start_group(&mut self, key: Vec<Value>) {
        self.group = Some(key);
        self.slots = self
            .plan
            .functions
            .iter()
            .map(|f| Slot { accumulator: f.accumulator(), seen: false })
            .collect();
    }

    fn feed(&mut self, row: &Row) -> QueryResult<()> {
        for (slot, call) in self.slots.iter_mut().zip(&self.plan.calls) {
            match call.argument {
                Some(field) => match row.value(field) {
                    Some(value) if !value.is_null() => slot.accumulator.update(value)?,
                    _ => continue,
                },
                None => slot.accumulator.update(&Value::Bool(true))?,
            }
            slot.seen = true;
        }
        Ok(())
    }

    /// Builds the output row of the open group and closes it.
    fn emit(&mut self) -> QueryResult<Option<Row>> {
        let Some(mut values) = self.group.take() else {
            return Ok(None);
        };
        for (slot, function) in self.slots.iter().zip(&self.plan.functions) {
            values.push(if slot.seen { slot.accumulator.finish() } else { function.empty_value() });
        }
        Row::new(Arc::clone(&self.plan.row_type), values).map(Some)
    }
}

/// Group keys match under the key-encoding order, so NaN keys group
/// together the way they are stored.
fn same_group(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.total_cmp(y).is_eq())
}

impl Cursor for AggregateCursor {
    fn open(&mut self) -> QueryResult<()> {
        self.base.begin_open()?;
        self.group = None;
        self.slots.clear();
        self.input_done = false;
        if let Err(e) = self.input.open() {
            self.base.finish();
            return Err(e);
        }
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<Row>> {
        self.base.check_next()?;
        while !self.input_done {
            let Some(row) = self.input.next()? else {
                self.input_done = true;
                break;
            };
            let key = &row.values()[..self.plan.group_fields];
            match self.group.as_deref().map(|current| !same_group(current, key)) {
                None => self.start_group(key.to_vec()),
                Some(true) => {
                    let finished = self.emit()?;
                    self.start_group(key.to_vec());
                    self.feed(&row)?;
                    return Ok(self.base.produced(finished));
                }
                Some(false) => {}
            }
            self.feed(&row)?;
        }
        let last = self.emit()?;
        Ok(self.base.produced(last))
    }

    fn close(&mut self) -> QueryResult<()> {
        self.base.begin_close()?;
        self.group = None;
        self.slots.clear();
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
    use proptest::prelude::*;

    use super::*;
    use crate::exec::bindings::SingletonBindingsCursor;
    use crate::exec::operators::test_support::{check_protocol, context, int_rows, run};

    fn sum_by_key(input: Operator) -> Operator {
        Operator::aggregate_partial(
            input,
            1,
            vec![AggregateCall::new("sum", 1), AggregateCall::new("count", 1)],
            &FunctionRegistry::with_builtins(),
        )
        .unwrap()
    }

    #[test]
    fn emits_previous_group_on_key_change() {
        let input = int_rows(&[&[Some(1), Some(5)], &[Some(1), None], &[Some(2), Some(3)]]);
        assert_eq!(
            run(&sum_by_key(input), &context()),
            vec![
                vec![Value::Int(1), Value::Int(5), Value::Int(1)],
                vec![Value::Int(2), Value::Int(3), Value::Int(1)],
            ]
        );
    }

    #[test]
    fn all_null_group_reports_null_not_zero() {
        let input = int_rows(&[&[Some(7), None], &[Some(7), None]]);
        assert_eq!(
            run(&sum_by_key(input), &context()),
            vec![vec![Value::Int(7), Value::Null, Value::Int(0)]]
        );
    }

    #[test]
    fn empty_input_emits_nothing() {
        let row_type = RowType::new(vec![arbordb_core::ValueType::Int; 2]);
        let input = Operator::values(row_type, Vec::new()).unwrap();
        assert!(run(&sum_by_key(input), &context()).is_empty());
    }

    #[test]
    fn count_rows_and_output_type() {
        let input = int_rows(&[&[Some(1), None], &[Some(1), None], &[Some(4), Some(4)]]);
        let plan = Operator::aggregate_partial(
            input,
            1,
            vec![AggregateCall::count_rows(), AggregateCall::new("max", 1)],
            &FunctionRegistry::with_builtins(),
        )
        .unwrap();
        assert_eq!(plan.row_type().arity(), 3);
        assert_eq!(
            run(&plan, &context()),
            vec![
                vec![Value::Int(1), Value::Int(2), Value::Null],
                vec![Value::Int(4), Value::Int(1), Value::Int(4)],
            ]
        );
    }

    #[test]
    fn overflow_leaves_earlier_groups_intact() {
        let input =
            int_rows(&[&[Some(1), Some(5)], &[Some(2), Some(i64::MAX)], &[Some(2), Some(1)]]);
        let plan = sum_by_key(input);
        let ctx = context();
        let mut cursor =
            plan.cursor(&ctx, SingletonBindingsCursor::boxed(Arc::new(QueryBindings::new())));
        assert!(crate::exec::executor::open_top_level(cursor.as_mut()).unwrap());
        let first = cursor.next().unwrap().unwrap();
        assert_eq!(first.values(), &[Value::Int(1), Value::Int(5), Value::Int(1)]);
        assert!(matches!(cursor.next(), Err(QueryError::Overflow(_))));
        crate::exec::executor::close_top_level(cursor.as_mut()).unwrap();
        assert_eq!(first.value(1), Some(&Value::Int(5)));
    }

    #[test]
    fn nan_keys_form_one_group() {
        use arbordb_core::ValueType;

        let row_type = RowType::new(vec![ValueType::Float, ValueType::Int]);
        let rows = [(1.5, 1), (f64::NAN, 2), (f64::NAN, 3), (f64::NAN, 4)]
            .into_iter()
            .map(|(k, v)| Row::new(Arc::clone(&row_type), vec![Value::Float(k), Value::Int(v)]))
            .collect::<QueryResult<Vec<_>>>()
            .unwrap();
        let out = run(&sum_by_key(Operator::values(row_type, rows).unwrap()), &context());
        assert_eq!(out.len(), 2);
        assert_eq!(&out[0][1..], &[Value::Int(1), Value::Int(1)]);
        assert!(out[1][0].as_float().unwrap().is_nan());
        assert_eq!(&out[1][1..], &[Value::Int(9), Value::Int(3)]);
    }

    #[test]
    fn unknown_function_fails_at_build() {
        let input = int_rows(&[&[Some(1), Some(1)]]);
        let plan = Operator::aggregate_partial(
            input,
            1,
            vec![AggregateCall::new("median", 1)],
            &FunctionRegistry::with_builtins(),
        );
        assert!(matches!(plan, Err(QueryError::UnknownFunction(_))));
    }

    #[test]
    fn aggregate_protocol() {
        let input = int_rows(&[&[Some(1), Some(5)], &[Some(2), Some(3)]]);
        check_protocol(&sum_by_key(input), &context());
    }

    proptest! {
        #[test]
        fn one_row_per_contiguous_group(keys in prop::collection::vec(0i64..4, 0..40)) {
            let mut sorted = keys.clone();
            sorted.sort_unstable();
            let rows: Vec<Vec<Option<i64>>> =
                sorted.iter().map(|k| vec![Some(*k), Some(1)]).collect();
            let refs: Vec<&[Option<i64>]> = rows.iter().map(Vec::as_slice).collect();
            let input = if refs.is_empty() {
                let row_type = RowType::new(vec![arbordb_core::ValueType::Int; 2]);
                Operator::values(row_type, Vec::new()).unwrap()
            } else {
                int_rows(&refs)
            };
            let out = run(&sum_by_key(input), &context());

            let mut distinct = sorted.clone();
            distinct.dedup();
            prop_assert_eq!(out.len(), distinct.len());
            for (row, key) in out.iter().zip(&distinct) {
                let expected = sorted.iter().filter(|k| *k == key).count() as i64;
                prop_assert_eq!(&row[0], &Value::Int(*key));
                prop_assert_eq!(&row[1], &Value::Int(expected));
            }
        }
    }
}
