//! Bounded insertion sort: top-N selection under a key comparator.
//!
//! The whole input is consumed on `open` into a buffer capped at the limit
//! and kept sorted by insertion. Rows are then served from the front of the
//! buffer. Equal keys keep their arrival order, so at the capacity boundary
//! the earlier of two equal rows wins.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::Arc;

use arbordb_core::Value;
use tracing::debug;

use crate::error::{QueryError, QueryResult};
use crate::exec::bindings::QueryBindings;
use crate::exec::context::QueryContext;
use crate::exec::cursor::{BoxedCursor, Cursor, CursorBase, CursorState};
use crate::exec::operator::Operator;
use crate::exec::row::{Row, RowType};

/// One column of the sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    /// Input field.
    pub field: usize,
    /// Ascending when true.
    pub ascending: bool,
}

impl SortKey {
    /// Ascending on `field`.
    #[must_use]
    pub const fn asc(field: usize) -> Self {
        Self { field, ascending: true }
    }

    /// Descending on `field`.
    #[must_use]
    pub const fn desc(field: usize) -> Self {
        Self { field, ascending: false }
    }
}

/// What to do with rows whose sort key equals a buffered row's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Keep them, after the rows already buffered.
    #[default]
    PreserveDuplicates,
    /// Drop them.
    SuppressDuplicates,
}

/// Plan node for a bounded sort.
#[derive(Debug)]
pub struct SortPlan {
    input: Operator,
    keys: Vec<SortKey>,
    policy: DuplicatePolicy,
    limit: usize,
}

impl SortPlan {
    /// Creates the plan.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Plan`] if a key field is out of range.
    pub fn new(
        input: Operator,
        keys: Vec<SortKey>,
        policy: DuplicatePolicy,
        limit: usize,
    ) -> QueryResult<Self> {
        let arity = input.row_type().arity();
        if let Some(key) = keys.iter().find(|k| k.field >= arity) {
            return Err(QueryError::plan(format!(
                "sort key field {} out of range for arity {arity}",
                key.field
            )));
        }
        Ok(Self { input, keys, policy, limit })
    }

    /// The input plan.
    #[must_use]
    pub fn input(&self) -> &Operator {
        &self.input
    }

    /// The sort key.
    #[must_use]
    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    /// Maximum number of rows produced.
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// The duplicate policy.
    #[must_use]
    pub const fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    /// Orders two rows by the sort key. Nulls sort below every value.
    #[must_use]
    pub fn compare(&self, a: &Row, b: &Row) -> Ordering {
        for key in &self.keys {
            let ordering = compare_values(a.value(key.field), b.value(key.field));
            let ordering = if key.ascending { ordering } else { ordering.reverse() };
            if ordering.is_ne() {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        // Same order as index keys: nulls first, NaN above every float.
        (Some(a), Some(b)) => a.total_cmp(b),
        _ => Ordering::Equal,
    }
}

/// Cursor over a [`SortPlan`].
pub struct SortCursor {
    base: CursorBase,
    plan: Arc<SortPlan>,
    ctx: Arc<QueryContext>,
    input: BoxedCursor,
    output: VecDeque<Row>,
}

impl SortCursor {
    /// Creates an idle cursor over an input cursor.
    #[must_use]
    pub fn new(plan: Arc<SortPlan>, ctx: Arc<QueryContext>, input: BoxedCursor) -> Self {
        let row_type = Arc::clone(input.row_type());
        Self { base: CursorBase::new("Sort", row_type), plan, ctx, input, output: VecDeque::new() }
    }

    fn fill(&mut self) -> QueryResult<()> {
        let limit = self.plan.limit;
        let max = self.ctx.config().max_rows_in_memory;
        if max != 0 && limit > max {
            return Err(QueryError::ResourceLimit(format!(
                "sort limit {limit} exceeds max_rows_in_memory {max}"
            )));
        }

        self.input.open()?;
        let mut buffer: Vec<Row> = Vec::with_capacity(limit.min(1024));
        let mut consumed = 0u64;
        while let Some(row) = self.input.next()? {
            self.ctx.check_cancelled()?;
            consumed += 1;
            let at = buffer.partition_point(|held| self.plan.compare(held, &row).is_le());
            if self.plan.policy == DuplicatePolicy::SuppressDuplicates
                && at > 0
                && self.plan.compare(&buffer[at - 1], &row).is_eq()
            {
                continue;
            }
            if at < limit {
                buffer.insert(at, row);
                buffer.truncate(limit);
            }
        }
        debug!(consumed, kept = buffer.len(), limit, "bounded sort filled");
        self.output = buffer.into();
        Ok(())
    }
}

impl Cursor for SortCursor {
    fn open(&mut self) -> QueryResult<()> {
        self.base.begin_open()?;
        if let Err(e) = self.fill() {
            self.output.clear();
            self.base.finish();
            return Err(e);
        }
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<Row>> {
        self.base.check_next()?;
        let row = self.output.pop_front();
        Ok(self.base.produced(row))
    }

    fn close(&mut self) -> QueryResult<()> {
        self.base.begin_close()?;
        self.output.clear();
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
    use crate::exec::context::ExecutionConfig;
    use crate::exec::operators::test_support::{
        check_protocol, context, context_with, int_rows, ints, run,
    };

    fn sorted(
        input: Operator,
        keys: Vec<SortKey>,
        policy: DuplicatePolicy,
        limit: usize,
    ) -> Operator {
        Operator::sort_insertion_limited(input, keys, policy, limit).unwrap()
    }

    fn floats(values: &[f64]) -> Operator {
        let row_type = RowType::new(vec![arbordb_core::ValueType::Float]);
        let rows = values
            .iter()
            .map(|f| Row::new(Arc::clone(&row_type), vec![Value::Float(*f)]))
            .collect::<QueryResult<Vec<_>>>()
            .unwrap();
        Operator::values(row_type, rows).unwrap()
    }

    fn float_bits(out: &[Vec<Value>]) -> Vec<u64> {
        out.iter().map(|r| r[0].as_float().unwrap().to_bits()).collect()
    }

    #[test]
    fn keeps_top_n_in_order() {
        let input = int_rows(&[&[Some(5)], &[Some(1)], &[Some(4)], &[Some(2)], &[Some(3)]]);
        let plan = sorted(input, vec![SortKey::asc(0)], DuplicatePolicy::PreserveDuplicates, 3);
        assert_eq!(run(&plan, &context()), vec![ints(&[1]), ints(&[2]), ints(&[3])]);
    }

    #[test]
    fn descending_with_nulls_last() {
        let input = int_rows(&[&[None], &[Some(1)], &[Some(3)], &[Some(2)]]);
        let plan = sorted(input, vec![SortKey::desc(0)], DuplicatePolicy::PreserveDuplicates, 10);
        assert_eq!(
            run(&plan, &context()),
            vec![ints(&[3]), ints(&[2]), ints(&[1]), vec![Value::Null]]
        );
    }

    #[test]
    fn first_arrival_wins_at_the_boundary() {
        let input = int_rows(&[
            &[Some(2), Some(0)],
            &[Some(1), Some(1)],
            &[Some(2), Some(2)],
            &[Some(2), Some(3)],
        ]);
        let plan = sorted(input, vec![SortKey::asc(0)], DuplicatePolicy::PreserveDuplicates, 3);
        assert_eq!(run(&plan, &context()), vec![ints(&[1, 1]), ints(&[2, 0]), ints(&[2, 2])]);
    }

    #[test]
    fn suppressed_duplicates_are_dropped() {
        let input = int_rows(&[&[Some(2), Some(0)], &[Some(1), Some(1)], &[Some(2), Some(2)]]);
        let plan = sorted(input, vec![SortKey::asc(0)], DuplicatePolicy::SuppressDuplicates, 10);
        assert_eq!(run(&plan, &context()), vec![ints(&[1, 1]), ints(&[2, 0])]);
    }

    #[test]
    fn limit_over_memory_cap_is_rejected() {
        let ctx = context_with(ExecutionConfig::new().with_max_rows_in_memory(2));
        let input = int_rows(&[&[Some(1)]]);
        let plan = sorted(input, vec![SortKey::asc(0)], DuplicatePolicy::PreserveDuplicates, 3);
        let err = crate::exec::executor::execute(&plan, &ctx, QueryBindings::new());
        assert!(matches!(err, Err(QueryError::ResourceLimit(_))));
    }

    #[test]
    fn nan_sorts_above_every_float() {
        let input = floats(&[f64::NAN, 1.0, f64::NAN, 0.0, -0.0, 2.0, f64::NEG_INFINITY]);
        let plan = sorted(input, vec![SortKey::asc(0)], DuplicatePolicy::PreserveDuplicates, 5);
        let expected = [f64::NEG_INFINITY, -0.0, 0.0, 1.0, 2.0].map(f64::to_bits);
        assert_eq!(float_bits(&run(&plan, &context())), expected);

        let input = floats(&[1.0, f64::NAN, 3.0, f64::NAN, 2.0]);
        let plan = sorted(input, vec![SortKey::desc(0)], DuplicatePolicy::SuppressDuplicates, 10);
        let out = run(&plan, &context());
        assert_eq!(out.len(), 4);
        assert!(out[0][0].as_float().unwrap().is_nan());
        assert_eq!(float_bits(&out[1..]), [3.0, 2.0, 1.0].map(f64::to_bits));
    }

    #[test]
    fn sort_protocol() {
        let input = int_rows(&[&[Some(2)], &[Some(1)]]);
        let plan = sorted(input, vec![SortKey::asc(0)], DuplicatePolicy::PreserveDuplicates, 1);
        check_protocol(&plan, &context());
    }

    proptest! {
        #[test]
        fn output_is_the_stable_top_n(
            keys in prop::collection::vec(0i64..20, 1..60),
            limit in 0usize..30,
            ascending in any::<bool>(),
        ) {
            let rows: Vec<Vec<Option<i64>>> = keys
                .iter()
                .enumerate()
                .map(|(seq, k)| vec![Some(*k), Some(seq as i64)])
                .collect();
            let refs: Vec<&[Option<i64>]> = rows.iter().map(Vec::as_slice).collect();
            let key = if ascending { SortKey::asc(0) } else { SortKey::desc(0) };
            let policy = DuplicatePolicy::PreserveDuplicates;
            let plan = sorted(int_rows(&refs), vec![key], policy, limit);
            let out = run(&plan, &context());

            let mut expected: Vec<(i64, i64)> =
                keys.iter().enumerate().map(|(seq, k)| (*k, seq as i64)).collect();
            if ascending {
                expected.sort_by_key(|(k, _)| *k);
            } else {
                expected.sort_by_key(|(k, _)| std::cmp::Reverse(*k));
            }
            expected.truncate(limit);

            prop_assert_eq!(out.len(), limit.min(keys.len()));
            let got: Vec<(i64, i64)> = out
                .iter()
                .map(|r| (r[0].as_int().unwrap(), r[1].as_int().unwrap()))
                .collect();
            prop_assert_eq!(got, expected);
        }
    }
}
