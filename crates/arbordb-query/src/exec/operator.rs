//! Plan nodes.
//!
//! An [`Operator`] is immutable once built and cheap to clone: each variant
//! holds its plan behind an `Arc`, so the same plan can instantiate cursor
//! trees on many threads. Constructors validate eagerly; a plan that
//! builds never fails at runtime for a structural reason.

use std::collections::BTreeSet;
use std::sync::Arc;

use arbordb_core::IndexDef;

use super::bindings::{Binding, BoxedBindingsCursor, MAX_BINDING_POSITION};
use super::context::QueryContext;
use super::cursor::BoxedCursor;
use super::expression::Expression;
use super::functions::FunctionRegistry;
use super::operators::{
    AggregateCall, AggregateCursor, AggregatePlan, DuplicatePolicy, IndexKeyRange,
    IndexScanCursor, IndexScanPlan, MapParallelCursor, MapParallelPlan, ProjectCursor,
    ProjectPlan, SelectCursor, SelectPlan, SortCursor, SortKey, SortPlan, ValuesCursor,
    ValuesPlan,
};
use super::row::{Row, RowType};
use crate::error::{QueryError, QueryResult};

/// A node of an execution plan.
#[derive(Debug, Clone)]
pub enum Operator {
    /// Literal rows.
    Values(Arc<ValuesPlan>),
    /// Index range scan.
    IndexScan(Arc<IndexScanPlan>),
    /// Predicate filter.
    Select(Arc<SelectPlan>),
    /// Expression projection.
    Project(Arc<ProjectPlan>),
    /// Sorted-input grouping.
    Aggregate(Arc<AggregatePlan>),
    /// Bounded top-N sort.
    Sort(Arc<SortPlan>),
    /// Partitioned parallel map.
    MapParallel(Arc<MapParallelPlan>),
}

impl Operator {
    /// Rows given up front.
    ///
    /// # Errors
    ///
    /// Fails if a row does not match `row_type`.
    pub fn values(row_type: Arc<RowType>, rows: Vec<Row>) -> QueryResult<Self> {
        Ok(Self::Values(Arc::new(ValuesPlan::new(row_type, rows)?)))
    }

    /// A scan of `index` over `range`, ordered per `ordering` (ascending
    /// flags for the leading columns; empty for index order).
    ///
    /// # Errors
    ///
    /// See [`IndexScanPlan::new`].
    pub fn index_scan(
        index: Arc<IndexDef>,
        range: IndexKeyRange,
        ordering: &[bool],
    ) -> QueryResult<Self> {
        let plan = IndexScanPlan::new(index, range, ordering)?;
        check_positions(plan.range().expressions())?;
        Ok(Self::IndexScan(Arc::new(plan)))
    }

    /// Rows of `input` for which `predicate` is true.
    ///
    /// # Errors
    ///
    /// Fails unless the predicate is a boolean over the input row type.
    pub fn select(input: Self, predicate: Expression) -> QueryResult<Self> {
        check_positions(std::iter::once(&predicate))?;
        Ok(Self::Select(Arc::new(SelectPlan::new(input, predicate)?)))
    }

    /// One row of `expressions` per input row.
    ///
    /// # Errors
    ///
    /// Fails if an expression does not type-check against the input.
    pub fn project(input: Self, expressions: Vec<Expression>) -> QueryResult<Self> {
        check_positions(expressions.iter())?;
        Ok(Self::Project(Arc::new(ProjectPlan::new(input, expressions)?)))
    }

    /// Groups input sorted on its first `group_fields` fields.
    ///
    /// # Errors
    ///
    /// Fails on unknown functions, bad fields or unsupported argument types.
    pub fn aggregate_partial(
        input: Self,
        group_fields: usize,
        calls: Vec<AggregateCall>,
        registry: &FunctionRegistry,
    ) -> QueryResult<Self> {
        Ok(Self::Aggregate(Arc::new(AggregatePlan::new(input, group_fields, calls, registry)?)))
    }

    /// The first `limit` rows of `input` under `keys`.
    ///
    /// # Errors
    ///
    /// Fails if a key field is out of range.
    pub fn sort_insertion_limited(
        input: Self,
        keys: Vec<SortKey>,
        policy: DuplicatePolicy,
        limit: usize,
    ) -> QueryResult<Self> {
        Ok(Self::Sort(Arc::new(SortPlan::new(input, keys, policy, limit)?)))
    }

    /// Runs `input` once per partition, in parallel, with the partition
    /// bound at `binding_position`.
    ///
    /// # Errors
    ///
    /// Fails without partitions or if `input` never reads the position.
    pub fn map_parallel(
        input: Self,
        partitions: Vec<Binding>,
        binding_position: usize,
    ) -> QueryResult<Self> {
        Ok(Self::MapParallel(Arc::new(MapParallelPlan::new(input, partitions, binding_position)?)))
    }

    /// The row type of every row this node produces.
    #[must_use]
    pub fn row_type(&self) -> &Arc<RowType> {
        match self {
            Self::Values(plan) => plan.row_type(),
            Self::IndexScan(plan) => plan.row_type(),
            Self::Select(plan) => plan.input().row_type(),
            Self::Project(plan) => plan.row_type(),
            Self::Aggregate(plan) => plan.row_type(),
            Self::Sort(plan) => plan.input().row_type(),
            Self::MapParallel(plan) => plan.input().row_type(),
        }
    }

    /// Child nodes in order.
    #[must_use]
    pub fn input_operators(&self) -> Vec<&Self> {
        match self {
            Self::Values(_) | Self::IndexScan(_) => Vec::new(),
            Self::Select(plan) => vec![plan.input()],
            Self::Project(plan) => vec![plan.input()],
            Self::Aggregate(plan) => vec![plan.input()],
            Self::Sort(plan) => vec![plan.input()],
            Self::MapParallel(plan) => vec![plan.input()],
        }
    }

    /// The name of this node type.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Values(_) => "Values",
            Self::IndexScan(_) => "IndexScan",
            Self::Select(_) => "Select",
            Self::Project(_) => "Project",
            Self::Aggregate(_) => "Aggregate",
            Self::Sort(_) => "Sort",
            Self::MapParallel(_) => "MapParallel",
        }
    }

    /// Binding positions the subtree reads from its caller. A parallel map
    /// supplies its own position, so that one is not reported above it.
    #[must_use]
    pub fn bound_positions(&self) -> BTreeSet<usize> {
        let mut positions: BTreeSet<usize> = match self {
            Self::IndexScan(plan) => {
                plan.range().expressions().flat_map(Expression::bound_positions).collect()
            }
            Self::Select(plan) => plan.predicate().bound_positions(),
            Self::Project(plan) => {
                plan.expressions().iter().flat_map(Expression::bound_positions).collect()
            }
            _ => BTreeSet::new(),
        };
        for input in self.input_operators() {
            positions.extend(input.bound_positions());
        }
        if let Self::MapParallel(plan) = self {
            positions.remove(&plan.binding_position());
        }
        positions
    }

    /// Instantiates a fresh, idle cursor tree for this plan.
    ///
    /// Leaves own `bindings`; composite cursors pass it down to their input.
    /// No storage access happens until the cursor is opened.
    #[must_use]
    pub fn cursor(&self, ctx: &Arc<QueryContext>, bindings: BoxedBindingsCursor) -> BoxedCursor {
        match self {
            Self::Values(plan) => Box::new(ValuesCursor::new(plan, bindings)),
            Self::IndexScan(plan) => {
                Box::new(IndexScanCursor::new(Arc::clone(plan), Arc::clone(ctx), bindings))
            }
            Self::Select(plan) => {
                Box::new(SelectCursor::new(Arc::clone(plan), plan.input().cursor(ctx, bindings)))
            }
            Self::Project(plan) => {
                Box::new(ProjectCursor::new(Arc::clone(plan), plan.input().cursor(ctx, bindings)))
            }
            Self::Aggregate(plan) => Box::new(AggregateCursor::new(
                Arc::clone(plan),
                plan.input().cursor(ctx, bindings),
            )),
            Self::Sort(plan) => Box::new(SortCursor::new(
                Arc::clone(plan),
                Arc::clone(ctx),
                plan.input().cursor(ctx, bindings),
            )),
            Self::MapParallel(plan) => {
                Box::new(MapParallelCursor::new(Arc::clone(plan), Arc::clone(ctx), bindings))
            }
        }
    }
}

fn check_positions<'a>(expressions: impl Iterator<Item = &'a Expression>) -> QueryResult<()> {
    for expr in expressions {
        let mut positions = expr.bound_positions().into_iter();
        if let Some(position) = positions.find(|p| *p > MAX_BINDING_POSITION) {
            return Err(QueryError::plan(format!(
                "binding position {position} exceeds {MAX_BINDING_POSITION}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use arbordb_core::{Value, ValueType};

    use super::*;

    fn values() -> Operator {
        let row_type = RowType::new(vec![ValueType::Int, ValueType::Int]);
        let row = Row::new(Arc::clone(&row_type), vec![Value::Int(1), Value::Int(2)]).unwrap();
        Operator::values(row_type, vec![row]).unwrap()
    }

    #[test]
    fn plan_traversal() {
        let select = Operator::select(
            values(),
            Expression::field(0).lt(Expression::bound(3, ValueType::Int)),
        )
        .unwrap();
        let project = Operator::project(select, vec![Expression::field(1)]).unwrap();
        assert_eq!(project.name(), "Project");
        assert_eq!(project.input_operators().len(), 1);
        assert_eq!(project.input_operators()[0].name(), "Select");
        assert_eq!(project.row_type().fields(), &[ValueType::Int]);
        assert_eq!(project.bound_positions().into_iter().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn binding_positions_are_bounded() {
        let out_of_range = Expression::bound(MAX_BINDING_POSITION + 1, ValueType::Int);
        let predicate = Expression::field(0).eq(out_of_range);
        assert!(matches!(Operator::select(values(), predicate), Err(QueryError::Plan(_))));
    }

    #[test]
    fn map_parallel_requires_a_read_of_its_position() {
        let partitions = vec![Binding::Value(Value::Int(1))];
        assert!(Operator::map_parallel(values(), partitions.clone(), 0).is_err());
        assert!(Operator::map_parallel(values(), Vec::new(), 0).is_err());

        let sub = Operator::select(
            values(),
            Expression::field(0).eq(Expression::bound(0, ValueType::Int)),
        )
        .unwrap();
        let map = Operator::map_parallel(sub, partitions, 0).unwrap();
        assert!(map.bound_positions().is_empty());
        assert_eq!(map.row_type().arity(), 2);
    }

    #[test]
    fn mismatched_types_fail_at_build() {
        assert!(Operator::select(values(), Expression::field(0)).is_err());
        assert!(Operator::project(values(), vec![Expression::field(2)]).is_err());
        assert!(Operator::sort_insertion_limited(
            values(),
            vec![SortKey::asc(4)],
            DuplicatePolicy::PreserveDuplicates,
            10
        )
        .is_err());
        assert!(Operator::aggregate_partial(
            values(),
            3,
            Vec::new(),
            &FunctionRegistry::with_builtins()
        )
        .is_err());
    }
}
