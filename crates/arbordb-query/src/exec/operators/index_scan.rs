//! Ordered scan over a range of an index.
//!
//! Bounds are lists of expressions matching a prefix of the index columns.
//! They are evaluated against the run's bindings on `open` and encoded with
//! the index key codec into a byte range:
//!
//! | logical bound        | byte bound                          |
//! |----------------------|-------------------------------------|
//! | low, inclusive `P`   | from `P`                            |
//! | low, exclusive `P`   | from the successor of prefix `P`    |
//! | high, exclusive `P`  | up to `P`, excluded                 |
//! | high, inclusive `P`  | up to the successor of `P`, excluded |
//!
//! Descending columns are stored complemented, so when the bounded columns
//! are descending the logical low bound becomes the byte high bound.

use std::ops::Bound;
use std::sync::Arc;

use arbordb_core::encoding::prefix_successor;
use arbordb_core::{IndexDef, Value};
use arbordb_storage::{Direction, KeyRange};

use crate::error::{QueryError, QueryResult};
use crate::exec::adapter::KeyTraversal;
use crate::exec::bindings::{BoxedBindingsCursor, QueryBindings};
use crate::exec::context::QueryContext;
use crate::exec::cursor::{Cursor, CursorBase, CursorState};
use crate::exec::expression::Expression;
use crate::exec::row::{Row, RowOrigin, RowType};

/// One end of an index range: values for a prefix of the index columns.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexBound {
    /// One expression per leading index column.
    pub values: Vec<Expression>,
    /// Whether keys equal to the prefix are inside the range.
    pub inclusive: bool,
}

impl IndexBound {
    /// An inclusive bound.
    #[must_use]
    pub fn inclusive(values: Vec<Expression>) -> Self {
        Self { values, inclusive: true }
    }

    /// An exclusive bound.
    #[must_use]
    pub fn exclusive(values: Vec<Expression>) -> Self {
        Self { values, inclusive: false }
    }
}

/// The logical range an index scan covers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexKeyRange {
    /// Low end, or unbounded.
    pub lo: Option<IndexBound>,
    /// High end, or unbounded.
    pub hi: Option<IndexBound>,
}

impl IndexKeyRange {
    /// The whole index.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// A range with both ends given.
    #[must_use]
    pub fn bounded(lo: Option<IndexBound>, hi: Option<IndexBound>) -> Self {
        Self { lo, hi }
    }

    fn bounds(&self) -> impl Iterator<Item = &IndexBound> {
        self.lo.iter().chain(self.hi.iter())
    }

    /// Every expression of both bounds.
    pub fn expressions(&self) -> impl Iterator<Item = &Expression> {
        self.bounds().flat_map(|b| b.values.iter())
    }
}

/// Plan node for an index range scan.
#[derive(Debug)]
pub struct IndexScanPlan {
    index: Arc<IndexDef>,
    range: IndexKeyRange,
    direction: Direction,
    bounds_descending: bool,
    row_type: Arc<RowType>,
}

impl IndexScanPlan {
    /// Creates the plan.
    ///
    /// `ordering` lists the requested direction (true for ascending) of the
    /// leading index columns; an empty list means index order. It must be
    /// uniformly equal to, or uniformly the reverse of, the index's declared
    /// directions.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Plan`] for a mixed ordering, bounds longer than
    /// the index, bounds reading the input row, bounds of the wrong type,
    /// bounded columns with mixed directions, or a bound splitting the
    /// coordinates of a spatial index.
    pub fn new(index: Arc<IndexDef>, range: IndexKeyRange, ordering: &[bool]) -> QueryResult<Self> {
        let columns = index.all_columns();
        if ordering.len() > columns.len() {
            return Err(QueryError::plan(format!(
                "ordering of {} columns for index {} with {}",
                ordering.len(),
                index.name(),
                columns.len()
            )));
        }
        let same = ordering.iter().zip(columns).all(|(asc, c)| *asc == c.is_ascending());
        let reversed = ordering.iter().zip(columns).all(|(asc, c)| *asc != c.is_ascending());
        let direction = match (same, reversed) {
            (true, _) => Direction::Forward,
            (false, true) => Direction::Backward,
            (false, false) => {
                return Err(QueryError::plan(format!(
                    "ordering mixes index order and reverse order on index {}",
                    index.name()
                )))
            }
        };

        let empty = RowType::new(Vec::new());
        let mut bounded = 0;
        for bound in range.bounds() {
            if bound.values.is_empty() {
                return Err(QueryError::plan("an index bound needs at least one value"));
            }
            if bound.values.len() > columns.len() {
                return Err(QueryError::plan(format!(
                    "bound of {} values for index {} with {} columns",
                    bound.values.len(),
                    index.name(),
                    columns.len()
                )));
            }
            for (expr, column) in bound.values.iter().zip(columns) {
                if expr.references_fields() {
                    return Err(QueryError::plan("index bounds cannot reference row fields"));
                }
                let ty = expr.result_type(&empty)?;
                if ty != column.value_type() {
                    return Err(QueryError::plan(format!(
                        "bound on column {} has type {ty}, expected {}",
                        column.name(),
                        column.value_type()
                    )));
                }
            }
            if let Some(layout) = index.spatial() {
                let first = layout.first_spatial_argument;
                let len = bound.values.len();
                if len > first && len < first + layout.dimensions {
                    return Err(QueryError::plan(format!(
                        "bound of {len} values splits the coordinates of spatial index {}",
                        index.name()
                    )));
                }
            }
            bounded = bounded.max(bound.values.len());
        }
        let bounds_descending = columns.first().is_some_and(|c| !c.is_ascending()) && bounded > 0;
        if columns[..bounded].iter().any(|c| c.is_ascending() == bounds_descending) {
            return Err(QueryError::plan(format!(
                "bounded columns of index {} mix ascending and descending order",
                index.name()
            )));
        }

        let row_type = RowType::with_origin(
            columns.iter().map(|c| c.value_type()).collect(),
            RowOrigin::Index { table: index.table().to_owned(), index: index.name().to_owned() },
        );
        Ok(Self { index, range, direction, bounds_descending, row_type })
    }

    /// The scanned index.
    #[must_use]
    pub fn index(&self) -> &Arc<IndexDef> {
        &self.index
    }

    /// The logical range.
    #[must_use]
    pub fn range(&self) -> &IndexKeyRange {
        &self.range
    }

    /// Storage traversal direction.
    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    /// The output row type: every index column, in key order.
    #[must_use]
    pub fn row_type(&self) -> &Arc<RowType> {
        &self.row_type
    }

    fn encode_bound(
        &self,
        bound: &IndexBound,
        bindings: &QueryBindings,
    ) -> QueryResult<(Vec<u8>, bool)> {
        let values = bound
            .values
            .iter()
            .map(|e| e.evaluate(None, bindings))
            .collect::<QueryResult<Vec<Value>>>()?;
        Ok((self.index.encode_prefix(&values)?, bound.inclusive))
    }

    /// Evaluates the bounds into a byte range, or `None` if no key can
    /// satisfy them.
    ///
    /// # Errors
    ///
    /// Fails if a bound reads an unbound position or cannot be encoded.
    pub fn key_range(&self, bindings: &QueryBindings) -> QueryResult<Option<KeyRange>> {
        let lo = self.range.lo.as_ref().map(|b| self.encode_bound(b, bindings)).transpose()?;
        let hi = self.range.hi.as_ref().map(|b| self.encode_bound(b, bindings)).transpose()?;
        let (lower, upper) = if self.bounds_descending { (hi, lo) } else { (lo, hi) };

        let start = match lower {
            None => Bound::Unbounded,
            Some((prefix, true)) => Bound::Included(prefix),
            Some((prefix, false)) => match prefix_successor(&prefix) {
                Some(successor) => Bound::Included(successor),
                None => return Ok(None),
            },
        };
        let end = match upper {
            None => Bound::Unbounded,
            Some((prefix, false)) => Bound::Excluded(prefix),
            Some((prefix, true)) => {
                prefix_successor(&prefix).map_or(Bound::Unbounded, Bound::Excluded)
            }
        };
        let range = KeyRange::new(start, end);
        Ok((!range.is_empty()).then_some(range))
    }
}

/// Cursor over an [`IndexScanPlan`].
pub struct IndexScanCursor {
    base: CursorBase,
    plan: Arc<IndexScanPlan>,
    ctx: Arc<QueryContext>,
    bindings: BoxedBindingsCursor,
    traversal: Option<KeyTraversal>,
}

impl IndexScanCursor {
    /// Creates an idle cursor.
    #[must_use]
    pub fn new(
        plan: Arc<IndexScanPlan>,
        ctx: Arc<QueryContext>,
        bindings: BoxedBindingsCursor,
    ) -> Self {
        let base = CursorBase::new("IndexScan", Arc::clone(&plan.row_type));
        Self { base, plan, ctx, bindings, traversal: None }
    }

    fn position(&mut self) -> QueryResult<()> {
        let range = self.plan.key_range(self.base.bindings()?)?;
        self.traversal = range.map(|range| {
            KeyTraversal::new(
                Arc::clone(self.ctx.adapter()),
                self.plan.index.storage_table(),
                range,
                self.plan.direction,
                self.ctx.config().scan_batch_size,
            )
        });
        Ok(())
    }
}

impl Cursor for IndexScanCursor {
    fn open(&mut self) -> QueryResult<()> {
        self.base.begin_open()?;
        if let Err(e) = self.position() {
            self.base.finish();
            return Err(e);
        }
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<Row>> {
        self.base.check_next()?;
        self.ctx.check_cancelled()?;
        let entry = match self.traversal.as_mut() {
            Some(traversal) => traversal.next_entry()?,
            None => None,
        };
        let Some((key, _)) = entry else {
            self.traversal = None;
            return Ok(self.base.produced(None));
        };
        self.ctx.record_rows_read(1);
        let values = self.plan.index.decode_key(&key)?;
        let row = Row::new(Arc::clone(&self.plan.row_type), values)?;
        Ok(self.base.produced(Some(row)))
    }

    fn close(&mut self) -> QueryResult<()> {
        self.base.begin_close()?;
        self.traversal = None;
        Ok(())
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
