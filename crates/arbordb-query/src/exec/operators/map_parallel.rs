//! Partitioned parallel map.
//!
//! Runs one copy of a sub-plan per partition on its own thread. Each worker
//! gets a fork of the caller's bindings with its partition value bound at
//! the plan's binding position, a derived context with a private storage
//! session, and its own transaction. Rows travel to the consuming cursor
//! over a bounded channel, so a slow consumer blocks the producers instead
//! of buffering without limit.
//!
//! Rows from different partitions interleave in arrival order; only the
//! order within one partition is preserved.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use arbordb_core::{Value, ValueType};
use tracing::{debug, debug_span, warn};

use crate::error::{QueryError, QueryResult};
use crate::exec::adapter::TransactionMode;
use crate::exec::bindings::{
    Binding, BoxedBindingsCursor, QueryBindings, SingletonBindingsCursor, MAX_BINDING_POSITION,
};
use crate::exec::context::{CancellationToken, QueryContext};
use crate::exec::cursor::{Cursor, CursorBase, CursorState};
use crate::exec::executor::{close_top_level, open_top_level};
use crate::exec::operator::Operator;
use crate::exec::row::{Row, RowType};

/// Plan node fanning a sub-plan out over partitions.
#[derive(Debug)]
pub struct MapParallelPlan {
    input: Operator,
    partitions: Vec<Binding>,
    binding_position: usize,
}

impl MapParallelPlan {
    /// Creates the plan.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Plan`] when there are no partitions, the
    /// position is out of range, or the sub-plan never reads it.
    pub fn new(
        input: Operator,
        partitions: Vec<Binding>,
        binding_position: usize,
    ) -> QueryResult<Self> {
        if partitions.is_empty() {
            return Err(QueryError::plan("a parallel map needs at least one partition"));
        }
        if binding_position > MAX_BINDING_POSITION {
            return Err(QueryError::plan(format!(
                "binding position {binding_position} exceeds {MAX_BINDING_POSITION}"
            )));
        }
        if !input.bound_positions().contains(&binding_position) {
            return Err(QueryError::plan(format!(
                "sub-plan never reads binding position {binding_position}"
            )));
        }
        Ok(Self { input, partitions, binding_position })
    }

    /// The per-partition sub-plan.
    #[must_use]
    pub fn input(&self) -> &Operator {
        &self.input
    }

    /// One binding per partition.
    #[must_use]
    pub fn partitions(&self) -> &[Binding] {
        &self.partitions
    }

    /// Where each worker's partition value is bound.
    #[must_use]
    pub const fn binding_position(&self) -> usize {
        self.binding_position
    }
}

/// Splits `[lo, hi)` into `n` contiguous ranges and returns them as
/// partition bindings, each an `(Int, Int)` row holding one range's ends.
///
/// Boundary `i` is `lo + round(i * (hi - lo) / n)`, so sizes differ by at
/// most one and ranges may be empty when `n` exceeds the span.
///
/// # Errors
///
/// Returns [`QueryError::Plan`] when `n` is zero or `hi < lo`.
pub fn key_range_partitions(lo: i64, hi: i64, n: usize) -> QueryResult<Vec<Binding>> {
    if n == 0 {
        return Err(QueryError::plan("cannot split a key range into zero partitions"));
    }
    if hi < lo {
        return Err(QueryError::plan(format!("key range [{lo}, {hi}) is inverted")));
    }
    let row_type = RowType::new(vec![ValueType::Int, ValueType::Int]);
    #[allow(clippy::cast_precision_loss)]
    let step = (hi as f64 - lo as f64) / n as f64;
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    let boundary = |i: usize| if i == n { hi } else { lo + (step * i as f64).round() as i64 };
    (0..n)
        .map(|i| {
            let values = vec![Value::Int(boundary(i)), Value::Int(boundary(i + 1))];
            Row::new(Arc::clone(&row_type), values).map(Binding::Row)
        })
        .collect()
}

enum Marker {
    Row(Row),
    End { worker: usize },
    Failed { worker: usize, error: QueryError },
}

/// Threads and channel of one open run.
struct Run {
    token: CancellationToken,
    receiver: Option<Receiver<Marker>>,
    workers: Vec<Option<JoinHandle<()>>>,
    reported: Vec<bool>,
    live: usize,
}

impl Run {
    /// Cancels every worker, unblocks their sends and waits for them.
    fn shutdown(&mut self) -> QueryResult<()> {
        self.token.cancel();
        self.receiver = None;
        let mut first_panic = None;
        for (worker, handle) in self.workers.iter_mut().enumerate() {
            if let Some(handle) = handle.take() {
                if handle.join().is_err() && first_panic.is_none() {
                    first_panic = Some(QueryError::WorkerFailed {
                        worker,
                        message: "worker thread panicked".into(),
                    });
                }
            }
        }
        first_panic.map_or(Ok(()), Err)
    }
}

/// Cursor over a [`MapParallelPlan`].
pub struct MapParallelCursor {
    base: CursorBase,
    plan: Arc<MapParallelPlan>,
    ctx: Arc<QueryContext>,
    bindings: BoxedBindingsCursor,
    run: Option<Run>,
}

impl MapParallelCursor {
    /// Creates an idle cursor.
    #[must_use]
    pub fn new(
        plan: Arc<MapParallelPlan>,
        ctx: Arc<QueryContext>,
        bindings: BoxedBindingsCursor,
    ) -> Self {
        let base = CursorBase::new("MapParallel", Arc::clone(plan.input.row_type()));
        Self { base, plan, ctx, bindings, run: None }
    }

    /// Write transactions serialize on the store, so a read-write run may
    /// neither race another worker's write transaction nor wait on one the
    /// calling session still holds.
    fn check_transaction_mode(&self) -> QueryResult<()> {
        if self.ctx.config().transaction_mode != TransactionMode::ReadWrite {
            return Ok(());
        }
        let count = self.plan.partitions.len();
        if count > 1 {
            return Err(QueryError::plan(format!(
                "read-write parallel map needs a single partition, got {count}"
            )));
        }
        if self.ctx.adapter().in_transaction() {
            return Err(QueryError::plan(
                "read-write parallel map cannot run inside an open session transaction",
            ));
        }
        Ok(())
    }

    fn start(&mut self) -> QueryResult<Run> {
        self.check_transaction_mode()?;
        let parent = Arc::clone(self.base.bindings()?);
        let token = self.ctx.cancellation_token().child();
        let (sender, receiver) = mpsc::sync_channel(self.ctx.config().channel_capacity.max(1));
        let count = self.plan.partitions.len();
        let mut run = Run {
            token: token.clone(),
            receiver: Some(receiver),
            workers: Vec::with_capacity(count),
            reported: vec![false; count],
            live: count,
        };

        for (worker, partition) in self.plan.partitions.iter().enumerate() {
            let mut bindings = QueryBindings::fork(&parent);
            bindings.set(self.plan.binding_position, partition.clone());
            let spawned = self.ctx.derive(token.clone()).and_then(|ctx| {
                let plan = self.plan.input.clone();
                let bindings = Arc::new(bindings);
                let sender = sender.clone();
                thread::Builder::new()
                    .name(format!("map-parallel-{worker}"))
                    .spawn(move || run_worker(worker, &plan, &ctx, bindings, &sender))
                    .map_err(|e| QueryError::WorkerFailed { worker, message: e.to_string() })
            });
            match spawned {
                Ok(handle) => {
                    self.ctx.record_worker_started();
                    run.workers.push(Some(handle));
                }
                Err(e) => {
                    // Workers already started are told to stop and joined.
                    drop(sender);
                    run.shutdown()?;
                    return Err(e);
                }
            }
        }
        debug!(partitions = count, "started parallel map workers");
        Ok(run)
    }

    /// Ends the run after the first error, once every worker has stopped.
    fn fail(&mut self, error: QueryError) -> QueryError {
        if let Some(mut run) = self.run.take() {
            if let Err(join_error) = run.shutdown() {
                debug!(error = %join_error, "worker also failed while shutting down");
            }
        }
        error
    }
}

fn run_worker(
    worker: usize,
    plan: &Operator,
    ctx: &Arc<QueryContext>,
    bindings: Arc<QueryBindings>,
    sender: &SyncSender<Marker>,
) {
    let span = debug_span!("map_parallel_worker", worker);
    let _guard = span.enter();

    let marker = match run_partition(plan, ctx, bindings, sender) {
        Ok(()) => Marker::End { worker },
        Err(error) => {
            debug!(%error, "partition failed");
            Marker::Failed { worker, error }
        }
    };
    ctx.record_worker_finished();
    // The consumer is gone once it has closed; nothing is left to report.
    let _ = sender.send(marker);
}

fn run_partition(
    plan: &Operator,
    ctx: &Arc<QueryContext>,
    bindings: Arc<QueryBindings>,
    sender: &SyncSender<Marker>,
) -> QueryResult<()> {
    ctx.adapter().begin_transaction(ctx.config().transaction_mode)?;
    let mut cursor = plan.cursor(ctx, SingletonBindingsCursor::boxed(bindings));
    let pumped = pump(cursor.as_mut(), ctx, sender);
    let closed = close_top_level(cursor.as_mut()).and(cursor.destroy());
    match pumped.and(closed) {
        Ok(()) => ctx.adapter().commit_transaction(),
        Err(error) => {
            if let Err(rollback) = ctx.adapter().rollback_transaction() {
                warn!(error = %rollback, "rollback failed after partition error");
            }
            Err(error)
        }
    }
}

fn pump(
    cursor: &mut dyn Cursor,
    ctx: &QueryContext,
    sender: &SyncSender<Marker>,
) -> QueryResult<()> {
    if !open_top_level(cursor)? {
        return Ok(());
    }
    while let Some(row) = cursor.next()? {
        ctx.check_cancelled()?;
        sender.send(Marker::Row(row)).map_err(|_| QueryError::Cancelled)?;
    }
    Ok(())
}

impl Cursor for MapParallelCursor {
    fn open(&mut self) -> QueryResult<()> {
        self.base.begin_open()?;
        match self.start() {
            Ok(run) => {
                self.run = Some(run);
                Ok(())
            }
            Err(e) => {
                self.base.finish();
                Err(e)
            }
        }
    }

    fn next(&mut self) -> QueryResult<Option<Row>> {
        self.base.check_next()?;
        let poll = self.ctx.config().poll_interval;
        loop {
            if let Err(e) = self.ctx.check_cancelled() {
                return Err(self.fail(e));
            }
            let Some(run) = self.run.as_mut() else {
                return Ok(self.base.produced(None));
            };
            if run.live == 0 {
                let joined = run.shutdown();
                self.run = None;
                joined?;
                return Ok(self.base.produced(None));
            }
            let received = match run.receiver.as_ref() {
                Some(receiver) => receiver.recv_timeout(poll),
                None => Err(RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(Marker::Row(row)) => return Ok(self.base.produced(Some(row))),
                Ok(Marker::End { worker }) => {
                    run.reported[worker] = true;
                    run.live -= 1;
                }
                Ok(Marker::Failed { worker, error }) => {
                    run.reported[worker] = true;
                    run.live -= 1;
                    return Err(self.fail(error));
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    let worker = run.reported.iter().position(|done| !done).unwrap_or(0);
                    let error = QueryError::WorkerFailed {
                        worker,
                        message: "exited without reporting completion".into(),
                    };
                    return Err(self.fail(error));
                }
            }
        }
    }

    fn close(&mut self) -> QueryResult<()> {
        self.base.begin_close()?;
        match self.run.take() {
            Some(mut run) => run.shutdown(),
            None => Ok(()),
        }
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

impl Drop for MapParallelCursor {
    fn drop(&mut self) {
        if let Some(mut run) = self.run.take() {
            if let Err(error) = run.shutdown() {
                warn!(%error, "parallel map dropped with a failed worker");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::exec::context::ExecutionConfig;
    use crate::exec::expression::Expression;
    use crate::exec::operators::test_support::{
        check_protocol, context, context_with, int_rows, run,
    };

    fn bounds(partitions: &[Binding]) -> Vec<(i64, i64)> {
        partitions
            .iter()
            .map(|b| match b {
                Binding::Row(row) => {
                    let field = |i| row.value(i).unwrap().as_int().unwrap();
                    (field(0), field(1))
                }
                Binding::Value(_) => panic!("expected row bindings"),
            })
            .collect()
    }

    #[test]
    fn partitions_cover_the_range() {
        assert_eq!(bounds(&key_range_partitions(0, 10, 2).unwrap()), vec![(0, 5), (5, 10)]);
        assert_eq!(
            bounds(&key_range_partitions(0, 10, 3).unwrap()),
            vec![(0, 3), (3, 7), (7, 10)]
        );
        assert_eq!(bounds(&key_range_partitions(5, 6, 3).unwrap()), vec![(5, 5), (5, 6), (6, 6)]);
        assert!(key_range_partitions(0, 10, 0).is_err());
        assert!(key_range_partitions(10, 0, 2).is_err());
    }

    /// Keeps the values rows whose first field lies in the bound range.
    fn in_partition(input: Operator) -> Operator {
        let lo = Expression::bound_field(0, 0, arbordb_core::ValueType::Int);
        let hi = Expression::bound_field(0, 1, arbordb_core::ValueType::Int);
        let predicate = Expression::field(0).ge(lo).and(Expression::field(0).lt(hi));
        Operator::select(input, predicate).unwrap()
    }

    fn numbers(n: i64) -> Operator {
        let rows: Vec<Vec<Option<i64>>> = (0..n).map(|i| vec![Some(i)]).collect();
        let refs: Vec<&[Option<i64>]> = rows.iter().map(Vec::as_slice).collect();
        int_rows(&refs)
    }

    #[test]
    fn partitions_together_produce_every_row() {
        let ctx = context_with(ExecutionConfig::new().with_channel_capacity(2));
        let plan = Operator::map_parallel(
            in_partition(numbers(50)),
            key_range_partitions(0, 50, 4).unwrap(),
            0,
        )
        .unwrap();
        let mut out: Vec<i64> = run(&plan, &ctx).iter().map(|r| r[0].as_int().unwrap()).collect();
        out.sort_unstable();
        assert_eq!(out, (0..50).collect::<Vec<_>>());
        assert_eq!(ctx.stats().workers_started(), 4);
        assert_eq!(ctx.stats().workers_finished(), 4);
    }

    #[test]
    fn worker_errors_reach_the_consumer() {
        let ctx = context();
        let failing = Operator::project(
            in_partition(numbers(10)),
            vec![Expression::literal(1i64).divide(Expression::field(0))],
        )
        .unwrap();
        let plan =
            Operator::map_parallel(failing, key_range_partitions(0, 10, 2).unwrap(), 0).unwrap();
        let err = crate::exec::executor::execute(&plan, &ctx, QueryBindings::new());
        assert!(matches!(err, Err(QueryError::DivisionByZero)));
        assert_eq!(ctx.stats().workers_started(), ctx.stats().workers_finished());
    }

    #[test]
    fn parent_cancellation_stops_the_consumer() {
        let ctx = context_with(
            ExecutionConfig::new()
                .with_channel_capacity(1)
                .with_poll_interval(Duration::from_millis(1)),
        );
        let plan = Operator::map_parallel(
            in_partition(numbers(1000)),
            key_range_partitions(0, 1000, 2).unwrap(),
            0,
        )
        .unwrap();
        let mut cursor = plan.cursor(
            &ctx,
            crate::exec::bindings::SingletonBindingsCursor::boxed(Arc::new(QueryBindings::new())),
        );
        assert!(crate::exec::executor::open_top_level(cursor.as_mut()).unwrap());
        assert!(cursor.next().unwrap().is_some());
        ctx.cancel();
        assert!(cursor.next().unwrap_err().is_cancelled());
        crate::exec::executor::close_top_level(cursor.as_mut()).unwrap();
        cursor.destroy().unwrap();
        assert_eq!(ctx.stats().workers_started(), ctx.stats().workers_finished());
    }

    #[test]
    fn read_write_runs_refuse_to_wait_on_the_write_lock() {
        let ctx = context_with(
            ExecutionConfig::new().with_transaction_mode(TransactionMode::ReadWrite),
        );
        let execute = |partitions| {
            let plan =
                Operator::map_parallel(in_partition(numbers(10)), partitions, 0).unwrap();
            crate::exec::executor::execute(&plan, &ctx, QueryBindings::new())
        };

        let err = execute(key_range_partitions(0, 10, 2).unwrap());
        assert!(matches!(err, Err(QueryError::Plan(_))));

        ctx.adapter().begin_transaction(TransactionMode::ReadWrite).unwrap();
        let err = execute(key_range_partitions(0, 10, 1).unwrap());
        assert!(matches!(err, Err(QueryError::Plan(_))));
        ctx.adapter().rollback_transaction().unwrap();
        assert_eq!(ctx.stats().workers_started(), 0);

        let rows = execute(key_range_partitions(0, 10, 1).unwrap()).unwrap();
        assert_eq!(rows.len(), 10);
        assert_eq!(ctx.stats().workers_finished(), 1);
        assert!(!ctx.adapter().in_transaction());
    }

    #[test]
    fn read_only_runs_ignore_the_session_transaction() {
        let ctx = context();
        ctx.adapter().begin_transaction(TransactionMode::ReadWrite).unwrap();
        let plan = Operator::map_parallel(
            in_partition(numbers(10)),
            key_range_partitions(0, 10, 3).unwrap(),
            0,
        )
        .unwrap();
        assert_eq!(run(&plan, &ctx).len(), 10);
        ctx.adapter().rollback_transaction().unwrap();
    }

    #[test]
    fn map_parallel_protocol() {
        let plan = Operator::map_parallel(
            in_partition(numbers(6)),
            key_range_partitions(0, 6, 3).unwrap(),
            0,
        )
        .unwrap();
        check_protocol(&plan, &context());
    }
}
