//! Top-level entry points that drive both cursor protocols.
//!
//! Callers that iterate binding sets themselves use the cursor protocol
//! directly. Everyone else goes through [`execute`], which runs a plan once
//! per binding set and collects the rows.

use std::sync::Arc;

use tracing::debug;

use super::bindings::{BoxedBindingsCursor, QueryBindings, SingletonBindingsCursor};
use super::context::QueryContext;
use super::cursor::Cursor;
use super::operator::Operator;
use super::row::Row;
use crate::error::QueryResult;

/// Opens the bindings protocol and the first run.
///
/// Returns `false`, leaving the cursor idle, if the bindings cursor yields
/// no binding set.
///
/// # Errors
///
/// Fails if the cursor cannot be opened.
pub fn open_top_level(cursor: &mut dyn Cursor) -> QueryResult<bool> {
    cursor.open_bindings()?;
    if cursor.next_bindings()?.is_none() {
        return Ok(false);
    }
    cursor.open()?;
    Ok(true)
}

/// Closes the current run and the bindings protocol.
///
/// Both are attempted even if the first fails; the first error wins.
///
/// # Errors
///
/// Fails if either close fails.
pub fn close_top_level(cursor: &mut dyn Cursor) -> QueryResult<()> {
    let closed = cursor.close();
    let unbound = cursor.close_bindings();
    closed.and(unbound)
}

/// Pulls every row of the current run, counting them as produced.
///
/// # Errors
///
/// Propagates the first cursor error.
pub fn collect_rows(cursor: &mut dyn Cursor, ctx: &QueryContext) -> QueryResult<Vec<Row>> {
    let mut rows = Vec::new();
    while let Some(row) = cursor.next()? {
        rows.push(row);
    }
    ctx.record_rows_produced(rows.len() as u64);
    Ok(rows)
}

/// Runs `plan` with a single binding set and returns its rows.
///
/// # Errors
///
/// Propagates any error raised while running; the cursor tree is closed
/// and destroyed either way.
pub fn execute(
    plan: &Operator,
    ctx: &Arc<QueryContext>,
    bindings: QueryBindings,
) -> QueryResult<Vec<Row>> {
    execute_with(plan, ctx, SingletonBindingsCursor::boxed(Arc::new(bindings)))
}

/// Runs `plan` once per binding set of `bindings` and concatenates the rows.
///
/// # Errors
///
/// Propagates any error raised while running; the cursor tree is closed
/// and destroyed either way.
pub fn execute_with(
    plan: &Operator,
    ctx: &Arc<QueryContext>,
    bindings: BoxedBindingsCursor,
) -> QueryResult<Vec<Row>> {
    let mut cursor = plan.cursor(ctx, bindings);
    let result = run_all(cursor.as_mut(), ctx);
    let closed = close_top_level(cursor.as_mut());
    let destroyed = cursor.destroy();
    let rows = result?;
    closed.and(destroyed)?;
    debug!(plan = plan.name(), rows = rows.len(), "executed plan");
    Ok(rows)
}

fn run_all(cursor: &mut dyn Cursor, ctx: &QueryContext) -> QueryResult<Vec<Row>> {
    let mut rows = Vec::new();
    cursor.open_bindings()?;
    while cursor.next_bindings()?.is_some() {
        cursor.open()?;
        rows.extend(collect_rows(cursor, ctx)?);
        cursor.close()?;
    }
    Ok(rows)
}
