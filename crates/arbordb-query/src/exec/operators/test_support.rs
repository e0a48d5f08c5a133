//! Shared fixtures for operator tests.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use arbordb_core::{IndexDef, Value, ValueType};
use arbordb_storage::backends::RedbEngine;

use crate::exec::adapter::EngineAdapter;
use crate::exec::bindings::{QueryBindings, SingletonBindingsCursor};
use crate::exec::context::{ExecutionConfig, QueryContext};
use crate::exec::executor;
use crate::exec::operator::Operator;
use crate::exec::row::{Row, RowType};

pub(crate) fn context() -> Arc<QueryContext> {
    context_with(ExecutionConfig::new().with_scan_batch_size(4))
}

pub(crate) fn context_with(config: ExecutionConfig) -> Arc<QueryContext> {
    let engine = Arc::new(RedbEngine::in_memory().unwrap());
    QueryContext::with_config(EngineAdapter::new(engine), config)
}

/// A values plan of nullable integer rows.
pub(crate) fn int_rows(rows: &[&[Option<i64>]]) -> Operator {
    let arity = rows.first().map_or(1, |r| r.len());
    let row_type = RowType::new(vec![ValueType::Int; arity]);
    let rows = rows
        .iter()
        .map(|r| Row::new(Arc::clone(&row_type), r.iter().map(|v| Value::from(*v)).collect()))
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    Operator::values(row_type, rows).unwrap()
}

/// Runs a plan and returns its rows as plain values.
pub(crate) fn run(plan: &Operator, ctx: &Arc<QueryContext>) -> Vec<Vec<Value>> {
    executor::execute(plan, ctx, QueryBindings::new())
        .unwrap()
        .iter()
        .map(Row::to_values)
        .collect()
}

pub(crate) fn ints(values: &[i64]) -> Vec<Value> {
    values.iter().copied().map(Value::Int).collect()
}

/// Writes one index entry per row.
pub(crate) fn load_index(ctx: &QueryContext, index: &IndexDef, rows: &[Vec<Value>]) {
    for row in rows {
        ctx.adapter().put(&index.storage_table(), &index.encode_key(row).unwrap(), &[]).unwrap();
    }
}

/// Walks a plan's cursor through the whole state machine, checking that
/// every illegal call is rejected and every produced row has the plan's
/// row type.
pub(crate) fn check_protocol(plan: &Operator, ctx: &Arc<QueryContext>) {
    let bindings = SingletonBindingsCursor::boxed(Arc::new(QueryBindings::new()));
    let mut cursor = plan.cursor(ctx, bindings);
    assert_eq!(cursor.name(), plan.name());
    assert!(cursor.state().is_idle());
    assert!(cursor.next().unwrap_err().is_protocol_violation());

    cursor.open_bindings().unwrap();
    assert!(cursor.next_bindings().unwrap().is_some());
    cursor.open().unwrap();
    assert!(cursor.open().unwrap_err().is_protocol_violation());
    while let Some(row) = cursor.next().unwrap() {
        assert!(row.row_type().is_compatible(plan.row_type()));
        assert!(row.row_type().is_compatible(cursor.row_type()));
    }
    assert!(cursor.state().is_idle());
    assert!(cursor.next().unwrap_err().is_protocol_violation());

    cursor.close().unwrap();
    cursor.close().unwrap();
    assert!(cursor.next().unwrap_err().is_protocol_violation());

    cursor.open().unwrap();
    cursor.close().unwrap();

    cursor.destroy().unwrap();
    assert!(cursor.state().is_destroyed());
    assert!(cursor.destroy().unwrap_err().is_protocol_violation());
    assert!(cursor.close().unwrap_err().is_protocol_violation());
    assert!(cursor.open().unwrap_err().is_protocol_violation());
    assert!(cursor.next_bindings().unwrap_err().is_protocol_violation());
}
