//! Rows and row types.
//!
//! A [`Row`] is an immutable, fixed-arity tuple tied to the [`RowType`] of
//! the plan node that produced it. Rows are shared handles: cloning a row
//! acquires another reference to the same values and dropping it releases
//! that reference, so the values are reclaimed exactly when the last holder
//! lets go. A cursor owns the reference it hands out from `next()`; any
//! holder that keeps the row longer simply keeps its clone, and a row moved
//! through a channel transfers its reference to the receiver.

use std::fmt;
use std::sync::Arc;

use arbordb_core::{Value, ValueType};

use crate::error::{QueryError, QueryResult};

/// What a row type was derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOrigin {
    /// Rows of a table.
    Table(String),
    /// Entries of an index.
    Index {
        /// The indexed table.
        table: String,
        /// The index name.
        index: String,
    },
}

/// Immutable descriptor of a row: arity, per-position type and origin.
///
/// Row types are fixed when a plan is built and shared by every cursor
/// instantiated from that plan node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowType {
    fields: Vec<ValueType>,
    origin: Option<RowOrigin>,
}

impl RowType {
    /// Creates a row type with no origin.
    #[must_use]
    pub fn new(fields: Vec<ValueType>) -> Arc<Self> {
        Arc::new(Self { fields, origin: None })
    }

    /// Creates a row type linked to the table or index it describes.
    #[must_use]
    pub fn with_origin(fields: Vec<ValueType>, origin: RowOrigin) -> Arc<Self> {
        Arc::new(Self { fields, origin: Some(origin) })
    }

    /// Number of fields.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.fields.len()
    }

    /// Type of the field at `index`.
    #[must_use]
    pub fn field_type(&self, index: usize) -> Option<ValueType> {
        self.fields.get(index).copied()
    }

    /// All field types in order.
    #[must_use]
    pub fn fields(&self) -> &[ValueType] {
        &self.fields
    }

    /// The table or index this type was derived from.
    #[must_use]
    pub fn origin(&self) -> Option<&RowOrigin> {
        self.origin.as_ref()
    }

    /// Returns `true` if rows of `other` can stand in for rows of `self`:
    /// same arity and field types, regardless of origin.
    #[must_use]
    pub fn is_compatible(&self, other: &Self) -> bool {
        self.fields == other.fields
    }

    /// Checks that `values` fit this row type.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::TypeMismatch`] on an arity or type mismatch.
    pub fn check(&self, values: &[Value]) -> QueryResult<()> {
        if values.len() != self.fields.len() {
            return Err(QueryError::TypeMismatch(format!(
                "row type has {} fields, got {} values",
                self.fields.len(),
                values.len()
            )));
        }
        for (i, (value, ty)) in values.iter().zip(&self.fields).enumerate() {
            if !value.conforms_to(*ty) {
                return Err(QueryError::TypeMismatch(format!(
                    "field {i} is declared {ty}, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// A shared, immutable tuple of values.
#[derive(Clone)]
pub struct Row {
    row_type: Arc<RowType>,
    values: Arc<[Value]>,
}

impl Row {
    /// Creates a row, checking the values against `row_type`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::TypeMismatch`] if the values do not fit.
    pub fn new(row_type: Arc<RowType>, values: Vec<Value>) -> QueryResult<Self> {
        row_type.check(&values)?;
        Ok(Self { row_type, values: values.into() })
    }

    /// The row type this row conforms to.
    #[must_use]
    pub fn row_type(&self) -> &Arc<RowType> {
        &self.row_type
    }

    /// The value at `index`.
    #[inline]
    #[must_use]
    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// All values in order.
    #[inline]
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Number of values.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.values.len()
    }

    /// Number of live references to this row's values.
    #[must_use]
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.values)
    }

    /// Returns `true` if another holder also references these values.
    #[must_use]
    pub fn is_shared(&self) -> bool {
        self.ref_count() > 1
    }

    /// Copies the values out of the row.
    #[must_use]
    pub fn to_values(&self) -> Vec<Value> {
        self.values.to_vec()
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.row_type.is_compatible(&other.row_type) && self.values == other.values
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.values.iter()).finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::thread;

    use super::*;

    fn pair_type() -> Arc<RowType> {
        RowType::new(vec![ValueType::Int, ValueType::String])
    }

    #[test]
    fn rows_are_checked_against_their_type() {
        let row_type = pair_type();
        assert!(Row::new(Arc::clone(&row_type), vec![Value::Int(1), Value::Null]).is_ok());
        assert!(Row::new(Arc::clone(&row_type), vec![Value::Int(1)]).is_err());
        assert!(Row::new(row_type, vec![Value::from("x"), Value::from("y")]).is_err());
    }

    #[test]
    fn clone_acquires_and_drop_releases() {
        let row = Row::new(pair_type(), vec![Value::Int(7), Value::from("seven")]).unwrap();
        assert_eq!(row.ref_count(), 1);
        let held = row.clone();
        assert_eq!(row.ref_count(), 2);
        assert!(held.is_shared());
        drop(held);
        assert_eq!(row.ref_count(), 1);
        assert!(!row.is_shared());
    }

    #[test]
    fn origin_does_not_affect_compatibility() {
        let plain = RowType::new(vec![ValueType::Int]);
        let indexed = RowType::with_origin(
            vec![ValueType::Int],
            RowOrigin::Index { table: "t".into(), index: "i".into() },
        );
        assert!(plain.is_compatible(&indexed));
        assert_ne!(plain, indexed);
        let origin = RowOrigin::Index { table: "t".into(), index: "i".into() };
        assert_eq!(indexed.origin(), Some(&origin));
    }

    #[test]
    fn shared_rows_survive_cross_thread_release() {
        let row = Row::new(pair_type(), vec![Value::Int(42), Value::from("answer")]).unwrap();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let row = row.clone();
                thread::spawn(move || {
                    for _ in 0..1_000 {
                        let acquired = row.clone();
                        assert_eq!(acquired.value(0), Some(&Value::Int(42)));
                        assert_eq!(acquired.value(1), Some(&Value::from("answer")));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(row.ref_count(), 1);
    }
}
