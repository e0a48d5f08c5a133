//! Nullable scalar values.
//!
//! This module provides the [`Value`] enum, the unit of data carried in row
//! fields, expression results and index key columns, together with the
//! [`ValueType`] tag used by row types to describe each position.
//!
//! # Example
//!
//! ```
//! use arbordb_core::{Value, ValueType};
//!
//! let name: Value = "Alice".into();
//! let age: Value = 30i64.into();
//!
//! assert_eq!(name.as_str(), Some("Alice"));
//! assert_eq!(age.value_type(), Some(ValueType::Int));
//! assert!(Value::Null.conforms_to(ValueType::String));
//! ```

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The declared type of a row position or key column.
///
/// Every type is nullable; a [`Value::Null`] conforms to all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    /// Boolean.
    Bool,
    /// 64-bit signed integer.
    Int,
    /// 64-bit floating point number.
    Float,
    /// UTF-8 string.
    String,
    /// Raw bytes.
    Bytes,
}

impl ValueType {
    /// Returns `true` for `Int` and `Float`.
    #[inline]
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Int | Self::Float)
    }

    /// Returns `true` if values of the two types can be ordered against each other.
    #[must_use]
    pub const fn is_comparable_with(self, other: Self) -> bool {
        match (self, other) {
            (Self::Bool, Self::Bool)
            | (Self::String, Self::String)
            | (Self::Bytes, Self::Bytes) => true,
            (a, b) => a.is_numeric() && b.is_numeric(),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "Bool",
            Self::Int => "Int",
            Self::Float => "Float",
            Self::String => "String",
            Self::Bytes => "Bytes",
        };
        f.write_str(name)
    }
}

/// A nullable scalar value.
///
/// | Variant | Rust Type | Use Case |
/// |---------|-----------|----------|
/// | `Null` | - | Missing/optional values |
/// | `Bool` | `bool` | Flags |
/// | `Int` | `i64` | Keys, counters, timestamps |
/// | `Float` | `f64` | Measurements |
/// | `String` | `String` | Text |
/// | `Bytes` | `Vec<u8>` | Binary data |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Null/missing value
    Null,
    /// Boolean value
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit floating point number
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Raw bytes
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns `true` if the value is null.
    #[inline]
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the type tag of this value, or `None` for null.
    #[must_use]
    pub const fn value_type(&self) -> Option<ValueType> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(ValueType::Bool),
            Self::Int(_) => Some(ValueType::Int),
            Self::Float(_) => Some(ValueType::Float),
            Self::String(_) => Some(ValueType::String),
            Self::Bytes(_) => Some(ValueType::Bytes),
        }
    }

    /// Returns `true` if this value may be stored in a slot of type `ty`.
    #[must_use]
    pub fn conforms_to(&self, ty: ValueType) -> bool {
        self.value_type().map_or(true, |own| own == ty)
    }

    /// Returns the value as a boolean if it is one.
    #[inline]
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the value as an integer if it is one.
    #[inline]
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the value as a float, widening integers.
    #[inline]
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            #[allow(clippy::cast_precision_loss)]
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Returns the value as a string slice if it is one.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as a byte slice if it is one.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Orders two non-null values of comparable types.
    ///
    /// Integers and floats compare numerically. Returns `None` when either
    /// side is null, the types cannot be compared, or a float is NaN.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Bytes(a), Self::Bytes(b)) => Some(a.cmp(b)),
            (Self::Float(_) | Self::Int(_), Self::Float(_) | Self::Int(_)) => {
                self.as_float()?.partial_cmp(&other.as_float()?)
            }
            _ => None,
        }
    }

    /// Orders any two values the way their ascending key encodings order.
    ///
    /// Unlike [`Value::compare`] this is a total order: values of different
    /// types order by type, `Null` first, and floats order with `-0.0`
    /// before `0.0` and every NaN equal to each other and last.
    #[must_use]
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => float_order_key(*a).cmp(&float_order_key(*b)),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Bytes(a), Self::Bytes(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    const fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Int(_) => 2,
            Self::Float(_) => 3,
            Self::String(_) => 4,
            Self::Bytes(_) => 5,
        }
    }
}

/// Maps a float onto an unsigned integer with the same order as its key
/// encoding. Every NaN maps to the maximum.
pub(crate) fn float_order_key(f: f64) -> u64 {
    const SIGN: u64 = 0x8000_0000_0000_0000;
    let bits = f.to_bits();
    if f.is_nan() {
        u64::MAX
    } else if bits & SIGN == 0 {
        bits ^ SIGN
    } else {
        !bits
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => write!(f, "'{s}'"),
            Self::Bytes(b) => {
                f.write_str("x'")?;
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                f.write_str("'")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_conforms_to_every_type() {
        let types = [
            ValueType::Bool,
            ValueType::Int,
            ValueType::Float,
            ValueType::String,
            ValueType::Bytes,
        ];
        for ty in types {
            assert!(Value::Null.conforms_to(ty));
        }
        assert!(!Value::Int(1).conforms_to(ValueType::Float));
    }

    #[test]
    fn numeric_comparison_crosses_int_and_float() {
        assert_eq!(Value::Int(2).compare(&Value::Float(2.5)), Some(Ordering::Less));
        assert_eq!(Value::Float(3.0).compare(&Value::Int(3)), Some(Ordering::Equal));
    }

    #[test]
    fn comparison_with_null_or_mixed_types_is_undefined() {
        assert_eq!(Value::Null.compare(&Value::Int(1)), None);
        assert_eq!(Value::from("a").compare(&Value::Int(1)), None);
        assert_eq!(Value::Float(f64::NAN).compare(&Value::Float(1.0)), None);
    }

    #[test]
    fn total_order_groups_nan_and_ranks_types() {
        let nan = Value::Float(f64::NAN);
        assert_eq!(nan.total_cmp(&Value::Float(-f64::NAN)), Ordering::Equal);
        assert_eq!(nan.total_cmp(&Value::Float(f64::INFINITY)), Ordering::Greater);
        assert_eq!(Value::Float(-0.0).total_cmp(&Value::Float(0.0)), Ordering::Less);
        assert_eq!(Value::Null.total_cmp(&Value::Bool(false)), Ordering::Less);
        assert_eq!(Value::Int(100).total_cmp(&Value::Float(-1.0)), Ordering::Less);
        assert_eq!(Value::from("b").total_cmp(&Value::from("a")), Ordering::Greater);
    }

    #[test]
    fn option_conversion() {
        assert_eq!(Value::from(Some(5i64)), Value::Int(5));
        assert_eq!(Value::from(None::<i64>), Value::Null);
    }

    #[test]
    fn display() {
        assert_eq!(Value::from("M").to_string(), "'M'");
        assert_eq!(Value::Bytes(vec![0xab, 0x01]).to_string(), "x'ab01'");
        assert_eq!(Value::Null.to_string(), "NULL");
    }
}
