//! Scalar types shared by rows, expressions and index keys.

mod value;

pub(crate) use value::float_order_key;
pub use value::{Value, ValueType};
