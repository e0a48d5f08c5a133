//! Scalar expressions evaluated against a row and a binding set.
//!
//! Expressions follow SQL three-valued logic: comparisons and arithmetic
//! with a null operand yield null, `AND`/`OR` treat null as unknown, and a
//! select keeps a row only when its predicate is exactly `true`.

use std::collections::BTreeSet;
use std::fmt;

use arbordb_core::{Value, ValueType};

use super::bindings::QueryBindings;
use super::row::{Row, RowType};
use crate::error::{QueryError, QueryResult};

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
}

/// A scalar expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A field of the input row.
    Field(usize),
    /// A scalar parameter bound at `position`.
    Bound {
        /// Binding position.
        position: usize,
        /// Declared type of the parameter.
        value_type: ValueType,
    },
    /// A field of the row bound at `position`.
    BoundField {
        /// Binding position.
        position: usize,
        /// Field of the bound row.
        field: usize,
        /// Declared type of the field.
        value_type: ValueType,
    },
    /// A constant.
    Literal(Value),
    /// A typed null constant.
    Null(ValueType),
    /// A comparison.
    Compare {
        /// The operator.
        op: CompareOp,
        /// Left operand.
        left: Box<Expression>,
        /// Right operand.
        right: Box<Expression>,
    },
    /// Logical conjunction.
    And(Box<Expression>, Box<Expression>),
    /// Logical disjunction.
    Or(Box<Expression>, Box<Expression>),
    /// Logical negation.
    Not(Box<Expression>),
    /// `IS NULL`
    IsNull(Box<Expression>),
    /// Checked arithmetic.
    Arithmetic {
        /// The operator.
        op: ArithmeticOp,
        /// Left operand.
        left: Box<Expression>,
        /// Right operand.
        right: Box<Expression>,
    },
}

impl Expression {
    /// References field `index` of the input row.
    #[must_use]
    pub const fn field(index: usize) -> Self {
        Self::Field(index)
    }

    /// A constant.
    #[must_use]
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// A null of type `value_type`.
    #[must_use]
    pub const fn null(value_type: ValueType) -> Self {
        Self::Null(value_type)
    }

    /// The scalar parameter at `position`.
    #[must_use]
    pub const fn bound(position: usize, value_type: ValueType) -> Self {
        Self::Bound { position, value_type }
    }

    /// Field `field` of the row bound at `position`.
    #[must_use]
    pub const fn bound_field(position: usize, field: usize, value_type: ValueType) -> Self {
        Self::BoundField { position, field, value_type }
    }

    fn compare(self, op: CompareOp, other: Self) -> Self {
        Self::Compare { op, left: Box::new(self), right: Box::new(other) }
    }

    fn arithmetic(self, op: ArithmeticOp, other: Self) -> Self {
        Self::Arithmetic { op, left: Box::new(self), right: Box::new(other) }
    }

    /// `self = other`
    #[must_use]
    pub fn eq(self, other: Self) -> Self {
        self.compare(CompareOp::Eq, other)
    }

    /// `self <> other`
    #[must_use]
    pub fn ne(self, other: Self) -> Self {
        self.compare(CompareOp::Ne, other)
    }

    /// `self < other`
    #[must_use]
    pub fn lt(self, other: Self) -> Self {
        self.compare(CompareOp::Lt, other)
    }

    /// `self <= other`
    #[must_use]
    pub fn le(self, other: Self) -> Self {
        self.compare(CompareOp::Le, other)
    }

    /// `self > other`
    #[must_use]
    pub fn gt(self, other: Self) -> Self {
        self.compare(CompareOp::Gt, other)
    }

    /// `self >= other`
    #[must_use]
    pub fn ge(self, other: Self) -> Self {
        self.compare(CompareOp::Ge, other)
    }

    /// `self AND other`
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    /// `self OR other`
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    /// `NOT self`
    #[must_use]
    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// `self IS NULL`
    #[must_use]
    pub fn is_null(self) -> Self {
        Self::IsNull(Box::new(self))
    }

    /// `self + other`
    #[must_use]
    pub fn plus(self, other: Self) -> Self {
        self.arithmetic(ArithmeticOp::Add, other)
    }

    /// `self - other`
    #[must_use]
    pub fn minus(self, other: Self) -> Self {
        self.arithmetic(ArithmeticOp::Sub, other)
    }

    /// `self * other`
    #[must_use]
    pub fn times(self, other: Self) -> Self {
        self.arithmetic(ArithmeticOp::Mul, other)
    }

    /// `self / other`
    #[must_use]
    pub fn divide(self, other: Self) -> Self {
        self.arithmetic(ArithmeticOp::Div, other)
    }

    /// Infers the type this expression yields over rows of `input`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Plan`] for out-of-range fields, untyped null
    /// literals and operands of the wrong type.
    pub fn result_type(&self, input: &RowType) -> QueryResult<ValueType> {
        match self {
            Self::Field(index) => input.field_type(*index).ok_or_else(|| {
                QueryError::plan(format!(
                    "field {index} out of range for a row of arity {}",
                    input.arity()
                ))
            }),
            Self::Bound { value_type, .. }
            | Self::BoundField { value_type, .. }
            | Self::Null(value_type) => Ok(*value_type),
            Self::Literal(value) => value.value_type().ok_or_else(|| {
                QueryError::plan("untyped null literal; use Expression::null with a type")
            }),
            Self::Compare { op, left, right } => {
                let (l, r) = (left.result_type(input)?, right.result_type(input)?);
                if !l.is_comparable_with(r) {
                    return Err(QueryError::plan(format!("cannot apply {op} to {l} and {r}")));
                }
                Ok(ValueType::Bool)
            }
            Self::And(left, right) | Self::Or(left, right) => {
                expect_bool(left.result_type(input)?)?;
                expect_bool(right.result_type(input)?)?;
                Ok(ValueType::Bool)
            }
            Self::Not(inner) => {
                expect_bool(inner.result_type(input)?)?;
                Ok(ValueType::Bool)
            }
            Self::IsNull(inner) => {
                inner.result_type(input)?;
                Ok(ValueType::Bool)
            }
            Self::Arithmetic { op, left, right } => {
                let (l, r) = (left.result_type(input)?, right.result_type(input)?);
                match (l, r) {
                    (ValueType::Int, ValueType::Int) => Ok(ValueType::Int),
                    _ if l.is_numeric() && r.is_numeric() => Ok(ValueType::Float),
                    _ => Err(QueryError::plan(format!("cannot apply {op} to {l} and {r}"))),
                }
            }
        }
    }

    /// Binding positions this expression reads.
    #[must_use]
    pub fn bound_positions(&self) -> BTreeSet<usize> {
        let mut positions = BTreeSet::new();
        self.visit(&mut |expr| {
            if let Self::Bound { position, .. } | Self::BoundField { position, .. } = expr {
                positions.insert(*position);
            }
        });
        positions
    }

    /// Returns `true` if the expression reads the input row.
    #[must_use]
    pub fn references_fields(&self) -> bool {
        let mut found = false;
        self.visit(&mut |expr| found |= matches!(expr, Self::Field(_)));
        found
    }

    fn visit(&self, f: &mut impl FnMut(&Self)) {
        f(self);
        match self {
            Self::Compare { left, right, .. }
            | Self::Arithmetic { left, right, .. }
            | Self::And(left, right)
            | Self::Or(left, right) => {
                left.visit(f);
                right.visit(f);
            }
            Self::Not(inner) | Self::IsNull(inner) => inner.visit(f),
            Self::Field(_)
            | Self::Bound { .. }
            | Self::BoundField { .. }
            | Self::Literal(_)
            | Self::Null(_) => {}
        }
    }

    /// Evaluates the expression.
    ///
    /// `row` is `None` where no input row exists, such as index scan bounds.
    ///
    /// # Errors
    ///
    /// Fails on unbound positions, incomparable operands, overflow and
    /// division by zero.
    pub fn evaluate(&self, row: Option<&Row>, bindings: &QueryBindings) -> QueryResult<Value> {
        match self {
            Self::Field(index) => {
                let row = row.ok_or_else(|| {
                    QueryError::plan(format!("field {index} referenced without an input row"))
                })?;
                row.value(*index).cloned().ok_or_else(|| {
                    let arity = row.arity();
                    QueryError::plan(format!("field {index} out of range for arity {arity}"))
                })
            }
            Self::Bound { position, .. } => bindings.value(*position).cloned(),
            Self::BoundField { position, field, .. } => {
                let bound = bindings.row(*position)?;
                bound.value(*field).cloned().ok_or_else(|| {
                    QueryError::TypeMismatch(format!(
                        "row bound at {position} has no field {field}"
                    ))
                })
            }
            Self::Literal(value) => Ok(value.clone()),
            Self::Null(_) => Ok(Value::Null),
            Self::Compare { op, left, right } => {
                let l = left.evaluate(row, bindings)?;
                let r = right.evaluate(row, bindings)?;
                compare(*op, &l, &r)
            }
            Self::And(left, right) => {
                let l = truth(left.evaluate(row, bindings)?)?;
                if l == Some(false) {
                    return Ok(Value::Bool(false));
                }
                let r = truth(right.evaluate(row, bindings)?)?;
                Ok(match (l, r) {
                    (_, Some(false)) => Value::Bool(false),
                    (Some(true), Some(true)) => Value::Bool(true),
                    _ => Value::Null,
                })
            }
            Self::Or(left, right) => {
                let l = truth(left.evaluate(row, bindings)?)?;
                if l == Some(true) {
                    return Ok(Value::Bool(true));
                }
                let r = truth(right.evaluate(row, bindings)?)?;
                Ok(match (l, r) {
                    (_, Some(true)) => Value::Bool(true),
                    (Some(false), Some(false)) => Value::Bool(false),
                    _ => Value::Null,
                })
            }
            Self::Not(inner) => {
                Ok(truth(inner.evaluate(row, bindings)?)?.map_or(Value::Null, |b| Value::Bool(!b)))
            }
            Self::IsNull(inner) => Ok(Value::Bool(inner.evaluate(row, bindings)?.is_null())),
            Self::Arithmetic { op, left, right } => {
                let l = left.evaluate(row, bindings)?;
                let r = right.evaluate(row, bindings)?;
                arithmetic(*op, &l, &r)
            }
        }
    }
}

fn expect_bool(ty: ValueType) -> QueryResult<()> {
    if ty == ValueType::Bool {
        Ok(())
    } else {
        Err(QueryError::plan(format!("expected a Bool operand, found {ty}")))
    }
}

fn truth(value: Value) -> QueryResult<Option<bool>> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(b)),
        other => Err(QueryError::TypeMismatch(format!("expected a boolean, found {other}"))),
    }
}

fn compare(op: CompareOp, l: &Value, r: &Value) -> QueryResult<Value> {
    if l.is_null() || r.is_null() {
        return Ok(Value::Null);
    }
    let ordering = l
        .compare(r)
        .ok_or_else(|| QueryError::TypeMismatch(format!("cannot compare {l} with {r}")))?;
    Ok(Value::Bool(match op {
        CompareOp::Eq => ordering.is_eq(),
        CompareOp::Ne => ordering.is_ne(),
        CompareOp::Lt => ordering.is_lt(),
        CompareOp::Le => ordering.is_le(),
        CompareOp::Gt => ordering.is_gt(),
        CompareOp::Ge => ordering.is_ge(),
    }))
}

fn arithmetic(op: ArithmeticOp, l: &Value, r: &Value) -> QueryResult<Value> {
    if l.is_null() || r.is_null() {
        return Ok(Value::Null);
    }
    if let (Value::Int(a), Value::Int(b)) = (l, r) {
        let result = match op {
            ArithmeticOp::Add => a.checked_add(*b),
            ArithmeticOp::Sub => a.checked_sub(*b),
            ArithmeticOp::Mul => a.checked_mul(*b),
            ArithmeticOp::Div if *b == 0 => return Err(QueryError::DivisionByZero),
            ArithmeticOp::Div => a.checked_div(*b),
        };
        return result.map(Value::Int).ok_or_else(|| QueryError::Overflow(format!("{a} {op} {b}")));
    }
    let (Some(a), Some(b)) = (l.as_float(), r.as_float()) else {
        return Err(QueryError::TypeMismatch(format!("cannot apply {op} to {l} and {r}")));
    };
    Ok(Value::Float(match op {
        ArithmeticOp::Add => a + b,
        ArithmeticOp::Sub => a - b,
        ArithmeticOp::Mul => a * b,
        ArithmeticOp::Div => a / b,
    }))
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        })
    }
}

impl fmt::Display for ArithmeticOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        })
    }
}
