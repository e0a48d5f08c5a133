//! Aggregate functions and the registry that resolves them by name.
//!
//! The registry is an explicit value handed to plan construction rather
//! than process-wide state, so different sessions may register different
//! functions.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arbordb_core::{Value, ValueType};

use crate::error::{QueryError, QueryResult};

/// Running state of one aggregate over one group.
///
/// Only non-null inputs are fed to [`Accumulator::update`]; the caller
/// tracks whether any arrived.
pub trait Accumulator: Send {
    /// Folds one non-null value into the state.
    ///
    /// # Errors
    ///
    /// Fails on overflow or an input of the wrong type.
    fn update(&mut self, value: &Value) -> QueryResult<()>;

    /// The aggregate over every value fed so far.
    fn finish(&self) -> Value;
}

/// An aggregate function definition.
pub trait AggregateFunction: Send + Sync + fmt::Debug {
    /// The name the function is registered under.
    fn name(&self) -> &str;

    /// The output type for an input of `input`, where `None` means the
    /// function counts rows rather than reading a column.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Plan`] if the input type is not supported.
    fn result_type(&self, input: Option<ValueType>) -> QueryResult<ValueType>;

    /// A fresh accumulator.
    fn accumulator(&self) -> Box<dyn Accumulator>;

    /// The result for a group with no non-null input.
    fn empty_value(&self) -> Value {
        Value::Null
    }
}

/// Name-to-function lookup for aggregates.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn AggregateFunction>>,
}

impl FunctionRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding `count`, `sum`, `min` and `max`.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(Count));
        registry.register(Arc::new(Sum));
        registry.register(Arc::new(Extremum::Min));
        registry.register(Arc::new(Extremum::Max));
        registry
    }

    /// Adds or replaces a function. Names are case-insensitive.
    pub fn register(&mut self, function: Arc<dyn AggregateFunction>) {
        self.functions.insert(function.name().to_ascii_lowercase(), function);
    }

    /// Looks a function up by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn AggregateFunction>> {
        self.functions.get(&name.to_ascii_lowercase())
    }

    /// Looks a function up by name.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnknownFunction`] if none is registered.
    pub fn get_or_error(&self, name: &str) -> QueryResult<Arc<dyn AggregateFunction>> {
        self.get(name).cloned().ok_or_else(|| QueryError::UnknownFunction(name.to_owned()))
    }
}

#[derive(Debug)]
struct Count;

impl AggregateFunction for Count {
    fn name(&self) -> &str {
        "count"
    }

    fn result_type(&self, _input: Option<ValueType>) -> QueryResult<ValueType> {
        Ok(ValueType::Int)
    }

    fn accumulator(&self) -> Box<dyn Accumulator> {
        Box::new(CountAccumulator(0))
    }

    fn empty_value(&self) -> Value {
        Value::Int(0)
    }
}

struct CountAccumulator(i64);

impl Accumulator for CountAccumulator {
    fn update(&mut self, _value: &Value) -> QueryResult<()> {
        self.0 = self.0.checked_add(1).ok_or_else(|| QueryError::Overflow("count".into()))?;
        Ok(())
    }

    fn finish(&self) -> Value {
        Value::Int(self.0)
    }
}

#[derive(Debug)]
struct Sum;

impl AggregateFunction for Sum {
    fn name(&self) -> &str {
        "sum"
    }

    fn result_type(&self, input: Option<ValueType>) -> QueryResult<ValueType> {
        match input {
            Some(ty) if ty.is_numeric() => Ok(ty),
            Some(ty) => Err(QueryError::plan(format!("sum over non-numeric type {ty}"))),
            None => Err(QueryError::plan("sum requires an argument")),
        }
    }

    fn accumulator(&self) -> Box<dyn Accumulator> {
        Box::new(SumAccumulator(None))
    }
}

struct SumAccumulator(Option<Value>);

impl Accumulator for SumAccumulator {
    fn update(&mut self, value: &Value) -> QueryResult<()> {
        let next = match (&self.0, value) {
            (None, Value::Int(_) | Value::Float(_)) => value.clone(),
            (Some(Value::Int(a)), Value::Int(b)) => Value::Int(
                a.checked_add(*b).ok_or_else(|| QueryError::Overflow(format!("sum: {a} + {b}")))?,
            ),
            (Some(Value::Float(a)), Value::Float(b)) => Value::Float(a + b),
            (_, other) => {
                return Err(QueryError::TypeMismatch(format!("sum cannot accumulate {other}")))
            }
        };
        self.0 = Some(next);
        Ok(())
    }

    fn finish(&self) -> Value {
        self.0.clone().unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, Copy)]
enum Extremum {
    Min,
    Max,
}

impl AggregateFunction for Extremum {
    fn name(&self) -> &str {
        match self {
            Self::Min => "min",
            Self::Max => "max",
        }
    }

    fn result_type(&self, input: Option<ValueType>) -> QueryResult<ValueType> {
        input.ok_or_else(|| QueryError::plan(format!("{} requires an argument", self.name())))
    }

    fn accumulator(&self) -> Box<dyn Accumulator> {
        Box::new(ExtremumAccumulator { kind: *self, best: None })
    }
}

struct ExtremumAccumulator {
    kind: Extremum,
    best: Option<Value>,
}

impl Accumulator for ExtremumAccumulator {
    fn update(&mut self, value: &Value) -> QueryResult<()> {
        let replace = match &self.best {
            None => true,
            Some(best) => {
                let ordering = value.compare(best).ok_or_else(|| {
                    QueryError::TypeMismatch(format!("cannot compare {value} with {best}"))
                })?;
                match self.kind {
                    Extremum::Min => ordering.is_lt(),
                    Extremum::Max => ordering.is_gt(),
                }
            }
        };
        if replace {
            self.best = Some(value.clone());
        }
        Ok(())
    }

    fn finish(&self) -> Value {
        self.best.clone().unwrap_or(Value::Null)
    }
}
