//! Column predicates and value ordering for the query builder.
//!
//! Values follow the loose typing of the protocol being emulated:
//! - `eq` coerces between numbers, numeric strings and booleans, and a
//!   missing column equals `null`
//! - `neq` and `in` are strict (numbers compare by value, everything else
//!   by JSON equality; a missing column equals nothing)
//! - ordering compares numbers numerically, strings lexically, booleans
//!   `false < true`; anything else is unordered

use crate::types::Row;
use serde_json::Value;
use std::cmp::Ordering;

/// Comparison operator of a [`Filter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
}

/// Predicate over a single column.
#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    /// Operand; an array for [`FilterOp::In`].
    pub value: Value,
}

impl Filter {
    pub fn new(column: impl Into<String>, op: FilterOp, value: Value) -> Self {
        Self {
            column: column.into(),
            op,
            value,
        }
    }

    /// Evaluate this filter against `row`.
    pub fn matches(&self, row: &Row) -> bool {
        let cell = row.get(&self.column);
        match self.op {
            FilterOp::Eq => loose_eq(cell.unwrap_or(&Value::Null), &self.value),
            FilterOp::Neq => !cell.is_some_and(|c| strict_eq(c, &self.value)),
            FilterOp::Gt => ordered(cell, &self.value, |o| o == Ordering::Greater),
            FilterOp::Gte => ordered(cell, &self.value, |o| o != Ordering::Less),
            FilterOp::Lt => ordered(cell, &self.value, |o| o == Ordering::Less),
            FilterOp::Lte => ordered(cell, &self.value, |o| o != Ordering::Greater),
            FilterOp::In => match (cell, &self.value) {
                (Some(c), Value::Array(candidates)) => candidates.iter().any(|v| strict_eq(c, v)),
                _ => false,
            },
        }
    }
}

fn ordered(cell: Option<&Value>, operand: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    cell.and_then(|c| compare_values(c, operand))
        .is_some_and(accept)
}

/// Numeric reading of a value: numbers, numeric strings and booleans.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Some(0.0)
            } else {
                trimmed.parse().ok()
            }
        }
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Loose equality with primitive coercion.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Array(_), _) | (_, Value::Array(_)) | (Value::Object(_), _) | (_, Value::Object(_)) => {
            a == b
        }
        _ => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

/// Strict equality: same type, numbers by value.
pub fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Ordering between two values, or `None` when they are not comparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Array(_), _) | (_, Value::Array(_)) | (Value::Object(_), _) | (_, Value::Object(_)) => {
            None
        }
        _ => as_number(a)?.partial_cmp(&as_number(b)?),
    }
}

/// Truthiness of an optional cell: absent, `null`, `false`, `0` and `""` are falsy.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}
