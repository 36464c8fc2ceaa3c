//! The dynamic value type flowing through sensors, conditions and actions,
//! and the three-valued logic result type used by condition evaluation.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A sensor or expression value. Narrower than a general JSON value on
/// purpose: the rule language only ever needs numbers, strings, booleans and
/// the absence of a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Kind name used in diagnostics (`TypeMismatch`).
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
        }
    }

    /// Same-kind equality test used by `comparison` leaves and `on_change`
    /// emit control. `Null` is never equal to anything, including `Null`,
    /// since "no value" is not a comparable value.
    pub fn type_compatible_eq(&self, other: &Value) -> Option<bool> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Some(a == b),
            (Value::Number(a), Value::Number(b)) => Some(a == b),
            (Value::String(a), Value::String(b)) => Some(a == b),
            (Value::Null, _) | (_, Value::Null) => None,
            _ => None,
        }
    }

    /// Ordered comparison for `>`, `>=`, `<`, `<=`. `None` when the two
    /// values aren't both numbers (the only ordered kind in this language).
    pub fn partial_compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

/// Three-valued (Kleene) truth value. Every condition leaf and combinator
/// yields one of these; there is no implicit coercion to `bool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvalResult {
    True,
    False,
    Indeterminate,
}

impl EvalResult {
    pub fn from_bool(b: bool) -> Self {
        if b {
            EvalResult::True
        } else {
            EvalResult::False
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, EvalResult::True)
    }

    pub fn is_false(&self) -> bool {
        matches!(self, EvalResult::False)
    }

    pub fn is_indeterminate(&self) -> bool {
        matches!(self, EvalResult::Indeterminate)
    }

    /// Kleene negation: `not True=False`, `not False=True`,
    /// `not Indeterminate=Indeterminate`.
    pub fn kleene_not(self) -> EvalResult {
        match self {
            EvalResult::True => EvalResult::False,
            EvalResult::False => EvalResult::True,
            EvalResult::Indeterminate => EvalResult::Indeterminate,
        }
    }

    /// `all[...]`: `False` if any child is `False`; else `Indeterminate` if
    /// any child is `Indeterminate`; else `True`. Evaluated as a total
    /// truth table over the whole slice rather than short-circuiting, so
    /// the result never depends on evaluation order.
    pub fn kleene_all(children: &[EvalResult]) -> EvalResult {
        if children.iter().any(|c| c.is_false()) {
            EvalResult::False
        } else if children.iter().any(|c| c.is_indeterminate()) {
            EvalResult::Indeterminate
        } else {
            EvalResult::True
        }
    }

    /// `any[...]`: `True` if any child is `True`; else `Indeterminate` if
    /// any child is `Indeterminate`; else `False`.
    pub fn kleene_any(children: &[EvalResult]) -> EvalResult {
        if children.iter().any(|c| c.is_true()) {
            EvalResult::True
        } else if children.iter().any(|c| c.is_indeterminate()) {
            EvalResult::Indeterminate
        } else {
            EvalResult::False
        }
    }
}

impl fmt::Display for EvalResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalResult::True => write!(f, "true"),
            EvalResult::False => write!(f, "false"),
            EvalResult::Indeterminate => write!(f, "indeterminate"),
        }
    }
}
