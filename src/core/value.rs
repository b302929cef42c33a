// src/core/value.rs

//! Typed parameter values.
//!
//! A stored value is either undefined, a literal scalar, or an indirection to
//! another parameter. Callers exchange values with the store through
//! [`NativeValue`], which mirrors what a scripting caller would hand over.

use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

/// A single literal of one of the parameter base types.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// Text, stored without quotes.
    Str(String),
    /// A boolean, written `yes`/`no`.
    Bool(bool),
    /// An integer.
    Int(i64),
    /// A floating-point number.
    Real(f64),
}

impl Scalar {
    /// The caller-facing form of this literal.
    pub fn to_native(&self) -> NativeValue {
        match self {
            Scalar::Str(s) => NativeValue::Str(s.clone()),
            Scalar::Bool(b) => NativeValue::Bool(*b),
            Scalar::Int(i) => NativeValue::Int(*i),
            Scalar::Real(r) => NativeValue::Real(*r),
        }
    }
}

impl PartialOrd for Scalar {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Scalar::Str(a), Scalar::Str(b)) => a.partial_cmp(b),
            (Scalar::Bool(a), Scalar::Bool(b)) => a.partial_cmp(b),
            (Scalar::Int(a), Scalar::Int(b)) => a.partial_cmp(b),
            (Scalar::Real(a), Scalar::Real(b)) => a.partial_cmp(b),
            (Scalar::Int(a), Scalar::Real(b)) => (*a as f64).partial_cmp(b),
            (Scalar::Real(a), Scalar::Int(b)) => a.partial_cmp(&(*b as f64)),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Str(s) => write!(f, "{}", s),
            Scalar::Bool(true) => write!(f, "yes"),
            Scalar::Bool(false) => write!(f, "no"),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Real(r) => write!(f, "{}", format_real(*r)),
        }
    }
}

/// The content of one value slot of a parameter.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// No value; printed as `INDEF` for numeric types and as blank otherwise.
    #[default]
    Undefined,
    /// A concrete value.
    Literal(Scalar),
    /// A reference to another parameter, stored without the leading `)`.
    Indirect(String),
}

impl Value {
    /// True for `INDEF`/blank slots.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// The literal, unless the slot is undefined or indirect.
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Value::Literal(s) => Some(s),
            _ => None,
        }
    }

    /// The indirection target, without the `)`.
    pub fn indirection(&self) -> Option<&str> {
        match self {
            Value::Indirect(target) => Some(target),
            _ => None,
        }
    }

    /// Values that skip range and choice validation.
    pub fn bypasses_checks(&self) -> bool {
        match self {
            Value::Undefined | Value::Indirect(_) => true,
            Value::Literal(Scalar::Str(s)) => s.is_empty(),
            Value::Literal(_) => false,
        }
    }

    /// Undefined becomes `Null`; an indirection keeps its leading `)`.
    pub fn to_native(&self) -> NativeValue {
        match self {
            Value::Undefined => NativeValue::Null,
            Value::Literal(s) => s.to_native(),
            Value::Indirect(target) => NativeValue::Str(format!("){}", target)),
        }
    }
}

/// A dynamically typed value as supplied by or returned to a caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NativeValue {
    /// No value.
    Null,
    /// A boolean.
    Bool(bool),
    /// An integer.
    Int(i64),
    /// A float.
    Real(f64),
    /// A string.
    Str(String),
    /// Array parameters exchange their elements as a list.
    List(Vec<NativeValue>),
}

impl NativeValue {
    /// The text of a `Str` value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            NativeValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for NativeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeValue::Null => Ok(()),
            NativeValue::Bool(true) => write!(f, "yes"),
            NativeValue::Bool(false) => write!(f, "no"),
            NativeValue::Int(i) => write!(f, "{}", i),
            NativeValue::Real(r) => write!(f, "{}", format_real(*r)),
            NativeValue::Str(s) => write!(f, "{}", s),
            NativeValue::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "{}", parts.join(" "))
            }
        }
    }
}

impl From<&str> for NativeValue {
    fn from(value: &str) -> Self {
        NativeValue::Str(value.to_string())
    }
}

impl From<String> for NativeValue {
    fn from(value: String) -> Self {
        NativeValue::Str(value)
    }
}

impl From<bool> for NativeValue {
    fn from(value: bool) -> Self {
        NativeValue::Bool(value)
    }
}

impl From<i64> for NativeValue {
    fn from(value: i64) -> Self {
        NativeValue::Int(value)
    }
}

impl From<i32> for NativeValue {
    fn from(value: i32) -> Self {
        NativeValue::Int(value.into())
    }
}

impl From<f64> for NativeValue {
    fn from(value: f64) -> Self {
        NativeValue::Real(value)
    }
}

impl<T: Into<NativeValue>> From<Vec<T>> for NativeValue {
    fn from(values: Vec<T>) -> Self {
        NativeValue::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<NativeValue>> From<Option<T>> for NativeValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(NativeValue::Null, Into::into)
    }
}

/// Formats a real so that it always reads back as a real (`1.0`, not `1`).
pub fn format_real(value: f64) -> String {
    format!("{:?}", value)
}

/// Parses a real written in decimal, exponent (`e`, `E`, `d`, `D`) or
/// sexagesimal (`[+|-]dd:mm:ss.s`) notation.
pub fn parse_real(text: &str) -> Option<f64> {
    let text = text.trim();
    let (sign, body) = if text.contains(':') {
        match text.strip_prefix('-') {
            Some(rest) => (-1.0, rest),
            None => (1.0, text.strip_prefix('+').unwrap_or(text)),
        }
    } else {
        (1.0, text)
    };

    let mut groups: Vec<&str> = body.split(':').collect();
    let last = groups.pop()?;
    let mut value = 0.0;
    let mut scale = 1.0;
    for group in groups {
        value += group.trim().parse::<i64>().ok()? as f64 / scale;
        scale *= 60.0;
    }
    let tail: f64 = last.trim().replacen(['d', 'D'], "E", 1).parse().ok()?;
    Some(sign * (value + tail / scale))
}

/// Parses an integer in decimal or trailing-`x` hexadecimal notation.
pub fn parse_int(text: &str) -> Option<i64> {
    let text = text.trim();
    match text.strip_suffix('x') {
        Some(hex) => i64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

/// Converts an integral float to `i64`; `None` when it has a fraction or
/// lies outside the `i64` range.
pub fn integral_to_i64(value: f64) -> Option<i64> {
    if !value.is_finite() || value.fract() != 0.0 {
        return None;
    }
    format!("{:.0}", value).parse().ok()
}

/// Removes one layer of surrounding double quotes.
pub fn strip_quote(value: &str) -> &str {
    match value.strip_prefix('"') {
        Some(inner) => inner.strip_suffix('"').unwrap_or(inner),
        None => value,
    }
}

/// Splits a `|a|b|c|` choice string into its members.
pub fn split_choice(text: &str) -> Vec<&str> {
    let body = text.strip_prefix('|').unwrap_or(text);
    let mut members: Vec<&str> = body.split('|').collect();
    if members.last().is_some_and(|last| last.is_empty()) {
        members.pop();
    }
    members
}
