//! Dynamic column value.
//!
//! A tagged union carried both directions: as a natural-key component fed
//! into the key encoder (`keys::encode`), as a bind argument for positional
//! `?` parameters, and as the scan target for a row returned from the
//! store. A real sum type instead of a loosely typed map of opaque
//! values, so a caller pattern-matches instead of downcasting.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A single column value, nullable by construction via the `Null` variant.
///
/// Stands in for the double-pointer nullable scan target a language
/// without a native optional type would need; in Rust the sum type
/// itself carries the distinction, so no separate `Nullable(T)` wrapper
/// is needed.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    I32(i32),
    I64(i64),
    F64(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
}

impl Value {
    /// Database type name, used in `DataDrift` error messages and in raw
    /// query metadata.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::F64(_) => "f64",
            Value::String(_) => "string",
            Value::Timestamp(_) => "timestamp",
            Value::Uuid(_) => "uuid",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(v) => Some(*v),
            Value::I32(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Value::Uuid(u) => Some(*u),
            _ => None,
        }
    }

    /// Render as a string for the "unknown types rendered as strings"
    /// fallback in the map converter.
    pub fn to_display_string(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::I32(v) => Some(v.to_string()),
            Value::I64(v) => Some(v.to_string()),
            Value::F64(v) => Some(v.to_string()),
            Value::String(s) => Some(s.clone()),
            Value::Timestamp(t) => Some(t.to_rfc3339()),
            Value::Uuid(u) => Some(u.to_string()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl<T> From<Option<T>> for Value
where
    Value: From<T>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => Value::from(v),
            None => Value::Null,
        }
    }
}

/// A loosely-typed row: column name -> value. The map converter's output
/// shape, and the representation callers get back from the raw query
/// surface when they don't supply a record type.
pub type RowMap = std::collections::HashMap<String, Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_conversion_preserves_null() {
        let v: Value = None::<i64>.into();
        assert_eq!(v, Value::Null);
        let v: Value = Some(5i64).into();
        assert_eq!(v, Value::I64(5));
    }

    #[test]
    fn display_string_is_total_for_non_null() {
        assert_eq!(Value::Bool(true).to_display_string(), Some("true".into()));
        assert_eq!(Value::Null.to_display_string(), None);
    }
}
