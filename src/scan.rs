//! Record mapping between a caller-supplied record type and a column
//! list, via a registration trait rather than runtime reflection: the
//! caller implements the mapping by hand, once, per record type — no
//! macro, no `Any`-downcasting, no snake/camel heuristic needed because
//! the impl names the mapping directly.

use crate::error::EngineError;
use crate::value::{RowMap, Value};

/// Maps a user record type onto a dimension's PK + payload columns.
///
/// `column_values` must return exactly `pk_columns.len() + payload_columns.len()`
/// values, pk first, in the schema's declared order — the inverse path
/// writers pull the correspondingly named field for each column and
/// emit it in order; a missing field emits that column's zero value.
pub trait DimensionRecord: Sized + Send + Sync {
    /// Build a record from a row's internal + PK + payload columns.
    /// Unconvertible values must raise `EngineError::DataDrift`, never
    /// silently default — schema drift is a data bug.
    fn from_row(row: &RowMap) -> Result<Self, EngineError>;

    /// Emit PK values (in schema PK order) followed by payload values (in
    /// schema payload order).
    fn column_values(&self, pk_columns: &[&str], payload_columns: &[&str]) -> Vec<Value>;
}

/// Maps a user record type onto a fact table's declared columns.
pub trait FactRecord: Sized + Send + Sync {
    fn from_row(row: &RowMap) -> Result<Self, EngineError>;
    fn column_values(&self, columns: &[&str]) -> Vec<Value>;
}

/// Required-field helper used by `DimensionRecord`/`FactRecord`
/// implementations: fetch a column or raise a `DataDrift` error, rather
/// than let a caller panic on an `unwrap()` over a missing key.
pub fn require<'a>(row: &'a RowMap, column: &str, field: &str) -> Result<&'a Value, EngineError> {
    row.get(column).ok_or_else(|| EngineError::DataDrift {
        column: column.to_string(),
        db_type: "missing".to_string(),
        field: field.to_string(),
        message: "column absent from row".to_string(),
    })
}

/// Convert a `&Value` to `String`, raising `DataDrift` on type mismatch
/// (never silently dropping).
pub fn require_string(row: &RowMap, column: &str, field: &str) -> Result<String, EngineError> {
    match require(row, column, field)? {
        Value::String(s) => Ok(s.clone()),
        other => Err(EngineError::DataDrift {
            column: column.to_string(),
            db_type: other.type_name().to_string(),
            field: field.to_string(),
            message: format!("cannot convert {} to String", other.type_name()),
        }),
    }
}

pub fn require_i64(row: &RowMap, column: &str, field: &str) -> Result<i64, EngineError> {
    match require(row, column, field)? {
        Value::I64(v) => Ok(*v),
        Value::I32(v) => Ok(*v as i64),
        other => Err(EngineError::DataDrift {
            column: column.to_string(),
            db_type: other.type_name().to_string(),
            field: field.to_string(),
            message: format!("cannot convert {} to i64", other.type_name()),
        }),
    }
}

pub fn require_bool(row: &RowMap, column: &str, field: &str) -> Result<bool, EngineError> {
    match require(row, column, field)? {
        Value::Bool(b) => Ok(*b),
        other => Err(EngineError::DataDrift {
            column: column.to_string(),
            db_type: other.type_name().to_string(),
            field: field.to_string(),
            message: format!("cannot convert {} to bool", other.type_name()),
        }),
    }
}

pub fn optional_string(row: &RowMap, column: &str) -> Option<String> {
    match row.get(column) {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}

/// Pull a named field's `Value` out of a caller-assembled map, defaulting
/// to `Value::Null` for a missing field — documented, rather than
/// failing, so callers can use subsets of columns for reads.
pub fn column_value_or_null(values: &RowMap, column: &str) -> Value {
    values.get(column).cloned().unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_string_raises_data_drift_on_mismatch() {
        let mut row = RowMap::new();
        row.insert("code".to_string(), Value::I64(5));
        let err = require_string(&row, "code", "Code").unwrap_err();
        assert!(matches!(err, EngineError::DataDrift { .. }));
    }

    #[test]
    fn require_string_raises_data_drift_on_missing_column() {
        let row = RowMap::new();
        let err = require_string(&row, "code", "Code").unwrap_err();
        assert!(matches!(err, EngineError::DataDrift { .. }));
    }

    #[test]
    fn column_value_or_null_defaults_missing_fields() {
        let values = RowMap::new();
        assert_eq!(column_value_or_null(&values, "name"), Value::Null);
    }
}
