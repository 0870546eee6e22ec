//! Storage module for persisting station records
//!
//! This module handles all database operations, including:
//! - The schema-ordered row model shared by the buffer and the store
//! - SQLite table creation from the parameter catalog
//! - Idempotent bulk upserts keyed on (station, date)
//! - Read queries for export and statistics

mod schema;
mod sqlite;
mod traits;

pub use schema::{Schema, KEY_COLUMN, PERIOD_COLUMN};
pub use sqlite::SqliteStore;
pub use traits::{RowStore, StoreError, StoreResult};

use chrono::NaiveDate;
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue};

/// A single measurement field
///
/// Missing measurements are explicit `Null`s so every row keeps the full
/// schema width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
}

impl Value {
    /// Converts a JSON data point; anything that is not a number becomes `Null`
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Integer(i)
                } else {
                    n.as_f64().map(Self::Real).unwrap_or(Self::Null)
                }
            }
            _ => Self::Null,
        }
    }

    /// Parses a buffer-file field
    ///
    /// Empty is `Null`, an `i64` literal is `Integer`, any other float literal
    /// is `Real`. Returns `None` for text that is neither.
    pub fn parse_field(field: &str) -> Option<Self> {
        let field = field.trim();
        if field.is_empty() {
            return Some(Self::Null);
        }
        if let Ok(i) = field.parse::<i64>() {
            return Some(Self::Integer(i));
        }
        field.parse::<f64>().ok().map(Self::Real)
    }

    /// Renders the value for a buffer or export file
    ///
    /// Reals use the round-trip form, which always carries a `.` or an
    /// exponent, so they never reload as integers.
    pub fn to_field(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Integer(i) => i.to_string(),
            Self::Real(f) => format!("{:?}", f),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Owned(match self {
            Self::Null => SqlValue::Null,
            Self::Integer(i) => SqlValue::Integer(*i),
            Self::Real(f) => SqlValue::Real(*f),
        }))
    }
}

impl From<SqlValue> for Value {
    fn from(value: SqlValue) -> Self {
        match value {
            SqlValue::Integer(i) => Self::Integer(i),
            SqlValue::Real(f) => Self::Real(f),
            SqlValue::Text(s) => Self::parse_field(&s).unwrap_or(Self::Null),
            SqlValue::Null | SqlValue::Blob(_) => Self::Null,
        }
    }
}

/// One record: `[station, date, value_1 .. value_n]` in schema order
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub station: i64,
    pub date: NaiveDate,
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(station: i64, date: NaiveDate, values: Vec<Value>) -> Self {
        Self {
            station,
            date,
            values,
        }
    }

    /// Number of fields including the two key columns
    pub fn width(&self) -> usize {
        2 + self.values.len()
    }
}

/// Aggregate numbers about a stored table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreStats {
    pub rows: u64,
    pub stations: u64,
    pub first_date: Option<String>,
    pub last_date: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_from_json() {
        assert_eq!(Value::from_json(&json!(12)), Value::Integer(12));
        assert_eq!(Value::from_json(&json!(-3)), Value::Integer(-3));
        assert_eq!(Value::from_json(&json!(12.5)), Value::Real(12.5));
        assert_eq!(Value::from_json(&json!(null)), Value::Null);
        assert_eq!(Value::from_json(&json!("12")), Value::Null);
    }

    #[test]
    fn test_parse_field() {
        assert_eq!(Value::parse_field(""), Some(Value::Null));
        assert_eq!(Value::parse_field("42"), Some(Value::Integer(42)));
        assert_eq!(Value::parse_field("-7"), Some(Value::Integer(-7)));
        assert_eq!(Value::parse_field("4.25"), Some(Value::Real(4.25)));
        assert_eq!(Value::parse_field("1e-7"), Some(Value::Real(1e-7)));
        assert_eq!(Value::parse_field("abc"), None);
    }

    #[test]
    fn test_real_field_keeps_its_type() {
        let field = Value::Real(3.0).to_field();
        assert_eq!(field, "3.0");
        assert_eq!(Value::parse_field(&field), Some(Value::Real(3.0)));
        assert_eq!(Value::Null.to_field(), "");
    }

    #[test]
    fn test_value_from_sql() {
        assert_eq!(Value::from(SqlValue::Integer(5)), Value::Integer(5));
        assert_eq!(Value::from(SqlValue::Real(0.5)), Value::Real(0.5));
        assert_eq!(Value::from(SqlValue::Null), Value::Null);
        assert_eq!(Value::from(SqlValue::Blob(vec![1])), Value::Null);
    }

    #[test]
    fn test_row_width() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let row = Row::new(1, date, vec![Value::Null, Value::Integer(1)]);
        assert_eq!(row.width(), 4);
    }
}
