//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::storage::{Row, StoreStats};
use chrono::NaiveDate;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unreachable at {path}: {source}")]
    Unreachable {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Row for station {station} on {date} has {got} fields, schema expects {expected}")]
    RowWidth {
        station: i64,
        date: NaiveDate,
        got: usize,
        expected: usize,
    },

    #[error("Corrupt stored value: {0}")]
    Corrupt(String),
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Trait for relational store backends
///
/// Implementations open their connection per call, so an outage between
/// operations surfaces at the next call instead of as a hung handle.
pub trait RowStore {
    /// Inserts rows, ignoring any whose (station, date) already exists
    ///
    /// # Returns
    ///
    /// The number of rows actually inserted
    fn upsert_rows(&self, rows: &[Row]) -> StoreResult<usize>;

    /// Reads all rows dated on or after `since`, ordered by date then station
    fn query_since(&self, since: NaiveDate) -> StoreResult<Vec<Row>>;

    /// Row count, distinct stations and date span
    fn stats(&self) -> StoreResult<StoreStats>;

    /// Human-readable location of the store, for logs
    fn describe(&self) -> String;
}
