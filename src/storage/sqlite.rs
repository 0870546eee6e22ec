//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the RowStore trait.

use crate::storage::schema::Schema;
use crate::storage::traits::{RowStore, StoreError, StoreResult};
use crate::storage::{Row, StoreStats, Value};
use chrono::NaiveDate;
use rusqlite::types::{ToSql, Value as SqlValue};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// SQLite store for one table
///
/// Holds only the location; every operation opens its own connection.
pub struct SqliteStore {
    path: PathBuf,
    table: String,
    schema: Schema,
}

impl SqliteStore {
    /// Creates a store handle
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `table` - Target table name (validated identifier)
    /// * `schema` - Column schema of the table
    pub fn new(path: impl Into<PathBuf>, table: impl Into<String>, schema: Schema) -> Self {
        Self {
            path: path.into(),
            table: table.into(),
            schema,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Opens a fresh connection and makes sure the table exists
    fn connect(&self) -> StoreResult<Connection> {
        let conn = Connection::open(&self.path).map_err(|source| StoreError::Unreachable {
            path: self.path.display().to_string(),
            source,
        })?;

        conn.busy_timeout(Duration::from_secs(30))?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
        ",
        )?;
        conn.execute_batch(&self.schema.create_table_sql(&self.table))?;

        Ok(conn)
    }
}

impl RowStore for SqliteStore {
    fn upsert_rows(&self, rows: &[Row]) -> StoreResult<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let expected = self.schema.width();
        if let Some(bad) = rows.iter().find(|r| r.width() != expected) {
            return Err(StoreError::RowWidth {
                station: bad.station,
                date: bad.date,
                got: bad.width(),
                expected,
            });
        }

        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(&self.schema.insert_sql(&self.table))?;
            for row in rows {
                let date = row.date.to_string();
                let mut fields: Vec<&dyn ToSql> = Vec::with_capacity(expected);
                fields.push(&row.station);
                fields.push(&date);
                for value in &row.values {
                    fields.push(value);
                }
                inserted += stmt.execute(fields.as_slice())?;
            }
        }
        tx.commit()?;

        tracing::debug!(
            "Upserted {} of {} rows into {}",
            inserted,
            rows.len(),
            self.table
        );
        Ok(inserted)
    }

    fn query_since(&self, since: NaiveDate) -> StoreResult<Vec<Row>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&self.schema.select_since_sql(&self.table))?;
        let width = self.schema.width();

        let raw = stmt
            .query_map(params![since.to_string()], |row| {
                let station: i64 = row.get(0)?;
                let date: String = row.get(1)?;
                let mut values = Vec::with_capacity(width - 2);
                for i in 2..width {
                    values.push(Value::from(row.get::<_, SqlValue>(i)?));
                }
                Ok((station, date, values))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(station, date, values)| {
                let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|e| {
                    StoreError::Corrupt(format!("bad date '{}' for station {}: {}", date, station, e))
                })?;
                Ok(Row::new(station, date, values))
            })
            .collect()
    }

    fn stats(&self) -> StoreResult<StoreStats> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT COUNT(*), COUNT(DISTINCT \"station\"), MIN(\"date\"), MAX(\"date\") FROM \"{}\"",
            self.table
        );

        let stats = conn.query_row(&sql, [], |row| {
            Ok(StoreStats {
                rows: row.get::<_, i64>(0)? as u64,
                stations: row.get::<_, i64>(1)? as u64,
                first_date: row.get(2)?,
                last_date: row.get(3)?,
            })
        })?;

        Ok(stats)
    }

    fn describe(&self) -> String {
        format!("{} (table {})", self.path.display(), self.table)
    }
}
