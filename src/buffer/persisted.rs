//! Disk-backed crash buffer
//!
//! A header-first CSV file whose header always equals the schema column
//! list. Rows are parsed back in exactly that order.

use crate::buffer::{BufferError, BufferResult};
use crate::storage::{Row, Value};
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Crash buffer file for one table
#[derive(Debug, Clone)]
pub struct PersistedBuffer {
    path: PathBuf,
    columns: Vec<String>,
}

impl PersistedBuffer {
    /// Creates a handle; nothing is touched on disk until the first write
    pub fn new(path: impl Into<PathBuf>, columns: Vec<String>) -> Self {
        Self {
            path: path.into(),
            columns,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Appends rows, writing the header only when the file is new or empty
    pub fn append(&self, rows: &[Row]) -> BufferResult<()> {
        let needs_header = std::fs::metadata(&self.path)
            .map(|m| m.len() == 0)
            .unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.write_rows(file, rows, needs_header)
    }

    /// Replaces the file with a header plus `rows`
    pub fn overwrite(&self, rows: &[Row]) -> BufferResult<()> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        self.write_rows(file, rows, true)
    }

    fn write_rows(&self, file: File, rows: &[Row], header: bool) -> BufferResult<()> {
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);

        if header {
            writer.write_record(&self.columns)?;
        }

        for row in rows {
            let mut record = Vec::with_capacity(row.width());
            record.push(row.station.to_string());
            record.push(row.date.to_string());
            record.extend(row.values.iter().map(Value::to_field));
            writer.write_record(&record)?;
        }

        let file = writer
            .into_inner()
            .map_err(|e| BufferError::Io(e.into_error()))?;
        file.sync_all()?;

        Ok(())
    }

    /// Reads every row in the file
    pub fn read_all(&self) -> BufferResult<Vec<Row>> {
        let mut rows = Vec::new();
        for batch in self.batches(usize::MAX)? {
            rows.extend(batch?);
        }
        Ok(rows)
    }

    /// Streams the file in batches of at most `batch_size` rows
    pub(crate) fn batches(&self, batch_size: usize) -> BufferResult<BatchReader> {
        let empty = std::fs::metadata(&self.path)?.len() == 0;

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.path)?;

        if !empty {
            let found = reader.headers()?.clone();
            if found.iter().ne(self.columns.iter().map(String::as_str)) {
                return Err(BufferError::HeaderMismatch {
                    path: self.path.clone(),
                    expected: self.columns.join(","),
                    found: found.iter().collect::<Vec<_>>().join(","),
                });
            }
        }

        Ok(BatchReader {
            records: reader.into_records(),
            path: self.path.clone(),
            width: self.columns.len(),
            batch_size: batch_size.max(1),
            empty,
        })
    }

    /// Deletes the file if present
    pub fn remove(&self) -> BufferResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Iterator over row batches of a buffer file
pub(crate) struct BatchReader {
    records: csv::StringRecordsIntoIter<File>,
    path: PathBuf,
    width: usize,
    batch_size: usize,
    empty: bool,
}

impl Iterator for BatchReader {
    type Item = BufferResult<Vec<Row>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.empty {
            return None;
        }

        let mut batch = Vec::new();
        while batch.len() < self.batch_size {
            match self.records.next() {
                Some(Ok(record)) => match parse_record(&record, self.width, &self.path) {
                    Ok(row) => batch.push(row),
                    Err(e) => return Some(Err(e)),
                },
                Some(Err(e)) => return Some(Err(e.into())),
                None => break,
            }
        }

        if batch.is_empty() {
            None
        } else {
            Some(Ok(batch))
        }
    }
}

/// Converts one text record back into a row
///
/// Station must be an integer and date an ISO date; every other field goes
/// through [`Value::parse_field`].
fn parse_record(record: &StringRecord, width: usize, path: &Path) -> BufferResult<Row> {
    let line = record.position().map(|p| p.line()).unwrap_or(0);
    let parse_error = |message: String| BufferError::Parse {
        path: path.to_path_buf(),
        line,
        message,
    };

    if record.len() != width {
        return Err(parse_error(format!(
            "expected {} fields, found {}",
            width,
            record.len()
        )));
    }

    let station = record[0]
        .trim()
        .parse::<i64>()
        .map_err(|e| parse_error(format!("station '{}': {}", &record[0], e)))?;
    let date = NaiveDate::parse_from_str(record[1].trim(), "%Y-%m-%d")
        .map_err(|e| parse_error(format!("date '{}': {}", &record[1], e)))?;

    let mut values = Vec::with_capacity(width - 2);
    for (column, field) in record.iter().enumerate().skip(2) {
        let value = Value::parse_field(field)
            .ok_or_else(|| parse_error(format!("column {}: not a number: '{}'", column, field)))?;
        values.push(value);
    }

    Ok(Row::new(station, date, values))
}
