//! Buffered sink
//!
//! Collects rows in memory, spills to the persisted buffer past a threshold
//! and performs the single bulk write to the store.

use crate::buffer::{BufferError, BufferResult, PersistedBuffer};
use crate::storage::{Row, RowStore, StoreError};
use tracing::{error, info, warn};

/// Outcome of a successful flush
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Rows handed to the store
    pub attempted: usize,
    /// Rows the store did not already hold
    pub inserted: usize,
}

impl FlushReport {
    pub fn duplicates(&self) -> usize {
        self.attempted - self.inserted
    }
}

/// In-memory row batch in front of a [`RowStore`]
pub struct BufferedSink<S: RowStore> {
    store: S,
    persisted: PersistedBuffer,
    rows: Vec<Row>,
    spill_threshold: usize,
    spilled_rows: usize,
}

impl<S: RowStore> BufferedSink<S> {
    /// Creates an empty sink
    ///
    /// # Arguments
    ///
    /// * `store` - Destination of the final bulk write
    /// * `persisted` - Spill and crash buffer file
    /// * `spill_threshold` - In-memory row count that triggers a spill
    pub fn new(store: S, persisted: PersistedBuffer, spill_threshold: usize) -> Self {
        Self {
            store,
            persisted,
            rows: Vec::new(),
            spill_threshold: spill_threshold.max(1),
            spilled_rows: 0,
        }
    }

    /// Rows currently held in memory
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows moved to disk during this run and not yet written to the store
    pub fn spilled_rows(&self) -> usize {
        self.spilled_rows
    }

    /// Everything still owed to the store
    pub fn pending(&self) -> usize {
        self.rows.len() + self.spilled_rows
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn persisted(&self) -> &PersistedBuffer {
        &self.persisted
    }

    /// Loads rows left behind by an earlier failed run
    ///
    /// Must run before the first fetch. The file is deleted once its rows
    /// are in memory; a header that does not match the current schema is an
    /// error and leaves the file in place.
    ///
    /// # Returns
    ///
    /// The number of rows recovered
    pub fn load_persisted(&mut self) -> BufferResult<usize> {
        if !self.persisted.exists() {
            return Ok(0);
        }

        let rows = self.persisted.read_all()?;
        let count = rows.len();
        self.rows.extend(rows);
        self.persisted.remove()?;

        if count > 0 {
            info!(
                "Recovered {} rows from {}",
                count,
                self.persisted.path().display()
            );
        }

        Ok(count)
    }

    /// Adds rows, spilling to disk once the threshold is reached
    pub fn extend(&mut self, rows: Vec<Row>) -> BufferResult<()> {
        self.rows.extend(rows);

        if self.rows.len() >= self.spill_threshold {
            self.persisted.append(&self.rows)?;
            self.spilled_rows += self.rows.len();
            info!(
                "Spilled {} rows to {} ({} on disk)",
                self.rows.len(),
                self.persisted.path().display(),
                self.spilled_rows
            );
            self.rows.clear();
        }

        Ok(())
    }

    /// Writes everything collected to the store
    ///
    /// Spilled rows go first, in batches of the spill threshold, then the
    /// in-memory batch in one call. When the store fails, whatever was not
    /// written is saved to the persisted buffer and `StoreUnavailable` is
    /// returned; if that save fails too the rows stay in memory and
    /// `SpillFailed` is returned.
    pub fn flush_to_store(&mut self) -> BufferResult<FlushReport> {
        let mut report = FlushReport::default();

        if self.spilled_rows > 0 {
            for batch in self.persisted.batches(self.spill_threshold)? {
                let batch = batch?;
                match self.store.upsert_rows(&batch) {
                    Ok(inserted) => {
                        report.attempted += batch.len();
                        report.inserted += inserted;
                    }
                    Err(source) => return Err(self.save_after_failure(source)),
                }
            }
            self.persisted.remove()?;
            self.spilled_rows = 0;
        }

        if !self.rows.is_empty() {
            match self.store.upsert_rows(&self.rows) {
                Ok(inserted) => {
                    report.attempted += self.rows.len();
                    report.inserted += inserted;
                    self.rows.clear();
                }
                Err(source) => return Err(self.save_after_failure(source)),
            }
        }

        if report.attempted > 0 {
            info!(
                "Flushed {} rows to {} ({} new, {} already present)",
                report.attempted,
                self.store.describe(),
                report.inserted,
                report.duplicates()
            );
        }

        Ok(report)
    }

    /// Persists unwritten rows after a store failure
    ///
    /// Rows that were spilled earlier in this run are already in the file,
    /// so the in-memory batch is appended; otherwise the file is replaced.
    /// Rows already written by an earlier batch are ignored on the next
    /// run's insert.
    fn save_after_failure(&mut self, source: StoreError) -> BufferError {
        let path = self.persisted.path().to_path_buf();
        let saved = if self.spilled_rows > 0 {
            self.persisted.append(&self.rows)
        } else {
            self.persisted.overwrite(&self.rows)
        };

        match saved {
            Ok(()) => {
                let rows = self.rows.len() + self.spilled_rows;
                self.spilled_rows = rows;
                self.rows.clear();
                error!(
                    "Store {} unavailable: {} - {} rows kept in {}",
                    self.store.describe(),
                    source,
                    rows,
                    path.display()
                );
                BufferError::StoreUnavailable { rows, path, source }
            }
            Err(spill) => {
                warn!(
                    "Could not save {} rows to {}: {}",
                    self.rows.len(),
                    path.display(),
                    spill
                );
                BufferError::SpillFailed {
                    rows: self.rows.len(),
                    path,
                    spill: spill.to_string(),
                    source,
                }
            }
        }
    }
}
