//! Row buffering between the fetch loop and the store
//!
//! Rows collected during a run stay in memory and are written to the store
//! once, at the end. Large runs spill to a CSV file next to the database,
//! and the same file is the crash buffer when the final write fails. The
//! next run loads it back before fetching anything.

mod guard;
mod persisted;
mod sink;

pub use guard::SinkGuard;
pub use persisted::PersistedBuffer;
pub use sink::{BufferedSink, FlushReport};

use crate::storage::StoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the buffer layer
#[derive(Debug, Error)]
pub enum BufferError {
    #[error("Buffer I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Buffer CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Buffer {path} has header [{found}], expected [{expected}]")]
    HeaderMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("Buffer {path} line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: u64,
        message: String,
    },

    #[error("Store unavailable; {rows} rows saved to {path}: {source}")]
    StoreUnavailable {
        rows: usize,
        path: PathBuf,
        #[source]
        source: StoreError,
    },

    #[error("Store unavailable ({source}) and {rows} rows could not be saved to {path}: {spill}")]
    SpillFailed {
        rows: usize,
        path: PathBuf,
        spill: String,
        #[source]
        source: StoreError,
    },
}

/// Result type for buffer operations
pub type BufferResult<T> = Result<T, BufferError>;
