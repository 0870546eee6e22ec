//! Station-Ingest: resilient time-series ingestion for weather stations
//!
//! This crate pulls per-station records from a remote dataset API and loads
//! them into a relational store, recording each (station, date) pair at most
//! once across repeated runs, network failures and crashes.

pub mod buffer;
pub mod config;
pub mod ingest;
pub mod output;
pub mod state;
pub mod stations;
pub mod storage;

use thiserror::Error;

/// Main error type for ingestion runs
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch aborted the run: {0}")]
    Fetch(#[from] ingest::FetchError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StoreError),

    #[error("Buffer error: {0}")]
    Buffer(#[from] buffer::BufferError),

    #[error("Station metadata error: {0}")]
    Stations(String),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("{failed} blocks failed for period {period} - abort")]
    TooManyFailedBlocks {
        period: chrono::NaiveDate,
        failed: u32,
    },

    #[error("{periods} consecutive periods failed (last {period}) - abort")]
    TooManyFailedPeriods {
        period: chrono::NaiveDate,
        periods: u32,
    },

    #[error("Interrupted")]
    Interrupted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    /// Process exit status for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Interrupted => 130,
            _ => 1,
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),
}

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use ingest::{run_ingest, RunOptions, RunSummary};
pub use state::{Granularity, RunState, RunStatus};
pub use storage::{Row, Schema, Value};
