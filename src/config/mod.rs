//! Configuration module for Station-Ingest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use station_ingest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("ingest.toml")).unwrap();
//! println!("Chunk size: {}", config.run.chunk_size);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ClientErrorPolicy, Config, ExportConfig, ParameterConfig, ProviderConfig, RateLimitConfig,
    RetryConfig, RunConfig, StationsConfig, StorageConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use validation::validate;
