//! Output module for reports and exports
//!
//! This module handles:
//! - Exporting recent rows and the site page after a run
//! - Printing table statistics for `--stats`

mod export;
pub mod stats;

pub use export::{copy_template, export_recent, ExportReport};
pub use stats::{load_statistics, print_statistics, TableStatistics};
