//! Statistics about an ingested table
//!
//! This module provides functionality for extracting and displaying
//! table statistics from the store and the crash buffer.

use crate::buffer::PersistedBuffer;
use crate::storage::{RowStore, StoreStats};
use crate::IngestError;

/// Table statistics summary
#[derive(Debug, Clone)]
pub struct TableStatistics {
    /// Store location, as printed in logs
    pub location: String,

    /// Row count, distinct stations and date span
    pub stored: StoreStats,

    /// Rows waiting in the crash buffer for the next run
    pub buffered: usize,
}

/// Loads statistics from the store and the crash buffer
///
/// # Arguments
///
/// * `store` - The store to query
/// * `buffer` - The crash buffer belonging to the same table
///
/// # Returns
///
/// * `Ok(TableStatistics)` - Successfully loaded statistics
/// * `Err(IngestError)` - The store or the buffer could not be read
pub fn load_statistics<S: RowStore>(
    store: &S,
    buffer: &PersistedBuffer,
) -> Result<TableStatistics, IngestError> {
    let stored = store.stats()?;
    let buffered = if buffer.exists() {
        buffer.read_all()?.len()
    } else {
        0
    };

    Ok(TableStatistics {
        location: store.describe(),
        stored,
        buffered,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &TableStatistics) {
    println!("=== Table Statistics ===\n");

    println!("Store: {}", stats.location);
    println!("  Rows: {}", stats.stored.rows);
    println!("  Stations: {}", stats.stored.stations);
    match (&stats.stored.first_date, &stats.stored.last_date) {
        (Some(first), Some(last)) => println!("  Dates: {} .. {}", first, last),
        _ => println!("  Dates: (empty)"),
    }
    println!();

    if stats.buffered > 0 {
        println!(
            "Crash buffer: {} rows pending (written on the next run)",
            stats.buffered
        );
    } else {
        println!("Crash buffer: empty");
    }

    let per_station = if stats.stored.stations > 0 {
        stats.stored.rows as f64 / stats.stored.stations as f64
    } else {
        0.0
    };
    println!("Average rows per station: {:.1}", per_station);
}
