//! Station metadata
//!
//! Reads the station list CSV (`id`, `Stationsname`, `Bundesland`,
//! `Enddatum`) and keeps the stations still active on a given day.

use crate::IngestError;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct StationRecord {
    id: String,
    #[serde(rename = "Stationsname", default)]
    name: String,
    #[serde(rename = "Bundesland", default)]
    region: String,
    #[serde(rename = "Enddatum", default)]
    valid_to: String,
}

/// Display metadata for one station
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StationInfo {
    pub name: String,
    pub region: String,
}

/// Active stations in file order, with their metadata
#[derive(Debug, Clone, Default)]
pub struct StationCatalog {
    ids: Vec<i64>,
    info: HashMap<i64, StationInfo>,
}

impl StationCatalog {
    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    pub fn get(&self, id: i64) -> Option<&StationInfo> {
        self.info.get(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Restricts a run to `subset`, keeping its order
    ///
    /// Ids that are not active stations are dropped with a warning.
    pub fn select(&self, subset: &[i64]) -> Vec<i64> {
        let mut selected = Vec::with_capacity(subset.len());
        for &id in subset {
            if !self.info.contains_key(&id) {
                warn!("Station {} is unknown or inactive - ignored", id);
            } else if selected.contains(&id) {
                debug!("Station {} listed twice", id);
            } else {
                selected.push(id);
            }
        }
        selected
    }
}

/// Loads the station catalog from a CSV file
///
/// # Arguments
///
/// * `path` - Path to the station metadata CSV
/// * `today` - Stations whose end date lies before this day are skipped
pub fn load_stations(path: &Path, today: NaiveDate) -> Result<StationCatalog, IngestError> {
    let file = std::fs::File::open(path).map_err(|e| {
        IngestError::Stations(format!("cannot open {}: {}", path.display(), e))
    })?;
    let catalog = parse_stations(file, today)?;
    info!(
        "Loaded {} active stations from {}",
        catalog.len(),
        path.display()
    );
    Ok(catalog)
}

/// Parses station metadata from any reader
pub fn parse_stations<R: Read>(reader: R, today: NaiveDate) -> Result<StationCatalog, IngestError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut catalog = StationCatalog::default();

    for record in reader.deserialize::<StationRecord>() {
        let record = record?;

        let valid_to = record
            .valid_to
            .get(..10)
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());
        match valid_to {
            Some(end) if end >= today => {}
            Some(_) => continue,
            None => {
                debug!("Station {} has no usable end date - skipped", record.id);
                continue;
            }
        }

        let id: i64 = record
            .id
            .parse()
            .map_err(|_| IngestError::Stations(format!("invalid station id '{}'", record.id)))?;

        if catalog
            .info
            .insert(
                id,
                StationInfo {
                    name: record.name,
                    region: record.region,
                },
            )
            .is_none()
        {
            catalog.ids.push(id);
        }
    }

    Ok(catalog)
}
