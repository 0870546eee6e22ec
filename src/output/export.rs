//! Recent-data export for the static site

use crate::config::ExportConfig;
use crate::stations::StationCatalog;
use crate::storage::{RowStore, Schema, Value};
use crate::IngestError;
use chrono::{Days, NaiveDate};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// What an export produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub csv_path: PathBuf,
    pub rows: usize,
    /// Whether the HTML template was copied
    pub page_written: bool,
}

/// Writes rows from the last `recent-days` days to `<site-dir>/last<N>.csv`
///
/// Columns are `station,name,region,date` followed by the schema parameters.
/// Name and region come from the catalog and are empty for unknown ids. The
/// configured template, if it exists, is copied to `<site-dir>/index.html`.
pub fn export_recent<S: RowStore>(
    store: &S,
    schema: &Schema,
    catalog: &StationCatalog,
    config: &ExportConfig,
    today: NaiveDate,
) -> Result<ExportReport, IngestError> {
    let site_dir = Path::new(&config.site_dir);
    std::fs::create_dir_all(site_dir)?;

    let cutoff = today
        .checked_sub_days(Days::new(config.recent_days as u64))
        .unwrap_or(NaiveDate::MIN);
    let rows = store.query_since(cutoff)?;

    let csv_path = site_dir.join(format!("last{}.csv", config.recent_days));
    let mut writer = csv::Writer::from_path(&csv_path)?;

    let mut header = vec![
        "station".to_string(),
        "name".to_string(),
        "region".to_string(),
        "date".to_string(),
    ];
    header.extend(schema.parameters().iter().cloned());
    writer.write_record(&header)?;

    for row in &rows {
        let info = catalog.get(row.station);
        let mut record = Vec::with_capacity(header.len());
        record.push(row.station.to_string());
        record.push(info.map(|i| i.name.clone()).unwrap_or_default());
        record.push(info.map(|i| i.region.clone()).unwrap_or_default());
        record.push(row.date.to_string());
        record.extend(row.values.iter().map(Value::to_field));
        writer.write_record(&record)?;
    }
    writer.flush()?;

    let page_written = match &config.template {
        Some(template) => copy_template(Path::new(template), site_dir)?,
        None => false,
    };

    info!(
        "Exported {} rows since {} to {}",
        rows.len(),
        cutoff,
        csv_path.display()
    );

    Ok(ExportReport {
        csv_path,
        rows: rows.len(),
        page_written,
    })
}

/// Copies the page template into the site directory as `index.html`
///
/// Returns `false` without error when the template does not exist.
pub fn copy_template(template: &Path, site_dir: &Path) -> std::io::Result<bool> {
    if !template.exists() {
        warn!("Template {} not found - page not written", template.display());
        return Ok(false);
    }
    std::fs::copy(template, site_dir.join("index.html"))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stations::parse_stations;
    use crate::storage::{Row, SqliteStore};
    use tempfile::TempDir;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    #[test]
    fn test_export_recent_rows() {
        let dir = TempDir::new().unwrap();
        let schema = Schema::new(["tl_mittel", "rr"]);
        let store = SqliteStore::new(dir.path().join("db.sqlite"), "daily", schema.clone());
        store
            .upsert_rows(&[
                Row::new(5904, d(1), vec![Value::Real(20.5), Value::Integer(0)]),
                Row::new(5904, d(9), vec![Value::Real(21.5), Value::Null]),
                Row::new(99, d(9), vec![Value::Null, Value::Integer(3)]),
            ])
            .unwrap();

        let catalog = parse_stations(
            "id,Stationsname,Bundesland,Enddatum\n5904,Wien,W,2100-01-01\n".as_bytes(),
            d(1),
        )
        .unwrap();

        let template = dir.path().join("index_template.html");
        std::fs::write(&template, "<html></html>").unwrap();

        let config = ExportConfig {
            site_dir: dir.path().join("site").display().to_string(),
            recent_days: 7,
            template: Some(template.display().to_string()),
        };

        let report = export_recent(&store, &schema, &catalog, &config, d(10)).unwrap();
        assert_eq!(report.rows, 2);
        assert!(report.page_written);

        let content = std::fs::read_to_string(&report.csv_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "station,name,region,date,tl_mittel,rr");
        assert_eq!(lines[1], "99,,,2024-06-09,,3");
        assert_eq!(lines[2], "5904,Wien,W,2024-06-09,21.5,");
        assert!(dir.path().join("site").join("index.html").exists());
    }

    #[test]
    fn test_missing_template_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let written = copy_template(&dir.path().join("none.html"), dir.path()).unwrap();
        assert!(!written);
    }
}
