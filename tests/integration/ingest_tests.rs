//! Integration tests for ingestion runs
//!
//! These tests use wiremock to stand in for the dataset API and run the
//! full fetch, buffer and flush cycle against a temporary SQLite database.

use chrono::NaiveDate;
use serde_json::json;
use station_ingest::buffer::BufferError;
use station_ingest::config::{load_config, Config};
use station_ingest::ingest::{run_ingest, FetchError, RunOptions};
use station_ingest::storage::{RowStore, Schema, SqliteStore, Value};
use station_ingest::{Granularity, IngestError, RunStatus};
use std::collections::HashMap;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const DATASET_PATH: &str = "/station/historical/klima-v2-1m";

const STATIONS_CSV: &str = "\
id,Stationsname,Bundesland,Enddatum
1,Wien Innere Stadt,Wien,2100-12-31T00:00:00+00:00
2,Graz Universitaet,Steiermark,2100-12-31T00:00:00+00:00
3,Innsbruck Flughafen,Tirol,2100-12-31T00:00:00+00:00
4,Geschlossen,Tirol,2010-12-31T00:00:00+00:00
";

/// Writes the station list and a config file into `dir`, then loads it
///
/// All pacing and jitter is zeroed so runs finish quickly.
fn create_test_config(dir: &Path, base_url: &str, database_path: &Path, extra: &str) -> Config {
    std::fs::write(dir.join("stations.csv"), STATIONS_CSV).unwrap();

    let content = format!(
        r#"
[provider]
base-url = "{base_url}"
timeout-secs = 5

[parameters]
monthly = ["tl_mittel", "rr"]

[rate-limit]
per-second = 100
per-hour = 10000
pacing-min-ms = 0
pacing-max-ms = 0
burst-every = 1000
burst-pause-min-ms = 0
burst-pause-max-ms = 0

[retry]
max-retries = 1
backoff-base-ms = 1
backoff-jitter-min-ms = 0
backoff-jitter-max-ms = 0
rate-limit-jitter-min-ms = 0
rate-limit-jitter-max-ms = 0
default-reset-secs = 0

[run]
chunk-size = 2
max-failed-blocks = 2

[storage]
database-path = "{db}"
buffer-dir = "{dir}"

[stations]
path = "{stations}"
{extra}
"#,
        base_url = base_url,
        db = database_path.display(),
        dir = dir.display(),
        stations = dir.join("stations.csv").display(),
        extra = extra,
    );

    let config_path = dir.join("ingest.toml");
    std::fs::write(&config_path, content).unwrap();
    load_config(&config_path).unwrap()
}

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn backfill(start: NaiveDate, end: NaiveDate, skip_failures: bool) -> RunOptions {
    RunOptions {
        granularity: Granularity::Monthly,
        range: Some((start, end)),
        stations: None,
        skip_failures,
        today: d(2024, 3, 10),
    }
}

fn open_store(config: &Config) -> SqliteStore {
    SqliteStore::new(
        &config.storage.database_path,
        config.table(Granularity::Monthly),
        Schema::new(config.parameters(Granularity::Monthly)),
    )
}

/// Answers with one record per requested station for the requested month
fn payload_for(request: &Request) -> ResponseTemplate {
    let query: HashMap<String, String> = request.url.query_pairs().into_owned().collect();
    let start = query.get("start").cloned().unwrap_or_default();
    let features: Vec<serde_json::Value> = query
        .get("station_ids")
        .map(|ids| {
            ids.split(',')
                .filter(|id| !id.is_empty())
                .map(|id| {
                    json!({
                        "type": "Feature",
                        "properties": {
                            "station": id.parse::<i64>().unwrap(),
                            "parameters": {
                                "TL_MITTEL": {"name": "Lufttemperatur", "unit": "°C", "data": [4.5]},
                                "RR": {"name": "Niederschlag", "unit": "mm", "data": [null]}
                            }
                        }
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    ResponseTemplate::new(200).set_body_json(json!({
        "timestamps": [format!("{}T00:00+00:00", start)],
        "features": features,
    }))
}

#[tokio::test]
async fn test_backfill_stores_every_station_and_period() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path(DATASET_PATH))
        .and(query_param("parameters", "TL_MITTEL,RR"))
        .respond_with(payload_for)
        .expect(4)
        .mount(&mock_server)
        .await;

    let config = create_test_config(dir.path(), &mock_server.uri(), &dir.path().join("weather.db"), "");
    let summary = run_ingest(&config, &backfill(d(2024, 1, 1), d(2024, 2, 1), false))
        .await
        .unwrap();

    assert_eq!(summary.periods, 2);
    assert_eq!(summary.blocks_fetched, 4);
    assert_eq!(summary.rows_collected, 6);
    assert_eq!(summary.rows_inserted, 6);
    assert_eq!(summary.status, RunStatus::Complete);

    let rows = open_store(&config).query_since(d(2024, 1, 1)).unwrap();
    assert_eq!(rows.len(), 6);
    assert_eq!(rows[0].station, 1);
    assert_eq!(rows[0].date, d(2024, 1, 1));
    assert_eq!(rows[0].values, vec![Value::Real(4.5), Value::Null]);
    assert!(rows.iter().all(|r| r.station != 4));
}

#[tokio::test]
async fn test_repeated_run_inserts_nothing_new() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path(DATASET_PATH))
        .respond_with(payload_for)
        .mount(&mock_server)
        .await;

    let config = create_test_config(dir.path(), &mock_server.uri(), &dir.path().join("weather.db"), "");
    let options = backfill(d(2024, 1, 1), d(2024, 2, 1), false);

    let first = run_ingest(&config, &options).await.unwrap();
    let second = run_ingest(&config, &options).await.unwrap();

    assert_eq!(first.rows_inserted, 6);
    assert_eq!(second.rows_flushed, 6);
    assert_eq!(second.rows_inserted, 0);
    assert_eq!(open_store(&config).stats().unwrap().rows, 6);
}

#[tokio::test]
async fn test_failed_blocks_abort_run() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    // two blocks x (1 attempt + 1 retry)
    Mock::given(method("GET"))
        .and(path(DATASET_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(4)
        .mount(&mock_server)
        .await;

    let config = create_test_config(dir.path(), &mock_server.uri(), &dir.path().join("weather.db"), "");
    let result = run_ingest(&config, &backfill(d(2023, 1, 1), d(2023, 12, 1), false)).await;

    match result {
        Err(e @ IngestError::TooManyFailedBlocks { .. }) => {
            assert_eq!(e.exit_code(), 1);
        }
        other => panic!("expected TooManyFailedBlocks, got {:?}", other),
    }
}

#[tokio::test]
async fn test_skip_failures_processes_every_period() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path(DATASET_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let config = create_test_config(dir.path(), &mock_server.uri(), &dir.path().join("weather.db"), "");
    let summary = run_ingest(&config, &backfill(d(2023, 1, 1), d(2023, 3, 1), true))
        .await
        .unwrap();

    assert_eq!(summary.periods, 3);
    assert_eq!(summary.failed_blocks, 6);
    assert_eq!(summary.rows_inserted, 0);
}

#[tokio::test]
async fn test_transient_error_is_retried() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path(DATASET_PATH))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path(DATASET_PATH))
        .respond_with(payload_for)
        .mount(&mock_server)
        .await;

    let config = create_test_config(dir.path(), &mock_server.uri(), &dir.path().join("weather.db"), "");
    let summary = run_ingest(&config, &backfill(d(2024, 1, 1), d(2024, 1, 1), false))
        .await
        .unwrap();

    assert_eq!(summary.failed_blocks, 0);
    assert_eq!(summary.rows_inserted, 3);
}

#[tokio::test]
async fn test_rate_limit_response_is_waited_out() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path(DATASET_PATH))
        .respond_with(ResponseTemplate::new(429).insert_header("ratelimit-reset", "0"))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path(DATASET_PATH))
        .respond_with(payload_for)
        .expect(2)
        .mount(&mock_server)
        .await;

    let config = create_test_config(dir.path(), &mock_server.uri(), &dir.path().join("weather.db"), "");
    let summary = run_ingest(&config, &backfill(d(2024, 1, 1), d(2024, 1, 1), false))
        .await
        .unwrap();

    assert_eq!(summary.failed_blocks, 0);
    assert_eq!(summary.rows_inserted, 3);
}

#[tokio::test]
async fn test_long_cooldown_aborts_even_when_skipping() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path(DATASET_PATH))
        .respond_with(ResponseTemplate::new(429).insert_header("ratelimit-reset", "3600"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = create_test_config(dir.path(), &mock_server.uri(), &dir.path().join("weather.db"), "");
    let result = run_ingest(&config, &backfill(d(2024, 1, 1), d(2024, 2, 1), true)).await;

    assert!(matches!(
        result,
        Err(IngestError::Fetch(FetchError::CooldownTooLong { .. }))
    ));
}

#[tokio::test]
async fn test_client_error_fails_block() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    // no retries on 4xx: one request per block
    Mock::given(method("GET"))
        .and(path(DATASET_PATH))
        .respond_with(ResponseTemplate::new(400))
        .expect(2)
        .mount(&mock_server)
        .await;

    let config = create_test_config(dir.path(), &mock_server.uri(), &dir.path().join("weather.db"), "");
    let result = run_ingest(&config, &backfill(d(2024, 1, 1), d(2024, 2, 1), false)).await;

    assert!(matches!(
        result,
        Err(IngestError::TooManyFailedBlocks { failed: 2, .. })
    ));
}

#[tokio::test]
async fn test_unreachable_store_keeps_rows_for_next_run() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path(DATASET_PATH))
        .respond_with(payload_for)
        .mount(&mock_server)
        .await;

    // first run: the database directory does not exist
    let broken = create_test_config(
        dir.path(),
        &mock_server.uri(),
        &dir.path().join("missing").join("weather.db"),
        "",
    );
    let result = run_ingest(&broken, &backfill(d(2024, 1, 1), d(2024, 1, 1), false)).await;

    match result {
        Err(IngestError::Buffer(BufferError::StoreUnavailable { rows, .. })) => assert_eq!(rows, 3),
        other => panic!("expected StoreUnavailable, got {:?}", other),
    }
    let buffer_path = broken.buffer_path(Granularity::Monthly);
    assert!(buffer_path.exists());

    // second run: store is back, fetching a different month
    let config = create_test_config(dir.path(), &mock_server.uri(), &dir.path().join("weather.db"), "");
    let summary = run_ingest(&config, &backfill(d(2024, 2, 1), d(2024, 2, 1), false))
        .await
        .unwrap();

    assert_eq!(summary.rows_recovered, 3);
    assert_eq!(summary.rows_inserted, 6);
    assert!(!buffer_path.exists());

    let stored = open_store(&config).stats().unwrap();
    assert_eq!(stored.rows, 6);
    assert_eq!(stored.first_date.as_deref(), Some("2024-01-01"));
    assert_eq!(stored.last_date.as_deref(), Some("2024-02-01"));
}

#[tokio::test]
async fn test_station_subset_and_export() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path(DATASET_PATH))
        .and(query_param("station_ids", "3,1"))
        .respond_with(payload_for)
        .expect(1)
        .mount(&mock_server)
        .await;

    let site_dir = dir.path().join("site");
    let extra = format!(
        "\n[export]\nsite-dir = \"{}\"\nrecent-days = 60\n",
        site_dir.display()
    );
    let config = create_test_config(dir.path(), &mock_server.uri(), &dir.path().join("weather.db"), &extra);

    let mut options = backfill(d(2024, 2, 1), d(2024, 2, 1), false);
    options.stations = Some(vec![3, 99, 1]);
    let summary = run_ingest(&config, &options).await.unwrap();
    assert_eq!(summary.rows_inserted, 2);

    let exported = std::fs::read_to_string(site_dir.join("last60.csv")).unwrap();
    let lines: Vec<&str> = exported.lines().collect();
    assert_eq!(lines[0], "station,name,region,date,tl_mittel,rr");
    assert_eq!(lines[1], "1,Wien Innere Stadt,Wien,2024-02-01,4.5,");
    assert_eq!(lines[2], "3,Innsbruck Flughafen,Tirol,2024-02-01,4.5,");
    assert_eq!(lines.len(), 3);
}
