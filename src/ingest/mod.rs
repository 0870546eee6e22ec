//! Ingestion module for pulling station records from the dataset API
//!
//! This module contains the core ingestion logic, including:
//! - Client-side rate limiting with two sliding windows
//! - HTTP fetching with retry and backoff
//! - Station chunk scheduling
//! - Payload to row conversion
//! - Overall run coordination and the circuit breaker

mod coordinator;
mod fetcher;
mod rate_limiter;
mod scheduler;
mod transform;

pub use coordinator::{RunController, RunSummary};
pub use fetcher::{build_http_client, BlockFetcher, FetchRequest, HttpFetcher};
pub use rate_limiter::RateLimiter;
pub use scheduler::ChunkScheduler;
pub use transform::{rows_from_payload, Feature, FeatureProperties, ParameterSeries, RawPayload};

use crate::buffer::{BufferedSink, PersistedBuffer, SinkGuard};
use crate::config::Config;
use crate::output::export_recent;
use crate::state::Granularity;
use crate::stations::{load_stations, StationCatalog};
use crate::storage::{Schema, SqliteStore};
use crate::IngestError;
use chrono::NaiveDate;
use rand::Rng;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Errors from a single block fetch
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("provider cooldown of {suggested:?} exceeds maximum wait of {max:?}")]
    CooldownTooLong { suggested: Duration, max: Duration },

    #[error("hourly request budget exhausted; next slot in {wait:?} exceeds maximum wait of {max:?}")]
    HourlyBudgetExhausted { wait: Duration, max: Duration },

    #[error("request rejected with HTTP {status}")]
    ClientRejected { status: u16 },

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("malformed payload: {0}")]
    Decode(String),
}

/// Uniform random delay in `[min_ms, max_ms]`
pub(crate) fn jitter(min_ms: u64, max_ms: u64) -> Duration {
    if max_ms <= min_ms {
        return Duration::from_millis(min_ms);
    }
    Duration::from_millis(rand::thread_rng().gen_range(min_ms..=max_ms))
}

/// Caller-supplied parameters of one run
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub granularity: Granularity,
    /// Inclusive backfill range; `None` means the most recent complete period
    pub range: Option<(NaiveDate, NaiveDate)>,
    /// Restrict the run to these station ids
    pub stations: Option<Vec<i64>>,
    /// Never trip the circuit breaker
    pub skip_failures: bool,
    /// Reference date for the default period and station expiry
    pub today: NaiveDate,
}

impl RunOptions {
    /// Periods this run will process, in order
    pub fn periods(&self) -> Vec<NaiveDate> {
        match self.range {
            Some((start, end)) => self.granularity.periods(start, end),
            None => vec![self.granularity.previous(self.today)],
        }
    }
}

/// Resolved work for a run
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub periods: Vec<NaiveDate>,
    pub stations: Vec<i64>,
    pub catalog: StationCatalog,
    pub schema: Schema,
}

impl RunPlan {
    /// Requests the plan needs, assuming no retries
    pub fn request_count(&self, chunk_size: usize) -> usize {
        self.periods.len() * ChunkScheduler::new(chunk_size).chunk_count(self.stations.len())
    }
}

/// Resolves periods, stations and schema without touching the network
pub fn plan_run(config: &Config, options: &RunOptions) -> Result<RunPlan, IngestError> {
    let catalog = load_stations(Path::new(&config.stations.path), options.today)?;
    let stations = match &options.stations {
        Some(subset) => catalog.select(subset),
        None => catalog.ids().to_vec(),
    };

    Ok(RunPlan {
        periods: options.periods(),
        stations,
        catalog,
        schema: Schema::new(config.parameters(options.granularity)),
    })
}

/// Runs a complete ingestion
///
/// This is the main entry point. It will:
/// 1. Resolve periods and stations
/// 2. Reload rows left in the crash buffer by an earlier run
/// 3. Fetch every period's station chunks under the rate limiter
/// 4. Write all collected rows to the store in one bulk flush
/// 5. Export recent rows, when configured
///
/// Rows collected before an abort are still flushed (or saved to the crash
/// buffer) before the error is returned. The same happens if the returned
/// future is dropped mid-run.
///
/// # Arguments
///
/// * `config` - The ingestion configuration
/// * `options` - Granularity, range and station selection
///
/// # Returns
///
/// * `Ok(RunSummary)` - All periods processed and flushed
/// * `Err(IngestError)` - The run aborted or the flush failed
pub async fn run_ingest(config: &Config, options: &RunOptions) -> Result<RunSummary, IngestError> {
    let granularity = options.granularity;
    let plan = plan_run(config, options)?;

    match (plan.periods.first(), plan.periods.last()) {
        (Some(first), Some(last)) => info!(
            "Ingesting {} {} periods {} .. {} for {} stations",
            plan.periods.len(),
            granularity,
            first,
            last,
            plan.stations.len()
        ),
        _ => warn!("Empty period range - nothing to fetch"),
    }
    if plan.stations.is_empty() {
        warn!("No active stations selected");
    }

    let store = SqliteStore::new(
        &config.storage.database_path,
        config.table(granularity),
        plan.schema.clone(),
    );
    let persisted = PersistedBuffer::new(config.buffer_path(granularity), plan.schema.columns());
    let mut sink = BufferedSink::new(store, persisted, config.storage.spill_threshold);
    let rows_recovered = sink.load_persisted()?;
    let mut guard = SinkGuard::new(sink);

    let client = build_http_client(&config.provider)?;
    let mut limiter = RateLimiter::new(&config.rate_limit);
    let fetcher = HttpFetcher::new(
        client,
        &config.provider.base_url,
        config.dataset(granularity),
        config.retry.clone(),
        config.rate_limit.max_wait(),
        &mut limiter,
    )?;
    let mut controller = RunController::new(
        fetcher,
        plan.schema.clone(),
        &config.run,
        config.retry.client_error_policy,
        options.skip_failures,
    );

    let outcome = controller
        .run(&plan.periods, &plan.stations, guard.sink_mut())
        .await;
    let flushed = guard.finish();
    let status = controller.finish(&flushed);

    let mut summary = match outcome {
        Ok(summary) => summary,
        Err(e) => {
            match &flushed {
                Ok(report) => info!("Saved {} rows collected before abort", report.attempted),
                Err(flush_error) => error!("Final flush after abort failed: {}", flush_error),
            }
            return Err(e);
        }
    };

    let report = flushed?;
    summary.rows_recovered = rows_recovered;
    summary.rows_flushed = report.attempted;
    summary.rows_inserted = report.inserted;
    summary.status = status;

    info!(
        "Run complete: {} periods, {} rows collected, {} inserted, {} failed blocks",
        summary.periods, summary.rows_collected, summary.rows_inserted, summary.failed_blocks
    );

    if let Some(export) = &config.export {
        let store = SqliteStore::new(
            &config.storage.database_path,
            config.table(granularity),
            plan.schema.clone(),
        );
        export_recent(&store, &plan.schema, &plan.catalog, export, options.today)?;
    }

    Ok(summary)
}
