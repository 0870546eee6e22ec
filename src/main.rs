//! Station-Ingest main entry point
//!
//! This is the command-line interface for the weather station ingester.

use chrono::{Local, NaiveDate};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use station_ingest::config::{load_config_with_hash, Config};
use station_ingest::ingest::{plan_run, run_ingest, RunOptions};
use station_ingest::{Granularity, IngestError};
use tracing_subscriber::EnvFilter;

/// Station-Ingest: resilient weather station ingestion
///
/// Pulls daily or monthly station records from the dataset API under a
/// strict request budget and stores each (station, date) exactly once.
/// Rows that cannot be written are kept on disk and loaded by the next run.
#[derive(Parser, Debug)]
#[command(name = "station-ingest")]
#[command(version = "1.0.0")]
#[command(about = "Resilient weather station ingestion", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Period size to ingest
    #[arg(short, long, value_enum, default_value_t = Granularity::Monthly)]
    granularity: Granularity,

    /// Fetch every period from START to END (inclusive, YYYY-MM-DD)
    #[arg(long, num_args = 2, value_names = ["START", "END"])]
    backfill: Option<Vec<NaiveDate>>,

    /// Only fetch these station ids (comma separated)
    #[arg(long, value_delimiter = ',')]
    stations: Option<Vec<i64>>,

    /// Keep going past failed blocks instead of aborting
    #[arg(long)]
    skip_failures: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be fetched without fetching
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics for the target table and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<(), IngestError> {
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    let options = RunOptions {
        granularity: cli.granularity,
        range: cli
            .backfill
            .as_deref()
            .and_then(|range| match range {
                [start, end] => Some((*start, *end)),
                _ => None,
            }),
        stations: cli.stations,
        skip_failures: cli.skip_failures,
        today: Local::now().date_naive(),
    };

    if cli.dry_run {
        handle_dry_run(&config, &options)
    } else if cli.stats {
        handle_stats(&config, cli.granularity)
    } else {
        handle_ingest(&config, &options).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("station_ingest=info,warn"),
            1 => EnvFilter::new("station_ingest=debug,info"),
            2 => EnvFilter::new("station_ingest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be fetched
fn handle_dry_run(config: &Config, options: &RunOptions) -> Result<(), IngestError> {
    let granularity = options.granularity;
    let plan = plan_run(config, options)?;

    println!("=== Station-Ingest Dry Run ===\n");

    println!("Provider:");
    println!("  Base URL: {}", config.provider.base_url);
    println!("  Dataset: {}", config.dataset(granularity));
    println!("  Timeout: {}s", config.provider.timeout_secs);

    println!("\nRequest Budget:");
    println!(
        "  {} per {}ms, {} per {}s",
        config.rate_limit.per_second,
        config.rate_limit.short_window_ms,
        config.rate_limit.per_hour,
        config.rate_limit.long_window_secs
    );
    println!("  Max wait: {}s", config.rate_limit.max_wait_secs);
    println!("  Max retries: {}", config.retry.max_retries);

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path);
    println!("  Table: {}", config.table(granularity));
    println!("  Crash buffer: {}", config.buffer_path(granularity).display());

    println!("\nParameters ({}):", plan.schema.parameters().len());
    println!("  {}", plan.schema.parameters().join(", "));

    println!("\nPlan:");
    match (plan.periods.first(), plan.periods.last()) {
        (Some(first), Some(last)) => println!(
            "  {} {} periods: {} .. {}",
            plan.periods.len(),
            granularity,
            first,
            last
        ),
        _ => println!("  No periods in range"),
    }
    println!("  Stations: {}", plan.stations.len());
    println!("  Chunk size: {}", config.run.chunk_size);

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would send at least {} requests",
        plan.request_count(config.run.chunk_size)
    );

    Ok(())
}

/// Handles the --stats mode: shows statistics for the target table
fn handle_stats(config: &Config, granularity: Granularity) -> Result<(), IngestError> {
    use station_ingest::buffer::PersistedBuffer;
    use station_ingest::output::{load_statistics, print_statistics};
    use station_ingest::storage::{Schema, SqliteStore};

    let schema = Schema::new(config.parameters(granularity));
    let store = SqliteStore::new(
        &config.storage.database_path,
        config.table(granularity),
        schema.clone(),
    );
    let buffer = PersistedBuffer::new(config.buffer_path(granularity), schema.columns());

    let stats = load_statistics(&store, &buffer)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main ingestion run
///
/// Ctrl-C drops the run future; the sink guard inside it makes the final
/// flush attempt before the process exits with status 130.
async fn handle_ingest(config: &Config, options: &RunOptions) -> Result<(), IngestError> {
    tokio::select! {
        result = run_ingest(config, options) => {
            let summary = result?;
            tracing::info!(
                "Done: {} rows inserted, {} already present, {} recovered from buffer",
                summary.rows_inserted,
                summary.rows_flushed.saturating_sub(summary.rows_inserted),
                summary.rows_recovered
            );
            Ok(())
        }
        Ok(()) = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupt received - saving collected rows");
            Err(IngestError::Interrupted)
        }
    }
}
