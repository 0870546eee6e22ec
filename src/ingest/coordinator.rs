//! Run controller - main ingestion loop
//!
//! Walks the requested periods, fetches each period's station chunks and
//! hands the rows to the buffered sink. Owns the circuit breaker: too many
//! failed blocks in one period, or too many failed periods in a row, abort
//! the run unless failures are being skipped.

use crate::buffer::{BufferResult, BufferedSink, FlushReport};
use crate::config::{ClientErrorPolicy, RunConfig};
use crate::ingest::{rows_from_payload, BlockFetcher, ChunkScheduler, FetchError, FetchRequest};
use crate::state::{PeriodOutcome, RunState, RunStatus};
use crate::storage::{RowStore, Schema};
use crate::IngestError;
use chrono::NaiveDate;
use tracing::{error, info, warn};

/// Counters for a finished (or aborted) run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Periods fully processed
    pub periods: usize,
    /// Blocks that returned a payload
    pub blocks_fetched: u32,
    /// Blocks skipped after failing
    pub failed_blocks: u32,
    /// Rows produced by this run's fetches
    pub rows_collected: usize,
    /// Rows recovered from an earlier run's buffer
    pub rows_recovered: usize,
    /// Rows handed to the store by the final flush
    pub rows_flushed: usize,
    /// Rows the store did not already hold
    pub rows_inserted: usize,
    /// Where the run ended up
    pub status: RunStatus,
}

/// Drives fetches across periods and chunks
pub struct RunController<F: BlockFetcher> {
    fetcher: F,
    scheduler: ChunkScheduler,
    schema: Schema,
    max_failed_blocks: u32,
    skip_failures: bool,
    client_error_policy: ClientErrorPolicy,
    state: RunState,
}

impl<F: BlockFetcher> RunController<F> {
    /// Creates a controller
    ///
    /// # Arguments
    ///
    /// * `fetcher` - Block source
    /// * `schema` - Column schema; its parameters are requested from the API
    /// * `run` - Chunk size and circuit breaker threshold
    /// * `client_error_policy` - Whether a 4xx rejection aborts the run
    /// * `skip_failures` - Never trip the circuit breaker
    pub fn new(
        fetcher: F,
        schema: Schema,
        run: &RunConfig,
        client_error_policy: ClientErrorPolicy,
        skip_failures: bool,
    ) -> Self {
        Self {
            fetcher,
            scheduler: ChunkScheduler::new(run.chunk_size),
            schema,
            max_failed_blocks: run.max_failed_blocks,
            skip_failures,
            client_error_policy,
            state: RunState::new(),
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Whether a fetch error must stop the run regardless of skip mode
    fn is_fatal(&self, error: &FetchError) -> bool {
        match error {
            FetchError::CooldownTooLong { .. } | FetchError::HourlyBudgetExhausted { .. } => true,
            FetchError::ClientRejected { .. } => {
                self.client_error_policy == ClientErrorPolicy::AbortRun
            }
            _ => false,
        }
    }

    /// Processes every period in order
    ///
    /// Rows go to `sink` as blocks complete; nothing is written to the store
    /// here. On abort the run state is marked `Aborted` and the rows
    /// collected so far stay in the sink for the caller's final flush.
    ///
    /// # Returns
    ///
    /// * `Ok(RunSummary)` - All periods processed
    /// * `Err(IngestError)` - Circuit breaker tripped, a fatal fetch error,
    ///   or the sink could not spill
    pub async fn run<S: RowStore>(
        &mut self,
        periods: &[NaiveDate],
        stations: &[i64],
        sink: &mut BufferedSink<S>,
    ) -> Result<RunSummary, IngestError> {
        let mut summary = RunSummary::default();
        let chunk_count = self.scheduler.chunk_count(stations.len());

        for &period in periods {
            self.state.begin_period();
            let mut period_rows = 0;

            for (index, chunk) in self.scheduler.chunks(stations).enumerate() {
                let request = FetchRequest {
                    period,
                    stations: chunk,
                    parameters: self.schema.parameters(),
                };

                let outcome = match self.fetcher.fetch(&request).await {
                    Ok(payload) => rows_from_payload(&payload, &self.schema),
                    Err(e) => Err(e),
                };

                match outcome {
                    Ok(rows) => {
                        summary.blocks_fetched += 1;
                        period_rows += rows.len();
                        if let Err(e) = sink.extend(rows) {
                            self.state.abort();
                            return Err(e.into());
                        }
                    }
                    Err(e) if self.is_fatal(&e) => {
                        error!("{} - abort", e);
                        self.state.abort();
                        return Err(e.into());
                    }
                    Err(e) => {
                        let failed = self.state.record_failed_block();
                        warn!(
                            "Block {}/{} for {} failed: {} - skipped",
                            index + 1,
                            chunk_count,
                            request,
                            e
                        );

                        if !self.skip_failures && failed >= self.max_failed_blocks {
                            self.state.abort();
                            return Err(IngestError::TooManyFailedBlocks { period, failed });
                        }
                    }
                }
            }

            match self.state.finish_period() {
                PeriodOutcome::Clean => info!(
                    "{} collected ({} rows, {} pending)",
                    period,
                    period_rows,
                    sink.pending()
                ),
                PeriodOutcome::Failed { consecutive } => {
                    warn!(
                        "{} finished with {} failed blocks ({} failed periods in a row)",
                        period, self.state.failed_blocks, consecutive
                    );
                    if !self.skip_failures && consecutive >= self.max_failed_blocks {
                        self.state.abort();
                        return Err(IngestError::TooManyFailedPeriods {
                            period,
                            periods: consecutive,
                        });
                    }
                }
            }

            summary.periods += 1;
            summary.rows_collected += period_rows;
        }

        summary.failed_blocks = self.state.total_failed_blocks;
        Ok(summary)
    }

    /// Settles the terminal status once the final flush has run
    ///
    /// A run that got through every period is `Complete` only if the flush
    /// succeeded. A failed flush aborts it; an aborted run stays aborted.
    pub fn finish(&mut self, flushed: &BufferResult<FlushReport>) -> RunStatus {
        match flushed {
            Ok(_) => self.state.complete(),
            Err(_) => self.state.abort(),
        }
        self.state.status
    }
}
