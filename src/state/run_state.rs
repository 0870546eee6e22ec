//! Run state tracking
//!
//! Counters behind the circuit breaker and the run's terminal status.

/// Lifecycle of a single ingestion run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunStatus {
    #[default]
    Running,
    /// Every period processed and the final flush succeeded
    Complete,
    /// A fatal condition stopped the run
    Aborted,
}

/// How a finished period affected the circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodOutcome {
    /// No failed blocks; the consecutive-failure counter was reset
    Clean,
    /// At least one failed block; carries the new consecutive count
    Failed { consecutive: u32 },
}

/// Mutable bookkeeping for one run
///
/// Tracks the two circuit-breaker counters. The consecutive counter is
/// reset exactly when a period finishes with zero failed blocks.
#[derive(Debug, Clone)]
pub struct RunState {
    /// Failed blocks in the current period
    pub failed_blocks: u32,

    /// Periods in a row that ended with at least one failed block
    pub consecutive_failed_periods: u32,

    /// Failed blocks across the whole run
    pub total_failed_blocks: u32,

    pub status: RunStatus,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            failed_blocks: 0,
            consecutive_failed_periods: 0,
            total_failed_blocks: 0,
            status: RunStatus::Running,
        }
    }

    /// Enters a new period, clearing the per-period counter
    pub fn begin_period(&mut self) {
        self.failed_blocks = 0;
    }

    /// Records a failed block and returns the per-period count
    pub fn record_failed_block(&mut self) -> u32 {
        self.failed_blocks += 1;
        self.total_failed_blocks += 1;
        self.failed_blocks
    }

    /// Closes the current period and updates the consecutive counter
    pub fn finish_period(&mut self) -> PeriodOutcome {
        if self.failed_blocks == 0 {
            self.consecutive_failed_periods = 0;
            PeriodOutcome::Clean
        } else {
            self.consecutive_failed_periods += 1;
            PeriodOutcome::Failed {
                consecutive: self.consecutive_failed_periods,
            }
        }
    }

    pub fn abort(&mut self) {
        self.status = RunStatus::Aborted;
    }

    /// Marks a still-running run complete; an aborted run stays aborted
    pub fn complete(&mut self) {
        if self.status == RunStatus::Running {
            self.status = RunStatus::Complete;
        }
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}
