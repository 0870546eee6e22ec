//! State module for tracking run progress
//!
//! # Components
//!
//! - `Granularity`: daily or monthly periods, and the arithmetic over them
//! - `RunState`: per-run counters that drive the circuit breaker
//! - `RunStatus`: running, complete or aborted

mod period;
mod run_state;

// Re-export main types
pub use period::{month_start, Granularity};
pub use run_state::{PeriodOutcome, RunState, RunStatus};
