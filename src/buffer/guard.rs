//! Final-flush guard
//!
//! Owns the sink for the duration of a run. Whatever way the run ends,
//! including an early return or a cancelled future, the collected rows get
//! one flush attempt.

use crate::buffer::{BufferResult, BufferedSink, FlushReport};
use crate::storage::RowStore;
use tracing::{error, info, warn};

pub struct SinkGuard<S: RowStore> {
    sink: BufferedSink<S>,
    finished: bool,
}

impl<S: RowStore> SinkGuard<S> {
    pub fn new(sink: BufferedSink<S>) -> Self {
        Self {
            sink,
            finished: false,
        }
    }

    pub fn sink(&self) -> &BufferedSink<S> {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut BufferedSink<S> {
        &mut self.sink
    }

    /// Performs the final flush and disarms the guard
    pub fn finish(mut self) -> BufferResult<FlushReport> {
        self.finished = true;
        self.sink.flush_to_store()
    }
}

impl<S: RowStore> Drop for SinkGuard<S> {
    fn drop(&mut self) {
        if self.finished || self.sink.pending() == 0 {
            return;
        }

        warn!(
            "Run ended early; flushing {} pending rows",
            self.sink.pending()
        );
        match self.sink.flush_to_store() {
            Ok(report) => info!("Shutdown flush wrote {} rows", report.inserted),
            Err(e) => error!("Shutdown flush failed: {}", e),
        }
    }
}
