use std::io::Write;
use std::sync::Arc;

use tokio::task::JoinHandle;

use storage_file::{DurableWriter, PayloadDecoding, format_record};

use crate::queue::RecordQueue;

/// Counters reported when the dispatch loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub written: u64,
    pub failed: u64,
}

/// Single consumer of the record queue: format → persist → console.
///
/// All file and console I/O happens here, on a blocking thread.
pub struct Dispatcher {
    queue: Arc<RecordQueue>,
    writer: DurableWriter,
    console: Box<dyn Write + Send>,
    decoding: PayloadDecoding,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<RecordQueue>,
        writer: DurableWriter,
        console: Box<dyn Write + Send>,
        decoding: PayloadDecoding,
    ) -> Self {
        Self {
            queue,
            writer,
            console,
            decoding,
        }
    }

    /// Drain the queue until it is closed and empty, then release the file.
    pub fn run(mut self) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        while let Some(record) = self.queue.pop_blocking() {
            let line = format_record(&record, self.decoding);

            match self.writer.append(&line) {
                Ok(()) => summary.written += 1,
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(topic = %record.topic, error = %e, "message not persisted");
                }
            }

            let shown = line.strip_suffix('\n').unwrap_or(&line);
            if let Err(e) = writeln!(self.console, "{shown}").and_then(|()| self.console.flush()) {
                tracing::warn!(error = %e, "console write failed");
            }
        }

        if let Err(e) = self.writer.close() {
            tracing::error!(error = %e, "closing log file failed");
        }
        tracing::info!(written = summary.written, failed = summary.failed, "dispatch finished");
        summary
    }
}

/// Run the dispatcher on the blocking pool.
pub fn spawn_dispatcher(dispatcher: Dispatcher) -> JoinHandle<DispatchSummary> {
    tokio::task::spawn_blocking(move || dispatcher.run())
}
