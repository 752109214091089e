//! Progress reporting for analysis runs.

use tokio::sync::mpsc;

use codeask_core::{FileStatus, SummaryStatus};

/// Progress notification emitted while a run is in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A worker picked up the file.
    FileStarted { path: String },
    /// A failed attempt is being retried.
    FileRetrying {
        path: String,
        /// One-based number of the attempt about to start.
        attempt: u32,
        error: String,
    },
    /// The file reached a terminal status. `cached` files were not sent to the backend.
    FileCompleted {
        path: String,
        status: FileStatus,
        cached: bool,
    },
    /// Files finished so far out of all discovered files.
    TotalProgress { completed: usize, total: usize },
    /// The project summary request was issued.
    SummaryStarted,
    /// The summary step finished.
    SummaryCompleted { status: SummaryStatus },
}

/// Receiver of progress events.
///
/// Shared by every worker of a run, so implementations must be thread-safe.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Forwards events into a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgress {
    /// Create a sink together with the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelProgress {
    fn emit(&self, event: ProgressEvent) {
        // Receiver gone means nobody is listening anymore
        let _ = self.tx.send(event);
    }
}
