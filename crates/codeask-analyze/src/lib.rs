//! Incremental analysis engine for codeask.
//!
//! This crate turns a set of discovered source files into persisted AI
//! analyses:
//!
//! - **Store** - Load and atomically save the per-project analysis state
//! - **Retry** - Run one AI job with per-call timeouts and exponential backoff
//! - **Orchestrator** - Decide what needs work, fan jobs out to a bounded
//!   worker pool and fold results back into the state
//! - **Summary** - Combine successful analyses into one project-level report
//!
//! # Incremental runs
//!
//! Every file is hashed with BLAKE3. A file is only sent to the AI backend
//! when its hash differs from the stored one or its last analysis did not
//! succeed. Files that disappeared from the project are pruned before any
//! work is scheduled.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use codeask_analyze::{AnalysisOrchestrator, AnalysisStore};
//! use codeask_core::AnalyzerConfig;
//!
//! let store = AnalysisStore::for_root("/path/to/project");
//! let orchestrator = AnalysisOrchestrator::new(client, store, AnalyzerConfig::default());
//! let report = orchestrator.run(files, true).await?;
//!
//! println!("{} analyzed, {} cached", report.analyzed, report.cached);
//! ```

mod clock;
mod error;
mod orchestrator;
mod progress;
mod retry;
mod store;
mod summary;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::AnalysisError;
pub use orchestrator::{AnalysisOrchestrator, RunReport};
pub use progress::{ChannelProgress, NoopProgress, ProgressEvent, ProgressSink};
pub use retry::{JobOutcome, JobState, RetryPolicy, RetryingJobRunner, Sleeper, TokioSleeper};
pub use store::{AnalysisStore, STATE_FILE_NAME, StoreError};
pub use summary::{SummaryAggregator, SummaryDocument, build_summary_document};

// Re-export core types for convenience
pub use codeask_core::{
    AiClient, AnalyzerConfig, FileRecord, FileStatus, ProjectAnalysisState, ProviderError,
    SourceFile, SummaryStatus,
};
