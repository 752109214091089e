//! Core types and traits for codeask.
//!
//! This crate provides the fundamental data structures shared by the
//! scanning, analysis and provider crates: per-file analysis records, the
//! persisted project state, content hashing, configuration, and the
//! collaborator traits the analysis engine is written against.

mod client;
mod config;
mod error;
mod hash;
mod record;
mod source;
mod state;
pub mod templates;

pub use client::{AiClient, BoxFuture, ChatMessage, Role, clean_response};
pub use config::{AnalyzerConfig, AnalyzerConfigBuilder};
pub use error::{ErrorClass, ProviderError, SourceError};
pub use hash::{ContentHash, ContentHasher};
pub use record::{FileRecord, FileStatus, needs_reanalysis};
pub use source::{FileSource, SourceFile};
pub use state::{ProjectAnalysisState, STATE_FORMAT_VERSION, StateStats, SummaryStatus};
