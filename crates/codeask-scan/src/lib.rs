//! Source file discovery for codeask.
//!
//! This crate walks a project directory in parallel using jwalk, keeps the
//! files selected by include/exclude glob patterns, and reads their bytes so
//! the analysis engine can hash and analyze them.
//!
//! # Example
//!
//! ```rust,no_run
//! use codeask_scan::{FileSource, GlobFileSource, ScanOptions};
//!
//! let options = ScanOptions::builder()
//!     .include_patterns(vec!["*.rs".to_string()])
//!     .build()
//!     .unwrap();
//! let source = GlobFileSource::new("/path/to/project", options);
//! let outcome = source.scan().unwrap();
//!
//! println!("Matched {} files ({} bytes)", outcome.files.len(), outcome.total_bytes);
//! ```
//!
//! # Pattern semantics
//!
//! Patterns are matched against root-relative, forward-slash separated paths.
//! A pattern that does not start with `**/` also matches at any depth, so
//! `*.py` selects every Python file and `lib/*.py` selects `lib/` directories
//! anywhere in the tree.

mod options;
mod patterns;
mod scanner;

pub use options::{ScanOptions, ScanOptionsBuilder};
pub use patterns::{build_glob_set, split_pattern_list};
pub use scanner::{GlobFileSource, ScanOutcome, SkippedFile, SkipReason};

// Re-export core types for convenience
pub use codeask_core::{FileSource, SourceError, SourceFile};
