//! Scan option types.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Options controlling which files a [`GlobFileSource`](crate::GlobFileSource) yields.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ScanOptions {
    /// Glob patterns selecting files to analyze.
    pub include_patterns: Vec<String>,

    /// Glob patterns removing files from the selection.
    #[builder(default)]
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Directory names never descended into.
    #[builder(default = "default_skip_dirs()")]
    #[serde(default = "default_skip_dirs")]
    pub skip_dirs: Vec<String>,

    /// Include hidden files and directories (starting with `.`).
    #[builder(default = "false")]
    #[serde(default)]
    pub include_hidden: bool,

    /// Follow symbolic links.
    #[builder(default = "false")]
    #[serde(default)]
    pub follow_symlinks: bool,

    /// Skip files larger than this many bytes (None = no limit).
    #[builder(default = "Some(default_max_file_size())")]
    #[serde(default = "default_max_file_size_opt")]
    pub max_file_size: Option<u64>,

    /// Number of threads for walking and reading (0 = auto-detect).
    #[builder(default = "0")]
    #[serde(default)]
    pub threads: usize,
}

fn default_skip_dirs() -> Vec<String> {
    [".git", "node_modules", "target", "__pycache__"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_max_file_size() -> u64 {
    1024 * 1024
}

fn default_max_file_size_opt() -> Option<u64> {
    Some(default_max_file_size())
}

impl ScanOptionsBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.include_patterns {
            Some(ref patterns) if patterns.iter().any(|p| !p.trim().is_empty()) => Ok(()),
            Some(_) => Err("At least one include pattern is required".to_string()),
            None => Err("Include patterns are required".to_string()),
        }
    }
}

impl ScanOptions {
    /// Create a new options builder.
    pub fn builder() -> ScanOptionsBuilder {
        ScanOptionsBuilder::default()
    }

    /// Create options selecting `patterns` with defaults for everything else.
    pub fn new(patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            include_patterns: patterns.into_iter().map(Into::into).collect(),
            exclude_patterns: Vec::new(),
            skip_dirs: default_skip_dirs(),
            include_hidden: false,
            follow_symlinks: false,
            max_file_size: default_max_file_size_opt(),
            threads: 0,
        }
    }

    /// Check if a directory name should never be descended into.
    pub fn should_skip_dir(&self, name: &str) -> bool {
        self.skip_dirs.iter().any(|d| d == name)
    }

    /// Check if a file of `size` bytes is within the size limit.
    pub fn within_size_limit(&self, size: u64) -> bool {
        self.max_file_size.is_none_or(|max| size <= max)
    }
}
