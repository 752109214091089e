//! Analysis engine configuration.

use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::hash::{ContentHash, ContentHasher};
use crate::templates;

/// Configuration for an analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct AnalyzerConfig {
    /// Maximum number of AI requests in flight at once.
    #[builder(default = "4")]
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Attempts per job, including the first one.
    #[builder(default = "3")]
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before the first retry; doubles on each further retry.
    #[builder(default = "Duration::from_secs(2)")]
    #[serde(default = "default_base_delay")]
    pub base_delay: Duration,

    /// Ceiling for a single backoff wait.
    #[builder(default = "Duration::from_secs(30)")]
    #[serde(default = "default_max_delay")]
    pub max_delay: Duration,

    /// Timeout for a single AI call.
    #[builder(default = "Duration::from_secs(120)")]
    #[serde(default = "default_request_timeout")]
    pub request_timeout: Duration,

    /// Character budget for the combined summary document.
    #[builder(default = "120_000")]
    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars: usize,

    /// System prompt for per-file analysis.
    #[builder(default = "templates::SINGLE_FILE_PROMPT.to_string()")]
    #[serde(default = "default_single_file_prompt")]
    pub single_file_prompt: String,

    /// System prompt for the project summary.
    #[builder(default = "templates::SUMMARY_PROMPT.to_string()")]
    #[serde(default = "default_summary_prompt")]
    pub summary_prompt: String,
}

fn default_concurrency() -> usize {
    4
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_summary_max_chars() -> usize {
    120_000
}

fn default_single_file_prompt() -> String {
    templates::SINGLE_FILE_PROMPT.to_string()
}

fn default_summary_prompt() -> String {
    templates::SUMMARY_PROMPT.to_string()
}

impl AnalyzerConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }
        if self.max_attempts == Some(0) {
            return Err("Max attempts must be at least 1".to_string());
        }
        if self.summary_max_chars == Some(0) {
            return Err("Summary budget must be at least 1 character".to_string());
        }
        if let (Some(base), Some(max)) = (self.base_delay, self.max_delay) {
            if base > max {
                return Err("Base delay cannot exceed max delay".to_string());
            }
        }
        if self.request_timeout == Some(Duration::ZERO) {
            return Err("Request timeout must be positive".to_string());
        }
        Ok(())
    }
}

impl AnalyzerConfig {
    /// Create a new config builder.
    pub fn builder() -> AnalyzerConfigBuilder {
        AnalyzerConfigBuilder::default()
    }

    /// Worker pool size, never less than one.
    pub fn worker_count(&self) -> usize {
        self.concurrency.max(1)
    }

    /// Digest identifying the prompt templates in use.
    ///
    /// A change invalidates every cached analysis.
    pub fn prompt_fingerprint(&self) -> ContentHash {
        ContentHasher::hash_parts([
            self.single_file_prompt.as_bytes(),
            self.summary_prompt.as_bytes(),
        ])
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            request_timeout: default_request_timeout(),
            summary_max_chars: default_summary_max_chars(),
            single_file_prompt: default_single_file_prompt(),
            summary_prompt: default_summary_prompt(),
        }
    }
}
