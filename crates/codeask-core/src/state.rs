//! Persisted project-level analysis state.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hash::ContentHash;
use crate::record::{FileRecord, FileStatus};

/// Current on-disk format version.
pub const STATE_FORMAT_VERSION: u32 = 1;

/// Outcome of the most recent summary generation.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SummaryStatus {
    /// No summary reflects the current analyses yet.
    #[default]
    NotGenerated,
    /// The summary reflects the current per-file analyses.
    Succeeded,
    /// The last attempt failed; `summary_text` may be stale.
    Failed,
    /// No file succeeded, so no summary was requested.
    Skipped,
}

/// Counts of records by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateStats {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub pending: usize,
}

/// Everything codeask remembers about one analyzed root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectAnalysisState {
    /// Format version of this record.
    #[serde(default = "default_version")]
    pub version: u32,

    /// Records keyed by relative path.
    #[serde(default)]
    pub files: BTreeMap<String, FileRecord>,

    /// Project-level summary text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_text: Option<String>,

    /// When `summary_text` was produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_generated_at: Option<DateTime<Utc>>,

    /// Outcome of the most recent summary attempt.
    #[serde(default)]
    pub summary_status: SummaryStatus,

    /// Error from the most recent failed summary attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_error: Option<String>,

    /// Digest of the prompt templates used by the last run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_fingerprint: Option<ContentHash>,

    /// Last time this state was mutated by a run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_version() -> u32 {
    STATE_FORMAT_VERSION
}

impl Default for ProjectAnalysisState {
    fn default() -> Self {
        Self {
            version: STATE_FORMAT_VERSION,
            files: BTreeMap::new(),
            summary_text: None,
            summary_generated_at: None,
            summary_status: SummaryStatus::NotGenerated,
            summary_error: None,
            prompt_fingerprint: None,
            updated_at: None,
        }
    }
}

impl ProjectAnalysisState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a record by path.
    pub fn get(&self, path: &str) -> Option<&FileRecord> {
        self.files.get(path)
    }

    /// Get the record for `path`, creating a pending one if absent.
    pub fn entry(&mut self, path: &str) -> &mut FileRecord {
        self.files
            .entry(path.to_string())
            .or_insert_with(|| FileRecord::new(path))
    }

    /// Remove records whose path is not in `current_paths`.
    ///
    /// Returns the removed paths in sorted order.
    pub fn prune(&mut self, current_paths: &HashSet<String>) -> Vec<String> {
        let removed: Vec<String> = self
            .files
            .keys()
            .filter(|path| !current_paths.contains(*path))
            .cloned()
            .collect();

        for path in &removed {
            self.files.remove(path);
        }
        removed
    }

    /// Records that currently hold a successful analysis, ordered by path.
    pub fn succeeded_records(&self) -> impl Iterator<Item = &FileRecord> {
        self.files.values().filter(|r| r.is_succeeded())
    }

    /// Records whose last run failed, ordered by path.
    pub fn failed_records(&self) -> impl Iterator<Item = &FileRecord> {
        self.files.values().filter(|r| r.status == FileStatus::Failed)
    }

    /// Check if a usable summary exists.
    pub fn has_summary(&self) -> bool {
        self.summary_text.as_ref().is_some_and(|s| !s.is_empty())
    }

    /// Record a freshly generated summary.
    pub fn set_summary(&mut self, text: impl Into<String>, generated_at: DateTime<Utc>) {
        self.summary_text = Some(text.into());
        self.summary_generated_at = Some(generated_at);
        self.summary_status = SummaryStatus::Succeeded;
        self.summary_error = None;
    }

    /// Record a failed summary attempt, keeping any previous summary text.
    pub fn set_summary_failed(&mut self, error: impl Into<String>) {
        self.summary_status = SummaryStatus::Failed;
        self.summary_error = Some(error.into());
    }

    /// Flag the summary as out of date with the per-file analyses.
    ///
    /// The text is kept so a later failed attempt can still fall back to it.
    pub fn mark_summary_stale(&mut self) {
        if self.summary_status == SummaryStatus::Succeeded {
            self.summary_status = SummaryStatus::NotGenerated;
        }
    }

    /// Record that no summary could be generated because nothing succeeded.
    pub fn clear_summary(&mut self) {
        self.summary_text = None;
        self.summary_generated_at = None;
        self.summary_status = SummaryStatus::Skipped;
        self.summary_error = None;
    }

    /// Count records by status.
    pub fn stats(&self) -> StateStats {
        let mut stats = StateStats {
            total: self.files.len(),
            ..Default::default()
        };
        for record in self.files.values() {
            match record.status {
                FileStatus::Succeeded => stats.succeeded += 1,
                FileStatus::Failed => stats.failed += 1,
                FileStatus::Pending | FileStatus::Analyzing => stats.pending += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::ContentHasher;

    fn state_with(paths: &[&str]) -> ProjectAnalysisState {
        let mut state = ProjectAnalysisState::new();
        for path in paths {
            state.entry(path);
        }
        state
    }

    #[test]
    fn test_prune_removes_missing_paths() {
        let mut state = state_with(&["a", "b", "c"]);
        let current: HashSet<String> = ["a", "c"].iter().map(|s| s.to_string()).collect();

        let removed = state.prune(&current);

        assert_eq!(removed, vec!["b".to_string()]);
        assert_eq!(state.files.keys().collect::<Vec<_>>(), vec!["a", "c"]);
    }

    #[test]
    fn test_stats() {
        let mut state = state_with(&["a", "b", "c"]);
        state
            .entry("a")
            .record_success(ContentHasher::hash(b"a"), "ok", 1, Utc::now());
        state.entry("b").record_failure("nope", 3);

        let stats = state.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(state.succeeded_records().count(), 1);
        assert_eq!(state.failed_records().count(), 1);
    }

    #[test]
    fn test_summary_failure_keeps_previous_text() {
        let mut state = ProjectAnalysisState::new();
        state.set_summary("old summary", Utc::now());
        state.set_summary_failed("rate limited");

        assert!(state.has_summary());
        assert_eq!(state.summary_status, SummaryStatus::Failed);
        assert_eq!(state.summary_error.as_deref(), Some("rate limited"));

        state.set_summary("new summary", Utc::now());
        state.mark_summary_stale();
        assert_eq!(state.summary_status, SummaryStatus::NotGenerated);
        assert_eq!(state.summary_text.as_deref(), Some("new summary"));

        state.clear_summary();
        assert!(!state.has_summary());
        assert_eq!(state.summary_status, SummaryStatus::Skipped);
    }

    #[test]
    fn test_json_layout() {
        let mut state = state_with(&["src/lib.rs"]);
        state
            .entry("src/lib.rs")
            .record_success(ContentHasher::hash(b"x"), "text", 1, Utc::now());

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["files"]["src/lib.rs"]["status"], "succeeded");
        assert_eq!(
            json["files"]["src/lib.rs"]["content_hash"]
                .as_str()
                .map(str::len),
            Some(64)
        );

        let back: ProjectAnalysisState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }
}
