//! Per-file analysis records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hash::ContentHash;

/// Lifecycle status of a file's analysis.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FileStatus {
    /// Discovered, waiting for a worker.
    #[default]
    Pending,
    /// A worker is currently running attempts for this file.
    Analyzing,
    /// The last run produced an analysis for the current content.
    Succeeded,
    /// All attempts failed; any analysis text is stale.
    Failed,
}

/// Analysis state for a single discovered file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Path relative to the analyzed root, forward-slash separated.
    pub path: String,

    /// Digest of the content that produced `analysis_text`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<ContentHash>,

    /// Last analysis produced by the AI backend.
    #[serde(default)]
    pub analysis_text: String,

    /// Current status.
    #[serde(default)]
    pub status: FileStatus,

    /// Attempts consumed in the most recent run that touched this file.
    #[serde(default)]
    pub last_attempt_count: u32,

    /// Message of the last failure, cleared on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    /// When `analysis_text` was produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzed_at: Option<DateTime<Utc>>,
}

impl FileRecord {
    /// Create a pending record for a newly discovered path.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content_hash: None,
            analysis_text: String::new(),
            status: FileStatus::Pending,
            last_attempt_count: 0,
            last_error: None,
            analyzed_at: None,
        }
    }

    /// Check if the record holds a current, successful analysis.
    pub fn is_succeeded(&self) -> bool {
        self.status == FileStatus::Succeeded
    }

    /// Mark the record as being worked on.
    pub fn mark_analyzing(&mut self) {
        self.status = FileStatus::Analyzing;
    }

    /// Store a successful analysis together with the hash of the analyzed content.
    pub fn record_success(
        &mut self,
        content_hash: ContentHash,
        analysis_text: impl Into<String>,
        attempts: u32,
        analyzed_at: DateTime<Utc>,
    ) {
        self.content_hash = Some(content_hash);
        self.analysis_text = analysis_text.into();
        self.status = FileStatus::Succeeded;
        self.last_attempt_count = attempts;
        self.last_error = None;
        self.analyzed_at = Some(analyzed_at);
    }

    /// Record a terminal failure.
    ///
    /// Prior analysis text and its hash are kept as-is.
    pub fn record_failure(&mut self, error: impl Into<String>, attempts: u32) {
        self.status = FileStatus::Failed;
        self.last_attempt_count = attempts;
        self.last_error = Some(error.into());
    }
}

/// Decide whether a file must be sent to the AI backend again.
///
/// True when there is no record, when the stored hash differs from
/// `current`, or when the last analysis did not succeed.
pub fn needs_reanalysis(record: Option<&FileRecord>, current: &ContentHash) -> bool {
    match record {
        None => true,
        Some(record) => {
            record.status != FileStatus::Succeeded || record.content_hash.as_ref() != Some(current)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::ContentHasher;

    fn succeeded(path: &str, content: &[u8]) -> FileRecord {
        let mut record = FileRecord::new(path);
        record.record_success(ContentHasher::hash(content), "analysis", 1, Utc::now());
        record
    }

    #[test]
    fn test_absent_record_needs_analysis() {
        assert!(needs_reanalysis(None, &ContentHasher::hash(b"x")));
    }

    #[test]
    fn test_unchanged_succeeded_record_is_skipped() {
        let record = succeeded("a.rs", b"x");
        assert!(!needs_reanalysis(Some(&record), &ContentHasher::hash(b"x")));
    }

    #[test]
    fn test_changed_content_needs_analysis() {
        let record = succeeded("a.rs", b"x");
        assert!(needs_reanalysis(Some(&record), &ContentHasher::hash(b"y")));
    }

    #[test]
    fn test_non_succeeded_status_needs_analysis() {
        let hash = ContentHasher::hash(b"x");
        for status in [FileStatus::Pending, FileStatus::Analyzing, FileStatus::Failed] {
            let mut record = succeeded("a.rs", b"x");
            record.status = status;
            assert!(needs_reanalysis(Some(&record), &hash), "{status}");
        }
    }

    #[test]
    fn test_failure_keeps_stale_analysis() {
        let mut record = succeeded("a.rs", b"x");
        let hash = record.content_hash;

        record.record_failure("boom", 3);

        assert_eq!(record.status, FileStatus::Failed);
        assert_eq!(record.analysis_text, "analysis");
        assert_eq!(record.content_hash, hash);
        assert_eq!(record.last_error.as_deref(), Some("boom"));
        assert_eq!(record.last_attempt_count, 3);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&FileStatus::Succeeded).unwrap();
        assert_eq!(json, "\"succeeded\"");
        assert_eq!(FileStatus::Analyzing.to_string(), "analyzing");
    }
}
