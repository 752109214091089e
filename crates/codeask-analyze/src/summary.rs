//! Project-level summary generation.

use std::sync::Arc;

use tracing::{debug, info, warn};

use codeask_core::{AiClient, AnalyzerConfig, ChatMessage, FileRecord, ProviderError, templates};

use crate::orchestrator::complete_cleaned;
use crate::retry::RetryingJobRunner;

/// The combined input of a summary request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryDocument {
    /// Concatenated file sections, ordered by path.
    pub text: String,
    /// Paths whose analysis made it into `text`.
    pub included: Vec<String>,
    /// Paths dropped to stay within the budget.
    pub omitted: Vec<String>,
    /// Path of the one section cut short, if any.
    pub truncated: Option<String>,
}

/// Concatenate analyses into one document of at most `max_chars` characters
/// of file sections.
///
/// When over budget, whole sections are dropped starting with the oldest
/// analysis (ties broken by path). A single remaining section that is still
/// too large is cut at a character boundary. Omitted paths are listed in a
/// note at the end of the document.
pub fn build_summary_document(records: &[&FileRecord], max_chars: usize) -> SummaryDocument {
    let mut records: Vec<&FileRecord> = records.to_vec();
    records.sort_by(|a, b| a.path.cmp(&b.path));

    let sizes: Vec<usize> = records
        .iter()
        .map(|r| templates::summary_section(&r.path, &r.analysis_text).chars().count())
        .collect();
    let mut total: usize = sizes.iter().sum();

    let mut drop_order: Vec<usize> = (0..records.len()).collect();
    drop_order.sort_by(|&a, &b| {
        (records[a].analyzed_at, &records[a].path).cmp(&(records[b].analyzed_at, &records[b].path))
    });

    let mut kept = vec![true; records.len()];
    let mut remaining = records.len();
    for index in drop_order {
        if total <= max_chars || remaining <= 1 {
            break;
        }
        kept[index] = false;
        total -= sizes[index];
        remaining -= 1;
    }

    let mut document = SummaryDocument {
        text: String::with_capacity(total.min(max_chars)),
        included: Vec::with_capacity(remaining),
        omitted: Vec::new(),
        truncated: None,
    };

    for (record, keep) in records.iter().zip(&kept) {
        if !keep {
            document.omitted.push(record.path.clone());
            continue;
        }

        if total > max_chars {
            let overhead = templates::summary_section(&record.path, "").chars().count();
            let allowed = max_chars.saturating_sub(overhead);
            let analysis = truncate_chars(&record.analysis_text, allowed);
            document.text.push_str(&templates::summary_section(&record.path, analysis));
            document.truncated = Some(record.path.clone());
        } else {
            document
                .text
                .push_str(&templates::summary_section(&record.path, &record.analysis_text));
        }
        document.included.push(record.path.clone());
    }

    if !document.omitted.is_empty() {
        document.text.push_str(&format!(
            "> Note: the analyses of {} file(s) were omitted to fit the input limit: {}\n",
            document.omitted.len(),
            document.omitted.join(", ")
        ));
    }

    document
}

/// Longest prefix of `s` with at most `max` characters.
fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((index, _)) => &s[..index],
        None => s,
    }
}

/// Produces the project summary from successful per-file analyses.
#[derive(Clone)]
pub struct SummaryAggregator {
    client: Arc<dyn AiClient>,
    runner: RetryingJobRunner,
    prompt: String,
    max_chars: usize,
}

impl SummaryAggregator {
    /// Create an aggregator using the summary settings of `config`.
    pub fn new(client: Arc<dyn AiClient>, runner: RetryingJobRunner, config: &AnalyzerConfig) -> Self {
        Self {
            client,
            runner,
            prompt: config.summary_prompt.clone(),
            max_chars: config.summary_max_chars,
        }
    }

    /// Issue one summary request, retried like any other job.
    pub async fn summarize(&self, records: &[&FileRecord]) -> Result<String, ProviderError> {
        if records.is_empty() {
            return Err(ProviderError::InvalidRequest {
                message: "no successful analyses to summarize".to_string(),
            });
        }

        let document = build_summary_document(records, self.max_chars);
        if !document.omitted.is_empty() || document.truncated.is_some() {
            warn!(
                omitted = document.omitted.len(),
                truncated = document.truncated.as_deref().unwrap_or(""),
                "summary input exceeds the character budget"
            );
        }
        debug!(
            files = document.included.len(),
            chars = document.text.chars().count(),
            "requesting project summary"
        );

        let messages = [
            ChatMessage::system(&self.prompt),
            ChatMessage::user(templates::summary_request(&document.text)),
        ];
        let client = self.client.as_ref();
        let outcome = self
            .runner
            .execute(
                |_| complete_cleaned(client, &messages),
                |attempt, error| debug!(attempt, error = %error, "retrying summary"),
            )
            .await;

        if outcome.result.is_ok() {
            info!(attempts = outcome.attempts, "project summary generated");
        }
        outcome.result
    }
}

impl std::fmt::Debug for SummaryAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummaryAggregator")
            .field("client", &self.client.name())
            .field("max_chars", &self.max_chars)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use codeask_core::ContentHasher;

    fn record(path: &str, text: &str, minute: u32) -> FileRecord {
        let mut record = FileRecord::new(path);
        record.record_success(
            ContentHasher::hash(path.as_bytes()),
            text,
            1,
            Utc.with_ymd_and_hms(2026, 1, 1, 0, minute, 0).unwrap(),
        );
        record
    }

    fn section_len(path: &str, text: &str) -> usize {
        templates::summary_section(path, text).chars().count()
    }

    #[test]
    fn test_within_budget_keeps_everything_in_path_order() {
        let b = record("b.py", "analysis b", 1);
        let a = record("a.py", "analysis a", 2);
        let doc = build_summary_document(&[&b, &a], 10_000);

        assert_eq!(doc.included, vec!["a.py", "b.py"]);
        assert!(doc.omitted.is_empty());
        assert!(doc.truncated.is_none());
        assert!(doc.text.find("a.py").unwrap() < doc.text.find("b.py").unwrap());
        assert!(doc.text.starts_with("## File: a.py"));
    }

    #[test]
    fn test_oldest_sections_are_dropped_first() {
        let old = record("old.py", &"o".repeat(100), 0);
        let mid = record("mid.py", &"m".repeat(100), 5);
        let new = record("new.py", &"n".repeat(100), 9);

        let budget = section_len("new.py", &"n".repeat(100)) + section_len("mid.py", &"m".repeat(100));
        let doc = build_summary_document(&[&old, &mid, &new], budget);

        assert_eq!(doc.included, vec!["mid.py", "new.py"]);
        assert_eq!(doc.omitted, vec!["old.py"]);
        assert!(doc.text.contains("omitted"));
        assert!(doc.text.contains("old.py"));
        assert!(!doc.text.contains(&"o".repeat(100)));
    }

    #[test]
    fn test_single_oversized_section_is_cut_on_char_boundary() {
        let big = record("big.py", &"é".repeat(500), 0);
        let doc = build_summary_document(&[&big], 120);

        assert_eq!(doc.included, vec!["big.py"]);
        assert_eq!(doc.truncated.as_deref(), Some("big.py"));
        assert!(doc.text.chars().count() <= 120);
        assert!(doc.text.contains('é'));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
        assert_eq!(truncate_chars("hi", 0), "");
    }
}
