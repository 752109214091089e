//! Markdown export of analysis results.
//!
//! Reports live next to the state file: `SUMMARY.md` for the project summary
//! and `<relative path>.md` for each analyzed file.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use color_eyre::eyre::{Context, Result};
use tracing::{debug, warn};

use codeask_analyze::ProjectAnalysisState;
use codeask_core::SourceFile;

pub const SUMMARY_FILE_NAME: &str = "SUMMARY.md";

/// What an export pass changed on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub written: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub summary: Option<PathBuf>,
}

/// Writes per-file and summary reports into one directory.
#[derive(Debug, Clone)]
pub struct ReportExporter {
    dir: PathBuf,
}

impl ReportExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Exporter writing next to `state_path`.
    pub fn for_state_file(state_path: &Path) -> Self {
        let dir = state_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        Self::new(dir)
    }

    /// Report location for a root-relative source path.
    ///
    /// Returns `None` for paths that would escape the report directory.
    pub fn report_path(&self, source_path: &str) -> Option<PathBuf> {
        let relative = Path::new(source_path);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(self.dir.join(format!("{source_path}.md")))
    }

    /// Write reports for `state` and delete reports of `pruned` paths.
    pub fn export(&self, state: &ProjectAnalysisState, pruned: &[String]) -> Result<ExportSummary> {
        let mut summary = ExportSummary::default();

        for path in pruned {
            let Some(report) = self.report_path(path) else {
                continue;
            };
            match std::fs::remove_file(&report) {
                Ok(()) => {
                    debug!(path = %report.display(), "removed stale report");
                    summary.removed += 1;
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => warn!(path = %report.display(), error = %err, "failed to remove stale report"),
            }
        }

        for record in state.files.values() {
            if record.analysis_text.trim().is_empty() {
                continue;
            }
            let Some(report) = self.report_path(&record.path) else {
                warn!(path = %record.path, "skipping report outside the output directory");
                continue;
            };
            if write_if_changed(&report, &record.analysis_text)? {
                summary.written += 1;
            } else {
                summary.unchanged += 1;
            }
        }

        if let Some(text) = state.summary_text.as_deref().filter(|t| !t.trim().is_empty()) {
            let path = self.dir.join(SUMMARY_FILE_NAME);
            write_if_changed(&path, text)?;
            summary.summary = Some(path);
        }

        Ok(summary)
    }

    /// Drop files this exporter generated (and the state file) from `files`.
    ///
    /// Only applies when the report directory lies inside `root`.
    pub fn retain_sources(&self, root: &Path, state_path: &Path, files: &mut Vec<SourceFile>) {
        let dir = self.dir.canonicalize().unwrap_or_else(|_| self.dir.clone());
        let Ok(relative) = dir.strip_prefix(root) else {
            return;
        };

        let mut prefix = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if !prefix.is_empty() {
            prefix.push('/');
        }

        let mut generated: HashSet<String> = files
            .iter()
            .map(|f| format!("{prefix}{}.md", f.path))
            .collect();
        generated.insert(format!("{prefix}{SUMMARY_FILE_NAME}"));
        if let Some(name) = state_path.file_name() {
            generated.insert(format!("{prefix}{}", name.to_string_lossy()));
        }

        let before = files.len();
        files.retain(|f| !generated.contains(&f.path));
        if files.len() != before {
            debug!(skipped = before - files.len(), "skipped generated report files");
        }
    }
}

/// Write `text` unless the file already holds it. Returns whether it wrote.
fn write_if_changed(path: &Path, text: &str) -> Result<bool> {
    if std::fs::read(path).is_ok_and(|existing| existing == text.as_bytes()) {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(true)
}
