//! JWalk-based parallel file discovery.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use globset::GlobSet;
use jwalk::{Parallelism, WalkDir};
use rayon::prelude::*;
use tracing::{debug, warn};

use codeask_core::{FileSource, SourceError, SourceFile};

use crate::options::ScanOptions;
use crate::patterns::build_glob_set;

/// Why a matching file was left out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Larger than `max_file_size`.
    TooLarge { size: u64 },
    /// Could not be read.
    Unreadable { message: String },
}

/// A file that matched the patterns but was not returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    /// Root-relative path.
    pub path: String,
    /// Reason it was skipped.
    pub reason: SkipReason,
}

/// Result of one discovery pass.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// Matched files, sorted by path.
    pub files: Vec<SourceFile>,
    /// Matched files that were skipped.
    pub skipped: Vec<SkippedFile>,
    /// Total bytes of the returned files.
    pub total_bytes: u64,
    /// Time spent walking and reading.
    pub duration: Duration,
}

/// File source selecting files under a root with glob patterns.
#[derive(Debug, Clone)]
pub struct GlobFileSource {
    root: PathBuf,
    options: ScanOptions,
}

/// A matched path waiting to be read.
struct Candidate {
    absolute: PathBuf,
    relative: String,
}

impl GlobFileSource {
    /// Create a new source for `root`.
    pub fn new(root: impl Into<PathBuf>, options: ScanOptions) -> Self {
        Self {
            root: root.into(),
            options,
        }
    }

    /// Root directory being scanned.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Options in use.
    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Walk the root and read every matching file.
    pub fn scan(&self) -> Result<ScanOutcome, SourceError> {
        let start = Instant::now();
        let root = self
            .root
            .canonicalize()
            .map_err(|e| SourceError::io(&self.root, e))?;

        if !root.is_dir() {
            return Err(SourceError::NotADirectory { path: root });
        }

        let include = build_glob_set(&self.options.include_patterns)?;
        if include.is_empty() {
            return Err(SourceError::InvalidConfig {
                message: "At least one include pattern is required".to_string(),
            });
        }
        let exclude = build_glob_set(&self.options.exclude_patterns)?;

        let mut skipped = Vec::new();
        let candidates = self.collect_candidates(&root, &include, &exclude, &mut skipped);

        debug!(root = %root.display(), matched = candidates.len(), "reading matched files");

        let reads: Vec<(String, std::io::Result<Vec<u8>>)> = candidates
            .into_par_iter()
            .map(|c| {
                let bytes = std::fs::read(&c.absolute);
                (c.relative, bytes)
            })
            .collect();

        let mut files = Vec::with_capacity(reads.len());
        for (path, result) in reads {
            match result {
                Ok(bytes) => files.push(SourceFile::new(path, bytes)),
                Err(err) => {
                    warn!(path = %path, error = %err, "skipping unreadable file");
                    skipped.push(SkippedFile {
                        path,
                        reason: SkipReason::Unreadable {
                            message: err.to_string(),
                        },
                    });
                }
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        skipped.sort_by(|a, b| a.path.cmp(&b.path));
        let total_bytes = files.iter().map(|f| f.bytes.len() as u64).sum();

        Ok(ScanOutcome {
            files,
            skipped,
            total_bytes,
            duration: start.elapsed(),
        })
    }

    /// Walk the tree and keep files matching the pattern sets.
    fn collect_candidates(
        &self,
        root: &Path,
        include: &GlobSet,
        exclude: &GlobSet,
        skipped: &mut Vec<SkippedFile>,
    ) -> Vec<Candidate> {
        let parallelism = match self.options.threads {
            0 => Parallelism::RayonDefaultPool {
                busy_timeout: Duration::from_millis(100),
            },
            n => Parallelism::RayonNewPool(n),
        };

        let skip_dirs = self.options.skip_dirs.clone();
        let walker = WalkDir::new(root)
            .parallelism(parallelism)
            .skip_hidden(!self.options.include_hidden)
            .follow_links(self.options.follow_symlinks)
            .process_read_dir(move |_depth, _path, _state, children| {
                children.retain(|entry| match entry {
                    Ok(entry) => {
                        !(entry.file_type().is_dir()
                            && entry
                                .file_name()
                                .to_str()
                                .is_some_and(|name| skip_dirs.iter().any(|d| d == name)))
                    }
                    Err(_) => true,
                });
            });

        let mut candidates = Vec::new();

        for entry_result in walker {
            let entry = match entry_result {
                Ok(e) => e,
                Err(err) => {
                    warn!(error = %err, "walk error");
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let absolute = entry.path();
            let Some(relative) = relative_path(root, &absolute) else {
                continue;
            };

            if !include.is_match(&relative) || exclude.is_match(&relative) {
                continue;
            }

            match entry.metadata() {
                Ok(metadata) if !self.options.within_size_limit(metadata.len()) => {
                    debug!(path = %relative, size = metadata.len(), "skipping large file");
                    skipped.push(SkippedFile {
                        path: relative,
                        reason: SkipReason::TooLarge {
                            size: metadata.len(),
                        },
                    });
                }
                Ok(_) => candidates.push(Candidate { absolute, relative }),
                Err(err) => {
                    warn!(path = %relative, error = %err, "skipping file without metadata");
                    skipped.push(SkippedFile {
                        path: relative,
                        reason: SkipReason::Unreadable {
                            message: err.to_string(),
                        },
                    });
                }
            }
        }

        candidates
    }
}

impl FileSource for GlobFileSource {
    fn discover(&self) -> Result<Vec<SourceFile>, SourceError> {
        self.scan().map(|outcome| outcome.files)
    }
}

/// Root-relative path joined with `/` regardless of platform.
fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
