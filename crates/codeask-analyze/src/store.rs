//! Durable per-project analysis state.

use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

use codeask_core::{ProjectAnalysisState, STATE_FORMAT_VERSION};

/// Default file name of the state file inside an analyzed root.
pub const STATE_FILE_NAME: &str = ".codeaskdata";

/// Errors that can occur while saving state.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to write state file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StoreError {
    fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }
}

/// Loads and saves a [`ProjectAnalysisState`] as a JSON file.
///
/// Saves go through a temporary file in the same directory followed by a
/// rename, so a crash mid-write leaves the previous state intact.
#[derive(Debug, Clone)]
pub struct AnalysisStore {
    path: PathBuf,
}

impl AnalysisStore {
    /// Create a store backed by the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create a store using the default file name inside `root`.
    pub fn for_root(root: impl AsRef<Path>) -> Self {
        Self::new(root.as_ref().join(STATE_FILE_NAME))
    }

    /// Location of the state file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the state.
    ///
    /// A missing, unreadable or corrupt file yields an empty state, which
    /// simply makes the next run a full one.
    pub fn load(&self) -> ProjectAnalysisState {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no previous state");
                return ProjectAnalysisState::new();
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "cannot read state, starting fresh");
                return ProjectAnalysisState::new();
            }
        };

        match serde_json::from_slice::<ProjectAnalysisState>(&bytes) {
            Ok(state) if state.version > STATE_FORMAT_VERSION => {
                warn!(
                    path = %self.path.display(),
                    version = state.version,
                    "state written by a newer version, starting fresh"
                );
                ProjectAnalysisState::new()
            }
            Ok(state) => {
                debug!(path = %self.path.display(), files = state.files.len(), "loaded state");
                state
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "corrupt state, starting fresh");
                ProjectAnalysisState::new()
            }
        }
    }

    /// Atomically replace the state file with `state`.
    pub fn save(&self, state: &ProjectAnalysisState) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(state)?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(|e| StoreError::write(dir, e))?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StoreError::write(dir, e))?;
        tmp.write_all(&json)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| StoreError::write(tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| StoreError::write(&self.path, e.error))?;

        debug!(path = %self.path.display(), bytes = json.len(), "saved state");
        Ok(())
    }

    /// Drop records for paths no longer discovered. Returns the removed paths.
    pub fn prune(state: &mut ProjectAnalysisState, current_paths: &HashSet<String>) -> Vec<String> {
        let removed = state.prune(current_paths);
        if !removed.is_empty() {
            debug!(count = removed.len(), "pruned records for removed files");
        }
        removed
    }
}
