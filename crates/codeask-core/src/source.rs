//! Discovered source files and the trait that produces them.

use std::borrow::Cow;

use crate::error::SourceError;
use crate::hash::{ContentHash, ContentHasher};

/// A discovered file: its root-relative path and raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Path relative to the analyzed root, forward-slash separated.
    pub path: String,
    /// File content.
    pub bytes: Vec<u8>,
}

impl SourceFile {
    /// Create a new source file.
    pub fn new(path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            bytes: bytes.into(),
        }
    }

    /// Digest of the file content.
    pub fn content_hash(&self) -> ContentHash {
        ContentHasher::hash(&self.bytes)
    }

    /// Content decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}

/// Produces the finite set of files to analyze for one run.
///
/// Implementations honor their own inclusion/exclusion filters and must be
/// restartable: calling `discover` again yields a fresh snapshot.
pub trait FileSource {
    fn discover(&self) -> Result<Vec<SourceFile>, SourceError>;
}

impl FileSource for Vec<SourceFile> {
    fn discover(&self) -> Result<Vec<SourceFile>, SourceError> {
        Ok(self.clone())
    }
}
