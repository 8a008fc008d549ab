//! On-disk materialization of resolved modules
//!
//! Layout: `<root>/[<version>/]<relative_path>`. Files are overwritten on
//! every write and never read back by the index.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while extracting a module
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Directory creation or file write failed
    #[error("Failed to extract to {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The target would land outside the extraction root
    #[error("Refusing to extract {relative_path} outside {}", root.display())]
    OutsideRoot { relative_path: String, root: PathBuf },
}

/// Writes module content under an extraction root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionWriter {
    root: PathBuf,
}

impl ExtractionWriter {
    /// Create a writer rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Extraction root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where `relative_path` lands for `version`
    ///
    /// Every segment must be a plain name; anything that could climb out of
    /// the root is an error.
    pub fn target(&self, relative_path: &str, version: &str) -> Result<PathBuf, ExtractError> {
        let outside = || ExtractError::OutsideRoot {
            relative_path: relative_path.to_string(),
            root: self.root.clone(),
        };

        let mut target = self.root.clone();
        if !version.is_empty() {
            if !is_plain_segment(version) {
                return Err(outside());
            }
            target.push(version);
        }
        for segment in relative_path.split('/').filter(|s| !s.is_empty()) {
            if !is_plain_segment(segment) {
                return Err(outside());
            }
            target.push(segment);
        }
        Ok(target)
    }

    /// Write `content` and return the written path
    pub fn write(
        &self,
        relative_path: &str,
        version: &str,
        content: &[u8],
    ) -> Result<PathBuf, ExtractError> {
        let target = self.target(relative_path, version)?;

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source| ExtractError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        fs::write(&target, content).map_err(|source| ExtractError::Io {
            path: target.clone(),
            source,
        })?;

        tracing::info!(path = %target.display(), bytes = content.len(), "extracted module");
        Ok(target)
    }
}

fn is_plain_segment(segment: &str) -> bool {
    matches!(
        Path::new(segment).components().collect::<Vec<_>>().as_slice(),
        [Component::Normal(_)]
    )
}
