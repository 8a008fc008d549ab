//! Loader hook
//!
//! [`ArchiveResolver`] answers lookups from a built [`ResolutionIndex`]. In
//! memory mode content is served from the index; in extraction mode each hit
//! is written to disk first and served from the written file.

use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{ExtractMode, ResolverConfig};
use crate::extract::{ExtractError, ExtractionWriter};
use crate::index::ResolutionIndex;

/// Errors that can occur while serving a resolved module
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Extraction failed
    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// Opening or reading a module failed
    #[error("Failed to open module {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// Where a resolved module is recorded as coming from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// Synthetic `<archive>/<path inside archive>` string, for display only
    Archive(String),
    /// Real file written by extraction
    Extracted(PathBuf),
    /// Real file found on a search directory
    File(PathBuf),
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Archive(provenance) => f.write_str(provenance),
            Origin::Extracted(path) | Origin::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A module handed back to the host
pub struct ResolvedModule {
    /// Relative path that was requested
    pub name: String,
    /// Recorded origin
    pub origin: Origin,
    /// Version token, possibly empty
    pub version: String,
    /// Content stream positioned at the start
    pub reader: Box<dyn Read>,
}

impl ResolvedModule {
    /// Drain the content stream
    pub fn read_to_vec(mut self) -> Result<Vec<u8>, ResolveError> {
        let mut content = Vec::new();
        self.reader
            .read_to_end(&mut content)
            .map_err(|source| ResolveError::Io {
                name: self.name.clone(),
                source,
            })?;
        Ok(content)
    }
}

impl fmt::Debug for ResolvedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedModule")
            .field("name", &self.name)
            .field("origin", &self.origin)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// A step in the host's module search
///
/// `Ok(None)` declines the lookup so the next resolver is tried.
pub trait ModuleResolver {
    /// Resolve a relative module path
    fn resolve(&self, name: &str) -> Result<Option<ResolvedModule>, ResolveError>;
}

/// Resolver backed by archive sources
#[derive(Debug, Clone)]
pub struct ArchiveResolver {
    index: Arc<ResolutionIndex>,
    writer: Option<ExtractionWriter>,
}

impl ArchiveResolver {
    /// Serve `index` according to the extraction mode in `config`
    pub fn new(index: impl Into<Arc<ResolutionIndex>>, config: &ResolverConfig) -> Self {
        Self::with_mode(index, config.extract_mode())
    }

    /// Serve `index` with an explicit extraction mode
    pub fn with_mode(index: impl Into<Arc<ResolutionIndex>>, mode: ExtractMode) -> Self {
        let writer = match mode {
            ExtractMode::Memory => None,
            ExtractMode::Directory(root) => Some(ExtractionWriter::new(root)),
        };
        Self {
            index: index.into(),
            writer,
        }
    }

    /// The index being served
    pub fn index(&self) -> &ResolutionIndex {
        &self.index
    }

    /// Extraction root, when extraction is on
    pub fn extraction_writer(&self) -> Option<&ExtractionWriter> {
        self.writer.as_ref()
    }
}

impl ModuleResolver for ArchiveResolver {
    fn resolve(&self, name: &str) -> Result<Option<ResolvedModule>, ResolveError> {
        let Some(entry) = self.index.get(name) else {
            return Ok(None);
        };

        let (origin, reader): (Origin, Box<dyn Read>) = match &self.writer {
            Some(writer) => {
                let path = writer.write(name, &entry.version, &entry.content)?;
                let file = File::open(&path).map_err(|source| ResolveError::Io {
                    name: name.to_string(),
                    source,
                })?;
                (Origin::Extracted(path), Box::new(file))
            }
            None => (
                Origin::Archive(entry.provenance.clone()),
                Box::new(Cursor::new(entry.content.clone())),
            ),
        };

        tracing::debug!(%name, %origin, "resolved module from archive");
        Ok(Some(ResolvedModule {
            name: name.to_string(),
            origin,
            version: entry.version.clone(),
            reader,
        }))
    }
}
