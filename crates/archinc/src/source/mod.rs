//! Archive sources
//!
//! Turns one user-supplied source specification into the ordered list of
//! archives it names.
//!
//! ## Supported specifications
//!
//! - `lib/*.tgz`, `/opt/mods/*.tar.gz` - local glob, relative to the caller file
//! - `https://example.com/Foo-1.0.tar.gz` - remote archive
//! - `cpan://JSON-PP-2.97001.tar.gz` - shorthand for a CPAN mirror path
//! - `__DATA__` - base64 blocks embedded in the caller file

pub mod embedded;
pub mod fetch;
pub mod local;
pub mod network;

pub use fetch::{FetchError, UrlFetcher};

use flate2::read::GzDecoder;
use once_cell::sync::Lazy;
use once_cell::unsync::OnceCell;
use regex::Regex;
use std::fmt;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::ResolverConfig;

/// Leading bytes of every gzip member
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Archive file extensions removed to form the name prefix
const ARCHIVE_EXTENSIONS: [&str; 3] = [".tar.gz", ".tgz", ".tar"];

static URL_SPEC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(https?|cpan)://").expect("valid url regex"));

/// Errors that can occur while opening a source
#[derive(Debug, Error)]
pub enum SourceError {
    /// A file could not be read
    #[error("Failed to read {location}: {source}")]
    Io {
        location: String,
        #[source]
        source: io::Error,
    },

    /// The glob pattern itself is malformed
    #[error("Invalid glob pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    /// A glob match could not be inspected
    #[error("Failed to read glob match: {0}")]
    Glob(#[from] glob::GlobError),

    /// The glob pattern matched no archive
    #[error("No archives match '{0}'")]
    NoMatches(String),

    /// Remote fetch failed
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A shorthand URL has no top-level name component
    #[error("Cannot derive top-level module name from '{0}'")]
    InvalidShorthand(String),

    /// The caller file has no embedded data section
    #[error("No __DATA__ section in {}", .0.display())]
    MissingDataSection(PathBuf),

    /// An embedded block is not valid base64
    #[error("Malformed base64 in embedded block {block} of {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        block: usize,
        #[source]
        source: base64::DecodeError,
    },
}

impl SourceError {
    pub(crate) fn io(location: impl fmt::Display, source: io::Error) -> Self {
        SourceError::Io {
            location: location.to_string(),
            source,
        }
    }
}

/// One parsed source specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    /// Filesystem glob pattern
    Glob(String),
    /// Direct or shorthand URL
    Url(String),
    /// Blocks embedded in the caller file
    Embedded,
}

impl SourceSpec {
    /// Classify a user-supplied source string
    pub fn parse(spec: &str) -> Self {
        if spec == embedded::DATA_SENTINEL {
            SourceSpec::Embedded
        } else if URL_SPEC.is_match(spec) {
            SourceSpec::Url(spec.to_string())
        } else {
            SourceSpec::Glob(spec.to_string())
        }
    }
}

impl From<&str> for SourceSpec {
    fn from(spec: &str) -> Self {
        SourceSpec::parse(spec)
    }
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceSpec::Glob(pattern) => f.write_str(pattern),
            SourceSpec::Url(url) => f.write_str(url),
            SourceSpec::Embedded => f.write_str(embedded::DATA_SENTINEL),
        }
    }
}

/// An opened archive waiting to be indexed
pub struct ArchiveRef {
    /// Tar stream, already decompressed when needed
    pub reader: Box<dyn Read>,
    /// Top-level directory name expected inside the archive
    pub name_prefix: String,
    /// File path or URL, used for provenance
    pub source_path: String,
    /// File name the version token is derived from
    pub display_name: String,
}

impl fmt::Debug for ArchiveRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveRef")
            .field("name_prefix", &self.name_prefix)
            .field("source_path", &self.source_path)
            .field("display_name", &self.display_name)
            .finish_non_exhaustive()
    }
}

/// Opens source specifications relative to one caller file
pub struct SourceOpener<'a> {
    caller: &'a Path,
    mirror: &'a str,
    fetcher: OnceCell<UrlFetcher>,
}

impl<'a> SourceOpener<'a> {
    /// Create an opener for sources declared by `caller`
    pub fn new(caller: &'a Path, config: &'a ResolverConfig) -> Self {
        Self {
            caller,
            mirror: config.mirror(),
            fetcher: OnceCell::new(),
        }
    }

    /// Open every archive named by `spec`, in order
    pub fn open(&self, spec: &SourceSpec) -> Result<Vec<ArchiveRef>, SourceError> {
        tracing::debug!(source = %spec, caller = %self.caller.display(), "opening source");
        match spec {
            SourceSpec::Glob(pattern) => local::open(pattern, self.caller),
            SourceSpec::Url(url) => {
                let fetcher = self.fetcher.get_or_try_init(UrlFetcher::new)?;
                network::open(url, self.mirror, fetcher).map(|archive| vec![archive])
            }
            SourceSpec::Embedded => embedded::open(self.caller),
        }
    }
}

/// Wrap a raw archive stream, decompressing it when it starts with the gzip magic
pub(crate) fn decompressing_reader<R: Read + 'static>(inner: R) -> io::Result<Box<dyn Read>> {
    let mut buffered = BufReader::new(inner);
    let is_gzip = buffered.fill_buf()?.starts_with(&GZIP_MAGIC);
    if is_gzip {
        Ok(Box::new(GzDecoder::new(buffered)))
    } else {
        Ok(Box::new(buffered))
    }
}

/// Strip the archive extension from a file name
///
/// `JSON-PP-2.97001.tar.gz` -> `JSON-PP-2.97001`
pub fn archive_name_prefix(file_name: &str) -> &str {
    ARCHIVE_EXTENSIONS
        .iter()
        .find_map(|ext| file_name.strip_suffix(ext))
        .unwrap_or(file_name)
}
