//! archinc - archive-backed module resolution
//!
//! This crate resolves relative module paths (`JSON/PP.pm`) against an
//! ordered list of tarball sources:
//! - Local archives matched by glob, relative to the declaring file
//! - Remote archives fetched over HTTP(S), including `cpan://` shorthands
//! - Base64 archives embedded after a `__DATA__` line in the declaring file
//!
//! Sources are folded into a [`ResolutionIndex`] where the first source to
//! provide a path wins. An [`ArchiveResolver`] then serves lookups from the
//! index, either from memory or by extracting files to disk.

pub mod archive;
pub mod chain;
pub mod config;
pub mod extract;
pub mod hook;
pub mod index;
pub mod source;

pub use archive::{index_archive, version_token, ArchiveError, IndexedArchive, IndexedModule};
pub use chain::{DirResolver, ImportChain};
pub use config::{ConfigError, ExtractMode, ResolverConfig, SourceManifest};
pub use extract::{ExtractError, ExtractionWriter};
pub use hook::{ArchiveResolver, ModuleResolver, Origin, ResolveError, ResolvedModule};
pub use index::{IndexBuilder, IndexEntry, ResolutionIndex};
pub use source::{ArchiveRef, FetchError, SourceError, SourceOpener, SourceSpec};

use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Errors that abort index construction
#[derive(Debug, Error)]
pub enum Error {
    /// The resolver configuration is invalid
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A source could not be opened
    #[error(transparent)]
    Source(#[from] SourceError),

    /// An archive could not be read
    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

/// Build an index from `sources` and register it at the front of `chain`
///
/// Returns the shared index. Nothing is registered when any source fails.
pub fn install<S: AsRef<str>>(
    chain: &mut ImportChain,
    sources: &[S],
    caller: &Path,
    config: &ResolverConfig,
) -> Result<Arc<ResolutionIndex>, Error> {
    let index = Arc::new(ResolutionIndex::build(sources, caller, config)?);
    tracing::debug!(
        modules = index.len(),
        caller = %caller.display(),
        "installing archive resolver"
    );
    chain.register_front(ArchiveResolver::new(Arc::clone(&index), config));
    Ok(index)
}
