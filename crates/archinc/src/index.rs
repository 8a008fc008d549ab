//! Resolution index
//!
//! Folds the modules of every source, in the order given, into one flat
//! namespace. The first source to register a relative path keeps it.

use std::collections::btree_map::{self, BTreeMap};
use std::path::Path;

use crate::archive::{index_archive, IndexedArchive};
use crate::config::ResolverConfig;
use crate::source::{SourceOpener, SourceSpec};
use crate::Error;

/// One resolvable module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Archive path or URL joined with the path inside the archive
    pub provenance: String,
    /// Raw module content
    pub content: Vec<u8>,
    /// Version token of the archive the module came from, possibly empty
    pub version: String,
}

/// Immutable relative-path -> module mapping
#[derive(Debug, Clone, Default)]
pub struct ResolutionIndex {
    entries: BTreeMap<String, IndexEntry>,
}

impl ResolutionIndex {
    /// Build an index from source specifications declared in `caller`
    ///
    /// The configuration is validated first. Sources are processed in order
    /// and any failure aborts the whole build.
    pub fn build<S: AsRef<str>>(
        sources: &[S],
        caller: &Path,
        config: &ResolverConfig,
    ) -> Result<Self, Error> {
        config.validate()?;
        let mut builder = IndexBuilder::new(caller, config);
        for spec in sources {
            builder.add_source(&SourceSpec::parse(spec.as_ref()))?;
        }
        Ok(builder.finish())
    }

    /// Look up a module by relative path
    pub fn get(&self, relative_path: &str) -> Option<&IndexEntry> {
        self.entries.get(relative_path)
    }

    /// Whether a relative path is known
    pub fn contains(&self, relative_path: &str) -> bool {
        self.entries.contains_key(relative_path)
    }

    /// Number of indexed modules
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by relative path
    pub fn iter(&self) -> btree_map::Iter<'_, String, IndexEntry> {
        self.entries.iter()
    }

    /// Relative paths, sorted
    pub fn relative_paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Insert unless already present. Returns whether the entry was added.
    fn insert_if_absent(&mut self, relative_path: String, entry: IndexEntry) -> bool {
        match self.entries.entry(relative_path) {
            btree_map::Entry::Vacant(slot) => {
                slot.insert(entry);
                true
            }
            btree_map::Entry::Occupied(existing) => {
                tracing::trace!(
                    relative_path = %existing.key(),
                    kept = %existing.get().provenance,
                    ignored = %entry.provenance,
                    "module already registered"
                );
                false
            }
        }
    }
}

impl<'a> IntoIterator for &'a ResolutionIndex {
    type Item = (&'a String, &'a IndexEntry);
    type IntoIter = btree_map::Iter<'a, String, IndexEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Incremental index construction
///
/// The index only becomes visible through [`IndexBuilder::finish`], so a
/// failed source never exposes a partial index.
pub struct IndexBuilder<'a> {
    opener: SourceOpener<'a>,
    index: ResolutionIndex,
}

impl<'a> IndexBuilder<'a> {
    /// Start an empty index for sources declared in `caller`
    pub fn new(caller: &'a Path, config: &'a ResolverConfig) -> Self {
        Self {
            opener: SourceOpener::new(caller, config),
            index: ResolutionIndex::default(),
        }
    }

    /// Open and index every archive of one source
    pub fn add_source(&mut self, spec: &SourceSpec) -> Result<&mut Self, Error> {
        for archive in self.opener.open(spec)? {
            let indexed = index_archive(archive)?;
            self.add_archive(indexed);
        }
        Ok(self)
    }

    /// Register the modules of an already indexed archive
    pub fn add_archive(&mut self, archive: IndexedArchive) -> &mut Self {
        let IndexedArchive {
            source_path,
            modules,
            version,
            ..
        } = archive;

        let mut added = 0usize;
        for module in modules {
            let entry = IndexEntry {
                provenance: format!("{}/{}", source_path, module.full_path),
                content: module.content,
                version: version.clone(),
            };
            if self.index.insert_if_absent(module.relative_path, entry) {
                added += 1;
            }
        }

        tracing::debug!(
            source = %source_path,
            added,
            total = self.index.len(),
            "registered archive"
        );
        self
    }

    /// Finish building
    pub fn finish(self) -> ResolutionIndex {
        self.index
    }
}
