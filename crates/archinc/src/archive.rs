//! Archive indexing
//!
//! Reads one opened archive end to end and flattens its module files into
//! relative lookup paths.
//!
//! Leading directories are stripped per archive, not per entry: if any module
//! sits under `<name_prefix>/` the prefix is stripped from the whole archive,
//! and likewise for `lib/`. Lookup paths are then rebuilt from those two flags,
//! so an entry at a different depth than its siblings is dropped.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::io::{self, Read};
use thiserror::Error;

use crate::source::ArchiveRef;

/// Suffix of module-bearing entries
pub const MODULE_SUFFIX: &str = ".pm";

/// Library directory stripped from archive layouts
const LIB_DIR: &str = "lib";

static VERSION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)v?\d+\.\d+(?:\.\d+)?").expect("valid version regex"));

/// Errors that can occur while reading an archive
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The tar stream could not be read
    #[error("Failed to read archive {source_path}: {source}")]
    Read {
        source_path: String,
        #[source]
        source: io::Error,
    },
}

/// One module file taken from an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedModule {
    /// Flattened lookup key, e.g. `JSON/PP.pm`
    pub relative_path: String,
    /// Path inside the archive, e.g. `JSON-PP-2.97001/lib/JSON/PP.pm`
    pub full_path: String,
    /// Raw file content
    pub content: Vec<u8>,
}

/// Result of indexing one archive
#[derive(Debug, Clone)]
pub struct IndexedArchive {
    /// Where the archive came from
    pub source_path: String,
    /// Modules in archive order
    pub modules: Vec<IndexedModule>,
    /// The name prefix directory was stripped
    pub strip_prefix: bool,
    /// The `lib` directory was stripped
    pub strip_lib: bool,
    /// Version token derived from the archive name, possibly empty
    pub version: String,
}

/// Index every module entry in `archive`
pub fn index_archive(archive: ArchiveRef) -> Result<IndexedArchive, ArchiveError> {
    let ArchiveRef {
        reader,
        name_prefix,
        source_path,
        display_name,
    } = archive;

    let read_error = |source: io::Error| ArchiveError::Read {
        source_path: source_path.clone(),
        source,
    };

    let mut strip_prefix = false;
    let mut strip_lib = false;
    // interim relative path -> full path, first occurrence wins
    let mut interim: Vec<String> = Vec::new();
    let mut interim_seen: HashMap<String, String> = HashMap::new();
    let mut by_full_path: HashMap<String, Vec<u8>> = HashMap::new();

    let mut tar = tar::Archive::new(reader);
    for entry in tar.entries().map_err(read_error)? {
        let mut entry = entry.map_err(read_error)?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let mut full_path = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        if let Some(stripped) = full_path.strip_prefix("./") {
            full_path = stripped.to_string();
        }
        if !full_path.ends_with(MODULE_SUFFIX) {
            continue;
        }
        if !is_contained(&full_path) {
            tracing::trace!(%full_path, "skipping entry that leaves the archive root");
            continue;
        }

        let split: Vec<&str> = full_path.split('/').collect();
        let mut segments = split.as_slice();
        if !name_prefix.is_empty() && segments.first() == Some(&name_prefix.as_str()) {
            strip_prefix = true;
            segments = &segments[1..];
        }
        if segments.first() == Some(&LIB_DIR) {
            strip_lib = true;
            segments = &segments[1..];
        }
        let relative = segments.join("/");

        let mut content = Vec::new();
        entry.read_to_end(&mut content).map_err(read_error)?;
        tracing::trace!(%full_path, %relative, "module entry");

        if !interim_seen.contains_key(&relative) {
            interim_seen.insert(relative.clone(), full_path.clone());
            interim.push(relative);
        }
        by_full_path.entry(full_path).or_insert(content);
    }

    let mut modules = Vec::with_capacity(interim.len());
    for relative in interim {
        let mut rebuilt = Vec::with_capacity(3);
        if strip_prefix {
            rebuilt.push(name_prefix.as_str());
        }
        if strip_lib {
            rebuilt.push(LIB_DIR);
        }
        rebuilt.push(relative.as_str());
        let full_path = rebuilt.join("/");

        match by_full_path.remove(&full_path) {
            Some(content) => modules.push(IndexedModule {
                relative_path: relative,
                full_path,
                content,
            }),
            None => tracing::trace!(
                %relative,
                original = interim_seen.get(&relative).map(String::as_str).unwrap_or(""),
                "dropping entry outside archive layout"
            ),
        }
    }

    let version = version_token(&display_name);
    tracing::debug!(
        source = %source_path,
        modules = modules.len(),
        strip_prefix,
        strip_lib,
        %version,
        "indexed archive"
    );

    Ok(IndexedArchive {
        source_path,
        modules,
        strip_prefix,
        strip_lib,
        version,
    })
}

/// Whether an archive path stays below the archive root
///
/// Rejects absolute paths, drive prefixes and any `..` segment.
pub fn is_contained(path: &str) -> bool {
    !path.starts_with('/')
        && !path.starts_with('\\')
        && path
            .split(['/', '\\'])
            .all(|segment| segment != ".." && !segment.contains(':'))
}

/// Last version-like substring of `name`, or `""`
///
/// `Foo-Bar-2.97001.tar.gz` -> `2.97001`
pub fn version_token(name: &str) -> String {
    VERSION_PATTERN
        .find_iter(name)
        .last()
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}
