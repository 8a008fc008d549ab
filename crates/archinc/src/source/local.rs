//! Local glob sources
//!
//! Patterns are resolved relative to the directory of the file that declared
//! them, never the process working directory.

use std::fs::File;
use std::path::{Component, Path, PathBuf};

use super::{archive_name_prefix, decompressing_reader, ArchiveRef, SourceError};

/// Open every archive matching `pattern`, sorted by path
pub fn open(pattern: &str, caller: &Path) -> Result<Vec<ArchiveRef>, SourceError> {
    let resolved = resolve_pattern(pattern, caller);

    let paths = glob::glob(&resolved).map_err(|source| SourceError::Pattern {
        pattern: resolved.clone(),
        source,
    })?;

    let mut matches = Vec::new();
    for path in paths {
        let path = path?;
        if path.is_file() {
            matches.push(path);
        }
    }

    if matches.is_empty() {
        return Err(SourceError::NoMatches(resolved));
    }

    matches.sort_by(|a, b| a.to_string_lossy().cmp(&b.to_string_lossy()));
    tracing::debug!(pattern = %resolved, count = matches.len(), "glob matched archives");

    matches.iter().map(|path| open_file(path)).collect()
}

/// Open one archive file from disk
pub fn open_file(path: &Path) -> Result<ArchiveRef, SourceError> {
    let file = File::open(path).map_err(|e| SourceError::io(path.display(), e))?;
    let reader = decompressing_reader(file).map_err(|e| SourceError::io(path.display(), e))?;

    let display_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(ArchiveRef {
        reader,
        name_prefix: archive_name_prefix(&display_name).to_string(),
        source_path: path.to_string_lossy().into_owned(),
        display_name,
    })
}

/// Turn a user pattern into an absolute glob
///
/// Backslashes become forward slashes; relative patterns are joined to the
/// caller's directory and `.`/`..` are folded lexically. The caller's
/// directory is escaped so only the user's pattern carries glob syntax.
pub fn resolve_pattern(pattern: &str, caller: &Path) -> String {
    let pattern = pattern.replace('\\', "/");
    if pattern.starts_with('/') || Path::new(&pattern).is_absolute() {
        return pattern;
    }

    let mut base = normalize(caller.parent().unwrap_or_else(|| Path::new("")));
    let relative = normalize(Path::new(&pattern));

    // leading `..` of the pattern climb out of the base
    let mut rest = relative.components();
    loop {
        let before = rest.clone();
        match rest.next() {
            Some(Component::ParentDir) => {
                if matches!(base.components().next_back(), Some(Component::Normal(_))) {
                    base.pop();
                } else if !base.has_root() {
                    base.push("..");
                }
            }
            _ => {
                rest = before;
                break;
            }
        }
    }

    let base = glob::Pattern::escape(&base.to_string_lossy().replace('\\', "/"));
    let rest = rest.as_path().to_string_lossy().replace('\\', "/");
    match (base.is_empty(), rest.is_empty()) {
        (true, _) => rest,
        (false, true) => base,
        (false, false) => format!("{}/{}", base.trim_end_matches('/'), rest),
    }
}

/// Fold `.` and `..` components without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut components = Vec::new();

    for component in path.components() {
        match component {
            Component::ParentDir => {
                match components.last() {
                    Some(Component::Normal(_)) => {
                        components.pop();
                    }
                    None | Some(Component::ParentDir) => components.push(component),
                    _ => {}
                }
            }
            Component::CurDir => {}
            _ => components.push(component),
        }
    }

    components.iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_relative_pattern_uses_caller_dir() {
        let resolved = resolve_pattern("../ext/*.tgz", Path::new("/a/b/caller.ext"));
        assert_eq!(resolved, "/a/ext/*.tgz");
    }

    #[test]
    fn test_backslashes_normalized() {
        let resolved = resolve_pattern(r"arclib\*.tgz", Path::new("/srv/app/main.pl"));
        assert_eq!(resolved, "/srv/app/arclib/*.tgz");
    }

    #[test]
    fn test_absolute_pattern_untouched() {
        let resolved = resolve_pattern("/opt/mods/*.tar.gz", Path::new("/a/b/caller.ext"));
        assert_eq!(resolved, "/opt/mods/*.tar.gz");
    }

    #[test]
    fn test_normalize_keeps_leading_parent() {
        assert_eq!(normalize(Path::new("../x/./y")), PathBuf::from("../x/y"));
        assert_eq!(normalize(Path::new("a/../../b")), PathBuf::from("../b"));
        assert_eq!(normalize(Path::new("../../b")), PathBuf::from("../../b"));
        assert_eq!(normalize(Path::new("/../b")), PathBuf::from("/b"));
    }

    #[test]
    fn test_caller_dir_is_escaped() {
        let resolved = resolve_pattern("arclib/*.tar", Path::new("/x/proj[1]/caller.pl"));
        assert_eq!(resolved, "/x/proj[[]1[]]/arclib/*.tar");

        let resolved = resolve_pattern("../*.tar", Path::new("/x/a?b/c*/caller.pl"));
        assert_eq!(resolved, "/x/a[?]b/*.tar");
    }

    #[test]
    fn test_relative_caller_keeps_parents() {
        assert_eq!(resolve_pattern("../*.tgz", Path::new("caller.pl")), "../*.tgz");
        assert_eq!(resolve_pattern("../../*.tgz", Path::new("a/caller.pl")), "../*.tgz");
    }

    #[test]
    fn test_metacharacters_in_caller_dir_still_match() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("proj[1]").join("arclib");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("VMod.tar"), b"").unwrap();

        let caller = temp.path().join("proj[1]").join("caller.pl");
        let archives = open("arclib/*.tar", &caller).unwrap();
        assert_eq!(archives.len(), 1);
        assert_eq!(archives[0].display_name, "VMod.tar");
    }

    #[test]
    fn test_no_matches_is_error() {
        let temp = TempDir::new().unwrap();
        let caller = temp.path().join("caller.pl");
        let result = open("missing/*.tgz", &caller);
        assert!(matches!(result, Err(SourceError::NoMatches(_))));
    }

    #[test]
    fn test_matches_sorted() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("arc");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("b.tar"), b"").unwrap();
        fs::write(dir.join("a.tar"), b"").unwrap();
        fs::create_dir_all(dir.join("c.tar")).unwrap();

        let caller = temp.path().join("caller.pl");
        let archives = open("arc/*.tar", &caller).unwrap();
        let names: Vec<_> = archives.iter().map(|a| a.display_name.as_str()).collect();
        assert_eq!(names, vec!["a.tar", "b.tar"]);
        assert_eq!(archives[0].name_prefix, "a");
    }
}
