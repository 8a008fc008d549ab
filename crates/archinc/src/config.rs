//! Resolver configuration (archinc.toml and environment)
//!
//! Resolution order for each value: environment variable > manifest > default.
//!
//! ```toml
//! [resolver]
//! sources = ["arclib/*.tgz", "cpan://JSON-PP-2.97001.tar.gz"]
//! mirror = "https://www.cpan.org"
//! extract_dir = "extracted"
//! debug = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::source::network::DEFAULT_MIRROR;

/// Mirror base for shorthand URL expansion
pub const ENV_MIRROR: &str = "ARCHINC_MIRROR";
/// Extraction root; setting it turns extraction on
pub const ENV_EXTRACT: &str = "ARCHINC_EXTRACT";
/// Base directory for the default debug extraction root
pub const ENV_HOME: &str = "ARCHINC_HOME";
/// Debug-friendly materialization flag
pub const ENV_DEBUG: &str = "ARCHINC_DEBUG";

/// Directory under the home base used for debug extraction
const DEFAULT_EXTRACT_SUBDIR: &str = ".archinc";

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read manifest file
    #[error("Failed to read manifest file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse manifest: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Source manifest (archinc.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SourceManifest {
    /// Resolver settings
    #[serde(default)]
    pub resolver: ResolverConfig,
}

impl SourceManifest {
    /// Parse a manifest from a file
    ///
    /// A relative `extract_dir` is resolved against the manifest's directory.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut manifest = Self::from_str(&content)?;

        if let (Some(dir), Some(base)) = (manifest.resolver.extract_dir.as_mut(), path.parent()) {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }

        Ok(manifest)
    }

    /// Parse a manifest from a string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let manifest: SourceManifest = toml::from_str(content)?;
        manifest.resolver.validate()?;
        Ok(manifest)
    }
}

/// How resolved modules are handed to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractMode {
    /// Serve content from memory
    Memory,
    /// Write each module under this root and serve the written file
    Directory(PathBuf),
}

/// Resolver settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResolverConfig {
    /// Source specifications, in priority order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,

    /// Mirror base for `cpan://` shorthand URLs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirror: Option<String>,

    /// Explicit extraction root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract_dir: Option<PathBuf>,

    /// Materialize modules on disk so debuggers can set breakpoints
    #[serde(default)]
    pub debug: bool,

    /// Base directory for the default debug extraction root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home: Option<PathBuf>,
}

impl ResolverConfig {
    /// Configuration from environment variables only
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Apply environment overrides on top of `self`
    pub fn with_env(self) -> Self {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn with_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |key: &str| lookup(key).filter(|value| !value.is_empty());

        if let Some(mirror) = lookup(ENV_MIRROR) {
            self.mirror = Some(mirror);
        }
        if let Some(dir) = lookup(ENV_EXTRACT) {
            self.extract_dir = Some(PathBuf::from(dir));
        }
        if let Some(home) = lookup(ENV_HOME) {
            self.home = Some(PathBuf::from(home));
        }
        if let Some(debug) = lookup(ENV_DEBUG) {
            self.debug = matches!(
                debug.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        self
    }

    /// Set the mirror base
    pub fn mirror_url(mut self, mirror: impl Into<String>) -> Self {
        self.mirror = Some(mirror.into());
        self
    }

    /// Set an explicit extraction root
    pub fn extract_to(mut self, dir: impl Into<PathBuf>) -> Self {
        self.extract_dir = Some(dir.into());
        self
    }

    /// Toggle debug-friendly materialization
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Set the base directory for debug extraction
    pub fn home_dir(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    /// Effective mirror base
    pub fn mirror(&self) -> &str {
        self.mirror.as_deref().unwrap_or(DEFAULT_MIRROR)
    }

    /// Effective extraction mode
    ///
    /// An explicit directory always wins. With only `debug` set, modules go to
    /// `<home>/.archinc/extract`.
    pub fn extract_mode(&self) -> ExtractMode {
        if let Some(dir) = &self.extract_dir {
            return ExtractMode::Directory(dir.clone());
        }
        if self.debug {
            let home = self
                .home
                .clone()
                .or_else(dirs::home_dir)
                .unwrap_or_else(|| PathBuf::from("."));
            return ExtractMode::Directory(home.join(DEFAULT_EXTRACT_SUBDIR).join("extract"));
        }
        ExtractMode::Memory
    }

    /// Check values that cannot be caught by deserialization
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(mirror) = &self.mirror {
            if !mirror.starts_with("http://") && !mirror.starts_with("https://") {
                return Err(ConfigError::ValidationError(format!(
                    "mirror must be an http(s) URL, got '{}'",
                    mirror
                )));
            }
        }
        if self.sources.iter().any(|s| s.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "source specifications must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ResolverConfig::default();
        assert_eq!(config.mirror(), "https://www.cpan.org");
        assert_eq!(config.extract_mode(), ExtractMode::Memory);
    }

    #[test]
    fn test_env_overrides() {
        let config = ResolverConfig::default()
            .mirror_url("https://file.example")
            .with_env_from(env(&[
                (ENV_MIRROR, "http://mirror.local"),
                (ENV_EXTRACT, "/tmp/extract"),
            ]));

        assert_eq!(config.mirror(), "http://mirror.local");
        assert_eq!(
            config.extract_mode(),
            ExtractMode::Directory(PathBuf::from("/tmp/extract"))
        );
    }

    #[test]
    fn test_empty_env_values_ignored() {
        let config = ResolverConfig::default().with_env_from(env(&[(ENV_EXTRACT, "")]));
        assert_eq!(config.extract_mode(), ExtractMode::Memory);
    }

    #[test]
    fn test_debug_uses_home() {
        let config = ResolverConfig::default()
            .with_env_from(env(&[(ENV_DEBUG, "1"), (ENV_HOME, "/home/dev")]));
        assert_eq!(
            config.extract_mode(),
            ExtractMode::Directory(PathBuf::from("/home/dev/.archinc/extract"))
        );
    }

    #[test]
    fn test_explicit_dir_beats_debug() {
        let config = ResolverConfig::default()
            .debug(true)
            .home_dir("/home/dev")
            .extract_to("/srv/x");
        assert_eq!(config.extract_mode(), ExtractMode::Directory(PathBuf::from("/srv/x")));
    }

    #[test]
    fn test_parse_manifest() {
        let manifest = SourceManifest::from_str(
            r#"
[resolver]
sources = ["arclib/*.tgz", "__DATA__"]
mirror = "https://mirror.example"
debug = true
"#,
        )
        .unwrap();

        assert_eq!(manifest.resolver.sources, vec!["arclib/*.tgz", "__DATA__"]);
        assert_eq!(manifest.resolver.mirror(), "https://mirror.example");
        assert!(manifest.resolver.debug);
    }

    #[test]
    fn test_manifest_rejects_bad_mirror() {
        let result = SourceManifest::from_str("[resolver]\nmirror = \"ftp://nope\"\n");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_manifest_relative_extract_dir() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("archinc.toml");
        std::fs::write(&path, "[resolver]\nextract_dir = \"out\"\n").unwrap();

        let manifest = SourceManifest::from_file(&path).unwrap();
        assert_eq!(manifest.resolver.extract_dir, Some(temp.path().join("out")));
    }
}
