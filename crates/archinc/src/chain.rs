//! Import chain
//!
//! A minimal host-side module search: registered resolvers are tried in
//! order, then the ordinary search directories. The origin of every module
//! handed out is recorded in a loaded-module table.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::PathBuf;

use crate::hook::{ModuleResolver, Origin, ResolveError, ResolvedModule};

/// Filesystem search over a list of directories
#[derive(Debug, Clone, Default)]
pub struct DirResolver {
    dirs: Vec<PathBuf>,
}

impl DirResolver {
    /// Search `dirs` in order
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }
}

impl ModuleResolver for DirResolver {
    fn resolve(&self, name: &str) -> Result<Option<ResolvedModule>, ResolveError> {
        for dir in &self.dirs {
            let candidate = name
                .split('/')
                .filter(|s| !s.is_empty())
                .fold(dir.clone(), |path, segment| path.join(segment));
            if !candidate.is_file() {
                continue;
            }

            let file = File::open(&candidate).map_err(|source| ResolveError::Io {
                name: name.to_string(),
                source,
            })?;
            return Ok(Some(ResolvedModule {
                name: name.to_string(),
                origin: Origin::File(candidate),
                version: String::new(),
                reader: Box::new(file),
            }));
        }
        Ok(None)
    }
}

/// Ordered resolvers followed by a directory search
#[derive(Default)]
pub struct ImportChain {
    resolvers: Vec<Box<dyn ModuleResolver>>,
    search: DirResolver,
    loaded: BTreeMap<String, Origin>,
}

impl ImportChain {
    /// Chain with no resolvers and the given search directories
    pub fn new(search_dirs: Vec<PathBuf>) -> Self {
        Self {
            resolvers: Vec::new(),
            search: DirResolver::new(search_dirs),
            loaded: BTreeMap::new(),
        }
    }

    /// Append a resolver, tried after those already registered
    pub fn register(&mut self, resolver: impl ModuleResolver + 'static) -> &mut Self {
        self.resolvers.push(Box::new(resolver));
        self
    }

    /// Insert a resolver ahead of every other one
    pub fn register_front(&mut self, resolver: impl ModuleResolver + 'static) -> &mut Self {
        self.resolvers.insert(0, Box::new(resolver));
        self
    }

    /// Resolve `name`, recording its origin on success
    ///
    /// Returns `Ok(None)` when every resolver declines.
    pub fn require(&mut self, name: &str) -> Result<Option<ResolvedModule>, ResolveError> {
        let mut found = None;
        for resolver in &self.resolvers {
            found = resolver.resolve(name)?;
            if found.is_some() {
                break;
            }
        }
        if found.is_none() {
            found = self.search.resolve(name)?;
        }

        match found {
            Some(module) => {
                self.loaded.insert(name.to_string(), module.origin.clone());
                Ok(Some(module))
            }
            None => {
                tracing::debug!(%name, "module not found in import chain");
                Ok(None)
            }
        }
    }

    /// Origins of every module handed out so far
    pub fn loaded(&self) -> &BTreeMap<String, Origin> {
        &self.loaded
    }
}
