use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::Result;

use crate::error::AppError;

/// One way of turning a configured path string into directories on disk.
pub trait FileResolver: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    fn resolve(&self, path: &str) -> Vec<PathBuf>;
}

/// Resolves absolute paths as-is and relative paths against a base directory.
#[derive(Debug, Clone)]
pub struct FileSystemResolver {
    base: PathBuf,
}

impl FileSystemResolver {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }
}

impl FileResolver for FileSystemResolver {
    fn name(&self) -> &str {
        "filesystem"
    }

    fn resolve(&self, path: &str) -> Vec<PathBuf> {
        let candidate = Path::new(path);
        let candidate = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.base.join(candidate)
        };
        if candidate.is_dir() {
            vec![candidate]
        } else {
            Vec::new()
        }
    }
}

/// Looks a relative path up under every root of a search path (bundled change sets,
/// shared checkouts), returning each root that contains it.
#[derive(Debug, Clone, Default)]
pub struct SearchPathResolver {
    roots: Vec<PathBuf>,
}

impl SearchPathResolver {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }
}

impl FileResolver for SearchPathResolver {
    fn name(&self) -> &str {
        "search-path"
    }

    fn resolve(&self, path: &str) -> Vec<PathBuf> {
        self.roots
            .iter()
            .map(|root| root.join(path))
            .filter(|candidate| candidate.is_dir())
            .collect()
    }
}

/// Source directory set of an environment: an optional core path plus additional path strings
/// resolved through an ordered resolver list.
///
/// The union is computed on first access and cached until [`SourceDirs::reset`] is called.
#[derive(Debug, Default)]
pub struct SourceDirs {
    core: Option<PathBuf>,
    additional: Vec<String>,
    resolvers: Vec<Arc<dyn FileResolver>>,
    cache: RwLock<Option<Vec<PathBuf>>>,
}

impl SourceDirs {
    pub fn new(
        core: Option<PathBuf>,
        additional: Vec<String>,
        resolvers: Vec<Arc<dyn FileResolver>>,
    ) -> Self {
        Self {
            core,
            additional,
            resolvers,
            cache: RwLock::new(None),
        }
    }

    pub fn core(&self) -> Option<&Path> {
        self.core.as_deref()
    }

    pub fn additional(&self) -> &[String] {
        &self.additional
    }

    pub fn resolve(&self) -> Result<Vec<PathBuf>> {
        if let Ok(guard) = self.cache.read() {
            if let Some(dirs) = guard.as_ref() {
                return Ok(dirs.clone());
            }
        }

        let dirs = self.compute()?;
        if let Ok(mut guard) = self.cache.write() {
            *guard = Some(dirs.clone());
        }
        Ok(dirs)
    }

    pub fn is_resolved(&self) -> bool {
        self.cache
            .read()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    pub fn reset(&self) {
        if let Ok(mut guard) = self.cache.write() {
            *guard = None;
        }
    }

    fn compute(&self) -> Result<Vec<PathBuf>> {
        let mut dirs: Vec<PathBuf> = Vec::new();
        if let Some(core) = &self.core {
            dirs.push(core.clone());
        }

        for path in &self.additional {
            let resolved = self
                .resolvers
                .iter()
                .flat_map(|resolver| resolver.resolve(path))
                .collect::<Vec<_>>();
            if resolved.is_empty() {
                let tried = self
                    .resolvers
                    .iter()
                    .map(|resolver| resolver.name())
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(AppError::config(format!(
                    "Unable to find the given path [{}] via any of the resolvers: {}",
                    path, tried
                ))
                .into());
            }
            for dir in resolved {
                if !dirs.contains(&dir) {
                    dirs.push(dir);
                }
            }
        }

        Ok(dirs)
    }
}
