//! Host services reachable from script bindings.
//!
//! Following the same shape as the op-state services of a deno_core runtime,
//! the collaborators live behind `Arc<dyn Trait>` and are attached to each
//! isolate, so bindings call them directly on the script's thread.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::error::{HostCallError, LoadError};

/// Source of script bytes for the `load()` binding.
pub trait ResourceLoader: Send + Sync + 'static {
    /// Read the resource at `path`.
    fn load(&self, path: &str) -> Result<Vec<u8>, LoadError>;

    /// Shortened form of `path` used as the script name in stack traces.
    fn short_path(&self, path: &str) -> String {
        path.to_string()
    }
}

/// Named host operations for the `call_host()` binding.
pub trait HostDispatcher: Send + Sync + 'static {
    /// Run the call `name` with `input`. `Ok(None)` means "no output".
    fn dispatch(&self, name: &str, input: &[u8]) -> Result<Option<Vec<u8>>, HostCallError>;
}

/// Services attached to every engine instance.
#[derive(Clone)]
pub struct HostServices {
    pub loader: Arc<dyn ResourceLoader>,
    pub dispatcher: Arc<dyn HostDispatcher>,
}

impl HostServices {
    pub fn new(loader: Arc<dyn ResourceLoader>, dispatcher: Arc<dyn HostDispatcher>) -> Self {
        Self { loader, dispatcher }
    }
}

impl Default for HostServices {
    /// No resources and no host calls.
    fn default() -> Self {
        Self {
            loader: Arc::new(NoResources),
            dispatcher: Arc::new(NoHostCalls),
        }
    }
}

struct NoResources;

impl ResourceLoader for NoResources {
    fn load(&self, path: &str) -> Result<Vec<u8>, LoadError> {
        Err(LoadError::NotFound(path.to_string()))
    }
}

struct NoHostCalls;

impl HostDispatcher for NoHostCalls {
    fn dispatch(&self, name: &str, _input: &[u8]) -> Result<Option<Vec<u8>>, HostCallError> {
        Err(HostCallError::UnknownCall(name.to_string()))
    }
}

/// Loads scripts from a directory tree.
///
/// Relative paths resolve against the root; paths escaping the root are
/// reported as not found. Short paths are root-relative.
#[derive(Debug, Clone)]
pub struct FsLoader {
    root: PathBuf,
}

impl FsLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let relative = path.strip_prefix("file://").unwrap_or(path);
        let relative = Path::new(relative);
        let relative = relative.strip_prefix(&self.root).unwrap_or(relative);
        let mut resolved = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                Component::RootDir | Component::Prefix(_) | Component::ParentDir => return None,
            }
        }
        Some(resolved)
    }
}

impl ResourceLoader for FsLoader {
    fn load(&self, path: &str) -> Result<Vec<u8>, LoadError> {
        let resolved = self
            .resolve(path)
            .ok_or_else(|| LoadError::NotFound(path.to_string()))?;
        tracing::debug!("[fs_loader] Loading {}", resolved.display());
        std::fs::read(&resolved).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => LoadError::NotFound(path.to_string()),
            _ => LoadError::Io {
                path: path.to_string(),
                source: e,
            },
        })
    }

    fn short_path(&self, path: &str) -> String {
        match self.resolve(path) {
            Some(resolved) => resolved
                .strip_prefix(&self.root)
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .unwrap_or_else(|_| path.to_string()),
            None => path.to_string(),
        }
    }
}
