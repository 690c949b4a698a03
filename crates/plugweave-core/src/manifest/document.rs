//! Document loading: where manifests live and how raw trees are read.
//!
//! The resolver only talks to the [`DocumentLoader`] trait. [`FsDocumentLoader`]
//! is the bundled implementation; it reads JSON element trees from directories,
//! classpath roots and single-file archives. Archive handles are cached in the
//! [`LoadingContext`] for the duration of one load.
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Deserialize;
use thiserror::Error;

use crate::kernel::constants::META_INF;
use crate::manifest::element::Element;

/// A root documents are resolved against
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Base {
    /// A plugin directory on disk
    Directory(PathBuf),
    /// A single-file plugin archive
    Archive(PathBuf),
    /// A classpath root; optional config files live in its flat `META-INF` namespace
    Classpath(PathBuf),
}

impl Base {
    pub fn root(&self) -> &Path {
        match self {
            Base::Directory(p) | Base::Archive(p) | Base::Classpath(p) => p,
        }
    }
}

/// A document inside a base, addressed by a normalized `/`-separated relative path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentLocation {
    pub base: Base,
    pub path: String,
}

impl DocumentLocation {
    pub fn new(base: Base, path: &str) -> Self {
        Self {
            base,
            path: normalize(path),
        }
    }

    /// Directory part of the path, empty at the base root
    pub fn parent_dir(&self) -> String {
        match self.path.rfind('/') {
            Some(idx) => self.path[..idx].to_string(),
            None => String::new(),
        }
    }

    pub fn file_name(&self) -> &str {
        match self.path.rfind('/') {
            Some(idx) => &self.path[idx + 1..],
            None => &self.path,
        }
    }

    /// Resolves `href` against this document's directory. A leading `/` addresses the base root.
    pub fn resolve(&self, href: &str) -> DocumentLocation {
        let joined = if let Some(absolute) = href.strip_prefix('/') {
            absolute.to_string()
        } else {
            let parent = self.parent_dir();
            if parent.is_empty() { href.to_string() } else { format!("{}/{}", parent, href) }
        };
        DocumentLocation::new(self.base.clone(), &joined)
    }

    /// Locates an optional-dependency config file named by this document.
    ///
    /// Classpath roots share one flat `META-INF` namespace; every other base resolves
    /// the name next to this document.
    pub fn resolve_config_file(&self, file_name: &str) -> DocumentLocation {
        match &self.base {
            Base::Classpath(_) => {
                let name = file_name.rsplit('/').next().unwrap_or(file_name);
                DocumentLocation::new(self.base.clone(), &format!("{}/{}", META_INF, name))
            }
            _ => self.resolve(file_name),
        }
    }
}

impl fmt::Display for DocumentLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.base {
            Base::Archive(p) => write!(f, "{}!/{}", p.display(), self.path),
            Base::Directory(p) | Base::Classpath(p) => write!(f, "{}", p.join(&self.path).display()),
        }
    }
}

/// Collapses `.`/`..` segments and duplicate separators
fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// Failure to produce a manifest tree
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Document not found: {location}")]
    NotFound { location: String },

    #[error("Failed to parse '{location}': {message}")]
    Parse { location: String, message: String },

    #[error("I/O error reading '{location}': {source}")]
    Io {
        location: String,
        #[source]
        source: io::Error,
    },
}

impl DocumentError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DocumentError::NotFound { .. })
    }

    pub fn location(&self) -> &str {
        match self {
            DocumentError::NotFound { location }
            | DocumentError::Parse { location, .. }
            | DocumentError::Io { location, .. } => location,
        }
    }
}

/// The injected capability that turns a location into a raw manifest tree
pub trait DocumentLoader: Send + Sync {
    fn load(&self, context: &LoadingContext, location: &DocumentLocation) -> Result<Element, DocumentError>;
}

/// An opened single-file archive: entry path to manifest tree
#[derive(Debug, Default, Deserialize)]
pub struct Archive {
    #[serde(default)]
    entries: HashMap<String, Element>,
}

impl Archive {
    pub fn entry(&self, path: &str) -> Option<&Element> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resources shared by every parse task of one load.
///
/// Archives are opened lazily on first reference and stay cached until [`close`]
/// is called or the context is dropped, whether or not parsing succeeded.
///
/// [`close`]: LoadingContext::close
#[derive(Debug, Default)]
pub struct LoadingContext {
    archives: Mutex<HashMap<PathBuf, Arc<Archive>>>,
    closed: AtomicBool,
}

impl LoadingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached archive for `path`, opening it with `open` on first use.
    pub fn archive<F>(&self, path: &Path, open: F) -> Result<Arc<Archive>, DocumentError>
    where
        F: FnOnce(&Path) -> Result<Archive, DocumentError>,
    {
        if let Some(archive) = self.lock().get(path) {
            return Ok(Arc::clone(archive));
        }
        let opened = Arc::new(open(path)?);
        let mut archives = self.lock();
        // Another worker may have opened it meanwhile; keep the first one.
        let archive = archives.entry(path.to_path_buf()).or_insert(opened);
        Ok(Arc::clone(archive))
    }

    pub fn open_archive_count(&self) -> usize {
        self.lock().len()
    }

    /// Releases every cached archive handle.
    pub fn close(&self) {
        let released = {
            let mut archives = self.lock();
            let count = archives.len();
            archives.clear();
            count
        };
        self.closed.store(true, Ordering::SeqCst);
        if released > 0 {
            log::debug!("Released {} archive handle(s)", released);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Arc<Archive>>> {
        self.archives.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for LoadingContext {
    fn drop(&mut self) {
        if !self.is_closed() {
            self.close();
        }
    }
}

/// Reads JSON element trees from the file system
#[derive(Debug, Default, Clone, Copy)]
pub struct FsDocumentLoader;

impl FsDocumentLoader {
    pub fn new() -> Self {
        Self
    }

    fn read_file(path: &Path, location: &str) -> Result<String, DocumentError> {
        fs::read_to_string(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => DocumentError::NotFound { location: location.to_string() },
            _ => DocumentError::Io { location: location.to_string(), source: e },
        })
    }

    fn open_archive(path: &Path) -> Result<Archive, DocumentError> {
        let location = path.display().to_string();
        let content = Self::read_file(path, &location)?;
        serde_json::from_str(&content).map_err(|e| DocumentError::Parse {
            location,
            message: format!("invalid archive: {}", e),
        })
    }
}

impl DocumentLoader for FsDocumentLoader {
    fn load(&self, context: &LoadingContext, location: &DocumentLocation) -> Result<Element, DocumentError> {
        let display = location.to_string();
        match &location.base {
            Base::Directory(root) | Base::Classpath(root) => {
                let content = Self::read_file(&root.join(&location.path), &display)?;
                serde_json::from_str(&content).map_err(|e| DocumentError::Parse {
                    location: display,
                    message: e.to_string(),
                })
            }
            Base::Archive(file) => {
                let archive = context.archive(file, Self::open_archive)?;
                archive
                    .entry(&location.path)
                    .cloned()
                    .ok_or(DocumentError::NotFound { location: display })
            }
        }
    }
}
