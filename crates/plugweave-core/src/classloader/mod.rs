//! # Plugweave Classloader Graph
//!
//! Classloaders are opaque handles produced by an injected [`ClassLoaderFactory`].
//! The engine only ever builds them, attaches extra parents, and asks whether a class
//! resolves. [`ClassLoaderConfigurator`] walks an ordered
//! [`PluginSet`](crate::plugin_system::PluginSet) and wires one loader per enabled
//! descriptor (and per isolated content module) so that the loader graph mirrors the
//! dependency graph.
use std::any::Any;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

pub mod configurator;
pub mod memory;
pub mod package_prefix;

pub use configurator::{ClassLoaderConfigurator, IsolationPolicy};
pub use memory::{InMemoryClassLoaderFactory, MemoryClassLoader};
pub use package_prefix::infer_package_prefixes;

/// A classloader as seen by the engine
pub trait ClassLoader: fmt::Debug + Send + Sync {
    /// Diagnostic name, usually the owning descriptor id
    fn name(&self) -> &str;

    /// Current parents, in lookup order
    fn parents(&self) -> Vec<ClassLoaderHandle>;

    fn visibility(&self) -> ClassVisibility;

    fn as_any(&self) -> &dyn Any;
}

pub type ClassLoaderHandle = Arc<dyn ClassLoader>;

/// Identity comparison of two handles
pub fn same_loader(a: &ClassLoaderHandle, b: &ClassLoaderHandle) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Which class names a loader may define itself.
///
/// An entry ending in `.` matches by prefix. Any other entry matches the exact name,
/// or names nested under it as a package (`a.b` matches `a.b.C`) or an outer class
/// (`a.b.C` matches `a.b.C$D`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ClassVisibility {
    #[default]
    All,
    Only(Vec<String>),
    AllExcept(Vec<String>),
}

impl ClassVisibility {
    pub fn only<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut entries: Vec<String> = prefixes.into_iter().map(Into::into).collect();
        entries.sort();
        entries.dedup();
        ClassVisibility::Only(entries)
    }

    pub fn accepts(&self, class_name: &str) -> bool {
        match self {
            ClassVisibility::All => true,
            ClassVisibility::Only(entries) => entries.iter().any(|e| entry_matches(e, class_name)),
            ClassVisibility::AllExcept(entries) => !entries.iter().any(|e| entry_matches(e, class_name)),
        }
    }
}

fn entry_matches(entry: &str, class_name: &str) -> bool {
    if entry.is_empty() {
        return false;
    }
    if entry.ends_with('.') {
        return class_name.starts_with(entry);
    }
    match class_name.strip_prefix(entry) {
        Some("") => true,
        Some(rest) => rest.starts_with('.') || rest.starts_with('$'),
        None => false,
    }
}

/// Everything a factory needs to construct one loader
#[derive(Debug, Clone)]
pub struct ClassLoaderSpec {
    pub name: String,
    pub class_path: Vec<PathBuf>,
    pub parents: Vec<ClassLoaderHandle>,
    pub visibility: ClassVisibility,
}

impl ClassLoaderSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            class_path: Vec::new(),
            parents: Vec::new(),
            visibility: ClassVisibility::All,
        }
    }
}

/// The injected classloader construction capability
pub trait ClassLoaderFactory: Send + Sync {
    fn build(&self, spec: ClassLoaderSpec) -> ClassLoaderHandle;

    fn attach_parent(&self, loader: &ClassLoaderHandle, parent: ClassLoaderHandle);

    /// Whether `class_name` resolves through `loader`, its own entries first, then its parents
    fn has_class(&self, loader: &ClassLoaderHandle, class_name: &str) -> bool;
}
