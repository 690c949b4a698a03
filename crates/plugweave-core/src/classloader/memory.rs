use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::classloader::{ClassLoader, ClassLoaderFactory, ClassLoaderHandle, ClassLoaderSpec, ClassVisibility};

/// A loader over an in-memory class index
#[derive(Debug)]
pub struct MemoryClassLoader {
    name: String,
    class_path: Vec<PathBuf>,
    visibility: ClassVisibility,
    classes: HashSet<String>,
    parents: RwLock<Vec<ClassLoaderHandle>>,
}

impl MemoryClassLoader {
    pub fn class_path(&self) -> &[PathBuf] {
        &self.class_path
    }

    /// Whether this loader defines `class_name` itself, without consulting parents
    pub fn defines(&self, class_name: &str) -> bool {
        self.classes.contains(class_name)
    }

    fn add_parent(&self, parent: ClassLoaderHandle) {
        self.parents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(parent);
    }
}

impl ClassLoader for MemoryClassLoader {
    fn name(&self) -> &str {
        &self.name
    }

    fn parents(&self) -> Vec<ClassLoaderHandle> {
        self.parents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn visibility(&self) -> ClassVisibility {
        self.visibility.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Classloader factory whose class universe is an index of class path entry to class names.
#[derive(Debug, Default)]
pub struct InMemoryClassLoaderFactory {
    index: RwLock<HashMap<PathBuf, Vec<String>>>,
    built: AtomicUsize,
}

impl InMemoryClassLoaderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_classes<I, S>(self, entry: impl Into<PathBuf>, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_classes(entry, classes);
        self
    }

    /// Registers classes under a class path entry. Loaders built earlier are not affected.
    pub fn add_classes<I, S>(&self, entry: impl Into<PathBuf>, classes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut index = self.index.write().unwrap_or_else(PoisonError::into_inner);
        index
            .entry(entry.into())
            .or_default()
            .extend(classes.into_iter().map(Into::into));
    }

    /// Number of loaders built so far
    pub fn built_count(&self) -> usize {
        self.built.load(Ordering::SeqCst)
    }

    pub fn defines(&self, loader: &ClassLoaderHandle, class_name: &str) -> bool {
        Self::downcast(loader).is_some_and(|l| l.defines(class_name))
    }

    fn downcast(loader: &ClassLoaderHandle) -> Option<&MemoryClassLoader> {
        loader.as_any().downcast_ref::<MemoryClassLoader>()
    }

    fn classes_on(&self, class_path: &[PathBuf], visibility: &ClassVisibility) -> HashSet<String> {
        let index = self.index.read().unwrap_or_else(PoisonError::into_inner);
        class_path
            .iter()
            .filter_map(|entry| index.get(Path::new(entry)))
            .flatten()
            .filter(|name| visibility.accepts(name))
            .cloned()
            .collect()
    }
}

impl ClassLoaderFactory for InMemoryClassLoaderFactory {
    fn build(&self, spec: ClassLoaderSpec) -> ClassLoaderHandle {
        let classes = self.classes_on(&spec.class_path, &spec.visibility);
        self.built.fetch_add(1, Ordering::SeqCst);
        log::debug!(
            "Built classloader '{}' ({} classes, {} parents)",
            spec.name,
            classes.len(),
            spec.parents.len()
        );
        Arc::new(MemoryClassLoader {
            name: spec.name,
            class_path: spec.class_path,
            visibility: spec.visibility,
            classes,
            parents: RwLock::new(spec.parents),
        })
    }

    fn attach_parent(&self, loader: &ClassLoaderHandle, parent: ClassLoaderHandle) {
        match Self::downcast(loader) {
            Some(memory) => memory.add_parent(parent),
            None => log::warn!("Cannot attach a parent to foreign classloader '{}'", loader.name()),
        }
    }

    fn has_class(&self, loader: &ClassLoaderHandle, class_name: &str) -> bool {
        let mut seen: HashSet<*const ()> = HashSet::new();
        let mut pending = vec![Arc::clone(loader)];
        while let Some(current) = pending.pop() {
            if !seen.insert(Arc::as_ptr(&current) as *const ()) {
                continue;
            }
            if Self::downcast(&current).is_some_and(|l| l.defines(class_name)) {
                return true;
            }
            let mut parents = current.parents();
            parents.reverse();
            pending.extend(parents);
        }
        false
    }
}
