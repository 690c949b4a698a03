//! Persisted plugin state: the disabled-plugins list and the broken-plugins list.
use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use crate::kernel::constants::{BROKEN_PLUGINS_FILENAME, DISABLED_PLUGINS_FILENAME};
use crate::kernel::error::{Error, Result};
use crate::plugin_system::compat::{parse_broken_plugins, BrokenPlugins};

/// Reads a disabled-plugins file: one id per line, trimmed, blank lines ignored.
/// A missing file means nothing is disabled.
pub fn read_disabled_ids(path: &Path) -> Result<BTreeSet<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeSet::new()),
        Err(e) => Err(Error::io(e, "read_disabled_plugins", path.to_path_buf())),
    }
}

/// Writes ids sorted, one per line.
pub fn write_disabled_ids<'a, I>(path: &Path, ids: I) -> Result<()>
where
    I: IntoIterator<Item = &'a String>,
{
    let sorted: BTreeSet<&str> = ids
        .into_iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .collect();
    let mut content = String::new();
    for id in sorted {
        content.push_str(id);
        content.push('\n');
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::io(e, "create_dir_all", parent.to_path_buf()))?;
    }
    fs::write(path, content).map_err(|e| Error::io(e, "write_disabled_plugins", path.to_path_buf()))
}

type InvalidationHook = Box<dyn Fn() + Send + Sync>;

/// Lazily loaded, explicitly invalidated view of the plugin state files in one
/// config directory.
pub struct PluginStateCache {
    config_dir: PathBuf,
    disabled: RwLock<Option<BTreeSet<String>>>,
    broken: RwLock<Option<BrokenPlugins>>,
    hooks: Mutex<Vec<InvalidationHook>>,
}

impl std::fmt::Debug for PluginStateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginStateCache")
            .field("config_dir", &self.config_dir)
            .finish_non_exhaustive()
    }
}

impl PluginStateCache {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            disabled: RwLock::new(None),
            broken: RwLock::new(None),
            hooks: Mutex::new(Vec::new()),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn disabled_path(&self) -> PathBuf {
        self.config_dir.join(DISABLED_PLUGINS_FILENAME)
    }

    pub fn broken_path(&self) -> PathBuf {
        self.config_dir.join(BROKEN_PLUGINS_FILENAME)
    }

    /// Ids listed as disabled, read from disk on first use
    pub fn disabled_ids(&self) -> Result<BTreeSet<String>> {
        if let Some(ids) = self.disabled.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
            return Ok(ids.clone());
        }
        let ids = read_disabled_ids(&self.disabled_path())?;
        *self.disabled.write().unwrap_or_else(PoisonError::into_inner) = Some(ids.clone());
        Ok(ids)
    }

    pub fn is_disabled(&self, id: &str) -> Result<bool> {
        Ok(self.disabled_ids()?.contains(id))
    }

    /// Adds ids to the disabled list and persists it. Returns whether anything changed.
    pub fn disable<I, S>(&self, ids: I) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut current = self.disabled_ids()?;
        let before = current.len();
        current.extend(ids.into_iter().map(|id| id.as_ref().trim().to_string()).filter(|id| !id.is_empty()));
        let changed = current.len() != before;
        if changed {
            self.store_disabled(current)?;
        }
        Ok(changed)
    }

    /// Removes ids from the disabled list and persists it. Returns whether anything changed.
    pub fn enable<I, S>(&self, ids: I) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut current = self.disabled_ids()?;
        let before = current.len();
        for id in ids {
            current.remove(id.as_ref().trim());
        }
        let changed = current.len() != before;
        if changed {
            self.store_disabled(current)?;
        }
        Ok(changed)
    }

    fn store_disabled(&self, ids: BTreeSet<String>) -> Result<()> {
        write_disabled_ids(&self.disabled_path(), ids.iter())?;
        log::info!("Disabled plugins list now holds {} id(s)", ids.len());
        *self.disabled.write().unwrap_or_else(PoisonError::into_inner) = Some(ids);
        self.notify();
        Ok(())
    }

    /// Broken plugin versions, read from disk on first use
    pub fn broken_plugins(&self) -> Result<BrokenPlugins> {
        if let Some(broken) = self.broken.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
            return Ok(broken.clone());
        }
        let path = self.broken_path();
        let broken = match fs::read_to_string(&path) {
            Ok(content) => parse_broken_plugins(&content),
            Err(e) if e.kind() == ErrorKind::NotFound => BrokenPlugins::new(),
            Err(e) => return Err(Error::io(e, "read_broken_plugins", path)),
        };
        *self.broken.write().unwrap_or_else(PoisonError::into_inner) = Some(broken.clone());
        Ok(broken)
    }

    pub fn is_broken_version(&self, id: &str, version: &str) -> Result<bool> {
        Ok(self
            .broken_plugins()?
            .get(id)
            .is_some_and(|versions| versions.contains(version)))
    }

    /// Registers a callback run on every invalidation and every change of the disabled list
    pub fn on_invalidate<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(hook));
    }

    /// Drops everything cached; the next lookup reads the files again.
    pub fn invalidate(&self) {
        *self.disabled.write().unwrap_or_else(PoisonError::into_inner) = None;
        *self.broken.write().unwrap_or_else(PoisonError::into_inner) = None;
        log::debug!("Plugin state cache for {} invalidated", self.config_dir.display());
        self.notify();
    }

    fn notify(&self) {
        for hook in self.hooks.lock().unwrap_or_else(PoisonError::into_inner).iter() {
            hook();
        }
    }
}
