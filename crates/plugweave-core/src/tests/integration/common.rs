#![cfg(test)]

//! On-disk fixtures: plugin directories, archives and settings rooted in a temp dir.
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::classloader::InMemoryClassLoaderFactory;
use crate::kernel::constants::ALL_MODULES_MARKER;
use crate::manifest::document::FsDocumentLoader;
use crate::manifest::element::Element;
use crate::plugin_system::manager::DefaultPluginManager;
use crate::storage::config::LoaderSettings;

/// A `plugin` manifest with an id, a version and required dependencies
pub fn plugin_manifest(id: &str, version: &str, deps: &[&str]) -> Element {
    let mut root = Element::new("plugin")
        .with_child(Element::new("id").with_text(id))
        .with_child(Element::new("version").with_text(version));
    for dep in deps {
        root = root.with_child(Element::new("depends").with_text(dep));
    }
    root
}

/// The core manifest, covering every platform module
pub fn core_manifest() -> Element {
    plugin_manifest("platform.core", "1.0", &[])
        .with_child(Element::new("module").with_attribute("value", ALL_MODULES_MARKER))
}

pub fn optional_depends(id: &str, config_file: &str) -> Element {
    Element::new("depends")
        .with_attribute("optional", "true")
        .with_attribute("config-file", config_file)
        .with_text(id)
}

pub fn write_json(path: &Path, element: &Element) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create fixture dir");
    }
    let content = serde_json::to_string_pretty(element).expect("serialize fixture");
    fs::write(path, content).expect("write fixture");
}

/// Writes `<parent>/<name>/META-INF/plugin.json` and returns the plugin directory.
pub fn write_plugin_dir(parent: &Path, name: &str, manifest: &Element) -> PathBuf {
    let dir = parent.join(name);
    write_json(&dir.join("META-INF").join("plugin.json"), manifest);
    dir
}

/// Writes a single-file archive holding the given entries.
pub fn write_archive(path: &Path, entries: &[(&str, Element)]) {
    let entries: serde_json::Map<String, serde_json::Value> = entries
        .iter()
        .map(|(name, element)| {
            (
                name.to_string(),
                serde_json::to_value(element).expect("serialize entry"),
            )
        })
        .collect();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create archive dir");
    }
    let archive = serde_json::json!({ "entries": entries });
    fs::write(path, archive.to_string()).expect("write archive");
}

/// Settings rooted at `root` that do not insist on platform module dependencies
pub fn settings_for(root: &Path) -> LoaderSettings {
    let mut settings = LoaderSettings::with_root(root);
    settings.require_module_dependency = false;
    settings
}

pub fn manager_for(settings: LoaderSettings, factory: Arc<InMemoryClassLoaderFactory>) -> DefaultPluginManager {
    DefaultPluginManager::new(settings, Arc::new(FsDocumentLoader::new()), factory)
}
