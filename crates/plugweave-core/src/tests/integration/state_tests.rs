#![cfg(test)]

//! Disabled and broken plugin state files driving a load.
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tempfile::tempdir;

use crate::classloader::InMemoryClassLoaderFactory;
use crate::kernel::constants::{BROKEN_PLUGINS_FILENAME, DISABLED_PLUGINS_FILENAME};
use crate::plugin_system::manager::PluginManager;
use crate::storage::disabled::{read_disabled_ids, PluginStateCache};
use crate::tests::integration::common::{manager_for, plugin_manifest, settings_for, write_plugin_dir};

#[tokio::test]
async fn test_disabled_file_survives_managers() {
    let temp = tempdir().unwrap();
    let settings = settings_for(temp.path());
    write_plugin_dir(&settings.plugins_dir, "a", &plugin_manifest("a", "1.0", &[]));
    write_plugin_dir(&settings.plugins_dir, "b", &plugin_manifest("b", "1.0", &["a"]));

    let first = manager_for(settings.clone(), Arc::new(InMemoryClassLoaderFactory::new()));
    first.disable_plugin("a").await.unwrap();
    let path = settings.config_dir.join(DISABLED_PLUGINS_FILENAME);
    assert_eq!(fs::read_to_string(&path).unwrap(), "a\n");

    let second = manager_for(settings.clone(), Arc::new(InMemoryClassLoaderFactory::new()));
    let report = second.load().await.unwrap();
    assert!(report.enabled.is_empty());
    assert_eq!(
        report.disabled,
        vec![
            ("a".to_string(), "disabled by the user".to_string()),
            ("b".to_string(), "required plugin 'a' is disabled".to_string()),
        ]
    );
    assert_eq!(report.error_messages().len(), 1);

    second.enable_plugin("a").await.unwrap();
    assert!(read_disabled_ids(&path).unwrap().is_empty());
    assert!(second.is_plugin_enabled("a").await.unwrap());

    let third = manager_for(settings, Arc::new(InMemoryClassLoaderFactory::new()));
    assert_eq!(third.load().await.unwrap().enabled, vec!["a", "b"]);
}

#[tokio::test]
async fn test_hand_edited_disabled_file() {
    let temp = tempdir().unwrap();
    let settings = settings_for(temp.path());
    write_plugin_dir(&settings.plugins_dir, "a", &plugin_manifest("a", "1.0", &[]));
    write_plugin_dir(&settings.plugins_dir, "b", &plugin_manifest("b", "1.0", &[]));
    fs::create_dir_all(&settings.config_dir).unwrap();
    fs::write(settings.config_dir.join(DISABLED_PLUGINS_FILENAME), "\n  b  \n\nnot-installed\n").unwrap();

    let manager = manager_for(settings, Arc::new(InMemoryClassLoaderFactory::new()));
    let report = manager.load().await.unwrap();

    assert_eq!(report.enabled, vec!["a"]);
    assert_eq!(report.disabled, vec![("b".to_string(), "disabled by the user".to_string())]);
    assert!(report.errors.is_empty());
}

#[tokio::test]
async fn test_broken_versions_are_rejected() {
    let temp = tempdir().unwrap();
    let settings = settings_for(temp.path());
    write_plugin_dir(&settings.plugins_dir, "flaky", &plugin_manifest("flaky", "1.2", &[]));
    write_plugin_dir(&settings.plugins_dir, "steady", &plugin_manifest("steady", "1.2", &[]));
    write_plugin_dir(&settings.plugins_dir, "client", &plugin_manifest("client", "1.0", &["flaky"]));
    fs::create_dir_all(&settings.config_dir).unwrap();
    fs::write(
        settings.config_dir.join(BROKEN_PLUGINS_FILENAME),
        "# known bad\nflaky 1.0 1.1\nflaky 1.2\nsteady 0.9\n",
    )
    .unwrap();

    let manager = manager_for(settings, Arc::new(InMemoryClassLoaderFactory::new()));
    let report = manager.load().await.unwrap();

    assert_eq!(report.enabled, vec!["steady"]);
    let messages = report.error_messages();
    assert!(messages
        .iter()
        .any(|m| m.starts_with("[error] flaky:") && m.contains("version 1.2 is marked as broken")));
    assert!(messages.iter().any(|m| m.contains("client") && m.contains("'flaky' is incompatible")));
    assert!(report
        .disabled
        .contains(&("flaky".to_string(), "marked as broken".to_string())));
}

#[test]
fn test_state_cache_invalidation_hooks() {
    let temp = tempdir().unwrap();
    let cache = PluginStateCache::new(temp.path());
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    cache.on_invalidate(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    assert!(cache.disabled_ids().unwrap().is_empty());
    assert!(cache.disable(["x", "y"]).unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!cache.disable(["x"]).unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Edits behind the cache's back stay invisible until invalidated.
    fs::write(cache.disabled_path(), "z\n").unwrap();
    assert!(cache.is_disabled("x").unwrap());
    cache.invalidate();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(!cache.is_disabled("x").unwrap());
    assert!(cache.is_disabled("z").unwrap());

    fs::write(cache.broken_path(), "z 2.0\n").unwrap();
    assert!(cache.is_broken_version("z", "2.0").unwrap());
    assert!(!cache.is_broken_version("z", "2.1").unwrap());
}
