#![cfg(test)]

//! Full loads over plugin directories, archives and path-list entries on disk.
use std::sync::Arc;

use tempfile::tempdir;

use crate::classloader::InMemoryClassLoaderFactory;
use crate::manifest::element::Element;
use crate::plugin_system::manager::PluginManager;
use crate::plugin_system::plugin_set::DisableReason;
use crate::tests::integration::common::{
    core_manifest, manager_for, optional_depends, plugin_manifest, settings_for, write_archive, write_json,
    write_plugin_dir,
};

#[tokio::test]
async fn test_load_from_every_source() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    let mut settings = settings_for(root);

    write_plugin_dir(&settings.bundled_plugins_dir, "core", &core_manifest());
    write_plugin_dir(&settings.plugins_dir, "a", &plugin_manifest("a", "1.0", &["platform.core"]));
    write_archive(
        &settings.plugins_dir.join("b.jar"),
        &[("META-INF/plugin.json", plugin_manifest("b", "1.0", &["a"]))],
    );
    let external = write_plugin_dir(&root.join("external"), "c", &plugin_manifest("c", "1.0", &["platform.core"]));
    settings.extra_plugin_paths.push(external);

    let manager = manager_for(settings, Arc::new(InMemoryClassLoaderFactory::new()));
    let report = manager.load().await.unwrap();

    assert_eq!(report.enabled, vec!["platform.core", "a", "b", "c"]);
    assert!(report.disabled.is_empty());
    assert!(report.errors.is_empty());
    assert!(manager.is_plugin_enabled("b").await.unwrap());
}

#[tokio::test]
async fn test_higher_version_wins_across_directories() {
    let temp = tempdir().unwrap();
    let settings = settings_for(temp.path());
    write_plugin_dir(&settings.plugins_dir, "tool", &plugin_manifest("tool", "2.1.0", &[]));
    write_plugin_dir(&settings.bundled_plugins_dir, "tool", &plugin_manifest("tool", "2.0.5", &[]));
    write_plugin_dir(&settings.plugins_dir, "twin-1", &plugin_manifest("twin", "1.0", &[]));
    write_plugin_dir(&settings.plugins_dir, "twin-2", &plugin_manifest("twin", "1.0", &[]));

    let manager = manager_for(settings, Arc::new(InMemoryClassLoaderFactory::new()));
    let (set, report) = manager.build_plugin_set().await.unwrap();

    assert_eq!(set.get("tool").unwrap().version.as_deref(), Some("2.1.0"));
    assert!(!set.is_enabled("twin"));
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].id, "twin");
}

#[tokio::test]
async fn test_missing_dependency_disables_the_chain() {
    let temp = tempdir().unwrap();
    let settings = settings_for(temp.path());
    write_plugin_dir(&settings.plugins_dir, "a", &plugin_manifest("a", "1.0", &["ghost"]));
    write_plugin_dir(&settings.plugins_dir, "b", &plugin_manifest("b", "1.0", &["a"]));
    write_plugin_dir(&settings.plugins_dir, "c", &plugin_manifest("c", "1.0", &[]));

    let manager = manager_for(settings, Arc::new(InMemoryClassLoaderFactory::new()));
    let report = manager.load().await.unwrap();

    assert_eq!(report.enabled, vec!["c"]);
    assert_eq!(
        report.disabled,
        vec![
            ("a".to_string(), "Required plugin not found: ghost".to_string()),
            ("b".to_string(), "required plugin 'a' is disabled".to_string()),
        ]
    );
    assert_eq!(report.error_messages().len(), 2);
}

#[tokio::test]
async fn test_cycle_is_reported_and_excluded() {
    let temp = tempdir().unwrap();
    let settings = settings_for(temp.path());
    write_plugin_dir(&settings.plugins_dir, "a", &plugin_manifest("a", "1.0", &["b"]));
    write_plugin_dir(&settings.plugins_dir, "b", &plugin_manifest("b", "1.0", &["a"]));
    write_plugin_dir(&settings.plugins_dir, "c", &plugin_manifest("c", "1.0", &["a"]));
    write_plugin_dir(&settings.plugins_dir, "d", &plugin_manifest("d", "1.0", &[]));

    let manager = manager_for(settings, Arc::new(InMemoryClassLoaderFactory::new()));
    let report = manager.load().await.unwrap();

    assert_eq!(report.enabled, vec!["d"]);
    assert_eq!(report.cycles.len(), 1);
    assert!(report.cycles[0].contains(&"a".to_string()));
    assert!(report.cycles[0].contains(&"b".to_string()));
    assert!(report
        .error_messages()
        .iter()
        .any(|m| m.contains("Circular dependency detected")));
    let c_reason = report.disabled.iter().find(|(id, _)| id == "c").map(|(_, r)| r.as_str());
    assert_eq!(c_reason, Some("required plugin 'a' is disabled"));
}

#[tokio::test]
async fn test_optional_config_loaded_only_with_its_target() {
    let temp = tempdir().unwrap();
    let settings = settings_for(temp.path());
    let host = plugin_manifest("host", "1.0", &[]).with_child(optional_depends("extra", "host-extra.json"));
    let host_dir = write_plugin_dir(&settings.plugins_dir, "host", &host);
    write_json(
        &host_dir.join("META-INF").join("host-extra.json"),
        &Element::new("plugin").with_child(
            Element::new("extensions").with_child(Element::new("action").with_attribute("implementation", "com.host.ExtraAction")),
        ),
    );
    write_plugin_dir(&settings.plugins_dir, "extra", &plugin_manifest("extra", "1.0", &[]));

    let manager = manager_for(settings.clone(), Arc::new(InMemoryClassLoaderFactory::new()));
    let (set, report) = manager.build_plugin_set().await.unwrap();
    assert_eq!(report.enabled, vec!["extra", "host"]);
    let sub = set.get("host").unwrap().dependencies[0].active_sub_descriptor().unwrap();
    assert_eq!(sub.implementation_classes.len(), 1);
    assert_eq!(&*sub.implementation_classes[0], "com.host.ExtraAction");
    assert_eq!(sub.version.as_deref(), Some("1.0"));

    std::fs::remove_dir_all(settings.plugins_dir.join("extra")).unwrap();
    let manager = manager_for(settings, Arc::new(InMemoryClassLoaderFactory::new()));
    let (set, report) = manager.build_plugin_set().await.unwrap();
    assert_eq!(report.enabled, vec!["host"]);
    assert!(report.errors.is_empty());
    assert!(set.get("host").unwrap().dependencies[0].active_sub_descriptor().is_none());
}

#[tokio::test]
async fn test_incompatible_build_reaches_dependents() {
    let temp = tempdir().unwrap();
    let mut settings = settings_for(temp.path());
    settings.build = Some("241.100".to_string());
    let old = plugin_manifest("old", "1.0", &[])
        .with_child(Element::new("compatibility").with_attribute("until-build", "232.*"));
    write_plugin_dir(&settings.plugins_dir, "old", &old);
    write_plugin_dir(&settings.plugins_dir, "user", &plugin_manifest("user", "1.0", &["old"]));

    let manager = manager_for(settings, Arc::new(InMemoryClassLoaderFactory::new()));
    let report = manager.load().await.unwrap();

    assert!(report.enabled.is_empty());
    let messages = report.error_messages();
    assert!(messages.iter().any(|m| m.starts_with("[error] old:") && m.contains("232")));
    assert!(messages.iter().any(|m| m.contains("user") && m.contains("'old' is incompatible")));
}

#[tokio::test]
async fn test_incompatible_plugins_are_listed_as_disabled() {
    let temp = tempdir().unwrap();
    let mut settings = settings_for(temp.path());
    settings.build = Some("100.0".to_string());
    let old = plugin_manifest("old", "1.0", &[])
        .with_child(Element::new("compatibility").with_attribute("until-build", "50.0"));
    write_plugin_dir(&settings.plugins_dir, "old", &old);
    write_plugin_dir(&settings.plugins_dir, "keep", &plugin_manifest("keep", "1.0", &[]));

    let manager = manager_for(settings, Arc::new(InMemoryClassLoaderFactory::new()));
    let (set, report) = manager.build_plugin_set().await.unwrap();

    assert_eq!(report.enabled, vec!["keep"]);
    assert!(matches!(set.disable_reason("old"), Some(DisableReason::Incompatible(reason)) if reason.contains("50.0")));
    assert!(set.disabled().iter().any(|d| d.id == "old" && !d.enabled));
    assert!(set.class_loader("old").is_none());
    assert_eq!(
        report.disabled,
        vec![("old".to_string(), "incompatible: supports builds up to 50.0, host is 100.0".to_string())]
    );
    let messages = report.error_messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("[error] old: Plugin 'old' is incompatible"));
}

#[tokio::test]
async fn test_contested_ids_are_never_resolved() {
    let temp = tempdir().unwrap();
    let settings = settings_for(temp.path());
    let legacy_module = |value: &str| Element::new("module").with_attribute("value", value);
    write_plugin_dir(&settings.plugins_dir, "a", &plugin_manifest("a", "1.0", &[]).with_child(legacy_module("shared")));
    write_plugin_dir(&settings.plugins_dir, "b", &plugin_manifest("b", "1.0", &[]).with_child(legacy_module("shared")));
    write_plugin_dir(&settings.plugins_dir, "m", &plugin_manifest("m", "1.0", &[]));
    write_plugin_dir(&settings.plugins_dir, "p", &plugin_manifest("p", "1.0", &[]).with_child(legacy_module("m")));
    write_plugin_dir(&settings.plugins_dir, "user", &plugin_manifest("user", "1.0", &["shared"]));
    write_plugin_dir(&settings.plugins_dir, "client", &plugin_manifest("client", "1.0", &["m"]));

    let manager = manager_for(settings, Arc::new(InMemoryClassLoaderFactory::new()));
    let (set, report) = manager.build_plugin_set().await.unwrap();

    assert_eq!(report.enabled, vec!["a", "b", "p"]);
    assert!(set.resolve_dependency("shared").is_none());
    assert!(set.resolve_dependency("m").is_none());
    assert!(!set.is_enabled("m"));
    let disabled: Vec<&str> = report.disabled.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(disabled, vec!["client", "user"]);
    assert!(report.disabled.iter().all(|(_, reason)| reason.contains("declared by more than one plugin")));

    let error_ids: Vec<&str> = report.errors.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(error_ids, vec!["client", "m", "shared", "user"]);
}

#[tokio::test]
async fn test_module_dependency_required_for_custom_plugins() {
    let temp = tempdir().unwrap();
    let mut settings = settings_for(temp.path());
    settings.require_module_dependency = true;
    write_plugin_dir(&settings.bundled_plugins_dir, "core", &core_manifest());
    write_plugin_dir(&settings.plugins_dir, "legacy", &plugin_manifest("legacy", "1.0", &["platform.core"]));
    write_plugin_dir(
        &settings.plugins_dir,
        "modern",
        &plugin_manifest("modern", "1.0", &["platform.modules.lang"]),
    );

    let manager = manager_for(settings, Arc::new(InMemoryClassLoaderFactory::new()));
    let report = manager.load().await.unwrap();

    assert_eq!(report.enabled, vec!["platform.core", "modern"]);
    assert_eq!(
        report.error_messages(),
        vec!["[error] legacy: Plugin 'legacy' declares no dependency on a platform module".to_string()]
    );
}

#[tokio::test]
async fn test_explicit_selection_loads_requirements_only() {
    let temp = tempdir().unwrap();
    let mut settings = settings_for(temp.path());
    write_plugin_dir(&settings.plugins_dir, "a", &plugin_manifest("a", "1.0", &[]));
    write_plugin_dir(&settings.plugins_dir, "b", &plugin_manifest("b", "1.0", &["a"]));
    write_plugin_dir(&settings.plugins_dir, "unrelated", &plugin_manifest("unrelated", "1.0", &[]));
    settings
        .apply_overrides(|key| (key == "PLUGWEAVE_LOAD_PLUGIN_IDS").then(|| "b".to_string()))
        .unwrap();

    let manager = manager_for(settings, Arc::new(InMemoryClassLoaderFactory::new()));
    let report = manager.load().await.unwrap();

    assert_eq!(report.enabled, vec!["a", "b"]);
    assert_eq!(
        report.disabled,
        vec![("unrelated".to_string(), "not selected for loading".to_string())]
    );
    assert!(report.errors.is_empty());
}

#[tokio::test]
async fn test_worker_count_does_not_change_the_result() {
    let temp = tempdir().unwrap();
    let settings = settings_for(temp.path());
    write_plugin_dir(&settings.bundled_plugins_dir, "core", &core_manifest());
    for i in 0..24 {
        let id = format!("p{:02}", i);
        let mut deps = vec!["platform.core".to_string()];
        if i > 0 {
            deps.push(format!("p{:02}", (i * 7 + 3) % i));
        }
        if i % 5 == 0 {
            deps.push("absent".to_string());
        }
        let deps: Vec<&str> = deps.iter().map(String::as_str).collect();
        write_plugin_dir(&settings.plugins_dir, &id, &plugin_manifest(&id, "1.0", &deps));
    }

    let mut reports = Vec::new();
    for workers in [1, 3, 16] {
        let mut settings = settings.clone();
        settings.max_parse_workers = workers;
        let manager = manager_for(settings, Arc::new(InMemoryClassLoaderFactory::new()));
        reports.push(manager.load().await.unwrap());
    }
    assert_eq!(reports[0], reports[1]);
    assert_eq!(reports[1], reports[2]);
    assert_eq!(reports[0].enabled[0], "platform.core");
    assert!(!reports[0].enabled.contains(&"p05".to_string()));
}
