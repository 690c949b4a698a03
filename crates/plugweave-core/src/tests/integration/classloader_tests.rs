#![cfg(test)]

//! Class resolution through the loader graph of a full load.
use std::sync::Arc;

use tempfile::tempdir;

use crate::classloader::{same_loader, ClassLoader, ClassLoaderFactory, ClassVisibility, InMemoryClassLoaderFactory};
use crate::manifest::element::Element;
use crate::plugin_system::manager::PluginManager;
use crate::tests::integration::common::{
    core_manifest, manager_for, optional_depends, plugin_manifest, settings_for, write_json, write_plugin_dir,
};

#[tokio::test]
async fn test_classes_resolve_along_dependencies() {
    let temp = tempdir().unwrap();
    let settings = settings_for(temp.path());
    write_plugin_dir(&settings.bundled_plugins_dir, "core", &core_manifest());
    let a_dir = write_plugin_dir(&settings.plugins_dir, "a", &plugin_manifest("a", "1.0", &["platform.core"]));
    let b_dir = write_plugin_dir(&settings.plugins_dir, "b", &plugin_manifest("b", "1.0", &["a"]));

    let factory = Arc::new(
        InMemoryClassLoaderFactory::new()
            .with_classes(&a_dir, ["com.a.Api"])
            .with_classes(&b_dir, ["com.b.Impl"]),
    );
    let manager = manager_for(settings, factory.clone());
    manager.load().await.unwrap();

    let core = manager.class_loader("platform.core").await.unwrap().unwrap();
    assert!(same_loader(&core, manager.root_loader()));

    let a = manager.class_loader("a").await.unwrap().unwrap();
    let b = manager.class_loader("b").await.unwrap().unwrap();
    assert!(factory.has_class(&b, "com.a.Api"));
    assert!(factory.has_class(&b, "com.b.Impl"));
    assert!(!factory.has_class(&a, "com.b.Impl"));
    assert_eq!(b.name(), "b");
}

#[tokio::test]
async fn test_optional_dependency_becomes_visible() {
    let temp = tempdir().unwrap();
    let settings = settings_for(temp.path());
    let host = plugin_manifest("host", "1.0", &[]).with_child(optional_depends("extra", "host-extra.json"));
    let host_dir = write_plugin_dir(&settings.plugins_dir, "host", &host);
    write_json(&host_dir.join("META-INF").join("host-extra.json"), &Element::new("plugin"));
    let extra_dir = write_plugin_dir(&settings.plugins_dir, "extra", &plugin_manifest("extra", "1.0", &[]));

    let factory = Arc::new(InMemoryClassLoaderFactory::new().with_classes(&extra_dir, ["com.extra.Service"]));
    let manager = manager_for(settings, factory.clone());
    manager.load().await.unwrap();

    let host_loader = manager.class_loader("host").await.unwrap().unwrap();
    assert!(factory.has_class(&host_loader, "com.extra.Service"));
    assert_eq!(manager.get_plugin_dependencies("host").await.unwrap(), Vec::<String>::new());
}

#[tokio::test]
async fn test_isolated_content_module_from_manifest() {
    let temp = tempdir().unwrap();
    let mut settings = settings_for(temp.path());
    settings.isolation.enabled = true;
    let owner = plugin_manifest("owner", "1.0", &[]).with_child(
        Element::new("content")
            .with_child(Element::new("module").with_attribute("name", "owner.sub").with_attribute("package", "com.owner.sub")),
    );
    let owner_dir = write_plugin_dir(&settings.plugins_dir, "owner", &owner);
    write_json(&owner_dir.join("META-INF").join("owner.sub.json"), &Element::new("plugin"));

    let factory = Arc::new(
        InMemoryClassLoaderFactory::new().with_classes(&owner_dir, ["com.owner.Main", "com.owner.sub.Part"]),
    );
    let manager = manager_for(settings, factory.clone());
    manager.load().await.unwrap();

    let owner_loader = manager.class_loader("owner").await.unwrap().unwrap();
    let module_loader = manager.class_loader("owner.sub").await.unwrap().unwrap();
    assert!(!same_loader(&owner_loader, &module_loader));
    assert_eq!(module_loader.visibility(), ClassVisibility::only(["com.owner.sub"]));
    assert!(factory.defines(&module_loader, "com.owner.sub.Part"));
    assert!(!factory.defines(&module_loader, "com.owner.Main"));
    assert!(factory.has_class(&module_loader, "com.owner.Main"));
}

#[tokio::test]
async fn test_content_module_shares_owner_loader_by_default() {
    let temp = tempdir().unwrap();
    let settings = settings_for(temp.path());
    let owner = plugin_manifest("owner", "1.0", &[]).with_child(
        Element::new("content")
            .with_child(Element::new("module").with_attribute("name", "owner.sub").with_attribute("package", "com.owner.sub")),
    );
    let owner_dir = write_plugin_dir(&settings.plugins_dir, "owner", &owner);
    write_json(&owner_dir.join("META-INF").join("owner.sub.json"), &Element::new("plugin"));
    write_plugin_dir(&settings.plugins_dir, "client", &plugin_manifest("client", "1.0", &["owner.sub"]));

    let manager = manager_for(settings, Arc::new(InMemoryClassLoaderFactory::new()));
    let report = manager.load().await.unwrap();
    assert_eq!(report.enabled, vec!["owner", "client"]);

    let owner_loader = manager.class_loader("owner").await.unwrap().unwrap();
    let module_loader = manager.class_loader("owner.sub").await.unwrap().unwrap();
    assert!(same_loader(&owner_loader, &module_loader));

    let client = manager.class_loader("client").await.unwrap().unwrap();
    assert_eq!(client.parents().len(), 1);
    assert!(same_loader(&client.parents()[0], &owner_loader));
    assert_eq!(manager.get_dependent_plugins("owner").await.unwrap(), vec!["client"]);
}
