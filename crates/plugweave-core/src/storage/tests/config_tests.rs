#![cfg(test)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tempfile::tempdir;

use crate::kernel::error::{Error, Result};
use crate::plugin_system::plugin_set::Selection;
use crate::plugin_system::version::BuildNumber;
use crate::storage::config::{
    ConfigFormat, LoaderSettings, ENV_BUILD, ENV_IGNORE_DISABLED_PLUGINS, ENV_LOAD_CATEGORY, ENV_LOAD_PLUGIN_IDS,
    ENV_PLUGIN_PATH,
};
use crate::storage::error::StorageSystemError;

fn sample_settings(root: &Path) -> LoaderSettings {
    let mut settings = LoaderSettings::with_root(root);
    settings.classpath_roots.push(root.join("lib"));
    settings.platform_prefix = Some("Studio".to_string());
    settings.build = Some("241.15".to_string());
    settings.essential_plugins = vec!["platform.core".to_string()];
    settings.isolation.enabled = true;
    settings.isolation.deny.push("legacy".to_string());
    settings
        .visibility_special_cases
        .insert("owner.sub".to_string(), vec!["com.shared".to_string()]);
    settings
}

#[test]
fn test_defaults_follow_root() {
    let settings = LoaderSettings::with_root(Path::new("/opt/app"));
    assert_eq!(settings.core_plugin_id, "platform.core");
    assert_eq!(settings.config_dir, PathBuf::from("/opt/app/.plugweave"));
    assert_eq!(settings.plugins_dir, PathBuf::from("/opt/app/plugins"));
    assert_eq!(settings.bundled_plugins_dir, PathBuf::from("/opt/app/plugins/bundled"));
    assert!(settings.require_module_dependency);
    assert_eq!(settings.selection(), Selection::All);
}

#[test]
fn test_format_from_path() {
    assert_eq!(ConfigFormat::from_path(Path::new("a/settings.json")), Some(ConfigFormat::Json));
    assert_eq!(ConfigFormat::from_path(Path::new("settings.YML")), Some(ConfigFormat::Yaml));
    assert_eq!(ConfigFormat::from_path(Path::new("settings.toml")), Some(ConfigFormat::Toml));
    assert_eq!(ConfigFormat::from_path(Path::new("settings.ini")), None);
    assert_eq!(ConfigFormat::from_path(Path::new("settings")), None);
}

#[test]
fn test_save_and_load_each_format() -> Result<()> {
    let temp = tempdir().unwrap();
    let settings = sample_settings(temp.path());
    for name in ["settings.json", "settings.yaml", "settings.toml"] {
        let path = temp.path().join("conf").join(name);
        settings.save(&path)?;
        let loaded = LoaderSettings::load(&path)?;
        assert_eq!(loaded, settings, "format of {}", name);
    }
    Ok(())
}

#[test]
fn test_partial_file_keeps_defaults() -> Result<()> {
    let settings = LoaderSettings::deserialize(r#"{"category": "vcs", "max_parse_workers": 0}"#, ConfigFormat::Json)?;
    assert_eq!(settings.category.as_deref(), Some("vcs"));
    assert_eq!(settings.core_plugin_id, "platform.core");
    assert_eq!(settings.parse_workers(), 1);
    assert_eq!(settings.selection(), Selection::Category("vcs".to_string()));

    let toml = "explicit_plugin_ids = [\"a\", \"b\"]\n[isolation]\nenabled = true\n";
    let settings = LoaderSettings::deserialize(toml, ConfigFormat::Toml)?;
    assert!(settings.isolation.policy().enabled);
    assert_eq!(
        settings.selection(),
        Selection::Ids(["a".to_string(), "b".to_string()].into_iter().collect())
    );
    Ok(())
}

#[test]
fn test_load_errors() {
    let temp = tempdir().unwrap();
    let missing = LoaderSettings::load(&temp.path().join("absent.json"));
    assert!(matches!(missing, Err(Error::StorageSystem(StorageSystemError::FileNotFound(_)))));

    let unsupported = LoaderSettings::load(&temp.path().join("settings.ini"));
    assert!(matches!(
        unsupported,
        Err(Error::StorageSystem(StorageSystemError::UnsupportedConfigFormat(_)))
    ));

    let garbage = temp.path().join("settings.json");
    std::fs::write(&garbage, "{ not json").unwrap();
    match LoaderSettings::load(&garbage) {
        Err(Error::StorageSystem(StorageSystemError::DeserializationError { format, .. })) => {
            assert_eq!(format, "json")
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_overrides_from_lookup() -> Result<()> {
    let separator = if cfg!(windows) { ";" } else { ":" };
    let vars: HashMap<&str, String> = HashMap::from([
        (ENV_PLUGIN_PATH, format!("/x/one{}/x/two", separator)),
        (ENV_LOAD_PLUGIN_IDS, " a, ,b ".to_string()),
        (ENV_LOAD_CATEGORY, "vcs".to_string()),
        (ENV_BUILD, "233.2".to_string()),
        (ENV_IGNORE_DISABLED_PLUGINS, "Yes".to_string()),
    ]);
    let mut settings = LoaderSettings::with_root(Path::new("/opt/app"));
    settings.apply_overrides(|key| vars.get(key).cloned())?;

    assert_eq!(settings.extra_plugin_paths, vec![PathBuf::from("/x/one"), PathBuf::from("/x/two")]);
    assert_eq!(settings.explicit_plugin_ids, vec!["a", "b"]);
    assert_eq!(settings.category.as_deref(), Some("vcs"));
    assert!(settings.ignore_disabled_plugins);
    assert_eq!(settings.build_number()?, BuildNumber::parse("233.2").unwrap());
    // Explicit ids win over the category.
    assert!(matches!(settings.selection(), Selection::Ids(_)));
    Ok(())
}

#[test]
fn test_invalid_build_override_is_rejected() {
    let mut settings = LoaderSettings::default();
    let result = settings.apply_overrides(|key| (key == ENV_BUILD).then(|| "not.a.build".to_string()));
    match result {
        Err(Error::StorageSystem(StorageSystemError::InvalidSetting { key, value, .. })) => {
            assert_eq!(key, ENV_BUILD);
            assert_eq!(value, "not.a.build");
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(settings.build.is_none());
}

#[test]
fn test_unset_build_accepts_everything() -> Result<()> {
    let settings = LoaderSettings::default();
    let build = settings.build_number()?;
    assert!(build > BuildNumber::parse("999.9999").unwrap());

    let mut broken = LoaderSettings::default();
    broken.build = Some("abc".to_string());
    assert!(broken.build_number().is_err());
    Ok(())
}
