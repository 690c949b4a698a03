use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
#[cfg(feature = "yaml-config")]
use serde_yaml;
#[cfg(feature = "toml-config")]
use toml;

use crate::classloader::IsolationPolicy;
use crate::kernel::constants::{
    BUNDLED_PLUGINS_DIR, CONFIG_DIR_NAME, CORE_PLUGIN_ID, DEFAULT_PARSE_WORKERS, DEFAULT_PLUGINS_DIR,
};
use crate::kernel::error::{Error, Result};
use crate::manifest::resolver::ResolverOptions;
use crate::plugin_system::plugin_set::Selection;
use crate::plugin_system::version::BuildNumber;
use crate::storage::error::StorageSystemError;

/// Environment variable holding extra plugin paths, separated like `PATH`
pub const ENV_PLUGIN_PATH: &str = "PLUGWEAVE_PLUGIN_PATH";
/// Comma-separated ids restricting which plugins load
pub const ENV_LOAD_PLUGIN_IDS: &str = "PLUGWEAVE_LOAD_PLUGIN_IDS";
/// Category restricting which plugins load
pub const ENV_LOAD_CATEGORY: &str = "PLUGWEAVE_LOAD_CATEGORY";
/// Host build number
pub const ENV_BUILD: &str = "PLUGWEAVE_BUILD";
/// Load plugins even when they are listed as disabled
pub const ENV_IGNORE_DISABLED_PLUGINS: &str = "PLUGWEAVE_IGNORE_DISABLED_PLUGINS";

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigFormat {
    /// JSON format (.json)
    Json,
    /// YAML format (.yaml, .yml) - requires "yaml-config" feature
    #[cfg(feature = "yaml-config")]
    Yaml,
    /// TOML format (.toml) - requires "toml-config" feature
    #[cfg(feature = "toml-config")]
    Toml,
}

impl ConfigFormat {
    /// Get the file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Json => "json",
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => "yaml",
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => "toml",
        }
    }

    /// Determine format from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| match ext.to_lowercase().as_str() {
                "json" => Some(ConfigFormat::Json),
                #[cfg(feature = "yaml-config")]
                "yaml" | "yml" => Some(ConfigFormat::Yaml),
                #[cfg(feature = "toml-config")]
                "toml" => Some(ConfigFormat::Toml),
                _ => None,
            })
    }
}

/// Package isolation switches as written in a settings file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationSettings {
    pub enabled: bool,
    pub allow: Vec<String>,
    pub deny: Vec<String>,
}

impl IsolationSettings {
    pub fn policy(&self) -> IsolationPolicy {
        IsolationPolicy {
            enabled: self.enabled,
            allow: self.allow.iter().cloned().collect::<BTreeSet<_>>(),
            deny: self.deny.iter().cloned().collect::<BTreeSet<_>>(),
        }
    }
}

/// Everything that steers one load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderSettings {
    /// Id of the descriptor representing the host
    pub core_plugin_id: String,
    /// Holds the disabled and broken plugin lists
    pub config_dir: PathBuf,
    /// User-writable plugins directory
    pub plugins_dir: PathBuf,
    /// Read-only bundled plugins directory
    pub bundled_plugins_dir: PathBuf,
    /// Roots scanned for embedded manifests
    pub classpath_roots: Vec<PathBuf>,
    /// Plugins loaded from outside the plugin directories; they override everything else
    pub extra_plugin_paths: Vec<PathBuf>,
    /// Prefix of the platform manifest (`<prefix>Plugin.json`) on classpath roots
    pub platform_prefix: Option<String>,

    pub tolerate_missing_includes: bool,
    pub tolerate_missing_sub_descriptors: bool,
    pub max_parse_workers: usize,

    /// Load only these plugins and what they require
    pub explicit_plugin_ids: Vec<String>,
    /// Load only plugins of this category and what they require
    pub category: Option<String>,
    /// Plugins whose absence aborts the load
    pub essential_plugins: Vec<String>,
    pub ignore_disabled_plugins: bool,

    /// Host build number; a snapshot build when unset
    pub build: Option<String>,
    pub require_module_dependency: bool,

    pub isolation: IsolationSettings,
    pub implicit_platform_module: Option<String>,
    /// Extra visible packages for the module loaders of the named plugins or modules
    pub visibility_special_cases: BTreeMap<String, Vec<String>>,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self::with_root(Path::new("."))
    }
}

impl LoaderSettings {
    /// Default settings with every directory placed under `root`
    pub fn with_root(root: &Path) -> Self {
        Self {
            core_plugin_id: CORE_PLUGIN_ID.to_string(),
            config_dir: root.join(CONFIG_DIR_NAME),
            plugins_dir: root.join(DEFAULT_PLUGINS_DIR),
            bundled_plugins_dir: root.join(BUNDLED_PLUGINS_DIR),
            classpath_roots: Vec::new(),
            extra_plugin_paths: Vec::new(),
            platform_prefix: None,
            tolerate_missing_includes: false,
            tolerate_missing_sub_descriptors: false,
            max_parse_workers: DEFAULT_PARSE_WORKERS,
            explicit_plugin_ids: Vec::new(),
            category: None,
            essential_plugins: Vec::new(),
            ignore_disabled_plugins: false,
            build: None,
            require_module_dependency: true,
            isolation: IsolationSettings::default(),
            implicit_platform_module: None,
            visibility_special_cases: BTreeMap::new(),
        }
    }

    /// Reads settings from a file whose format follows its extension.
    pub fn load(path: &Path) -> Result<Self> {
        let format = ConfigFormat::from_path(path).ok_or_else(|| {
            StorageSystemError::UnsupportedConfigFormat(path.display().to_string())
        })?;
        let data = fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageSystemError::FileNotFound(path.to_path_buf()).into(),
            _ => Error::io(e, "read_settings", path.to_path_buf()),
        })?;
        let settings = Self::deserialize(&data, format)?;
        log::debug!("Loaded loader settings from {}", path.display());
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let format = ConfigFormat::from_path(path).ok_or_else(|| {
            StorageSystemError::UnsupportedConfigFormat(path.display().to_string())
        })?;
        let data = self.serialize(format)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::io(e, "create_dir_all", parent.to_path_buf()))?;
        }
        fs::write(path, data).map_err(|e| Error::io(e, "write_settings", path.to_path_buf()))
    }

    /// Serialize to string based on format
    pub fn serialize(&self, format: ConfigFormat) -> Result<String> {
        let result: std::result::Result<String, Box<dyn std::error::Error + Send + Sync>> = match format {
            ConfigFormat::Json => serde_json::to_string_pretty(self).map_err(Into::into),
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => serde_yaml::to_string(self).map_err(Into::into),
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => toml::to_string_pretty(self).map_err(Into::into),
        };
        result.map_err(|source| {
            StorageSystemError::SerializationError {
                format: format.extension().to_string(),
                source,
            }
            .into()
        })
    }

    /// Deserialize from string based on format
    pub fn deserialize(data: &str, format: ConfigFormat) -> Result<Self> {
        let result: std::result::Result<Self, Box<dyn std::error::Error + Send + Sync>> = match format {
            ConfigFormat::Json => serde_json::from_str(data).map_err(Into::into),
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => serde_yaml::from_str(data).map_err(Into::into),
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => toml::from_str(data).map_err(Into::into),
        };
        result.map_err(|source| {
            StorageSystemError::DeserializationError {
                format: format.extension().to_string(),
                source,
            }
            .into()
        })
    }

    /// Applies overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`, keyed by the `PLUGWEAVE_*` variable names.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(paths) = lookup(ENV_PLUGIN_PATH).filter(|v| !v.trim().is_empty()) {
            let extra: Vec<PathBuf> = std::env::split_paths(&paths)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
            log::info!("{} adds {} plugin path(s)", ENV_PLUGIN_PATH, extra.len());
            self.extra_plugin_paths.extend(extra);
        }
        if let Some(ids) = lookup(ENV_LOAD_PLUGIN_IDS).filter(|v| !v.trim().is_empty()) {
            self.explicit_plugin_ids = ids
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(category) = lookup(ENV_LOAD_CATEGORY).filter(|v| !v.trim().is_empty()) {
            self.category = Some(category.trim().to_string());
        }
        if let Some(build) = lookup(ENV_BUILD).filter(|v| !v.trim().is_empty()) {
            BuildNumber::parse(&build).map_err(|e| StorageSystemError::InvalidSetting {
                key: ENV_BUILD.to_string(),
                value: build.clone(),
                reason: e.to_string(),
            })?;
            self.build = Some(build.trim().to_string());
        }
        if let Some(flag) = lookup(ENV_IGNORE_DISABLED_PLUGINS) {
            self.ignore_disabled_plugins = matches!(flag.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes");
        }
        Ok(())
    }

    /// The host build; a snapshot build accepting every range when unset
    pub fn build_number(&self) -> Result<BuildNumber> {
        match self.build.as_deref() {
            None => Ok(BuildNumber::new(vec![u32::MAX])),
            Some(raw) => BuildNumber::parse(raw).map_err(|e| {
                StorageSystemError::InvalidSetting {
                    key: "build".to_string(),
                    value: raw.to_string(),
                    reason: e.to_string(),
                }
                .into()
            }),
        }
    }

    /// Explicit ids take precedence over a category
    pub fn selection(&self) -> Selection {
        if !self.explicit_plugin_ids.is_empty() {
            Selection::Ids(self.explicit_plugin_ids.iter().cloned().collect())
        } else if let Some(category) = &self.category {
            Selection::Category(category.clone())
        } else {
            Selection::All
        }
    }

    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions {
            tolerate_missing_includes: self.tolerate_missing_includes,
            tolerate_missing_sub_descriptors: self.tolerate_missing_sub_descriptors,
        }
    }

    pub fn parse_workers(&self) -> usize {
        self.max_parse_workers.max(1)
    }
}
