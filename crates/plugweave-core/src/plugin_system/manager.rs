use std::collections::BTreeSet;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::classloader::{ClassLoaderConfigurator, ClassLoaderFactory, ClassLoaderHandle, ClassLoaderSpec};
use crate::kernel::error::{Error, Result};
use crate::manifest::document::DocumentLoader;
use crate::plugin_system::compat::{CompatibilitySource, StaticCompatibility};
use crate::plugin_system::error::{LoadError, PluginSystemError};
use crate::plugin_system::load_result::LoadResult;
use crate::plugin_system::loader::DescriptorLoader;
use crate::plugin_system::plugin_set::{DependencyGraphBuilder, PluginSet};
use crate::storage::config::LoaderSettings;
use crate::storage::disabled::PluginStateCache;

/// Summary of one completed load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    /// Enabled ids, dependencies first
    pub enabled: Vec<String>,
    /// Disabled ids with the reason, sorted by id
    pub disabled: Vec<(String, String)>,
    pub cycles: Vec<Vec<String>>,
    /// Batched problems: one per id, sorted by id
    pub errors: Vec<LoadError>,
}

impl LoadReport {
    /// Human-readable error lines, deduplicated and sorted
    pub fn error_messages(&self) -> Vec<String> {
        let lines: BTreeSet<String> = self.errors.iter().map(ToString::to_string).collect();
        lines.into_iter().collect()
    }
}

/// Plugin loading pipeline interface
#[async_trait]
pub trait PluginManager: Send + Sync {
    /// Discover, aggregate, order and wire every plugin. Fails only when an
    /// essential plugin is missing or the pipeline itself breaks.
    async fn load(&self) -> Result<LoadReport>;

    /// Ids of the enabled plugins, dependencies first
    async fn enabled_plugins(&self) -> Result<Vec<String>>;

    /// Loader assigned to a plugin or content module
    async fn class_loader(&self, id: &str) -> Result<Option<ClassLoaderHandle>>;

    /// Hard dependencies of an enabled plugin
    async fn get_plugin_dependencies(&self, id: &str) -> Result<Vec<String>>;

    /// Enabled plugins that hard-depend on `id`
    async fn get_dependent_plugins(&self, id: &str) -> Result<Vec<String>>;

    /// Enable a plugin: drop it from the disabled list and wire it into the current set when possible
    async fn enable_plugin(&self, id: &str) -> Result<()>;

    /// Add a plugin to the disabled list; takes effect on the next load
    async fn disable_plugin(&self, id: &str) -> Result<()>;

    async fn is_plugin_enabled(&self, id: &str) -> Result<bool>;
}

pub struct DefaultPluginManager {
    settings: Arc<LoaderSettings>,
    document_loader: Arc<dyn DocumentLoader>,
    factory: Arc<dyn ClassLoaderFactory>,
    compatibility: Option<Arc<dyn CompatibilitySource>>,
    state: Arc<PluginStateCache>,
    root_loader: ClassLoaderHandle,
    plugin_set: Mutex<Option<PluginSet>>,
}

impl DefaultPluginManager {
    pub fn new(
        settings: LoaderSettings,
        document_loader: Arc<dyn DocumentLoader>,
        factory: Arc<dyn ClassLoaderFactory>,
    ) -> Self {
        let state = Arc::new(PluginStateCache::new(settings.config_dir.clone()));
        let root_loader = factory.build(ClassLoaderSpec::new("root"));
        Self {
            settings: Arc::new(settings),
            document_loader,
            factory,
            compatibility: None,
            state,
            root_loader,
            plugin_set: Mutex::new(None),
        }
    }

    /// Replace the compatibility source built from the settings and the broken-plugins file
    pub fn with_compatibility(mut self, compatibility: Arc<dyn CompatibilitySource>) -> Self {
        self.compatibility = Some(compatibility);
        self
    }

    /// Use a specific root loader instead of an empty one from the factory
    pub fn with_root_loader(mut self, root: ClassLoaderHandle) -> Self {
        self.root_loader = root;
        self
    }

    pub fn settings(&self) -> &LoaderSettings {
        &self.settings
    }

    pub fn state(&self) -> &Arc<PluginStateCache> {
        &self.state
    }

    pub fn root_loader(&self) -> &ClassLoaderHandle {
        &self.root_loader
    }

    fn compatibility(&self) -> Result<Arc<dyn CompatibilitySource>> {
        if let Some(compatibility) = &self.compatibility {
            return Ok(Arc::clone(compatibility));
        }
        let source = StaticCompatibility::new(self.settings.build_number()?)
            .with_broken_plugins(self.state.broken_plugins()?);
        Ok(Arc::new(source))
    }

    fn configurator(&self) -> ClassLoaderConfigurator {
        ClassLoaderConfigurator::new(Arc::clone(&self.factory))
            .isolation(self.settings.isolation.policy())
            .special_cases(self.settings.visibility_special_cases.clone())
            .implicit_platform_module(self.settings.implicit_platform_module.clone())
    }

    /// Runs the pipeline and returns the configured set together with its report.
    pub async fn build_plugin_set(&self) -> Result<(PluginSet, LoadReport)> {
        let essential: BTreeSet<String> = self.settings.essential_plugins.iter().cloned().collect();
        let disabled = if self.settings.ignore_disabled_plugins {
            BTreeSet::new()
        } else {
            self.state.disabled_ids()?
        };

        let loader = DescriptorLoader::new(Arc::clone(&self.document_loader), Arc::clone(&self.settings));
        let jobs = loader.discover()?;
        let mut result = LoadResult::new(self.compatibility()?)
            .require_module_dependency(self.settings.require_module_dependency);
        loader.load_into(jobs, &mut result, &disabled, &essential).await?;

        let mut descriptors = result.finish_loading()?;
        descriptors.extend(result.take_disabled());

        let mut plugin_set = DependencyGraphBuilder::new(descriptors)
            .rejected(result.take_rejected())
            .duplicates(result.duplicate_ids())
            .unavailable(result.incompatible_reasons().clone())
            .essential(essential.iter().cloned())
            .selection(self.settings.selection())
            .core_plugin_id(&self.settings.core_plugin_id)
            .build();

        let missing: Vec<String> = essential
            .iter()
            .filter(|id| !plugin_set.is_enabled(id))
            .cloned()
            .collect();
        if !missing.is_empty() {
            log::error!("Essential plugins unavailable: {}", missing.join(", "));
            return Err(PluginSystemError::EssentialPluginMissing { ids: missing }.into());
        }

        self.configurator().configure(&mut plugin_set, &self.root_loader);

        let report = report_for(&plugin_set, result.errors());
        Ok((plugin_set, report))
    }
}

/// One error per id: aggregation errors first, graph reasons fill the gaps
fn report_for(plugin_set: &PluginSet, aggregation_errors: Vec<LoadError>) -> LoadReport {
    let mut errors: std::collections::BTreeMap<String, LoadError> =
        aggregation_errors.into_iter().map(|e| (e.id.clone(), e)).collect();
    for error in plugin_set.errors() {
        errors.entry(error.id.clone()).or_insert(error);
    }
    LoadReport {
        enabled: plugin_set.ids().into_iter().map(str::to_string).collect(),
        disabled: plugin_set
            .disabled_reasons()
            .iter()
            .map(|(id, reason)| (id.clone(), reason.to_string()))
            .collect(),
        cycles: plugin_set.cycles().to_vec(),
        errors: errors.into_values().collect(),
    }
}

impl Debug for DefaultPluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultPluginManager")
            .field("settings", &self.settings)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PluginManager for DefaultPluginManager {
    async fn load(&self) -> Result<LoadReport> {
        let (plugin_set, report) = self.build_plugin_set().await?;
        log::info!(
            "Loaded {} plugin(s), {} disabled, {} problem(s)",
            report.enabled.len(),
            report.disabled.len(),
            report.errors.len()
        );
        *self.plugin_set.lock().await = Some(plugin_set);
        Ok(report)
    }

    async fn enabled_plugins(&self) -> Result<Vec<String>> {
        let guard = self.plugin_set.lock().await;
        Ok(guard
            .as_ref()
            .map(|set| set.ids().into_iter().map(str::to_string).collect())
            .unwrap_or_default())
    }

    async fn class_loader(&self, id: &str) -> Result<Option<ClassLoaderHandle>> {
        let guard = self.plugin_set.lock().await;
        Ok(guard.as_ref().and_then(|set| set.class_loader(id)))
    }

    async fn get_plugin_dependencies(&self, id: &str) -> Result<Vec<String>> {
        let guard = self.plugin_set.lock().await;
        let set = guard.as_ref().ok_or_else(|| Error::from("plugins are not loaded"))?;
        let descriptor = set.get(id).ok_or_else(|| Error::from(format!("plugin '{}' is not enabled", id)))?;
        Ok(descriptor.hard_dependencies().map(|d| d.id.clone()).collect())
    }

    async fn get_dependent_plugins(&self, id: &str) -> Result<Vec<String>> {
        let guard = self.plugin_set.lock().await;
        let Some(set) = guard.as_ref() else {
            return Ok(Vec::new());
        };
        Ok(set
            .enabled()
            .iter()
            .filter(|d| {
                d.hard_dependencies()
                    .any(|dep| set.resolve_dependency(&dep.id).is_some_and(|t| t.id == id))
            })
            .map(|d| d.id.clone())
            .collect())
    }

    async fn enable_plugin(&self, id: &str) -> Result<()> {
        self.state.enable([id])?;
        let mut guard = self.plugin_set.lock().await;
        if let Some(set) = guard.as_mut() {
            match set.enable_plugin(id) {
                Ok(()) => {
                    self.configurator().configure(set, &self.root_loader);
                }
                Err(e) => log::warn!("Plugin '{}' will be enabled on the next load: {}", id, e),
            }
        }
        Ok(())
    }

    async fn disable_plugin(&self, id: &str) -> Result<()> {
        if self.settings.essential_plugins.iter().any(|e| e == id) {
            return Err(Error::from(format!("plugin '{}' is essential and cannot be disabled", id)));
        }
        self.state.disable([id])?;
        Ok(())
    }

    async fn is_plugin_enabled(&self, id: &str) -> Result<bool> {
        let guard = self.plugin_set.lock().await;
        Ok(guard.as_ref().is_some_and(|set| set.is_enabled(id)))
    }
}
