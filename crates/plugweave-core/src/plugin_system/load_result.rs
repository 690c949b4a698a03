//! Aggregation of descriptors discovered across all sources.
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::kernel::constants::CORE_PLUGIN_ID;
use crate::plugin_system::compat::CompatibilitySource;
use crate::plugin_system::descriptor::{Descriptor, DescriptorSource};
use crate::plugin_system::error::{LoadError, PluginSystemError};
use crate::plugin_system::plugin_set::Fact;
use crate::plugin_system::version::compare_versions;

/// Collects descriptors by id, resolving collisions by version and recording one
/// error per rejected id.
pub struct LoadResult {
    compatibility: Arc<dyn CompatibilitySource>,
    require_module_dependency: bool,

    plugins: BTreeMap<String, Descriptor>,
    duplicates: BTreeMap<String, Vec<Descriptor>>,
    shadowed: Vec<Descriptor>,
    incompatible: BTreeMap<String, Descriptor>,
    incompatible_reasons: BTreeMap<String, String>,
    rejections: BTreeMap<String, Fact>,
    module_owners: BTreeMap<String, String>,
    duplicate_modules: BTreeMap<String, Vec<String>>,
    errors: BTreeMap<String, LoadError>,

    disabled: Vec<Descriptor>,
    rejected: Vec<(Descriptor, Fact)>,
    finished: bool,
}

impl LoadResult {
    pub fn new(compatibility: Arc<dyn CompatibilitySource>) -> Self {
        Self {
            compatibility,
            require_module_dependency: true,
            plugins: BTreeMap::new(),
            duplicates: BTreeMap::new(),
            shadowed: Vec::new(),
            incompatible: BTreeMap::new(),
            incompatible_reasons: BTreeMap::new(),
            rejections: BTreeMap::new(),
            module_owners: BTreeMap::new(),
            duplicate_modules: BTreeMap::new(),
            errors: BTreeMap::new(),
            disabled: Vec::new(),
            rejected: Vec::new(),
            finished: false,
        }
    }

    /// Whether enabled non-bundled plugins must depend on a platform module
    pub fn require_module_dependency(mut self, required: bool) -> Self {
        self.require_module_dependency = required;
        self
    }

    /// Adds a descriptor.
    ///
    /// Returns `true` when the descriptor now owns its id. With
    /// `override_if_compatible` a compatible descriptor replaces an existing one
    /// regardless of version.
    pub fn add(&mut self, descriptor: Descriptor, override_if_compatible: bool) -> bool {
        if self.finished {
            log::error!("Descriptor '{}' added after loading was finished", descriptor.id);
            return false;
        }
        let id = descriptor.id.clone();

        if descriptor.incomplete {
            self.reject(descriptor, "plugin descriptor is incomplete".to_string());
            return false;
        }
        if let Err(fact) = self.check_compatibility(&descriptor) {
            let reason = match &fact {
                Fact::Incompatible(reason) => reason.clone(),
                _ => format!(
                    "version {} is marked as broken",
                    descriptor.version.as_deref().unwrap_or("<none>")
                ),
            };
            let message = PluginSystemError::Incompatible {
                plugin_id: id.clone(),
                reason: reason.clone(),
            }
            .to_string();
            self.incompatible_reasons.insert(id.clone(), reason);
            self.rejections.insert(id.clone(), fact);
            self.reject(descriptor, message);
            return false;
        }
        if self.require_module_dependency
            && descriptor.enabled
            && !descriptor.is_bundled()
            && id != CORE_PLUGIN_ID
            && !descriptor.declares_module_dependency()
        {
            let message = PluginSystemError::NoModuleDependency { plugin_id: id.clone() }.to_string();
            let reason = "no dependency on a platform module".to_string();
            self.incompatible_reasons.insert(id.clone(), reason.clone());
            self.rejections.insert(id.clone(), Fact::Incompatible(reason));
            self.reject(descriptor, message);
            return false;
        }

        if let Some(candidates) = self.duplicates.get_mut(&id) {
            log::warn!("Plugin '{}' is already excluded as a duplicate", id);
            candidates.push(descriptor);
            return false;
        }

        // A plugin id already claimed as another plugin's module
        let module_clash = match self.duplicate_modules.get_mut(&id) {
            Some(claimants) => {
                claimants.push(id.clone());
                true
            }
            None => match self.module_owners.get(&id).filter(|owner| **owner != id).cloned() {
                Some(owner) => {
                    log::error!("Plugin id '{}' is already declared as a module of '{}'", id, owner);
                    self.module_owners.remove(&id);
                    self.duplicate_modules.insert(id.clone(), vec![owner, id.clone()]);
                    true
                }
                None => false,
            },
        };
        if module_clash {
            self.set_error(LoadError::error(&id, PluginSystemError::DuplicateId(id.clone()).to_string()));
            self.duplicates.entry(id).or_default().push(descriptor);
            return false;
        }

        if let Some(existing) = self.plugins.get(&id) {
            if existing.source == DescriptorSource::PathList {
                log::info!(
                    "Plugin '{}' from {:?} is shadowed by the explicitly listed one",
                    id,
                    descriptor.source
                );
                self.shadowed.push(descriptor);
                return false;
            }
            match compare_versions(descriptor.version.as_deref(), existing.version.as_deref()) {
                ordering if override_if_compatible || ordering == Ordering::Greater => {
                    if let Some(old) = self.plugins.remove(&id) {
                        log::info!(
                            "Plugin '{}' {} replaces version {}",
                            id,
                            descriptor.version.as_deref().unwrap_or("<none>"),
                            old.version.as_deref().unwrap_or("<none>")
                        );
                        self.unregister_modules(&old);
                        self.shadowed.push(old);
                    }
                }
                Ordering::Less => {
                    log::info!(
                        "Plugin '{}' {} is shadowed by version {}",
                        id,
                        descriptor.version.as_deref().unwrap_or("<none>"),
                        existing.version.as_deref().unwrap_or("<none>")
                    );
                    self.shadowed.push(descriptor);
                    return false;
                }
                _ => {
                    let mut candidates = Vec::with_capacity(2);
                    if let Some(old) = self.plugins.remove(&id) {
                        self.unregister_modules(&old);
                        candidates.push(old);
                    }
                    candidates.push(descriptor);
                    log::error!("Plugin id '{}' is declared by {} descriptors", id, candidates.len());
                    self.duplicates.insert(id.clone(), candidates);
                    self.set_error(LoadError::error(&id, PluginSystemError::DuplicateId(id.clone()).to_string()));
                    return false;
                }
            }
        }

        self.register_modules(&descriptor);
        self.errors.remove(&id);
        self.incompatible.remove(&id);
        self.incompatible_reasons.remove(&id);
        self.rejections.remove(&id);
        self.plugins.insert(id, descriptor);
        true
    }

    fn check_compatibility(&self, descriptor: &Descriptor) -> Result<(), Fact> {
        if self
            .compatibility
            .is_broken(&descriptor.id, descriptor.version.as_deref())
        {
            return Err(Fact::Broken);
        }
        descriptor
            .build_range
            .check(&self.compatibility.build_number())
            .map_err(Fact::Incompatible)
    }

    fn reject(&mut self, descriptor: Descriptor, message: String) {
        log::warn!("{}", message);
        self.record_error(LoadError::error(&descriptor.id, message));
        self.incompatible.insert(descriptor.id.clone(), descriptor);
    }

    fn register_modules(&mut self, descriptor: &Descriptor) {
        for module in descriptor.provided_module_ids() {
            if module == descriptor.id {
                continue;
            }
            if let Some(claimants) = self.duplicate_modules.get_mut(&module) {
                claimants.push(descriptor.id.clone());
                continue;
            }
            let clash = match self.module_owners.get(&module) {
                Some(owner) if owner != &descriptor.id => Some(owner.clone()),
                _ if self.plugins.contains_key(&module) => Some(module.clone()),
                _ => None,
            };
            match clash {
                Some(other) => {
                    log::error!(
                        "Module '{}' is declared by both '{}' and '{}'",
                        module,
                        other,
                        descriptor.id
                    );
                    self.module_owners.remove(&module);
                    if let Some(existing) = self.plugins.remove(&module) {
                        self.unregister_modules(&existing);
                        self.duplicates.entry(module.clone()).or_default().push(existing);
                    }
                    self.duplicate_modules
                        .insert(module.clone(), vec![other, descriptor.id.clone()]);
                    self.set_error(LoadError::error(&module, PluginSystemError::DuplicateId(module.clone()).to_string()));
                }
                None => {
                    self.module_owners.insert(module, descriptor.id.clone());
                }
            }
        }
    }

    fn unregister_modules(&mut self, descriptor: &Descriptor) {
        self.module_owners.retain(|_, owner| owner != &descriptor.id);
    }

    fn set_error(&mut self, error: LoadError) {
        self.errors.insert(error.id.clone(), error);
    }

    /// Records a problem found outside of [`add`](Self::add), such as a manifest that failed to parse.
    pub fn record_error(&mut self, error: LoadError) {
        if self.plugins.contains_key(&error.id) {
            log::debug!("Ignoring error for accepted plugin '{}': {}", error.id, error.message);
            return;
        }
        self.set_error(error);
    }

    /// Finalizes the aggregation and returns the winning enabled descriptors sorted by id.
    ///
    /// Winners that are disabled stay available through [`disabled`](Self::disabled).
    pub fn finish_loading(&mut self) -> Result<Vec<Descriptor>, PluginSystemError> {
        if self.finished {
            return Err(PluginSystemError::AlreadyFinished);
        }
        self.finished = true;
        let winners = std::mem::take(&mut self.plugins);
        let rejections = std::mem::take(&mut self.rejections);
        self.rejected = rejections
            .into_iter()
            .filter(|(id, _)| !winners.contains_key(id) && !self.duplicates.contains_key(id))
            .filter_map(|(id, fact)| self.incompatible.get(&id).map(|d| (d.clone(), fact)))
            .collect();
        let (enabled, disabled): (Vec<Descriptor>, Vec<Descriptor>) =
            winners.into_values().partition(|d| d.enabled);
        self.disabled = disabled;
        log::info!(
            "Loading finished: {} enabled, {} disabled, {} rejected, {} duplicate id(s)",
            enabled.len(),
            self.disabled.len(),
            self.incompatible.len(),
            self.duplicates.len()
        );
        Ok(enabled)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Winning descriptors currently held, before [`finish_loading`](Self::finish_loading)
    pub fn get(&self, id: &str) -> Option<&Descriptor> {
        self.plugins.get(id)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Winners that were disabled, available after finishing
    pub fn disabled(&self) -> &[Descriptor] {
        &self.disabled
    }

    pub fn take_disabled(&mut self) -> Vec<Descriptor> {
        std::mem::take(&mut self.disabled)
    }

    /// Descriptors rejected as incompatible or broken, with the fact that disables them.
    /// Available after finishing.
    pub fn take_rejected(&mut self) -> Vec<(Descriptor, Fact)> {
        std::mem::take(&mut self.rejected)
    }

    pub fn shadowed(&self) -> &[Descriptor] {
        &self.shadowed
    }

    pub fn duplicates(&self) -> &BTreeMap<String, Vec<Descriptor>> {
        &self.duplicates
    }

    pub fn is_duplicate(&self, id: &str) -> bool {
        self.duplicates.contains_key(id) || self.duplicate_modules.contains_key(id)
    }

    /// Every plugin or module id claimed by more than one descriptor
    pub fn duplicate_ids(&self) -> BTreeSet<String> {
        self.duplicates
            .keys()
            .chain(self.duplicate_modules.keys())
            .cloned()
            .collect()
    }

    pub fn incompatible(&self) -> &BTreeMap<String, Descriptor> {
        &self.incompatible
    }

    /// Why ids were rejected as incompatible, for precise dependent reporting
    pub fn incompatible_reasons(&self) -> &BTreeMap<String, String> {
        &self.incompatible_reasons
    }

    /// Module id to owning plugin id
    pub fn module_owners(&self) -> &BTreeMap<String, String> {
        &self.module_owners
    }

    /// Active errors, one per id, sorted by id
    pub fn errors(&self) -> Vec<LoadError> {
        self.errors.values().cloned().collect()
    }
}
