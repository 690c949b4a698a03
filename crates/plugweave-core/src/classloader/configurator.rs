use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::classloader::{
    infer_package_prefixes, same_loader, ClassLoaderFactory, ClassLoaderHandle, ClassLoaderSpec, ClassVisibility,
};
use crate::kernel::constants::ALL_MODULES_MARKER;
use crate::plugin_system::descriptor::Descriptor;
use crate::plugin_system::plugin_set::PluginSet;

/// When content modules get classloaders of their own
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IsolationPolicy {
    pub enabled: bool,
    pub allow: BTreeSet<String>,
    pub deny: BTreeSet<String>,
}

impl IsolationPolicy {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    pub fn is_active(&self, descriptor: &Descriptor) -> bool {
        self.enabled
            && !self.deny.contains(&descriptor.id)
            && (descriptor.package_prefix.is_some() || self.allow.is_empty() || self.allow.contains(&descriptor.id))
    }
}

/// Loaders decided for one descriptor before any of them is attached
struct Assignment {
    main: ClassLoaderHandle,
    sub_descriptors: Vec<usize>,
    modules: Vec<(usize, ClassLoaderHandle)>,
}

/// Wires one classloader per enabled descriptor so the loader graph mirrors the dependency graph.
pub struct ClassLoaderConfigurator {
    factory: Arc<dyn ClassLoaderFactory>,
    isolation: IsolationPolicy,
    host_peers: Vec<ClassLoaderHandle>,
    special_cases: BTreeMap<String, Vec<String>>,
    implicit_platform_module: Option<String>,
}

impl ClassLoaderConfigurator {
    pub fn new(factory: Arc<dyn ClassLoaderFactory>) -> Self {
        Self {
            factory,
            isolation: IsolationPolicy::default(),
            host_peers: Vec::new(),
            special_cases: BTreeMap::new(),
            implicit_platform_module: None,
        }
    }

    pub fn isolation(mut self, policy: IsolationPolicy) -> Self {
        self.isolation = policy;
        self
    }

    /// Loaders every plugin loader gets as parents, ahead of its dependencies
    pub fn host_peers(mut self, peers: Vec<ClassLoaderHandle>) -> Self {
        self.host_peers = peers;
        self
    }

    /// Extra visible prefixes for the module loaders of particular plugins or modules
    pub fn special_cases(mut self, cases: BTreeMap<String, Vec<String>>) -> Self {
        self.special_cases = cases;
        self
    }

    /// Module whose loader becomes an implicit parent when the core plugin provides all platform modules
    pub fn implicit_platform_module(mut self, module: Option<String>) -> Self {
        self.implicit_platform_module = module;
        self
    }

    /// Assigns loaders to every enabled descriptor that has none yet, in set order.
    ///
    /// Returns the number of descriptors configured by this call.
    pub fn configure(&self, set: &mut PluginSet, root: &ClassLoaderHandle) -> usize {
        let core_id = set.core_plugin_id().to_string();
        let mut implicit: Option<ClassLoaderHandle> = None;
        let mut configured = 0;

        for index in 0..set.enabled().len() {
            let descriptor = &set.enabled()[index];
            if descriptor.class_loader().is_some() {
                continue;
            }

            if descriptor.id == core_id || descriptor.use_core_class_loader {
                log::debug!("Plugin '{}' uses the root classloader", descriptor.id);
                share_loader(&mut set.enabled_mut()[index], root);
                configured += 1;
                continue;
            }

            // Resolved on first use; the module's own loader may not exist yet.
            if implicit.is_none() && self.core_provides_all_modules(set) {
                implicit = self.resolve_implicit_module(set);
            }
            let implicit_parent = implicit.clone();

            let assignment = self.plan(set, &set.enabled()[index], root, implicit_parent);
            apply(&mut set.enabled_mut()[index], assignment);
            configured += 1;
        }
        log::info!("Configured classloaders for {} plugin(s)", configured);
        configured
    }

    fn core_provides_all_modules(&self, set: &PluginSet) -> bool {
        set.get(set.core_plugin_id())
            .is_some_and(|core| core.modules.iter().any(|m| m == ALL_MODULES_MARKER))
    }

    fn resolve_implicit_module(&self, set: &PluginSet) -> Option<ClassLoaderHandle> {
        let module = self.implicit_platform_module.as_deref()?;
        let loader = set.class_loader(module);
        if loader.is_none() {
            log::debug!("Implicit platform module '{}' has no classloader yet", module);
        }
        loader
    }

    fn plan(
        &self,
        set: &PluginSet,
        descriptor: &Descriptor,
        root: &ClassLoaderHandle,
        implicit_parent: Option<ClassLoaderHandle>,
    ) -> Assignment {
        let mut parents: Vec<ClassLoaderHandle> = self.host_peers.clone();
        for dependency in descriptor.hard_dependencies() {
            match self.dependency_loader(set, &dependency.id) {
                Some(loader) => push_parent(&mut parents, loader, root),
                None => log::error!(
                    "Plugin '{}': no classloader for required dependency '{}', omitting it",
                    descriptor.id,
                    dependency.id
                ),
            }
        }
        if let Some(implicit) = implicit_parent {
            push_parent(&mut parents, implicit, root);
        }

        let main = self.factory.build(ClassLoaderSpec {
            name: descriptor.id.clone(),
            class_path: descriptor.class_path.clone(),
            parents,
            visibility: ClassVisibility::All,
        });

        let mut sub_descriptors = Vec::new();
        for (position, dependency) in descriptor.dependencies.iter().enumerate() {
            if !dependency.optional {
                continue;
            }
            let Some(target) = self.dependency_loader(set, &dependency.id) else {
                continue;
            };
            if !same_loader(&target, &main) && !same_loader(&target, root) {
                self.factory.attach_parent(&main, target);
            }
            if dependency.active_sub_descriptor().is_some() {
                sub_descriptors.push(position);
            }
        }

        let modules = self.plan_modules(set, descriptor, &main, root);
        Assignment {
            main,
            sub_descriptors,
            modules,
        }
    }

    fn plan_modules(
        &self,
        set: &PluginSet,
        owner: &Descriptor,
        owner_loader: &ClassLoaderHandle,
        root: &ClassLoaderHandle,
    ) -> Vec<(usize, ClassLoaderHandle)> {
        let isolated = self.isolation.is_active(owner);
        let owner_prefixes = owner.content_package_prefixes();
        let mut built: BTreeMap<&str, ClassLoaderHandle> = BTreeMap::new();
        let mut modules = Vec::new();

        for (position, module) in owner.content.iter().enumerate() {
            let Some(module_descriptor) = module.descriptor.as_deref() else {
                continue;
            };
            if module_descriptor.is_disabled_or_broken {
                continue;
            }
            if !isolated {
                modules.push((position, Arc::clone(owner_loader)));
                continue;
            }

            let loader = match module.effective_package_prefix() {
                Some(prefix) => {
                    let mut parents = vec![Arc::clone(owner_loader)];
                    for dependency in module_descriptor.dependencies.iter().filter(|d| d.config_file.is_none()) {
                        let target = built
                            .get(dependency.id.as_str())
                            .cloned()
                            .or_else(|| self.dependency_loader(set, &dependency.id));
                        match target {
                            Some(loader) => push_parent(&mut parents, loader, root),
                            None if dependency.optional => {}
                            None => log::error!(
                                "Module '{}': no classloader for dependency '{}', omitting it",
                                module.name,
                                dependency.id
                            ),
                        }
                    }
                    let mut visible: Vec<String> = vec![prefix.to_string()];
                    visible.extend(owner_prefixes.iter().cloned());
                    visible.extend(self.extras(&owner.id, &module.name));
                    self.factory.build(ClassLoaderSpec {
                        name: module.name.clone(),
                        class_path: owner.class_path.clone(),
                        parents,
                        visibility: ClassVisibility::only(visible),
                    })
                }
                None => {
                    let inferred = infer_package_prefixes(&module_descriptor.implementation_classes);
                    if inferred.is_empty() {
                        Arc::clone(owner_loader)
                    } else {
                        log::debug!("Module '{}' has inferred packages {:?}", module.name, inferred);
                        let mut visible = inferred;
                        visible.extend(self.extras(&owner.id, &module.name));
                        self.factory.build(ClassLoaderSpec {
                            name: module.name.clone(),
                            class_path: owner.class_path.clone(),
                            parents: vec![Arc::clone(owner_loader)],
                            visibility: ClassVisibility::only(visible),
                        })
                    }
                }
            };
            built.insert(module.name.as_str(), Arc::clone(&loader));
            modules.push((position, loader));
        }
        modules
    }

    fn extras(&self, owner: &str, module: &str) -> Vec<String> {
        [owner, module]
            .iter()
            .filter_map(|id| self.special_cases.get(*id))
            .flatten()
            .cloned()
            .collect()
    }

    /// The loader a dependency id links to; module ids resolve to the module's own loader
    fn dependency_loader(&self, set: &PluginSet, id: &str) -> Option<ClassLoaderHandle> {
        set.class_loader(id)
            .or_else(|| set.resolve_dependency(id).and_then(|d| d.class_loader().cloned()))
    }
}

fn push_parent(parents: &mut Vec<ClassLoaderHandle>, loader: ClassLoaderHandle, root: &ClassLoaderHandle) {
    if same_loader(&loader, root) || parents.iter().any(|p| same_loader(p, &loader)) {
        return;
    }
    parents.push(loader);
}

/// Gives a descriptor, its active sub-descriptors and its module descriptors one loader
fn share_loader(descriptor: &mut Descriptor, loader: &ClassLoaderHandle) {
    descriptor.set_class_loader(Arc::clone(loader));
    for dependency in descriptor.dependencies.iter_mut() {
        if let Some(sub) = dependency.sub_descriptor.as_deref_mut().filter(|s| !s.is_disabled_or_broken) {
            sub.set_class_loader(Arc::clone(loader));
        }
    }
    for module in descriptor.content.iter_mut() {
        if let Some(module_descriptor) = module.descriptor.as_deref_mut() {
            module_descriptor.set_class_loader(Arc::clone(loader));
        }
    }
}

fn apply(descriptor: &mut Descriptor, assignment: Assignment) {
    descriptor.set_class_loader(Arc::clone(&assignment.main));
    for position in assignment.sub_descriptors {
        if let Some(sub) = descriptor.dependencies[position].sub_descriptor.as_deref_mut() {
            sub.set_class_loader(Arc::clone(&assignment.main));
        }
    }
    for (position, loader) in assignment.modules {
        if let Some(module_descriptor) = descriptor.content[position].descriptor.as_deref_mut() {
            module_descriptor.set_class_loader(loader);
        }
    }
}
