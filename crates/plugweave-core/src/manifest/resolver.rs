//! Turns raw manifest trees into merged descriptors.
//!
//! Resolution runs in three steps: include directives are expanded, the tree is read
//! into a [`Descriptor`], then the config files of optional dependencies and the
//! manifests of content modules are loaded and attached to it.
use crate::manifest::document::{DocumentError, DocumentLoader, DocumentLocation, LoadingContext};
use crate::manifest::element::Element;
use crate::manifest::include::IncludeResolver;
use crate::manifest::reader;
use crate::plugin_system::descriptor::{ContentModule, Descriptor, DescriptorKind, DescriptorSource};
use crate::plugin_system::error::PluginSystemError;

type Result<T> = std::result::Result<T, PluginSystemError>;

/// Failure tolerance, decided before a load starts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverOptions {
    /// Log and skip include targets that are missing and have no fallback
    pub tolerate_missing_includes: bool,
    /// Leave sub-descriptors and module descriptors unset when their file is missing
    pub tolerate_missing_sub_descriptors: bool,
}

/// Fields a sub-descriptor takes over from its root plugin
struct RootInfo {
    id: String,
    version: Option<String>,
    vendor: Option<String>,
    resource_bundle: Option<String>,
    source: DescriptorSource,
    bundled: bool,
}

impl RootInfo {
    fn of(descriptor: &Descriptor) -> Self {
        Self {
            id: descriptor.id.clone(),
            version: descriptor.version.clone(),
            vendor: descriptor.vendor.clone(),
            resource_bundle: descriptor.resource_bundle.clone(),
            source: descriptor.source,
            bundled: descriptor.is_bundled(),
        }
    }
}

pub struct ManifestResolver<'a> {
    loader: &'a dyn DocumentLoader,
    context: &'a LoadingContext,
    options: ResolverOptions,
}

impl<'a> ManifestResolver<'a> {
    pub fn new(loader: &'a dyn DocumentLoader, context: &'a LoadingContext, options: ResolverOptions) -> Self {
        Self {
            loader,
            context,
            options,
        }
    }

    fn includes(&self) -> IncludeResolver<'_> {
        IncludeResolver::new(self.loader, self.context).tolerate_missing(self.options.tolerate_missing_includes)
    }

    /// Loads the manifest at `location` and resolves it.
    pub fn load(&self, location: &DocumentLocation, source: DescriptorSource, bundled: bool) -> Result<Descriptor> {
        let raw = self.loader.load(self.context, location)?;
        self.resolve(raw, location, source, bundled)
    }

    /// Resolves an already loaded manifest tree.
    pub fn resolve(
        &self,
        raw: Element,
        location: &DocumentLocation,
        source: DescriptorSource,
        bundled: bool,
    ) -> Result<Descriptor> {
        let resolved = self.includes().resolve(raw, location)?;
        let mut descriptor = reader::read_plugin(&resolved, Some(location), bundled)?;
        descriptor.source = source;
        rebase_class_path(&mut descriptor, location);

        let root = RootInfo::of(&descriptor);
        let mut visited = vec![location.clone()];
        self.resolve_optional_configs(&mut descriptor, location, &root, &mut visited)?;
        self.resolve_content_modules(&mut descriptor, location, &root)?;
        Ok(descriptor)
    }

    fn load_optional(&self, location: &DocumentLocation, what: &str, owner: &str) -> Result<Option<Element>> {
        match self.loader.load(self.context, location) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.is_not_found() && self.options.tolerate_missing_sub_descriptors => {
                log::warn!("Plugin '{}': {} '{}' not found, skipping", owner, what, location);
                Ok(None)
            }
            Err(DocumentError::NotFound { location }) => Err(PluginSystemError::ParseError {
                path: location.into(),
                message: format!("{} of plugin '{}' not found", what, owner),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn resolve_optional_configs(
        &self,
        descriptor: &mut Descriptor,
        owner_location: &DocumentLocation,
        root: &RootInfo,
        visited: &mut Vec<DocumentLocation>,
    ) -> Result<()> {
        for dependency in descriptor.dependencies.iter_mut() {
            let Some(config_file) = dependency.config_file.clone() else {
                continue;
            };
            if dependency.sub_descriptor.is_some() {
                continue;
            }
            let location = owner_location.resolve_config_file(&config_file);
            if visited.contains(&location) {
                let mut chain: Vec<String> = visited.iter().map(|l| l.path.clone()).collect();
                chain.push(location.path.clone());
                return Err(PluginSystemError::OptionalConfigCycle {
                    plugin_id: root.id.clone(),
                    chain,
                });
            }
            let Some(raw) = self.load_optional(&location, "optional dependency config", &root.id)? else {
                continue;
            };
            let resolved = self.includes().resolve(raw, &location)?;

            let mut sub = Descriptor::new(&root.id, root.bundled);
            sub.kind = DescriptorKind::SubDescriptor {
                config_file: config_file.clone(),
            };
            sub.source = root.source;
            sub.location = Some(location.clone());
            reader::read_into(&resolved, &mut sub);
            sub.id = root.id.clone();
            inherit(&mut sub.version, &root.version);
            inherit(&mut sub.vendor, &root.vendor);
            inherit(&mut sub.resource_bundle, &root.resource_bundle);

            visited.push(location.clone());
            let nested = self.resolve_optional_configs(&mut sub, &location, root, visited);
            visited.pop();
            nested?;

            dependency.sub_descriptor = Some(Box::new(sub));
        }
        Ok(())
    }

    fn resolve_content_modules(&self, descriptor: &mut Descriptor, location: &DocumentLocation, root: &RootInfo) -> Result<()> {
        for module in descriptor.content.iter_mut() {
            if module.is_injected || module.descriptor.is_some() {
                continue;
            }
            let module_location = location.resolve(&format!("{}.json", module.name));
            let Some(raw) = self.load_optional(&module_location, "content module descriptor", &root.id)? else {
                continue;
            };
            let resolved = self.includes().resolve(raw, &module_location)?;
            let mut module_descriptor = Descriptor::new(&module.name, root.bundled);
            module_descriptor.kind = DescriptorKind::ContentModule { owner: root.id.clone() };
            module_descriptor.source = root.source;
            module_descriptor.location = Some(module_location);
            reader::read_into(&resolved, &mut module_descriptor);
            module_descriptor.id = module.name.clone();
            if module.package_prefix.is_none() {
                module.package_prefix = module_descriptor.package_prefix.clone();
            }
            module.descriptor = Some(Box::new(module_descriptor));
        }

        // Legacy module declarations are tracked as injected content modules.
        let legacy: Vec<String> = descriptor
            .modules
            .iter()
            .filter(|m| descriptor.content_module(m).is_none())
            .cloned()
            .collect();
        for name in legacy {
            let mut module = ContentModule::new(&name, None);
            module.is_injected = true;
            descriptor.content.push(module);
        }
        Ok(())
    }
}

fn inherit(slot: &mut Option<String>, from: &Option<String>) {
    if slot.is_none() {
        slot.clone_from(from);
    }
}

/// Anchors relative class path entries at the base root; a descriptor that declares
/// none gets the base itself.
fn rebase_class_path(descriptor: &mut Descriptor, location: &DocumentLocation) {
    let root = location.base.root();
    if descriptor.class_path.is_empty() {
        descriptor.class_path.push(root.to_path_buf());
        return;
    }
    for entry in descriptor.class_path.iter_mut() {
        if entry.is_relative() {
            *entry = root.join(&*entry);
        }
    }
}
