use std::path::PathBuf;
use std::sync::Arc;

use crate::classloader::ClassLoaderHandle;
use crate::manifest::document::DocumentLocation;
use crate::plugin_system::dependency::Dependency;
use crate::plugin_system::version::BuildRange;

/// What a descriptor describes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorKind {
    /// A top-level plugin manifest
    Plugin,
    /// The manifest merged in through an optional dependency's config file
    SubDescriptor { config_file: String },
    /// A content module declared by the plugin `owner`
    ContentModule { owner: String },
}

/// Where discovery found a descriptor, in scan order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DescriptorSource {
    /// Built in code rather than discovered
    Synthetic,
    /// A manifest embedded in a classpath root
    Classpath,
    /// The user-writable plugins directory
    Custom,
    /// The read-only bundled plugins directory
    Bundled,
    /// The out-of-band plugin path list
    PathList,
}

/// A sub-module declared by a plugin
#[derive(Debug, Clone)]
pub struct ContentModule {
    /// Module name, also its id in the plugin id space
    pub name: String,

    /// Package prefix confining the module's classes
    pub package_prefix: Option<String>,

    /// Folded in implicitly rather than declared by a `content` entry
    pub is_injected: bool,

    /// The module's own manifest, when one was found
    pub descriptor: Option<Box<Descriptor>>,
}

impl ContentModule {
    pub fn new(name: &str, package_prefix: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            package_prefix: package_prefix.map(str::to_string),
            is_injected: false,
            descriptor: None,
        }
    }

    /// Package prefix of the entry, falling back to the module manifest's own
    pub fn effective_package_prefix(&self) -> Option<&str> {
        self.package_prefix
            .as_deref()
            .or_else(|| self.descriptor.as_ref().and_then(|d| d.package_prefix.as_deref()))
    }
}

/// In-memory representation of one plugin manifest, optional sub-descriptor or content module
#[derive(Debug, Clone)]
pub struct Descriptor {
    /// Unique identifier
    pub id: String,

    /// Human-readable name
    pub name: Option<String>,

    pub version: Option<String>,
    pub vendor: Option<String>,
    pub resource_bundle: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,

    /// Compatible host builds
    pub build_range: BuildRange,

    /// Dependency edges, in declaration order
    pub dependencies: Vec<Dependency>,

    /// Declared content modules, in declaration order
    pub content: Vec<ContentModule>,

    /// Namespace this descriptor's classes are confined to
    pub package_prefix: Option<String>,

    /// Legacy module ids this plugin provides
    pub modules: Vec<String>,

    /// Implementation class names from extension and service declarations
    pub implementation_classes: Vec<Arc<str>>,

    /// Class path entries of the plugin
    pub class_path: Vec<PathBuf>,

    pub kind: DescriptorKind,
    pub source: DescriptorSource,

    /// Document this descriptor was read from
    pub location: Option<DocumentLocation>,

    pub enabled: bool,
    pub incomplete: bool,
    pub use_core_class_loader: bool,

    /// Set on sub-descriptors and content modules whose dependency target is unavailable
    pub is_disabled_or_broken: bool,

    bundled: bool,
    class_loader: Option<ClassLoaderHandle>,
}

impl Descriptor {
    /// Create a new plugin descriptor
    pub fn new(id: &str, bundled: bool) -> Self {
        Self {
            id: id.to_string(),
            name: None,
            version: None,
            vendor: None,
            resource_bundle: None,
            category: None,
            description: None,
            build_range: BuildRange::default(),
            dependencies: Vec::new(),
            content: Vec::new(),
            package_prefix: None,
            modules: Vec::new(),
            implementation_classes: Vec::new(),
            class_path: Vec::new(),
            kind: DescriptorKind::Plugin,
            source: DescriptorSource::Synthetic,
            location: None,
            enabled: true,
            incomplete: false,
            use_core_class_loader: false,
            is_disabled_or_broken: false,
            bundled,
            class_loader: None,
        }
    }

    pub fn is_bundled(&self) -> bool {
        self.bundled
    }

    /// Name for messages: the declared name, or the id
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn class_loader(&self) -> Option<&ClassLoaderHandle> {
        self.class_loader.as_ref()
    }

    /// Attach a classloader. The slot is write-once: returns `false` and keeps the
    /// existing loader when one is already attached.
    pub fn set_class_loader(&mut self, loader: ClassLoaderHandle) -> bool {
        if self.class_loader.is_some() {
            return false;
        }
        self.class_loader = Some(loader);
        true
    }

    pub fn hard_dependencies(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies.iter().filter(|d| !d.optional)
    }

    pub fn optional_dependencies(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies.iter().filter(|d| d.optional)
    }

    /// Ids this descriptor registers besides its own: content modules and legacy modules
    pub fn provided_module_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.content.iter().map(|m| m.name.clone()).collect();
        for module in &self.modules {
            if !ids.contains(module) {
                ids.push(module.clone());
            }
        }
        ids
    }

    /// Package prefixes of the content modules declared by this descriptor
    pub fn content_package_prefixes(&self) -> Vec<String> {
        self.content
            .iter()
            .filter_map(|m| m.effective_package_prefix().map(str::to_string))
            .collect()
    }

    pub fn content_module(&self, name: &str) -> Option<&ContentModule> {
        self.content.iter().find(|m| m.name == name)
    }

    /// Whether any declared dependency targets the module-aware compatibility model
    pub fn declares_module_dependency(&self) -> bool {
        self.dependencies.iter().any(Dependency::is_module_dependency)
    }

    /// Directory of the manifest this descriptor came from
    pub fn base_dir(&self) -> Option<String> {
        self.location.as_ref().map(DocumentLocation::parent_dir)
    }
}

/// Builder for creating a descriptor in code
pub struct DescriptorBuilder {
    descriptor: Descriptor,
}

impl DescriptorBuilder {
    /// Create a new builder for a non-bundled plugin
    pub fn new(id: &str) -> Self {
        Self {
            descriptor: Descriptor::new(id, false),
        }
    }

    /// Create a new builder for a bundled plugin
    pub fn bundled(id: &str) -> Self {
        Self {
            descriptor: Descriptor::new(id, true),
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.descriptor.name = Some(name.to_string());
        self
    }

    pub fn version(mut self, version: &str) -> Self {
        self.descriptor.version = Some(version.to_string());
        self
    }

    pub fn vendor(mut self, vendor: &str) -> Self {
        self.descriptor.vendor = Some(vendor.to_string());
        self
    }

    pub fn category(mut self, category: &str) -> Self {
        self.descriptor.category = Some(category.to_string());
        self
    }

    pub fn build_range(mut self, since: Option<&str>, until: Option<&str>) -> Self {
        self.descriptor.build_range = BuildRange::new(since, until);
        self
    }

    /// Add a required dependency
    pub fn depends_on(mut self, id: &str) -> Self {
        self.descriptor.dependencies.push(Dependency::required(id));
        self
    }

    /// Add an optional dependency
    pub fn optionally_depends_on(mut self, id: &str) -> Self {
        self.descriptor.dependencies.push(Dependency::optional(id));
        self
    }

    /// Add a fully specified dependency
    pub fn dependency(mut self, dependency: Dependency) -> Self {
        self.descriptor.dependencies.push(dependency);
        self
    }

    pub fn package_prefix(mut self, prefix: &str) -> Self {
        self.descriptor.package_prefix = Some(prefix.to_string());
        self
    }

    pub fn content_module(mut self, module: ContentModule) -> Self {
        self.descriptor.content.push(module);
        self
    }

    /// Declare a legacy module id provided by this plugin
    pub fn module(mut self, id: &str) -> Self {
        self.descriptor.modules.push(id.to_string());
        self
    }

    pub fn implementation_class(mut self, class_name: &str) -> Self {
        self.descriptor.implementation_classes.push(Arc::from(class_name));
        self
    }

    pub fn class_path_entry(mut self, entry: impl Into<PathBuf>) -> Self {
        self.descriptor.class_path.push(entry.into());
        self
    }

    pub fn source(mut self, source: DescriptorSource) -> Self {
        self.descriptor.source = source;
        self
    }

    pub fn kind(mut self, kind: DescriptorKind) -> Self {
        self.descriptor.kind = kind;
        self
    }

    pub fn use_core_class_loader(mut self, value: bool) -> Self {
        self.descriptor.use_core_class_loader = value;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.descriptor.enabled = enabled;
        self
    }

    /// Build the descriptor
    pub fn build(self) -> Descriptor {
        self.descriptor
    }
}
