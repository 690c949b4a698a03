use std::fmt;

use thiserror::Error;

use crate::kernel::constants::MODULE_DEPENDENCY_PREFIX;
use crate::plugin_system::descriptor::Descriptor;

/// Represents a dependency edge from a descriptor to a plugin or module id
#[derive(Debug, Clone)]
pub struct Dependency {
    /// The id of the required plugin or module
    pub id: String,

    /// Whether a missing or disabled target is tolerated
    pub optional: bool,

    /// Name of the manifest merged in when the dependency is present
    pub config_file: Option<String>,

    /// The merged manifest named by `config_file`, set once by the resolver
    pub sub_descriptor: Option<Box<Descriptor>>,
}

/// Error that can occur when resolving dependencies
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DependencyError {
    /// The required plugin was not found
    #[error("Required plugin not found: {0}")]
    MissingPlugin(String),

    /// The required plugin exists but is disabled
    #[error("Required plugin '{dependency}' is disabled: {reason}")]
    DisabledPlugin { dependency: String, reason: String },

    /// The required plugin exists but is not compatible with this host
    #[error("Required plugin '{dependency}' is incompatible: {reason}")]
    IncompatiblePlugin { dependency: String, reason: String },

    /// Dependency cycle detected
    #[error("Circular dependency detected: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),

    /// The required id is claimed by more than one plugin
    #[error("Required id '{0}' is declared by more than one plugin")]
    AmbiguousPlugin(String),
}

impl Dependency {
    /// Create a new required dependency
    pub fn required(id: &str) -> Self {
        Self {
            id: id.to_string(),
            optional: false,
            config_file: None,
            sub_descriptor: None,
        }
    }

    /// Create a new optional dependency
    pub fn optional(id: &str) -> Self {
        Self {
            id: id.to_string(),
            optional: true,
            config_file: None,
            sub_descriptor: None,
        }
    }

    /// Attach the name of the manifest to merge when the dependency is present
    pub fn with_config_file(mut self, config_file: &str) -> Self {
        self.config_file = Some(config_file.to_string());
        self
    }

    /// Whether this edge targets the module-aware compatibility model
    pub fn is_module_dependency(&self) -> bool {
        self.id.starts_with(MODULE_DEPENDENCY_PREFIX)
    }

    /// The resolved sub-descriptor, unless it was excluded because its target is unavailable
    pub fn active_sub_descriptor(&self) -> Option<&Descriptor> {
        self.sub_descriptor
            .as_deref()
            .filter(|sub| !sub.is_disabled_or_broken)
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let requirement_type = if self.optional { "Optional" } else { "Requires" };
        match &self.config_file {
            Some(file) => write!(f, "{} plugin: {} (config: {})", requirement_type, self.id, file),
            None => write!(f, "{} plugin: {}", requirement_type, self.id),
        }
    }
}
