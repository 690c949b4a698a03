//! # Plugweave Plugin System Errors
//!
//! Defines error types specific to descriptor loading.
//!
//! [`PluginSystemError`] is the taxonomy every stage reports in: malformed
//! manifests, inclusion failures, unsatisfied dependencies, optional config
//! cycles, duplicate ids, and the one fatal case, a missing essential plugin. Per-descriptor
//! failures are recorded as [`LoadError`] entries instead of being raised.
use std::fmt;
use std::path::PathBuf;

use crate::manifest::document::DocumentError;
use crate::manifest::include::IncludeError;
use crate::plugin_system::dependency::DependencyError;

#[derive(Debug, thiserror::Error)]
pub enum PluginSystemError {
    #[error("Plugin manifest error for '{path}': {message}")]
    ParseError {
        path: PathBuf,
        message: String,
    },

    #[error("Inclusion failed: {0}")]
    Include(#[from] IncludeError),

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    #[error("Dependency resolution failed for '{plugin_id}': {source}")]
    Dependency {
        plugin_id: String,
        #[source]
        source: DependencyError,
    },

    #[error("Optional dependency cycle in '{plugin_id}': {}", .chain.join(" -> "))]
    OptionalConfigCycle {
        plugin_id: String,
        chain: Vec<String>,
    },

    #[error("Duplicate plugin id '{0}': all candidates were excluded")]
    DuplicateId(String),

    #[error("Essential plugin(s) missing or disabled: {}", .ids.join(", "))]
    EssentialPluginMissing {
        ids: Vec<String>,
    },

    #[error("Plugin '{plugin_id}' is incompatible: {reason}")]
    Incompatible {
        plugin_id: String,
        reason: String,
    },

    #[error("Plugin '{plugin_id}' declares no dependency on a platform module")]
    NoModuleDependency {
        plugin_id: String,
    },

    #[error("Loading has already been finished")]
    AlreadyFinished,
}

/// How serious a recorded load problem is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A structured, per-descriptor load problem for external reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadError {
    pub id: String,
    pub severity: Severity,
    pub message: String,
}

impl LoadError {
    pub fn error(id: &str, message: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            severity: Severity::Error,
            message: message.into(),
        }
    }

    pub fn warning(id: &str, message: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    pub fn from_error(id: &str, err: &PluginSystemError) -> Self {
        Self::error(id, err.to_string())
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.id, self.message)
    }
}
