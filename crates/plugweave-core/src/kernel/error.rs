//! # Plugweave Kernel Errors
//!
//! Defines the crate-wide [`Error`] type. Every subsystem keeps its own typed
//! error enum (plugin system, manifest documents, storage) and converts into
//! this one through `#[from]`, so pipeline code can use `?` across layers.
use std::path::PathBuf;
use std::result::Result as StdResult;

use thiserror::Error as ThisError;

use crate::manifest::document::DocumentError;
use crate::plugin_system::error::PluginSystemError;
use crate::storage::error::StorageSystemError;

/// Custom error type for the plugin loading engine
#[derive(Debug, ThisError)]
pub enum Error {
    /// Specific, typed plugin system error
    #[error("Plugin system error: {0}")]
    PluginSystem(#[from] PluginSystemError),

    /// Document loading failed outside of any descriptor context
    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    /// Specific, typed storage system error
    #[error("Storage system error: {0}")]
    StorageSystem(#[from] StorageSystemError),

    /// A background parsing task could not be joined
    #[error("Worker task failed: {0}")]
    Worker(String),

    /// Generic error with message
    #[error("Error: {0}")]
    Other(String),
}

/// Shorthand for Result with our Error type
pub type Result<T> = StdResult<T, Error>;

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Worker(err.to_string())
    }
}

// Helper to create an I/O error with context, wraps StorageSystemError::Io
impl Error {
    pub fn io(source: std::io::Error, operation: impl Into<String>, path: PathBuf) -> Self {
        Error::StorageSystem(StorageSystemError::Io {
            source,
            operation: operation.into(),
            path,
        })
    }

    /// Whether the load must abort (only a missing essential plugin does).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::PluginSystem(PluginSystemError::EssentialPluginMissing { .. })
        )
    }
}
