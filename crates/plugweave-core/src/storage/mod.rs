//! # Plugweave Storage
//!
//! On-disk state around a load: loader settings ([`config`]) and the plugin state
//! files in the config directory ([`disabled`]).
pub mod config;
pub mod disabled;
pub mod error;

pub use config::{ConfigFormat, IsolationSettings, LoaderSettings};
pub use disabled::{read_disabled_ids, write_disabled_ids, PluginStateCache};
pub use error::StorageSystemError;

#[cfg(test)]
mod tests;
