//! Plugin descriptor loading, dependency resolution and classloader wiring.
//!
//! The pipeline runs in one direction: manifests are discovered and resolved into
//! [`Descriptor`]s ([`manifest`]), aggregated by id ([`plugin_system::LoadResult`]),
//! ordered and filtered into a [`PluginSet`], and finally given classloaders by the
//! [`classloader::ClassLoaderConfigurator`]. [`DefaultPluginManager`] runs all of it.
pub mod classloader;
pub mod kernel;
pub mod manifest;
pub mod plugin_system;
pub mod storage;
pub mod utils;

pub use kernel::error::{Error, Result};
pub use plugin_system::{Descriptor, DefaultPluginManager, LoadReport, PluginManager, PluginSet};
pub use storage::LoaderSettings;

#[cfg(test)]
mod tests;
