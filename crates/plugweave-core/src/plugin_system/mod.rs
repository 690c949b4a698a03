//! # Plugweave Plugin System
//!
//! Descriptor loading, aggregation and dependency resolution.
//!
//! ## Key Submodules and Responsibilities:
//!
//! - **[`descriptor`]** and **[`dependency`]**: the in-memory model of one manifest
//!   ([`Descriptor`]) and its dependency edges ([`Dependency`]).
//! - **[`version`]**: host build numbers, since/until ranges and plugin version ordering.
//! - **[`compat`]**: the [`CompatibilitySource`] capability (broken versions, host build).
//! - **[`loader`]**: discovery of manifests in precedence order and bounded parallel parsing.
//! - **[`load_result`]**: aggregation by id with version override and duplicate suppression.
//! - **[`plugin_set`]**: the dependency graph, enablement state machine and ordered [`PluginSet`].
//! - **[`manager`]**: the [`PluginManager`] pipeline tying all of the above to classloader wiring.
//! - **[`error`]**: [`PluginSystemError`] and the per-descriptor [`LoadError`] records.
pub mod compat;
pub mod dependency;
pub mod descriptor;
pub mod error;
pub mod load_result;
pub mod loader;
pub mod manager;
pub mod plugin_set;
pub mod version;

pub use compat::{CompatibilitySource, StaticCompatibility};
pub use dependency::{Dependency, DependencyError};
pub use descriptor::{ContentModule, Descriptor, DescriptorBuilder, DescriptorKind, DescriptorSource};
pub use error::{LoadError, PluginSystemError, Severity};
pub use load_result::LoadResult;
pub use loader::DescriptorLoader;
pub use manager::{DefaultPluginManager, LoadReport, PluginManager};
pub use plugin_set::{DependencyGraphBuilder, DisableReason, PluginSet, Selection};
pub use version::{BuildNumber, BuildRange};
