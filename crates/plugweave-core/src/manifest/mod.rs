//! # Plugweave Manifest Resolution
//!
//! Reading plugin manifests into [`Descriptor`](crate::plugin_system::Descriptor)s.
//!
//! - **[`element`]**: the raw manifest tree handed over by a document loader.
//! - **[`document`]**: document locations, the [`DocumentLoader`] capability and the
//!   per-load [`LoadingContext`] that caches opened archives.
//! - **[`include`]**: expansion of `include` directives with fallbacks and cycle detection.
//! - **[`reader`]**: maps a resolved tree onto descriptor fields.
//! - **[`resolver`]**: the [`ManifestResolver`], which ties the above together and
//!   attaches optional-dependency sub-descriptors and content module descriptors.
pub mod document;
pub mod element;
pub mod include;
pub mod reader;
pub mod resolver;

pub use document::{Base, DocumentError, DocumentLoader, DocumentLocation, FsDocumentLoader, LoadingContext};
pub use element::Element;
pub use include::{IncludeError, IncludeResolver};
pub use resolver::{ManifestResolver, ResolverOptions};
