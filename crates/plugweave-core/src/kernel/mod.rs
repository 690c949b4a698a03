//! # Plugweave Kernel
//!
//! Shared foundations for the rest of the crate:
//!
//! - **Core Constants**: identifiers, file names and default directories used by
//!   discovery and persistence, in the `constants` submodule.
//! - **Error Handling**: the crate-wide [`Error`](error::Error) type and the
//!   `Result` alias in the `error` submodule. Subsystem errors convert into it
//!   with `?`.
pub mod constants;
pub mod error;

pub use error::{Error, Result};
