//! File system helpers used by plugin discovery.
pub mod fs;

pub use fs::{find_files, has_extension, is_archive, list_dir_sorted};

#[cfg(test)]
mod tests;
