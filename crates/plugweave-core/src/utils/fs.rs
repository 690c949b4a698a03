use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::kernel::constants::ARCHIVE_EXTENSION;

/// Entries of a directory sorted by file name. A missing directory has no entries.
pub fn list_dir_sorted<P: AsRef<Path>>(path: P) -> io::Result<Vec<PathBuf>> {
    let path = path.as_ref();
    if !path.is_dir() {
        return Ok(Vec::new());
    }
    let mut entries = Vec::new();
    for entry in fs::read_dir(path)? {
        entries.push(entry?.path());
    }
    entries.sort();
    Ok(entries)
}

/// Check if a path has the given extension, ignoring case
pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
}

/// Whether a path names a single-file plugin archive
pub fn is_archive(path: &Path) -> bool {
    path.is_file() && has_extension(path, ARCHIVE_EXTENSION)
}

/// Find files recursively in a directory that match a predicate, in sorted order
pub fn find_files<P, F>(path: P, predicate: &F) -> io::Result<Vec<PathBuf>>
where
    P: AsRef<Path>,
    F: Fn(&Path) -> bool + ?Sized,
{
    let mut result = Vec::new();
    let path = path.as_ref();

    if path.is_file() {
        if predicate(path) {
            result.push(path.to_path_buf());
        }
        return Ok(result);
    }

    for entry_path in list_dir_sorted(path)? {
        if entry_path.is_file() {
            if predicate(&entry_path) {
                result.push(entry_path);
            }
        } else if entry_path.is_dir() {
            result.append(&mut find_files(&entry_path, predicate)?);
        }
    }

    Ok(result)
}
