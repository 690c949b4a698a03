#![cfg(test)]

use std::fs::{self, File};
use std::path::Path;

use tempfile::tempdir;

use crate::utils::fs::{find_files, has_extension, is_archive, list_dir_sorted};

#[test]
fn test_list_dir_sorted() {
    let temp_dir = tempdir().unwrap();
    let base_path = temp_dir.path();
    for name in ["c", "a.jar", "b"] {
        File::create(base_path.join(name)).unwrap();
    }
    fs::create_dir(base_path.join("a")).unwrap();

    let names: Vec<String> = list_dir_sorted(base_path)
        .unwrap()
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["a", "a.jar", "b", "c"]);

    // Missing directories have no entries
    assert!(list_dir_sorted(base_path.join("absent")).unwrap().is_empty());
    assert!(list_dir_sorted(base_path.join("c")).unwrap().is_empty());
}

#[test]
fn test_extension_checks() {
    assert!(has_extension(Path::new("lib/x.JAR"), "jar"));
    assert!(!has_extension(Path::new("lib/x.jar.bak"), "jar"));
    assert!(!has_extension(Path::new("lib/jar"), "jar"));

    let temp_dir = tempdir().unwrap();
    let archive = temp_dir.path().join("plugin.jar");
    assert!(!is_archive(&archive));
    File::create(&archive).unwrap();
    assert!(is_archive(&archive));

    let dir_named_like_archive = temp_dir.path().join("dir.jar");
    fs::create_dir(&dir_named_like_archive).unwrap();
    assert!(!is_archive(&dir_named_like_archive));
}

#[test]
fn test_find_files_recurses_in_order() {
    let temp_dir = tempdir().unwrap();
    let base_path = temp_dir.path();
    let nested = base_path.join("sub1").join("deeper");
    fs::create_dir_all(&nested).unwrap();
    fs::create_dir(base_path.join("sub2")).unwrap();

    File::create(base_path.join("z.jar")).unwrap();
    File::create(base_path.join("notes.txt")).unwrap();
    File::create(nested.join("b.jar")).unwrap();
    File::create(base_path.join("sub2").join("a.jar")).unwrap();

    let found = find_files(base_path, &|p: &Path| is_archive(p)).unwrap();
    let relative: Vec<String> = found
        .iter()
        .map(|p| p.strip_prefix(base_path).unwrap().to_string_lossy().replace('\\', "/"))
        .collect();
    assert_eq!(relative, vec!["sub1/deeper/b.jar", "sub2/a.jar", "z.jar"]);

    // A single file is matched against the predicate directly
    let single = find_files(base_path.join("z.jar"), &|p: &Path| is_archive(p)).unwrap();
    assert_eq!(single.len(), 1);
    assert!(find_files(base_path.join("absent"), &|p: &Path| is_archive(p)).unwrap().is_empty());
}
