#![cfg(test)]

use std::collections::BTreeSet;
use std::fs;

use tempfile::tempdir;

use crate::kernel::error::Result;
use crate::storage::disabled::{read_disabled_ids, write_disabled_ids, PluginStateCache};

#[test]
fn test_missing_file_means_nothing_disabled() -> Result<()> {
    let temp = tempdir().unwrap();
    assert!(read_disabled_ids(&temp.path().join("disabled_plugins.txt"))?.is_empty());
    Ok(())
}

#[test]
fn test_write_sorts_and_trims() -> Result<()> {
    let temp = tempdir().unwrap();
    let path = temp.path().join("nested").join("disabled_plugins.txt");
    let ids = vec!["zeta".to_string(), " alpha ".to_string(), String::new(), "zeta".to_string()];
    write_disabled_ids(&path, ids.iter())?;

    assert_eq!(fs::read_to_string(&path).unwrap(), "alpha\nzeta\n");
    let expected: BTreeSet<String> = ["alpha", "zeta"].iter().map(|s| s.to_string()).collect();
    assert_eq!(read_disabled_ids(&path)?, expected);
    Ok(())
}

#[test]
fn test_read_ignores_blank_lines() -> Result<()> {
    let temp = tempdir().unwrap();
    let path = temp.path().join("disabled_plugins.txt");
    fs::write(&path, "\r\n  a  \r\n\n\tb\n").unwrap();
    let ids = read_disabled_ids(&path)?;
    assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec!["a", "b"]);
    Ok(())
}

#[test]
fn test_cache_enable_and_disable() -> Result<()> {
    let temp = tempdir().unwrap();
    let cache = PluginStateCache::new(temp.path().join("config"));

    assert!(cache.disable(["b", "a"])?);
    assert!(cache.is_disabled("a")?);
    assert_eq!(fs::read_to_string(cache.disabled_path()).unwrap(), "a\nb\n");

    assert!(cache.enable(["a", "missing"])?);
    assert!(!cache.enable(["missing"])?);
    assert!(!cache.is_disabled("a")?);

    let reopened = PluginStateCache::new(cache.config_dir());
    assert_eq!(reopened.disabled_ids()?.into_iter().collect::<Vec<_>>(), vec!["b"]);
    Ok(())
}

#[test]
fn test_broken_plugins_file() -> Result<()> {
    let temp = tempdir().unwrap();
    let cache = PluginStateCache::new(temp.path());
    assert!(cache.broken_plugins()?.is_empty());

    // Cached: the file written afterwards is not seen until invalidation.
    fs::write(cache.broken_path(), "# comment\n\na 1.0 1.1\na 2.0\nb 0.1\n").unwrap();
    assert!(!cache.is_broken_version("a", "1.0")?);
    cache.invalidate();

    let broken = cache.broken_plugins()?;
    assert_eq!(broken.len(), 2);
    assert_eq!(broken["a"].len(), 3);
    assert!(cache.is_broken_version("a", "2.0")?);
    assert!(cache.is_broken_version("b", "0.1")?);
    assert!(!cache.is_broken_version("b", "0.2")?);
    assert!(!cache.is_broken_version("c", "1.0")?);
    Ok(())
}
