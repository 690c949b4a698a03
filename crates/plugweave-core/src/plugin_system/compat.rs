use std::collections::{HashMap, HashSet};

use crate::plugin_system::version::BuildNumber;

/// Product-specific compatibility data consumed by the loader
pub trait CompatibilitySource: Send + Sync {
    /// Whether `id` is blacklisted for the given version
    fn is_broken(&self, id: &str, version: Option<&str>) -> bool;

    /// The running host build
    fn build_number(&self) -> BuildNumber;
}

/// Broken plugin versions, keyed by plugin id
pub type BrokenPlugins = HashMap<String, HashSet<String>>;

/// Parses the broken-plugins list: one `<id> <version>...` entry per line.
///
/// Blank lines and lines starting with `#` are ignored; an id may list several
/// versions on one line or across lines.
pub fn parse_broken_plugins(content: &str) -> BrokenPlugins {
    let mut broken = BrokenPlugins::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let Some(id) = tokens.next() else { continue };
        broken.entry(id.to_string()).or_default().extend(tokens.map(str::to_string));
    }
    broken
}

/// A fixed build number and broken-plugins table
#[derive(Debug, Clone)]
pub struct StaticCompatibility {
    build: BuildNumber,
    broken: BrokenPlugins,
}

impl StaticCompatibility {
    pub fn new(build: BuildNumber) -> Self {
        Self {
            build,
            broken: BrokenPlugins::new(),
        }
    }

    pub fn with_broken(mut self, id: &str, version: &str) -> Self {
        self.broken
            .entry(id.to_string())
            .or_default()
            .insert(version.to_string());
        self
    }

    pub fn with_broken_plugins(mut self, broken: BrokenPlugins) -> Self {
        for (id, versions) in broken {
            self.broken.entry(id).or_default().extend(versions);
        }
        self
    }
}

impl Default for StaticCompatibility {
    /// A snapshot build that accepts every range
    fn default() -> Self {
        Self::new(BuildNumber::new(vec![u32::MAX]))
    }
}

impl CompatibilitySource for StaticCompatibility {
    fn is_broken(&self, id: &str, version: Option<&str>) -> bool {
        match (self.broken.get(id), version) {
            (Some(versions), Some(version)) => versions.contains(version),
            _ => false,
        }
    }

    fn build_number(&self) -> BuildNumber {
        self.build.clone()
    }
}
