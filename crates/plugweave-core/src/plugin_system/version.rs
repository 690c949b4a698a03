use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use semver::Version;

/// Error type for version parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    InvalidFormat,
    ParseError(String),
}

impl fmt::Display for VersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionError::InvalidFormat => write!(f, "Invalid version format"),
            VersionError::ParseError(msg) => write!(f, "Version parse error: {}", msg),
        }
    }
}

impl std::error::Error for VersionError {}

/// Component value used for `*` and `SNAPSHOT` build components.
const WILDCARD: u32 = u32::MAX;

/// A host build number such as `IC-233.11799.30`, `233.*` or `233.SNAPSHOT`.
///
/// Components compare numerically, missing trailing components count as zero and a
/// wildcard (or `SNAPSHOT`) component compares greater than any concrete value, so
/// `until = 233.*` admits every `233.x` build. A `since` bound is compared through its
/// [`lowest_match`](Self::lowest_match), so `since = 233.*` admits them too. The product
/// code does not take part in comparisons.
#[derive(Debug, Clone)]
pub struct BuildNumber {
    product_code: Option<String>,
    components: Vec<u32>,
}

impl BuildNumber {
    pub fn new(components: Vec<u32>) -> Self {
        Self { product_code: None, components }
    }

    pub fn with_product_code(mut self, code: &str) -> Self {
        self.product_code = Some(code.to_string());
        self
    }

    /// Parses a build number, accepting an optional `XX-` product code prefix.
    pub fn parse(raw: &str) -> Result<Self, VersionError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(VersionError::InvalidFormat);
        }

        let (product_code, number) = match raw.split_once('-') {
            Some((code, rest)) if !code.is_empty() && code.chars().all(|c| c.is_ascii_alphabetic()) => {
                (Some(code.to_string()), rest)
            }
            _ => (None, raw),
        };

        let components = number
            .split('.')
            .map(|part| match part {
                "*" | "SNAPSHOT" => Ok(WILDCARD),
                _ => part
                    .parse::<u32>()
                    .map_err(|e| VersionError::ParseError(format!("'{}' in build number '{}': {}", part, raw, e))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { product_code, components })
    }

    pub fn components(&self) -> &[u32] {
        &self.components
    }

    pub fn product_code(&self) -> Option<&str> {
        self.product_code.as_deref()
    }

    /// Development builds end in a wildcard component; `until` bounds do not apply to them.
    pub fn is_snapshot(&self) -> bool {
        self.components.last() == Some(&WILDCARD)
    }

    /// The lowest concrete build this number matches: components from the first
    /// wildcard on count as zero.
    pub fn lowest_match(&self) -> BuildNumber {
        Self {
            product_code: self.product_code.clone(),
            components: self.components.iter().copied().take_while(|c| *c != WILDCARD).collect(),
        }
    }
}

impl Ord for BuildNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());
        for i in 0..len {
            let a = self.components.get(i).copied().unwrap_or(0);
            let b = other.components.get(i).copied().unwrap_or(0);
            // A wildcard matches any value at its position and everything after it.
            if a == WILDCARD || b == WILDCARD {
                return if a == b { Ordering::Equal } else if a == WILDCARD { Ordering::Greater } else { Ordering::Less };
            }
            match a.cmp(&b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }
}

impl PartialEq for BuildNumber {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for BuildNumber {}

impl PartialOrd for BuildNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for BuildNumber {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BuildNumber::parse(s)
    }
}

impl fmt::Display for BuildNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = &self.product_code {
            write!(f, "{}-", code)?;
        }
        let parts: Vec<String> = self
            .components
            .iter()
            .map(|c| if *c == WILDCARD { "*".to_string() } else { c.to_string() })
            .collect();
        write!(f, "{}", parts.join("."))
    }
}

/// The `since`/`until` build range a descriptor declares.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildRange {
    pub since: Option<String>,
    pub until: Option<String>,
}

impl BuildRange {
    pub fn new(since: Option<&str>, until: Option<&str>) -> Self {
        Self {
            since: since.map(str::to_string),
            until: until.map(str::to_string),
        }
    }

    /// Checks `since <= build` and `until >= build`.
    ///
    /// Returns a human-readable reason when `build` lies outside the range.
    /// Unparsable bounds are reported as incompatibilities rather than ignored.
    pub fn check(&self, build: &BuildNumber) -> Result<(), String> {
        if let Some(since) = self.since.as_deref().filter(|s| !s.trim().is_empty()) {
            let since_build = BuildNumber::parse(since).map_err(|e| format!("invalid since-build '{}': {}", since, e))?;
            if since_build.lowest_match() > *build {
                return Err(format!("requires build {} or newer, host is {}", since_build, build));
            }
        }
        if let Some(until) = self.until.as_deref().filter(|s| !s.trim().is_empty()) {
            if build.is_snapshot() {
                return Ok(());
            }
            let until_build = BuildNumber::parse(until).map_err(|e| format!("invalid until-build '{}': {}", until, e))?;
            if until_build < *build {
                return Err(format!("supports builds up to {}, host is {}", until_build, build));
            }
        }
        Ok(())
    }

    pub fn is_compatible_with(&self, build: &BuildNumber) -> bool {
        self.check(build).is_ok()
    }
}

/// Compares two plugin version strings.
///
/// Both strings are compared as `semver` versions when they parse as such. Otherwise
/// they are split on `.`, `-` and `_` and compared component by component: numeric
/// components numerically, a numeric component ranks above a textual one, textual
/// components compare case-insensitively, and a longer version wins a shared prefix
/// (`1.0.1 > 1.0`) unless its extra components are all zero (`1.0.0 == 1.0`). Absent versions rank below any present version.
pub fn compare_versions(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => {
            if let (Ok(va), Ok(vb)) = (Version::parse(a), Version::parse(b)) {
                return va.cmp(&vb);
            }
            compare_version_components(a, b)
        }
    }
}

fn compare_version_components(a: &str, b: &str) -> Ordering {
    let split = |s: &str| -> Vec<String> {
        s.split(['.', '-', '_'])
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect()
    };
    let left = split(a);
    let right = split(b);

    for (l, r) in left.iter().zip(right.iter()) {
        let ordering = match (l.parse::<u64>(), r.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            (Ok(_), Err(_)) => Ordering::Greater,
            (Err(_), Ok(_)) => Ordering::Less,
            (Err(_), Err(_)) => l.to_lowercase().cmp(&r.to_lowercase()),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    let shorter = left.len().min(right.len());
    let tail = if left.len() > right.len() { &left[shorter..] } else { &right[shorter..] };
    if tail.iter().all(|part| part.parse::<u64>() == Ok(0)) {
        return Ordering::Equal;
    }
    left.len().cmp(&right.len())
}
