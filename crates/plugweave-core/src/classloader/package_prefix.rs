//! Guessing the packages a content module lives in from its implementation class names.

/// Minimum depth a common package needs before it alone is trusted as the prefix
const MIN_COMMON_SEGMENTS: usize = 3;

/// Infers visibility entries from fully qualified class names.
///
/// Nested names (`a.b.Outer$Inner`) are kept verbatim; trimming them to a package
/// could name a package that does not exist. Plain names contribute their package.
/// When all packages share a common package at least three segments deep, that
/// package replaces them; otherwise packages nested in another listed package are
/// dropped. The result is sorted and free of duplicates.
pub fn infer_package_prefixes<S: AsRef<str>>(class_names: &[S]) -> Vec<String> {
    let mut verbatim: Vec<String> = Vec::new();
    let mut packages: Vec<&str> = Vec::new();

    for name in class_names {
        let name = name.as_ref().trim();
        if name.is_empty() {
            continue;
        }
        if name.contains('$') {
            verbatim.push(name.to_string());
            continue;
        }
        match name.rfind('.') {
            Some(idx) => packages.push(&name[..idx]),
            None => verbatim.push(name.to_string()),
        }
    }

    let mut result: Vec<String> = match common_package(&packages) {
        Some(common) if segment_count(common) >= MIN_COMMON_SEGMENTS => vec![common.to_string()],
        _ => collapse(packages),
    };

    result.extend(verbatim);
    result.sort();
    result.dedup();
    result
}

fn segment_count(package: &str) -> usize {
    package.split('.').count()
}

fn is_within(package: &str, ancestor: &str) -> bool {
    package == ancestor
        || package
            .strip_prefix(ancestor)
            .is_some_and(|rest| rest.starts_with('.'))
}

fn common_package<'a>(packages: &[&'a str]) -> Option<&'a str> {
    let (first, rest) = packages.split_first()?;
    let mut common: &str = first;
    for package in rest {
        while !is_within(package, common) {
            common = &common[..common.rfind('.')?];
        }
    }
    Some(common)
}

fn collapse(mut packages: Vec<&str>) -> Vec<String> {
    packages.sort_unstable();
    packages.dedup();
    let mut kept: Vec<&str> = Vec::new();
    for package in packages {
        // sorted order puts every ancestor before its descendants
        if !kept.iter().any(|ancestor| is_within(package, ancestor)) {
            kept.push(package);
        }
    }
    kept.into_iter().map(str::to_string).collect()
}
