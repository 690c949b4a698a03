use plugweave_core::classloader::ClassLoader;
use plugweave_core::plugin_system::{LoadReport, PluginSet};

/// Prints a load report to standard output.
///
/// Enabled plugins come first, in load order, then disabled plugins with the reason,
/// then every problem line.
pub fn print_report(set: &PluginSet, report: &LoadReport, show_loaders: bool) {
    println!("Enabled plugins ({}):", report.enabled.len());
    for id in &report.enabled {
        let Some(descriptor) = set.get(id) else { continue };
        let version = descriptor.version.as_deref().unwrap_or("-");
        if show_loaders {
            let parents: Vec<String> = descriptor
                .class_loader()
                .map(|loader| loader.parents().iter().map(|p| p.name().to_string()).collect())
                .unwrap_or_default();
            println!("  {} {} [parents: {}]", id, version, parents.join(", "));
        } else {
            println!("  {} {}", id, version);
        }
    }

    if !report.disabled.is_empty() {
        println!("Disabled plugins ({}):", report.disabled.len());
        for (id, reason) in &report.disabled {
            println!("  {}: {}", id, reason);
        }
    }

    for cycle in &report.cycles {
        println!("Dependency cycle: {}", cycle.join(" -> "));
    }

    let problems = report.error_messages();
    if !problems.is_empty() {
        println!("Problems ({}):", problems.len());
        for line in problems {
            println!("  {}", line);
        }
    }
}

/// Prints what a plugin depends on and what depends on it.
pub fn print_relations(id: &str, dependencies: &[String], dependents: &[String]) {
    println!("{}", id);
    println!("  requires: {}", list_or_none(dependencies));
    println!("  required by: {}", list_or_none(dependents));
}

fn list_or_none(ids: &[String]) -> String {
    if ids.is_empty() {
        "(none)".to_string()
    } else {
        ids.join(", ")
    }
}
