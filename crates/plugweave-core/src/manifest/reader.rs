//! Maps a resolved manifest tree onto a [`Descriptor`].
use std::cell::RefCell;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::manifest::document::DocumentLocation;
use crate::manifest::element::Element;
use crate::plugin_system::dependency::Dependency;
use crate::plugin_system::descriptor::{ContentModule, Descriptor};
use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::version::BuildRange;

pub const ROOT_ELEMENT: &str = "plugin";

const IMPLEMENTATION_ATTRIBUTES: [&str; 3] = ["implementation", "serviceImplementation", "implementationClass"];

thread_local! {
    static INTERNED: RefCell<HashSet<Arc<str>>> = RefCell::new(HashSet::new());
}

/// Per-thread parsing state. Class names repeat across a manifest and its includes,
/// so a worker keeps one shared copy of every name until the job is done.
pub struct ParsingContext;

impl ParsingContext {
    pub fn intern(value: &str) -> Arc<str> {
        INTERNED.with(|cell| {
            let mut set = cell.borrow_mut();
            if let Some(existing) = set.get(value) {
                return Arc::clone(existing);
            }
            let interned: Arc<str> = Arc::from(value);
            set.insert(Arc::clone(&interned));
            interned
        })
    }

    pub fn interned_count() -> usize {
        INTERNED.with(|cell| cell.borrow().len())
    }

    pub fn clear() {
        INTERNED.with(|cell| cell.borrow_mut().clear());
    }
}

/// Id declared by a raw tree: the `id` element, or `name` when there is none
pub fn declared_id(root: &Element) -> Option<String> {
    root.child_text("id")
        .or_else(|| root.child_text("name"))
        .map(str::to_string)
}

/// Reads a top-level plugin manifest. Fails when no id can be determined.
pub fn read_plugin(root: &Element, location: Option<&DocumentLocation>, bundled: bool) -> Result<Descriptor, PluginSystemError> {
    let path = || {
        location
            .map(|l| PathBuf::from(l.to_string()))
            .unwrap_or_default()
    };
    if root.name != ROOT_ELEMENT {
        return Err(PluginSystemError::ParseError {
            path: path(),
            message: format!("unexpected root element '{}'", root.name),
        });
    }
    let id = declared_id(root).ok_or_else(|| PluginSystemError::ParseError {
        path: path(),
        message: "manifest declares neither id nor name".to_string(),
    })?;

    let mut descriptor = Descriptor::new(&id, bundled);
    descriptor.location = location.cloned();
    read_into(root, &mut descriptor);
    Ok(descriptor)
}

/// Reads the fields a manifest declares into `descriptor`, keeping what is already set
/// for anything the manifest leaves out.
pub fn read_into(root: &Element, descriptor: &mut Descriptor) {
    if let Some(prefix) = root.attribute("package") {
        descriptor.package_prefix = Some(prefix.trim().to_string());
    }
    if root.flag("use-core-classloader") {
        descriptor.use_core_class_loader = true;
    }

    for child in &root.children {
        match child.name.as_str() {
            "name" => set_text(&mut descriptor.name, child),
            "version" => set_text(&mut descriptor.version, child),
            "vendor" => set_text(&mut descriptor.vendor, child),
            "category" => set_text(&mut descriptor.category, child),
            "description" => set_text(&mut descriptor.description, child),
            "resource-bundle" => set_text(&mut descriptor.resource_bundle, child),
            "compatibility" => {
                descriptor.build_range =
                    BuildRange::new(child.attribute("since-build"), child.attribute("until-build"));
            }
            "depends" => {
                if let Some(dependency) = read_depends(child) {
                    descriptor.dependencies.push(dependency);
                }
            }
            "dependencies" => read_dependencies(child, descriptor),
            "module" => {
                if let Some(value) = child.attribute("value") {
                    let value = value.trim().to_string();
                    if !value.is_empty() && !descriptor.modules.contains(&value) {
                        descriptor.modules.push(value);
                    }
                }
            }
            "content" => {
                for module in child.children_named("module") {
                    if let Some(name) = module.attribute("name") {
                        descriptor
                            .content
                            .push(ContentModule::new(name.trim(), module.attribute("package")));
                    }
                }
            }
            "class-path" => {
                for entry in child.children_named("entry") {
                    if let Some(text) = entry.text_trimmed() {
                        descriptor.class_path.push(PathBuf::from(text));
                    }
                }
            }
            "extensions" | "services" => collect_implementations(child, &mut descriptor.implementation_classes),
            _ => {}
        }
    }
}

fn set_text(slot: &mut Option<String>, element: &Element) {
    if let Some(text) = element.text_trimmed() {
        *slot = Some(text.to_string());
    }
}

fn read_depends(element: &Element) -> Option<Dependency> {
    let id = element.text_trimmed()?;
    let mut dependency = if element.flag("optional") {
        Dependency::optional(id)
    } else {
        Dependency::required(id)
    };
    if let Some(config) = element.attribute("config-file").map(str::trim).filter(|c| !c.is_empty()) {
        dependency = dependency.with_config_file(config);
    }
    Some(dependency)
}

fn read_dependencies(element: &Element, descriptor: &mut Descriptor) {
    for child in &element.children {
        let target = match child.name.as_str() {
            "plugin" => child.attribute("id"),
            "module" => child.attribute("name"),
            _ => None,
        };
        if let Some(target) = target.map(str::trim).filter(|t| !t.is_empty()) {
            descriptor.dependencies.push(Dependency::required(target));
        }
    }
}

fn collect_implementations(element: &Element, into: &mut Vec<Arc<str>>) {
    for child in &element.children {
        for attribute in IMPLEMENTATION_ATTRIBUTES {
            if let Some(class_name) = child.attribute(attribute).map(str::trim).filter(|c| !c.is_empty()) {
                into.push(ParsingContext::intern(class_name));
            }
        }
        collect_implementations(child, into);
    }
}
