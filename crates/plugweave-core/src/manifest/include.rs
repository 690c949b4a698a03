//! Resolution of `include` directives inside manifest trees.
use thiserror::Error;

use crate::manifest::document::{DocumentError, DocumentLoader, DocumentLocation, LoadingContext};
use crate::manifest::element::Element;

const INCLUDE: [&str; 2] = ["include", "xi:include"];
const FALLBACK: [&str; 2] = ["fallback", "xi:fallback"];

#[derive(Debug, Error)]
pub enum IncludeError {
    #[error("Included document '{href}' not found (referenced from {from})")]
    Missing { href: String, from: String },

    #[error("Include directive without href in {from}")]
    MissingHref { from: String },

    #[error("Include cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("Unsupported xpointer expression '{0}'")]
    InvalidXPointer(String),

    #[error("xpointer '{xpointer}' selects nothing in '{href}'")]
    XPointerMismatch { href: String, xpointer: String },

    #[error(transparent)]
    Document(#[from] DocumentError),
}

fn is_include(element: &Element) -> bool {
    INCLUDE.contains(&element.name.as_str())
}

fn is_fallback(element: &Element) -> bool {
    FALLBACK.contains(&element.name.as_str())
}

/// A parsed `xpointer(/root(/child)?/*)` selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XPointer {
    root: String,
    child: Option<String>,
}

impl XPointer {
    pub fn parse(expression: &str) -> Result<Self, IncludeError> {
        let invalid = || IncludeError::InvalidXPointer(expression.to_string());
        let path = expression
            .trim()
            .strip_prefix("xpointer(")
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(invalid)?;
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [root, "*"] if *root != "*" => Ok(Self {
                root: root.to_string(),
                child: None,
            }),
            [root, child, "*"] if *root != "*" && *child != "*" => Ok(Self {
                root: root.to_string(),
                child: Some(child.to_string()),
            }),
            _ => Err(invalid()),
        }
    }

    /// Children of the matched element, or `None` when the path does not match
    pub fn select(&self, document: Element) -> Option<Vec<Element>> {
        if document.name != self.root {
            return None;
        }
        match &self.child {
            None => Some(document.children),
            Some(name) => document
                .children
                .into_iter()
                .find(|c| &c.name == name)
                .map(|c| c.children),
        }
    }
}

/// Expands include directives depth first, keeping a stack of the documents being expanded.
pub struct IncludeResolver<'a> {
    loader: &'a dyn DocumentLoader,
    context: &'a LoadingContext,
    tolerate_missing: bool,
}

impl<'a> IncludeResolver<'a> {
    pub fn new(loader: &'a dyn DocumentLoader, context: &'a LoadingContext) -> Self {
        Self {
            loader,
            context,
            tolerate_missing: false,
        }
    }

    /// Skip missing targets that have no fallback instead of failing
    pub fn tolerate_missing(mut self, tolerate: bool) -> Self {
        self.tolerate_missing = tolerate;
        self
    }

    /// Returns `root` with every include directive replaced by the content it references.
    pub fn resolve(&self, root: Element, location: &DocumentLocation) -> Result<Element, IncludeError> {
        let mut stack = vec![location.clone()];
        self.resolve_element(root, &mut stack)
    }

    fn resolve_element(&self, mut element: Element, stack: &mut Vec<DocumentLocation>) -> Result<Element, IncludeError> {
        let children = std::mem::take(&mut element.children);
        element.children = self.resolve_nodes(children, stack)?;
        Ok(element)
    }

    fn resolve_nodes(&self, nodes: Vec<Element>, stack: &mut Vec<DocumentLocation>) -> Result<Vec<Element>, IncludeError> {
        let mut resolved = Vec::with_capacity(nodes.len());
        for node in nodes {
            if is_include(&node) {
                resolved.extend(self.expand(node, stack)?);
            } else {
                resolved.push(self.resolve_element(node, stack)?);
            }
        }
        Ok(resolved)
    }

    fn expand(&self, include: Element, stack: &mut Vec<DocumentLocation>) -> Result<Vec<Element>, IncludeError> {
        let current = match stack.last() {
            Some(location) => location.clone(),
            None => return Ok(Vec::new()),
        };
        let href = include
            .attribute("href")
            .map(str::to_string)
            .ok_or_else(|| IncludeError::MissingHref { from: current.to_string() })?;
        let target = current.resolve(&href);

        if stack.contains(&target) {
            let mut chain: Vec<String> = stack.iter().map(ToString::to_string).collect();
            chain.push(target.to_string());
            return Err(IncludeError::Cycle(chain));
        }

        let xpointer = match include.attribute("xpointer") {
            Some(expression) => Some(XPointer::parse(expression)?),
            None => None,
        };
        let fallback = include.children.into_iter().find(is_fallback);

        let document = match self.loader.load(self.context, &target) {
            Ok(document) => document,
            Err(e) if e.is_not_found() => {
                if let Some(fallback) = fallback {
                    return self.resolve_nodes(fallback.children, stack);
                }
                if self.tolerate_missing {
                    log::warn!("Skipping missing include '{}' referenced from {}", href, current);
                    return Ok(Vec::new());
                }
                return Err(IncludeError::Missing {
                    href,
                    from: current.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let selected = match &xpointer {
            Some(pointer) => pointer.select(document),
            None => Some(document.children),
        };
        match selected {
            Some(nodes) => {
                stack.push(target);
                let result = self.resolve_nodes(nodes, stack);
                stack.pop();
                result
            }
            None => match fallback {
                Some(fallback) => self.resolve_nodes(fallback.children, stack),
                None => Err(IncludeError::XPointerMismatch {
                    href,
                    xpointer: include.attributes.get("xpointer").cloned().unwrap_or_default(),
                }),
            },
        }
    }
}
