//! Element selectors: a stable path the collector can use to target the
//! same element again during replay.

use std::sync::Arc;

use capture_core::dom::{Document, NodeId};

/// Selector generation offered by an automation engine living in the page.
/// Optional: the resolver falls back to its own walk when absent.
pub trait SelectorCapability: Send + Sync {
    fn resolve_selector(&self, document: &Document, node: NodeId) -> Option<String>;

    /// Locator source in the given target language (e.g. `"python"`).
    fn generate_locator(
        &self,
        _document: &Document,
        _node: NodeId,
        _language: &str,
    ) -> Option<String> {
        None
    }
}

#[derive(Clone, Default)]
pub struct SelectorResolver {
    capability: Option<Arc<dyn SelectorCapability>>,
}

impl SelectorResolver {
    pub fn new() -> Self {
        Self { capability: None }
    }

    pub fn with_capability(capability: Arc<dyn SelectorCapability>) -> Self {
        Self {
            capability: Some(capability),
        }
    }

    pub fn has_capability(&self) -> bool {
        self.capability.is_some()
    }

    /// Selector for `node`. Never fails.
    pub fn resolve(&self, document: &Document, node: NodeId) -> String {
        self.capability
            .as_ref()
            .and_then(|cap| cap.resolve_selector(document, node))
            .unwrap_or_else(|| css_path(document, node))
    }

    pub fn locator(&self, document: &Document, node: NodeId, language: &str) -> Option<String> {
        self.capability
            .as_ref()
            .and_then(|cap| cap.generate_locator(document, node, language))
    }
}

/// Walk from `node` toward the body, emitting `#id` (and stopping, ids are
/// assumed unique) or `TAG:nth-child(k)` per level, joined outermost first.
pub fn css_path(document: &Document, node: NodeId) -> String {
    if document.is_body(node) {
        return "BODY".to_string();
    }

    let mut segments = Vec::new();
    let mut current = node;
    while let Some(parent) = document.parent_element(current) {
        if document.is_body(current) {
            break;
        }
        match document.id(current).filter(|id| !id.is_empty()) {
            Some(id) => {
                segments.push(format!("#{id}"));
                break;
            }
            None => {
                segments.push(format!(
                    "{}:nth-child({})",
                    document.tag_name(current),
                    sibling_position(document, current)
                ));
            }
        }
        current = parent;
    }

    segments.reverse();
    segments.join(">")
}

/// 1-based position among the element's siblings.
fn sibling_position(document: &Document, node: NodeId) -> usize {
    let mut position = 1;
    let mut cursor = node;
    while let Some(prev) = document.previous_element_sibling(cursor) {
        position += 1;
        cursor = prev;
    }
    position
}
