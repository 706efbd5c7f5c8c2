//! Page model: the element tree, layout boxes, and window scroll state a
//! host binding exposes to the capture pipeline.
//!
//! Elements live in an arena addressed by [`NodeId`]. The tree is rooted at an
//! `HTML` element whose first child is `BODY`; everything the page adds hangs
//! below the body.

use serde::{Deserialize, Serialize};

use crate::error::{CaptureError, CaptureResult};

/// Handle to an element in a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

/// Viewport-relative layout box, as returned by `getBoundingClientRect`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DomRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl DomRect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

#[derive(Debug, Clone)]
struct Element {
    tag_name: String,
    id: Option<String>,
    value: Option<String>,
    rect: DomRect,
    offset_left: f64,
    offset_top: f64,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct Document {
    elements: Vec<Element>,
    root: NodeId,
    body: NodeId,
    scroll_x: f64,
    scroll_y: f64,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        let mut doc = Self {
            elements: Vec::new(),
            root: NodeId(0),
            body: NodeId(1),
            scroll_x: 0.0,
            scroll_y: 0.0,
        };
        let root = doc.push(None, "html");
        let body = doc.push(Some(root), "body");
        doc.root = root;
        doc.body = body;
        doc
    }

    fn push(&mut self, parent: Option<NodeId>, tag: &str) -> NodeId {
        let id = NodeId(self.elements.len());
        self.elements.push(Element {
            tag_name: tag.to_ascii_uppercase(),
            id: None,
            value: None,
            rect: DomRect::default(),
            offset_left: 0.0,
            offset_top: 0.0,
            parent,
            children: Vec::new(),
        });
        if let Some(parent) = parent {
            self.elements[parent.0].children.push(id);
        }
        id
    }

    fn element(&self, node: NodeId) -> CaptureResult<&Element> {
        self.elements
            .get(node.0)
            .ok_or_else(|| CaptureError::Internal(anyhow::anyhow!("unknown node {}", node.0)))
    }

    fn element_mut(&mut self, node: NodeId) -> CaptureResult<&mut Element> {
        self.elements
            .get_mut(node.0)
            .ok_or_else(|| CaptureError::Internal(anyhow::anyhow!("unknown node {}", node.0)))
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    pub fn contains(&self, node: NodeId) -> bool {
        node.0 < self.elements.len()
    }

    /// Append a new element as the last child of `parent`.
    pub fn append_element(&mut self, parent: NodeId, tag: &str) -> CaptureResult<NodeId> {
        self.element(parent)?;
        Ok(self.push(Some(parent), tag))
    }

    pub fn set_id(&mut self, node: NodeId, id: impl Into<String>) -> CaptureResult<()> {
        self.element_mut(node)?.id = Some(id.into());
        Ok(())
    }

    pub fn set_value(&mut self, node: NodeId, value: impl Into<String>) -> CaptureResult<()> {
        self.element_mut(node)?.value = Some(value.into());
        Ok(())
    }

    pub fn set_rect(&mut self, node: NodeId, rect: DomRect) -> CaptureResult<()> {
        self.element_mut(node)?.rect = rect;
        Ok(())
    }

    pub fn set_offset(&mut self, node: NodeId, left: f64, top: f64) -> CaptureResult<()> {
        let el = self.element_mut(node)?;
        el.offset_left = left;
        el.offset_top = top;
        Ok(())
    }

    pub fn set_scroll(&mut self, x: f64, y: f64) {
        self.scroll_x = x;
        self.scroll_y = y;
    }

    /// Remove `node` (and its subtree) from its parent. The subtree keeps its
    /// internal structure but is no longer reachable from the document.
    pub fn detach(&mut self, node: NodeId) -> CaptureResult<()> {
        if node == self.root || node == self.body {
            return Err(CaptureError::Internal(anyhow::anyhow!(
                "cannot detach the document root or body"
            )));
        }
        let parent = self.element_mut(node)?.parent.take();
        if let Some(parent) = parent {
            self.elements[parent.0].children.retain(|c| *c != node);
        }
        Ok(())
    }

    /// Upper-case tag name, e.g. `"DIV"`.
    pub fn tag_name(&self, node: NodeId) -> &str {
        self.elements
            .get(node.0)
            .map(|el| el.tag_name.as_str())
            .unwrap_or("")
    }

    /// The `id` attribute, if present (possibly empty).
    pub fn id(&self, node: NodeId) -> Option<&str> {
        self.elements.get(node.0).and_then(|el| el.id.as_deref())
    }

    pub fn value(&self, node: NodeId) -> Option<&str> {
        self.elements.get(node.0).and_then(|el| el.value.as_deref())
    }

    pub fn parent_element(&self, node: NodeId) -> Option<NodeId> {
        self.elements.get(node.0).and_then(|el| el.parent)
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.elements
            .get(node.0)
            .map(|el| el.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn previous_element_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.parent_element(node)?;
        let siblings = self.children(parent);
        let pos = siblings.iter().position(|c| *c == node)?;
        pos.checked_sub(1).map(|prev| siblings[prev])
    }

    pub fn is_body(&self, node: NodeId) -> bool {
        node == self.body
    }

    pub fn bounding_client_rect(&self, node: NodeId) -> DomRect {
        self.elements
            .get(node.0)
            .map(|el| el.rect)
            .unwrap_or_default()
    }

    /// `(offsetLeft, offsetTop)` of the element.
    pub fn offset(&self, node: NodeId) -> (f64, f64) {
        self.elements
            .get(node.0)
            .map(|el| (el.offset_left, el.offset_top))
            .unwrap_or((0.0, 0.0))
    }

    /// Window scroll offsets `(scrollX, scrollY)`.
    pub fn scroll(&self) -> (f64, f64) {
        (self.scroll_x, self.scroll_y)
    }

    /// First attached element, in tree order, whose `id` equals `id`.
    /// An empty id never matches.
    pub fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        if id.is_empty() {
            return None;
        }
        let mut stack = vec![self.root];
        while let Some(node) = stack.pop() {
            if self.id(node) == Some(id) {
                return Some(node);
            }
            stack.extend(self.children(node).iter().rev().copied());
        }
        None
    }

    /// Build a document from a serialized page snapshot. Node ids are
    /// assigned in pre-order: `HTML` is 0, `BODY` is 1, then the body's
    /// descendants.
    pub fn from_snapshot(snapshot: &PageSnapshot) -> CaptureResult<Self> {
        let mut doc = Self::new();
        doc.set_scroll(snapshot.scroll_x, snapshot.scroll_y);
        for child in &snapshot.body {
            doc.insert_spec(doc.body, child)?;
        }
        Ok(doc)
    }

    fn insert_spec(&mut self, parent: NodeId, spec: &ElementSpec) -> CaptureResult<()> {
        if spec.tag.trim().is_empty() {
            return Err(CaptureError::Config("snapshot element without a tag".into()));
        }
        let node = self.append_element(parent, &spec.tag)?;
        if let Some(id) = &spec.id {
            self.set_id(node, id.clone())?;
        }
        if let Some(value) = &spec.value {
            self.set_value(node, value.clone())?;
        }
        self.set_rect(node, spec.rect)?;
        self.set_offset(node, spec.offset_left, spec.offset_top)?;
        for child in &spec.children {
            self.insert_spec(node, child)?;
        }
        Ok(())
    }
}

/// Serialized page state handed over by a host binding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageSnapshot {
    #[serde(default)]
    pub scroll_x: f64,
    #[serde(default)]
    pub scroll_y: f64,
    #[serde(default)]
    pub body: Vec<ElementSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ElementSpec {
    pub tag: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub rect: DomRect,
    #[serde(default)]
    pub offset_left: f64,
    #[serde(default)]
    pub offset_top: f64,
    #[serde(default)]
    pub children: Vec<ElementSpec>,
}
