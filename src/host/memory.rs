//! In-memory output tree.
//!
//! A document-like node store addressed by [`HostNodeId`]. Every mutation
//! the engine performs is appended to an operation log, so callers can check
//! not only the resulting tree but how it was reached.

use serde::Serialize;
use serde_json::{Map, Value};
use slotmap::SlotMap;

use super::{HostConfig, PropChange, UpdatePayload};
use crate::element::{Props, DANGEROUSLY_SET_INNER_HTML, STYLE};

slotmap::new_key_type! {
    /// Handle to a node of a [`MemoryHost`].
    pub struct HostNodeId;
}

/// What a host node is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostNodeKind {
    Container,
    Element { tag: String },
    Text,
}

/// One node of the output tree.
#[derive(Debug, Clone, PartialEq)]
pub struct HostNode {
    pub kind: HostNodeKind,
    pub attributes: Map<String, Value>,
    pub style: Map<String, Value>,
    /// Data of a text node, or direct text content of an element.
    pub text: Option<String>,
    /// Raw inner markup of an element.
    pub inner_html: Option<String>,
    pub children: Vec<HostNodeId>,
    pub parent: Option<HostNodeId>,
}

impl HostNode {
    fn new(kind: HostNodeKind) -> Self {
        Self {
            kind,
            attributes: Map::new(),
            style: Map::new(),
            text: None,
            inner_html: None,
            children: Vec::new(),
            parent: None,
        }
    }

    /// Tag of an element node.
    pub fn tag(&self) -> Option<&str> {
        match &self.kind {
            HostNodeKind::Element { tag } => Some(tag),
            _ => None,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn style(&self, name: &str) -> Option<&Value> {
        self.style.get(name)
    }
}

/// A mutation performed on a [`MemoryHost`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum HostOp {
    CreateInstance { id: HostNodeId, tag: String },
    CreateText { id: HostNodeId, text: String },
    Append { parent: HostNodeId, child: HostNodeId },
    InsertBefore { parent: HostNodeId, child: HostNodeId, before: HostNodeId },
    Remove { parent: HostNodeId, child: HostNodeId },
    Update { id: HostNodeId, changes: usize },
    TextUpdate { id: HostNodeId, text: String },
    ResetText { id: HostNodeId },
}

impl HostOp {
    /// Whether the operation changes the shape of an attached tree.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::Append { .. } | Self::InsertBefore { .. } | Self::Remove { .. }
        )
    }
}

/// In-memory host.
#[derive(Debug, Default)]
pub struct MemoryHost {
    nodes: SlotMap<HostNodeId, HostNode>,
    ops: Vec<HostOp>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a root container to render into.
    pub fn create_container(&mut self) -> HostNodeId {
        self.nodes.insert(HostNode::new(HostNodeKind::Container))
    }

    pub fn node(&self, id: HostNodeId) -> Option<&HostNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: HostNodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of live nodes, containers included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn children(&self, id: HostNodeId) -> &[HostNodeId] {
        self.nodes.get(id).map_or(&[], |node| node.children.as_slice())
    }

    pub fn parent(&self, id: HostNodeId) -> Option<HostNodeId> {
        self.nodes.get(id).and_then(|node| node.parent)
    }

    /// Mutations performed so far.
    pub fn ops(&self) -> &[HostOp] {
        &self.ops
    }

    /// Drain the operation log.
    pub fn take_ops(&mut self) -> Vec<HostOp> {
        std::mem::take(&mut self.ops)
    }

    /// Concatenated text of a subtree.
    pub fn text_content(&self, id: HostNodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: HostNodeId, out: &mut String) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        if let Some(html) = &node.inner_html {
            out.push_str(html);
        } else if let Some(text) = &node.text {
            out.push_str(text);
        } else {
            for child in &node.children {
                self.collect_text(*child, out);
            }
        }
    }

    /// Serialize a subtree as markup. Containers render only their children.
    pub fn to_markup(&self, id: HostNodeId) -> String {
        let mut out = String::new();
        self.write_markup(id, &mut out);
        out
    }

    fn write_markup(&self, id: HostNodeId, out: &mut String) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        match &node.kind {
            HostNodeKind::Text => out.push_str(&escape(node.text.as_deref().unwrap_or(""))),
            HostNodeKind::Container => {
                for child in &node.children {
                    self.write_markup(*child, out);
                }
            }
            HostNodeKind::Element { tag } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in &node.attributes {
                    out.push_str(&format!(" {name}=\"{}\"", escape(&value_text(value))));
                }
                if !node.style.is_empty() {
                    let style = node
                        .style
                        .iter()
                        .map(|(name, value)| format!("{name}:{}", value_text(value)))
                        .collect::<Vec<_>>()
                        .join(";");
                    out.push_str(&format!(" style=\"{}\"", escape(&style)));
                }
                out.push('>');
                if let Some(html) = &node.inner_html {
                    out.push_str(html);
                } else if let Some(text) = &node.text {
                    out.push_str(&escape(text));
                } else {
                    for child in &node.children {
                        self.write_markup(*child, out);
                    }
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }

    /// JSON view of a subtree.
    pub fn snapshot(&self, id: HostNodeId) -> Value {
        let Some(node) = self.nodes.get(id) else {
            return Value::Null;
        };
        let mut out = match serde_json::to_value(&node.kind) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        if !node.attributes.is_empty() {
            out.insert("attributes".into(), Value::Object(node.attributes.clone()));
        }
        if !node.style.is_empty() {
            out.insert("style".into(), Value::Object(node.style.clone()));
        }
        if let Some(text) = &node.text {
            out.insert("text".into(), Value::String(text.clone()));
        }
        if let Some(html) = &node.inner_html {
            out.insert("html".into(), Value::String(html.clone()));
        }
        if !node.children.is_empty() {
            let children = node.children.iter().map(|child| self.snapshot(*child));
            out.insert("children".into(), Value::Array(children.collect()));
        }
        Value::Object(out)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn detach(&mut self, child: HostNodeId) {
        let Some(parent) = self.nodes.get_mut(child).and_then(|node| node.parent.take()) else {
            return;
        };
        if let Some(parent) = self.nodes.get_mut(parent) {
            parent.children.retain(|id| *id != child);
        }
    }

    fn free(&mut self, id: HostNodeId) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.remove(id) {
                stack.extend(node.children);
            }
        }
    }

    fn clear_children(&mut self, id: HostNodeId) {
        let children = self
            .nodes
            .get_mut(id)
            .map(|node| std::mem::take(&mut node.children))
            .unwrap_or_default();
        for child in children {
            self.free(child);
        }
    }

    fn set_text_content(&mut self, id: HostNodeId, text: String) {
        self.clear_children(id);
        if let Some(node) = self.nodes.get_mut(id) {
            node.inner_html = None;
            node.text = Some(text);
        }
    }

    fn set_attribute(&mut self, id: HostNodeId, name: &str, value: Option<&Value>) {
        if name == DANGEROUSLY_SET_INNER_HTML {
            let html = value
                .and_then(|value| value.get("__html"))
                .and_then(Value::as_str)
                .map(str::to_string);
            if html.is_some() {
                self.clear_children(id);
            }
            if let Some(node) = self.nodes.get_mut(id) {
                node.inner_html = html;
            }
            return;
        }
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        match value {
            Some(value) if !value.is_null() => {
                node.attributes.insert(name.to_string(), value.clone());
            }
            _ => {
                node.attributes.remove(name);
            }
        }
    }

    fn set_style(&mut self, id: HostNodeId, name: &str, value: Option<&Value>) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        match value {
            Some(value) if !value.is_null() => {
                node.style.insert(name.to_string(), value.clone());
            }
            _ => {
                node.style.remove(name);
            }
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

// =============================================================================
// Host Config
// =============================================================================

impl HostConfig for MemoryHost {
    type Instance = HostNodeId;

    fn create_instance(&mut self, kind: &str, _props: &Props) -> HostNodeId {
        let id = self.nodes.insert(HostNode::new(HostNodeKind::Element {
            tag: kind.to_string(),
        }));
        self.ops.push(HostOp::CreateInstance {
            id,
            tag: kind.to_string(),
        });
        id
    }

    fn create_text_instance(&mut self, text: &str) -> HostNodeId {
        let mut node = HostNode::new(HostNodeKind::Text);
        node.text = Some(text.to_string());
        let id = self.nodes.insert(node);
        self.ops.push(HostOp::CreateText {
            id,
            text: text.to_string(),
        });
        id
    }

    fn append_child(&mut self, parent: &HostNodeId, child: &HostNodeId) {
        self.detach(*child);
        let Some(node) = self.nodes.get_mut(*parent) else {
            tracing::warn!(?parent, "append_child on a missing parent");
            return;
        };
        node.children.push(*child);
        if let Some(child_node) = self.nodes.get_mut(*child) {
            child_node.parent = Some(*parent);
        }
        self.ops.push(HostOp::Append {
            parent: *parent,
            child: *child,
        });
    }

    fn insert_before(&mut self, parent: &HostNodeId, child: &HostNodeId, before: &HostNodeId) {
        self.detach(*child);
        let Some(node) = self.nodes.get_mut(*parent) else {
            tracing::warn!(?parent, "insert_before on a missing parent");
            return;
        };
        match node.children.iter().position(|id| id == before) {
            Some(index) => node.children.insert(index, *child),
            None => {
                tracing::warn!(?before, "insert_before reference is not a child; appending");
                node.children.push(*child);
            }
        }
        if let Some(child_node) = self.nodes.get_mut(*child) {
            child_node.parent = Some(*parent);
        }
        self.ops.push(HostOp::InsertBefore {
            parent: *parent,
            child: *child,
            before: *before,
        });
    }

    fn remove_child(&mut self, parent: &HostNodeId, child: &HostNodeId) {
        if self.parent(*child) != Some(*parent) {
            tracing::warn!(?parent, ?child, "remove_child on a node with another parent");
        }
        self.detach(*child);
        self.free(*child);
        self.ops.push(HostOp::Remove {
            parent: *parent,
            child: *child,
        });
    }

    fn apply_attributes(&mut self, instance: &HostNodeId, kind: &str, props: &Props) {
        for (name, value) in &props.attributes {
            if name == STYLE {
                if let Some(style) = value.as_object() {
                    for (style_name, style_value) in style {
                        self.set_style(*instance, style_name, Some(style_value));
                    }
                }
            } else {
                self.set_attribute(*instance, name, Some(value));
            }
        }
        if let Some(text) = props.text_children() {
            if kind != "textarea" || !text.is_empty() {
                self.set_text_content(*instance, text);
            }
        }
    }

    fn commit_update(&mut self, instance: &HostNodeId, _kind: &str, payload: &UpdatePayload) {
        for change in payload.iter() {
            match change {
                PropChange::Attribute { name, value } => {
                    self.set_attribute(*instance, name, value.as_ref());
                }
                PropChange::Style { name, value } => {
                    self.set_style(*instance, name, value.as_ref());
                }
                PropChange::TextContent(text) => self.set_text_content(*instance, text.clone()),
            }
        }
        self.ops.push(HostOp::Update {
            id: *instance,
            changes: payload.len(),
        });
    }

    fn commit_text_update(&mut self, instance: &HostNodeId, _old_text: &str, new_text: &str) {
        if let Some(node) = self.nodes.get_mut(*instance) {
            node.text = Some(new_text.to_string());
        }
        self.ops.push(HostOp::TextUpdate {
            id: *instance,
            text: new_text.to_string(),
        });
    }

    fn reset_text_content(&mut self, instance: &HostNodeId) {
        if let Some(node) = self.nodes.get_mut(*instance) {
            node.text = None;
            node.inner_html = None;
        }
        self.ops.push(HostOp::ResetText { id: *instance });
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;
    use serde_json::json;

    #[test]
    fn test_append_and_markup() {
        let mut host = MemoryHost::new();
        let container = host.create_container();
        let props = Element::host("h1").attr("title", "hi").style("color", "cyan");
        let h1 = host.create_instance("h1", props.props());
        host.apply_attributes(&h1, "h1", props.props());
        let text = host.create_text_instance("a < b");
        host.append_child(&h1, &text);
        host.append_child(&container, &h1);

        assert_eq!(
            host.to_markup(container),
            "<h1 title=\"hi\" style=\"color:cyan\">a &lt; b</h1>"
        );
        assert_eq!(host.text_content(container), "a < b");
        assert_eq!(host.parent(h1), Some(container));
    }

    #[test]
    fn test_insert_before_moves_node() {
        let mut host = MemoryHost::new();
        let container = host.create_container();
        let a = host.create_text_instance("a");
        let b = host.create_text_instance("b");
        host.append_child(&container, &a);
        host.append_child(&container, &b);
        host.insert_before(&container, &b, &a);
        assert_eq!(host.children(container), &[b, a]);
        assert_eq!(host.text_content(container), "ba");
    }

    #[test]
    fn test_remove_frees_subtree() {
        let mut host = MemoryHost::new();
        let container = host.create_container();
        let div = host.create_instance("div", &Props::default());
        let text = host.create_text_instance("x");
        host.append_child(&div, &text);
        host.append_child(&container, &div);
        host.remove_child(&container, &div);
        assert!(host.children(container).is_empty());
        assert!(!host.contains(div));
        assert!(!host.contains(text));
        assert_eq!(host.len(), 1);
    }

    #[test]
    fn test_commit_update_changes() {
        let mut host = MemoryHost::new();
        let span = host.create_instance("span", &Props::default());
        let payload = UpdatePayload {
            changes: vec![
                PropChange::Attribute { name: "id".into(), value: Some(json!("x")) },
                PropChange::Style { name: "color".into(), value: Some(json!("red")) },
                PropChange::TextContent("new".into()),
            ],
        };
        host.commit_update(&span, "span", &payload);
        let node = host.node(span).unwrap();
        assert_eq!(node.attribute("id"), Some(&json!("x")));
        assert_eq!(node.style("color"), Some(&json!("red")));
        assert_eq!(node.text.as_deref(), Some("new"));

        let removal = UpdatePayload {
            changes: vec![
                PropChange::Attribute { name: "id".into(), value: None },
                PropChange::Style { name: "color".into(), value: None },
            ],
        };
        host.commit_update(&span, "span", &removal);
        let node = host.node(span).unwrap();
        assert!(node.attribute("id").is_none());
        assert!(node.style.is_empty());
        assert_eq!(host.ops().last(), Some(&HostOp::Update { id: span, changes: 2 }));
    }

    #[test]
    fn test_inner_html_and_snapshot() {
        let mut host = MemoryHost::new();
        let element = Element::host("div").attr(DANGEROUSLY_SET_INNER_HTML, json!({"__html": "<b>x</b>"}));
        let div = host.create_instance("div", element.props());
        host.apply_attributes(&div, "div", element.props());
        assert_eq!(host.to_markup(div), "<div><b>x</b></div>");
        assert_eq!(
            host.snapshot(div),
            json!({"type": "element", "tag": "div", "html": "<b>x</b>"})
        );
    }

    #[test]
    fn test_empty_textarea_keeps_no_text() {
        let mut host = MemoryHost::new();
        let element = Element::host("textarea").text("");
        let area = host.create_instance("textarea", element.props());
        host.apply_attributes(&area, "textarea", element.props());
        assert!(host.node(area).unwrap().text.is_none());
    }
}
