//! Host interface - the output tree the engine mutates.
//!
//! The engine never touches output nodes directly. Everything goes through
//! [`HostConfig`], whose methods are invoked in two places:
//!
//! - complete: `create_instance`, `create_text_instance`, `append_child`
//!   (detached subtrees only) and `apply_attributes`
//! - commit: `insert_before`, `append_child`, `remove_child`,
//!   `commit_update`, `commit_text_update` and `reset_text_content`
//!
//! Two hosts ship with the crate: [`MemoryHost`], an inspectable in-memory
//! tree, and the [`terminal`] printer that draws a `MemoryHost` with
//! crossterm.

mod memory;
pub mod terminal;

pub use memory::{HostNode, HostNodeId, HostNodeKind, HostOp, MemoryHost};

use std::fmt;

use serde_json::Value;

use crate::element::{Props, DANGEROUSLY_SET_INNER_HTML};

// =============================================================================
// Update Payload
// =============================================================================

/// One attribute-level change of a host instance.
#[derive(Debug, Clone, PartialEq)]
pub enum PropChange {
    /// Set (`Some`) or remove (`None`) a plain attribute.
    Attribute { name: String, value: Option<Value> },
    /// Set (`Some`) or remove (`None`) one entry of the style map.
    Style { name: String, value: Option<Value> },
    /// Replace the text content with direct text children.
    TextContent(String),
}

/// Changes to apply to one host instance at commit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdatePayload {
    pub changes: Vec<PropChange>,
}

impl UpdatePayload {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PropChange> {
        self.changes.iter()
    }

    pub(crate) fn push(&mut self, change: PropChange) {
        self.changes.push(change);
    }
}

// =============================================================================
// Host Config
// =============================================================================

/// Operations the engine needs from an output tree.
///
/// `Instance` is a cheap handle to one output node. The root container is an
/// instance too.
pub trait HostConfig {
    type Instance: Clone + PartialEq + fmt::Debug + 'static;

    /// Create a detached element node of kind `kind`.
    fn create_instance(&mut self, kind: &str, props: &Props) -> Self::Instance;

    /// Create a detached text node.
    fn create_text_instance(&mut self, text: &str) -> Self::Instance;

    /// Append `child` as the last child of `parent`, moving it if attached.
    fn append_child(&mut self, parent: &Self::Instance, child: &Self::Instance);

    /// Insert `child` before `before` under `parent`, moving it if attached.
    fn insert_before(
        &mut self,
        parent: &Self::Instance,
        child: &Self::Instance,
        before: &Self::Instance,
    );

    /// Detach `child` from `parent`.
    fn remove_child(&mut self, parent: &Self::Instance, child: &Self::Instance);

    /// Apply the initial attributes, styles and text content of a freshly
    /// created instance.
    fn apply_attributes(&mut self, instance: &Self::Instance, kind: &str, props: &Props);

    /// Whether the children of `kind` collapse to the instance's text
    /// content instead of becoming child fibers.
    fn should_set_text_content(&self, kind: &str, props: &Props) -> bool {
        should_set_text_content(kind, props)
    }

    /// Apply a diff computed by the complete phase.
    fn commit_update(&mut self, instance: &Self::Instance, kind: &str, payload: &UpdatePayload);

    /// Replace the content of a text node.
    fn commit_text_update(&mut self, instance: &Self::Instance, old_text: &str, new_text: &str);

    /// Clear the text content of an element before children are inserted.
    fn reset_text_content(&mut self, instance: &Self::Instance);
}

/// Default text-collapse rule: `textarea` and `noscript`, lone string or
/// number children, or raw inner markup.
pub fn should_set_text_content(kind: &str, props: &Props) -> bool {
    kind == "textarea"
        || kind == "noscript"
        || props.text_children().is_some()
        || props
            .attribute(DANGEROUSLY_SET_INNER_HTML)
            .and_then(|html| html.get("__html"))
            .is_some_and(|html| !html.is_null())
}

// =============================================================================
// Tests
// =============================================================================
