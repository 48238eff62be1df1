//! Complete phase - build or diff host instances bottom-up.
//!
//! Runs once every child of a fiber has completed:
//!
//! - a mounting host component gets a fresh instance with all host
//!   descendants appended and its attributes applied, detached from the
//!   output tree until commit places it
//! - an updating host component gets an [`UpdatePayload`] diff and the
//!   `UPDATE` flag when anything changed
//! - a text fiber gets a text instance, or `UPDATE` when its content changed
//!
//! Every fiber then bubbles its children's flags into `subtree_flags`.

use serde_json::{Map, Value};

use crate::element::{Props, STYLE};
use crate::engine::fiber::{FiberArena, FiberId};
use crate::error::{ReconcileError, Result};
use crate::host::{HostConfig, PropChange, UpdatePayload};
use crate::types::{Flags, WorkTag};

use super::root::FiberRoot;

pub(crate) fn complete_work<H: HostConfig>(
    root: &mut FiberRoot<H>,
    current: Option<FiberId>,
    work_in_progress: FiberId,
) -> Result<()> {
    let tag = root.arena.fiber(work_in_progress)?.tag;
    match tag {
        WorkTag::Root
        | WorkTag::Fragment
        | WorkTag::IndeterminateComponent
        | WorkTag::ClassComponent
        | WorkTag::ContextProvider => {}
        WorkTag::HostComponent => complete_host_component(root, current, work_in_progress)?,
        WorkTag::HostText => complete_host_text(root, current, work_in_progress)?,
    }
    bubble_properties(&mut root.arena, work_in_progress)
}

fn complete_host_component<H: HostConfig>(
    root: &mut FiberRoot<H>,
    current: Option<FiberId>,
    work_in_progress: FiberId,
) -> Result<()> {
    let fiber = root.arena.fiber(work_in_progress)?;
    let kind = fiber
        .host_type()
        .ok_or_else(|| ReconcileError::UnrecognizedKind("host fiber without a tag".into()))?
        .to_string();
    let new_props = fiber.pending_props.element().cloned().unwrap_or_default();
    let has_instance = current.is_some() && fiber.state_node.is_some();

    if has_instance {
        let old_props = match current {
            Some(id) => root.arena.fiber(id)?.memoized_props.element().cloned(),
            None => None,
        }
        .unwrap_or_default();
        if std::rc::Rc::ptr_eq(&old_props, &new_props) {
            return Ok(());
        }
        let payload = diff_properties(&old_props, &new_props);
        if !payload.is_empty() {
            tracing::trace!(kind = %kind, changes = payload.len(), "host update");
            let fiber = root.arena.fiber_mut(work_in_progress)?;
            fiber.update_payload = Some(payload);
            fiber.flags |= Flags::UPDATE;
        }
        return Ok(());
    }

    let instance = root.host.create_instance(&kind, &new_props);
    append_all_children(root, &instance, work_in_progress)?;
    root.host.apply_attributes(&instance, &kind, &new_props);
    root.arena.fiber_mut(work_in_progress)?.state_node = Some(instance);
    Ok(())
}

fn complete_host_text<H: HostConfig>(
    root: &mut FiberRoot<H>,
    current: Option<FiberId>,
    work_in_progress: FiberId,
) -> Result<()> {
    let fiber = root.arena.fiber(work_in_progress)?;
    let new_text = fiber.pending_props.text().unwrap_or_default().to_string();

    match current {
        Some(id) if fiber.state_node.is_some() => {
            let old_text = root.arena.fiber(id)?.memoized_props.text();
            if old_text != Some(new_text.as_str()) {
                root.arena.fiber_mut(work_in_progress)?.flags |= Flags::UPDATE;
            }
        }
        _ => {
            let instance = root.host.create_text_instance(&new_text);
            root.arena.fiber_mut(work_in_progress)?.state_node = Some(instance);
        }
    }
    Ok(())
}

/// Append the top-level host instances of the subtree under
/// `work_in_progress` to `parent`, descending through non-host fibers.
fn append_all_children<H: HostConfig>(
    root: &mut FiberRoot<H>,
    parent: &H::Instance,
    work_in_progress: FiberId,
) -> Result<()> {
    let mut node = root.arena.fiber(work_in_progress)?.child;
    while let Some(id) = node {
        let fiber = root.arena.fiber(id)?;
        if fiber.tag.is_host() {
            let instance = fiber
                .state_node
                .clone()
                .ok_or(ReconcileError::MissingInstance("append_all_children"))?;
            root.host.append_child(parent, &instance);
        } else if let Some(child) = fiber.child {
            node = Some(child);
            continue;
        }

        // Climb until a sibling is found, stopping at the subtree root.
        let mut cursor = id;
        node = loop {
            let fiber = root.arena.fiber(cursor)?;
            if let Some(sibling) = fiber.sibling {
                break Some(sibling);
            }
            match fiber.return_fiber {
                Some(up) if up != work_in_progress => cursor = up,
                _ => break None,
            }
        };
    }
    Ok(())
}

/// Fold the children's flags into `completed.subtree_flags` and repair their
/// return links.
pub(crate) fn bubble_properties<I: Clone>(
    arena: &mut FiberArena<I>,
    completed: FiberId,
) -> Result<()> {
    let mut subtree_flags = Flags::NONE;
    let mut child = arena.fiber(completed)?.child;
    while let Some(id) = child {
        let fiber = arena.fiber_mut(id)?;
        subtree_flags |= fiber.subtree_flags | fiber.flags;
        fiber.return_fiber = Some(completed);
        child = fiber.sibling;
    }
    arena.fiber_mut(completed)?.subtree_flags |= subtree_flags;
    Ok(())
}

// =============================================================================
// Property Diff
// =============================================================================

/// Compute the changes turning `old` into `new`.
///
/// Removed attributes come first, then changed ones. Style maps are diffed
/// per entry. Direct text children produce a text content change.
pub fn diff_properties(old: &Props, new: &Props) -> UpdatePayload {
    let mut payload = UpdatePayload::default();
    let empty = Map::new();

    for (name, old_value) in &old.attributes {
        if new.attributes.contains_key(name) {
            continue;
        }
        if name == STYLE {
            for style_name in old_value.as_object().unwrap_or(&empty).keys() {
                payload.push(PropChange::Style {
                    name: style_name.clone(),
                    value: None,
                });
            }
        } else {
            payload.push(PropChange::Attribute {
                name: name.clone(),
                value: None,
            });
        }
    }

    for (name, new_value) in &new.attributes {
        let old_value = old.attributes.get(name);
        if old_value == Some(new_value) {
            continue;
        }
        if name == STYLE {
            diff_style(
                &mut payload,
                old_value.and_then(Value::as_object).unwrap_or(&empty),
                new_value.as_object().unwrap_or(&empty),
            );
        } else if new_value.is_null() {
            if old_value.is_some_and(|value| !value.is_null()) {
                payload.push(PropChange::Attribute {
                    name: name.clone(),
                    value: None,
                });
            }
        } else {
            payload.push(PropChange::Attribute {
                name: name.clone(),
                value: Some(new_value.clone()),
            });
        }
    }

    if let Some(text) = new.text_children() {
        if old.text_children().as_ref() != Some(&text) {
            payload.push(PropChange::TextContent(text));
        }
    }
    payload
}

fn diff_style(payload: &mut UpdatePayload, old: &Map<String, Value>, new: &Map<String, Value>) {
    for name in old.keys() {
        if !new.contains_key(name) {
            payload.push(PropChange::Style {
                name: name.clone(),
                value: None,
            });
        }
    }
    for (name, value) in new {
        if old.get(name) != Some(value) {
            payload.push(PropChange::Style {
                name: name.clone(),
                value: Some(value.clone()),
            });
        }
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
    fn test_identical_props_diff_empty() {
        let a = Element::host("span").attr("id", "x").style("color", "cyan").text("hi");
        let b = Element::host("span").attr("id", "x").style("color", "cyan").text("hi");
        assert!(diff_properties(a.props(), b.props()).is_empty());
    }

    #[test]
    fn test_attribute_set_and_remove() {
        let old = Element::host("a").attr("href", "/x").attr("title", "t");
        let new = Element::host("a").attr("href", "/y");
        let payload = diff_properties(old.props(), new.props());
        assert_eq!(
            payload.changes,
            vec![
                PropChange::Attribute { name: "title".into(), value: None },
                PropChange::Attribute { name: "href".into(), value: Some(json!("/y")) },
            ]
        );
    }

    #[test]
    fn test_style_diff_per_entry() {
        let old = Element::host("p").style("color", "red").style("margin", 1);
        let new = Element::host("p").style("color", "blue");
        let payload = diff_properties(old.props(), new.props());
        assert_eq!(
            payload.changes,
            vec![
                PropChange::Style { name: "margin".into(), value: None },
                PropChange::Style { name: "color".into(), value: Some(json!("blue")) },
            ]
        );
    }

    #[test]
    fn test_style_removed_entirely() {
        let old = Element::host("p").style("color", "red");
        let new = Element::host("p");
        let payload = diff_properties(old.props(), new.props());
        assert_eq!(
            payload.changes,
            vec![PropChange::Style { name: "color".into(), value: None }]
        );
    }

    #[test]
    fn test_text_children_change() {
        let old = Element::host("p").text("a");
        let new = Element::host("p").text("b");
        let payload = diff_properties(old.props(), new.props());
        assert_eq!(payload.changes, vec![PropChange::TextContent("b".into())]);
    }

    #[test]
    fn test_null_attribute_is_absent() {
        let old = Element::host("p");
        let new = Element::host("p").attr("hidden", Value::Null);
        assert!(diff_properties(old.props(), new.props()).is_empty());
    }

    #[test]
    fn test_bubble_unions_child_flags() {
        let mut arena: FiberArena<u32> = FiberArena::new();
        let parent = arena.create_host_root_fiber();
        let a = arena.create_fiber_from_text("a");
        let b = arena.create_fiber_from_text("b");
        arena.fiber_mut(parent).unwrap().child = Some(a);
        arena.fiber_mut(a).unwrap().sibling = Some(b);
        arena.fiber_mut(a).unwrap().flags = Flags::PLACEMENT;
        arena.fiber_mut(b).unwrap().subtree_flags = Flags::UPDATE;

        bubble_properties(&mut arena, parent).unwrap();
        let fiber = arena.fiber(parent).unwrap();
        assert_eq!(fiber.subtree_flags, Flags::PLACEMENT | Flags::UPDATE);
        assert_eq!(fiber.flags, Flags::NONE);
        assert_eq!(arena.fiber(b).unwrap().return_fiber, Some(parent));
    }
}
