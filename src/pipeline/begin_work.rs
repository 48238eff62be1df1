//! Begin phase - compute the next children of one fiber.
//!
//! Dispatches on the fiber's tag, figures out what its children should be
//! now (root state, host props, fragment list, or a component's render
//! output), reconciles them against the current children and returns the
//! first produced child as the next unit of work.

use std::rc::Rc;

use crate::config::UnsupportedTagPolicy;
use crate::element::{ElementKind, Node, Props};
use crate::engine::child_fiber::ChildReconciler;
use crate::engine::fiber::FiberId;
use crate::engine::update_queue::process_update_queue;
use crate::error::{ReconcileError, Result};
use crate::host::HostConfig;
use crate::types::{Flags, WorkTag};

use super::root::FiberRoot;

/// Process `work_in_progress` and return its first child, if any.
///
/// `current` is the committed version of the same fiber, `None` on mount.
pub(crate) fn begin_work<H: HostConfig>(
    root: &mut FiberRoot<H>,
    current: Option<FiberId>,
    work_in_progress: FiberId,
) -> Result<Option<FiberId>> {
    let tag = root.arena.fiber(work_in_progress)?.tag;
    tracing::trace!(?tag, "begin work");
    match tag {
        WorkTag::Root => update_host_root(root, current, work_in_progress),
        WorkTag::HostComponent => update_host_component(root, current, work_in_progress),
        WorkTag::HostText => Ok(None),
        WorkTag::Fragment => update_fragment(root, current, work_in_progress),
        WorkTag::ContextProvider => update_context_provider(root, current, work_in_progress),
        WorkTag::IndeterminateComponent => {
            mount_indeterminate_component(root, current, work_in_progress)
        }
        WorkTag::ClassComponent => unsupported(root, work_in_progress, tag),
    }
}

/// Reconcile `next_children` into `work_in_progress.child`.
///
/// Mounting subtrees skip effect tracking; their root carries the single
/// placement for the whole subtree.
pub(crate) fn reconcile_children<H: HostConfig>(
    root: &mut FiberRoot<H>,
    current: Option<FiberId>,
    work_in_progress: FiberId,
    next_children: &Node,
) -> Result<()> {
    let (reconciler, current_child) = match current {
        None => (ChildReconciler::MOUNT, None),
        Some(current) => (ChildReconciler::RECONCILE, root.arena.fiber(current)?.child),
    };
    let reconciler = reconciler.warn_duplicate_keys(root.config.warn_duplicate_keys);
    let child = reconciler.reconcile_child_fibers(
        &mut root.arena,
        work_in_progress,
        current_child,
        next_children,
    )?;
    root.arena.fiber_mut(work_in_progress)?.child = child;
    Ok(())
}

fn update_host_root<H: HostConfig>(
    root: &mut FiberRoot<H>,
    current: Option<FiberId>,
    work_in_progress: FiberId,
) -> Result<Option<FiberId>> {
    let fiber = root.arena.fiber_mut(work_in_progress)?;
    let applied = process_update_queue(fiber);
    tracing::trace!(applied, "processed root updates");
    let next_children = fiber
        .memoized_state
        .as_ref()
        .and_then(|state| state.root_element())
        .cloned()
        .unwrap_or_default();

    reconcile_children(root, current, work_in_progress, &next_children)?;
    Ok(root.arena.fiber(work_in_progress)?.child)
}

fn update_host_component<H: HostConfig>(
    root: &mut FiberRoot<H>,
    current: Option<FiberId>,
    work_in_progress: FiberId,
) -> Result<Option<FiberId>> {
    let fiber = root.arena.fiber(work_in_progress)?;
    let kind = fiber
        .host_type()
        .ok_or_else(|| ReconcileError::UnrecognizedKind("host fiber without a tag".into()))?
        .to_string();
    let next_props = fiber.pending_props.element().cloned().unwrap_or_default();
    let prev_props = match current {
        Some(id) => root.arena.fiber(id)?.memoized_props.element().cloned(),
        None => None,
    };

    let is_direct_text_child = root.host.should_set_text_content(&kind, &next_props);
    let next_children = if is_direct_text_child {
        // Rendered as the instance's own text content, no child fiber.
        Node::Empty
    } else {
        next_props.children.clone()
    };
    let had_direct_text_child = !is_direct_text_child
        && prev_props
            .as_deref()
            .is_some_and(|prev: &Props| root.host.should_set_text_content(&kind, prev));
    if had_direct_text_child {
        root.arena.fiber_mut(work_in_progress)?.flags |= Flags::CONTENT_RESET;
    }

    mark_ref(root, current, work_in_progress)?;
    reconcile_children(root, current, work_in_progress, &next_children)?;
    Ok(root.arena.fiber(work_in_progress)?.child)
}

fn update_fragment<H: HostConfig>(
    root: &mut FiberRoot<H>,
    current: Option<FiberId>,
    work_in_progress: FiberId,
) -> Result<Option<FiberId>> {
    let next_children = root
        .arena
        .fiber(work_in_progress)?
        .pending_props
        .children()
        .cloned()
        .unwrap_or_default();
    reconcile_children(root, current, work_in_progress, &next_children)?;
    Ok(root.arena.fiber(work_in_progress)?.child)
}

fn update_context_provider<H: HostConfig>(
    root: &mut FiberRoot<H>,
    current: Option<FiberId>,
    work_in_progress: FiberId,
) -> Result<Option<FiberId>> {
    // Context values are not propagated; the provider only passes its
    // children through.
    update_fragment(root, current, work_in_progress)
}

fn mount_indeterminate_component<H: HostConfig>(
    root: &mut FiberRoot<H>,
    current: Option<FiberId>,
    work_in_progress: FiberId,
) -> Result<Option<FiberId>> {
    let fiber = root.arena.fiber(work_in_progress)?;
    let Some(ElementKind::Component(component)) = fiber.kind.clone() else {
        return Err(ReconcileError::UnrecognizedKind(
            "component fiber without a render function".into(),
        ));
    };
    let props: Rc<Props> = fiber.pending_props.element().cloned().unwrap_or_default();

    let children = component.render(&props);
    tracing::trace!(component = component.name(), "rendered component");
    reconcile_children(root, current, work_in_progress, &children)?;
    Ok(root.arena.fiber(work_in_progress)?.child)
}

fn unsupported<H: HostConfig>(
    root: &mut FiberRoot<H>,
    work_in_progress: FiberId,
    tag: WorkTag,
) -> Result<Option<FiberId>> {
    let name = match &root.arena.fiber(work_in_progress)?.kind {
        Some(ElementKind::Component(component)) => component.name().to_string(),
        _ => String::new(),
    };
    match root.config.unsupported_tags {
        UnsupportedTagPolicy::Error => Err(ReconcileError::UnsupportedTag { tag, name }),
        UnsupportedTagPolicy::Skip => {
            tracing::warn!(?tag, component = %name, "skipping unsupported fiber");
            root.arena.fiber_mut(work_in_progress)?.child = None;
            Ok(None)
        }
    }
}

/// Flag a ref change: a new ref on mount, or a different ref than before.
fn mark_ref<H: HostConfig>(
    root: &mut FiberRoot<H>,
    current: Option<FiberId>,
    work_in_progress: FiberId,
) -> Result<()> {
    let next_ref = root.arena.fiber(work_in_progress)?.node_ref.clone();
    let changed = match current {
        None => next_ref.is_some(),
        Some(id) => root.arena.fiber(id)?.node_ref != next_ref,
    };
    if changed {
        root.arena.fiber_mut(work_in_progress)?.flags |= Flags::REF;
    }
    Ok(())
}
