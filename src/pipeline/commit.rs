//! Commit phase - apply a finished tree to the output.
//!
//! Walks the finished tree depth-first, but only into subtrees whose
//! `subtree_flags` carry mutation effects. For each fiber, in order:
//!
//! 1. deletions recorded on it (host nodes removed, refs detached)
//! 2. its children
//! 3. its own placement (insert before the next stable host sibling, or
//!    append)
//! 4. content reset, attribute/text updates and detaching replaced refs
//!
//! Refs are attached in a second walk once every deletion has run, so a ref
//! moving off a deleted node ends up on its new owner. Afterwards the
//! finished tree becomes current and unreachable fibers are dropped.

use crate::engine::fiber::FiberId;
use crate::error::{ReconcileError, Result};
use crate::host::HostConfig;
use crate::types::{Flags, WorkTag};

use super::root::FiberRoot;

/// Commit `root.finished_work`, if any.
pub(crate) fn commit_root<H: HostConfig>(root: &mut FiberRoot<H>) -> Result<()> {
    let Some(finished) = root.finished_work.take() else {
        return Ok(());
    };
    let fiber = root.arena.fiber(finished)?;
    if (fiber.flags | fiber.subtree_flags).intersects(Flags::MUTATION_MASK) {
        commit_mutation_effects_on_fiber(root, finished)?;
    } else {
        tracing::trace!("no mutation effects");
    }
    let fiber = root.arena.fiber(finished)?;
    if (fiber.flags | fiber.subtree_flags).intersects(Flags::LAYOUT_MASK) {
        commit_layout_effects_on_fiber(root, finished)?;
    }

    root.current = finished;
    root.record_commit();
    let dropped = root.arena.retain_reachable(finished);
    tracing::debug!(
        commit = root.commit_count(),
        fibers = root.arena.len(),
        dropped,
        "commit complete"
    );
    Ok(())
}

fn commit_mutation_effects_on_fiber<H: HostConfig>(
    root: &mut FiberRoot<H>,
    finished_work: FiberId,
) -> Result<()> {
    recursively_traverse_mutation_effects(root, finished_work)?;
    commit_reconciliation_effects(root, finished_work)?;

    let fiber = root.arena.fiber(finished_work)?;
    let flags = fiber.flags;
    match fiber.tag {
        WorkTag::HostComponent => {
            let instance = fiber
                .state_node
                .clone()
                .ok_or(ReconcileError::MissingInstance("commit host component"))?;
            if flags.contains(Flags::CONTENT_RESET) {
                root.host.reset_text_content(&instance);
            }
            if flags.contains(Flags::UPDATE) {
                let kind = fiber.host_type().unwrap_or_default().to_string();
                let payload = root.arena.fiber_mut(finished_work)?.update_payload.take();
                if let Some(payload) = payload {
                    root.host.commit_update(&instance, &kind, &payload);
                }
            }
            if flags.contains(Flags::REF) {
                commit_detach_previous_ref(root, finished_work, &instance)?;
            }
        }
        WorkTag::HostText => {
            if flags.contains(Flags::UPDATE) {
                let instance = fiber
                    .state_node
                    .clone()
                    .ok_or(ReconcileError::MissingInstance("commit text"))?;
                let new_text = fiber.memoized_props.text().unwrap_or_default().to_string();
                let old_text = match fiber.alternate.and_then(|id| root.arena.get(id)) {
                    Some(current) => current.memoized_props.text().unwrap_or_default().to_string(),
                    None => new_text.clone(),
                };
                root.host.commit_text_update(&instance, &old_text, &new_text);
            }
        }
        _ => {}
    }

    let fiber = root.arena.fiber_mut(finished_work)?;
    fiber.flags.remove(Flags::CONTENT_RESET | Flags::UPDATE);
    Ok(())
}

fn recursively_traverse_mutation_effects<H: HostConfig>(
    root: &mut FiberRoot<H>,
    parent: FiberId,
) -> Result<()> {
    let deletions = std::mem::take(&mut root.arena.fiber_mut(parent)?.deletions);
    for child in deletions {
        commit_deletion_effects(root, parent, child)?;
    }
    root.arena.fiber_mut(parent)?.flags.remove(Flags::CHILD_DELETION);

    let fiber = root.arena.fiber(parent)?;
    if fiber.subtree_flags.intersects(Flags::MUTATION_MASK) {
        let mut child = fiber.child;
        while let Some(id) = child {
            commit_mutation_effects_on_fiber(root, id)?;
            child = root.arena.fiber(id)?.sibling;
        }
    }
    Ok(())
}

fn commit_reconciliation_effects<H: HostConfig>(
    root: &mut FiberRoot<H>,
    finished_work: FiberId,
) -> Result<()> {
    if root.arena.fiber(finished_work)?.flags.contains(Flags::PLACEMENT) {
        commit_placement(root, finished_work)?;
        root.arena.fiber_mut(finished_work)?.flags.remove(Flags::PLACEMENT);
    }
    Ok(())
}

// =============================================================================
// Placement
// =============================================================================

fn get_host_parent_fiber<H: HostConfig>(root: &FiberRoot<H>, fiber: FiberId) -> Result<FiberId> {
    let mut parent = root.arena.fiber(fiber)?.return_fiber;
    while let Some(id) = parent {
        let candidate = root.arena.fiber(id)?;
        if candidate.tag.is_host_parent() {
            return Ok(id);
        }
        parent = candidate.return_fiber;
    }
    Err(ReconcileError::MissingFiber("host parent"))
}

/// Find the host instance the placed fiber must be inserted before.
///
/// Skips siblings that are themselves being placed, since they are not in
/// the output tree yet, and descends through non-host siblings to their
/// first host node.
fn get_host_sibling<H: HostConfig>(
    root: &FiberRoot<H>,
    fiber: FiberId,
) -> Result<Option<H::Instance>> {
    let arena = &root.arena;
    let mut node = fiber;
    'siblings: loop {
        // Climb until some ancestor within the host parent has a sibling.
        let sibling = loop {
            let current = arena.fiber(node)?;
            if let Some(sibling) = current.sibling {
                break sibling;
            }
            match current.return_fiber {
                Some(parent) if !arena.fiber(parent)?.tag.is_host_parent() => node = parent,
                _ => return Ok(None),
            }
        };
        node = sibling;

        // Descend to the first host node of that sibling.
        loop {
            let current = arena.fiber(node)?;
            if current.tag.is_host() {
                break;
            }
            if current.flags.contains(Flags::PLACEMENT) {
                continue 'siblings;
            }
            match current.child {
                Some(child) => node = child,
                None => continue 'siblings,
            }
        }

        let host = arena.fiber(node)?;
        if !host.flags.contains(Flags::PLACEMENT) {
            return Ok(host.state_node.clone());
        }
    }
}

fn commit_placement<H: HostConfig>(root: &mut FiberRoot<H>, finished_work: FiberId) -> Result<()> {
    let parent_fiber = get_host_parent_fiber(root, finished_work)?;
    let parent = root.arena.fiber(parent_fiber)?;
    let parent_instance = match parent.tag {
        WorkTag::Root => root.container_info.clone(),
        _ => {
            let instance = parent
                .state_node
                .clone()
                .ok_or(ReconcileError::MissingInstance("placement parent"))?;
            if parent.flags.contains(Flags::CONTENT_RESET) {
                root.host.reset_text_content(&instance);
                root.arena
                    .fiber_mut(parent_fiber)?
                    .flags
                    .remove(Flags::CONTENT_RESET);
            }
            instance
        }
    };

    let before = get_host_sibling(root, finished_work)?;
    insert_or_append_placement_node(root, finished_work, before.as_ref(), &parent_instance)
}

fn insert_or_append_placement_node<H: HostConfig>(
    root: &mut FiberRoot<H>,
    node: FiberId,
    before: Option<&H::Instance>,
    parent: &H::Instance,
) -> Result<()> {
    let fiber = root.arena.fiber(node)?;
    if fiber.tag.is_host() {
        let instance = fiber
            .state_node
            .clone()
            .ok_or(ReconcileError::MissingInstance("placement"))?;
        match before {
            Some(before) => root.host.insert_before(parent, &instance, before),
            None => root.host.append_child(parent, &instance),
        }
        return Ok(());
    }

    let mut child = fiber.child;
    while let Some(id) = child {
        insert_or_append_placement_node(root, id, before, parent)?;
        child = root.arena.fiber(id)?.sibling;
    }
    Ok(())
}

// =============================================================================
// Deletion
// =============================================================================

fn commit_deletion_effects<H: HostConfig>(
    root: &mut FiberRoot<H>,
    return_fiber: FiberId,
    deleted: FiberId,
) -> Result<()> {
    // The nearest host parent, starting at the fiber that recorded the deletion.
    let mut host_parent = None;
    let mut parent = Some(return_fiber);
    while let Some(id) = parent {
        let fiber = root.arena.fiber(id)?;
        match fiber.tag {
            WorkTag::Root => {
                host_parent = Some(root.container_info.clone());
                break;
            }
            WorkTag::HostComponent => {
                host_parent = fiber.state_node.clone();
                break;
            }
            _ => parent = fiber.return_fiber,
        }
    }
    let host_parent = host_parent.ok_or(ReconcileError::MissingInstance("deletion parent"))?;

    commit_deletion_effects_on_fiber(root, Some(&host_parent), deleted)?;
    root.arena.fiber_mut(deleted)?.return_fiber = None;
    Ok(())
}

/// Remove the top-level host nodes under `deleted` from `host_parent` and
/// detach every ref in the subtree. Nested host nodes leave with their
/// ancestor, so they recurse with no parent.
fn commit_deletion_effects_on_fiber<H: HostConfig>(
    root: &mut FiberRoot<H>,
    host_parent: Option<&H::Instance>,
    deleted: FiberId,
) -> Result<()> {
    let fiber = root.arena.fiber(deleted)?;
    if !fiber.tag.is_host() {
        return recursively_traverse_deletion_effects(root, host_parent, deleted);
    }

    let instance = fiber.state_node.clone();
    if let (Some(node_ref), Some(instance)) = (&fiber.node_ref, &instance) {
        node_ref.detach_if(instance);
    }
    recursively_traverse_deletion_effects(root, None, deleted)?;
    if let (Some(parent), Some(instance)) = (host_parent, instance) {
        root.host.remove_child(parent, &instance);
    }
    Ok(())
}

fn recursively_traverse_deletion_effects<H: HostConfig>(
    root: &mut FiberRoot<H>,
    host_parent: Option<&H::Instance>,
    parent: FiberId,
) -> Result<()> {
    let mut child = root.arena.fiber(parent)?.child;
    while let Some(id) = child {
        commit_deletion_effects_on_fiber(root, host_parent, id)?;
        child = root.arena.fiber(id)?.sibling;
    }
    Ok(())
}

// =============================================================================
// Refs
// =============================================================================

fn commit_detach_previous_ref<H: HostConfig>(
    root: &mut FiberRoot<H>,
    finished_work: FiberId,
    instance: &H::Instance,
) -> Result<()> {
    let fiber = root.arena.fiber(finished_work)?;
    let previous_ref = fiber
        .alternate
        .and_then(|id| root.arena.get(id))
        .and_then(|current| current.node_ref.clone());
    if let Some(previous) = previous_ref {
        if fiber.node_ref.as_ref() != Some(&previous) {
            previous.detach_if(instance);
        }
    }
    Ok(())
}

fn commit_layout_effects_on_fiber<H: HostConfig>(
    root: &mut FiberRoot<H>,
    finished_work: FiberId,
) -> Result<()> {
    let fiber = root.arena.fiber(finished_work)?;
    if fiber.subtree_flags.intersects(Flags::LAYOUT_MASK) {
        let mut child = fiber.child;
        while let Some(id) = child {
            commit_layout_effects_on_fiber(root, id)?;
            child = root.arena.fiber(id)?.sibling;
        }
    }

    let fiber = root.arena.fiber(finished_work)?;
    if fiber.tag == WorkTag::HostComponent && fiber.flags.contains(Flags::REF) {
        let instance = fiber
            .state_node
            .clone()
            .ok_or(ReconcileError::MissingInstance("attach ref"))?;
        if let Some(node_ref) = &fiber.node_ref {
            node_ref.attach(instance);
        }
    }
    root.arena.fiber_mut(finished_work)?.flags.remove(Flags::REF);
    Ok(())
}
