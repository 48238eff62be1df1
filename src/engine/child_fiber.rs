//! Child reconciliation - diffing new children against the current ones.
//!
//! Given the first current child of a fiber and the children its new props
//! describe, produce the linked list of work-in-progress children and mark
//! the effects commit has to apply:
//!
//! - reused fibers are produced with `create_work_in_progress`, so their host
//!   instances survive
//! - fibers that must enter the output tree get `PLACEMENT`
//! - current fibers without a counterpart are listed on the parent's
//!   `deletions` with `CHILD_DELETION`
//!
//! Lists are matched in three phases: a lockstep walk while keys agree, then
//! either bulk deletion or bulk creation when one side runs out, and
//! finally a key map over the remaining current children. Moves are detected
//! against the highest old index placed so far.
//!
//! With `track_effects` off (first mount of a subtree) no flags are written;
//! the whole subtree is placed by its root.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::element::{format_number, Element, ElementKind, Node};
use crate::engine::fiber::{FiberArena, FiberId, FiberProps};
use crate::error::Result;
use crate::types::{Flags, Key, WorkTag};

/// Lookup key of a remaining current child.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum SlotKey {
    Key(Key),
    Index(usize),
}

impl SlotKey {
    fn of(key: Option<&Key>, index: usize) -> Self {
        match key {
            Some(key) => Self::Key(key.clone()),
            None => Self::Index(index),
        }
    }
}

/// Text content of a child in text position, if it renders as text.
fn text_of(node: &Node) -> Option<String> {
    match node {
        Node::Text(text) if !text.is_empty() => Some(text.clone()),
        Node::Number(n) => Some(format_number(*n)),
        _ => None,
    }
}

fn is_fragment(element: &Element) -> bool {
    matches!(element.kind(), ElementKind::Fragment)
}

/// Diffs one fiber's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildReconciler {
    track_effects: bool,
    warn_duplicate_keys: bool,
}

impl ChildReconciler {
    /// Reconciler for fibers that already have a current version.
    pub const RECONCILE: Self = Self {
        track_effects: true,
        warn_duplicate_keys: false,
    };

    /// Reconciler for the first mount of a subtree.
    pub const MOUNT: Self = Self {
        track_effects: false,
        warn_duplicate_keys: false,
    };

    pub fn warn_duplicate_keys(mut self, warn: bool) -> Self {
        self.warn_duplicate_keys = warn;
        self
    }

    pub fn tracks_effects(&self) -> bool {
        self.track_effects
    }

    /// Reconcile `new_child` against the list starting at
    /// `current_first_child` and return the first produced child.
    pub fn reconcile_child_fibers<I: Clone>(
        &self,
        arena: &mut FiberArena<I>,
        return_fiber: FiberId,
        current_first_child: Option<FiberId>,
        new_child: &Node,
    ) -> Result<Option<FiberId>> {
        // An unkeyed fragment at the top is only a list wrapper.
        let new_child = match new_child {
            Node::Element(element) if is_fragment(element) && element.key().is_none() => {
                &element.props().children
            }
            other => other,
        };

        match new_child {
            Node::Element(element) => {
                let fiber =
                    self.reconcile_single_element(arena, return_fiber, current_first_child, element)?;
                Ok(Some(self.place_single_child(arena, fiber)?))
            }
            Node::List(children) => {
                self.reconcile_children_array(arena, return_fiber, current_first_child, children)
            }
            other => match text_of(other) {
                Some(text) => {
                    let fiber = self.reconcile_single_text_node(
                        arena,
                        return_fiber,
                        current_first_child,
                        &text,
                    )?;
                    Ok(Some(self.place_single_child(arena, fiber)?))
                }
                None => {
                    self.delete_remaining_children(arena, return_fiber, current_first_child)?;
                    Ok(None)
                }
            },
        }
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    fn delete_child<I: Clone>(
        &self,
        arena: &mut FiberArena<I>,
        return_fiber: FiberId,
        child: FiberId,
    ) -> Result<()> {
        if !self.track_effects {
            return Ok(());
        }
        let parent = arena.fiber_mut(return_fiber)?;
        parent.deletions.push(child);
        parent.flags |= Flags::CHILD_DELETION;
        Ok(())
    }

    fn delete_remaining_children<I: Clone>(
        &self,
        arena: &mut FiberArena<I>,
        return_fiber: FiberId,
        first: Option<FiberId>,
    ) -> Result<()> {
        if !self.track_effects {
            return Ok(());
        }
        let mut child = first;
        while let Some(id) = child {
            child = arena.fiber(id)?.sibling;
            self.delete_child(arena, return_fiber, id)?;
        }
        Ok(())
    }

    /// Index the remaining prior children by key, or by position when
    /// unkeyed. A prior sibling shadowed by a later one with the same key can
    /// never be matched, so it is deleted right away.
    fn map_remaining_children<I: Clone>(
        &self,
        arena: &mut FiberArena<I>,
        return_fiber: FiberId,
        first: Option<FiberId>,
    ) -> Result<HashMap<SlotKey, FiberId>> {
        let mut existing = HashMap::new();
        let mut child = first;
        while let Some(id) = child {
            let fiber = arena.fiber(id)?;
            let slot = SlotKey::of(fiber.key.as_ref(), fiber.index);
            child = fiber.sibling;
            if let Some(shadowed) = existing.insert(slot, id) {
                tracing::warn!(?shadowed, "previous children share a key");
                self.delete_child(arena, return_fiber, shadowed)?;
            }
        }
        Ok(existing)
    }

    // =========================================================================
    // Placement
    // =========================================================================

    fn use_fiber<I: Clone>(
        &self,
        arena: &mut FiberArena<I>,
        fiber: FiberId,
        pending_props: FiberProps,
    ) -> Result<FiberId> {
        let clone = arena.create_work_in_progress(fiber, pending_props)?;
        let wip = arena.fiber_mut(clone)?;
        wip.index = 0;
        wip.sibling = None;
        Ok(clone)
    }

    /// Record `new_index` and decide whether the fiber moves.
    ///
    /// A reused fiber whose old index is below `last_placed_index` was
    /// overtaken by a sibling and must be moved; otherwise it stays and
    /// raises the watermark to its old index.
    fn place_child<I: Clone>(
        &self,
        arena: &mut FiberArena<I>,
        new_fiber: FiberId,
        last_placed_index: usize,
        new_index: usize,
    ) -> Result<usize> {
        let fiber = arena.fiber_mut(new_fiber)?;
        fiber.index = new_index;
        if !self.track_effects {
            return Ok(last_placed_index);
        }
        let Some(current) = fiber.alternate else {
            fiber.flags |= Flags::PLACEMENT;
            return Ok(last_placed_index);
        };
        let old_index = arena.fiber(current)?.index;
        if old_index < last_placed_index {
            arena.fiber_mut(new_fiber)?.flags |= Flags::PLACEMENT;
            Ok(last_placed_index)
        } else {
            Ok(old_index)
        }
    }

    fn place_single_child<I: Clone>(
        &self,
        arena: &mut FiberArena<I>,
        new_fiber: FiberId,
    ) -> Result<FiberId> {
        let fiber = arena.fiber_mut(new_fiber)?;
        if self.track_effects && fiber.alternate.is_none() {
            fiber.flags |= Flags::PLACEMENT;
        }
        Ok(new_fiber)
    }

    // =========================================================================
    // Slot Updates
    // =========================================================================

    fn update_text_node<I: Clone>(
        &self,
        arena: &mut FiberArena<I>,
        return_fiber: FiberId,
        current: Option<FiberId>,
        text: &str,
    ) -> Result<FiberId> {
        let reusable = match current {
            Some(id) if arena.fiber(id)?.tag == WorkTag::HostText => Some(id),
            _ => None,
        };
        let fiber = match reusable {
            Some(id) => self.use_fiber(arena, id, FiberProps::Text(text.to_string()))?,
            None => arena.create_fiber_from_text(text),
        };
        arena.fiber_mut(fiber)?.return_fiber = Some(return_fiber);
        Ok(fiber)
    }

    fn update_element<I: Clone>(
        &self,
        arena: &mut FiberArena<I>,
        return_fiber: FiberId,
        current: Option<FiberId>,
        element: &Rc<Element>,
    ) -> Result<FiberId> {
        if is_fragment(element) {
            return self.update_fragment(
                arena,
                return_fiber,
                current,
                element.props().children.clone(),
                element.key().cloned(),
            );
        }

        let reusable = match current {
            Some(id) if arena.fiber(id)?.element_type.as_ref() == Some(element.kind()) => Some(id),
            _ => None,
        };
        let fiber = match reusable {
            Some(id) => {
                let existing =
                    self.use_fiber(arena, id, FiberProps::Element(element.props().clone()))?;
                arena.fiber_mut(existing)?.node_ref = element.node_ref().cloned();
                existing
            }
            None => arena.create_fiber_from_element(element)?,
        };
        arena.fiber_mut(fiber)?.return_fiber = Some(return_fiber);
        Ok(fiber)
    }

    fn update_fragment<I: Clone>(
        &self,
        arena: &mut FiberArena<I>,
        return_fiber: FiberId,
        current: Option<FiberId>,
        children: Node,
        key: Option<Key>,
    ) -> Result<FiberId> {
        let reusable = match current {
            Some(id) if arena.fiber(id)?.tag == WorkTag::Fragment => Some(id),
            _ => None,
        };
        let fiber = match reusable {
            Some(id) => self.use_fiber(arena, id, FiberProps::Children(children))?,
            None => arena.create_fiber_from_fragment(children, key),
        };
        arena.fiber_mut(fiber)?.return_fiber = Some(return_fiber);
        Ok(fiber)
    }

    fn create_child<I: Clone>(
        &self,
        arena: &mut FiberArena<I>,
        return_fiber: FiberId,
        new_child: &Node,
    ) -> Result<Option<FiberId>> {
        let created = match new_child {
            Node::Element(element) => arena.create_fiber_from_element(element)?,
            Node::List(_) => arena.create_fiber_from_fragment(new_child.clone(), None),
            other => match text_of(other) {
                Some(text) => arena.create_fiber_from_text(&text),
                None => return Ok(None),
            },
        };
        arena.fiber_mut(created)?.return_fiber = Some(return_fiber);
        Ok(Some(created))
    }

    /// Try to fill the slot held by `old_fiber`. `None` means the keys
    /// disagree and the lockstep walk must stop.
    fn update_slot<I: Clone>(
        &self,
        arena: &mut FiberArena<I>,
        return_fiber: FiberId,
        old_fiber: Option<FiberId>,
        new_child: &Node,
    ) -> Result<Option<FiberId>> {
        let key = match old_fiber {
            Some(id) => arena.fiber(id)?.key.clone(),
            None => None,
        };

        match new_child {
            Node::Element(element) => {
                if element.key() != key.as_ref() {
                    return Ok(None);
                }
                self.update_element(arena, return_fiber, old_fiber, element)
                    .map(Some)
            }
            Node::List(_) => {
                if key.is_some() {
                    return Ok(None);
                }
                self.update_fragment(arena, return_fiber, old_fiber, new_child.clone(), None)
                    .map(Some)
            }
            other => match text_of(other) {
                Some(text) if key.is_none() => self
                    .update_text_node(arena, return_fiber, old_fiber, &text)
                    .map(Some),
                _ => Ok(None),
            },
        }
    }

    fn update_from_map<I: Clone>(
        &self,
        arena: &mut FiberArena<I>,
        existing: &HashMap<SlotKey, FiberId>,
        return_fiber: FiberId,
        new_index: usize,
        new_child: &Node,
    ) -> Result<Option<FiberId>> {
        let by_index = existing.get(&SlotKey::Index(new_index)).copied();
        match new_child {
            Node::Element(element) => {
                let matched = existing
                    .get(&SlotKey::of(element.key(), new_index))
                    .copied();
                self.update_element(arena, return_fiber, matched, element)
                    .map(Some)
            }
            Node::List(_) => self
                .update_fragment(arena, return_fiber, by_index, new_child.clone(), None)
                .map(Some),
            other => match text_of(other) {
                Some(text) => self
                    .update_text_node(arena, return_fiber, by_index, &text)
                    .map(Some),
                None => Ok(None),
            },
        }
    }

    // =========================================================================
    // Lists
    // =========================================================================

    fn warn_on_duplicate_keys(&self, new_children: &[Node]) {
        let mut seen = HashSet::new();
        for key in new_children.iter().filter_map(Node::key) {
            if !seen.insert(key) {
                tracing::warn!(key = %key, "encountered two children with the same key");
            }
        }
    }

    fn reconcile_children_array<I: Clone>(
        &self,
        arena: &mut FiberArena<I>,
        return_fiber: FiberId,
        current_first_child: Option<FiberId>,
        new_children: &[Node],
    ) -> Result<Option<FiberId>> {
        if self.warn_duplicate_keys {
            self.warn_on_duplicate_keys(new_children);
        }

        let mut list = ChildList::default();
        let mut old_fiber = current_first_child;
        let mut last_placed_index = 0;
        let mut new_index = 0;

        // Lockstep walk while the slots line up.
        while let Some(old) = old_fiber {
            let Some(new_child) = new_children.get(new_index) else {
                break;
            };
            let old_state = arena.fiber(old)?;
            let (slot, next_old_fiber) = if old_state.index > new_index {
                (None, Some(old))
            } else {
                (Some(old), old_state.sibling)
            };

            let Some(new_fiber) = self.update_slot(arena, return_fiber, slot, new_child)? else {
                break;
            };
            if let Some(slot) = slot {
                if self.track_effects && arena.fiber(new_fiber)?.alternate.is_none() {
                    // Same slot, different kind: the old fiber goes away.
                    self.delete_child(arena, return_fiber, slot)?;
                }
            }
            last_placed_index = self.place_child(arena, new_fiber, last_placed_index, new_index)?;
            list.push(arena, new_fiber)?;
            old_fiber = next_old_fiber;
            new_index += 1;
        }

        if new_index == new_children.len() {
            self.delete_remaining_children(arena, return_fiber, old_fiber)?;
            return Ok(list.first);
        }

        if old_fiber.is_none() {
            for (offset, new_child) in new_children[new_index..].iter().enumerate() {
                let index = new_index + offset;
                let Some(new_fiber) = self.create_child(arena, return_fiber, new_child)? else {
                    continue;
                };
                last_placed_index = self.place_child(arena, new_fiber, last_placed_index, index)?;
                list.push(arena, new_fiber)?;
            }
            return Ok(list.first);
        }

        // Keyed lookup over whatever is left.
        let mut existing = self.map_remaining_children(arena, return_fiber, old_fiber)?;
        for (offset, new_child) in new_children[new_index..].iter().enumerate() {
            let index = new_index + offset;
            let Some(new_fiber) =
                self.update_from_map(arena, &existing, return_fiber, index, new_child)?
            else {
                continue;
            };
            if self.track_effects {
                let fiber = arena.fiber(new_fiber)?;
                if fiber.alternate.is_some() {
                    existing.remove(&SlotKey::of(fiber.key.as_ref(), index));
                }
            }
            last_placed_index = self.place_child(arena, new_fiber, last_placed_index, index)?;
            list.push(arena, new_fiber)?;
        }

        if self.track_effects {
            let mut leftovers = existing.into_values().collect::<Vec<_>>();
            leftovers.sort_by_key(|id| arena.get(*id).map_or(usize::MAX, |fiber| fiber.index));
            for id in leftovers {
                self.delete_child(arena, return_fiber, id)?;
            }
        }

        Ok(list.first)
    }

    // =========================================================================
    // Single Children
    // =========================================================================

    fn reconcile_single_element<I: Clone>(
        &self,
        arena: &mut FiberArena<I>,
        return_fiber: FiberId,
        current_first_child: Option<FiberId>,
        element: &Rc<Element>,
    ) -> Result<FiberId> {
        let key = element.key();
        let mut child = current_first_child;
        while let Some(id) = child {
            let fiber = arena.fiber(id)?;
            let sibling = fiber.sibling;
            if fiber.key.as_ref() != key {
                self.delete_child(arena, return_fiber, id)?;
                child = sibling;
                continue;
            }

            let reusable = if is_fragment(element) {
                fiber.tag == WorkTag::Fragment
            } else {
                fiber.element_type.as_ref() == Some(element.kind())
            };
            if !reusable {
                self.delete_remaining_children(arena, return_fiber, Some(id))?;
                break;
            }

            self.delete_remaining_children(arena, return_fiber, sibling)?;
            let props = if is_fragment(element) {
                FiberProps::Children(element.props().children.clone())
            } else {
                FiberProps::Element(element.props().clone())
            };
            let existing = self.use_fiber(arena, id, props)?;
            let fiber = arena.fiber_mut(existing)?;
            fiber.node_ref = element.node_ref().cloned();
            fiber.return_fiber = Some(return_fiber);
            return Ok(existing);
        }

        let created = if is_fragment(element) {
            arena.create_fiber_from_fragment(element.props().children.clone(), key.cloned())
        } else {
            arena.create_fiber_from_element(element)?
        };
        arena.fiber_mut(created)?.return_fiber = Some(return_fiber);
        Ok(created)
    }

    fn reconcile_single_text_node<I: Clone>(
        &self,
        arena: &mut FiberArena<I>,
        return_fiber: FiberId,
        current_first_child: Option<FiberId>,
        text: &str,
    ) -> Result<FiberId> {
        if let Some(id) = current_first_child {
            let fiber = arena.fiber(id)?;
            if fiber.tag == WorkTag::HostText {
                let sibling = fiber.sibling;
                self.delete_remaining_children(arena, return_fiber, sibling)?;
                let existing = self.use_fiber(arena, id, FiberProps::Text(text.to_string()))?;
                arena.fiber_mut(existing)?.return_fiber = Some(return_fiber);
                return Ok(existing);
            }
        }
        self.delete_remaining_children(arena, return_fiber, current_first_child)?;
        let created = arena.create_fiber_from_text(text);
        arena.fiber_mut(created)?.return_fiber = Some(return_fiber);
        Ok(created)
    }
}

/// Produced children, linked through `sibling` as they are appended.
#[derive(Debug, Default)]
struct ChildList {
    first: Option<FiberId>,
    last: Option<FiberId>,
}

impl ChildList {
    fn push<I: Clone>(&mut self, arena: &mut FiberArena<I>, fiber: FiberId) -> Result<()> {
        match self.last {
            Some(previous) => arena.fiber_mut(previous)?.sibling = Some(fiber),
            None => self.first = Some(fiber),
        }
        self.last = Some(fiber);
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
