//! Fiber - the unit of the persistent work tree.
//!
//! Fibers live in a [`FiberArena`] and refer to each other by [`FiberId`]:
//!
//! ```text
//!            Root ──alternate── Root'
//!             │child
//!             h1 ──sibling── (none)
//!             │child
//!          "hello " ──sibling── span
//! ```
//!
//! `child`/`sibling` encode the n-ary tree as a left-child/right-sibling
//! list, `return_fiber` points back to the parent, and `alternate` pairs a
//! fiber with its version in the other buffer. None of these links own
//! anything; the arena owns every fiber, and [`FiberArena::retain_reachable`]
//! drops the ones a commit left behind.

use std::collections::HashSet;
use std::rc::Rc;

use slotmap::SlotMap;

use crate::element::{Element, ElementKind, Node, NodeRef, Props};
use crate::engine::update_queue::{State, UpdateQueue};
use crate::error::{ReconcileError, Result};
use crate::host::UpdatePayload;
use crate::types::{Flags, Key, WorkTag};

slotmap::new_key_type! {
    /// Stable handle to a fiber in a [`FiberArena`].
    pub struct FiberId;
}

// =============================================================================
// Fiber Props
// =============================================================================

/// Props as seen by a fiber. Their shape depends on the tag.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum FiberProps {
    /// Root fibers carry no props.
    #[default]
    None,
    /// Attributes and children of a host node or component.
    Element(Rc<Props>),
    /// Raw content of a text fiber.
    Text(String),
    /// Children of a fragment, stored directly.
    Children(Node),
}

impl FiberProps {
    pub fn element(&self) -> Option<&Rc<Props>> {
        match self {
            Self::Element(props) => Some(props),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn children(&self) -> Option<&Node> {
        match self {
            Self::Children(children) => Some(children),
            Self::Element(props) => Some(&props.children),
            _ => None,
        }
    }
}

// =============================================================================
// Fiber
// =============================================================================

/// One version of one logical node of the work tree.
///
/// `I` is the host instance type stored in `state_node`.
#[derive(Debug, Clone)]
pub struct Fiber<I> {
    pub tag: WorkTag,
    pub key: Option<Key>,
    /// Kind of the description this fiber was created from.
    pub element_type: Option<ElementKind>,
    /// Kind used to decide between creation and reuse.
    pub kind: Option<ElementKind>,
    /// Output-tree instance for host fibers.
    pub state_node: Option<I>,

    pub return_fiber: Option<FiberId>,
    pub child: Option<FiberId>,
    pub sibling: Option<FiberId>,
    /// Position among siblings in the last reconciliation.
    pub index: usize,

    pub node_ref: Option<NodeRef>,

    pub pending_props: FiberProps,
    pub memoized_props: FiberProps,
    pub update_queue: Option<UpdateQueue>,
    pub memoized_state: Option<State>,
    /// Attribute diff computed in complete, applied in commit.
    pub update_payload: Option<UpdatePayload>,

    pub flags: Flags,
    pub subtree_flags: Flags,
    pub deletions: Vec<FiberId>,

    pub alternate: Option<FiberId>,
}

impl<I> Fiber<I> {
    fn new(tag: WorkTag, pending_props: FiberProps, key: Option<Key>) -> Self {
        Self {
            tag,
            key,
            element_type: None,
            kind: None,
            state_node: None,
            return_fiber: None,
            child: None,
            sibling: None,
            index: 0,
            node_ref: None,
            pending_props,
            memoized_props: FiberProps::None,
            update_queue: None,
            memoized_state: None,
            update_payload: None,
            flags: Flags::NONE,
            subtree_flags: Flags::NONE,
            deletions: Vec::new(),
            alternate: None,
        }
    }

    /// Tag name of a host component fiber.
    pub fn host_type(&self) -> Option<&str> {
        match &self.kind {
            Some(ElementKind::Host(tag)) => Some(tag),
            _ => None,
        }
    }
}

// =============================================================================
// Fiber Arena
// =============================================================================

/// Owner of every fiber of both buffers.
#[derive(Debug)]
pub struct FiberArena<I> {
    fibers: SlotMap<FiberId, Fiber<I>>,
}

impl<I> Default for FiberArena<I> {
    fn default() -> Self {
        Self {
            fibers: SlotMap::with_key(),
        }
    }
}

impl<I: Clone> FiberArena<I> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live fibers across both buffers.
    pub fn len(&self) -> usize {
        self.fibers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fibers.is_empty()
    }

    pub fn contains(&self, id: FiberId) -> bool {
        self.fibers.contains_key(id)
    }

    pub fn get(&self, id: FiberId) -> Option<&Fiber<I>> {
        self.fibers.get(id)
    }

    pub fn get_mut(&mut self, id: FiberId) -> Option<&mut Fiber<I>> {
        self.fibers.get_mut(id)
    }

    /// Resolve an id that must exist.
    pub fn fiber(&self, id: FiberId) -> Result<&Fiber<I>> {
        self.fibers
            .get(id)
            .ok_or(ReconcileError::MissingFiber("lookup"))
    }

    /// Resolve an id that must exist, mutably.
    pub fn fiber_mut(&mut self, id: FiberId) -> Result<&mut Fiber<I>> {
        self.fibers
            .get_mut(id)
            .ok_or(ReconcileError::MissingFiber("lookup"))
    }

    /// Iterate the children of a fiber in sibling order.
    pub fn children(&self, id: FiberId) -> ChildIter<'_, I> {
        ChildIter {
            arena: self,
            next: self.get(id).and_then(|fiber| fiber.child),
        }
    }

    fn insert(&mut self, fiber: Fiber<I>) -> FiberId {
        self.fibers.insert(fiber)
    }

    // =========================================================================
    // Factories
    // =========================================================================

    /// A fresh root fiber: empty state, no children, no alternate.
    pub fn create_host_root_fiber(&mut self) -> FiberId {
        self.insert(Fiber::new(WorkTag::Root, FiberProps::None, None))
    }

    /// Produce the work-in-progress version of `current`.
    ///
    /// Reuses `current.alternate` in place when it exists, so a logical node
    /// never has more than two fibers. Either way the result starts as a
    /// structural clone of `current`.
    pub fn create_work_in_progress(
        &mut self,
        current: FiberId,
        pending_props: FiberProps,
    ) -> Result<FiberId> {
        let source = self.fiber(current)?;
        let alternate = source.alternate.filter(|id| self.contains(*id));

        let child = source.child;
        let sibling = source.sibling;
        let index = source.index;
        let memoized_props = source.memoized_props.clone();
        let memoized_state = source.memoized_state.clone();
        let update_queue = source.update_queue.clone();
        let node_ref = source.node_ref.clone();
        let kind = source.kind.clone();

        let work_in_progress = match alternate {
            None => {
                let mut fiber = Fiber::new(source.tag, pending_props, source.key.clone());
                fiber.element_type = source.element_type.clone();
                fiber.kind = kind;
                fiber.state_node = source.state_node.clone();
                fiber.alternate = Some(current);
                let id = self.insert(fiber);
                self.fiber_mut(current)?.alternate = Some(id);
                id
            }
            Some(id) => {
                let fiber = self.fiber_mut(id)?;
                fiber.pending_props = pending_props;
                fiber.kind = kind;
                fiber.flags = Flags::NONE;
                fiber.subtree_flags = Flags::NONE;
                fiber.deletions.clear();
                fiber.update_payload = None;
                id
            }
        };

        let fiber = self.fiber_mut(work_in_progress)?;
        fiber.child = child;
        fiber.sibling = sibling;
        fiber.index = index;
        fiber.memoized_props = memoized_props;
        fiber.memoized_state = memoized_state;
        fiber.update_queue = update_queue;
        fiber.node_ref = node_ref;
        Ok(work_in_progress)
    }

    /// Create a fresh fiber for a description.
    pub fn create_fiber_from_element(&mut self, element: &Element) -> Result<FiberId> {
        let props = element.props();
        let tag = match element.kind() {
            ElementKind::Host(tag) if tag.is_empty() => {
                return Err(ReconcileError::UnrecognizedKind("empty host tag".into()));
            }
            ElementKind::Host(_) => WorkTag::HostComponent,
            ElementKind::Component(component) if component.is_class() => WorkTag::ClassComponent,
            ElementKind::Component(_) => WorkTag::IndeterminateComponent,
            ElementKind::Fragment => {
                return Ok(self.create_fiber_from_fragment(
                    props.children.clone(),
                    element.key().cloned(),
                ));
            }
            ElementKind::Provider(_) => WorkTag::ContextProvider,
            ElementKind::Root => {
                return Err(ReconcileError::UnrecognizedKind("root marker".into()));
            }
            ElementKind::Text => {
                return Err(ReconcileError::UnrecognizedKind("text marker".into()));
            }
        };

        let mut fiber = Fiber::new(
            tag,
            FiberProps::Element(props.clone()),
            element.key().cloned(),
        );
        fiber.element_type = Some(element.kind().clone());
        fiber.kind = Some(element.kind().clone());
        fiber.node_ref = element.node_ref().cloned();
        Ok(self.insert(fiber))
    }

    /// Create a fragment fiber whose props are the children themselves.
    pub fn create_fiber_from_fragment(&mut self, children: Node, key: Option<Key>) -> FiberId {
        self.insert(Fiber::new(
            WorkTag::Fragment,
            FiberProps::Children(children),
            key,
        ))
    }

    /// Create a text fiber holding the raw content.
    pub fn create_fiber_from_text(&mut self, content: &str) -> FiberId {
        self.insert(Fiber::new(
            WorkTag::HostText,
            FiberProps::Text(content.to_string()),
            None,
        ))
    }

    // =========================================================================
    // Sweep
    // =========================================================================

    /// Drop every fiber that is neither reachable from `root` through
    /// `child`/`sibling` links nor the alternate of a reachable fiber.
    ///
    /// Returns the number of fibers removed.
    pub fn retain_reachable(&mut self, root: FiberId) -> usize {
        let mut live = HashSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if !live.insert(id) {
                continue;
            }
            let Some(fiber) = self.fibers.get(id) else {
                continue;
            };
            if let Some(alternate) = fiber.alternate {
                live.insert(alternate);
            }
            stack.extend(fiber.child);
            stack.extend(fiber.sibling);
        }

        let before = self.fibers.len();
        self.fibers.retain(|id, _| live.contains(&id));
        before - self.fibers.len()
    }
}

/// Iterator over the children of one fiber.
#[derive(Debug)]
pub struct ChildIter<'a, I> {
    arena: &'a FiberArena<I>,
    next: Option<FiberId>,
}

impl<I> Iterator for ChildIter<'_, I> {
    type Item = FiberId;

    fn next(&mut self) -> Option<FiberId> {
        let id = self.next?;
        self.next = self.arena.fibers.get(id).and_then(|fiber| fiber.sibling);
        Some(id)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ComponentType;

    #[test]
    fn test_create_root() {
        let mut arena: FiberArena<u32> = FiberArena::new();
        let root = arena.create_host_root_fiber();
        let fiber = arena.fiber(root).unwrap();
        assert_eq!(fiber.tag, WorkTag::Root);
        assert!(fiber.child.is_none());
        assert!(fiber.alternate.is_none());
        assert!(fiber.memoized_state.is_none());
    }

    #[test]
    fn test_work_in_progress_allocates_once() {
        let mut arena: FiberArena<u32> = FiberArena::new();
        let current = arena.create_host_root_fiber();
        arena.fiber_mut(current).unwrap().state_node = Some(7);

        let wip = arena.create_work_in_progress(current, FiberProps::None).unwrap();
        assert_ne!(wip, current);
        assert_eq!(arena.fiber(wip).unwrap().alternate, Some(current));
        assert_eq!(arena.fiber(current).unwrap().alternate, Some(wip));
        assert_eq!(arena.fiber(wip).unwrap().state_node, Some(7));

        // Flags on the reused alternate are reset.
        arena.fiber_mut(wip).unwrap().flags = Flags::PLACEMENT;
        arena.fiber_mut(wip).unwrap().subtree_flags = Flags::UPDATE;
        let again = arena
            .create_work_in_progress(current, FiberProps::Text("x".into()))
            .unwrap();
        assert_eq!(again, wip);
        assert_eq!(arena.len(), 2);
        let fiber = arena.fiber(again).unwrap();
        assert_eq!(fiber.flags, Flags::NONE);
        assert_eq!(fiber.subtree_flags, Flags::NONE);
        assert_eq!(fiber.pending_props, FiberProps::Text("x".into()));
    }

    #[test]
    fn test_work_in_progress_copies_structure() {
        let mut arena: FiberArena<u32> = FiberArena::new();
        let parent = arena.create_host_root_fiber();
        let child = arena.create_fiber_from_text("a");
        let sibling = arena.create_fiber_from_text("b");
        {
            let fiber = arena.fiber_mut(child).unwrap();
            fiber.sibling = Some(sibling);
            fiber.index = 3;
            fiber.memoized_props = FiberProps::Text("a".into());
        }
        arena.fiber_mut(parent).unwrap().child = Some(child);

        let wip = arena.create_work_in_progress(child, FiberProps::Text("c".into())).unwrap();
        let fiber = arena.fiber(wip).unwrap();
        assert_eq!(fiber.sibling, Some(sibling));
        assert_eq!(fiber.index, 3);
        assert_eq!(fiber.memoized_props, FiberProps::Text("a".into()));
        assert_eq!(fiber.tag, WorkTag::HostText);
    }

    #[test]
    fn test_fiber_from_element_tags() {
        let mut arena: FiberArena<u32> = FiberArena::new();

        let host = arena.create_fiber_from_element(&Element::host("div").with_key("k")).unwrap();
        assert_eq!(arena.fiber(host).unwrap().tag, WorkTag::HostComponent);
        assert_eq!(arena.fiber(host).unwrap().key, Some(Key::from("k")));
        assert_eq!(arena.fiber(host).unwrap().host_type(), Some("div"));

        let function = ComponentType::function("F", |_| Node::Empty);
        let id = arena.create_fiber_from_element(&Element::component(function)).unwrap();
        assert_eq!(arena.fiber(id).unwrap().tag, WorkTag::IndeterminateComponent);

        let class = ComponentType::class("C", |_| Node::Empty);
        let id = arena.create_fiber_from_element(&Element::component(class)).unwrap();
        assert_eq!(arena.fiber(id).unwrap().tag, WorkTag::ClassComponent);

        let fragment = Element::fragment().child("a").child("b");
        let id = arena.create_fiber_from_element(&fragment).unwrap();
        let fiber = arena.fiber(id).unwrap();
        assert_eq!(fiber.tag, WorkTag::Fragment);
        assert!(matches!(fiber.pending_props, FiberProps::Children(Node::List(_))));

        let provider = Element::provider(crate::element::ContextId(1), 5);
        let id = arena.create_fiber_from_element(&provider).unwrap();
        assert_eq!(arena.fiber(id).unwrap().tag, WorkTag::ContextProvider);
    }

    #[test]
    fn test_unrecognized_kinds() {
        let mut arena: FiberArena<u32> = FiberArena::new();
        for element in [
            Element::new(ElementKind::Root),
            Element::new(ElementKind::Text),
            Element::host(""),
        ] {
            let result = arena.create_fiber_from_element(&element);
            assert!(matches!(result, Err(ReconcileError::UnrecognizedKind(_))));
        }
        assert!(arena.is_empty());
    }

    #[test]
    fn test_retain_reachable_keeps_alternates() {
        let mut arena: FiberArena<u32> = FiberArena::new();
        let root = arena.create_host_root_fiber();
        let child = arena.create_fiber_from_text("kept");
        let orphan = arena.create_fiber_from_text("dropped");
        arena.fiber_mut(root).unwrap().child = Some(child);
        let wip = arena.create_work_in_progress(root, FiberProps::None).unwrap();

        let removed = arena.retain_reachable(root);
        assert_eq!(removed, 1);
        assert!(arena.contains(child));
        assert!(arena.contains(wip));
        assert!(!arena.contains(orphan));
    }

    #[test]
    fn test_children_iter() {
        let mut arena: FiberArena<u32> = FiberArena::new();
        let root = arena.create_host_root_fiber();
        let a = arena.create_fiber_from_text("a");
        let b = arena.create_fiber_from_text("b");
        arena.fiber_mut(root).unwrap().child = Some(a);
        arena.fiber_mut(a).unwrap().sibling = Some(b);
        assert_eq!(arena.children(root).collect::<Vec<_>>(), vec![a, b]);
    }
}
