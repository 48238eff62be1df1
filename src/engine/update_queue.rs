//! Update queue - pending state changes of a root.
//!
//! Updates form a circular singly-linked list. `pending` points at the most
//! recently enqueued record, whose `next` is the oldest one, so appending and
//! finding the head are both O(1):
//!
//! ```text
//! pending ──► u3 ──next──► u1 ──next──► u2 ──next──► u3
//! ```
//!
//! Records live in a per-queue slab and link by slab index. The shared part
//! sits behind an `Rc`, so a fiber and its alternate see the same pending
//! list until one of them processes it.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Instant;

use serde_json::Value;

use crate::element::Node;
use crate::engine::fiber::{Fiber, FiberArena, FiberId};
use crate::error::Result;
use crate::types::{Lanes, WorkTag};

/// Key under which the root stores its element.
pub const ELEMENT: &str = "element";

// =============================================================================
// State
// =============================================================================

/// A value stored in [`State`].
#[derive(Debug, Clone, PartialEq)]
pub enum StateValue {
    Node(Node),
    Value(Value),
}

impl From<Node> for StateValue {
    fn from(node: Node) -> Self {
        Self::Node(node)
    }
}

impl From<Value> for StateValue {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

/// Keyed state of a fiber. Partial states merge shallowly, later keys win.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct State(BTreeMap<String, StateValue>);

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// State holding only the root element.
    pub fn element(element: Node) -> Self {
        Self::new().with(ELEMENT, element)
    }

    pub fn with(mut self, key: &str, value: impl Into<StateValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<StateValue>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&StateValue> {
        self.0.get(key)
    }

    /// The root element, if one was rendered.
    pub fn root_element(&self) -> Option<&Node> {
        match self.0.get(ELEMENT) {
            Some(StateValue::Node(node)) => Some(node),
            _ => None,
        }
    }

    /// Shallow merge: every key of `patch` overwrites the same key here.
    pub fn merge(&mut self, patch: &State) {
        for (key, value) in &patch.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// =============================================================================
// Update
// =============================================================================

/// How an update's payload combines with the previous state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateTag {
    /// Shallow-merge the payload into the previous state.
    #[default]
    UpdateState,
    /// Discard the previous state and use the payload.
    ReplaceState,
}

/// One requested state change.
#[derive(Debug, Clone)]
pub struct Update {
    pub event_time: Instant,
    pub lane: Lanes,
    pub tag: UpdateTag,
    pub payload: Option<State>,
    next: Option<usize>,
}

/// A fresh update with no payload.
pub fn create_update(event_time: Instant, lane: Lanes) -> Update {
    Update {
        event_time,
        lane,
        tag: UpdateTag::UpdateState,
        payload: None,
        next: None,
    }
}

impl Update {
    pub fn with_payload(mut self, payload: State) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_tag(mut self, tag: UpdateTag) -> Self {
        self.tag = tag;
        self
    }
}

fn get_state_from_update(update: &Update, prev_state: State) -> State {
    match (update.tag, &update.payload) {
        (_, None) => prev_state,
        (UpdateTag::UpdateState, Some(payload)) => {
            let mut next = prev_state;
            next.merge(payload);
            next
        }
        (UpdateTag::ReplaceState, Some(payload)) => payload.clone(),
    }
}

// =============================================================================
// Update Queue
// =============================================================================

#[derive(Debug, Default)]
struct SharedQueue {
    records: Vec<Update>,
    /// Slab index of the most recently enqueued record.
    pending: Option<usize>,
    lanes: Lanes,
}

impl SharedQueue {
    fn push(&mut self, mut update: Update) {
        let index = self.records.len();
        self.lanes |= update.lane;
        match self.pending.and_then(|last| self.records.get_mut(last)) {
            None => update.next = Some(index),
            Some(last) => {
                update.next = last.next;
                last.next = Some(index);
            }
        }
        self.records.push(update);
        self.pending = Some(index);
    }

    /// Break the ring after the last record and return the records oldest
    /// first. Leaves the queue empty.
    fn take_linear(&mut self) -> Vec<Update> {
        let Some(last) = self.pending.take() else {
            return Vec::new();
        };
        let first = self.records.get_mut(last).and_then(|record| record.next.take());
        let mut slots: Vec<Option<Update>> =
            std::mem::take(&mut self.records).into_iter().map(Some).collect();
        self.lanes = Lanes::NO_LANE;

        let mut ordered = Vec::with_capacity(slots.len());
        let mut cursor = first;
        while let Some(index) = cursor {
            let Some(update) = slots.get_mut(index).and_then(Option::take) else {
                break;
            };
            cursor = update.next;
            ordered.push(update);
        }
        ordered
    }
}

/// Update queue attached to a root fiber.
///
/// Cloning shares the pending list.
#[derive(Debug, Clone, Default)]
pub struct UpdateQueue {
    pub base_state: Option<State>,
    shared: Rc<RefCell<SharedQueue>>,
}

impl UpdateQueue {
    /// Whether updates are waiting to be processed.
    pub fn has_pending(&self) -> bool {
        self.shared.borrow().pending.is_some()
    }

    /// Number of updates waiting to be processed.
    pub fn pending_count(&self) -> usize {
        self.shared.borrow().records.len()
    }

    /// Union of the lanes of all pending updates.
    pub fn pending_lanes(&self) -> Lanes {
        self.shared.borrow().lanes
    }
}

/// Give a fiber an empty queue whose base state is its memoized state.
pub fn initialize_update_queue<I>(fiber: &mut Fiber<I>) {
    fiber.update_queue = Some(UpdateQueue {
        base_state: fiber.memoized_state.clone(),
        shared: Rc::default(),
    });
}

/// Append `update` to the fiber's queue and return the root it belongs to.
///
/// Returns `None` for a fiber without a queue or one that is no longer
/// attached under a root.
pub fn enqueue_update<I: Clone>(
    arena: &FiberArena<I>,
    fiber: FiberId,
    update: Update,
) -> Result<Option<FiberId>> {
    let Some(queue) = arena.fiber(fiber)?.update_queue.as_ref() else {
        return Ok(None);
    };
    queue.shared.borrow_mut().push(update);

    let mut node = fiber;
    while let Some(parent) = arena.fiber(node)?.return_fiber {
        node = parent;
    }
    Ok((arena.fiber(node)?.tag == WorkTag::Root).then_some(node))
}

/// Fold every pending update onto the queue's base state, oldest first, and
/// store the result as both the new base and the memoized state.
///
/// Returns the number of updates applied.
pub fn process_update_queue<I>(fiber: &mut Fiber<I>) -> usize {
    let Some(queue) = fiber.update_queue.as_mut() else {
        return 0;
    };
    let updates = queue.shared.borrow_mut().take_linear();
    if updates.is_empty() {
        return 0;
    }

    let mut new_state = queue
        .base_state
        .take()
        .or_else(|| fiber.memoized_state.clone())
        .unwrap_or_default();
    for update in &updates {
        new_state = get_state_from_update(update, new_state);
    }
    queue.base_state = Some(new_state.clone());
    fiber.memoized_state = Some(new_state);
    updates.len()
}

// =============================================================================
// Tests
// =============================================================================
