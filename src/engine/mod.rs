//! Fiber engine - the persistent work tree and the child diff.
//!
//! The engine manages the core data structures:
//! - Fiber: one version of one logical node, stored in a [`FiberArena`]
//! - UpdateQueue: pending root state changes, shared by both buffers
//! - ChildReconciler: turns new child descriptions into work-in-progress
//!   fibers, reusing current ones where keys and kinds match
//!
//! # Architecture
//!
//! Every logical node has at most two fibers, the committed `current` one
//! and the `work-in-progress` one being built, paired by `alternate`:
//!
//! ```text
//! current:          Root ── h1 ── "hello " ── span
//!                    ┆       ┆        ┆         ┆     (alternate)
//! work-in-progress: Root'── h1'── "hello "'── span'
//! ```
//!
//! A commit swaps the roles; the next render reuses the old current fibers
//! as its work-in-progress.

pub mod child_fiber;
pub mod fiber;
pub mod update_queue;

pub use child_fiber::ChildReconciler;
pub use fiber::{ChildIter, Fiber, FiberArena, FiberId, FiberProps};
pub use update_queue::{
    create_update, enqueue_update, initialize_update_queue, process_update_queue, State,
    StateValue, Update, UpdateQueue, UpdateTag,
};
