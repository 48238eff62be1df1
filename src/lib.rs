//! # spark-fiber
//!
//! Incremental tree reconciliation for retained UI trees.
//!
//! Callers describe the desired output as an immutable tree of [`Node`]s.
//! The engine diffs each new description against the previously committed
//! one and applies the minimal set of mutations to a host output tree
//! through [`HostConfig`].
//!
//! ## Architecture
//!
//! Work is split into a render phase that builds a work-in-progress fiber
//! tree and a commit phase that mutates the output:
//!
//! ```text
//! Node tree → Root::render → Scheduler → begin/complete work → commit → HostConfig
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use spark_fiber::{create_root, Element, MemoryHost, ReconcilerConfig, Scheduler};
//!
//! let mut host = MemoryHost::new();
//! let container = host.create_container();
//! let root = create_root(host, container, ReconcilerConfig::default());
//! let mut scheduler = Scheduler::new();
//!
//! let title = Element::host("h1")
//!     .attr("title", "hello world")
//!     .child("hello ")
//!     .child(Element::host("span").style("color", "cyan").text("world"));
//! root.render(title, &mut scheduler)?;
//! scheduler.run_until_idle()?;
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Core types (Key, WorkTag, Flags, Lanes)
//! - [`element`] - Description nodes
//! - [`engine`] - Fiber arena, update queue, child reconciler
//! - [`pipeline`] - Work loop, begin/complete, commit, roots
//! - [`scheduler`] - Cooperative time-sliced task queue
//! - [`host`] - Host interface, in-memory host, terminal printer

pub mod config;
pub mod element;
pub mod engine;
pub mod error;
pub mod host;
pub mod pipeline;
pub mod scheduler;
pub mod types;

// Re-export commonly used items
pub use types::*;

pub use config::{ReconcilerConfig, SchedulerConfig, UnsupportedTagPolicy};

pub use element::{ComponentType, ContextId, Element, ElementKind, Node, NodeRef, Props};

pub use engine::{ChildReconciler, Fiber, FiberArena, FiberId, FiberProps, State};

pub use error::{ReconcileError, Result};

pub use host::{
    HostConfig, HostNode, HostNodeId, HostNodeKind, HostOp, MemoryHost, PropChange, UpdatePayload,
};

pub use pipeline::{create_root, FiberRoot, Root, WorkLoop};

pub use scheduler::{Deadline, FrameDeadline, NoDeadline, Scheduler, TaskId, TaskStatus};
