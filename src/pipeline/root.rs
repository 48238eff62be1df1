//! Root API - the entry point for rendering into a container.
//!
//! A [`Root`] pairs one host container with the fiber trees rendered into
//! it. Rendering is a two-step affair: [`Root::render`] only records the new
//! description and schedules work; the scheduler later runs the render and
//! commit phases.
//!
//! # Example
//!
//! ```ignore
//! use spark_fiber::{create_root, Element, MemoryHost, ReconcilerConfig, Scheduler};
//!
//! let mut host = MemoryHost::new();
//! let container = host.create_container();
//! let root = create_root(host, container, ReconcilerConfig::default());
//!
//! let mut scheduler = Scheduler::new();
//! root.render(Element::host("h1").text("hello"), &mut scheduler)?;
//! scheduler.run_until_idle()?;
//!
//! root.with_host(|host| assert_eq!(host.to_markup(container), "<h1>hello</h1>"));
//! ```

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use crate::config::ReconcilerConfig;
use crate::element::Node;
use crate::engine::fiber::{FiberArena, FiberId};
use crate::engine::update_queue::{
    create_update, enqueue_update, initialize_update_queue, State,
};
use crate::error::{ReconcileError, Result};
use crate::host::HostConfig;
use crate::scheduler::{Scheduler, TaskId, TaskStatus};
use crate::types::Lanes;

// =============================================================================
// Fiber Root
// =============================================================================

/// Everything one container needs across renders.
pub struct FiberRoot<H: HostConfig> {
    pub(crate) arena: FiberArena<H::Instance>,
    pub(crate) host: H,
    pub(crate) container_info: H::Instance,
    /// Root fiber of the committed tree.
    pub(crate) current: FiberId,
    /// Root fiber of a completed but not yet committed tree.
    pub(crate) finished_work: Option<FiberId>,
    pub(crate) config: ReconcilerConfig,
    callback_scheduled: bool,
    commits: u64,
}

impl<H: HostConfig> FiberRoot<H> {
    /// Create a root whose committed tree is an empty root fiber.
    pub fn new(host: H, container_info: H::Instance, config: ReconcilerConfig) -> Self {
        let mut arena = FiberArena::new();
        let current = arena.create_host_root_fiber();
        if let Some(fiber) = arena.get_mut(current) {
            fiber.memoized_state = Some(State::element(Node::Empty));
            initialize_update_queue(fiber);
        }
        Self {
            arena,
            host,
            container_info,
            current,
            finished_work: None,
            config,
            callback_scheduled: false,
            commits: 0,
        }
    }

    /// Enqueue `element` as the new root description.
    ///
    /// Returns the root fiber the update landed on.
    pub fn update_container(&mut self, element: Node) -> Result<Option<FiberId>> {
        let update = create_update(Instant::now(), Lanes::DEFAULT)
            .with_payload(State::element(element));
        enqueue_update(&self.arena, self.current, update)
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn container(&self) -> &H::Instance {
        &self.container_info
    }

    pub fn current(&self) -> FiberId {
        self.current
    }

    pub fn arena(&self) -> &FiberArena<H::Instance> {
        &self.arena
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Number of commits performed on this root.
    pub fn commit_count(&self) -> u64 {
        self.commits
    }

    pub(crate) fn record_commit(&mut self) {
        self.commits += 1;
    }
}

// =============================================================================
// Root Handle
// =============================================================================

/// Shared handle to a [`FiberRoot`].
///
/// Clones refer to the same root. Scheduled render tasks hold a clone.
pub struct Root<H: HostConfig> {
    inner: Rc<RefCell<FiberRoot<H>>>,
}

impl<H: HostConfig> Clone for Root<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// Create a root rendering into `container`.
pub fn create_root<H: HostConfig>(
    host: H,
    container: H::Instance,
    config: ReconcilerConfig,
) -> Root<H> {
    tracing::debug!(?container, "creating root");
    Root {
        inner: Rc::new(RefCell::new(FiberRoot::new(host, container, config))),
    }
}

impl<H: HostConfig + 'static> Root<H> {
    /// Request that the container show `element`.
    ///
    /// Only enqueues the update and makes sure one render task is scheduled.
    /// Several calls before the scheduler runs collapse into a single pass
    /// that renders the last element.
    pub fn render(&self, element: impl Into<Node>, scheduler: &mut Scheduler) -> Result<Option<TaskId>> {
        let mut root = self.inner.try_borrow_mut().map_err(|_| ReconcileError::RootBusy)?;
        if root.update_container(element.into())?.is_none() {
            return Ok(None);
        }
        if root.callback_scheduled {
            tracing::trace!("render task already scheduled");
            return Ok(None);
        }
        root.callback_scheduled = true;

        let handle = Rc::clone(&self.inner);
        let task = scheduler.schedule_callback(move |_deadline| {
            let mut root = handle.try_borrow_mut().map_err(|_| ReconcileError::RootBusy)?;
            root.callback_scheduled = false;
            root.perform_sync_work_on_root()?;
            Ok(TaskStatus::Complete)
        });
        Ok(Some(task))
    }

    /// Render `element` and commit it before returning.
    pub fn flush_sync(&self, element: impl Into<Node>) -> Result<()> {
        let mut root = self.inner.try_borrow_mut().map_err(|_| ReconcileError::RootBusy)?;
        root.update_container(element.into())?;
        root.perform_sync_work_on_root()
    }

    /// Render nothing into the container.
    pub fn unmount(&self, scheduler: &mut Scheduler) -> Result<Option<TaskId>> {
        self.render(Node::Empty, scheduler)
    }
}

impl<H: HostConfig> Root<H> {
    /// Borrow the host.
    ///
    /// # Panics
    ///
    /// Panics when called from inside a render of the same root.
    pub fn with_host<R>(&self, f: impl FnOnce(&H) -> R) -> R {
        f(&self.inner.borrow().host)
    }

    /// Borrow the host mutably.
    ///
    /// # Panics
    ///
    /// Panics when called from inside a render of the same root.
    pub fn with_host_mut<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        f(&mut self.inner.borrow_mut().host)
    }

    /// Inspect the whole root: committed fibers, host and configuration.
    ///
    /// # Panics
    ///
    /// Panics when called from inside a render of the same root.
    pub fn with_root<R>(&self, f: impl FnOnce(&FiberRoot<H>) -> R) -> R {
        f(&self.inner.borrow())
    }

    /// The container instance.
    pub fn container(&self) -> H::Instance {
        self.inner.borrow().container_info.clone()
    }
}
