//! Work loop - drives begin/complete over the work-in-progress tree.
//!
//! Depth-first: `begin_work` descends to the first child until a leaf, then
//! `complete_work` runs on the leaf and its ancestors until one of them has
//! a sibling, which becomes the next unit of work. When the climb reaches
//! the root the tree is finished.
//!
//! ```text
//! begin Root → begin h1 → begin "hello " ─┐
//!                                         complete "hello "
//!              begin span → begin "world" ─┐
//!                                         complete "world" → complete span
//!                                         → complete h1 → complete Root
//! ```
//!
//! The cursor lives in a [`WorkLoop`] value owned by the caller, so two roots
//! never share traversal state.

use crate::engine::fiber::{FiberId, FiberProps};
use crate::error::Result;
use crate::host::HostConfig;

use super::begin_work::begin_work;
use super::commit::commit_root;
use super::complete_work::complete_work;
use super::root::FiberRoot;

/// Traversal state of one render pass.
#[derive(Debug, Default)]
pub struct WorkLoop {
    work_in_progress: Option<FiberId>,
    root_fiber: Option<FiberId>,
    units: usize,
}

impl WorkLoop {
    /// Start a pass: clone the current root into a work-in-progress root and
    /// point the cursor at it.
    pub fn prepare_fresh_stack<H: HostConfig>(root: &mut FiberRoot<H>) -> Result<Self> {
        let wip = root
            .arena
            .create_work_in_progress(root.current, FiberProps::None)?;
        Ok(Self {
            work_in_progress: Some(wip),
            root_fiber: Some(wip),
            units: 0,
        })
    }

    /// The next fiber to process.
    pub fn cursor(&self) -> Option<FiberId> {
        self.work_in_progress
    }

    /// Root of the tree being built.
    pub fn root_fiber(&self) -> Option<FiberId> {
        self.root_fiber
    }

    /// Whether every fiber has completed.
    pub fn is_complete(&self) -> bool {
        self.work_in_progress.is_none()
    }

    /// Number of fibers begun so far.
    pub fn units_performed(&self) -> usize {
        self.units
    }

    /// Begin the fiber under the cursor, then either descend into its first
    /// child or complete it.
    pub fn perform_unit_of_work<H: HostConfig>(&mut self, root: &mut FiberRoot<H>) -> Result<()> {
        let Some(unit) = self.work_in_progress else {
            return Ok(());
        };
        self.units += 1;

        let current = root.arena.fiber(unit)?.alternate;
        let next = begin_work(root, current, unit)?;

        let fiber = root.arena.fiber_mut(unit)?;
        fiber.memoized_props = fiber.pending_props.clone();

        match next {
            Some(child) => self.work_in_progress = Some(child),
            None => self.complete_unit_of_work(root, unit)?,
        }
        Ok(())
    }

    fn complete_unit_of_work<H: HostConfig>(
        &mut self,
        root: &mut FiberRoot<H>,
        unit: FiberId,
    ) -> Result<()> {
        let mut completed = Some(unit);
        while let Some(id) = completed {
            let fiber = root.arena.fiber(id)?;
            let current = fiber.alternate;
            let return_fiber = fiber.return_fiber;

            complete_work(root, current, id)?;

            if Some(id) != self.root_fiber {
                if let Some(sibling) = root.arena.fiber(id)?.sibling {
                    self.work_in_progress = Some(sibling);
                    return Ok(());
                }
            }
            completed = if Some(id) == self.root_fiber {
                None
            } else {
                return_fiber
            };
            self.work_in_progress = completed;
        }
        Ok(())
    }

    /// Run units until the tree is finished.
    pub fn work_loop_sync<H: HostConfig>(&mut self, root: &mut FiberRoot<H>) -> Result<()> {
        while !self.is_complete() {
            self.perform_unit_of_work(root)?;
        }
        Ok(())
    }
}

/// Build a complete work-in-progress tree and return its root fiber.
pub fn render_root_sync<H: HostConfig>(root: &mut FiberRoot<H>) -> Result<FiberId> {
    let mut work_loop = WorkLoop::prepare_fresh_stack(root)?;
    let finished = work_loop.root_fiber;
    work_loop.work_loop_sync(root)?;
    tracing::debug!(units = work_loop.units_performed(), "render pass complete");
    finished.ok_or(crate::error::ReconcileError::MissingFiber("render_root_sync"))
}

impl<H: HostConfig> FiberRoot<H> {
    /// Render the pending updates and commit the result.
    ///
    /// A failed render leaves the committed tree and the output untouched;
    /// the half-built tree is dropped.
    pub fn perform_sync_work_on_root(&mut self) -> Result<()> {
        match render_root_sync(self) {
            Ok(finished) => {
                self.finished_work = Some(finished);
                commit_root(self)
            }
            Err(err) => {
                self.finished_work = None;
                let dropped = self.arena.retain_reachable(self.current);
                tracing::warn!(error = %err, dropped, "render pass failed");
                Err(err)
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
