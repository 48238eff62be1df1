//! Cooperative scheduler.
//!
//! A FIFO of render callbacks executed in time slices. Each slice runs tasks
//! until the [`Deadline`] asks to yield; a task that reports more work stays
//! at the head of the queue and ends the slice, so the host gets control
//! back between chunks of work.
//!
//! The scheduler owns no thread and no timer. The host drives it:
//!
//! ```ignore
//! while scheduler.run_frame()? {
//!     // handle input, paint, sleep until the next frame...
//! }
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use crate::config::SchedulerConfig;
use crate::error::Result;

// =============================================================================
// Deadlines
// =============================================================================

/// Tells a running slice when to hand control back to the host.
pub trait Deadline {
    fn should_yield(&self) -> bool;
}

impl<F: Fn() -> bool> Deadline for F {
    fn should_yield(&self) -> bool {
        self()
    }
}

/// A deadline that never expires.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDeadline;

impl Deadline for NoDeadline {
    fn should_yield(&self) -> bool {
        false
    }
}

/// Yields once a fixed interval has elapsed since the slice started.
#[derive(Debug, Clone, Copy)]
pub struct FrameDeadline {
    start: Instant,
    interval: Duration,
}

impl FrameDeadline {
    pub fn new(interval: Duration) -> Self {
        Self {
            start: Instant::now(),
            interval,
        }
    }

    /// Time left in this slice.
    pub fn remaining(&self) -> Duration {
        self.interval.saturating_sub(self.start.elapsed())
    }
}

impl Deadline for FrameDeadline {
    fn should_yield(&self) -> bool {
        self.start.elapsed() >= self.interval
    }
}

// =============================================================================
// Tasks
// =============================================================================

/// What a task reports after running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// The task is done and leaves the queue.
    Complete,
    /// The task has more work; run it again in the next slice.
    Pending,
}

/// Identifies a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

/// A scheduled callback.
pub type Task = Box<dyn FnMut(&dyn Deadline) -> Result<TaskStatus>>;

struct ScheduledTask {
    id: TaskId,
    callback: Task,
    scheduled_at: Instant,
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("id", &self.id)
            .field("scheduled_at", &self.scheduled_at)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// FIFO task queue run in deadline-bounded slices.
#[derive(Debug, Default)]
pub struct Scheduler {
    queue: VecDeque<ScheduledTask>,
    next_id: u64,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Append a task to the queue.
    pub fn schedule_callback(
        &mut self,
        callback: impl FnMut(&dyn Deadline) -> Result<TaskStatus> + 'static,
    ) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.queue.push_back(ScheduledTask {
            id,
            callback: Box::new(callback),
            scheduled_at: Instant::now(),
        });
        tracing::trace!(?id, queued = self.queue.len(), "task scheduled");
        id
    }

    /// Remove a task that has not run to completion yet.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        let before = self.queue.len();
        self.queue.retain(|task| task.id != id);
        before != self.queue.len()
    }

    pub fn has_pending_work(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Run tasks until the queue drains, the deadline expires or a task
    /// reports more work. At least one task runs per slice.
    ///
    /// Returns whether work remains. The first failing task is dropped from
    /// the queue and its error returned.
    pub fn run_slice(&mut self, deadline: &dyn Deadline) -> Result<bool> {
        let mut ran = 0usize;
        while let Some(mut task) = self.queue.pop_front() {
            if ran > 0 && deadline.should_yield() {
                self.queue.push_front(task);
                break;
            }
            ran += 1;
            match (task.callback)(deadline) {
                Ok(TaskStatus::Complete) => {
                    tracing::trace!(id = ?task.id, waited = ?task.scheduled_at.elapsed(), "task complete");
                }
                Ok(TaskStatus::Pending) => {
                    self.queue.push_front(task);
                    break;
                }
                Err(err) => {
                    tracing::error!(id = ?task.id, error = %err, "task failed");
                    return Err(err);
                }
            }
        }
        Ok(self.has_pending_work())
    }

    /// Run one slice bounded by the configured frame interval.
    pub fn run_frame(&mut self) -> Result<bool> {
        let deadline = FrameDeadline::new(self.config.frame_interval);
        self.run_slice(&deadline)
    }

    /// Run slices until no work remains.
    pub fn run_until_idle(&mut self) -> Result<()> {
        while self.run_slice(&NoDeadline)? {}
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
