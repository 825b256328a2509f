//! Bounded hand-off queue from producer threads to the script thread.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use tracing::warn;

use crate::Result;

/// Fixed number of pending tasks.
pub const TASK_QUEUE_CAPACITY: usize = 128;

/// A deferred, fallible action run on the script thread.
pub type Task = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

/// FIFO of deferred actions, drained at safe points by the script thread.
///
/// Producers never block: [`try_append`](Self::try_append) drops the task
/// when the queue is full. The lock is held only to push or pop, never while
/// a task runs.
pub struct TaskQueue {
    tasks: Mutex<VecDeque<Task>>,
    capacity: usize,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::with_capacity(TASK_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tasks: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append a task. Returns `false` and drops it when the queue is full.
    pub fn try_append<F>(&self, task: F) -> bool
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if tasks.len() >= self.capacity {
            warn!(
                "task queue full ({} pending), dropping task",
                self.capacity
            );
            return false;
        }
        tasks.push_back(Box::new(task));
        true
    }

    pub fn len(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn pop(&self) -> Option<Task> {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    /// Run every pending task in append order.
    ///
    /// Stops at the first failing task and returns its error; tasks behind
    /// it stay queued for the next drain.
    pub fn drain(&self) -> Result<()> {
        while let Some(task) = self.pop() {
            task()?;
        }
        Ok(())
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
