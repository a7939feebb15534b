//! Result handles for submitted tasks.

use super::task::{ExecutionMode, TaskControl, TaskMeta};
use crate::error::{Error, Result};
use crate::scheduler::Priority;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One-shot result slot shared by a task and its handle.
pub(crate) struct Completion<T> {
    control: Arc<TaskControl>,
    result: Mutex<Option<Result<T>>>,
    ready: Condvar,
}

impl<T> Completion<T> {
    pub(crate) fn new(control: Arc<TaskControl>) -> Self {
        Self {
            control,
            result: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    fn publish(&self, outcome: Result<T>) {
        let mut slot = self.result.lock();
        *slot = Some(outcome);
        self.ready.notify_all();
    }

    fn finish(&self, outcome: Result<T>) {
        if self.control.try_finish() {
            self.publish(outcome);
        }
    }

    fn cancel(&self, interrupt: bool) -> bool {
        if self.control.try_cancel(interrupt) {
            self.publish(Err(Error::Cancelled));
            true
        } else {
            false
        }
    }
}

/// The task-side end of a [`Completion`].
///
/// Dropping it without completing marks the task cancelled, so a handle
/// never waits on work that will not run.
pub(crate) struct Completer<T> {
    completion: Option<Arc<Completion<T>>>,
}

impl<T> Completer<T> {
    pub(crate) fn new(completion: Arc<Completion<T>>) -> Self {
        Self {
            completion: Some(completion),
        }
    }

    pub(crate) fn complete(mut self, outcome: Result<T>) {
        if let Some(completion) = self.completion.take() {
            completion.finish(outcome);
        }
    }
}

impl<T> Drop for Completer<T> {
    fn drop(&mut self) {
        if let Some(completion) = self.completion.take() {
            completion.cancel(false);
        }
    }
}

/// Handle to a submitted task.
///
/// The task's outcome is either the value its work returned, or
/// `Error::TaskPanicked` / `Error::Cancelled`.
pub struct TaskHandle<T> {
    meta: TaskMeta,
    completion: Arc<Completion<T>>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(meta: TaskMeta, completion: Arc<Completion<T>>) -> Self {
        Self { meta, completion }
    }

    /// The name the task was registered under. Differs from the requested
    /// name when that one was already taken.
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn index(&self) -> u64 {
        self.meta.index
    }

    pub fn priority(&self) -> Priority {
        self.meta.priority
    }

    pub fn is_exclusive(&self) -> bool {
        self.meta.mode == ExecutionMode::Exclusive
    }

    pub fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    pub fn is_done(&self) -> bool {
        self.completion.result.lock().is_some()
    }

    pub fn is_cancelled(&self) -> bool {
        self.completion.control.is_cancelled()
    }

    /// Cancels the task unless it already completed.
    ///
    /// A queued task never runs. A running task keeps running unless
    /// `may_interrupt` is set, in which case [`crate::is_interrupted`] turns
    /// true for it and blocked waits inside the terminal give up. Either way
    /// the handle reports `Error::Cancelled` from now on.
    pub fn cancel(&self, may_interrupt: bool) -> bool {
        self.completion.cancel(may_interrupt)
    }

    /// Blocks until the task is done.
    pub fn wait(&self) {
        let mut slot = self.completion.result.lock();
        while slot.is_none() {
            self.completion.ready.wait(&mut slot);
        }
    }

    /// Blocks until the task is done or the timeout elapses. Returns whether
    /// the task is done.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.wait_deadline(Instant::now() + timeout)
    }

    pub(crate) fn wait_deadline(&self, deadline: Instant) -> bool {
        let mut slot = self.completion.result.lock();
        while slot.is_none() {
            if self
                .completion
                .ready
                .wait_until(&mut slot, deadline)
                .timed_out()
            {
                return slot.is_some();
            }
        }
        true
    }

    /// Waits for the task and takes its outcome.
    pub fn join(self) -> Result<T> {
        let mut slot = self.completion.result.lock();
        loop {
            if let Some(outcome) = slot.take() {
                return outcome;
            }
            self.completion.ready.wait(&mut slot);
        }
    }

    /// Like [`TaskHandle::join`], giving up with `Error::Timeout` after
    /// `timeout`. The task itself keeps going.
    pub fn join_timeout(self, timeout: Duration) -> Result<T> {
        if self.wait_timeout(timeout) {
            self.join()
        } else {
            Err(Error::Timeout)
        }
    }
}

impl<T> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("name", &self.meta.name)
            .field("index", &self.meta.index)
            .field("priority", &self.meta.priority)
            .field("mode", &self.meta.mode)
            .field("done", &self.is_done())
            .finish()
    }
}
