//! Task representation, ordering and cooperative interruption.

use super::panic_handler::PanicHandler;
use crate::scheduler::Priority;
use std::cell::RefCell;
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

/// How a task is gated against the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionMode {
    /// Runs alongside any number of other usual tasks.
    Usual,
    /// Runs only while no other task of either kind is active.
    Exclusive,
}

impl ExecutionMode {
    pub fn from_flag(exclusive: bool) -> Self {
        if exclusive {
            ExecutionMode::Exclusive
        } else {
            ExecutionMode::Usual
        }
    }

    pub fn is_exclusive(self) -> bool {
        self == ExecutionMode::Exclusive
    }
}

/// The immutable description of an accepted task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskMeta {
    pub name: String,
    pub priority: Priority,
    /// Global submission index, unique per terminal.
    pub index: u64,
    pub mode: ExecutionMode,
}

/// Hands a task's outcome to its handle. The coordinator calls it only once
/// the finish is in the ledger.
pub(crate) type Publish = Box<dyn FnOnce() + Send + 'static>;

/// Runs the user work and returns the deferred publication of its outcome.
pub(crate) type Body = Box<dyn FnOnce(&PanicHandler) -> Publish + Send + 'static>;

/// A task as the gateway hands it to the pool, before it has an index.
pub(crate) struct NewTask {
    pub(crate) name: String,
    pub(crate) priority: Priority,
    pub(crate) mode: ExecutionMode,
    pub(crate) control: Arc<TaskControl>,
    pub(crate) body: Body,
}

impl NewTask {
    pub(crate) fn accept(self, name: String, index: u64) -> Task {
        Task {
            meta: TaskMeta {
                name,
                priority: self.priority,
                index,
                mode: self.mode,
            },
            control: self.control,
            ticket: 0,
            body: self.body,
        }
    }
}

/// Internal task representation, ordered by (priority, index) ascending.
pub(crate) struct Task {
    pub(crate) meta: TaskMeta,
    pub(crate) control: Arc<TaskControl>,
    /// Activation turn, handed out by the queue when the task is dequeued.
    pub(crate) ticket: u64,
    body: Body,
}

impl Task {
    pub(crate) fn into_parts(self) -> (TaskMeta, Body) {
        (self.meta, self.body)
    }
}

#[cfg(test)]
pub(crate) fn noop_body() -> Body {
    Box::new(|_: &PanicHandler| -> Publish { Box::new(|| {}) })
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.meta.priority == other.meta.priority && self.meta.index == other.meta.index
    }
}

impl Eq for Task {}

impl PartialOrd for Task {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Task {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.meta
            .priority
            .cmp(&other.meta.priority)
            .then_with(|| self.meta.index.cmp(&other.meta.index))
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.meta.name)
            .field("priority", &self.meta.priority)
            .field("index", &self.meta.index)
            .field("mode", &self.meta.mode)
            .finish()
    }
}

const QUEUED: u8 = 0;
const RUNNING: u8 = 1;
const DONE: u8 = 2;
const CANCELLED: u8 = 3;

/// Lifecycle flags shared between a task, its handle and the pool.
///
/// Exactly one of `try_finish` and `try_cancel` wins; the winner owns the
/// right to publish the task's outcome.
#[derive(Debug)]
pub(crate) struct TaskControl {
    state: AtomicU8,
    interrupted: AtomicBool,
}

impl TaskControl {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(QUEUED),
            interrupted: AtomicBool::new(false),
        }
    }

    /// Queued -> running. Fails when the task was cancelled first.
    pub(crate) fn try_start(&self) -> bool {
        self.state
            .compare_exchange(QUEUED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Running -> done.
    pub(crate) fn try_finish(&self) -> bool {
        self.state
            .compare_exchange(RUNNING, DONE, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Queued or running -> cancelled.
    pub(crate) fn try_cancel(&self, interrupt: bool) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current == DONE || current == CANCELLED {
                return false;
            }
            match self.state.compare_exchange(
                current,
                CANCELLED,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    if interrupt && current == RUNNING {
                        self.interrupt();
                    }
                    return true;
                }
                Err(actual) => current = actual,
            }
        }
    }

    pub(crate) fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
    }

    pub(crate) fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == CANCELLED
    }

    pub(crate) fn is_done(&self) -> bool {
        matches!(self.state.load(Ordering::Acquire), DONE | CANCELLED)
    }
}

thread_local! {
    static CURRENT: RefCell<Option<Arc<TaskControl>>> = const { RefCell::new(None) };
}

/// Returns true when the task running on this thread has been interrupted,
/// either by `TaskHandle::cancel(true)` or by `Terminal::shutdown_now`.
///
/// Work that wants to honour interruption polls this between steps. Outside
/// of a terminal worker it always returns false.
pub fn is_interrupted() -> bool {
    CURRENT.with(|current| {
        current
            .borrow()
            .as_ref()
            .map(|control| control.is_interrupted())
            .unwrap_or(false)
    })
}

/// Binds a task's control block to the current worker thread.
pub(crate) struct CurrentTask {
    _private: (),
}

impl CurrentTask {
    pub(crate) fn enter(control: Arc<TaskControl>) -> Self {
        CURRENT.with(|current| *current.borrow_mut() = Some(control));
        CurrentTask { _private: () }
    }
}

impl Drop for CurrentTask {
    fn drop(&mut self) {
        CURRENT.with(|current| current.borrow_mut().take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(priority: Priority, index: u64) -> Task {
        NewTask {
            name: format!("t{}", index),
            priority,
            mode: ExecutionMode::Usual,
            control: Arc::new(TaskControl::new()),
            body: noop_body(),
        }
        .accept(format!("t{}", index), index)
    }

    #[test]
    fn test_orders_by_priority_then_index() {
        let high_late = task(Priority::HIGH, 5);
        let low_early = task(Priority::LOW, 1);
        let high_early = task(Priority::HIGH, 2);

        assert!(high_late < low_early);
        assert!(high_early < high_late);

        let mut tasks = vec![low_early, high_late, high_early];
        tasks.sort();
        let order: Vec<u64> = tasks.iter().map(|t| t.meta.index).collect();
        assert_eq!(order, vec![2, 5, 1]);
    }

    #[test]
    fn test_control_finish_beats_cancel() {
        let control = TaskControl::new();
        assert!(control.try_start());
        assert!(control.try_finish());
        assert!(!control.try_cancel(true));
        assert!(control.is_done());
        assert!(!control.is_cancelled());
        assert!(!control.is_interrupted());
    }

    #[test]
    fn test_control_cancel_while_queued() {
        let control = TaskControl::new();
        assert!(control.try_cancel(true));
        assert!(!control.try_start());
        assert!(control.is_cancelled());
        // Nothing was running, so nothing to interrupt.
        assert!(!control.is_interrupted());
    }

    #[test]
    fn test_control_cancel_running_interrupts() {
        let control = TaskControl::new();
        assert!(control.try_start());
        assert!(control.try_cancel(true));
        assert!(control.is_interrupted());
        assert!(!control.try_finish());
    }

    #[test]
    fn test_current_task_interrupt_flag() {
        assert!(!is_interrupted());

        let control = Arc::new(TaskControl::new());
        {
            let _current = CurrentTask::enter(control.clone());
            assert!(!is_interrupted());
            control.interrupt();
            assert!(is_interrupted());
        }

        assert!(!is_interrupted());
    }

    #[test]
    fn test_mode_from_flag() {
        assert_eq!(ExecutionMode::from_flag(true), ExecutionMode::Exclusive);
        assert_eq!(ExecutionMode::from_flag(false), ExecutionMode::Usual);
        assert!(ExecutionMode::Exclusive.is_exclusive());
    }
}
