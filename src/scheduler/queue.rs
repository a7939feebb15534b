//! Priority queue gated by exclusive-task activity.

use crate::executor::Task;
use crate::state::Ledger;
use parking_lot::{Condvar, Mutex};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::trace;

/// What a blocking [`GatedQueue::take`] came back with.
#[derive(Debug)]
pub(crate) enum Take {
    Task(Task),
    /// Deadline passed with nothing to hand out.
    TimedOut,
    /// Queue closed and empty.
    Closed,
}

/// Tasks ordered by (priority, submission index), smallest first.
///
/// While any exclusive task is active both [`take`](GatedQueue::take) and
/// [`poll`](GatedQueue::poll) hand out nothing, whatever the heap holds. The
/// gate is checked under the ledger's state lock, and the heap lock is taken
/// inside it, so no task slips into its pending phase during an exclusive
/// task's body.
#[derive(Debug)]
pub(crate) struct GatedQueue {
    ledger: Arc<Ledger>,
    heap: Mutex<BinaryHeap<Reverse<Task>>>,
    available: Condvar,
    closed: AtomicBool,
}

impl GatedQueue {
    pub(crate) fn new(ledger: Arc<Ledger>) -> Self {
        Self {
            ledger,
            heap: Mutex::new(BinaryHeap::new()),
            available: Condvar::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Callers already hold the state lock when they push, so the index they
    /// assigned and the heap stay in step.
    pub(crate) fn push(&self, task: Task) {
        let mut heap = self.heap.lock();
        heap.push(Reverse(task));
        self.available.notify_one();
    }

    /// Hands out the head task without blocking, or nothing while gated.
    pub(crate) fn poll(&self) -> Option<Task> {
        let mut state = self.ledger.lock();
        if state.exclusive_active() {
            trace!("queue poll: exclusive task active");
            return None;
        }
        let mut heap = self.heap.lock();
        let Reverse(mut task) = heap.pop()?;
        task.ticket = state.issue_ticket();
        Some(task)
    }

    /// Blocks until a task can be handed out, the deadline passes, or the
    /// queue is closed and empty.
    pub(crate) fn take(&self, deadline: Option<Instant>) -> Take {
        loop {
            let mut state = self.ledger.lock();
            let gated = state.exclusive_active();
            let mut heap = self.heap.lock();

            if !gated {
                if let Some(Reverse(mut task)) = heap.pop() {
                    task.ticket = state.issue_ticket();
                    trace!(
                        task = %task.meta.name,
                        ticket = task.ticket,
                        remaining = heap.len(),
                        "taken from queue"
                    );
                    return Take::Task(task);
                }
            } else {
                trace!("queue: some exclusive is still active");
            }

            if heap.is_empty() && self.closed.load(Ordering::Acquire) {
                return Take::Closed;
            }

            // Keep the heap lock while letting go of the state lock: whoever
            // clears the gate or pushes needs the heap lock to notify, so the
            // wake-up cannot fall between the check above and the wait.
            drop(state);
            match deadline {
                Some(deadline) => {
                    if self.available.wait_until(&mut heap, deadline).timed_out() {
                        return Take::TimedOut;
                    }
                }
                None => self.available.wait(&mut heap),
            }
        }
    }

    /// Wakes every waiting worker, e.g. once an exclusive task is done.
    pub(crate) fn wake_all(&self) {
        let _heap = self.heap.lock();
        self.available.notify_all();
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.wake_all();
    }

    /// Removes every task, in dispatch order.
    pub(crate) fn drain(&self) -> Vec<Task> {
        let mut heap = self.heap.lock();
        let mut tasks: Vec<Task> = heap.drain().map(|Reverse(task)| task).collect();
        tasks.sort();
        tasks
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.lock().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.lock().is_empty()
    }
}
