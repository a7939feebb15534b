//! Exclusion coordinator - runs a task's body under the usual or exclusive
//! protocol.
//!
//! Two locks are involved. The task lock (`task_lock`, with the
//! `exclusive_done` condition) serializes entry into the active phase and is
//! held by an exclusive task for its whole run. The state lock lives in the
//! [`Ledger`]. Order is always task lock, then state lock, then the queue's
//! heap lock.
//!
//! Tasks reach the task lock in the order the queue handed them out: each
//! dequeued task carries a ticket, and only the ticket being served may try
//! the lock. The admission lock is never held while taking another lock.

use super::queue::GatedQueue;
use crate::executor::task::{Body, TaskControl};
use crate::executor::{ExecutionMode, PanicHandler, Task, TaskMeta};
use crate::state::{Ledger, Phase};
use crate::util::OnDrop;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// How a task left the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// The body ran (successfully or not) and the task is finished.
    Completed,
    /// Interrupted before becoming active; the body never ran.
    Abandoned(Phase),
}

/// Ticket turnstile in front of the task lock.
#[derive(Debug, Default)]
struct Admission {
    serving: u64,
    /// Tickets given up before their turn came.
    skipped: BTreeSet<u64>,
}

impl Admission {
    fn pass(&mut self, ticket: u64) {
        if ticket != self.serving {
            self.skipped.insert(ticket);
            return;
        }
        self.serving += 1;
        while self.skipped.remove(&self.serving) {
            self.serving += 1;
        }
    }
}

#[derive(Debug)]
pub(crate) struct ExclusionCoordinator {
    task_lock: Mutex<()>,
    exclusive_done: Condvar,
    admission: Mutex<Admission>,
    next_turn: Condvar,
    ledger: Arc<Ledger>,
    queue: Arc<GatedQueue>,
    poll_interval: Duration,
}

impl ExclusionCoordinator {
    pub(crate) fn new(ledger: Arc<Ledger>, queue: Arc<GatedQueue>, poll_interval: Duration) -> Self {
        Self {
            task_lock: Mutex::new(()),
            exclusive_done: Condvar::new(),
            admission: Mutex::new(Admission::default()),
            next_turn: Condvar::new(),
            ledger,
            queue,
            poll_interval,
        }
    }

    pub(crate) fn run(&self, task: Task, handler: &PanicHandler) -> Outcome {
        let control = task.control.clone();
        let ticket = task.ticket;
        let (meta, body) = task.into_parts();
        match meta.mode {
            ExecutionMode::Usual => self.run_usual(&meta, ticket, body, &control, handler),
            ExecutionMode::Exclusive => self.run_exclusive(&meta, ticket, body, &control, handler),
        }
    }

    /// Records a task cancelled before a worker ever started it, giving up
    /// its turn.
    pub(crate) fn discard_queued(&self, meta: &TaskMeta, ticket: u64) {
        debug!(task = %meta.name, "cancelled while queued");
        self.ledger.discard(&meta.name, Phase::Queued);
        self.pass_turn(ticket);
    }

    fn run_usual(
        &self,
        meta: &TaskMeta,
        ticket: u64,
        body: Body,
        control: &TaskControl,
        handler: &PanicHandler,
    ) -> Outcome {
        let name = meta.name.as_str();

        let Some(mut gate) = self.acquire_task_lock(control, ticket) else {
            debug!(task = name, "interrupted before pending");
            self.ledger.discard(name, Phase::Queued);
            return Outcome::Abandoned(Phase::Queued);
        };

        self.ledger.lock().register_pending(name);

        // The exclusive task signals `exclusive_done` while holding the task
        // lock, and we hold it from the check to the wait, so the signal
        // cannot be missed. Becoming active happens in the same state-lock
        // section as the check, so an exclusive task cannot slip in between.
        loop {
            {
                let mut state = self.ledger.lock();
                if !state.exclusive_active() {
                    state.register_active(name, ExecutionMode::Usual);
                    break;
                }
            }
            if control.is_interrupted() {
                debug!(task = name, "interrupted while waiting for exclusive task");
                self.ledger.discard(name, Phase::Pending);
                return Outcome::Abandoned(Phase::Pending);
            }
            debug!(task = name, "can't start: there are active exclusives");
            self.exclusive_done.wait_for(&mut gate, self.poll_interval);
        }

        // Usual tasks need no exclusion among themselves.
        drop(gate);

        let publish = {
            let _finished = OnDrop::new(|| {
                self.ledger.finish(name, ExecutionMode::Usual);
                debug!(task = name, "ends execution");
            });

            debug!(task = name, "starts execution");
            body(handler)
        };
        publish();
        Outcome::Completed
    }

    fn run_exclusive(
        &self,
        meta: &TaskMeta,
        ticket: u64,
        body: Body,
        control: &TaskControl,
        handler: &PanicHandler,
    ) -> Outcome {
        let name = meta.name.as_str();

        let Some(gate) = self.acquire_task_lock(control, ticket) else {
            debug!(task = name, "interrupted before pending");
            self.ledger.discard(name, Phase::Queued);
            return Outcome::Abandoned(Phase::Queued);
        };
        debug!(task = name, "exclusive holds the task lock");

        self.ledger.lock().register_pending(name);

        // Wait for every active usual task to drain. Each finishing usual
        // task signals once the count reaches zero; the bounded wait also
        // lets us notice interrupts.
        {
            let mut state = self.ledger.lock();
            loop {
                if !state.usual_active() {
                    state.register_active(name, ExecutionMode::Exclusive);
                    break;
                }
                if control.is_interrupted() {
                    debug!(task = name, "interrupted while waiting for usual tasks");
                    state.register_discarded(name, Phase::Pending);
                    return Outcome::Abandoned(Phase::Pending);
                }
                debug!(
                    task = name,
                    active_usuals = state.active_usuals(),
                    "can't start: there are active usuals"
                );
                self.ledger.wait_for_drain(&mut state, self.poll_interval);
            }
        }

        // Guards drop in reverse order: first the finish is recorded and
        // usual waiters are signalled, then queue waiters are woken. The task
        // lock goes after both, and the outcome is published last.
        let publish = {
            let _wake_queue = OnDrop::new(|| self.queue.wake_all());
            let _finished = OnDrop::new(|| {
                self.ledger.finish(name, ExecutionMode::Exclusive);
                self.exclusive_done.notify_all();
                debug!(task = name, "unlocks and ends");
            });

            debug!(task = name, "starts exclusively");
            body(handler)
        };
        drop(gate);
        publish();
        Outcome::Completed
    }

    /// Waits for `ticket` to be served, then takes the task lock. Gives up,
    /// and passes the turn on, if the task gets interrupted on the way.
    fn acquire_task_lock(
        &self,
        control: &TaskControl,
        ticket: u64,
    ) -> Option<MutexGuard<'_, ()>> {
        {
            let mut admission = self.admission.lock();
            while admission.serving != ticket {
                if control.is_interrupted() {
                    admission.pass(ticket);
                    return None;
                }
                self.next_turn.wait_for(&mut admission, self.poll_interval);
            }
        }
        trace!(ticket, "turn to take the task lock");

        // The next ticket may only try once we hold the lock or gave up.
        let _next = OnDrop::new(|| self.pass_turn(ticket));
        loop {
            if let Some(gate) = self.task_lock.try_lock_for(self.poll_interval) {
                return Some(gate);
            }
            if control.is_interrupted() {
                return None;
            }
        }
    }

    fn pass_turn(&self, ticket: u64) {
        self.admission.lock().pass(ticket);
        self.next_turn.notify_all();
    }
}
