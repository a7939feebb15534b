// worker thread loop
use super::pool::PoolShared;
use super::task::{CurrentTask, Task};
use crate::scheduler::queue::Take;
use crate::util::OnDrop;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

pub(crate) type WorkerId = usize;

pub(crate) struct Worker {
    id: WorkerId,
    shared: Arc<PoolShared>,
}

impl Worker {
    pub(crate) fn new(id: WorkerId, shared: Arc<PoolShared>) -> Self {
        Self { id, shared }
    }

    // main loop
    pub(crate) fn run(self) {
        debug!(worker = self.id, "worker started");

        loop {
            // Fast path: no deadline to compute while work is waiting.
            if let Some(task) = self.shared.queue.poll() {
                self.execute(task);
                continue;
            }

            let deadline = self
                .shared
                .config
                .keep_alive
                .map(|keep_alive| Instant::now() + keep_alive);

            match self.shared.queue.take(deadline) {
                Take::Task(task) => self.execute(task),
                Take::TimedOut => {
                    if self.shared.try_retire(self.id) {
                        return;
                    }
                }
                Take::Closed => {
                    self.shared.worker_exited(self.id);
                    return;
                }
            }
        }
    }

    fn execute(&self, task: Task) {
        if !task.control.try_start() {
            // Cancelled while it sat in the queue.
            self.shared.coordinator.discard_queued(&task.meta, task.ticket);
            return;
        }

        let index = task.meta.index;
        trace!(worker = self.id, task = %task.meta.name, index, "picked up");

        self.shared.track(index, task.control.clone());
        let _untrack = OnDrop::new(|| self.shared.untrack(index));
        let _current = CurrentTask::enter(task.control.clone());

        let outcome = self.shared.coordinator.run(task, &self.shared.panic_handler);
        trace!(worker = self.id, index, ?outcome, "task left the coordinator");
    }
}
