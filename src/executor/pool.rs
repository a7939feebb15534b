use super::panic_handler::PanicHandler;
use super::task::{NewTask, TaskControl, TaskMeta};
use super::worker::Worker;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::scheduler::coordinator::ExclusionCoordinator;
use crate::scheduler::queue::GatedQueue;
use crate::state::{Ledger, Phase, StateRecord, TerminalState};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Bookkeeping for the worker threads, guarded by the pool lock.
///
/// The pool lock is always taken before the ledger's state lock.
#[derive(Debug, Default)]
struct WorkerSet {
    live: usize,
    next_id: usize,
    shutdown: bool,
    /// Set by `shutdown_now`: running tasks get interrupted, including any
    /// a worker registers afterwards.
    interrupting: bool,
    /// Controls of the tasks workers are currently running, by index.
    running: HashMap<u64, Arc<TaskControl>>,
}

#[derive(Debug)]
pub(crate) struct PoolShared {
    pub(crate) config: Config,
    pub(crate) ledger: Arc<Ledger>,
    pub(crate) queue: Arc<GatedQueue>,
    pub(crate) coordinator: ExclusionCoordinator,
    pub(crate) panic_handler: PanicHandler,
    workers: Mutex<WorkerSet>,
    terminated: Condvar,
}

impl PoolShared {
    /// Called by an idle worker whose keep-alive ran out. The worker may go
    /// only when nothing is queued; the emptiness check and the live count
    /// change happen under the pool lock, which submitters hold while they
    /// push, so a submission never lands without a worker to take it.
    pub(crate) fn try_retire(&self, id: usize) -> bool {
        let mut workers = self.workers.lock();
        if !self.queue.is_empty() {
            return false;
        }
        workers.live -= 1;
        debug!(worker = id, live = workers.live, "idle worker retires");
        self.signal_if_terminated(&workers);
        true
    }

    pub(crate) fn worker_exited(&self, id: usize) {
        let mut workers = self.workers.lock();
        workers.live -= 1;
        debug!(worker = id, live = workers.live, "worker exits");
        self.signal_if_terminated(&workers);
    }

    pub(crate) fn track(&self, index: u64, control: Arc<TaskControl>) {
        let mut workers = self.workers.lock();
        if workers.interrupting {
            control.interrupt();
        }
        workers.running.insert(index, control);
    }

    pub(crate) fn untrack(&self, index: u64) {
        self.workers.lock().running.remove(&index);
    }

    fn signal_if_terminated(&self, workers: &WorkerSet) {
        if workers.shutdown && workers.live == 0 {
            info!(terminal = %self.config.name, "terminal terminated");
            self.terminated.notify_all();
        }
    }
}

/// Bounded pool of worker threads draining the gated queue.
///
/// Workers are started on demand, one per submission, until `pool_size` of
/// them are alive. An idle worker retires after the keep-alive window.
#[derive(Debug)]
pub(crate) struct Pool {
    shared: Arc<PoolShared>,
}

impl Pool {
    pub(crate) fn new(config: Config) -> Self {
        let ledger = Arc::new(Ledger::new(
            config.name.clone(),
            config.pool_size,
            config.self_test.then_some(config.history_limit),
        ));
        let queue = Arc::new(GatedQueue::new(ledger.clone()));
        let coordinator = ExclusionCoordinator::new(
            ledger.clone(),
            queue.clone(),
            config.exclusive_poll_interval,
        );

        Self {
            shared: Arc::new(PoolShared {
                config,
                ledger,
                queue,
                coordinator,
                panic_handler: PanicHandler::new(),
                workers: Mutex::new(WorkerSet::default()),
                terminated: Condvar::new(),
            }),
        }
    }

    /// Accepts a task: starts a worker if the pool is not full yet, then
    /// assigns the index, counts the task queued and pushes it, all under
    /// the state lock.
    pub(crate) fn execute(&self, task: NewTask) -> Result<TaskMeta> {
        let mut workers = self.shared.workers.lock();
        if workers.shutdown {
            return Err(Error::Rejected(self.shared.config.name.clone()));
        }

        if workers.live < self.shared.config.pool_size {
            if let Err(e) = self.spawn_worker(&mut workers) {
                if workers.live == 0 {
                    return Err(e);
                }
                warn!(live = workers.live, error = %e, "running with fewer workers");
            }
        }

        let mut state = self.shared.ledger.lock();
        let (name, index) = state.accept(&task.name);
        let task = task.accept(name, index);
        let meta = task.meta.clone();
        self.shared.queue.push(task);
        Ok(meta)
    }

    fn spawn_worker(&self, workers: &mut WorkerSet) -> Result<()> {
        let id = workers.next_id;
        let config = &self.shared.config;

        let mut builder =
            thread::Builder::new().name(format!("{}-{}", config.thread_name_prefix, id));
        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let worker = Worker::new(id, self.shared.clone());
        builder.spawn(move || worker.run()).map_err(|e| {
            error!(worker = id, error = %e, "failed to spawn worker");
            Error::executor(format!("spawn failed: {}", e))
        })?;

        workers.next_id += 1;
        workers.live += 1;
        debug!(worker = id, live = workers.live, "worker spawned");
        Ok(())
    }

    pub(crate) fn shutdown(&self) {
        let mut workers = self.shared.workers.lock();
        if workers.shutdown {
            return;
        }
        workers.shutdown = true;
        info!(
            terminal = %self.shared.config.name,
            queued = self.shared.queue.len(),
            "shutting down"
        );
        self.shared.queue.close();
        self.shared.signal_if_terminated(&workers);
    }

    /// Shuts down, pulls every task still queued and interrupts the running
    /// ones. Returns the names of the drained tasks in dispatch order.
    pub(crate) fn shutdown_now(&self) -> Vec<String> {
        self.shutdown();

        let interrupted = {
            let mut workers = self.shared.workers.lock();
            workers.interrupting = true;
            for control in workers.running.values() {
                control.interrupt();
            }
            workers.running.len()
        };

        let drained = self.shared.queue.drain();
        let mut names = Vec::with_capacity(drained.len());
        for task in drained {
            let (meta, body) = task.into_parts();
            self.shared.ledger.discard(&meta.name, Phase::Queued);
            // Dropping the body drops its completer, which cancels the handle.
            drop(body);
            names.push(meta.name);
        }

        info!(drained = names.len(), interrupted, "shut down now");
        names
    }

    pub(crate) fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut workers = self.shared.workers.lock();
        while !(workers.shutdown && workers.live == 0) {
            if self
                .shared
                .terminated
                .wait_until(&mut workers, deadline)
                .timed_out()
            {
                return workers.shutdown && workers.live == 0;
            }
        }
        true
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shared.workers.lock().shutdown
    }

    pub(crate) fn is_terminated(&self) -> bool {
        let workers = self.shared.workers.lock();
        workers.shutdown && workers.live == 0
    }

    pub(crate) fn live_workers(&self) -> usize {
        self.shared.workers.lock().live
    }

    pub(crate) fn config(&self) -> &Config {
        &self.shared.config
    }

    pub(crate) fn snapshot(&self) -> TerminalState {
        self.shared.ledger.snapshot()
    }

    pub(crate) fn history(&self) -> Vec<StateRecord> {
        self.shared.ledger.history()
    }

    pub(crate) fn atomicity_breaks(&self) -> usize {
        self.shared.ledger.atomicity_breaks()
    }

    pub(crate) fn panic_count(&self) -> usize {
        self.shared.panic_handler.panic_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::task::{noop_body, ExecutionMode};
    use crate::scheduler::Priority;

    fn config(pool_size: usize, keep_alive: Option<Duration>) -> Config {
        Config::builder()
            .name("pool")
            .pool_size(pool_size)
            .keep_alive(keep_alive)
            .exclusive_poll_interval(Duration::from_millis(5))
            .build()
            .unwrap()
    }

    fn noop(name: &str) -> NewTask {
        NewTask {
            name: name.to_string(),
            priority: Priority::LOW,
            mode: ExecutionMode::Usual,
            control: Arc::new(TaskControl::new()),
            body: noop_body(),
        }
    }

    #[test]
    fn test_workers_spawn_on_demand_up_to_pool_size() {
        let pool = Pool::new(config(2, None));
        assert_eq!(pool.live_workers(), 0);

        for i in 0..5 {
            pool.execute(noop(&format!("t{}", i))).unwrap();
        }
        assert_eq!(pool.live_workers(), 2);

        pool.shutdown();
        assert!(pool.await_termination(Duration::from_secs(5)));
        assert_eq!(pool.snapshot().finished(), 5);
    }

    #[test]
    fn test_idle_workers_retire() {
        let pool = Pool::new(config(1, Some(Duration::from_millis(20))));
        pool.execute(noop("t")).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while pool.live_workers() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(pool.live_workers(), 0);

        // A later submission brings a worker back.
        pool.execute(noop("again")).unwrap();
        pool.shutdown();
        assert!(pool.await_termination(Duration::from_secs(5)));
        assert_eq!(pool.snapshot().finished(), 2);
    }

    #[test]
    fn test_rejects_after_shutdown() {
        let pool = Pool::new(config(1, None));
        pool.shutdown();

        assert!(pool.is_shutdown());
        assert!(pool.is_terminated());
        assert_eq!(
            pool.execute(noop("late")),
            Err(Error::Rejected("pool".to_string()))
        );
    }
}
