//! The public gateway: submission, bulk invocation, snapshots and shutdown.

use crate::config::Config;
use crate::error::Result;
use crate::executor::handle::{Completer, Completion};
use crate::executor::pool::Pool;
use crate::executor::task::{Body, ExecutionMode, NewTask, Publish, TaskControl};
use crate::executor::{PanicHandler, TaskHandle};
use crate::scheduler::Priority;
use crate::state::{StateRecord, TerminalState};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// A pool of worker threads running prioritized tasks, some of them
/// exclusive.
///
/// Tasks are handed out by priority, then by submission order. An exclusive
/// task only becomes active once no other task is, and nothing else becomes
/// active until it is finished.
///
/// ```no_run
/// use thread_terminal::{Priority, Terminal};
///
/// let terminal = Terminal::with_pool_size("io", 4).unwrap();
/// let handle = terminal
///     .submit(|| 40 + 2, "answer", Priority::HIGH, false)
///     .unwrap();
/// assert_eq!(handle.join().unwrap(), 42);
///
/// terminal.shutdown();
/// ```
#[derive(Debug)]
pub struct Terminal {
    pool: Pool,
}

impl Terminal {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        debug!(
            terminal = %config.name,
            pool_size = config.pool_size,
            self_test = config.self_test,
            "terminal created"
        );
        Ok(Self {
            pool: Pool::new(config),
        })
    }

    pub fn with_pool_size<S: Into<String>>(name: S, pool_size: usize) -> Result<Self> {
        Self::new(Config::builder().name(name).pool_size(pool_size).build()?)
    }

    /// Submits `work` under `name`.
    ///
    /// If a task that is not finished yet already uses `name`, a random
    /// six-character suffix is appended; [`TaskHandle::name`] reports what
    /// was used. Fails only once the terminal is shut down.
    pub fn submit<F, T>(
        &self,
        work: F,
        name: &str,
        priority: Priority,
        exclusive: bool,
    ) -> Result<TaskHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let control = Arc::new(TaskControl::new());
        let completion = Arc::new(Completion::new(control.clone()));
        let completer = Completer::new(completion.clone());

        let body: Body = Box::new(move |handler: &PanicHandler| -> Publish {
            let outcome = handler.execute(work);
            Box::new(move || completer.complete(outcome))
        });

        let meta = self.pool.execute(NewTask {
            name: name.to_string(),
            priority,
            mode: ExecutionMode::from_flag(exclusive),
            control,
            body,
        })?;

        Ok(TaskHandle::new(meta, completion))
    }

    /// Submits every `(work, name)` pair with the same priority and mode,
    /// then waits for all of them. The returned handles are all done.
    ///
    /// If a submission is rejected, the members already submitted are
    /// cancelled and the error is returned.
    pub fn invoke_all<I, F, T, S>(
        &self,
        batch: I,
        priority: Priority,
        exclusive: bool,
    ) -> Result<Vec<TaskHandle<T>>>
    where
        I: IntoIterator<Item = (F, S)>,
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
        S: AsRef<str>,
    {
        let handles = self.submit_batch(batch, priority, exclusive)?;
        for handle in &handles {
            handle.wait();
        }
        Ok(handles)
    }

    /// Like [`Terminal::invoke_all`], but gives up at `timeout`: every
    /// member not done by then is cancelled with interruption and reports
    /// `Error::Cancelled`.
    pub fn invoke_all_timeout<I, F, T, S>(
        &self,
        batch: I,
        priority: Priority,
        exclusive: bool,
        timeout: Duration,
    ) -> Result<Vec<TaskHandle<T>>>
    where
        I: IntoIterator<Item = (F, S)>,
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
        S: AsRef<str>,
    {
        let deadline = Instant::now() + timeout;
        let handles = self.submit_batch(batch, priority, exclusive)?;

        let mut expired = false;
        for handle in &handles {
            if !expired && !handle.wait_deadline(deadline) {
                debug!(task = handle.name(), "batch deadline passed");
                expired = true;
            }
            if expired {
                handle.cancel(true);
            }
        }
        Ok(handles)
    }

    fn submit_batch<I, F, T, S>(
        &self,
        batch: I,
        priority: Priority,
        exclusive: bool,
    ) -> Result<Vec<TaskHandle<T>>>
    where
        I: IntoIterator<Item = (F, S)>,
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
        S: AsRef<str>,
    {
        let batch = batch.into_iter();
        let mut handles = Vec::with_capacity(batch.size_hint().0);
        for (work, name) in batch {
            match self.submit(work, name.as_ref(), priority, exclusive) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    for handle in &handles {
                        handle.cancel(true);
                    }
                    return Err(e);
                }
            }
        }
        Ok(handles)
    }

    /// A deep copy of the current state; later activity does not touch it.
    pub fn snapshot(&self) -> TerminalState {
        self.pool.snapshot()
    }

    /// Every recorded transition with the state right after it. Empty
    /// unless the terminal was built with `self_test`.
    pub fn state_history(&self) -> Vec<StateRecord> {
        self.pool.history()
    }

    /// Transitions whose before/after states did not line up. Always zero
    /// without `self_test`.
    pub fn atomicity_breaks(&self) -> usize {
        self.pool.atomicity_breaks()
    }

    pub fn panicked_tasks(&self) -> usize {
        self.pool.panic_count()
    }

    /// Stops accepting tasks. Everything already submitted still runs.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }

    /// Stops accepting tasks, cancels everything still queued and
    /// interrupts running tasks. Returns the names of the cancelled queued
    /// tasks.
    pub fn shutdown_now(&self) -> Vec<String> {
        self.pool.shutdown_now()
    }

    /// Blocks until every worker is gone after a shutdown, or the timeout
    /// elapses. Returns whether the terminal terminated.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        self.pool.await_termination(timeout)
    }

    pub fn is_shutdown(&self) -> bool {
        self.pool.is_shutdown()
    }

    pub fn is_terminated(&self) -> bool {
        self.pool.is_terminated()
    }

    pub fn name(&self) -> &str {
        &self.pool.config().name
    }

    pub fn pool_size(&self) -> usize {
        self.pool.config().pool_size
    }

    pub fn config(&self) -> &Config {
        self.pool.config()
    }

    pub fn live_workers(&self) -> usize {
        self.pool.live_workers()
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        self.pool.shutdown();
    }
}
