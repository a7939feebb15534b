use super::diagnostics::{Diagnostics, Phase, StateRecord, Transition};
use super::terminal_state::TerminalState;
use crate::executor::ExecutionMode;
use parking_lot::{Condvar, Mutex, MutexGuard};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::debug;

const NAME_SUFFIX_LEN: usize = 6;

/// The terminal's single owner of its [`TerminalState`].
///
/// Everything behind the mutex is the "state lock": counters, name maps,
/// the submission index and the set of names still in use. Callers needing
/// a check and a transition to be one atomic step take [`Ledger::lock`] and
/// do both on the guard.
#[derive(Debug)]
pub(crate) struct Ledger {
    inner: Mutex<LedgerInner>,
    usuals_drained: Condvar,
}

#[derive(Debug)]
pub(crate) struct LedgerInner {
    state: TerminalState,
    names_in_use: HashSet<String>,
    next_index: u64,
    next_ticket: u64,
    diagnostics: Option<Diagnostics>,
}

impl Ledger {
    /// `history_limit` turns self-test recording on, keeping at most that
    /// many records.
    pub(crate) fn new(
        terminal_name: String,
        pool_size: usize,
        history_limit: Option<usize>,
    ) -> Self {
        let state = TerminalState::new(terminal_name, pool_size);
        let diagnostics = history_limit.map(|limit| Diagnostics::new(&state, limit));
        Self {
            inner: Mutex::new(LedgerInner {
                state,
                names_in_use: HashSet::new(),
                next_index: 0,
                next_ticket: 0,
                diagnostics,
            }),
            usuals_drained: Condvar::new(),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, LedgerInner> {
        self.inner.lock()
    }

    pub(crate) fn snapshot(&self) -> TerminalState {
        self.inner.lock().state.clone()
    }

    pub(crate) fn history(&self) -> Vec<StateRecord> {
        self.inner
            .lock()
            .diagnostics
            .as_ref()
            .map(|diagnostics| diagnostics.records().iter().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn atomicity_breaks(&self) -> usize {
        self.inner
            .lock()
            .diagnostics
            .as_ref()
            .map(Diagnostics::breaks)
            .unwrap_or(0)
    }

    /// Waits until signalled that no usual task is active, or until the
    /// timeout. The caller re-checks.
    pub(crate) fn wait_for_drain(&self, guard: &mut MutexGuard<'_, LedgerInner>, timeout: Duration) {
        self.usuals_drained.wait_for(guard, timeout);
    }

    /// Records a usual task's completion and wakes drain waiters once the
    /// last usual task is gone.
    pub(crate) fn finish(&self, name: &str, mode: ExecutionMode) {
        let mut inner = self.inner.lock();
        inner.register_finished(name, mode);
        if !inner.usual_active() {
            self.usuals_drained.notify_all();
        }
    }

    pub(crate) fn discard(&self, name: &str, phase: Phase) {
        self.inner.lock().register_discarded(name, phase);
    }
}

impl LedgerInner {
    pub(crate) fn exclusive_active(&self) -> bool {
        self.state.active_exclusives() > 0
    }

    pub(crate) fn usual_active(&self) -> bool {
        self.state.active_usuals() > 0
    }

    pub(crate) fn active_usuals(&self) -> u64 {
        self.state.active_usuals()
    }

    /// Accepts a task: settles its final name, hands out the next submission
    /// index and counts it as queued.
    pub(crate) fn accept(&mut self, requested: &str) -> (String, u64) {
        let name = self.unique_name(requested);
        self.names_in_use.insert(name.clone());

        let index = self.next_index;
        self.next_index += 1;

        self.transition(Transition::Queued { name: name.clone() }, |state| {
            state.add_queued();
        });
        (name, index)
    }

    /// Hands out the next activation turn. Called under the state lock as a
    /// task leaves the queue, so turns follow dispatch order.
    pub(crate) fn issue_ticket(&mut self) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        ticket
    }

    pub(crate) fn register_pending(&mut self, name: &str) {
        self.transition(
            Transition::Pending {
                name: name.to_string(),
            },
            |state| {
                state.take_queued();
                state.add_pending(name, Instant::now());
            },
        );
    }

    pub(crate) fn register_active(&mut self, name: &str, mode: ExecutionMode) {
        self.transition(
            Transition::Active {
                name: name.to_string(),
                mode,
            },
            |state| {
                state.take_pending(name);
                state.add_active(name, mode.is_exclusive(), Instant::now());
            },
        );
    }

    pub(crate) fn register_finished(&mut self, name: &str, mode: ExecutionMode) {
        self.transition(
            Transition::Finished {
                name: name.to_string(),
                mode,
            },
            |state| {
                state.take_active(name, mode.is_exclusive());
                state.add_finished(name, Instant::now());
            },
        );
        self.names_in_use.remove(name);
    }

    pub(crate) fn register_discarded(&mut self, name: &str, phase: Phase) {
        self.transition(
            Transition::Discarded {
                name: name.to_string(),
                phase,
            },
            |state| {
                match phase {
                    Phase::Queued => state.take_queued(),
                    Phase::Pending => {
                        state.take_pending(name);
                    }
                }
                state.add_finished(name, Instant::now());
            },
        );
        self.names_in_use.remove(name);
    }

    fn transition<F>(&mut self, transition: Transition, apply: F)
    where
        F: FnOnce(&mut TerminalState),
    {
        let before = self.diagnostics.as_ref().map(|_| self.state.clone());

        apply(&mut self.state);

        debug!(state = %self.state, "{}", transition);

        if let (Some(diagnostics), Some(before)) = (self.diagnostics.as_mut(), before) {
            diagnostics.record(transition, &before, &self.state);
        }
    }

    fn unique_name(&self, requested: &str) -> String {
        if !self.names_in_use.contains(requested) {
            return requested.to_string();
        }

        let mut rng = rand::thread_rng();
        loop {
            let suffix: String = (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(NAME_SUFFIX_LEN)
                .map(char::from)
                .collect();
            let candidate = format!("{}-{}", requested, suffix);
            if !self.names_in_use.contains(&candidate) {
                debug!(requested, renamed = %candidate, "task name in use, renamed");
                return candidate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_assigns_monotonic_indexes() {
        let ledger = Ledger::new("t".to_string(), 1, None);
        let mut inner = ledger.lock();

        let (a, ia) = inner.accept("a");
        let (b, ib) = inner.accept("b");

        assert_eq!((a.as_str(), ia), ("a", 0));
        assert_eq!((b.as_str(), ib), ("b", 1));
        assert_eq!(inner.state.queued(), 2);
    }

    #[test]
    fn test_name_collision_gets_suffix() {
        let ledger = Ledger::new("t".to_string(), 1, None);
        let mut inner = ledger.lock();

        let (first, _) = inner.accept("x");
        let (second, _) = inner.accept("x");

        assert_eq!(first, "x");
        assert_ne!(second, "x");
        assert!(second.starts_with("x-"));
        assert_eq!(second.len(), "x-".len() + NAME_SUFFIX_LEN);
    }

    #[test]
    fn test_name_is_free_again_after_finish() {
        let ledger = Ledger::new("t".to_string(), 1, None);
        {
            let mut inner = ledger.lock();
            let (name, _) = inner.accept("x");
            inner.register_pending(&name);
            inner.register_active(&name, ExecutionMode::Usual);
        }
        ledger.finish("x", ExecutionMode::Usual);

        let (again, _) = ledger.lock().accept("x");
        assert_eq!(again, "x");
    }

    #[test]
    fn test_full_lifecycle_with_self_test() {
        let ledger = Ledger::new("t".to_string(), 1, Some(1000));
        {
            let mut inner = ledger.lock();
            let (name, _) = inner.accept("1");
            inner.register_pending(&name);
            inner.register_active(&name, ExecutionMode::Exclusive);
            assert!(inner.exclusive_active());
            assert!(!inner.usual_active());
        }
        ledger.finish("1", ExecutionMode::Exclusive);

        let counts: Vec<_> = ledger
            .history()
            .iter()
            .map(|record| record.state.counts())
            .collect();
        assert_eq!(
            counts,
            vec![
                (0, 0, 0, 0),
                (1, 0, 0, 0),
                (0, 1, 0, 0),
                (0, 0, 1, 0),
                (0, 0, 0, 1)
            ]
        );
        assert_eq!(ledger.atomicity_breaks(), 0);
    }

    #[test]
    fn test_discard_keeps_sum() {
        let ledger = Ledger::new("t".to_string(), 1, Some(1000));
        {
            let mut inner = ledger.lock();
            inner.accept("q");
            let (p, _) = inner.accept("p");
            inner.register_pending(&p);
        }
        ledger.discard("q", Phase::Queued);
        ledger.discard("p", Phase::Pending);

        let state = ledger.snapshot();
        assert_eq!(state.counts(), (0, 0, 0, 2));
        assert_eq!(state.total(), 2);
        assert_eq!(ledger.atomicity_breaks(), 0);
    }

    #[test]
    fn test_history_empty_without_self_test() {
        let ledger = Ledger::new("t".to_string(), 1, None);
        ledger.lock().accept("a");
        assert!(ledger.history().is_empty());
    }

    #[test]
    fn test_snapshot_is_independent() {
        let ledger = Ledger::new("t".to_string(), 1, None);
        let (name, _) = ledger.lock().accept("a");
        let snapshot = ledger.snapshot();

        ledger.lock().register_pending(&name);

        assert_eq!(snapshot.counts(), (1, 0, 0, 0));
        assert_eq!(ledger.snapshot().counts(), (0, 1, 0, 0));
    }
}
