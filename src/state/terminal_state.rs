use crate::error::{Error, Result};
use indexmap::IndexMap;
use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

/// How many finished task names a terminal remembers.
pub const FINISHED_HISTORY_LEN: usize = 100;

/// A finished task as remembered by the terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedTask {
    pub name: String,
    pub finished_at: Instant,
}

/// The status ledger of a terminal.
///
/// A value of this type handed out by the terminal is always a snapshot: a
/// deep copy taken atomically under the terminal's state lock. Later
/// activity in the terminal never shows through it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalState {
    terminal_name: String,
    pool_size: usize,
    queued: u64,
    finished: u64,
    pending_tasks: IndexMap<String, Instant>,
    active_tasks: IndexMap<String, Instant>,
    last_finished: VecDeque<FinishedTask>,
    active_usuals: u64,
    active_exclusives: u64,
}

impl TerminalState {
    pub(crate) fn new(terminal_name: String, pool_size: usize) -> Self {
        Self {
            terminal_name,
            pool_size,
            queued: 0,
            finished: 0,
            pending_tasks: IndexMap::new(),
            active_tasks: IndexMap::new(),
            last_finished: VecDeque::with_capacity(FINISHED_HISTORY_LEN),
            active_usuals: 0,
            active_exclusives: 0,
        }
    }

    pub fn terminal_name(&self) -> &str {
        &self.terminal_name
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Accepted tasks no worker has picked up yet, plus tasks a worker holds
    /// but that have not reached their pending phase.
    pub fn queued(&self) -> u64 {
        self.queued
    }

    pub fn pending(&self) -> u64 {
        self.pending_tasks.len() as u64
    }

    pub fn active(&self) -> u64 {
        self.active_tasks.len() as u64
    }

    pub fn finished(&self) -> u64 {
        self.finished
    }

    pub fn active_usuals(&self) -> u64 {
        self.active_usuals
    }

    pub fn active_exclusives(&self) -> u64 {
        self.active_exclusives
    }

    /// `(queued, pending, active, finished)`.
    pub fn counts(&self) -> (u64, u64, u64, u64) {
        (self.queued, self.pending(), self.active(), self.finished)
    }

    /// Every task the terminal has accepted so far.
    pub fn total(&self) -> u64 {
        self.queued + self.pending() + self.active() + self.finished
    }

    /// Pending task names with the instant each entered the pending phase,
    /// in arrival order.
    pub fn pending_tasks(&self) -> &IndexMap<String, Instant> {
        &self.pending_tasks
    }

    /// Active task names with the instant each became active, in arrival
    /// order.
    pub fn active_tasks(&self) -> &IndexMap<String, Instant> {
        &self.active_tasks
    }

    /// Up to the last [`FINISHED_HISTORY_LEN`] finished tasks, oldest first.
    pub fn last_finished(&self) -> &VecDeque<FinishedTask> {
        &self.last_finished
    }

    pub fn last_finished_name(&self) -> Option<&str> {
        self.last_finished.back().map(|task| task.name.as_str())
    }

    pub fn is_idle(&self) -> bool {
        self.queued == 0 && self.pending_tasks.is_empty() && self.active_tasks.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        if self.active() != self.active_usuals + self.active_exclusives {
            return Err(Error::invariant(format!(
                "active {} != usuals {} + exclusives {}",
                self.active(),
                self.active_usuals,
                self.active_exclusives
            )));
        }
        if self.active_usuals > 0 && self.active_exclusives > 0 {
            return Err(Error::invariant(format!(
                "usual ({}) and exclusive ({}) tasks active together",
                self.active_usuals, self.active_exclusives
            )));
        }
        if self.active_exclusives > 1 {
            return Err(Error::invariant(format!(
                "{} exclusive tasks active",
                self.active_exclusives
            )));
        }
        if self.last_finished.len() > FINISHED_HISTORY_LEN {
            return Err(Error::invariant("finished history over capacity"));
        }
        Ok(())
    }

    pub(crate) fn add_queued(&mut self) {
        self.queued += 1;
    }

    pub(crate) fn take_queued(&mut self) {
        debug_assert!(self.queued > 0, "no queued task to take");
        self.queued = self.queued.saturating_sub(1);
    }

    pub(crate) fn add_pending(&mut self, name: &str, at: Instant) {
        self.pending_tasks.insert(name.to_string(), at);
    }

    pub(crate) fn take_pending(&mut self, name: &str) -> bool {
        self.pending_tasks.shift_remove(name).is_some()
    }

    pub(crate) fn add_active(&mut self, name: &str, exclusive: bool, at: Instant) {
        self.active_tasks.insert(name.to_string(), at);
        if exclusive {
            self.active_exclusives += 1;
        } else {
            self.active_usuals += 1;
        }
    }

    pub(crate) fn take_active(&mut self, name: &str, exclusive: bool) -> bool {
        let removed = self.active_tasks.shift_remove(name).is_some();
        if removed {
            if exclusive {
                self.active_exclusives -= 1;
            } else {
                self.active_usuals -= 1;
            }
        }
        removed
    }

    pub(crate) fn add_finished(&mut self, name: &str, at: Instant) {
        while self.last_finished.len() >= FINISHED_HISTORY_LEN {
            self.last_finished.pop_front();
        }
        self.last_finished.push_back(FinishedTask {
            name: name.to_string(),
            finished_at: at,
        });
        self.finished += 1;
    }
}

impl fmt::Display for TerminalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | queued {}; pending {} ({:?}); active {} ({:?}); (usuals {}; exclusives {}) finished {} ({})",
            self.terminal_name,
            self.queued,
            self.pending(),
            self.pending_tasks.keys().collect::<Vec<_>>(),
            self.active(),
            self.active_tasks.keys().collect::<Vec<_>>(),
            self.active_usuals,
            self.active_exclusives,
            self.finished,
            self.last_finished_name().unwrap_or(""),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walk_one_task_through() {
        let mut state = TerminalState::new("t".to_string(), 1);
        let now = Instant::now();

        state.add_queued();
        assert_eq!(state.counts(), (1, 0, 0, 0));

        state.take_queued();
        state.add_pending("a", now);
        assert_eq!(state.counts(), (0, 1, 0, 0));

        assert!(state.take_pending("a"));
        state.add_active("a", false, now);
        assert_eq!(state.counts(), (0, 0, 1, 0));
        assert_eq!(state.active_usuals(), 1);

        assert!(state.take_active("a", false));
        state.add_finished("a", now);
        assert_eq!(state.counts(), (0, 0, 0, 1));
        assert_eq!(state.last_finished_name(), Some("a"));
        assert!(state.validate().is_ok());
        assert!(state.is_idle());
    }

    #[test]
    fn test_finished_history_is_bounded() {
        let mut state = TerminalState::new("t".to_string(), 1);

        for i in 0..250 {
            state.add_finished(&i.to_string(), Instant::now());
        }

        assert_eq!(state.finished(), 250);
        assert_eq!(state.last_finished().len(), FINISHED_HISTORY_LEN);
        assert_eq!(state.last_finished().front().unwrap().name, "150");
        assert_eq!(state.last_finished_name(), Some("249"));
    }

    #[test]
    fn test_clone_is_independent() {
        let mut state = TerminalState::new("t".to_string(), 2);
        state.add_pending("a", Instant::now());

        let snapshot = state.clone();
        state.take_pending("a");
        state.add_active("a", true, Instant::now());
        state.add_finished("b", Instant::now());

        assert_eq!(snapshot.pending(), 1);
        assert!(snapshot.pending_tasks().contains_key("a"));
        assert_eq!(snapshot.active(), 0);
        assert!(snapshot.last_finished().is_empty());
    }

    #[test]
    fn test_validate_detects_overlap() {
        let mut state = TerminalState::new("t".to_string(), 2);
        let now = Instant::now();
        state.add_active("u", false, now);
        state.add_active("x", true, now);

        assert!(matches!(state.validate(), Err(Error::Invariant(_))));
    }

    #[test]
    fn test_display_lists_names() {
        let mut state = TerminalState::new("termini".to_string(), 2);
        state.add_pending("a", Instant::now());

        let line = state.to_string();
        assert!(line.starts_with("termini | queued 0; pending 1"));
        assert!(line.contains("\"a\""));
    }
}
