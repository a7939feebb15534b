//! Self-test recording of terminal state transitions.
//!
//! With `Config::self_test` on, the ledger clones its state around every
//! mutation, checks that exactly the expected counter moved by exactly one,
//! and appends the resulting state to an ordered history of bounded length.
//! Breaks are logged, never raised.

use super::terminal_state::TerminalState;
use crate::executor::ExecutionMode;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;
use tracing::{error, warn};

/// The phase a discarded task was in when it gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Queued,
    Pending,
}

/// One state transition of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The terminal came up. Always the first record.
    Created,
    Queued { name: String },
    Pending { name: String },
    Active { name: String, mode: ExecutionMode },
    Finished { name: String, mode: ExecutionMode },
    /// Cancelled or interrupted before becoming active.
    Discarded { name: String, phase: Phase },
}

impl Transition {
    pub fn task_name(&self) -> Option<&str> {
        match self {
            Transition::Created => None,
            Transition::Queued { name }
            | Transition::Pending { name }
            | Transition::Active { name, .. }
            | Transition::Finished { name, .. }
            | Transition::Discarded { name, .. } => Some(name),
        }
    }

    /// The per-counter change this transition must produce, as
    /// `(queued, pending, active, finished)`.
    fn expected_delta(&self) -> (i64, i64, i64, i64) {
        match self {
            Transition::Created => (0, 0, 0, 0),
            Transition::Queued { .. } => (1, 0, 0, 0),
            Transition::Pending { .. } => (-1, 1, 0, 0),
            Transition::Active { .. } => (0, -1, 1, 0),
            Transition::Finished { .. } => (0, 0, -1, 1),
            Transition::Discarded {
                phase: Phase::Queued,
                ..
            } => (-1, 0, 0, 1),
            Transition::Discarded {
                phase: Phase::Pending,
                ..
            } => (0, -1, 0, 1),
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::Created => f.write_str("created"),
            Transition::Queued { name } => write!(f, "new queued {}", name),
            Transition::Pending { name } => write!(f, "new pending {}", name),
            Transition::Active { name, .. } => write!(f, "new active {}", name),
            Transition::Finished { name, .. } => write!(f, "new finished {}", name),
            Transition::Discarded { name, phase } => {
                write!(f, "discarded {} from {:?}", name, phase)
            }
        }
    }
}

/// The state right after a transition.
#[derive(Debug, Clone)]
pub struct StateRecord {
    pub transition: Transition,
    pub state: TerminalState,
    pub at: Instant,
    pub wall_clock: DateTime<Utc>,
}

#[derive(Debug)]
pub(crate) struct Diagnostics {
    records: VecDeque<StateRecord>,
    limit: usize,
    dropped: usize,
    breaks: usize,
}

impl Diagnostics {
    pub(crate) fn new(initial: &TerminalState, limit: usize) -> Self {
        let mut diagnostics = Self {
            records: VecDeque::with_capacity(limit.min(1024)),
            limit: limit.max(1),
            dropped: 0,
            breaks: 0,
        };
        diagnostics.push(Transition::Created, initial.clone());
        diagnostics
    }

    pub(crate) fn record(
        &mut self,
        transition: Transition,
        before: &TerminalState,
        after: &TerminalState,
    ) {
        let (queued, pending, active, finished) = transition.expected_delta();
        let expected = [queued, pending, active, finished];
        let observed = delta(before, after);

        for (label, (want, got)) in ["queued", "pending", "active", "finished"]
            .iter()
            .zip(expected.iter().zip(observed.iter()))
        {
            if want != got {
                self.breaks += 1;
                error!(
                    terminal = after.terminal_name(),
                    %transition,
                    counter = *label,
                    expected = *want,
                    observed = *got,
                    "atomicity break: the count of {} differs",
                    label
                );
            }
        }

        if let Err(e) = after.validate() {
            self.breaks += 1;
            error!(terminal = after.terminal_name(), %transition, error = %e, "state invariant broken");
        }

        self.push(transition, after.clone());
    }

    fn push(&mut self, transition: Transition, state: TerminalState) {
        if self.records.len() == self.limit {
            self.records.pop_front();
            self.dropped += 1;
            if self.dropped == 1 {
                warn!(
                    terminal = state.terminal_name(),
                    limit = self.limit,
                    "self-test history full, dropping the oldest records"
                );
            }
        }
        self.records.push_back(StateRecord {
            transition,
            state,
            at: Instant::now(),
            wall_clock: Utc::now(),
        });
    }

    pub(crate) fn records(&self) -> &VecDeque<StateRecord> {
        &self.records
    }

    pub(crate) fn breaks(&self) -> usize {
        self.breaks
    }
}

fn delta(before: &TerminalState, after: &TerminalState) -> [i64; 4] {
    let (bq, bp, ba, bf) = before.counts();
    let (aq, ap, aa, af) = after.counts();
    [
        aq as i64 - bq as i64,
        ap as i64 - bp as i64,
        aa as i64 - ba as i64,
        af as i64 - bf as i64,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> TerminalState {
        TerminalState::new("diag".to_string(), 1)
    }

    #[test]
    fn test_starts_with_created_record() {
        let diagnostics = Diagnostics::new(&state(), 64);
        assert_eq!(diagnostics.records().len(), 1);
        assert_eq!(diagnostics.records()[0].transition, Transition::Created);
    }

    #[test]
    fn test_matching_delta_is_clean() {
        let mut diagnostics = Diagnostics::new(&state(), 64);
        let before = state();
        let mut after = before.clone();
        after.add_queued();

        diagnostics.record(
            Transition::Queued {
                name: "a".to_string(),
            },
            &before,
            &after,
        );

        assert_eq!(diagnostics.breaks(), 0);
        assert_eq!(diagnostics.records().len(), 2);
        assert_eq!(diagnostics.records()[1].state.queued(), 1);
    }

    #[test]
    fn test_wrong_delta_is_counted_not_raised() {
        let mut diagnostics = Diagnostics::new(&state(), 64);
        let before = state();
        let after = before.clone();

        diagnostics.record(
            Transition::Pending {
                name: "a".to_string(),
            },
            &before,
            &after,
        );

        // Both queued and pending failed to move.
        assert_eq!(diagnostics.breaks(), 2);
        assert_eq!(diagnostics.records().len(), 2);
    }

    #[test]
    fn test_records_are_time_ordered() {
        let mut diagnostics = Diagnostics::new(&state(), 64);
        let mut current = state();
        for i in 0..5 {
            let before = current.clone();
            current.add_queued();
            diagnostics.record(
                Transition::Queued {
                    name: i.to_string(),
                },
                &before,
                &current,
            );
        }

        let records: Vec<_> = diagnostics.records().iter().collect();
        for pair in records.windows(2) {
            assert!(pair[0].at <= pair[1].at);
        }
    }

    #[test]
    fn test_history_keeps_the_latest_records() {
        let mut diagnostics = Diagnostics::new(&state(), 3);
        let mut current = state();
        for i in 0..5 {
            let before = current.clone();
            current.add_queued();
            diagnostics.record(
                Transition::Queued {
                    name: i.to_string(),
                },
                &before,
                &current,
            );
        }

        let names: Vec<_> = diagnostics
            .records()
            .iter()
            .map(|r| r.transition.task_name().unwrap_or("-").to_string())
            .collect();
        assert_eq!(names, vec!["2", "3", "4"]);
        assert_eq!(diagnostics.records()[2].state.queued(), 5);
        assert_eq!(diagnostics.breaks(), 0);
    }

    #[test]
    fn test_transition_names() {
        let t = Transition::Discarded {
            name: "x".to_string(),
            phase: Phase::Pending,
        };
        assert_eq!(t.task_name(), Some("x"));
        assert_eq!(Transition::Created.task_name(), None);
        assert_eq!(t.to_string(), "discarded x from Pending");
    }
}
