//! Terminal status tracking.
//!
//! The live state lives in a [`Ledger`] owned by the terminal; every task
//! transition goes through it under a single lock. The outside world only
//! ever sees [`TerminalState`] snapshots.

pub mod diagnostics;
pub(crate) mod ledger;
pub mod terminal_state;

pub use diagnostics::{Phase, StateRecord, Transition};
pub use terminal_state::{FinishedTask, TerminalState, FINISHED_HISTORY_LEN};

pub(crate) use ledger::Ledger;
