//! thread-terminal - a priority thread pool with exclusive tasks
//!
//! A [`Terminal`] runs named units of work on a bounded pool of worker
//! threads. Work is dispatched by [`Priority`] and then by submission order,
//! and any task may be marked *exclusive*: it becomes active only once no
//! other task is, and holds everything else back until it finishes.
//!
//! Every task moves through four phases (queued, pending, active,
//! finished) and the terminal keeps a consistent tally of them that can be
//! copied out at any time with [`Terminal::snapshot`].
//!
//! # Quick Start
//!
//! ```no_run
//! use thread_terminal::prelude::*;
//!
//! let terminal = Terminal::new(Config::builder().name("jobs").pool_size(4).build()?)?;
//!
//! let report = terminal.submit(|| 2 + 2, "report", Priority::LOW, false)?;
//! let migrate = terminal.submit(|| "migrated", "migrate", Priority::HIGH, true)?;
//!
//! assert_eq!(migrate.join()?, "migrated");
//! assert_eq!(report.join()?, 4);
//!
//! println!("{}", terminal.snapshot());
//! terminal.shutdown();
//! # Ok::<(), thread_terminal::Error>(())
//! ```
//!
//! # Features
//!
//! - **Priority dispatch**: lower rank first, ties in submission order
//! - **Exclusive tasks**: mutual exclusion against every other task
//! - **Consistent snapshots**: independent copies of the phase counters
//! - **Self-test mode**: a checked history of every state transition
//! - **Cooperative cancellation**: [`TaskHandle::cancel`] and [`is_interrupted`]

// Lint configuration
#![warn(missing_debug_implementations)]

pub mod config;
pub mod error;
pub mod executor;
pub mod prelude;
pub mod scheduler;
pub mod state;
pub mod terminal;

mod util;

// Re-export key types at crate root
pub use config::{Config, ConfigBuilder};
pub use error::{Error, Result};
pub use executor::{is_interrupted, ExecutionMode, TaskHandle, TaskMeta};
pub use scheduler::Priority;
pub use state::{FinishedTask, Phase, StateRecord, TerminalState, Transition};
pub use terminal::Terminal;
