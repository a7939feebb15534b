//! Scheduling: dispatch order and mutual exclusion.
//!
//! The [`queue`] hands tasks out by priority and submission index, and holds
//! everything back while an exclusive task is active. The [`coordinator`]
//! runs each dequeued task under the usual or exclusive protocol.

pub(crate) mod coordinator;
pub mod priority;
pub(crate) mod queue;

pub use priority::Priority;
