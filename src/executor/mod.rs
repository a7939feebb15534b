//! Task execution infrastructure.
//!
//! Task records and their handles, panic containment, and the worker pool
//! that drains the gated queue.

pub mod handle;
pub mod panic_handler;
pub(crate) mod pool;
pub mod task;
pub(crate) mod worker;

pub use handle::TaskHandle;
pub use panic_handler::{PanicHandler, PanicInfo};
pub use task::{is_interrupted, ExecutionMode, TaskMeta};

pub(crate) use task::Task;
