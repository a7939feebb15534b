pub use crate::config::{Config, ConfigBuilder};
pub use crate::error::{Error, Result};
pub use crate::executor::{is_interrupted, TaskHandle};
pub use crate::scheduler::Priority;
pub use crate::state::TerminalState;
pub use crate::terminal::Terminal;
