pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("executor error: {0}")]
    Executor(String),

    #[error("task rejected: terminal {0} is shut down")]
    Rejected(String),

    #[error("task cancelled")]
    Cancelled,

    #[error("timed out waiting for task")]
    Timeout,

    #[error("task panicked: {0}")]
    TaskPanicked(String),

    #[error("terminal state invariant broken: {0}")]
    Invariant(String),
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn executor<S: Into<String>>(msg: S) -> Self {
        Error::Executor(msg.into())
    }

    pub fn invariant<S: Into<String>>(msg: S) -> Self {
        Error::Invariant(msg.into())
    }

    /// True for the outcome a handle reports after `cancel` or an interrupt.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}
