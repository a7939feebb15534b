use crate::error::{Error, Result};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::warn;

/// Runs user work with unwinding contained, so a panicking task never takes
/// its worker thread down and never skips the terminal's bookkeeping.
#[derive(Debug, Default)]
pub struct PanicHandler {
    panicked: AtomicUsize,
}

impl PanicHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `work`, turning a panic into `Error::TaskPanicked` carrying the
    /// panic message.
    pub fn execute<F, T>(&self, work: F) -> Result<T>
    where
        F: FnOnce() -> T,
    {
        catch_unwind(AssertUnwindSafe(work)).map_err(|payload| {
            let info = PanicInfo::from_payload(payload.as_ref());
            let seen = self.panicked.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(
                message = %info.message,
                worker = std::thread::current().name().unwrap_or("unnamed"),
                panics_so_far = seen,
                "task panicked"
            );
            info.into()
        })
    }

    pub fn panic_count(&self) -> usize {
        self.panicked.load(Ordering::Relaxed)
    }
}

/// What is left of a task's panic once it has been caught.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanicInfo {
    pub message: String,
}

impl PanicInfo {
    fn from_payload(payload: &(dyn Any + Send)) -> Self {
        let message = match payload.downcast_ref::<&'static str>() {
            Some(text) => (*text).to_string(),
            None => payload
                .downcast_ref::<String>()
                .cloned()
                .unwrap_or_else(|| "non-string panic payload".to_string()),
        };
        Self { message }
    }
}

impl From<PanicInfo> for Error {
    fn from(info: PanicInfo) -> Self {
        Error::TaskPanicked(info.message)
    }
}
