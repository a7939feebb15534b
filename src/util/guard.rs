/// Runs a closure when dropped, on normal exit, early return or unwind.
///
/// Used for the bookkeeping that has to happen however a task ends.
pub(crate) struct OnDrop<F: FnOnce()> {
    closure: Option<F>,
}

impl<F: FnOnce()> OnDrop<F> {
    pub(crate) fn new(closure: F) -> Self {
        OnDrop {
            closure: Some(closure),
        }
    }
}

impl<F: FnOnce()> Drop for OnDrop<F> {
    fn drop(&mut self) {
        if let Some(closure) = self.closure.take() {
            closure();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[test]
    fn test_runs_on_scope_exit() {
        let ran = Cell::new(false);
        {
            let _guard = OnDrop::new(|| ran.set(true));
            assert!(!ran.get());
        }
        assert!(ran.get());
    }

    #[test]
    fn test_runs_on_unwind() {
        let ran = Cell::new(false);
        let result = catch_unwind(AssertUnwindSafe(|| {
            let _guard = OnDrop::new(|| ran.set(true));
            panic!("boom");
        }));
        assert!(result.is_err());
        assert!(ran.get());
    }
}
