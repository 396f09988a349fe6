//! Close-exactly-once guard

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::error::Result;

type Teardown = Box<dyn FnOnce() -> Result<()> + Send>;

/// Runs a teardown action at most once
///
/// The first [`CloseGuard::close`] runs the teardown and returns its result.
/// Every later call, from any thread or code path, returns `Ok(())` without
/// running anything.
pub struct CloseGuard {
    closed: AtomicBool,
    teardown: Mutex<Option<Teardown>>,
}

impl fmt::Debug for CloseGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloseGuard")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl CloseGuard {
    /// Create a guard around a teardown action
    pub fn new<F>(teardown: F) -> Self
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        Self {
            closed: AtomicBool::new(false),
            teardown: Mutex::new(Some(Box::new(teardown))),
        }
    }

    /// Whether close has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Run the teardown if it has not run yet
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let teardown = match self.teardown.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        match teardown {
            Some(teardown) => teardown(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    use super::*;
    use crate::engine::EngineError;
    use crate::error::Error;

    fn counting_guard() -> (CloseGuard, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let guard = CloseGuard::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        (guard, calls)
    }

    #[test]
    fn test_close_runs_teardown_once() {
        let (guard, calls) = counting_guard();

        assert!(!guard.is_closed());
        guard.close().expect("first close");
        guard.close().expect("second close");
        guard.close().expect("third close");

        assert!(guard.is_closed());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_close_runs_teardown_once() {
        let (guard, calls) = counting_guard();
        let guard = Arc::new(guard);

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let guard = guard.clone();
                std::thread::spawn(move || guard.close())
            })
            .collect();

        for thread in threads {
            thread
                .join()
                .expect("thread should not panic")
                .expect("close should succeed");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_first_close_reports_teardown_error() {
        let guard = CloseGuard::new(|| Err(EngineError::new("destroy failed").into()));

        let first = guard.close();
        assert!(matches!(first, Err(Error::Engine(_))));

        // The teardown was consumed, redundant close stays silent
        assert!(guard.close().is_ok());
        assert!(guard.is_closed());
    }
}
