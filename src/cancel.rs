// ABOUTME: Batch-scoped cancellation token and interruptible waits
// ABOUTME: Waits sleep in short slices so a cancel is observed promptly

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Shared flag set from the presentation side and observed by the worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

/// Returned by [`CancelToken::wait`] when the wait was interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Sleeps for `total`, checking for cancellation at the start and every
    /// `slice`.
    pub fn wait(&self, total: Duration, slice: Duration) -> Result<(), Cancelled> {
        let deadline = Instant::now() + total;
        loop {
            if self.is_cancelled() {
                return Err(Cancelled);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::sleep(slice.min(deadline - now));
        }
    }
}
