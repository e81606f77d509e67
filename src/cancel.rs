//! Cooperative cancellation shared between a host and its background workers

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

/// A clonable cancel flag with a bounded wait.
///
/// Workers poll [`CancelToken::is_cancelled`] between units of work and use
/// [`CancelToken::wait_timeout`] instead of sleeping, so a cancel request
/// wakes them immediately rather than at the end of the polling interval.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation and wake every waiter
    pub fn cancel(&self) {
        let (flag, signal) = &*self.inner;
        let mut cancelled = flag.lock().unwrap_or_else(PoisonError::into_inner);
        *cancelled = true;
        signal.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        let (flag, _) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait up to `timeout` for a cancel request.
    ///
    /// Returns `true` if the token is cancelled when the wait ends.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, signal) = &*self.inner;
        let cancelled = flag.lock().unwrap_or_else(PoisonError::into_inner);
        let (cancelled, _) = signal
            .wait_timeout_while(cancelled, timeout, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        *cancelled
    }
}
