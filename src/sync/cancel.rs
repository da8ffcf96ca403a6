use crate::sys::{Mutex, Parker, Timespec};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::mem;
use core::sync::atomic::AtomicBool;
use core::sync::atomic::Ordering::{Acquire, Release};
use core::time::Duration;

/// A cancellation signal shared between the code that may give up on a piece
/// of work and the code doing (or waiting for) it.
///
/// Cloning a `CancelToken` yields another handle to the same signal.
/// Cancellation happens once, either through [`cancel`] or when the token's
/// deadline passes, and can never be undone.
///
/// [`cancel`]: Self::cancel
///
/// # Examples
///
/// ```
/// use futex_sync::sync::CancelToken;
/// use std::thread;
///
/// let token = CancelToken::new();
/// let worker = token.clone();
///
/// let handle = thread::spawn(move || {
///     worker.wait();
///     "stopped"
/// });
///
/// token.cancel();
/// assert_eq!(handle.join().unwrap(), "stopped");
/// ```
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

struct Inner {
    cancelled: AtomicBool,
    deadline: Option<Timespec>,
    /// Threads currently parked until this token is cancelled, possibly among
    /// other things.
    waiters: Mutex<Vec<Arc<Parker>>>,
}

impl CancelToken {
    /// Creates a token that is only cancelled by [`cancel`](Self::cancel).
    #[must_use]
    pub fn new() -> CancelToken {
        CancelToken::with_deadline(None)
    }

    /// Creates a token that cancels itself once `dur` has elapsed.
    ///
    /// # Examples
    ///
    /// ```
    /// use futex_sync::sync::CancelToken;
    /// use std::time::Duration;
    ///
    /// let token = CancelToken::with_timeout(Duration::from_millis(5));
    /// token.wait();
    /// assert!(token.is_cancelled());
    /// ```
    #[must_use]
    pub fn with_timeout(dur: Duration) -> CancelToken {
        CancelToken::with_deadline(Timespec::after(dur))
    }

    fn with_deadline(deadline: Option<Timespec>) -> CancelToken {
        CancelToken {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                deadline,
                waiters: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Cancels the token, waking every thread waiting on it.
    ///
    /// Cancelling an already cancelled token does nothing.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Release) {
            return;
        }

        let waiters = mem::take(&mut *self.inner.waiters.lock());
        for parker in waiters {
            parker.unpark();
        }
    }

    /// Returns `true` once the token has been cancelled or its deadline has
    /// passed.
    pub fn is_cancelled(&self) -> bool {
        if self.inner.cancelled.load(Acquire) {
            return true;
        }
        if self.inner.deadline.as_ref().is_some_and(Timespec::has_passed) {
            self.cancel();
            return true;
        }
        false
    }

    /// Blocks until the token is cancelled.
    pub fn wait(&self) {
        let parker = Arc::new(Parker::new());
        self.register(&parker);
        while !self.is_cancelled() {
            parker.park(self.deadline());
        }
        self.unregister(&parker);
    }

    /// Blocks until the token is cancelled, or until `dur` has elapsed.
    ///
    /// Returns `true` if the token was cancelled.
    pub fn wait_timeout(&self, dur: Duration) -> bool {
        let limit = match (Timespec::after(dur), self.deadline()) {
            (Some(limit), Some(deadline)) => Some(limit.min(*deadline)),
            (limit, deadline) => limit.or(deadline.copied()),
        };

        let parker = Arc::new(Parker::new());
        self.register(&parker);
        let cancelled = loop {
            if self.is_cancelled() {
                break true;
            }
            if limit.as_ref().is_some_and(Timespec::has_passed) {
                break false;
            }
            parker.park(limit.as_ref());
        };
        self.unregister(&parker);
        cancelled
    }

    pub(crate) fn deadline(&self) -> Option<&Timespec> {
        self.inner.deadline.as_ref()
    }

    /// Arranges for `parker` to be unparked when the token is cancelled.
    ///
    /// Callers must check [`is_cancelled`](Self::is_cancelled) after
    /// registering and before parking.
    pub(crate) fn register(&self, parker: &Arc<Parker>) {
        self.inner.waiters.lock().push(Arc::clone(parker));
    }

    pub(crate) fn unregister(&self, parker: &Arc<Parker>) {
        self.inner.waiters.lock().retain(|p| !Arc::ptr_eq(p, parker));
    }
}

impl Default for CancelToken {
    fn default() -> CancelToken {
        CancelToken::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.inner.cancelled.load(Acquire))
            .field("has_deadline", &self.inner.deadline.is_some())
            .finish_non_exhaustive()
    }
}
