use crate::sys::{futex_wait, futex_wake, Futex, Primitive, Timespec};
use core::sync::atomic::Ordering::{Acquire, Release};

const EMPTY: Primitive = 0;
const NOTIFIED: Primitive = 1;

/// A single-slot wakeup token, owned by one thread and unparked by any.
///
/// A thread that has to wait for the first of several events registers the
/// same parker with each event source, then parks on it. An `unpark` that
/// arrives before `park` is not lost: it leaves the token set, and the next
/// `park` consumes it and returns at once.
pub(crate) struct Parker {
    state: Futex,
}

impl Parker {
    pub const fn new() -> Parker {
        Parker { state: Futex::new(EMPTY) }
    }

    /// Parks until unparked or until `deadline` has passed. May return early;
    /// callers re-check whatever they are waiting for.
    pub fn park(&self, deadline: Option<&Timespec>) {
        if self.state.swap(EMPTY, Acquire) == NOTIFIED {
            return;
        }
        futex_wait(&self.state, EMPTY, deadline);
        self.state.swap(EMPTY, Acquire);
    }

    pub fn unpark(&self) {
        if self.state.swap(NOTIFIED, Release) == EMPTY {
            futex_wake(&self.state);
        }
    }
}
