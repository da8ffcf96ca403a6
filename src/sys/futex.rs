use crate::sys::Timespec;
use core::ptr::null;
use core::sync::atomic::Atomic;
use core::sync::atomic::Ordering::Relaxed;
use syscalls::{syscall, Errno, Sysno};

/// An atomic for use as a futex. The kernel only ever looks at 32 bits.
pub type Futex = Atomic<Primitive>;
/// Must be the underlying type of Futex
pub type Primitive = u32;

#[cfg(feature = "not_process_private")]
const fn op(base: usize) -> usize {
    base
}

#[cfg(not(feature = "not_process_private"))]
const fn op(base: usize) -> usize {
    base | nc::FUTEX_PRIVATE_FLAG as usize
}

/// Blocks until a `futex_wake` on `futex` wakes us, or until `deadline`
/// (on `CLOCK_MONOTONIC`) has passed.
///
/// Returns immediately if the futex doesn't hold `expected`. Spurious returns
/// are possible, so callers always re-check their condition.
///
/// Returns false on timeout, and true in all other cases.
pub fn futex_wait(futex: &Futex, expected: Primitive, deadline: Option<&Timespec>) -> bool {
    let timespec = deadline.and_then(Timespec::to_timespec);

    loop {
        if futex.load(Relaxed) != expected {
            return true;
        }

        // FUTEX_WAIT_BITSET takes an absolute timeout, which keeps repeated
        // waits after EINTR from drifting past the deadline.
        let r = unsafe {
            syscall!(
                Sysno::futex,
                futex as *const Futex,
                op(nc::FUTEX_WAIT_BITSET as usize),
                expected,
                timespec.as_ref().map_or(null(), |t| t as *const nc::timespec_t),
                null::<u32>(),
                !0u32
            )
        };

        match r {
            Err(Errno::ETIMEDOUT) => return false,
            Err(Errno::EINTR) => continue,
            _ => return true,
        }
    }
}

/// Wakes up one thread that's blocked on `futex_wait` on this futex.
///
/// Returns true if this actually woke up such a thread.
pub fn futex_wake(futex: &Futex) -> bool {
    let woken = unsafe {
        syscall!(Sysno::futex, futex as *const Futex, op(nc::FUTEX_WAKE as usize), 1)
    };
    woken.expect("futex_wake failed") > 0
}

/// Wakes up all threads that are waiting on `futex_wait` on this futex.
pub fn futex_wake_all(futex: &Futex) {
    let woken = unsafe {
        syscall!(Sysno::futex, futex as *const Futex, op(nc::FUTEX_WAKE as usize), i32::MAX)
    };
    woken.expect("futex_wake_all failed");
}
