use crate::sys::{futex_wait, futex_wake, Futex, Primitive};
use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::Ordering::{Acquire, Relaxed, Release};

const UNLOCKED: Primitive = 0;
/// Locked, and nobody is parked on the futex.
const LOCKED: Primitive = 1;
/// Locked, and at least one thread may be parked on the futex.
const CONTENDED: Primitive = 2;

/// A small futex mutex guarding the waiter lists of cancel tokens and
/// in-flight calls. Critical sections under it never block.
pub(crate) struct Mutex<T> {
    futex: Futex,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for Mutex<T> {}
unsafe impl<T: Send> Sync for Mutex<T> {}

#[must_use = "if unused the Mutex will immediately unlock"]
#[must_not_suspend = "holding a MutexGuard across suspend points can cause deadlocks"]
pub(crate) struct MutexGuard<'a, T> {
    lock: &'a Mutex<T>,
}

impl<T> !Send for MutexGuard<'_, T> {}

impl<T> Mutex<T> {
    #[inline]
    pub const fn new(t: T) -> Mutex<T> {
        Mutex { futex: Futex::new(UNLOCKED), data: UnsafeCell::new(t) }
    }

    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, T> {
        if self.futex.compare_exchange(UNLOCKED, LOCKED, Acquire, Relaxed).is_err() {
            self.lock_contended();
        }
        MutexGuard { lock: self }
    }

    #[cold]
    fn lock_contended(&self) {
        // Once we have slept, we can no longer know whether others are
        // parked too, so we always take the lock as CONTENDED from here on.
        while self.futex.swap(CONTENDED, Acquire) != UNLOCKED {
            futex_wait(&self.futex, CONTENDED, None);
        }
    }

    #[inline]
    fn unlock(&self) {
        if self.futex.swap(UNLOCKED, Release) == CONTENDED {
            futex_wake(&self.futex);
        }
    }
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        self.lock.unlock();
    }
}
