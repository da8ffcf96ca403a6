use crate::sys::{futex_wait, futex_wake_all, Futex, Timespec};
use core::fmt;
use core::sync::atomic::AtomicIsize;
use core::sync::atomic::Ordering::{AcqRel, Acquire, Release};
use core::time::Duration;

/// A reusable counting barrier.
///
/// A `WaitGroup` counts outstanding pieces of work. [`add`] raises or lowers
/// the count, [`done`] lowers it by one, and [`wait`] blocks until it is zero.
///
/// Each time the count falls to zero a round ends: every thread blocked in
/// `wait` during that round is woken, and the group is immediately ready to
/// be counted up again for the next round. Waiters are tied to the round in
/// which they started waiting, so a fast `add` for the next round can never
/// strand or wake them early.
///
/// [`add`]: Self::add
/// [`done`]: Self::done
/// [`wait`]: Self::wait
///
/// # Examples
///
/// ```
/// use futex_sync::sync::WaitGroup;
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::thread;
///
/// let wg = Arc::new(WaitGroup::new());
/// let finished = Arc::new(AtomicUsize::new(0));
///
/// for _ in 0..4 {
///     wg.add(1);
///     let (wg, finished) = (Arc::clone(&wg), Arc::clone(&finished));
///     thread::spawn(move || {
///         finished.fetch_add(1, Ordering::Relaxed);
///         wg.done();
///     });
/// }
///
/// wg.wait();
/// assert_eq!(finished.load(Ordering::Relaxed), 4);
/// ```
pub struct WaitGroup {
    counter: AtomicIsize,
    /// Bumped when a round ends. Waiters park on it with the value they saw
    /// when they started waiting.
    generation: Futex,
}

impl WaitGroup {
    /// Creates a new wait group with a count of zero.
    #[must_use]
    #[inline]
    pub const fn new() -> WaitGroup {
        WaitGroup { counter: AtomicIsize::new(0), generation: Futex::new(0) }
    }

    /// Adds `delta`, which may be negative, to the count.
    ///
    /// If the count falls to zero, every thread blocked in [`wait`] is
    /// released.
    ///
    /// # Panics
    ///
    /// Panics if the count would become negative. The count is not changed
    /// in that case.
    ///
    /// [`wait`]: Self::wait
    pub fn add(&self, delta: isize) {
        let prev = match self.counter.fetch_update(AcqRel, Acquire, |c| {
            c.checked_add(delta).filter(|&count| count >= 0)
        }) {
            Ok(prev) => prev,
            Err(_) => panic!("negative WaitGroup counter"),
        };

        if prev + delta == 0 && prev != 0 {
            self.generation.fetch_add(1, Release);
            futex_wake_all(&self.generation);
        }
    }

    /// Lowers the count by one.
    ///
    /// # Panics
    ///
    /// Panics if the count was already zero.
    #[inline]
    pub fn done(&self) {
        self.add(-1);
    }

    /// Blocks until the count is zero.
    ///
    /// Returns immediately if it already is.
    pub fn wait(&self) {
        self.wait_until(None);
    }

    /// Blocks until the count is zero, or until `dur` has elapsed.
    ///
    /// Returns `false` if the wait timed out.
    ///
    /// # Examples
    ///
    /// ```
    /// use futex_sync::sync::WaitGroup;
    /// use std::time::Duration;
    ///
    /// let wg = WaitGroup::new();
    /// wg.add(1);
    /// assert!(!wg.wait_timeout(Duration::from_millis(10)));
    /// wg.done();
    /// assert!(wg.wait_timeout(Duration::from_millis(10)));
    /// ```
    pub fn wait_timeout(&self, dur: Duration) -> bool {
        match Timespec::after(dur) {
            Some(deadline) => self.wait_until(Some(&deadline)),
            None => self.wait_until(None),
        }
    }

    fn wait_until(&self, deadline: Option<&Timespec>) -> bool {
        // The generation must be read before the count: if the count is
        // nonzero at that point, the round we belong to ends exactly when
        // the generation moves past this value.
        let generation = self.generation.load(Acquire);
        if self.counter.load(Acquire) == 0 {
            return true;
        }

        loop {
            let woken = futex_wait(&self.generation, generation, deadline);
            if self.generation.load(Acquire) != generation {
                return true;
            }
            if !woken {
                return false;
            }
        }
    }
}

impl Default for WaitGroup {
    fn default() -> WaitGroup {
        WaitGroup::new()
    }
}

impl fmt::Debug for WaitGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitGroup")
            .field("count", &self.counter.load(Acquire))
            .finish_non_exhaustive()
    }
}
