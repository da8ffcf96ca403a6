use crate::sys::{futex_wait, futex_wake, futex_wake_all, Futex, Primitive};
use core::sync::atomic::Ordering::{Acquire, Relaxed, Release};

// Layout of the state word:
//
//   bit 31        - readers waiting
//   bits 16..=30  - number of queued writers
//   bits 0..=15   - number of active readers, or WRITE_LOCKED
const READ_LOCKED: Primitive = 1;
const MASK: Primitive = (1 << 16) - 1;
const WRITE_LOCKED: Primitive = MASK;
const MAX_READERS: Primitive = MASK - 1;

const WRITER_SHIFT: u32 = 16;
const QUEUED_WRITER: Primitive = 1 << WRITER_SHIFT;
const MAX_QUEUED_WRITERS: Primitive = (1 << 15) - 1;

const READERS_WAITING: Primitive = 1 << 31;

#[inline]
fn is_unlocked(state: Primitive) -> bool {
    state & MASK == 0
}

#[inline]
fn queued_writers(state: Primitive) -> Primitive {
    (state >> WRITER_SHIFT) & MAX_QUEUED_WRITERS
}

#[inline]
fn has_readers_waiting(state: Primitive) -> bool {
    state & READERS_WAITING != 0
}

/// A queued writer stays counted until it holds the lock, so new readers
/// are kept out for the whole hand-off.
#[inline]
fn is_read_lockable(state: Primitive) -> bool {
    state & MASK < MAX_READERS && queued_writers(state) == 0
}

#[inline]
fn has_reached_max_readers(state: Primitive) -> bool {
    state & MASK == MAX_READERS
}

/// The raw writer-preferring reader/writer lock behind
/// [`sync::RwLock`](crate::sync::RwLock).
///
/// A contended writer first adds itself to the queued-writer count in
/// `state`, and leaves it in the same compare-exchange that takes the lock.
/// Readers may only come in while that count is zero.
///
/// Parked readers sleep on `state`. Parked writers sleep on
/// `writer_notify`, which is bumped every time one of them is handed the
/// chance to lock.
pub(crate) struct RwLock {
    state: Futex,
    writer_notify: Futex,
}

impl RwLock {
    #[inline]
    pub const fn new() -> RwLock {
        RwLock { state: Futex::new(0), writer_notify: Futex::new(0) }
    }

    #[inline]
    pub fn try_read(&self) -> bool {
        self.state
            .fetch_update(Acquire, Relaxed, |s| is_read_lockable(s).then(|| s + READ_LOCKED))
            .is_ok()
    }

    #[inline]
    pub fn read(&self) {
        let state = self.state.load(Relaxed);
        if !is_read_lockable(state)
            || self
                .state
                .compare_exchange_weak(state, state + READ_LOCKED, Acquire, Relaxed)
                .is_err()
        {
            self.read_contended();
        }
    }

    #[cold]
    fn read_contended(&self) {
        let mut state = self.state.load(Relaxed);
        loop {
            if is_read_lockable(state) {
                match self.state.compare_exchange_weak(state, state + READ_LOCKED, Acquire, Relaxed)
                {
                    Ok(_) => return,
                    Err(s) => {
                        state = s;
                        continue;
                    }
                }
            }

            if has_reached_max_readers(state) {
                panic!("too many active read locks on RwLock");
            }

            if !has_readers_waiting(state) {
                if let Err(s) =
                    self.state.compare_exchange(state, state | READERS_WAITING, Relaxed, Relaxed)
                {
                    state = s;
                    continue;
                }
            }

            futex_wait(&self.state, state | READERS_WAITING, None);
            state = self.state.load(Relaxed);
        }
    }

    /// # Safety
    ///
    /// The lock must be read-locked by the caller.
    #[inline]
    pub unsafe fn read_unlock(&self) {
        let state = self.state.fetch_sub(READ_LOCKED, Release) - READ_LOCKED;

        // Parked readers are woken by whoever last held the write lock, never
        // by a reader.
        if is_unlocked(state) && queued_writers(state) > 0 {
            self.wake_writer();
        }
    }

    /// Only succeeds when no other writer is queued, so it never jumps ahead
    /// of one that was woken and is about to lock.
    #[inline]
    pub fn try_write(&self) -> bool {
        self.state
            .fetch_update(Acquire, Relaxed, |s| {
                (s & !READERS_WAITING == 0).then(|| s + WRITE_LOCKED)
            })
            .is_ok()
    }

    #[inline]
    pub fn write(&self) {
        if self.state.compare_exchange_weak(0, WRITE_LOCKED, Acquire, Relaxed).is_err() {
            self.write_contended();
        }
    }

    #[cold]
    fn write_contended(&self) {
        // From here on new readers queue up behind us.
        let mut state = match self.state.fetch_update(Relaxed, Relaxed, |s| {
            (queued_writers(s) < MAX_QUEUED_WRITERS).then(|| s + QUEUED_WRITER)
        }) {
            Ok(s) => s + QUEUED_WRITER,
            Err(_) => panic!("too many waiting writers on RwLock"),
        };

        loop {
            if is_unlocked(state) {
                match self.state.compare_exchange_weak(
                    state,
                    state - QUEUED_WRITER + WRITE_LOCKED,
                    Acquire,
                    Relaxed,
                ) {
                    Ok(_) => return,
                    Err(s) => {
                        state = s;
                        continue;
                    }
                }
            }

            // Read the notification counter before re-checking the state, or
            // a wakeup between the two could be missed.
            let seq = self.writer_notify.load(Acquire);

            state = self.state.load(Relaxed);
            if is_unlocked(state) {
                continue;
            }

            futex_wait(&self.writer_notify, seq, None);
            state = self.state.load(Relaxed);
        }
    }

    /// # Safety
    ///
    /// The lock must be write-locked by the caller.
    #[inline]
    pub unsafe fn write_unlock(&self) {
        let state = self.state.fetch_sub(WRITE_LOCKED, Release) - WRITE_LOCKED;

        debug_assert!(is_unlocked(state));

        // Queued writers go first. Parked readers stay parked until the last
        // of them unlocks.
        if queued_writers(state) > 0 {
            self.wake_writer();
        } else if has_readers_waiting(state) {
            self.wake_readers();
        }
    }

    fn wake_writer(&self) {
        self.writer_notify.fetch_add(1, Release);
        futex_wake(&self.writer_notify);
    }

    /// Readers that wake up while a writer has queued again meanwhile see
    /// the count and park again.
    #[cold]
    fn wake_readers(&self) {
        if has_readers_waiting(self.state.fetch_and(!READERS_WAITING, Relaxed)) {
            futex_wake_all(&self.state);
        }
    }
}
