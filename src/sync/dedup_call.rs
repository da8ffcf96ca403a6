use crate::sync::{CancelToken, Spawn};
#[cfg(feature = "std")]
use crate::sync::ThreadSpawner;
use crate::sys::{Mutex, Parker};
use alloc::boxed::Box;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::error::Error;
use core::fmt;
use core::mem;
use core::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release};
use core::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize};

/// The error returned by [`DedupCall::call`].
///
/// `Failed` means the shared execution itself returned an error, and every
/// caller of that round sees the same one. `Cancelled` means this caller's
/// own token fired first and it stopped waiting; the execution may well
/// still succeed for others.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError<E> {
    /// The caller's [`CancelToken`] was cancelled before the round finished.
    Cancelled,
    /// The shared execution returned this error.
    Failed(E),
    /// The shared execution panicked.
    Panicked,
}

impl<E> CallError<E> {
    /// Returns `true` if the caller gave up, as opposed to the execution
    /// having failed.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CallError::Cancelled)
    }

    /// Returns the error produced by the shared execution, if that is what
    /// this is.
    pub fn into_failure(self) -> Option<E> {
        match self {
            CallError::Failed(e) => Some(e),
            _ => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for CallError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::Cancelled => f.write_str("call cancelled before the shared execution finished"),
            CallError::Failed(e) => fmt::Display::fmt(e, f),
            CallError::Panicked => f.write_str("shared execution panicked"),
        }
    }
}

impl<E: Error> Error for CallError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CallError::Failed(e) => e.source(),
            _ => None,
        }
    }
}

/// One execution of the deduplicated function and everyone waiting for it.
struct Round<T, E> {
    id: u64,
    /// `None` after the execution panicked.
    outcome: Mutex<Option<Result<T, E>>>,
    done: AtomicBool,
    /// Callers still attached to the round. When the last one leaves before
    /// the round is done, `cancel` fires.
    joiners: AtomicUsize,
    /// Handed to the execution, never to a caller.
    cancel: CancelToken,
    parked: Mutex<Vec<Arc<Parker>>>,
}

impl<T, E> Round<T, E> {
    fn new(id: u64) -> Round<T, E> {
        Round {
            id,
            outcome: Mutex::new(None),
            done: AtomicBool::new(false),
            joiners: AtomicUsize::new(1),
            cancel: CancelToken::new(),
            parked: Mutex::new(Vec::new()),
        }
    }

    fn is_done(&self) -> bool {
        self.done.load(Acquire)
    }

    /// Attaches another caller, unless the round is over or every previous
    /// caller has already left and cancelled it.
    fn try_join(&self) -> bool {
        if self.is_done() {
            return false;
        }
        self.joiners
            .fetch_update(AcqRel, Acquire, |n| (n > 0).then(|| n + 1))
            .is_ok()
    }

    fn leave(&self) {
        if self.joiners.fetch_sub(1, AcqRel) == 1 && !self.is_done() {
            log::trace!("dedup call round {}: every caller cancelled, cancelling execution", self.id);
            self.cancel.cancel();
        }
    }

    fn finish(&self, outcome: Option<Result<T, E>>) {
        *self.outcome.lock() = outcome;
        self.done.store(true, Release);
        log::trace!("dedup call round {}: finished", self.id);

        let parked = mem::take(&mut *self.parked.lock());
        for parker in parked {
            parker.unpark();
        }
    }
}

/// Completes the round even if the execution unwinds, so that nobody waits
/// for it forever.
struct Finisher<T, E> {
    round: Arc<Round<T, E>>,
}

impl<T, E> Drop for Finisher<T, E> {
    fn drop(&mut self) {
        if !self.round.is_done() {
            self.round.finish(None);
        }
    }
}

/// A caller attached to a round. Dropping it detaches the caller.
struct Joiner<'a, T, E> {
    round: Arc<Round<T, E>>,
    token: &'a CancelToken,
    parker: Arc<Parker>,
}

impl<'a, T: Clone, E: Clone> Joiner<'a, T, E> {
    fn new(round: Arc<Round<T, E>>, token: &'a CancelToken) -> Joiner<'a, T, E> {
        let parker = Arc::new(Parker::new());
        round.parked.lock().push(Arc::clone(&parker));
        token.register(&parker);
        Joiner { round, token, parker }
    }

    /// Parks until the round finishes or the caller's token is cancelled,
    /// whichever happens first.
    fn wait(&self) -> Result<T, CallError<E>> {
        loop {
            if self.round.is_done() {
                return match &*self.round.outcome.lock() {
                    Some(Ok(value)) => Ok(value.clone()),
                    Some(Err(e)) => Err(CallError::Failed(e.clone())),
                    None => Err(CallError::Panicked),
                };
            }
            if self.token.is_cancelled() {
                return Err(CallError::Cancelled);
            }
            self.parker.park(self.token.deadline());
        }
    }
}

impl<T, E> Drop for Joiner<'_, T, E> {
    fn drop(&mut self) {
        self.token.unregister(&self.parker);
        self.round.parked.lock().retain(|p| !Arc::ptr_eq(p, &self.parker));
        self.round.leave();
    }
}

/// Deduplicates concurrent calls of a function.
///
/// While one call to [`call`] is running the function, further calls do not
/// run it again; they wait for the running one and all get a clone of its
/// result. Once the function returns, the next `call` starts over with a
/// fresh execution. Each such execution, together with the callers that wait
/// for it, is a round.
///
/// Every caller brings its own [`CancelToken`]. When that token is cancelled
/// the caller returns [`CallError::Cancelled`] straight away, without waiting
/// for the function. The function itself gets a separate token, which is
/// cancelled only once every caller of the round has given up. A round that
/// has been cancelled this way accepts no new callers.
///
/// The function runs on a task started through the [`Spawn`]er `S`.
///
/// [`call`]: Self::call
///
/// # Examples
///
/// ```
/// use futex_sync::sync::{CancelToken, DedupCall, ThreadSpawner};
/// use std::sync::Arc;
/// use std::thread;
/// use std::time::Duration;
///
/// let call: Arc<DedupCall<u32, String, ThreadSpawner>> = Arc::new(DedupCall::new());
///
/// let handles: Vec<_> = (0..4)
///     .map(|_| {
///         let call = Arc::clone(&call);
///         thread::spawn(move || {
///             call.call(&CancelToken::new(), |_| {
///                 thread::sleep(Duration::from_millis(50));
///                 Ok(42)
///             })
///         })
///     })
///     .collect();
///
/// for handle in handles {
///     assert_eq!(handle.join().unwrap(), Ok(42));
/// }
/// ```
pub struct DedupCall<T, E, S> {
    current: Mutex<Weak<Round<T, E>>>,
    rounds: AtomicU64,
    spawner: S,
}

#[cfg(feature = "std")]
impl<T, E> DedupCall<T, E, ThreadSpawner> {
    /// Creates a `DedupCall` that runs each round on a new OS thread.
    #[must_use]
    pub const fn new() -> DedupCall<T, E, ThreadSpawner> {
        DedupCall::with_spawner(ThreadSpawner)
    }
}

#[cfg(feature = "std")]
impl<T, E> Default for DedupCall<T, E, ThreadSpawner> {
    fn default() -> Self {
        DedupCall::new()
    }
}

impl<T, E, S> DedupCall<T, E, S> {
    /// Creates a `DedupCall` that starts each round through `spawner`.
    #[must_use]
    pub const fn with_spawner(spawner: S) -> DedupCall<T, E, S> {
        DedupCall { current: Mutex::new(Weak::new()), rounds: AtomicU64::new(0), spawner }
    }

    /// Returns `true` if a round is running that a new call would join.
    pub fn is_in_flight(&self) -> bool {
        self.current.lock().upgrade().is_some_and(|round| {
            !round.is_done() && round.joiners.load(Acquire) > 0
        })
    }
}

impl<T, E, S> DedupCall<T, E, S>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
    S: Spawn,
{
    /// Runs `f`, or waits for the run of it that is already in flight.
    ///
    /// `f` receives the round's own token, which is cancelled if every
    /// caller of the round gives up before it finishes. If this call joins a
    /// running round, `f` is dropped without being called.
    ///
    /// # Errors
    ///
    /// * [`CallError::Failed`] if the shared execution returned an error.
    /// * [`CallError::Cancelled`] if `token` was cancelled first.
    /// * [`CallError::Panicked`] if the shared execution panicked.
    pub fn call<F>(&self, token: &CancelToken, f: F) -> Result<T, CallError<E>>
    where
        F: FnOnce(CancelToken) -> Result<T, E> + Send + 'static,
    {
        let round = self.join_or_start(f);
        Joiner::new(round, token).wait()
    }

    fn join_or_start<F>(&self, f: F) -> Arc<Round<T, E>>
    where
        F: FnOnce(CancelToken) -> Result<T, E> + Send + 'static,
    {
        let mut current = self.current.lock();
        if let Some(round) = current.upgrade() {
            if round.try_join() {
                return round;
            }
        }

        let round = Arc::new(Round::new(self.rounds.fetch_add(1, Relaxed)));
        *current = Arc::downgrade(&round);
        drop(current);

        log::trace!("dedup call round {}: started", round.id);
        let finisher = Finisher { round: Arc::clone(&round) };
        self.spawner.spawn(Box::new(move || {
            let outcome = f(finisher.round.cancel.clone());
            finisher.round.finish(Some(outcome));
        }));
        round
    }
}

impl<T, E, S: fmt::Debug> fmt::Debug for DedupCall<T, E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DedupCall")
            .field("rounds", &self.rounds.load(Relaxed))
            .field("spawner", &self.spawner)
            .finish_non_exhaustive()
    }
}
