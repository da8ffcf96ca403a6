//! Futex-based synchronization primitives.
//!
//! - [`WaitGroup`]: A reusable counting barrier. Threads block in
//!   [`WaitGroup::wait`] until the outstanding count drops to zero.
//!
//! - [`RwLock`]: Reader-writer lock, allowing many readers or a single
//!   writer at a time. Waiting writers block new readers, so writers are
//!   never starved.
//!
//! - [`DedupCall`]: Collapses concurrent calls of a function into a single
//!   execution whose result every caller shares. Callers give up
//!   individually through a [`CancelToken`]; the execution is cancelled
//!   only when all of them have.
//!
//! None of these are built on `std::sync`. Every blocking wait is a
//! `futex(2)` wait, and every wakeup is aimed at the threads whose condition
//! has actually become true.

mod cancel;
mod dedup_call;
mod rwlock;
mod spawn;
mod wait_group;

pub use cancel::CancelToken;
pub use dedup_call::CallError;
pub use dedup_call::DedupCall;
pub use rwlock::RwLock;
pub use rwlock::RwLockReadGuard;
pub use rwlock::RwLockWriteGuard;
pub use rwlock::TryLockError;
pub use rwlock::TryLockResult;
pub use spawn::Spawn;
#[cfg(feature = "std")]
pub use spawn::ThreadSpawner;
pub use wait_group::WaitGroup;
