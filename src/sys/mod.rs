mod futex;
mod mutex;
mod parker;
mod rwlock;
mod timespec;

pub(crate) use futex::{futex_wait, futex_wake, futex_wake_all, Futex, Primitive};
pub(crate) use mutex::Mutex;
pub(crate) use parker::Parker;
pub(crate) use rwlock::RwLock;
pub(crate) use timespec::Timespec;
