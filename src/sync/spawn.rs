use alloc::boxed::Box;
use alloc::sync::Arc;

/// A way of running a task in the background.
///
/// [`DedupCall`](super::DedupCall) hands the shared execution of each round
/// to its spawner. The task must be started promptly: callers of the round
/// wait on it.
pub trait Spawn {
    fn spawn(&self, task: Box<dyn FnOnce() + Send + 'static>);
}

impl<S: Spawn + ?Sized> Spawn for &S {
    fn spawn(&self, task: Box<dyn FnOnce() + Send + 'static>) {
        (**self).spawn(task)
    }
}

impl<S: Spawn + ?Sized> Spawn for Arc<S> {
    fn spawn(&self, task: Box<dyn FnOnce() + Send + 'static>) {
        (**self).spawn(task)
    }
}

/// Runs every task on a new OS thread.
#[cfg(feature = "std")]
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSpawner;

#[cfg(feature = "std")]
impl Spawn for ThreadSpawner {
    /// # Panics
    ///
    /// Panics if the OS fails to create a thread, like
    /// [`std::thread::spawn`].
    fn spawn(&self, task: Box<dyn FnOnce() + Send + 'static>) {
        std::thread::Builder::new()
            .name("dedup-call".into())
            .spawn(task)
            .expect("failed to spawn thread");
    }
}
