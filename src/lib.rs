/*!
A handful of blocking synchronization primitives built on Linux futexes,
without the use of libc. Every wait is a `futex(2)` syscall made directly, and
no primitive ever spins.

* [`WaitGroup`](sync::WaitGroup) - a reusable counting barrier.
* [`RwLock`](sync::RwLock) - a reader/writer lock that prefers writers, so
  a steady stream of readers cannot starve a writer.
* [`DedupCall`](sync::DedupCall) - collapses concurrent calls into a single
  execution, with per-caller cancellation through
  [`CancelToken`](sync::CancelToken).

# Crate features

* **std** (default) -
  Provides [`ThreadSpawner`](sync::ThreadSpawner), which runs deduplicated
  calls on OS threads.
* **not_process_private** -
  Allows for sharing the synchronization primitives with other processes.
*/

#![cfg(target_os = "linux")]
#![no_std]

#![feature(must_not_suspend)]
#![feature(negative_impls)]
#![feature(generic_atomic)]

extern crate alloc;
#[cfg(any(feature = "std", test))]
extern crate std;

pub mod sync;
mod sys;

#[cfg(test)]
mod tests;
