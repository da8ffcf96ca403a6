use std::format;
use std::fs;
use std::thread;
use std::time::{Duration, Instant};
use syscalls::{syscall, Sysno};

mod rwlock;
mod sys;

/// The kernel thread id of the calling thread.
pub(crate) fn gettid() -> usize {
    unsafe { syscall!(Sysno::gettid) }.expect("gettid failed")
}

/// The scheduler state letter from `/proc/self/task/<tid>/stat`, e.g. `R`
/// for runnable or `S` for sleeping.
fn thread_state(tid: usize) -> Option<char> {
    let stat = fs::read_to_string(format!("/proc/self/task/{tid}/stat")).ok()?;
    // The command name is parenthesised and may itself contain spaces.
    let rest = &stat[stat.rfind(')')? + 1..];
    rest.trim_start().chars().next()
}

/// Panics unless every thread in `tids` goes to sleep and keeps sleeping.
///
/// A thread that spins while it waits shows up as runnable in most samples,
/// so it never produces a long enough run of sleeping ones.
pub(crate) fn assert_threads_sleeping(tids: &[usize]) {
    const QUIET_SAMPLES: u32 = 5;

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut quiet = 0;
    while quiet < QUIET_SAMPLES {
        assert!(Instant::now() < deadline, "waiting threads are busy");
        let sleeping = tids.iter().all(|&tid| thread_state(tid) == Some('S'));
        quiet = if sleeping { quiet + 1 } else { 0 };
        thread::sleep(Duration::from_millis(10));
    }
}
