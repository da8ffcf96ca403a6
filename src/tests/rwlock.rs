use core::hint::black_box;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use std::vec::Vec;

use crate::sync::{RwLock, TryLockError};
use super::{assert_threads_sleeping, gettid};

/// Added to the activity counter by each writer; readers add one.
const WRITER: i32 = 10000;

#[test]
fn smoke() {
    let l = RwLock::new(());
    drop(l.read());
    drop(l.write());
    drop((l.read(), l.read()));
    drop(l.write());
}

fn parallel_readers(num_readers: usize) {
    let lock = RwLock::new(());
    let (locked_tx, locked_rx) = channel();
    let (unlock_tx, unlock_rx) = channel::<()>();
    let unlock_rx = std::sync::Mutex::new(unlock_rx);

    thread::scope(|s| {
        for _ in 0..num_readers {
            let (lock, locked_tx, unlock_rx) = (&lock, locked_tx.clone(), &unlock_rx);
            s.spawn(move || {
                let _guard = lock.read();
                locked_tx.send(()).unwrap();
                unlock_rx.lock().unwrap().recv().unwrap();
            });
        }

        // Every reader holds the lock at the same time before any lets go.
        for _ in 0..num_readers {
            locked_rx.recv().unwrap();
        }
        for _ in 0..num_readers {
            unlock_tx.send(()).unwrap();
        }
    });
}

#[test]
fn readers_share_the_lock() {
    parallel_readers(1);
    parallel_readers(3);
    parallel_readers(4);
}

fn reader(lock: &RwLock<()>, iterations: usize, activity: &AtomicI32) {
    for _ in 0..iterations {
        let _guard = lock.read();
        let n = activity.fetch_add(1, Ordering::SeqCst) + 1;
        assert!((1..WRITER).contains(&n), "rlock({n})");
        for i in 0..100 {
            black_box(i);
        }
        activity.fetch_sub(1, Ordering::SeqCst);
    }
}

fn writer(lock: &RwLock<()>, iterations: usize, activity: &AtomicI32) {
    for _ in 0..iterations {
        let _guard = lock.write();
        let n = activity.fetch_add(WRITER, Ordering::SeqCst) + WRITER;
        assert_eq!(n, WRITER, "wlock({n})");
        for i in 0..100 {
            black_box(i);
        }
        activity.fetch_sub(WRITER, Ordering::SeqCst);
    }
}

fn hammer(num_readers: usize, iterations: usize) {
    // Number of active readers + WRITER * number of active writers.
    let activity = AtomicI32::new(0);
    let lock = RwLock::new(());

    thread::scope(|s| {
        s.spawn(|| writer(&lock, iterations, &activity));
        for _ in 0..num_readers / 2 {
            s.spawn(|| reader(&lock, iterations, &activity));
        }
        s.spawn(|| writer(&lock, iterations, &activity));
        for _ in num_readers / 2..num_readers {
            s.spawn(|| reader(&lock, iterations, &activity));
        }
    });

    assert_eq!(activity.load(Ordering::SeqCst), 0);
}

#[test]
fn hammer_readers_and_writers() {
    const N: usize = 1000;
    hammer(1, N);
    hammer(3, N);
    hammer(5, N);
    hammer(10, N);
    hammer(32, N);
}

#[test]
fn write_write_read() {
    let activity = AtomicI32::new(0);
    let lock = RwLock::new(());
    for _ in 0..2000 {
        thread::scope(|s| {
            s.spawn(|| writer(&lock, 1, &activity));
            s.spawn(|| writer(&lock, 1, &activity));
            s.spawn(|| reader(&lock, 1, &activity));
        });
    }
}

#[test]
fn read_then_write_deadlocks() {
    let (tx, rx) = channel();
    // The thread never finishes, so the lock is leaked along with it.
    thread::spawn(move || {
        let lock = RwLock::new(());
        let _r = lock.read();
        let _w = lock.write();
        tx.send(()).unwrap();
    });

    assert!(rx.recv_timeout(Duration::from_secs(1)).is_err(), "must be a deadlock");
}

#[test]
fn try_lock() {
    let lock = RwLock::new(0);

    let w = lock.write();
    assert_eq!(lock.try_read().err(), Some(TryLockError::WouldBlock));
    assert_eq!(lock.try_write().err(), Some(TryLockError::WouldBlock));
    drop(w);

    let r = lock.read();
    assert!(lock.try_read().is_ok());
    assert_eq!(lock.try_write().err(), Some(TryLockError::WouldBlock));
    drop(r);

    *lock.try_write().unwrap() = 3;
    assert_eq!(lock.into_inner(), 3);
}

#[test]
fn waiting_writer_blocks_new_readers() {
    let lock = Arc::new(RwLock::new(0));
    let r = lock.read();

    let (tx, rx) = channel();
    let lock2 = lock.clone();
    let w = thread::spawn(move || {
        tx.send(gettid()).unwrap();
        *lock2.write() += 1;
    });
    assert_threads_sleeping(&[rx.recv().unwrap()]);

    // The lock is only read-locked, but a writer is queued.
    assert_eq!(lock.try_read().err(), Some(TryLockError::WouldBlock));

    let (tx, rx) = channel();
    let lock3 = lock.clone();
    let late_reader = thread::spawn(move || {
        tx.send(gettid()).unwrap();
        *lock3.read()
    });
    assert_threads_sleeping(&[rx.recv().unwrap()]);

    drop(r);
    w.join().unwrap();
    // The reader that arrived after the writer started waiting sees its write.
    assert_eq!(late_reader.join().unwrap(), 1);
}

#[test]
fn late_reader_waits_for_writer_woken_by_reader() {
    let lock = Arc::new(RwLock::new(0));

    for round in 1..=100 {
        let r = lock.read();

        let lock2 = lock.clone();
        let w = thread::spawn(move || *lock2.write() += 1);
        // The writer is queued once readers are turned away.
        while lock.try_read().is_ok() {
            thread::yield_now();
        }

        drop(r);
        // Arrives after the hand-off began, but before the writer has run.
        assert_eq!(*lock.read(), round, "reader overtook a queued writer");
        w.join().unwrap();
    }

    // Nothing is left queued once the writers are gone.
    assert!(lock.try_read().is_ok());
}

#[test]
fn late_reader_waits_for_writer_woken_by_writer() {
    let lock = Arc::new(RwLock::new(0));

    for round in 1..=10 {
        let w = lock.write();

        let (tx, rx) = channel();
        let lock2 = lock.clone();
        let next = thread::spawn(move || {
            tx.send(gettid()).unwrap();
            *lock2.write() += 1;
        });
        assert_threads_sleeping(&[rx.recv().unwrap()]);

        drop(w);
        assert_eq!(*lock.read(), round, "reader overtook a queued writer");
        next.join().unwrap();
    }

    assert!(lock.try_read().is_ok());
    assert!(lock.try_write().is_ok());
}

#[test]
fn writers_go_before_parked_readers() {
    let lock = Arc::new(RwLock::new(0));
    let w = lock.write();

    let (tx, rx) = channel();
    let lock2 = lock.clone();
    let reader = thread::spawn(move || {
        tx.send(gettid()).unwrap();
        *lock2.read()
    });
    assert_threads_sleeping(&[rx.recv().unwrap()]);

    let (tx, rx) = channel();
    let lock3 = lock.clone();
    let writer = thread::spawn(move || {
        tx.send(gettid()).unwrap();
        *lock3.write() += 1;
    });
    assert_threads_sleeping(&[rx.recv().unwrap()]);

    drop(w);
    writer.join().unwrap();
    assert_eq!(reader.join().unwrap(), 1);
}

#[test]
fn writer_not_starved_by_readers() {
    const READERS: usize = 8;

    let lock = RwLock::new(0u64);
    let stop = AtomicBool::new(false);
    let reads = AtomicUsize::new(0);

    thread::scope(|s| {
        for _ in 0..READERS {
            s.spawn(|| {
                while !stop.load(Ordering::Relaxed) {
                    let _guard = lock.read();
                    reads.fetch_add(1, Ordering::Relaxed);
                    thread::sleep(Duration::from_micros(200));
                }
            });
        }

        // Let the readers overlap so that the lock never falls idle on its own.
        while reads.load(Ordering::Relaxed) < READERS * 10 {
            thread::sleep(Duration::from_millis(1));
        }

        let start = Instant::now();
        for _ in 0..10 {
            *lock.write() += 1;
        }
        let elapsed = start.elapsed();
        stop.store(true, Ordering::Relaxed);

        assert!(elapsed < Duration::from_secs(2), "writer waited {elapsed:?}");
    });

    assert_eq!(lock.into_inner(), 10);
}

#[test]
fn blocked_readers_sleep() {
    let lock = Arc::new(RwLock::new(()));
    let w = lock.write();

    let (tx, rx) = channel();
    let threads: Vec<_> = (0..100)
        .map(|_| {
            let (lock, tx) = (lock.clone(), tx.clone());
            thread::spawn(move || {
                tx.send(gettid()).unwrap();
                drop(lock.read());
            })
        })
        .collect();
    let tids: Vec<usize> = rx.iter().take(100).collect();

    assert_threads_sleeping(&tids);

    drop(w);
    threads.into_iter().for_each(|t| t.join().unwrap());
}

#[test]
fn blocked_writers_sleep() {
    let lock = Arc::new(RwLock::new(()));
    let r = lock.read();

    let (tx, rx) = channel();
    let threads: Vec<_> = (0..100)
        .map(|_| {
            let (lock, tx) = (lock.clone(), tx.clone());
            thread::spawn(move || {
                tx.send(gettid()).unwrap();
                drop(lock.write());
            })
        })
        .collect();
    let tids: Vec<usize> = rx.iter().take(100).collect();

    assert_threads_sleeping(&tids);

    drop(r);
    threads.into_iter().for_each(|t| t.join().unwrap());
}

#[test]
fn debug_shows_lock_state() {
    let lock = RwLock::new(1);
    assert_eq!(std::format!("{lock:?}"), "RwLock { data: 1, .. }");
    let _w = lock.write();
    assert_eq!(std::format!("{lock:?}"), "RwLock { data: <locked>, .. }");
}
