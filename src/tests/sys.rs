use std::sync::mpsc::channel;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::sys::{Mutex, Parker, Timespec};

#[test]
fn mutex_smoke() {
    let m = Mutex::new(());
    drop(m.lock());
    drop(m.lock());
}

#[test]
fn mutex_lots_and_lots() {
    const J: u32 = 1000;
    const K: u32 = 3;

    let m = Arc::new(Mutex::new(0));

    fn inc(m: &Mutex<u32>) {
        for _ in 0..J {
            *m.lock() += 1;
        }
    }

    let (tx, rx) = channel();
    for _ in 0..2 * K {
        let tx2 = tx.clone();
        let m2 = m.clone();
        thread::spawn(move || {
            inc(&m2);
            tx2.send(()).unwrap();
        });
    }

    drop(tx);
    for _ in 0..2 * K {
        rx.recv().unwrap();
    }
    assert_eq!(*m.lock(), J * K * 2);
}

#[test]
fn unpark_before_park_is_kept() {
    let parker = Parker::new();
    parker.unpark();
    // Returns at once instead of sleeping forever.
    parker.park(None);
}

#[test]
fn park_until_unparked() {
    let parker = Arc::new(Parker::new());
    let p2 = parker.clone();
    let t = thread::spawn(move || {
        thread::sleep(Duration::from_millis(10));
        p2.unpark();
    });
    parker.park(None);
    t.join().unwrap();
}

#[test]
fn park_times_out() {
    let parker = Parker::new();
    let deadline = Timespec::after(Duration::from_millis(10)).unwrap();
    parker.park(Some(&deadline));
    assert!(deadline.has_passed());
}

#[test]
fn timespec_carries_nanoseconds() {
    let t = Timespec::after(Duration::ZERO).unwrap();
    let later = t.checked_add_duration(&Duration::new(1, 999_999_999)).unwrap();
    let latest = later.checked_add_duration(&Duration::from_nanos(2)).unwrap();
    assert!(t < later && later < latest);
    assert_eq!(latest, t.checked_add_duration(&Duration::from_secs(2)).unwrap()
        .checked_add_duration(&Duration::from_nanos(1)).unwrap());
}
