//! Stress tests: capacity exhaustion, slot reuse, contended spinning.

use core::cell::UnsafeCell;
use std::sync::Arc;

use super::helpers::{ensure_init, table_guard, Gate};
use crate::errors::ThreadError;
use crate::sync::SpinLock;
use crate::thread::{self, MAX_THREADS};

#[test]
fn capacity_error_then_reuse_after_finish() {
    let _guard = table_guard();
    ensure_init();

    let gate = Arc::new(Gate::new());
    let mut ids = Vec::new();
    loop {
        let gate = gate.clone();
        match thread::spawn(move || {
            gate.wait();
            0
        }) {
            Ok(id) => {
                ids.push(id);
                assert!(ids.len() < MAX_THREADS);
            }
            Err(err) => {
                assert_eq!(err, ThreadError::Capacity);
                break;
            }
        }
    }
    assert!(!ids.is_empty());

    // Release the held threads; their slots become reusable.
    gate.open();
    for id in ids {
        thread::join(id).expect("join failed");
    }
    let id = thread::spawn(|| 7).expect("spawn must succeed after slots free up");
    assert_eq!(thread::join(id).expect("join failed"), 7);
    // Everything but the initial thread has finished again.
    assert!(thread::live_count() >= 1);
}

#[test]
fn join_on_a_reclaimed_older_generation_id_is_not_found() {
    let _guard = table_guard();
    ensure_init();

    let old = thread::spawn(|| 1).expect("spawn failed");
    assert_eq!(thread::join(old).expect("join failed"), 1);

    // Fill the table to capacity: every reaped slot, the old thread's
    // included, gets displaced by a newer generation.
    let gate = Arc::new(Gate::new());
    let mut ids = Vec::new();
    loop {
        let gate = gate.clone();
        match thread::spawn(move || {
            gate.wait();
            0
        }) {
            Ok(id) => ids.push(id),
            Err(err) => {
                assert_eq!(err, ThreadError::Capacity);
                break;
            }
        }
    }
    assert_eq!(thread::join(old), Err(ThreadError::NotFound));

    gate.open();
    for id in ids {
        thread::join(id).expect("join failed");
    }
}

#[test]
fn ids_stay_increasing_across_slot_reuse() {
    let _guard = table_guard();
    ensure_init();

    // Three times the table capacity, sequentially, so every spawn after
    // the first pass lands in a reclaimed slot.
    let mut last = None;
    for _ in 0..(MAX_THREADS * 3) {
        let id = thread::spawn(|| 0).expect("spawn failed");
        if let Some(prev) = last {
            assert!(prev < id);
        }
        last = Some(id);
        thread::join(id).expect("join failed");
    }
}

struct SpinCounter {
    lock: SpinLock,
    value: UnsafeCell<u64>,
}

unsafe impl Sync for SpinCounter {}

#[test]
fn spinlock_protects_two_thousand_increments() {
    let _guard = table_guard();
    ensure_init();

    let counter = Arc::new(SpinCounter {
        lock: SpinLock::new(),
        value: UnsafeCell::new(0),
    });

    let mut ids = Vec::new();
    for _ in 0..2 {
        let counter = counter.clone();
        let id = thread::spawn(move || {
            for _ in 0..1000 {
                counter.lock.lock();
                unsafe {
                    *counter.value.get() += 1;
                }
                counter.lock.unlock();
            }
            0
        })
        .expect("spawn failed");
        ids.push(id);
    }
    for id in ids {
        thread::join(id).expect("join failed");
    }

    counter.lock.lock();
    let value = unsafe { *counter.value.get() };
    counter.lock.unlock();
    assert_eq!(value, 2000);
}
