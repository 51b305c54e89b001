//! Test helper utilities shared across the suites.

use std::sync::{Mutex as StdMutex, MutexGuard, Once};

use portable_atomic::{AtomicBool, Ordering};

/// Run the one-time table setup exactly once per test process.
pub(crate) fn ensure_init() {
    static INIT: Once = Once::new();
    INIT.call_once(crate::thread::init);
}

/// Serialize tests that depend on global table occupancy.
pub(crate) fn table_guard() -> MutexGuard<'static, ()> {
    static GUARD: StdMutex<()> = StdMutex::new(());
    GUARD
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A one-shot start gate for holding spawned threads live.
pub(crate) struct Gate(AtomicBool);

impl Gate {
    pub(crate) const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub(crate) fn open(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub(crate) fn wait(&self) {
        while !self.0.load(Ordering::Acquire) {
            std::thread::yield_now();
        }
    }
}
