//! Busy-wait spinlock over a single atomic flag.

use portable_atomic::{AtomicBool, Ordering};

/// A pure busy-wait gate: one atomic flag, no owner identity, no wait
/// queue, no fairness or starvation bound.
///
/// Not reentrant: a thread calling [`lock`](SpinLock::lock) while already
/// holding the lock deadlocks against itself.
pub struct SpinLock {
    locked: AtomicBool,
}

impl SpinLock {
    /// Create a new, free spinlock.
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    /// Spin until the flag is swung from free to held.
    pub fn lock(&self) {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }
    }

    /// Release the lock.
    pub fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

impl Default for SpinLock {
    fn default() -> Self {
        Self::new()
    }
}
