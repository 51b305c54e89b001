//! Condition variable over the kernel's pthread condvar.

use core::cell::UnsafeCell;

use portable_atomic::{AtomicBool, Ordering};

use super::Mutex;
use crate::errors::{ThreadError, ThreadResult};

/// A condition variable with the same initialization-window contract as
/// [`Mutex`].
///
/// [`wait`](Condvar::wait) atomically releases the mutex and blocks, then
/// reacquires the mutex before returning; there is no window in which a
/// concurrent signal can be missed. Spurious wakes are possible, so
/// waiters recheck their predicate in a loop.
pub struct Condvar {
    raw: Box<UnsafeCell<libc::pthread_cond_t>>,
    initialized: AtomicBool,
}

unsafe impl Send for Condvar {}
unsafe impl Sync for Condvar {}

impl Condvar {
    /// Create an uninitialized condition variable.
    pub fn new() -> Self {
        Self {
            raw: Box::new(UnsafeCell::new(libc::PTHREAD_COND_INITIALIZER)),
            initialized: AtomicBool::new(false),
        }
    }

    /// Create the kernel object and open the initialization window.
    ///
    /// A no-op on an already-initialized condition variable.
    pub fn init(&self) -> ThreadResult<()> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        let rc = unsafe { libc::pthread_cond_init(self.raw.get(), core::ptr::null()) };
        if rc != 0 {
            log::warn!("pthread_cond_init failed: {rc}");
            return Err(ThreadError::Allocation);
        }
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    /// Atomically release `mutex` and block until signaled, then reacquire
    /// `mutex`.
    ///
    /// Both this condvar and the mutex must be inside their initialization
    /// windows, and the caller must hold the mutex.
    pub fn wait(&self, mutex: &Mutex) -> ThreadResult<()> {
        self.ensure()?;
        if !mutex.is_initialized() {
            return Err(ThreadError::NotInitialized);
        }
        let _rc = unsafe { libc::pthread_cond_wait(self.raw.get(), mutex.raw_ptr()) };
        debug_assert_eq!(_rc, 0);
        Ok(())
    }

    /// Wake at least one blocked waiter, unspecified which.
    pub fn signal(&self) -> ThreadResult<()> {
        self.ensure()?;
        let _rc = unsafe { libc::pthread_cond_signal(self.raw.get()) };
        debug_assert_eq!(_rc, 0);
        Ok(())
    }

    /// Wake all blocked waiters.
    pub fn broadcast(&self) -> ThreadResult<()> {
        self.ensure()?;
        let _rc = unsafe { libc::pthread_cond_broadcast(self.raw.get()) };
        debug_assert_eq!(_rc, 0);
        Ok(())
    }

    /// Release the kernel object and close the initialization window.
    pub fn destroy(&self) -> ThreadResult<()> {
        if self.initialized.swap(false, Ordering::AcqRel) {
            let _rc = unsafe { libc::pthread_cond_destroy(self.raw.get()) };
            debug_assert_eq!(_rc, 0);
            Ok(())
        } else {
            Err(ThreadError::NotInitialized)
        }
    }

    fn ensure(&self) -> ThreadResult<()> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(ThreadError::NotInitialized)
        }
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Condvar {
    fn drop(&mut self) {
        if self.initialized.load(Ordering::Acquire) {
            unsafe {
                libc::pthread_cond_destroy(self.raw.get());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unusable_outside_the_initialized_window() {
        let cond = Condvar::new();
        assert_eq!(cond.signal(), Err(ThreadError::NotInitialized));
        assert_eq!(cond.broadcast(), Err(ThreadError::NotInitialized));
        assert_eq!(cond.destroy(), Err(ThreadError::NotInitialized));

        cond.init().unwrap();
        cond.signal().unwrap();
        cond.broadcast().unwrap();
        cond.destroy().unwrap();
        assert_eq!(cond.signal(), Err(ThreadError::NotInitialized));
    }

    #[test]
    fn wait_requires_an_initialized_mutex() {
        let cond = Condvar::new();
        cond.init().unwrap();
        let mutex = Mutex::new();
        assert_eq!(cond.wait(&mutex), Err(ThreadError::NotInitialized));
    }
}
