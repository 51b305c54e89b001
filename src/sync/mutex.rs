//! Kernel-backed mutual exclusion with an explicit initialization window.

use core::cell::UnsafeCell;

use portable_atomic::{AtomicBool, Ordering};

use crate::errors::{ThreadError, ThreadResult};

/// A blocking mutex over the kernel's pthread mutex.
///
/// The primitive is unusable until [`init`](Mutex::init) and after
/// [`destroy`](Mutex::destroy); any operation outside that window returns
/// `NotInitialized`. Lock ownership is not tracked, mirroring the kernel
/// primitive's own contract: `unlock` is available only to conceptually
/// matched critical sections.
pub struct Mutex {
    // Boxed so the kernel object never moves while in use.
    raw: Box<UnsafeCell<libc::pthread_mutex_t>>,
    initialized: AtomicBool,
}

unsafe impl Send for Mutex {}
unsafe impl Sync for Mutex {}

impl Mutex {
    /// Create an uninitialized mutex.
    pub fn new() -> Self {
        Self {
            raw: Box::new(UnsafeCell::new(libc::PTHREAD_MUTEX_INITIALIZER)),
            initialized: AtomicBool::new(false),
        }
    }

    /// Create the kernel object and open the initialization window.
    ///
    /// A no-op on an already-initialized mutex.
    pub fn init(&self) -> ThreadResult<()> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        let rc = unsafe { libc::pthread_mutex_init(self.raw.get(), core::ptr::null()) };
        if rc != 0 {
            log::warn!("pthread_mutex_init failed: {rc}");
            return Err(ThreadError::Allocation);
        }
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    /// Block until the mutex is acquired.
    pub fn lock(&self) -> ThreadResult<()> {
        self.ensure()?;
        let _rc = unsafe { libc::pthread_mutex_lock(self.raw.get()) };
        debug_assert_eq!(_rc, 0);
        Ok(())
    }

    /// Release the mutex.
    pub fn unlock(&self) -> ThreadResult<()> {
        self.ensure()?;
        let _rc = unsafe { libc::pthread_mutex_unlock(self.raw.get()) };
        debug_assert_eq!(_rc, 0);
        Ok(())
    }

    /// Release the kernel object and close the initialization window.
    ///
    /// Destroying twice, or using the mutex afterwards, returns
    /// `NotInitialized`.
    pub fn destroy(&self) -> ThreadResult<()> {
        if self.initialized.swap(false, Ordering::AcqRel) {
            let _rc = unsafe { libc::pthread_mutex_destroy(self.raw.get()) };
            debug_assert_eq!(_rc, 0);
            Ok(())
        } else {
            Err(ThreadError::NotInitialized)
        }
    }

    pub(crate) fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub(crate) fn raw_ptr(&self) -> *mut libc::pthread_mutex_t {
        self.raw.get()
    }

    fn ensure(&self) -> ThreadResult<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(ThreadError::NotInitialized)
        }
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Mutex {
    fn drop(&mut self) {
        if self.initialized.load(Ordering::Acquire) {
            unsafe {
                libc::pthread_mutex_destroy(self.raw.get());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unusable_outside_the_initialized_window() {
        let mutex = Mutex::new();
        assert_eq!(mutex.lock(), Err(ThreadError::NotInitialized));
        assert_eq!(mutex.unlock(), Err(ThreadError::NotInitialized));
        assert_eq!(mutex.destroy(), Err(ThreadError::NotInitialized));

        mutex.init().unwrap();
        mutex.lock().unwrap();
        mutex.unlock().unwrap();
        mutex.destroy().unwrap();

        assert_eq!(mutex.lock(), Err(ThreadError::NotInitialized));
        assert_eq!(mutex.destroy(), Err(ThreadError::NotInitialized));
    }

    #[test]
    fn init_is_idempotent() {
        let mutex = Mutex::new();
        mutex.init().unwrap();
        mutex.init().unwrap();
        mutex.lock().unwrap();
        mutex.unlock().unwrap();
    }
}
