//! Synchronization primitives: mutex, condition variable, spinlock.
//!
//! Mutex and condition variable delegate blocking to the kernel's pthread
//! objects and share one contract: every operation other than `init`
//! checks the initialization window first and fails with
//! `NotInitialized` outside it, never touching the kernel object. The
//! spinlock is a pure busy-wait gate over a single atomic flag.

pub mod condvar;
pub mod mutex;
pub mod spinlock;

pub use condvar::Condvar;
pub use mutex::Mutex;
pub use spinlock::SpinLock;
