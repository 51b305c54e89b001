//! Error handling for the threading system.
//!
//! Every fallible operation surfaces its failure synchronously to the
//! immediate caller as one of these variants. There is no internal retry
//! and no automatic recovery; the caller owns the decision to retry,
//! abort, or ignore.

use core::fmt;

/// Result type for threading operations.
pub type ThreadResult<T> = Result<T, ThreadError>;

/// Error type for all threading operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadError {
    /// The TCB table is exhausted: no finished slot to reuse and no
    /// never-used slot left.
    Capacity,
    /// Kernel task creation failed. The reserved slot has been rolled
    /// back; the table is exactly as it was before the call.
    Spawn,
    /// No thread with the requested id exists in the table. Ids are never
    /// reused, so this also covers slots reclaimed by a later generation.
    NotFound,
    /// A mutex or condition variable was used before `init` or after
    /// `destroy`.
    NotInitialized,
    /// A kernel resource could not be allocated: mapping a stack region
    /// for a raw-spawned task, or creating the kernel object behind a
    /// mutex or condition variable.
    Allocation,
}

impl fmt::Display for ThreadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadError::Capacity => write!(f, "thread table exhausted"),
            ThreadError::Spawn => write!(f, "kernel task creation failed"),
            ThreadError::NotFound => write!(f, "no thread with that id"),
            ThreadError::NotInitialized => {
                write!(f, "synchronization primitive not initialized")
            }
            ThreadError::Allocation => write!(f, "kernel resource allocation failed"),
        }
    }
}

impl std::error::Error for ThreadError {}
