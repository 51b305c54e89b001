//! Thread control blocks and the lifecycle controller.
//!
//! Every application thread maps one-to-one onto a kernel thread. The
//! bookkeeping lives in a fixed-capacity table of thread control blocks;
//! blocking and scheduling are delegated to the kernel entirely.

use std::thread::JoinHandle;

pub mod lifecycle;
pub mod table;

pub use lifecycle::{current_id, exit, init, join, live_count, spawn, yield_now};
pub use table::MAX_THREADS;

/// Identifier of a managed thread.
///
/// Ids are handed out from a monotonic counter and never reused, even
/// when the table slot that carried them is reclaimed. The initial
/// thread (registered by [`init`]) always holds id 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(u64);

impl ThreadId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw id value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a managed thread.
///
/// The state field is bookkeeping over the kernel's own scheduling: the
/// kernel runs threads preemptively regardless of what this records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadState {
    Ready = 0,
    Running = 1,
    Blocked = 2,
    Finished = 3,
}

/// Per-thread control block.
///
/// Mutated only under the table lock: by the thread's own wrapper (which
/// stores the return value, marks `Finished` and flips its waiter to
/// `Ready`) and by a joining caller (which registers itself in
/// `joined_by`). A slot is reclaimed only by a later `spawn`.
pub(crate) struct Tcb {
    pub id: ThreadId,
    pub state: ThreadState,
    /// Kernel handle, taken by the single registered joiner. `None` for
    /// the initial thread and after a joiner has claimed it.
    pub handle: Option<JoinHandle<()>>,
    /// Return value, present once the thread has finished.
    pub retval: Option<usize>,
    /// The single registered waiter, cleared once it has read `retval`.
    pub joined_by: Option<ThreadId>,
    /// Whether a joiner has consumed `retval`. A finished slot stays off
    /// limits to reclamation until then, so the value outlives any churn
    /// between finish and join.
    pub reaped: bool,
}

impl Tcb {
    pub(crate) fn new(id: ThreadId, state: ThreadState) -> Self {
        Self {
            id,
            state,
            handle: None,
            retval: None,
            joined_by: None,
            reaped: false,
        }
    }
}
