#![deny(unsafe_op_in_unsafe_fn)]
#![forbid(unreachable_pub)]

//! One-to-one user-level thread lifecycle management for Linux.
//!
//! Every application thread maps to exactly one kernel thread, tracked
//! through a fixed-capacity table of thread control blocks. Scheduling is
//! fully delegated to the kernel; this library does the bookkeeping:
//! slot reuse, monotonic identity allocation, join registration, and
//! wake propagation, all race-free behind one table lock.
//!
//! # Quick Start
//!
//! ```no_run
//! uthread::init();
//!
//! let id = uthread::spawn(|| {
//!     // runs on its own kernel thread
//!     42
//! })
//! .expect("spawn failed");
//!
//! assert_eq!(uthread::join(id).expect("join failed"), 42);
//! ```
//!
//! # Architecture
//!
//! - A 128-slot TCB table with finished-slot reuse and never-reused
//!   monotonic ids; slot 0 belongs to the thread that calls [`init`]
//! - Lifecycle operations: [`spawn`], [`join`], [`exit`], [`yield_now`],
//!   [`current_id`]
//! - Kernel-backed [`Mutex`] and [`Condvar`] with an explicit
//!   init/destroy window, plus a busy-wait [`SpinLock`]
//! - A table-independent [`raw`] path that creates kernel tasks directly
//!   with `clone(2)` under an explicit resource-sharing policy

pub mod errors;
pub mod raw;
pub mod sync;
pub mod thread;

#[cfg(test)]
mod tests;

pub use errors::{ThreadError, ThreadResult};
pub use sync::{Condvar, Mutex, SpinLock};
pub use thread::{
    current_id, exit, init, join, live_count, spawn, yield_now, ThreadId, ThreadState, MAX_THREADS,
};
