//! Lifecycle controller over the global TCB table.
//!
//! All bookkeeping happens under one table-wide lock; the lock is never
//! held across a blocking kernel call. Live-thread and id counters are
//! atomics. The calling thread's identity is thread-local, set by
//! [`init`] for slot 0 and by the wrapper for every spawned thread.

use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::thread::Builder;

use portable_atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use spin::Mutex;

use super::table::{TcbTable, MAX_THREADS};
use super::{Tcb, ThreadId, ThreadState};
use crate::errors::{ThreadError, ThreadResult};

static TABLE: Mutex<TcbTable> = Mutex::new(TcbTable::new());
static INITIALIZED: AtomicBool = AtomicBool::new(false);
static NEXT_ID: AtomicU64 = AtomicU64::new(0);
static LIVE_COUNT: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    /// Slot index and id of the calling thread, if it is managed.
    static CURRENT: Cell<Option<(usize, ThreadId)>> = Cell::new(None);
}

/// Payload carried by [`exit`] through the unwinder to the wrapper.
struct ExplicitExit(usize);

fn ensure_initialized(op: &str) {
    if !INITIALIZED.load(Ordering::SeqCst) {
        panic!("uthread::{op} called before uthread::init");
    }
}

/// One-time process-wide setup.
///
/// Registers the calling thread in slot 0 with id 0 and state `Running`.
/// Must run exactly once, before any [`spawn`]; a second call panics.
pub fn init() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        panic!("uthread::init called twice");
    }
    let id = ThreadId::new(NEXT_ID.fetch_add(1, Ordering::Relaxed));
    TABLE
        .lock()
        .register_initial(Tcb::new(id, ThreadState::Running));
    CURRENT.with(|current| current.set(Some((0, id))));
    LIVE_COUNT.store(1, Ordering::SeqCst);
    log::debug!("thread table initialized, slot 0 holds thread {id}");
}

/// Create a new managed thread running `f` on its own kernel thread.
///
/// Slot selection reuses a finished slot first, then a never-used one.
/// If the kernel refuses to create the thread the claimed slot is rolled
/// back exactly to its prior content.
///
/// # Errors
///
/// `Capacity` when no slot is available, `Spawn` when kernel thread
/// creation fails.
pub fn spawn<F>(f: F) -> ThreadResult<ThreadId>
where
    F: FnOnce() -> usize + Send + 'static,
{
    ensure_initialized("spawn");
    if LIVE_COUNT.load(Ordering::SeqCst) >= MAX_THREADS {
        log::warn!("spawn rejected: {MAX_THREADS} threads live");
        return Err(ThreadError::Capacity);
    }
    let own_slot = CURRENT.with(|current| current.get()).map(|(slot, _)| slot);
    let id = ThreadId::new(NEXT_ID.fetch_add(1, Ordering::Relaxed));

    let (slot, prev) = match TABLE.lock().claim(own_slot, Tcb::new(id, ThreadState::Ready)) {
        Some(claimed) => claimed,
        None => {
            log::warn!("spawn rejected: no reusable or unused slot");
            return Err(ThreadError::Capacity);
        }
    };

    // Raised while the kernel create is in flight so the finish path can
    // never drive the counter below zero.
    LIVE_COUNT.fetch_add(1, Ordering::SeqCst);

    let spawned = Builder::new()
        .name(format!("uthread-{id}"))
        .spawn(move || wrapper(slot, id, f));

    match spawned {
        Ok(handle) => {
            let mut table = TABLE.lock();
            if let Some(tcb) = table.get_mut(slot) {
                if tcb.id == id {
                    tcb.handle = Some(handle);
                }
            }
            log::debug!("thread {id} spawned into slot {slot}");
            Ok(id)
        }
        Err(err) => {
            LIVE_COUNT.fetch_sub(1, Ordering::SeqCst);
            TABLE.lock().restore(slot, prev);
            log::warn!("kernel thread creation failed for thread {id}: {err}");
            Err(ThreadError::Spawn)
        }
    }
}

/// Entry point of every spawned kernel thread.
fn wrapper<F>(slot: usize, id: ThreadId, f: F)
where
    F: FnOnce() -> usize + Send + 'static,
{
    CURRENT.with(|current| current.set(Some((slot, id))));
    {
        let mut table = TABLE.lock();
        if let Some(tcb) = table.get_mut(slot) {
            if tcb.id == id {
                tcb.state = ThreadState::Running;
            }
        }
    }
    log::trace!("thread {id} running");

    let retval = match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(payload) => match payload.downcast::<ExplicitExit>() {
            Ok(exit) => exit.0,
            Err(_) => {
                log::warn!("thread {id} panicked, recording return value 0");
                0
            }
        },
    };
    finish(slot, id, retval);
}

/// Finish bookkeeping: store the return value, mark `Finished`, flip the
/// registered waiter to `Ready`, decrement the live counter.
///
/// Idempotent: a thread that already went through [`exit`] is skipped.
fn finish(slot: usize, id: ThreadId, retval: usize) {
    let waiter = {
        let mut table = TABLE.lock();
        let waiter = match table.get_mut(slot) {
            Some(tcb) if tcb.id == id && tcb.state != ThreadState::Finished => {
                tcb.retval = Some(retval);
                tcb.state = ThreadState::Finished;
                tcb.joined_by
            }
            _ => return,
        };
        // Informational wake signal; the real unblock happens inside the
        // kernel join the waiter is parked in.
        if let Some(waiter_id) = waiter {
            if let Some((_, tcb)) = table.find_by_id_mut(waiter_id) {
                tcb.state = ThreadState::Ready;
            }
        }
        waiter
    };
    LIVE_COUNT.fetch_sub(1, Ordering::SeqCst);
    match waiter {
        Some(waiter_id) => log::debug!("thread {id} finished, waiter {waiter_id} flagged ready"),
        None => log::trace!("thread {id} finished"),
    }
}

/// Wait for the thread with the given id and return its stored value.
///
/// A finished thread answers immediately and repeatably; its slot only
/// becomes reclaimable once a joiner has consumed the value, so the value
/// survives any spawn churn between finish and join. Otherwise the
/// caller registers itself as the single waiter, is marked `Blocked`, and
/// parks in the kernel join on the target's handle.
///
/// Only one joiner may be registered per thread at a time; with a second
/// concurrent joiner the `joined_by` ownership is unspecified, and the
/// late joiner falls back to polling for completion.
///
/// # Errors
///
/// `NotFound` when no thread carries the id, including ids whose slot was
/// reclaimed by a later generation.
pub fn join(id: ThreadId) -> ThreadResult<usize> {
    ensure_initialized("join");
    let caller = CURRENT.with(|current| current.get());

    let handle = {
        let mut table = TABLE.lock();
        let (target_slot, state, retval) = match table.find_by_id_mut(id) {
            Some((slot, tcb)) => {
                if tcb.state == ThreadState::Finished {
                    // Consuming the value is what releases the slot for
                    // reclamation by a later spawn.
                    tcb.reaped = true;
                }
                (slot, tcb.state, tcb.retval)
            }
            None => return Err(ThreadError::NotFound),
        };
        if state == ThreadState::Finished {
            return Ok(retval.unwrap_or(0));
        }
        let handle = match table.get_mut(target_slot) {
            Some(tcb) => {
                if let Some((_, caller_id)) = caller {
                    tcb.joined_by = Some(caller_id);
                }
                tcb.handle.take()
            }
            None => None,
        };
        if let Some((caller_slot, caller_id)) = caller {
            if let Some(own) = table.get_mut(caller_slot) {
                if own.id == caller_id {
                    own.state = ThreadState::Blocked;
                }
            }
        }
        handle
    };

    match handle {
        Some(handle) => {
            log::trace!("blocking in kernel join on thread {id}");
            // A panicked target already logged and recorded its value.
            let _ = handle.join();
        }
        None => {
            // The initial thread, a second joiner, or a handle not yet
            // registered by the creator: poll for completion instead.
            loop {
                let finished = {
                    let mut table = TABLE.lock();
                    match table.find_by_id_mut(id) {
                        Some((_, tcb)) => tcb.state == ThreadState::Finished,
                        None => true,
                    }
                };
                if finished {
                    break;
                }
                std::thread::yield_now();
            }
        }
    }

    let mut table = TABLE.lock();
    if let Some((caller_slot, caller_id)) = caller {
        if let Some(own) = table.get_mut(caller_slot) {
            if own.id == caller_id {
                own.state = ThreadState::Running;
            }
        }
    }
    match table.find_by_id_mut(id) {
        Some((_, tcb)) => {
            let retval = tcb.retval.unwrap_or(0);
            // Consuming the value re-enables reclamation of the slot.
            tcb.joined_by = None;
            tcb.reaped = true;
            Ok(retval)
        }
        None => Err(ThreadError::NotFound),
    }
}

/// Terminate the calling thread, recording `value` as its return value.
///
/// Performs the finish bookkeeping for the caller's slot and then unwinds
/// the thread; this function never returns. From the initial thread the
/// unwind propagates out of `main`.
pub fn exit(value: usize) -> ! {
    ensure_initialized("exit");
    if let Some((slot, id)) = CURRENT.with(|current| current.get()) {
        log::trace!("thread {id} exiting with value {value}");
        finish(slot, id, value);
    }
    panic::panic_any(ExplicitExit(value));
}

/// Hint to the kernel scheduler. Never blocks, never touches lifecycle
/// state.
#[inline]
pub fn yield_now() {
    std::thread::yield_now();
}

/// Id of the calling thread, or `None` when the caller is not managed by
/// the table (including any call before [`init`]).
pub fn current_id() -> Option<ThreadId> {
    CURRENT.with(|current| current.get()).map(|(_, id)| id)
}

/// Number of live (not yet finished) managed threads.
pub fn live_count() -> usize {
    LIVE_COUNT.load(Ordering::SeqCst)
}
