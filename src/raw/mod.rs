//! Raw task spawning over `clone(2)`.
//!
//! A table-independent parallel path: each call maps a fresh stack and
//! asks the kernel for a new task directly, with an explicit choice of
//! which resources the task shares with its creator. Join reaps through
//! `waitpid`, cancel is SIGKILL-abrupt. Nothing here touches the TCB
//! table.

use core::mem::{self, MaybeUninit};
use core::ptr;
use std::io;

use crate::errors::{ThreadError, ThreadResult};

mod stack;

use stack::StackMapping;

/// Stack size for raw-spawned tasks: 1 MiB.
pub const STACK_SIZE: usize = 1024 * 1024;

/// Resource-sharing policy for a raw-spawned task.
///
/// Modeled as a tagged choice, never a raw flag integer: the two variants
/// differ only in thread-group identity, which changes signal delivery
/// and how external process accounting sees the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareMode {
    /// True sibling thread: shares virtual memory, the file descriptor
    /// table, filesystem context, signal handlers, and thread-group
    /// identity. Visible as one logical process to external tools.
    ///
    /// The kernel refuses to `waitpid` a thread-group sibling, so a
    /// `SharedThread` task cannot be reaped through [`RawTask::join`].
    SharedThread,
    /// Lightweight process: the same sharing minus thread-group identity.
    /// Independently identified, closer to a process with shared memory
    /// than to a thread; reapable like a child process.
    SharedAddressSpace,
}

impl ShareMode {
    fn clone_flags(self) -> libc::c_int {
        let shared = libc::CLONE_VM | libc::CLONE_FS | libc::CLONE_FILES | libc::CLONE_SIGHAND;
        match self {
            ShareMode::SharedThread => shared | libc::CLONE_THREAD,
            // SIGCHLD as the exit signal makes the task reapable.
            ShareMode::SharedAddressSpace => shared | libc::SIGCHLD,
        }
    }
}

/// Heap cell carrying the task routine into the clone child by value.
struct TaskCell<F> {
    routine: MaybeUninit<F>,
}

/// Type-erased ownership of a [`TaskCell`] allocation.
struct CellAlloc {
    ptr: *mut libc::c_void,
    free: unsafe fn(*mut libc::c_void),
}

unsafe impl Send for CellAlloc {}

impl CellAlloc {
    /// Free the cell shell. The routine inside must already have been
    /// consumed by the child.
    unsafe fn release(self) {
        unsafe { (self.free)(self.ptr) }
    }
}

unsafe fn free_cell<F>(ptr: *mut libc::c_void) {
    // MaybeUninit drops nothing; only the shell allocation is returned.
    drop(unsafe { Box::from_raw(ptr as *mut TaskCell<F>) });
}

/// Entry point of every raw-spawned task.
///
/// Runs on the fresh stack with the creator's thread-locals still mapped;
/// this path stays free of allocation and TLS access. Returning hands the
/// value to the kernel exit call, terminating the task immediately with
/// no cleanup of user resources.
extern "C" fn trampoline<F: FnOnce()>(arg: *mut libc::c_void) -> libc::c_int {
    let routine = unsafe { (*(arg as *mut TaskCell<F>)).routine.as_ptr().read() };
    routine();
    0
}

/// Handle to a raw-spawned kernel task.
///
/// Dropping an unjoined handle leaks the stack mapping rather than unmap
/// it under a possibly-running task. `SharedThread` handles can never be
/// reaped, so their stacks always leak.
pub struct RawTask {
    tid: libc::pid_t,
    mode: ShareMode,
    stack: Option<StackMapping>,
    cell: Option<CellAlloc>,
}

impl RawTask {
    /// Kernel task id.
    pub fn id(&self) -> libc::pid_t {
        self.tid
    }

    /// The sharing policy the task was spawned with.
    pub fn mode(&self) -> ShareMode {
        self.mode
    }

    /// Block in the kernel wait-for-child call until the task exits, then
    /// reap it and release its stack.
    ///
    /// Fails with the kernel's error for a task that cannot be waited on,
    /// notably a [`ShareMode::SharedThread`] sibling.
    pub fn join(mut self) -> io::Result<()> {
        loop {
            let rc = unsafe { libc::waitpid(self.tid, ptr::null_mut(), libc::__WALL) };
            if rc == self.tid {
                break;
            }
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            log::warn!("waitpid on raw task {} failed: {err}", self.tid);
            return Err(err);
        }
        log::debug!("raw task {} reaped", self.tid);
        if let Some(cell) = self.cell.take() {
            unsafe { cell.release() };
        }
        // Task is gone; the mapping can be unmapped now.
        self.stack.take();
        Ok(())
    }

    /// Deliver SIGKILL to the task.
    ///
    /// Abrupt: no destructors or cleanup handlers run in the target, and
    /// there is no guarantee it has reached a safe point. The task still
    /// has to be reaped with [`join`](RawTask::join) afterwards.
    ///
    /// Cancelling a [`ShareMode::SharedThread`] sibling takes the caller
    /// down with it: a fatal signal terminates the entire thread group,
    /// and the kernel offers no thread-scoped SIGKILL. Only
    /// [`ShareMode::SharedAddressSpace`] tasks can be cancelled in
    /// isolation.
    pub fn cancel(&self) -> io::Result<()> {
        if self.mode == ShareMode::SharedThread {
            log::warn!(
                "cancelling thread-group sibling {}, the signal is group-wide",
                self.tid
            );
        }
        let rc = unsafe { libc::kill(self.tid, libc::SIGKILL) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

impl Drop for RawTask {
    fn drop(&mut self) {
        if let Some(stack) = self.stack.take() {
            log::debug!("raw task {} dropped unjoined, leaking its stack", self.tid);
            mem::forget(stack);
        }
    }
}

/// Spawn a kernel task directly via `clone(2)`.
///
/// Maps a [`STACK_SIZE`] stack, moves `f` into a heap cell, and starts a
/// task that invokes `f` and terminates as soon as it returns.
///
/// # Errors
///
/// `Allocation` when the stack mapping fails, `Spawn` when the clone call
/// fails (the stack is unmapped and `f` dropped).
pub fn spawn<F>(f: F, mode: ShareMode) -> ThreadResult<RawTask>
where
    F: FnOnce() + Send + 'static,
{
    let stack = StackMapping::new(STACK_SIZE)?;
    let cell = Box::into_raw(Box::new(TaskCell {
        routine: MaybeUninit::new(f),
    }));

    let tid = unsafe {
        libc::clone(
            trampoline::<F>,
            stack.top() as *mut libc::c_void,
            mode.clone_flags(),
            cell as *mut libc::c_void,
        )
    };
    if tid == -1 {
        let err = io::Error::last_os_error();
        // The child never ran: reclaim the routine and the cell.
        unsafe {
            let mut boxed = Box::from_raw(cell);
            boxed.routine.assume_init_drop();
        }
        log::warn!("clone failed ({mode:?}): {err}");
        return Err(ThreadError::Spawn);
    }
    log::debug!("raw task {tid} spawned ({mode:?})");
    Ok(RawTask {
        tid,
        mode,
        stack: Some(stack),
        cell: Some(CellAlloc {
            ptr: cell as *mut libc::c_void,
            free: free_cell::<F>,
        }),
    })
}
