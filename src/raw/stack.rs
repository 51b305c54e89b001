//! Anonymous stack mappings for raw-spawned tasks.

use core::ptr::{self, NonNull};

use crate::errors::{ThreadError, ThreadResult};

/// An anonymously mapped stack region, unmapped on drop.
///
/// Raw-task stacks grow downward; [`top`](StackMapping::top) is the
/// address handed to `clone(2)`.
pub(crate) struct StackMapping {
    base: NonNull<u8>,
    len: usize,
}

unsafe impl Send for StackMapping {}

impl StackMapping {
    pub(crate) fn new(len: usize) -> ThreadResult<Self> {
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_STACK,
                -1,
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            log::warn!(
                "stack mapping of {len} bytes failed: {}",
                std::io::Error::last_os_error()
            );
            return Err(ThreadError::Allocation);
        }
        // mmap never returns null on success.
        let base = NonNull::new(addr as *mut u8).ok_or(ThreadError::Allocation)?;
        Ok(Self { base, len })
    }

    /// Highest address of the mapping, page-aligned.
    pub(crate) fn top(&self) -> *mut u8 {
        unsafe { self.base.as_ptr().add(self.len) }
    }
}

impl Drop for StackMapping {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base.as_ptr() as *mut libc::c_void, self.len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_is_writable_to_the_top() {
        let stack = StackMapping::new(64 * 1024).unwrap();
        unsafe {
            // Touch the last word a clone child would push over.
            let slot = stack.top().sub(8) as *mut u64;
            slot.write(0xAA55);
            assert_eq!(slot.read(), 0xAA55);
        }
    }
}
