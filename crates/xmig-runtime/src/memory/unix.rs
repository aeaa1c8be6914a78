//! Unix stack regions using mmap

use super::ThreadStack;
use xmig_core::kdebug;
use xmig_core::MemoryError;

/// System page size
pub fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 {
        4096
    } else {
        size as usize
    }
}

impl ThreadStack {
    /// Map a region with two halves of `half_size` bytes each
    ///
    /// `half_size` is rounded up to a whole number of pages. The guard page
    /// stays PROT_NONE so running off the low end faults instead of
    /// scribbling over a neighbour.
    pub fn new(half_size: usize) -> Result<Self, MemoryError> {
        if half_size == 0 {
            return Err(MemoryError::InvalidSize(half_size));
        }
        let page = page_size();
        let half = half_size
            .checked_add(page - 1)
            .map(|n| n & !(page - 1))
            .ok_or(MemoryError::InvalidSize(half_size))?;
        let mapped = half
            .checked_mul(2)
            .and_then(|n| n.checked_add(page))
            .ok_or(MemoryError::InvalidSize(half_size))?;

        // SAFETY: anonymous private mapping, no file or fixed address.
        let base = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                mapped,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(MemoryError::AllocationFailed);
        }

        // SAFETY: the first page belongs to the mapping created above.
        let ret = unsafe { libc::mprotect(base, page, libc::PROT_NONE) };
        if ret != 0 {
            // SAFETY: unmapping what we just mapped.
            unsafe { libc::munmap(base, mapped) };
            return Err(MemoryError::ProtectionFailed);
        }

        kdebug!("thread stack mapped at {:p} ({} bytes per half)", base, half);
        Ok(ThreadStack {
            base: base as *mut u8,
            mapped,
            half_size: half,
            active: 0,
        })
    }

    fn release(&mut self) -> Result<(), MemoryError> {
        if self.base.is_null() {
            return Ok(());
        }
        // SAFETY: base/mapped describe the mapping created in `new`.
        let ret = unsafe { libc::munmap(self.base as *mut libc::c_void, self.mapped) };
        self.base = core::ptr::null_mut();
        if ret != 0 {
            return Err(MemoryError::ReleaseFailed);
        }
        Ok(())
    }
}

impl Drop for ThreadStack {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            xmig_core::kwarn!("thread stack release failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounds_to_pages() {
        let page = page_size();
        let stack = ThreadStack::new(page + 1).unwrap();
        assert_eq!(stack.half_size(), 2 * page);
    }

    #[test]
    fn test_zero_size_rejected() {
        assert_eq!(ThreadStack::new(0).unwrap_err(), MemoryError::InvalidSize(0));
    }
}
