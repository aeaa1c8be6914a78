//! Migratable thread stacks
//!
//! Each attached thread owns one anonymous mapping split into two equal
//! halves with a guard page below them:
//!
//! ```text
//! low                                                     high
//! | guard (PROT_NONE) |      half 1      |      half 0      |
//! ```
//!
//! One half is active (the thread's frames live there), the other is
//! scratch. A migration writes the destination layout into the scratch
//! half only and flips on success, so a failed migration leaves the live
//! frames untouched. The region is in the address space every node shares,
//! so the addresses themselves survive the move.

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        pub use unix::page_size;
    }
}

use xmig_core::constants::WORD_SIZE;
use xmig_core::StackError;

/// Two-half stack region of one thread
pub struct ThreadStack {
    /// Start of the mapping (guard page included)
    base: *mut u8,
    /// Length of the mapping
    mapped: usize,
    /// Bytes per half
    half_size: usize,
    /// Index of the active half (0 = upper, 1 = lower)
    active: usize,
}

// The region is owned exclusively by its ThreadStack.
unsafe impl Send for ThreadStack {}

impl ThreadStack {
    /// Bytes per half
    #[inline]
    pub fn half_size(&self) -> usize {
        self.half_size
    }

    /// Lowest usable address (just above the guard page)
    #[inline]
    fn usable_base(&self) -> u64 {
        self.base as u64 + (self.mapped - 2 * self.half_size) as u64
    }

    /// `[lo, hi)` of half `index`
    #[inline]
    pub fn half_bounds(&self, index: usize) -> (u64, u64) {
        let lo = self.usable_base() + ((1 - (index & 1)) * self.half_size) as u64;
        (lo, lo + self.half_size as u64)
    }

    #[inline]
    pub fn active_index(&self) -> usize {
        self.active
    }

    #[inline]
    pub fn active_bounds(&self) -> (u64, u64) {
        self.half_bounds(self.active)
    }

    #[inline]
    pub fn scratch_bounds(&self) -> (u64, u64) {
        self.half_bounds(self.active ^ 1)
    }

    /// Make the scratch half active
    #[inline]
    pub fn flip(&mut self) {
        self.active ^= 1;
    }

    /// Whether `[addr, addr + len)` lies inside the usable region
    #[inline]
    pub fn contains(&self, addr: u64, len: u64) -> bool {
        let lo = self.usable_base();
        let hi = lo + 2 * self.half_size as u64;
        addr >= lo && addr.checked_add(len).is_some_and(|end| end <= hi)
    }

    #[inline]
    fn check_word(&self, addr: u64) -> Result<*mut u64, StackError> {
        if addr % WORD_SIZE != 0 {
            return Err(StackError::Misaligned { addr });
        }
        if !self.contains(addr, WORD_SIZE) {
            return Err(StackError::OutOfBounds { addr });
        }
        Ok(addr as *mut u64)
    }

    /// Read one word from the stack
    pub fn read_u64(&self, addr: u64) -> Result<u64, StackError> {
        let p = self.check_word(addr)?;
        // SAFETY: bounds and alignment checked against the live mapping.
        Ok(unsafe { p.read() })
    }

    /// Write one word to the stack
    pub fn write_u64(&mut self, addr: u64, value: u64) -> Result<(), StackError> {
        let p = self.check_word(addr)?;
        // SAFETY: bounds and alignment checked against the live mapping.
        unsafe { p.write(value) };
        Ok(())
    }

    /// Zero `[lo, hi)`
    pub fn zero(&mut self, lo: u64, hi: u64) -> Result<(), StackError> {
        if hi < lo || !self.contains(lo, hi - lo) {
            return Err(StackError::OutOfBounds { addr: lo });
        }
        // SAFETY: range checked against the live mapping.
        unsafe { core::ptr::write_bytes(lo as *mut u8, 0, (hi - lo) as usize) };
        Ok(())
    }
}

impl core::fmt::Debug for ThreadStack {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let (lo, hi) = self.active_bounds();
        f.debug_struct("ThreadStack")
            .field("half_size", &self.half_size)
            .field("active", &self.active)
            .field("active_range", &format_args!("{:#x}..{:#x}", lo, hi))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HALF: usize = 64 * 1024;

    #[test]
    fn test_halves_are_disjoint_and_adjacent() {
        let stack = ThreadStack::new(HALF).unwrap();
        let (lo0, hi0) = stack.half_bounds(0);
        let (lo1, hi1) = stack.half_bounds(1);
        assert_eq!(hi0 - lo0, HALF as u64);
        assert_eq!(hi1, lo0);
        assert_eq!(hi1 - lo1, HALF as u64);
        assert_eq!(lo0 % 16, 0);
        assert_eq!(stack.active_bounds(), (lo0, hi0));
        assert_eq!(stack.scratch_bounds(), (lo1, hi1));
    }

    #[test]
    fn test_flip() {
        let mut stack = ThreadStack::new(HALF).unwrap();
        let before = stack.scratch_bounds();
        stack.flip();
        assert_eq!(stack.active_bounds(), before);
        assert_eq!(stack.active_index(), 1);
        stack.flip();
        assert_eq!(stack.active_index(), 0);
    }

    #[test]
    fn test_word_access() {
        let mut stack = ThreadStack::new(HALF).unwrap();
        let (lo, hi) = stack.active_bounds();
        stack.write_u64(hi - 8, 0xfeed).unwrap();
        stack.write_u64(lo, 0xbeef).unwrap();
        assert_eq!(stack.read_u64(hi - 8), Ok(0xfeed));
        assert_eq!(stack.read_u64(lo), Ok(0xbeef));
        stack.zero(lo, lo + 16).unwrap();
        assert_eq!(stack.read_u64(lo), Ok(0));
    }

    #[test]
    fn test_bounds_and_alignment() {
        let stack = ThreadStack::new(HALF).unwrap();
        let (_, hi) = stack.active_bounds();
        let (lo1, _) = stack.half_bounds(1);
        assert_eq!(stack.read_u64(hi), Err(StackError::OutOfBounds { addr: hi }));
        assert_eq!(
            stack.read_u64(lo1 - 8),
            Err(StackError::OutOfBounds { addr: lo1 - 8 })
        );
        assert_eq!(stack.read_u64(hi - 4), Err(StackError::Misaligned { addr: hi - 4 }));
    }
}
