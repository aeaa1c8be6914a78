//! x86_64 host capture (MXCSR, RFLAGS)

use core::arch::asm;

use super::HostState;
use crate::translate::x86_64::{decode_mxcsr, decode_rflags};

/// Raw MXCSR
#[inline]
pub fn read_mxcsr() -> u32 {
    let mut csr: u32 = 0;
    // SAFETY: stmxcsr stores four bytes into a local.
    unsafe {
        asm!(
            "stmxcsr [{}]",
            in(reg) &mut csr as *mut u32,
            options(nostack, preserves_flags),
        );
    }
    csr
}

/// Raw RFLAGS
#[inline]
pub fn read_rflags() -> u64 {
    let flags: u64;
    // SAFETY: pushes and pops one word of our own stack.
    unsafe {
        asm!("pushfq", "pop {}", out(reg) flags, options(preserves_flags));
    }
    flags
}

pub fn capture_host_state() -> HostState {
    HostState {
        fenv: decode_mxcsr(read_mxcsr()),
        // DF is clear at every call boundary in Rust code
        flags: decode_rflags(read_rflags()).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xmig_core::regs::x86_64::rflags;

    #[test]
    fn test_reserved_flag_reads_one() {
        assert_ne!(read_rflags() & rflags::RESERVED1, 0);
        assert_eq!(read_rflags() & rflags::DF, 0);
    }

    #[test]
    fn test_default_mxcsr_masks_everything() {
        let env = capture_host_state().fenv;
        assert!(env.traps.is_empty());
    }
}
