//! Frame layouts per ISA
//!
//! All three stacks grow down with 16-byte aligned frames. `cfa` is the
//! canonical frame address: the caller's stack pointer at the call.
//!
//! ```text
//! x86-64                 AArch64                PowerPC64 (ELFv2)
//! cfa-8   return addr    sp+0   caller x29      sp+0   back chain (= cfa)
//! cfa-16  caller rbp     sp+8   return addr     sp+8   CR save
//! cfa-24  slot 0         sp+16  slot 0          sp+16  LR save (callee's)
//! ...                    ...                    sp+24  TOC save
//!                                               sp+32  slot 0
//!                                               cfa+16 return addr
//! ```

use xmig_core::constants::{STACK_ALIGN, WORD_SIZE};
use xmig_core::Arch;

#[inline]
pub const fn align_up(n: u64) -> u64 {
    (n + STACK_ALIGN - 1) & !(STACK_ALIGN - 1)
}

/// Frame size for a function holding `slots` live words
#[inline]
pub const fn frame_size(arch: Arch, slots: usize) -> u64 {
    align_up(arch.frame_header_size() + slots as u64 * WORD_SIZE)
}

/// Placement of one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeom {
    pub arch: Arch,
    pub sp: u64,
    pub cfa: u64,
}

impl FrameGeom {
    /// Frame starting at `sp` holding `slots` words
    #[inline]
    pub const fn at_sp(arch: Arch, sp: u64, slots: usize) -> Self {
        FrameGeom {
            arch,
            sp,
            cfa: sp + frame_size(arch, slots),
        }
    }

    /// Frame ending at `cfa` holding `slots` words
    #[inline]
    pub const fn below_cfa(arch: Arch, cfa: u64, slots: usize) -> Self {
        FrameGeom {
            arch,
            sp: cfa - frame_size(arch, slots),
            cfa,
        }
    }

    /// Value of the frame pointer while this frame is live
    #[inline]
    pub const fn fp(&self) -> u64 {
        match self.arch {
            Arch::X86_64 => self.cfa - 16,
            Arch::AArch64 | Arch::PowerPc64 => self.sp,
        }
    }

    /// Where this frame's return address is stored
    #[inline]
    pub const fn return_slot(&self) -> u64 {
        match self.arch {
            Arch::X86_64 => self.cfa - 8,
            Arch::AArch64 => self.sp + 8,
            Arch::PowerPc64 => self.cfa + 16,
        }
    }

    /// Where the link to the caller is stored: saved frame pointer on
    /// x86-64 and AArch64, back chain on PowerPC64
    #[inline]
    pub const fn link_slot(&self) -> u64 {
        match self.arch {
            Arch::X86_64 => self.cfa - 16,
            Arch::AArch64 | Arch::PowerPc64 => self.sp,
        }
    }

    /// Address of live slot `k`
    #[inline]
    pub const fn slot(&self, k: usize) -> u64 {
        let k = k as u64 * WORD_SIZE;
        match self.arch {
            Arch::X86_64 => self.cfa - 24 - k,
            Arch::AArch64 => self.sp + 16 + k,
            Arch::PowerPc64 => self.sp + 32 + k,
        }
    }

    /// PowerPC64 TOC save doubleword
    #[inline]
    pub const fn toc_slot(&self) -> u64 {
        self.sp + 24
    }
}
