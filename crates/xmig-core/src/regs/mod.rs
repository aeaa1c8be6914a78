//! Native register files
//!
//! One plain-data struct per ISA holding everything that can be live at a
//! migration point, plus the closed variant `ArchRegs` over the three.
//! Bit-level layouts of status/control registers live next to the struct
//! that owns them so the translator never hard-codes a shift.

pub mod aarch64;
pub mod powerpc64;
pub mod x86_64;

pub use aarch64::AArch64Regs;
pub use powerpc64::PowerPc64Regs;
pub use x86_64::X86_64Regs;

use crate::arch::Arch;

/// Register file of one thread on one ISA
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::large_enum_variant)]
pub enum ArchRegs {
    AArch64(AArch64Regs),
    PowerPc64(PowerPc64Regs),
    X86_64(X86_64Regs),
}

impl ArchRegs {
    /// Reset-state register file for `arch`
    pub fn empty(arch: Arch) -> Self {
        match arch {
            Arch::AArch64 => ArchRegs::AArch64(AArch64Regs::default()),
            Arch::PowerPc64 => ArchRegs::PowerPc64(PowerPc64Regs::default()),
            Arch::X86_64 => ArchRegs::X86_64(X86_64Regs::default()),
        }
    }

    #[inline]
    pub fn arch(&self) -> Arch {
        match self {
            ArchRegs::AArch64(_) => Arch::AArch64,
            ArchRegs::PowerPc64(_) => Arch::PowerPc64,
            ArchRegs::X86_64(_) => Arch::X86_64,
        }
    }

    /// Stack pointer
    #[inline]
    pub fn sp(&self) -> u64 {
        match self {
            ArchRegs::AArch64(r) => r.sp,
            ArchRegs::PowerPc64(r) => r.gpr[powerpc64::SP],
            ArchRegs::X86_64(r) => r.gpr[x86_64::RSP],
        }
    }

    /// Program counter
    #[inline]
    pub fn pc(&self) -> u64 {
        match self {
            ArchRegs::AArch64(r) => r.pc,
            ArchRegs::PowerPc64(r) => r.nip,
            ArchRegs::X86_64(r) => r.rip,
        }
    }

    /// Frame pointer; PowerPC64 has none and reports the back chain base (r1)
    #[inline]
    pub fn fp(&self) -> u64 {
        match self {
            ArchRegs::AArch64(r) => r.x[aarch64::FP],
            ArchRegs::PowerPc64(r) => r.gpr[powerpc64::SP],
            ArchRegs::X86_64(r) => r.gpr[x86_64::RBP],
        }
    }

    /// Thread pointer as the ISA's ABI defines it
    #[inline]
    pub fn thread_pointer(&self) -> u64 {
        match self {
            ArchRegs::AArch64(r) => r.tpidr,
            ArchRegs::PowerPc64(r) => r.gpr[powerpc64::TP],
            ArchRegs::X86_64(r) => r.fs_base,
        }
    }

    pub fn as_x86_64(&self) -> Option<&X86_64Regs> {
        match self {
            ArchRegs::X86_64(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_aarch64(&self) -> Option<&AArch64Regs> {
        match self {
            ArchRegs::AArch64(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_powerpc64(&self) -> Option<&PowerPc64Regs> {
        match self {
            ArchRegs::PowerPc64(r) => Some(r),
            _ => None,
        }
    }
}

impl From<X86_64Regs> for ArchRegs {
    fn from(r: X86_64Regs) -> Self {
        ArchRegs::X86_64(r)
    }
}

impl From<AArch64Regs> for ArchRegs {
    fn from(r: AArch64Regs) -> Self {
        ArchRegs::AArch64(r)
    }
}

impl From<PowerPc64Regs> for ArchRegs {
    fn from(r: PowerPc64Regs) -> Self {
        ArchRegs::PowerPc64(r)
    }
}
