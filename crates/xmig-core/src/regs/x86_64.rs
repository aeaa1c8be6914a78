//! x86-64 (System V AMD64) register file

/// General-purpose register indices into `X86_64Regs::gpr`
pub const RAX: usize = 0;
pub const RBX: usize = 1;
pub const RCX: usize = 2;
pub const RDX: usize = 3;
pub const RSI: usize = 4;
pub const RDI: usize = 5;
pub const RBP: usize = 6;
pub const RSP: usize = 7;
pub const R8: usize = 8;
pub const R9: usize = 9;
pub const R10: usize = 10;
pub const R11: usize = 11;
pub const R12: usize = 12;
pub const R13: usize = 13;
pub const R14: usize = 14;
pub const R15: usize = 15;

/// RFLAGS bits
pub mod rflags {
    pub const CF: u64 = 1 << 0;
    /// Always reads as one
    pub const RESERVED1: u64 = 1 << 1;
    pub const PF: u64 = 1 << 2;
    pub const AF: u64 = 1 << 4;
    pub const ZF: u64 = 1 << 6;
    pub const SF: u64 = 1 << 7;
    pub const TF: u64 = 1 << 8;
    pub const IF: u64 = 1 << 9;
    pub const DF: u64 = 1 << 10;
    pub const OF: u64 = 1 << 11;

    /// User-mode reset value
    pub const DEFAULT: u64 = RESERVED1 | IF;
}

/// MXCSR bits
pub mod mxcsr {
    // sticky exception flags
    pub const IE: u32 = 1 << 0;
    pub const DE: u32 = 1 << 1;
    pub const ZE: u32 = 1 << 2;
    pub const OE: u32 = 1 << 3;
    pub const UE: u32 = 1 << 4;
    pub const PE: u32 = 1 << 5;
    /// Denormals are zero (flush inputs)
    pub const DAZ: u32 = 1 << 6;
    // exception masks; a clear mask bit means the trap is enabled
    pub const IM: u32 = 1 << 7;
    pub const DM: u32 = 1 << 8;
    pub const ZM: u32 = 1 << 9;
    pub const OM: u32 = 1 << 10;
    pub const UM: u32 = 1 << 11;
    pub const PM: u32 = 1 << 12;
    pub const RC_SHIFT: u32 = 13;
    pub const RC_MASK: u32 = 0b11 << RC_SHIFT;
    pub const RC_NEAREST: u32 = 0b00;
    pub const RC_DOWN: u32 = 0b01;
    pub const RC_UP: u32 = 0b10;
    pub const RC_ZERO: u32 = 0b11;
    /// Flush to zero (flush outputs)
    pub const FTZ: u32 = 1 << 15;

    pub const FLAGS_MASK: u32 = IE | DE | ZE | OE | UE | PE;
    pub const MASKS_MASK: u32 = IM | DM | ZM | OM | UM | PM;

    /// Power-on value: all exceptions masked, round to nearest
    pub const DEFAULT: u32 = 0x1F80;
}

/// x86-64 register file
///
/// Layout:
/// ```text
/// 0x00: gpr[16]   rax rbx rcx rdx rsi rdi rbp rsp r8-r15
/// 0x80: rip
/// 0x88: rflags
/// 0x90: fs_base
/// 0x98: mxcsr (u32) + pad
/// 0xA0: xmm[16]   (128-bit each)
/// ```
#[repr(C)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct X86_64Regs {
    pub gpr: [u64; 16],
    pub rip: u64,
    pub rflags: u64,
    pub fs_base: u64,
    pub mxcsr: u32,
    _pad: u32,
    pub xmm: [u128; 16],
}

impl Default for X86_64Regs {
    fn default() -> Self {
        Self {
            gpr: [0; 16],
            rip: 0,
            rflags: rflags::DEFAULT,
            fs_base: 0,
            mxcsr: mxcsr::DEFAULT,
            _pad: 0,
            xmm: [0; 16],
        }
    }
}
