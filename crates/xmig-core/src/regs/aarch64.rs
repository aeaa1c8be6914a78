//! AArch64 (AAPCS64) register file

/// Frame pointer (x29)
pub const FP: usize = 29;
/// Link register (x30)
pub const LR: usize = 30;

/// NZCV bits
pub mod nzcv {
    pub const N: u64 = 1 << 31;
    pub const Z: u64 = 1 << 30;
    pub const C: u64 = 1 << 29;
    pub const V: u64 = 1 << 28;
}

/// FPSR cumulative exception bits
pub mod fpsr {
    pub const IOC: u64 = 1 << 0;
    pub const DZC: u64 = 1 << 1;
    pub const OFC: u64 = 1 << 2;
    pub const UFC: u64 = 1 << 3;
    pub const IXC: u64 = 1 << 4;
    pub const IDC: u64 = 1 << 7;
    /// Cumulative saturation (Advanced SIMD)
    pub const QC: u64 = 1 << 27;
}

/// FPCR control bits
pub mod fpcr {
    pub const IOE: u64 = 1 << 8;
    pub const DZE: u64 = 1 << 9;
    pub const OFE: u64 = 1 << 10;
    pub const UFE: u64 = 1 << 11;
    pub const IXE: u64 = 1 << 12;
    pub const IDE: u64 = 1 << 15;
    pub const RMODE_SHIFT: u64 = 22;
    pub const RMODE_MASK: u64 = 0b11 << RMODE_SHIFT;
    pub const RMODE_RN: u64 = 0;
    pub const RMODE_RP: u64 = 1;
    pub const RMODE_RM: u64 = 2;
    pub const RMODE_RZ: u64 = 3;
    /// Flush to zero (inputs and outputs)
    pub const FZ: u64 = 1 << 24;
    /// Default NaN
    pub const DN: u64 = 1 << 25;
    /// Alternative half-precision
    pub const AHP: u64 = 1 << 26;
}

/// AArch64 register file
///
/// `x[29]` is the frame pointer, `x[30]` the link register. Only the low
/// 64 bits of v8-v15 are callee-saved; the full vectors are kept anyway.
#[repr(C)]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AArch64Regs {
    pub x: [u64; 31],
    pub sp: u64,
    pub pc: u64,
    pub nzcv: u64,
    pub fpsr: u64,
    pub fpcr: u64,
    /// tpidr_el0
    pub tpidr: u64,
    _pad: u64,
    pub v: [u128; 32],
}
