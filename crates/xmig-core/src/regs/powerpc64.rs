//! PowerPC64 (ELFv2) register file
//!
//! Bit numbers below count from the least significant bit of the 64-bit
//! register image (IBM documentation counts from the other end).

/// Stack pointer (r1)
pub const SP: usize = 1;
/// TOC pointer (r2)
pub const TOC: usize = 2;
/// Thread pointer (r13)
pub const TP: usize = 13;

/// Condition register fields (4 bits each, CR0 most significant)
pub mod cr {
    pub const LT: u32 = 0b1000;
    pub const GT: u32 = 0b0100;
    pub const EQ: u32 = 0b0010;
    pub const SO: u32 = 0b0001;

    /// Shift of condition field `n` (0-7) within CR
    #[inline]
    pub const fn field_shift(n: usize) -> u32 {
        (28 - 4 * n) as u32
    }

    #[inline]
    pub const fn field(cr: u32, n: usize) -> u8 {
        ((cr >> field_shift(n)) & 0xF) as u8
    }

    #[inline]
    pub const fn with_field(cr: u32, n: usize, value: u8) -> u32 {
        let shift = field_shift(n);
        (cr & !(0xF << shift)) | (((value & 0xF) as u32) << shift)
    }
}

/// XER bits
pub mod xer {
    pub const SO: u64 = 1 << 31;
    pub const OV: u64 = 1 << 30;
    pub const CA: u64 = 1 << 29;
}

/// FPSCR bits
pub mod fpscr {
    pub const RN_MASK: u64 = 0b11;
    pub const RN_NEAREST: u64 = 0;
    pub const RN_ZERO: u64 = 1;
    pub const RN_UP: u64 = 2;
    pub const RN_DOWN: u64 = 3;
    /// Non-IEEE mode (denormal results flushed)
    pub const NI: u64 = 1 << 2;
    // trap enables
    pub const XE: u64 = 1 << 3;
    pub const ZE: u64 = 1 << 4;
    pub const UE: u64 = 1 << 5;
    pub const OE: u64 = 1 << 6;
    pub const VE: u64 = 1 << 7;
    /// Software-defined invalid operation
    pub const VXSOFT: u64 = 1 << 10;
    // sticky exception summaries
    pub const XX: u64 = 1 << 25;
    pub const ZX: u64 = 1 << 26;
    pub const UX: u64 = 1 << 27;
    pub const OX: u64 = 1 << 28;
    pub const VX: u64 = 1 << 29;
    pub const FEX: u64 = 1 << 30;
    pub const FX: u64 = 1 << 31;
}

/// VSCR bits
pub mod vscr {
    /// Saturation
    pub const SAT: u32 = 1 << 0;
    /// Non-Java mode (denormals flushed in vector unit)
    pub const NJ: u32 = 1 << 16;
}

/// Bias between the ELFv2 thread pointer and the TLS block start
pub const TP_OFFSET: u64 = 0x7000;

/// PowerPC64 register file
#[repr(C)]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PowerPc64Regs {
    pub gpr: [u64; 32],
    pub nip: u64,
    pub lr: u64,
    pub ctr: u64,
    pub xer: u64,
    pub fpscr: u64,
    pub cr: u32,
    pub vscr: u32,
    pub fpr: [u64; 32],
    pub vr: [u128; 32],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cr_fields() {
        let cr = cr::with_field(0, 0, 0b1010);
        assert_eq!(cr, 0xA000_0000);
        assert_eq!(cr::field(cr, 0), 0b1010);
        let cr = cr::with_field(cr, 2, 0b0011);
        assert_eq!(cr::field(cr, 2), 0b0011);
        assert_eq!(cr::field(cr, 0), 0b1010);
        assert_eq!(cr::field_shift(7), 0);
        assert_eq!(cr::field_shift(4), 12);
    }
}
