//! Architecture-neutral execution state
//!
//! `CapturedContext` is the intermediate form every migration passes
//! through: native registers of the source ISA are lifted into it by role
//! (argument, callee-saved, flags, FP environment) and lowered from it into
//! the destination ISA. It is a superset of what any supported ISA can hold
//! live at a call boundary, so lifting never loses information; lowering
//! either finds a register for every slot or parks the value in the
//! migration-shim frame.

use core::fmt;

use crate::arch::Arch;
use crate::constants::{
    ARG_WORDS, CALLEE_SAVED_COND_FIELDS, CALLEE_SAVED_FPRS, CALLEE_SAVED_GPRS, CALLEE_SAVED_VRS,
};
use crate::frame::NeutralFrame;
use crate::id::{FunctionId, SiteId};

/// IEEE rounding direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RoundingMode {
    #[default]
    Nearest,
    TowardZero,
    Up,
    Down,
}

/// Set of floating-point exception conditions
///
/// Used both for sticky status flags and for trap enables.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FpExceptions(u8);

impl FpExceptions {
    pub const NONE: FpExceptions = FpExceptions(0);
    pub const INVALID: FpExceptions = FpExceptions(1 << 0);
    pub const DIV_BY_ZERO: FpExceptions = FpExceptions(1 << 1);
    pub const OVERFLOW: FpExceptions = FpExceptions(1 << 2);
    pub const UNDERFLOW: FpExceptions = FpExceptions(1 << 3);
    pub const INEXACT: FpExceptions = FpExceptions(1 << 4);
    /// Denormal operand (x86 DE, AArch64 IDC)
    pub const DENORMAL: FpExceptions = FpExceptions(1 << 5);
    /// Vector saturation (AArch64 QC, PowerPC VSCR[SAT])
    pub const SATURATION: FpExceptions = FpExceptions(1 << 6);

    /// The five IEEE 754 exceptions
    pub const IEEE: FpExceptions = FpExceptions(0b1_1111);

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn from_bits_truncate(bits: u8) -> Self {
        FpExceptions(bits & 0x7F)
    }

    #[inline]
    pub const fn contains(self, other: FpExceptions) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn intersects(self, other: FpExceptions) -> bool {
        self.0 & other.0 != 0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn insert(&mut self, other: FpExceptions) {
        self.0 |= other.0;
    }

    #[inline]
    pub fn remove(&mut self, other: FpExceptions) {
        self.0 &= !other.0;
    }

    #[inline]
    pub fn set(&mut self, other: FpExceptions, on: bool) {
        if on {
            self.insert(other);
        } else {
            self.remove(other);
        }
    }
}

impl core::ops::BitOr for FpExceptions {
    type Output = FpExceptions;

    fn bitor(self, rhs: FpExceptions) -> FpExceptions {
        FpExceptions(self.0 | rhs.0)
    }
}

impl core::ops::BitAnd for FpExceptions {
    type Output = FpExceptions;

    fn bitand(self, rhs: FpExceptions) -> FpExceptions {
        FpExceptions(self.0 & rhs.0)
    }
}

impl fmt::Debug for FpExceptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [&str; 7] = [
            "INVALID",
            "DIV_BY_ZERO",
            "OVERFLOW",
            "UNDERFLOW",
            "INEXACT",
            "DENORMAL",
            "SATURATION",
        ];
        if self.is_empty() {
            return write!(f, "FpExceptions(NONE)");
        }
        write!(f, "FpExceptions(")?;
        let mut first = true;
        for (bit, name) in NAMES.iter().enumerate() {
            if self.0 & (1 << bit) != 0 {
                if !first {
                    write!(f, " | ")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        write!(f, ")")
    }
}

/// Floating-point environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FpEnv {
    pub rounding: RoundingMode,
    /// Denormal inputs read as zero
    pub flush_inputs: bool,
    /// Denormal results written as zero
    pub flush_outputs: bool,
    /// NaN results replaced by the default NaN
    pub default_nan: bool,
    pub sticky: FpExceptions,
    pub traps: FpExceptions,
}

/// Integer condition flags
///
/// `summary_overflow` is PowerPC's XER[SO]; the other ISAs have no place
/// for it other than the shim save area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CondFlags {
    pub negative: bool,
    pub zero: bool,
    pub carry: bool,
    pub overflow: bool,
    pub summary_overflow: bool,
}

impl CondFlags {
    /// Pack into the shim save-area word (bit 0 = N ... bit 4 = SO)
    pub const fn to_word(self) -> u64 {
        (self.negative as u64)
            | (self.zero as u64) << 1
            | (self.carry as u64) << 2
            | (self.overflow as u64) << 3
            | (self.summary_overflow as u64) << 4
    }

    pub const fn from_word(w: u64) -> Self {
        CondFlags {
            negative: w & 1 != 0,
            zero: w & 2 != 0,
            carry: w & 4 != 0,
            overflow: w & 8 != 0,
            summary_overflow: w & 16 != 0,
        }
    }
}

/// Register state of a thread at a migration point, in neutral form
///
/// Code positions are logical sites; `sp`, `fp` and `tls` are addresses in
/// the shared address space and keep their meaning on every node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedContext {
    /// ISA the state was captured on
    pub source: Arch,
    pub pc: SiteId,
    pub return_address: SiteId,
    pub sp: u64,
    pub fp: u64,
    /// Start of the thread's TLS block (0 when the thread has none)
    pub tls: u64,
    /// Argument / return-value words, in ABI order
    pub args: [u64; ARG_WORDS],
    pub gprs: [u64; CALLEE_SAVED_GPRS],
    /// Callee-saved FP registers as raw IEEE double bit patterns
    pub fprs: [u64; CALLEE_SAVED_FPRS],
    pub vrs: [u128; CALLEE_SAVED_VRS],
    /// PowerPC CR2-CR4 semantics, one nibble each
    pub cond_fields: [u8; CALLEE_SAVED_COND_FIELDS],
    pub flags: CondFlags,
    pub fenv: FpEnv,
}

impl CapturedContext {
    /// All-zero context of a thread that has not executed yet
    pub fn new(source: Arch) -> Self {
        CapturedContext {
            source,
            pc: SiteId::SHIM_RESUME,
            return_address: SiteId::THREAD_EXIT,
            sp: 0,
            fp: 0,
            tls: 0,
            args: [0; ARG_WORDS],
            gprs: [0; CALLEE_SAVED_GPRS],
            fprs: [0; CALLEE_SAVED_FPRS],
            vrs: [0; CALLEE_SAVED_VRS],
            cond_fields: [0; CALLEE_SAVED_COND_FIELDS],
            flags: CondFlags::default(),
            fenv: FpEnv::default(),
        }
    }

    /// Architectural state only: everything except the source ISA and the
    /// stack addresses, which legitimately differ after a migration.
    pub fn same_state(&self, other: &CapturedContext) -> bool {
        self.pc == other.pc
            && self.return_address == other.return_address
            && self.tls == other.tls
            && self.args == other.args
            && self.gprs == other.gprs
            && self.fprs == other.fprs
            && self.vrs == other.vrs
            && self.cond_fields == other.cond_fields
            && self.flags == other.flags
            && self.fenv == other.fenv
    }
}

/// A whole suspended thread in neutral form: registers plus frame chain
///
/// `frames` is ordered outermost first. The innermost frame is the one
/// the migration point returns into, so its site always equals
/// `ctx.return_address`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeutralThread {
    pub ctx: CapturedContext,
    pub frames: Vec<NeutralFrame>,
}

impl NeutralThread {
    pub fn new(source: Arch) -> Self {
        NeutralThread {
            ctx: CapturedContext::new(source),
            frames: Vec::new(),
        }
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn innermost(&self) -> Option<&NeutralFrame> {
        self.frames.last()
    }

    /// Simulate a call: `function` becomes the innermost frame, suspended
    /// at `site`, holding `slots`.
    pub fn push_frame(&mut self, function: FunctionId, site: SiteId, slots: Vec<u64>) {
        self.frames.push(NeutralFrame {
            function,
            site,
            slots,
        });
        self.ctx.return_address = site;
    }

    /// Simulate a return from the innermost frame
    pub fn pop_frame(&mut self) -> Option<NeutralFrame> {
        let frame = self.frames.pop()?;
        self.ctx.return_address = self
            .frames
            .last()
            .map(|f| f.site)
            .unwrap_or(SiteId::THREAD_EXIT);
        Some(frame)
    }

    /// Whether the innermost frame and the return address agree
    pub fn is_consistent(&self) -> bool {
        let expected = self.innermost().map(|f| f.site).unwrap_or(SiteId::THREAD_EXIT);
        expected == self.ctx.return_address
    }

    /// Same thread state irrespective of the ISA or stack half it lives on
    pub fn same_state(&self, other: &NeutralThread) -> bool {
        self.ctx.same_state(&other.ctx) && self.frames == other.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fp_exceptions_ops() {
        let mut e = FpExceptions::INVALID | FpExceptions::INEXACT;
        assert!(e.contains(FpExceptions::INVALID));
        assert!(!e.contains(FpExceptions::OVERFLOW));
        assert!(e.intersects(FpExceptions::IEEE));
        e.set(FpExceptions::INVALID, false);
        assert_eq!(e, FpExceptions::INEXACT);
        e.remove(FpExceptions::INEXACT);
        assert!(e.is_empty());
        assert_eq!(FpExceptions::from_bits_truncate(0xFF).bits(), 0x7F);
    }

    #[test]
    fn test_fp_exceptions_debug() {
        let e = FpExceptions::DIV_BY_ZERO | FpExceptions::SATURATION;
        assert_eq!(format!("{:?}", e), "FpExceptions(DIV_BY_ZERO | SATURATION)");
        assert_eq!(format!("{:?}", FpExceptions::NONE), "FpExceptions(NONE)");
    }

    #[test]
    fn test_cond_flags_word() {
        let f = CondFlags {
            negative: true,
            zero: false,
            carry: true,
            overflow: false,
            summary_overflow: true,
        };
        assert_eq!(f.to_word(), 0b10101);
        assert_eq!(CondFlags::from_word(f.to_word()), f);
    }

    #[test]
    fn test_push_pop_frames() {
        let mut t = NeutralThread::new(Arch::X86_64);
        assert!(t.is_consistent());
        t.push_frame(FunctionId::new(0), SiteId::new(2), vec![1, 2]);
        t.push_frame(FunctionId::new(1), SiteId::new(3), vec![]);
        assert_eq!(t.ctx.return_address, SiteId::new(3));
        assert_eq!(t.depth(), 2);
        assert!(t.is_consistent());

        let popped = t.pop_frame().map(|f| f.site);
        assert_eq!(popped, Some(SiteId::new(3)));
        assert_eq!(t.ctx.return_address, SiteId::new(2));
        t.pop_frame();
        assert_eq!(t.ctx.return_address, SiteId::THREAD_EXIT);
        assert!(t.pop_frame().is_none());
    }

    #[test]
    fn test_same_state_ignores_location() {
        let mut a = CapturedContext::new(Arch::AArch64);
        a.gprs[3] = 9;
        let mut b = a.clone();
        b.source = Arch::PowerPc64;
        b.sp = 0xdead_0000;
        b.fp = 0xdead_0010;
        assert!(a.same_state(&b));
        b.args[0] = 1;
        assert!(!a.same_state(&b));
    }
}
