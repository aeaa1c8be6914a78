//! Architecture state translator
//!
//! Lifts a native register file into `CapturedContext` (`extract`) and
//! lowers a `CapturedContext` into a native register file (`install`).
//! Dispatch is a closed match over `Arch`; each ISA's calling convention
//! lives in its own module.
//!
//! Both directions are pure: the stack rewriter decides where the leaf
//! (migration-shim) frame sits and hands the translator its placement and
//! the contents of its save area. Neutral slots the destination has no
//! register for are returned as save-area words and written into the shim
//! frame, so nothing is ever dropped.

pub mod aarch64;
pub mod powerpc64;
pub mod x86_64;

use xmig_core::constants::{CALLEE_SAVED_FPRS, CALLEE_SAVED_GPRS, CALLEE_SAVED_VRS};
use xmig_core::{Arch, ArchRegs, CapturedContext, FpExceptions, ProgramImage, TranslateError};

/// Which neutral slots an ISA parks in the shim frame
///
/// Words are laid out as: GPR slots `gprs_from..`, FP slots `fprs_from..`,
/// vector slots `vrs_from..` (low word then high word), then one misc word
/// when `misc` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveArea {
    pub gprs_from: usize,
    pub fprs_from: usize,
    pub vrs_from: usize,
    pub misc: bool,
}

/// Misc word: condition fields CR2-CR4 in bits 0-11, summary overflow in
/// bit 12, sticky saturation in bit 13
const MISC_SO: u64 = 1 << 12;
const MISC_SAT: u64 = 1 << 13;

impl SaveArea {
    pub const NONE: SaveArea = SaveArea {
        gprs_from: CALLEE_SAVED_GPRS,
        fprs_from: CALLEE_SAVED_FPRS,
        vrs_from: CALLEE_SAVED_VRS,
        misc: false,
    };

    /// Number of 64-bit words
    pub const fn words(&self) -> usize {
        (CALLEE_SAVED_GPRS - self.gprs_from)
            + (CALLEE_SAVED_FPRS - self.fprs_from)
            + 2 * (CALLEE_SAVED_VRS - self.vrs_from)
            + self.misc as usize
    }

    /// Collect the slots this ISA has no register for
    pub fn pack(&self, ctx: &CapturedContext, saturation: bool) -> Vec<u64> {
        let mut words = Vec::with_capacity(self.words());
        words.extend_from_slice(&ctx.gprs[self.gprs_from..]);
        words.extend_from_slice(&ctx.fprs[self.fprs_from..]);
        for v in &ctx.vrs[self.vrs_from..] {
            words.push(*v as u64);
            words.push((*v >> 64) as u64);
        }
        if self.misc {
            let mut misc = 0u64;
            for (i, field) in ctx.cond_fields.iter().enumerate() {
                misc |= ((*field & 0xF) as u64) << (4 * i);
            }
            if ctx.flags.summary_overflow {
                misc |= MISC_SO;
            }
            if saturation && ctx.fenv.sticky.contains(FpExceptions::SATURATION) {
                misc |= MISC_SAT;
            }
            words.push(misc);
        }
        words
    }

    /// Restore parked slots into `ctx`
    ///
    /// `words` must be `self.words()` long; the stack walker guarantees it.
    pub fn unpack(&self, ctx: &mut CapturedContext, words: &[u64], saturation: bool) {
        debug_assert_eq!(words.len(), self.words());
        let mut it = words.iter().copied();
        for slot in &mut ctx.gprs[self.gprs_from..] {
            *slot = it.next().unwrap_or(0);
        }
        for slot in &mut ctx.fprs[self.fprs_from..] {
            *slot = it.next().unwrap_or(0);
        }
        for slot in &mut ctx.vrs[self.vrs_from..] {
            let lo = it.next().unwrap_or(0) as u128;
            let hi = it.next().unwrap_or(0) as u128;
            *slot = lo | (hi << 64);
        }
        if self.misc {
            let misc = it.next().unwrap_or(0);
            for (i, field) in ctx.cond_fields.iter_mut().enumerate() {
                *field = ((misc >> (4 * i)) & 0xF) as u8;
            }
            ctx.flags.summary_overflow = misc & MISC_SO != 0;
            if saturation {
                ctx.fenv
                    .sticky
                    .set(FpExceptions::SATURATION, misc & MISC_SAT != 0);
            }
        }
    }
}

/// Leaf frame as found by the stack walker
#[derive(Debug, Clone, Copy)]
pub struct LeafFrame<'a> {
    pub sp: u64,
    pub fp: u64,
    /// Native address the shim returns to
    pub return_address: u64,
    pub save: &'a [u64],
}

/// Where the stack rewriter placed the destination leaf frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeafPlacement {
    pub sp: u64,
    pub fp: u64,
    /// Native destination address the shim returns to
    pub return_address: u64,
}

/// Destination registers plus the shim save-area contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installed {
    pub regs: ArchRegs,
    pub save: Vec<u64>,
}

/// Shim save area of `arch`
pub const fn save_area(arch: Arch) -> SaveArea {
    match arch {
        Arch::AArch64 => aarch64::SAVE_AREA,
        Arch::PowerPc64 => powerpc64::SAVE_AREA,
        Arch::X86_64 => x86_64::SAVE_AREA,
    }
}

/// Native registers to neutral form
pub fn extract(
    regs: &ArchRegs,
    leaf: &LeafFrame<'_>,
    program: &ProgramImage,
) -> Result<CapturedContext, TranslateError> {
    match regs {
        ArchRegs::AArch64(r) => aarch64::extract(r, leaf, program),
        ArchRegs::PowerPc64(r) => powerpc64::extract(r, leaf, program),
        ArchRegs::X86_64(r) => x86_64::extract(r, leaf, program),
    }
}

/// Neutral form to native registers of `dest`
pub fn install(
    dest: Arch,
    ctx: &CapturedContext,
    at: &LeafPlacement,
    program: &ProgramImage,
) -> Result<Installed, TranslateError> {
    match dest {
        Arch::AArch64 => aarch64::install(ctx, at, program),
        Arch::PowerPc64 => powerpc64::install(ctx, at, program),
        Arch::X86_64 => x86_64::install(ctx, at, program),
    }
}

/// Neutral pc and return address of a leaf
pub(crate) fn leaf_sites(
    arch: Arch,
    pc: u64,
    leaf: &LeafFrame<'_>,
    program: &ProgramImage,
    ctx: &mut CapturedContext,
) -> Result<(), TranslateError> {
    ctx.pc = program.site_at(arch, pc)?;
    ctx.return_address = program.site_at(arch, leaf.return_address)?;
    ctx.sp = leaf.sp;
    ctx.fp = leaf.fp;
    Ok(())
}

/// Reject a flush setting that applies to inputs and outputs separately
/// on ISAs that only have one switch for both
pub(crate) fn require_symmetric_flush(
    arch: Arch,
    ctx: &CapturedContext,
) -> Result<bool, TranslateError> {
    if ctx.fenv.flush_inputs != ctx.fenv.flush_outputs {
        return Err(TranslateError::UnrepresentableFpMode {
            arch,
            what: "denormal flush for inputs and outputs set separately",
        });
    }
    Ok(ctx.fenv.flush_outputs)
}

#[cfg(test)]
pub(crate) mod test_support {
    use xmig_core::{CapturedContext, FpEnv, FpExceptions, ProgramImage, RoundingMode, SiteId};
    use xmig_core::{Arch, CondFlags};

    /// Program with one function and one call site
    pub fn program() -> (ProgramImage, SiteId) {
        let mut b = ProgramImage::builder();
        let f = b.function("work", 1);
        let site = b.call_site(f);
        (b.build().unwrap(), site)
    }

    /// Context with every neutral slot holding a distinct value
    pub fn busy_context(source: Arch, site: SiteId) -> CapturedContext {
        let mut ctx = CapturedContext::new(source);
        ctx.pc = SiteId::SHIM_RESUME;
        ctx.return_address = site;
        ctx.tls = 0x7f00_0000_1000;
        for (i, a) in ctx.args.iter_mut().enumerate() {
            *a = 0xA000 + i as u64;
        }
        for (i, g) in ctx.gprs.iter_mut().enumerate() {
            *g = 0x1000 + i as u64;
        }
        for (i, f) in ctx.fprs.iter_mut().enumerate() {
            *f = (1.5f64 + i as f64).to_bits();
        }
        for (i, v) in ctx.vrs.iter_mut().enumerate() {
            *v = (0xDEAD_0000u128 + i as u128) << 64 | (0xBEEF + i as u128);
        }
        ctx.cond_fields = [0b1000, 0b0010, 0b0101];
        ctx.flags = CondFlags {
            negative: true,
            zero: false,
            carry: true,
            overflow: false,
            summary_overflow: true,
        };
        ctx.fenv = FpEnv {
            rounding: RoundingMode::Up,
            flush_inputs: true,
            flush_outputs: true,
            default_nan: false,
            sticky: FpExceptions::INEXACT | FpExceptions::OVERFLOW,
            traps: FpExceptions::DIV_BY_ZERO,
        };
        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_save_area_sizes() {
        assert_eq!(save_area(Arch::X86_64).words(), 13 + 18 + 24 + 1);
        assert_eq!(save_area(Arch::AArch64).words(), 8 + 10 + 24 + 1);
        assert_eq!(save_area(Arch::PowerPc64).words(), 0);
        assert_eq!(SaveArea::NONE.words(), 0);
    }

    #[test]
    fn test_pack_unpack() {
        let (_, site) = program();
        let ctx = busy_context(Arch::PowerPc64, site);
        let area = save_area(Arch::X86_64);
        let words = area.pack(&ctx, true);
        assert_eq!(words.len(), area.words());

        let mut restored = CapturedContext::new(Arch::X86_64);
        area.unpack(&mut restored, &words, true);
        assert_eq!(restored.gprs[5..], ctx.gprs[5..]);
        assert_eq!(restored.fprs, ctx.fprs);
        assert_eq!(restored.vrs, ctx.vrs);
        assert_eq!(restored.cond_fields, ctx.cond_fields);
        assert!(restored.flags.summary_overflow);
    }

    /// Every ISA pair round-trips through the neutral form
    #[test]
    fn test_install_extract_all_pairs() {
        let (program, site) = program();
        for src in Arch::ALL {
            for dst in Arch::ALL {
                let ctx = busy_context(src, site);
                let at = LeafPlacement {
                    sp: 0x7000_0000_f000,
                    fp: 0x7000_0000_f010,
                    return_address: program.site_addr(site, dst).unwrap(),
                };
                let installed = install(dst, &ctx, &at, &program).unwrap();
                assert_eq!(installed.regs.arch(), dst);
                assert_eq!(installed.save.len(), save_area(dst).words());
                let leaf = LeafFrame {
                    sp: at.sp,
                    fp: at.fp,
                    return_address: at.return_address,
                    save: &installed.save,
                };
                let back = extract(&installed.regs, &leaf, &program).unwrap();
                assert_eq!(back.source, dst);
                assert!(back.same_state(&ctx), "{} -> {}: {:?}", src, dst, back);
            }
        }
    }
}
