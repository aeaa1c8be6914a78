//! PowerPC64 ELFv2 convention
//!
//! The widest of the three: every neutral slot has a register, so the
//! shim save area is empty. The TOC pointer (r2) is not part of the
//! neutral state; it is regenerated from the program image on install.

use xmig_core::regs::powerpc64::{self as reg, cr, fpscr, vscr, xer, TP_OFFSET};
use xmig_core::{
    Arch, ArchRegs, CapturedContext, CondFlags, FpEnv, FpExceptions, PowerPc64Regs, ProgramImage,
    RoundingMode, TranslateError,
};

use super::{leaf_sites, require_symmetric_flush, Installed, LeafFrame, LeafPlacement, SaveArea};

const ARCH: Arch = Arch::PowerPc64;

/// r3-r8 carry arguments
const FIRST_ARG: usize = 3;
/// r14-r31 hold neutral GPR slots 0-17
const FIRST_CALLEE_SAVED: usize = 14;
/// f14-f31 hold neutral FP slots 0-17
const FIRST_CALLEE_SAVED_FP: usize = 14;
/// v20-v31 hold neutral vector slots 0-11
const FIRST_CALLEE_SAVED_VR: usize = 20;
/// CR2-CR4 are the callee-saved condition fields
const FIRST_CALLEE_SAVED_CR: usize = 2;

pub const SAVE_AREA: SaveArea = SaveArea::NONE;

/// (neutral exception, FPSCR sticky bit, FPSCR enable bit)
const EXCEPTIONS: [(FpExceptions, u64, u64); 5] = [
    (FpExceptions::INVALID, fpscr::VX, fpscr::VE),
    (FpExceptions::DIV_BY_ZERO, fpscr::ZX, fpscr::ZE),
    (FpExceptions::OVERFLOW, fpscr::OX, fpscr::OE),
    (FpExceptions::UNDERFLOW, fpscr::UX, fpscr::UE),
    (FpExceptions::INEXACT, fpscr::XX, fpscr::XE),
];

/// Decode FPSCR/VSCR into the neutral FP environment
pub fn decode_fp(fpscr_value: u64, vscr_value: u32) -> FpEnv {
    let rounding = match fpscr_value & fpscr::RN_MASK {
        fpscr::RN_NEAREST => RoundingMode::Nearest,
        fpscr::RN_ZERO => RoundingMode::TowardZero,
        fpscr::RN_UP => RoundingMode::Up,
        _ => RoundingMode::Down,
    };
    let flush = fpscr_value & fpscr::NI != 0;
    let mut env = FpEnv {
        rounding,
        flush_inputs: flush,
        flush_outputs: flush,
        default_nan: false,
        ..FpEnv::default()
    };
    for (exc, sticky, enable) in EXCEPTIONS {
        env.sticky.set(exc, fpscr_value & sticky != 0);
        env.traps.set(exc, fpscr_value & enable != 0);
    }
    env.sticky
        .set(FpExceptions::SATURATION, vscr_value & vscr::SAT != 0);
    env
}

/// Encode the neutral FP environment as (FPSCR, VSCR)
pub fn encode_fp(ctx: &CapturedContext) -> Result<(u64, u32), TranslateError> {
    let flush = require_symmetric_flush(ARCH, ctx)?;
    let env = &ctx.fenv;
    if env.default_nan {
        return Err(TranslateError::UnrepresentableFpMode {
            arch: ARCH,
            what: "default NaN",
        });
    }
    if env.sticky.contains(FpExceptions::DENORMAL) || env.traps.contains(FpExceptions::DENORMAL) {
        return Err(TranslateError::UnrepresentableFpMode {
            arch: ARCH,
            what: "denormal-operand exception",
        });
    }
    let mut value = match env.rounding {
        RoundingMode::Nearest => fpscr::RN_NEAREST,
        RoundingMode::TowardZero => fpscr::RN_ZERO,
        RoundingMode::Up => fpscr::RN_UP,
        RoundingMode::Down => fpscr::RN_DOWN,
    };
    let mut vector = 0u32;
    if flush {
        value |= fpscr::NI;
        vector |= vscr::NJ;
    }
    for (exc, sticky, enable) in EXCEPTIONS {
        if env.sticky.contains(exc) {
            value |= sticky;
        }
        if env.traps.contains(exc) {
            value |= enable;
        }
    }
    // VX summarises the individual invalid-operation causes
    if env.sticky.contains(FpExceptions::INVALID) {
        value |= fpscr::VXSOFT;
    }
    if env.sticky.intersects(FpExceptions::IEEE) {
        value |= fpscr::FX;
    }
    if (env.sticky & env.traps).intersects(FpExceptions::IEEE) {
        value |= fpscr::FEX;
    }
    if env.sticky.contains(FpExceptions::SATURATION) {
        vector |= vscr::SAT;
    }
    Ok((value, vector))
}

/// Decode CR0 and XER into neutral flags
pub fn decode_flags(cr_value: u32, xer_value: u64) -> CondFlags {
    let cr0 = cr::field(cr_value, 0) as u32;
    CondFlags {
        negative: cr0 & cr::LT != 0,
        zero: cr0 & cr::EQ != 0,
        carry: xer_value & xer::CA != 0,
        overflow: xer_value & xer::OV != 0,
        summary_overflow: xer_value & xer::SO != 0,
    }
}

/// CR0 as a signed compare against zero would set it, and XER
pub fn encode_flags(flags: &CondFlags) -> (u8, u64) {
    let mut cr0 = 0u32;
    if flags.negative {
        cr0 |= cr::LT;
    } else if !flags.zero {
        cr0 |= cr::GT;
    }
    if flags.zero {
        cr0 |= cr::EQ;
    }
    let mut xer_value = 0;
    if flags.summary_overflow {
        cr0 |= cr::SO;
        xer_value |= xer::SO;
    }
    if flags.overflow {
        xer_value |= xer::OV;
    }
    if flags.carry {
        xer_value |= xer::CA;
    }
    (cr0 as u8, xer_value)
}

pub fn extract(
    regs: &PowerPc64Regs,
    leaf: &LeafFrame<'_>,
    program: &ProgramImage,
) -> Result<CapturedContext, TranslateError> {
    let mut ctx = CapturedContext::new(ARCH);
    leaf_sites(ARCH, regs.nip, leaf, program, &mut ctx)?;

    ctx.tls = match regs.gpr[reg::TP] {
        0 => 0,
        tp if tp < TP_OFFSET => {
            return Err(TranslateError::InvalidThreadPointer { arch: ARCH, value: tp })
        }
        tp => tp - TP_OFFSET,
    };

    let n = ctx.args.len();
    ctx.args.copy_from_slice(&regs.gpr[FIRST_ARG..FIRST_ARG + n]);
    let n = ctx.gprs.len();
    ctx.gprs
        .copy_from_slice(&regs.gpr[FIRST_CALLEE_SAVED..FIRST_CALLEE_SAVED + n]);
    let n = ctx.fprs.len();
    ctx.fprs
        .copy_from_slice(&regs.fpr[FIRST_CALLEE_SAVED_FP..FIRST_CALLEE_SAVED_FP + n]);
    let n = ctx.vrs.len();
    ctx.vrs
        .copy_from_slice(&regs.vr[FIRST_CALLEE_SAVED_VR..FIRST_CALLEE_SAVED_VR + n]);
    for (i, field) in ctx.cond_fields.iter_mut().enumerate() {
        *field = cr::field(regs.cr, FIRST_CALLEE_SAVED_CR + i);
    }
    ctx.flags = decode_flags(regs.cr, regs.xer);
    ctx.fenv = decode_fp(regs.fpscr, regs.vscr);
    Ok(ctx)
}

pub fn install(
    ctx: &CapturedContext,
    at: &LeafPlacement,
    program: &ProgramImage,
) -> Result<Installed, TranslateError> {
    let mut regs = PowerPc64Regs::default();
    regs.nip = program.site_addr(ctx.pc, ARCH)?;
    regs.lr = at.return_address;
    regs.gpr[reg::SP] = at.sp;
    regs.gpr[reg::TOC] = program.toc();
    regs.gpr[reg::TP] = match ctx.tls {
        0 => 0,
        tls => tls
            .checked_add(TP_OFFSET)
            .ok_or(TranslateError::InvalidThreadPointer { arch: ARCH, value: tls })?,
    };

    let n = ctx.args.len();
    regs.gpr[FIRST_ARG..FIRST_ARG + n].copy_from_slice(&ctx.args);
    let n = ctx.gprs.len();
    regs.gpr[FIRST_CALLEE_SAVED..FIRST_CALLEE_SAVED + n].copy_from_slice(&ctx.gprs);
    let n = ctx.fprs.len();
    regs.fpr[FIRST_CALLEE_SAVED_FP..FIRST_CALLEE_SAVED_FP + n].copy_from_slice(&ctx.fprs);
    let n = ctx.vrs.len();
    regs.vr[FIRST_CALLEE_SAVED_VR..FIRST_CALLEE_SAVED_VR + n].copy_from_slice(&ctx.vrs);

    let (cr0, xer_value) = encode_flags(&ctx.flags);
    let mut cr_value = cr::with_field(0, 0, cr0);
    for (i, field) in ctx.cond_fields.iter().enumerate() {
        cr_value = cr::with_field(cr_value, FIRST_CALLEE_SAVED_CR + i, *field);
    }
    regs.cr = cr_value;
    regs.xer = xer_value;
    let (fpscr_value, vscr_value) = encode_fp(ctx)?;
    regs.fpscr = fpscr_value;
    regs.vscr = vscr_value;

    Ok(Installed {
        regs: ArchRegs::PowerPc64(regs),
        save: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn test_flags_roundtrip() {
        for bits in 0..32u64 {
            let flags = CondFlags::from_word(bits);
            // negative and zero together cannot come out of a compare
            if flags.negative && flags.zero {
                continue;
            }
            let (cr0, xer_value) = encode_flags(&flags);
            let cr_value = cr::with_field(0, 0, cr0);
            assert_eq!(decode_flags(cr_value, xer_value), flags);
        }
    }

    #[test]
    fn test_gt_derived() {
        let (cr0, _) = encode_flags(&CondFlags::default());
        assert_eq!(cr0 as u32, cr::GT);
    }

    #[test]
    fn test_fpscr_roundtrip() {
        let mut ctx = CapturedContext::new(Arch::X86_64);
        ctx.fenv.rounding = RoundingMode::Down;
        ctx.fenv.sticky = FpExceptions::INVALID | FpExceptions::SATURATION;
        ctx.fenv.traps = FpExceptions::INVALID;
        let (value, vector) = encode_fp(&ctx).unwrap();
        assert_ne!(value & fpscr::FX, 0);
        assert_ne!(value & fpscr::FEX, 0);
        assert_ne!(vector & vscr::SAT, 0);
        assert_eq!(decode_fp(value, vector), ctx.fenv);
    }

    #[test]
    fn test_denormal_is_lossy() {
        let mut ctx = CapturedContext::new(Arch::X86_64);
        ctx.fenv.sticky = FpExceptions::DENORMAL;
        assert!(matches!(
            encode_fp(&ctx),
            Err(TranslateError::UnrepresentableFpMode { arch: Arch::PowerPc64, .. })
        ));
    }

    #[test]
    fn test_toc_regenerated() {
        let (program, site) = program();
        let ctx = busy_context(Arch::X86_64, site);
        let at = LeafPlacement {
            sp: 0x3000,
            fp: 0x3000,
            return_address: program.site_addr(site, ARCH).unwrap(),
        };
        let installed = install(&ctx, &at, &program).unwrap();
        let regs = installed.regs.as_powerpc64().unwrap();
        assert_eq!(regs.gpr[reg::TOC], program.toc());
        assert_eq!(regs.gpr[reg::TP], ctx.tls + TP_OFFSET);
        assert_eq!(regs.gpr[3], ctx.args[0]);
        assert_eq!(regs.gpr[31], ctx.gprs[17]);
        assert_eq!(regs.fpr[14], ctx.fprs[0]);
        assert_eq!(regs.vr[31], ctx.vrs[11]);
        assert_eq!(cr::field(regs.cr, 3), ctx.cond_fields[1]);
        assert!(installed.save.is_empty());
    }
}
