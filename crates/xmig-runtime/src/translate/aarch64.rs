//! AArch64 AAPCS64 convention

use xmig_core::regs::aarch64::{self as reg, fpcr, fpsr, nzcv};
use xmig_core::{
    AArch64Regs, Arch, ArchRegs, CapturedContext, CondFlags, FpEnv, FpExceptions, ProgramImage,
    RoundingMode, TranslateError,
};

use super::{leaf_sites, require_symmetric_flush, Installed, LeafFrame, LeafPlacement, SaveArea};

const ARCH: Arch = Arch::AArch64;

/// x19-x28 hold neutral GPR slots 0-9
const FIRST_CALLEE_SAVED: usize = 19;
const CALLEE_SAVED_GPRS: usize = 10;

/// Low halves of v8-v15 (d8-d15) hold neutral FP slots 0-7
const FIRST_CALLEE_SAVED_FP: usize = 8;
const CALLEE_SAVED_FPRS: usize = 8;

/// TCB size between tpidr_el0 and the TLS block (variant I)
const TCB_SIZE: u64 = 16;

pub const SAVE_AREA: SaveArea = SaveArea {
    gprs_from: CALLEE_SAVED_GPRS,
    fprs_from: CALLEE_SAVED_FPRS,
    vrs_from: 0,
    misc: true,
};

/// (neutral exception, FPSR cumulative bit, FPCR enable bit)
const EXCEPTIONS: [(FpExceptions, u64, u64); 6] = [
    (FpExceptions::INVALID, fpsr::IOC, fpcr::IOE),
    (FpExceptions::DIV_BY_ZERO, fpsr::DZC, fpcr::DZE),
    (FpExceptions::OVERFLOW, fpsr::OFC, fpcr::OFE),
    (FpExceptions::UNDERFLOW, fpsr::UFC, fpcr::UFE),
    (FpExceptions::INEXACT, fpsr::IXC, fpcr::IXE),
    (FpExceptions::DENORMAL, fpsr::IDC, fpcr::IDE),
];

/// Decode FPCR/FPSR into the neutral FP environment
pub fn decode_fp(fpcr_value: u64, fpsr_value: u64) -> Result<FpEnv, TranslateError> {
    if fpcr_value & fpcr::AHP != 0 {
        return Err(TranslateError::UnrepresentableFpMode {
            arch: ARCH,
            what: "alternative half-precision",
        });
    }
    let rounding = match (fpcr_value & fpcr::RMODE_MASK) >> fpcr::RMODE_SHIFT {
        fpcr::RMODE_RN => RoundingMode::Nearest,
        fpcr::RMODE_RP => RoundingMode::Up,
        fpcr::RMODE_RM => RoundingMode::Down,
        _ => RoundingMode::TowardZero,
    };
    let flush = fpcr_value & fpcr::FZ != 0;
    let mut env = FpEnv {
        rounding,
        flush_inputs: flush,
        flush_outputs: flush,
        default_nan: fpcr_value & fpcr::DN != 0,
        ..FpEnv::default()
    };
    for (exc, status, enable) in EXCEPTIONS {
        env.sticky.set(exc, fpsr_value & status != 0);
        env.traps.set(exc, fpcr_value & enable != 0);
    }
    env.sticky
        .set(FpExceptions::SATURATION, fpsr_value & fpsr::QC != 0);
    Ok(env)
}

/// Encode the neutral FP environment as (FPCR, FPSR)
pub fn encode_fp(ctx: &CapturedContext) -> Result<(u64, u64), TranslateError> {
    let flush = require_symmetric_flush(ARCH, ctx)?;
    let env = &ctx.fenv;
    let rmode = match env.rounding {
        RoundingMode::Nearest => fpcr::RMODE_RN,
        RoundingMode::Up => fpcr::RMODE_RP,
        RoundingMode::Down => fpcr::RMODE_RM,
        RoundingMode::TowardZero => fpcr::RMODE_RZ,
    };
    let mut control = rmode << fpcr::RMODE_SHIFT;
    let mut status = 0;
    if flush {
        control |= fpcr::FZ;
    }
    if env.default_nan {
        control |= fpcr::DN;
    }
    for (exc, sticky, enable) in EXCEPTIONS {
        if env.sticky.contains(exc) {
            status |= sticky;
        }
        if env.traps.contains(exc) {
            control |= enable;
        }
    }
    if env.sticky.contains(FpExceptions::SATURATION) {
        status |= fpsr::QC;
    }
    Ok((control, status))
}

pub fn decode_nzcv(value: u64) -> CondFlags {
    CondFlags {
        negative: value & nzcv::N != 0,
        zero: value & nzcv::Z != 0,
        carry: value & nzcv::C != 0,
        overflow: value & nzcv::V != 0,
        summary_overflow: false,
    }
}

pub fn encode_nzcv(flags: &CondFlags) -> u64 {
    let mut value = 0;
    if flags.negative {
        value |= nzcv::N;
    }
    if flags.zero {
        value |= nzcv::Z;
    }
    if flags.carry {
        value |= nzcv::C;
    }
    if flags.overflow {
        value |= nzcv::V;
    }
    value
}

pub fn extract(
    regs: &AArch64Regs,
    leaf: &LeafFrame<'_>,
    program: &ProgramImage,
) -> Result<CapturedContext, TranslateError> {
    let mut ctx = CapturedContext::new(ARCH);
    leaf_sites(ARCH, regs.pc, leaf, program, &mut ctx)?;

    ctx.tls = match regs.tpidr {
        0 => 0,
        tp => tp
            .checked_add(TCB_SIZE)
            .ok_or(TranslateError::InvalidThreadPointer { arch: ARCH, value: tp })?,
    };

    let n = ctx.args.len();
    ctx.args.copy_from_slice(&regs.x[..n]);
    ctx.gprs[..CALLEE_SAVED_GPRS]
        .copy_from_slice(&regs.x[FIRST_CALLEE_SAVED..FIRST_CALLEE_SAVED + CALLEE_SAVED_GPRS]);
    for (i, slot) in ctx.fprs[..CALLEE_SAVED_FPRS].iter_mut().enumerate() {
        *slot = regs.v[FIRST_CALLEE_SAVED_FP + i] as u64;
    }
    ctx.flags = decode_nzcv(regs.nzcv);
    ctx.fenv = decode_fp(regs.fpcr, regs.fpsr)?;
    SAVE_AREA.unpack(&mut ctx, leaf.save, false);
    Ok(ctx)
}

pub fn install(
    ctx: &CapturedContext,
    at: &LeafPlacement,
    program: &ProgramImage,
) -> Result<Installed, TranslateError> {
    let mut regs = AArch64Regs::default();
    regs.pc = program.site_addr(ctx.pc, ARCH)?;
    regs.sp = at.sp;
    regs.x[reg::FP] = at.fp;
    regs.x[reg::LR] = at.return_address;
    regs.tpidr = match ctx.tls {
        0 => 0,
        tls if tls < TCB_SIZE => {
            return Err(TranslateError::InvalidThreadPointer { arch: ARCH, value: tls })
        }
        tls => tls - TCB_SIZE,
    };

    regs.x[..ctx.args.len()].copy_from_slice(&ctx.args);
    regs.x[FIRST_CALLEE_SAVED..FIRST_CALLEE_SAVED + CALLEE_SAVED_GPRS]
        .copy_from_slice(&ctx.gprs[..CALLEE_SAVED_GPRS]);
    for (i, value) in ctx.fprs[..CALLEE_SAVED_FPRS].iter().enumerate() {
        regs.v[FIRST_CALLEE_SAVED_FP + i] = *value as u128;
    }
    regs.nzcv = encode_nzcv(&ctx.flags);
    let (control, status) = encode_fp(ctx)?;
    regs.fpcr = control;
    regs.fpsr = status;

    let save = SAVE_AREA.pack(ctx, false);
    Ok(Installed {
        regs: ArchRegs::AArch64(regs),
        save,
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn test_fp_roundtrip() {
        let control = (fpcr::RMODE_RM << fpcr::RMODE_SHIFT) | fpcr::FZ | fpcr::DN | fpcr::IXE;
        let status = fpsr::IDC | fpsr::QC | fpsr::UFC;
        let env = decode_fp(control, status).unwrap();
        assert_eq!(env.rounding, RoundingMode::Down);
        assert!(env.flush_inputs && env.flush_outputs && env.default_nan);
        assert_eq!(env.traps, FpExceptions::INEXACT);
        assert_eq!(
            env.sticky,
            FpExceptions::DENORMAL | FpExceptions::SATURATION | FpExceptions::UNDERFLOW
        );
        let mut ctx = CapturedContext::new(ARCH);
        ctx.fenv = env;
        assert_eq!(encode_fp(&ctx), Ok((control, status)));
    }

    #[test]
    fn test_alternative_half_precision_is_lossy() {
        assert!(matches!(
            decode_fp(fpcr::AHP, 0),
            Err(TranslateError::UnrepresentableFpMode { arch: Arch::AArch64, .. })
        ));
    }

    #[test]
    fn test_asymmetric_flush_is_lossy() {
        let mut ctx = CapturedContext::new(Arch::X86_64);
        ctx.fenv.flush_inputs = true;
        assert!(encode_fp(&ctx).is_err());
    }

    #[test]
    fn test_nzcv() {
        let flags = decode_nzcv(nzcv::N | nzcv::V);
        assert!(flags.negative && flags.overflow);
        assert!(!flags.zero && !flags.carry);
        assert_eq!(encode_nzcv(&flags), nzcv::N | nzcv::V);
    }

    #[test]
    fn test_register_roles() {
        let (program, site) = program();
        let ctx = busy_context(Arch::X86_64, site);
        let ra = program.site_addr(site, ARCH).unwrap();
        let at = LeafPlacement {
            sp: 0x2000,
            fp: 0x2000,
            return_address: ra,
        };
        let installed = install(&ctx, &at, &program).unwrap();
        let regs = installed.regs.as_aarch64().unwrap();
        assert_eq!(regs.x[0], ctx.args[0]);
        assert_eq!(regs.x[19], ctx.gprs[0]);
        assert_eq!(regs.x[28], ctx.gprs[9]);
        assert_eq!(regs.v[8] as u64, ctx.fprs[0]);
        assert_eq!(regs.v[15] >> 64, 0);
        assert_eq!(regs.x[reg::LR], ra);
        assert_eq!(regs.tpidr, ctx.tls - TCB_SIZE);
        assert_eq!(installed.save[0], ctx.gprs[10]);
    }
}
