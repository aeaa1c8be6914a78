//! x86-64 System V convention

use xmig_core::regs::x86_64::{self as reg, mxcsr, rflags};
use xmig_core::{
    Arch, ArchRegs, CapturedContext, CondFlags, FpEnv, FpExceptions, ProgramImage, RoundingMode,
    TranslateError, X86_64Regs,
};

use super::{leaf_sites, Installed, LeafFrame, LeafPlacement, SaveArea};

const ARCH: Arch = Arch::X86_64;

/// Argument registers in ABI order
const ARGS: [usize; 6] = [reg::RDI, reg::RSI, reg::RDX, reg::RCX, reg::R8, reg::R9];

/// Callee-saved GPRs other than rbp, neutral slots 0-4
const CALLEE_SAVED: [usize; 5] = [reg::RBX, reg::R12, reg::R13, reg::R14, reg::R15];

/// No callee-saved FP or vector registers; everything beyond rbx/r12-r15
/// lives in the shim frame
pub const SAVE_AREA: SaveArea = SaveArea {
    gprs_from: CALLEE_SAVED.len(),
    fprs_from: 0,
    vrs_from: 0,
    misc: true,
};

/// MXCSR exception bits paired with their neutral meaning
/// (sticky bit, mask bit)
const EXCEPTIONS: [(FpExceptions, u32, u32); 6] = [
    (FpExceptions::INVALID, mxcsr::IE, mxcsr::IM),
    (FpExceptions::DENORMAL, mxcsr::DE, mxcsr::DM),
    (FpExceptions::DIV_BY_ZERO, mxcsr::ZE, mxcsr::ZM),
    (FpExceptions::OVERFLOW, mxcsr::OE, mxcsr::OM),
    (FpExceptions::UNDERFLOW, mxcsr::UE, mxcsr::UM),
    (FpExceptions::INEXACT, mxcsr::PE, mxcsr::PM),
];

/// Decode MXCSR into the neutral FP environment
pub fn decode_mxcsr(value: u32) -> FpEnv {
    let rounding = match (value & mxcsr::RC_MASK) >> mxcsr::RC_SHIFT {
        mxcsr::RC_NEAREST => RoundingMode::Nearest,
        mxcsr::RC_DOWN => RoundingMode::Down,
        mxcsr::RC_UP => RoundingMode::Up,
        _ => RoundingMode::TowardZero,
    };
    let mut env = FpEnv {
        rounding,
        flush_inputs: value & mxcsr::DAZ != 0,
        flush_outputs: value & mxcsr::FTZ != 0,
        default_nan: false,
        ..FpEnv::default()
    };
    for (exc, flag, mask) in EXCEPTIONS {
        env.sticky.set(exc, value & flag != 0);
        env.traps.set(exc, value & mask == 0);
    }
    env
}

/// Encode the neutral FP environment as MXCSR
pub fn encode_mxcsr(env: &FpEnv) -> Result<u32, TranslateError> {
    if env.default_nan {
        return Err(TranslateError::UnrepresentableFpMode {
            arch: ARCH,
            what: "default NaN",
        });
    }
    let rc = match env.rounding {
        RoundingMode::Nearest => mxcsr::RC_NEAREST,
        RoundingMode::Down => mxcsr::RC_DOWN,
        RoundingMode::Up => mxcsr::RC_UP,
        RoundingMode::TowardZero => mxcsr::RC_ZERO,
    };
    let mut value = rc << mxcsr::RC_SHIFT;
    if env.flush_inputs {
        value |= mxcsr::DAZ;
    }
    if env.flush_outputs {
        value |= mxcsr::FTZ;
    }
    for (exc, flag, mask) in EXCEPTIONS {
        if env.sticky.contains(exc) {
            value |= flag;
        }
        if !env.traps.contains(exc) {
            value |= mask;
        }
    }
    Ok(value)
}

/// Decode RFLAGS; direction and trap flags have no neutral form
pub fn decode_rflags(value: u64) -> Result<CondFlags, TranslateError> {
    if value & rflags::DF != 0 {
        return Err(TranslateError::UnrepresentableFlag { arch: ARCH, flag: "DF" });
    }
    if value & rflags::TF != 0 {
        return Err(TranslateError::UnrepresentableFlag { arch: ARCH, flag: "TF" });
    }
    Ok(CondFlags {
        negative: value & rflags::SF != 0,
        zero: value & rflags::ZF != 0,
        carry: value & rflags::CF != 0,
        overflow: value & rflags::OF != 0,
        summary_overflow: false,
    })
}

pub fn encode_rflags(flags: &CondFlags) -> u64 {
    let mut value = rflags::DEFAULT;
    if flags.negative {
        value |= rflags::SF;
    }
    if flags.zero {
        value |= rflags::ZF;
    }
    if flags.carry {
        value |= rflags::CF;
    }
    if flags.overflow {
        value |= rflags::OF;
    }
    value
}

pub fn extract(
    regs: &X86_64Regs,
    leaf: &LeafFrame<'_>,
    program: &ProgramImage,
) -> Result<CapturedContext, TranslateError> {
    let mut ctx = CapturedContext::new(ARCH);
    leaf_sites(ARCH, regs.rip, leaf, program, &mut ctx)?;

    // variant II: the thread pointer sits just past the TLS block
    let block = program.tls().block_size;
    ctx.tls = match regs.fs_base {
        0 => 0,
        fs if fs < block => {
            return Err(TranslateError::InvalidThreadPointer { arch: ARCH, value: fs })
        }
        fs => fs - block,
    };

    for (slot, r) in ctx.args.iter_mut().zip(ARGS) {
        *slot = regs.gpr[r];
    }
    for (slot, r) in ctx.gprs.iter_mut().zip(CALLEE_SAVED) {
        *slot = regs.gpr[r];
    }
    ctx.flags = decode_rflags(regs.rflags)?;
    ctx.fenv = decode_mxcsr(regs.mxcsr);
    SAVE_AREA.unpack(&mut ctx, leaf.save, true);
    Ok(ctx)
}

pub fn install(
    ctx: &CapturedContext,
    at: &LeafPlacement,
    program: &ProgramImage,
) -> Result<Installed, TranslateError> {
    let mut regs = X86_64Regs::default();
    regs.rip = program.site_addr(ctx.pc, ARCH)?;
    regs.gpr[reg::RSP] = at.sp;
    regs.gpr[reg::RBP] = at.fp;
    regs.fs_base = match ctx.tls {
        0 => 0,
        tls => tls
            .checked_add(program.tls().block_size)
            .ok_or(TranslateError::InvalidThreadPointer { arch: ARCH, value: tls })?,
    };

    for (value, r) in ctx.args.iter().zip(ARGS) {
        regs.gpr[r] = *value;
    }
    for (value, r) in ctx.gprs.iter().zip(CALLEE_SAVED) {
        regs.gpr[r] = *value;
    }
    regs.rflags = encode_rflags(&ctx.flags);
    regs.mxcsr = encode_mxcsr(&ctx.fenv)?;

    let save = SAVE_AREA.pack(ctx, true);
    Ok(Installed {
        regs: ArchRegs::X86_64(regs),
        save,
    })
}
