//! aarch64 host capture (FPCR, FPSR, NZCV)

use core::arch::asm;

use super::HostState;
use crate::translate::aarch64::{decode_fp, decode_nzcv};

#[inline]
pub fn read_fpcr() -> u64 {
    let value: u64;
    // SAFETY: reading a system register has no side effects.
    unsafe { asm!("mrs {}, fpcr", out(reg) value, options(nomem, nostack, preserves_flags)) };
    value
}

#[inline]
pub fn read_fpsr() -> u64 {
    let value: u64;
    // SAFETY: reading a system register has no side effects.
    unsafe { asm!("mrs {}, fpsr", out(reg) value, options(nomem, nostack, preserves_flags)) };
    value
}

#[inline]
pub fn read_nzcv() -> u64 {
    let value: u64;
    // SAFETY: reading a system register has no side effects.
    unsafe { asm!("mrs {}, nzcv", out(reg) value, options(nomem, nostack, preserves_flags)) };
    value
}

pub fn capture_host_state() -> HostState {
    HostState {
        fenv: decode_fp(read_fpcr(), read_fpsr()).unwrap_or_default(),
        flags: decode_nzcv(read_nzcv()),
    }
}
