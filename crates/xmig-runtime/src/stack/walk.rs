//! Native stack walker
//!
//! Starts at the migration-shim frame the registers point at and follows
//! return addresses outward until one resolves to the thread-exit site.
//! Every frame is checked against the active half, its frame-pointer link
//! (back chain on PowerPC64) and the slot count the program image records
//! for the function owning the call site.

use xmig_core::{
    Arch, ArchRegs, FunctionId, MigrateResult, ProgramImage, StackError, StackFrame,
};

use super::layout::FrameGeom;
use crate::memory::ThreadStack;
use crate::translate::{save_area, LeafFrame};

/// Result of walking one native stack
#[derive(Debug, Clone)]
pub struct Walk {
    /// Migration-shim frame
    pub shim: FrameGeom,
    /// Native address the shim returns to
    pub return_address: u64,
    /// Shim save-area words
    pub save: Vec<u64>,
    /// User frames, innermost first
    pub frames: Vec<StackFrame>,
}

impl Walk {
    /// Leaf view for the translator
    pub fn leaf(&self) -> LeafFrame<'_> {
        LeafFrame {
            sp: self.shim.sp,
            fp: self.shim.fp(),
            return_address: self.return_address,
            save: &self.save,
        }
    }
}

fn check_geom(g: &FrameGeom, lo: u64, top: u64) -> Result<(), StackError> {
    if g.sp % 16 != 0 {
        return Err(StackError::Misaligned { addr: g.sp });
    }
    if g.sp < lo {
        return Err(StackError::OutOfBounds { addr: g.sp });
    }
    if g.cfa > top {
        return Err(StackError::OutOfBounds { addr: g.cfa });
    }
    Ok(())
}

/// Check the link word read from frame `g` against the frame above it
fn check_link(g: &FrameGeom, link: u64, caller_fp: Option<u64>, depth: usize) -> Result<(), StackError> {
    let ok = match g.arch {
        Arch::PowerPc64 => link == g.cfa,
        Arch::X86_64 | Arch::AArch64 => caller_fp.map_or(true, |fp| fp == link),
    };
    if !ok {
        let reason = match g.arch {
            Arch::PowerPc64 => "back chain does not point at caller frame",
            _ => "saved frame pointer does not match caller frame",
        };
        return Err(StackError::Corrupt { depth, reason });
    }
    Ok(())
}

fn read_slots(stack: &ThreadStack, g: &FrameGeom, n: usize) -> Result<Vec<u64>, StackError> {
    (0..n).map(|k| stack.read_u64(g.slot(k))).collect()
}

/// Walk the active half of `stack` for a thread stopped at a migration
/// point with registers `regs`
pub fn walk(
    stack: &ThreadStack,
    regs: &ArchRegs,
    program: &ProgramImage,
    max_frames: usize,
) -> MigrateResult<Walk> {
    let arch = regs.arch();
    let (lo, hi) = stack.active_bounds();
    let top = hi - arch.bottom_reserve();

    if regs.pc() != program.shim_resume(arch) {
        return Err(StackError::Corrupt {
            depth: 0,
            reason: "thread is not stopped at a migration point",
        }
        .into());
    }

    let area = save_area(arch);
    let shim = FrameGeom::at_sp(arch, regs.sp(), area.words());
    check_geom(&shim, lo, top)?;
    if arch != Arch::PowerPc64 && regs.fp() != shim.fp() {
        return Err(StackError::Corrupt {
            depth: 0,
            reason: "frame pointer does not address the shim frame",
        }
        .into());
    }
    let save = read_slots(stack, &shim, area.words())?;

    let return_address = stack.read_u64(shim.return_slot())?;
    let exit = program.thread_exit(arch);
    let mut frames: Vec<StackFrame> = Vec::new();
    let mut callee = shim;
    let mut ret = return_address;
    let mut link = stack.read_u64(callee.link_slot())?;

    while ret != exit {
        let depth = frames.len() + 1;
        if frames.len() >= max_frames {
            return Err(StackError::TooDeep { limit: max_frames }.into());
        }
        let site = program.site_at(arch, ret)?;
        let function = program
            .site(site)
            .map(|s| s.function)
            .unwrap_or(FunctionId::NONE);
        let info = program.function(function).ok_or(StackError::Corrupt {
            depth,
            reason: "runtime site inside the frame chain",
        })?;

        let geom = FrameGeom::at_sp(arch, callee.cfa, info.slot_count);
        check_geom(&geom, lo, top)?;
        check_link(&callee, link, Some(geom.fp()), depth - 1)?;

        frames.push(StackFrame {
            arch,
            function,
            site,
            cfa: geom.cfa,
            sp: geom.sp,
            fp: geom.fp(),
            return_address: ret,
            slots: read_slots(stack, &geom, info.slot_count)?,
        });

        ret = stack.read_u64(geom.return_slot())?;
        link = stack.read_u64(geom.link_slot())?;
        callee = geom;
    }

    let depth = frames.len();
    if callee.cfa != top {
        return Err(StackError::Corrupt {
            depth,
            reason: "outermost frame does not end at the stack top",
        }
        .into());
    }
    check_link(&callee, link, Some(0), depth)?;
    if arch == Arch::PowerPc64 && stack.read_u64(top)? != 0 {
        return Err(StackError::Corrupt {
            depth,
            reason: "back chain not terminated",
        }
        .into());
    }

    Ok(Walk {
        shim,
        return_address,
        save,
        frames,
    })
}
