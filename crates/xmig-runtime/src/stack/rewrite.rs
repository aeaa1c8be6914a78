//! Stack rewriter
//!
//! Lays a `NeutralThread` out as native frames of the destination ISA in
//! the scratch half of a `ThreadStack`. The translator runs before the
//! first store, so an untranslatable state leaves the scratch half as it
//! was; nothing here ever touches the active half.

use xmig_core::{
    Arch, ArchRegs, MigrateResult, NeutralThread, ProgramImage, StackError,
};

use super::layout::{frame_size, FrameGeom};
use crate::memory::ThreadStack;
use crate::translate::{install, save_area, LeafPlacement};

/// Destination frames written into the scratch half
#[derive(Debug, Clone)]
pub struct Materialized {
    pub dest: Arch,
    /// Destination registers, pointing at the new shim frame
    pub regs: ArchRegs,
    pub shim: FrameGeom,
    /// `[lo, hi)` of the written stack
    pub span: (u64, u64),
    pub depth: usize,
}

/// Validate `thread` against the program image
fn check_frames(thread: &NeutralThread, program: &ProgramImage) -> Result<(), StackError> {
    let n = thread.frames.len();
    if !thread.is_consistent() {
        return Err(StackError::Corrupt {
            depth: 0,
            reason: "return address does not match the innermost frame",
        });
    }
    for (i, frame) in thread.frames.iter().enumerate() {
        let depth = n - i;
        let info = program.function(frame.function).ok_or(StackError::Corrupt {
            depth,
            reason: "frame names an unknown function",
        })?;
        if program.site(frame.site).map(|s| s.function) != Some(frame.function) {
            return Err(StackError::Corrupt {
                depth,
                reason: "frame site does not belong to its function",
            });
        }
        if frame.slots.len() != info.slot_count {
            return Err(StackError::SlotCountMismatch {
                function: frame.function,
                expected: info.slot_count,
                found: frame.slots.len(),
            });
        }
    }
    Ok(())
}

/// Write the link word and return address of `g`
fn write_header(
    stack: &mut ThreadStack,
    g: &FrameGeom,
    ret: u64,
    caller_fp: u64,
    toc: u64,
) -> Result<(), StackError> {
    match g.arch {
        Arch::PowerPc64 => {
            stack.write_u64(g.link_slot(), g.cfa)?;
            stack.write_u64(g.toc_slot(), toc)?;
        }
        Arch::X86_64 | Arch::AArch64 => stack.write_u64(g.link_slot(), caller_fp)?,
    }
    stack.write_u64(g.return_slot(), ret)
}

fn write_slots(stack: &mut ThreadStack, g: &FrameGeom, slots: &[u64]) -> Result<(), StackError> {
    for (k, v) in slots.iter().enumerate() {
        stack.write_u64(g.slot(k), *v)?;
    }
    Ok(())
}

/// Build `thread` as `dest` frames in the scratch half of `stack`
pub fn materialize(
    stack: &mut ThreadStack,
    dest: Arch,
    thread: &NeutralThread,
    program: &ProgramImage,
) -> MigrateResult<Materialized> {
    check_frames(thread, program)?;

    let (lo, hi) = stack.scratch_bounds();
    let top = hi - dest.bottom_reserve();
    let area = save_area(dest);

    let needed = thread
        .frames
        .iter()
        .map(|f| frame_size(dest, f.slots.len()))
        .sum::<u64>()
        + frame_size(dest, area.words())
        + dest.red_zone()
        + dest.bottom_reserve();
    if needed > hi - lo {
        return Err(StackError::Overflow {
            needed,
            available: hi - lo,
        }
        .into());
    }

    // Outermost first, growing down from the top
    let mut geoms = Vec::with_capacity(thread.frames.len());
    let mut cfa = top;
    for frame in &thread.frames {
        let g = FrameGeom::below_cfa(dest, cfa, frame.slots.len());
        cfa = g.sp;
        geoms.push(g);
    }
    let shim = FrameGeom::below_cfa(dest, cfa, area.words());

    let placement = LeafPlacement {
        sp: shim.sp,
        fp: shim.fp(),
        return_address: program.site_addr(thread.ctx.return_address, dest)?,
    };
    let installed = install(dest, &thread.ctx, &placement, program)?;

    stack.zero(shim.sp, hi)?;
    let toc = program.toc();
    let mut ret = program.thread_exit(dest);
    let mut caller_fp = 0;
    for (frame, g) in thread.frames.iter().zip(&geoms) {
        write_header(stack, g, ret, caller_fp, toc)?;
        write_slots(stack, g, &frame.slots)?;
        ret = program.site_addr(frame.site, dest)?;
        caller_fp = g.fp();
    }
    debug_assert_eq!(ret, placement.return_address);
    write_header(stack, &shim, ret, caller_fp, toc)?;
    write_slots(stack, &shim, &installed.save)?;

    Ok(Materialized {
        dest,
        regs: installed.regs,
        shim,
        span: (shim.sp, hi),
        depth: thread.frames.len(),
    })
}
