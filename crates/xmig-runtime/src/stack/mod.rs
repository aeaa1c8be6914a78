//! Stack rewriter
//!
//! - `layout`: per-ISA frame geometry
//! - `walk`: native frames of the active half to `StackFrame`s
//! - `rewrite`: `NeutralThread` to native frames in the scratch half

pub mod layout;
pub mod rewrite;
pub mod walk;

pub use layout::{frame_size, FrameGeom};
pub use rewrite::{materialize, Materialized};
pub use walk::{walk, Walk};

use xmig_core::{MigrateResult, NeutralThread, ProgramImage};

use crate::memory::ThreadStack;
use crate::translate::extract;

/// Walk the active half and lift it into neutral form
///
/// `regs` must be the registers of the thread that owns `stack`.
pub fn capture(
    stack: &ThreadStack,
    regs: &xmig_core::ArchRegs,
    program: &ProgramImage,
    max_frames: usize,
) -> MigrateResult<NeutralThread> {
    let walked = walk(stack, regs, program, max_frames)?;
    let ctx = extract(regs, &walked.leaf(), program)?;
    let frames = walked.frames.iter().rev().map(|f| f.to_neutral()).collect();
    Ok(NeutralThread { ctx, frames })
}

#[cfg(test)]
mod tests {
    use super::*;
    use xmig_core::constants::MIN_STACK_SIZE;
    use xmig_core::{Arch, FunctionId, MigrateError, SiteId, StackError};

    struct Fixture {
        program: ProgramImage,
        sites: Vec<SiteId>,
    }

    /// main -> parse -> eval, slot counts 2, 0, 3
    fn fixture() -> Fixture {
        let mut b = ProgramImage::builder();
        let main = b.function("main", 2);
        let parse = b.function("parse", 0);
        let eval = b.function("eval", 3);
        let sites = vec![b.call_site(main), b.call_site(parse), b.call_site(eval)];
        Fixture {
            program: b.build().unwrap(),
            sites,
        }
    }

    fn thread(fx: &Fixture, source: Arch) -> NeutralThread {
        let mut t = NeutralThread::new(source);
        t.ctx.tls = 0x7f00_0000_4000;
        t.ctx.args[0] = 42;
        t.ctx.gprs[7] = 0x77;
        t.ctx.fprs[2] = 2.5f64.to_bits();
        t.push_frame(FunctionId::new(0), fx.sites[0], vec![10, 11]);
        t.push_frame(FunctionId::new(1), fx.sites[1], vec![]);
        t.push_frame(FunctionId::new(2), fx.sites[2], vec![30, 31, 32]);
        t
    }

    fn stack() -> ThreadStack {
        ThreadStack::new(MIN_STACK_SIZE).unwrap()
    }

    #[test]
    fn test_materialize_then_walk() {
        let fx = fixture();
        for arch in Arch::ALL {
            let t = thread(&fx, arch);
            let mut st = stack();
            let m = materialize(&mut st, arch, &t, &fx.program).unwrap();
            assert_eq!(m.depth, 3);
            st.flip();

            let walked = walk(&st, &m.regs, &fx.program, 16).unwrap();
            assert_eq!(walked.frames.len(), 3);
            assert_eq!(walked.frames[0].site, fx.sites[2]);
            assert_eq!(walked.frames[0].slots, vec![30, 31, 32]);
            assert_eq!(walked.frames[2].function, FunctionId::new(0));
            for f in &walked.frames {
                assert_eq!(f.sp % 16, 0, "{}", f);
                assert_eq!(f.return_address, fx.program.site_addr(f.site, arch).unwrap());
            }

            let back = capture(&st, &m.regs, &fx.program, 16).unwrap();
            assert!(back.same_state(&t), "{}: {:?}", arch, back);
        }
    }

    #[test]
    fn test_cross_isa_layout() {
        let fx = fixture();
        for src in Arch::ALL {
            for dst in Arch::ALL {
                let mut st = stack();
                let m = materialize(&mut st, src, &thread(&fx, src), &fx.program).unwrap();
                st.flip();
                let captured = capture(&st, &m.regs, &fx.program, 16).unwrap();

                let m = materialize(&mut st, dst, &captured, &fx.program).unwrap();
                st.flip();
                let back = capture(&st, &m.regs, &fx.program, 16).unwrap();
                assert!(back.same_state(&captured), "{} -> {}", src, dst);
            }
        }
    }

    #[test]
    fn test_empty_thread() {
        let fx = fixture();
        let t = NeutralThread::new(Arch::PowerPc64);
        let mut st = stack();
        let m = materialize(&mut st, Arch::PowerPc64, &t, &fx.program).unwrap();
        st.flip();
        let walked = walk(&st, &m.regs, &fx.program, 4).unwrap();
        assert!(walked.frames.is_empty());
        assert_eq!(walked.return_address, fx.program.thread_exit(Arch::PowerPc64));
    }

    #[test]
    fn test_scratch_only() {
        let fx = fixture();
        let mut st = stack();
        let (lo, hi) = st.active_bounds();
        st.write_u64(hi - 8, 0xfeed).unwrap();
        st.write_u64(lo, 0xbeef).unwrap();
        materialize(&mut st, Arch::X86_64, &thread(&fx, Arch::X86_64), &fx.program).unwrap();
        assert_eq!(st.read_u64(hi - 8).unwrap(), 0xfeed);
        assert_eq!(st.read_u64(lo).unwrap(), 0xbeef);
    }

    #[test]
    fn test_slot_count_mismatch() {
        let fx = fixture();
        let mut t = thread(&fx, Arch::AArch64);
        t.frames[0].slots.push(99);
        let mut st = stack();
        let err = materialize(&mut st, Arch::AArch64, &t, &fx.program).unwrap_err();
        assert!(matches!(
            err,
            MigrateError::Stack(StackError::SlotCountMismatch { expected: 2, found: 3, .. })
        ));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_inconsistent_return_address() {
        let fx = fixture();
        let mut t = thread(&fx, Arch::AArch64);
        t.ctx.return_address = fx.sites[0];
        let mut st = stack();
        let err = materialize(&mut st, Arch::X86_64, &t, &fx.program).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_overflow() {
        let mut b = ProgramImage::builder();
        let big = b.function("big", MIN_STACK_SIZE / 8);
        let site = b.call_site(big);
        let program = b.build().unwrap();

        let mut t = NeutralThread::new(Arch::X86_64);
        t.push_frame(big, site, vec![0; MIN_STACK_SIZE / 8]);
        let mut st = stack();
        let err = materialize(&mut st, Arch::X86_64, &t, &program).unwrap_err();
        assert!(matches!(err, MigrateError::Stack(StackError::Overflow { .. })));
    }

    #[test]
    fn test_walk_too_deep() {
        let fx = fixture();
        let mut st = stack();
        let m = materialize(&mut st, Arch::AArch64, &thread(&fx, Arch::AArch64), &fx.program)
            .unwrap();
        st.flip();
        let err = walk(&st, &m.regs, &fx.program, 2).unwrap_err();
        assert_eq!(err, MigrateError::Stack(StackError::TooDeep { limit: 2 }));
    }

    #[test]
    fn test_walk_detects_broken_chain() {
        let fx = fixture();
        for arch in Arch::ALL {
            let mut st = stack();
            let m = materialize(&mut st, arch, &thread(&fx, arch), &fx.program).unwrap();
            st.flip();
            let walked = walk(&st, &m.regs, &fx.program, 16).unwrap();

            // Point the middle frame's link word somewhere else
            let g = FrameGeom::at_sp(arch, walked.frames[1].sp, 0);
            let link = g.link_slot();
            let saved = st.read_u64(link).unwrap();
            st.write_u64(link, saved + 16).unwrap();
            let err = walk(&st, &m.regs, &fx.program, 16).unwrap_err();
            assert!(err.is_fatal(), "{}: {}", arch, err);
        }
    }

    #[test]
    fn test_walk_rejects_unmapped_return() {
        let fx = fixture();
        let mut st = stack();
        let m = materialize(&mut st, Arch::X86_64, &thread(&fx, Arch::X86_64), &fx.program)
            .unwrap();
        st.flip();
        st.write_u64(m.shim.return_slot(), 0x1234).unwrap();
        let err = walk(&st, &m.regs, &fx.program, 16).unwrap_err();
        assert!(matches!(err, MigrateError::LossyTranslation(_)));
    }

    #[test]
    fn test_powerpc_toc_saved() {
        let fx = fixture();
        let mut st = stack();
        let m = materialize(&mut st, Arch::PowerPc64, &thread(&fx, Arch::X86_64), &fx.program)
            .unwrap();
        st.flip();
        let walked = walk(&st, &m.regs, &fx.program, 16).unwrap();
        for f in &walked.frames {
            let g = FrameGeom::at_sp(Arch::PowerPc64, f.sp, f.slots.len());
            assert_eq!(st.read_u64(g.toc_slot()).unwrap(), fx.program.toc());
        }
    }
}
