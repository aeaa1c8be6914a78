//! Per-thread migratable image
//!
//! A `ThreadImage` is the native view of one attached thread: the register
//! file of the ISA it currently runs on and the two-half stack holding its
//! frames. The engine captures it into neutral form, prepares the
//! destination layout in the scratch half, and resumes by flipping halves
//! and swapping in the destination registers.

use std::sync::Arc;

use xmig_core::{
    kdebug, Arch, ArchRegs, FpEnv, FpExceptions, FunctionId, MigrateError, MigrateResult,
    NeutralFrame, NeutralThread, ProgramImage, SiteId, StackError, StackFrame, TranslateError,
};

use crate::arch::capture_host_state;
use crate::config::MigrateConfig;
use crate::memory::ThreadStack;
use crate::stack::{self, Materialized};

/// Destination state built in the scratch half, not yet live
#[derive(Debug)]
#[must_use = "a prepared migration does nothing until resumed"]
pub struct PreparedMigration {
    inner: Materialized,
    /// Scratch half the layout was written into
    half: usize,
}

impl PreparedMigration {
    #[inline]
    pub fn dest(&self) -> Arch {
        self.inner.dest
    }

    #[inline]
    pub fn regs(&self) -> &ArchRegs {
        &self.inner.regs
    }

    /// `[lo, hi)` of the destination stack
    #[inline]
    pub fn span(&self) -> (u64, u64) {
        self.inner.span
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.inner.depth
    }
}

/// Native state of one attached thread
pub struct ThreadImage {
    regs: ArchRegs,
    stack: ThreadStack,
    program: Arc<ProgramImage>,
    max_frames: usize,
}

impl ThreadImage {
    /// Fresh thread image on `arch` with no frames
    ///
    /// `tls` is the start of the thread's TLS block (0 for none). When
    /// `capture_host_state` is on and `arch` is the host ISA, the FP modes
    /// and condition flags are seeded from the calling thread.
    pub fn new(
        arch: Arch,
        program: Arc<ProgramImage>,
        config: &MigrateConfig,
        tls: u64,
    ) -> MigrateResult<Self> {
        config.validate()?;
        let stack = ThreadStack::new(config.stack_size)?;

        let mut neutral = NeutralThread::new(arch);
        neutral.ctx.tls = tls;
        if config.capture_host_state && arch == Arch::current() {
            let host = capture_host_state();
            // Modes only; a fresh thread has raised nothing yet
            neutral.ctx.fenv = FpEnv {
                sticky: FpExceptions::NONE,
                ..host.fenv
            };
            neutral.ctx.flags = host.flags;
        }

        let mut image = ThreadImage {
            regs: ArchRegs::empty(arch),
            stack,
            program,
            max_frames: config.max_frames,
        };
        let prepared = image.prepare(&neutral, arch)?;
        image.resume(prepared);
        kdebug!("thread image on {} at {:?}", arch, image.stack);
        Ok(image)
    }

    /// ISA the thread currently runs on
    #[inline]
    pub fn arch(&self) -> Arch {
        self.regs.arch()
    }

    #[inline]
    pub fn regs(&self) -> &ArchRegs {
        &self.regs
    }

    #[inline]
    pub fn stack(&self) -> &ThreadStack {
        &self.stack
    }

    #[inline]
    pub fn program(&self) -> &Arc<ProgramImage> {
        &self.program
    }

    /// Native frames of the active half, innermost first
    pub fn frames(&self) -> MigrateResult<Vec<StackFrame>> {
        Ok(stack::walk(&self.stack, &self.regs, &self.program, self.max_frames)?.frames)
    }

    /// Lift the live state into neutral form
    pub fn capture(&self) -> MigrateResult<NeutralThread> {
        stack::capture(&self.stack, &self.regs, &self.program, self.max_frames)
    }

    /// Build `neutral` as `dest` frames in the scratch half
    ///
    /// The live half and registers are untouched, whatever the outcome.
    pub fn prepare(&mut self, neutral: &NeutralThread, dest: Arch) -> MigrateResult<PreparedMigration> {
        if neutral.depth() > self.max_frames {
            return Err(StackError::TooDeep {
                limit: self.max_frames,
            }
            .into());
        }
        let half = self.stack.active_index() ^ 1;
        let inner = stack::materialize(&mut self.stack, dest, neutral, &self.program)?;
        Ok(PreparedMigration { inner, half })
    }

    /// Make a prepared layout live
    pub fn resume(&mut self, prepared: PreparedMigration) {
        if self.stack.active_index() != prepared.half {
            self.stack.flip();
        }
        self.regs = prepared.inner.regs;
    }

    /// Capture, edit in neutral form, and write back on the same ISA
    pub fn update<F>(&mut self, f: F) -> MigrateResult<()>
    where
        F: FnOnce(&mut NeutralThread),
    {
        let mut neutral = self.capture()?;
        f(&mut neutral);
        let prepared = self.prepare(&neutral, self.arch())?;
        self.resume(prepared);
        Ok(())
    }

    /// Model a call: the function owning `site` becomes the innermost
    /// frame, suspended at `site` and holding `slots`
    pub fn push_frame(&mut self, site: SiteId, slots: Vec<u64>) -> MigrateResult<FunctionId> {
        let function = self
            .program
            .site(site)
            .map(|s| s.function)
            .filter(|f| !f.is_none())
            .ok_or(MigrateError::LossyTranslation(TranslateError::UnknownSite(site)))?;
        self.update(|t| t.push_frame(function, site, slots))?;
        Ok(function)
    }

    /// Model a return from the innermost frame
    pub fn pop_frame(&mut self) -> MigrateResult<Option<NeutralFrame>> {
        let mut popped = None;
        self.update(|t| popped = t.pop_frame())?;
        Ok(popped)
    }
}

impl core::fmt::Debug for ThreadImage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ThreadImage")
            .field("arch", &self.arch())
            .field("sp", &format_args!("{:#x}", self.regs.sp()))
            .field("stack", &self.stack)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xmig_core::constants::MIN_STACK_SIZE;

    fn program() -> (Arc<ProgramImage>, SiteId, SiteId) {
        let mut b = ProgramImage::builder();
        let outer = b.function("outer", 1);
        let inner = b.function("inner", 2);
        let a = b.call_site(outer);
        let c = b.call_site(inner);
        (Arc::new(b.build().unwrap()), a, c)
    }

    fn config() -> MigrateConfig {
        MigrateConfig::new().stack_size(2 * MIN_STACK_SIZE).max_frames(8)
    }

    #[test]
    fn test_new_image_is_empty() {
        let (p, _, _) = program();
        for arch in Arch::ALL {
            let img = ThreadImage::new(arch, p.clone(), &config(), 0x7f00_0000_1000).unwrap();
            assert_eq!(img.arch(), arch);
            assert!(img.frames().unwrap().is_empty());
            let t = img.capture().unwrap();
            assert_eq!(t.ctx.tls, 0x7f00_0000_1000);
            assert_eq!(t.ctx.return_address, SiteId::THREAD_EXIT);
        }
    }

    #[test]
    fn test_push_pop_frames() {
        let (p, a, c) = program();
        let mut img = ThreadImage::new(Arch::AArch64, p, &config(), 0).unwrap();
        img.push_frame(a, vec![1]).unwrap();
        img.push_frame(c, vec![2, 3]).unwrap();
        let frames = img.frames().unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].site, c);
        assert_eq!(frames[0].slots, vec![2, 3]);

        let popped = img.pop_frame().unwrap().unwrap();
        assert_eq!(popped.site, c);
        assert_eq!(img.capture().unwrap().ctx.return_address, a);
    }

    #[test]
    fn test_pop_reports_broken_stack() {
        let (p, a, _) = program();
        let mut img = ThreadImage::new(Arch::X86_64, p, &config(), 0).unwrap();
        assert!(img.pop_frame().unwrap().is_none());
        img.push_frame(a, vec![4]).unwrap();

        let (lo, hi) = img.stack.active_bounds();
        img.stack.zero(lo, hi).unwrap();
        assert!(img.pop_frame().is_err());
    }

    #[test]
    fn test_push_reserved_site_fails() {
        let (p, _, _) = program();
        let mut img = ThreadImage::new(Arch::X86_64, p, &config(), 0).unwrap();
        assert!(img.push_frame(SiteId::SHIM_RESUME, vec![]).is_err());
        assert!(img.frames().unwrap().is_empty());
    }

    #[test]
    fn test_failed_prepare_keeps_live_state() {
        let (p, a, _) = program();
        let mut img = ThreadImage::new(Arch::PowerPc64, p, &config(), 0).unwrap();
        img.push_frame(a, vec![9]).unwrap();
        let before = img.capture().unwrap();

        let mut bad = before.clone();
        bad.ctx.fenv.default_nan = true;
        let err = img.prepare(&bad, Arch::X86_64).unwrap_err();
        assert!(err.is_fatal());
        assert!(img.capture().unwrap().same_state(&before));
        assert_eq!(img.arch(), Arch::PowerPc64);
    }

    #[test]
    fn test_prepare_resume_switches_isa() {
        let (p, a, c) = program();
        let mut img = ThreadImage::new(Arch::X86_64, p, &config(), 0x7f00_0000_2000).unwrap();
        img.push_frame(a, vec![5]).unwrap();
        img.push_frame(c, vec![6, 7]).unwrap();
        img.update(|t| t.ctx.gprs[0] = 0xabc).unwrap();

        let before = img.capture().unwrap();
        let prepared = img.prepare(&before, Arch::PowerPc64).unwrap();
        assert_eq!(prepared.depth(), 2);
        img.resume(prepared);
        assert_eq!(img.arch(), Arch::PowerPc64);
        assert!(img.capture().unwrap().same_state(&before));
    }
}
