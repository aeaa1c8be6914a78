//! Stack frame descriptors

use core::fmt;

use crate::arch::Arch;
use crate::id::{FunctionId, SiteId};

/// A frame in architecture-neutral form
///
/// `site` is where the frame is suspended: the call site inside `function`
/// that control returns to. `slots` are the function's live values in the
/// order the compiler metadata lists them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeutralFrame {
    pub function: FunctionId,
    pub site: SiteId,
    pub slots: Vec<u64>,
}

/// A frame found by walking a native stack, innermost first
///
/// Transient: valid only while the stack it was read from is not modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub arch: Arch,
    pub function: FunctionId,
    /// Where this frame resumes
    pub site: SiteId,
    /// Canonical frame address: the caller's stack pointer at the call
    pub cfa: u64,
    pub sp: u64,
    pub fp: u64,
    /// Native return address this frame resumes at (the address of `site`)
    pub return_address: u64,
    pub slots: Vec<u64>,
}

impl StackFrame {
    /// Frame size in bytes
    #[inline]
    pub fn size(&self) -> u64 {
        self.cfa - self.sp
    }

    /// Drop the native addressing
    pub fn to_neutral(&self) -> NeutralFrame {
        NeutralFrame {
            function: self.function,
            site: self.site,
            slots: self.slots.clone(),
        }
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} @ {} ra={:#x} sp={:#x} cfa={:#x} slots={}",
            self.arch,
            self.function,
            self.site,
            self.return_address,
            self.sp,
            self.cfa,
            self.slots.len()
        )
    }
}
