//! Identifier types
//!
//! Code locations are never carried across a migration as raw addresses:
//! a return address on one ISA means nothing on another. They travel as
//! logical ids that the `ProgramImage` maps to a concrete address per ISA.

use core::fmt;

/// Logical call site (a return address, independent of ISA)
///
/// Two ids are reserved: `THREAD_EXIT` is the return address of the
/// outermost frame, `SHIM_RESUME` is where the migration shim returns.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct SiteId(u32);

impl SiteId {
    /// Return address of the outermost frame; terminates every walk
    pub const THREAD_EXIT: SiteId = SiteId(0);

    /// Resume point inside the migration shim
    pub const SHIM_RESUME: SiteId = SiteId(1);

    /// First id handed out for user call sites
    pub const FIRST_USER: u32 = 2;

    #[inline]
    pub const fn new(id: u32) -> Self {
        SiteId(id)
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Whether this is one of the reserved runtime sites
    #[inline]
    pub const fn is_reserved(self) -> bool {
        self.0 < Self::FIRST_USER
    }
}

impl fmt::Debug for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            SiteId::THREAD_EXIT => write!(f, "SiteId(THREAD_EXIT)"),
            SiteId::SHIM_RESUME => write!(f, "SiteId(SHIM_RESUME)"),
            SiteId(n) => write!(f, "SiteId({})", n),
        }
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            SiteId::THREAD_EXIT => write!(f, "thread-exit"),
            SiteId::SHIM_RESUME => write!(f, "shim-resume"),
            SiteId(n) => write!(f, "site#{}", n),
        }
    }
}

/// Function in the program image
///
/// The maximum value (u32::MAX) is the sentinel for "no function", used by
/// the reserved sites that do not belong to user code.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct FunctionId(u32);

impl FunctionId {
    pub const NONE: FunctionId = FunctionId(u32::MAX);

    #[inline]
    pub const fn new(id: u32) -> Self {
        FunctionId(id)
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == u32::MAX
    }

    #[inline]
    pub const fn to_option(self) -> Option<FunctionId> {
        if self.is_none() {
            None
        } else {
            Some(self)
        }
    }
}

impl Default for FunctionId {
    fn default() -> Self {
        FunctionId::NONE
    }
}

impl fmt::Debug for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "FunctionId(NONE)")
        } else {
            write!(f, "FunctionId({})", self.0)
        }
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "none")
        } else {
            write!(f, "fn#{}", self.0)
        }
    }
}

/// Identity of the OS thread that owns a migratable thread image
///
/// Produced by the runtime from `pthread_self`; opaque here.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct ThreadToken(u64);

impl ThreadToken {
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        ThreadToken(raw)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ThreadToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ThreadToken({:#x})", self.0)
    }
}

impl fmt::Display for ThreadToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_sites() {
        assert!(SiteId::THREAD_EXIT.is_reserved());
        assert!(SiteId::SHIM_RESUME.is_reserved());
        assert!(!SiteId::new(SiteId::FIRST_USER).is_reserved());
        assert_eq!(format!("{}", SiteId::THREAD_EXIT), "thread-exit");
        assert_eq!(format!("{:?}", SiteId::new(7)), "SiteId(7)");
    }

    #[test]
    fn test_function_id_none() {
        assert!(FunctionId::NONE.is_none());
        assert_eq!(FunctionId::default().to_option(), None);
        assert_eq!(FunctionId::new(3).to_option(), Some(FunctionId::new(3)));
        assert_eq!(format!("{}", FunctionId::new(3)), "fn#3");
    }

    #[test]
    fn test_thread_token() {
        let t = ThreadToken::from_raw(0xabc);
        assert_eq!(t.as_u64(), 0xabc);
        assert_eq!(format!("{}", t), "0xabc");
    }
}
