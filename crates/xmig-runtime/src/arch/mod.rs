//! Host register capture
//!
//! Reads the live FP environment and condition flags of the CPU the
//! process runs on, so a freshly attached thread image starts with the
//! same FP behaviour as the real thread.

use xmig_core::{CondFlags, FpEnv};

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        pub mod x86_64;
        pub use self::x86_64 as host;
    } else if #[cfg(target_arch = "aarch64")] {
        pub mod aarch64;
        pub use self::aarch64 as host;
    } else if #[cfg(target_arch = "powerpc64")] {
        pub mod powerpc64;
        pub use self::powerpc64 as host;
    }
}

/// FP environment and flags of the calling thread, in neutral form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HostState {
    pub fenv: FpEnv,
    pub flags: CondFlags,
}

/// Capture the calling thread's host state
#[inline]
pub fn capture_host_state() -> HostState {
    host::capture_host_state()
}
