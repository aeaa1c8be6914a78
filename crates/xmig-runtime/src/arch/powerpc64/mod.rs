//! powerpc64 host capture
//!
//! Inline asm is not stable on powerpc64, so the host state is reported
//! as the ELFv2 process-start environment (round to nearest, no traps,
//! IEEE mode, flags clear). FP modes a powerpc64 host thread changed
//! before attaching are not seen.

use super::HostState;

pub fn capture_host_state() -> HostState {
    HostState::default()
}
