//! # xmig-core
//!
//! Core types for xmig, live migration of a thread between nodes of
//! different instruction-set architectures.
//!
//! This crate is platform-agnostic: it describes machine state but never
//! touches the machine. The engine that captures, translates and installs
//! state lives in `xmig-runtime`.
//!
//! ## Modules
//!
//! - `arch` - The closed set of supported ISAs
//! - `regs` - Native register files, one per ISA
//! - `context` - Architecture-neutral captured context
//! - `frame` - Stack frame descriptors
//! - `id` - Site, function and thread identifiers
//! - `program` - Per-ISA call-site metadata (the compiler's stack maps)
//! - `request` - Migration requests and the pending-migration slot
//! - `callback` - Callback bindings invoked after landing
//! - `traits` - Collaborator interfaces (transport)
//! - `error` - Error types
//! - `kprint` - Kernel-style debug printing macros
//! - `env` - Environment variable utilities

#[cfg(not(any(
    target_arch = "x86_64",
    target_arch = "aarch64",
    target_arch = "powerpc64"
)))]
compile_error!("Unknown/unsupported architecture! xmig supports aarch64, powerpc64 and x86_64");

pub mod arch;
pub mod regs;
pub mod context;
pub mod frame;
pub mod id;
pub mod program;
pub mod request;
pub mod callback;
pub mod traits;
pub mod error;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use arch::{Arch, NUM_ARCHES};
pub use regs::{ArchRegs, AArch64Regs, PowerPc64Regs, X86_64Regs};
pub use context::{CapturedContext, CondFlags, FpEnv, FpExceptions, NeutralThread, RoundingMode};
pub use frame::{NeutralFrame, StackFrame};
pub use id::{FunctionId, SiteId, ThreadToken};
pub use program::{CallSite, FunctionInfo, ImageError, ProgramImage, ProgramImageBuilder, TlsLayout};
pub use request::{MigrationRequest, PendingState, RequestHandle, RequestedBy};
pub use callback::{CallbackBinding, MigrateCallback};
pub use traits::{TransferError, TransferPacket, Transport};
pub use error::{MemoryError, MigrateError, MigrateResult, StackError, TranslateError};
pub use env::{env_get, env_get_bool, env_get_opt, env_get_size, env_get_str, env_is_set};

/// Constants shared by the translator and the stack rewriter
pub mod constants {
    /// Machine word size on every supported ISA
    pub const WORD_SIZE: u64 = 8;

    /// Stack alignment at call boundaries (identical on all three ISAs)
    pub const STACK_ALIGN: u64 = 16;

    /// Argument words carried through a migration point
    pub const ARG_WORDS: usize = 6;

    /// Neutral callee-saved general-purpose slots (PowerPC64 r14-r31 is the widest)
    pub const CALLEE_SAVED_GPRS: usize = 18;

    /// Neutral callee-saved floating-point slots (PowerPC64 f14-f31)
    pub const CALLEE_SAVED_FPRS: usize = 18;

    /// Neutral callee-saved vector slots (PowerPC64 v20-v31)
    pub const CALLEE_SAVED_VRS: usize = 12;

    /// Neutral callee-saved condition fields (PowerPC64 CR2-CR4)
    pub const CALLEE_SAVED_COND_FIELDS: usize = 3;

    /// Minimum per-half stack size
    pub const MIN_STACK_SIZE: usize = 64 * 1024;
}
