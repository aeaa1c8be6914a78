//! # xmig - cross-ISA live thread migration
//!
//! Moves a running thread between nodes of different instruction-set
//! architectures (AArch64, PowerPC64, x86-64) at well-defined migration
//! points, rewriting its registers and stack frames into the destination's
//! calling conventions.
//!
//! ## Features
//!
//! - **Cheap migration points**: `check_migrate` is one relaxed load when
//!   nothing is pending
//! - **Neutral form**: registers are lifted by role (argument, callee-saved,
//!   flags, FP environment), never by name; nothing is dropped
//! - **Atomic rewrite**: destination frames are built in the scratch half of
//!   a two-half stack and flipped in only after the transport accepts them
//! - **Callbacks**: run exactly once on the destination, before the
//!   migration point returns
//! - **C ABI** (`capi` feature) and `-finstrument-functions` hooks
//!   (`instrument` feature)
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use xmig::{attach, migration_point, AttachOptions, Arch, ProgramImage};
//!
//! let mut b = ProgramImage::builder();
//! let main = b.function("main", 2);
//! let site = b.call_site(main);
//! let program = Arc::new(b.build()?);
//!
//! let guard = attach(AttachOptions::new(program))?;
//! xmig::with_thread_image(|img| img.push_frame(site, vec![1, 2]))??;
//!
//! // Some controller decides the thread should move
//! guard.handle().request(Arch::AArch64);
//!
//! // Next migration point in the thread
//! migration_point!();
//! assert_eq!(xmig::current_arch(), Arch::AArch64);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Instrumented user code                      │
//! │        check_migrate(), migrate(), migration_point!()       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Engine                               │
//! │   capture -> translate -> rewrite -> transfer -> resume     │
//! └─────────────────────────────────────────────────────────────┘
//!          │                   │                   │
//!          ▼                   ▼                   ▼
//!    ┌───────────┐      ┌───────────┐      ┌───────────┐
//!    │ Translator│      │   Stack   │      │ Transport │
//!    │ per ISA   │      │ rewriter  │      │  (trait)  │
//!    └───────────┘      └───────────┘      └───────────┘
//!                              │
//!                              ▼
//!    ┌─────────────────────────────────────────────────────────┐
//!    │                 Thread stack region                     │
//!    │     guard page + two halves (active / scratch), mmap    │
//!    └─────────────────────────────────────────────────────────┘
//! ```

use std::marker::PhantomData;

// Re-export core types
pub use xmig_core::{
    Arch, ArchRegs, CallbackBinding, CapturedContext, CondFlags, FpEnv, FpExceptions, FunctionId,
    MigrateCallback, MigrateError, MigrateResult, MigrationRequest, NeutralFrame, NeutralThread,
    ProgramImage, ProgramImageBuilder, RequestHandle, RequestedBy, SiteId, StackError,
    StackFrame, ThreadToken, TransferError, TransferPacket, TranslateError, Transport,
};

// Re-export kprint macros for debug logging
pub use xmig_core::kprint::{
    init as init_logging, set_flush_enabled, set_log_level, set_time_enabled, LogLevel,
};
pub use xmig_core::{kdebug, kerror, kinfo, kprint, kprintln, ktrace, kwarn};

// Re-export env utilities
pub use xmig_core::{env_get, env_get_bool, env_get_opt, env_get_size, env_get_str, env_is_set};

// Re-export runtime types
pub use xmig_runtime::{
    AttachOptions, LoopbackTransport, MigrateConfig, MigrationOutcome, MigrationRecord,
    MigrationStats, ThreadImage,
};

use xmig_runtime::{context, dispatch, engine, tls, trace};

#[cfg(feature = "capi")]
pub mod capi;

#[cfg(feature = "instrument")]
pub mod instrument;

/// Keeps the calling thread attached; detaches on drop
///
/// Not `Send`: the attachment belongs to the thread that created it.
#[must_use = "dropping the guard detaches the thread"]
#[derive(Debug)]
pub struct ThreadGuard {
    handle: RequestHandle,
    _thread: PhantomData<*const ()>,
}

impl ThreadGuard {
    /// Handle for requesting migrations of this thread from anywhere
    pub fn handle(&self) -> &RequestHandle {
        &self.handle
    }
}

impl Drop for ThreadGuard {
    fn drop(&mut self) {
        if let Err(e) = context::detach() {
            kdebug!("thread guard: {}", e);
        }
    }
}

/// Attach the calling thread to the migration runtime
pub fn attach(opts: AttachOptions) -> MigrateResult<ThreadGuard> {
    let handle = context::attach(opts)?;
    Ok(ThreadGuard {
        handle,
        _thread: PhantomData,
    })
}

/// Detach the calling thread early; the guard's drop then does nothing
pub fn detach() -> MigrateResult<()> {
    context::detach()
}

/// Migration point: migrate if a request is pending
///
/// Uses `callback`, or the registered callback when `None`. Returns
/// whether the thread migrated. Failures never reach the caller except a
/// lossy translation, which aborts the process.
#[inline(always)]
pub fn check_migrate(callback: Option<CallbackBinding>) -> bool {
    dispatch::check_migrate(callback)
}

/// Migrate now, to wherever the pending request says
///
/// Never consults the registered callback. A lossy translation or a
/// corrupt stack aborts the process; other failures are returned and
/// leave the thread where it was.
pub fn migrate(callback: Option<CallbackBinding>) -> MigrateResult<MigrationOutcome> {
    checked(engine::try_migrate(callback, None))
}

/// Migrate now to `dest`, dropping any pending request
pub fn migrate_to(dest: Arch, callback: Option<CallbackBinding>) -> MigrateResult<MigrationOutcome> {
    checked(engine::try_migrate(callback, Some(dest)))
}

fn checked(result: MigrateResult<MigrationOutcome>) -> MigrateResult<MigrationOutcome> {
    match result {
        Err(e) if e.is_fatal() => engine::fatal(&e),
        other => other,
    }
}

/// Set the callback migration points use when given none
///
/// Last registration wins; `None` clears. Returns the previous callback.
pub fn register_migrate_callback(callback: Option<CallbackBinding>) -> Option<CallbackBinding> {
    dispatch::register_migrate_callback(callback)
}

/// ISA the calling thread currently executes on
#[inline]
pub fn current_arch() -> Arch {
    tls::current_arch()
}

/// Request handle of the calling thread
pub fn request_handle() -> RequestHandle {
    context::request_handle()
}

/// Run `f` on the calling thread's image
///
/// Fails with `NotAttached` when the thread is detached.
pub fn with_thread_image<R>(f: impl FnOnce(&mut ThreadImage) -> R) -> MigrateResult<R> {
    tls::with_context(|ctx| f(&mut ctx.image))
}

/// Completed migrations since the last drain, oldest first
pub fn drain_migrations() -> Vec<MigrationRecord> {
    trace::drain()
}

pub fn migration_stats() -> MigrationStats {
    trace::stats()
}

/// Insert a migration point
///
/// ```ignore
/// migration_point!();            // registered callback
/// migration_point!(binding);     // explicit callback
/// ```
#[macro_export]
macro_rules! migration_point {
    () => {
        $crate::check_migrate(::core::option::Option::None)
    };
    ($cb:expr) => {
        $crate::check_migrate(::core::option::Option::Some($cb))
    };
}
