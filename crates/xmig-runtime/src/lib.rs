//! # xmig-runtime
//!
//! Migration engine for xmig.
//!
//! This crate provides:
//! - Architecture state translation (native registers <-> neutral form)
//! - Stack walking and rewriting over a two-half stack region (mmap)
//! - The migration engine and the migration-point dispatcher
//! - Per-thread state, callback registry and attach/detach
//! - An in-process loopback transport and a process-wide migration trace
//! - Host FP-environment capture (architecture-specific inline asm)

pub mod arch;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod engine;
pub mod memory;
pub mod stack;
pub mod thread;
pub mod tls;
pub mod trace;
pub mod translate;
pub mod transport;

// Re-exports
pub use config::{ConfigError, MigrateConfig};
pub use context::{attach, detach, request_handle, AttachOptions, ThreadContext};
pub use dispatch::{check_migrate, register_migrate_callback};
pub use engine::{try_migrate, MigrationOutcome};
pub use memory::ThreadStack;
pub use thread::{PreparedMigration, ThreadImage};
pub use trace::{MigrationRecord, MigrationStats};
pub use transport::LoopbackTransport;

cfg_if::cfg_if! {
    if #[cfg(not(unix))] {
        compile_error!("Unsupported platform: thread stacks need mmap");
    }
}
