//! C ABI
//!
//! ```c
//! enum arch { AARCH64 = 0, POWERPC64, X86_64, NUM_ARCHES };
//!
//! void check_migrate(void (*callback)(void *), void *callback_data);
//! void migrate(void (*callback)(void *), void *callback_data);
//! void register_migrate_callback(void (*callback)(void *), void *callback_data);
//! ```
//!
//! A null `callback` means "none". The calling thread must have been
//! attached from Rust first; on a detached thread all three are no-ops.

use core::ffi::{c_int, c_void};

use xmig_core::{kwarn, Arch, CallbackBinding, MigrateCallback, MigrateError, NUM_ARCHES};
use xmig_runtime::{dispatch, engine, tls};

pub const AARCH64: c_int = Arch::AArch64 as c_int;
pub const POWERPC64: c_int = Arch::PowerPc64 as c_int;
pub const X86_64: c_int = Arch::X86_64 as c_int;
pub const NUM_ARCHES_C: c_int = NUM_ARCHES as c_int;

#[inline]
fn binding(callback: Option<MigrateCallback>, data: *mut c_void) -> Option<CallbackBinding> {
    callback.map(|f| CallbackBinding::new(f, data))
}

#[no_mangle]
pub extern "C" fn check_migrate(callback: Option<MigrateCallback>, callback_data: *mut c_void) {
    dispatch::check_migrate(binding(callback, callback_data));
}

#[no_mangle]
pub extern "C" fn migrate(callback: Option<MigrateCallback>, callback_data: *mut c_void) {
    match engine::try_migrate(binding(callback, callback_data), None) {
        Ok(_) | Err(MigrateError::NoDestination) => {}
        Err(e) if e.is_fatal() => engine::fatal(&e),
        Err(e) => kwarn!("migrate: {}", e),
    }
}

#[no_mangle]
pub extern "C" fn register_migrate_callback(
    callback: Option<MigrateCallback>,
    callback_data: *mut c_void,
) {
    dispatch::register_migrate_callback(binding(callback, callback_data));
}

/// `enum arch` value of the ISA the calling thread runs on
#[no_mangle]
pub extern "C" fn current_arch() -> c_int {
    tls::current_arch() as c_int
}
