//! Migration-point dispatcher
//!
//! `check_migrate` is what instrumented code calls at every migration
//! point, so the common case (nothing pending) is one relaxed load and a
//! branch. Everything else is in the cold path.

use xmig_core::{kdebug, kwarn, CallbackBinding, MigrateError};

use crate::engine::{fatal, try_migrate};
use crate::tls;

/// Migrate if a request is pending
///
/// Uses `callback`, or the thread's registered callback when `None`.
/// Returns whether the thread migrated. Recoverable failures are logged
/// and swallowed; a lossy translation or a corrupt stack aborts.
#[inline(always)]
pub fn check_migrate(callback: Option<CallbackBinding>) -> bool {
    if !tls::is_pending() {
        return false;
    }
    check_migrate_slow(callback)
}

#[cold]
#[inline(never)]
fn check_migrate_slow(callback: Option<CallbackBinding>) -> bool {
    let callback = callback.or_else(tls::default_callback);
    match try_migrate(callback, None) {
        Ok(_) => true,
        Err(e) if e.is_fatal() => fatal(&e),
        // Another migration point raced us to the request
        Err(MigrateError::NoDestination) => false,
        // Nothing can ever serve it, so stop taking the slow path
        Err(MigrateError::NotAttached) => {
            tls::clear_request();
            kdebug!("migration point on a detached thread, request dropped");
            false
        }
        Err(e) => {
            kwarn!("migration point: {}", e);
            false
        }
    }
}

/// Register the callback `check_migrate` uses when given none
///
/// Last registration wins; `None` clears it. Returns the previous one.
pub fn register_migrate_callback(callback: Option<CallbackBinding>) -> Option<CallbackBinding> {
    tls::set_default_callback(callback)
}
