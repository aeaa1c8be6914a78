//! Thread-local migration state
//!
//! Everything here belongs to one OS thread. Only the pending-request
//! flag is shared: a `RequestHandle` holds a clone of the `Arc` so other
//! threads can raise or cancel requests.

use std::cell::{Cell, RefCell};
use std::sync::Arc;

use xmig_core::{Arch, CallbackBinding, MigrateError, MigrateResult, MigrationRequest, PendingState};

use crate::context::ThreadContext;

const ARCH_HOST: u8 = u8::MAX;

thread_local! {
    /// Pending migration request for this thread
    static PENDING: Arc<PendingState> = Arc::new(PendingState::new());

    /// Migration context, present while attached
    static CONTEXT: RefCell<Option<ThreadContext>> = const { RefCell::new(None) };

    /// Callback registered with `register_migrate_callback`
    static DEFAULT_CALLBACK: Cell<Option<CallbackBinding>> = const { Cell::new(None) };

    /// Set while a migration runs on this thread
    static IN_FLIGHT: Cell<bool> = const { Cell::new(false) };

    /// ISA the thread currently executes on
    static CURRENT_ARCH: Cell<u8> = const { Cell::new(ARCH_HOST) };
}

/// Whether a migration request is pending for this thread
#[inline(always)]
pub fn is_pending() -> bool {
    PENDING.with(|p| p.is_pending())
}

/// Shared pending-request flag of this thread
#[inline]
pub fn pending_state() -> Arc<PendingState> {
    PENDING.with(Arc::clone)
}

/// Consume the pending request
#[inline]
pub fn take_request() -> Option<MigrationRequest> {
    PENDING.with(|p| p.take())
}

/// Drop any pending request
#[inline]
pub fn clear_request() -> bool {
    PENDING.with(|p| p.clear())
}

/// Replace the registered callback, returning the previous one
#[inline]
pub fn set_default_callback(binding: Option<CallbackBinding>) -> Option<CallbackBinding> {
    DEFAULT_CALLBACK.with(|cell| cell.replace(binding))
}

#[inline]
pub fn default_callback() -> Option<CallbackBinding> {
    DEFAULT_CALLBACK.with(|cell| cell.get())
}

/// Mark a migration as running; false if one already is
#[inline]
pub fn enter_migration() -> bool {
    IN_FLIGHT.with(|cell| !cell.replace(true))
}

#[inline]
pub fn leave_migration() {
    IN_FLIGHT.with(|cell| cell.set(false));
}

#[inline]
pub fn in_migration() -> bool {
    IN_FLIGHT.with(|cell| cell.get())
}

#[inline]
pub fn set_current_arch(arch: Arch) {
    CURRENT_ARCH.with(|cell| cell.set(arch as u8));
}

/// Forget the recorded ISA; the thread reports the host ISA again
#[inline]
pub fn reset_current_arch() {
    CURRENT_ARCH.with(|cell| cell.set(ARCH_HOST));
}

/// ISA this thread currently executes on
#[inline]
pub fn current_arch() -> Arch {
    let raw = CURRENT_ARCH.with(|cell| cell.get());
    Arch::try_from(raw).unwrap_or_else(|_| Arch::current())
}

/// Install the migration context
pub fn install_context(ctx: ThreadContext) -> MigrateResult<()> {
    CONTEXT.with(|cell| {
        let mut slot = cell.try_borrow_mut().map_err(|_| MigrateError::InFlight)?;
        if slot.is_some() {
            return Err(MigrateError::AlreadyAttached);
        }
        *slot = Some(ctx);
        Ok(())
    })
}

/// Remove the migration context
pub fn take_context() -> MigrateResult<ThreadContext> {
    CONTEXT.with(|cell| {
        cell.try_borrow_mut()
            .map_err(|_| MigrateError::InFlight)?
            .take()
            .ok_or(MigrateError::NotAttached)
    })
}

#[inline]
pub fn is_attached() -> bool {
    CONTEXT.with(|cell| cell.try_borrow().map_or(true, |c| c.is_some()))
}

/// Run `f` with the migration context
///
/// Fails with `NotAttached` without one and with `InFlight` when called
/// from inside another `with_context` on the same thread.
pub fn with_context<R>(f: impl FnOnce(&mut ThreadContext) -> R) -> MigrateResult<R> {
    CONTEXT.with(|cell| {
        let mut slot = cell.try_borrow_mut().map_err(|_| MigrateError::InFlight)?;
        let ctx = slot.as_mut().ok_or(MigrateError::NotAttached)?;
        Ok(f(ctx))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use xmig_core::RequestedBy;

    #[test]
    fn test_pending_shared_with_handle() {
        let state = pending_state();
        assert!(!is_pending());
        state.set(MigrationRequest::new(Arch::PowerPc64, RequestedBy::Explicit));
        assert!(is_pending());
        let req = take_request().unwrap();
        assert_eq!(req.destination, Arch::PowerPc64);
        assert!(!is_pending());
    }

    #[test]
    fn test_pending_is_per_thread() {
        pending_state().set(MigrationRequest::new(Arch::AArch64, RequestedBy::Explicit));
        let other = std::thread::spawn(is_pending).join().unwrap();
        assert!(!other);
        assert!(clear_request());
    }

    #[test]
    fn test_in_flight_guard() {
        assert!(enter_migration());
        assert!(!enter_migration());
        assert!(in_migration());
        leave_migration();
        assert!(!in_migration());
    }

    #[test]
    fn test_current_arch_defaults_to_host() {
        assert_eq!(current_arch(), Arch::current());
        set_current_arch(Arch::PowerPc64);
        assert_eq!(current_arch(), Arch::PowerPc64);
        reset_current_arch();
        assert_eq!(current_arch(), Arch::current());
    }

    #[test]
    fn test_without_context() {
        assert!(!is_attached());
        assert_eq!(with_context(|_| ()).unwrap_err(), MigrateError::NotAttached);
        assert_eq!(take_context().unwrap_err(), MigrateError::NotAttached);
    }
}
