//! Migration engine
//!
//! Runs one migration of the calling thread:
//!
//! 1. capture the live state at the migration-shim frame
//! 2. translate it and lay the destination frames into the scratch half
//! 3. hand the packet to the transport
//! 4. flip halves, install the destination registers, switch ISA
//! 5. run the callback exactly once
//!
//! Everything up to step 4 writes only the scratch half, so any failure
//! before the transport accepts the packet leaves the thread as it was.

use std::time::{Duration, Instant};

use xmig_core::{
    kdebug, kerror, Arch, CallbackBinding, MigrateError, MigrateResult, MigrationRequest,
    RequestedBy, TransferPacket,
};

use crate::context::ThreadContext;
use crate::tls;
use crate::trace::{self, MigrationRecord};

/// What a completed migration did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationOutcome {
    pub from: Arch,
    pub to: Arch,
    /// User frames carried across
    pub frames: usize,
    pub requested_by: RequestedBy,
    pub elapsed: Duration,
}

/// Clears the in-flight flag on every exit path
struct FlightGuard;

impl FlightGuard {
    fn enter() -> MigrateResult<Self> {
        if tls::enter_migration() {
            Ok(FlightGuard)
        } else {
            Err(MigrateError::InFlight)
        }
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        tls::leave_migration();
    }
}

/// Migrate the calling thread
///
/// With `explicit` set the thread moves there and any pending request is
/// dropped; otherwise the pending request is consumed. `callback` runs on
/// the destination after the new state is live. Once a request has been
/// taken, every failure counts in `MigrationStats::failed`.
pub fn try_migrate(
    callback: Option<CallbackBinding>,
    explicit: Option<Arch>,
) -> MigrateResult<MigrationOutcome> {
    let _guard = FlightGuard::enter()?;
    let outcome = tls::with_context(|ctx| {
        let request = match explicit {
            Some(dest) => {
                tls::clear_request();
                MigrationRequest::new(dest, RequestedBy::Explicit)
            }
            None => tls::take_request().ok_or(MigrateError::NoDestination)?,
        };
        run(ctx, request).inspect_err(|_| trace::record_failure())
    })??;

    if let Some(cb) = callback {
        // SAFETY: the binding's creator vouches for func/data.
        unsafe { cb.invoke() };
    }
    Ok(outcome)
}

/// Capture, translate, transfer and resume for one taken request
fn run(ctx: &mut ThreadContext, request: MigrationRequest) -> MigrateResult<MigrationOutcome> {
    let start = Instant::now();
    let from = ctx.image.arch();
    let dest = request.destination;

    let neutral = ctx.image.capture()?;
    let prepared = ctx.image.prepare(&neutral, dest)?;

    let packet = TransferPacket {
        thread: ctx.token,
        request,
        regs: prepared.regs().clone(),
        stack_span: prepared.span(),
    };
    let delivered = ctx.transport.transfer(packet)?;
    if delivered.regs != *prepared.regs() {
        return Err(MigrateError::TransferRejected(
            "destination changed the register file",
        ));
    }

    let frames = prepared.depth();
    ctx.image.resume(prepared);
    tls::set_current_arch(dest);

    let outcome = MigrationOutcome {
        from,
        to: dest,
        frames,
        requested_by: request.requested_by,
        elapsed: start.elapsed(),
    };
    trace::record(MigrationRecord {
        thread: ctx.token,
        from,
        to: dest,
        frames,
        requested_by: request.requested_by,
        elapsed: outcome.elapsed,
    });
    kdebug!(
        "{} migrated {} -> {} ({} frames, {:?}, {})",
        ctx.token,
        from,
        dest,
        frames,
        outcome.elapsed,
        request.requested_by
    );
    Ok(outcome)
}

/// Log and abort on an error that leaves the thread untrustworthy
#[cold]
pub fn fatal(err: &MigrateError) -> ! {
    kerror!("fatal migration error: {}", err);
    std::process::abort()
}
