//! Migration requests and the per-thread pending slot
//!
//! The pending slot is a single byte so the migration-point check is one
//! relaxed load. Layout:
//! ```text
//! 0xFF          nothing pending
//! bits 0..=3    destination (Arch discriminant)
//! bits 4..=7    RequestedBy discriminant
//! ```

use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::arch::Arch;

const NONE_PENDING: u8 = 0xFF;

/// Who asked for the migration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RequestedBy {
    /// External controller; honoured at the next instrumented migration point
    Instrumentation = 0,
    /// The thread itself, via `migrate_to`
    Explicit = 1,
}

impl RequestedBy {
    #[inline]
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(RequestedBy::Instrumentation),
            1 => Some(RequestedBy::Explicit),
            _ => None,
        }
    }
}

impl fmt::Display for RequestedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestedBy::Instrumentation => write!(f, "instrumentation"),
            RequestedBy::Explicit => write!(f, "explicit"),
        }
    }
}

/// A request to move a thread to `destination`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MigrationRequest {
    pub destination: Arch,
    pub requested_by: RequestedBy,
}

impl MigrationRequest {
    pub const fn new(destination: Arch, requested_by: RequestedBy) -> Self {
        MigrationRequest {
            destination,
            requested_by,
        }
    }

    #[inline]
    const fn encode(self) -> u8 {
        ((self.requested_by as u8) << 4) | (self.destination as u8)
    }

    #[inline]
    fn decode(v: u8) -> Option<Self> {
        if v == NONE_PENDING {
            return None;
        }
        Some(MigrationRequest {
            destination: Arch::from_index((v & 0x0F) as usize)?,
            requested_by: RequestedBy::from_u8(v >> 4)?,
        })
    }
}

/// Pending-migration slot of one thread
///
/// Written by a controller on any thread, consumed by the owning thread.
#[derive(Debug)]
pub struct PendingState {
    slot: AtomicU8,
}

impl PendingState {
    pub const fn new() -> Self {
        PendingState {
            slot: AtomicU8::new(NONE_PENDING),
        }
    }

    /// Fast check for the migration point
    #[inline(always)]
    pub fn is_pending(&self) -> bool {
        self.slot.load(Ordering::Relaxed) != NONE_PENDING
    }

    /// Post a request, replacing any earlier one (last request wins)
    #[inline]
    pub fn set(&self, req: MigrationRequest) {
        self.slot.store(req.encode(), Ordering::Release);
    }

    /// Read without consuming
    #[inline]
    pub fn peek(&self) -> Option<MigrationRequest> {
        MigrationRequest::decode(self.slot.load(Ordering::Acquire))
    }

    /// Consume the pending request, if any
    #[inline]
    pub fn take(&self) -> Option<MigrationRequest> {
        MigrationRequest::decode(self.slot.swap(NONE_PENDING, Ordering::AcqRel))
    }

    /// Drop the pending request; returns whether one was pending
    #[inline]
    pub fn clear(&self) -> bool {
        self.take().is_some()
    }
}

impl Default for PendingState {
    fn default() -> Self {
        Self::new()
    }
}

/// Cross-thread handle for requesting migration of one attached thread
///
/// This is the seam for triggering policy: whatever decides *when* a thread
/// should move (a load balancer, a test, a signal) holds one of these.
#[derive(Debug, Clone)]
pub struct RequestHandle {
    state: Arc<PendingState>,
}

impl RequestHandle {
    pub fn new(state: Arc<PendingState>) -> Self {
        RequestHandle { state }
    }

    /// Ask the thread to migrate at its next migration point
    pub fn request(&self, destination: Arch) {
        self.state
            .set(MigrationRequest::new(destination, RequestedBy::Instrumentation));
    }

    /// Withdraw a request that has not been acted on yet
    pub fn cancel(&self) -> bool {
        self.state.clear()
    }

    pub fn is_pending(&self) -> bool {
        self.state.is_pending()
    }

    pub fn pending(&self) -> Option<MigrationRequest> {
        self.state.peek()
    }

    /// Whether two handles address the same thread
    pub fn same_thread(&self, other: &RequestHandle) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_slot() {
        let p = PendingState::new();
        assert!(!p.is_pending());
        assert_eq!(p.peek(), None);
        assert_eq!(p.take(), None);
    }

    #[test]
    fn test_take_consumes_once() {
        let p = PendingState::new();
        let req = MigrationRequest::new(Arch::PowerPc64, RequestedBy::Explicit);
        p.set(req);
        assert!(p.is_pending());
        assert_eq!(p.peek(), Some(req));
        assert_eq!(p.take(), Some(req));
        assert_eq!(p.take(), None);
    }

    #[test]
    fn test_encoding_roundtrip() {
        for arch in Arch::ALL {
            for by in [RequestedBy::Instrumentation, RequestedBy::Explicit] {
                let req = MigrationRequest::new(arch, by);
                assert_ne!(req.encode(), NONE_PENDING);
                assert_eq!(MigrationRequest::decode(req.encode()), Some(req));
            }
        }
    }

    #[test]
    fn test_handle_from_other_thread() {
        let state = Arc::new(PendingState::new());
        let handle = RequestHandle::new(state.clone());
        let h2 = handle.clone();
        std::thread::spawn(move || h2.request(Arch::AArch64))
            .join()
            .unwrap();
        assert!(state.is_pending());
        assert_eq!(
            handle.pending(),
            Some(MigrationRequest::new(Arch::AArch64, RequestedBy::Instrumentation))
        );
        assert!(handle.cancel());
        assert!(!handle.is_pending());
        assert!(!handle.cancel());
    }

    #[test]
    fn test_last_request_wins() {
        let state = Arc::new(PendingState::new());
        let handle = RequestHandle::new(state.clone());
        handle.request(Arch::AArch64);
        handle.request(Arch::X86_64);
        assert_eq!(state.take().map(|r| r.destination), Some(Arch::X86_64));
    }
}
