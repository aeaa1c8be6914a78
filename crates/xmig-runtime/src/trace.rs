//! Process-wide migration trace
//!
//! Completed migrations are pushed into a bounded lock-free ring; when it
//! is full the oldest record is dropped. Counters cover every attempt,
//! including the ones that never reached the ring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

use crossbeam_queue::ArrayQueue;
use xmig_core::{Arch, RequestedBy, ThreadToken};

/// One completed migration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    pub thread: ThreadToken,
    pub from: Arch,
    pub to: Arch,
    /// User frames carried across
    pub frames: usize,
    pub requested_by: RequestedBy,
    pub elapsed: Duration,
}

/// Snapshot of the migration counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MigrationStats {
    pub completed: u64,
    /// Recoverable failures (unreachable or rejected transfers)
    pub failed: u64,
    /// Records pushed out of a full ring
    pub dropped: u64,
}

struct Counters {
    completed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

static RING: OnceLock<ArrayQueue<MigrationRecord>> = OnceLock::new();

static COUNTERS: Counters = Counters {
    completed: AtomicU64::new(0),
    failed: AtomicU64::new(0),
    dropped: AtomicU64::new(0),
};

/// Size the ring; only the first call has an effect
pub fn init(capacity: usize) {
    RING.get_or_init(|| ArrayQueue::new(capacity.max(1)));
}

/// Record a completed migration
pub fn record(rec: MigrationRecord) {
    COUNTERS.completed.fetch_add(1, Ordering::Relaxed);
    if let Some(ring) = RING.get() {
        if ring.force_push(rec).is_some() {
            COUNTERS.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Count a recoverable failure
pub fn record_failure() {
    COUNTERS.failed.fetch_add(1, Ordering::Relaxed);
}

/// Take every record currently in the ring, oldest first
pub fn drain() -> Vec<MigrationRecord> {
    let Some(ring) = RING.get() else {
        return Vec::new();
    };
    let mut out = Vec::with_capacity(ring.len());
    while let Some(rec) = ring.pop() {
        out.push(rec);
    }
    out
}

pub fn stats() -> MigrationStats {
    MigrationStats {
        completed: COUNTERS.completed.load(Ordering::Relaxed),
        failed: COUNTERS.failed.load(Ordering::Relaxed),
        dropped: COUNTERS.dropped.load(Ordering::Relaxed),
    }
}
