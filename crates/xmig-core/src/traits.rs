//! Collaborator interfaces
//!
//! The runtime never talks to another node directly. Shipping the
//! translated register file to the destination and starting the thread
//! there is the transport's job; the stack itself is assumed to live in
//! memory every node can see.

use core::fmt;

use crate::arch::Arch;
use crate::id::ThreadToken;
use crate::regs::ArchRegs;
use crate::request::MigrationRequest;

/// What crosses the wire for one migration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPacket {
    pub thread: ThreadToken,
    pub request: MigrationRequest,
    /// Destination-ISA registers, ready to install
    pub regs: ArchRegs,
    /// Lowest and highest address of the rewritten stack span
    pub stack_span: (u64, u64),
}

impl TransferPacket {
    #[inline]
    pub fn destination(&self) -> Arch {
        self.request.destination
    }
}

/// Transport failures
///
/// Both are recoverable: the source thread is untouched and keeps running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// No node of that ISA can be reached
    Unreachable(Arch),
    /// The destination refused the thread
    Rejected(&'static str),
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::Unreachable(arch) => write!(f, "{} node unreachable", arch),
            TransferError::Rejected(why) => write!(f, "rejected: {}", why),
        }
    }
}

impl std::error::Error for TransferError {}

impl From<TransferError> for crate::error::MigrateError {
    fn from(e: TransferError) -> Self {
        match e {
            TransferError::Unreachable(arch) => crate::error::MigrateError::TransferUnreachable(arch),
            TransferError::Rejected(why) => crate::error::MigrateError::TransferRejected(why),
        }
    }
}

/// Moves a translated thread to a node of another ISA
pub trait Transport: Send + Sync {
    /// Whether a node of `arch` is currently reachable
    fn is_reachable(&self, arch: Arch) -> bool;

    /// Deliver `packet` and hand back what the destination will install
    ///
    /// Must not have side effects on failure.
    fn transfer(&self, packet: TransferPacket) -> Result<TransferPacket, TransferError>;

    /// Short name for logs
    fn name(&self) -> &'static str {
        "transport"
    }
}
