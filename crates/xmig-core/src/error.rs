//! Error types for thread migration

use core::fmt;

use crate::arch::Arch;
use crate::id::{FunctionId, SiteId};

/// Result type for migration operations
pub type MigrateResult<T> = Result<T, MigrateError>;

/// Errors surfaced by the migration engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrateError {
    /// The calling thread has no migration context
    NotAttached,

    /// The calling thread already has a migration context
    AlreadyAttached,

    /// `migrate` was called with nothing pending and no explicit destination
    NoDestination,

    /// A migration is already running on this thread
    InFlight,

    /// The state cannot be expressed on the destination ISA (fatal)
    LossyTranslation(TranslateError),

    /// The transport could not reach the destination node (recoverable)
    TransferUnreachable(Arch),

    /// The transport refused the packet (recoverable)
    TransferRejected(&'static str),

    /// Stack walk or rewrite failed
    Stack(StackError),

    /// Stack region allocation failed
    Memory(MemoryError),

    /// Configuration failed validation
    InvalidConfig(&'static str),
}

impl MigrateError {
    /// Errors after which the thread's state can no longer be trusted
    ///
    /// The public entry points abort the process on these.
    pub fn is_fatal(&self) -> bool {
        match self {
            MigrateError::LossyTranslation(_) => true,
            MigrateError::Stack(e) => e.is_corruption(),
            _ => false,
        }
    }
}

impl fmt::Display for MigrateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrateError::NotAttached => write!(f, "thread is not attached"),
            MigrateError::AlreadyAttached => write!(f, "thread is already attached"),
            MigrateError::NoDestination => write!(f, "no migration pending"),
            MigrateError::InFlight => write!(f, "migration already in flight"),
            MigrateError::LossyTranslation(e) => write!(f, "lossy translation: {}", e),
            MigrateError::TransferUnreachable(arch) => {
                write!(f, "destination {} unreachable", arch)
            }
            MigrateError::TransferRejected(why) => write!(f, "transfer rejected: {}", why),
            MigrateError::Stack(e) => write!(f, "stack error: {}", e),
            MigrateError::Memory(e) => write!(f, "memory error: {}", e),
            MigrateError::InvalidConfig(why) => write!(f, "invalid config: {}", why),
        }
    }
}

impl std::error::Error for MigrateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MigrateError::LossyTranslation(e) => Some(e),
            MigrateError::Stack(e) => Some(e),
            MigrateError::Memory(e) => Some(e),
            _ => None,
        }
    }
}

/// Register state that cannot be moved between ISAs without loss
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslateError {
    /// A code address with no call-site entry for this ISA
    UnmappedAddress { arch: Arch, addr: u64 },

    /// A site id the program image does not know
    UnknownSite(SiteId),

    /// A live status flag that has no meaning outside its own ISA
    UnrepresentableFlag { arch: Arch, flag: &'static str },

    /// An FP mode the destination cannot honour, or the source uses a
    /// mode with no neutral form
    UnrepresentableFpMode { arch: Arch, what: &'static str },

    /// Thread pointer that cannot correspond to a TLS block
    InvalidThreadPointer { arch: Arch, value: u64 },
}

impl fmt::Display for TranslateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranslateError::UnmappedAddress { arch, addr } => {
                write!(f, "{:#x} is not a known {} call site", addr, arch)
            }
            TranslateError::UnknownSite(site) => write!(f, "unknown {}", site),
            TranslateError::UnrepresentableFlag { arch, flag } => {
                write!(f, "{} flag {} cannot be carried across ISAs", arch, flag)
            }
            TranslateError::UnrepresentableFpMode { arch, what } => {
                write!(f, "{} FP mode not representable: {}", arch, what)
            }
            TranslateError::InvalidThreadPointer { arch, value } => {
                write!(f, "invalid {} thread pointer {:#x}", arch, value)
            }
        }
    }
}

impl std::error::Error for TranslateError {}

impl From<TranslateError> for MigrateError {
    fn from(e: TranslateError) -> Self {
        MigrateError::LossyTranslation(e)
    }
}

/// Stack walk / rewrite errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackError {
    /// Access outside the thread stack region
    OutOfBounds { addr: u64 },

    /// Word access not 8-byte aligned, or frame not 16-byte aligned
    Misaligned { addr: u64 },

    /// Frame chain does not make sense at `depth` (0 = innermost)
    Corrupt { depth: usize, reason: &'static str },

    /// Walk exceeded the configured frame limit
    TooDeep { limit: usize },

    /// Destination layout does not fit in the stack half
    Overflow { needed: u64, available: u64 },

    /// A frame's slot vector disagrees with the function's metadata
    SlotCountMismatch {
        function: FunctionId,
        expected: usize,
        found: usize,
    },
}

impl StackError {
    /// Whether the error means the live stack itself is damaged
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            StackError::OutOfBounds { .. }
                | StackError::Misaligned { .. }
                | StackError::Corrupt { .. }
                | StackError::TooDeep { .. }
        )
    }
}

impl fmt::Display for StackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackError::OutOfBounds { addr } => write!(f, "address {:#x} outside stack", addr),
            StackError::Misaligned { addr } => write!(f, "misaligned stack address {:#x}", addr),
            StackError::Corrupt { depth, reason } => {
                write!(f, "corrupt frame at depth {}: {}", depth, reason)
            }
            StackError::TooDeep { limit } => write!(f, "more than {} frames", limit),
            StackError::Overflow { needed, available } => {
                write!(f, "needs {} bytes of stack, {} available", needed, available)
            }
            StackError::SlotCountMismatch {
                function,
                expected,
                found,
            } => write!(
                f,
                "{} has {} slots, frame carries {}",
                function, expected, found
            ),
        }
    }
}

impl std::error::Error for StackError {}

impl From<StackError> for MigrateError {
    fn from(e: StackError) -> Self {
        MigrateError::Stack(e)
    }
}

/// Memory-related errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// mmap failed
    AllocationFailed,

    /// mprotect failed
    ProtectionFailed,

    /// munmap failed
    ReleaseFailed,

    /// Size is zero, unaligned or overflows
    InvalidSize(usize),
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::AllocationFailed => write!(f, "memory allocation failed"),
            MemoryError::ProtectionFailed => write!(f, "memory protection change failed"),
            MemoryError::ReleaseFailed => write!(f, "memory release failed"),
            MemoryError::InvalidSize(size) => write!(f, "invalid region size {}", size),
        }
    }
}

impl std::error::Error for MemoryError {}

impl From<MemoryError> for MigrateError {
    fn from(e: MemoryError) -> Self {
        MigrateError::Memory(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = MigrateError::TransferUnreachable(Arch::PowerPc64);
        assert_eq!(format!("{}", e), "destination powerpc64 unreachable");

        let e: MigrateError = TranslateError::UnrepresentableFlag {
            arch: Arch::X86_64,
            flag: "DF",
        }
        .into();
        assert_eq!(
            format!("{}", e),
            "lossy translation: x86_64 flag DF cannot be carried across ISAs"
        );
    }

    #[test]
    fn test_fatal_classification() {
        let lossy = MigrateError::LossyTranslation(TranslateError::UnknownSite(SiteId::new(5)));
        assert!(lossy.is_fatal());
        assert!(MigrateError::Stack(StackError::TooDeep { limit: 4 }).is_fatal());
        assert!(!MigrateError::Stack(StackError::Overflow { needed: 1, available: 0 }).is_fatal());
        assert!(!MigrateError::TransferUnreachable(Arch::X86_64).is_fatal());
        assert!(!MigrateError::NoDestination.is_fatal());
    }

    #[test]
    fn test_error_source() {
        use std::error::Error;
        let e: MigrateError = MemoryError::AllocationFailed.into();
        assert!(e.source().is_some());
        assert!(MigrateError::InFlight.source().is_none());
    }
}
