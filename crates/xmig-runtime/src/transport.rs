//! In-process transport
//!
//! Treats every ISA as a node of the same process: delivery hands the
//! packet straight back. Nodes can be taken offline to exercise the
//! unreachable path.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use xmig_core::{kdebug, Arch, TransferError, TransferPacket, Transport, NUM_ARCHES};

/// Transport whose destination nodes live in this process
#[derive(Debug)]
pub struct LoopbackTransport {
    online: [AtomicBool; NUM_ARCHES],
    delivered: [AtomicU64; NUM_ARCHES],
}

impl LoopbackTransport {
    /// All nodes online
    pub fn new() -> Self {
        LoopbackTransport {
            online: core::array::from_fn(|_| AtomicBool::new(true)),
            delivered: core::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    /// Bring the node for `arch` up or down
    pub fn set_online(&self, arch: Arch, online: bool) {
        self.online[arch.as_index()].store(online, Ordering::Release);
    }

    /// Packets delivered to `arch` so far
    pub fn delivered(&self, arch: Arch) -> u64 {
        self.delivered[arch.as_index()].load(Ordering::Relaxed)
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for LoopbackTransport {
    fn is_reachable(&self, arch: Arch) -> bool {
        self.online[arch.as_index()].load(Ordering::Acquire)
    }

    fn transfer(&self, packet: TransferPacket) -> Result<TransferPacket, TransferError> {
        let dest = packet.destination();
        if !self.is_reachable(dest) {
            return Err(TransferError::Unreachable(dest));
        }
        if packet.regs.arch() != dest {
            return Err(TransferError::Rejected("registers do not match destination ISA"));
        }
        self.delivered[dest.as_index()].fetch_add(1, Ordering::Relaxed);
        kdebug!(
            "loopback: {} -> {} sp={:#x}",
            packet.thread,
            dest,
            packet.regs.sp()
        );
        Ok(packet)
    }

    fn name(&self) -> &'static str {
        "loopback"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xmig_core::{ArchRegs, MigrationRequest, RequestedBy, ThreadToken};

    fn packet(dest: Arch, regs: Arch) -> TransferPacket {
        TransferPacket {
            thread: ThreadToken::from_raw(7),
            request: MigrationRequest::new(dest, RequestedBy::Explicit),
            regs: ArchRegs::empty(regs),
            stack_span: (0x1000, 0x2000),
        }
    }

    #[test]
    fn test_delivers_to_online_node() {
        let t = LoopbackTransport::new();
        let back = t.transfer(packet(Arch::AArch64, Arch::AArch64)).unwrap();
        assert_eq!(back.stack_span, (0x1000, 0x2000));
        assert_eq!(t.delivered(Arch::AArch64), 1);
        assert_eq!(t.delivered(Arch::X86_64), 0);
    }

    #[test]
    fn test_offline_node_unreachable() {
        let t = LoopbackTransport::new();
        t.set_online(Arch::PowerPc64, false);
        assert!(!t.is_reachable(Arch::PowerPc64));
        assert_eq!(
            t.transfer(packet(Arch::PowerPc64, Arch::PowerPc64)).unwrap_err(),
            TransferError::Unreachable(Arch::PowerPc64)
        );
        assert_eq!(t.delivered(Arch::PowerPc64), 0);
        t.set_online(Arch::PowerPc64, true);
        assert!(t.is_reachable(Arch::PowerPc64));
    }

    #[test]
    fn test_rejects_wrong_register_file() {
        let t = LoopbackTransport::new();
        assert!(matches!(
            t.transfer(packet(Arch::X86_64, Arch::AArch64)),
            Err(TransferError::Rejected(_))
        ));
    }
}
