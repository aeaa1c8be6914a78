//! Supported instruction-set architectures

use core::fmt;

/// Number of supported architectures
pub const NUM_ARCHES: usize = 3;

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        const HOST_ARCH: Arch = Arch::X86_64;
    } else if #[cfg(target_arch = "aarch64")] {
        const HOST_ARCH: Arch = Arch::AArch64;
    } else {
        const HOST_ARCH: Arch = Arch::PowerPc64;
    }
}

/// Supported architectures
///
/// The discriminants are stable and shared with the C ABI (`enum arch`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Arch {
    AArch64 = 0,
    PowerPc64 = 1,
    X86_64 = 2,
}

impl Arch {
    /// All supported architectures, in discriminant order
    pub const ALL: [Arch; NUM_ARCHES] = [Arch::AArch64, Arch::PowerPc64, Arch::X86_64];

    /// The architecture this binary was built for
    #[inline]
    pub const fn current() -> Arch {
        HOST_ARCH
    }

    /// Get architecture as index (0 = AArch64, 2 = X86_64)
    #[inline]
    pub const fn as_index(self) -> usize {
        self as usize
    }

    /// Get architecture from index
    #[inline]
    pub const fn from_index(idx: usize) -> Option<Arch> {
        match idx {
            0 => Some(Arch::AArch64),
            1 => Some(Arch::PowerPc64),
            2 => Some(Arch::X86_64),
            _ => None,
        }
    }

    /// Canonical lowercase name
    pub const fn name(self) -> &'static str {
        match self {
            Arch::AArch64 => "aarch64",
            Arch::PowerPc64 => "powerpc64",
            Arch::X86_64 => "x86_64",
        }
    }

    /// Fixed part of every frame: return-address/frame-pointer pair on
    /// x86-64 and AArch64, the 32-byte ELFv2 header on PowerPC64.
    #[inline]
    pub const fn frame_header_size(self) -> u64 {
        match self {
            Arch::AArch64 => 16,
            Arch::PowerPc64 => 32,
            Arch::X86_64 => 16,
        }
    }

    /// Bytes below the stack pointer that leaf code may use without
    /// adjusting it
    #[inline]
    pub const fn red_zone(self) -> u64 {
        match self {
            Arch::AArch64 => 0,
            Arch::PowerPc64 => 288,
            Arch::X86_64 => 128,
        }
    }

    /// Whether the return address arrives in a link register rather than
    /// a stack slot pushed by the call instruction
    #[inline]
    pub const fn has_link_register(self) -> bool {
        !matches!(self, Arch::X86_64)
    }

    /// Bytes reserved above the outermost frame for a pseudo caller
    #[inline]
    pub const fn bottom_reserve(self) -> u64 {
        match self {
            Arch::PowerPc64 => 32,
            _ => 0,
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl core::str::FromStr for Arch {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aarch64" | "arm64" => Ok(Arch::AArch64),
            "powerpc64" | "ppc64" | "ppc64le" => Ok(Arch::PowerPc64),
            "x86_64" | "x86-64" | "amd64" => Ok(Arch::X86_64),
            _ => Err(()),
        }
    }
}

impl TryFrom<u8> for Arch {
    type Error = ();

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Arch::from_index(v as usize).ok_or(())
    }
}

impl From<Arch> for u8 {
    fn from(arch: Arch) -> u8 {
        arch as u8
    }
}
