//! Program image: per-ISA call-site metadata
//!
//! The migration-aware compiler emits, for every function, one copy of the
//! code per ISA plus a table that ties each call site's return address on
//! one ISA to the same call site on the others. `ProgramImage` is that
//! table. Stack walks identify frames by looking up return addresses in it,
//! and the rewriter uses it to find where a frame resumes on the
//! destination ISA.
//!
//! Images are normally built once at startup and shared (`Arc`) by every
//! attached thread.
//!
//! ```ignore
//! let mut b = ProgramImage::builder();
//! let main = b.function("main", 2);
//! let work = b.function("work", 1);
//! let main_calls_work = b.call_site(main);
//! let work_migrates = b.call_site(work);
//! let image = b.build()?;
//! ```

use core::fmt;
use std::collections::HashMap;

use crate::arch::{Arch, NUM_ARCHES};
use crate::error::TranslateError;
use crate::id::{FunctionId, SiteId};

/// Base of the synthetic text segment per ISA (indexed by `Arch`)
const TEXT_BASE: [u64; NUM_ARCHES] = [0x0080_0000, 0x1000_0000, 0x0040_0000];

/// Distance between generated function entries
const FUNCTION_STRIDE: u64 = 0x1_0000;

/// Distance between generated call sites inside a function
const SITE_STRIDE: u64 = 0x10;

/// Offset of the first generated call site from the function entry
const SITE_BASE: u64 = 0x20;

/// Return address offset past the call instruction (x86 `call rel32`,
/// AArch64 `bl`, PowerPC64 `bl` + TOC-restore `nop`)
const CALL_LEN: [u64; NUM_ARCHES] = [4, 8, 5];

/// Maximum generated call sites per function
const MAX_SITES_PER_FUNCTION: usize = ((FUNCTION_STRIDE - SITE_BASE) / SITE_STRIDE) as usize;

/// Function metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    pub id: FunctionId,
    pub name: String,
    /// Live 64-bit values held in the function's frame at a call site
    pub slot_count: usize,
    /// Entry address per ISA (indexed by `Arch`)
    pub entry: [u64; NUM_ARCHES],
}

/// A call site and its return address on every ISA
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub id: SiteId,
    /// Owning function (`FunctionId::NONE` for the reserved runtime sites)
    pub function: FunctionId,
    pub addrs: [u64; NUM_ARCHES],
}

impl CallSite {
    #[inline]
    pub fn addr(&self, arch: Arch) -> u64 {
        self.addrs[arch.as_index()]
    }
}

/// Static TLS layout shared by all ISAs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlsLayout {
    /// Size of the static TLS block; x86-64 places the thread pointer
    /// right after it (variant II)
    pub block_size: u64,
}

impl Default for TlsLayout {
    fn default() -> Self {
        TlsLayout { block_size: 0x100 }
    }
}

/// Errors building a program image
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    /// Two call sites share a return address on one ISA
    DuplicateAddress { arch: Arch, addr: u64 },

    /// AArch64 and PowerPC64 instructions are 4-byte aligned
    MisalignedAddress { arch: Arch, addr: u64 },

    /// Call site added to a function that does not exist
    UnknownFunction(FunctionId),

    /// Function ran out of generated call-site addresses
    TooManySites(FunctionId),
}

impl fmt::Display for ImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageError::DuplicateAddress { arch, addr } => {
                write!(f, "duplicate {} call site address {:#x}", arch, addr)
            }
            ImageError::MisalignedAddress { arch, addr } => {
                write!(f, "misaligned {} call site address {:#x}", arch, addr)
            }
            ImageError::UnknownFunction(id) => write!(f, "unknown function {}", id),
            ImageError::TooManySites(id) => write!(f, "too many call sites in {}", id),
        }
    }
}

impl std::error::Error for ImageError {}

/// Call-site metadata for all supported ISAs
#[derive(Debug, Clone)]
pub struct ProgramImage {
    functions: Vec<FunctionInfo>,
    sites: Vec<CallSite>,
    by_addr: [HashMap<u64, SiteId>; NUM_ARCHES],
    toc: u64,
    tls: TlsLayout,
}

impl ProgramImage {
    pub fn builder() -> ProgramImageBuilder {
        ProgramImageBuilder::new()
    }

    pub fn function(&self, id: FunctionId) -> Option<&FunctionInfo> {
        self.functions.get(id.as_usize())
    }

    pub fn function_by_name(&self, name: &str) -> Option<&FunctionInfo> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn functions(&self) -> &[FunctionInfo] {
        &self.functions
    }

    pub fn site(&self, id: SiteId) -> Option<&CallSite> {
        self.sites.get(id.as_usize())
    }

    pub fn sites(&self) -> &[CallSite] {
        &self.sites
    }

    /// Return address of `site` on `arch`
    pub fn site_addr(&self, site: SiteId, arch: Arch) -> Result<u64, TranslateError> {
        self.site(site)
            .map(|s| s.addr(arch))
            .ok_or(TranslateError::UnknownSite(site))
    }

    /// Logical site for a native return address
    pub fn site_at(&self, arch: Arch, addr: u64) -> Result<SiteId, TranslateError> {
        self.by_addr[arch.as_index()]
            .get(&addr)
            .copied()
            .ok_or(TranslateError::UnmappedAddress { arch, addr })
    }

    /// Address the outermost frame returns to
    #[inline]
    pub fn thread_exit(&self, arch: Arch) -> u64 {
        self.sites[SiteId::THREAD_EXIT.as_usize()].addr(arch)
    }

    /// Address the migration shim resumes at
    #[inline]
    pub fn shim_resume(&self, arch: Arch) -> u64 {
        self.sites[SiteId::SHIM_RESUME.as_usize()].addr(arch)
    }

    /// PowerPC64 TOC base (r2)
    #[inline]
    pub fn toc(&self) -> u64 {
        self.toc
    }

    #[inline]
    pub fn tls(&self) -> TlsLayout {
        self.tls
    }

    /// Slot count of the function owning `site`; reserved sites have none
    pub fn slots_at(&self, site: SiteId) -> Result<usize, TranslateError> {
        let cs = self.site(site).ok_or(TranslateError::UnknownSite(site))?;
        Ok(self.function(cs.function).map(|f| f.slot_count).unwrap_or(0))
    }
}

/// Incremental builder for `ProgramImage`
#[derive(Debug)]
pub struct ProgramImageBuilder {
    functions: Vec<FunctionInfo>,
    sites: Vec<CallSite>,
    sites_per_function: Vec<usize>,
    toc: u64,
    tls: TlsLayout,
    error: Option<ImageError>,
}

impl ProgramImageBuilder {
    pub fn new() -> Self {
        let reserved = |id: SiteId, offset: u64| CallSite {
            id,
            function: FunctionId::NONE,
            addrs: core::array::from_fn(|i| TEXT_BASE[i] + offset + CALL_LEN[i]),
        };
        ProgramImageBuilder {
            functions: Vec::new(),
            sites: vec![reserved(SiteId::THREAD_EXIT, 0x10), reserved(SiteId::SHIM_RESUME, 0x80)],
            sites_per_function: Vec::new(),
            toc: TEXT_BASE[Arch::PowerPc64.as_index()] + 0x8000,
            tls: TlsLayout::default(),
            error: None,
        }
    }

    /// Add a function holding `slot_count` live values at its call sites
    pub fn function(&mut self, name: &str, slot_count: usize) -> FunctionId {
        let index = self.functions.len();
        let id = FunctionId::new(index as u32);
        let entry = core::array::from_fn(|i| TEXT_BASE[i] + 0x1000 + index as u64 * FUNCTION_STRIDE);
        self.functions.push(FunctionInfo {
            id,
            name: name.to_string(),
            slot_count,
            entry,
        });
        self.sites_per_function.push(0);
        id
    }

    /// Add a call site inside `function` with generated addresses
    pub fn call_site(&mut self, function: FunctionId) -> SiteId {
        let Some(entry) = self.functions.get(function.as_usize()).map(|f| f.entry) else {
            self.fail(ImageError::UnknownFunction(function));
            return SiteId::THREAD_EXIT;
        };
        let k = self.sites_per_function[function.as_usize()];
        if k >= MAX_SITES_PER_FUNCTION {
            self.fail(ImageError::TooManySites(function));
            return SiteId::THREAD_EXIT;
        }
        let addrs = core::array::from_fn(|i| {
            entry[i] + SITE_BASE + k as u64 * SITE_STRIDE + CALL_LEN[i]
        });
        self.push_site(function, addrs)
    }

    /// Add a call site with explicit return addresses (indexed by `Arch`)
    pub fn call_site_at(&mut self, function: FunctionId, addrs: [u64; NUM_ARCHES]) -> SiteId {
        if function.as_usize() >= self.functions.len() {
            self.fail(ImageError::UnknownFunction(function));
            return SiteId::THREAD_EXIT;
        }
        self.push_site(function, addrs)
    }

    /// PowerPC64 TOC base
    pub fn toc(&mut self, toc: u64) -> &mut Self {
        self.toc = toc;
        self
    }

    pub fn tls_block_size(&mut self, size: u64) -> &mut Self {
        self.tls = TlsLayout { block_size: size };
        self
    }

    pub fn build(self) -> Result<ProgramImage, ImageError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let mut by_addr: [HashMap<u64, SiteId>; NUM_ARCHES] = Default::default();
        for site in &self.sites {
            for arch in Arch::ALL {
                let addr = site.addr(arch);
                if arch.has_link_register() && addr % 4 != 0 {
                    return Err(ImageError::MisalignedAddress { arch, addr });
                }
                if by_addr[arch.as_index()].insert(addr, site.id).is_some() {
                    return Err(ImageError::DuplicateAddress { arch, addr });
                }
            }
        }
        Ok(ProgramImage {
            functions: self.functions,
            sites: self.sites,
            by_addr,
            toc: self.toc,
            tls: self.tls,
        })
    }

    fn push_site(&mut self, function: FunctionId, addrs: [u64; NUM_ARCHES]) -> SiteId {
        let id = SiteId::new(self.sites.len() as u32);
        self.sites.push(CallSite { id, function, addrs });
        self.sites_per_function[function.as_usize()] += 1;
        id
    }

    fn fail(&mut self, e: ImageError) {
        if self.error.is_none() {
            self.error = Some(e);
        }
    }
}

impl Default for ProgramImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (ProgramImage, FunctionId, SiteId, SiteId) {
        let mut b = ProgramImage::builder();
        let main = b.function("main", 2);
        let leaf = b.function("leaf", 0);
        let s0 = b.call_site(main);
        let s1 = b.call_site(leaf);
        (b.build().unwrap(), main, s0, s1)
    }

    #[test]
    fn test_reserved_sites_present() {
        let (image, ..) = sample();
        for arch in Arch::ALL {
            let exit = image.thread_exit(arch);
            assert_eq!(image.site_at(arch, exit), Ok(SiteId::THREAD_EXIT));
            let shim = image.shim_resume(arch);
            assert_eq!(image.site_at(arch, shim), Ok(SiteId::SHIM_RESUME));
        }
        assert_eq!(image.slots_at(SiteId::THREAD_EXIT), Ok(0));
    }

    #[test]
    fn test_site_lookup_per_arch() {
        let (image, main, s0, s1) = sample();
        assert_eq!(image.site(s0).map(|s| s.function), Some(main));
        assert_eq!(image.slots_at(s0), Ok(2));
        for arch in Arch::ALL {
            let a0 = image.site_addr(s0, arch).unwrap();
            let a1 = image.site_addr(s1, arch).unwrap();
            assert_ne!(a0, a1);
            assert_eq!(image.site_at(arch, a0), Ok(s0));
            if arch.has_link_register() {
                assert_eq!(a0 % 4, 0);
            }
        }
        // addresses differ between ISAs
        assert_ne!(
            image.site_addr(s0, Arch::X86_64).unwrap(),
            image.site_addr(s0, Arch::AArch64).unwrap()
        );
    }

    #[test]
    fn test_unmapped_lookup() {
        let (image, ..) = sample();
        assert_eq!(
            image.site_at(Arch::PowerPc64, 0x1234),
            Err(TranslateError::UnmappedAddress {
                arch: Arch::PowerPc64,
                addr: 0x1234
            })
        );
        assert_eq!(
            image.site_addr(SiteId::new(99), Arch::X86_64),
            Err(TranslateError::UnknownSite(SiteId::new(99)))
        );
    }

    #[test]
    fn test_duplicate_address_rejected() {
        let mut b = ProgramImage::builder();
        let f = b.function("f", 0);
        b.call_site_at(f, [0x1000, 0x2000, 0x3000]);
        b.call_site_at(f, [0x1004, 0x2000, 0x3001]);
        assert_eq!(
            b.build().unwrap_err(),
            ImageError::DuplicateAddress {
                arch: Arch::PowerPc64,
                addr: 0x2000
            }
        );
    }

    #[test]
    fn test_misaligned_and_unknown() {
        let mut b = ProgramImage::builder();
        let f = b.function("f", 0);
        b.call_site_at(f, [0x1002, 0x2000, 0x3000]);
        assert!(matches!(b.build(), Err(ImageError::MisalignedAddress { .. })));

        let mut b = ProgramImage::builder();
        b.call_site(FunctionId::new(4));
        assert_eq!(b.build().unwrap_err(), ImageError::UnknownFunction(FunctionId::new(4)));
    }

    #[test]
    fn test_by_name_and_toc() {
        let mut b = ProgramImage::builder();
        b.function("alpha", 1);
        b.toc(0x1001_8000).tls_block_size(0x400);
        let image = b.build().unwrap();
        assert_eq!(image.function_by_name("alpha").map(|f| f.slot_count), Some(1));
        assert_eq!(image.toc(), 0x1001_8000);
        assert_eq!(image.tls().block_size, 0x400);
    }
}
