//! Region access flags

use bitflags::bitflags;

bitflags! {
    /// Access permissions of a bus region
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RegionFlags: u32 {
        /// Region is readable
        const READ    = 0b0001;
        /// Region is writable
        const WRITE   = 0b0010;
        /// Region is backed by a device rather than plain storage
        const DEVICE  = 0b0100;

        /// Read and write access
        const RW = Self::READ.bits() | Self::WRITE.bits();
        /// Read-only storage (boot ROM)
        const ROM = Self::READ.bits();
        /// Device registers
        const MMIO = Self::RW.bits() | Self::DEVICE.bits();
    }
}

impl Default for RegionFlags {
    fn default() -> Self {
        Self::RW
    }
}

/// Page index of a real address
#[inline]
pub fn page_of(addr: u64) -> u64 {
    addr >> crate::constants::PAGE_SHIFT
}

/// Inclusive page range covered by `[addr, addr + len)`
#[inline]
pub fn pages_spanned(addr: u64, len: u64) -> std::ops::RangeInclusive<u64> {
    let last = addr.wrapping_add(len.max(1) - 1);
    page_of(addr)..=page_of(last)
}
