//! System bus
//!
//! The CPU core only sees the [`Bus`] trait. [`SystemBus`] is the default
//! implementation: plain storage regions (RAM, SRAM, SROM) plus range-mapped
//! [`Device`]s, all addressed by 42-bit real address.

use std::sync::Arc;

use parking_lot::RwLock;
use xc_core::error::MemoryError;

use crate::constants::{FILL_PATTERN, REAL_ADDR_MASK};
use crate::pages::RegionFlags;

/// A memory-mapped peripheral register block
pub trait Device: Send + Sync {
    /// Short name for diagnostics
    fn name(&self) -> &str;

    /// Read `data.len()` bytes at `offset` from the device base
    fn read(&self, offset: u64, data: &mut [u8]) -> Result<(), MemoryError>;

    /// Write `data` at `offset` from the device base
    fn write(&self, offset: u64, data: &[u8]) -> Result<(), MemoryError>;
}

/// Flat real-address bus consumed by the CPU core
///
/// A failed read fills the whole buffer with [`FILL_PATTERN`] before
/// returning the error, so callers that ignore the error still see the
/// architected value.
pub trait Bus: Send + Sync {
    fn read(&self, addr: u64, data: &mut [u8]) -> Result<(), MemoryError>;

    fn write(&self, addr: u64, data: &[u8]) -> Result<(), MemoryError>;

    fn memset(&self, addr: u64, value: u8, len: usize) -> Result<(), MemoryError>;

    /// Read a byte
    fn read_u8(&self, addr: u64) -> Result<u8, MemoryError> {
        let mut buf = [0u8; 1];
        self.read(addr, &mut buf)?;
        Ok(buf[0])
    }

    /// Read a big-endian halfword
    fn read_be16(&self, addr: u64) -> Result<u16, MemoryError> {
        let mut buf = [0u8; 2];
        self.read(addr, &mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    /// Read a big-endian word
    fn read_be32(&self, addr: u64) -> Result<u32, MemoryError> {
        let mut buf = [0u8; 4];
        self.read(addr, &mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    /// Read a big-endian doubleword
    fn read_be64(&self, addr: u64) -> Result<u64, MemoryError> {
        let mut buf = [0u8; 8];
        self.read(addr, &mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }

    fn write_u8(&self, addr: u64, value: u8) -> Result<(), MemoryError> {
        self.write(addr, &[value])
    }

    fn write_be16(&self, addr: u64, value: u16) -> Result<(), MemoryError> {
        self.write(addr, &value.to_be_bytes())
    }

    fn write_be32(&self, addr: u64, value: u32) -> Result<(), MemoryError> {
        self.write(addr, &value.to_be_bytes())
    }

    fn write_be64(&self, addr: u64, value: u64) -> Result<(), MemoryError> {
        self.write(addr, &value.to_be_bytes())
    }
}

/// Route a real address to the bus address actually decoded
///
/// Bits 40-41 select the security-engine view: 0 physical, 1 hashed,
/// 2 SoC, 3 encrypted. Hashed and encrypted views alias RAM through the low
/// 32 bits; hashing and encryption themselves are not modelled.
#[inline]
pub fn route_real_address(addr: u64) -> u64 {
    let addr = addr & REAL_ADDR_MASK;
    match (addr >> 40) & 0x3 {
        1 | 3 => addr & 0xFFFF_FFFF,
        _ => addr,
    }
}

enum Backing {
    Storage(RwLock<Box<[u8]>>),
    Device(Arc<dyn Device>),
}

struct Region {
    name: String,
    base: u64,
    size: u64,
    flags: RegionFlags,
    backing: Backing,
}

impl Region {
    #[inline]
    fn contains(&self, addr: u64, len: u64) -> bool {
        addr >= self.base && addr.saturating_add(len) <= self.base + self.size
    }
}

/// Default bus: storage regions plus mapped devices
pub struct SystemBus {
    regions: RwLock<Vec<Region>>,
}

impl SystemBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self { regions: RwLock::new(Vec::new()) }
    }

    /// Create a bus with `ram_size` bytes of RAM at real address 0
    pub fn with_ram(ram_size: u64) -> Result<Self, MemoryError> {
        let bus = Self::new();
        bus.map_storage("ram", crate::constants::RAM_BASE, ram_size, RegionFlags::RW)?;
        Ok(bus)
    }

    /// Map zero-filled storage
    pub fn map_storage(
        &self,
        name: &str,
        base: u64,
        size: u64,
        flags: RegionFlags,
    ) -> Result<(), MemoryError> {
        let len = usize::try_from(size).map_err(|_| MemoryError::OutOfRange { addr: base, len: 0 })?;
        let storage = vec![0u8; len].into_boxed_slice();
        self.insert(Region {
            name: name.to_string(),
            base,
            size,
            flags: flags - RegionFlags::DEVICE,
            backing: Backing::Storage(RwLock::new(storage)),
        })
    }

    /// Map a device over `[base, base + size)`
    pub fn map_device(&self, base: u64, size: u64, device: Arc<dyn Device>) -> Result<(), MemoryError> {
        self.insert(Region {
            name: device.name().to_string(),
            base,
            size,
            flags: RegionFlags::MMIO,
            backing: Backing::Device(device),
        })
    }

    /// Copy bytes into a storage region regardless of its write permission
    ///
    /// Used to seed boot ROM content.
    pub fn load_rom(&self, addr: u64, data: &[u8]) -> Result<(), MemoryError> {
        let addr = route_real_address(addr);
        let regions = self.regions.read();
        let region = Self::find(&regions, addr, data.len())?;
        match &region.backing {
            Backing::Storage(storage) => {
                let start = (addr - region.base) as usize;
                storage.write()[start..start + data.len()].copy_from_slice(data);
                Ok(())
            }
            Backing::Device(_) => Err(MemoryError::ReadOnly { addr }),
        }
    }

    /// Names and ranges of every mapping, sorted by base
    pub fn mappings(&self) -> Vec<(String, u64, u64)> {
        self.regions
            .read()
            .iter()
            .map(|r| (r.name.clone(), r.base, r.size))
            .collect()
    }

    fn insert(&self, region: Region) -> Result<(), MemoryError> {
        let mut regions = self.regions.write();
        let end = region.base + region.size;
        if regions.iter().any(|r| region.base < r.base + r.size && r.base < end) {
            return Err(MemoryError::Overlap { base: region.base, size: region.size });
        }
        tracing::debug!(
            "Mapped {} at 0x{:x}..0x{:x}",
            region.name,
            region.base,
            end
        );
        let index = regions.partition_point(|r| r.base < region.base);
        regions.insert(index, region);
        Ok(())
    }

    fn find<'a>(regions: &'a [Region], addr: u64, len: usize) -> Result<&'a Region, MemoryError> {
        let index = regions.partition_point(|r| r.base <= addr);
        let region = index
            .checked_sub(1)
            .map(|i| &regions[i])
            .ok_or(MemoryError::Unmapped { addr, len })?;
        if region.contains(addr, len as u64) {
            Ok(region)
        } else if addr < region.base + region.size {
            Err(MemoryError::OutOfRange { addr, len })
        } else {
            Err(MemoryError::Unmapped { addr, len })
        }
    }

    fn try_read(&self, addr: u64, data: &mut [u8]) -> Result<(), MemoryError> {
        let regions = self.regions.read();
        let region = Self::find(&regions, addr, data.len())?;
        let offset = addr - region.base;
        match &region.backing {
            Backing::Storage(storage) => {
                let start = offset as usize;
                data.copy_from_slice(&storage.read()[start..start + data.len()]);
                Ok(())
            }
            Backing::Device(device) => device.read(offset, data),
        }
    }
}

impl Default for SystemBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for SystemBus {
    fn read(&self, addr: u64, data: &mut [u8]) -> Result<(), MemoryError> {
        let addr = route_real_address(addr);
        let result = self.try_read(addr, data);
        if let Err(e) = &result {
            tracing::warn!("Bus read failed: {}", e);
            data.fill(FILL_PATTERN);
        }
        result
    }

    fn write(&self, addr: u64, data: &[u8]) -> Result<(), MemoryError> {
        let addr = route_real_address(addr);
        let regions = self.regions.read();
        let region = Self::find(&regions, addr, data.len()).inspect_err(|e| {
            tracing::warn!("Bus write failed: {}", e);
        })?;
        if !region.flags.contains(RegionFlags::WRITE) {
            tracing::warn!("Write to read-only {} at 0x{:x} ignored", region.name, addr);
            return Err(MemoryError::ReadOnly { addr });
        }
        let offset = addr - region.base;
        match &region.backing {
            Backing::Storage(storage) => {
                let start = offset as usize;
                storage.write()[start..start + data.len()].copy_from_slice(data);
                Ok(())
            }
            Backing::Device(device) => device.write(offset, data),
        }
    }

    fn memset(&self, addr: u64, value: u8, len: usize) -> Result<(), MemoryError> {
        let addr = route_real_address(addr);
        let regions = self.regions.read();
        let region = Self::find(&regions, addr, len)?;
        if !region.flags.contains(RegionFlags::WRITE) {
            return Err(MemoryError::ReadOnly { addr });
        }
        let offset = addr - region.base;
        match &region.backing {
            Backing::Storage(storage) => {
                let start = offset as usize;
                storage.write()[start..start + len].fill(value);
                Ok(())
            }
            Backing::Device(device) => device.write(offset, &vec![value; len]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::*;

    #[test]
    fn test_route_real_address() {
        assert_eq!(route_real_address(0x1234), 0x1234);
        assert_eq!(route_real_address(0x100_0000_5000), 0x5000);
        assert_eq!(route_real_address(0x300_8000_0000), 0x8000_0000);
        assert_eq!(route_real_address(IIC_BASE), IIC_BASE);
        assert_eq!(route_real_address(0x8000_0000_0000_1000), 0x1000);
    }

    #[test]
    fn test_overlap_rejected() {
        let bus = SystemBus::with_ram(0x10000).unwrap();
        let err = bus.map_storage("dup", 0x8000, 0x1000, RegionFlags::RW).unwrap_err();
        assert_eq!(err, MemoryError::Overlap { base: 0x8000, size: 0x1000 });
    }

    #[test]
    fn test_rom_is_read_only() {
        let bus = SystemBus::new();
        bus.map_storage("srom", SROM_BASE, SROM_SIZE, RegionFlags::ROM).unwrap();
        bus.load_rom(SROM_BASE + 0x100, &[0x48, 0x00, 0x00, 0x00]).unwrap();
        assert_eq!(bus.read_be32(SROM_BASE + 0x100).unwrap(), 0x4800_0000);
        assert!(bus.write_be32(SROM_BASE + 0x100, 0).is_err());
        assert_eq!(bus.read_be32(SROM_BASE + 0x100).unwrap(), 0x4800_0000);
    }
}
