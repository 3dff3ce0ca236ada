//! Tests for the system bus memory map

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use xc_core::error::MemoryError;
use xc_memory::{constants::*, Bus, Device, RegionFlags, SystemBus};

struct ScratchRegister {
    value: AtomicU64,
}

impl Device for ScratchRegister {
    fn name(&self) -> &str {
        "scratch"
    }

    fn read(&self, offset: u64, data: &mut [u8]) -> Result<(), MemoryError> {
        if offset != 0 || data.len() != 8 {
            return Err(MemoryError::OutOfRange { addr: offset, len: data.len() });
        }
        data.copy_from_slice(&self.value.load(Ordering::Relaxed).to_be_bytes());
        Ok(())
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<(), MemoryError> {
        if offset != 0 || data.len() != 8 {
            return Err(MemoryError::OutOfRange { addr: offset, len: data.len() });
        }
        let mut buf = [0u8; 8];
        buf.copy_from_slice(data);
        self.value.store(u64::from_be_bytes(buf), Ordering::Relaxed);
        Ok(())
    }
}

#[test]
fn test_ram_boundaries() {
    let bus = SystemBus::with_ram(0x10_0000).unwrap();

    bus.write_be32(RAM_BASE, 0xDEADBEEF).unwrap();
    assert_eq!(bus.read_be32(RAM_BASE).unwrap(), 0xDEADBEEF);

    let last = RAM_BASE + 0x10_0000 - 8;
    bus.write_be64(last, 0x1234_5678_9ABC_DEF0).unwrap();
    assert_eq!(bus.read_be64(last).unwrap(), 0x1234_5678_9ABC_DEF0);
    assert_eq!(bus.read_u8(last).unwrap(), 0x12);
}

#[test]
fn test_failed_read_returns_fill_pattern() {
    let bus = SystemBus::with_ram(0x1000).unwrap();

    let mut buf = [0u8; 4];
    let err = bus.read(0x8000_0000, &mut buf).unwrap_err();
    assert!(matches!(err, MemoryError::Unmapped { .. }));
    assert_eq!(buf, [FILL_PATTERN; 4]);

    // Straddling the end of RAM fails too
    let mut buf = [0u8; 8];
    assert!(bus.read(0xFFC, &mut buf).is_err());
    assert_eq!(buf, [0xFF; 8]);
}

#[test]
fn test_memset() {
    let bus = SystemBus::with_ram(0x2000).unwrap();
    bus.memset(0x100, 0xAB, 0x20).unwrap();
    assert_eq!(bus.read_be32(0x100).unwrap(), 0xABAB_ABAB);
    assert_eq!(bus.read_be32(0x11C).unwrap(), 0xABAB_ABAB);
    assert_eq!(bus.read_u8(0x120).unwrap(), 0);
    assert!(bus.memset(0x1FF0, 0, 0x20).is_err());
}

#[test]
fn test_device_mapping() {
    let bus = SystemBus::with_ram(0x1000).unwrap();
    let reg = Arc::new(ScratchRegister { value: AtomicU64::new(0) });
    bus.map_device(TIME_BASE_CONTROL, 8, reg.clone()).unwrap();

    bus.write_be64(TIME_BASE_CONTROL, 0x1FF).unwrap();
    assert_eq!(reg.value.load(Ordering::Relaxed), 0x1FF);
    assert_eq!(bus.read_be64(TIME_BASE_CONTROL).unwrap(), 0x1FF);

    // The device rejects partial accesses and the bus reports the fill value
    assert!(bus.read_be32(TIME_BASE_CONTROL).is_err());
}

#[test]
fn test_security_engine_views_alias_ram() {
    let bus = SystemBus::with_ram(0x10_0000).unwrap();
    bus.write_be32(0x4000, 0xCAFEBABE).unwrap();
    assert_eq!(bus.read_be32(0x100_0000_4000).unwrap(), 0xCAFEBABE);
    assert_eq!(bus.read_be32(0x300_0000_4000).unwrap(), 0xCAFEBABE);
}

#[test]
fn test_soc_storage_regions() {
    let bus = SystemBus::with_ram(0x1000).unwrap();
    bus.map_storage("sram", SRAM_BASE, SRAM_SIZE, RegionFlags::RW).unwrap();
    bus.map_storage("srom", SROM_BASE, SROM_SIZE, RegionFlags::ROM).unwrap();

    bus.write_be64(SRAM_BASE + 0x10, 42).unwrap();
    assert_eq!(bus.read_be64(SRAM_BASE + 0x10).unwrap(), 42);
    assert_eq!(
        bus.write_be32(SROM_BASE, 1).unwrap_err(),
        MemoryError::ReadOnly { addr: SROM_BASE }
    );

    let names: Vec<_> = bus.mappings().into_iter().map(|(n, _, _)| n).collect();
    assert_eq!(names, vec!["ram", "srom", "sram"]);
}
