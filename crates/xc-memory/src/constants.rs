//! Xenon memory map constants

/// Main memory base real address
pub const RAM_BASE: u64 = 0x0000_0000;
/// Default main memory size (512 MB)
pub const DEFAULT_RAM_SIZE: u64 = 0x2000_0000;

/// Start of the SoC register space
pub const SOC_BASE: u64 = 0x200_0000_0000;

/// 1BL boot ROM
pub const SROM_BASE: u64 = 0x200_0000_0000;
/// SROM size (32 KB)
pub const SROM_SIZE: u64 = 0x8000;

/// On-die SRAM
pub const SRAM_BASE: u64 = 0x200_0001_0000;
/// SRAM size (64 KB)
pub const SRAM_SIZE: u64 = 0x1_0000;

/// Integrated interrupt controller register block
pub const IIC_BASE: u64 = 0x200_0005_0000;
/// One register window per logical thread
pub const IIC_THREAD_STRIDE: u64 = 0x1000;
/// Six thread windows followed by the global registers
pub const IIC_SIZE: u64 = 0x8000;

/// Time base enable register
pub const TIME_BASE_CONTROL: u64 = 0x200_0006_11A0;

/// Real addresses are 42 bits wide
pub const REAL_ADDR_MASK: u64 = 0x3FF_FFFF_FFFF;

/// Standard page size (4 KB)
pub const PAGE_SIZE: u64 = 0x1000;
/// log2 of the standard page size
pub const PAGE_SHIFT: u32 = 12;

/// Reservation granularity (128 bytes = cache line)
pub const RESERVATION_GRANULARITY: u64 = 128;

/// Byte returned for every byte of a failed bus read
pub const FILL_PATTERN: u8 = 0xFF;
