//! Error types for the Xenon CPU emulator

use thiserror::Error;

/// Main emulator error type
#[derive(Error, Debug)]
pub enum EmulatorError {
    #[error("CPU error: {0}")]
    Cpu(#[from] CpuError),

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Image load error: {0}")]
    Loader(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// CPU-level errors
///
/// Architected faults never show up here; they are resolved in-guest by the
/// exception dispatcher. Only conditions that leave the core do.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CpuError {
    #[error("Invalid instruction at 0x{addr:016x}: 0x{opcode:08x}")]
    InvalidInstruction { addr: u64, opcode: u32 },

    #[error("Checkstop on core {core}: {reason}")]
    Checkstop { core: u8, reason: String },

    #[error("Invalid core index: {0}")]
    InvalidCore(u8),

    #[error("Invalid thread index: {0}")]
    InvalidThread(u8),

    #[error("Core {0} command channel closed")]
    ChannelClosed(u8),

    #[error("Core {0} thread panicked")]
    CorePanicked(u8),
}

/// Bus and memory errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("Unmapped access at 0x{addr:016x} ({len} bytes)")]
    Unmapped { addr: u64, len: usize },

    #[error("Access out of range at 0x{addr:016x} ({len} bytes)")]
    OutOfRange { addr: u64, len: usize },

    #[error("Write to read-only region at 0x{addr:016x}")]
    ReadOnly { addr: u64 },

    #[error("Overlapping mapping at 0x{base:016x} (size 0x{size:x})")]
    Overlap { base: u64, size: u64 },
}

pub type Result<T> = std::result::Result<T, EmulatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let err: EmulatorError = MemoryError::Unmapped { addr: 0x1000, len: 4 }.into();
        assert!(matches!(err, EmulatorError::Memory(_)));
        assert_eq!(
            err.to_string(),
            "Memory error: Unmapped access at 0x0000000000001000 (4 bytes)"
        );
    }

    #[test]
    fn test_checkstop_display() {
        let err = CpuError::Checkstop { core: 1, reason: "machine check with ME=0".into() };
        assert_eq!(err.to_string(), "Checkstop on core 1: machine check with ME=0");
    }
}
