//! Core infrastructure for the Xenon CPU emulator
//!
//! Holds what every other crate needs: configuration, the error taxonomy,
//! logging setup and the emulator context that replaces process-wide
//! run/pause flags.

pub mod config;
pub mod emulator;
pub mod error;
pub mod logging;

pub use config::Config;
pub use emulator::{EmulatorContext, EmulatorState, ShutdownReason};
pub use error::{CpuError, EmulatorError, MemoryError, Result};
