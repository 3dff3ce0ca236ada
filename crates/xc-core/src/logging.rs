//! Logging infrastructure for the Xenon CPU emulator

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{Config, LogLevel};

/// Map a configured level to a tracing level; `None` disables logging
pub fn level_for(level: LogLevel) -> Option<Level> {
    match level {
        LogLevel::Off => None,
        LogLevel::Error => Some(Level::ERROR),
        LogLevel::Warn => Some(Level::WARN),
        LogLevel::Info => Some(Level::INFO),
        LogLevel::Debug => Some(Level::DEBUG),
        LogLevel::Trace => Some(Level::TRACE),
    }
}

/// Initialize the logging system based on configuration
///
/// `RUST_LOG` still applies on top, so `RUST_LOG=mmu=trace` narrows tracing
/// to one component while the configured level covers the rest.
pub fn init(config: &Config) {
    let Some(level) = level_for(config.debug.log_level) else {
        return;
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let subscriber = tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true),
    );

    let file = config
        .debug
        .log_to_file
        .then(|| std::fs::File::create(&config.debug.log_path))
        .and_then(|created| created.ok());

    match file {
        Some(file) => {
            let file_layer = fmt::layer().with_writer(file).with_ansi(false);
            let _ = subscriber.with(file_layer).try_init();
        }
        None => {
            let _ = subscriber.try_init();
        }
    }
}

/// Initialize logging with default settings (for tests and quick starts)
pub fn init_default() {
    let filter = EnvFilter::from_default_env()
        .add_directive(Level::INFO.into());

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_test_writer())
        .try_init();
}

// Convenience macros for component-specific logging

/// Log a CPU trace message
#[macro_export]
macro_rules! cpu_trace {
    ($($arg:tt)*) => {
        tracing::trace!(target: "cpu", $($arg)*)
    };
}

/// Log a CPU debug message
#[macro_export]
macro_rules! cpu_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "cpu", $($arg)*)
    };
}

/// Log an MMU trace message
#[macro_export]
macro_rules! mmu_trace {
    ($($arg:tt)*) => {
        tracing::trace!(target: "mmu", $($arg)*)
    };
}

/// Log an MMU debug message
#[macro_export]
macro_rules! mmu_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "mmu", $($arg)*)
    };
}

/// Log a JIT trace message
#[macro_export]
macro_rules! jit_trace {
    ($($arg:tt)*) => {
        tracing::trace!(target: "jit", $($arg)*)
    };
}

/// Log a JIT debug message
#[macro_export]
macro_rules! jit_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "jit", $($arg)*)
    };
}

/// Log an interrupt controller debug message
#[macro_export]
macro_rules! iic_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "iic", $($arg)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_mapping() {
        assert_eq!(level_for(LogLevel::Off), None);
        assert_eq!(level_for(LogLevel::Warn), Some(Level::WARN));
        assert_eq!(level_for(LogLevel::Trace), Some(Level::TRACE));
    }

    #[test]
    fn test_init_is_repeatable() {
        init_default();
        init_default();
        cpu_debug!("logging initialized twice without panicking");
    }
}
