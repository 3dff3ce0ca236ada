//! Emulator context shared by every core thread
//!
//! Replaces global run/pause flags: each core's control loop holds an
//! `Arc<EmulatorContext>` and polls it at quantum boundaries.

use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{CpuError, Result};

/// Emulator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EmulatorState {
    /// Not started, or shut down cleanly
    Stopped = 0,
    /// Core loops are executing
    Running = 1,
    /// A checkstop terminated the system
    Checkstopped = 2,
}

impl EmulatorState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Checkstopped,
            _ => Self::Stopped,
        }
    }
}

/// Why the system stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Requested by the host (runner, debugger)
    Requested,
    /// Unrecoverable machine check on a core
    Checkstop { core: u8, reason: String },
}

/// Shared emulator context
pub struct EmulatorContext {
    config: Config,
    state: AtomicU8,
    shutdown: Mutex<Option<ShutdownReason>>,
}

impl EmulatorContext {
    /// Create a new, stopped context
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: AtomicU8::new(EmulatorState::Stopped as u8),
            shutdown: Mutex::new(None),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the current state
    pub fn state(&self) -> EmulatorState {
        EmulatorState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Mark the system running and clear any previous shutdown request
    pub fn start(&self) {
        *self.shutdown.lock() = None;
        self.state.store(EmulatorState::Running as u8, Ordering::Release);
        tracing::info!("Emulator started");
    }

    /// Ask every core loop to exit at its next quantum boundary
    pub fn request_shutdown(&self) {
        let mut shutdown = self.shutdown.lock();
        if shutdown.is_none() {
            *shutdown = Some(ShutdownReason::Requested);
        }
        if self.state() == EmulatorState::Running {
            self.state.store(EmulatorState::Stopped as u8, Ordering::Release);
        }
        tracing::info!("Emulator shutdown requested");
    }

    /// Record a checkstop; the first one wins
    pub fn checkstop(&self, core: u8, reason: impl Into<String>) {
        let reason = reason.into();
        let mut shutdown = self.shutdown.lock();
        if !matches!(*shutdown, Some(ShutdownReason::Checkstop { .. })) {
            tracing::error!("Checkstop on core {}: {}", core, reason);
            *shutdown = Some(ShutdownReason::Checkstop { core, reason });
        }
        self.state.store(EmulatorState::Checkstopped as u8, Ordering::Release);
    }

    /// Check if core loops should keep going
    pub fn is_running(&self) -> bool {
        self.state() == EmulatorState::Running
    }

    /// Why the system stopped, if it has
    pub fn shutdown_reason(&self) -> Option<ShutdownReason> {
        self.shutdown.lock().clone()
    }

    /// Turn a checkstop into an error for the host
    pub fn result(&self) -> Result<()> {
        match self.shutdown_reason() {
            Some(ShutdownReason::Checkstop { core, reason }) => {
                Err(CpuError::Checkstop { core, reason }.into())
            }
            _ => Ok(()),
        }
    }
}

impl Default for EmulatorContext {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_creation() {
        let ctx = EmulatorContext::new(Config::default());
        assert_eq!(ctx.state(), EmulatorState::Stopped);
        assert!(ctx.shutdown_reason().is_none());
    }

    #[test]
    fn test_context_state_transitions() {
        let ctx = EmulatorContext::default();

        ctx.start();
        assert!(ctx.is_running());

        ctx.request_shutdown();
        assert_eq!(ctx.state(), EmulatorState::Stopped);
        assert_eq!(ctx.shutdown_reason(), Some(ShutdownReason::Requested));
        assert!(ctx.result().is_ok());

        ctx.start();
        assert!(ctx.is_running());
        assert!(ctx.shutdown_reason().is_none());
    }

    #[test]
    fn test_checkstop_wins_over_request() {
        let ctx = EmulatorContext::default();
        ctx.start();
        ctx.checkstop(2, "machine check with ME=0");
        ctx.request_shutdown();
        ctx.checkstop(0, "second");

        assert_eq!(ctx.state(), EmulatorState::Checkstopped);
        assert_eq!(
            ctx.shutdown_reason(),
            Some(ShutdownReason::Checkstop { core: 2, reason: "machine check with ME=0".into() })
        );
        assert!(ctx.result().is_err());
    }
}
