//! Emulator configuration
//!
//! Loaded from `<config dir>/xenon-cpu/config.toml`. Every section falls back
//! to its defaults, so a partial file is fine:
//!
//! ```toml
//! [cpu]
//! backend = "hybrid"
//! invalid_instruction = "halt"
//! clocks_per_instruction = 0
//!
//! [debug]
//! log_level = "debug"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EmulatorError, Result};

const APP_DIR: &str = "xenon-cpu";
const CONFIG_FILE: &str = "config.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cpu: CpuConfig,
    pub memory: MemoryConfig,
    pub debug: DebugConfig,
}

/// Execution backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CpuBackend {
    /// One instruction at a time
    Interpreter,
    /// Compiled blocks only; opcodes without an emitter still fall back
    Jit,
    /// Compiled blocks with per-instruction interpreter fallback
    #[default]
    Hybrid,
}

/// What to do when an instruction has no implementation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidInstructionPolicy {
    /// Log and raise an illegal-instruction program interrupt
    #[default]
    Continue,
    /// Log and halt the core for inspection
    Halt,
}

/// When cached blocks are revalidated against guest memory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmcDetection {
    /// Checksum before every block execution
    #[default]
    Always,
    /// Checksum only after a write touched a page holding compiled code
    WriteWatch,
}

/// CPU configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuConfig {
    pub backend: CpuBackend,
    pub invalid_instruction: InvalidInstructionPolicy,
    /// Time base ticks per instruction; 0 calibrates against the host
    pub clocks_per_instruction: u32,
    /// Instruction quantum per thread; 0 uses the TTR register
    pub quantum: u32,
    pub max_block_instructions: u32,
    /// Compiled blocks kept per core before the least recently used go
    pub max_cached_blocks: u32,
    pub smc_detection: SmcDetection,
    pub time_base_enabled: bool,
    /// Effective address thread 0 of core 0 starts at
    pub reset_vector: u64,
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            backend: CpuBackend::Hybrid,
            invalid_instruction: InvalidInstructionPolicy::Continue,
            clocks_per_instruction: 0,
            quantum: 0,
            max_block_instructions: 64,
            max_cached_blocks: 4096,
            smc_detection: SmcDetection::Always,
            time_base_enabled: true,
            reset_vector: 0x200_0000_0100,
        }
    }
}

/// Memory configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub ram_size: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { ram_size: 512 * 1024 * 1024 }
    }
}

/// Log verbosity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

/// Debug and logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub log_level: LogLevel,
    pub log_to_file: bool,
    pub log_path: PathBuf,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_to_file: false,
            log_path: PathBuf::from("xenon-cpu.log"),
        }
    }
}

impl Config {
    /// Load the user configuration, or defaults if no file exists
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| EmulatorError::Config(format!("{}: {}", path.display(), e)))?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save to the user configuration path
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()
            .ok_or_else(|| EmulatorError::Config("no config directory on this host".into()))?;
        self.save_to(&path)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| EmulatorError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// `<config dir>/xenon-cpu/config.toml`
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR).join(CONFIG_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_round_trip() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [cpu]
            backend = "interpreter"
            invalid_instruction = "halt"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.cpu.backend, CpuBackend::Interpreter);
        assert_eq!(parsed.cpu.invalid_instruction, InvalidInstructionPolicy::Halt);
        assert_eq!(parsed.cpu.max_block_instructions, 64);
        assert_eq!(parsed.cpu.max_cached_blocks, 4096);
        assert_eq!(parsed.memory.ram_size, 512 * 1024 * 1024);
        assert_eq!(parsed.debug.log_level, LogLevel::Info);
    }

    #[test]
    fn test_save_and_load_file() {
        let path = std::env::temp_dir()
            .join(format!("xenon-cpu-config-{}", std::process::id()))
            .join("config.toml");
        let mut config = Config::default();
        config.cpu.smc_detection = SmcDetection::WriteWatch;
        config.debug.log_level = LogLevel::Trace;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_bad_file_is_config_error() {
        let err = toml::from_str::<Config>("[cpu]\nbackend = 3").unwrap_err();
        assert!(!err.to_string().is_empty());
    }
}
