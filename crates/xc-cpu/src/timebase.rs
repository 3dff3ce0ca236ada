//! Time base, decrementer and hypervisor decrementer
//!
//! The SoC time-base control register gates every core's time base. When
//! it is running and HID6 enables the facility, each retired instruction
//! advances TB by the calibrated clocks-per-instruction and counts DEC and
//! HDEC down by the same amount.

use std::sync::atomic::{AtomicBool, Ordering};

use xc_core::error::MemoryError;
use xc_core::cpu_trace;
use xc_memory::Device;

use crate::cpu::Cpu;
use crate::exceptions::Exceptions;

/// HID6 time-base and decrementer facility enable
pub const HID6_TB_ENABLE: u64 = 0x0001_0000_0000_0000;

/// Value read back from the control register while running
const RUNNING: u64 = 0x0001_0000_0000_0000;

/// SoC time-base control register
#[derive(Debug, Default)]
pub struct TimeBaseControl {
    active: AtomicBool,
}

impl TimeBaseControl {
    /// A stopped time base; firmware starts it through the register
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(active: bool) -> Self {
        Self { active: AtomicBool::new(active) }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Relaxed);
    }
}

impl Device for TimeBaseControl {
    fn name(&self) -> &str {
        "TimeBaseControl"
    }

    fn read(&self, _offset: u64, data: &mut [u8]) -> Result<(), MemoryError> {
        let value = if self.is_active() { RUNNING } else { 0 };
        let bytes = value.to_be_bytes();
        let len = data.len().min(8);
        data[..len].copy_from_slice(&bytes[..len]);
        Ok(())
    }

    fn write(&self, _offset: u64, data: &[u8]) -> Result<(), MemoryError> {
        let mut bytes = [0u8; 8];
        let len = data.len().min(8);
        bytes[8 - len..].copy_from_slice(&data[..len]);
        match u64::from_be_bytes(bytes) {
            0 => self.set_active(false),
            0x100 | 0x1FF => self.set_active(true),
            other => tracing::warn!("Unknown time base control value 0x{:x}", other),
        }
        cpu_trace!("Time base {}", if self.is_active() { "running" } else { "stopped" });
        Ok(())
    }
}

/// Advance the time base for one retired instruction on `cpu`
///
/// DEC and HDEC raise their exception when they wrap through zero, unless
/// one is already pending.
pub fn tick(cpu: &mut Cpu<'_>) {
    if !cpu.shared.time_base.is_active() || cpu.core.hid6 & HID6_TB_ENABLE == 0 {
        return;
    }
    let cpi = cpu.shared.cpi;
    cpu.core.tb = cpu.core.tb.wrapping_add(cpi as u64);

    let dec = cpu.thread.dec;
    let new_dec = dec.wrapping_sub(cpi);
    cpu.thread.dec = new_dec;
    if new_dec > dec && !cpu.thread.exceptions.contains(Exceptions::DECREMENTER) {
        cpu.thread.exceptions |= Exceptions::DECREMENTER;
    }

    let hdec = cpu.core.hdec;
    let new_hdec = hdec.wrapping_sub(cpi);
    cpu.core.hdec = new_hdec;
    if new_hdec > hdec && !cpu.thread.exceptions.contains(Exceptions::HYPERVISOR_DECREMENTER) {
        cpu.thread.exceptions |= Exceptions::HYPERVISOR_DECREMENTER;
    }
}
