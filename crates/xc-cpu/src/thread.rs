//! Per-thread and per-core architected state
//!
//! Each Xenon core runs two hardware threads. Everything a thread owns
//! (GPRs, FPRs, 128 vector registers, SLB, ERATs, pending exceptions) lives
//! in [`ThreadState`]; registers both threads share (the TLB, HRMOR, HID
//! registers, the time base) live in [`CoreState`].

use crate::exceptions::Exceptions;
use crate::mmu::{Erat, MmuStats, SlbEntry, Tlb, SLB_ENTRIES};
use crate::regs::{ctrl, msr};
use crate::vmx::Vector128;

/// Power-on next-instruction address of a thread
pub const POR_NIA: u64 = 0x100;
/// Power-on decrementer
pub const POR_DEC: u32 = 0x7FFF_FFFF;
/// Processor version of the Xenon PPE
pub const XENON_PVR: u32 = 0x0071_0500;
/// Power-on HID6 (64K pages for LP=0, 16M for LP=1)
pub const POR_HID6: u64 = 0x0001_8038_0000_0000;
/// Power-on LPCR (software TLB, RMOR applies)
pub const POR_LPCR: u64 = 0x402;
/// Power-on HRMOR of core 0, pointing at the boot ROM
pub const POR_HRMOR: u64 = 0x200_0000_0000;
/// Power-on TSCR with wake-on-external set
pub const POR_TSCR: u64 = 0x10_0000;
/// Power-on thread-switch timeout
pub const POR_TTR: u64 = 0x1000;

/// Architected state of one hardware thread
#[derive(Clone)]
pub struct ThreadState {
    /// Thread index within its core (0 or 1)
    pub index: u8,
    /// Processor identification, also the IIC thread index
    pub pir: u32,

    pub gpr: [u64; 32],
    /// FPRs as double-precision bit patterns
    pub fpr: [u64; 32],
    pub vr: Box<[Vector128; 128]>,
    pub cr: u32,
    pub lr: u64,
    pub ctr: u64,
    pub xer: u64,
    pub fpscr: u32,
    pub vscr: u32,
    pub vrsave: u32,
    pub msr: u64,

    /// Address of the executing instruction
    pub cia: u64,
    /// Address of the next instruction
    pub nia: u64,

    pub srr0: u64,
    pub srr1: u64,
    pub hsrr0: u64,
    pub hsrr1: u64,
    pub sprg: [u64; 4],
    pub hsprg: [u64; 2],
    pub dar: u64,
    pub dsisr: u64,
    pub hdar: u64,
    pub hdsisr: u64,
    pub dec: u32,
    pub cfar: u64,
    pub dabr: u64,
    pub dabrx: u64,

    pub slb: [SlbEntry; SLB_ENTRIES],
    pub ierat: Erat,
    pub derat: Erat,
    /// Core ERAT epoch last synchronized with
    pub erat_epoch: u64,
    /// Software TLB replacement hint (PpeTlbIndexHint)
    pub tlb_index_hint: u64,

    /// Pending exceptions
    pub exceptions: Exceptions,
    /// SRR1 reason bits for a pending instruction storage exception
    pub isi_reason: u64,
    /// SRR1 reason bits for a pending reset (wake from sleep)
    pub reset_reason: u64,
    /// LEV field of the pending system call
    pub sc_lev: bool,

    /// Instructions retired since power-on
    pub retired: u64,
}

impl ThreadState {
    /// Power-on state of thread `index` with processor id `pir`
    pub fn new(index: u8, pir: u32) -> Self {
        Self {
            index,
            pir,
            gpr: [0; 32],
            fpr: [0; 32],
            vr: Box::new([Vector128::ZERO; 128]),
            cr: 0,
            lr: 0,
            ctr: 0,
            xer: 0,
            fpscr: 0,
            vscr: 0,
            vrsave: 0,
            msr: msr::POWER_ON,
            cia: 0,
            nia: POR_NIA,
            srr0: 0,
            srr1: 0,
            hsrr0: 0,
            hsrr1: 0,
            sprg: [0; 4],
            hsprg: [0; 2],
            dar: 0,
            dsisr: 0,
            hdar: 0,
            hdsisr: 0,
            dec: POR_DEC,
            cfar: 0,
            dabr: 0,
            dabrx: 0,
            slb: [SlbEntry::default(); SLB_ENTRIES],
            ierat: Erat::new(),
            derat: Erat::new(),
            erat_epoch: 0,
            tlb_index_hint: 0,
            exceptions: Exceptions::empty(),
            isi_reason: 0,
            reset_reason: 0,
            sc_lev: false,
            retired: 0,
        }
    }

    /// Reservation slot of this thread in the system-wide table
    #[inline]
    pub fn reservation_slot(&self) -> usize {
        self.pir as usize
    }

    /// 64-bit mode
    #[inline]
    pub fn sf(&self) -> bool {
        self.msr & msr::SF != 0
    }

    /// Hypervisor state
    #[inline]
    pub fn hv(&self) -> bool {
        self.msr & msr::HV != 0
    }

    /// Problem (user) state
    #[inline]
    pub fn pr(&self) -> bool {
        self.msr & msr::PR != 0
    }

    /// Mask an effective address to the current addressing mode
    #[inline]
    pub fn mask_ea(&self, ea: u64) -> u64 {
        if self.sf() {
            ea
        } else {
            ea & 0xFFFF_FFFF
        }
    }

    #[inline]
    pub fn fpr_f64(&self, index: usize) -> f64 {
        f64::from_bits(self.fpr[index])
    }

    #[inline]
    pub fn set_fpr_f64(&mut self, index: usize, value: f64) {
        self.fpr[index] = value.to_bits();
    }

    /// Get CR field value (0-7)
    #[inline]
    pub fn cr_field(&self, field: usize) -> u32 {
        (self.cr >> (28 - field * 4)) & 0xF
    }

    /// Set CR field value (0-7)
    #[inline]
    pub fn set_cr_field(&mut self, field: usize, value: u32) {
        let shift = 28 - field * 4;
        self.cr = (self.cr & !(0xF << shift)) | ((value & 0xF) << shift);
    }

    /// CR bit in IBM numbering (0 = CR0[LT])
    #[inline]
    pub fn cr_bit(&self, bit: u32) -> bool {
        self.cr & (0x8000_0000 >> bit) != 0
    }

    #[inline]
    pub fn set_cr_bit(&mut self, bit: u32, value: bool) {
        let mask = 0x8000_0000 >> bit;
        if value {
            self.cr |= mask;
        } else {
            self.cr &= !mask;
        }
    }

    #[inline]
    pub fn xer_ca(&self) -> bool {
        self.xer & crate::regs::xer::CA != 0
    }

    #[inline]
    pub fn set_xer_ca(&mut self, value: bool) {
        if value {
            self.xer |= crate::regs::xer::CA;
        } else {
            self.xer &= !crate::regs::xer::CA;
        }
    }

    #[inline]
    pub fn xer_so(&self) -> bool {
        self.xer & crate::regs::xer::SO != 0
    }

    /// Set OV, and SO when overflowing
    #[inline]
    pub fn set_xer_ov(&mut self, value: bool) {
        if value {
            self.xer |= crate::regs::xer::OV | crate::regs::xer::SO;
        } else {
            self.xer &= !crate::regs::xer::OV;
        }
    }

    /// Set CR0 from a result compared with zero
    #[inline]
    pub fn update_cr0(&mut self, value: u64) {
        let value = if self.sf() { value as i64 } else { value as i32 as i64 };
        let c = if value < 0 {
            0b1000
        } else if value > 0 {
            0b0100
        } else {
            0b0010
        };
        let so = self.xer_so() as u32;
        self.set_cr_field(0, c | so);
    }

    /// Drop both ERATs
    pub fn flush_erats(&mut self) {
        self.ierat.flush();
        self.derat.flush();
    }
}

/// Registers shared by both threads of a core
#[derive(Clone)]
pub struct CoreState {
    /// Core index (0-2)
    pub index: u8,
    pub ctrl: u64,
    pub hid0: u64,
    pub hid1: u64,
    pub hid4: u64,
    pub hid6: u64,
    pub sdr1: u64,
    pub hrmor: u64,
    pub rmor: u64,
    pub lpcr: u64,
    pub lpidr: u64,
    pub tscr: u64,
    pub ttr: u64,
    pub pvr: u32,
    /// Time base
    pub tb: u64,
    pub hdec: u32,

    pub tlb: Tlb,
    /// Software TLB staging registers (PpeTlbIndex, PpeTlbRpn, PpeTlbRmt)
    pub tlb_index: u64,
    pub tlb_rpn: u64,
    pub tlb_rmt: u64,

    /// Bumped whenever both threads must drop their ERATs
    pub erat_epoch: u64,
    /// System-wide TLB invalidation epoch last synchronized with
    pub tlb_epoch: u64,

    pub mmu_stats: MmuStats,

    /// Real addresses targeted by icbi, drained into the block cache
    pub icbi_pages: Vec<u64>,
}

impl CoreState {
    /// Power-on state of core `index`
    pub fn new(index: u8) -> Self {
        let boot = index == 0;
        Self {
            index,
            ctrl: if boot { ctrl::RUN_THREAD0 } else { 0 },
            hid0: 0,
            hid1: 0,
            hid4: 0,
            hid6: POR_HID6,
            sdr1: 0,
            hrmor: if boot { POR_HRMOR } else { 0 },
            rmor: 0,
            lpcr: POR_LPCR,
            lpidr: 0,
            tscr: POR_TSCR,
            ttr: POR_TTR,
            pvr: XENON_PVR,
            tb: 0,
            hdec: POR_DEC,
            tlb: Tlb::new(),
            tlb_index: 0,
            tlb_rpn: 0,
            tlb_rmt: 0,
            erat_epoch: 0,
            tlb_epoch: 0,
            mmu_stats: MmuStats::default(),
            icbi_pages: Vec::new(),
        }
    }

    /// PIR of thread 0 on this core
    #[inline]
    pub fn pir_base(&self) -> u32 {
        self.index as u32 * 2
    }

    /// Thread-enable bits of CTRL (bit 1 thread 0, bit 0 thread 1)
    #[inline]
    pub fn thread_enables(&self) -> u32 {
        ctrl::thread_enables(self.ctrl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_power_on() {
        let thread = ThreadState::new(1, 3);
        assert_eq!(thread.nia, POR_NIA);
        assert_eq!(thread.msr, 0x9000_0000_0000_0000);
        assert_eq!(thread.dec, 0x7FFF_FFFF);
        assert_eq!(thread.reservation_slot(), 3);
        assert!(thread.sf());
        assert!(thread.hv());
    }

    #[test]
    fn test_core_power_on() {
        let core0 = CoreState::new(0);
        assert_eq!(core0.ctrl, 0x80_0000);
        assert_eq!(core0.thread_enables(), ctrl::TE0);
        assert_eq!(core0.hrmor, 0x200_0000_0000);

        let core2 = CoreState::new(2);
        assert_eq!(core2.thread_enables(), 0);
        assert_eq!(core2.pir_base(), 4);
        assert_eq!(core2.pvr, 0x0071_0500);
        assert_eq!(core2.lpcr, 0x402);
    }

    #[test]
    fn test_cr_fields() {
        let mut thread = ThreadState::new(0, 0);
        thread.set_cr_field(0, 0b1010);
        assert_eq!(thread.cr_field(0), 0b1010);
        thread.set_cr_field(7, 0b0101);
        assert_eq!(thread.cr_field(7), 0b0101);
        assert!(thread.cr_bit(0));
        assert!(!thread.cr_bit(1));
        thread.set_cr_bit(31, false);
        assert_eq!(thread.cr_field(7), 0b0100);
    }

    #[test]
    fn test_update_cr0_32bit_mode() {
        let mut thread = ThreadState::new(0, 0);
        thread.msr &= !msr::SF;
        thread.update_cr0(0x1_8000_0000);
        assert_eq!(thread.cr_field(0), 0b1000);
        thread.msr |= msr::SF;
        thread.update_cr0(0x1_8000_0000);
        assert_eq!(thread.cr_field(0), 0b0100);
    }

    #[test]
    fn test_overflow_sets_summary() {
        let mut thread = ThreadState::new(0, 0);
        thread.set_xer_ov(true);
        thread.set_xer_ov(false);
        assert!(thread.xer_so());
        thread.update_cr0(0);
        assert_eq!(thread.cr_field(0), 0b0011);
    }
}
