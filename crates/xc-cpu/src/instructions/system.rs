//! System instructions: SPR and MSR moves, interrupt return, SLB and TLB
//! management, storage barriers

use xc_core::cpu_debug;

use crate::cpu::{Cpu, ExecResult};
use crate::decoder::{bits, spr_field, x_form};
use crate::exceptions::Exceptions;
use crate::mmu;
use crate::regs::{msr, spr};

/// mfspr - Move From Special Purpose Register
pub fn mfspr(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rt, _, _) = x_form(word);
    let n = spr_field(word);
    if spr::is_privileged(n) {
        cpu.require_supervisor()?;
    }
    let t = &*cpu.thread;
    let c = &*cpu.core;
    let value = match n {
        spr::XER => t.xer,
        spr::LR => t.lr,
        spr::CTR => t.ctr,
        spr::DSISR => t.dsisr,
        spr::DAR => t.dar,
        spr::DEC => t.dec as u64,
        spr::SDR1 => c.sdr1,
        spr::SRR0 => t.srr0,
        spr::SRR1 => t.srr1,
        spr::CFAR => t.cfar,
        spr::CTRLRD | spr::CTRLWR => c.ctrl,
        spr::VRSAVE => t.vrsave as u64,
        spr::TBL_RO | spr::TB => c.tb,
        spr::TBU_RO => c.tb >> 32,
        spr::SPRG0..=spr::SPRG3 => t.sprg[(n - spr::SPRG0) as usize],
        spr::PVR => c.pvr as u64,
        spr::HSPRG0 => t.hsprg[0],
        spr::HSPRG1 => t.hsprg[1],
        spr::HDSISR => t.hdsisr,
        spr::HDAR => t.hdar,
        spr::HDEC => c.hdec as u64,
        spr::RMOR => c.rmor,
        spr::HRMOR => c.hrmor,
        spr::HSRR0 => t.hsrr0,
        spr::HSRR1 => t.hsrr1,
        spr::LPCR => c.lpcr,
        spr::LPIDR => c.lpidr,
        spr::TSCR => c.tscr,
        spr::TTR => c.ttr,
        spr::PPE_TLB_INDEX_HINT => t.tlb_index_hint,
        spr::PPE_TLB_INDEX => c.tlb_index,
        spr::PPE_TLB_RPN => c.tlb_rpn,
        spr::PPE_TLB_RMT => c.tlb_rmt,
        spr::HID0 => c.hid0,
        spr::HID1 => c.hid1,
        spr::HID4 => c.hid4,
        spr::HID6 => c.hid6,
        spr::DABR => t.dabr,
        spr::DABRX => t.dabrx,
        spr::PIR => t.pir as u64,
        _ => {
            tracing::warn!("mfspr from unimplemented SPR {} at 0x{:x}", n, t.cia);
            0
        }
    };
    cpu.thread.gpr[rt] = value;
    Ok(())
}

/// mtspr - Move To Special Purpose Register
pub fn mtspr(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rs, _, _) = x_form(word);
    let n = spr_field(word);
    if spr::is_privileged(n) {
        cpu.require_supervisor()?;
    }
    let value = cpu.thread.gpr[rs];
    match n {
        spr::XER => cpu.thread.xer = value & 0xFFFF_FFFF,
        spr::LR => cpu.thread.lr = value,
        spr::CTR => cpu.thread.ctr = value,
        spr::DSISR => cpu.thread.dsisr = value,
        spr::DAR => cpu.thread.dar = value,
        spr::DEC => cpu.thread.dec = value as u32,
        spr::SDR1 => {
            cpu.core.sdr1 = value;
            mmu::flush_core_erats(cpu);
        }
        spr::SRR0 => cpu.thread.srr0 = value,
        spr::SRR1 => cpu.thread.srr1 = value,
        spr::CFAR => cpu.thread.cfar = value,
        spr::CTRLWR => {
            cpu.core.ctrl = value;
            cpu_debug!(
                "Core {} CTRL <- 0x{:x}, thread enables {:02b}",
                cpu.core.index,
                value,
                cpu.core.thread_enables()
            );
        }
        spr::VRSAVE => cpu.thread.vrsave = value as u32,
        spr::SPRG0..=spr::SPRG3 => cpu.thread.sprg[(n - spr::SPRG0) as usize] = value,
        spr::TBL_WO => cpu.core.tb = (cpu.core.tb & !0xFFFF_FFFF) | (value & 0xFFFF_FFFF),
        spr::TBU_WO => cpu.core.tb = (value << 32) | (cpu.core.tb & 0xFFFF_FFFF),
        spr::TB => cpu.core.tb = value,
        spr::HSPRG0 => cpu.thread.hsprg[0] = value,
        spr::HSPRG1 => cpu.thread.hsprg[1] = value,
        spr::HDSISR => cpu.thread.hdsisr = value,
        spr::HDAR => cpu.thread.hdar = value,
        spr::HDEC => cpu.core.hdec = value as u32,
        spr::RMOR => {
            cpu.core.rmor = value;
            mmu::flush_core_erats(cpu);
        }
        spr::HRMOR => {
            cpu.core.hrmor = value;
            mmu::flush_core_erats(cpu);
        }
        spr::HSRR0 => cpu.thread.hsrr0 = value,
        spr::HSRR1 => cpu.thread.hsrr1 = value,
        spr::LPCR => {
            cpu.core.lpcr = value;
            mmu::flush_core_erats(cpu);
        }
        spr::LPIDR => cpu.core.lpidr = value,
        spr::TSCR => cpu.core.tscr = value,
        spr::TTR => cpu.core.ttr = value,
        spr::PPE_TLB_INDEX_HINT => cpu.thread.tlb_index_hint = value,
        spr::PPE_TLB_INDEX => cpu.core.tlb_index = value,
        spr::PPE_TLB_VPN => mmu::tlb_install(cpu, value),
        spr::PPE_TLB_RPN => cpu.core.tlb_rpn = value,
        spr::PPE_TLB_RMT => cpu.core.tlb_rmt = value,
        spr::HID0 => cpu.core.hid0 = value,
        spr::HID1 => cpu.core.hid1 = value,
        spr::HID4 => cpu.core.hid4 = value,
        spr::HID6 => {
            cpu.core.hid6 = value;
            mmu::flush_core_erats(cpu);
        }
        spr::DABR => cpu.thread.dabr = value,
        spr::DABRX => cpu.thread.dabrx = value,
        spr::PIR | spr::PVR | spr::TBL_RO | spr::TBU_RO | spr::CTRLRD => {
            tracing::warn!("mtspr to read-only SPR {} ignored", n);
        }
        _ => tracing::warn!("mtspr to unimplemented SPR {} = 0x{:x}", n, value),
    }
    Ok(())
}

/// mftb - Move From Time Base
pub fn mftb(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rt, _, _) = x_form(word);
    cpu.thread.gpr[rt] = match spr_field(word) {
        spr::TBU_RO => cpu.core.tb >> 32,
        _ => cpu.core.tb,
    };
    Ok(())
}

/// mfcr - Move From Condition Register (and mfocrf)
pub fn mfcr(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rt, _, _) = x_form(word);
    cpu.thread.gpr[rt] = cpu.thread.cr as u64;
    Ok(())
}

/// mtcrf - Move To Condition Register Fields (and mtocrf)
pub fn mtcrf(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rs, _, _) = x_form(word);
    let fxm = bits(word, 12, 19);
    let mut mask = 0u32;
    for field in 0..8 {
        if fxm & (0x80 >> field) != 0 {
            mask |= 0xF000_0000 >> (field * 4);
        }
    }
    let value = cpu.thread.gpr[rs] as u32;
    cpu.thread.cr = (cpu.thread.cr & !mask) | (value & mask);
    Ok(())
}

/// mfmsr - Move From Machine State Register
pub fn mfmsr(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_supervisor()?;
    let (rt, _, _) = x_form(word);
    cpu.thread.gpr[rt] = cpu.thread.msr;
    Ok(())
}

/// Install a new MSR. HV can only be cleared from hypervisor state, never
/// set; a change of PR drops the ERATs since access rights differ.
fn set_msr(cpu: &mut Cpu<'_>, value: u64) {
    let old = cpu.thread.msr;
    let mut value = value;
    if old & msr::HV == 0 {
        value &= !msr::HV;
    }
    cpu.thread.msr = value;
    if (old ^ value) & msr::PR != 0 {
        cpu.thread.flush_erats();
    }
}

/// mtmsr - Move To Machine State Register (low word)
pub fn mtmsr(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_supervisor()?;
    let (rs, _, _) = x_form(word);
    let value = (cpu.thread.msr & 0xFFFF_FFFF_0000_0000) | (cpu.thread.gpr[rs] & 0xFFFF_FFFF);
    set_msr(cpu, value);
    Ok(())
}

/// mtmsrd - Move To Machine State Register Doubleword
pub fn mtmsrd(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_supervisor()?;
    let (rs, _, _) = x_form(word);
    let rs_value = cpu.thread.gpr[rs];
    if bits(word, 15, 15) != 0 {
        let keep = !(msr::EE | msr::RI);
        cpu.thread.msr = (cpu.thread.msr & keep) | (rs_value & (msr::EE | msr::RI));
    } else {
        set_msr(cpu, rs_value);
    }
    Ok(())
}

/// rfid - Return From Interrupt Doubleword
pub fn rfid(cpu: &mut Cpu<'_>, _word: u32) -> ExecResult {
    cpu.require_supervisor()?;
    let (srr0, srr1) = (cpu.thread.srr0, cpu.thread.srr1);
    set_msr(cpu, srr1);
    cpu.thread.nia = cpu.thread.mask_ea(srr0 & !3);
    Ok(())
}

/// hrfid - Hypervisor Return From Interrupt Doubleword
pub fn hrfid(cpu: &mut Cpu<'_>, _word: u32) -> ExecResult {
    if !cpu.thread.hv() {
        return Err(cpu.raise(Exceptions::PROGRAM_PRIVILEGED));
    }
    let (hsrr0, hsrr1) = (cpu.thread.hsrr0, cpu.thread.hsrr1);
    set_msr(cpu, hsrr1);
    cpu.thread.nia = cpu.thread.mask_ea(hsrr0 & !3);
    Ok(())
}

// Segment lookaside buffer

/// slbmte - SLB Move To Entry
pub fn slbmte(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_supervisor()?;
    let (rs, _, rb) = x_form(word);
    let (rs, rb) = (cpu.thread.gpr[rs], cpu.thread.gpr[rb]);
    mmu::slb_move_to_entry(cpu, rs, rb);
    Ok(())
}

/// slbie - SLB Invalidate Entry
pub fn slbie(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_supervisor()?;
    let (_, _, rb) = x_form(word);
    let rb = cpu.thread.gpr[rb];
    mmu::slb_invalidate_entry(cpu, rb);
    Ok(())
}

/// slbia - SLB Invalidate All
pub fn slbia(cpu: &mut Cpu<'_>, _word: u32) -> ExecResult {
    cpu.require_supervisor()?;
    mmu::slb_invalidate_all(cpu);
    Ok(())
}

/// slbmfev - SLB Move From Entry VSID
pub fn slbmfev(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_supervisor()?;
    let (rt, _, rb) = x_form(word);
    let index = (cpu.thread.gpr[rb] & 0x3F) as usize;
    cpu.thread.gpr[rt] = cpu.thread.slb[index].vsid_word();
    Ok(())
}

/// slbmfee - SLB Move From Entry ESID
pub fn slbmfee(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_supervisor()?;
    let (rt, _, rb) = x_form(word);
    let index = (cpu.thread.gpr[rb] & 0x3F) as usize;
    cpu.thread.gpr[rt] = cpu.thread.slb[index].esid_word() | index as u64;
    Ok(())
}

// Translation lookaside buffer

/// tlbiel - TLB Invalidate Entry Local
pub fn tlbiel(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_supervisor()?;
    let (_, _, rb) = x_form(word);
    let large = bits(word, 10, 10) != 0;
    let rb = cpu.thread.gpr[rb];
    mmu::tlb_invalidate(cpu, rb, large, false);
    Ok(())
}

/// tlbie - TLB Invalidate Entry, broadcast to every core
pub fn tlbie(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_supervisor()?;
    let (_, _, rb) = x_form(word);
    let large = bits(word, 10, 10) != 0;
    let rb = cpu.thread.gpr[rb];
    mmu::tlb_invalidate(cpu, rb, large, true);
    Ok(())
}

/// tlbsync - TLB Synchronize
pub fn tlbsync(cpu: &mut Cpu<'_>, _word: u32) -> ExecResult {
    cpu.require_supervisor()
}

/// sync, eieio, isync: every access is performed in order already
pub fn barrier(_cpu: &mut Cpu<'_>, _word: u32) -> ExecResult {
    Ok(())
}
