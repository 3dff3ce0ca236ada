//! Address translation
//!
//! Effective addresses resolve through, in order: the thread's ERAT, real
//! mode (MSR[IR]/MSR[DR] clear), the SLB, the core's 4x256 TLB and finally
//! the hashed page table in memory. Page tables are only walked by hardware
//! when LPCR[TL] is clear; in software-TLB mode a miss raises a storage
//! exception and leaves a replacement hint for the hypervisor's refill
//! handler.
//!
//! Virtual addresses are modelled as 64-bit values: a 36-bit VSID above a
//! 28-bit segment offset.

use std::collections::HashMap;

use xc_core::{mmu_debug, mmu_trace};

use crate::cpu::{Cpu, Fault};
use crate::exceptions::Exceptions;
use crate::regs::{dsisr, lpcr, msr, srr1};
use crate::thread::{CoreState, ThreadState};

pub const SLB_ENTRIES: usize = 64;
pub const TLB_SETS: usize = 4;
pub const TLB_INDEXES: usize = 256;
pub const ERAT_ENTRIES: usize = 64;

/// Real addresses are 42 bits wide
pub const REAL_MASK: u64 = 0x3FF_FFFF_FFFF;

pub mod pte {
    pub const VALID: u64 = 0x1;
    pub const HASH: u64 = 0x2;
    pub const LARGE: u64 = 0x4;
    pub const LP: u64 = 0x1000;
    pub const REFERENCED: u64 = 0x100;
    pub const CHANGED: u64 = 0x80;
    pub const RPN_MASK: u64 = 0x3FF_FFFF_F000;
}

/// Kind of access being translated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Fetch,
    Read,
    Write,
}

impl Access {
    #[inline]
    fn is_write(self) -> bool {
        self == Access::Write
    }
}

/// Translation counters, per core
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MmuStats {
    pub erat_hits: u64,
    pub erat_misses: u64,
    pub tlb_hits: u64,
    pub tlb_misses: u64,
    pub table_walks: u64,
}

/// Segment lookaside buffer entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlbEntry {
    pub valid: bool,
    pub esid: u64,
    pub vsid: u64,
    pub ks: bool,
    pub kp: bool,
    pub n: bool,
    pub l: bool,
    pub c: bool,
    pub lp: u8,
}

impl SlbEntry {
    /// Decode the operands of slbmte: RS holds the VSID word, RB the ESID
    /// word
    pub fn from_slbmte(rs: u64, rb: u64) -> Self {
        Self {
            valid: rb & 0x800_0000 != 0,
            esid: rb >> 28,
            vsid: rs >> 12,
            ks: rs & 0x800 != 0,
            kp: rs & 0x400 != 0,
            n: rs & 0x200 != 0,
            l: rs & 0x100 != 0,
            c: rs & 0x80 != 0,
            lp: ((rs & 0x30) >> 4) as u8,
        }
    }

    /// VSID word as read by slbmfev
    pub fn vsid_word(&self) -> u64 {
        (self.vsid << 12)
            | (self.ks as u64) << 11
            | (self.kp as u64) << 10
            | (self.n as u64) << 9
            | (self.l as u64) << 8
            | (self.c as u64) << 7
            | (self.lp as u64) << 4
    }

    /// ESID word as read by slbmfee (without the index)
    pub fn esid_word(&self) -> u64 {
        (self.esid << 28) | if self.valid { 0x800_0000 } else { 0 }
    }
}

#[derive(Debug, Clone, Copy)]
struct EratEntry {
    ra_page: u64,
    changed: bool,
    stamp: u64,
}

/// Effective-to-real translation cache, least recently used replacement
#[derive(Debug, Clone, Default)]
pub struct Erat {
    entries: HashMap<u64, EratEntry>,
    clock: u64,
}

impl Erat {
    pub fn new() -> Self {
        Self { entries: HashMap::with_capacity(ERAT_ENTRIES), clock: 0 }
    }

    /// Cached real address for `ea`
    ///
    /// A write through an entry whose page is not yet marked changed misses
    /// so the walk can set C.
    pub fn lookup(&mut self, ea: u64, write: bool) -> Option<u64> {
        self.clock += 1;
        let clock = self.clock;
        let entry = self.entries.get_mut(&(ea >> 12))?;
        if write && !entry.changed {
            return None;
        }
        entry.stamp = clock;
        Some((entry.ra_page << 12) | (ea & 0xFFF))
    }

    pub fn insert(&mut self, ea: u64, ra: u64, changed: bool) {
        self.clock += 1;
        if self.entries.len() >= ERAT_ENTRIES && !self.entries.contains_key(&(ea >> 12)) {
            if let Some(victim) = self.entries.iter().min_by_key(|(_, e)| e.stamp).map(|(k, _)| *k) {
                self.entries.remove(&victim);
            }
        }
        self.entries.insert(ea >> 12, EratEntry { ra_page: ra >> 12, changed, stamp: self.clock });
    }

    pub fn flush(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One TLB entry, in page table entry format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TlbEntry {
    pub pte0: u64,
    pub pte1: u64,
    /// Real address of the page table entry it came from, if walked
    pub pte_addr: Option<u64>,
}

impl TlbEntry {
    #[inline]
    pub fn valid(&self) -> bool {
        self.pte0 & pte::VALID != 0
    }
}

/// Four-way, 256-index translation lookaside buffer shared by a core
#[derive(Debug, Clone)]
pub struct Tlb {
    sets: Box<[[TlbEntry; TLB_INDEXES]; TLB_SETS]>,
    victim: Box<[u8; TLB_INDEXES]>,
}

impl Default for Tlb {
    fn default() -> Self {
        Self::new()
    }
}

impl Tlb {
    pub fn new() -> Self {
        Self {
            sets: Box::new([[TlbEntry::default(); TLB_INDEXES]; TLB_SETS]),
            victim: Box::new([0; TLB_INDEXES]),
        }
    }

    #[inline]
    pub fn entry(&self, set: usize, index: usize) -> &TlbEntry {
        &self.sets[set][index]
    }

    pub fn set_entry(&mut self, set: usize, index: usize, entry: TlbEntry) {
        self.sets[set][index] = entry;
    }

    /// Set to fill at `index`: the first invalid one, else round-robin
    pub fn pick_victim(&mut self, index: usize) -> usize {
        if let Some(set) = (0..TLB_SETS).find(|&s| !self.sets[s][index].valid()) {
            return set;
        }
        let set = self.victim[index] as usize % TLB_SETS;
        self.victim[index] = ((set + 1) % TLB_SETS) as u8;
        set
    }

    pub fn invalidate(&mut self, set: usize, index: usize) {
        self.sets[set][index] = TlbEntry::default();
    }

    pub fn flush(&mut self) {
        for set in self.sets.iter_mut() {
            set.fill(TlbEntry::default());
        }
    }

    /// Number of valid entries
    pub fn valid_count(&self) -> usize {
        self.sets.iter().flatten().filter(|e| e.valid()).count()
    }
}

/// Page shift for a segment, honouring the HID6 large-page selectors
pub fn page_shift(large: bool, lp: bool, hid6: u64) -> u32 {
    if !large {
        return 12;
    }
    let select = if lp { (hid6 >> 44) & 3 } else { (hid6 >> 46) & 3 };
    match select {
        0 => 24,
        1 => 20,
        2 => 16,
        _ => 12,
    }
}

/// 64-bit virtual address of `ea` in a segment
#[inline]
pub fn virtual_address(vsid: u64, ea: u64) -> u64 {
    ((vsid & 0xF_FFFF_FFFF) << 28) | (ea & 0x0FFF_FFFF)
}

/// TLB congruence class of a virtual address
pub fn tlb_index(va: u64, p: u32) -> usize {
    let index = match p {
        12 => ((((va >> 24) & 0xF) ^ ((va >> 16) & 0xF)) << 4) | ((va >> 12) & 0xF),
        16 => ((((va >> 24) & 0xF) ^ ((va >> 20) & 0xF)) << 4) | ((va >> 16) & 0xF),
        20 => (va >> 20) & 0xFF,
        _ => (va >> 24) & 0xFF,
    };
    index as usize
}

/// Whether a PTE maps `va` for a page of size `1 << p`
pub fn pte_matches(pte0: u64, pte1: u64, va: u64, p: u32, large: bool, lp: bool) -> bool {
    if pte0 & pte::VALID == 0 {
        return false;
    }
    if (pte0 & pte::LARGE != 0) != large {
        return false;
    }
    if large && (pte1 & pte::LP != 0) != lp {
        return false;
    }
    let q = 5u32.min(28u32.saturating_sub(p));
    let ignore = 5 - q;
    let mask = ((1u64 << 41) - 1) & !((1u64 << ignore) - 1);
    ((pte0 >> 7) & mask) == ((va >> 23) & mask)
}

/// Real address from a matching PTE
#[inline]
pub fn real_address(pte1: u64, ea: u64, p: u32) -> u64 {
    let page_mask = (1u64 << p) - 1;
    ((pte1 & pte::RPN_MASK & !page_mask) | (ea & page_mask)) & REAL_MASK
}

/// Real-mode translation
pub fn real_mode(thread: &ThreadState, core: &CoreState, ea: u64) -> u64 {
    if thread.msr & msr::HV != 0 {
        if ea & (1 << 63) != 0 {
            return ea & REAL_MASK;
        }
        return ((ea | core.hrmor) & 0x3FF_FFF0_0000) | (ea & 0xF_FFFF);
    }
    ((ea | core.rmor) & 0x3FF_FFF0_0000) | (ea & 0xF_FFFF)
}

/// Drop stale cached translations before using them
fn synchronize(cpu: &mut Cpu<'_>) {
    let global = cpu.shared.current_tlb_epoch();
    if cpu.core.tlb_epoch != global {
        cpu.core.tlb_epoch = global;
        cpu.core.tlb.flush();
        cpu.core.erat_epoch += 1;
    }
    if cpu.thread.erat_epoch != cpu.core.erat_epoch {
        cpu.thread.erat_epoch = cpu.core.erat_epoch;
        cpu.thread.flush_erats();
    }
}

/// Translate an effective address, raising the architected exception on
/// failure
pub fn translate(cpu: &mut Cpu<'_>, ea: u64, access: Access) -> Result<u64, Fault> {
    let ea = cpu.thread.mask_ea(ea);
    let relocate = match access {
        Access::Fetch => cpu.thread.msr & msr::IR != 0,
        _ => cpu.thread.msr & msr::DR != 0,
    };
    if !relocate {
        return Ok(real_mode(cpu.thread, cpu.core, ea));
    }

    synchronize(cpu);

    let erat = match access {
        Access::Fetch => &mut cpu.thread.ierat,
        _ => &mut cpu.thread.derat,
    };
    if let Some(ra) = erat.lookup(ea, access.is_write()) {
        cpu.core.mmu_stats.erat_hits += 1;
        return Ok(ra);
    }
    cpu.core.mmu_stats.erat_misses += 1;

    let (ra, changed) = translate_virtual(cpu, ea, access)?;
    let erat = match access {
        Access::Fetch => &mut cpu.thread.ierat,
        _ => &mut cpu.thread.derat,
    };
    erat.insert(ea, ra, changed);
    Ok(ra)
}

/// Segment, TLB and page-table stages. Returns the real address and
/// whether the page is marked changed.
fn translate_virtual(cpu: &mut Cpu<'_>, ea: u64, access: Access) -> Result<(u64, bool), Fault> {
    let esid = ea >> 28;
    let Some(slb) = cpu.thread.slb.iter().find(|e| e.valid && e.esid == esid).copied() else {
        mmu_debug!("SLB miss for EA 0x{:x} ({:?})", ea, access);
        return Err(match access {
            Access::Fetch => cpu.raise(Exceptions::INSTR_SEGMENT),
            _ => {
                cpu.thread.dar = ea;
                cpu.raise(Exceptions::DATA_SEGMENT)
            }
        });
    };

    let lp = slb.lp != 0;
    let p = page_shift(slb.l, lp, cpu.core.hid6);
    let va = virtual_address(slb.vsid, ea);
    let index = tlb_index(va, p);

    // TLB
    for set in 0..TLB_SETS {
        let entry = *cpu.core.tlb.entry(set, index);
        if !pte_matches(entry.pte0, entry.pte1, va, p, slb.l, lp) {
            continue;
        }
        cpu.core.mmu_stats.tlb_hits += 1;
        let mut entry = entry;
        let mut rc = pte::REFERENCED;
        if access.is_write() {
            rc |= pte::CHANGED;
        }
        if entry.pte1 & rc != rc {
            entry.pte1 |= rc;
            if let Some(addr) = entry.pte_addr {
                cpu.shared.store_real(addr + 8, &entry.pte1.to_be_bytes());
            }
            cpu.core.tlb.set_entry(set, index, entry);
        }
        let ra = real_address(entry.pte1, ea, p);
        mmu_trace!("TLB hit EA 0x{:x} -> RA 0x{:x} (set {}, index {})", ea, ra, set, index);
        return Ok((ra, entry.pte1 & pte::CHANGED != 0));
    }
    cpu.core.mmu_stats.tlb_misses += 1;

    if cpu.core.lpcr & lpcr::TL != 0 {
        let set = cpu.core.tlb.pick_victim(index);
        cpu.thread.tlb_index_hint = ((index as u64) << 4) | (0b1000 >> set);
        mmu_debug!("Software TLB miss for EA 0x{:x}, hint 0x{:x}", ea, cpu.thread.tlb_index_hint);
        return Err(storage_fault(cpu, ea, access));
    }

    match walk_page_table(cpu, ea, va, slb.vsid, p, slb.l, lp, access) {
        Some((pte_addr, pte0, pte1)) => {
            let set = cpu.core.tlb.pick_victim(index);
            cpu.core.tlb.set_entry(set, index, TlbEntry { pte0, pte1, pte_addr: Some(pte_addr) });
            let ra = real_address(pte1, ea, p);
            mmu_trace!("Table walk EA 0x{:x} -> RA 0x{:x}", ea, ra);
            Ok((ra, pte1 & pte::CHANGED != 0))
        }
        None => {
            mmu_debug!("No PTE for EA 0x{:x} (VA 0x{:x})", ea, va);
            Err(storage_fault(cpu, ea, access))
        }
    }
}

fn storage_fault(cpu: &mut Cpu<'_>, ea: u64, access: Access) -> Fault {
    match access {
        Access::Fetch => {
            cpu.thread.isi_reason = srr1::ISI_NOPTE;
            cpu.raise(Exceptions::INSTR_STORAGE)
        }
        _ => {
            cpu.thread.dar = ea;
            cpu.thread.dsisr = dsisr::NOPTE | if access.is_write() { dsisr::STORE } else { 0 };
            cpu.raise(Exceptions::DATA_STORAGE)
        }
    }
}

/// Search the primary then secondary PTEG. On a match R (and C for writes)
/// are set in memory.
#[allow(clippy::too_many_arguments)]
fn walk_page_table(
    cpu: &mut Cpu<'_>,
    ea: u64,
    va: u64,
    vsid: u64,
    p: u32,
    large: bool,
    lp: bool,
    access: Access,
) -> Option<(u64, u64, u64)> {
    cpu.core.mmu_stats.table_walks += 1;
    let sdr1 = cpu.core.sdr1;
    let htab_org = sdr1 & 0x0FFF_FFFF_FFFC_0000;
    let hash_mask = (1u64 << (11 + (sdr1 & 0x1F))) - 1;
    let primary = (vsid & 0x7F_FFFF_FFFF) ^ ((ea & 0x0FFF_FFFF) >> p);

    for (secondary, hash) in [(false, primary), (true, !primary)] {
        let pteg = htab_org | ((hash & hash_mask) << 7);
        for slot in 0..8u64 {
            let addr = pteg + slot * 16;
            let (Ok(pte0), Ok(mut pte1)) =
                (cpu.shared.bus.read_be64(addr), cpu.shared.bus.read_be64(addr + 8))
            else {
                continue;
            };
            if (pte0 & pte::HASH != 0) != secondary {
                continue;
            }
            if !pte_matches(pte0, pte1, va, p, large, lp) {
                continue;
            }
            let mut rc = pte::REFERENCED;
            if access.is_write() {
                rc |= pte::CHANGED;
            }
            if pte1 & rc != rc {
                pte1 |= rc;
                cpu.shared.store_real(addr + 8, &pte1.to_be_bytes());
            }
            return Some((addr, pte0, pte1));
        }
    }
    None
}

/// Ask every thread of the core to drop its ERATs
pub fn flush_core_erats(cpu: &mut Cpu<'_>) {
    cpu.core.erat_epoch += 1;
    cpu.thread.erat_epoch = cpu.core.erat_epoch;
    cpu.thread.flush_erats();
}

/// slbmte
pub fn slb_move_to_entry(cpu: &mut Cpu<'_>, rs: u64, rb: u64) {
    let index = (rb & 0x3F) as usize;
    let entry = SlbEntry::from_slbmte(rs, rb);
    mmu_debug!("SLB[{}] = ESID 0x{:x} VSID 0x{:x} valid {}", index, entry.esid, entry.vsid, entry.valid);
    cpu.thread.slb[index] = entry;
    flush_core_erats(cpu);
}

/// slbie
pub fn slb_invalidate_entry(cpu: &mut Cpu<'_>, rb: u64) {
    let esid = rb >> 28;
    for entry in cpu.thread.slb.iter_mut().filter(|e| e.valid && e.esid == esid) {
        entry.valid = false;
    }
    flush_core_erats(cpu);
}

/// slbia
pub fn slb_invalidate_all(cpu: &mut Cpu<'_>) {
    for entry in cpu.thread.slb.iter_mut() {
        entry.valid = false;
    }
    flush_core_erats(cpu);
}

/// tlbiel/tlbie: drop TLB entries selected by RB, then every ERAT
pub fn tlb_invalidate(cpu: &mut Cpu<'_>, rb: u64, large: bool, broadcast: bool) {
    let lp = rb & 0x1000 != 0;
    let by_index = rb & 0x800 != 0;
    let p = page_shift(large, lp, cpu.core.hid6);

    if by_index {
        let index = ((rb >> 12) & 0xFF) as usize;
        for set in 0..TLB_SETS {
            cpu.core.tlb.invalidate(set, index);
        }
    } else {
        let index = tlb_index(rb, p);
        for set in 0..TLB_SETS {
            let entry = *cpu.core.tlb.entry(set, index);
            if pte_matches(entry.pte0, entry.pte1, rb, p, large, lp) {
                cpu.core.tlb.invalidate(set, index);
            }
        }
    }
    flush_core_erats(cpu);

    if broadcast {
        // Keep our own epoch current so only the other cores flush
        let epoch = cpu.shared.broadcast_tlb_invalidate();
        if cpu.core.tlb_epoch + 1 == epoch {
            cpu.core.tlb_epoch = epoch;
        }
    }
}

/// mtspr PpeTlbVpn: install the staged entry into the set and index named
/// by PpeTlbIndex
pub fn tlb_install(cpu: &mut Cpu<'_>, vpn: u64) {
    let index = ((cpu.core.tlb_index & 0xFF0) >> 4) as usize;
    let set = match cpu.core.tlb_index & 0xF {
        0b1000 => 0,
        0b0100 => 1,
        0b0010 => 2,
        0b0001 => 3,
        other => {
            tracing::warn!("PpeTlbIndex set select 0x{:x} is not one-hot, using set 0", other);
            0
        }
    };
    let entry = TlbEntry { pte0: vpn, pte1: cpu.core.tlb_rpn, pte_addr: None };
    mmu_debug!("TLB[{}][{}] <- 0x{:016x} 0x{:016x}", set, index, entry.pte0, entry.pte1);
    cpu.core.tlb.set_entry(set, index, entry);
    flush_core_erats(cpu);
}
