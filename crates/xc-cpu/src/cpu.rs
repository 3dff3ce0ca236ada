//! Execution context
//!
//! [`Cpu`] bundles the thread being executed, the core it runs on and the
//! system-wide [`Shared`] state. Instruction handlers, the MMU and the JIT
//! all operate on a `Cpu`; nothing in the crate reaches for global state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use xc_core::config::CpuConfig;
use xc_core::mmu_trace;
use xc_memory::{Bus, ReservationTable};

use crate::exceptions::Exceptions;
use crate::iic::Iic;
use crate::jit::CodeWatch;
use crate::mmu::{self, Access};
use crate::regs::msr;
use crate::thread::{CoreState, ThreadState};
use crate::timebase::TimeBaseControl;
use crate::vmx::Vector128;

/// Hardware threads in the system
pub const HW_THREADS: usize = 6;

/// Why an instruction did not complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// An exception was raised and is pending on the thread
    Exception,
    /// The word does not decode to a supported instruction
    Invalid,
}

/// Result of executing one instruction
pub type ExecResult = Result<(), Fault>;

/// State shared by every core
pub struct Shared {
    pub bus: Arc<dyn Bus>,
    pub iic: Arc<Iic>,
    pub time_base: Arc<TimeBaseControl>,
    pub reservations: ReservationTable,
    pub code_watch: CodeWatch,
    /// Bumped by every broadcast tlbie
    pub tlb_epoch: AtomicU64,
    pub config: CpuConfig,
    /// Time-base ticks per retired instruction
    pub cpi: u32,
}

impl Shared {
    pub fn new(
        bus: Arc<dyn Bus>,
        iic: Arc<Iic>,
        time_base: Arc<TimeBaseControl>,
        config: CpuConfig,
        cpi: u32,
    ) -> Self {
        Self {
            bus,
            iic,
            time_base,
            reservations: ReservationTable::new(HW_THREADS),
            code_watch: CodeWatch::new(),
            tlb_epoch: AtomicU64::new(0),
            config,
            cpi: cpi.max(1),
        }
    }

    /// Shared state over `bus` with private, unmapped interrupt controller
    /// and time-base devices
    pub fn standalone(bus: Arc<dyn Bus>, config: CpuConfig) -> Self {
        let time_base = Arc::new(TimeBaseControl::with_state(config.time_base_enabled));
        Self::new(bus, Arc::new(Iic::new()), time_base, config, 1)
    }

    /// Announce a TLB invalidation to every other core
    pub fn broadcast_tlb_invalidate(&self) -> u64 {
        self.tlb_epoch.fetch_add(1, Ordering::AcqRel) + 1
    }

    #[inline]
    pub fn current_tlb_epoch(&self) -> u64 {
        self.tlb_epoch.load(Ordering::Acquire)
    }

    /// Store `data` at real address `ra`, ordered against reservations
    ///
    /// A failed bus write is logged and otherwise dropped, as the hardware
    /// drops writes to unmapped space.
    pub fn store_real(&self, ra: u64, data: &[u8]) {
        let len = data.len() as u64;
        if let Err(e) = self.reservations.store(ra, len, || self.bus.write(ra, data)) {
            tracing::warn!("Store of {} bytes to 0x{:x} dropped: {}", len, ra, e);
        }
        self.code_watch.note_write(ra, len);
    }
}

/// One thread executing on one core
pub struct Cpu<'a> {
    pub thread: &'a mut ThreadState,
    pub core: &'a mut CoreState,
    pub shared: &'a Shared,
}

impl<'a> Cpu<'a> {
    pub fn new(thread: &'a mut ThreadState, core: &'a mut CoreState, shared: &'a Shared) -> Self {
        Self { thread, core, shared }
    }

    /// Mark `kind` pending and abort the current instruction
    #[inline]
    pub fn raise(&mut self, kind: Exceptions) -> Fault {
        self.thread.exceptions |= kind;
        Fault::Exception
    }

    /// Raise an alignment exception for `ea`
    pub fn alignment(&mut self, ea: u64) -> Fault {
        self.thread.dar = ea;
        self.raise(Exceptions::ALIGNMENT)
    }

    /// (RA|0) + d
    #[inline]
    pub fn ea_d(&self, ra: usize, d: i64) -> u64 {
        let base = if ra == 0 { 0 } else { self.thread.gpr[ra] };
        self.thread.mask_ea(base.wrapping_add(d as u64))
    }

    /// (RA|0) + (RB)
    #[inline]
    pub fn ea_x(&self, ra: usize, rb: usize) -> u64 {
        let base = if ra == 0 { 0 } else { self.thread.gpr[ra] };
        self.thread.mask_ea(base.wrapping_add(self.thread.gpr[rb]))
    }

    /// Fail with FP-unavailable unless MSR[FP] is set
    #[inline]
    pub fn require_fp(&mut self) -> ExecResult {
        if self.thread.msr & msr::FP == 0 {
            return Err(self.raise(Exceptions::FP_UNAVAILABLE));
        }
        Ok(())
    }

    /// Fail with vector-unavailable unless MSR[VEC] is set
    #[inline]
    pub fn require_vec(&mut self) -> ExecResult {
        if self.thread.msr & msr::VEC == 0 {
            return Err(self.raise(Exceptions::VECTOR_UNAVAILABLE));
        }
        Ok(())
    }

    /// Fail with a privileged-instruction program exception in problem state
    #[inline]
    pub fn require_supervisor(&mut self) -> ExecResult {
        if self.thread.pr() {
            return Err(self.raise(Exceptions::PROGRAM_PRIVILEGED));
        }
        Ok(())
    }

    /// Real address of the instruction at CIA
    pub fn fetch_address(&mut self) -> Result<u64, Fault> {
        let ea = self.thread.cia;
        if ea & 3 != 0 {
            return Err(self.raise(Exceptions::INSTR_STORAGE));
        }
        mmu::translate(self, ea, Access::Fetch)
    }

    /// Fetch the instruction at CIA
    pub fn fetch(&mut self) -> Result<u32, Fault> {
        let ra = self.fetch_address()?;
        Ok(self.shared.bus.read_be32(ra).unwrap_or(u32::MAX))
    }

    /// Translate an access that may straddle a 4K boundary
    fn translate_span(&mut self, ea: u64, len: usize, access: Access) -> Result<[(u64, usize); 2], Fault> {
        let first = ((0x1000 - (ea & 0xFFF)) as usize).min(len);
        let ra0 = mmu::translate(self, ea, access)?;
        if first == len {
            return Ok([(ra0, len), (0, 0)]);
        }
        let ea1 = self.thread.mask_ea((ea | 0xFFF).wrapping_add(1));
        let ra1 = mmu::translate(self, ea1, access)?;
        Ok([(ra0, first), (ra1, len - first)])
    }

    /// Read `buf.len()` bytes at `ea`
    pub fn read_bytes(&mut self, ea: u64, buf: &mut [u8]) -> ExecResult {
        let spans = self.translate_span(ea, buf.len(), Access::Read)?;
        let mut offset = 0;
        for (ra, len) in spans {
            if len == 0 {
                continue;
            }
            // Failed reads leave the fill pattern in the buffer
            if let Err(e) = self.shared.bus.read(ra, &mut buf[offset..offset + len]) {
                mmu_trace!("Read of {} bytes at 0x{:x} unbacked: {}", len, ra, e);
            }
            offset += len;
        }
        Ok(())
    }

    /// Write `data` at `ea`, breaking reservations and flagging code pages
    pub fn write_bytes(&mut self, ea: u64, data: &[u8]) -> ExecResult {
        let spans = self.translate_span(ea, data.len(), Access::Write)?;
        let mut offset = 0;
        for (ra, len) in spans {
            if len == 0 {
                continue;
            }
            self.shared.store_real(ra, &data[offset..offset + len]);
            offset += len;
        }
        Ok(())
    }

    pub fn read_u8(&mut self, ea: u64) -> Result<u8, Fault> {
        let mut buf = [0u8; 1];
        self.read_bytes(ea, &mut buf)?;
        Ok(buf[0])
    }

    pub fn read_u16(&mut self, ea: u64) -> Result<u16, Fault> {
        let mut buf = [0u8; 2];
        self.read_bytes(ea, &mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    pub fn read_u32(&mut self, ea: u64) -> Result<u32, Fault> {
        let mut buf = [0u8; 4];
        self.read_bytes(ea, &mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    pub fn read_u64(&mut self, ea: u64) -> Result<u64, Fault> {
        let mut buf = [0u8; 8];
        self.read_bytes(ea, &mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }

    pub fn write_u8(&mut self, ea: u64, value: u8) -> ExecResult {
        self.write_bytes(ea, &[value])
    }

    pub fn write_u16(&mut self, ea: u64, value: u16) -> ExecResult {
        self.write_bytes(ea, &value.to_be_bytes())
    }

    pub fn write_u32(&mut self, ea: u64, value: u32) -> ExecResult {
        self.write_bytes(ea, &value.to_be_bytes())
    }

    pub fn write_u64(&mut self, ea: u64, value: u64) -> ExecResult {
        self.write_bytes(ea, &value.to_be_bytes())
    }

    /// Load the quadword containing `ea` (low four bits ignored)
    pub fn read_vector(&mut self, ea: u64) -> Result<Vector128, Fault> {
        let mut v = Vector128::ZERO;
        self.read_bytes(ea & !0xF, &mut v.bytes)?;
        Ok(v)
    }

    /// Store a quadword at `ea` (low four bits ignored)
    pub fn write_vector(&mut self, ea: u64, value: &Vector128) -> ExecResult {
        self.write_bytes(ea & !0xF, bytemuck::bytes_of(value))
    }

    /// Translate `ea` for a data access of `len` bytes that must be aligned
    pub fn translate_aligned(&mut self, ea: u64, len: u64, access: Access) -> Result<u64, Fault> {
        if ea & (len - 1) != 0 {
            return Err(self.alignment(ea));
        }
        mmu::translate(self, ea, access)
    }
}
