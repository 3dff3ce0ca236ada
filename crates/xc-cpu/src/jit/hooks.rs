//! Runtime entry points for generated code
//!
//! Generated blocks operate on the guest registers in [`ThreadState`]
//! directly and call back into Rust for anything that needs the MMU, the
//! bus, or the per-instruction epilogue shared with the interpreter. Each
//! hook receives the [`BlockContext`] of the running block first.
//!
//! Memory hooks report faults through [`BlockContext::status`], which the
//! generated code reads back after every call.

use std::mem::offset_of;

use xc_core::CpuError;

use crate::cpu::{Cpu, ExecResult, Fault};
use crate::exceptions;
use crate::interpreter;
use crate::thread::ThreadState;

use super::block::Block;
use super::JitStats;

/// Outcome codes passed between generated code and the hooks
pub mod status {
    pub const OK: u32 = 0;
    pub const EXCEPTION: u32 = 1;
    pub const INVALID: u32 = 2;
}

pub const FALLBACK: &str = "xc_fallback";
pub const COMPLETE: &str = "xc_complete";
pub const READ: &str = "xc_read";
pub const WRITE: &str = "xc_write";
pub const RECORD: &str = "xc_record";

/// Entry point of a compiled block
pub type BlockFn = unsafe extern "C" fn(ctx: *mut BlockContext<'_, '_>, thread: *mut ThreadState);

/// Byte offset of [`BlockContext::status`]
pub const STATUS_OFFSET: i32 = offset_of!(BlockContext<'static, 'static>, status) as i32;

/// State of one block execution
#[repr(C)]
pub struct BlockContext<'c, 'a> {
    /// Outcome of the last memory hook
    pub status: u32,
    cpu: &'c mut Cpu<'a>,
    block: &'c Block,
    stats: &'c mut JitStats,
    budget: u64,
    executed: u64,
    /// MSR at block entry
    msr: u64,
    /// Code-watch generation of the block's page at entry
    generation: u32,
    error: Option<CpuError>,
}

fn status_of(result: ExecResult) -> u32 {
    match result {
        Ok(()) => status::OK,
        Err(Fault::Exception) => status::EXCEPTION,
        Err(Fault::Invalid) => status::INVALID,
    }
}

impl<'c, 'a> BlockContext<'c, 'a> {
    /// Context for running `block`, whose first instruction has been begun
    pub fn new(cpu: &'c mut Cpu<'a>, block: &'c Block, stats: &'c mut JitStats, budget: u64) -> Self {
        let msr = cpu.thread.msr;
        let generation = cpu.shared.code_watch.generation(block.start_ra);
        Self { status: status::OK, cpu, block, stats, budget, executed: 0, msr, generation, error: None }
    }

    /// Instructions attempted, or the error that stopped the block
    pub fn finish(self) -> Result<u64, CpuError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.executed),
        }
    }

    /// Run instruction `index` through its interpreter handler
    pub fn fallback(&mut self, index: usize) -> u32 {
        let op = self.block.ops[index];
        status_of(interpreter::handler_for(op.op)(self.cpu, op.word))
    }

    /// Retire instruction `index` with `status` and run the epilogue
    ///
    /// Returns true when the block must stop after this instruction.
    /// Otherwise the next instruction has been begun.
    pub fn complete(&mut self, index: usize, status: u32) -> bool {
        let op = self.block.ops[index];
        if op.native {
            self.stats.native_instructions += 1;
        } else {
            self.stats.fallback_instructions += 1;
        }
        let outcome = match status {
            status::OK => Ok(()),
            status::EXCEPTION => Err((Fault::Exception, op.word)),
            _ => Err((Fault::Invalid, op.word)),
        };
        if let Err(err) = interpreter::complete(self.cpu, outcome) {
            self.error = Some(err);
            return true;
        }
        self.executed += 1;

        let thread = &*self.cpu.thread;
        let sequential = thread.mask_ea(thread.cia.wrapping_add(4));
        let stop = self.executed >= self.budget
            || index + 1 >= self.block.ops.len()
            || thread.nia != sequential
            || thread.msr != self.msr
            || exceptions::next_pending(thread).is_some()
            || self.cpu.shared.code_watch.generation(self.block.start_ra) != self.generation;
        if !stop {
            interpreter::begin(self.cpu);
        }
        stop
    }

    fn read(&mut self, ea: u64, size: u32) -> u64 {
        let result = match size {
            1 => self.cpu.read_u8(ea).map(u64::from),
            2 => self.cpu.read_u16(ea).map(u64::from),
            4 => self.cpu.read_u32(ea).map(u64::from),
            _ => self.cpu.read_u64(ea),
        };
        match result {
            Ok(value) => {
                self.status = status::OK;
                value
            }
            Err(fault) => {
                self.status = status_of(Err(fault));
                0
            }
        }
    }

    fn write(&mut self, ea: u64, value: u64, size: u32) {
        let result = match size {
            1 => self.cpu.write_u8(ea, value as u8),
            2 => self.cpu.write_u16(ea, value as u16),
            4 => self.cpu.write_u32(ea, value as u32),
            _ => self.cpu.write_u64(ea, value),
        };
        self.status = status_of(result);
    }
}

// SAFETY (all hooks): generated code passes the context pointer it was
// entered with, which points at a live BlockContext for the whole call.

unsafe extern "C" fn xc_fallback(ctx: *mut BlockContext<'_, '_>, index: u64) -> u32 {
    let ctx = unsafe { &mut *ctx };
    ctx.fallback(index as usize)
}

unsafe extern "C" fn xc_complete(ctx: *mut BlockContext<'_, '_>, index: u64, status: u32) -> u32 {
    let ctx = unsafe { &mut *ctx };
    ctx.complete(index as usize, status) as u32
}

unsafe extern "C" fn xc_read(ctx: *mut BlockContext<'_, '_>, ea: u64, size: u32) -> u64 {
    let ctx = unsafe { &mut *ctx };
    ctx.read(ea, size)
}

unsafe extern "C" fn xc_write(ctx: *mut BlockContext<'_, '_>, ea: u64, value: u64, size: u32) {
    let ctx = unsafe { &mut *ctx };
    ctx.write(ea, value, size)
}

unsafe extern "C" fn xc_record(ctx: *mut BlockContext<'_, '_>, value: u64) {
    let ctx = unsafe { &mut *ctx };
    ctx.cpu.thread.update_cr0(value);
}

/// Hook symbols to register with the code module
pub fn symbols() -> [(&'static str, *const u8); 5] {
    [
        (FALLBACK, xc_fallback as *const u8),
        (COMPLETE, xc_complete as *const u8),
        (READ, xc_read as *const u8),
        (WRITE, xc_write as *const u8),
        (RECORD, xc_record as *const u8),
    ]
}
