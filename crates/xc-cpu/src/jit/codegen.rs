//! Native code generation with Cranelift
//!
//! A block becomes one host function taking the block context and the
//! thread's register file. Each instruction is either lowered to IR by its
//! emitter or compiled to a call of the interpreter handler. Both paths end
//! in the completion hook, which retires the instruction and decides whether
//! execution carries on into the next one.
//!
//! All blocks of a cache share one JIT module. Cranelift cannot free single
//! functions, so the module is replaced wholesale on [`Codegen::flush`].

use std::mem::{offset_of, ManuallyDrop};

use cranelift_codegen::ir::condcodes::IntCC;
use cranelift_codegen::ir::{self, types, AbiParam, InstBuilder, MemFlags, Value};
use cranelift_codegen::isa::OwnedTargetIsa;
use cranelift_codegen::settings::{self, Configurable};
use cranelift_frontend::{FuncInstBuilder, FunctionBuilder, FunctionBuilderContext};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{default_libcall_names, FuncId, Linkage, Module, ModuleError};
use thiserror::Error;

use crate::regs::{msr, xer};
use crate::thread::ThreadState;

use super::block::BlockOp;
use super::emitter;
use super::hooks::{self, BlockFn, STATUS_OFFSET};

/// Code generator failures
#[derive(Debug, Error)]
pub enum JitError {
    #[error("host not supported by the code generator: {0}")]
    UnsupportedHost(String),

    #[error("invalid code generator setting: {0}")]
    Settings(#[from] settings::SetError),

    #[error("code generation failed: {0}")]
    Codegen(#[from] cranelift_codegen::CodegenError),

    #[error("code module error: {0}")]
    Module(#[from] ModuleError),
}

/// Register-file fields generated code reads and writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg {
    Cr,
    Lr,
    Ctr,
    Xer,
    Msr,
    Cia,
    Nia,
}

impl Reg {
    fn offset(self) -> i32 {
        let offset = match self {
            Reg::Cr => offset_of!(ThreadState, cr),
            Reg::Lr => offset_of!(ThreadState, lr),
            Reg::Ctr => offset_of!(ThreadState, ctr),
            Reg::Xer => offset_of!(ThreadState, xer),
            Reg::Msr => offset_of!(ThreadState, msr),
            Reg::Cia => offset_of!(ThreadState, cia),
            Reg::Nia => offset_of!(ThreadState, nia),
        };
        offset as i32
    }

    fn ty(self) -> ir::Type {
        match self {
            Reg::Cr => types::I32,
            _ => types::I64,
        }
    }
}

#[inline]
fn gpr_offset(r: usize) -> i32 {
    (offset_of!(ThreadState, gpr) + r * 8) as i32
}

const CA_SHIFT: i64 = xer::CA.trailing_zeros() as i64;

#[derive(Clone, Copy)]
struct HookIds {
    fallback: FuncId,
    complete: FuncId,
    read: FuncId,
    write: FuncId,
    record: FuncId,
}

#[derive(Clone, Copy)]
struct HookRefs {
    fallback: ir::FuncRef,
    complete: ir::FuncRef,
    read: ir::FuncRef,
    write: ir::FuncRef,
    record: ir::FuncRef,
}

/// JIT module holding the code of every live block
struct CodeArena(ManuallyDrop<JITModule>);

// SAFETY: the module is owned by a single core's cache and only reached
// through `&mut`; its raw pointers refer to memory it owns.
unsafe impl Send for CodeArena {}

impl Drop for CodeArena {
    fn drop(&mut self) {
        // SAFETY: the owning cache drops or replaces the arena only after
        // discarding every entry point into it.
        unsafe { ManuallyDrop::take(&mut self.0).free_memory() };
    }
}

/// Block compiler for the host ISA
pub struct Codegen {
    isa: OwnedTargetIsa,
    arena: CodeArena,
    hooks: HookIds,
}

impl Codegen {
    pub fn new() -> Result<Self, JitError> {
        let mut flags = settings::builder();
        flags.set("opt_level", "speed")?;
        flags.set("use_colocated_libcalls", "false")?;
        flags.set("is_pic", "false")?;
        let isa = cranelift_native::builder()
            .map_err(|reason| JitError::UnsupportedHost(reason.to_string()))?
            .finish(settings::Flags::new(flags))?;
        let (module, hooks) = Self::build_module(&isa)?;
        Ok(Self { isa, arena: CodeArena(ManuallyDrop::new(module)), hooks })
    }

    fn build_module(isa: &OwnedTargetIsa) -> Result<(JITModule, HookIds), JitError> {
        let mut builder = JITBuilder::with_isa(isa.clone(), default_libcall_names());
        for (name, ptr) in hooks::symbols() {
            builder.symbol(name, ptr);
        }
        let mut module = JITModule::new(builder);

        let ptr = module.target_config().pointer_type();
        let signature = |module: &JITModule, params: &[ir::Type], ret: Option<ir::Type>| {
            let mut sig = module.make_signature();
            sig.params.push(AbiParam::new(ptr));
            sig.params.extend(params.iter().map(|&ty| AbiParam::new(ty)));
            sig.returns.extend(ret.map(AbiParam::new));
            sig
        };
        let fallback = signature(&module, &[types::I64], Some(types::I32));
        let complete = signature(&module, &[types::I64, types::I32], Some(types::I32));
        let read = signature(&module, &[types::I64, types::I32], Some(types::I64));
        let write = signature(&module, &[types::I64, types::I64, types::I32], None);
        let record = signature(&module, &[types::I64], None);

        let hooks = HookIds {
            fallback: module.declare_function(hooks::FALLBACK, Linkage::Import, &fallback)?,
            complete: module.declare_function(hooks::COMPLETE, Linkage::Import, &complete)?,
            read: module.declare_function(hooks::READ, Linkage::Import, &read)?,
            write: module.declare_function(hooks::WRITE, Linkage::Import, &write)?,
            record: module.declare_function(hooks::RECORD, Linkage::Import, &record)?,
        };
        Ok((module, hooks))
    }

    /// Release the code of every block compiled so far
    ///
    /// # Safety
    ///
    /// No entry point returned by [`Codegen::compile`] before this call may
    /// run afterwards.
    pub unsafe fn flush(&mut self) -> Result<(), JitError> {
        let (module, hooks) = Self::build_module(&self.isa)?;
        // Dropping the old arena frees its code
        self.arena = CodeArena(ManuallyDrop::new(module));
        self.hooks = hooks;
        Ok(())
    }

    /// Generate a host function for `ops`, marking the ops lowered natively
    pub fn compile(&mut self, ops: &mut [BlockOp]) -> Result<BlockFn, JitError> {
        let module: &mut JITModule = &mut self.arena.0;
        let ptr = module.target_config().pointer_type();

        let mut ctx = module.make_context();
        ctx.func.signature.params.push(AbiParam::new(ptr));
        ctx.func.signature.params.push(AbiParam::new(ptr));
        let refs = HookRefs {
            fallback: module.declare_func_in_func(self.hooks.fallback, &mut ctx.func),
            complete: module.declare_func_in_func(self.hooks.complete, &mut ctx.func),
            read: module.declare_func_in_func(self.hooks.read, &mut ctx.func),
            write: module.declare_func_in_func(self.hooks.write, &mut ctx.func),
            record: module.declare_func_in_func(self.hooks.record, &mut ctx.func),
        };

        let mut builder_ctx = FunctionBuilderContext::new();
        let mut b = FunctionBuilder::new(&mut ctx.func, &mut builder_ctx);
        let entry = b.create_block();
        b.append_block_params_for_function_params(entry);
        b.switch_to_block(entry);
        b.seal_block(entry);
        let (ctx_ptr, thread) = (b.block_params(entry)[0], b.block_params(entry)[1]);
        let exit = b.create_block();
        let mut current = b.create_block();
        b.ins().jump(current, &[]);

        let mut lower = Lowering { b, ctx: ctx_ptr, thread, hooks: refs, done: exit };
        for index in 0..ops.len() {
            lower.b.switch_to_block(current);
            lower.b.seal_block(current);
            let done = lower.b.create_block();
            lower.b.append_block_param(done, types::I32);
            lower.done = done;

            let op = &mut ops[index];
            op.native = emitter::lower(&mut lower, op.op, op.word);
            if !op.native {
                let index_value = lower.b.ins().iconst(types::I64, index as i64);
                let call = lower.b.ins().call(lower.hooks.fallback, &[lower.ctx, index_value]);
                let status = lower.b.inst_results(call)[0];
                lower.b.ins().jump(done, &[status]);
            }

            lower.b.switch_to_block(done);
            lower.b.seal_block(done);
            let status = lower.b.block_params(done)[0];
            let index_value = lower.b.ins().iconst(types::I64, index as i64);
            let call = lower.b.ins().call(lower.hooks.complete, &[lower.ctx, index_value, status]);
            let stop = lower.b.inst_results(call)[0];
            if index + 1 == ops.len() {
                lower.b.ins().jump(exit, &[]);
            } else {
                current = lower.b.create_block();
                lower.b.ins().brif(stop, exit, &[], current, &[]);
            }
        }
        lower.b.switch_to_block(exit);
        lower.b.seal_block(exit);
        lower.b.ins().return_(&[]);
        lower.b.finalize();

        let id = module.declare_anonymous_function(&ctx.func.signature)?;
        module.define_function(id, &mut ctx)?;
        module.clear_context(&mut ctx);
        module.finalize_definitions()?;
        let code = module.get_finalized_function(id);
        // SAFETY: the function was built with the BlockFn signature: two
        // pointer arguments, no result, the host's default calling convention.
        Ok(unsafe { std::mem::transmute::<*const u8, BlockFn>(code) })
    }
}

/// IR builder for the instruction being lowered
///
/// Emitters read and write guest registers through these helpers. Memory
/// accesses branch to the instruction's completion point when the hook
/// reports a fault, so everything emitted after one only runs on success.
pub struct Lowering<'f> {
    pub b: FunctionBuilder<'f>,
    ctx: Value,
    thread: Value,
    hooks: HookRefs,
    /// Completion block of the current instruction, taking the status
    done: ir::Block,
}

impl<'f> Lowering<'f> {
    #[inline]
    pub fn ins(&mut self) -> FuncInstBuilder<'_, 'f> {
        self.b.ins()
    }

    pub fn imm(&mut self, value: u64) -> Value {
        self.b.ins().iconst(types::I64, value as i64)
    }

    pub fn imm32(&mut self, value: u32) -> Value {
        self.b.ins().iconst(types::I32, value as i64)
    }

    pub fn gpr(&mut self, r: usize) -> Value {
        self.b.ins().load(types::I64, MemFlags::trusted(), self.thread, gpr_offset(r))
    }

    /// (RA|0)
    pub fn gpr_or_zero(&mut self, r: usize) -> Value {
        if r == 0 {
            self.imm(0)
        } else {
            self.gpr(r)
        }
    }

    pub fn set_gpr(&mut self, r: usize, value: Value) {
        self.b.ins().store(MemFlags::trusted(), value, self.thread, gpr_offset(r));
    }

    pub fn reg(&mut self, reg: Reg) -> Value {
        self.b.ins().load(reg.ty(), MemFlags::trusted(), self.thread, reg.offset())
    }

    pub fn set_reg(&mut self, reg: Reg, value: Value) {
        self.b.ins().store(MemFlags::trusted(), value, self.thread, reg.offset());
    }

    /// Nonzero in 64-bit mode
    pub fn sf(&mut self) -> Value {
        let msr = self.reg(Reg::Msr);
        let bit = self.b.ins().band_imm(msr, msr::SF as i64);
        self.b.ins().icmp_imm(IntCC::NotEqual, bit, 0)
    }

    /// Truncate an address to 32 bits outside 64-bit mode
    pub fn mask_ea(&mut self, ea: Value) -> Value {
        let sf = self.sf();
        let low = self.b.ins().band_imm(ea, 0xFFFF_FFFF);
        self.b.ins().select(sf, ea, low)
    }

    /// Zero-extend the low word
    pub fn zext32(&mut self, value: Value) -> Value {
        self.b.ins().band_imm(value, 0xFFFF_FFFF)
    }

    /// Sign-extend the low word
    pub fn sext32(&mut self, value: Value) -> Value {
        let word = self.b.ins().ireduce(types::I32, value);
        self.b.ins().sextend(types::I64, word)
    }

    /// XER[CA] as 0 or 1
    pub fn xer_ca(&mut self) -> Value {
        let xer = self.reg(Reg::Xer);
        let shifted = self.b.ins().ushr_imm(xer, CA_SHIFT);
        self.b.ins().band_imm(shifted, 1)
    }

    /// Set XER[CA] from a condition
    pub fn set_ca(&mut self, ca: Value) {
        let xer = self.reg(Reg::Xer);
        let cleared = self.b.ins().band_imm(xer, !xer::CA as i64);
        let bit = self.b.ins().uextend(types::I64, ca);
        let bit = self.b.ins().ishl_imm(bit, CA_SHIFT);
        let value = self.b.ins().bor(cleared, bit);
        self.set_reg(Reg::Xer, value);
    }

    /// Replace CR field `field` with the low four bits of `value` (I32)
    pub fn set_cr_field(&mut self, field: usize, value: Value) {
        let shift = 28 - field as u32 * 4;
        let cr = self.reg(Reg::Cr);
        let keep = self.imm32(!(0xF << shift));
        let cleared = self.b.ins().band(cr, keep);
        let placed = self.b.ins().ishl_imm(value, shift as i64);
        let cr = self.b.ins().bor(cleared, placed);
        self.set_reg(Reg::Cr, cr);
    }

    /// Update CR0 from `value` when `rc` is set
    pub fn record(&mut self, rc: bool, value: Value) {
        if rc {
            self.b.ins().call(self.hooks.record, &[self.ctx, value]);
        }
    }

    /// Load `size` bytes at `ea`, zero-extended
    pub fn read(&mut self, ea: Value, size: u32) -> Value {
        let size = self.imm32(size);
        let call = self.b.ins().call(self.hooks.read, &[self.ctx, ea, size]);
        let value = self.b.inst_results(call)[0];
        self.check_status();
        value
    }

    /// Store the low `size` bytes of `value` at `ea`
    pub fn write(&mut self, ea: Value, value: Value, size: u32) {
        let size = self.imm32(size);
        self.b.ins().call(self.hooks.write, &[self.ctx, ea, value, size]);
        self.check_status();
    }

    /// Leave for the completion point unless the last access succeeded
    fn check_status(&mut self) {
        let status = self.b.ins().load(types::I32, MemFlags::trusted(), self.ctx, STATUS_OFFSET);
        let next = self.b.create_block();
        self.b.ins().brif(status, self.done, &[status], next, &[]);
        self.b.switch_to_block(next);
        self.b.seal_block(next);
    }

    /// Finish the instruction successfully
    pub fn finish(&mut self) {
        let ok = self.imm32(hooks::status::OK);
        self.b.ins().jump(self.done, &[ok]);
    }
}
