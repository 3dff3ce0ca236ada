//! Instruction interpreter
//!
//! Executes one instruction at a time: advance CIA, fetch through the MMU,
//! decode, run the handler, then the per-instruction epilogue that both
//! backends share (time base, trace, external interrupt sampling and
//! exception dispatch).

use once_cell::sync::Lazy;
use xc_core::config::InvalidInstructionPolicy;
use xc_core::{cpu_debug, cpu_trace, CpuError};

use crate::cpu::{Cpu, ExecResult, Fault};
use crate::decoder;
use crate::exceptions::{self, Exceptions};
use crate::instructions::{self, Handler};
use crate::opcodes::Opcode;
use crate::regs::msr;
use crate::timebase;

/// Handler per opcode, indexed by discriminant
static HANDLERS: Lazy<Vec<Handler>> =
    Lazy::new(|| Opcode::ALL.iter().map(|&op| instructions::handler(op)).collect());

/// Handler for a decoded opcode
#[inline]
pub fn handler_for(op: Opcode) -> Handler {
    HANDLERS[op as usize]
}

/// Decode and execute `word` at the current CIA
#[inline]
pub fn execute(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let op = decoder::decode(word);
    cpu_trace!("0x{:x}: {:08x} {}", cpu.thread.cia, word, op.mnemonic());
    handler_for(op)(cpu, word)
}

/// Advance to the next instruction: CIA takes NIA, NIA defaults to CIA + 4
#[inline]
pub fn begin(cpu: &mut Cpu<'_>) {
    cpu.thread.cia = cpu.thread.nia;
    cpu.thread.nia = cpu.thread.mask_ea(cpu.thread.cia.wrapping_add(4));
}

/// Execute the instruction at NIA, then run the epilogue
pub fn step(cpu: &mut Cpu<'_>) -> Result<(), CpuError> {
    begin(cpu);
    let outcome = match cpu.fetch() {
        Ok(word) => execute(cpu, word).map_err(|fault| (fault, word)),
        Err(fault) => Err((fault, 0)),
    };
    complete(cpu, outcome)
}

/// Resolve an instruction outcome and run the epilogue
///
/// An invalid word either becomes an illegal-instruction program interrupt
/// or, under [`InvalidInstructionPolicy::Halt`], an error for the caller.
pub fn complete(cpu: &mut Cpu<'_>, outcome: Result<(), (Fault, u32)>) -> Result<(), CpuError> {
    let retired = match outcome {
        Ok(()) => true,
        Err((Fault::Exception, _)) => false,
        Err((Fault::Invalid, word)) => {
            let addr = cpu.thread.cia;
            match cpu.shared.config.invalid_instruction {
                InvalidInstructionPolicy::Halt => {
                    tracing::error!("Invalid instruction 0x{:08x} at 0x{:x}, halting", word, addr);
                    return Err(CpuError::InvalidInstruction { addr, opcode: word });
                }
                InvalidInstructionPolicy::Continue => {
                    tracing::warn!("Invalid instruction 0x{:08x} at 0x{:x}", word, addr);
                    cpu.raise(Exceptions::PROGRAM_ILLEGAL);
                    false
                }
            }
        }
    };
    if retired {
        cpu.thread.retired += 1;
    }
    epilogue(cpu, retired)
}

/// Work done after every instruction, identical for both backends
pub fn epilogue(cpu: &mut Cpu<'_>, retired: bool) -> Result<(), CpuError> {
    timebase::tick(cpu);

    if retired && cpu.thread.msr & msr::SE != 0 {
        cpu.raise(Exceptions::TRACE);
    }
    if cpu.thread.msr & msr::EE != 0 {
        cpu.shared.iic.check_external(cpu.thread);
    }
    if let Some(kind) = exceptions::dispatch(cpu.thread, cpu.core)? {
        cpu_debug!("PIR {} -> {} handler at 0x{:x}", cpu.thread.pir, kind.name(), cpu.thread.nia);
    }
    Ok(())
}

/// Take any exception already pending, without executing
pub fn dispatch_pending(cpu: &mut Cpu<'_>) -> Result<(), CpuError> {
    if cpu.thread.msr & msr::EE != 0 {
        cpu.shared.iic.check_external(cpu.thread);
    }
    exceptions::dispatch(cpu.thread, cpu.core)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use xc_core::config::CpuConfig;
    use xc_memory::{Bus, SystemBus};

    use super::*;
    use crate::cpu::Shared;
    use crate::thread::{CoreState, ThreadState};

    fn create_test_env(config: CpuConfig) -> (ThreadState, CoreState, Shared) {
        let bus = Arc::new(SystemBus::with_ram(0x10000).unwrap());
        let shared = Shared::standalone(bus, config);
        let mut core = CoreState::new(0);
        core.hrmor = 0;
        let mut thread = ThreadState::new(0, 0);
        thread.nia = 0x1000;
        (thread, core, shared)
    }

    #[test]
    fn test_handler_table_covers_every_opcode() {
        assert_eq!(HANDLERS.len(), Opcode::COUNT);
    }

    #[test]
    fn test_step_addi() {
        let (mut thread, mut core, shared) = create_test_env(CpuConfig::default());
        // addi r3, r0, 42
        shared.bus.write_be32(0x1000, 0x3860_002A).unwrap();
        let mut cpu = Cpu::new(&mut thread, &mut core, &shared);
        step(&mut cpu).unwrap();
        assert_eq!(thread.gpr[3], 42);
        assert_eq!(thread.cia, 0x1000);
        assert_eq!(thread.nia, 0x1004);
        assert_eq!(thread.retired, 1);
    }

    #[test]
    fn test_invalid_continue_raises_program() {
        let (mut thread, mut core, shared) = create_test_env(CpuConfig::default());
        shared.bus.write_be32(0x1000, 0).unwrap();
        let mut cpu = Cpu::new(&mut thread, &mut core, &shared);
        step(&mut cpu).unwrap();
        assert_eq!(thread.nia, 0x700);
        assert_eq!(thread.srr0, 0x1000);
        assert_eq!(thread.retired, 0);
    }

    #[test]
    fn test_invalid_halt_reports_error() {
        let config = CpuConfig { invalid_instruction: InvalidInstructionPolicy::Halt, ..CpuConfig::default() };
        let (mut thread, mut core, shared) = create_test_env(config);
        shared.bus.write_be32(0x1000, 0).unwrap();
        let mut cpu = Cpu::new(&mut thread, &mut core, &shared);
        let err = step(&mut cpu).unwrap_err();
        assert_eq!(err, CpuError::InvalidInstruction { addr: 0x1000, opcode: 0 });
    }

    #[test]
    fn test_single_step_trace() {
        let (mut thread, mut core, shared) = create_test_env(CpuConfig::default());
        thread.msr |= msr::SE;
        shared.bus.write_be32(0x1000, decoder::NOP).unwrap();
        let mut cpu = Cpu::new(&mut thread, &mut core, &shared);
        step(&mut cpu).unwrap();
        assert_eq!(thread.nia, Exceptions::TRACE.vector());
        assert_eq!(thread.srr0, 0x1004);
        assert_eq!(thread.msr & msr::SE, 0);
    }
}
