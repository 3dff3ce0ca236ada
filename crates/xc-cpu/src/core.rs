//! Physical core: two hardware threads and their control loop
//!
//! A core alternates between its enabled threads, giving each one quantum
//! per round. Host requests (halt, continue, step, reset) arrive through a
//! command channel and are only observed between rounds, so execution never
//! stops mid-quantum.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bitflags::bitflags;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use xc_core::config::CpuBackend;
use xc_core::{cpu_debug, iic_debug, CpuError, EmulatorContext};

use crate::cpu::{Cpu, Shared};
use crate::exceptions::Exceptions;
use crate::interpreter;
use crate::jit::Jit;
use crate::regs::{ctrl, srr1, tscr};
use crate::thread::{CoreState, ThreadState};

/// How long an idle (halted or sleeping) core waits for a command
const IDLE_POLL: Duration = Duration::from_millis(1);

/// Core run state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CoreRunState {
    /// Torn down, or not yet constructed
    None = 0,
    /// Constructed but never started
    Unused = 1,
    /// No thread enabled; waiting for a wake-up interrupt
    Sleeping = 2,
    /// Stopped for inspection; only steps advance it
    Halted = 3,
    Running = 4,
    Resetting = 5,
    /// Inside a quantum
    Executing = 6,
}

impl CoreRunState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Unused,
            2 => Self::Sleeping,
            3 => Self::Halted,
            4 => Self::Running,
            5 => Self::Resetting,
            6 => Self::Executing,
            _ => Self::None,
        }
    }
}

/// Host request to a core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreCommand {
    Halt,
    Continue,
    /// Halt, then execute this many instructions per enabled thread
    Step(u64),
    Reset,
    Shutdown,
}

bitflags! {
    /// Threads of a core, laid out like the CTRL thread-enable field
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ThreadMask: u32 {
        const THREAD0 = ctrl::TE0;
        const THREAD1 = ctrl::TE1;
    }
}

impl ThreadMask {
    /// Mask bit of thread `index`
    pub fn of(index: usize) -> Self {
        if index == 0 { Self::THREAD0 } else { Self::THREAD1 }
    }

    fn indexes(self) -> impl Iterator<Item = usize> {
        (0..2).filter(move |&t| self.contains(Self::of(t)))
    }
}

/// Cloneable control handle for a core owned by another thread
#[derive(Clone)]
pub struct CoreHandle {
    index: u8,
    commands: Sender<CoreCommand>,
    run_state: Arc<AtomicU8>,
}

impl CoreHandle {
    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn state(&self) -> CoreRunState {
        CoreRunState::from_u8(self.run_state.load(Ordering::Acquire))
    }

    pub fn send(&self, command: CoreCommand) -> Result<(), CpuError> {
        self.commands.send(command).map_err(|_| CpuError::ChannelClosed(self.index))
    }

    pub fn halt(&self) -> Result<(), CpuError> {
        self.send(CoreCommand::Halt)
    }

    pub fn resume(&self) -> Result<(), CpuError> {
        self.send(CoreCommand::Continue)
    }

    pub fn step(&self, count: u64) -> Result<(), CpuError> {
        self.send(CoreCommand::Step(count))
    }

    pub fn reset(&self) -> Result<(), CpuError> {
        self.send(CoreCommand::Reset)
    }
}

/// One Xenon core
pub struct Core {
    pub index: u8,
    pub state: CoreState,
    pub threads: [ThreadState; 2],
    pub jit: Jit,
    shared: Arc<Shared>,
    run_state: Arc<AtomicU8>,
    commands: Receiver<CoreCommand>,
    sender: Sender<CoreCommand>,
    pending_steps: u64,
    /// Last error that halted the core
    pub last_error: Option<CpuError>,
}

impl Core {
    /// Core `index` in its power-on state
    pub fn new(index: u8, shared: Arc<Shared>) -> Self {
        let (sender, commands) = channel::unbounded();
        let mut core = Self {
            index,
            state: CoreState::new(index),
            threads: [ThreadState::new(0, index as u32 * 2), ThreadState::new(1, index as u32 * 2 + 1)],
            jit: Jit::with_capacity(shared.config.max_cached_blocks as usize),
            shared,
            run_state: Arc::new(AtomicU8::new(CoreRunState::Unused as u8)),
            commands,
            sender,
            pending_steps: 0,
            last_error: None,
        };
        core.apply_reset_vector();
        core
    }

    fn apply_reset_vector(&mut self) {
        if self.index == 0 {
            self.threads[0].nia = self.shared.config.reset_vector;
        }
    }

    pub fn handle(&self) -> CoreHandle {
        CoreHandle { index: self.index, commands: self.sender.clone(), run_state: Arc::clone(&self.run_state) }
    }

    pub fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    pub fn run_state(&self) -> CoreRunState {
        CoreRunState::from_u8(self.run_state.load(Ordering::Acquire))
    }

    fn set_run_state(&self, state: CoreRunState) {
        let previous = self.run_state.swap(state as u8, Ordering::AcqRel);
        if previous != state as u8 && state != CoreRunState::Executing && previous != CoreRunState::Executing as u8 {
            cpu_debug!("Core {}: {:?} -> {:?}", self.index, CoreRunState::from_u8(previous), state);
        }
    }

    /// Threads CTRL currently enables
    pub fn enabled_threads(&self) -> ThreadMask {
        ThreadMask::from_bits_truncate(self.state.thread_enables())
    }

    /// Instructions per thread per round: the configured quantum, else TTR
    pub fn quantum(&self) -> u64 {
        match self.shared.config.quantum {
            0 => self.state.ttr.max(1),
            q => q as u64,
        }
    }

    /// Leave the Unused state: run if any thread is enabled, else sleep
    pub fn power_on(&mut self) {
        let state = if self.enabled_threads().is_empty() { CoreRunState::Sleeping } else { CoreRunState::Running };
        self.set_run_state(state);
    }

    /// Restore power-on state and drop every compiled block
    pub fn reset(&mut self) {
        self.set_run_state(CoreRunState::Resetting);
        self.state = CoreState::new(self.index);
        for (t, thread) in self.threads.iter_mut().enumerate() {
            *thread = ThreadState::new(t as u8, self.index as u32 * 2 + t as u32);
            self.shared.reservations.clear(thread.reservation_slot());
        }
        self.apply_reset_vector();
        self.jit.clear();
        self.pending_steps = 0;
        self.last_error = None;
        cpu_debug!("Core {} reset", self.index);
        self.power_on();
    }

    /// Run `quantum` instructions on each thread in `threads` that CTRL
    /// enables, dispatching anything already pending first
    pub fn execute_quantum(&mut self, threads: ThreadMask, quantum: u64) -> Result<u64, CpuError> {
        let mut total = 0;
        for t in threads.indexes() {
            if !self.enabled_threads().contains(ThreadMask::of(t)) {
                continue;
            }
            total += self.run_thread(t, quantum)?;
        }
        Ok(total)
    }

    fn run_thread(&mut self, t: usize, quantum: u64) -> Result<u64, CpuError> {
        let backend = self.shared.config.backend;
        let mut cpu = Cpu::new(&mut self.threads[t], &mut self.state, &self.shared);
        interpreter::dispatch_pending(&mut cpu)?;

        let mut executed = 0;
        while executed < quantum {
            let result = match backend {
                CpuBackend::Interpreter => interpreter::step(&mut cpu).map(|()| 1),
                CpuBackend::Jit | CpuBackend::Hybrid => self.jit.run_block(&mut cpu, quantum - executed),
            };
            for ra in cpu.core.icbi_pages.drain(..) {
                self.jit.invalidate_page(ra);
            }
            match result {
                Ok(n) => executed += n,
                Err(err) => {
                    if let CpuError::InvalidInstruction { .. } = err {
                        // Park on the offending instruction
                        cpu.thread.nia = cpu.thread.cia;
                    }
                    return Err(err);
                }
            }
            let enabled = ThreadMask::from_bits_truncate(cpu.core.thread_enables());
            if !enabled.contains(ThreadMask::of(t)) {
                break;
            }
        }
        Ok(executed)
    }

    /// One scheduling round over both threads
    pub fn run_round(&mut self) -> Result<u64, CpuError> {
        self.set_run_state(CoreRunState::Executing);
        let result = self.execute_quantum(ThreadMask::all(), self.quantum());
        self.settle();
        result
    }

    /// Pick Running or Sleeping after execution, from the thread enables
    fn settle(&mut self) {
        if self.run_state() != CoreRunState::Executing {
            return;
        }
        let state = if self.enabled_threads().is_empty() { CoreRunState::Sleeping } else { CoreRunState::Running };
        self.set_run_state(state);
    }

    /// Wake a sleeping core if wake-on-external is set and an interrupt is
    /// pending for one of its threads
    pub fn try_wake(&mut self) -> bool {
        if self.state.tscr & tscr::WEXT == 0 {
            return false;
        }
        let iic = &self.shared.iic;
        let pending: Vec<usize> =
            self.threads.iter().map(|t| t.pir as usize).filter(|&pir| iic.has_pending(pir)).collect();
        if pending.is_empty() {
            return false;
        }

        self.state.ctrl = ctrl::RUN_THREAD0;
        for thread in self.threads.iter_mut() {
            thread.exceptions |= Exceptions::RESET;
            thread.reset_reason = srr1::RESET_WAKE;
        }
        for pir in pending {
            let vector = iic.acknowledge(pir);
            iic.eoi(pir);
            iic_debug!("Core {} woken by interrupt 0x{:02x} on PIR {}", self.index, vector, pir);
        }
        self.set_run_state(CoreRunState::Running);
        true
    }

    /// Execute `count` instructions on every enabled thread, staying halted
    pub fn step(&mut self, count: u64) -> Result<u64, CpuError> {
        let mut total = 0;
        for _ in 0..count {
            total += self.execute_quantum(ThreadMask::all(), 1)?;
        }
        Ok(total)
    }

    /// Apply queued commands; false once shutdown was requested
    fn poll_commands(&mut self) -> bool {
        while let Ok(command) = self.commands.try_recv() {
            if !self.apply(command) {
                return false;
            }
        }
        true
    }

    fn apply(&mut self, command: CoreCommand) -> bool {
        cpu_debug!("Core {} command {:?}", self.index, command);
        match command {
            CoreCommand::Halt => self.set_run_state(CoreRunState::Halted),
            CoreCommand::Continue => {
                self.last_error = None;
                self.power_on();
            }
            CoreCommand::Step(count) => {
                self.set_run_state(CoreRunState::Halted);
                self.pending_steps += count;
            }
            CoreCommand::Reset => self.reset(),
            CoreCommand::Shutdown => {
                // Steps still queued die with the control loop
                self.pending_steps = 0;
                return false;
            }
        }
        true
    }

    /// Wait up to `timeout` for a command while idle
    fn wait_command(&mut self, timeout: Duration) -> bool {
        match self.commands.recv_timeout(timeout) {
            Ok(command) => self.apply(command),
            Err(RecvTimeoutError::Timeout) => true,
            Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Route an execution error: halt on an invalid instruction, shut the
    /// whole system down on a checkstop
    pub(crate) fn handle_error(&mut self, err: CpuError, ctx: &EmulatorContext) -> bool {
        match err {
            CpuError::Checkstop { reason, .. } => {
                ctx.checkstop(self.index, reason);
                false
            }
            other => {
                tracing::error!("Core {} halted: {}", self.index, other);
                self.last_error = Some(other);
                self.set_run_state(CoreRunState::Halted);
                true
            }
        }
    }

    /// Control loop; returns when the context stops running or the core is
    /// told to shut down
    pub fn run(&mut self, ctx: &EmulatorContext) {
        if self.run_state() == CoreRunState::Unused {
            self.power_on();
        }
        cpu_debug!("Core {} control loop started in {:?}", self.index, self.run_state());

        while ctx.is_running() && self.poll_commands() {
            let keep_going = match self.run_state() {
                CoreRunState::Running => match self.run_round() {
                    Ok(_) => true,
                    Err(err) => self.handle_error(err, ctx),
                },
                CoreRunState::Halted if self.pending_steps > 0 => {
                    let count = std::mem::take(&mut self.pending_steps);
                    match self.step(count) {
                        Ok(_) => true,
                        Err(err) => self.handle_error(err, ctx),
                    }
                }
                CoreRunState::Sleeping => self.try_wake() || self.wait_command(IDLE_POLL),
                _ => self.wait_command(IDLE_POLL),
            };
            if !keep_going {
                break;
            }
        }

        self.set_run_state(CoreRunState::None);
        cpu_debug!("Core {} control loop exited", self.index);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use xc_core::config::{CpuConfig, InvalidInstructionPolicy};
    use xc_memory::{Bus, SystemBus};

    use super::*;
    use crate::iic::vector;
    use crate::regs::msr;

    fn create_test_env(config: CpuConfig) -> Core {
        let bus = Arc::new(SystemBus::with_ram(0x10000).unwrap());
        let shared = Arc::new(Shared::standalone(bus, config));
        let mut core = Core::new(0, shared);
        core.state.hrmor = 0;
        core.threads[0].nia = 0x1000;
        core
    }

    fn config(backend: CpuBackend) -> CpuConfig {
        CpuConfig { backend, quantum: 16, ..CpuConfig::default() }
    }

    #[test]
    fn test_power_on_states() {
        let core = create_test_env(CpuConfig::default());
        assert_eq!(core.run_state(), CoreRunState::Unused);
        assert_eq!(core.enabled_threads(), ThreadMask::THREAD0);
        assert_eq!(core.threads[1].pir, 1);

        let bus = Arc::new(SystemBus::with_ram(0x1000).unwrap());
        let mut secondary = Core::new(2, Arc::new(Shared::standalone(bus, CpuConfig::default())));
        assert_eq!(secondary.threads[0].pir, 4);
        assert_eq!(secondary.threads[0].nia, 0x100);
        secondary.power_on();
        assert_eq!(secondary.run_state(), CoreRunState::Sleeping);
    }

    #[test]
    fn test_quantum_from_ttr() {
        let mut core = create_test_env(CpuConfig::default());
        assert_eq!(core.quantum(), 0x1000);
        core.state.ttr = 5;
        assert_eq!(core.quantum(), 5);
        let core = create_test_env(config(CpuBackend::Interpreter));
        assert_eq!(core.quantum(), 16);
    }

    #[test]
    fn test_execute_quantum_both_backends() {
        for backend in [CpuBackend::Interpreter, CpuBackend::Hybrid] {
            let mut core = create_test_env(config(backend));
            // addi r3, r3, 1; b -4
            core.shared.bus.write_be32(0x1000, 0x3863_0001).unwrap();
            core.shared.bus.write_be32(0x1004, 0x4BFF_FFFC).unwrap();
            let executed = core.execute_quantum(ThreadMask::all(), 10).unwrap();
            assert_eq!(executed, 10, "{:?}", backend);
            assert_eq!(core.threads[0].gpr[3], 5, "{:?}", backend);
            assert_eq!(core.threads[1].retired, 0);
        }
    }

    #[test]
    fn test_disabling_own_thread_sleeps_core() {
        let mut core = create_test_env(config(CpuBackend::Interpreter));
        // mtspr CTRLWR, r0 (r0 = 0)
        core.shared.bus.write_be32(0x1000, 0x7C18_23A6).unwrap();
        core.power_on();
        core.run_round().unwrap();
        assert_eq!(core.state.ctrl, 0);
        assert_eq!(core.threads[0].nia, 0x1004);
        assert_eq!(core.run_state(), CoreRunState::Sleeping);
    }

    #[test]
    fn test_wake_requires_wext() {
        let mut core = create_test_env(CpuConfig::default());
        core.state.ctrl = 0;
        core.state.tscr = 0;
        core.shared.iic.raise(vector::IPI4, 0b1);
        assert!(!core.try_wake());
        core.state.tscr = tscr::WEXT;
        assert!(core.try_wake());
        assert_eq!(core.state.ctrl, ctrl::RUN_THREAD0);
        assert!(core.threads[0].exceptions.contains(Exceptions::RESET));
        assert!(core.threads[1].exceptions.contains(Exceptions::RESET));
        assert!(!core.shared.iic.has_pending(0));
    }

    #[test]
    fn test_reset_restores_power_on_state() {
        let mut core = create_test_env(config(CpuBackend::Hybrid));
        core.shared.bus.write_be32(0x1000, 0x3863_0001).unwrap();
        core.execute_quantum(ThreadMask::all(), 1).unwrap();
        assert_eq!(core.jit.cached(), 1);

        core.threads[0].msr |= msr::EE;
        core.reset();
        assert_eq!(core.threads[0].gpr[3], 0);
        assert_eq!(core.threads[0].msr, msr::POWER_ON);
        assert_eq!(core.threads[0].nia, CpuConfig::default().reset_vector);
        assert_eq!(core.jit.cached(), 0);
        assert_eq!(core.run_state(), CoreRunState::Running);
    }

    #[test]
    fn test_icbi_drops_cached_blocks() {
        let mut core = create_test_env(config(CpuBackend::Hybrid));
        // li r3, 1; b .
        core.shared.bus.write_be32(0x2000, 0x3860_0001).unwrap();
        core.shared.bus.write_be32(0x2004, 0x4800_0000).unwrap();
        // icbi r0, r4
        core.shared.bus.write_be32(0x1000, 0x7C00_27AC).unwrap();

        core.threads[0].nia = 0x2000;
        core.execute_quantum(ThreadMask::THREAD0, 2).unwrap();
        assert_eq!(core.jit.cached(), 1);

        core.threads[0].nia = 0x1000;
        core.threads[0].gpr[4] = 0x2004;
        core.execute_quantum(ThreadMask::THREAD0, 1).unwrap();
        assert_eq!(core.threads[0].nia, 0x1004);
        assert_eq!(core.jit.stats().invalidations, 1);
        // Only the block holding the icbi itself is left
        assert_eq!(core.jit.cached(), 1);
        assert!(core.state.icbi_pages.is_empty());
    }

    #[test]
    fn test_step_command_while_halted() {
        let mut core = create_test_env(config(CpuBackend::Interpreter));
        for i in 0..4 {
            core.shared.bus.write_be32(0x1000 + i * 4, 0x3863_0001).unwrap();
        }
        let handle = core.handle();
        handle.step(3).unwrap();
        handle.send(CoreCommand::Shutdown).unwrap();

        let ctx = EmulatorContext::default();
        ctx.start();
        core.run(&ctx);

        // Shutdown is queued behind the step, so both apply in one poll and
        // the unexecuted steps are dropped
        assert_eq!(core.run_state(), CoreRunState::None);
        assert_eq!(core.threads[0].gpr[3], 0);
        assert_eq!(core.pending_steps, 0);

        let handle = core.handle();
        handle.step(3).unwrap();
        assert!(core.poll_commands());
        assert_eq!(core.run_state(), CoreRunState::Halted);
        let count = std::mem::take(&mut core.pending_steps);
        core.step(count).unwrap();
        assert_eq!(core.threads[0].gpr[3], 3);
        assert_eq!(core.threads[0].nia, 0x100C);
    }

    #[test]
    fn test_invalid_instruction_halts_core() {
        let config = CpuConfig {
            backend: CpuBackend::Interpreter,
            invalid_instruction: InvalidInstructionPolicy::Halt,
            ..CpuConfig::default()
        };
        let mut core = create_test_env(config);
        core.shared.bus.write_be32(0x1000, 0).unwrap();
        let ctx = EmulatorContext::default();
        ctx.start();

        let err = core.run_round().unwrap_err();
        assert!(core.handle_error(err, &ctx));
        assert_eq!(core.run_state(), CoreRunState::Halted);
        assert_eq!(core.threads[0].nia, 0x1000);
        assert!(matches!(core.last_error, Some(CpuError::InvalidInstruction { addr: 0x1000, .. })));
        assert!(ctx.is_running());
    }

    #[test]
    fn test_checkstop_stops_context() {
        let mut core = create_test_env(config(CpuBackend::Interpreter));
        core.threads[0].msr &= !msr::ME;
        core.threads[0].exceptions |= Exceptions::MACHINE_CHECK;
        let ctx = EmulatorContext::default();
        ctx.start();
        core.power_on();
        core.run(&ctx);
        assert!(!ctx.is_running());
        assert!(ctx.result().is_err());
        assert_eq!(core.run_state(), CoreRunState::None);
    }
}
