//! The three-core system driven through its control surface

mod common;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common::{asm, to_bytes, CODE_BASE};
use xc_core::config::{Config, CpuBackend, InvalidInstructionPolicy};
use xc_core::{CpuError, EmulatorContext, EmulatorError};
use xc_cpu::iic::{reg, vector};
use xc_cpu::regs::{ctrl, msr, srr1};
use xc_cpu::{CoreHandle, CoreRunState, Exceptions, Segment, Xenon};
use xc_memory::constants::IIC_BASE;
use xc_memory::Bus;

const MARKER: u64 = 0x2000;

fn test_config(backend: CpuBackend) -> Config {
    let mut config = Config::default();
    config.memory.ram_size = common::RAM_SIZE;
    config.cpu.clocks_per_instruction = 1;
    config.cpu.quantum = 64;
    config.cpu.backend = backend;
    config
}

fn create_test_env(config: Config) -> Xenon {
    Xenon::new(Arc::new(EmulatorContext::new(config))).unwrap()
}

fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(1));
    }
}

fn wait_for_state(handle: &CoreHandle, state: CoreRunState) {
    wait_until(&format!("core {} to reach {:?}", handle.index(), state), || handle.state() == state);
}

#[test]
fn test_ipi_wakes_secondary_core() {
    let mut xenon = create_test_env(test_config(CpuBackend::Hybrid));
    // Core 0: std r5, 0(r4); b .
    xenon
        .load_image(CODE_BASE, &[Segment::new(CODE_BASE, to_bytes(&[asm::std(5, 0, 4), asm::b(0)]))])
        .unwrap();
    // Core 1 reset vector: li r3, 0x55; stw r3, MARKER(0); b .
    let wake = [asm::addi(3, 0, 0x55), asm::stw(3, MARKER as i32, 0), asm::b(0)];
    xenon.load_image_on(1, 0, 0x100, &[Segment::new(0x100, to_bytes(&wake))]).unwrap();

    let core0 = xenon.core_mut(0).unwrap();
    core0.state.hrmor = 0;
    // IPI generation register of IIC thread block 0, through the
    // hypervisor real-mode window
    core0.threads[0].gpr[4] = (1 << 63) | (IIC_BASE + reg::IPI_GENERATION);
    // Target logical id 1 << 2 (PIR 2) with IPI4
    core0.threads[0].gpr[5] = (1 << 2) << 16 | vector::IPI4 as u64;

    xenon.start().unwrap();
    let bus = Arc::clone(xenon.bus());
    wait_until("the woken core to store its marker", || bus.read_be32(MARKER).unwrap() == 0x55);
    xenon.stop().unwrap();

    let core1 = xenon.core(1).unwrap();
    assert_eq!(core1.threads[0].gpr[3], 0x55);
    assert_eq!(core1.threads[0].srr0, 0x100);
    assert_ne!(core1.threads[0].srr1 & srr1::RESET_WAKE, 0);
    assert_eq!(core1.threads[1].retired, 0);
    assert_eq!(xenon.iic().queued(2), 0);
    assert_eq!(xenon.core(2).unwrap().threads[0].retired, 0);
}

#[test]
fn test_halt_step_continue() {
    let mut xenon = create_test_env(test_config(CpuBackend::Interpreter));
    // addi r3, r3, 1; stw r3, MARKER(0); b -8
    let counter = [asm::addi(3, 3, 1), asm::stw(3, MARKER as i32, 0), asm::b(-8)];
    xenon.load_image(CODE_BASE, &[Segment::new(CODE_BASE, to_bytes(&counter))]).unwrap();
    xenon.core_mut(0).unwrap().state.hrmor = 0;
    let bus = Arc::clone(xenon.bus());
    let count = || bus.read_be32(MARKER).unwrap();

    xenon.start().unwrap();
    let handle = xenon.handle(0).unwrap().clone();
    wait_until("the counter to move", || count() > 0);

    handle.halt().unwrap();
    wait_for_state(&handle, CoreRunState::Halted);
    let halted_at = count();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(count(), halted_at);

    // Six instructions store the counter twice
    handle.step(6).unwrap();
    wait_until("the steps to run", || count() == halted_at + 2);
    thread::sleep(Duration::from_millis(20));
    assert_eq!(count(), halted_at + 2);
    assert_eq!(handle.state(), CoreRunState::Halted);

    handle.resume().unwrap();
    wait_until("execution to continue", || count() > halted_at + 2);
    xenon.stop().unwrap();
    assert_eq!(xenon.core(0).unwrap().run_state(), CoreRunState::None);
}

#[test]
fn test_invalid_instruction_halts_only_its_core() {
    let mut config = test_config(CpuBackend::Hybrid);
    config.cpu.invalid_instruction = InvalidInstructionPolicy::Halt;
    let mut xenon = create_test_env(config);
    // li r3, 1; .long 0
    xenon.load_image(CODE_BASE, &[Segment::new(CODE_BASE, to_bytes(&[asm::addi(3, 0, 1), 0]))]).unwrap();
    xenon.core_mut(0).unwrap().state.hrmor = 0;

    xenon.start().unwrap();
    let handle = xenon.handle(0).unwrap().clone();
    wait_for_state(&handle, CoreRunState::Halted);
    assert!(xenon.context().is_running());
    xenon.stop().unwrap();

    let core = xenon.core(0).unwrap();
    assert_eq!(core.threads[0].gpr[3], 1);
    assert_eq!(core.threads[0].nia, CODE_BASE + 4);
    assert!(matches!(
        core.last_error,
        Some(CpuError::InvalidInstruction { addr, opcode: 0 }) if addr == CODE_BASE + 4
    ));
}

#[test]
fn test_checkstop_on_one_core_stops_all_three() {
    let mut xenon = create_test_env(test_config(CpuBackend::Hybrid));
    // Core 0 spins; core 2 stays asleep
    xenon.load_image(CODE_BASE, &[Segment::new(CODE_BASE, to_bytes(&[asm::b(0)]))]).unwrap();
    xenon.core_mut(0).unwrap().state.hrmor = 0;

    // Core 1 takes a machine check with recovery disabled
    xenon.load_image_on(1, 0, CODE_BASE, &[]).unwrap();
    let core1 = xenon.core_mut(1).unwrap();
    core1.state.ctrl = ctrl::RUN_THREAD0;
    core1.threads[0].msr &= !msr::ME;
    core1.threads[0].exceptions |= Exceptions::MACHINE_CHECK;

    let handles: Vec<CoreHandle> = (0..3).map(|i| xenon.handle(i).unwrap().clone()).collect();
    xenon.start().unwrap();
    for handle in &handles {
        wait_for_state(handle, CoreRunState::None);
    }
    assert!(!xenon.context().is_running());

    let err = xenon.wait().unwrap_err();
    assert!(matches!(err, EmulatorError::Cpu(CpuError::Checkstop { core: 1, .. })));
    for i in 0..3 {
        assert_eq!(xenon.core(i).unwrap().run_state(), CoreRunState::None);
    }
    assert_eq!(xenon.core(2).unwrap().threads[0].retired, 0);
}
