//! End-to-end behaviour of atomics, carries, vector saturation, wake from
//! sleep and self-modifying code

mod common;

use std::sync::Arc;

use common::{asm, create_test_env, load, CODE_BASE, DATA_BASE};
use xc_core::config::{CpuBackend, CpuConfig, SmcDetection};
use xc_cpu::iic::vector;
use xc_cpu::interpreter;
use xc_cpu::regs::{msr, srr1, vscr, xer};
use xc_cpu::vmx::Vector128;
use xc_cpu::{Core, CoreRunState, Cpu, Exceptions, Shared, ThreadMask};
use xc_memory::{Bus, SystemBus};

fn interpreter_config() -> CpuConfig {
    CpuConfig { backend: CpuBackend::Interpreter, ..CpuConfig::default() }
}

/// lwarx; addi; stwcx.; bne retry; b .
fn atomic_increment() -> [u32; 5] {
    [asm::lwarx(4, 0, 3), asm::addi(4, 4, 1), asm::stwcx(4, 0, 3), asm::bne(-12), asm::b(0)]
}

fn cr0_eq(core: &Core, t: usize) -> bool {
    core.threads[t].cr_field(0) & 0b0010 != 0
}

#[test]
fn test_atomic_increment_uncontended() {
    let mut core = create_test_env(interpreter_config());
    load(&core, CODE_BASE, &atomic_increment());
    core.shared().bus.write_be32(DATA_BASE, 41).unwrap();
    core.threads[0].gpr[3] = DATA_BASE;

    core.execute_quantum(ThreadMask::THREAD0, 4).unwrap();

    assert_eq!(core.shared().bus.read_be32(DATA_BASE).unwrap(), 42);
    assert!(cr0_eq(&core, 0));
    assert_eq!(core.threads[0].nia, CODE_BASE + 0x10);
    assert!(!core.shared().reservations.is_reserved(0, DATA_BASE));
}

#[test]
fn test_store_from_other_thread_breaks_reservation() {
    let mut core = create_test_env(interpreter_config());
    let shared = Arc::clone(core.shared());
    load(&core, CODE_BASE, &atomic_increment());
    // stw r5, 0(r3); b .
    load(&core, 0x2000, &[asm::stw(5, 0, 3), asm::b(0)]);
    shared.bus.write_be32(DATA_BASE, 1).unwrap();
    core.threads[0].gpr[3] = DATA_BASE;
    core.threads[1].gpr[3] = DATA_BASE;
    core.threads[1].gpr[5] = 100;
    core.threads[1].nia = 0x2000;

    let step = |core: &mut Core, t: usize| {
        let mut cpu = Cpu::new(&mut core.threads[t], &mut core.state, &shared);
        interpreter::step(&mut cpu).unwrap();
    };

    // lwarx, addi on thread 0
    step(&mut core, 0);
    step(&mut core, 0);
    assert!(shared.reservations.is_reserved(0, DATA_BASE));
    // The other thread's store lands between them
    step(&mut core, 1);
    assert!(!shared.reservations.is_reserved(0, DATA_BASE));

    // stwcx. fails and leaves memory alone
    step(&mut core, 0);
    assert!(!cr0_eq(&core, 0));
    assert_eq!(shared.bus.read_be32(DATA_BASE).unwrap(), 100);

    // bne retries; the second attempt succeeds and falls through
    for _ in 0..5 {
        step(&mut core, 0);
    }
    assert!(cr0_eq(&core, 0));
    assert_eq!(core.threads[0].nia, CODE_BASE + 0x10);
    assert_eq!(shared.bus.read_be32(DATA_BASE).unwrap(), 101);
}

/// Run `rounds` quanta on thread 0 of each core in parallel, then step
/// each core back to the top of its loop
fn run_cores_in_parallel(cores: &mut [Core], rounds: usize, quantum: u64) {
    std::thread::scope(|scope| {
        for core in cores.iter_mut() {
            scope.spawn(move || {
                for _ in 0..rounds {
                    core.execute_quantum(ThreadMask::THREAD0, quantum).unwrap();
                }
                while core.threads[0].nia != CODE_BASE {
                    core.execute_quantum(ThreadMask::THREAD0, 1).unwrap();
                }
            });
        }
    });
}

#[test]
fn test_contended_atomic_increments_across_cores() {
    // lwarx; addi; stwcx.; bne retry; count the success in r5; loop
    let program = [
        asm::lwarx(4, 0, 3),
        asm::addi(4, 4, 1),
        asm::stwcx(4, 0, 3),
        asm::bne(-12),
        asm::addi(5, 5, 1),
        asm::b(-20),
    ];
    for backend in [CpuBackend::Interpreter, CpuBackend::Hybrid] {
        let config = CpuConfig { backend, ..CpuConfig::default() };
        let first = create_test_env(config);
        let shared = Arc::clone(first.shared());
        let mut second = Core::new(1, Arc::clone(&shared));
        second.state.hrmor = 0;
        second.state.ctrl = xc_cpu::regs::ctrl::RUN_THREAD0;
        second.threads[0].nia = CODE_BASE;
        load(&first, CODE_BASE, &program);

        let mut cores = [first, second];
        for core in cores.iter_mut() {
            core.threads[0].gpr[3] = DATA_BASE;
        }
        run_cores_in_parallel(&mut cores, 300, 1000);

        let successes: u64 = cores.iter().map(|core| core.threads[0].gpr[5]).sum();
        let counter = shared.bus.read_be32(DATA_BASE).unwrap() as u64;
        assert!(successes > 0);
        assert_eq!(counter, successes, "{:?} lost increments", backend);
    }
}

#[test]
fn test_reservation_granule() {
    let mut core = create_test_env(interpreter_config());
    let shared = Arc::clone(core.shared());
    // stw into the same 128-byte line, then into the next one
    load(&core, 0x2000, &[asm::stw(5, 0x40, 3), asm::stw(5, 0x80, 3)]);
    core.threads[1].gpr[3] = DATA_BASE;
    core.threads[1].nia = 0x2000;

    shared.reservations.reserve(0, DATA_BASE);
    shared.reservations.reserve(2, DATA_BASE + 0x80);
    let mut cpu = Cpu::new(&mut core.threads[1], &mut core.state, &shared);
    interpreter::step(&mut cpu).unwrap();
    assert!(!shared.reservations.is_reserved(0, DATA_BASE));
    assert!(shared.reservations.is_reserved(2, DATA_BASE + 0x80));

    interpreter::step(&mut cpu).unwrap();
    assert!(!shared.reservations.is_reserved(2, DATA_BASE + 0x80));
}

#[test]
fn test_stwcx_without_reservation_fails() {
    let mut core = create_test_env(interpreter_config());
    load(&core, CODE_BASE, &[asm::stwcx(4, 0, 3)]);
    core.threads[0].gpr[3] = DATA_BASE;
    core.threads[0].gpr[4] = 0x55;
    core.threads[0].set_cr_field(0, 0b0010);

    core.execute_quantum(ThreadMask::THREAD0, 1).unwrap();

    assert!(!cr0_eq(&core, 0));
    assert_eq!(core.shared().bus.read_be32(DATA_BASE).unwrap(), 0);
}

#[test]
fn test_addc_wraps_and_sets_carry() {
    for backend in [CpuBackend::Interpreter, CpuBackend::Hybrid] {
        let mut core = create_test_env(CpuConfig { backend, ..CpuConfig::default() });
        load(&core, CODE_BASE, &[asm::addc(3, 4, 5), asm::addc(6, 5, 5)]);
        core.threads[0].gpr[4] = 0xFFFF_FFFF_FFFF_FFFF;
        core.threads[0].gpr[5] = 1;

        core.execute_quantum(ThreadMask::THREAD0, 1).unwrap();
        assert_eq!(core.threads[0].gpr[3], 0, "{:?}", backend);
        assert!(core.threads[0].xer_ca(), "{:?}", backend);
        assert_eq!(core.threads[0].xer & xer::OV, 0);

        // 1 + 1 carries nothing out
        core.execute_quantum(ThreadMask::THREAD0, 1).unwrap();
        assert_eq!(core.threads[0].gpr[6], 2);
        assert!(!core.threads[0].xer_ca(), "{:?}", backend);
    }
}

#[test]
fn test_vaddubs_saturates_and_sets_sat() {
    let mut core = create_test_env(interpreter_config());
    load(&core, CODE_BASE, &[asm::vaddubs(3, 1, 2), asm::vaddubs(4, 2, 2)]);
    let thread = &mut core.threads[0];
    thread.msr |= msr::VEC;
    let mut a = [0xF0u8; 16];
    a[0] = 0x01;
    thread.vr[1] = Vector128::from_u8x16(a);
    thread.vr[2] = Vector128::from_u8x16([0x20; 16]);

    core.execute_quantum(ThreadMask::THREAD0, 1).unwrap();
    let result = core.threads[0].vr[3].u8x16();
    assert_eq!(result[0], 0x21);
    assert!(result[1..].iter().all(|&b| b == 0xFF));
    assert_ne!(core.threads[0].vscr & vscr::SAT, 0);

    // SAT is sticky across a non-saturating add
    core.execute_quantum(ThreadMask::THREAD0, 1).unwrap();
    assert_eq!(core.threads[0].vr[4].u8x16(), [0x40; 16]);
    assert_ne!(core.threads[0].vscr & vscr::SAT, 0);
}

#[test]
fn test_vector_op_needs_vec() {
    let mut core = create_test_env(interpreter_config());
    load(&core, CODE_BASE, &[asm::vaddubs(3, 1, 2)]);
    core.execute_quantum(ThreadMask::THREAD0, 1).unwrap();
    assert_eq!(core.threads[0].nia, Exceptions::VECTOR_UNAVAILABLE.vector());
    assert_eq!(core.threads[0].srr0, CODE_BASE);
    assert_eq!(core.threads[0].vscr & vscr::SAT, 0);
}

fn sleeping_core() -> Core {
    let bus = Arc::new(SystemBus::with_ram(0x10000).unwrap());
    let config = CpuConfig { quantum: 4, ..CpuConfig::default() };
    let mut core = Core::new(1, Arc::new(Shared::standalone(bus, config)));
    // addi r3, r0, 7; b .
    load(&core, 0x100, &[asm::addi(3, 0, 7), asm::b(0)]);
    core.threads[0].nia = 0x3000;
    core.power_on();
    core
}

#[test]
fn test_external_interrupt_wakes_sleeping_core() {
    let mut core = sleeping_core();
    assert_eq!(core.run_state(), CoreRunState::Sleeping);
    assert!(!core.try_wake());

    let iic = Arc::clone(&core.shared().iic);
    // Logical id of PIR 2, thread 0 of core 1
    iic.raise(vector::IPI4, 1 << 2);
    assert!(core.try_wake());
    assert_eq!(core.run_state(), CoreRunState::Running);
    assert_eq!(core.enabled_threads(), ThreadMask::THREAD0);
    assert_eq!(iic.queued(2), 0);

    core.run_round().unwrap();
    let thread = &core.threads[0];
    // The first instruction executed is the one at the reset vector
    assert_eq!(thread.gpr[3], 7);
    assert_eq!(thread.srr0, 0x3000);
    assert_ne!(thread.srr1 & srr1::RESET_WAKE, 0);
    assert_eq!(thread.nia, 0x104);
    assert_eq!(thread.retired, 4);
    // Thread 1 stays parked with its reset pending
    assert!(core.threads[1].exceptions.contains(Exceptions::RESET));
    assert_eq!(core.threads[1].retired, 0);
}

#[test]
fn test_wake_needs_wext() {
    let mut core = sleeping_core();
    core.state.tscr = 0;
    core.shared().iic.raise(vector::IPI4, 1 << 2);
    assert!(!core.try_wake());
    assert_eq!(core.run_state(), CoreRunState::Sleeping);
    assert_eq!(core.shared().iic.queued(2), 1);
}

/// addi r3, r0, 1 at the top of a loop that overwrites it with
/// addi r3, r0, 2
fn self_modifying(core: &mut Core) {
    load(core, CODE_BASE, &[asm::addi(3, 0, 1), asm::stw(5, 0, 6), asm::b(-8)]);
    core.threads[0].gpr[5] = asm::addi(3, 0, 2) as u64;
    core.threads[0].gpr[6] = CODE_BASE;
}

#[test]
fn test_self_modifying_code_rebuilds_block() {
    for smc_detection in [SmcDetection::Always, SmcDetection::WriteWatch] {
        let config = CpuConfig { backend: CpuBackend::Hybrid, smc_detection, ..CpuConfig::default() };
        let mut core = create_test_env(config);
        self_modifying(&mut core);

        core.execute_quantum(ThreadMask::THREAD0, 9).unwrap();

        assert_eq!(core.threads[0].gpr[3], 2, "{:?}", smc_detection);
        assert_eq!(core.shared().bus.read_be32(CODE_BASE).unwrap(), asm::addi(3, 0, 2));
        let stats = core.jit.stats();
        assert_eq!(stats.rebuilds, 1, "{:?}", smc_detection);
        assert_eq!(stats.blocks_compiled, 3, "{:?}", smc_detection);
    }
}

#[test]
fn test_self_modifying_code_matches_interpreter() {
    let mut jit = create_test_env(CpuConfig::default());
    let mut reference = create_test_env(interpreter_config());
    self_modifying(&mut jit);
    self_modifying(&mut reference);

    for _ in 0..5 {
        jit.execute_quantum(ThreadMask::THREAD0, 4).unwrap();
        reference.execute_quantum(ThreadMask::THREAD0, 4).unwrap();
        assert_eq!(jit.threads[0].gpr, reference.threads[0].gpr);
        assert_eq!(jit.threads[0].nia, reference.threads[0].nia);
    }
}
