//! The three-core Xenon system
//!
//! [`Xenon`] is the arena that owns the cores and everything they share:
//! the bus, the interrupt controller, the time-base control register, the
//! reservation table and the code-write watch. Cores are addressed by index
//! and each runs its control loop on a dedicated OS thread once started.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use xc_core::config::CpuConfig;
use xc_core::{cpu_debug, CpuError, EmulatorContext, EmulatorError, Result};
use xc_memory::constants::{IIC_BASE, IIC_SIZE, SRAM_BASE, SRAM_SIZE, SROM_BASE, SROM_SIZE, TIME_BASE_CONTROL};
use xc_memory::{Bus, Device, RegionFlags, SystemBus};

use crate::core::{Core, CoreCommand, CoreHandle, CoreRunState};
use crate::cpu::{Cpu, Shared};
use crate::iic::Iic;
use crate::interpreter;
use crate::thread::{CoreState, ThreadState};
use crate::timebase::TimeBaseControl;

/// Cores in the system
pub const CORES: usize = 3;

/// Time base frequency of the real part
const TIME_BASE_HZ: u64 = 50_000_000;

/// One pre-parsed image segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub addr: u64,
    pub data: Vec<u8>,
    /// Size in memory; bytes past `data` are zeroed
    pub size: u64,
}

impl Segment {
    pub fn new(addr: u64, data: Vec<u8>) -> Self {
        let size = data.len() as u64;
        Self { addr, data, size }
    }
}

/// Time-base ticks per instruction for a host running `ips` guest
/// instructions per second, rounded to nearest and at least one
pub fn calibrate_cpi(ips: u64) -> u32 {
    let value = (ips / 100_000) as f64 / (TIME_BASE_HZ / 1_000_000) as f64;
    let whole = value as u64;
    let cpi = if whole == 0 || value - whole as f64 >= 0.5 { whole + 1 } else { whole };
    cpi.min(u32::MAX as u64) as u32
}

/// Run a short interpreter loop and extrapolate instructions per second
pub fn measure_ips(duration: Duration) -> Result<u64> {
    // rlwinm r18,r11,12,8,16; andi. r29,r17,0x7825; oris r18,r11,0x3D78; b -12
    const LOOP: [u32; 4] = [0x5572_6220, 0x723D_7825, 0x6572_3D78, 0x4BFF_FFF4];

    let bus = Arc::new(SystemBus::with_ram(0x1000)?);
    for (i, word) in LOOP.iter().enumerate() {
        bus.write_be32(4 + i as u64 * 4, *word)?;
    }
    let config = CpuConfig { time_base_enabled: false, ..CpuConfig::default() };
    let shared = Shared::standalone(bus, config);
    let mut core = CoreState::new(1);
    let mut thread = ThreadState::new(0, 2);
    thread.nia = 4;
    let mut cpu = Cpu::new(&mut thread, &mut core, &shared);

    let start = Instant::now();
    let mut count = 0u64;
    while start.elapsed() < duration {
        for _ in 0..1024 {
            interpreter::step(&mut cpu)?;
        }
        count += 1024;
    }
    let nanos = start.elapsed().as_nanos().max(1);
    Ok((count as u128 * 1_000_000_000 / nanos) as u64)
}

/// The Xenon CPU and its shared devices
pub struct Xenon {
    ctx: Arc<EmulatorContext>,
    bus: Arc<SystemBus>,
    shared: Arc<Shared>,
    cores: Vec<Core>,
    handles: Vec<CoreHandle>,
    running: Vec<JoinHandle<Core>>,
}

impl Xenon {
    /// Build the system described by the context's configuration
    pub fn new(ctx: Arc<EmulatorContext>) -> Result<Self> {
        let config = ctx.config().clone();
        let bus = Arc::new(SystemBus::with_ram(config.memory.ram_size)?);
        bus.map_storage("srom", SROM_BASE, SROM_SIZE, RegionFlags::ROM)?;
        bus.map_storage("sram", SRAM_BASE, SRAM_SIZE, RegionFlags::RW)?;

        let iic = Arc::new(Iic::new());
        let time_base = Arc::new(TimeBaseControl::with_state(config.cpu.time_base_enabled));
        bus.map_device(IIC_BASE, IIC_SIZE, Arc::clone(&iic) as Arc<dyn Device>)?;
        bus.map_device(TIME_BASE_CONTROL, 8, Arc::clone(&time_base) as Arc<dyn Device>)?;

        let cpi = match config.cpu.clocks_per_instruction {
            0 => {
                let ips = measure_ips(Duration::from_millis(100))?;
                let cpi = calibrate_cpi(ips);
                tracing::info!("Host runs {} instructions per second, {} clocks per instruction", ips, cpi);
                cpi
            }
            cpi => cpi,
        };

        let shared = Arc::new(Shared::new(
            Arc::clone(&bus) as Arc<dyn Bus>,
            iic,
            time_base,
            config.cpu.clone(),
            cpi,
        ));
        let cores: Vec<Core> = (0..CORES as u8).map(|i| Core::new(i, Arc::clone(&shared))).collect();
        let handles = cores.iter().map(Core::handle).collect();

        Ok(Self { ctx, bus, shared, cores, handles, running: Vec::new() })
    }

    pub fn context(&self) -> &Arc<EmulatorContext> {
        &self.ctx
    }

    pub fn bus(&self) -> &Arc<SystemBus> {
        &self.bus
    }

    pub fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    pub fn iic(&self) -> &Arc<Iic> {
        &self.shared.iic
    }

    pub fn handle(&self, core: u8) -> Result<&CoreHandle> {
        self.handles.get(core as usize).ok_or_else(|| CpuError::InvalidCore(core).into())
    }

    /// Direct access to a core; only possible while it is not running
    pub fn core(&self, core: u8) -> Result<&Core> {
        self.cores.get(core as usize).ok_or_else(|| CpuError::InvalidCore(core).into())
    }

    pub fn core_mut(&mut self, core: u8) -> Result<&mut Core> {
        self.cores.get_mut(core as usize).ok_or_else(|| CpuError::InvalidCore(core).into())
    }

    pub fn is_started(&self) -> bool {
        !self.running.is_empty()
    }

    /// Copy `segments` into guest memory and point thread 0 of core 0 at
    /// `entry`
    pub fn load_image(&mut self, entry: u64, segments: &[Segment]) -> Result<()> {
        self.load_image_on(0, 0, entry, segments)
    }

    /// Copy `segments` into guest memory and point `thread` of `core` at
    /// `entry`
    pub fn load_image_on(&mut self, core: u8, thread: u8, entry: u64, segments: &[Segment]) -> Result<()> {
        if thread > 1 {
            return Err(CpuError::InvalidThread(thread).into());
        }
        for segment in segments {
            self.write_segment(segment)?;
        }
        let target = self.core_mut(core)?;
        target.threads[thread as usize].nia = entry;
        tracing::info!(
            "Loaded {} segment(s), core {} thread {} entry 0x{:x}",
            segments.len(),
            core,
            thread,
            entry
        );
        Ok(())
    }

    fn write_segment(&self, segment: &Segment) -> Result<()> {
        let copied = segment.data.len().min(segment.size as usize);
        self.bus
            .write(segment.addr, &segment.data[..copied])
            .map_err(|e| EmulatorError::Loader(format!("segment at 0x{:x}: {}", segment.addr, e)))?;
        let rest = segment.size as usize - copied;
        if rest > 0 {
            self.bus
                .memset(segment.addr + copied as u64, 0, rest)
                .map_err(|e| EmulatorError::Loader(format!("segment at 0x{:x}: {}", segment.addr, e)))?;
        }
        self.shared.reservations.snoop(segment.addr, segment.size);
        self.shared.code_watch.note_write(segment.addr, segment.size);
        cpu_debug!("Segment 0x{:x}..0x{:x}", segment.addr, segment.addr + segment.size);
        Ok(())
    }

    /// Start every core's control loop on its own thread
    pub fn start(&mut self) -> Result<()> {
        if self.is_started() {
            return Ok(());
        }
        self.ctx.start();
        for mut core in self.cores.drain(..) {
            let ctx = Arc::clone(&self.ctx);
            let handle = thread::Builder::new()
                .name(format!("xenon-core-{}", core.index))
                .spawn(move || {
                    core.run(&ctx);
                    core
                })?;
            self.running.push(handle);
        }
        tracing::info!("Started {} cores", self.running.len());
        Ok(())
    }

    /// Ask every core to stop at its next quantum boundary
    pub fn shutdown(&self) {
        self.ctx.request_shutdown();
        for handle in &self.handles {
            let _ = handle.send(CoreCommand::Shutdown);
        }
    }

    /// Join every core thread and report a checkstop, if one happened
    pub fn wait(&mut self) -> Result<()> {
        let mut panicked = None;
        for (index, handle) in self.running.drain(..).enumerate() {
            match handle.join() {
                Ok(core) => self.cores.push(core),
                Err(_) => {
                    tracing::error!("Core {} thread panicked", index);
                    panicked.get_or_insert(index as u8);
                }
            }
        }
        self.cores.sort_by_key(|core| core.index);
        if let Some(index) = panicked {
            return Err(CpuError::CorePanicked(index).into());
        }
        self.ctx.result()
    }

    /// Stop and join every core
    pub fn stop(&mut self) -> Result<()> {
        self.shutdown();
        self.wait()
    }

    /// Run every core round-robin on the calling thread until about
    /// `budget` instructions have executed
    ///
    /// Also returns early once no core can make progress.
    /// The budget is checked between scheduling rounds, so it may be
    /// overshot by up to one quantum per core. Returns the instructions
    /// executed.
    pub fn run_budget(&mut self, budget: u64) -> Result<u64> {
        if self.is_started() {
            return Err(EmulatorError::Config("cores are already running on their own threads".into()));
        }
        self.ctx.start();
        for core in self.cores.iter_mut() {
            if core.run_state() == CoreRunState::Unused {
                core.power_on();
            }
        }

        let mut executed = 0;
        while executed < budget && self.ctx.is_running() {
            let mut progressed = false;
            for core in self.cores.iter_mut() {
                match core.run_state() {
                    CoreRunState::Sleeping => progressed |= core.try_wake(),
                    CoreRunState::Running => {
                        progressed = true;
                        match core.run_round() {
                            Ok(n) => executed += n,
                            Err(err) => {
                                if !core.handle_error(err, &self.ctx) {
                                    break;
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
            if !progressed {
                cpu_debug!("No runnable core left after {} instructions", executed);
                break;
            }
        }

        if self.ctx.is_running() {
            self.ctx.request_shutdown();
        }
        self.ctx.result().map(|()| executed)
    }
}

impl Drop for Xenon {
    fn drop(&mut self) {
        if self.is_started() {
            let _ = self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use xc_core::config::{Config, CpuBackend};

    use super::*;
    use crate::core::CoreRunState;

    fn create_test_env() -> Xenon {
        let mut config = Config::default();
        config.memory.ram_size = 0x10_0000;
        config.cpu.clocks_per_instruction = 1;
        config.cpu.backend = CpuBackend::Interpreter;
        Xenon::new(Arc::new(EmulatorContext::new(config))).unwrap()
    }

    #[test]
    fn test_calibrate_cpi() {
        assert_eq!(calibrate_cpi(0), 1);
        assert_eq!(calibrate_cpi(5_000_000), 1);
        // 100M IPS: 1000 / 50 = 20
        assert_eq!(calibrate_cpi(100_000_000), 20);
        // 127.5M IPS: 25.5 rounds up
        assert_eq!(calibrate_cpi(127_500_000), 26);
    }

    #[test]
    fn test_memory_map() {
        let xenon = create_test_env();
        let names: Vec<String> = xenon.bus().mappings().into_iter().map(|(name, _, _)| name).collect();
        for expected in ["ram", "srom", "sram"] {
            assert!(names.iter().any(|n| n == expected), "missing {}", expected);
        }
        assert!(xenon.bus().write_u8(SROM_BASE, 1).is_err());
        assert_eq!(xenon.core(2).unwrap().threads[1].pir, 5);
        assert!(xenon.core(3).is_err());
    }

    #[test]
    fn test_load_image_zero_fills() {
        let mut xenon = create_test_env();
        xenon.bus().memset(0x2000, 0xAA, 0x10).unwrap();
        let segment = Segment { addr: 0x2000, data: vec![1, 2, 3, 4], size: 0x10 };
        xenon.load_image(0x2000, &[segment]).unwrap();

        assert_eq!(xenon.bus().read_be32(0x2000).unwrap(), 0x0102_0304);
        assert_eq!(xenon.bus().read_be64(0x2008).unwrap(), 0);
        assert_eq!(xenon.core(0).unwrap().threads[0].nia, 0x2000);
        assert!(xenon.load_image_on(1, 2, 0, &[]).is_err());
    }

    #[test]
    fn test_start_and_shutdown() {
        let mut xenon = create_test_env();
        // b 0
        xenon.load_image(0x1000, &[Segment::new(0x1000, 0x4800_0000u32.to_be_bytes().to_vec())]).unwrap();
        xenon.core_mut(0).unwrap().state.hrmor = 0;
        xenon.start().unwrap();
        assert!(xenon.core(0).is_err());
        let handle = xenon.handle(0).unwrap().clone();
        while handle.state() == CoreRunState::Unused {
            std::thread::yield_now();
        }
        std::thread::sleep(Duration::from_millis(20));
        xenon.stop().unwrap();

        let core = xenon.core(0).unwrap();
        assert_eq!(core.run_state(), CoreRunState::None);
        assert!(core.threads[0].retired > 0);
        assert_eq!(core.threads[0].nia, 0x1000);
        assert_eq!(xenon.core(1).unwrap().threads[0].retired, 0);
    }

    #[test]
    fn test_run_budget() {
        let mut xenon = create_test_env();
        // b 0
        xenon.load_image(0x1000, &[Segment::new(0x1000, 0x4800_0000u32.to_be_bytes().to_vec())]).unwrap();
        xenon.core_mut(0).unwrap().state.hrmor = 0;
        let executed = xenon.run_budget(1000).unwrap();

        assert!(executed >= 1000);
        let core = xenon.core(0).unwrap();
        assert_eq!(core.threads[0].retired, executed);
        assert_eq!(core.threads[0].nia, 0x1000);
        assert!(!xenon.context().is_running());
    }

    #[test]
    fn test_run_budget_stops_when_nothing_runs() {
        let mut config = Config::default();
        config.memory.ram_size = 0x10_0000;
        config.cpu.clocks_per_instruction = 1;
        config.cpu.backend = CpuBackend::Interpreter;
        config.cpu.invalid_instruction = xc_core::config::InvalidInstructionPolicy::Halt;
        let mut xenon = Xenon::new(Arc::new(EmulatorContext::new(config))).unwrap();
        // li r3, 1; then an invalid word
        let code = [0x3860_0001u32, 0].iter().flat_map(|w| w.to_be_bytes()).collect();
        xenon.load_image(0x1000, &[Segment::new(0x1000, code)]).unwrap();
        xenon.core_mut(0).unwrap().state.hrmor = 0;

        let executed = xenon.run_budget(u64::MAX).unwrap();
        let core = xenon.core(0).unwrap();
        assert_eq!(core.run_state(), CoreRunState::Halted);
        assert_eq!(core.threads[0].gpr[3], 1);
        assert!(matches!(core.last_error, Some(CpuError::InvalidInstruction { addr: 0x1004, .. })));
        assert!(executed <= 1);
    }
}
