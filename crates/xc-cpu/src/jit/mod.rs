//! Block compiler and cache
//!
//! Straight-line runs of guest code are compiled with Cranelift into one host
//! function each and cached per core by the real address of their first
//! instruction. Instructions with an emitter become native IR; the rest call
//! their interpreter handler from the generated code. Every instruction then
//! goes through the same epilogue the interpreter runs, so a block leaves
//! exactly the state that stepping its instructions one at a time would.
//!
//! Cached blocks are revalidated against guest memory before they run. With
//! [`SmcDetection::Always`] the checksum is recomputed on every entry; with
//! [`SmcDetection::WriteWatch`] only after a store reached one of the pages
//! the block was compiled from.
//!
//! The cache holds a bounded number of blocks and evicts the least recently
//! used. Cranelift cannot free single functions, so once as many blocks as
//! the cache holds have been thrown away the whole code module is rebuilt.

pub mod block;
pub mod code_watch;
pub mod codegen;
pub mod emitter;
pub mod hooks;

use std::collections::HashMap;
use std::sync::Arc;

use xc_core::config::{CpuBackend, SmcDetection};
use xc_core::{jit_debug, jit_trace, CpuError};
use xc_memory::pages::page_of;

use crate::cpu::Cpu;
use crate::decoder;
use crate::interpreter;
use crate::thread::ThreadState;

pub use block::{Block, BlockOp};
pub use code_watch::CodeWatch;
pub use codegen::{Codegen, JitError};
pub use hooks::BlockContext;

const PAGE_MASK: u64 = 0xFFF;

/// Default number of blocks cached per core
pub const DEFAULT_CAPACITY: usize = 4096;

/// Block cache counters, per core
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JitStats {
    pub blocks_compiled: u64,
    /// Blocks thrown away because guest code changed underneath them
    pub rebuilds: u64,
    pub cache_hits: u64,
    pub native_instructions: u64,
    pub fallback_instructions: u64,
    /// Blocks dropped to make room
    pub evictions: u64,
    /// Blocks dropped by `icbi`
    pub invalidations: u64,
    /// Blocks that run without generated code because compilation failed
    pub compile_failures: u64,
}

struct CacheEntry {
    block: Arc<Block>,
    /// Code-watch generation the block was last validated at
    generation: u32,
    last_used: u64,
}

enum Backend {
    /// Not created yet
    Pending,
    Native(Codegen),
    /// No code generator for this host; blocks run through the handlers
    Unavailable,
}

/// Per-core block cache
pub struct Jit {
    // Declared before the backend so blocks go before the code they point to
    blocks: HashMap<u64, CacheEntry>,
    /// Block start addresses by real page
    pages: HashMap<u64, Vec<u64>>,
    backend: Backend,
    capacity: usize,
    tick: u64,
    /// Blocks dropped since the code module was last rebuilt
    retired: usize,
    stats: JitStats,
    warned_pure_jit: bool,
}

impl Jit {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Cache holding at most `capacity` blocks
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            blocks: HashMap::new(),
            pages: HashMap::new(),
            backend: Backend::Pending,
            capacity: capacity.max(1),
            tick: 0,
            retired: 0,
            stats: JitStats::default(),
            warned_pure_jit: false,
        }
    }

    pub fn stats(&self) -> JitStats {
        self.stats
    }

    /// Number of cached blocks
    pub fn cached(&self) -> usize {
        self.blocks.len()
    }

    /// Drop every cached block and the code generated for them
    pub fn clear(&mut self) {
        self.release_code();
    }

    /// Drop the blocks compiled from the page holding real address `ra`
    ///
    /// Returns how many were dropped.
    pub fn invalidate_page(&mut self, ra: u64) -> usize {
        let Some(starts) = self.pages.remove(&page_of(ra)) else {
            return 0;
        };
        for start in &starts {
            self.blocks.remove(start);
        }
        jit_trace!("Invalidated {} blocks on page 0x{:x}", starts.len(), ra & !PAGE_MASK);
        self.stats.invalidations += starts.len() as u64;
        self.retire(starts.len());
        starts.len()
    }

    /// Run the block at NIA, executing at most `budget` instructions
    ///
    /// Returns the number of instructions attempted, including one that
    /// faulted. Fetch faults are resolved through the interpreter path.
    pub fn run_block(&mut self, cpu: &mut Cpu<'_>, budget: u64) -> Result<u64, CpuError> {
        if cpu.shared.config.backend == CpuBackend::Jit && !self.warned_pure_jit {
            tracing::warn!("Pure JIT mode runs as hybrid: opcodes without an emitter use the interpreter");
            self.warned_pure_jit = true;
        }

        interpreter::begin(cpu);
        let start_ea = cpu.thread.cia;
        let ra = match cpu.fetch_address() {
            Ok(ra) => ra,
            Err(fault) => {
                interpreter::complete(cpu, Err((fault, 0)))?;
                return Ok(1);
            }
        };

        let block = self.lookup(cpu, start_ea, ra);
        self.execute(cpu, &block, budget.max(1))
    }

    /// Find a valid block for `ra`, compiling or rebuilding as needed
    fn lookup(&mut self, cpu: &Cpu<'_>, start_ea: u64, ra: u64) -> Arc<Block> {
        self.tick += 1;
        let watch = &cpu.shared.code_watch;
        if let Some(entry) = self.blocks.get_mut(&ra) {
            let generation = watch.generation(ra);
            let verify = match cpu.shared.config.smc_detection {
                SmcDetection::Always => true,
                SmcDetection::WriteWatch => entry.generation != generation,
            };
            let fresh = !verify
                || block::checksum(block::read_words(cpu.shared.bus.as_ref(), ra, entry.block.len()))
                    == entry.block.checksum;
            if fresh {
                entry.generation = generation;
                entry.last_used = self.tick;
                self.stats.cache_hits += 1;
                return Arc::clone(&entry.block);
            }
            jit_debug!("Code at 0x{:x} (ra 0x{:x}) changed, rebuilding block", start_ea, ra);
            self.stats.rebuilds += 1;
            self.remove(ra);
        }

        if self.blocks.len() >= self.capacity {
            self.evict_lru();
        }
        let (block, generation) = self.compile(cpu, start_ea, ra);
        let block = Arc::new(block);
        self.pages.entry(page_of(ra)).or_default().push(ra);
        self.blocks.insert(ra, CacheEntry { block: Arc::clone(&block), generation, last_used: self.tick });
        block
    }

    fn remove(&mut self, ra: u64) {
        if self.blocks.remove(&ra).is_none() {
            return;
        }
        let page = page_of(ra);
        if let Some(starts) = self.pages.get_mut(&page) {
            starts.retain(|&start| start != ra);
            if starts.is_empty() {
                self.pages.remove(&page);
            }
        }
        self.retire(1);
    }

    fn evict_lru(&mut self) {
        let oldest = self.blocks.iter().min_by_key(|(_, entry)| entry.last_used).map(|(&ra, _)| ra);
        if let Some(ra) = oldest {
            jit_trace!("Evicting block at ra 0x{:x}", ra);
            self.stats.evictions += 1;
            self.remove(ra);
        }
    }

    /// Count dropped blocks, rebuilding the code module once enough are dead
    fn retire(&mut self, count: usize) {
        self.retired += count;
        if self.retired >= self.capacity {
            self.release_code();
        }
    }

    fn release_code(&mut self) {
        jit_debug!("Releasing generated code, {} blocks cached", self.blocks.len());
        self.blocks.clear();
        self.pages.clear();
        self.retired = 0;
        let result = match &mut self.backend {
            // SAFETY: every block that pointed into the old module was just
            // dropped, and no block is running while the cache is borrowed
            Backend::Native(codegen) => unsafe { codegen.flush() },
            _ => Ok(()),
        };
        if let Err(e) = result {
            tracing::warn!("Could not rebuild the code module, blocks will run through the interpreter: {}", e);
            self.backend = Backend::Unavailable;
        }
    }

    /// The code generator, created on first use
    fn codegen(&mut self) -> Option<&mut Codegen> {
        if let Backend::Pending = self.backend {
            self.backend = match Codegen::new() {
                Ok(codegen) => {
                    jit_debug!("Native code generator ready, {} opcodes lowered", emitter::native_opcodes());
                    Backend::Native(codegen)
                }
                Err(e) => {
                    tracing::warn!("Native code generation unavailable, blocks will run through the interpreter: {}", e);
                    Backend::Unavailable
                }
            };
        }
        match &mut self.backend {
            Backend::Native(codegen) => Some(codegen),
            _ => None,
        }
    }

    fn compile(&mut self, cpu: &Cpu<'_>, start_ea: u64, start_ra: u64) -> (Block, u32) {
        let watch = &cpu.shared.code_watch;
        watch.watch(start_ra);
        // Sampled before reading so a racing store forces a recheck
        let generation = watch.generation(start_ra);

        let limit = cpu.shared.config.max_block_instructions.max(1) as usize;
        let mut ops = Vec::new();
        let mut ra = start_ra;
        loop {
            let word = cpu.shared.bus.read_be32(ra).unwrap_or(u32::MAX);
            let op = decoder::decode(word);
            ops.push(BlockOp { word, op, native: false });
            ra += 4;
            if op.ends_block() || ra & PAGE_MASK == 0 || ops.len() >= limit {
                break;
            }
        }
        let checksum = block::checksum(ops.iter().map(|op| op.word));

        let mut failure = None;
        let entry = match self.codegen() {
            Some(codegen) => match codegen.compile(&mut ops) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    failure = Some(e);
                    None
                }
            },
            None => None,
        };
        if let Some(e) = failure {
            tracing::warn!("Block at 0x{:x} runs without generated code: {}", start_ea, e);
            self.stats.compile_failures += 1;
            ops.iter_mut().for_each(|op| op.native = false);
        }

        let block = Block { start_ea, start_ra, ops, checksum, entry };
        self.stats.blocks_compiled += 1;
        jit_trace!(
            "Compiled block at 0x{:x}: {} instructions ({} bytes), {} native",
            start_ea,
            block.len(),
            block.byte_len(),
            block.native_count()
        );
        (block, generation)
    }

    /// Execute `block`, whose first instruction has already been begun
    fn execute(&mut self, cpu: &mut Cpu<'_>, block: &Block, budget: u64) -> Result<u64, CpuError> {
        let thread: *mut ThreadState = &mut *cpu.thread;
        let mut ctx = BlockContext::new(cpu, block, &mut self.stats, budget);
        match block.entry {
            // SAFETY: the entry point belongs to the current code module,
            // which outlives this call; `ctx` and `thread` stay valid
            // throughout and generated code only touches the register file
            // between hook calls
            Some(entry) => unsafe { entry(&mut ctx, thread) },
            None => {
                let mut index = 0;
                loop {
                    let status = ctx.fallback(index);
                    if ctx.complete(index, status) {
                        break;
                    }
                    index += 1;
                }
            }
        }
        ctx.finish()
    }
}

impl Default for Jit {
    fn default() -> Self {
        Self::new()
    }
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

    fn load(shared: &Shared, addr: u64, words: &[u32]) {
        for (i, word) in words.iter().enumerate() {
            shared.bus.write_be32(addr + i as u64 * 4, *word).unwrap();
        }
    }

    /// Run the block at `nia` once
    fn run_at(jit: &mut Jit, thread: &mut ThreadState, core: &mut CoreState, shared: &Shared, nia: u64) -> u64 {
        thread.nia = nia;
        jit.run_block(&mut Cpu::new(thread, core, shared), 100).unwrap()
    }

    #[test]
    fn test_block_stops_at_branch() {
        let (mut thread, mut core, shared) = create_test_env(CpuConfig::default());
        // li r3, 1; li r4, 2; b -8; li r5, 3
        load(&shared, 0x1000, &[0x3860_0001, 0x3880_0002, 0x4BFF_FFF8, 0x38A0_0003]);
        let mut jit = Jit::new();
        let mut cpu = Cpu::new(&mut thread, &mut core, &shared);
        let executed = jit.run_block(&mut cpu, 100).unwrap();

        assert_eq!(executed, 3);
        assert_eq!(thread.gpr[3], 1);
        assert_eq!(thread.gpr[4], 2);
        assert_eq!(thread.gpr[5], 0);
        assert_eq!(thread.nia, 0x1000);
        assert_eq!(thread.retired, 3);
        assert_eq!(jit.stats().blocks_compiled, 1);
    }

    #[test]
    fn test_block_runs_native_code() {
        let (mut thread, mut core, shared) = create_test_env(CpuConfig::default());
        // li r3, 5; li r4, 7; add r5, r3, r4; stw r5, 0x100(r0); lwz r6, 0x100(r0); blr
        load(&shared, 0x1000, &[0x3860_0005, 0x3880_0007, 0x7CA3_2214, 0x90A0_0100, 0x80C0_0100, 0x4E80_0020]);
        thread.lr = 0x1000;
        let mut jit = Jit::new();
        let executed = jit.run_block(&mut Cpu::new(&mut thread, &mut core, &shared), 100).unwrap();

        assert_eq!(executed, 6);
        assert_eq!(thread.gpr[5], 12);
        assert_eq!(thread.gpr[6], 12);
        assert_eq!(shared.bus.read_be32(0x100).unwrap(), 12);
        assert_eq!(thread.nia, 0x1000);
        let stats = jit.stats();
        assert_eq!(stats.native_instructions + stats.fallback_instructions, 6);
        assert_eq!(stats.compile_failures, 0);
    }

    #[test]
    fn test_budget_limits_execution() {
        let (mut thread, mut core, shared) = create_test_env(CpuConfig::default());
        load(&shared, 0x1000, &[0x3860_0001, 0x3880_0002, 0x38A0_0003]);
        let mut jit = Jit::new();
        let mut cpu = Cpu::new(&mut thread, &mut core, &shared);
        assert_eq!(jit.run_block(&mut cpu, 2).unwrap(), 2);
        assert_eq!(thread.nia, 0x1008);
        assert_eq!(thread.gpr[5], 0);
    }

    #[test]
    fn test_block_stops_at_page_boundary() {
        let (mut thread, mut core, shared) = create_test_env(CpuConfig::default());
        thread.nia = 0x1FF8;
        load(&shared, 0x1FF8, &[0x3860_0001, 0x3880_0002, 0x38A0_0003]);
        let mut jit = Jit::new();
        let mut cpu = Cpu::new(&mut thread, &mut core, &shared);
        assert_eq!(jit.run_block(&mut cpu, 100).unwrap(), 2);
        assert_eq!(thread.nia, 0x2000);
    }

    #[test]
    fn test_cache_hit_and_rebuild() {
        let (mut thread, mut core, shared) = create_test_env(CpuConfig::default());
        load(&shared, 0x1000, &[0x3860_0001, 0x4BFF_FFFC]);
        let mut jit = Jit::new();
        {
            let mut cpu = Cpu::new(&mut thread, &mut core, &shared);
            jit.run_block(&mut cpu, 100).unwrap();
            jit.run_block(&mut cpu, 100).unwrap();
        }
        assert_eq!(jit.stats().cache_hits, 1);

        // li r3, 7 replaces li r3, 1 behind the cache's back
        shared.bus.write_be32(0x1000, 0x3860_0007).unwrap();
        let mut cpu = Cpu::new(&mut thread, &mut core, &shared);
        jit.run_block(&mut cpu, 100).unwrap();
        assert_eq!(thread.gpr[3], 7);
        assert_eq!(jit.stats().rebuilds, 1);
        assert_eq!(jit.stats().blocks_compiled, 2);
        assert_eq!(jit.cached(), 1);
    }

    #[test]
    fn test_least_recently_used_block_is_evicted() {
        let (mut thread, mut core, shared) = create_test_env(CpuConfig::default());
        // b . at three block starts
        for addr in [0x1000, 0x1100, 0x1200] {
            load(&shared, addr, &[0x4800_0000]);
        }
        let mut jit = Jit::with_capacity(2);
        run_at(&mut jit, &mut thread, &mut core, &shared, 0x1000);
        run_at(&mut jit, &mut thread, &mut core, &shared, 0x1100);
        // Touch 0x1000 so 0x1100 is the oldest
        run_at(&mut jit, &mut thread, &mut core, &shared, 0x1000);
        run_at(&mut jit, &mut thread, &mut core, &shared, 0x1200);

        assert_eq!(jit.cached(), 2);
        assert_eq!(jit.stats().evictions, 1);
        run_at(&mut jit, &mut thread, &mut core, &shared, 0x1000);
        assert_eq!(jit.stats().cache_hits, 2);
        run_at(&mut jit, &mut thread, &mut core, &shared, 0x1100);
        assert_eq!(jit.stats().blocks_compiled, 4);
    }

    #[test]
    fn test_invalidate_page_drops_its_blocks() {
        let (mut thread, mut core, shared) = create_test_env(CpuConfig::default());
        for addr in [0x1000, 0x1100, 0x3000] {
            load(&shared, addr, &[0x4800_0000]);
        }
        let mut jit = Jit::new();
        for addr in [0x1000, 0x1100, 0x3000] {
            run_at(&mut jit, &mut thread, &mut core, &shared, addr);
        }

        assert_eq!(jit.invalidate_page(0x1FFC), 2);
        assert_eq!(jit.cached(), 1);
        assert_eq!(jit.stats().invalidations, 2);
        assert_eq!(jit.invalidate_page(0x1000), 0);

        run_at(&mut jit, &mut thread, &mut core, &shared, 0x3000);
        assert_eq!(jit.stats().cache_hits, 1);
    }

    #[test]
    fn test_code_released_after_capacity_retired() {
        let (mut thread, mut core, shared) = create_test_env(CpuConfig::default());
        // li r3, 9; b .
        load(&shared, 0x1000, &[0x3860_0009, 0x4800_0000]);
        load(&shared, 0x3000, &[0x4800_0000]);
        let mut jit = Jit::with_capacity(2);
        run_at(&mut jit, &mut thread, &mut core, &shared, 0x1000);
        run_at(&mut jit, &mut thread, &mut core, &shared, 0x3000);

        jit.invalidate_page(0x3000);
        assert_eq!(jit.cached(), 1);
        // Second retirement reaches the capacity and rebuilds the module
        jit.invalidate_page(0x1000);
        assert_eq!(jit.cached(), 0);

        thread.gpr[3] = 0;
        assert_eq!(run_at(&mut jit, &mut thread, &mut core, &shared, 0x1000), 2);
        assert_eq!(thread.gpr[3], 9);
        assert_eq!(jit.stats().blocks_compiled, 3);
    }

    #[test]
    fn test_fetch_fault_takes_isi() {
        let (mut thread, mut core, shared) = create_test_env(CpuConfig::default());
        thread.nia = 0x1002;
        let mut jit = Jit::new();
        let mut cpu = Cpu::new(&mut thread, &mut core, &shared);
        assert_eq!(jit.run_block(&mut cpu, 100).unwrap(), 1);
        assert_eq!(thread.nia, crate::exceptions::Exceptions::INSTR_STORAGE.vector());
        assert_eq!(thread.srr0, 0x1002);
        assert_eq!(jit.cached(), 0);
    }
}
