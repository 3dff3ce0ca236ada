//! Integrated interrupt controller
//!
//! One processor block per hardware thread (0x1000 bytes each) followed by
//! a handful of global registers. Every thread keeps a set of queued
//! interrupt vectors ordered highest first; a vector is signalled while it
//! is at or above the thread's task priority and no earlier vector is still
//! in service (acknowledged but not yet EOI'd).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::Mutex;
use xc_core::error::MemoryError;
use xc_core::iic_debug;
use xc_memory::Device;

use crate::cpu::HW_THREADS;
use crate::exceptions::Exceptions;
use crate::thread::ThreadState;

/// Interrupt vectors, lowest priority first
pub mod vector {
    pub const IPI4: u8 = 0x08;
    pub const IPI3: u8 = 0x10;
    pub const SMM: u8 = 0x14;
    pub const SFCX: u8 = 0x18;
    pub const SATA_HDD: u8 = 0x20;
    pub const SATA_ODD: u8 = 0x24;
    pub const OHCI0: u8 = 0x2C;
    pub const EHCI0: u8 = 0x30;
    pub const OHCI1: u8 = 0x34;
    pub const EHCI1: u8 = 0x38;
    pub const XMA: u8 = 0x40;
    pub const AUDIO: u8 = 0x44;
    pub const ENET: u8 = 0x4C;
    pub const XPS: u8 = 0x54;
    pub const GRAPHICS: u8 = 0x58;
    pub const PROFILER: u8 = 0x60;
    pub const BIU: u8 = 0x64;
    pub const IOC: u8 = 0x68;
    pub const FSB: u8 = 0x6C;
    pub const IPI2: u8 = 0x70;
    pub const CLOCK: u8 = 0x74;
    pub const IPI1: u8 = 0x78;
    /// Returned by an acknowledge with nothing eligible
    pub const NONE: u8 = 0x7C;

    pub fn name(vector: u8) -> &'static str {
        match vector {
            IPI4 => "IPI4",
            IPI3 => "IPI3",
            SMM => "SMM",
            SFCX => "SFCX",
            SATA_HDD => "SATA_HDD",
            SATA_ODD => "SATA_ODD",
            OHCI0 => "OHCI0",
            EHCI0 => "EHCI0",
            OHCI1 => "OHCI1",
            EHCI1 => "EHCI1",
            XMA => "XMA",
            AUDIO => "AUDIO",
            ENET => "ENET",
            XPS => "XPS",
            GRAPHICS => "GRAPHICS",
            PROFILER => "PROFILER",
            BIU => "BIU",
            IOC => "IOC",
            FSB => "FSB",
            IPI2 => "IPI2",
            CLOCK => "CLOCK",
            IPI1 => "IPI1",
            NONE => "NONE",
            _ => "UNKNOWN",
        }
    }
}

/// Processor block register offsets
pub mod reg {
    pub const BLOCK_SIZE: u64 = 0x1000;
    pub const LOGICAL_ID: u64 = 0x00;
    pub const TASK_PRIORITY: u64 = 0x08;
    pub const IPI_GENERATION: u64 = 0x10;
    pub const ACKNOWLEDGE: u64 = 0x50;
    pub const EOI: u64 = 0x60;
    pub const EOI_SET_PRIORITY: u64 = 0x68;
    pub const THREAD_RESET: u64 = 0xF0;
    /// First global register
    pub const GLOBAL_BASE: u64 = 0x6000;
    pub const MISC_GENERATION2: u64 = 0x6020;
    /// Size of the mapped register file
    pub const SPAN: u64 = 0x8000;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Queued {
    vector: u8,
    acked: bool,
}

#[derive(Debug)]
struct ThreadBlock {
    logical_id: u8,
    priority: u8,
    /// Highest vector first, at most one entry per vector
    queue: Vec<Queued>,
}

impl ThreadBlock {
    fn new(index: usize) -> Self {
        Self { logical_id: 1 << index, priority: 0, queue: Vec::new() }
    }

    fn has_pending(&self) -> bool {
        for entry in &self.queue {
            if entry.acked {
                return false;
            }
            if entry.vector >= self.priority {
                return true;
            }
        }
        false
    }
}

struct State {
    threads: Vec<ThreadBlock>,
    /// Registers without side effects, keyed by offset
    storage: HashMap<u64, u64>,
    misc2_toggle: bool,
}

/// The interrupt controller shared by all cores
pub struct Iic {
    state: Mutex<State>,
    /// Bit per thread: has_pending() as of the last state change
    signal: AtomicU8,
}

impl Iic {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                threads: (0..HW_THREADS).map(ThreadBlock::new).collect(),
                storage: HashMap::new(),
                misc2_toggle: false,
            }),
            signal: AtomicU8::new(0),
        }
    }

    fn refresh(&self, state: &State, thread: usize) {
        let bit = 1u8 << thread;
        if state.threads[thread].has_pending() {
            self.signal.fetch_or(bit, Ordering::AcqRel);
        } else {
            self.signal.fetch_and(!bit, Ordering::AcqRel);
        }
    }

    /// Queue `vector` on every thread whose logical id intersects `mask`
    pub fn raise(&self, vector: u8, mask: u8) {
        let mut state = self.state.lock();
        iic_debug!("Raising {} for threads with mask {:#x}", vector::name(vector), mask);
        for index in 0..HW_THREADS {
            let block = &mut state.threads[index];
            if block.logical_id & mask == 0 {
                continue;
            }
            if let Err(pos) = block.queue.binary_search_by(|q| vector.cmp(&q.vector)) {
                block.queue.insert(pos, Queued { vector, acked: false });
            }
            self.refresh(&state, index);
        }
    }

    /// True if `thread` has a queued vector at or above its task priority
    /// and nothing in service
    pub fn has_pending(&self, thread: usize) -> bool {
        thread < HW_THREADS && self.signal.load(Ordering::Acquire) & (1 << thread) != 0
    }

    /// Mark the external-interrupt exception on `thread` if the controller
    /// is signalling it
    ///
    /// Calling it again while the exception is already pending changes
    /// nothing.
    pub fn check_external(&self, thread: &mut ThreadState) -> bool {
        if !self.has_pending(thread.pir as usize) {
            return false;
        }
        if !thread.exceptions.contains(Exceptions::EXTERNAL) {
            iic_debug!("Signalling external interrupt on thread {}", thread.pir);
            thread.exceptions |= Exceptions::EXTERNAL;
        }
        true
    }

    /// Acknowledge the highest eligible vector for `thread`, or return
    /// [`vector::NONE`]
    pub fn acknowledge(&self, thread: usize) -> u8 {
        let mut state = self.state.lock();
        let block = &mut state.threads[thread];
        let priority = block.priority;
        let mut acked = vector::NONE;
        for entry in block.queue.iter_mut() {
            if entry.acked {
                continue;
            }
            if entry.vector < priority {
                break;
            }
            entry.acked = true;
            acked = entry.vector;
            break;
        }
        iic_debug!("Thread {} acknowledged {}", thread, vector::name(acked));
        self.refresh(&state, thread);
        acked
    }

    /// End-of-interrupt: retire the first acknowledged vector
    pub fn eoi(&self, thread: usize) {
        let mut state = self.state.lock();
        Self::retire(&mut state.threads[thread], thread);
        self.refresh(&state, thread);
    }

    fn retire(block: &mut ThreadBlock, thread: usize) {
        match block.queue.iter().position(|q| q.acked) {
            Some(pos) => {
                let done = block.queue.remove(pos);
                iic_debug!("Thread {} EOI {}", thread, vector::name(done.vector));
            }
            None => iic_debug!("Thread {} EOI with nothing in service", thread),
        }
    }

    /// Set the task priority of `thread`
    pub fn set_priority(&self, thread: usize, priority: u8) {
        let mut state = self.state.lock();
        state.threads[thread].priority = priority;
        self.refresh(&state, thread);
    }

    pub fn priority(&self, thread: usize) -> u8 {
        self.state.lock().threads[thread].priority
    }

    /// Number of queued vectors on `thread`, in service or not
    pub fn queued(&self, thread: usize) -> usize {
        self.state.lock().threads[thread].queue.len()
    }

    fn read_register(&self, offset: u64) -> u64 {
        if offset < reg::GLOBAL_BASE {
            let thread = (offset / reg::BLOCK_SIZE) as usize;
            if thread >= HW_THREADS {
                return 0;
            }
            match offset % reg::BLOCK_SIZE {
                reg::ACKNOWLEDGE => return self.acknowledge(thread) as u64,
                reg::LOGICAL_ID => return self.state.lock().threads[thread].logical_id as u64,
                reg::TASK_PRIORITY => return self.priority(thread) as u64,
                _ => {}
            }
        }

        let mut state = self.state.lock();
        let mut value = state.storage.get(&offset).copied().unwrap_or(0);
        if offset == reg::MISC_GENERATION2 {
            // Firmware polls this register for a bit that flips between reads
            if state.misc2_toggle {
                value |= 0x200;
            }
            state.misc2_toggle = !state.misc2_toggle;
        }
        value
    }

    fn write_register(&self, offset: u64, value: u64) {
        if offset < reg::GLOBAL_BASE {
            let thread = (offset / reg::BLOCK_SIZE) as usize;
            if thread < HW_THREADS {
                match offset % reg::BLOCK_SIZE {
                    reg::LOGICAL_ID => {
                        let mut state = self.state.lock();
                        state.threads[thread].logical_id = value as u8;
                        return;
                    }
                    reg::TASK_PRIORITY => return self.set_priority(thread, value as u8),
                    reg::IPI_GENERATION => {
                        return self.raise(value as u8, (value >> 16) as u8);
                    }
                    reg::EOI => return self.eoi(thread),
                    reg::EOI_SET_PRIORITY => {
                        let mut state = self.state.lock();
                        let block = &mut state.threads[thread];
                        Self::retire(block, thread);
                        block.priority = value as u8;
                        self.refresh(&state, thread);
                        return;
                    }
                    _ => {}
                }
            }
        }
        self.state.lock().storage.insert(offset, value);
    }
}

impl Default for Iic {
    fn default() -> Self {
        Self::new()
    }
}

/// Registers are 64-bit big-endian; narrower accesses hit a slice of one
fn register_span(offset: u64, len: usize) -> Result<(u64, usize), MemoryError> {
    let base = offset & !7;
    let shift = (offset & 7) as usize;
    if shift + len > 8 {
        return Err(MemoryError::OutOfRange { addr: offset, len });
    }
    Ok((base, shift))
}

impl Device for Iic {
    fn name(&self) -> &str {
        "IIC"
    }

    fn read(&self, offset: u64, data: &mut [u8]) -> Result<(), MemoryError> {
        let (base, shift) = register_span(offset & (reg::SPAN - 1), data.len())?;
        let value = self.read_register(base).to_be_bytes();
        data.copy_from_slice(&value[shift..shift + data.len()]);
        Ok(())
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<(), MemoryError> {
        let (base, shift) = register_span(offset & (reg::SPAN - 1), data.len())?;
        let value = if data.len() == 8 {
            u64::from_be_bytes([data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7]])
        } else {
            let mut bytes = self.state.lock().storage.get(&base).copied().unwrap_or(0).to_be_bytes();
            bytes[shift..shift + data.len()].copy_from_slice(data);
            u64::from_be_bytes(bytes)
        };
        self.write_register(base, value);
        Ok(())
    }
}
