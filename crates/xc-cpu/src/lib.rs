//! Xenon CPU emulation
//!
//! The Xenon is a three-core, two-way SMT 64-bit PowerPC with VMX128
//! extensions. This crate provides the decoder, the interpreter, a block
//! compiler sharing the interpreter's semantics, address translation,
//! exception delivery, the interrupt controller, and the per-core control
//! loops that tie them together.

pub mod core;
pub mod cpu;
pub mod decoder;
pub mod exceptions;
pub mod float;
pub mod iic;
pub mod instructions;
pub mod interpreter;
pub mod jit;
pub mod mmu;
pub mod opcodes;
pub mod regs;
pub mod system;
pub mod thread;
pub mod timebase;
pub mod vmx;

pub use crate::core::{Core, CoreCommand, CoreHandle, CoreRunState, ThreadMask};
pub use cpu::{Cpu, ExecResult, Fault, Shared};
pub use exceptions::Exceptions;
pub use iic::Iic;
pub use jit::{Jit, JitStats};
pub use opcodes::Opcode;
pub use system::{Segment, Xenon};
pub use thread::{CoreState, ThreadState};
