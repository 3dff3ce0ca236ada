//! Helpers shared by the integration tests

#![allow(dead_code)]

use std::sync::Arc;

use xc_core::config::CpuConfig;
use xc_cpu::Core;
use xc_cpu::Shared;
use xc_memory::{Bus, SystemBus};

pub const RAM_SIZE: u64 = 0x10_0000;
pub const CODE_BASE: u64 = 0x1000;
pub const DATA_BASE: u64 = 0x8000;

/// Core 0 over a private RAM-only bus, thread 0 at [`CODE_BASE`] in
/// hypervisor real mode with HRMOR cleared
pub fn create_test_env(config: CpuConfig) -> Core {
    let bus = Arc::new(SystemBus::with_ram(RAM_SIZE).unwrap());
    let shared = Arc::new(Shared::standalone(bus, config));
    let mut core = Core::new(0, shared);
    core.state.hrmor = 0;
    core.threads[0].nia = CODE_BASE;
    core
}

/// Store `words` big-endian starting at `addr`
pub fn load(core: &Core, addr: u64, words: &[u32]) {
    for (i, word) in words.iter().enumerate() {
        core.shared().bus.write_be32(addr + i as u64 * 4, *word).unwrap();
    }
}

/// Big-endian image of `words`
pub fn to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_be_bytes()).collect()
}

pub fn read_bytes(core: &Core, addr: u64, len: usize) -> Vec<u8> {
    let mut buf = vec![0; len];
    core.shared().bus.read(addr, &mut buf).unwrap();
    buf
}

/// Minimal assembler for the encodings the tests use
pub mod asm {
    fn d_form(primary: u32, rt: u32, ra: u32, imm: i32) -> u32 {
        primary << 26 | rt << 21 | ra << 16 | (imm as u32 & 0xFFFF)
    }

    fn x_form(rt: u32, ra: u32, rb: u32, xo: u32, rc: bool) -> u32 {
        31 << 26 | rt << 21 | ra << 16 | rb << 11 | xo << 1 | rc as u32
    }

    pub const NOP: u32 = 0x6000_0000;

    pub fn addi(rt: u32, ra: u32, si: i32) -> u32 {
        d_form(14, rt, ra, si)
    }

    pub fn addis(rt: u32, ra: u32, si: i32) -> u32 {
        d_form(15, rt, ra, si)
    }

    /// addic.
    pub fn addic_rc(rt: u32, ra: u32, si: i32) -> u32 {
        d_form(13, rt, ra, si)
    }

    pub fn ori(ra: u32, rs: u32, ui: u32) -> u32 {
        d_form(24, rs, ra, ui as i32)
    }

    pub fn cmpwi(bf: u32, ra: u32, si: i32) -> u32 {
        d_form(11, bf << 2, ra, si)
    }

    pub fn lwz(rt: u32, d: i32, ra: u32) -> u32 {
        d_form(32, rt, ra, d)
    }

    pub fn lbz(rt: u32, d: i32, ra: u32) -> u32 {
        d_form(34, rt, ra, d)
    }

    pub fn stw(rs: u32, d: i32, ra: u32) -> u32 {
        d_form(36, rs, ra, d)
    }

    pub fn stb(rs: u32, d: i32, ra: u32) -> u32 {
        d_form(38, rs, ra, d)
    }

    pub fn std(rs: u32, ds: i32, ra: u32) -> u32 {
        d_form(62, rs, ra, ds & !3)
    }

    pub fn add(rt: u32, ra: u32, rb: u32) -> u32 {
        x_form(rt, ra, rb, 266, false)
    }

    /// add.
    pub fn add_rc(rt: u32, ra: u32, rb: u32) -> u32 {
        x_form(rt, ra, rb, 266, true)
    }

    pub fn addc(rt: u32, ra: u32, rb: u32) -> u32 {
        x_form(rt, ra, rb, 10, false)
    }

    pub fn subf(rt: u32, ra: u32, rb: u32) -> u32 {
        x_form(rt, ra, rb, 40, false)
    }

    pub fn mullw(rt: u32, ra: u32, rb: u32) -> u32 {
        x_form(rt, ra, rb, 235, false)
    }

    pub fn and(ra: u32, rs: u32, rb: u32) -> u32 {
        x_form(rs, ra, rb, 28, false)
    }

    pub fn or(ra: u32, rs: u32, rb: u32) -> u32 {
        x_form(rs, ra, rb, 444, false)
    }

    pub fn xor(ra: u32, rs: u32, rb: u32) -> u32 {
        x_form(rs, ra, rb, 316, false)
    }

    pub fn rlwinm(ra: u32, rs: u32, sh: u32, mb: u32, me: u32) -> u32 {
        21 << 26 | rs << 21 | ra << 16 | sh << 11 | mb << 6 | me << 1
    }

    pub fn lwarx(rt: u32, ra: u32, rb: u32) -> u32 {
        x_form(rt, ra, rb, 20, false)
    }

    /// stwcx.
    pub fn stwcx(rs: u32, ra: u32, rb: u32) -> u32 {
        x_form(rs, ra, rb, 150, true)
    }

    pub fn b(offset: i32) -> u32 {
        18 << 26 | (offset as u32 & 0x03FF_FFFC)
    }

    pub fn bc(bo: u32, bi: u32, offset: i32) -> u32 {
        16 << 26 | bo << 21 | bi << 16 | (offset as u32 & 0xFFFC)
    }

    /// Branch if CR0[EQ] is clear
    pub fn bne(offset: i32) -> u32 {
        bc(4, 2, offset)
    }

    /// Decrement CTR, branch while nonzero
    pub fn bdnz(offset: i32) -> u32 {
        bc(16, 0, offset)
    }

    pub fn mtspr(spr: u32, rs: u32) -> u32 {
        31 << 26 | rs << 21 | (spr & 0x1F) << 16 | (spr >> 5) << 11 | 467 << 1
    }

    pub fn mtctr(rs: u32) -> u32 {
        mtspr(9, rs)
    }

    pub fn vaddubs(vd: u32, va: u32, vb: u32) -> u32 {
        4 << 26 | vd << 21 | va << 16 | vb << 11 | 512
    }

    pub fn sc() -> u32 {
        0x4400_0002
    }
}
