//! Load and store instructions
//!
//! Every access goes through [`Cpu`], so translation faults surface as
//! pending DSI/alignment exceptions and stores snoop reservations and the
//! code watch. Update forms write RA only after the access succeeded.

use crate::cpu::{Cpu, ExecResult, Fault};
use crate::decoder::{d_form, ds_form, x_form};
use crate::float::{double_to_single, single_to_double};
use crate::mmu::{self, Access};
use crate::vmx::Vector128;

/// Cache line size used by dcbz
pub const CACHE_LINE: u64 = 128;

#[inline]
fn ea_update_d(cpu: &Cpu<'_>, ra: usize, d: i64) -> u64 {
    cpu.thread.mask_ea(cpu.thread.gpr[ra].wrapping_add(d as u64))
}

#[inline]
fn ea_update_x(cpu: &Cpu<'_>, ra: usize, rb: usize) -> u64 {
    cpu.thread.mask_ea(cpu.thread.gpr[ra].wrapping_add(cpu.thread.gpr[rb]))
}

/// Loads and stores generated per addressing form
///
/// `$read` maps `(cpu, ea)` to the loaded register value, `$write` stores a
/// register value at `ea`.
macro_rules! load_d {
    ($($(#[$doc:meta])* $name:ident, $update:expr, |$cpu:ident, $ea:ident| $read:expr;)*) => {
        $(
            $(#[$doc])*
            pub fn $name($cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
                let (rt, ra, d) = d_form(word);
                let $ea = if $update { ea_update_d($cpu, ra, d as i64) } else { $cpu.ea_d(ra, d as i64) };
                let value: u64 = $read;
                $cpu.thread.gpr[rt] = value;
                if $update {
                    $cpu.thread.gpr[ra] = $ea;
                }
                Ok(())
            }
        )*
    };
}

macro_rules! load_x {
    ($($(#[$doc:meta])* $name:ident, $update:expr, |$cpu:ident, $ea:ident| $read:expr;)*) => {
        $(
            $(#[$doc])*
            pub fn $name($cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
                let (rt, ra, rb) = x_form(word);
                let $ea = if $update { ea_update_x($cpu, ra, rb) } else { $cpu.ea_x(ra, rb) };
                let value: u64 = $read;
                $cpu.thread.gpr[rt] = value;
                if $update {
                    $cpu.thread.gpr[ra] = $ea;
                }
                Ok(())
            }
        )*
    };
}

macro_rules! store_d {
    ($($(#[$doc:meta])* $name:ident, $update:expr, |$cpu:ident, $ea:ident, $value:ident| $write:expr;)*) => {
        $(
            $(#[$doc])*
            pub fn $name($cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
                let (rs, ra, d) = d_form(word);
                let $ea = if $update { ea_update_d($cpu, ra, d as i64) } else { $cpu.ea_d(ra, d as i64) };
                let $value = $cpu.thread.gpr[rs];
                $write;
                if $update {
                    $cpu.thread.gpr[ra] = $ea;
                }
                Ok(())
            }
        )*
    };
}

macro_rules! store_x {
    ($($(#[$doc:meta])* $name:ident, $update:expr, |$cpu:ident, $ea:ident, $value:ident| $write:expr;)*) => {
        $(
            $(#[$doc])*
            pub fn $name($cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
                let (rs, ra, rb) = x_form(word);
                let $ea = if $update { ea_update_x($cpu, ra, rb) } else { $cpu.ea_x(ra, rb) };
                let $value = $cpu.thread.gpr[rs];
                $write;
                if $update {
                    $cpu.thread.gpr[ra] = $ea;
                }
                Ok(())
            }
        )*
    };
}

load_d! {
    /// lbz - Load Byte and Zero
    lbz, false, |cpu, ea| cpu.read_u8(ea)? as u64;
    /// lbzu - Load Byte and Zero with Update
    lbzu, true, |cpu, ea| cpu.read_u8(ea)? as u64;
    /// lhz - Load Halfword and Zero
    lhz, false, |cpu, ea| cpu.read_u16(ea)? as u64;
    /// lhzu - Load Halfword and Zero with Update
    lhzu, true, |cpu, ea| cpu.read_u16(ea)? as u64;
    /// lha - Load Halfword Algebraic
    lha, false, |cpu, ea| cpu.read_u16(ea)? as i16 as i64 as u64;
    /// lhau - Load Halfword Algebraic with Update
    lhau, true, |cpu, ea| cpu.read_u16(ea)? as i16 as i64 as u64;
    /// lwz - Load Word and Zero
    lwz, false, |cpu, ea| cpu.read_u32(ea)? as u64;
    /// lwzu - Load Word and Zero with Update
    lwzu, true, |cpu, ea| cpu.read_u32(ea)? as u64;
}

/// ld / ldu / lwa - DS-form loads
pub fn load_ds(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rt, ra, ds) = ds_form(word);
    let kind = word & 3;
    let update = kind == 1;
    let ea = if update { ea_update_d(cpu, ra, ds) } else { cpu.ea_d(ra, ds) };
    let value = match kind {
        2 => cpu.read_u32(ea)? as i32 as i64 as u64,
        _ => cpu.read_u64(ea)?,
    };
    cpu.thread.gpr[rt] = value;
    if update {
        cpu.thread.gpr[ra] = ea;
    }
    Ok(())
}

/// std / stdu - DS-form stores
pub fn store_ds(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rs, ra, ds) = ds_form(word);
    let update = word & 3 == 1;
    let ea = if update { ea_update_d(cpu, ra, ds) } else { cpu.ea_d(ra, ds) };
    let value = cpu.thread.gpr[rs];
    cpu.write_u64(ea, value)?;
    if update {
        cpu.thread.gpr[ra] = ea;
    }
    Ok(())
}

load_x! {
    /// lbzx - Load Byte and Zero Indexed
    lbzx, false, |cpu, ea| cpu.read_u8(ea)? as u64;
    /// lbzux - Load Byte and Zero with Update Indexed
    lbzux, true, |cpu, ea| cpu.read_u8(ea)? as u64;
    /// lhzx - Load Halfword and Zero Indexed
    lhzx, false, |cpu, ea| cpu.read_u16(ea)? as u64;
    /// lhzux - Load Halfword and Zero with Update Indexed
    lhzux, true, |cpu, ea| cpu.read_u16(ea)? as u64;
    /// lhax - Load Halfword Algebraic Indexed
    lhax, false, |cpu, ea| cpu.read_u16(ea)? as i16 as i64 as u64;
    /// lhaux - Load Halfword Algebraic with Update Indexed
    lhaux, true, |cpu, ea| cpu.read_u16(ea)? as i16 as i64 as u64;
    /// lwzx - Load Word and Zero Indexed
    lwzx, false, |cpu, ea| cpu.read_u32(ea)? as u64;
    /// lwzux - Load Word and Zero with Update Indexed
    lwzux, true, |cpu, ea| cpu.read_u32(ea)? as u64;
    /// lwax - Load Word Algebraic Indexed
    lwax, false, |cpu, ea| cpu.read_u32(ea)? as i32 as i64 as u64;
    /// lwaux - Load Word Algebraic with Update Indexed
    lwaux, true, |cpu, ea| cpu.read_u32(ea)? as i32 as i64 as u64;
    /// ldx - Load Doubleword Indexed
    ldx, false, |cpu, ea| cpu.read_u64(ea)?;
    /// ldux - Load Doubleword with Update Indexed
    ldux, true, |cpu, ea| cpu.read_u64(ea)?;
    /// lhbrx - Load Halfword Byte-Reverse Indexed
    lhbrx, false, |cpu, ea| cpu.read_u16(ea)?.swap_bytes() as u64;
    /// lwbrx - Load Word Byte-Reverse Indexed
    lwbrx, false, |cpu, ea| cpu.read_u32(ea)?.swap_bytes() as u64;
    /// ldbrx - Load Doubleword Byte-Reverse Indexed
    ldbrx, false, |cpu, ea| cpu.read_u64(ea)?.swap_bytes();
}

store_d! {
    /// stb - Store Byte
    stb, false, |cpu, ea, value| cpu.write_u8(ea, value as u8)?;
    /// stbu - Store Byte with Update
    stbu, true, |cpu, ea, value| cpu.write_u8(ea, value as u8)?;
    /// sth - Store Halfword
    sth, false, |cpu, ea, value| cpu.write_u16(ea, value as u16)?;
    /// sthu - Store Halfword with Update
    sthu, true, |cpu, ea, value| cpu.write_u16(ea, value as u16)?;
    /// stw - Store Word
    stw, false, |cpu, ea, value| cpu.write_u32(ea, value as u32)?;
    /// stwu - Store Word with Update
    stwu, true, |cpu, ea, value| cpu.write_u32(ea, value as u32)?;
}

store_x! {
    /// stbx - Store Byte Indexed
    stbx, false, |cpu, ea, value| cpu.write_u8(ea, value as u8)?;
    /// stbux - Store Byte with Update Indexed
    stbux, true, |cpu, ea, value| cpu.write_u8(ea, value as u8)?;
    /// sthx - Store Halfword Indexed
    sthx, false, |cpu, ea, value| cpu.write_u16(ea, value as u16)?;
    /// sthux - Store Halfword with Update Indexed
    sthux, true, |cpu, ea, value| cpu.write_u16(ea, value as u16)?;
    /// stwx - Store Word Indexed
    stwx, false, |cpu, ea, value| cpu.write_u32(ea, value as u32)?;
    /// stwux - Store Word with Update Indexed
    stwux, true, |cpu, ea, value| cpu.write_u32(ea, value as u32)?;
    /// stdx - Store Doubleword Indexed
    stdx, false, |cpu, ea, value| cpu.write_u64(ea, value)?;
    /// stdux - Store Doubleword with Update Indexed
    stdux, true, |cpu, ea, value| cpu.write_u64(ea, value)?;
    /// sthbrx - Store Halfword Byte-Reverse Indexed
    sthbrx, false, |cpu, ea, value| cpu.write_u16(ea, (value as u16).swap_bytes())?;
    /// stwbrx - Store Word Byte-Reverse Indexed
    stwbrx, false, |cpu, ea, value| cpu.write_u32(ea, (value as u32).swap_bytes())?;
    /// stdbrx - Store Doubleword Byte-Reverse Indexed
    stdbrx, false, |cpu, ea, value| cpu.write_u64(ea, value.swap_bytes())?;
}

/// lmw - Load Multiple Word
pub fn lmw(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rt, ra, d) = d_form(word);
    let mut ea = cpu.ea_d(ra, d as i64);
    for r in rt..32 {
        cpu.thread.gpr[r] = cpu.read_u32(ea)? as u64;
        ea = cpu.thread.mask_ea(ea.wrapping_add(4));
    }
    Ok(())
}

/// stmw - Store Multiple Word
pub fn stmw(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rs, ra, d) = d_form(word);
    let mut ea = cpu.ea_d(ra, d as i64);
    for r in rs..32 {
        let value = cpu.thread.gpr[r] as u32;
        cpu.write_u32(ea, value)?;
        ea = cpu.thread.mask_ea(ea.wrapping_add(4));
    }
    Ok(())
}

// Reservations

fn load_reserve(cpu: &mut Cpu<'_>, word: u32, len: u64) -> Result<u64, Fault> {
    let (_, ra, rb) = x_form(word);
    let ea = cpu.ea_x(ra, rb);
    let real = cpu.translate_aligned(ea, len, Access::Read)?;
    let bus = &cpu.shared.bus;
    let result = cpu.shared.reservations.load_reserve(cpu.thread.reservation_slot(), real, || {
        if len == 8 {
            bus.read_be64(real)
        } else {
            bus.read_be32(real).map(u64::from)
        }
    });
    // Unmapped space reads as the fill pattern and holds no reservation
    Ok(result.unwrap_or(if len == 8 { u64::MAX } else { u32::MAX as u64 }))
}

fn store_conditional(cpu: &mut Cpu<'_>, word: u32, len: u64) -> ExecResult {
    let (rs, ra, rb) = x_form(word);
    let ea = cpu.ea_x(ra, rb);
    let real = cpu.translate_aligned(ea, len, Access::Write)?;
    let value = cpu.thread.gpr[rs];
    let bus = &cpu.shared.bus;
    let result = cpu.shared.reservations.store_conditional(cpu.thread.reservation_slot(), real, len, || {
        if len == 8 {
            bus.write_be64(real, value)
        } else {
            bus.write_be32(real, value as u32)
        }
    });
    let stored = match result {
        Ok(stored) => stored,
        Err(e) => {
            tracing::warn!("Conditional store to unmapped 0x{:x}: {}", real, e);
            true
        }
    };
    if stored {
        cpu.shared.code_watch.note_write(real, len);
    }
    let so = cpu.thread.xer_so() as u32;
    let eq = if stored { 0b0010 } else { 0 };
    cpu.thread.set_cr_field(0, eq | so);
    Ok(())
}

/// lwarx - Load Word and Reserve Indexed
pub fn lwarx(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rt, _, _) = x_form(word);
    cpu.thread.gpr[rt] = load_reserve(cpu, word, 4)?;
    Ok(())
}

/// ldarx - Load Doubleword and Reserve Indexed
pub fn ldarx(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rt, _, _) = x_form(word);
    cpu.thread.gpr[rt] = load_reserve(cpu, word, 8)?;
    Ok(())
}

/// stwcx. - Store Word Conditional Indexed
pub fn stwcx(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    store_conditional(cpu, word, 4)
}

/// stdcx. - Store Doubleword Conditional Indexed
pub fn stdcx(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    store_conditional(cpu, word, 8)
}

// Floating-point loads and stores

fn fp_ea_d(cpu: &mut Cpu<'_>, word: u32, update: bool) -> Result<(usize, usize, u64), Fault> {
    cpu.require_fp()?;
    let (frt, ra, d) = d_form(word);
    let ea = if update { ea_update_d(cpu, ra, d as i64) } else { cpu.ea_d(ra, d as i64) };
    Ok((frt, ra, ea))
}

fn fp_ea_x(cpu: &mut Cpu<'_>, word: u32, update: bool) -> Result<(usize, usize, u64), Fault> {
    cpu.require_fp()?;
    let (frt, ra, rb) = x_form(word);
    let ea = if update { ea_update_x(cpu, ra, rb) } else { cpu.ea_x(ra, rb) };
    Ok((frt, ra, ea))
}

macro_rules! fp_access {
    ($($(#[$doc:meta])* $name:ident, $ea:ident, $update:expr, $body:ident;)*) => {
        $(
            $(#[$doc])*
            pub fn $name(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
                let (fr, ra, ea) = $ea(cpu, word, $update)?;
                $body(cpu, fr, ea)?;
                if $update {
                    cpu.thread.gpr[ra] = ea;
                }
                Ok(())
            }
        )*
    };
}

fn load_single(cpu: &mut Cpu<'_>, frt: usize, ea: u64) -> ExecResult {
    cpu.thread.fpr[frt] = single_to_double(cpu.read_u32(ea)?);
    Ok(())
}

fn load_double(cpu: &mut Cpu<'_>, frt: usize, ea: u64) -> ExecResult {
    cpu.thread.fpr[frt] = cpu.read_u64(ea)?;
    Ok(())
}

fn store_single(cpu: &mut Cpu<'_>, frs: usize, ea: u64) -> ExecResult {
    let value = double_to_single(cpu.thread.fpr[frs]);
    cpu.write_u32(ea, value)
}

fn store_double(cpu: &mut Cpu<'_>, frs: usize, ea: u64) -> ExecResult {
    let value = cpu.thread.fpr[frs];
    cpu.write_u64(ea, value)
}

fn store_integer_word(cpu: &mut Cpu<'_>, frs: usize, ea: u64) -> ExecResult {
    let value = cpu.thread.fpr[frs] as u32;
    cpu.write_u32(ea, value)
}

fp_access! {
    /// lfs - Load Floating-Point Single
    lfs, fp_ea_d, false, load_single;
    /// lfsu - Load Floating-Point Single with Update
    lfsu, fp_ea_d, true, load_single;
    /// lfd - Load Floating-Point Double
    lfd, fp_ea_d, false, load_double;
    /// lfdu - Load Floating-Point Double with Update
    lfdu, fp_ea_d, true, load_double;
    /// stfs - Store Floating-Point Single
    stfs, fp_ea_d, false, store_single;
    /// stfsu - Store Floating-Point Single with Update
    stfsu, fp_ea_d, true, store_single;
    /// stfd - Store Floating-Point Double
    stfd, fp_ea_d, false, store_double;
    /// stfdu - Store Floating-Point Double with Update
    stfdu, fp_ea_d, true, store_double;
    /// lfsx - Load Floating-Point Single Indexed
    lfsx, fp_ea_x, false, load_single;
    /// lfsux - Load Floating-Point Single with Update Indexed
    lfsux, fp_ea_x, true, load_single;
    /// lfdx - Load Floating-Point Double Indexed
    lfdx, fp_ea_x, false, load_double;
    /// lfdux - Load Floating-Point Double with Update Indexed
    lfdux, fp_ea_x, true, load_double;
    /// stfsx - Store Floating-Point Single Indexed
    stfsx, fp_ea_x, false, store_single;
    /// stfsux - Store Floating-Point Single with Update Indexed
    stfsux, fp_ea_x, true, store_single;
    /// stfdx - Store Floating-Point Double Indexed
    stfdx, fp_ea_x, false, store_double;
    /// stfdux - Store Floating-Point Double with Update Indexed
    stfdux, fp_ea_x, true, store_double;
    /// stfiwx - Store Floating-Point as Integer Word Indexed
    stfiwx, fp_ea_x, false, store_integer_word;
}

// Vector loads and stores, shared with the VMX128 forms

/// Permute control vector for lvsl/lvsr
pub fn shift_control(sh: u8, right: bool) -> Vector128 {
    let start = if right { 16 - sh } else { sh };
    let mut bytes = [0u8; 16];
    for (i, b) in bytes.iter_mut().enumerate() {
        *b = start + i as u8;
    }
    Vector128::from_bytes(bytes)
}

/// Load the quadword containing `ea` into `vd`
pub fn load_vector(cpu: &mut Cpu<'_>, vd: usize, ea: u64) -> ExecResult {
    cpu.require_vec()?;
    cpu.thread.vr[vd] = cpu.read_vector(ea)?;
    Ok(())
}

/// Store `vs` to the quadword containing `ea`
pub fn store_vector(cpu: &mut Cpu<'_>, vs: usize, ea: u64) -> ExecResult {
    cpu.require_vec()?;
    let value = cpu.thread.vr[vs];
    cpu.write_vector(ea, &value)
}

/// Load the element of `size` bytes at `ea` into its lane of `vd`
pub fn load_element(cpu: &mut Cpu<'_>, vd: usize, ea: u64, size: u64) -> ExecResult {
    cpu.require_vec()?;
    let ea = ea & !(size - 1);
    let lane = (ea & 0xF) as usize;
    let mut buf = [0u8; 4];
    cpu.read_bytes(ea, &mut buf[..size as usize])?;
    cpu.thread.vr[vd].bytes[lane..lane + size as usize].copy_from_slice(&buf[..size as usize]);
    Ok(())
}

/// Store the lane of `vs` addressed by `ea`, `size` bytes wide
pub fn store_element(cpu: &mut Cpu<'_>, vs: usize, ea: u64, size: u64) -> ExecResult {
    cpu.require_vec()?;
    let ea = ea & !(size - 1);
    let lane = (ea & 0xF) as usize;
    let value = cpu.thread.vr[vs];
    cpu.write_bytes(ea, &value.bytes[lane..lane + size as usize])
}

/// Load the bytes from `ea` to the end of its quadword, left-justified
pub fn load_left(cpu: &mut Cpu<'_>, vd: usize, ea: u64) -> ExecResult {
    cpu.require_vec()?;
    let sh = (ea & 0xF) as usize;
    let mut bytes = [0u8; 16];
    cpu.read_bytes(ea, &mut bytes[..16 - sh])?;
    cpu.thread.vr[vd] = Vector128::from_bytes(bytes);
    Ok(())
}

/// Load the bytes of the quadword before `ea`, right-justified
pub fn load_right(cpu: &mut Cpu<'_>, vd: usize, ea: u64) -> ExecResult {
    cpu.require_vec()?;
    let sh = (ea & 0xF) as usize;
    let mut bytes = [0u8; 16];
    if sh != 0 {
        cpu.read_bytes(ea & !0xF, &mut bytes[16 - sh..])?;
    }
    cpu.thread.vr[vd] = Vector128::from_bytes(bytes);
    Ok(())
}

/// Store the leading bytes of `vs` from `ea` to the end of its quadword
pub fn store_left(cpu: &mut Cpu<'_>, vs: usize, ea: u64) -> ExecResult {
    cpu.require_vec()?;
    let sh = (ea & 0xF) as usize;
    let value = cpu.thread.vr[vs];
    cpu.write_bytes(ea, &value.bytes[..16 - sh])
}

/// Store the trailing bytes of `vs` to the quadword before `ea`
pub fn store_right(cpu: &mut Cpu<'_>, vs: usize, ea: u64) -> ExecResult {
    cpu.require_vec()?;
    let sh = (ea & 0xF) as usize;
    if sh == 0 {
        return Ok(());
    }
    let value = cpu.thread.vr[vs];
    cpu.write_bytes(ea & !0xF, &value.bytes[16 - sh..])
}

macro_rules! vector_x {
    ($($(#[$doc:meta])* $name:ident => |$cpu:ident, $vr:ident, $ea:ident| $body:expr;)*) => {
        $(
            $(#[$doc])*
            pub fn $name($cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
                let ($vr, ra, rb) = x_form(word);
                let $ea = $cpu.ea_x(ra, rb);
                $body
            }
        )*
    };
}

vector_x! {
    /// lvx - Load Vector Indexed
    lvx => |cpu, vd, ea| load_vector(cpu, vd, ea);
    /// lvxl - Load Vector Indexed LRU
    lvxl => |cpu, vd, ea| load_vector(cpu, vd, ea);
    /// stvx - Store Vector Indexed
    stvx => |cpu, vs, ea| store_vector(cpu, vs, ea);
    /// stvxl - Store Vector Indexed LRU
    stvxl => |cpu, vs, ea| store_vector(cpu, vs, ea);
    /// lvebx - Load Vector Element Byte Indexed
    lvebx => |cpu, vd, ea| load_element(cpu, vd, ea, 1);
    /// lvehx - Load Vector Element Halfword Indexed
    lvehx => |cpu, vd, ea| load_element(cpu, vd, ea, 2);
    /// lvewx - Load Vector Element Word Indexed
    lvewx => |cpu, vd, ea| load_element(cpu, vd, ea, 4);
    /// stvebx - Store Vector Element Byte Indexed
    stvebx => |cpu, vs, ea| store_element(cpu, vs, ea, 1);
    /// stvehx - Store Vector Element Halfword Indexed
    stvehx => |cpu, vs, ea| store_element(cpu, vs, ea, 2);
    /// stvewx - Store Vector Element Word Indexed
    stvewx => |cpu, vs, ea| store_element(cpu, vs, ea, 4);
    /// lvlx - Load Vector Left Indexed
    lvlx => |cpu, vd, ea| load_left(cpu, vd, ea);
    /// lvrx - Load Vector Right Indexed
    lvrx => |cpu, vd, ea| load_right(cpu, vd, ea);
    /// stvlx - Store Vector Left Indexed
    stvlx => |cpu, vs, ea| store_left(cpu, vs, ea);
    /// stvrx - Store Vector Right Indexed
    stvrx => |cpu, vs, ea| store_right(cpu, vs, ea);
}

/// lvsl - Load Vector for Shift Left
pub fn lvsl(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_vec()?;
    let (vd, ra, rb) = x_form(word);
    let ea = cpu.ea_x(ra, rb);
    cpu.thread.vr[vd] = shift_control((ea & 0xF) as u8, false);
    Ok(())
}

/// lvsr - Load Vector for Shift Right
pub fn lvsr(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_vec()?;
    let (vd, ra, rb) = x_form(word);
    let ea = cpu.ea_x(ra, rb);
    cpu.thread.vr[vd] = shift_control((ea & 0xF) as u8, true);
    Ok(())
}

// Cache management

/// dcbz - Data Cache Block Set to Zero (also dcbz128)
pub fn dcbz(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (_, ra, rb) = x_form(word);
    let ea = cpu.ea_x(ra, rb) & !(CACHE_LINE - 1);
    cpu.write_bytes(ea, &[0u8; CACHE_LINE as usize])
}

/// dcbst, dcbf, dcbt, dcbtst - no data cache is modelled
pub fn cache_hint(_cpu: &mut Cpu<'_>, _word: u32) -> ExecResult {
    Ok(())
}

/// icbi - Instruction Cache Block Invalidate
///
/// Queues the real page for the core's block cache, which drops the blocks
/// compiled from it once the instruction retires.
pub fn icbi(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (_, ra, rb) = x_form(word);
    let ea = cpu.ea_x(ra, rb);
    let real = mmu::translate(cpu, ea, Access::Read)?;
    cpu.core.icbi_pages.push(real);
    Ok(())
}

/// dcbi - Data Cache Block Invalidate
pub fn dcbi(cpu: &mut Cpu<'_>, _word: u32) -> ExecResult {
    cpu.require_supervisor()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_control() {
        let left = shift_control(3, false);
        assert_eq!(left.bytes[0], 3);
        assert_eq!(left.bytes[15], 18);
        let right = shift_control(3, true);
        assert_eq!(right.bytes[0], 13);
        assert_eq!(right.bytes[15], 28);
    }
}
