//! Fixed-point arithmetic, logical, compare, shift and rotate instructions
//!
//! Carry and overflow follow the current computation mode: out of bit 0 in
//! 64-bit mode, out of bit 32 in 32-bit mode. Results are always written as
//! full 64-bit values.

use crate::cpu::{Cpu, ExecResult};
use crate::decoder::{bits, cmp_fields, d_form, d_form_u, m_form, md_form, mds_form, rc, x_form, xo_form, xs_sh};

/// Mask with IBM bits `mb..=me` set, wrapping when `mb > me`
#[inline]
pub fn mask64(mb: u32, me: u32) -> u64 {
    let begin = u64::MAX >> mb;
    let end = u64::MAX << (63 - me);
    if mb <= me {
        begin & end
    } else {
        begin | end
    }
}

/// Rotate the low word left, replicated into both halves
#[inline]
pub fn rotl32(value: u64, n: u32) -> u64 {
    let word = (value as u32).rotate_left(n) as u64;
    word | (word << 32)
}

/// a + b + carry_in, returning (result, CA, OV) for the current mode
#[inline]
pub fn add_with_carry(sf: bool, a: u64, b: u64, carry_in: bool) -> (u64, bool, bool) {
    let c = carry_in as u64;
    let result = a.wrapping_add(b).wrapping_add(c);
    if sf {
        let (partial, c1) = a.overflowing_add(b);
        let (_, c2) = partial.overflowing_add(c);
        let ov = ((a ^ result) & (b ^ result)) >> 63 != 0;
        (result, c1 || c2, ov)
    } else {
        let wide = (a as u32 as u64) + (b as u32 as u64) + c;
        let (a32, b32, r32) = (a as u32, b as u32, result as u32);
        let ov = ((a32 ^ r32) & (b32 ^ r32)) >> 31 != 0;
        (result, wide > u32::MAX as u64, ov)
    }
}

#[inline]
fn gpr_or_zero(cpu: &Cpu<'_>, ra: usize) -> u64 {
    if ra == 0 { 0 } else { cpu.thread.gpr[ra] }
}

#[inline]
fn record(cpu: &mut Cpu<'_>, rc: bool, value: u64) {
    if rc {
        cpu.thread.update_cr0(value);
    }
}

/// Write an XO-form result: OV if OE, then CR0 if Rc
#[inline]
fn finish_xo(cpu: &mut Cpu<'_>, rt: usize, value: u64, oe: bool, ov: bool, rc: bool) {
    cpu.thread.gpr[rt] = value;
    if oe {
        cpu.thread.set_xer_ov(ov);
    }
    record(cpu, rc, value);
}

/// Shared body of the carrying add family
#[inline]
fn add_family(cpu: &mut Cpu<'_>, word: u32, a: u64, b: u64, carry_in: bool) -> ExecResult {
    let (rt, _, _, oe, rc) = xo_form(word);
    let (result, ca, ov) = add_with_carry(cpu.thread.sf(), a, b, carry_in);
    cpu.thread.set_xer_ca(ca);
    finish_xo(cpu, rt, result, oe, ov, rc);
    Ok(())
}

// Immediate forms

/// addi - Add Immediate
pub fn addi(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rt, ra, d) = d_form(word);
    cpu.thread.gpr[rt] = gpr_or_zero(cpu, ra).wrapping_add(d as i64 as u64);
    Ok(())
}

/// addis - Add Immediate Shifted
pub fn addis(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rt, ra, d) = d_form(word);
    cpu.thread.gpr[rt] = gpr_or_zero(cpu, ra).wrapping_add(((d as i64) << 16) as u64);
    Ok(())
}

/// addic / addic. - Add Immediate Carrying
pub fn addic(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rt, ra, d) = d_form(word);
    let (result, ca, _) = add_with_carry(cpu.thread.sf(), cpu.thread.gpr[ra], d as i64 as u64, false);
    cpu.thread.gpr[rt] = result;
    cpu.thread.set_xer_ca(ca);
    // addic. shares the encoding apart from the primary opcode
    record(cpu, word >> 26 == 13, result);
    Ok(())
}

/// subfic - Subtract From Immediate Carrying
pub fn subfic(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rt, ra, d) = d_form(word);
    let (result, ca, _) = add_with_carry(cpu.thread.sf(), !cpu.thread.gpr[ra], d as i64 as u64, true);
    cpu.thread.gpr[rt] = result;
    cpu.thread.set_xer_ca(ca);
    Ok(())
}

/// mulli - Multiply Low Immediate
pub fn mulli(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rt, ra, d) = d_form(word);
    cpu.thread.gpr[rt] = (cpu.thread.gpr[ra] as i64).wrapping_mul(d as i64) as u64;
    Ok(())
}

/// ori - OR Immediate
pub fn ori(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rs, ra, ui) = d_form_u(word);
    cpu.thread.gpr[ra] = cpu.thread.gpr[rs] | ui as u64;
    Ok(())
}

/// oris - OR Immediate Shifted
pub fn oris(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rs, ra, ui) = d_form_u(word);
    cpu.thread.gpr[ra] = cpu.thread.gpr[rs] | ((ui as u64) << 16);
    Ok(())
}

/// xori - XOR Immediate
pub fn xori(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rs, ra, ui) = d_form_u(word);
    cpu.thread.gpr[ra] = cpu.thread.gpr[rs] ^ ui as u64;
    Ok(())
}

/// xoris - XOR Immediate Shifted
pub fn xoris(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rs, ra, ui) = d_form_u(word);
    cpu.thread.gpr[ra] = cpu.thread.gpr[rs] ^ ((ui as u64) << 16);
    Ok(())
}

/// andi. - AND Immediate
pub fn andi_rc(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rs, ra, ui) = d_form_u(word);
    let value = cpu.thread.gpr[rs] & ui as u64;
    cpu.thread.gpr[ra] = value;
    cpu.thread.update_cr0(value);
    Ok(())
}

/// andis. - AND Immediate Shifted
pub fn andis_rc(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rs, ra, ui) = d_form_u(word);
    let value = cpu.thread.gpr[rs] & ((ui as u64) << 16);
    cpu.thread.gpr[ra] = value;
    cpu.thread.update_cr0(value);
    Ok(())
}

// Compares

fn compare_field(cpu: &mut Cpu<'_>, bf: usize, ordering: std::cmp::Ordering) {
    use std::cmp::Ordering::*;
    let c = match ordering {
        Less => 0b1000,
        Greater => 0b0100,
        Equal => 0b0010,
    };
    let so = cpu.thread.xer_so() as u32;
    cpu.thread.set_cr_field(bf, c | so);
}

/// cmpi - Compare Immediate
pub fn cmpi(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (bf, l) = cmp_fields(word);
    let (_, ra, si) = d_form(word);
    let a = if l { cpu.thread.gpr[ra] as i64 } else { cpu.thread.gpr[ra] as i32 as i64 };
    compare_field(cpu, bf, a.cmp(&(si as i64)));
    Ok(())
}

/// cmpli - Compare Logical Immediate
pub fn cmpli(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (bf, l) = cmp_fields(word);
    let (_, ra, ui) = d_form_u(word);
    let a = if l { cpu.thread.gpr[ra] } else { cpu.thread.gpr[ra] as u32 as u64 };
    compare_field(cpu, bf, a.cmp(&(ui as u64)));
    Ok(())
}

/// cmp - Compare
pub fn cmp(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (bf, l) = cmp_fields(word);
    let (_, ra, rb) = x_form(word);
    let (a, b) = if l {
        (cpu.thread.gpr[ra] as i64, cpu.thread.gpr[rb] as i64)
    } else {
        (cpu.thread.gpr[ra] as i32 as i64, cpu.thread.gpr[rb] as i32 as i64)
    };
    compare_field(cpu, bf, a.cmp(&b));
    Ok(())
}

/// cmpl - Compare Logical
pub fn cmpl(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (bf, l) = cmp_fields(word);
    let (_, ra, rb) = x_form(word);
    let (a, b) = if l {
        (cpu.thread.gpr[ra], cpu.thread.gpr[rb])
    } else {
        (cpu.thread.gpr[ra] as u32 as u64, cpu.thread.gpr[rb] as u32 as u64)
    };
    compare_field(cpu, bf, a.cmp(&b));
    Ok(())
}

// XO-form arithmetic

/// add - Add
pub fn add(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rt, ra, rb, oe, rc) = xo_form(word);
    let (result, _, ov) = add_with_carry(cpu.thread.sf(), cpu.thread.gpr[ra], cpu.thread.gpr[rb], false);
    finish_xo(cpu, rt, result, oe, ov, rc);
    Ok(())
}

/// addc - Add Carrying
pub fn addc(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (_, ra, rb) = x_form(word);
    let (a, b) = (cpu.thread.gpr[ra], cpu.thread.gpr[rb]);
    add_family(cpu, word, a, b, false)
}

/// adde - Add Extended
pub fn adde(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (_, ra, rb) = x_form(word);
    let (a, b, ca) = (cpu.thread.gpr[ra], cpu.thread.gpr[rb], cpu.thread.xer_ca());
    add_family(cpu, word, a, b, ca)
}

/// addze - Add to Zero Extended
pub fn addze(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (_, ra, _) = x_form(word);
    let (a, ca) = (cpu.thread.gpr[ra], cpu.thread.xer_ca());
    add_family(cpu, word, a, 0, ca)
}

/// addme - Add to Minus One Extended
pub fn addme(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (_, ra, _) = x_form(word);
    let (a, ca) = (cpu.thread.gpr[ra], cpu.thread.xer_ca());
    add_family(cpu, word, a, u64::MAX, ca)
}

/// subf - Subtract From
pub fn subf(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rt, ra, rb, oe, rc) = xo_form(word);
    let (result, _, ov) = add_with_carry(cpu.thread.sf(), !cpu.thread.gpr[ra], cpu.thread.gpr[rb], true);
    finish_xo(cpu, rt, result, oe, ov, rc);
    Ok(())
}

/// subfc - Subtract From Carrying
pub fn subfc(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (_, ra, rb) = x_form(word);
    let (a, b) = (!cpu.thread.gpr[ra], cpu.thread.gpr[rb]);
    add_family(cpu, word, a, b, true)
}

/// subfe - Subtract From Extended
pub fn subfe(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (_, ra, rb) = x_form(word);
    let (a, b, ca) = (!cpu.thread.gpr[ra], cpu.thread.gpr[rb], cpu.thread.xer_ca());
    add_family(cpu, word, a, b, ca)
}

/// subfze - Subtract From Zero Extended
pub fn subfze(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (_, ra, _) = x_form(word);
    let (a, ca) = (!cpu.thread.gpr[ra], cpu.thread.xer_ca());
    add_family(cpu, word, a, 0, ca)
}

/// subfme - Subtract From Minus One Extended
pub fn subfme(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (_, ra, _) = x_form(word);
    let (a, ca) = (!cpu.thread.gpr[ra], cpu.thread.xer_ca());
    add_family(cpu, word, a, u64::MAX, ca)
}

/// neg - Negate
pub fn neg(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rt, ra, _, oe, rc) = xo_form(word);
    let a = cpu.thread.gpr[ra];
    let ov = if cpu.thread.sf() { a == 1 << 63 } else { a as u32 == 1 << 31 };
    finish_xo(cpu, rt, a.wrapping_neg(), oe, ov, rc);
    Ok(())
}

/// mullw - Multiply Low Word
pub fn mullw(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rt, ra, rb, oe, rc) = xo_form(word);
    let product = (cpu.thread.gpr[ra] as i32 as i64) * (cpu.thread.gpr[rb] as i32 as i64);
    let ov = product != product as i32 as i64;
    finish_xo(cpu, rt, product as u64, oe, ov, rc);
    Ok(())
}

/// mulld - Multiply Low Doubleword
pub fn mulld(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rt, ra, rb, oe, rc) = xo_form(word);
    let (a, b) = (cpu.thread.gpr[ra] as i64, cpu.thread.gpr[rb] as i64);
    let (product, ov) = a.overflowing_mul(b);
    finish_xo(cpu, rt, product as u64, oe, ov, rc);
    Ok(())
}

/// mulhw - Multiply High Word
pub fn mulhw(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rt, ra, rb, _, rc) = xo_form(word);
    let product = (cpu.thread.gpr[ra] as i32 as i64) * (cpu.thread.gpr[rb] as i32 as i64);
    let value = (product >> 32) as i32 as i64 as u64;
    finish_xo(cpu, rt, value, false, false, rc);
    Ok(())
}

/// mulhwu - Multiply High Word Unsigned
pub fn mulhwu(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rt, ra, rb, _, rc) = xo_form(word);
    let product = (cpu.thread.gpr[ra] as u32 as u64) * (cpu.thread.gpr[rb] as u32 as u64);
    finish_xo(cpu, rt, product >> 32, false, false, rc);
    Ok(())
}

/// mulhd - Multiply High Doubleword
pub fn mulhd(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rt, ra, rb, _, rc) = xo_form(word);
    let product = (cpu.thread.gpr[ra] as i64 as i128) * (cpu.thread.gpr[rb] as i64 as i128);
    finish_xo(cpu, rt, (product >> 64) as u64, false, false, rc);
    Ok(())
}

/// mulhdu - Multiply High Doubleword Unsigned
pub fn mulhdu(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rt, ra, rb, _, rc) = xo_form(word);
    let product = (cpu.thread.gpr[ra] as u128) * (cpu.thread.gpr[rb] as u128);
    finish_xo(cpu, rt, (product >> 64) as u64, false, false, rc);
    Ok(())
}

/// divw - Divide Word
pub fn divw(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rt, ra, rb, oe, rc) = xo_form(word);
    let (a, b) = (cpu.thread.gpr[ra] as i32, cpu.thread.gpr[rb] as i32);
    let (value, ov) = match a.checked_div(b) {
        Some(q) => (q as u32 as u64, false),
        None => (0, true),
    };
    finish_xo(cpu, rt, value, oe, ov, rc);
    Ok(())
}

/// divwu - Divide Word Unsigned
pub fn divwu(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rt, ra, rb, oe, rc) = xo_form(word);
    let (a, b) = (cpu.thread.gpr[ra] as u32, cpu.thread.gpr[rb] as u32);
    let (value, ov) = match a.checked_div(b) {
        Some(q) => (q as u64, false),
        None => (0, true),
    };
    finish_xo(cpu, rt, value, oe, ov, rc);
    Ok(())
}

/// divd - Divide Doubleword
pub fn divd(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rt, ra, rb, oe, rc) = xo_form(word);
    let (a, b) = (cpu.thread.gpr[ra] as i64, cpu.thread.gpr[rb] as i64);
    let (value, ov) = match a.checked_div(b) {
        Some(q) => (q as u64, false),
        None => (0, true),
    };
    finish_xo(cpu, rt, value, oe, ov, rc);
    Ok(())
}

/// divdu - Divide Doubleword Unsigned
pub fn divdu(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rt, ra, rb, oe, rc) = xo_form(word);
    let (a, b) = (cpu.thread.gpr[ra], cpu.thread.gpr[rb]);
    let (value, ov) = match a.checked_div(b) {
        Some(q) => (q, false),
        None => (0, true),
    };
    finish_xo(cpu, rt, value, oe, ov, rc);
    Ok(())
}

// X-form logical

macro_rules! logical {
    ($($(#[$doc:meta])* $name:ident => |$s:ident, $b:ident| $body:expr;)*) => {
        $(
            $(#[$doc])*
            pub fn $name(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
                let (rs, ra, rb) = x_form(word);
                let ($s, $b) = (cpu.thread.gpr[rs], cpu.thread.gpr[rb]);
                let value: u64 = $body;
                cpu.thread.gpr[ra] = value;
                record(cpu, rc(word), value);
                Ok(())
            }
        )*
    };
}

logical! {
    /// and - AND
    and => |s, b| s & b;
    /// andc - AND with Complement
    andc => |s, b| s & !b;
    /// or - OR
    or => |s, b| s | b;
    /// orc - OR with Complement
    orc => |s, b| s | !b;
    /// xor - XOR
    xor => |s, b| s ^ b;
    /// nor - NOR
    nor => |s, b| !(s | b);
    /// nand - NAND
    nand => |s, b| !(s & b);
    /// eqv - Equivalent
    eqv => |s, b| !(s ^ b);
}

macro_rules! unary {
    ($($(#[$doc:meta])* $name:ident => |$s:ident| $body:expr;)*) => {
        $(
            $(#[$doc])*
            pub fn $name(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
                let (rs, ra, _) = x_form(word);
                let $s = cpu.thread.gpr[rs];
                let value: u64 = $body;
                cpu.thread.gpr[ra] = value;
                record(cpu, rc(word), value);
                Ok(())
            }
        )*
    };
}

unary! {
    /// extsb - Extend Sign Byte
    extsb => |s| s as i8 as i64 as u64;
    /// extsh - Extend Sign Halfword
    extsh => |s| s as i16 as i64 as u64;
    /// extsw - Extend Sign Word
    extsw => |s| s as i32 as i64 as u64;
    /// cntlzw - Count Leading Zeros Word
    cntlzw => |s| (s as u32).leading_zeros() as u64;
    /// cntlzd - Count Leading Zeros Doubleword
    cntlzd => |s| s.leading_zeros() as u64;
}

// Shifts

/// slw - Shift Left Word
pub fn slw(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rs, ra, rb) = x_form(word);
    let n = cpu.thread.gpr[rb] & 0x3F;
    let value = if n & 0x20 != 0 { 0 } else { ((cpu.thread.gpr[rs] as u32) << n) as u64 };
    cpu.thread.gpr[ra] = value;
    record(cpu, rc(word), value);
    Ok(())
}

/// srw - Shift Right Word
pub fn srw(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rs, ra, rb) = x_form(word);
    let n = cpu.thread.gpr[rb] & 0x3F;
    let value = if n & 0x20 != 0 { 0 } else { ((cpu.thread.gpr[rs] as u32) >> n) as u64 };
    cpu.thread.gpr[ra] = value;
    record(cpu, rc(word), value);
    Ok(())
}

fn shift_right_algebraic_word(cpu: &mut Cpu<'_>, word: u32, n: u32) {
    let (rs, ra, _) = x_form(word);
    let s = cpu.thread.gpr[rs] as i32;
    let (value, ca) = if n >= 32 {
        (if s < 0 { -1 } else { 0 }, s < 0)
    } else {
        let shifted_out = (s as u32) & ((1u32 << n) - 1);
        (s >> n, s < 0 && shifted_out != 0)
    };
    let value = value as i64 as u64;
    cpu.thread.gpr[ra] = value;
    cpu.thread.set_xer_ca(ca);
    record(cpu, rc(word), value);
}

/// sraw - Shift Right Algebraic Word
pub fn sraw(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (_, _, rb) = x_form(word);
    let n = (cpu.thread.gpr[rb] & 0x3F) as u32;
    shift_right_algebraic_word(cpu, word, n);
    Ok(())
}

/// srawi - Shift Right Algebraic Word Immediate
pub fn srawi(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    shift_right_algebraic_word(cpu, word, bits(word, 16, 20));
    Ok(())
}

/// sld - Shift Left Doubleword
pub fn sld(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rs, ra, rb) = x_form(word);
    let n = cpu.thread.gpr[rb] & 0x7F;
    let value = if n & 0x40 != 0 { 0 } else { cpu.thread.gpr[rs] << n };
    cpu.thread.gpr[ra] = value;
    record(cpu, rc(word), value);
    Ok(())
}

/// srd - Shift Right Doubleword
pub fn srd(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rs, ra, rb) = x_form(word);
    let n = cpu.thread.gpr[rb] & 0x7F;
    let value = if n & 0x40 != 0 { 0 } else { cpu.thread.gpr[rs] >> n };
    cpu.thread.gpr[ra] = value;
    record(cpu, rc(word), value);
    Ok(())
}

fn shift_right_algebraic_double(cpu: &mut Cpu<'_>, word: u32, n: u32) {
    let (rs, ra, _) = x_form(word);
    let s = cpu.thread.gpr[rs] as i64;
    let (value, ca) = if n >= 64 {
        (if s < 0 { -1 } else { 0 }, s < 0)
    } else {
        let shifted_out = (s as u64) & ((1u64 << n) - 1);
        (s >> n, s < 0 && shifted_out != 0)
    };
    cpu.thread.gpr[ra] = value as u64;
    cpu.thread.set_xer_ca(ca);
    record(cpu, rc(word), value as u64);
}

/// srad - Shift Right Algebraic Doubleword
pub fn srad(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (_, _, rb) = x_form(word);
    let n = (cpu.thread.gpr[rb] & 0x7F) as u32;
    shift_right_algebraic_double(cpu, word, n);
    Ok(())
}

/// sradi - Shift Right Algebraic Doubleword Immediate
pub fn sradi(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    shift_right_algebraic_double(cpu, word, xs_sh(word));
    Ok(())
}

// Rotates

/// rlwinm - Rotate Left Word Immediate then AND with Mask
pub fn rlwinm(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rs, ra, sh, mb, me, rc) = m_form(word);
    let value = rotl32(cpu.thread.gpr[rs], sh) & mask64(mb + 32, me + 32);
    cpu.thread.gpr[ra] = value;
    record(cpu, rc, value);
    Ok(())
}

/// rlwnm - Rotate Left Word then AND with Mask
pub fn rlwnm(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rs, ra, rb, mb, me, rc) = m_form(word);
    let n = (cpu.thread.gpr[rb as usize] & 0x1F) as u32;
    let value = rotl32(cpu.thread.gpr[rs], n) & mask64(mb + 32, me + 32);
    cpu.thread.gpr[ra] = value;
    record(cpu, rc, value);
    Ok(())
}

/// rlwimi - Rotate Left Word Immediate then Mask Insert
pub fn rlwimi(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rs, ra, sh, mb, me, rc) = m_form(word);
    let m = mask64(mb + 32, me + 32);
    let value = (rotl32(cpu.thread.gpr[rs], sh) & m) | (cpu.thread.gpr[ra] & !m);
    cpu.thread.gpr[ra] = value;
    record(cpu, rc, value);
    Ok(())
}

/// rldicl - Rotate Left Doubleword Immediate then Clear Left
pub fn rldicl(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rs, ra, sh, mb, rc) = md_form(word);
    let value = cpu.thread.gpr[rs].rotate_left(sh) & mask64(mb, 63);
    cpu.thread.gpr[ra] = value;
    record(cpu, rc, value);
    Ok(())
}

/// rldicr - Rotate Left Doubleword Immediate then Clear Right
pub fn rldicr(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rs, ra, sh, me, rc) = md_form(word);
    let value = cpu.thread.gpr[rs].rotate_left(sh) & mask64(0, me);
    cpu.thread.gpr[ra] = value;
    record(cpu, rc, value);
    Ok(())
}

/// rldic - Rotate Left Doubleword Immediate then Clear
pub fn rldic(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rs, ra, sh, mb, rc) = md_form(word);
    let value = cpu.thread.gpr[rs].rotate_left(sh) & mask64(mb, 63 - sh);
    cpu.thread.gpr[ra] = value;
    record(cpu, rc, value);
    Ok(())
}

/// rldimi - Rotate Left Doubleword Immediate then Mask Insert
pub fn rldimi(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rs, ra, sh, mb, rc) = md_form(word);
    let m = mask64(mb, 63 - sh);
    let value = (cpu.thread.gpr[rs].rotate_left(sh) & m) | (cpu.thread.gpr[ra] & !m);
    cpu.thread.gpr[ra] = value;
    record(cpu, rc, value);
    Ok(())
}

/// rldcl - Rotate Left Doubleword then Clear Left
pub fn rldcl(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rs, ra, rb, mb, rc) = mds_form(word);
    let n = (cpu.thread.gpr[rb] & 0x3F) as u32;
    let value = cpu.thread.gpr[rs].rotate_left(n) & mask64(mb, 63);
    cpu.thread.gpr[ra] = value;
    record(cpu, rc, value);
    Ok(())
}

/// rldcr - Rotate Left Doubleword then Clear Right
pub fn rldcr(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (rs, ra, rb, me, rc) = mds_form(word);
    let n = (cpu.thread.gpr[rb] & 0x3F) as u32;
    let value = cpu.thread.gpr[rs].rotate_left(n) & mask64(0, me);
    cpu.thread.gpr[ra] = value;
    record(cpu, rc, value);
    Ok(())
}
