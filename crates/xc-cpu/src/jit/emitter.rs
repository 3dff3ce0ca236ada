//! Native lowering per opcode
//!
//! [`EMITTERS`] is indexed by opcode discriminant, alongside the
//! interpreter's handler table. An emitter either lowers the whole
//! instruction and returns true, or returns false before emitting anything;
//! the block then calls the interpreter handler for that one instruction.
//! Forms an emitter leaves alone include overflow-enabled arithmetic,
//! divides, and moves of privileged or side-effecting registers.

use cranelift_codegen::ir::condcodes::IntCC;
use cranelift_codegen::ir::{types, InstBuilder, Value};
use once_cell::sync::Lazy;

use crate::decoder::{b_form, bits, cmp_fields, d_form, d_form_u, ds_form, i_form, m_form, md_form, mds_form, oe, rc, spr_field, x_form, xl_form, xs_sh};
use crate::instructions::branch::bo;
use crate::instructions::integer::mask64;
use crate::opcodes::Opcode;
use crate::regs::{spr, xer};

use super::codegen::{Lowering, Reg};

/// Lowers one instruction word
pub type Emitter = fn(&mut Lowering<'_>, u32) -> bool;

static EMITTERS: Lazy<Vec<Option<Emitter>>> = Lazy::new(|| Opcode::ALL.iter().map(|&op| emitter(op)).collect());

/// Native emitter for a decoded opcode, if there is one
#[inline]
pub fn emitter_for(op: Opcode) -> Option<Emitter> {
    EMITTERS[op as usize]
}

/// Number of opcodes with a native emitter
pub fn native_opcodes() -> usize {
    EMITTERS.iter().filter(|e| e.is_some()).count()
}

/// Lower `word` natively, returning false when the handler must run instead
pub fn lower(l: &mut Lowering<'_>, op: Opcode, word: u32) -> bool {
    match emitter_for(op) {
        Some(emit) if emit(l, word) => {
            l.finish();
            true
        }
        _ => false,
    }
}

fn emitter(op: Opcode) -> Option<Emitter> {
    use Opcode::*;

    let emit: Emitter = match op {
        Nop => |_, _| true,

        // Immediate arithmetic and logical
        Addi => addi,
        Addis => addis,
        Addic | AddicRc => addic,
        Subfic => subfic,
        Mulli => mulli,
        Ori => ori,
        Oris => oris,
        Xori => xori,
        Xoris => xoris,
        AndiRc => andi_rc,
        AndisRc => andis_rc,

        // Compares
        Cmpi => cmpi,
        Cmpli => cmpli,
        Cmp => cmp,
        Cmpl => cmpl,

        // XO-form arithmetic
        Add => add,
        Subf => subf,
        Neg => neg,
        Mullw => mullw,
        Mulld => mulld,
        Mulhw => mulhw,
        Mulhwu => mulhwu,
        Mulhd => mulhd,
        Mulhdu => mulhdu,
        Addc => addc,
        Adde => adde,
        Addze => addze,
        Addme => addme,
        Subfc => subfc,
        Subfe => subfe,
        Subfze => subfze,
        Subfme => subfme,

        // Logical
        And => and,
        Andc => andc,
        Or => or,
        Orc => orc,
        Xor => xor,
        Nor => nor,
        Nand => nand,
        Eqv => eqv,
        Extsb => extsb,
        Extsh => extsh,
        Extsw => extsw,
        Cntlzw => cntlzw,
        Cntlzd => cntlzd,

        // Shifts and rotates
        Slw => slw,
        Srw => srw,
        Sld => sld,
        Srd => srd,
        Sraw => sraw,
        Srawi => srawi,
        Srad => srad,
        Sradi => sradi,
        Rlwinm => rlwinm,
        Rlwnm => rlwnm,
        Rlwimi => rlwimi,
        Rldicl => rldicl,
        Rldicr => rldicr,
        Rldic => rldic,
        Rldimi => rldimi,
        Rldcl => rldcl,
        Rldcr => rldcr,

        // Loads
        Lbz => lbz,
        Lbzu => lbzu,
        Lhz => lhz,
        Lhzu => lhzu,
        Lha => lha,
        Lhau => lhau,
        Lwz => lwz,
        Lwzu => lwzu,
        Ld => ld,
        Ldu => ldu,
        Lwa => lwa,
        Lbzx => lbzx,
        Lbzux => lbzux,
        Lhzx => lhzx,
        Lhzux => lhzux,
        Lhax => lhax,
        Lhaux => lhaux,
        Lwzx => lwzx,
        Lwzux => lwzux,
        Lwax => lwax,
        Lwaux => lwaux,
        Ldx => ldx,
        Ldux => ldux,
        Lhbrx => lhbrx,
        Lwbrx => lwbrx,
        Ldbrx => ldbrx,

        // Stores
        Stb => stb,
        Stbu => stbu,
        Sth => sth,
        Sthu => sthu,
        Stw => stw,
        Stwu => stwu,
        Std => std,
        Stdu => stdu,
        Stbx => stbx,
        Stbux => stbux,
        Sthx => sthx,
        Sthux => sthux,
        Stwx => stwx,
        Stwux => stwux,
        Stdx => stdx,
        Stdux => stdux,

        // Branches
        B => b,
        Bc => bc,
        Bclr => bclr,
        Bcctr => bcctr,

        // Register moves
        Mfspr => mfspr,
        Mtspr => mtspr,
        Mfcr => mfcr,
        Mtcrf => mtcrf,

        _ => return None,
    };
    Some(emit)
}

// Immediate forms

fn addi(l: &mut Lowering<'_>, word: u32) -> bool {
    let (rt, ra, d) = d_form(word);
    let base = l.gpr_or_zero(ra);
    let value = l.ins().iadd_imm(base, d as i64);
    l.set_gpr(rt, value);
    true
}

fn addis(l: &mut Lowering<'_>, word: u32) -> bool {
    let (rt, ra, d) = d_form(word);
    let base = l.gpr_or_zero(ra);
    let value = l.ins().iadd_imm(base, (d as i64) << 16);
    l.set_gpr(rt, value);
    true
}

/// `a + b + carry_in` with CA for the current mode
fn add_carrying(l: &mut Lowering<'_>, a: Value, b: Value, carry_in: Value) -> (Value, Value) {
    let sum = l.ins().iadd(a, b);
    let c1 = l.ins().icmp(IntCC::UnsignedLessThan, sum, a);
    let result = l.ins().iadd(sum, carry_in);
    let c2 = l.ins().icmp(IntCC::UnsignedLessThan, result, sum);
    let ca64 = l.ins().bor(c1, c2);

    let a32 = l.zext32(a);
    let b32 = l.zext32(b);
    let wide = l.ins().iadd(a32, b32);
    let wide = l.ins().iadd(wide, carry_in);
    let high = l.ins().ushr_imm(wide, 32);
    let ca32 = l.ins().icmp_imm(IntCC::NotEqual, high, 0);

    let sf = l.sf();
    let ca = l.ins().select(sf, ca64, ca32);
    (result, ca)
}

fn addic(l: &mut Lowering<'_>, word: u32) -> bool {
    let (rt, ra, d) = d_form(word);
    let a = l.gpr(ra);
    let b = l.imm(d as i64 as u64);
    let zero = l.imm(0);
    let (result, ca) = add_carrying(l, a, b, zero);
    l.set_gpr(rt, result);
    l.set_ca(ca);
    l.record(word >> 26 == 13, result);
    true
}

fn subfic(l: &mut Lowering<'_>, word: u32) -> bool {
    let (rt, ra, d) = d_form(word);
    let a = l.gpr(ra);
    let not_a = l.ins().bnot(a);
    let b = l.imm(d as i64 as u64);
    let one = l.imm(1);
    let (result, ca) = add_carrying(l, not_a, b, one);
    l.set_gpr(rt, result);
    l.set_ca(ca);
    true
}

fn mulli(l: &mut Lowering<'_>, word: u32) -> bool {
    let (rt, ra, d) = d_form(word);
    let a = l.gpr(ra);
    let value = l.ins().imul_imm(a, d as i64);
    l.set_gpr(rt, value);
    true
}

fn logical_imm(l: &mut Lowering<'_>, word: u32, shift: u32, f: fn(&mut Lowering<'_>, Value, i64) -> Value, record: bool) -> bool {
    let (rs, ra, ui) = d_form_u(word);
    let s = l.gpr(rs);
    let value = f(l, s, (ui as i64) << shift);
    l.set_gpr(ra, value);
    l.record(record, value);
    true
}

fn ori(l: &mut Lowering<'_>, word: u32) -> bool {
    logical_imm(l, word, 0, |l, s, imm| l.ins().bor_imm(s, imm), false)
}

fn oris(l: &mut Lowering<'_>, word: u32) -> bool {
    logical_imm(l, word, 16, |l, s, imm| l.ins().bor_imm(s, imm), false)
}

fn xori(l: &mut Lowering<'_>, word: u32) -> bool {
    logical_imm(l, word, 0, |l, s, imm| l.ins().bxor_imm(s, imm), false)
}

fn xoris(l: &mut Lowering<'_>, word: u32) -> bool {
    logical_imm(l, word, 16, |l, s, imm| l.ins().bxor_imm(s, imm), false)
}

fn andi_rc(l: &mut Lowering<'_>, word: u32) -> bool {
    logical_imm(l, word, 0, |l, s, imm| l.ins().band_imm(s, imm), true)
}

fn andis_rc(l: &mut Lowering<'_>, word: u32) -> bool {
    logical_imm(l, word, 16, |l, s, imm| l.ins().band_imm(s, imm), true)
}

// Compares

/// Write LT/GT/EQ and SO into CR field `bf`
fn compare(l: &mut Lowering<'_>, bf: usize, a: Value, b: Value, signed: bool) {
    let (lt_cc, gt_cc) = if signed {
        (IntCC::SignedLessThan, IntCC::SignedGreaterThan)
    } else {
        (IntCC::UnsignedLessThan, IntCC::UnsignedGreaterThan)
    };
    let lt = l.ins().icmp(lt_cc, a, b);
    let gt = l.ins().icmp(gt_cc, a, b);
    let (less, greater, equal) = (l.imm32(0b1000), l.imm32(0b0100), l.imm32(0b0010));
    let c = l.ins().select(gt, greater, equal);
    let c = l.ins().select(lt, less, c);

    let xer = l.reg(Reg::Xer);
    let so = l.ins().ushr_imm(xer, xer::SO.trailing_zeros() as i64);
    let so = l.ins().band_imm(so, 1);
    let so = l.ins().ireduce(types::I32, so);
    let field = l.ins().bor(c, so);
    l.set_cr_field(bf, field);
}

fn cmpi(l: &mut Lowering<'_>, word: u32) -> bool {
    let (bf, wide) = cmp_fields(word);
    let (_, ra, si) = d_form(word);
    let a = l.gpr(ra);
    let a = if wide { a } else { l.sext32(a) };
    let b = l.imm(si as i64 as u64);
    compare(l, bf, a, b, true);
    true
}

fn cmpli(l: &mut Lowering<'_>, word: u32) -> bool {
    let (bf, wide) = cmp_fields(word);
    let (_, ra, ui) = d_form_u(word);
    let a = l.gpr(ra);
    let a = if wide { a } else { l.zext32(a) };
    let b = l.imm(ui as u64);
    compare(l, bf, a, b, false);
    true
}

fn cmp(l: &mut Lowering<'_>, word: u32) -> bool {
    let (bf, wide) = cmp_fields(word);
    let (_, ra, rb) = x_form(word);
    let (a, b) = (l.gpr(ra), l.gpr(rb));
    let (a, b) = if wide { (a, b) } else { (l.sext32(a), l.sext32(b)) };
    compare(l, bf, a, b, true);
    true
}

fn cmpl(l: &mut Lowering<'_>, word: u32) -> bool {
    let (bf, wide) = cmp_fields(word);
    let (_, ra, rb) = x_form(word);
    let (a, b) = (l.gpr(ra), l.gpr(rb));
    let (a, b) = if wide { (a, b) } else { (l.zext32(a), l.zext32(b)) };
    compare(l, bf, a, b, false);
    true
}

// XO-form arithmetic. Overflow-enabled forms stay with the interpreter.

fn binary(l: &mut Lowering<'_>, word: u32, f: fn(&mut Lowering<'_>, Value, Value) -> Value) -> bool {
    if oe(word) {
        return false;
    }
    let (rt, ra, rb) = x_form(word);
    let (a, b) = (l.gpr(ra), l.gpr(rb));
    let value = f(l, a, b);
    l.set_gpr(rt, value);
    l.record(rc(word), value);
    true
}

fn add(l: &mut Lowering<'_>, word: u32) -> bool {
    binary(l, word, |l, a, b| l.ins().iadd(a, b))
}

fn subf(l: &mut Lowering<'_>, word: u32) -> bool {
    binary(l, word, |l, a, b| l.ins().isub(b, a))
}

fn neg(l: &mut Lowering<'_>, word: u32) -> bool {
    binary(l, word, |l, a, _| l.ins().ineg(a))
}

fn mullw(l: &mut Lowering<'_>, word: u32) -> bool {
    binary(l, word, |l, a, b| {
        let (a, b) = (l.sext32(a), l.sext32(b));
        l.ins().imul(a, b)
    })
}

fn mulld(l: &mut Lowering<'_>, word: u32) -> bool {
    binary(l, word, |l, a, b| l.ins().imul(a, b))
}

// The high multiplies have no OE bit; bit 21 is reserved
fn mulhw(l: &mut Lowering<'_>, word: u32) -> bool {
    binary(l, word & !0x400, |l, a, b| {
        let (a, b) = (l.sext32(a), l.sext32(b));
        let product = l.ins().imul(a, b);
        l.ins().sshr_imm(product, 32)
    })
}

fn mulhwu(l: &mut Lowering<'_>, word: u32) -> bool {
    binary(l, word & !0x400, |l, a, b| {
        let (a, b) = (l.zext32(a), l.zext32(b));
        let product = l.ins().imul(a, b);
        l.ins().ushr_imm(product, 32)
    })
}

fn mulhd(l: &mut Lowering<'_>, word: u32) -> bool {
    binary(l, word & !0x400, |l, a, b| l.ins().smulhi(a, b))
}

fn mulhdu(l: &mut Lowering<'_>, word: u32) -> bool {
    binary(l, word & !0x400, |l, a, b| l.ins().umulhi(a, b))
}

/// Carrying add family: RA (optionally complemented), an addend and the
/// carry in, as selected by the instruction
fn carrying(l: &mut Lowering<'_>, word: u32, complement: bool, addend: Addend, carry: Carry) -> bool {
    if oe(word) {
        return false;
    }
    let (rt, ra, rb) = x_form(word);
    let a = l.gpr(ra);
    let a = if complement { l.ins().bnot(a) } else { a };
    let b = match addend {
        Addend::Rb => l.gpr(rb),
        Addend::Zero => l.imm(0),
        Addend::MinusOne => l.imm(u64::MAX),
    };
    let carry_in = match carry {
        Carry::Zero => l.imm(0),
        Carry::One => l.imm(1),
        Carry::Xer => l.xer_ca(),
    };
    let (result, ca) = add_carrying(l, a, b, carry_in);
    l.set_ca(ca);
    l.set_gpr(rt, result);
    l.record(rc(word), result);
    true
}

#[derive(Clone, Copy)]
enum Addend {
    Rb,
    Zero,
    MinusOne,
}

#[derive(Clone, Copy)]
enum Carry {
    Zero,
    One,
    Xer,
}

fn addc(l: &mut Lowering<'_>, word: u32) -> bool {
    carrying(l, word, false, Addend::Rb, Carry::Zero)
}

fn adde(l: &mut Lowering<'_>, word: u32) -> bool {
    carrying(l, word, false, Addend::Rb, Carry::Xer)
}

fn addze(l: &mut Lowering<'_>, word: u32) -> bool {
    carrying(l, word, false, Addend::Zero, Carry::Xer)
}

fn addme(l: &mut Lowering<'_>, word: u32) -> bool {
    carrying(l, word, false, Addend::MinusOne, Carry::Xer)
}

fn subfc(l: &mut Lowering<'_>, word: u32) -> bool {
    carrying(l, word, true, Addend::Rb, Carry::One)
}

fn subfe(l: &mut Lowering<'_>, word: u32) -> bool {
    carrying(l, word, true, Addend::Rb, Carry::Xer)
}

fn subfze(l: &mut Lowering<'_>, word: u32) -> bool {
    carrying(l, word, true, Addend::Zero, Carry::Xer)
}

fn subfme(l: &mut Lowering<'_>, word: u32) -> bool {
    carrying(l, word, true, Addend::MinusOne, Carry::Xer)
}

// X-form logical, RS and RB into RA

fn logical(l: &mut Lowering<'_>, word: u32, f: fn(&mut Lowering<'_>, Value, Value) -> Value) -> bool {
    let (rs, ra, rb) = x_form(word);
    let (s, b) = (l.gpr(rs), l.gpr(rb));
    let value = f(l, s, b);
    l.set_gpr(ra, value);
    l.record(rc(word), value);
    true
}

fn and(l: &mut Lowering<'_>, word: u32) -> bool {
    logical(l, word, |l, s, b| l.ins().band(s, b))
}

fn andc(l: &mut Lowering<'_>, word: u32) -> bool {
    logical(l, word, |l, s, b| l.ins().band_not(s, b))
}

fn or(l: &mut Lowering<'_>, word: u32) -> bool {
    logical(l, word, |l, s, b| l.ins().bor(s, b))
}

fn orc(l: &mut Lowering<'_>, word: u32) -> bool {
    logical(l, word, |l, s, b| l.ins().bor_not(s, b))
}

fn xor(l: &mut Lowering<'_>, word: u32) -> bool {
    logical(l, word, |l, s, b| l.ins().bxor(s, b))
}

fn nor(l: &mut Lowering<'_>, word: u32) -> bool {
    logical(l, word, |l, s, b| {
        let v = l.ins().bor(s, b);
        l.ins().bnot(v)
    })
}

fn nand(l: &mut Lowering<'_>, word: u32) -> bool {
    logical(l, word, |l, s, b| {
        let v = l.ins().band(s, b);
        l.ins().bnot(v)
    })
}

fn eqv(l: &mut Lowering<'_>, word: u32) -> bool {
    logical(l, word, |l, s, b| l.ins().bxor_not(s, b))
}

fn extsb(l: &mut Lowering<'_>, word: u32) -> bool {
    logical(l, word, |l, s, _| {
        let v = l.ins().ireduce(types::I8, s);
        l.ins().sextend(types::I64, v)
    })
}

fn extsh(l: &mut Lowering<'_>, word: u32) -> bool {
    logical(l, word, |l, s, _| {
        let v = l.ins().ireduce(types::I16, s);
        l.ins().sextend(types::I64, v)
    })
}

fn extsw(l: &mut Lowering<'_>, word: u32) -> bool {
    logical(l, word, |l, s, _| l.sext32(s))
}

fn cntlzw(l: &mut Lowering<'_>, word: u32) -> bool {
    logical(l, word, |l, s, _| {
        let v = l.ins().ireduce(types::I32, s);
        let v = l.ins().clz(v);
        l.ins().uextend(types::I64, v)
    })
}

fn cntlzd(l: &mut Lowering<'_>, word: u32) -> bool {
    logical(l, word, |l, s, _| l.ins().clz(s))
}

// Shifts

fn slw(l: &mut Lowering<'_>, word: u32) -> bool {
    logical(l, word, |l, s, n| {
        let s = l.ins().ireduce(types::I32, s);
        let amount = l.ins().ireduce(types::I32, n);
        let shifted = l.ins().ishl(s, amount);
        let shifted = l.ins().uextend(types::I64, shifted);
        let big = l.ins().band_imm(n, 0x20);
        let zero = l.imm(0);
        l.ins().select(big, zero, shifted)
    })
}

fn srw(l: &mut Lowering<'_>, word: u32) -> bool {
    logical(l, word, |l, s, n| {
        let s = l.ins().ireduce(types::I32, s);
        let amount = l.ins().ireduce(types::I32, n);
        let shifted = l.ins().ushr(s, amount);
        let shifted = l.ins().uextend(types::I64, shifted);
        let big = l.ins().band_imm(n, 0x20);
        let zero = l.imm(0);
        l.ins().select(big, zero, shifted)
    })
}

fn sld(l: &mut Lowering<'_>, word: u32) -> bool {
    logical(l, word, |l, s, n| {
        let shifted = l.ins().ishl(s, n);
        let big = l.ins().band_imm(n, 0x40);
        let zero = l.imm(0);
        l.ins().select(big, zero, shifted)
    })
}

fn srd(l: &mut Lowering<'_>, word: u32) -> bool {
    logical(l, word, |l, s, n| {
        let shifted = l.ins().ushr(s, n);
        let big = l.ins().band_imm(n, 0x40);
        let zero = l.imm(0);
        l.ins().select(big, zero, shifted)
    })
}

/// Arithmetic right shift of the low `width` bits of RS by `n` (I64,
/// already masked to twice the width), setting CA when a negative value
/// shifts out one bits
fn shift_right_algebraic(l: &mut Lowering<'_>, word: u32, n: Value, width: u32) -> bool {
    let (rs, ra, _) = x_form(word);
    let s = l.gpr(rs);
    let s = if width == 32 { l.sext32(s) } else { s };
    let big = l.ins().icmp_imm(IntCC::UnsignedGreaterThanOrEqual, n, width as i64);
    let top = l.imm(width as u64 - 1);
    let amount = l.ins().select(big, top, n);
    let value = l.ins().sshr(s, amount);

    // Bits shifted out of the source width
    let one = l.imm(1);
    let below = l.ins().ishl(one, amount);
    let below = l.ins().iadd_imm(below, -1);
    let all = l.imm(u64::MAX);
    let lost_mask = l.ins().select(big, all, below);
    let lost = l.ins().band(s, lost_mask);
    let lost = l.ins().icmp_imm(IntCC::NotEqual, lost, 0);
    let negative = l.ins().icmp_imm(IntCC::SignedLessThan, s, 0);
    let ca = l.ins().band(negative, lost);

    l.set_gpr(ra, value);
    l.set_ca(ca);
    l.record(rc(word), value);
    true
}

fn sraw(l: &mut Lowering<'_>, word: u32) -> bool {
    let (_, _, rb) = x_form(word);
    let n = l.gpr(rb);
    let n = l.ins().band_imm(n, 0x3F);
    shift_right_algebraic(l, word, n, 32)
}

fn srawi(l: &mut Lowering<'_>, word: u32) -> bool {
    let n = l.imm(bits(word, 16, 20) as u64);
    shift_right_algebraic(l, word, n, 32)
}

fn srad(l: &mut Lowering<'_>, word: u32) -> bool {
    let (_, _, rb) = x_form(word);
    let n = l.gpr(rb);
    let n = l.ins().band_imm(n, 0x7F);
    shift_right_algebraic(l, word, n, 64)
}

fn sradi(l: &mut Lowering<'_>, word: u32) -> bool {
    let n = l.imm(xs_sh(word) as u64);
    shift_right_algebraic(l, word, n, 64)
}

// Rotates

/// Rotate the low word left by `n` (I32) and replicate it into both halves
fn rotl32(l: &mut Lowering<'_>, value: Value, n: Value) -> Value {
    let w = l.ins().ireduce(types::I32, value);
    let w = l.ins().rotl(w, n);
    let low = l.ins().uextend(types::I64, w);
    let high = l.ins().ishl_imm(low, 32);
    l.ins().bor(low, high)
}

/// Write `rotated & mask`, merged into RA's other bits when inserting
fn masked(l: &mut Lowering<'_>, ra: usize, rotated: Value, mask: u64, insert: bool, rc: bool) -> bool {
    let kept = l.ins().band_imm(rotated, mask as i64);
    let value = if insert {
        let old = l.gpr(ra);
        let old = l.ins().band_imm(old, !mask as i64);
        l.ins().bor(kept, old)
    } else {
        kept
    };
    l.set_gpr(ra, value);
    l.record(rc, value);
    true
}

fn rlwinm(l: &mut Lowering<'_>, word: u32) -> bool {
    let (rs, ra, sh, mb, me, rc) = m_form(word);
    let s = l.gpr(rs);
    let n = l.imm32(sh);
    let rotated = rotl32(l, s, n);
    masked(l, ra, rotated, mask64(mb + 32, me + 32), false, rc)
}

fn rlwnm(l: &mut Lowering<'_>, word: u32) -> bool {
    let (rs, ra, rb, mb, me, rc) = m_form(word);
    let s = l.gpr(rs);
    let n = l.gpr(rb as usize);
    let n = l.ins().ireduce(types::I32, n);
    let n = l.ins().band_imm(n, 0x1F);
    let rotated = rotl32(l, s, n);
    masked(l, ra, rotated, mask64(mb + 32, me + 32), false, rc)
}

fn rlwimi(l: &mut Lowering<'_>, word: u32) -> bool {
    let (rs, ra, sh, mb, me, rc) = m_form(word);
    let s = l.gpr(rs);
    let n = l.imm32(sh);
    let rotated = rotl32(l, s, n);
    masked(l, ra, rotated, mask64(mb + 32, me + 32), true, rc)
}

fn rotate_double(l: &mut Lowering<'_>, word: u32, mask: impl Fn(u32, u32) -> u64, insert: bool) -> bool {
    let (rs, ra, sh, mbe, rc) = md_form(word);
    let s = l.gpr(rs);
    let rotated = l.ins().rotl_imm(s, sh as i64);
    masked(l, ra, rotated, mask(sh, mbe), insert, rc)
}

fn rldicl(l: &mut Lowering<'_>, word: u32) -> bool {
    rotate_double(l, word, |_, mb| mask64(mb, 63), false)
}

fn rldicr(l: &mut Lowering<'_>, word: u32) -> bool {
    rotate_double(l, word, |_, me| mask64(0, me), false)
}

fn rldic(l: &mut Lowering<'_>, word: u32) -> bool {
    rotate_double(l, word, |sh, mb| mask64(mb, 63 - sh), false)
}

fn rldimi(l: &mut Lowering<'_>, word: u32) -> bool {
    rotate_double(l, word, |sh, mb| mask64(mb, 63 - sh), true)
}

fn rotate_double_by_register(l: &mut Lowering<'_>, word: u32, clear_right: bool) -> bool {
    let (rs, ra, rb, mbe, rc) = mds_form(word);
    let s = l.gpr(rs);
    let n = l.gpr(rb);
    let n = l.ins().band_imm(n, 0x3F);
    let rotated = l.ins().rotl(s, n);
    let mask = if clear_right { mask64(0, mbe) } else { mask64(mbe, 63) };
    masked(l, ra, rotated, mask, false, rc)
}

fn rldcl(l: &mut Lowering<'_>, word: u32) -> bool {
    rotate_double_by_register(l, word, false)
}

fn rldcr(l: &mut Lowering<'_>, word: u32) -> bool {
    rotate_double_by_register(l, word, true)
}

// Loads and stores

#[derive(Clone, Copy)]
enum Ea {
    /// (RA|0) + displacement, or RA + displacement when updating
    D(i64),
    /// (RA|0) + (RB), or RA + RB when updating
    X,
}

#[derive(Clone, Copy)]
enum Extend {
    Zero,
    Sign,
    Reverse,
}

fn effective_address(l: &mut Lowering<'_>, word: u32, ea: Ea, update: bool) -> Value {
    let (_, ra, rb) = x_form(word);
    let base = if update { l.gpr(ra) } else { l.gpr_or_zero(ra) };
    let sum = match ea {
        Ea::D(d) => l.ins().iadd_imm(base, d),
        Ea::X => {
            let index = l.gpr(rb);
            l.ins().iadd(base, index)
        }
    };
    l.mask_ea(sum)
}

fn load(l: &mut Lowering<'_>, word: u32, ea: Ea, size: u32, extend: Extend, update: bool) -> bool {
    let (rt, ra, _) = x_form(word);
    let addr = effective_address(l, word, ea, update);
    let raw = l.read(addr, size);
    let narrow = match size {
        1 => Some(types::I8),
        2 => Some(types::I16),
        4 => Some(types::I32),
        _ => None,
    };
    let value = match (extend, narrow) {
        (Extend::Zero, _) => raw,
        (Extend::Sign, Some(ty)) => {
            let v = l.ins().ireduce(ty, raw);
            l.ins().sextend(types::I64, v)
        }
        (Extend::Reverse, Some(ty)) => {
            let v = l.ins().ireduce(ty, raw);
            let v = l.ins().bswap(v);
            l.ins().uextend(types::I64, v)
        }
        (Extend::Reverse, None) => l.ins().bswap(raw),
        (Extend::Sign, None) => raw,
    };
    l.set_gpr(rt, value);
    if update {
        l.set_gpr(ra, addr);
    }
    true
}

fn store(l: &mut Lowering<'_>, word: u32, ea: Ea, size: u32, update: bool) -> bool {
    let (rs, ra, _) = x_form(word);
    let addr = effective_address(l, word, ea, update);
    let value = l.gpr(rs);
    l.write(addr, value, size);
    if update {
        l.set_gpr(ra, addr);
    }
    true
}

macro_rules! d_loads {
    ($($name:ident => ($size:expr, $extend:ident, $update:expr);)*) => {
        $(
            fn $name(l: &mut Lowering<'_>, word: u32) -> bool {
                let (_, _, d) = d_form(word);
                load(l, word, Ea::D(d as i64), $size, Extend::$extend, $update)
            }
        )*
    };
}

macro_rules! ds_loads {
    ($($name:ident => ($size:expr, $extend:ident, $update:expr);)*) => {
        $(
            fn $name(l: &mut Lowering<'_>, word: u32) -> bool {
                let (_, _, ds) = ds_form(word);
                load(l, word, Ea::D(ds), $size, Extend::$extend, $update)
            }
        )*
    };
}

macro_rules! x_loads {
    ($($name:ident => ($size:expr, $extend:ident, $update:expr);)*) => {
        $(
            fn $name(l: &mut Lowering<'_>, word: u32) -> bool {
                load(l, word, Ea::X, $size, Extend::$extend, $update)
            }
        )*
    };
}

macro_rules! d_stores {
    ($($name:ident => ($size:expr, $update:expr);)*) => {
        $(
            fn $name(l: &mut Lowering<'_>, word: u32) -> bool {
                let (_, _, d) = d_form(word);
                store(l, word, Ea::D(d as i64), $size, $update)
            }
        )*
    };
}

macro_rules! x_stores {
    ($($name:ident => ($size:expr, $update:expr);)*) => {
        $(
            fn $name(l: &mut Lowering<'_>, word: u32) -> bool {
                store(l, word, Ea::X, $size, $update)
            }
        )*
    };
}

d_loads! {
    lbz => (1, Zero, false);
    lbzu => (1, Zero, true);
    lhz => (2, Zero, false);
    lhzu => (2, Zero, true);
    lha => (2, Sign, false);
    lhau => (2, Sign, true);
    lwz => (4, Zero, false);
    lwzu => (4, Zero, true);
}

ds_loads! {
    ld => (8, Zero, false);
    ldu => (8, Zero, true);
    lwa => (4, Sign, false);
}

x_loads! {
    lbzx => (1, Zero, false);
    lbzux => (1, Zero, true);
    lhzx => (2, Zero, false);
    lhzux => (2, Zero, true);
    lhax => (2, Sign, false);
    lhaux => (2, Sign, true);
    lwzx => (4, Zero, false);
    lwzux => (4, Zero, true);
    lwax => (4, Sign, false);
    lwaux => (4, Sign, true);
    ldx => (8, Zero, false);
    ldux => (8, Zero, true);
    lhbrx => (2, Reverse, false);
    lwbrx => (4, Reverse, false);
    ldbrx => (8, Reverse, false);
}

d_stores! {
    stb => (1, false);
    stbu => (1, true);
    sth => (2, false);
    sthu => (2, true);
    stw => (4, false);
    stwu => (4, true);
}

fn std(l: &mut Lowering<'_>, word: u32) -> bool {
    let (_, _, ds) = ds_form(word);
    store(l, word, Ea::D(ds), 8, false)
}

fn stdu(l: &mut Lowering<'_>, word: u32) -> bool {
    let (_, _, ds) = ds_form(word);
    store(l, word, Ea::D(ds), 8, true)
}

x_stores! {
    stbx => (1, false);
    stbux => (1, true);
    sthx => (2, false);
    sthux => (2, true);
    stwx => (4, false);
    stwux => (4, true);
    stdx => (8, false);
    stdux => (8, true);
}

// Branches

fn link(l: &mut Lowering<'_>, cia: Value) {
    let next = l.ins().iadd_imm(cia, 4);
    let next = l.mask_ea(next);
    l.set_reg(Reg::Lr, next);
}

/// Branch condition from BO and BI, decrementing CTR when BO asks for it
///
/// `None` means the branch is unconditional.
fn condition(l: &mut Lowering<'_>, bo: u32, bi: u32, use_ctr: bool) -> Option<Value> {
    let mut taken = None;
    if use_ctr && bo & bo::IGNORE_CTR == 0 {
        let ctr = l.reg(Reg::Ctr);
        let ctr = l.ins().iadd_imm(ctr, -1);
        l.set_reg(Reg::Ctr, ctr);
        let sf = l.sf();
        let low = l.zext32(ctr);
        let ctr = l.ins().select(sf, ctr, low);
        let cc = if bo & bo::CTR_ZERO != 0 { IntCC::Equal } else { IntCC::NotEqual };
        taken = Some(l.ins().icmp_imm(cc, ctr, 0));
    }
    if bo & bo::IGNORE_CR == 0 {
        let cr = l.reg(Reg::Cr);
        let mask = l.imm32(0x8000_0000 >> bi);
        let bit = l.ins().band(cr, mask);
        let cc = if bo & bo::CR_TRUE != 0 { IntCC::NotEqual } else { IntCC::Equal };
        let cond = l.ins().icmp_imm(cc, bit, 0);
        taken = Some(match taken {
            Some(ctr_ok) => l.ins().band(ctr_ok, cond),
            None => cond,
        });
    }
    taken
}

/// Set NIA to `target` when `taken` holds
fn branch_to(l: &mut Lowering<'_>, taken: Option<Value>, target: Value) {
    let target = l.mask_ea(target);
    let nia = match taken {
        Some(taken) => {
            let sequential = l.reg(Reg::Nia);
            l.ins().select(taken, target, sequential)
        }
        None => target,
    };
    l.set_reg(Reg::Nia, nia);
}

fn b(l: &mut Lowering<'_>, word: u32) -> bool {
    let (li, aa, lk) = i_form(word);
    let cia = l.reg(Reg::Cia);
    let target = if aa { l.imm(li as u64) } else { l.ins().iadd_imm(cia, li) };
    if lk {
        link(l, cia);
    }
    branch_to(l, None, target);
    true
}

fn bc(l: &mut Lowering<'_>, word: u32) -> bool {
    let (bo, bi, bd, aa, lk) = b_form(word);
    let taken = condition(l, bo, bi, true);
    let cia = l.reg(Reg::Cia);
    if lk {
        link(l, cia);
    }
    let target = if aa { l.imm(bd as u64) } else { l.ins().iadd_imm(cia, bd) };
    branch_to(l, taken, target);
    true
}

fn bclr(l: &mut Lowering<'_>, word: u32) -> bool {
    let (bo, bi, _, lk) = xl_form(word);
    // Target is read before LK overwrites LR
    let lr = l.reg(Reg::Lr);
    let target = l.ins().band_imm(lr, !3);
    let taken = condition(l, bo, bi, true);
    if lk {
        let cia = l.reg(Reg::Cia);
        link(l, cia);
    }
    branch_to(l, taken, target);
    true
}

fn bcctr(l: &mut Lowering<'_>, word: u32) -> bool {
    let (bo, bi, _, lk) = xl_form(word);
    let ctr = l.reg(Reg::Ctr);
    let target = l.ins().band_imm(ctr, !3);
    let taken = condition(l, bo, bi, false);
    if lk {
        let cia = l.reg(Reg::Cia);
        link(l, cia);
    }
    branch_to(l, taken, target);
    true
}

// Register moves. Only the unprivileged branch and fixed-point registers
// are lowered; everything else goes through the handler.

fn user_register(word: u32) -> Option<Reg> {
    match spr_field(word) {
        spr::LR => Some(Reg::Lr),
        spr::CTR => Some(Reg::Ctr),
        spr::XER => Some(Reg::Xer),
        _ => None,
    }
}

fn mfspr(l: &mut Lowering<'_>, word: u32) -> bool {
    let Some(reg) = user_register(word) else {
        return false;
    };
    let (rt, _, _) = x_form(word);
    let value = l.reg(reg);
    l.set_gpr(rt, value);
    true
}

fn mtspr(l: &mut Lowering<'_>, word: u32) -> bool {
    let Some(reg) = user_register(word) else {
        return false;
    };
    let (rs, _, _) = x_form(word);
    let value = l.gpr(rs);
    let value = if reg == Reg::Xer { l.zext32(value) } else { value };
    l.set_reg(reg, value);
    true
}

fn mfcr(l: &mut Lowering<'_>, word: u32) -> bool {
    let (rt, _, _) = x_form(word);
    let cr = l.reg(Reg::Cr);
    let value = l.ins().uextend(types::I64, cr);
    l.set_gpr(rt, value);
    true
}

fn mtcrf(l: &mut Lowering<'_>, word: u32) -> bool {
    let (rs, _, _) = x_form(word);
    let fxm = bits(word, 12, 19);
    let mask = (0..8).filter(|field| fxm & (0x80 >> field) != 0).fold(0u32, |m, field| m | 0xF000_0000 >> (field * 4));
    let s = l.gpr(rs);
    let s = l.ins().ireduce(types::I32, s);
    let mask_value = l.imm32(mask);
    let inserted = l.ins().band(s, mask_value);
    let cr = l.reg(Reg::Cr);
    let keep = l.imm32(!mask);
    let kept = l.ins().band(cr, keep);
    let cr = l.ins().bor(kept, inserted);
    l.set_reg(Reg::Cr, cr);
    true
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use xc_core::config::CpuConfig;
    use xc_memory::{Bus, SystemBus};

    use super::*;
    use crate::cpu::{Cpu, Shared};
    use crate::decoder;
    use crate::interpreter;
    use crate::jit::Jit;
    use crate::regs::msr;
    use crate::thread::{CoreState, ThreadState};

    fn create_test_env() -> (ThreadState, CoreState, Shared) {
        let bus = Arc::new(SystemBus::with_ram(0x10000).unwrap());
        let shared = Shared::standalone(bus, CpuConfig::default());
        let mut core = CoreState::new(0);
        core.hrmor = 0;
        let mut thread = ThreadState::new(0, 0);
        thread.nia = 0x1000;
        (thread, core, shared)
    }

    /// Run `word` as a one-instruction block and through the interpreter
    /// from the same starting state, then compare the results
    fn assert_matches_interpreter(word: u32, setup: impl Fn(&mut ThreadState)) {
        let op = decoder::decode(word);
        assert!(emitter_for(op).is_some(), "{} should have an emitter", op.mnemonic());

        let (mut jit_thread, mut jit_core, jit_shared) = create_test_env();
        let (mut ref_thread, mut ref_core, ref_shared) = create_test_env();
        for (thread, shared) in [(&mut jit_thread, &jit_shared), (&mut ref_thread, &ref_shared)] {
            setup(thread);
            shared.bus.write_be32(0x1000, word).unwrap();
            shared.bus.write_be64(0x2000, 0x8081_8283_8485_8687).unwrap();
        }

        let mut jit = Jit::new();
        let executed = jit.run_block(&mut Cpu::new(&mut jit_thread, &mut jit_core, &jit_shared), 1).unwrap();
        interpreter::step(&mut Cpu::new(&mut ref_thread, &mut ref_core, &ref_shared)).unwrap();

        assert_eq!(executed, 1);
        assert_eq!(jit.stats().native_instructions, 1, "{} ran through its handler", op.mnemonic());
        assert_eq!(jit_thread.gpr, ref_thread.gpr, "{}", op.mnemonic());
        assert_eq!(jit_thread.nia, ref_thread.nia, "{}", op.mnemonic());
        assert_eq!(jit_thread.lr, ref_thread.lr, "{}", op.mnemonic());
        assert_eq!(jit_thread.ctr, ref_thread.ctr, "{}", op.mnemonic());
        assert_eq!(jit_thread.xer, ref_thread.xer, "{}", op.mnemonic());
        assert_eq!(jit_thread.cr, ref_thread.cr, "{}", op.mnemonic());
        assert_eq!(jit_thread.retired, ref_thread.retired);
        assert_eq!(jit_thread.exceptions, ref_thread.exceptions);
        assert_eq!(jit_thread.srr0, ref_thread.srr0);
        assert_eq!(jit_thread.dar, ref_thread.dar);
        assert_eq!(jit_shared.bus.read_be64(0x2000).unwrap(), ref_shared.bus.read_be64(0x2000).unwrap());
    }

    fn operands(t: &mut ThreadState) {
        t.gpr[1] = 0x2000;
        t.gpr[4] = 0xFFFF_FFFF_FFFF_FFFF;
        t.gpr[5] = 0x1234_5678_9ABC_DEF0;
        t.gpr[6] = 0x8000_0000;
        t.gpr[7] = 4;
        t.xer = xer::SO;
    }

    #[test]
    fn test_emitter_table_parallels_handlers() {
        assert_eq!(EMITTERS.len(), Opcode::COUNT);
        assert!(native_opcodes() >= 120, "{} native opcodes", native_opcodes());
        assert!(emitter_for(Opcode::Divw).is_none());
        assert!(emitter_for(Opcode::Fadd).is_none());
    }

    #[test]
    fn test_arithmetic_matches_interpreter() {
        // addi r3, r4, -1
        assert_matches_interpreter(0x3864_FFFF, operands);
        // addis r3, r0, 0x8000
        assert_matches_interpreter(0x3C60_8000, operands);
        // addic. r3, r4, 1
        assert_matches_interpreter(0x3464_0001, operands);
        // subfic r3, r5, 0
        assert_matches_interpreter(0x2065_0000, operands);
        // mulli r3, r5, -3
        assert_matches_interpreter(0x1C65_FFFD, operands);
        // add. r3, r4, r5
        assert_matches_interpreter(0x7C64_2A15, operands);
        // subf r3, r4, r5
        assert_matches_interpreter(0x7C64_2850, operands);
        // adde r3, r4, r5
        assert_matches_interpreter(0x7C64_2914, |t| {
            operands(t);
            t.xer |= xer::CA;
        });
        // subfe. r3, r5, r4
        assert_matches_interpreter(0x7C65_2111, operands);
        // addze r3, r4
        assert_matches_interpreter(0x7C64_0194, |t| {
            operands(t);
            t.xer |= xer::CA;
        });
        // mullw r3, r5, r6
        assert_matches_interpreter(0x7C65_31D6, operands);
        // mulhdu r3, r4, r5
        assert_matches_interpreter(0x7C64_2812, operands);
        // mulhw. r3, r5, r6
        assert_matches_interpreter(0x7C65_3097, operands);
        // neg r3, r6
        assert_matches_interpreter(0x7C66_00D0, operands);
    }

    #[test]
    fn test_carry_follows_mode() {
        // addc r3, r4, r5 in 32-bit mode carries out of the low word
        assert_matches_interpreter(0x7C64_2814, |t| {
            operands(t);
            t.msr &= !msr::SF;
            t.gpr[4] = 0xFFFF_FFFF;
            t.gpr[5] = 1;
        });
        // subfc r3, r4, r5 in 64-bit mode
        assert_matches_interpreter(0x7C64_2810, operands);
    }

    #[test]
    fn test_logical_and_compare_match_interpreter() {
        // xor r3, r4, r5
        assert_matches_interpreter(0x7C83_2A78, operands);
        // andc. r3, r5, r6
        assert_matches_interpreter(0x7CA3_3079, operands);
        // nor r3, r5, r5
        assert_matches_interpreter(0x7CA3_28F8, operands);
        // ori r3, r5, 0xFFFF
        assert_matches_interpreter(0x60A3_FFFF, operands);
        // andis. r3, r5, 0x9ABC
        assert_matches_interpreter(0x74A3_9ABC, operands);
        // extsh. r3, r5
        assert_matches_interpreter(0x7CA3_0735, operands);
        // cntlzw r3, r6
        assert_matches_interpreter(0x7CC3_0034, operands);
        // cmpw cr1, r5, r6
        assert_matches_interpreter(0x7C85_3000, operands);
        // cmpld cr7, r4, r5
        assert_matches_interpreter(0x7FA4_2840, operands);
        // cmpwi r6, -1
        assert_matches_interpreter(0x2C06_FFFF, operands);
        // cmplwi cr2, r7, 4
        assert_matches_interpreter(0x2907_0004, operands);
    }

    #[test]
    fn test_shifts_and_rotates_match_interpreter() {
        // slw r3, r5, r7
        assert_matches_interpreter(0x7CA3_3830, operands);
        // srd r3, r4, r7
        assert_matches_interpreter(0x7C83_3C36, operands);
        // sraw r3, r6, r7 shifts out ones from a negative word
        assert_matches_interpreter(0x7CC3_3E30, |t| {
            operands(t);
            t.gpr[6] = 0xFFFF_FFFF_8000_0001;
        });
        // srawi r3, r4, 31
        assert_matches_interpreter(0x7C83_FE70, operands);
        // sradi r3, r5, 4
        assert_matches_interpreter(0x7CA3_2674, operands);
        // srad r3, r4, r1 shifts by 0x2000 & 0x7F = 0
        assert_matches_interpreter(0x7C83_0E34, operands);
        // rlwinm r3, r5, 8, 24, 31
        assert_matches_interpreter(0x54A3_463E, operands);
        // rlwimi r3, r5, 4, 0, 15
        assert_matches_interpreter(0x50A3_201E, |t| {
            operands(t);
            t.gpr[3] = 0xFFFF_FFFF_FFFF_FFFF;
        });
        // rlwnm r3, r5, r7, 0, 31
        assert_matches_interpreter(0x5CA3_383E, operands);
        // rldicl r3, r5, 16, 32
        assert_matches_interpreter(0x78A3_8020, operands);
        // rldicr r3, r5, 4, 59
        assert_matches_interpreter(0x78A3_26E4, operands);
        // rldimi r3, r5, 32, 0
        assert_matches_interpreter(0x78A3_000E, operands);
    }

    #[test]
    fn test_memory_matches_interpreter() {
        // lwz r3, 4(r1)
        assert_matches_interpreter(0x8061_0004, operands);
        // lha r3, 0(r1)
        assert_matches_interpreter(0xA861_0000, operands);
        // lbzu r3, 7(r1)
        assert_matches_interpreter(0x8C61_0007, operands);
        // ld r3, 0(r1)
        assert_matches_interpreter(0xE861_0000, operands);
        // lwa r3, 0(r1)
        assert_matches_interpreter(0xE861_0002, operands);
        // lwbrx r3, r1, r7
        assert_matches_interpreter(0x7C61_3C2C, operands);
        // stw r5, 4(r1)
        assert_matches_interpreter(0x90A1_0004, operands);
        // stdu r5, 0(r1)
        assert_matches_interpreter(0xF8A1_0001, operands);
        // sthx r5, r1, r7
        assert_matches_interpreter(0x7CA1_3B2E, operands);
    }

    #[test]
    fn test_fault_in_native_load_matches_interpreter() {
        // lwz r3, 0(r1) with r1 past the end of RAM
        assert_matches_interpreter(0x8061_0000, |t| {
            operands(t);
            t.gpr[3] = 0x55;
            t.gpr[1] = 0x2000_0000;
            t.msr |= msr::DR;
        });
    }

    #[test]
    fn test_branches_match_interpreter() {
        // bl +0x40
        assert_matches_interpreter(0x4800_0041, operands);
        // b -8
        assert_matches_interpreter(0x4BFF_FFF8, operands);
        // bdnz -16
        assert_matches_interpreter(0x4200_FFF0, |t| {
            operands(t);
            t.ctr = 2;
        });
        // bdnz falls through when CTR reaches zero
        assert_matches_interpreter(0x4200_FFF0, |t| {
            operands(t);
            t.ctr = 1;
        });
        // beq cr0, +8 taken
        assert_matches_interpreter(0x4182_0008, |t| {
            operands(t);
            t.cr = 0x2000_0000;
        });
        // bne cr0, +8 not taken
        assert_matches_interpreter(0x4082_0008, |t| {
            operands(t);
            t.cr = 0x2000_0000;
        });
        // blr
        assert_matches_interpreter(0x4E80_0020, |t| {
            operands(t);
            t.lr = 0x3003;
        });
        // bctrl
        assert_matches_interpreter(0x4E80_0421, |t| {
            operands(t);
            t.ctr = 0x4000;
        });
    }

    #[test]
    fn test_register_moves_match_interpreter() {
        // mflr r3
        assert_matches_interpreter(0x7C68_02A6, |t| {
            operands(t);
            t.lr = 0x1234;
        });
        // mtctr r5
        assert_matches_interpreter(0x7CA9_03A6, operands);
        // mtxer r4
        assert_matches_interpreter(0x7C81_03A6, operands);
        // mfcr r3
        assert_matches_interpreter(0x7C60_0026, |t| {
            operands(t);
            t.cr = 0x1234_5678;
        });
        // mtcrf 0x81, r5
        assert_matches_interpreter(0x7CA8_1120, operands);
    }

    #[test]
    fn test_unlowered_forms_fall_back() {
        let (mut thread, mut core, shared) = create_test_env();
        // addo r3, r4, r5; divw r3, r4, r5
        shared.bus.write_be32(0x1000, 0x7C64_2E14).unwrap();
        shared.bus.write_be32(0x1004, 0x7C64_2BD6).unwrap();
        shared.bus.write_be32(0x1008, 0x4800_0000).unwrap();
        thread.gpr[4] = 10;
        thread.gpr[5] = 2;
        let mut jit = Jit::new();
        let executed = jit.run_block(&mut Cpu::new(&mut thread, &mut core, &shared), 3).unwrap();
        assert_eq!(executed, 3);
        assert_eq!(thread.gpr[3], 5);
        assert_eq!(jit.stats().fallback_instructions, 2);
        assert_eq!(jit.stats().native_instructions, 1);
    }
}
