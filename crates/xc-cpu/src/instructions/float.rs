//! Floating-point instructions
//!
//! Arithmetic runs on host doubles in round-to-nearest; FPSCR[RN] only
//! steers the integer conversions. Invalid-operation and divide-by-zero
//! conditions set their sticky bits, and an enabled exception under
//! MSR[FE0|FE1] raises a floating-point program interrupt.

use crate::cpu::{Cpu, ExecResult};
use crate::decoder::{a_form, bits, rc, x_form};
use crate::exceptions::Exceptions;
use crate::float::{self as fp, fpscr};
use crate::regs::msr;

/// FPCC bits within FPRF
const FPCC_MASK: u32 = 0x0000_F000;

/// Publish new exception bits, then re-derive FX/FEX/VX
fn raise_fpscr(cpu: &mut Cpu<'_>, bits: u32) {
    let old = cpu.thread.fpscr;
    let mut value = old | bits;
    if bits & !old != 0 {
        value |= fpscr::FX;
    }
    value = fpscr::update_summary(value);
    cpu.thread.fpscr = value;
    if value & fpscr::FEX != 0 && old & fpscr::FEX == 0 && cpu.thread.msr & (msr::FE0 | msr::FE1) != 0 {
        cpu.raise(Exceptions::PROGRAM_FP);
    }
}

/// Write an arithmetic result: FPR, FPRF, optional CR1
fn finish(cpu: &mut Cpu<'_>, frt: usize, value: f64, rc: bool) {
    cpu.thread.set_fpr_f64(frt, value);
    cpu.thread.fpscr = (cpu.thread.fpscr & !fpscr::FPRF) | fp::fprf_of(value);
    record_cr1(cpu, rc);
}

fn record_cr1(cpu: &mut Cpu<'_>, rc: bool) {
    if rc {
        let field = cpu.thread.fpscr >> 28;
        cpu.thread.set_cr_field(1, field);
    }
}

/// Invalid-operation bits for an operation on `a` and `b`
fn invalid_bits(cpu: &Cpu<'_>, inputs: &[usize]) -> u32 {
    if inputs.iter().any(|&r| fp::is_snan(cpu.thread.fpr[r])) {
        fpscr::VXSNAN
    } else {
        0
    }
}

#[derive(Clone, Copy)]
enum Arith {
    Add,
    Sub,
    Mul,
    Div,
}

fn arith(cpu: &mut Cpu<'_>, word: u32, op: Arith, single: bool) -> ExecResult {
    cpu.require_fp()?;
    let (frt, fra, frb, frc, rc) = a_form(word);
    // fmul takes its second operand from FRC
    let rhs = if matches!(op, Arith::Mul) { frc } else { frb };
    let (a, b) = (cpu.thread.fpr_f64(fra), cpu.thread.fpr_f64(rhs));

    let mut flags = invalid_bits(cpu, &[fra, rhs]);
    let result = match op {
        Arith::Add | Arith::Sub => {
            let b = if matches!(op, Arith::Sub) { -b } else { b };
            if a.is_infinite() && b.is_infinite() && a.signum() != b.signum() {
                flags |= fpscr::VXISI;
            }
            a + b
        }
        Arith::Mul => {
            if (a.is_infinite() && b == 0.0) || (a == 0.0 && b.is_infinite()) {
                flags |= fpscr::VXIMZ;
            }
            a * b
        }
        Arith::Div => {
            if a == 0.0 && b == 0.0 {
                flags |= fpscr::VXZDZ;
            } else if a.is_infinite() && b.is_infinite() {
                flags |= fpscr::VXIDI;
            } else if b == 0.0 && !a.is_nan() {
                flags |= fpscr::ZX;
            }
            a / b
        }
    };
    let result = if single { fp::round_to_single(result) } else { result };
    if flags != 0 {
        raise_fpscr(cpu, flags);
    }
    finish(cpu, frt, result, rc);
    Ok(())
}

/// fadd - Floating Add
pub fn fadd(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    arith(cpu, word, Arith::Add, false)
}

/// fadds - Floating Add Single
pub fn fadds(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    arith(cpu, word, Arith::Add, true)
}

/// fsub - Floating Subtract
pub fn fsub(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    arith(cpu, word, Arith::Sub, false)
}

/// fsubs - Floating Subtract Single
pub fn fsubs(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    arith(cpu, word, Arith::Sub, true)
}

/// fmul - Floating Multiply
pub fn fmul(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    arith(cpu, word, Arith::Mul, false)
}

/// fmuls - Floating Multiply Single
pub fn fmuls(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    arith(cpu, word, Arith::Mul, true)
}

/// fdiv - Floating Divide
pub fn fdiv(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    arith(cpu, word, Arith::Div, false)
}

/// fdivs - Floating Divide Single
pub fn fdivs(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    arith(cpu, word, Arith::Div, true)
}

fn fused(cpu: &mut Cpu<'_>, word: u32, subtract: bool, negate: bool, single: bool) -> ExecResult {
    cpu.require_fp()?;
    let (frt, fra, frb, frc, rc) = a_form(word);
    let (a, b, c) = (cpu.thread.fpr_f64(fra), cpu.thread.fpr_f64(frb), cpu.thread.fpr_f64(frc));
    let mut flags = invalid_bits(cpu, &[fra, frb, frc]);
    if (a.is_infinite() && c == 0.0) || (a == 0.0 && c.is_infinite()) {
        flags |= fpscr::VXIMZ;
    }
    let addend = if subtract { -b } else { b };
    let mut result = a.mul_add(c, addend);
    if negate && !result.is_nan() {
        result = -result;
    }
    let result = if single { fp::round_to_single(result) } else { result };
    if flags != 0 {
        raise_fpscr(cpu, flags);
    }
    finish(cpu, frt, result, rc);
    Ok(())
}

/// fmadd - Floating Multiply-Add
pub fn fmadd(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    fused(cpu, word, false, false, false)
}

/// fmadds - Floating Multiply-Add Single
pub fn fmadds(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    fused(cpu, word, false, false, true)
}

/// fmsub - Floating Multiply-Subtract
pub fn fmsub(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    fused(cpu, word, true, false, false)
}

/// fmsubs - Floating Multiply-Subtract Single
pub fn fmsubs(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    fused(cpu, word, true, false, true)
}

/// fnmadd - Floating Negative Multiply-Add
pub fn fnmadd(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    fused(cpu, word, false, true, false)
}

/// fnmadds - Floating Negative Multiply-Add Single
pub fn fnmadds(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    fused(cpu, word, false, true, true)
}

/// fnmsub - Floating Negative Multiply-Subtract
pub fn fnmsub(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    fused(cpu, word, true, true, false)
}

/// fnmsubs - Floating Negative Multiply-Subtract Single
pub fn fnmsubs(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    fused(cpu, word, true, true, true)
}

fn unary(cpu: &mut Cpu<'_>, word: u32, single: bool, f: impl Fn(f64) -> (f64, u32)) -> ExecResult {
    cpu.require_fp()?;
    let (frt, _, frb, _, rc) = a_form(word);
    let b = cpu.thread.fpr_f64(frb);
    let (result, mut flags) = f(b);
    flags |= invalid_bits(cpu, &[frb]);
    let result = if single { fp::round_to_single(result) } else { result };
    if flags != 0 {
        raise_fpscr(cpu, flags);
    }
    finish(cpu, frt, result, rc);
    Ok(())
}

fn sqrt(b: f64) -> (f64, u32) {
    let flags = if b < 0.0 { fpscr::VXSQRT } else { 0 };
    (b.sqrt(), flags)
}

/// fsqrt - Floating Square Root
pub fn fsqrt(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    unary(cpu, word, false, sqrt)
}

/// fsqrts - Floating Square Root Single
pub fn fsqrts(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    unary(cpu, word, true, sqrt)
}

/// fres - Floating Reciprocal Estimate Single
pub fn fres(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    unary(cpu, word, true, |b| (1.0 / b, if b == 0.0 { fpscr::ZX } else { 0 }))
}

/// frsqrte - Floating Reciprocal Square Root Estimate
pub fn frsqrte(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    unary(cpu, word, false, |b| {
        let flags = if b == 0.0 {
            fpscr::ZX
        } else if b < 0.0 {
            fpscr::VXSQRT
        } else {
            0
        };
        (1.0 / b.sqrt(), flags)
    })
}

/// fsel - Floating Select
pub fn fsel(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_fp()?;
    let (frt, fra, frb, frc, rc) = a_form(word);
    let a = cpu.thread.fpr_f64(fra);
    cpu.thread.fpr[frt] = if a >= 0.0 { cpu.thread.fpr[frc] } else { cpu.thread.fpr[frb] };
    record_cr1(cpu, rc);
    Ok(())
}

/// frsp - Floating Round to Single
pub fn frsp(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    unary(cpu, word, true, |b| (b, 0))
}

// Moves

fn move_bits(cpu: &mut Cpu<'_>, word: u32, f: impl Fn(u64) -> u64) -> ExecResult {
    cpu.require_fp()?;
    let (frt, _, frb) = x_form(word);
    cpu.thread.fpr[frt] = f(cpu.thread.fpr[frb]);
    record_cr1(cpu, rc(word));
    Ok(())
}

const SIGN: u64 = 1 << 63;

/// fmr - Floating Move Register
pub fn fmr(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    move_bits(cpu, word, |b| b)
}

/// fneg - Floating Negate
pub fn fneg(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    move_bits(cpu, word, |b| b ^ SIGN)
}

/// fabs - Floating Absolute Value
pub fn fabs(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    move_bits(cpu, word, |b| b & !SIGN)
}

/// fnabs - Floating Negative Absolute Value
pub fn fnabs(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    move_bits(cpu, word, |b| b | SIGN)
}

// Compares

fn compare(cpu: &mut Cpu<'_>, word: u32, ordered: bool) -> ExecResult {
    cpu.require_fp()?;
    let bf = bits(word, 6, 8) as usize;
    let (_, fra, frb) = x_form(word);
    let (a, b) = (cpu.thread.fpr_f64(fra), cpu.thread.fpr_f64(frb));
    let c = if a.is_nan() || b.is_nan() {
        0b0001
    } else if a < b {
        0b1000
    } else if a > b {
        0b0100
    } else {
        0b0010
    };
    cpu.thread.fpscr = (cpu.thread.fpscr & !FPCC_MASK) | (c << 12);
    cpu.thread.set_cr_field(bf, c);

    let snan = fp::is_snan(cpu.thread.fpr[fra]) || fp::is_snan(cpu.thread.fpr[frb]);
    let mut flags = if snan { fpscr::VXSNAN } else { 0 };
    if ordered && c == 0b0001 {
        flags |= fpscr::VXVC;
    }
    if flags != 0 {
        raise_fpscr(cpu, flags);
    }
    Ok(())
}

/// fcmpu - Floating Compare Unordered
pub fn fcmpu(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    compare(cpu, word, false)
}

/// fcmpo - Floating Compare Ordered
pub fn fcmpo(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    compare(cpu, word, true)
}

// Conversions

fn to_integer(cpu: &mut Cpu<'_>, word: u32, word_sized: bool, truncate: bool) -> ExecResult {
    cpu.require_fp()?;
    let (frt, _, frb) = x_form(word);
    let b = cpu.thread.fpr_f64(frb);
    let rn = if truncate { 1 } else { cpu.thread.fpscr & fpscr::RN };
    let rounded = fp::round_mode(b, rn);
    let (value, invalid) = if word_sized {
        let (v, invalid) = fp::to_i64_saturating(rounded, i32::MIN as i64, i32::MAX as i64);
        (v as i32 as u32 as u64, invalid)
    } else {
        let (v, invalid) = fp::to_i64_saturating(rounded, i64::MIN, i64::MAX);
        (v as u64, invalid)
    };
    cpu.thread.fpr[frt] = value;
    if invalid {
        let snan = if fp::is_snan(cpu.thread.fpr[frb]) { fpscr::VXSNAN } else { 0 };
        raise_fpscr(cpu, fpscr::VXCVI | snan);
    } else if rounded != b {
        raise_fpscr(cpu, fpscr::XX);
    }
    record_cr1(cpu, rc(word));
    Ok(())
}

/// fctiw - Floating Convert to Integer Word
pub fn fctiw(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    to_integer(cpu, word, true, false)
}

/// fctiwz - Floating Convert to Integer Word with Round toward Zero
pub fn fctiwz(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    to_integer(cpu, word, true, true)
}

/// fctid - Floating Convert to Integer Doubleword
pub fn fctid(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    to_integer(cpu, word, false, false)
}

/// fctidz - Floating Convert to Integer Doubleword with Round toward Zero
pub fn fctidz(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    to_integer(cpu, word, false, true)
}

/// fcfid - Floating Convert From Integer Doubleword
pub fn fcfid(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_fp()?;
    let (frt, _, frb) = x_form(word);
    let value = cpu.thread.fpr[frb] as i64 as f64;
    finish(cpu, frt, value, rc(word));
    Ok(())
}

// FPSCR

/// mffs - Move From FPSCR
pub fn mffs(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_fp()?;
    let (frt, _, _) = x_form(word);
    cpu.thread.fpr[frt] = cpu.thread.fpscr as u64;
    record_cr1(cpu, rc(word));
    Ok(())
}

/// Bits of FPSCR that mtfsf/mtfsfi/mtfsb cannot set directly
const DERIVED: u32 = fpscr::FEX | fpscr::VX;

fn store_fpscr(cpu: &mut Cpu<'_>, value: u32) {
    cpu.thread.fpscr = fpscr::update_summary(value & !DERIVED);
}

/// mtfsf - Move To FPSCR Fields
pub fn mtfsf(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_fp()?;
    let fm = bits(word, 7, 14);
    let (_, _, frb) = x_form(word);
    let source = cpu.thread.fpr[frb] as u32;
    let mut mask = 0u32;
    for field in 0..8 {
        if fm & (0x80 >> field) != 0 {
            mask |= 0xF000_0000 >> (field * 4);
        }
    }
    let value = (cpu.thread.fpscr & !mask) | (source & mask);
    store_fpscr(cpu, value);
    record_cr1(cpu, rc(word));
    Ok(())
}

/// mtfsfi - Move To FPSCR Field Immediate
pub fn mtfsfi(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_fp()?;
    let bf = bits(word, 6, 8);
    let imm = bits(word, 16, 19);
    let shift = 28 - bf * 4;
    let value = (cpu.thread.fpscr & !(0xF << shift)) | (imm << shift);
    store_fpscr(cpu, value);
    record_cr1(cpu, rc(word));
    Ok(())
}

/// mtfsb0 - Move To FPSCR Bit 0
pub fn mtfsb0(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_fp()?;
    let bt = bits(word, 6, 10);
    let value = cpu.thread.fpscr & !(0x8000_0000 >> bt);
    store_fpscr(cpu, value);
    record_cr1(cpu, rc(word));
    Ok(())
}

/// mtfsb1 - Move To FPSCR Bit 1
pub fn mtfsb1(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_fp()?;
    let bt = bits(word, 6, 10);
    let value = cpu.thread.fpscr | (0x8000_0000 >> bt);
    store_fpscr(cpu, value);
    record_cr1(cpu, rc(word));
    Ok(())
}

/// mcrfs - Move to Condition Register from FPSCR
pub fn mcrfs(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_fp()?;
    let bf = bits(word, 6, 8) as usize;
    let bfa = bits(word, 11, 13);
    let shift = 28 - bfa * 4;
    let field = (cpu.thread.fpscr >> shift) & 0xF;
    cpu.thread.set_cr_field(bf, field);
    // Exception bits copied out are cleared; FEX and VX are recomputed
    let sticky = (fpscr::FX | fpscr::OX | fpscr::UX | fpscr::ZX | fpscr::XX | fpscr::VX_ALL) & (0xF << shift);
    let value = cpu.thread.fpscr & !sticky;
    store_fpscr(cpu, value);
    Ok(())
}
