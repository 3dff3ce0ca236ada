//! VMX128 instructions
//!
//! Xenon encodings that reach all 128 vector registers by scattering the
//! high register bits around the word. Memory forms keep RA/RB in the usual
//! X-form positions; arithmetic reuses the lane operations of
//! [`super::vector`].

use crate::cpu::{Cpu, ExecResult};
use crate::decoder::{va128, vb128, vc128, vd128, vmx128_imm, vmx128_rc, x_form};
use crate::regs::vscr;
use crate::vmx::Vector128;

use super::load_store::{load_element, load_vector, shift_control, store_element, store_vector};
use super::vector::{self, fp_binary, fp_unary, record_cr6};

fn memory_operands(cpu: &Cpu<'_>, word: u32) -> (usize, u64) {
    let (_, ra, rb) = x_form(word);
    (vd128(word), cpu.ea_x(ra, rb))
}

/// lvsl128 - Load Vector for Shift Left
pub fn lvsl128(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_vec()?;
    let (vd, ea) = memory_operands(cpu, word);
    cpu.thread.vr[vd] = shift_control((ea & 0xF) as u8, false);
    Ok(())
}

/// lvsr128 - Load Vector for Shift Right
pub fn lvsr128(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_vec()?;
    let (vd, ea) = memory_operands(cpu, word);
    cpu.thread.vr[vd] = shift_control((ea & 0xF) as u8, true);
    Ok(())
}

/// lvewx128 - Load Vector Element Word Indexed
pub fn lvewx128(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (vd, ea) = memory_operands(cpu, word);
    load_element(cpu, vd, ea, 4)
}

/// lvx128 / lvxl128 - Load Vector Indexed
pub fn lvx128(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (vd, ea) = memory_operands(cpu, word);
    load_vector(cpu, vd, ea)
}

/// stvewx128 - Store Vector Element Word Indexed
pub fn stvewx128(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (vs, ea) = memory_operands(cpu, word);
    store_element(cpu, vs, ea, 4)
}

/// stvx128 / stvxl128 - Store Vector Indexed
pub fn stvx128(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (vs, ea) = memory_operands(cpu, word);
    store_vector(cpu, vs, ea)
}

macro_rules! vmx128_ops {
    ($($(#[$doc:meta])* $name:ident => |$a:ident, $b:ident, $d:ident, $nj:ident| $body:expr;)*) => {
        $(
            $(#[$doc])*
            pub fn $name(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
                cpu.require_vec()?;
                let vd = vd128(word);
                let $a = cpu.thread.vr[va128(word)];
                let $b = cpu.thread.vr[vb128(word)];
                let $d = cpu.thread.vr[vd];
                let $nj = cpu.thread.vscr & vscr::NJ != 0;
                cpu.thread.vr[vd] = $body;
                Ok(())
            }
        )*
    };
}

vmx128_ops! {
    /// vaddfp128 - Vector Add Floating Point
    vaddfp128 => |a, b, _d, nj| fp_binary(a, b, nj, |x, y| x + y);
    /// vsubfp128 - Vector Subtract Floating Point
    vsubfp128 => |a, b, _d, nj| fp_binary(a, b, nj, |x, y| x - y);
    /// vmulfp128 - Vector Multiply Floating Point
    vmulfp128 => |a, b, _d, nj| fp_binary(a, b, nj, |x, y| x * y);
    /// vmaddfp128 - Vector Multiply-Add Floating Point, accumulating into VD
    vmaddfp128 => |a, b, d, nj| vector::fp_madd(a, d, b, nj);
    /// vnmsubfp128 - Vector Negative Multiply-Subtract Floating Point
    vnmsubfp128 => |a, b, d, nj| vector::fp_nmsub(a, d, b, nj);
    vmaxfp128 => |a, b, _d, nj| fp_binary(a, b, nj, vector::fp_max);
    vminfp128 => |a, b, _d, nj| fp_binary(a, b, nj, vector::fp_min);

    vand128 => |a, b, _d, _nj| a.and(b);
    vandc128 => |a, b, _d, _nj| a.and(b.not());
    vnor128 => |a, b, _d, _nj| a.or(b).not();
    vor128 => |a, b, _d, _nj| a.or(b);
    vxor128 => |a, b, _d, _nj| a.xor(b);
    /// vsel128 - Vector Select, VD supplies the mask
    vsel128 => |a, b, d, _nj| vector::select(a, b, d);

    vrlw128 => |a, b, _d, _nj| vector::rotate_words(a, b);
    vslw128 => |a, b, _d, _nj| vector::shift_left_words(a, b);
    vsraw128 => |a, b, _d, _nj| vector::shift_right_algebraic_words(a, b);
    vsrw128 => |a, b, _d, _nj| vector::shift_right_words(a, b);
    vmrghw128 => |a, b, _d, _nj| vector::merge(a, b, 4, false);
    vmrglw128 => |a, b, _d, _nj| vector::merge(a, b, 4, true);
}

/// vperm128 - Vector Permute, control from VR0-VR7
pub fn vperm128(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_vec()?;
    let (a, b, c) = (cpu.thread.vr[va128(word)], cpu.thread.vr[vb128(word)], cpu.thread.vr[vc128(word)]);
    cpu.thread.vr[vd128(word)] = vector::permute(a, b, c);
    Ok(())
}

/// vcfpsxws128 - Vector Convert From Floating Point to Signed Fixed-Point Word Saturate
pub fn vcfpsxws128(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_vec()?;
    let (result, saturated) = vector::to_signed_words(cpu.thread.vr[vb128(word)], vmx128_imm(word));
    cpu.thread.vr[vd128(word)] = result;
    if saturated {
        cpu.thread.vscr |= vscr::SAT;
    }
    Ok(())
}

/// vcsxwfp128 - Vector Convert From Signed Fixed-Point Word to Floating Point
pub fn vcsxwfp128(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_vec()?;
    cpu.thread.vr[vd128(word)] = vector::from_signed_words(cpu.thread.vr[vb128(word)], vmx128_imm(word));
    Ok(())
}

/// vrefp128 - Vector Reciprocal Estimate Floating Point
pub fn vrefp128(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_vec()?;
    let nj = cpu.thread.vscr & vscr::NJ != 0;
    cpu.thread.vr[vd128(word)] = fp_unary(cpu.thread.vr[vb128(word)], nj, |x| 1.0 / x);
    Ok(())
}

/// vrsqrtefp128 - Vector Reciprocal Square Root Estimate Floating Point
pub fn vrsqrtefp128(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_vec()?;
    let nj = cpu.thread.vscr & vscr::NJ != 0;
    cpu.thread.vr[vd128(word)] = fp_unary(cpu.thread.vr[vb128(word)], nj, |x| 1.0 / x.sqrt());
    Ok(())
}

/// vspltw128 - Vector Splat Word
pub fn vspltw128(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_vec()?;
    let index = (vmx128_imm(word) & 3) as usize;
    cpu.thread.vr[vd128(word)] = vector::splat(cpu.thread.vr[vb128(word)], 4, index);
    Ok(())
}

/// vspltisw128 - Vector Splat Immediate Signed Word
pub fn vspltisw128(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_vec()?;
    let value = vector::simm5(vmx128_imm(word));
    cpu.thread.vr[vd128(word)] = Vector128::from_i32x4([value; 4]);
    Ok(())
}

fn compare(cpu: &mut Cpu<'_>, word: u32, f: impl Fn(Vector128, Vector128) -> Vector128) -> ExecResult {
    cpu.require_vec()?;
    let result = f(cpu.thread.vr[va128(word)], cpu.thread.vr[vb128(word)]);
    cpu.thread.vr[vd128(word)] = result;
    if vmx128_rc(word) {
        record_cr6(cpu, result);
    }
    Ok(())
}

/// vcmpeqfp128 - Vector Compare Equal To Floating Point
pub fn vcmpeqfp128(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    compare(cpu, word, |a, b| vector::fp_compare(a, b, |x, y| x == y))
}

/// vcmpgefp128 - Vector Compare Greater Than or Equal To Floating Point
pub fn vcmpgefp128(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    compare(cpu, word, |a, b| vector::fp_compare(a, b, |x, y| x >= y))
}

/// vcmpgtfp128 - Vector Compare Greater Than Floating Point
pub fn vcmpgtfp128(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    compare(cpu, word, |a, b| vector::fp_compare(a, b, |x, y| x > y))
}

/// vcmpequw128 - Vector Compare Equal To Unsigned Word
pub fn vcmpequw128(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    compare(cpu, word, vector::compare_equal_words)
}
