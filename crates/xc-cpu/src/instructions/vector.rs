//! VMX instructions (VX, VA and VXR forms)
//!
//! Lane operations are written as pure functions over [`Vector128`] so the
//! VMX128 forms can share them with the 32-register encodings. Saturating
//! forms report clamping and the handler folds it into VSCR[SAT].

use crate::cpu::{Cpu, ExecResult};
use crate::decoder::{va_form, vxr_rc};
use crate::regs::vscr;
use crate::vmx::{sat, Vector128};

macro_rules! lane_helpers {
    ($($map:ident, $sat:ident: $t:ty, $n:literal, $get:ident, $from:ident;)*) => {
        $(
            #[inline]
            fn $map(a: Vector128, b: Vector128, f: impl Fn($t, $t) -> $t) -> Vector128 {
                let (a, b) = (a.$get(), b.$get());
                Vector128::$from(std::array::from_fn::<$t, $n, _>(|i| f(a[i], b[i])))
            }

            #[inline]
            fn $sat(a: Vector128, b: Vector128, f: impl Fn($t, $t) -> ($t, bool)) -> (Vector128, bool) {
                let (a, b) = (a.$get(), b.$get());
                let mut saturated = false;
                let out = std::array::from_fn::<$t, $n, _>(|i| {
                    let (v, s) = f(a[i], b[i]);
                    saturated |= s;
                    v
                });
                (Vector128::$from(out), saturated)
            }
        )*
    };
}

lane_helpers! {
    map_u8, sat_u8: u8, 16, u8x16, from_u8x16;
    map_i8, sat_i8: i8, 16, i8x16, from_i8x16;
    map_u16, sat_u16: u16, 8, u16x8, from_u16x8;
    map_i16, sat_i16: i16, 8, i16x8, from_i16x8;
    map_u32, sat_u32: u32, 4, u32x4, from_u32x4;
    map_i32, sat_i32: i32, 4, i32x4, from_i32x4;
}

#[inline]
fn mask<T: From<bool>>(c: bool) -> T {
    T::from(c)
}

#[inline]
fn all_ones_u8(c: bool) -> u8 {
    if c { u8::MAX } else { 0 }
}

#[inline]
fn all_ones_u16(c: bool) -> u16 {
    if c { u16::MAX } else { 0 }
}

#[inline]
fn all_ones_u32(c: bool) -> u32 {
    if c { u32::MAX } else { 0 }
}

// Shared lane operations

/// Flush a denormal to signed zero in non-Java mode
#[inline]
pub fn flush(value: f32, nj: bool) -> f32 {
    if nj && value.is_subnormal() {
        0.0f32.copysign(value)
    } else {
        value
    }
}

/// Apply `f` to each single-precision lane pair
pub fn fp_binary(a: Vector128, b: Vector128, nj: bool, f: impl Fn(f32, f32) -> f32) -> Vector128 {
    let (a, b) = (a.f32x4(), b.f32x4());
    Vector128::from_f32x4(std::array::from_fn(|i| flush(f(flush(a[i], nj), flush(b[i], nj)), nj)))
}

/// Apply `f` to each single-precision lane
pub fn fp_unary(b: Vector128, nj: bool, f: impl Fn(f32) -> f32) -> Vector128 {
    Vector128::from_f32x4(b.f32x4().map(|x| flush(f(flush(x, nj)), nj)))
}

/// Fused multiply-add a * c + b on each lane
pub fn fp_madd(a: Vector128, b: Vector128, c: Vector128, nj: bool) -> Vector128 {
    let (a, b, c) = (a.f32x4(), b.f32x4(), c.f32x4());
    Vector128::from_f32x4(std::array::from_fn(|i| {
        flush(flush(a[i], nj).mul_add(flush(c[i], nj), flush(b[i], nj)), nj)
    }))
}

/// Negative fused multiply-subtract -(a * c - b) on each lane
pub fn fp_nmsub(a: Vector128, b: Vector128, c: Vector128, nj: bool) -> Vector128 {
    let (a, b, c) = (a.f32x4(), b.f32x4(), c.f32x4());
    Vector128::from_f32x4(std::array::from_fn(|i| {
        flush(-flush(a[i], nj).mul_add(flush(c[i], nj), -flush(b[i], nj)), nj)
    }))
}

/// Floating maximum; a NaN operand propagates
pub fn fp_max(x: f32, y: f32) -> f32 {
    if x.is_nan() || y.is_nan() {
        f32::NAN
    } else if x > y {
        x
    } else {
        y
    }
}

/// Floating minimum; a NaN operand propagates
pub fn fp_min(x: f32, y: f32) -> f32 {
    if x.is_nan() || y.is_nan() {
        f32::NAN
    } else if x < y {
        x
    } else {
        y
    }
}

/// Lane-wise float compare producing all-ones masks
pub fn fp_compare(a: Vector128, b: Vector128, f: impl Fn(f32, f32) -> bool) -> Vector128 {
    let (a, b) = (a.f32x4(), b.f32x4());
    Vector128::from_u32x4(std::array::from_fn(|i| all_ones_u32(f(a[i], b[i]))))
}

/// Word equality compare
pub fn compare_equal_words(a: Vector128, b: Vector128) -> Vector128 {
    map_u32(a, b, |x, y| all_ones_u32(x == y))
}

/// Select bits of `b` where `c` is set, `a` elsewhere
pub fn select(a: Vector128, b: Vector128, c: Vector128) -> Vector128 {
    Vector128::from_u128((a.as_u128() & !c.as_u128()) | (b.as_u128() & c.as_u128()))
}

/// Pick bytes of `a:b` by the low five bits of each control byte
pub fn permute(a: Vector128, b: Vector128, c: Vector128) -> Vector128 {
    let src = concat(a, b);
    Vector128::from_u8x16(c.bytes.map(|i| src[(i & 0x1F) as usize]))
}

fn concat(a: Vector128, b: Vector128) -> [u8; 32] {
    let mut src = [0u8; 32];
    src[..16].copy_from_slice(&a.bytes);
    src[16..].copy_from_slice(&b.bytes);
    src
}

/// Interleave elements of `size` bytes from the high or low halves
pub fn merge(a: Vector128, b: Vector128, size: usize, low: bool) -> Vector128 {
    let base = if low { 8 } else { 0 };
    let mut out = [0u8; 16];
    for i in 0..8 / size {
        let src = base + i * size;
        let dst = 2 * i * size;
        out[dst..dst + size].copy_from_slice(&a.bytes[src..src + size]);
        out[dst + size..dst + 2 * size].copy_from_slice(&b.bytes[src..src + size]);
    }
    Vector128::from_u8x16(out)
}

/// Replicate element `index` of `size` bytes
pub fn splat(v: Vector128, size: usize, index: usize) -> Vector128 {
    let start = (index * size) % 16;
    let mut out = [0u8; 16];
    for chunk in out.chunks_exact_mut(size) {
        chunk.copy_from_slice(&v.bytes[start..start + size]);
    }
    Vector128::from_u8x16(out)
}

/// Sign-extend a 5-bit immediate
#[inline]
pub fn simm5(imm: u32) -> i32 {
    ((imm as i32) << 27) >> 27
}

pub fn rotate_words(a: Vector128, b: Vector128) -> Vector128 {
    map_u32(a, b, |x, y| x.rotate_left(y & 31))
}

pub fn shift_left_words(a: Vector128, b: Vector128) -> Vector128 {
    map_u32(a, b, |x, y| x.wrapping_shl(y))
}

pub fn shift_right_words(a: Vector128, b: Vector128) -> Vector128 {
    map_u32(a, b, |x, y| x.wrapping_shr(y))
}

pub fn shift_right_algebraic_words(a: Vector128, b: Vector128) -> Vector128 {
    map_i32(a, b, |x, y| x.wrapping_shr(y as u32))
}

/// Scaled float to signed word with saturation (vctsxs); NaN converts to 0
pub fn to_signed_words(v: Vector128, scale: u32) -> (Vector128, bool) {
    let mut saturated = false;
    let out = v.f32x4().map(|x| {
        if x.is_nan() {
            return 0;
        }
        let t = (x as f64 * (1u64 << scale) as f64).trunc();
        if t > i32::MAX as f64 {
            saturated = true;
            i32::MAX
        } else if t < i32::MIN as f64 {
            saturated = true;
            i32::MIN
        } else {
            t as i32
        }
    });
    (Vector128::from_i32x4(out), saturated)
}

/// Scaled float to unsigned word with saturation (vctuxs)
pub fn to_unsigned_words(v: Vector128, scale: u32) -> (Vector128, bool) {
    let mut saturated = false;
    let out = v.f32x4().map(|x| {
        if x.is_nan() {
            return 0;
        }
        let t = (x as f64 * (1u64 << scale) as f64).trunc();
        if t > u32::MAX as f64 {
            saturated = true;
            u32::MAX
        } else if t < 0.0 {
            saturated = true;
            0
        } else {
            t as u32
        }
    });
    (Vector128::from_u32x4(out), saturated)
}

/// Signed word to float divided by 2^scale
pub fn from_signed_words(v: Vector128, scale: u32) -> Vector128 {
    let div = (1u64 << scale) as f64;
    Vector128::from_f32x4(v.i32x4().map(|x| (x as f64 / div) as f32))
}

/// Unsigned word to float divided by 2^scale
pub fn from_unsigned_words(v: Vector128, scale: u32) -> Vector128 {
    let div = (1u64 << scale) as f64;
    Vector128::from_f32x4(v.u32x4().map(|x| (x as f64 / div) as f32))
}

/// Set CR6 from a compare result: all lanes true, or all false
pub fn record_cr6(cpu: &mut Cpu<'_>, result: Vector128) {
    let bits = result.as_u128();
    let all_true = (bits == u128::MAX) as u32;
    let all_false = (bits == 0) as u32;
    cpu.thread.set_cr_field(6, (all_true << 3) | (all_false << 1));
}

#[inline]
fn saturate(cpu: &mut Cpu<'_>, saturated: bool) {
    if saturated {
        cpu.thread.vscr |= vscr::SAT;
    }
}

#[inline]
fn nj(cpu: &Cpu<'_>) -> bool {
    cpu.thread.vscr & vscr::NJ != 0
}

// Handlers

macro_rules! vx_ops {
    ($($(#[$doc:meta])* $name:ident => |$a:ident, $b:ident| $body:expr;)*) => {
        $(
            $(#[$doc])*
            pub fn $name(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
                cpu.require_vec()?;
                let (vd, va, vb, _) = va_form(word);
                let ($a, $b) = (cpu.thread.vr[va], cpu.thread.vr[vb]);
                cpu.thread.vr[vd] = $body;
                Ok(())
            }
        )*
    };
}

macro_rules! vx_sat_ops {
    ($($(#[$doc:meta])* $name:ident => |$a:ident, $b:ident| $body:expr;)*) => {
        $(
            $(#[$doc])*
            pub fn $name(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
                cpu.require_vec()?;
                let (vd, va, vb, _) = va_form(word);
                let ($a, $b) = (cpu.thread.vr[va], cpu.thread.vr[vb]);
                let (result, saturated) = $body;
                cpu.thread.vr[vd] = result;
                saturate(cpu, saturated);
                Ok(())
            }
        )*
    };
}

macro_rules! vx_fp_ops {
    ($($(#[$doc:meta])* $name:ident => |$a:ident, $b:ident, $nj:ident| $body:expr;)*) => {
        $(
            $(#[$doc])*
            pub fn $name(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
                cpu.require_vec()?;
                let (vd, va, vb, _) = va_form(word);
                let ($a, $b, $nj) = (cpu.thread.vr[va], cpu.thread.vr[vb], nj(cpu));
                cpu.thread.vr[vd] = $body;
                Ok(())
            }
        )*
    };
}

macro_rules! vcmp_ops {
    ($($(#[$doc:meta])* $name:ident => |$a:ident, $b:ident| $body:expr;)*) => {
        $(
            $(#[$doc])*
            pub fn $name(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
                cpu.require_vec()?;
                let (vd, va, vb, _) = va_form(word);
                let ($a, $b) = (cpu.thread.vr[va], cpu.thread.vr[vb]);
                let result: Vector128 = $body;
                cpu.thread.vr[vd] = result;
                if vxr_rc(word) {
                    record_cr6(cpu, result);
                }
                Ok(())
            }
        )*
    };
}

vx_ops! {
    /// vaddubm - Vector Add Unsigned Byte Modulo
    vaddubm => |a, b| map_u8(a, b, u8::wrapping_add);
    /// vadduhm - Vector Add Unsigned Halfword Modulo
    vadduhm => |a, b| map_u16(a, b, u16::wrapping_add);
    /// vadduwm - Vector Add Unsigned Word Modulo
    vadduwm => |a, b| map_u32(a, b, u32::wrapping_add);
    /// vaddcuw - Vector Add and Write Carry-Out Unsigned Word
    vaddcuw => |a, b| map_u32(a, b, |x, y| mask::<u32>(x.overflowing_add(y).1));
    /// vsububm - Vector Subtract Unsigned Byte Modulo
    vsububm => |a, b| map_u8(a, b, u8::wrapping_sub);
    /// vsubuhm - Vector Subtract Unsigned Halfword Modulo
    vsubuhm => |a, b| map_u16(a, b, u16::wrapping_sub);
    /// vsubuwm - Vector Subtract Unsigned Word Modulo
    vsubuwm => |a, b| map_u32(a, b, u32::wrapping_sub);
    /// vsubcuw - Vector Subtract and Write Carry-Out Unsigned Word
    vsubcuw => |a, b| map_u32(a, b, |x, y| mask::<u32>(x >= y));

    vmaxub => |a, b| map_u8(a, b, |x, y| x.max(y));
    vmaxuh => |a, b| map_u16(a, b, |x, y| x.max(y));
    vmaxuw => |a, b| map_u32(a, b, |x, y| x.max(y));
    vmaxsb => |a, b| map_i8(a, b, |x, y| x.max(y));
    vmaxsh => |a, b| map_i16(a, b, |x, y| x.max(y));
    vmaxsw => |a, b| map_i32(a, b, |x, y| x.max(y));
    vminub => |a, b| map_u8(a, b, |x, y| x.min(y));
    vminuh => |a, b| map_u16(a, b, |x, y| x.min(y));
    vminuw => |a, b| map_u32(a, b, |x, y| x.min(y));
    vminsb => |a, b| map_i8(a, b, |x, y| x.min(y));
    vminsh => |a, b| map_i16(a, b, |x, y| x.min(y));
    vminsw => |a, b| map_i32(a, b, |x, y| x.min(y));

    /// vavgub - Vector Average Unsigned Byte
    vavgub => |a, b| map_u8(a, b, |x, y| ((x as u32 + y as u32 + 1) >> 1) as u8);
    vavguh => |a, b| map_u16(a, b, |x, y| ((x as u32 + y as u32 + 1) >> 1) as u16);
    vavguw => |a, b| map_u32(a, b, |x, y| ((x as u64 + y as u64 + 1) >> 1) as u32);
    vavgsb => |a, b| map_i8(a, b, |x, y| ((x as i32 + y as i32 + 1) >> 1) as i8);
    vavgsh => |a, b| map_i16(a, b, |x, y| ((x as i32 + y as i32 + 1) >> 1) as i16);
    vavgsw => |a, b| map_i32(a, b, |x, y| ((x as i64 + y as i64 + 1) >> 1) as i32);

    /// vrlb - Vector Rotate Left Byte
    vrlb => |a, b| map_u8(a, b, |x, y| x.rotate_left((y & 7) as u32));
    vrlh => |a, b| map_u16(a, b, |x, y| x.rotate_left((y & 15) as u32));
    vrlw => |a, b| rotate_words(a, b);
    /// vslb - Vector Shift Left Byte
    vslb => |a, b| map_u8(a, b, |x, y| x.wrapping_shl(y as u32));
    vslh => |a, b| map_u16(a, b, |x, y| x.wrapping_shl(y as u32));
    vslw => |a, b| shift_left_words(a, b);
    vsrb => |a, b| map_u8(a, b, |x, y| x.wrapping_shr(y as u32));
    vsrh => |a, b| map_u16(a, b, |x, y| x.wrapping_shr(y as u32));
    vsrw => |a, b| shift_right_words(a, b);
    /// vsrab - Vector Shift Right Algebraic Byte
    vsrab => |a, b| map_i8(a, b, |x, y| x.wrapping_shr(y as u8 as u32));
    vsrah => |a, b| map_i16(a, b, |x, y| x.wrapping_shr(y as u16 as u32));
    vsraw => |a, b| shift_right_algebraic_words(a, b);

    /// vsl - Vector Shift Left by bits
    vsl => |a, b| Vector128::from_u128(a.as_u128() << (b.bytes[15] & 7));
    /// vsr - Vector Shift Right by bits
    vsr => |a, b| Vector128::from_u128(a.as_u128() >> (b.bytes[15] & 7));
    /// vslo - Vector Shift Left by Octet
    vslo => |a, b| Vector128::from_u128(a.as_u128() << (((b.bytes[15] >> 3) & 0xF) as u32 * 8));
    /// vsro - Vector Shift Right by Octet
    vsro => |a, b| Vector128::from_u128(a.as_u128() >> (((b.bytes[15] >> 3) & 0xF) as u32 * 8));

    vand => |a, b| a.and(b);
    vandc => |a, b| a.and(b.not());
    vor => |a, b| a.or(b);
    vnor => |a, b| a.or(b).not();
    vxor => |a, b| a.xor(b);

    /// vmrghb - Vector Merge High Byte
    vmrghb => |a, b| merge(a, b, 1, false);
    vmrghh => |a, b| merge(a, b, 2, false);
    vmrghw => |a, b| merge(a, b, 4, false);
    /// vmrglb - Vector Merge Low Byte
    vmrglb => |a, b| merge(a, b, 1, true);
    vmrglh => |a, b| merge(a, b, 2, true);
    vmrglw => |a, b| merge(a, b, 4, true);

    /// vpkuhum - Vector Pack Unsigned Halfword Unsigned Modulo
    vpkuhum => |a, b| pack_halfwords(a, b, false, |x| (x as u8, false)).0;
    /// vpkuwum - Vector Pack Unsigned Word Unsigned Modulo
    vpkuwum => |a, b| pack_words(a, b, false, |x| (x as u16, false)).0;
}

vx_sat_ops! {
    /// vaddubs - Vector Add Unsigned Byte Saturate
    vaddubs => |a, b| sat_u8(a, b, |x, y| sat::to_u8(x as i32 + y as i32));
    vadduhs => |a, b| sat_u16(a, b, |x, y| sat::to_u16(x as i32 + y as i32));
    vadduws => |a, b| sat_u32(a, b, |x, y| sat::to_u32(x as i64 + y as i64));
    vaddsbs => |a, b| sat_i8(a, b, |x, y| sat::to_i8(x as i32 + y as i32));
    vaddshs => |a, b| sat_i16(a, b, |x, y| sat::to_i16(x as i32 + y as i32));
    vaddsws => |a, b| sat_i32(a, b, |x, y| sat::to_i32(x as i64 + y as i64));
    /// vsububs - Vector Subtract Unsigned Byte Saturate
    vsububs => |a, b| sat_u8(a, b, |x, y| sat::to_u8(x as i32 - y as i32));
    vsubuhs => |a, b| sat_u16(a, b, |x, y| sat::to_u16(x as i32 - y as i32));
    vsubuws => |a, b| sat_u32(a, b, |x, y| sat::to_u32(x as i64 - y as i64));
    vsubsbs => |a, b| sat_i8(a, b, |x, y| sat::to_i8(x as i32 - y as i32));
    vsubshs => |a, b| sat_i16(a, b, |x, y| sat::to_i16(x as i32 - y as i32));
    vsubsws => |a, b| sat_i32(a, b, |x, y| sat::to_i32(x as i64 - y as i64));

    /// vpkuhus - Vector Pack Unsigned Halfword Unsigned Saturate
    vpkuhus => |a, b| pack_halfwords(a, b, false, sat::to_u8);
    /// vpkshus - Vector Pack Signed Halfword Unsigned Saturate
    vpkshus => |a, b| pack_halfwords(a, b, true, sat::to_u8);
    /// vpkshss - Vector Pack Signed Halfword Signed Saturate
    vpkshss => |a, b| pack_halfwords(a, b, true, |x| {
        let (v, s) = sat::to_i8(x);
        (v as u8, s)
    });
    /// vpkuwus - Vector Pack Unsigned Word Unsigned Saturate
    vpkuwus => |a, b| pack_words(a, b, false, |x| (x.min(0xFFFF) as u16, x > 0xFFFF));
    /// vpkswus - Vector Pack Signed Word Unsigned Saturate
    vpkswus => |a, b| pack_words(a, b, true, |x| sat::to_u16(x as i32));
    /// vpkswss - Vector Pack Signed Word Signed Saturate
    vpkswss => |a, b| pack_words(a, b, true, |x| {
        let (v, s) = sat::to_i16(x as i32);
        (v as u16, s)
    });
}

vx_fp_ops! {
    /// vaddfp - Vector Add Floating Point
    vaddfp => |a, b, nj| fp_binary(a, b, nj, |x, y| x + y);
    /// vsubfp - Vector Subtract Floating Point
    vsubfp => |a, b, nj| fp_binary(a, b, nj, |x, y| x - y);
    vmaxfp => |a, b, nj| fp_binary(a, b, nj, fp_max);
    vminfp => |a, b, nj| fp_binary(a, b, nj, fp_min);
    /// vrefp - Vector Reciprocal Estimate Floating Point
    vrefp => |_a, b, nj| fp_unary(b, nj, |x| 1.0 / x);
    /// vrsqrtefp - Vector Reciprocal Square Root Estimate Floating Point
    vrsqrtefp => |_a, b, nj| fp_unary(b, nj, |x| 1.0 / x.sqrt());
    /// vexptefp - Vector 2 Raised to the Exponent Estimate Floating Point
    vexptefp => |_a, b, nj| fp_unary(b, nj, f32::exp2);
    /// vlogefp - Vector Log Base 2 Estimate Floating Point
    vlogefp => |_a, b, nj| fp_unary(b, nj, f32::log2);
    /// vrfin - Vector Round to Floating-Point Integer Nearest
    vrfin => |_a, b, nj| fp_unary(b, nj, f32::round_ties_even);
    vrfiz => |_a, b, nj| fp_unary(b, nj, f32::trunc);
    vrfip => |_a, b, nj| fp_unary(b, nj, f32::ceil);
    vrfim => |_a, b, nj| fp_unary(b, nj, f32::floor);
}

fn pack_halfwords(
    a: Vector128,
    b: Vector128,
    signed: bool,
    clamp: impl Fn(i32) -> (u8, bool),
) -> (Vector128, bool) {
    let (ha, hb) = (a.u16x8(), b.u16x8());
    let mut saturated = false;
    let out = std::array::from_fn(|i| {
        let h = if i < 8 { ha[i] } else { hb[i - 8] };
        let x = if signed { h as i16 as i32 } else { h as i32 };
        let (v, s) = clamp(x);
        saturated |= s;
        v
    });
    (Vector128::from_u8x16(out), saturated)
}

fn pack_words(
    a: Vector128,
    b: Vector128,
    signed: bool,
    clamp: impl Fn(i64) -> (u16, bool),
) -> (Vector128, bool) {
    let (wa, wb) = (a.u32x4(), b.u32x4());
    let mut saturated = false;
    let out = std::array::from_fn(|i| {
        let w = if i < 4 { wa[i] } else { wb[i - 4] };
        let x = if signed { w as i32 as i64 } else { w as i64 };
        let (v, s) = clamp(x);
        saturated |= s;
        v
    });
    (Vector128::from_u16x8(out), saturated)
}

/// vupkhsb - Vector Unpack High Signed Byte
pub fn vupkhsb(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    unpack_bytes(cpu, word, 0)
}

/// vupklsb - Vector Unpack Low Signed Byte
pub fn vupklsb(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    unpack_bytes(cpu, word, 8)
}

fn unpack_bytes(cpu: &mut Cpu<'_>, word: u32, base: usize) -> ExecResult {
    cpu.require_vec()?;
    let (vd, _, vb, _) = va_form(word);
    let src = cpu.thread.vr[vb].i8x16();
    cpu.thread.vr[vd] = Vector128::from_i16x8(std::array::from_fn(|i| src[base + i] as i16));
    Ok(())
}

/// vupkhsh - Vector Unpack High Signed Halfword
pub fn vupkhsh(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    unpack_halfwords(cpu, word, 0)
}

/// vupklsh - Vector Unpack Low Signed Halfword
pub fn vupklsh(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    unpack_halfwords(cpu, word, 4)
}

fn unpack_halfwords(cpu: &mut Cpu<'_>, word: u32, base: usize) -> ExecResult {
    cpu.require_vec()?;
    let (vd, _, vb, _) = va_form(word);
    let src = cpu.thread.vr[vb].i16x8();
    cpu.thread.vr[vd] = Vector128::from_i32x4(std::array::from_fn(|i| src[base + i] as i32));
    Ok(())
}

// Splats: the immediate sits in the VA field

fn splat_element(cpu: &mut Cpu<'_>, word: u32, size: usize) -> ExecResult {
    cpu.require_vec()?;
    let (vd, uimm, vb, _) = va_form(word);
    cpu.thread.vr[vd] = splat(cpu.thread.vr[vb], size, uimm % (16 / size));
    Ok(())
}

/// vspltb - Vector Splat Byte
pub fn vspltb(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    splat_element(cpu, word, 1)
}

/// vsplth - Vector Splat Halfword
pub fn vsplth(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    splat_element(cpu, word, 2)
}

/// vspltw - Vector Splat Word
pub fn vspltw(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    splat_element(cpu, word, 4)
}

/// vspltisb - Vector Splat Immediate Signed Byte
pub fn vspltisb(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_vec()?;
    let (vd, imm, _, _) = va_form(word);
    cpu.thread.vr[vd] = Vector128::from_i8x16([simm5(imm as u32) as i8; 16]);
    Ok(())
}

/// vspltish - Vector Splat Immediate Signed Halfword
pub fn vspltish(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_vec()?;
    let (vd, imm, _, _) = va_form(word);
    cpu.thread.vr[vd] = Vector128::from_i16x8([simm5(imm as u32) as i16; 8]);
    Ok(())
}

/// vspltisw - Vector Splat Immediate Signed Word
pub fn vspltisw(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_vec()?;
    let (vd, imm, _, _) = va_form(word);
    cpu.thread.vr[vd] = Vector128::from_i32x4([simm5(imm as u32); 4]);
    Ok(())
}

// Conversions: the scale sits in the VA field

/// vcfux - Vector Convert From Unsigned Fixed-Point Word
pub fn vcfux(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_vec()?;
    let (vd, scale, vb, _) = va_form(word);
    cpu.thread.vr[vd] = from_unsigned_words(cpu.thread.vr[vb], scale as u32);
    Ok(())
}

/// vcfsx - Vector Convert From Signed Fixed-Point Word
pub fn vcfsx(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_vec()?;
    let (vd, scale, vb, _) = va_form(word);
    cpu.thread.vr[vd] = from_signed_words(cpu.thread.vr[vb], scale as u32);
    Ok(())
}

/// vctuxs - Vector Convert To Unsigned Fixed-Point Word Saturate
pub fn vctuxs(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_vec()?;
    let (vd, scale, vb, _) = va_form(word);
    let (result, saturated) = to_unsigned_words(cpu.thread.vr[vb], scale as u32);
    cpu.thread.vr[vd] = result;
    saturate(cpu, saturated);
    Ok(())
}

/// vctsxs - Vector Convert To Signed Fixed-Point Word Saturate
pub fn vctsxs(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_vec()?;
    let (vd, scale, vb, _) = va_form(word);
    let (result, saturated) = to_signed_words(cpu.thread.vr[vb], scale as u32);
    cpu.thread.vr[vd] = result;
    saturate(cpu, saturated);
    Ok(())
}

/// mfvscr - Move From VSCR
pub fn mfvscr(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_vec()?;
    let (vd, _, _, _) = va_form(word);
    cpu.thread.vr[vd] = Vector128::from_u32x4([0, 0, 0, cpu.thread.vscr]);
    Ok(())
}

/// mtvscr - Move To VSCR
pub fn mtvscr(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_vec()?;
    let (_, _, vb, _) = va_form(word);
    cpu.thread.vscr = cpu.thread.vr[vb].u32x4()[3] & (vscr::NJ | vscr::SAT);
    Ok(())
}

// VA form

/// vmladduhm - Vector Multiply-Low-Add Unsigned Halfword Modulo
pub fn vmladduhm(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_vec()?;
    let (vd, va, vb, vc) = va_form(word);
    let (a, b, c) = (cpu.thread.vr[va].u16x8(), cpu.thread.vr[vb].u16x8(), cpu.thread.vr[vc].u16x8());
    cpu.thread.vr[vd] = Vector128::from_u16x8(std::array::from_fn(|i| {
        a[i].wrapping_mul(b[i]).wrapping_add(c[i])
    }));
    Ok(())
}

/// vsel - Vector Select
pub fn vsel(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_vec()?;
    let (vd, va, vb, vc) = va_form(word);
    cpu.thread.vr[vd] = select(cpu.thread.vr[va], cpu.thread.vr[vb], cpu.thread.vr[vc]);
    Ok(())
}

/// vperm - Vector Permute
pub fn vperm(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_vec()?;
    let (vd, va, vb, vc) = va_form(word);
    cpu.thread.vr[vd] = permute(cpu.thread.vr[va], cpu.thread.vr[vb], cpu.thread.vr[vc]);
    Ok(())
}

/// vsldoi - Vector Shift Left Double by Octet Immediate
pub fn vsldoi(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_vec()?;
    let (vd, va, vb, shb) = va_form(word);
    let src = concat(cpu.thread.vr[va], cpu.thread.vr[vb]);
    let shb = shb & 0xF;
    cpu.thread.vr[vd] = Vector128::from_u8x16(std::array::from_fn(|i| src[i + shb]));
    Ok(())
}

/// vmaddfp - Vector Multiply-Add Floating Point (vA * vC + vB)
pub fn vmaddfp(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_vec()?;
    let (vd, va, vb, vc) = va_form(word);
    let nj = nj(cpu);
    cpu.thread.vr[vd] = fp_madd(cpu.thread.vr[va], cpu.thread.vr[vb], cpu.thread.vr[vc], nj);
    Ok(())
}

/// vnmsubfp - Vector Negative Multiply-Subtract Floating Point
pub fn vnmsubfp(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_vec()?;
    let (vd, va, vb, vc) = va_form(word);
    let nj = nj(cpu);
    cpu.thread.vr[vd] = fp_nmsub(cpu.thread.vr[va], cpu.thread.vr[vb], cpu.thread.vr[vc], nj);
    Ok(())
}

// VXR form compares

vcmp_ops! {
    /// vcmpequb - Vector Compare Equal Unsigned Byte
    vcmpequb => |a, b| map_u8(a, b, |x, y| all_ones_u8(x == y));
    vcmpequh => |a, b| map_u16(a, b, |x, y| all_ones_u16(x == y));
    vcmpequw => |a, b| compare_equal_words(a, b);
    /// vcmpgtub - Vector Compare Greater Than Unsigned Byte
    vcmpgtub => |a, b| map_u8(a, b, |x, y| all_ones_u8(x > y));
    vcmpgtuh => |a, b| map_u16(a, b, |x, y| all_ones_u16(x > y));
    vcmpgtuw => |a, b| map_u32(a, b, |x, y| all_ones_u32(x > y));
    /// vcmpgtsb - Vector Compare Greater Than Signed Byte
    vcmpgtsb => |a, b| map_i8(a, b, |x, y| -(mask::<i8>(x > y)));
    vcmpgtsh => |a, b| map_i16(a, b, |x, y| -(mask::<i16>(x > y)));
    vcmpgtsw => |a, b| map_i32(a, b, |x, y| -(mask::<i32>(x > y)));
    /// vcmpeqfp - Vector Compare Equal To Floating Point
    vcmpeqfp => |a, b| fp_compare(a, b, |x, y| x == y);
    vcmpgefp => |a, b| fp_compare(a, b, |x, y| x >= y);
    vcmpgtfp => |a, b| fp_compare(a, b, |x, y| x > y);
}

/// vcmpbfp - Vector Compare Bounds Floating Point
///
/// Bit 0 of each word is set when the lane exceeds +b, bit 1 when it is
/// below -b. The record form sets CR6[2] only when every lane is in bounds.
pub fn vcmpbfp(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.require_vec()?;
    let (vd, va, vb, _) = va_form(word);
    let (a, b) = (cpu.thread.vr[va].f32x4(), cpu.thread.vr[vb].f32x4());
    let result = Vector128::from_u32x4(std::array::from_fn(|i| {
        let (x, y) = (a[i], b[i]);
        let le = (x <= y) as u32;
        let ge = (x >= -y) as u32;
        ((le ^ 1) << 31) | ((ge ^ 1) << 30)
    }));
    cpu.thread.vr[vd] = result;
    if vxr_rc(word) {
        let in_bounds = (result.as_u128() == 0) as u32;
        cpu.thread.set_cr_field(6, in_bounds << 1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_words() {
        let a = Vector128::from_u32x4([1, 2, 3, 4]);
        let b = Vector128::from_u32x4([5, 6, 7, 8]);
        assert_eq!(merge(a, b, 4, false).u32x4(), [1, 5, 2, 6]);
        assert_eq!(merge(a, b, 4, true).u32x4(), [3, 7, 4, 8]);
    }

    #[test]
    fn test_merge_bytes() {
        let a = Vector128::from_u8x16(std::array::from_fn(|i| i as u8));
        let b = Vector128::from_u8x16(std::array::from_fn(|i| 0x10 + i as u8));
        let high = merge(a, b, 1, false).u8x16();
        assert_eq!(&high[..4], &[0x00, 0x10, 0x01, 0x11]);
    }

    #[test]
    fn test_permute_selects_from_both() {
        let a = Vector128::from_u8x16(std::array::from_fn(|i| i as u8));
        let b = Vector128::from_u8x16(std::array::from_fn(|i| 0x80 + i as u8));
        let c = Vector128::from_u8x16(std::array::from_fn(|i| (31 - i) as u8));
        let out = permute(a, b, c).u8x16();
        assert_eq!(out[0], 0x8F);
        assert_eq!(out[15], 0x80);
    }

    #[test]
    fn test_splat_and_simm() {
        let v = Vector128::from_u32x4([1, 2, 3, 4]);
        assert_eq!(splat(v, 4, 2).u32x4(), [3; 4]);
        assert_eq!(simm5(0x1F), -1);
        assert_eq!(simm5(0x0F), 15);
    }

    #[test]
    fn test_convert_saturates() {
        let v = Vector128::from_f32x4([1.5, -3.0e10, 3.0e10, f32::NAN]);
        let (out, saturated) = to_signed_words(v, 0);
        assert!(saturated);
        assert_eq!(out.i32x4(), [1, i32::MIN, i32::MAX, 0]);

        let (out, saturated) = to_unsigned_words(Vector128::from_f32x4([2.0, 0.0, 1.0, 0.5]), 1);
        assert!(!saturated);
        assert_eq!(out.u32x4(), [4, 0, 2, 1]);
    }

    #[test]
    fn test_pack_saturates() {
        let a = Vector128::from_i16x8([300, -5, 10, 0, 0, 0, 0, 0]);
        let (out, saturated) = pack_halfwords(a, Vector128::ZERO, true, sat::to_u8);
        assert!(saturated);
        assert_eq!(&out.u8x16()[..3], &[255, 0, 10]);
    }
}
