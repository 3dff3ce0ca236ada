//! Floating-point register format helpers
//!
//! FPRs always hold double-precision bit patterns. Single-precision loads
//! and stores convert with the architected bit-level algorithms instead of
//! a host cast, which would quiet signalling NaNs and flush nothing.

/// FPSCR bits
pub mod fpscr {
    pub const FX: u32 = 0x8000_0000;
    pub const FEX: u32 = 0x4000_0000;
    pub const VX: u32 = 0x2000_0000;
    pub const OX: u32 = 0x1000_0000;
    pub const UX: u32 = 0x0800_0000;
    pub const ZX: u32 = 0x0400_0000;
    pub const XX: u32 = 0x0200_0000;
    pub const VXSNAN: u32 = 0x0100_0000;
    pub const VXISI: u32 = 0x0080_0000;
    pub const VXIDI: u32 = 0x0040_0000;
    pub const VXZDZ: u32 = 0x0020_0000;
    pub const VXIMZ: u32 = 0x0010_0000;
    pub const VXVC: u32 = 0x0008_0000;
    pub const FR: u32 = 0x0004_0000;
    pub const FI: u32 = 0x0002_0000;
    /// FPRF: class and condition code
    pub const FPRF: u32 = 0x0001_F000;
    pub const VXSOFT: u32 = 0x0000_0400;
    pub const VXSQRT: u32 = 0x0000_0200;
    pub const VXCVI: u32 = 0x0000_0100;
    pub const VE: u32 = 0x0000_0080;
    pub const OE: u32 = 0x0000_0040;
    pub const UE: u32 = 0x0000_0020;
    pub const ZE: u32 = 0x0000_0010;
    pub const XE: u32 = 0x0000_0008;
    pub const NI: u32 = 0x0000_0004;
    pub const RN: u32 = 0x0000_0003;

    /// All invalid-operation sticky bits
    pub const VX_ALL: u32 =
        VXSNAN | VXISI | VXIDI | VXZDZ | VXIMZ | VXVC | VXSOFT | VXSQRT | VXCVI;

    /// Recompute the summary bits after exception bits changed
    pub fn update_summary(value: u32) -> u32 {
        let mut value = value & !(VX | FEX);
        if value & VX_ALL != 0 {
            value |= VX;
        }
        // OX/UX/ZX/XX line up with OE/UE/ZE/XE after shifting down by 22
        let enabled = (value >> 22) & value & (OE | UE | ZE | XE);
        let vx_enabled = value & VX != 0 && value & VE != 0;
        if enabled != 0 || vx_enabled {
            value |= FEX;
        }
        value
    }
}

/// Expand a single-precision word to the double-precision FPR format
pub fn single_to_double(word: u32) -> u64 {
    let exp = (word >> 23) & 0xFF;
    let frac = (word & 0x7F_FFFF) as u64;
    let sign = ((word >> 31) as u64) << 63;

    if exp == 0 && frac != 0 {
        // Denormal: normalize into the wider exponent range
        let mut e: i64 = -126;
        let mut f = frac << 29;
        while f & (1 << 52) == 0 {
            f <<= 1;
            e -= 1;
        }
        return sign | (((e + 1023) as u64) << 52) | (f & 0x000F_FFFF_FFFF_FFFF);
    }

    // Zero, infinity and NaN replicate exponent bit 1; normals rebias by
    // replicating its complement.
    let w = word as u64;
    let bit1 = (w >> 30) & 1;
    let fill = if exp == 0 || exp == 0xFF { bit1 } else { bit1 ^ 1 };
    ((w & 0xC000_0000) << 32) | (fill * 0x3800_0000_0000_0000) | ((w & 0x3FFF_FFFF) << 29)
}

/// Narrow a double-precision FPR value to a single-precision word as stfs
/// does: truncating, denormalizing small values
pub fn double_to_single(bits: u64) -> u32 {
    let exp = ((bits >> 52) & 0x7FF) as i64;
    if exp > 896 || bits & 0x7FFF_FFFF_FFFF_FFFF == 0 {
        return (((bits >> 32) & 0xC000_0000) | ((bits >> 29) & 0x3FFF_FFFF)) as u32;
    }
    if exp >= 874 {
        let sign = ((bits >> 63) as u32) << 31;
        let mut frac = (1u64 << 52) | (bits & 0x000F_FFFF_FFFF_FFFF);
        let mut e = exp - 1023;
        while e < -126 {
            frac >>= 1;
            e += 1;
        }
        return sign | ((frac >> 29) as u32 & 0x7F_FFFF);
    }
    // Too small even for a denormal
    ((bits >> 32) as u32) & 0x8000_0000
}

/// Round a double to single precision and back, as frsp and the
/// single-precision arithmetic forms do
#[inline]
pub fn round_to_single(value: f64) -> f64 {
    value as f32 as f64
}

/// FPRF class/condition code for a result
pub fn fprf_of(value: f64) -> u32 {
    let class = if value.is_nan() {
        0b10001
    } else if value.is_infinite() {
        if value.is_sign_negative() { 0b01001 } else { 0b00101 }
    } else if value == 0.0 {
        if value.is_sign_negative() { 0b10010 } else { 0b00010 }
    } else if value.is_subnormal() {
        if value.is_sign_negative() { 0b11000 } else { 0b10100 }
    } else if value < 0.0 {
        0b01000
    } else {
        0b00100
    };
    class << 12
}

/// True if the bit pattern is a signalling NaN
#[inline]
pub fn is_snan(bits: u64) -> bool {
    (bits >> 52) & 0x7FF == 0x7FF && bits & 0x000F_FFFF_FFFF_FFFF != 0 && bits & (1 << 51) == 0
}

/// Convert to a signed integer with saturation, per fctiw/fctid
pub fn to_i64_saturating(value: f64, min: i64, max: i64) -> (i64, bool) {
    if value.is_nan() {
        return (min, true);
    }
    if value >= max as f64 + 1.0 {
        (max, true)
    } else if value < min as f64 {
        (min, true)
    } else {
        (value as i64, false)
    }
}

/// Round according to FPSCR[RN]
pub fn round_mode(value: f64, rn: u32) -> f64 {
    match rn & 3 {
        0 => {
            let r = value.round();
            // Ties go to even
            if (value - value.trunc()).abs() == 0.5 {
                2.0 * (value / 2.0).round()
            } else {
                r
            }
        }
        1 => value.trunc(),
        2 => value.ceil(),
        _ => value.floor(),
    }
}
