//! VMX/VMX128 vector register
//!
//! Xenon extends VMX to 128 vector registers. Storage is the 16 bytes in
//! big-endian memory order, so element 0 of every lane view is the lowest
//! addressed one and `lvx`/`stvx` are plain byte copies.

use bytemuck::{Pod, Zeroable};

/// 128-bit vector register
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C, align(16))]
pub struct Vector128 {
    pub bytes: [u8; 16],
}

impl Vector128 {
    pub const ZERO: Self = Self { bytes: [0; 16] };

    /// Build from raw big-endian bytes
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self { bytes }
    }

    pub fn u8x16(&self) -> [u8; 16] {
        self.bytes
    }

    pub fn from_u8x16(values: [u8; 16]) -> Self {
        Self { bytes: values }
    }

    pub fn i8x16(&self) -> [i8; 16] {
        self.bytes.map(|b| b as i8)
    }

    pub fn from_i8x16(values: [i8; 16]) -> Self {
        Self { bytes: values.map(|v| v as u8) }
    }

    /// Halfword lanes, element 0 most significant
    pub fn u16x8(&self) -> [u16; 8] {
        std::array::from_fn(|i| u16::from_be_bytes([self.bytes[2 * i], self.bytes[2 * i + 1]]))
    }

    pub fn from_u16x8(values: [u16; 8]) -> Self {
        let mut v = Self::ZERO;
        for (i, value) in values.iter().enumerate() {
            v.bytes[2 * i..2 * i + 2].copy_from_slice(&value.to_be_bytes());
        }
        v
    }

    pub fn i16x8(&self) -> [i16; 8] {
        self.u16x8().map(|h| h as i16)
    }

    pub fn from_i16x8(values: [i16; 8]) -> Self {
        Self::from_u16x8(values.map(|h| h as u16))
    }

    /// Word lanes, element 0 most significant
    pub fn u32x4(&self) -> [u32; 4] {
        std::array::from_fn(|i| {
            u32::from_be_bytes([
                self.bytes[4 * i],
                self.bytes[4 * i + 1],
                self.bytes[4 * i + 2],
                self.bytes[4 * i + 3],
            ])
        })
    }

    pub fn from_u32x4(values: [u32; 4]) -> Self {
        let mut v = Self::ZERO;
        for (i, value) in values.iter().enumerate() {
            v.bytes[4 * i..4 * i + 4].copy_from_slice(&value.to_be_bytes());
        }
        v
    }

    pub fn i32x4(&self) -> [i32; 4] {
        self.u32x4().map(|w| w as i32)
    }

    pub fn from_i32x4(values: [i32; 4]) -> Self {
        Self::from_u32x4(values.map(|w| w as u32))
    }

    pub fn f32x4(&self) -> [f32; 4] {
        self.u32x4().map(f32::from_bits)
    }

    pub fn from_f32x4(values: [f32; 4]) -> Self {
        Self::from_u32x4(values.map(f32::to_bits))
    }

    /// Whole register as a big-endian 128-bit integer
    pub fn as_u128(&self) -> u128 {
        u128::from_be_bytes(self.bytes)
    }

    pub fn from_u128(value: u128) -> Self {
        Self { bytes: value.to_be_bytes() }
    }

    pub fn and(self, other: Self) -> Self {
        Self::from_u128(self.as_u128() & other.as_u128())
    }

    pub fn or(self, other: Self) -> Self {
        Self::from_u128(self.as_u128() | other.as_u128())
    }

    pub fn xor(self, other: Self) -> Self {
        Self::from_u128(self.as_u128() ^ other.as_u128())
    }

    pub fn not(self) -> Self {
        Self::from_u128(!self.as_u128())
    }
}

/// Clamp helpers used by the saturating VMX forms. Each returns the clamped
/// value and whether clamping happened.
pub mod sat {
    #[inline]
    pub fn to_u8(v: i32) -> (u8, bool) {
        if v > u8::MAX as i32 {
            (u8::MAX, true)
        } else if v < 0 {
            (0, true)
        } else {
            (v as u8, false)
        }
    }

    #[inline]
    pub fn to_i8(v: i32) -> (i8, bool) {
        if v > i8::MAX as i32 {
            (i8::MAX, true)
        } else if v < i8::MIN as i32 {
            (i8::MIN, true)
        } else {
            (v as i8, false)
        }
    }

    #[inline]
    pub fn to_u16(v: i32) -> (u16, bool) {
        if v > u16::MAX as i32 {
            (u16::MAX, true)
        } else if v < 0 {
            (0, true)
        } else {
            (v as u16, false)
        }
    }

    #[inline]
    pub fn to_i16(v: i32) -> (i16, bool) {
        if v > i16::MAX as i32 {
            (i16::MAX, true)
        } else if v < i16::MIN as i32 {
            (i16::MIN, true)
        } else {
            (v as i16, false)
        }
    }

    #[inline]
    pub fn to_u32(v: i64) -> (u32, bool) {
        if v > u32::MAX as i64 {
            (u32::MAX, true)
        } else if v < 0 {
            (0, true)
        } else {
            (v as u32, false)
        }
    }

    #[inline]
    pub fn to_i32(v: i64) -> (i32, bool) {
        if v > i32::MAX as i64 {
            (i32::MAX, true)
        } else if v < i32::MIN as i64 {
            (i32::MIN, true)
        } else {
            (v as i32, false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u32x4_lane_order() {
        let v = Vector128::from_u32x4([0x1234_5678, 0x9ABC_DEF0, 0x1122_3344, 0x5566_7788]);
        assert_eq!(v.bytes[0], 0x12);
        assert_eq!(v.bytes[15], 0x88);
        assert_eq!(v.u32x4(), [0x1234_5678, 0x9ABC_DEF0, 0x1122_3344, 0x5566_7788]);
        assert_eq!(v.u16x8()[1], 0x5678);
    }

    #[test]
    fn test_f32x4() {
        let v = Vector128::from_f32x4([1.0, 2.0, -3.5, 4.0]);
        assert_eq!(v.f32x4(), [1.0, 2.0, -3.5, 4.0]);
        assert_eq!(v.u32x4()[0], 0x3F80_0000);
    }

    #[test]
    fn test_pod_cast() {
        let v = Vector128::from_u128(0x0001_0203_0405_0607_0809_0A0B_0C0D_0E0F);
        let bytes: [u8; 16] = bytemuck::cast(v);
        assert_eq!(bytes[3], 3);
        assert_eq!(bytemuck::bytes_of(&v).len(), 16);
    }

    #[test]
    fn test_saturation() {
        assert_eq!(sat::to_u8(300), (255, true));
        assert_eq!(sat::to_u8(-1), (0, true));
        assert_eq!(sat::to_i8(-129), (-128, true));
        assert_eq!(sat::to_i16(100), (100, false));
        assert_eq!(sat::to_u32(-5), (0, true));
    }
}
