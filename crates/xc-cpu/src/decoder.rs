//! Instruction decoder
//!
//! Decoding is a single lookup into a dense table indexed by the primary
//! opcode and the low 11 bits of the instruction word (see [`index`]). The
//! table is built once from [`ENTRIES`]; VMX128 encodings on primary opcodes
//! 4, 5 and 6 land on [`Opcode::Vmx128`] and are resolved by
//! [`decode_vmx128`].
//!
//! Field extractors below use the IBM bit numbering of the ISA documents
//! (bit 0 is the most significant) through [`bits`].

use once_cell::sync::Lazy;

use crate::opcodes::{Entry, Opcode, ENTRIES};

/// Size of the primary decode table
pub const TABLE_SIZE: usize = 1 << 17;

/// The canonical no-op, `ori r0,r0,0`
pub const NOP: u32 = 0x6000_0000;

/// Two entries claiming the same table slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeConflict {
    pub index: usize,
    pub existing: Opcode,
    pub incoming: Opcode,
}

impl std::fmt::Display for DecodeConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "decode slot 0x{:05x} claimed by both {} and {}",
            self.index,
            self.existing.mnemonic(),
            self.incoming.mnemonic()
        )
    }
}

/// Table index of an instruction word: primary opcode in bits 0-5, the low
/// 11 bits of the word above it
#[inline(always)]
pub const fn index(word: u32) -> usize {
    (((word >> 26) | (word << 6)) & 0x1FFFF) as usize
}

/// Dense decode table
pub struct DecodeTable {
    slots: Box<[u16]>,
}

impl DecodeTable {
    /// Build a table from `entries`, rejecting overlapping encodings
    pub fn build(entries: &[Entry]) -> Result<Self, DecodeConflict> {
        let mut slots = vec![Opcode::Invalid as u16; TABLE_SIZE].into_boxed_slice();

        for entry in entries {
            let fixed_mask = ((1u32 << entry.width) - 1) << entry.shift;
            let fixed = entry.xo << entry.shift;
            for low in 0..(1u32 << 11) {
                if low & fixed_mask != fixed {
                    continue;
                }
                let slot = (entry.primary | (low << 6)) as usize;
                let existing = Opcode::from_index(slots[slot]);
                if existing != Opcode::Invalid {
                    return Err(DecodeConflict { index: slot, existing, incoming: entry.op });
                }
                slots[slot] = entry.op as u16;
            }
        }

        // Whatever the standard VMX encodings leave free on primary 4, and all
        // of 5 and 6, belongs to VMX128.
        for low in 0..(1u32 << 11) {
            for primary in [4u32, 5, 6] {
                let slot = (primary | (low << 6)) as usize;
                if slots[slot] == Opcode::Invalid as u16 {
                    slots[slot] = Opcode::Vmx128 as u16;
                }
            }
        }

        Ok(Self { slots })
    }

    /// Raw table lookup, before any secondary decode
    #[inline(always)]
    pub fn lookup(&self, word: u32) -> Opcode {
        Opcode::from_index(self.slots[index(word)])
    }

    /// Number of slots mapped to `op`
    pub fn count(&self, op: Opcode) -> usize {
        self.slots.iter().filter(|&&s| s == op as u16).count()
    }
}

static TABLE: Lazy<DecodeTable> = Lazy::new(|| match DecodeTable::build(ENTRIES) {
    Ok(table) => table,
    Err(conflict) => {
        tracing::error!("Decoder table rejected: {}", conflict);
        DecodeTable { slots: vec![Opcode::Invalid as u16; TABLE_SIZE].into_boxed_slice() }
    }
});

/// Force table construction
pub fn init() {
    Lazy::force(&TABLE);
}

/// Decode an instruction word
#[inline]
pub fn decode(word: u32) -> Opcode {
    if word == NOP {
        return Opcode::Nop;
    }
    match TABLE.lookup(word) {
        Opcode::Vmx128 => decode_vmx128(word),
        op => op,
    }
}

/// Secondary decode for VMX128 encodings
pub fn decode_vmx128(word: u32) -> Opcode {
    use Opcode::*;

    match word >> 26 {
        4 => match word & 0x7F3 {
            0b000_0000_0011 => Lvsl128,
            0b000_0100_0011 => Lvsr128,
            0b000_1000_0011 => Lvewx128,
            0b000_1100_0011 => Lvx128,
            0b001_1000_0011 => Stvewx128,
            0b001_1100_0011 => Stvx128,
            0b010_1100_0011 => Lvxl128,
            0b011_1100_0011 => Stvxl128,
            _ => Invalid,
        },
        5 => {
            if (bits(word, 22, 22) << 5) | bits(word, 27, 27) == 0 {
                return Vperm128;
            }
            match (bits(word, 22, 25) << 2) | bits(word, 27, 27) {
                0b000001 => Vaddfp128,
                0b000101 => Vsubfp128,
                0b001001 => Vmulfp128,
                0b001101 => Vmaddfp128,
                0b010101 => Vnmsubfp128,
                0b100001 => Vand128,
                0b100101 => Vandc128,
                0b101001 => Vnor128,
                0b101101 => Vor128,
                0b110001 => Vxor128,
                0b110101 => Vsel128,
                _ => Invalid,
            }
        }
        6 => {
            match bits(word, 21, 27) {
                0b0100011 => return Vcfpsxws128,
                0b0101011 => return Vcsxwfp128,
                0b1100011 => return Vrefp128,
                0b1100111 => return Vrsqrtefp128,
                0b1110011 => return Vspltw128,
                0b1110111 => return Vspltisw128,
                _ => {}
            }
            match (bits(word, 22, 24) << 3) | bits(word, 27, 27) {
                0b000000 => return Vcmpeqfp128,
                0b001000 => return Vcmpgefp128,
                0b010000 => return Vcmpgtfp128,
                0b100000 => return Vcmpequw128,
                _ => {}
            }
            match (bits(word, 22, 25) << 2) | bits(word, 27, 27) {
                0b000101 => Vrlw128,
                0b001101 => Vslw128,
                0b010101 => Vsraw128,
                0b011101 => Vsrw128,
                0b101000 => Vmaxfp128,
                0b101100 => Vminfp128,
                0b110000 => Vmrghw128,
                0b110100 => Vmrglw128,
                _ => Invalid,
            }
        }
        _ => Invalid,
    }
}

/// Extract bits `b..=e` (IBM numbering, bit 0 most significant)
#[inline(always)]
pub const fn bits(word: u32, b: u32, e: u32) -> u32 {
    (word >> (31 - e)) & (u32::MAX >> (31 - (e - b)))
}

/// Primary opcode
#[inline(always)]
pub const fn primary(word: u32) -> u32 {
    word >> 26
}

/// Record bit
#[inline(always)]
pub const fn rc(word: u32) -> bool {
    word & 1 != 0
}

/// OE bit of XO-form
#[inline(always)]
pub const fn oe(word: u32) -> bool {
    word & 0x400 != 0
}

/// D-form: (RT/RS, RA, D)
#[inline(always)]
pub fn d_form(word: u32) -> (usize, usize, i16) {
    (bits(word, 6, 10) as usize, bits(word, 11, 15) as usize, word as u16 as i16)
}

/// D-form with unsigned immediate: (RS, RA, UI)
#[inline(always)]
pub fn d_form_u(word: u32) -> (usize, usize, u16) {
    (bits(word, 6, 10) as usize, bits(word, 11, 15) as usize, word as u16)
}

/// DS-form: (RT/RS, RA, DS sign-extended and scaled)
#[inline(always)]
pub fn ds_form(word: u32) -> (usize, usize, i64) {
    let ds = (word & 0xFFFC) as u16 as i16 as i64;
    (bits(word, 6, 10) as usize, bits(word, 11, 15) as usize, ds)
}

/// X-form: (RT/RS, RA, RB)
#[inline(always)]
pub fn x_form(word: u32) -> (usize, usize, usize) {
    (
        bits(word, 6, 10) as usize,
        bits(word, 11, 15) as usize,
        bits(word, 16, 20) as usize,
    )
}

/// XO-form: (RT, RA, RB, OE, Rc)
#[inline(always)]
pub fn xo_form(word: u32) -> (usize, usize, usize, bool, bool) {
    let (rt, ra, rb) = x_form(word);
    (rt, ra, rb, oe(word), rc(word))
}

/// I-form: (LI sign-extended, AA, LK)
#[inline(always)]
pub fn i_form(word: u32) -> (i64, bool, bool) {
    let li = (((word & 0x03FF_FFFC) << 6) as i32 >> 6) as i64;
    (li, word & 2 != 0, word & 1 != 0)
}

/// B-form: (BO, BI, BD sign-extended, AA, LK)
#[inline(always)]
pub fn b_form(word: u32) -> (u32, u32, i64, bool, bool) {
    let bd = (word & 0xFFFC) as u16 as i16 as i64;
    (bits(word, 6, 10), bits(word, 11, 15), bd, word & 2 != 0, word & 1 != 0)
}

/// XL-form branch: (BO, BI, BH, LK)
#[inline(always)]
pub fn xl_form(word: u32) -> (u32, u32, u32, bool) {
    (bits(word, 6, 10), bits(word, 11, 15), bits(word, 19, 20), word & 1 != 0)
}

/// M-form: (RS, RA, RB/SH, MB, ME, Rc)
#[inline(always)]
pub fn m_form(word: u32) -> (usize, usize, u32, u32, u32, bool) {
    (
        bits(word, 6, 10) as usize,
        bits(word, 11, 15) as usize,
        bits(word, 16, 20),
        bits(word, 21, 25),
        bits(word, 26, 30),
        rc(word),
    )
}

/// MD-form: (RS, RA, SH, MB/ME, Rc), 6-bit fields reassembled
#[inline(always)]
pub fn md_form(word: u32) -> (usize, usize, u32, u32, bool) {
    let sh = bits(word, 16, 20) | (bits(word, 30, 30) << 5);
    let mbe = bits(word, 21, 26);
    let mb = (mbe >> 1) | ((mbe & 1) << 5);
    (bits(word, 6, 10) as usize, bits(word, 11, 15) as usize, sh, mb, rc(word))
}

/// MDS-form: (RS, RA, RB, MB/ME, Rc)
#[inline(always)]
pub fn mds_form(word: u32) -> (usize, usize, usize, u32, bool) {
    let mbe = bits(word, 21, 26);
    let mb = (mbe >> 1) | ((mbe & 1) << 5);
    let (rs, ra, rb) = x_form(word);
    (rs, ra, rb, mb, rc(word))
}

/// XS-form shift amount
#[inline(always)]
pub fn xs_sh(word: u32) -> u32 {
    bits(word, 16, 20) | (bits(word, 30, 30) << 5)
}

/// A-form: (FRT, FRA, FRB, FRC, Rc)
#[inline(always)]
pub fn a_form(word: u32) -> (usize, usize, usize, usize, bool) {
    let (frt, fra, frb) = x_form(word);
    (frt, fra, frb, bits(word, 21, 25) as usize, rc(word))
}

/// Compare field selectors: (BF, L)
#[inline(always)]
pub fn cmp_fields(word: u32) -> (usize, bool) {
    (bits(word, 6, 8) as usize, bits(word, 10, 10) != 0)
}

/// SPR number from an XFX-form instruction (halves swapped in encoding)
#[inline(always)]
pub fn spr_field(word: u32) -> u32 {
    let raw = bits(word, 11, 20);
    ((raw & 0x1F) << 5) | ((raw >> 5) & 0x1F)
}

/// VA-form: (VD, VA, VB, VC)
#[inline(always)]
pub fn va_form(word: u32) -> (usize, usize, usize, usize) {
    let (vd, va, vb) = x_form(word);
    (vd, va, vb, bits(word, 21, 25) as usize)
}

/// VXR record bit
#[inline(always)]
pub fn vxr_rc(word: u32) -> bool {
    bits(word, 21, 21) != 0
}

/// VMX128 destination register (0-127)
#[inline(always)]
pub fn vd128(word: u32) -> usize {
    (bits(word, 6, 10) | (bits(word, 28, 29) << 5)) as usize
}

/// VMX128 first source register (0-127)
#[inline(always)]
pub fn va128(word: u32) -> usize {
    (bits(word, 11, 15) | (bits(word, 26, 26) << 5) | (bits(word, 21, 21) << 6)) as usize
}

/// VMX128 second source register (0-127)
#[inline(always)]
pub fn vb128(word: u32) -> usize {
    (bits(word, 16, 20) | (bits(word, 30, 31) << 5)) as usize
}

/// VMX128 third source register for vperm128 (VC in bits 23-25)
#[inline(always)]
pub fn vc128(word: u32) -> usize {
    bits(word, 23, 25) as usize
}

/// VMX128 immediate (bits 11-15)
#[inline(always)]
pub fn vmx128_imm(word: u32) -> u32 {
    bits(word, 11, 15)
}

/// VMX128 compare record bit
#[inline(always)]
pub fn vmx128_rc(word: u32) -> bool {
    bits(word, 25, 25) != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_builds_without_conflicts() {
        let table = DecodeTable::build(ENTRIES);
        assert!(table.is_ok(), "{}", table.err().map(|c| c.to_string()).unwrap_or_default());
    }

    #[test]
    fn test_decode_basic() {
        assert_eq!(decode(0x3860_0001), Opcode::Addi); // li r3,1
        assert_eq!(decode(0x4E80_0020), Opcode::Bclr); // blr
        assert_eq!(decode(0x7C63_2214), Opcode::Add); // add r3,r3,r4
        assert_eq!(decode(0x7C63_2215), Opcode::Add); // add. r3,r3,r4
        assert_eq!(decode(0x7C63_2614), Opcode::Add); // addo r3,r3,r4
        assert_eq!(decode(0x7C08_02A6), Opcode::Mfspr); // mflr r0
        assert_eq!(decode(NOP), Opcode::Nop);
        assert_eq!(decode(0x6000_0001), Opcode::Ori);
        assert_eq!(decode(0x4400_0002), Opcode::Sc);
        assert_eq!(decode(0x0000_0000), Opcode::Invalid);
    }

    #[test]
    fn test_decode_64bit_forms() {
        assert_eq!(decode(0xE861_0008), Opcode::Ld); // ld r3,8(r1)
        assert_eq!(decode(0xE861_0009), Opcode::Ldu);
        assert_eq!(decode(0xF821_FF81), Opcode::Stdu); // stdu r1,-128(r1)
        assert_eq!(decode(0x7863_0020), Opcode::Rldicl); // clrldi r3,r3,32
        assert_eq!(decode(0x7C63_FE76), Opcode::Sradi);
        assert_eq!(decode(0x7C63_FE74), Opcode::Sradi);
    }

    #[test]
    fn test_decode_vmx() {
        assert_eq!(decode(0x1000_0200), Opcode::Vaddubs);
        assert_eq!(decode(0x1000_0484), Opcode::Vor);
        assert_eq!(decode(0x1000_002B), Opcode::Vperm);
        assert_eq!(decode(0x1000_0006), Opcode::Vcmpequb);
        assert_eq!(decode(0x1000_0406), Opcode::Vcmpequb); // record form
        assert_eq!(decode(0x1000_0604), Opcode::Mfvscr);
    }

    #[test]
    fn test_decode_vmx128() {
        // lvx128 v0,r0,r0 and with VD128h set
        assert_eq!(decode(0x1000_00C3), Opcode::Lvx128);
        assert_eq!(decode(0x1000_00CF), Opcode::Lvx128);
        assert_eq!(decode(0x1000_01C3), Opcode::Stvx128);
        assert_eq!(decode(0x1400_0000), Opcode::Vperm128);
        assert_eq!(decode(0x1400_0010), Opcode::Vaddfp128);
        assert_eq!(decode(0x1400_0090), Opcode::Vmulfp128);
        assert_eq!(decode(0x1400_0210), Opcode::Vand128);
        assert_eq!(decode(0x1800_0730), Opcode::Vspltw128);
        assert_eq!(decode(0x1800_0300), Opcode::Vmrghw128);
        assert_eq!(decode(0x1800_0000), Opcode::Vcmpeqfp128);
    }

    #[test]
    fn test_field_extraction() {
        // addi r3,r1,-16
        assert_eq!(d_form(0x3861_FFF0), (3, 1, -16));
        // b -4
        assert_eq!(i_form(0x4BFF_FFFC), (-4, false, false));
        // bl +0x100
        assert_eq!(i_form(0x4800_0101), (0x100, false, true));
        // bdnz -8
        let (bo, bi, bd, aa, lk) = b_form(0x4200_FFF8);
        assert_eq!((bo, bi, bd, aa, lk), (16, 0, -8, false, false));
        // mtctr r3
        assert_eq!(spr_field(0x7C69_03A6), 9);
        // mflr r0
        assert_eq!(spr_field(0x7C08_02A6), 8);
        // std r31,-8(r1)
        assert_eq!(ds_form(0xFBE1_FFF8), (31, 1, -8));
        // clrldi r3,r3,32
        assert_eq!(md_form(0x7863_0020), (3, 3, 0, 32, false));
        // rldicr r3,r3,4,59
        assert_eq!(md_form(0x7863_26E4), (3, 3, 4, 59, false));
        // rldcl r3,r4,r5,32
        assert_eq!(mds_form(0x7883_2830), (4, 3, 5, 32, false));
    }

    #[test]
    fn test_vmx128_fields() {
        // VD128 = 5 | (3 << 5), VB128 = 2 | (1 << 5)
        let word = (4 << 26) | (5 << 21) | (2 << 11) | 0b1100 | 0b01;
        assert_eq!(vd128(word), 5 | (3 << 5));
        assert_eq!(vb128(word), 2 | (1 << 5));
        // VA128 = 7 | (1 << 5) | (1 << 6)
        let word = (5 << 26) | (7 << 16) | (1 << 5) | (1 << 10);
        assert_eq!(va128(word), 7 | (1 << 5) | (1 << 6));
    }

    #[test]
    fn test_bits_numbering() {
        assert_eq!(bits(0x8000_0000, 0, 0), 1);
        assert_eq!(bits(0x0000_0001, 31, 31), 1);
        assert_eq!(bits(0xFC00_0000, 0, 5), 0x3F);
        assert_eq!(bits(0xFFFF_FFFF, 0, 31), 0xFFFF_FFFF);
    }
}
