//! Opcode catalogue
//!
//! [`Opcode`] names every instruction the core understands. [`ENTRIES`]
//! lists where each one lives in the primary decode space: the primary
//! opcode plus an extended-opcode field of `width` bits starting `shift`
//! bits above the least-significant bit. Bits of the low 11 not covered by
//! the field are don't-care and fill every combination in the table.
//!
//! VMX128 instructions scatter their selector bits around register fields,
//! so they are not listed here; the decoder routes them through a secondary
//! match once the primary table yields [`Opcode::Vmx128`].

macro_rules! opcodes {
    ($($name:ident => $mnemonic:literal,)*) => {
        /// Instruction identity produced by the decoder
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u16)]
        pub enum Opcode {
            $($name,)*
        }

        impl Opcode {
            /// Every opcode in discriminant order
            pub const ALL: &'static [Opcode] = &[$(Opcode::$name,)*];

            /// Number of opcodes
            pub const COUNT: usize = Self::ALL.len();

            /// Assembler mnemonic
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $(Opcode::$name => $mnemonic,)*
                }
            }

            /// Opcode for a raw discriminant
            #[inline]
            pub fn from_index(index: u16) -> Opcode {
                Self::ALL.get(index as usize).copied().unwrap_or(Opcode::Invalid)
            }
        }
    };
}

opcodes! {
    Invalid => "invalid",
    Vmx128 => "vmx128",
    Nop => "nop",

    // Primary D/I/B/SC/M forms
    Tdi => "tdi", Twi => "twi", Mulli => "mulli", Subfic => "subfic",
    Cmpli => "cmpli", Cmpi => "cmpi", Addic => "addic", AddicRc => "addic.",
    Addi => "addi", Addis => "addis", Bc => "bc", Sc => "sc", B => "b",
    Rlwimi => "rlwimi", Rlwinm => "rlwinm", Rlwnm => "rlwnm",
    Ori => "ori", Oris => "oris", Xori => "xori", Xoris => "xoris",
    AndiRc => "andi.", AndisRc => "andis.",
    Lwz => "lwz", Lwzu => "lwzu", Lbz => "lbz", Lbzu => "lbzu",
    Stw => "stw", Stwu => "stwu", Stb => "stb", Stbu => "stbu",
    Lhz => "lhz", Lhzu => "lhzu", Lha => "lha", Lhau => "lhau",
    Sth => "sth", Sthu => "sthu", Lmw => "lmw", Stmw => "stmw",
    Lfs => "lfs", Lfsu => "lfsu", Lfd => "lfd", Lfdu => "lfdu",
    Stfs => "stfs", Stfsu => "stfsu", Stfd => "stfd", Stfdu => "stfdu",

    // DS forms
    Ld => "ld", Ldu => "ldu", Lwa => "lwa", Std => "std", Stdu => "stdu",

    // MD/MDS forms
    Rldicl => "rldicl", Rldicr => "rldicr", Rldic => "rldic", Rldimi => "rldimi",
    Rldcl => "rldcl", Rldcr => "rldcr",

    // Group 19
    Mcrf => "mcrf", Bclr => "bclr", Rfid => "rfid", Crnor => "crnor",
    Crandc => "crandc", Isync => "isync", Crxor => "crxor", Crnand => "crnand",
    Crand => "crand", Hrfid => "hrfid", Creqv => "creqv", Crorc => "crorc",
    Cror => "cror", Bcctr => "bcctr",

    // Group 31 integer
    Cmp => "cmp", Cmpl => "cmpl", Tw => "tw", Td => "td",
    Subfc => "subfc", Addc => "addc", Mulhdu => "mulhdu", Mulhwu => "mulhwu",
    Subf => "subf", Mulhd => "mulhd", Mulhw => "mulhw", Neg => "neg",
    Subfe => "subfe", Adde => "adde", Subfze => "subfze", Addze => "addze",
    Subfme => "subfme", Mulld => "mulld", Addme => "addme", Mullw => "mullw",
    Add => "add", Divdu => "divdu", Divwu => "divwu", Divd => "divd", Divw => "divw",
    Slw => "slw", Srw => "srw", Sraw => "sraw", Srawi => "srawi",
    Sld => "sld", Srd => "srd", Srad => "srad", Sradi => "sradi",
    Cntlzw => "cntlzw", Cntlzd => "cntlzd",
    And => "and", Andc => "andc", Or => "or", Orc => "orc", Xor => "xor",
    Nor => "nor", Nand => "nand", Eqv => "eqv",
    Extsb => "extsb", Extsh => "extsh", Extsw => "extsw",

    // Group 31 storage
    Lbzx => "lbzx", Lbzux => "lbzux", Lhzx => "lhzx", Lhzux => "lhzux",
    Lhax => "lhax", Lhaux => "lhaux", Lwzx => "lwzx", Lwzux => "lwzux",
    Lwax => "lwax", Lwaux => "lwaux", Ldx => "ldx", Ldux => "ldux",
    Stbx => "stbx", Stbux => "stbux", Sthx => "sthx", Sthux => "sthux",
    Stwx => "stwx", Stwux => "stwux", Stdx => "stdx", Stdux => "stdux",
    Lhbrx => "lhbrx", Lwbrx => "lwbrx", Ldbrx => "ldbrx",
    Sthbrx => "sthbrx", Stwbrx => "stwbrx", Stdbrx => "stdbrx",
    Lwarx => "lwarx", Ldarx => "ldarx", StwcxRc => "stwcx.", StdcxRc => "stdcx.",
    Lfsx => "lfsx", Lfsux => "lfsux", Lfdx => "lfdx", Lfdux => "lfdux",
    Stfsx => "stfsx", Stfsux => "stfsux", Stfdx => "stfdx", Stfdux => "stfdux",
    Stfiwx => "stfiwx",
    Dcbst => "dcbst", Dcbf => "dcbf", Dcbtst => "dcbtst", Dcbt => "dcbt",
    Dcbi => "dcbi", Dcbz => "dcbz", Icbi => "icbi",
    Sync => "sync", Eieio => "eieio",

    // Group 31 system
    Mfcr => "mfcr", Mtcrf => "mtcrf", Mfmsr => "mfmsr", Mtmsr => "mtmsr",
    Mtmsrd => "mtmsrd", Mfspr => "mfspr", Mtspr => "mtspr", Mftb => "mftb",
    Slbmte => "slbmte", Slbie => "slbie", Slbia => "slbia",
    Slbmfev => "slbmfev", Slbmfee => "slbmfee",
    Tlbiel => "tlbiel", Tlbie => "tlbie", Tlbsync => "tlbsync",

    // Group 31 vector storage
    Lvsl => "lvsl", Lvsr => "lvsr", Lvebx => "lvebx", Lvehx => "lvehx",
    Lvewx => "lvewx", Lvx => "lvx", Lvxl => "lvxl",
    Stvebx => "stvebx", Stvehx => "stvehx", Stvewx => "stvewx",
    Stvx => "stvx", Stvxl => "stvxl",
    Lvlx => "lvlx", Lvrx => "lvrx", Stvlx => "stvlx", Stvrx => "stvrx",

    // Floating point (group 63 / 59)
    Fcmpu => "fcmpu", Frsp => "frsp", Fctiw => "fctiw", Fctiwz => "fctiwz",
    Fcmpo => "fcmpo", Mtfsb1 => "mtfsb1", Fneg => "fneg", Mcrfs => "mcrfs",
    Mtfsb0 => "mtfsb0", Fmr => "fmr", Mtfsfi => "mtfsfi", Fnabs => "fnabs",
    Fabs => "fabs", Mffs => "mffs", Mtfsf => "mtfsf", Fctid => "fctid",
    Fctidz => "fctidz", Fcfid => "fcfid",
    Fdiv => "fdiv", Fsub => "fsub", Fadd => "fadd", Fsqrt => "fsqrt",
    Fsel => "fsel", Fmul => "fmul", Frsqrte => "frsqrte", Fmsub => "fmsub",
    Fmadd => "fmadd", Fnmsub => "fnmsub", Fnmadd => "fnmadd",
    Fdivs => "fdivs", Fsubs => "fsubs", Fadds => "fadds", Fsqrts => "fsqrts",
    Fres => "fres", Fmuls => "fmuls", Fmsubs => "fmsubs", Fmadds => "fmadds",
    Fnmsubs => "fnmsubs", Fnmadds => "fnmadds",

    // VMX (VX form)
    Vaddubm => "vaddubm", Vadduhm => "vadduhm", Vadduwm => "vadduwm",
    Vaddcuw => "vaddcuw", Vaddubs => "vaddubs", Vadduhs => "vadduhs",
    Vadduws => "vadduws", Vaddsbs => "vaddsbs", Vaddshs => "vaddshs",
    Vaddsws => "vaddsws",
    Vsububm => "vsububm", Vsubuhm => "vsubuhm", Vsubuwm => "vsubuwm",
    Vsubcuw => "vsubcuw", Vsububs => "vsububs", Vsubuhs => "vsubuhs",
    Vsubuws => "vsubuws", Vsubsbs => "vsubsbs", Vsubshs => "vsubshs",
    Vsubsws => "vsubsws",
    Vmaxub => "vmaxub", Vmaxuh => "vmaxuh", Vmaxuw => "vmaxuw",
    Vmaxsb => "vmaxsb", Vmaxsh => "vmaxsh", Vmaxsw => "vmaxsw",
    Vminub => "vminub", Vminuh => "vminuh", Vminuw => "vminuw",
    Vminsb => "vminsb", Vminsh => "vminsh", Vminsw => "vminsw",
    Vavgub => "vavgub", Vavguh => "vavguh", Vavguw => "vavguw",
    Vavgsb => "vavgsb", Vavgsh => "vavgsh", Vavgsw => "vavgsw",
    Vrlb => "vrlb", Vrlh => "vrlh", Vrlw => "vrlw",
    Vslb => "vslb", Vslh => "vslh", Vslw => "vslw",
    Vsrb => "vsrb", Vsrh => "vsrh", Vsrw => "vsrw",
    Vsrab => "vsrab", Vsrah => "vsrah", Vsraw => "vsraw",
    Vsl => "vsl", Vsr => "vsr", Vslo => "vslo", Vsro => "vsro",
    Vand => "vand", Vandc => "vandc", Vor => "vor", Vnor => "vnor", Vxor => "vxor",
    Vmrghb => "vmrghb", Vmrghh => "vmrghh", Vmrghw => "vmrghw",
    Vmrglb => "vmrglb", Vmrglh => "vmrglh", Vmrglw => "vmrglw",
    Vspltb => "vspltb", Vsplth => "vsplth", Vspltw => "vspltw",
    Vspltisb => "vspltisb", Vspltish => "vspltish", Vspltisw => "vspltisw",
    Vpkuhum => "vpkuhum", Vpkuwum => "vpkuwum", Vpkuhus => "vpkuhus",
    Vpkuwus => "vpkuwus", Vpkshus => "vpkshus", Vpkswus => "vpkswus",
    Vpkshss => "vpkshss", Vpkswss => "vpkswss",
    Vupkhsb => "vupkhsb", Vupkhsh => "vupkhsh", Vupklsb => "vupklsb",
    Vupklsh => "vupklsh",
    Vaddfp => "vaddfp", Vsubfp => "vsubfp", Vmaxfp => "vmaxfp", Vminfp => "vminfp",
    Vrefp => "vrefp", Vrsqrtefp => "vrsqrtefp", Vexptefp => "vexptefp",
    Vlogefp => "vlogefp", Vrfin => "vrfin", Vrfiz => "vrfiz", Vrfip => "vrfip",
    Vrfim => "vrfim", Vcfux => "vcfux", Vcfsx => "vcfsx", Vctuxs => "vctuxs",
    Vctsxs => "vctsxs",
    Mfvscr => "mfvscr", Mtvscr => "mtvscr",

    // VMX (VA form)
    Vmladduhm => "vmladduhm", Vsel => "vsel", Vperm => "vperm",
    Vsldoi => "vsldoi", Vmaddfp => "vmaddfp", Vnmsubfp => "vnmsubfp",

    // VMX (VXR form)
    Vcmpequb => "vcmpequb", Vcmpequh => "vcmpequh", Vcmpequw => "vcmpequw",
    Vcmpeqfp => "vcmpeqfp", Vcmpgefp => "vcmpgefp", Vcmpgtub => "vcmpgtub",
    Vcmpgtuh => "vcmpgtuh", Vcmpgtuw => "vcmpgtuw", Vcmpgtfp => "vcmpgtfp",
    Vcmpgtsb => "vcmpgtsb", Vcmpgtsh => "vcmpgtsh", Vcmpgtsw => "vcmpgtsw",
    Vcmpbfp => "vcmpbfp",

    // VMX128 (secondary decode)
    Lvsl128 => "lvsl128", Lvsr128 => "lvsr128", Lvewx128 => "lvewx128",
    Lvx128 => "lvx128", Lvxl128 => "lvxl128", Stvewx128 => "stvewx128",
    Stvx128 => "stvx128", Stvxl128 => "stvxl128",
    Vperm128 => "vperm128", Vaddfp128 => "vaddfp128", Vsubfp128 => "vsubfp128",
    Vmulfp128 => "vmulfp128", Vmaddfp128 => "vmaddfp128",
    Vnmsubfp128 => "vnmsubfp128", Vand128 => "vand128", Vandc128 => "vandc128",
    Vnor128 => "vnor128", Vor128 => "vor128", Vxor128 => "vxor128",
    Vsel128 => "vsel128",
    Vcfpsxws128 => "vcfpsxws128", Vcsxwfp128 => "vcsxwfp128",
    Vrefp128 => "vrefp128", Vrsqrtefp128 => "vrsqrtefp128",
    Vspltw128 => "vspltw128", Vspltisw128 => "vspltisw128",
    Vcmpeqfp128 => "vcmpeqfp128", Vcmpgefp128 => "vcmpgefp128",
    Vcmpgtfp128 => "vcmpgtfp128", Vcmpequw128 => "vcmpequw128",
    Vrlw128 => "vrlw128", Vslw128 => "vslw128", Vsraw128 => "vsraw128",
    Vsrw128 => "vsrw128", Vmaxfp128 => "vmaxfp128", Vminfp128 => "vminfp128",
    Vmrghw128 => "vmrghw128", Vmrglw128 => "vmrglw128",
}

/// Placement of one opcode in the primary decode space
#[derive(Debug, Clone, Copy)]
pub struct Entry {
    pub primary: u32,
    pub xo: u32,
    pub width: u32,
    pub shift: u32,
    pub op: Opcode,
}

const fn p(primary: u32, op: Opcode) -> Entry {
    Entry { primary, xo: 0, width: 0, shift: 0, op }
}

const fn e(primary: u32, xo: u32, width: u32, shift: u32, op: Opcode) -> Entry {
    Entry { primary, xo, width, shift, op }
}

const fn x(primary: u32, xo: u32, op: Opcode) -> Entry {
    e(primary, xo, 10, 1, op)
}

const fn xo(xo: u32, op: Opcode) -> Entry {
    e(31, xo, 9, 1, op)
}

const fn a(primary: u32, xo: u32, op: Opcode) -> Entry {
    e(primary, xo, 5, 1, op)
}

const fn ds(primary: u32, xo: u32, op: Opcode) -> Entry {
    e(primary, xo, 2, 0, op)
}

const fn vx(xo: u32, op: Opcode) -> Entry {
    e(4, xo, 11, 0, op)
}

const fn va(xo: u32, op: Opcode) -> Entry {
    e(4, xo, 6, 0, op)
}

/// Rc sits at bit 10 and stays don't-care
const fn vxr(xo: u32, op: Opcode) -> Entry {
    e(4, xo, 10, 0, op)
}

use Opcode::*;

/// Primary decode entries
pub static ENTRIES: &[Entry] = &[
    p(2, Tdi), p(3, Twi), p(7, Mulli), p(8, Subfic), p(10, Cmpli), p(11, Cmpi),
    p(12, Addic), p(13, AddicRc), p(14, Addi), p(15, Addis), p(16, Bc), p(17, Sc),
    p(18, B), p(20, Rlwimi), p(21, Rlwinm), p(23, Rlwnm), p(24, Ori), p(25, Oris),
    p(26, Xori), p(27, Xoris), p(28, AndiRc), p(29, AndisRc),
    p(32, Lwz), p(33, Lwzu), p(34, Lbz), p(35, Lbzu), p(36, Stw), p(37, Stwu),
    p(38, Stb), p(39, Stbu), p(40, Lhz), p(41, Lhzu), p(42, Lha), p(43, Lhau),
    p(44, Sth), p(45, Sthu), p(46, Lmw), p(47, Stmw), p(48, Lfs), p(49, Lfsu),
    p(50, Lfd), p(51, Lfdu), p(52, Stfs), p(53, Stfsu), p(54, Stfd), p(55, Stfdu),
    ds(58, 0, Ld), ds(58, 1, Ldu), ds(58, 2, Lwa), ds(62, 0, Std), ds(62, 1, Stdu),
    e(30, 0, 3, 2, Rldicl), e(30, 1, 3, 2, Rldicr), e(30, 2, 3, 2, Rldic),
    e(30, 3, 3, 2, Rldimi), e(30, 8, 4, 1, Rldcl), e(30, 9, 4, 1, Rldcr),
    // 19
    x(19, 0, Mcrf), x(19, 16, Bclr), x(19, 18, Rfid), x(19, 33, Crnor),
    x(19, 129, Crandc), x(19, 150, Isync), x(19, 193, Crxor), x(19, 225, Crnand),
    x(19, 257, Crand), x(19, 274, Hrfid), x(19, 289, Creqv), x(19, 417, Crorc),
    x(19, 449, Cror), x(19, 528, Bcctr),
    // 31, XO form
    xo(8, Subfc), xo(9, Mulhdu), xo(10, Addc), xo(11, Mulhwu), xo(40, Subf),
    xo(73, Mulhd), xo(75, Mulhw), xo(104, Neg), xo(136, Subfe), xo(138, Adde),
    xo(200, Subfze), xo(202, Addze), xo(232, Subfme), xo(233, Mulld),
    xo(234, Addme), xo(235, Mullw), xo(266, Add), xo(457, Divdu), xo(459, Divwu),
    xo(489, Divd), xo(491, Divw),
    // 31, X form
    x(31, 0, Cmp), x(31, 4, Tw), x(31, 6, Lvsl), x(31, 7, Lvebx), x(31, 19, Mfcr),
    x(31, 20, Lwarx), x(31, 21, Ldx), x(31, 23, Lwzx), x(31, 24, Slw),
    x(31, 26, Cntlzw), x(31, 27, Sld), x(31, 28, And), x(31, 32, Cmpl),
    x(31, 38, Lvsr), x(31, 39, Lvehx), x(31, 53, Ldux), x(31, 54, Dcbst),
    x(31, 55, Lwzux), x(31, 58, Cntlzd), x(31, 60, Andc), x(31, 68, Td),
    x(31, 71, Lvewx), x(31, 83, Mfmsr), x(31, 84, Ldarx), x(31, 86, Dcbf),
    x(31, 87, Lbzx), x(31, 103, Lvx), x(31, 119, Lbzux), x(31, 124, Nor),
    x(31, 135, Stvebx), x(31, 144, Mtcrf), x(31, 146, Mtmsr), x(31, 149, Stdx),
    x(31, 150, StwcxRc), x(31, 151, Stwx), x(31, 167, Stvehx), x(31, 178, Mtmsrd),
    x(31, 181, Stdux), x(31, 183, Stwux), x(31, 199, Stvewx), x(31, 214, StdcxRc),
    x(31, 215, Stbx), x(31, 231, Stvx), x(31, 246, Dcbtst), x(31, 247, Stbux),
    x(31, 274, Tlbiel), x(31, 278, Dcbt), x(31, 279, Lhzx), x(31, 284, Eqv),
    x(31, 306, Tlbie), x(31, 311, Lhzux), x(31, 316, Xor), x(31, 339, Mfspr),
    x(31, 341, Lwax), x(31, 343, Lhax), x(31, 359, Lvxl), x(31, 371, Mftb),
    x(31, 373, Lwaux), x(31, 375, Lhaux), x(31, 402, Slbmte), x(31, 407, Sthx),
    x(31, 412, Orc), x(31, 434, Slbie), x(31, 439, Sthux), x(31, 444, Or),
    x(31, 467, Mtspr), x(31, 470, Dcbi), x(31, 476, Nand), x(31, 487, Stvxl),
    x(31, 498, Slbia), x(31, 519, Lvlx), x(31, 532, Ldbrx), x(31, 534, Lwbrx),
    x(31, 535, Lfsx), x(31, 536, Srw), x(31, 539, Srd), x(31, 551, Lvrx),
    x(31, 566, Tlbsync), x(31, 567, Lfsux), x(31, 598, Sync), x(31, 599, Lfdx),
    x(31, 631, Lfdux), x(31, 647, Stvlx), x(31, 660, Stdbrx), x(31, 662, Stwbrx),
    x(31, 663, Stfsx), x(31, 679, Stvrx), x(31, 695, Stfsux), x(31, 727, Stfdx),
    x(31, 759, Stfdux), x(31, 790, Lhbrx), x(31, 792, Sraw), x(31, 794, Srad),
    x(31, 824, Srawi), x(31, 851, Slbmfev), x(31, 854, Eieio), x(31, 915, Slbmfee),
    x(31, 918, Sthbrx), x(31, 922, Extsh), x(31, 954, Extsb), x(31, 982, Icbi),
    x(31, 983, Stfiwx), x(31, 986, Extsw), x(31, 1014, Dcbz),
    e(31, 413, 9, 2, Sradi),
    // 63, X form
    x(63, 0, Fcmpu), x(63, 12, Frsp), x(63, 14, Fctiw), x(63, 15, Fctiwz),
    x(63, 32, Fcmpo), x(63, 38, Mtfsb1), x(63, 40, Fneg), x(63, 64, Mcrfs),
    x(63, 70, Mtfsb0), x(63, 72, Fmr), x(63, 134, Mtfsfi), x(63, 136, Fnabs),
    x(63, 264, Fabs), x(63, 583, Mffs), x(63, 711, Mtfsf), x(63, 814, Fctid),
    x(63, 815, Fctidz), x(63, 846, Fcfid),
    // 63 / 59, A form
    a(63, 18, Fdiv), a(63, 20, Fsub), a(63, 21, Fadd), a(63, 22, Fsqrt),
    a(63, 23, Fsel), a(63, 25, Fmul), a(63, 26, Frsqrte), a(63, 28, Fmsub),
    a(63, 29, Fmadd), a(63, 30, Fnmsub), a(63, 31, Fnmadd),
    a(59, 18, Fdivs), a(59, 20, Fsubs), a(59, 21, Fadds), a(59, 22, Fsqrts),
    a(59, 24, Fres), a(59, 25, Fmuls), a(59, 28, Fmsubs), a(59, 29, Fmadds),
    a(59, 30, Fnmsubs), a(59, 31, Fnmadds),
    // 4, VX form
    vx(0, Vaddubm), vx(2, Vmaxub), vx(4, Vrlb), vx(10, Vaddfp), vx(12, Vmrghb),
    vx(14, Vpkuhum), vx(64, Vadduhm), vx(66, Vmaxuh), vx(68, Vrlh), vx(74, Vsubfp),
    vx(76, Vmrghh), vx(78, Vpkuwum), vx(128, Vadduwm), vx(130, Vmaxuw),
    vx(132, Vrlw), vx(140, Vmrghw), vx(142, Vpkuhus), vx(206, Vpkuwus),
    vx(258, Vmaxsb), vx(260, Vslb), vx(266, Vrefp), vx(268, Vmrglb),
    vx(270, Vpkshus), vx(322, Vmaxsh), vx(324, Vslh), vx(330, Vrsqrtefp),
    vx(332, Vmrglh), vx(334, Vpkswus), vx(384, Vaddcuw), vx(386, Vmaxsw),
    vx(388, Vslw), vx(394, Vexptefp), vx(396, Vmrglw), vx(398, Vpkshss),
    vx(452, Vsl), vx(458, Vlogefp), vx(462, Vpkswss), vx(512, Vaddubs),
    vx(514, Vminub), vx(516, Vsrb), vx(522, Vrfin), vx(524, Vspltb),
    vx(526, Vupkhsb), vx(576, Vadduhs), vx(578, Vminuh), vx(580, Vsrh),
    vx(586, Vrfiz), vx(588, Vsplth), vx(590, Vupkhsh), vx(640, Vadduws),
    vx(642, Vminuw), vx(644, Vsrw), vx(650, Vrfip), vx(652, Vspltw),
    vx(654, Vupklsb), vx(708, Vsr), vx(714, Vrfim), vx(718, Vupklsh),
    vx(768, Vaddsbs), vx(770, Vminsb), vx(772, Vsrab), vx(778, Vcfux),
    vx(780, Vspltisb), vx(832, Vaddshs), vx(834, Vminsh), vx(836, Vsrah),
    vx(842, Vcfsx), vx(844, Vspltish), vx(896, Vaddsws), vx(898, Vminsw),
    vx(900, Vsraw), vx(906, Vctuxs), vx(908, Vspltisw), vx(970, Vctsxs),
    vx(1024, Vsububm), vx(1026, Vavgub), vx(1028, Vand), vx(1034, Vmaxfp),
    vx(1036, Vslo), vx(1088, Vsubuhm), vx(1090, Vavguh), vx(1092, Vandc),
    vx(1098, Vminfp), vx(1100, Vsro), vx(1152, Vsubuwm), vx(1154, Vavguw),
    vx(1156, Vor), vx(1220, Vxor), vx(1282, Vavgsb), vx(1284, Vnor),
    vx(1346, Vavgsh), vx(1408, Vsubcuw), vx(1410, Vavgsw), vx(1536, Vsububs),
    vx(1540, Mfvscr), vx(1600, Vsubuhs), vx(1604, Mtvscr), vx(1664, Vsubuws),
    vx(1792, Vsubsbs), vx(1856, Vsubshs), vx(1920, Vsubsws),
    // 4, VA form
    va(34, Vmladduhm), va(42, Vsel), va(43, Vperm), va(44, Vsldoi),
    va(46, Vmaddfp), va(47, Vnmsubfp),
    // 4, VXR form
    vxr(6, Vcmpequb), vxr(70, Vcmpequh), vxr(134, Vcmpequw), vxr(198, Vcmpeqfp),
    vxr(454, Vcmpgefp), vxr(518, Vcmpgtub), vxr(582, Vcmpgtuh), vxr(646, Vcmpgtuw),
    vxr(710, Vcmpgtfp), vxr(774, Vcmpgtsb), vxr(838, Vcmpgtsh), vxr(902, Vcmpgtsw),
    vxr(966, Vcmpbfp),
];

impl Opcode {
    /// True for the VMX128 instructions reached through the secondary decoder
    pub fn is_vmx128(self) -> bool {
        self >= Opcode::Lvsl128
    }

    /// True for instructions that can redirect control flow
    pub fn is_branch(self) -> bool {
        matches!(self, B | Bc | Bclr | Bcctr | Sc | Rfid | Hrfid | Tw | Twi | Td | Tdi)
    }

    /// True for instructions that change translation or thread context and
    /// must end a compiled block
    pub fn ends_block(self) -> bool {
        self.is_branch()
            || matches!(
                self,
                Invalid
                    | Mtmsr
                    | Mtmsrd
                    | Mtspr
                    | Isync
                    | Slbmte
                    | Slbie
                    | Slbia
                    | Tlbiel
                    | Tlbie
                    | Icbi
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mnemonics_unique() {
        let mut seen = std::collections::HashSet::new();
        for op in Opcode::ALL {
            assert!(seen.insert(op.mnemonic()), "duplicate mnemonic {}", op.mnemonic());
        }
    }

    #[test]
    fn test_from_index() {
        assert_eq!(Opcode::from_index(Opcode::Addi as u16), Opcode::Addi);
        assert_eq!(Opcode::from_index(u16::MAX), Opcode::Invalid);
        assert_eq!(Opcode::COUNT, Opcode::ALL.len());
    }

    #[test]
    fn test_every_primary_opcode_listed_once() {
        let mut seen = std::collections::HashSet::new();
        for entry in ENTRIES {
            assert!(seen.insert(entry.op), "{} listed twice", entry.op.mnemonic());
            assert!(!entry.op.is_vmx128());
        }
    }
}
