//! Instruction semantics
//!
//! One function per instruction (or family), grouped the way the PowerPC
//! books group them. [`handler`] maps every decoded [`Opcode`] to its
//! function; the interpreter builds its dispatch table from it and the JIT
//! falls back to it for anything it does not specialize.

pub mod branch;
pub mod float;
pub mod integer;
pub mod load_store;
pub mod system;
pub mod vector;
pub mod vmx128;

use crate::cpu::{Cpu, ExecResult, Fault};
use crate::opcodes::Opcode;

/// Signature shared by every instruction implementation
pub type Handler = fn(&mut Cpu<'_>, u32) -> ExecResult;

fn invalid(_cpu: &mut Cpu<'_>, _word: u32) -> ExecResult {
    Err(Fault::Invalid)
}

fn nop(_cpu: &mut Cpu<'_>, _word: u32) -> ExecResult {
    Ok(())
}

/// Implementation of `op`
pub fn handler(op: Opcode) -> Handler {
    use branch as br;
    use float as fp;
    use integer as int;
    use load_store as ls;
    use system as sys;
    use vector as v;
    use Opcode::*;

    match op {
        Invalid | Vmx128 => invalid,
        Nop => nop,

        Tdi => br::tdi,
        Twi => br::twi,
        Tw => br::tw,
        Td => br::td,
        B => br::b,
        Bc => br::bc,
        Bclr => br::bclr,
        Bcctr => br::bcctr,
        Sc => br::sc,
        Mcrf => br::mcrf,
        Crand => br::crand,
        Crandc => br::crandc,
        Cror => br::cror,
        Crorc => br::crorc,
        Crxor => br::crxor,
        Crnor => br::crnor,
        Crnand => br::crnand,
        Creqv => br::creqv,

        Mulli => int::mulli,
        Subfic => int::subfic,
        Cmpli => int::cmpli,
        Cmpi => int::cmpi,
        Addic | AddicRc => int::addic,
        Addi => int::addi,
        Addis => int::addis,
        Ori => int::ori,
        Oris => int::oris,
        Xori => int::xori,
        Xoris => int::xoris,
        AndiRc => int::andi_rc,
        AndisRc => int::andis_rc,
        Cmp => int::cmp,
        Cmpl => int::cmpl,
        Add => int::add,
        Addc => int::addc,
        Adde => int::adde,
        Addze => int::addze,
        Addme => int::addme,
        Subf => int::subf,
        Subfc => int::subfc,
        Subfe => int::subfe,
        Subfze => int::subfze,
        Subfme => int::subfme,
        Neg => int::neg,
        Mullw => int::mullw,
        Mulld => int::mulld,
        Mulhw => int::mulhw,
        Mulhwu => int::mulhwu,
        Mulhd => int::mulhd,
        Mulhdu => int::mulhdu,
        Divw => int::divw,
        Divwu => int::divwu,
        Divd => int::divd,
        Divdu => int::divdu,
        And => int::and,
        Andc => int::andc,
        Or => int::or,
        Orc => int::orc,
        Xor => int::xor,
        Nor => int::nor,
        Nand => int::nand,
        Eqv => int::eqv,
        Extsb => int::extsb,
        Extsh => int::extsh,
        Extsw => int::extsw,
        Cntlzw => int::cntlzw,
        Cntlzd => int::cntlzd,
        Slw => int::slw,
        Srw => int::srw,
        Sraw => int::sraw,
        Srawi => int::srawi,
        Sld => int::sld,
        Srd => int::srd,
        Srad => int::srad,
        Sradi => int::sradi,
        Rlwimi => int::rlwimi,
        Rlwinm => int::rlwinm,
        Rlwnm => int::rlwnm,
        Rldicl => int::rldicl,
        Rldicr => int::rldicr,
        Rldic => int::rldic,
        Rldimi => int::rldimi,
        Rldcl => int::rldcl,
        Rldcr => int::rldcr,

        Lbz => ls::lbz,
        Lbzu => ls::lbzu,
        Lhz => ls::lhz,
        Lhzu => ls::lhzu,
        Lha => ls::lha,
        Lhau => ls::lhau,
        Lwz => ls::lwz,
        Lwzu => ls::lwzu,
        Stb => ls::stb,
        Stbu => ls::stbu,
        Sth => ls::sth,
        Sthu => ls::sthu,
        Stw => ls::stw,
        Stwu => ls::stwu,
        Lmw => ls::lmw,
        Stmw => ls::stmw,
        Ld | Ldu | Lwa => ls::load_ds,
        Std | Stdu => ls::store_ds,
        Lbzx => ls::lbzx,
        Lbzux => ls::lbzux,
        Lhzx => ls::lhzx,
        Lhzux => ls::lhzux,
        Lhax => ls::lhax,
        Lhaux => ls::lhaux,
        Lwzx => ls::lwzx,
        Lwzux => ls::lwzux,
        Lwax => ls::lwax,
        Lwaux => ls::lwaux,
        Ldx => ls::ldx,
        Ldux => ls::ldux,
        Stbx => ls::stbx,
        Stbux => ls::stbux,
        Sthx => ls::sthx,
        Sthux => ls::sthux,
        Stwx => ls::stwx,
        Stwux => ls::stwux,
        Stdx => ls::stdx,
        Stdux => ls::stdux,
        Lhbrx => ls::lhbrx,
        Lwbrx => ls::lwbrx,
        Ldbrx => ls::ldbrx,
        Sthbrx => ls::sthbrx,
        Stwbrx => ls::stwbrx,
        Stdbrx => ls::stdbrx,
        Lwarx => ls::lwarx,
        Ldarx => ls::ldarx,
        StwcxRc => ls::stwcx,
        StdcxRc => ls::stdcx,
        Lfs => ls::lfs,
        Lfsu => ls::lfsu,
        Lfd => ls::lfd,
        Lfdu => ls::lfdu,
        Stfs => ls::stfs,
        Stfsu => ls::stfsu,
        Stfd => ls::stfd,
        Stfdu => ls::stfdu,
        Lfsx => ls::lfsx,
        Lfsux => ls::lfsux,
        Lfdx => ls::lfdx,
        Lfdux => ls::lfdux,
        Stfsx => ls::stfsx,
        Stfsux => ls::stfsux,
        Stfdx => ls::stfdx,
        Stfdux => ls::stfdux,
        Stfiwx => ls::stfiwx,
        Dcbst | Dcbf | Dcbt | Dcbtst => ls::cache_hint,
        Icbi => ls::icbi,
        Dcbi => ls::dcbi,
        Dcbz => ls::dcbz,
        Lvsl => ls::lvsl,
        Lvsr => ls::lvsr,
        Lvebx => ls::lvebx,
        Lvehx => ls::lvehx,
        Lvewx => ls::lvewx,
        Lvx => ls::lvx,
        Lvxl => ls::lvxl,
        Stvebx => ls::stvebx,
        Stvehx => ls::stvehx,
        Stvewx => ls::stvewx,
        Stvx => ls::stvx,
        Stvxl => ls::stvxl,
        Lvlx => ls::lvlx,
        Lvrx => ls::lvrx,
        Stvlx => ls::stvlx,
        Stvrx => ls::stvrx,

        Sync | Eieio | Isync => sys::barrier,
        Rfid => sys::rfid,
        Hrfid => sys::hrfid,
        Mfcr => sys::mfcr,
        Mtcrf => sys::mtcrf,
        Mfmsr => sys::mfmsr,
        Mtmsr => sys::mtmsr,
        Mtmsrd => sys::mtmsrd,
        Mfspr => sys::mfspr,
        Mtspr => sys::mtspr,
        Mftb => sys::mftb,
        Slbmte => sys::slbmte,
        Slbie => sys::slbie,
        Slbia => sys::slbia,
        Slbmfev => sys::slbmfev,
        Slbmfee => sys::slbmfee,
        Tlbiel => sys::tlbiel,
        Tlbie => sys::tlbie,
        Tlbsync => sys::tlbsync,

        Fcmpu => fp::fcmpu,
        Fcmpo => fp::fcmpo,
        Frsp => fp::frsp,
        Fctiw => fp::fctiw,
        Fctiwz => fp::fctiwz,
        Fctid => fp::fctid,
        Fctidz => fp::fctidz,
        Fcfid => fp::fcfid,
        Mtfsb0 => fp::mtfsb0,
        Mtfsb1 => fp::mtfsb1,
        Mtfsfi => fp::mtfsfi,
        Mtfsf => fp::mtfsf,
        Mffs => fp::mffs,
        Mcrfs => fp::mcrfs,
        Fneg => fp::fneg,
        Fmr => fp::fmr,
        Fnabs => fp::fnabs,
        Fabs => fp::fabs,
        Fdiv => fp::fdiv,
        Fsub => fp::fsub,
        Fadd => fp::fadd,
        Fsqrt => fp::fsqrt,
        Fsel => fp::fsel,
        Fmul => fp::fmul,
        Frsqrte => fp::frsqrte,
        Fmsub => fp::fmsub,
        Fmadd => fp::fmadd,
        Fnmsub => fp::fnmsub,
        Fnmadd => fp::fnmadd,
        Fdivs => fp::fdivs,
        Fsubs => fp::fsubs,
        Fadds => fp::fadds,
        Fsqrts => fp::fsqrts,
        Fres => fp::fres,
        Fmuls => fp::fmuls,
        Fmsubs => fp::fmsubs,
        Fmadds => fp::fmadds,
        Fnmsubs => fp::fnmsubs,
        Fnmadds => fp::fnmadds,

        Vaddubm => v::vaddubm,
        Vadduhm => v::vadduhm,
        Vadduwm => v::vadduwm,
        Vaddcuw => v::vaddcuw,
        Vaddubs => v::vaddubs,
        Vadduhs => v::vadduhs,
        Vadduws => v::vadduws,
        Vaddsbs => v::vaddsbs,
        Vaddshs => v::vaddshs,
        Vaddsws => v::vaddsws,
        Vsububm => v::vsububm,
        Vsubuhm => v::vsubuhm,
        Vsubuwm => v::vsubuwm,
        Vsubcuw => v::vsubcuw,
        Vsububs => v::vsububs,
        Vsubuhs => v::vsubuhs,
        Vsubuws => v::vsubuws,
        Vsubsbs => v::vsubsbs,
        Vsubshs => v::vsubshs,
        Vsubsws => v::vsubsws,
        Vmaxub => v::vmaxub,
        Vmaxuh => v::vmaxuh,
        Vmaxuw => v::vmaxuw,
        Vmaxsb => v::vmaxsb,
        Vmaxsh => v::vmaxsh,
        Vmaxsw => v::vmaxsw,
        Vminub => v::vminub,
        Vminuh => v::vminuh,
        Vminuw => v::vminuw,
        Vminsb => v::vminsb,
        Vminsh => v::vminsh,
        Vminsw => v::vminsw,
        Vavgub => v::vavgub,
        Vavguh => v::vavguh,
        Vavguw => v::vavguw,
        Vavgsb => v::vavgsb,
        Vavgsh => v::vavgsh,
        Vavgsw => v::vavgsw,
        Vrlb => v::vrlb,
        Vrlh => v::vrlh,
        Vrlw => v::vrlw,
        Vslb => v::vslb,
        Vslh => v::vslh,
        Vslw => v::vslw,
        Vsrb => v::vsrb,
        Vsrh => v::vsrh,
        Vsrw => v::vsrw,
        Vsrab => v::vsrab,
        Vsrah => v::vsrah,
        Vsraw => v::vsraw,
        Vsl => v::vsl,
        Vsr => v::vsr,
        Vslo => v::vslo,
        Vsro => v::vsro,
        Vand => v::vand,
        Vandc => v::vandc,
        Vor => v::vor,
        Vnor => v::vnor,
        Vxor => v::vxor,
        Vmrghb => v::vmrghb,
        Vmrghh => v::vmrghh,
        Vmrghw => v::vmrghw,
        Vmrglb => v::vmrglb,
        Vmrglh => v::vmrglh,
        Vmrglw => v::vmrglw,
        Vspltb => v::vspltb,
        Vsplth => v::vsplth,
        Vspltw => v::vspltw,
        Vspltisb => v::vspltisb,
        Vspltish => v::vspltish,
        Vspltisw => v::vspltisw,
        Vpkuhum => v::vpkuhum,
        Vpkuwum => v::vpkuwum,
        Vpkuhus => v::vpkuhus,
        Vpkuwus => v::vpkuwus,
        Vpkshus => v::vpkshus,
        Vpkswus => v::vpkswus,
        Vpkshss => v::vpkshss,
        Vpkswss => v::vpkswss,
        Vupkhsb => v::vupkhsb,
        Vupkhsh => v::vupkhsh,
        Vupklsb => v::vupklsb,
        Vupklsh => v::vupklsh,
        Vaddfp => v::vaddfp,
        Vsubfp => v::vsubfp,
        Vmaxfp => v::vmaxfp,
        Vminfp => v::vminfp,
        Vrefp => v::vrefp,
        Vrsqrtefp => v::vrsqrtefp,
        Vexptefp => v::vexptefp,
        Vlogefp => v::vlogefp,
        Vrfin => v::vrfin,
        Vrfiz => v::vrfiz,
        Vrfip => v::vrfip,
        Vrfim => v::vrfim,
        Vcfux => v::vcfux,
        Vcfsx => v::vcfsx,
        Vctuxs => v::vctuxs,
        Vctsxs => v::vctsxs,
        Mfvscr => v::mfvscr,
        Mtvscr => v::mtvscr,
        Vmladduhm => v::vmladduhm,
        Vsel => v::vsel,
        Vperm => v::vperm,
        Vsldoi => v::vsldoi,
        Vmaddfp => v::vmaddfp,
        Vnmsubfp => v::vnmsubfp,
        Vcmpequb => v::vcmpequb,
        Vcmpequh => v::vcmpequh,
        Vcmpequw => v::vcmpequw,
        Vcmpeqfp => v::vcmpeqfp,
        Vcmpgefp => v::vcmpgefp,
        Vcmpgtub => v::vcmpgtub,
        Vcmpgtuh => v::vcmpgtuh,
        Vcmpgtuw => v::vcmpgtuw,
        Vcmpgtfp => v::vcmpgtfp,
        Vcmpgtsb => v::vcmpgtsb,
        Vcmpgtsh => v::vcmpgtsh,
        Vcmpgtsw => v::vcmpgtsw,
        Vcmpbfp => v::vcmpbfp,

        Lvsl128 => vmx128::lvsl128,
        Lvsr128 => vmx128::lvsr128,
        Lvewx128 => vmx128::lvewx128,
        Lvx128 | Lvxl128 => vmx128::lvx128,
        Stvewx128 => vmx128::stvewx128,
        Stvx128 | Stvxl128 => vmx128::stvx128,
        Vperm128 => vmx128::vperm128,
        Vaddfp128 => vmx128::vaddfp128,
        Vsubfp128 => vmx128::vsubfp128,
        Vmulfp128 => vmx128::vmulfp128,
        Vmaddfp128 => vmx128::vmaddfp128,
        Vnmsubfp128 => vmx128::vnmsubfp128,
        Vand128 => vmx128::vand128,
        Vandc128 => vmx128::vandc128,
        Vnor128 => vmx128::vnor128,
        Vor128 => vmx128::vor128,
        Vxor128 => vmx128::vxor128,
        Vsel128 => vmx128::vsel128,
        Vcfpsxws128 => vmx128::vcfpsxws128,
        Vcsxwfp128 => vmx128::vcsxwfp128,
        Vrefp128 => vmx128::vrefp128,
        Vrsqrtefp128 => vmx128::vrsqrtefp128,
        Vspltw128 => vmx128::vspltw128,
        Vspltisw128 => vmx128::vspltisw128,
        Vcmpeqfp128 => vmx128::vcmpeqfp128,
        Vcmpgefp128 => vmx128::vcmpgefp128,
        Vcmpgtfp128 => vmx128::vcmpgtfp128,
        Vcmpequw128 => vmx128::vcmpequw128,
        Vrlw128 => vmx128::vrlw128,
        Vslw128 => vmx128::vslw128,
        Vsraw128 => vmx128::vsraw128,
        Vsrw128 => vmx128::vsrw128,
        Vmaxfp128 => vmx128::vmaxfp128,
        Vminfp128 => vmx128::vminfp128,
        Vmrghw128 => vmx128::vmrghw128,
        Vmrglw128 => vmx128::vmrglw128,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_invalid_maps_to_invalid() {
        let invalid_fn = handler(Opcode::Invalid) as usize;
        for &op in Opcode::ALL {
            if matches!(op, Opcode::Invalid | Opcode::Vmx128) {
                continue;
            }
            assert_ne!(handler(op) as usize, invalid_fn, "{} has no implementation", op.mnemonic());
        }
    }
}
