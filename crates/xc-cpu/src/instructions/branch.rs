//! Branch, trap, system call and condition register instructions

use crate::cpu::{Cpu, ExecResult};
use crate::decoder::{b_form, bits, d_form, i_form, x_form, xl_form};
use crate::exceptions::Exceptions;

/// BO bits (IBM numbering within the 5-bit field)
pub(crate) mod bo {
    pub const IGNORE_CR: u32 = 0x10;
    pub const CR_TRUE: u32 = 0x08;
    pub const IGNORE_CTR: u32 = 0x04;
    pub const CTR_ZERO: u32 = 0x02;
}

/// Evaluate a conditional branch, decrementing CTR when BO asks for it
#[inline]
fn condition(cpu: &mut Cpu<'_>, bo: u32, bi: u32, use_ctr: bool) -> bool {
    let ctr_ok = if use_ctr && bo & bo::IGNORE_CTR == 0 {
        cpu.thread.ctr = cpu.thread.ctr.wrapping_sub(1);
        let ctr = if cpu.thread.sf() { cpu.thread.ctr } else { cpu.thread.ctr as u32 as u64 };
        (ctr == 0) == (bo & bo::CTR_ZERO != 0)
    } else {
        true
    };
    let cond_ok = bo & bo::IGNORE_CR != 0 || cpu.thread.cr_bit(bi) == (bo & bo::CR_TRUE != 0);
    ctr_ok && cond_ok
}

#[inline]
fn link(cpu: &mut Cpu<'_>, lk: bool) {
    if lk {
        cpu.thread.lr = cpu.thread.mask_ea(cpu.thread.cia.wrapping_add(4));
    }
}

/// b - Branch
pub fn b(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (li, aa, lk) = i_form(word);
    let target = if aa { li as u64 } else { cpu.thread.cia.wrapping_add(li as u64) };
    link(cpu, lk);
    cpu.thread.nia = cpu.thread.mask_ea(target);
    Ok(())
}

/// bc - Branch Conditional
pub fn bc(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (bo, bi, bd, aa, lk) = b_form(word);
    let taken = condition(cpu, bo, bi, true);
    link(cpu, lk);
    if taken {
        let target = if aa { bd as u64 } else { cpu.thread.cia.wrapping_add(bd as u64) };
        cpu.thread.nia = cpu.thread.mask_ea(target);
    }
    Ok(())
}

/// bclr - Branch Conditional to Link Register
pub fn bclr(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (bo, bi, _, lk) = xl_form(word);
    // Target is read before LK overwrites LR
    let target = cpu.thread.lr & !3;
    let taken = condition(cpu, bo, bi, true);
    link(cpu, lk);
    if taken {
        cpu.thread.nia = cpu.thread.mask_ea(target);
    }
    Ok(())
}

/// bcctr - Branch Conditional to Count Register
pub fn bcctr(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (bo, bi, _, lk) = xl_form(word);
    let target = cpu.thread.ctr & !3;
    let taken = condition(cpu, bo, bi, false);
    link(cpu, lk);
    if taken {
        cpu.thread.nia = cpu.thread.mask_ea(target);
    }
    Ok(())
}

/// sc - System Call
pub fn sc(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    cpu.thread.sc_lev = bits(word, 20, 26) & 1 != 0;
    Err(cpu.raise(Exceptions::SYSTEM_CALL))
}

/// Trap condition from TO and the two operands
#[inline]
fn trap_taken(to: u32, a: i64, b: i64) -> bool {
    (to & 0x10 != 0 && a < b)
        || (to & 0x08 != 0 && a > b)
        || (to & 0x04 != 0 && a == b)
        || (to & 0x02 != 0 && (a as u64) < (b as u64))
        || (to & 0x01 != 0 && (a as u64) > (b as u64))
}

fn trap(cpu: &mut Cpu<'_>, to: u32, a: i64, b: i64) -> ExecResult {
    if trap_taken(to, a, b) {
        return Err(cpu.raise(Exceptions::PROGRAM_TRAP));
    }
    Ok(())
}

/// tw - Trap Word
pub fn tw(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (to, ra, rb) = x_form(word);
    let (a, b) = (cpu.thread.gpr[ra] as i32 as i64, cpu.thread.gpr[rb] as i32 as i64);
    trap(cpu, to as u32, a, b)
}

/// twi - Trap Word Immediate
pub fn twi(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (to, ra, si) = d_form(word);
    let a = cpu.thread.gpr[ra] as i32 as i64;
    trap(cpu, to as u32, a, si as i64)
}

/// td - Trap Doubleword
pub fn td(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (to, ra, rb) = x_form(word);
    let (a, b) = (cpu.thread.gpr[ra] as i64, cpu.thread.gpr[rb] as i64);
    trap(cpu, to as u32, a, b)
}

/// tdi - Trap Doubleword Immediate
pub fn tdi(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let (to, ra, si) = d_form(word);
    let a = cpu.thread.gpr[ra] as i64;
    trap(cpu, to as u32, a, si as i64)
}

// Condition register logical

/// mcrf - Move Condition Register Field
pub fn mcrf(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
    let bf = bits(word, 6, 8) as usize;
    let bfa = bits(word, 11, 13) as usize;
    let value = cpu.thread.cr_field(bfa);
    cpu.thread.set_cr_field(bf, value);
    Ok(())
}

macro_rules! cr_logical {
    ($($(#[$doc:meta])* $name:ident => |$a:ident, $b:ident| $body:expr;)*) => {
        $(
            $(#[$doc])*
            pub fn $name(cpu: &mut Cpu<'_>, word: u32) -> ExecResult {
                let (bt, ba, bb) = x_form(word);
                let $a = cpu.thread.cr_bit(ba as u32);
                let $b = cpu.thread.cr_bit(bb as u32);
                cpu.thread.set_cr_bit(bt as u32, $body);
                Ok(())
            }
        )*
    };
}

cr_logical! {
    /// crand - Condition Register AND
    crand => |a, b| a & b;
    /// crandc - Condition Register AND with Complement
    crandc => |a, b| a & !b;
    /// cror - Condition Register OR
    cror => |a, b| a | b;
    /// crorc - Condition Register OR with Complement
    crorc => |a, b| a | !b;
    /// crxor - Condition Register XOR
    crxor => |a, b| a ^ b;
    /// crnor - Condition Register NOR
    crnor => |a, b| !(a | b);
    /// crnand - Condition Register NAND
    crnand => |a, b| !(a & b);
    /// creqv - Condition Register Equivalent
    creqv => |a, b| a == b;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trap_conditions() {
        assert!(trap_taken(0x10, -1, 0));
        assert!(!trap_taken(0x02, -1, 0));
        assert!(trap_taken(0x01, -1, 0));
        assert!(trap_taken(0x04, 5, 5));
        // tw 31 traps unconditionally
        assert!(trap_taken(0x1F, 1, 2));
        assert!(!trap_taken(0, 1, 1));
    }
}
