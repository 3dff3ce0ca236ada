//! Exception dispatch
//!
//! Instructions and devices only ever *raise* exceptions by setting bits in
//! [`ThreadState::exceptions`]. Between instructions [`dispatch`] picks the
//! highest-priority pending exception whose enabling condition holds,
//! performs interrupt entry and clears its bit. Masked exceptions stay
//! pending and lower-priority ones are still considered.

use bitflags::bitflags;
use xc_core::CpuError;

use crate::regs::{msr, srr1};
use crate::thread::{CoreState, ThreadState};

bitflags! {
    /// Pending exception set
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Exceptions: u32 {
        const RESET                  = 1 << 0;
        const MACHINE_CHECK          = 1 << 1;
        const PROGRAM_ILLEGAL        = 1 << 2;
        const FP_UNAVAILABLE         = 1 << 3;
        const DATA_STORAGE           = 1 << 4;
        const DATA_SEGMENT           = 1 << 5;
        const ALIGNMENT              = 1 << 6;
        const TRACE                  = 1 << 7;
        const PROGRAM_TRAP           = 1 << 8;
        const SYSTEM_CALL            = 1 << 9;
        const PROGRAM_PRIVILEGED     = 1 << 10;
        const INSTR_STORAGE          = 1 << 11;
        const INSTR_SEGMENT          = 1 << 12;
        const PROGRAM_FP             = 1 << 13;
        const EXTERNAL               = 1 << 14;
        const DECREMENTER            = 1 << 15;
        const HYPERVISOR_DECREMENTER = 1 << 16;
        const VECTOR_UNAVAILABLE     = 1 << 17;
        const PERFORMANCE_MONITOR    = 1 << 18;

        /// Exceptions raised synchronously by the executing instruction
        const SYNCHRONOUS = Self::PROGRAM_ILLEGAL.bits()
            | Self::FP_UNAVAILABLE.bits()
            | Self::DATA_STORAGE.bits()
            | Self::DATA_SEGMENT.bits()
            | Self::ALIGNMENT.bits()
            | Self::PROGRAM_TRAP.bits()
            | Self::SYSTEM_CALL.bits()
            | Self::PROGRAM_PRIVILEGED.bits()
            | Self::INSTR_STORAGE.bits()
            | Self::INSTR_SEGMENT.bits()
            | Self::VECTOR_UNAVAILABLE.bits();
    }
}

/// Dispatch order, highest priority first
pub const PRIORITY: [Exceptions; 19] = [
    Exceptions::RESET,
    Exceptions::MACHINE_CHECK,
    Exceptions::PROGRAM_ILLEGAL,
    Exceptions::FP_UNAVAILABLE,
    Exceptions::DATA_STORAGE,
    Exceptions::DATA_SEGMENT,
    Exceptions::ALIGNMENT,
    Exceptions::TRACE,
    Exceptions::PROGRAM_TRAP,
    Exceptions::SYSTEM_CALL,
    Exceptions::PROGRAM_PRIVILEGED,
    Exceptions::INSTR_STORAGE,
    Exceptions::INSTR_SEGMENT,
    Exceptions::PROGRAM_FP,
    Exceptions::EXTERNAL,
    Exceptions::DECREMENTER,
    Exceptions::HYPERVISOR_DECREMENTER,
    Exceptions::VECTOR_UNAVAILABLE,
    Exceptions::PERFORMANCE_MONITOR,
];

impl Exceptions {
    /// Interrupt vector offset of a single exception
    pub fn vector(self) -> u64 {
        match self {
            Self::RESET => 0x100,
            Self::MACHINE_CHECK => 0x200,
            Self::DATA_STORAGE => 0x300,
            Self::DATA_SEGMENT => 0x380,
            Self::INSTR_STORAGE => 0x400,
            Self::INSTR_SEGMENT => 0x480,
            Self::EXTERNAL => 0x500,
            Self::ALIGNMENT => 0x600,
            Self::PROGRAM_ILLEGAL
            | Self::PROGRAM_PRIVILEGED
            | Self::PROGRAM_TRAP
            | Self::PROGRAM_FP => 0x700,
            Self::FP_UNAVAILABLE => 0x800,
            Self::DECREMENTER => 0x900,
            Self::HYPERVISOR_DECREMENTER => 0x980,
            Self::SYSTEM_CALL => 0xC00,
            Self::TRACE => 0xD00,
            Self::PERFORMANCE_MONITOR => 0xF00,
            Self::VECTOR_UNAVAILABLE => 0xF20,
            _ => 0,
        }
    }

    /// SRR0 receives the next instruction instead of the faulting one
    fn saves_next(self) -> bool {
        matches!(
            self,
            Self::RESET
                | Self::EXTERNAL
                | Self::DECREMENTER
                | Self::HYPERVISOR_DECREMENTER
                | Self::SYSTEM_CALL
                | Self::TRACE
                | Self::PERFORMANCE_MONITOR
        )
    }

    /// Diagnostic name of a single exception
    pub fn name(self) -> &'static str {
        self.iter_names().next().map(|(name, _)| name).unwrap_or("NONE")
    }
}

/// Whether `kind` may be taken under the current MSR
fn enabled(thread: &ThreadState, kind: Exceptions) -> bool {
    let ee = thread.msr & msr::EE != 0;
    match kind {
        Exceptions::EXTERNAL | Exceptions::DECREMENTER => ee,
        Exceptions::HYPERVISOR_DECREMENTER => ee || !thread.hv(),
        _ => true,
    }
}

/// The exception [`dispatch`] would take next, if any
pub fn next_pending(thread: &ThreadState) -> Option<Exceptions> {
    if thread.exceptions.is_empty() {
        return None;
    }
    PRIORITY
        .iter()
        .copied()
        .find(|&kind| thread.exceptions.contains(kind) && enabled(thread, kind))
}

/// Take the highest-priority deliverable exception
///
/// Returns the exception taken, or a checkstop when a machine check arrives
/// with MSR[ME] clear.
pub fn dispatch(thread: &mut ThreadState, core: &CoreState) -> Result<Option<Exceptions>, CpuError> {
    let Some(kind) = next_pending(thread) else {
        return Ok(None);
    };

    if kind == Exceptions::MACHINE_CHECK && thread.msr & msr::ME == 0 {
        return Err(CpuError::Checkstop {
            core: core.index,
            reason: format!("machine check with ME clear on PIR {} at 0x{:x}", thread.pir, thread.cia),
        });
    }

    enter(thread, core, kind);
    Ok(Some(kind))
}

/// Perform interrupt entry for `kind`
fn enter(thread: &mut ThreadState, core: &CoreState, kind: Exceptions) {
    thread.exceptions.remove(kind);

    let saved_ia = if kind.saves_next() { thread.nia } else { thread.cia };
    let reason = match kind {
        Exceptions::PROGRAM_FP => srr1::PROGRAM_FP,
        Exceptions::PROGRAM_ILLEGAL => srr1::PROGRAM_ILLEGAL,
        Exceptions::PROGRAM_PRIVILEGED => srr1::PROGRAM_PRIVILEGED,
        Exceptions::PROGRAM_TRAP => srr1::PROGRAM_TRAP,
        Exceptions::INSTR_STORAGE => std::mem::take(&mut thread.isi_reason),
        Exceptions::RESET => std::mem::take(&mut thread.reset_reason),
        _ => 0,
    };
    let saved_msr = (thread.msr & srr1::MSR_MASK) | reason;

    if kind == Exceptions::HYPERVISOR_DECREMENTER {
        thread.hsrr0 = saved_ia;
        thread.hsrr1 = saved_msr;
    } else {
        thread.srr0 = saved_ia;
        thread.srr1 = saved_msr;
    }

    let hv = if kind == Exceptions::SYSTEM_CALL {
        thread.hv() || std::mem::take(&mut thread.sc_lev)
    } else {
        true
    };

    let cleared = msr::EE
        | msr::PR
        | msr::FP
        | msr::FE0
        | msr::SE
        | msr::BE
        | msr::FE1
        | msr::IR
        | msr::DR
        | msr::PMM
        | msr::RI
        | msr::LE
        | msr::HV;
    let mut new_msr = (thread.msr & !cleared) | msr::SF;
    if hv {
        new_msr |= msr::HV;
    }
    if kind == Exceptions::MACHINE_CHECK {
        new_msr &= !msr::ME;
    }
    thread.msr = new_msr;
    thread.cfar = thread.cia;
    thread.nia = core.hrmor.wrapping_add(kind.vector());

    tracing::debug!(
        "PIR {} took {} at 0x{:x}, vector 0x{:x}",
        thread.pir,
        kind.name(),
        saved_ia,
        thread.nia
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_env() -> (ThreadState, CoreState) {
        let mut core = CoreState::new(0);
        core.hrmor = 0;
        let mut thread = ThreadState::new(0, 0);
        thread.cia = 0x1000;
        thread.nia = 0x1004;
        (thread, core)
    }

    #[test]
    fn test_nothing_pending() {
        let (mut thread, core) = create_test_env();
        assert_eq!(dispatch(&mut thread, &core).unwrap(), None);
        assert_eq!(thread.nia, 0x1004);
    }

    #[test]
    fn test_program_illegal_entry() {
        let (mut thread, core) = create_test_env();
        thread.msr |= msr::EE | msr::IR | msr::DR;
        thread.exceptions |= Exceptions::PROGRAM_ILLEGAL;

        assert_eq!(dispatch(&mut thread, &core).unwrap(), Some(Exceptions::PROGRAM_ILLEGAL));
        assert_eq!(thread.nia, 0x700);
        assert_eq!(thread.srr0, 0x1000);
        assert_ne!(thread.srr1 & srr1::PROGRAM_ILLEGAL, 0);
        assert_ne!(thread.srr1 & msr::EE, 0);
        assert_eq!(thread.msr & (msr::EE | msr::IR | msr::DR), 0);
        assert!(thread.hv());
        assert!(thread.exceptions.is_empty());
    }

    #[test]
    fn test_priority_order() {
        let (mut thread, core) = create_test_env();
        thread.msr |= msr::EE;
        thread.exceptions |= Exceptions::EXTERNAL | Exceptions::DATA_STORAGE | Exceptions::SYSTEM_CALL;

        assert_eq!(dispatch(&mut thread, &core).unwrap(), Some(Exceptions::DATA_STORAGE));
        // EE was cleared by entry; the external stays pending
        thread.msr |= msr::EE;
        assert_eq!(dispatch(&mut thread, &core).unwrap(), Some(Exceptions::SYSTEM_CALL));
        thread.msr |= msr::EE;
        assert_eq!(dispatch(&mut thread, &core).unwrap(), Some(Exceptions::EXTERNAL));
    }

    #[test]
    fn test_masked_external_stays_pending() {
        let (mut thread, core) = create_test_env();
        thread.exceptions |= Exceptions::EXTERNAL | Exceptions::PERFORMANCE_MONITOR;

        assert_eq!(dispatch(&mut thread, &core).unwrap(), Some(Exceptions::PERFORMANCE_MONITOR));
        assert_eq!(thread.exceptions, Exceptions::EXTERNAL);
        assert_eq!(dispatch(&mut thread, &core).unwrap(), None);
    }

    #[test]
    fn test_hdec_uses_hsrr() {
        let (mut thread, core) = create_test_env();
        thread.msr &= !msr::HV;
        thread.exceptions |= Exceptions::HYPERVISOR_DECREMENTER;

        assert_eq!(
            dispatch(&mut thread, &core).unwrap(),
            Some(Exceptions::HYPERVISOR_DECREMENTER)
        );
        assert_eq!(thread.hsrr0, 0x1004);
        assert_eq!(thread.srr0, 0);
        assert_eq!(thread.nia, 0x980);
    }

    #[test]
    fn test_machine_check_without_me_checkstops() {
        let (mut thread, core) = create_test_env();
        thread.exceptions |= Exceptions::MACHINE_CHECK;
        let err = dispatch(&mut thread, &core).unwrap_err();
        assert!(matches!(err, CpuError::Checkstop { core: 0, .. }));

        thread.msr |= msr::ME;
        assert_eq!(dispatch(&mut thread, &core).unwrap(), Some(Exceptions::MACHINE_CHECK));
        assert_eq!(thread.msr & msr::ME, 0);
        assert_eq!(thread.nia, 0x200);
    }

    #[test]
    fn test_system_call_lev() {
        let (mut thread, core) = create_test_env();
        thread.msr &= !msr::HV;
        thread.exceptions |= Exceptions::SYSTEM_CALL;
        dispatch(&mut thread, &core).unwrap();
        assert!(!thread.hv());
        assert_eq!(thread.srr0, 0x1004);

        thread.sc_lev = true;
        thread.exceptions |= Exceptions::SYSTEM_CALL;
        dispatch(&mut thread, &core).unwrap();
        assert!(thread.hv());
    }

    #[test]
    fn test_vector_offsets_from_hrmor() {
        let (mut thread, mut core) = create_test_env();
        core.hrmor = 0x200_0000_0000;
        thread.reset_reason = srr1::RESET_WAKE;
        thread.exceptions |= Exceptions::RESET;
        dispatch(&mut thread, &core).unwrap();
        assert_eq!(thread.nia, 0x200_0000_0100);
        assert_ne!(thread.srr1 & srr1::RESET_WAKE, 0);
    }
}
