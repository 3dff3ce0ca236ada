//! Architected register numbers and bit masks

/// Special Purpose Register numbers
pub mod spr {
    pub const XER: u32 = 1;
    pub const LR: u32 = 8;
    pub const CTR: u32 = 9;
    pub const DSISR: u32 = 18;
    pub const DAR: u32 = 19;
    pub const DEC: u32 = 22;
    pub const SDR1: u32 = 25;
    pub const SRR0: u32 = 26;
    pub const SRR1: u32 = 27;
    pub const CFAR: u32 = 28;
    pub const CTRLRD: u32 = 136;
    pub const CTRLWR: u32 = 152;
    pub const VRSAVE: u32 = 256;
    pub const TBL_RO: u32 = 268;
    pub const TBU_RO: u32 = 269;
    pub const SPRG0: u32 = 272;
    pub const SPRG1: u32 = 273;
    pub const SPRG2: u32 = 274;
    pub const SPRG3: u32 = 275;
    pub const TBL_WO: u32 = 284;
    pub const TBU_WO: u32 = 285;
    pub const TB: u32 = 286;
    pub const PVR: u32 = 287;
    pub const HSPRG0: u32 = 304;
    pub const HSPRG1: u32 = 305;
    pub const HDSISR: u32 = 306;
    pub const HDAR: u32 = 307;
    pub const HDEC: u32 = 310;
    pub const RMOR: u32 = 312;
    pub const HRMOR: u32 = 313;
    pub const HSRR0: u32 = 314;
    pub const HSRR1: u32 = 315;
    pub const LPCR: u32 = 318;
    pub const LPIDR: u32 = 319;
    pub const TSCR: u32 = 921;
    pub const TTR: u32 = 922;
    pub const PPE_TLB_INDEX_HINT: u32 = 946;
    pub const PPE_TLB_INDEX: u32 = 947;
    pub const PPE_TLB_VPN: u32 = 948;
    pub const PPE_TLB_RPN: u32 = 949;
    pub const PPE_TLB_RMT: u32 = 951;
    pub const HID0: u32 = 1008;
    pub const HID1: u32 = 1009;
    pub const HID4: u32 = 1012;
    pub const DABR: u32 = 1013;
    pub const DABRX: u32 = 1015;
    pub const HID6: u32 = 1017;
    pub const PIR: u32 = 1023;

    /// SPRs with bit 0x10 set are privileged
    #[inline]
    pub const fn is_privileged(spr: u32) -> bool {
        spr & 0x10 != 0
    }
}

/// Machine State Register bits
pub mod msr {
    pub const SF: u64 = 0x8000_0000_0000_0000;
    pub const HV: u64 = 0x1000_0000_0000_0000;
    pub const VEC: u64 = 0x0000_0000_0200_0000;
    pub const EE: u64 = 0x8000;
    pub const PR: u64 = 0x4000;
    pub const FP: u64 = 0x2000;
    pub const ME: u64 = 0x1000;
    pub const FE0: u64 = 0x0800;
    pub const SE: u64 = 0x0400;
    pub const BE: u64 = 0x0200;
    pub const FE1: u64 = 0x0100;
    pub const IR: u64 = 0x0020;
    pub const DR: u64 = 0x0010;
    pub const PMM: u64 = 0x0004;
    pub const RI: u64 = 0x0002;
    pub const LE: u64 = 0x0001;

    /// Power-on value: 64-bit hypervisor, translation off
    pub const POWER_ON: u64 = SF | HV;
}

/// Fixed-point exception register bits
pub mod xer {
    pub const SO: u64 = 0x8000_0000;
    pub const OV: u64 = 0x4000_0000;
    pub const CA: u64 = 0x2000_0000;
    /// Byte count used by string instructions
    pub const BYTE_COUNT: u64 = 0x7F;
}

/// Reason bits recorded in SRR1 on interrupt entry
pub mod srr1 {
    /// Bits of MSR that survive into SRR1
    pub const MSR_MASK: u64 = 0xFFFF_FFFF_87C0_FFFF;
    pub const ISI_NOPTE: u64 = 0x4000_0000;
    pub const RESET_WAKE: u64 = 0x0020_0000;
    pub const PROGRAM_FP: u64 = 0x0010_0000;
    pub const PROGRAM_ILLEGAL: u64 = 0x0008_0000;
    pub const PROGRAM_PRIVILEGED: u64 = 0x0004_0000;
    pub const PROGRAM_TRAP: u64 = 0x0002_0000;
}

/// Data storage interrupt status bits
pub mod dsisr {
    pub const NOPTE: u64 = 0x4000_0000;
    pub const STORE: u64 = 0x0200_0000;
}

/// Logical partition control register bits
pub mod lpcr {
    /// Real-mode offset applies to non-hypervisor real accesses
    pub const LPES1: u64 = 0x0000_0000_0000_0008;
    /// Software-managed TLB
    pub const TL: u64 = 0x0000_0000_0000_0400;
}

/// Thread switch control register bits
pub mod tscr {
    /// External interrupt wakes a sleeping core
    pub const WEXT: u64 = 0x0010_0000;
}

/// Vector status and control register bits
pub mod vscr {
    pub const NJ: u32 = 0x0001_0000;
    pub const SAT: u32 = 0x0000_0001;
}

/// Thread enable bits of the CTRL register
pub mod ctrl {
    pub const TE_SHIFT: u32 = 22;
    pub const TE0: u32 = 0b10;
    pub const TE1: u32 = 0b01;
    /// Thread 0 enabled, the value written on power-on and wake
    pub const RUN_THREAD0: u64 = 0x0080_0000;

    /// Thread-enable field of a CTRL value
    #[inline]
    pub const fn thread_enables(ctrl: u64) -> u32 {
        ((ctrl >> TE_SHIFT) & 0b11) as u32
    }
}
