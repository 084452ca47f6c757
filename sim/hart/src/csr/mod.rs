//! The control and status register subsystem
//!
//! Every CSR is described by a [`CsrAttrs`] record in a registry keyed by
//! the 12-bit address: presence requirements, read and write callbacks as
//! plain function pointers, write masks and policy flags.
//! The trap machine and the emitters refer to CSRs only through their
//! addresses, never through pointers into the registry, which keeps the
//! dependency between the two subsystems one-directional.

mod hypervisor;
mod machine;
mod supervisor;
mod unprivileged;

use crate::trap::Trap;
use crate::Hart;
use bitflags::bitflags;
use riscv::csr::{addr, Mstatus};
use riscv::fp::FFlags;
use riscv::isa::Architecture;
use riscv::mode::PrivilegeMode;
use riscv::vtype::VType;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Raw storage of the CSR bank.
///
/// Registers that are pure views (sstatus, sip, vsie, fflags, ...) have no
/// field of their own; their callbacks derive them from the canonical
/// storage here.
#[derive(Debug, Clone)]
pub struct Csrs {
    pub mstatus: u64,
    /// Currently enabled `misa` extension letters
    pub misa_ext: u64,
    pub medeleg: u64,
    pub mideleg: u64,
    pub mie: u64,
    pub mip: u64,
    pub mtvec: u64,
    pub mcounteren: u32,
    pub mcountinhibit: u32,
    pub mscratch: u64,
    pub mepc: u64,
    pub mcause: u64,
    pub mtval: u64,
    pub mtval2: u64,
    pub mtinst: u64,
    pub menvcfg: u64,
    pub mcycle: u64,
    pub minstret: u64,

    pub stvec: u64,
    pub scounteren: u32,
    pub senvcfg: u64,
    pub sscratch: u64,
    pub sepc: u64,
    pub scause: u64,
    pub stval: u64,
    pub satp: u64,

    pub hstatus: u64,
    pub hedeleg: u64,
    pub hideleg: u64,
    pub hvip: u64,
    pub hcounteren: u32,
    pub hgeie: u64,
    pub hgeip: u64,
    pub htval: u64,
    pub htinst: u64,
    pub henvcfg: u64,
    pub hgatp: u64,

    pub vsstatus: u64,
    pub vstvec: u64,
    pub vsscratch: u64,
    pub vsepc: u64,
    pub vscause: u64,
    pub vstval: u64,
    pub vsatp: u64,

    /// fflags in bits 4:0, frm in bits 7:5
    pub fcsr: u64,
    pub vstart: u64,
    pub vxsat: u64,
    pub vxrm: u64,
    pub vl: u64,
    pub vtype: u64,

    pub pmpcfg: [u8; 64],
    pub pmpaddr: [u64; 64],
}

impl Default for Csrs {
    fn default() -> Self {
        Csrs {
            mstatus: Default::default(),
            misa_ext: Default::default(),
            medeleg: Default::default(),
            mideleg: Default::default(),
            mie: Default::default(),
            mip: Default::default(),
            mtvec: Default::default(),
            mcounteren: Default::default(),
            mcountinhibit: Default::default(),
            mscratch: Default::default(),
            mepc: Default::default(),
            mcause: Default::default(),
            mtval: Default::default(),
            mtval2: Default::default(),
            mtinst: Default::default(),
            menvcfg: Default::default(),
            mcycle: Default::default(),
            minstret: Default::default(),

            stvec: Default::default(),
            scounteren: Default::default(),
            senvcfg: Default::default(),
            sscratch: Default::default(),
            sepc: Default::default(),
            scause: Default::default(),
            stval: Default::default(),
            satp: Default::default(),

            hstatus: Default::default(),
            hedeleg: Default::default(),
            hideleg: Default::default(),
            hvip: Default::default(),
            hcounteren: Default::default(),
            hgeie: Default::default(),
            hgeip: Default::default(),
            htval: Default::default(),
            htinst: Default::default(),
            henvcfg: Default::default(),
            hgatp: Default::default(),

            vsstatus: Default::default(),
            vstvec: Default::default(),
            vsscratch: Default::default(),
            vsepc: Default::default(),
            vscause: Default::default(),
            vstval: Default::default(),
            vsatp: Default::default(),

            fcsr: Default::default(),
            vstart: Default::default(),
            vxsat: Default::default(),
            vxrm: Default::default(),
            vl: Default::default(),
            vtype: Default::default(),

            pmpcfg: [0u8; 64],
            pmpaddr: [0u64; 64],
        }
    }
}

impl Csrs {
    pub fn new(cfg: &crate::config::Config) -> Self {
        let mut csrs = Csrs {
            misa_ext: cfg.arch.misa_letters(),
            // vector state starts out invalid until a vset installs a type
            vtype: VType::ill(cfg.xbits()).0,
            ..Default::default()
        };
        if cfg.xlen == riscv::isa::Xlen::Rv64 {
            // UXL/SXL are fixed at the configured XLEN
            let xl = cfg.xlen.encoding();
            csrs.mstatus |= (xl << Mstatus::UXL_SHIFT) | (xl << Mstatus::SXL_SHIFT);
            csrs.vsstatus |= xl << Mstatus::UXL_SHIFT;
        }
        // configured units come up Initial rather than Off, so bare-metal
        // code can use them without an enabling write first
        let mut mstatus = Mstatus(csrs.mstatus);
        if cfg.flen > 0 {
            mstatus.set_fs(riscv::csr::ExtState::Initial);
        }
        if cfg.arch.contains(Architecture::V) {
            mstatus.set_vs(riscv::csr::ExtState::Initial);
        }
        csrs.mstatus = mstatus.0;
        csrs
    }

    pub fn mstatus(&self) -> Mstatus {
        Mstatus(self.mstatus)
    }

    pub fn fflags(&self) -> FFlags {
        FFlags::from_bits_truncate(self.fcsr & 0x1f)
    }

    pub fn set_fflags(&mut self, flags: FFlags) {
        self.fcsr = (self.fcsr & !0x1f) | flags.bits();
    }

    pub fn frm(&self) -> u64 {
        (self.fcsr >> 5) & 0b111
    }

    pub fn vtype(&self) -> VType {
        VType(self.vtype)
    }
}

bitflags! {
    /// Policy flags of a CSR registry entry
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
    pub struct CsrFlags: u16 {
        /// A write terminates the current translation block
        const END_BLOCK = 1 << 0;
        /// A write invalidates the block's rounding-mode assumption
        const END_RM = 1 << 1;
        /// Excluded from save/restore checkpoints
        const NO_SAVE_RESTORE = 1 << 2;
        /// Reads and writes are redirected to the VS counterpart when V=1
        const VIRTUAL_ALIAS = 1 << 3;
        /// Access is trapped by `mstatus.TVM` / `hstatus.VTVM`
        const TRAP_TVM = 1 << 4;
        /// Access is trapped by `hvictl.VTI`
        const TRAP_VTI = 1 << 5;
        /// Unprivileged counter gated by the `xcounteren` chain
        const COUNTER = 1 << 6;
        /// A write may change the dynamic rounding mode or FP flags and
        /// must mark the FP unit dirty
        const FP_STATE = 1 << 7;
        /// Vector state CSR gated by `mstatus.VS`
        const VEC_STATE = 1 << 8;
    }
}

/// How the writable bits of a CSR are determined
#[derive(Copy, Clone)]
pub enum WriteMask {
    Const(u64),
    /// Mask depends on the configuration or on other CSR state
    Dynamic(fn(&Hart) -> u64),
}

/// Registry record describing one CSR
#[derive(Clone)]
pub struct CsrAttrs {
    pub number: u16,
    pub name: &'static str,
    /// Features that must be enabled for the register to exist
    pub arch: Architecture,
    /// Additional presence predicate beyond the feature set
    pub present: Option<fn(&Hart) -> bool>,
    pub read: fn(&Hart, &CsrAttrs) -> u64,
    /// `None` marks an architecturally read-only register
    pub write: Option<fn(&mut Hart, &CsrAttrs, u64) -> u64>,
    /// Post-write hook updating derived block knowledge
    pub wstate: Option<fn(&mut Hart)>,
    pub mask: WriteMask,
    pub flags: CsrFlags,
    /// Smstateen gate bit, when access is additionally controlled by the
    /// state-enable chain (unused until Smstateen is configured)
    pub stateen_bit: Option<u8>,
}

impl CsrAttrs {
    /// Writable-bit mask under the current configuration
    pub fn effective_mask(&self, hart: &Hart) -> u64 {
        match self.mask {
            WriteMask::Const(mask) => mask,
            WriteMask::Dynamic(f) => f(hart),
        }
    }
}

/// Convenience constructor used by the definition modules
pub(crate) fn attrs(
    number: u16,
    name: &'static str,
    arch: Architecture,
    read: fn(&Hart, &CsrAttrs) -> u64,
    write: Option<fn(&mut Hart, &CsrAttrs, u64) -> u64>,
    mask: WriteMask,
) -> CsrAttrs {
    CsrAttrs {
        number,
        name,
        arch,
        present: None,
        read,
        write,
        wstate: None,
        mask,
        flags: CsrFlags::empty(),
        stateen_bit: None,
    }
}

/// Writable bits of an sstatus-shaped view (sstatus, vsstatus), trimmed to
/// the configured extensions; UXL and SD stay read-only
pub(super) fn supervisor_view_mask(hart: &Hart) -> u64 {
    let mut mask = Mstatus::sstatus_mask(hart.cfg.xlen);
    if hart.cfg.flen == 0 {
        mask &= !(0b11 << Mstatus::FS_SHIFT);
    }
    if !hart.cfg.arch.contains(Architecture::V) {
        mask &= !(0b11 << Mstatus::VS_SHIFT);
    }
    mask & !(0b11 << Mstatus::UXL_SHIFT) & !(1 << 63)
}

fn registry() -> &'static BTreeMap<u16, CsrAttrs> {
    static REGISTRY: OnceLock<BTreeMap<u16, CsrAttrs>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut map = BTreeMap::new();
        for attrs in machine::defs()
            .into_iter()
            .chain(supervisor::defs())
            .chain(hypervisor::defs())
            .chain(unprivileged::defs())
        {
            let prev = map.insert(attrs.number, attrs);
            assert!(prev.is_none(), "duplicate CSR registry entry");
        }
        map
    })
}

pub fn lookup(csr: u16) -> Option<&'static CsrAttrs> {
    registry().get(&csr)
}

/// All registry entries, for save/restore and diagnostics
pub fn all() -> impl Iterator<Item = &'static CsrAttrs> {
    registry().values()
}

/// The VS-mode counterpart a virtual-alias CSR resolves to when V=1
fn virtual_alias(csr: u16) -> u16 {
    match csr {
        addr::SSTATUS => addr::VSSTATUS,
        addr::SIE => addr::VSIE,
        addr::STVEC => addr::VSTVEC,
        addr::SSCRATCH => addr::VSSCRATCH,
        addr::SEPC => addr::VSEPC,
        addr::SCAUSE => addr::VSCAUSE,
        addr::STVAL => addr::VSTVAL,
        addr::SIP => addr::VSIP,
        addr::SATP => addr::VSATP,
        other => other,
    }
}

/// Whether a CSR exists on this hart
pub fn is_present(hart: &Hart, attrs: &CsrAttrs) -> bool {
    if !hart.enabled.contains(attrs.arch) {
        return false;
    }
    match attrs.present {
        Some(f) => f(hart),
        None => true,
    }
}

/// The access check of the CSR instructions, in architectural order:
/// existence, privilege, read-only, TVM/VTVM traps, then virtual aliasing.
pub fn check_access(hart: &Hart, csr: u16, write: bool) -> Result<&'static CsrAttrs, Trap> {
    let mode = hart.state.mode;
    let Some(attrs) = lookup(csr).filter(|attrs| is_present(hart, attrs)) else {
        return Err(hart.illegal_instruction("unimplemented CSR", false));
    };

    let needed = addr::min_privilege(csr);
    if mode.level() < needed {
        // an HS-level CSR would be accessible at the same base privilege
        // outside virtualisation, so from VS this is a virtual trap
        return Err(hart.illegal_instruction("insufficient privilege for CSR", needed <= 2));
    }

    if write && (addr::is_read_only(csr) || attrs.write.is_none()) {
        return Err(hart.illegal_instruction("write to read-only CSR", false));
    }

    if attrs.flags.contains(CsrFlags::TRAP_TVM) {
        use riscv::csr::{HstatusFlags, MstatusFlags};
        match mode {
            PrivilegeMode::Supervisor
                if hart.csrs.mstatus().contains(MstatusFlags::TVM) =>
            {
                return Err(hart.illegal_instruction("CSR access trapped by TVM", false));
            }
            PrivilegeMode::VirtualSupervisor
                if HstatusFlags::from_bits_truncate(hart.csrs.hstatus)
                    .contains(HstatusFlags::VTVM) =>
            {
                return Err(hart.illegal_instruction("CSR access trapped by VTVM", true));
            }
            _ => {}
        }
    }

    if attrs.flags.contains(CsrFlags::COUNTER) {
        check_counter_access(hart, csr)?;
    }

    // the FP and vector state registers trap while their unit is off
    use riscv::csr::ExtState;
    if attrs.flags.contains(CsrFlags::FP_STATE) && hart.csrs.mstatus().fs() == ExtState::Off {
        return Err(hart.illegal_instruction("fp CSR access with mstatus.FS off", false));
    }
    if attrs.flags.contains(CsrFlags::VEC_STATE) && hart.csrs.mstatus().vs() == ExtState::Off {
        return Err(hart.illegal_instruction("vector CSR access with mstatus.VS off", false));
    }

    if attrs.flags.contains(CsrFlags::VIRTUAL_ALIAS) && mode.is_virtual() {
        let alias = lookup(virtual_alias(csr)).expect("virtual alias must be registered");
        return Ok(alias);
    }
    Ok(attrs)
}

/// The `mcounteren`/`hcounteren`/`scounteren` permission chain for the
/// unprivileged counters
fn check_counter_access(hart: &Hart, csr: u16) -> Result<(), Trap> {
    let bit = 1u32 << (csr & 0x1f);
    let mode = hart.state.mode;
    if mode.level() < 3 && hart.csrs.mcounteren & bit == 0 {
        return Err(hart.illegal_instruction("counter disabled by mcounteren", false));
    }
    if mode.is_virtual() && hart.csrs.hcounteren & bit == 0 {
        return Err(hart.illegal_instruction("counter disabled by hcounteren", true));
    }
    if mode.level() < 1 && hart.csrs.scounteren & bit == 0 {
        return Err(hart.illegal_instruction("counter disabled by scounteren", false));
    }
    Ok(())
}

/// Read a CSR that has passed the access check
pub fn read(hart: &Hart, attrs: &CsrAttrs) -> u64 {
    let value = (attrs.read)(hart, attrs);
    value & hart.cfg.xmask()
}

/// Write a CSR that has passed the access check.
///
/// The architecturally written value is `(old & !mask) | (value & mask)`,
/// further adjusted by the register's own write callback; the value the
/// register now holds is returned.
pub fn write(hart: &mut Hart, attrs: &CsrAttrs, value: u64) -> u64 {
    let mask = attrs.effective_mask(hart);
    let old = (attrs.read)(hart, attrs);
    let merged = (old & !mask) | (value & mask);
    let writer = attrs.write.expect("write checked by check_access");
    let written = writer(hart, attrs, merged);
    if let Some(wstate) = attrs.wstate {
        wstate(hart);
    }
    log::trace!("csr write {} <- {:#x} (now {:#x})", attrs.name, value, written);
    written
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_is_consistent() {
        // every alias target must exist, and every entry's number must
        // match its registry key
        for attrs in all() {
            assert_eq!(lookup(attrs.number).unwrap().number, attrs.number);
            if attrs.flags.contains(CsrFlags::VIRTUAL_ALIAS) {
                assert!(
                    lookup(virtual_alias(attrs.number)).is_some(),
                    "missing alias for {}",
                    attrs.name
                );
                assert_ne!(virtual_alias(attrs.number), attrs.number);
            }
        }
        assert!(lookup(addr::MSTATUS).is_some());
        assert!(lookup(addr::VLENB).is_some());
        assert!(lookup(0x5ff).is_none());
    }
}
