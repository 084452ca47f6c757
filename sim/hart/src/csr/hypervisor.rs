//! Hypervisor and virtual-supervisor CSR definitions

use super::{attrs, CsrAttrs, CsrFlags, WriteMask};
use crate::Hart;
use riscv::csr::{addr, ExtState, HstatusFlags, InterruptBits, Mstatus, XtvecData};
use riscv::isa::Architecture;

/// Exception codes that `hedeleg` can pass on to VS-mode: the guest's own
/// faults; the hypervisor causes 10, 20-23 always trap at least to HS
const HEDELEG_MASK: u64 = 0b1011_0011_1111_1111;

fn hstatus_mask(hart: &Hart) -> u64 {
    let mut mask = (HstatusFlags::GVA
        | HstatusFlags::SPV
        | HstatusFlags::SPVP
        | HstatusFlags::HU
        | HstatusFlags::VTVM
        | HstatusFlags::VTW
        | HstatusFlags::VTSR)
        .bits();
    if hart.cfg.xlen == riscv::isa::Xlen::Rv64 {
        mask |= HstatusFlags::VSBE.bits();
    }
    mask
}

fn vsstatus_mask(hart: &Hart) -> u64 {
    super::supervisor_view_mask(hart)
}

/// Map an `mip`/`mie` VS bit position to its vsip/vsie presentation: the
/// VS interrupts appear at the S positions inside the virtual machine
fn vs_to_s(bits: u64) -> u64 {
    (bits & InterruptBits::VS_MASK.bits()) >> 1
}

fn s_to_vs(bits: u64) -> u64 {
    (bits << 1) & InterruptBits::VS_MASK.bits()
}

pub(super) fn defs() -> Vec<CsrAttrs> {
    vec![
        {
            let mut a = attrs(
                addr::HSTATUS,
                "hstatus",
                Architecture::H,
                |h, _| h.csrs.hstatus,
                Some(|h, _, v| {
                    h.csrs.hstatus = v;
                    v
                }),
                WriteMask::Dynamic(hstatus_mask),
            );
            a.flags = CsrFlags::END_BLOCK;
            a
        },
        attrs(
            addr::HEDELEG,
            "hedeleg",
            Architecture::H,
            |h, _| h.csrs.hedeleg,
            Some(|h, _, v| {
                h.csrs.hedeleg = v;
                v
            }),
            WriteMask::Const(HEDELEG_MASK),
        ),
        attrs(
            addr::HIDELEG,
            "hideleg",
            Architecture::H,
            |h, _| h.csrs.hideleg,
            Some(|h, _, v| {
                h.csrs.hideleg = v & InterruptBits::VS_MASK.bits();
                h.csrs.hideleg
            }),
            WriteMask::Const(InterruptBits::VS_MASK.bits()),
        ),
        {
            let mut a = attrs(
            addr::HIE,
            "hie",
            Architecture::H,
            |h, _| h.csrs.mie & InterruptBits::H_MASK.bits(),
            Some(|h, _, v| {
                let mask = InterruptBits::H_MASK.bits();
                h.csrs.mie = (h.csrs.mie & !mask) | (v & mask);
                h.csrs.mie & mask
            }),
            WriteMask::Const(InterruptBits::H_MASK.bits()),
            );
            a.flags = CsrFlags::NO_SAVE_RESTORE;
            a
        },
        {
            let mut a = attrs(
            addr::HIP,
            "hip",
            Architecture::H,
            |h, _| {
                (h.csrs.mip | h.csrs.hvip) & InterruptBits::H_MASK.bits()
            },
            Some(|h, _, v| {
                // only VSSIP is writable through hip, via hvip
                let mask = InterruptBits::VSSIP.bits();
                h.csrs.hvip = (h.csrs.hvip & !mask) | (v & mask);
                (h.csrs.mip | h.csrs.hvip) & InterruptBits::H_MASK.bits()
            }),
            WriteMask::Const(InterruptBits::VSSIP.bits()),
            );
            a.flags = CsrFlags::NO_SAVE_RESTORE;
            a
        },
        attrs(
            addr::HVIP,
            "hvip",
            Architecture::H,
            |h, _| h.csrs.hvip,
            Some(|h, _, v| {
                h.csrs.hvip = v & InterruptBits::VS_MASK.bits();
                h.csrs.hvip
            }),
            WriteMask::Const(InterruptBits::VS_MASK.bits()),
        ),
        attrs(
            addr::HCOUNTEREN,
            "hcounteren",
            Architecture::H,
            |h, _| h.csrs.hcounteren as u64,
            Some(|h, _, v| {
                h.csrs.hcounteren = v as u32;
                v
            }),
            WriteMask::Const(0b111),
        ),
        attrs(
            addr::HGEIE,
            "hgeie",
            Architecture::H,
            |h, _| h.csrs.hgeie,
            Some(|h, _, v| {
                h.csrs.hgeie = v & !1;
                h.csrs.hgeie
            }),
            WriteMask::Const(!1),
        ),
        attrs(addr::HGEIP, "hgeip", Architecture::H, |h, _| h.csrs.hgeip, None, WriteMask::Const(0)),
        attrs(
            addr::HTVAL,
            "htval",
            Architecture::H,
            |h, _| h.csrs.htval,
            Some(|h, _, v| {
                h.csrs.htval = v;
                v
            }),
            WriteMask::Const(u64::MAX),
        ),
        attrs(
            addr::HTINST,
            "htinst",
            Architecture::H,
            |h, _| h.csrs.htinst,
            Some(|h, _, v| {
                h.csrs.htinst = v;
                v
            }),
            WriteMask::Const(u64::MAX),
        ),
        attrs(
            addr::HENVCFG,
            "henvcfg",
            Architecture::H,
            |h, _| h.csrs.henvcfg,
            Some(|h, _, v| {
                h.csrs.henvcfg = v;
                v
            }),
            WriteMask::Const(0xf1),
        ),
        {
            let mut a = attrs(
                addr::HGATP,
                "hgatp",
                Architecture::H,
                |h, _| h.csrs.hgatp,
                Some(|h, _, v| {
                    if riscv::csr::SatpData::parse(v, h.cfg.xlen).is_some() {
                        // the G-stage root must be 16 KiB aligned
                        h.csrs.hgatp = v & !0b11;
                        h.tlbs.flush(crate::mem::tlb::Stage::Vs2);
                    }
                    h.csrs.hgatp
                }),
                WriteMask::Const(u64::MAX),
            );
            a.flags = CsrFlags::TRAP_TVM | CsrFlags::END_BLOCK;
            a
        },
        // virtual supervisor state
        {
            let mut a = attrs(
                addr::VSSTATUS,
                "vsstatus",
                Architecture::H,
                |h, _| h.csrs.vsstatus & Mstatus::sstatus_mask(h.cfg.xlen),
                Some(|h, _, v| {
                    let mut vsstatus = Mstatus(v);
                    vsstatus.update_sd();
                    h.csrs.vsstatus = vsstatus.0;
                    // the guest status carries its own FS/VS discipline
                    if vsstatus.fs() != ExtState::Dirty {
                        h.block.fs_dirty = false;
                    }
                    if vsstatus.vs() != ExtState::Dirty {
                        h.block.vs_dirty = false;
                    }
                    h.csrs.vsstatus
                }),
                WriteMask::Dynamic(vsstatus_mask),
            );
            a.flags = CsrFlags::END_BLOCK;
            a
        },
        {
            let mut a = attrs(
            addr::VSIE,
            "vsie",
            Architecture::H,
            |h, _| vs_to_s(h.csrs.mie & h.csrs.hideleg),
            Some(|h, _, v| {
                let mask = h.csrs.hideleg;
                h.csrs.mie = (h.csrs.mie & !mask) | (s_to_vs(v) & mask);
                vs_to_s(h.csrs.mie & mask)
            }),
            WriteMask::Const(InterruptBits::S_MASK.bits()),
            );
            a.flags = CsrFlags::NO_SAVE_RESTORE;
            a
        },
        {
            let mut a = attrs(
            addr::VSIP,
            "vsip",
            Architecture::H,
            |h, _| vs_to_s((h.csrs.mip | h.csrs.hvip) & h.csrs.hideleg),
            Some(|h, _, v| {
                let mask = h.csrs.hideleg & InterruptBits::VSSIP.bits();
                h.csrs.hvip = (h.csrs.hvip & !mask) | (s_to_vs(v) & mask);
                vs_to_s((h.csrs.mip | h.csrs.hvip) & h.csrs.hideleg)
            }),
            WriteMask::Const(InterruptBits::SSIP.bits()),
            );
            a.flags = CsrFlags::NO_SAVE_RESTORE;
            a
        },
        attrs(
            addr::VSTVEC,
            "vstvec",
            Architecture::H,
            |h, _| h.csrs.vstvec,
            Some(|h, _, v| {
                h.csrs.vstvec = v;
                v
            }),
            WriteMask::Const(XtvecData::WRITE_MASK),
        ),
        attrs(
            addr::VSSCRATCH,
            "vsscratch",
            Architecture::H,
            |h, _| h.csrs.vsscratch,
            Some(|h, _, v| {
                h.csrs.vsscratch = v;
                v
            }),
            WriteMask::Const(u64::MAX),
        ),
        attrs(
            addr::VSEPC,
            "vsepc",
            Architecture::H,
            |h, _| h.csrs.vsepc,
            Some(|h, _, v| {
                h.csrs.vsepc = v;
                v
            }),
            WriteMask::Dynamic(super::machine::epc_mask),
        ),
        attrs(
            addr::VSCAUSE,
            "vscause",
            Architecture::H,
            |h, _| h.csrs.vscause,
            Some(|h, _, v| {
                h.csrs.vscause = v;
                v
            }),
            WriteMask::Const(u64::MAX),
        ),
        attrs(
            addr::VSTVAL,
            "vstval",
            Architecture::H,
            |h, _| h.csrs.vstval,
            Some(|h, _, v| {
                h.csrs.vstval = v;
                v
            }),
            WriteMask::Const(u64::MAX),
        ),
        {
            let mut a = attrs(
                addr::VSATP,
                "vsatp",
                Architecture::H,
                |h, _| h.csrs.vsatp,
                Some(|h, _, v| {
                    if riscv::csr::SatpData::parse(v, h.cfg.xlen).is_some() {
                        h.csrs.vsatp = v;
                        h.tlbs.flush(crate::mem::tlb::Stage::Vs1);
                    }
                    h.csrs.vsatp
                }),
                WriteMask::Const(u64::MAX),
            );
            a.flags = CsrFlags::END_BLOCK;
            a
        },
    ]
}
