//! Supervisor-level CSR definitions
//!
//! Most of these are restricted views of machine-level storage; with the
//! hypervisor extension they additionally alias their VS counterparts
//! whenever V=1, which [`super::check_access`] resolves before the
//! callbacks run.

use super::{attrs, CsrAttrs, CsrFlags, WriteMask};
use crate::Hart;
use riscv::csr::{addr, ExtState, InterruptBits, Mstatus, XtvecData};
use riscv::isa::Architecture;

fn sstatus_mask(hart: &Hart) -> u64 {
    super::supervisor_view_mask(hart)
}

fn read_sstatus(hart: &Hart, _: &CsrAttrs) -> u64 {
    hart.csrs.mstatus & Mstatus::sstatus_mask(hart.cfg.xlen)
}

fn write_sstatus(hart: &mut Hart, attrs: &CsrAttrs, value: u64) -> u64 {
    let mask = sstatus_mask(hart);
    let mut mstatus = Mstatus((hart.csrs.mstatus & !mask) | (value & mask));
    mstatus.update_sd();
    hart.csrs.mstatus = mstatus.0;
    // a write lowering FS/VS invalidates the block's known-dirty state
    if mstatus.fs() != ExtState::Dirty {
        hart.block.fs_dirty = false;
    }
    if mstatus.vs() != ExtState::Dirty {
        hart.block.vs_dirty = false;
    }
    read_sstatus(hart, attrs)
}

/// The S-level interrupt bits visible through sie/sip: the delegated ones
fn s_visible(hart: &Hart) -> u64 {
    hart.csrs.mideleg & InterruptBits::S_MASK.bits()
}

pub(super) fn defs() -> Vec<CsrAttrs> {
    vec![
        {
            let mut a = attrs(
                addr::SSTATUS,
                "sstatus",
                Architecture::S,
                read_sstatus,
                Some(write_sstatus),
                WriteMask::Dynamic(sstatus_mask),
            );
            a.flags = CsrFlags::VIRTUAL_ALIAS | CsrFlags::END_BLOCK | CsrFlags::NO_SAVE_RESTORE;
            a
        },
        {
            let mut a = attrs(
                addr::SIE,
                "sie",
                Architecture::S,
                |h, _| h.csrs.mie & s_visible(h),
                Some(|h, _, v| {
                    let visible = s_visible(h);
                    h.csrs.mie = (h.csrs.mie & !visible) | (v & visible);
                    h.csrs.mie & visible
                }),
                WriteMask::Dynamic(s_visible),
            );
            a.flags = CsrFlags::VIRTUAL_ALIAS | CsrFlags::TRAP_VTI | CsrFlags::NO_SAVE_RESTORE;
            a
        },
        {
            let mut a = attrs(
                addr::STVEC,
                "stvec",
                Architecture::S,
                |h, _| h.csrs.stvec,
                Some(|h, _, v| {
                    h.csrs.stvec = v;
                    v
                }),
                WriteMask::Const(XtvecData::WRITE_MASK),
            );
            a.flags = CsrFlags::VIRTUAL_ALIAS;
            a
        },
        attrs(
            addr::SCOUNTEREN,
            "scounteren",
            Architecture::S,
            |h, _| h.csrs.scounteren as u64,
            Some(|h, _, v| {
                h.csrs.scounteren = v as u32;
                v
            }),
            WriteMask::Const(0b111),
        ),
        attrs(
            addr::SENVCFG,
            "senvcfg",
            Architecture::S,
            |h, _| h.csrs.senvcfg,
            Some(|h, _, v| {
                h.csrs.senvcfg = v;
                v
            }),
            WriteMask::Const(0xf1),
        ),
        {
            let mut a = attrs(
                addr::SSCRATCH,
                "sscratch",
                Architecture::S,
                |h, _| h.csrs.sscratch,
                Some(|h, _, v| {
                    h.csrs.sscratch = v;
                    v
                }),
                WriteMask::Const(u64::MAX),
            );
            a.flags = CsrFlags::VIRTUAL_ALIAS;
            a
        },
        {
            let mut a = attrs(
                addr::SEPC,
                "sepc",
                Architecture::S,
                |h, _| h.csrs.sepc,
                Some(|h, _, v| {
                    h.csrs.sepc = v;
                    v
                }),
                WriteMask::Dynamic(super::machine::epc_mask),
            );
            a.flags = CsrFlags::VIRTUAL_ALIAS;
            a
        },
        {
            let mut a = attrs(
                addr::SCAUSE,
                "scause",
                Architecture::S,
                |h, _| h.csrs.scause,
                Some(|h, _, v| {
                    h.csrs.scause = v;
                    v
                }),
                WriteMask::Const(u64::MAX),
            );
            a.flags = CsrFlags::VIRTUAL_ALIAS;
            a
        },
        {
            let mut a = attrs(
                addr::STVAL,
                "stval",
                Architecture::S,
                |h, _| h.csrs.stval,
                Some(|h, _, v| {
                    h.csrs.stval = v;
                    v
                }),
                WriteMask::Const(u64::MAX),
            );
            a.flags = CsrFlags::VIRTUAL_ALIAS;
            a
        },
        {
            let mut a = attrs(
                addr::SIP,
                "sip",
                Architecture::S,
                |h, _| h.csrs.mip & s_visible(h),
                Some(|h, _, v| {
                    // only the software interrupt is writable from S
                    let writable = s_visible(h) & InterruptBits::SSIP.bits();
                    h.csrs.mip = (h.csrs.mip & !writable) | (v & writable);
                    h.csrs.mip & s_visible(h)
                }),
                WriteMask::Dynamic(|h| s_visible(h) & InterruptBits::SSIP.bits()),
            );
            a.flags = CsrFlags::VIRTUAL_ALIAS | CsrFlags::TRAP_VTI | CsrFlags::NO_SAVE_RESTORE;
            a
        },
        {
            let mut a = attrs(
                addr::SATP,
                "satp",
                Architecture::S,
                |h, _| h.csrs.satp,
                Some(|h, _, v| {
                    // writes selecting an unsupported mode are ignored
                    if riscv::csr::SatpData::parse(v, h.cfg.xlen).is_some() {
                        h.csrs.satp = v;
                        h.tlbs.flush(crate::mem::tlb::Stage::Hs);
                    }
                    h.csrs.satp
                }),
                WriteMask::Const(u64::MAX),
            );
            a.flags = CsrFlags::VIRTUAL_ALIAS | CsrFlags::TRAP_TVM | CsrFlags::END_BLOCK;
            a
        },
    ]
}
