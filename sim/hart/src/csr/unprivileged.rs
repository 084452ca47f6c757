//! Unprivileged CSR definitions: floating point state, vector state and
//! the user counters

use super::{attrs, CsrAttrs, CsrFlags, WriteMask};
use crate::Hart;
use riscv::csr::addr;
use riscv::isa::{Architecture, Xlen};

fn fp_present(hart: &Hart) -> bool {
    hart.cfg.flen > 0
}

/// Writes to `vstart` may leave it nonzero, which invalidates the block's
/// known-zero assumption
fn wstate_vstart(hart: &mut Hart) {
    hart.block.vstart_zero = hart.csrs.vstart == 0;
}

fn wstate_fp(hart: &mut Hart) {
    // the dynamic rounding mode may have changed
    hart.block.rm_checked = false;
}

pub(super) fn defs() -> Vec<CsrAttrs> {
    let mut defs = vec![
        {
            let mut a = attrs(
                addr::FFLAGS,
                "fflags",
                Architecture::F,
                |h, _| h.csrs.fcsr & 0x1f,
                Some(|h, _, v| {
                    h.csrs.fcsr = (h.csrs.fcsr & !0x1f) | (v & 0x1f);
                    v & 0x1f
                }),
                WriteMask::Const(0x1f),
            );
            a.present = Some(fp_present);
            a.flags = CsrFlags::FP_STATE | CsrFlags::NO_SAVE_RESTORE;
            a
        },
        {
            let mut a = attrs(
                addr::FRM,
                "frm",
                Architecture::F,
                |h, _| h.csrs.frm(),
                Some(|h, _, v| {
                    h.csrs.fcsr = (h.csrs.fcsr & !0xe0) | ((v & 0b111) << 5);
                    v & 0b111
                }),
                WriteMask::Const(0b111),
            );
            a.present = Some(fp_present);
            a.flags = CsrFlags::FP_STATE | CsrFlags::END_RM | CsrFlags::NO_SAVE_RESTORE;
            a.wstate = Some(wstate_fp);
            a
        },
        {
            let mut a = attrs(
                addr::FCSR,
                "fcsr",
                Architecture::F,
                |h, _| h.csrs.fcsr & 0xff,
                Some(|h, _, v| {
                    h.csrs.fcsr = v & 0xff;
                    h.csrs.fcsr
                }),
                WriteMask::Const(0xff),
            );
            a.present = Some(fp_present);
            a.flags = CsrFlags::FP_STATE | CsrFlags::END_RM;
            a.wstate = Some(wstate_fp);
            a
        },
        {
            let mut a = attrs(
                addr::VSTART,
                "vstart",
                Architecture::V,
                |h, _| h.csrs.vstart,
                Some(|h, _, v| {
                    // writable bits are limited by VLEN
                    let mask = (h.cfg.vlen as u64 * 8) - 1;
                    h.csrs.vstart = v & mask;
                    h.csrs.vstart
                }),
                WriteMask::Const(u64::MAX),
            );
            a.flags = CsrFlags::VEC_STATE;
            a.wstate = Some(wstate_vstart);
            a
        },
        {
            let mut a = attrs(
                addr::VXSAT,
                "vxsat",
                Architecture::V,
                |h, _| h.csrs.vxsat,
                Some(|h, _, v| {
                    h.csrs.vxsat = v & 1;
                    h.csrs.vxsat
                }),
                WriteMask::Const(1),
            );
            a.flags = CsrFlags::VEC_STATE;
            a
        },
        {
            let mut a = attrs(
                addr::VXRM,
                "vxrm",
                Architecture::V,
                |h, _| h.csrs.vxrm,
                Some(|h, _, v| {
                    h.csrs.vxrm = v & 0b11;
                    h.csrs.vxrm
                }),
                WriteMask::Const(0b11),
            );
            a.flags = CsrFlags::VEC_STATE;
            a
        },
        {
            let mut a = attrs(
                addr::VCSR,
                "vcsr",
                Architecture::V,
                |h, _| (h.csrs.vxrm << 1) | h.csrs.vxsat,
                Some(|h, _, v| {
                    h.csrs.vxsat = v & 1;
                    h.csrs.vxrm = (v >> 1) & 0b11;
                    (h.csrs.vxrm << 1) | h.csrs.vxsat
                }),
                WriteMask::Const(0b111),
            );
            a.flags = CsrFlags::VEC_STATE | CsrFlags::FP_STATE | CsrFlags::NO_SAVE_RESTORE;
            a
        },
        {
            let mut a = attrs(
                addr::VL,
                "vl",
                Architecture::V,
                |h, _| h.csrs.vl,
                None,
                WriteMask::Const(0),
            );
            a.flags = CsrFlags::VEC_STATE;
            a
        },
        {
            let mut a = attrs(
                addr::VTYPE,
                "vtype",
                Architecture::V,
                |h, _| h.csrs.vtype,
                None,
                WriteMask::Const(0),
            );
            a.flags = CsrFlags::VEC_STATE;
            a
        },
        attrs(
            addr::VLENB,
            "vlenb",
            Architecture::V,
            |h, _| h.cfg.vlenb(),
            None,
            WriteMask::Const(0),
        ),
    ];

    // the unprivileged counter views
    for (number, name) in [
        (addr::CYCLE, "cycle"),
        (addr::TIME, "time"),
        (addr::INSTRET, "instret"),
    ] {
        let read: fn(&Hart, &CsrAttrs) -> u64 = match number {
            addr::CYCLE => |h, _| h.csrs.mcycle,
            addr::TIME => |h, _| h.hooks.read_time().unwrap_or(h.csrs.mcycle),
            _ => |h, _| h.csrs.minstret,
        };
        let mut a = attrs(number, name, Architecture::I, read, None, WriteMask::Const(0));
        a.flags = CsrFlags::COUNTER;
        defs.push(a);
    }
    for (number, name) in [
        (addr::CYCLEH, "cycleh"),
        (addr::TIMEH, "timeh"),
        (addr::INSTRETH, "instreth"),
    ] {
        let read: fn(&Hart, &CsrAttrs) -> u64 = match number {
            addr::CYCLEH => |h, _| h.csrs.mcycle >> 32,
            addr::TIMEH => |h, _| h.hooks.read_time().unwrap_or(h.csrs.mcycle) >> 32,
            _ => |h, _| h.csrs.minstret >> 32,
        };
        let mut a = attrs(number, name, Architecture::I, read, None, WriteMask::Const(0));
        a.present = Some(|h: &Hart| h.cfg.xlen == Xlen::Rv32);
        a.flags = CsrFlags::COUNTER;
        defs.push(a);
    }
    defs
}
