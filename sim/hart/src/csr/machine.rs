//! Machine-level CSR definitions

use super::{attrs, CsrAttrs, CsrFlags, WriteMask};
use crate::Hart;
use riscv::csr::{addr, ExtState, InterruptBits, Mstatus, MstatusFlags, XtvecData};
use riscv::isa::{Architecture, Xlen};

/// Exception codes that may be delegated through `medeleg`: the base
/// exceptions 0-10, 12, 13, 15 and the hypervisor causes 20-23; the
/// environment call from M (11) is never delegatable
const MEDELEG_MASK: u64 = 0x00f0_b7ff;

fn mstatus_mask(hart: &Hart) -> u64 {
    let mut mask = (MstatusFlags::SIE
        | MstatusFlags::MIE
        | MstatusFlags::SPIE
        | MstatusFlags::MPIE
        | MstatusFlags::SPP
        | MstatusFlags::MPRV
        | MstatusFlags::SUM
        | MstatusFlags::MXR
        | MstatusFlags::TVM
        | MstatusFlags::TW
        | MstatusFlags::TSR)
        .bits()
        | (0b11 << Mstatus::MPP_SHIFT);
    if hart.cfg.flen > 0 {
        mask |= 0b11 << Mstatus::FS_SHIFT;
    }
    if hart.cfg.arch.contains(Architecture::V) {
        mask |= 0b11 << Mstatus::VS_SHIFT;
    }
    if hart.cfg.xlen == Xlen::Rv64 {
        mask |= (MstatusFlags::UBE | MstatusFlags::SBE | MstatusFlags::MBE).bits();
    }
    if hart.cfg.arch.contains(Architecture::H) {
        mask |= (MstatusFlags::MPV | MstatusFlags::GVA).bits();
    }
    mask
}

fn write_mstatus(hart: &mut Hart, _: &CsrAttrs, value: u64) -> u64 {
    let mut mstatus = Mstatus(value);
    // MPP can only name an implemented mode
    let mpp = mstatus.mpp();
    if mpp == 2 || (mpp == 0 && !hart.cfg.arch.contains(Architecture::U)) {
        mstatus.set_mpp(hart.csrs.mstatus().mpp());
    }
    mstatus.update_sd();
    hart.csrs.mstatus = mstatus.0;
    // a write lowering FS/VS invalidates the block's known-dirty state
    if mstatus.fs() != ExtState::Dirty {
        hart.block.fs_dirty = false;
    }
    if mstatus.vs() != ExtState::Dirty {
        hart.block.vs_dirty = false;
    }
    hart.csrs.mstatus
}

fn write_misa(hart: &mut Hart, _: &CsrAttrs, value: u64) -> u64 {
    let writable = hart.cfg.writable_misa.misa_letters();
    let fixed = hart.cfg.arch.misa_letters() & !writable;
    hart.csrs.misa_ext = fixed | (value & writable);
    // runtime-disabled letters leave the enabled feature set
    let letters = Architecture::from_bits_truncate(hart.csrs.misa_ext);
    hart.enabled = (hart.cfg.arch & !Architecture::MISA_MASK) | letters;
    hart.csrs.misa_ext
}

fn read_misa(hart: &Hart, _: &CsrAttrs) -> u64 {
    let xl = hart.cfg.xlen.encoding();
    (xl << (hart.cfg.xbits() - 2)) | hart.csrs.misa_ext
}

fn mip_mask(hart: &Hart) -> u64 {
    let mut mask = (InterruptBits::SSIP | InterruptBits::STIP | InterruptBits::SEIP).bits();
    if hart.cfg.arch.contains(Architecture::H) {
        mask |= InterruptBits::VS_MASK.bits() | InterruptBits::SGEIP.bits();
    }
    mask
}

fn mie_mask(hart: &Hart) -> u64 {
    let mut mask = InterruptBits::M_MASK.bits() | InterruptBits::S_MASK.bits();
    if hart.cfg.arch.contains(Architecture::H) {
        mask |= InterruptBits::H_MASK.bits();
    }
    mask
}

pub(super) fn epc_mask(hart: &Hart) -> u64 {
    // bit 1 is writable only when compressed instructions can be enabled
    if hart.cfg.arch.contains(Architecture::C) {
        !1
    } else {
        !0b11
    }
}

/// pmpcfg registers pack 8 entry bytes on RV64 (even numbers only) and 4 on RV32
fn pmpcfg_entries(xlen: Xlen) -> u16 {
    match xlen {
        Xlen::Rv32 => 4,
        Xlen::Rv64 => 8,
    }
}

fn read_pmpcfg(hart: &Hart, attrs: &CsrAttrs) -> u64 {
    let per_reg = pmpcfg_entries(hart.cfg.xlen);
    let base = (attrs.number - addr::PMPCFG0) * 4;
    let mut value = 0u64;
    for i in 0..per_reg {
        value |= (hart.csrs.pmpcfg[(base + i) as usize] as u64) << (8 * i);
    }
    value
}

fn write_pmpcfg(hart: &mut Hart, attrs: &CsrAttrs, value: u64) -> u64 {
    let per_reg = pmpcfg_entries(hart.cfg.xlen);
    let base = (attrs.number - addr::PMPCFG0) * 4;
    for i in 0..per_reg {
        let index = (base + i) as usize;
        if index >= hart.cfg.pmp_entries as usize {
            break;
        }
        let old = hart.csrs.pmpcfg[index];
        if old & crate::mem::pmp::PMP_LOCK != 0 {
            // locked until reset
            continue;
        }
        let mut byte = (value >> (8 * i)) as u8 & 0x9f;
        // W without R is reserved
        if byte & 0b11 == 0b10 {
            byte &= !0b10;
        }
        hart.csrs.pmpcfg[index] = byte;
    }
    hart.tlbs.flush_all();
    read_pmpcfg(hart, attrs)
}

fn read_pmpaddr(hart: &Hart, attrs: &CsrAttrs) -> u64 {
    hart.csrs.pmpaddr[(attrs.number - addr::PMPADDR0) as usize]
}

fn write_pmpaddr(hart: &mut Hart, attrs: &CsrAttrs, value: u64) -> u64 {
    let index = (attrs.number - addr::PMPADDR0) as usize;
    if index < hart.cfg.pmp_entries as usize && !hart.pmp_addr_locked(index) {
        hart.csrs.pmpaddr[index] = value & ((1 << 54) - 1);
        hart.tlbs.flush_all();
    }
    hart.csrs.pmpaddr[index]
}

pub(super) fn defs() -> Vec<CsrAttrs> {
    let mut defs = vec![
        attrs(
            addr::MVENDORID,
            "mvendorid",
            Architecture::I,
            |_, _| 0,
            None,
            WriteMask::Const(0),
        ),
        attrs(addr::MARCHID, "marchid", Architecture::I, |_, _| 0, None, WriteMask::Const(0)),
        attrs(addr::MIMPID, "mimpid", Architecture::I, |_, _| 0, None, WriteMask::Const(0)),
        attrs(
            addr::MHARTID,
            "mhartid",
            Architecture::I,
            |h, _| h.cfg.hart_id,
            None,
            WriteMask::Const(0),
        ),
        attrs(addr::MCONFIGPTR, "mconfigptr", Architecture::I, |_, _| 0, None, WriteMask::Const(0)),
        {
            let mut a = attrs(
                addr::MSTATUS,
                "mstatus",
                Architecture::I,
                |h, _| h.csrs.mstatus,
                Some(write_mstatus),
                WriteMask::Dynamic(mstatus_mask),
            );
            a.flags = CsrFlags::END_BLOCK;
            a
        },
        {
            let mut a = attrs(
                addr::MISA,
                "misa",
                Architecture::I,
                read_misa,
                Some(write_misa),
                WriteMask::Dynamic(|h| h.cfg.writable_misa.misa_letters()),
            );
            a.flags = CsrFlags::END_BLOCK;
            a
        },
        attrs(
            addr::MEDELEG,
            "medeleg",
            Architecture::S,
            |h, _| h.csrs.medeleg,
            Some(|h, _, v| {
                h.csrs.medeleg = v;
                v
            }),
            WriteMask::Const(MEDELEG_MASK),
        ),
        attrs(
            addr::MIDELEG,
            "mideleg",
            Architecture::S,
            |h, _| {
                // the VS interrupts are always delegated past M when H is present
                let fixed = if h.cfg.arch.contains(Architecture::H) {
                    InterruptBits::VS_MASK.bits() | InterruptBits::SGEIP.bits()
                } else {
                    0
                };
                h.csrs.mideleg | fixed
            },
            Some(|h, _, v| {
                h.csrs.mideleg = v & InterruptBits::S_MASK.bits();
                h.csrs.mideleg
            }),
            WriteMask::Const(InterruptBits::S_MASK.bits()),
        ),
        attrs(
            addr::MIE,
            "mie",
            Architecture::I,
            |h, _| h.csrs.mie,
            Some(|h, _, v| {
                h.csrs.mie = v;
                v
            }),
            WriteMask::Dynamic(mie_mask),
        ),
        attrs(
            addr::MIP,
            "mip",
            Architecture::I,
            |h, _| h.csrs.mip,
            Some(|h, _, v| {
                h.csrs.mip = v;
                v
            }),
            WriteMask::Dynamic(mip_mask),
        ),
        attrs(
            addr::MTVEC,
            "mtvec",
            Architecture::I,
            |h, _| h.csrs.mtvec,
            Some(|h, _, v| {
                h.csrs.mtvec = v;
                v
            }),
            WriteMask::Const(XtvecData::WRITE_MASK),
        ),
        attrs(
            addr::MCOUNTEREN,
            "mcounteren",
            Architecture::U,
            |h, _| h.csrs.mcounteren as u64,
            Some(|h, _, v| {
                h.csrs.mcounteren = v as u32;
                v
            }),
            WriteMask::Const(0b111),
        ),
        attrs(
            addr::MCOUNTINHIBIT,
            "mcountinhibit",
            Architecture::I,
            |h, _| h.csrs.mcountinhibit as u64,
            Some(|h, _, v| {
                h.csrs.mcountinhibit = v as u32;
                v
            }),
            WriteMask::Const(0b101),
        ),
        attrs(
            addr::MSCRATCH,
            "mscratch",
            Architecture::I,
            |h, _| h.csrs.mscratch,
            Some(|h, _, v| {
                h.csrs.mscratch = v;
                v
            }),
            WriteMask::Const(u64::MAX),
        ),
        attrs(
            addr::MEPC,
            "mepc",
            Architecture::I,
            |h, _| h.csrs.mepc,
            Some(|h, _, v| {
                h.csrs.mepc = v;
                v
            }),
            WriteMask::Dynamic(epc_mask),
        ),
        attrs(
            addr::MCAUSE,
            "mcause",
            Architecture::I,
            |h, _| h.csrs.mcause,
            Some(|h, _, v| {
                h.csrs.mcause = v;
                v
            }),
            WriteMask::Const(u64::MAX),
        ),
        attrs(
            addr::MTVAL,
            "mtval",
            Architecture::I,
            |h, _| h.csrs.mtval,
            Some(|h, _, v| {
                h.csrs.mtval = v;
                v
            }),
            WriteMask::Const(u64::MAX),
        ),
        attrs(
            addr::MTVAL2,
            "mtval2",
            Architecture::H,
            |h, _| h.csrs.mtval2,
            Some(|h, _, v| {
                h.csrs.mtval2 = v;
                v
            }),
            WriteMask::Const(u64::MAX),
        ),
        attrs(
            addr::MTINST,
            "mtinst",
            Architecture::H,
            |h, _| h.csrs.mtinst,
            Some(|h, _, v| {
                h.csrs.mtinst = v;
                v
            }),
            WriteMask::Const(u64::MAX),
        ),
        attrs(
            addr::MENVCFG,
            "menvcfg",
            Architecture::U,
            |h, _| h.csrs.menvcfg,
            Some(|h, _, v| {
                h.csrs.menvcfg = v;
                v
            }),
            WriteMask::Const(0xf1),
        ),
        attrs(
            addr::MCYCLE,
            "mcycle",
            Architecture::I,
            |h, _| h.csrs.mcycle,
            Some(|h, _, v| {
                h.csrs.mcycle = v;
                v
            }),
            WriteMask::Const(u64::MAX),
        ),
        attrs(
            addr::MINSTRET,
            "minstret",
            Architecture::I,
            |h, _| h.csrs.minstret,
            Some(|h, _, v| {
                h.csrs.minstret = v;
                v
            }),
            WriteMask::Const(u64::MAX),
        ),
    ];

    // the PMP register files; odd pmpcfg numbers exist only on RV32
    for n in 0..16u16 {
        let number = addr::PMPCFG0 + n;
        let mut a = attrs(
            number,
            "pmpcfg",
            Architecture::I,
            read_pmpcfg,
            Some(write_pmpcfg),
            WriteMask::Const(u64::MAX),
        );
        if n % 2 == 1 {
            a.present = Some(|h: &Hart| h.cfg.xlen == Xlen::Rv32);
        }
        a.flags = CsrFlags::END_BLOCK;
        defs.push(a);
    }
    for n in 0..64u16 {
        let mut a = attrs(
            addr::PMPADDR0 + n,
            "pmpaddr",
            Architecture::I,
            read_pmpaddr,
            Some(write_pmpaddr),
            WriteMask::Const(u64::MAX),
        );
        a.present = Some(|h: &Hart| h.cfg.pmp_entries > 0);
        a.flags = CsrFlags::END_BLOCK;
        defs.push(a);
    }
    defs
}
