//! Virtual address translation
//!
//! The walker implements the Sv32/Sv39/Sv48/Sv57 schemes with optional
//! G-stage translation underneath: when the hart runs virtualised, every
//! guest physical address (including the page table entries of the guest's
//! own stage 1 walk) is translated again through `hgatp`.

use super::tlb::{PrivClass, Stage, TlbEntry};
use crate::trap::Trap;
use crate::Hart;
use riscv::csr::{MstatusFlags, SatpData, VmMode};
use riscv::mem::{AccessKind, EntryFlags, PageTableEntry, PagingGeometry, PAGE_OFFSET_BITS};
use riscv::mode::PrivilegeMode;

/// Translation context of one access
#[derive(Debug, Copy, Clone)]
pub(crate) struct TransCtx {
    /// Effective privilege of the access (after MPRV/HLV adjustments)
    pub mode: PrivilegeMode,
    /// Whether two-stage translation applies
    pub virt: bool,
}

impl TransCtx {
    fn class(&self) -> PrivClass {
        if self.mode.level() == 0 {
            PrivClass::User
        } else {
            PrivClass::Supervisor
        }
    }
}

/// Translate a virtual address to a physical address, raising the
/// appropriate page fault, guest page fault or access fault
pub(crate) fn translate(
    hart: &mut Hart,
    vaddr: u64,
    kind: AccessKind,
    ctx: TransCtx,
) -> Result<u64, Trap> {
    if ctx.mode == PrivilegeMode::Machine && !ctx.virt {
        return Ok(vaddr);
    }

    let satp_raw = if ctx.virt { hart.csrs.vsatp } else { hart.csrs.satp };
    let satp = SatpData::parse(satp_raw, hart.cfg.xlen)
        .expect("unsupported satp modes are rejected at write time");

    let stage1 = if satp.mode == VmMode::Bare || ctx.mode == PrivilegeMode::Machine {
        vaddr
    } else {
        walk_stage1(hart, vaddr, kind, ctx, satp)?
    };

    if ctx.virt {
        g_translate(hart, stage1, kind, vaddr)
    } else {
        Ok(stage1)
    }
}

/// Stage 1 walk through `satp`/`vsatp`
fn walk_stage1(
    hart: &mut Hart,
    vaddr: u64,
    kind: AccessKind,
    ctx: TransCtx,
    satp: SatpData,
) -> Result<u64, Trap> {
    let geom = PagingGeometry::of(satp.mode).expect("bare handled by the caller");
    let fault = || Trap::exception(kind.page_fault(), vaddr);
    if !geom.va_in_range(vaddr, false) {
        return Err(fault());
    }

    let stage = if ctx.virt { Stage::Vs1 } else { Stage::Hs };
    let vpn = vaddr >> PAGE_OFFSET_BITS;
    if let Some(entry) = hart.tlbs.get(stage).lookup(vpn, satp.asid, ctx.class()) {
        let entry = *entry;
        if stage1_permits(hart, entry.flags, kind, ctx) && (kind != AccessKind::Write || entry.dirty)
        {
            return Ok((entry.ppn << PAGE_OFFSET_BITS) | (vaddr & 0xfff));
        }
        // a permission failure or a clean write falls back to the walk
    }

    let mut table = satp.ppn << PAGE_OFFSET_BITS;
    for level in (0..geom.levels).rev() {
        let index = geom.vpn_segment(vaddr, level, false);
        let pte_gpa = table + index * geom.pte_bytes;
        // under virtualisation the guest's page tables live in guest
        // physical memory
        let pte_pa = if ctx.virt {
            g_translate(hart, pte_gpa, AccessKind::Read, vaddr)?
        } else {
            pte_gpa
        };
        let pte = load_pte(hart, pte_pa, geom, kind, vaddr)?;
        if !pte.is_valid() || pte.is_malformed() {
            return Err(fault());
        }
        if !pte.is_leaf() {
            if level == 0 {
                return Err(fault());
            }
            // A/D/U on a non-leaf entry are reserved
            if pte
                .flags()
                .intersects(EntryFlags::Accessed | EntryFlags::Dirty | EntryFlags::User)
            {
                return Err(fault());
            }
            table = pte.addr();
            continue;
        }

        // misaligned superpage
        if level > 0 && pte.ppn() & ((1 << (level * geom.vpn_bits)) - 1) != 0 {
            return Err(fault());
        }
        if !stage1_permits(hart, pte.flags(), kind, ctx) {
            return Err(fault());
        }
        let pte = update_a_d(hart, pte, pte_pa, kind, || fault())?;

        let offset_mask = (1u64 << geom.superpage_bits(level)) - 1;
        let paddr = (pte.addr() & !offset_mask) | (vaddr & offset_mask);
        hart.tlbs.get_mut(stage).install(
            vpn,
            satp.asid,
            ctx.class(),
            TlbEntry {
                ppn: paddr >> PAGE_OFFSET_BITS,
                flags: pte.flags(),
                global: pte.flags().contains(EntryFlags::Global),
                dirty: pte.flags().contains(EntryFlags::Dirty),
            },
        );
        log::trace!(
            "tlb fill {:?}: {:#x} -> {:#x} (level {})",
            stage,
            vaddr,
            paddr,
            level
        );
        return Ok(paddr);
    }
    unreachable!("walk terminates at level 0")
}

/// G-stage walk through `hgatp`; faults report the guest physical address
pub(crate) fn g_translate(
    hart: &mut Hart,
    gpa: u64,
    kind: AccessKind,
    gva: u64,
) -> Result<u64, Trap> {
    let hgatp = SatpData::parse(hart.csrs.hgatp, hart.cfg.xlen)
        .expect("unsupported hgatp modes are rejected at write time");
    if hgatp.mode == VmMode::Bare {
        return Ok(gpa);
    }
    let geom = PagingGeometry::of(hgatp.mode).unwrap();
    let fault = || Trap::guest_page_fault(kind.guest_page_fault(), gva, gpa);
    if !geom.va_in_range(gpa, true) {
        return Err(fault());
    }

    let vpn = gpa >> PAGE_OFFSET_BITS;
    if let Some(entry) = hart.tlbs.get(Stage::Vs2).lookup(vpn, hgatp.asid, PrivClass::User) {
        let entry = *entry;
        if g_permits(entry.flags, kind) && (kind != AccessKind::Write || entry.dirty) {
            return Ok((entry.ppn << PAGE_OFFSET_BITS) | (gpa & 0xfff));
        }
    }

    let mut table = hgatp.ppn << PAGE_OFFSET_BITS;
    for level in (0..geom.levels).rev() {
        let index = geom.vpn_segment(gpa, level, level == geom.levels - 1);
        let pte_pa = table + index * geom.pte_bytes;
        let pte = load_pte(hart, pte_pa, geom, kind, gva)?;
        if !pte.is_valid() || pte.is_malformed() {
            return Err(fault());
        }
        if !pte.is_leaf() {
            if level == 0
                || pte
                    .flags()
                    .intersects(EntryFlags::Accessed | EntryFlags::Dirty | EntryFlags::User)
            {
                return Err(fault());
            }
            table = pte.addr();
            continue;
        }
        if level > 0 && pte.ppn() & ((1 << (level * geom.vpn_bits)) - 1) != 0 {
            return Err(fault());
        }
        if !g_permits(pte.flags(), kind) {
            return Err(fault());
        }
        let pte = update_a_d(hart, pte, pte_pa, kind, || fault())?;

        let offset_mask = (1u64 << geom.superpage_bits(level)) - 1;
        let paddr = (pte.addr() & !offset_mask) | (gpa & offset_mask);
        hart.tlbs.get_mut(Stage::Vs2).install(
            vpn,
            hgatp.asid,
            PrivClass::User,
            TlbEntry {
                ppn: paddr >> PAGE_OFFSET_BITS,
                flags: pte.flags(),
                global: pte.flags().contains(EntryFlags::Global),
                dirty: pte.flags().contains(EntryFlags::Dirty),
            },
        );
        return Ok(paddr);
    }
    unreachable!("walk terminates at level 0")
}

/// Load one page table entry, checking the implicit access against PMP
fn load_pte(
    hart: &mut Hart,
    pte_pa: u64,
    geom: PagingGeometry,
    kind: AccessKind,
    vaddr: u64,
) -> Result<PageTableEntry, Trap> {
    if !hart.pmp_permits(pte_pa, geom.pte_bytes, AccessKind::Read, PrivilegeMode::Supervisor) {
        return Err(Trap::exception(kind.access_fault(), vaddr));
    }
    let raw = hart
        .read_phys(pte_pa, geom.pte_bytes as usize)
        .map_err(|_| Trap::exception(kind.access_fault(), vaddr))?;
    let pte = PageTableEntry::new(raw, geom.pte_bytes);
    if let Some(verdict) = hart.hooks.validate_pte(pte_pa, raw) {
        if !verdict {
            return Err(Trap::exception(kind.page_fault(), vaddr));
        }
    }
    Ok(pte)
}

/// Set the accessed (and on writes the dirty) bit, or fault when hardware
/// updating is disabled
fn update_a_d(
    hart: &mut Hart,
    pte: PageTableEntry,
    pte_pa: u64,
    kind: AccessKind,
    fault: impl Fn() -> Trap,
) -> Result<PageTableEntry, Trap> {
    let mut needed = EntryFlags::Accessed;
    if kind == AccessKind::Write {
        needed |= EntryFlags::Dirty;
    }
    if pte.flags().contains(needed) {
        return Ok(pte);
    }
    if !hart.cfg.update_pte_a_d {
        return Err(fault());
    }
    let updated = pte.with_flags(needed);
    hart.write_phys_raw(pte_pa, updated.raw(), updated.bytes() as usize)
        .map_err(|_| fault())?;
    Ok(updated)
}

/// Stage 1 permission check including U/SUM/MXR semantics
fn stage1_permits(hart: &Hart, flags: EntryFlags, kind: AccessKind, ctx: TransCtx) -> bool {
    let mstatus = hart.csrs.mstatus();
    let (sum, mxr) = if ctx.virt {
        let vsstatus = riscv::csr::Mstatus(hart.csrs.vsstatus);
        (
            vsstatus.contains(MstatusFlags::SUM),
            vsstatus.contains(MstatusFlags::MXR) || mstatus.contains(MstatusFlags::MXR),
        )
    } else {
        (
            mstatus.contains(MstatusFlags::SUM),
            mstatus.contains(MstatusFlags::MXR),
        )
    };

    let user_page = flags.contains(EntryFlags::User);
    if ctx.mode.level() >= 1 {
        if user_page {
            // supervisor access to user pages needs SUM, and never executes
            if kind == AccessKind::Execute || !sum {
                return false;
            }
        }
    } else if !user_page {
        return false;
    }

    match kind {
        AccessKind::Read => {
            flags.contains(EntryFlags::Read) || (mxr && flags.contains(EntryFlags::Execute))
        }
        AccessKind::Write => flags.contains(EntryFlags::Write),
        AccessKind::Execute => flags.contains(EntryFlags::Execute),
    }
}

/// G-stage leaves must always be user pages
fn g_permits(flags: EntryFlags, kind: AccessKind) -> bool {
    if !flags.contains(EntryFlags::User) {
        return false;
    }
    match kind {
        AccessKind::Read => flags.contains(EntryFlags::Read),
        AccessKind::Write => flags.contains(EntryFlags::Write),
        AccessKind::Execute => flags.contains(EntryFlags::Execute),
    }
}
