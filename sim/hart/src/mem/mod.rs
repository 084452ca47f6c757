//! The memory subsystem
//!
//! Accesses flow through translation (`translate`), protection (`pmp`) and
//! attribute (`pma`) checks before they reach the shared [`MemDomain`].
//! The domain is the boundary to the host simulator: it guarantees
//! per-access atomicity for aligned native-width operations, and it is
//! shared between harts together with the [`ReservationBoard`] that
//! implements LR/SC interaction.

pub mod pma;
pub mod pmp;
pub mod tlb;
pub(crate) mod translate;

use crate::state::AtomicCode;
use crate::trap::Trap;
use crate::Hart;
use pma::Pma;
use riscv::csr::{EnvCfgFlags, HstatusFlags, MstatusFlags};
use riscv::mem::{AccessKind, PAGESIZE};
use riscv::mode::PrivilegeMode;
use riscv::trap::Exception;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
pub(crate) use translate::TransCtx;

/// Failure of a physical access at the domain boundary
#[derive(Debug, Error, Eq, PartialEq)]
pub enum MemError {
    #[error("no memory mapped at {addr:#x}")]
    Unmapped { addr: u64 },
}

/// A physical memory domain shared between harts.
///
/// Implementations must make [`rmw`](MemDomain::rmw) atomic with respect
/// to every other access of the same domain.
pub trait MemDomain: Send + Sync {
    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<(), MemError>;
    fn write(&self, addr: u64, buf: &[u8]) -> Result<(), MemError>;

    /// Atomic read-modify-write of an aligned cell of up to 8 bytes,
    /// little-endian; returns the previous value
    fn rmw(&self, addr: u64, len: usize, f: &mut dyn FnMut(u64) -> u64) -> Result<u64, MemError>;
}

/// Page-granular sparse memory backing the tests and simple machines
pub struct SparseMem {
    pages: Mutex<HashMap<u64, Box<[u8; PAGESIZE as usize]>>>,
    size: u64,
}

impl SparseMem {
    pub fn new(size: u64) -> Self {
        SparseMem {
            pages: Mutex::new(HashMap::new()),
            size,
        }
    }

    pub fn shared(size: u64) -> Arc<Self> {
        Arc::new(Self::new(size))
    }

    fn with_page<R>(&self, addr: u64, f: impl FnOnce(&mut [u8; PAGESIZE as usize]) -> R) -> Result<R, MemError> {
        if addr >= self.size {
            return Err(MemError::Unmapped { addr });
        }
        let mut pages = self.pages.lock().unwrap();
        let page = pages
            .entry(addr / PAGESIZE)
            .or_insert_with(|| Box::new([0u8; PAGESIZE as usize]));
        Ok(f(page))
    }
}

impl MemDomain for SparseMem {
    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<(), MemError> {
        let mut done = 0usize;
        while done < buf.len() {
            let cur = addr + done as u64;
            let offset = (cur % PAGESIZE) as usize;
            let chunk = ((PAGESIZE as usize) - offset).min(buf.len() - done);
            self.with_page(cur, |page| {
                buf[done..done + chunk].copy_from_slice(&page[offset..offset + chunk]);
            })?;
            done += chunk;
        }
        Ok(())
    }

    fn write(&self, addr: u64, buf: &[u8]) -> Result<(), MemError> {
        let mut done = 0usize;
        while done < buf.len() {
            let cur = addr + done as u64;
            let offset = (cur % PAGESIZE) as usize;
            let chunk = ((PAGESIZE as usize) - offset).min(buf.len() - done);
            self.with_page(cur, |page| {
                page[offset..offset + chunk].copy_from_slice(&buf[done..done + chunk]);
            })?;
            done += chunk;
        }
        Ok(())
    }

    fn rmw(&self, addr: u64, len: usize, f: &mut dyn FnMut(u64) -> u64) -> Result<u64, MemError> {
        debug_assert!(len <= 8 && addr % len as u64 == 0);
        let offset = (addr % PAGESIZE) as usize;
        self.with_page(addr, |page| {
            let mut bytes = [0u8; 8];
            bytes[..len].copy_from_slice(&page[offset..offset + len]);
            let old = u64::from_le_bytes(bytes);
            let new = f(old);
            page[offset..offset + len].copy_from_slice(&new.to_le_bytes()[..len]);
            old
        })
    }
}

/// Cross-hart registry of active LR reservations.
///
/// A store anywhere in the domain clears every reservation whose line it
/// overlaps, which is how a remote hart's SC comes to fail.
#[derive(Default)]
pub struct ReservationBoard {
    tags: Mutex<HashMap<u64, u64>>,
}

impl ReservationBoard {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, hart: u64, tag: u64) {
        self.tags.lock().unwrap().insert(hart, tag);
    }

    pub fn clear(&self, hart: u64) {
        self.tags.lock().unwrap().remove(&hart);
    }

    pub fn holds(&self, hart: u64, tag: u64) -> bool {
        self.tags.lock().unwrap().get(&hart) == Some(&tag)
    }

    /// Notify the board of a store; overlapping reservations die
    pub fn observe_store(&self, addr: u64, len: u64, line: u64) {
        let first = addr & !(line - 1);
        let last = (addr + len.max(1) - 1) & !(line - 1);
        self.tags
            .lock()
            .unwrap()
            .retain(|_, tag| *tag < first || *tag > last);
    }
}

impl Hart {
    /// Raw physical read used by the walker and checkpoints; little-endian
    pub(crate) fn read_phys(&self, addr: u64, len: usize) -> Result<u64, MemError> {
        let mut buf = [0u8; 8];
        self.domain.read(addr, &mut buf[..len])?;
        Ok(u64::from_le_bytes(buf))
    }

    pub(crate) fn write_phys_raw(&self, addr: u64, value: u64, len: usize) -> Result<(), MemError> {
        self.domain.write(addr, &value.to_le_bytes()[..len])
    }

    /// Effective privilege context for data accesses, honoring `mstatus.MPRV`
    pub(crate) fn data_ctx(&self) -> TransCtx {
        let mstatus = self.csrs.mstatus();
        let mut mode = self.state.mode;
        if mode == PrivilegeMode::Machine && mstatus.contains(MstatusFlags::MPRV) {
            let mpp = mstatus.mpp();
            let virt = mstatus.contains(MstatusFlags::MPV) && mpp != 3;
            mode = PrivilegeMode::from_encoding(mpp, virt);
        }
        TransCtx {
            mode,
            virt: mode.is_virtual(),
        }
    }

    /// Instruction fetches ignore MPRV
    pub(crate) fn exec_ctx(&self) -> TransCtx {
        TransCtx {
            mode: self.state.mode,
            virt: self.state.mode.is_virtual(),
        }
    }

    /// Whether data accesses in the given context are big-endian
    fn big_endian(&self, ctx: TransCtx) -> bool {
        let mstatus = self.csrs.mstatus();
        match (ctx.mode.base(), ctx.virt) {
            (PrivilegeMode::Machine, _) => mstatus.contains(MstatusFlags::MBE),
            (PrivilegeMode::Supervisor, false) => mstatus.contains(MstatusFlags::SBE),
            (PrivilegeMode::User, false) => mstatus.contains(MstatusFlags::UBE),
            (PrivilegeMode::Supervisor, true) => {
                HstatusFlags::from_bits_truncate(self.csrs.hstatus).contains(HstatusFlags::VSBE)
            }
            (PrivilegeMode::User, true) => {
                riscv::csr::Mstatus(self.csrs.vsstatus).contains(MstatusFlags::UBE)
            }
            _ => false,
        }
    }

    /// PMP and PMA checks on a translated physical range
    fn check_phys(
        &self,
        paddr: u64,
        len: u64,
        kind: AccessKind,
        ctx: TransCtx,
        vaddr: u64,
        required: Pma,
    ) -> Result<(), Trap> {
        if !self.pmp_permits(paddr, len, kind, ctx.mode) {
            return Err(Trap::exception(kind.access_fault(), vaddr));
        }
        let pma = self.hooks.pma(paddr, len).unwrap_or_else(Pma::ram);
        if !pma.contains(Pma::MAPPED) || !pma.contains(required) {
            return Err(Trap::exception(kind.access_fault(), vaddr));
        }
        Ok(())
    }

    fn check_alignment(&self, vaddr: u64, len: u64, kind: AccessKind) -> Result<(), Trap> {
        if vaddr % len != 0 && self.cfg.misaligned == crate::config::MisalignedPolicy::Trap {
            return Err(Trap::exception(kind.misaligned_fault(), vaddr));
        }
        Ok(())
    }

    fn load_with_ctx(
        &mut self,
        vaddr: u64,
        len: u32,
        ctx: TransCtx,
        kind: AccessKind,
    ) -> Result<u64, Trap> {
        let vaddr = vaddr & self.cfg.xmask();
        let len = len as u64;
        self.check_alignment(vaddr, len, AccessKind::Read)?;
        let mut buf = [0u8; 8];
        let mut done = 0u64;
        while done < len {
            let cur = vaddr.wrapping_add(done) & self.cfg.xmask();
            let in_page = (PAGESIZE - (cur % PAGESIZE)).min(len - done);
            let paddr = translate::translate(self, cur, kind, ctx)?;
            self.check_phys(paddr, in_page, kind, ctx, cur, Pma::empty())?;
            self.domain
                .read(paddr, &mut buf[done as usize..(done + in_page) as usize])
                .map_err(|_| Trap::exception(AccessKind::Read.access_fault(), cur))?;
            done += in_page;
        }
        if self.big_endian(ctx) {
            buf[..len as usize].reverse();
        }
        Ok(u64::from_le_bytes(buf) & crate::state::width_mask(len as u32 * 8))
    }

    fn store_with_ctx(
        &mut self,
        vaddr: u64,
        len: u32,
        value: u64,
        ctx: TransCtx,
    ) -> Result<(), Trap> {
        let vaddr = vaddr & self.cfg.xmask();
        let len = len as u64;
        self.check_alignment(vaddr, len, AccessKind::Write)?;
        let mut buf = value.to_le_bytes();
        if self.big_endian(ctx) {
            buf[..len as usize].reverse();
        }
        let mut done = 0u64;
        while done < len {
            let cur = vaddr.wrapping_add(done) & self.cfg.xmask();
            let in_page = (PAGESIZE - (cur % PAGESIZE)).min(len - done);
            let paddr = translate::translate(self, cur, AccessKind::Write, ctx)?;
            self.check_phys(paddr, in_page, AccessKind::Write, ctx, cur, Pma::empty())?;
            self.domain
                .write(paddr, &buf[done as usize..(done + in_page) as usize])
                .map_err(|_| Trap::exception(AccessKind::Write.access_fault(), cur))?;
            self.reservations
                .observe_store(paddr, in_page, self.cfg.reservation_bytes);
            done += in_page;
        }
        Ok(())
    }

    /// Architectural data load of `len` bytes; the result is zero-extended
    pub fn load_data(&mut self, vaddr: u64, len: u32) -> Result<u64, Trap> {
        let ctx = self.data_ctx();
        self.load_with_ctx(vaddr, len, ctx, AccessKind::Read)
    }

    /// Architectural data store of `len` bytes
    pub fn store_data(&mut self, vaddr: u64, len: u32, value: u64) -> Result<(), Trap> {
        let ctx = self.data_ctx();
        self.store_with_ctx(vaddr, len, value, ctx)
    }

    /// Hypervisor virtual-machine load (HLV/HLVX)
    pub fn hyp_load(&mut self, vaddr: u64, len: u32, execute_view: bool) -> Result<u64, Trap> {
        let ctx = self.hyp_ctx()?;
        let kind = if execute_view {
            AccessKind::Execute
        } else {
            AccessKind::Read
        };
        self.load_with_ctx(vaddr, len, ctx, kind)
    }

    /// Hypervisor virtual-machine store (HSV)
    pub fn hyp_store(&mut self, vaddr: u64, len: u32, value: u64) -> Result<(), Trap> {
        let ctx = self.hyp_ctx()?;
        self.store_with_ctx(vaddr, len, value, ctx)
    }

    /// The guest context an HLV/HSV instruction operates in
    fn hyp_ctx(&self) -> Result<TransCtx, Trap> {
        let mode = self.state.mode;
        let hstatus = HstatusFlags::from_bits_truncate(self.csrs.hstatus);
        if mode.is_virtual() {
            return Err(self.illegal_instruction("hypervisor access from virtual mode", true));
        }
        if mode == PrivilegeMode::User && !hstatus.contains(HstatusFlags::HU) {
            return Err(self.illegal_instruction("hypervisor access from U without HU", false));
        }
        let guest_mode = if hstatus.contains(HstatusFlags::SPVP) {
            PrivilegeMode::VirtualSupervisor
        } else {
            PrivilegeMode::VirtualUser
        };
        Ok(TransCtx {
            mode: guest_mode,
            virt: true,
        })
    }

    /// Fetch one instruction word at `pc`, 16 bits at a time so a 32-bit
    /// instruction straddling a page boundary faults precisely
    pub fn fetch_insn(&mut self, pc: u64) -> Result<u32, Trap> {
        let pc = pc & self.cfg.xmask();
        if pc & 1 != 0 {
            return Err(Trap::exception(Exception::InstructionAddressMisaligned, pc));
        }
        let ctx = self.exec_ctx();
        let low = self.fetch_half(pc, ctx)?;
        if low & 0b11 != 0b11 {
            return Ok(low as u32);
        }
        let high = self.fetch_half(pc.wrapping_add(2) & self.cfg.xmask(), ctx)?;
        Ok(low as u32 | ((high as u32) << 16))
    }

    fn fetch_half(&mut self, pc: u64, ctx: TransCtx) -> Result<u16, Trap> {
        let paddr = translate::translate(self, pc, AccessKind::Execute, ctx)?;
        self.check_phys(paddr, 2, AccessKind::Execute, ctx, pc, Pma::empty())?;
        let mut buf = [0u8; 2];
        self.domain
            .read(paddr, &mut buf)
            .map_err(|_| Trap::exception(Exception::InstructionAccessFault, pc))?;
        // instruction fetches are always little-endian
        Ok(u16::from_le_bytes(buf))
    }

    /// Load-reserved: load and register a reservation on the line
    pub fn lr(&mut self, vaddr: u64, len: u32) -> Result<u64, Trap> {
        let vaddr = vaddr & self.cfg.xmask();
        if vaddr % len as u64 != 0 {
            return Err(Trap::exception(AccessKind::Read.misaligned_fault(), vaddr));
        }
        let ctx = self.data_ctx();
        let paddr = translate::translate(self, vaddr, AccessKind::Read, ctx)?;
        self.check_phys(paddr, len as u64, AccessKind::Read, ctx, vaddr, Pma::RESERVABLE)?;
        let mut buf = [0u8; 8];
        self.domain
            .read(paddr, &mut buf[..len as usize])
            .map_err(|_| Trap::exception(Exception::LoadAccessFault, vaddr))?;
        if self.big_endian(ctx) {
            buf[..len as usize].reverse();
        }
        let tag = paddr & !(self.cfg.reservation_bytes - 1);
        self.state.reservation = tag;
        self.state.atomic_code = AtomicCode::Lr;
        self.reservations.set(self.cfg.hart_id, tag);
        Ok(u64::from_le_bytes(buf) & crate::state::width_mask(len * 8))
    }

    /// Store-conditional; returns true when the store succeeded
    pub fn sc(&mut self, vaddr: u64, len: u32, value: u64) -> Result<bool, Trap> {
        let vaddr = vaddr & self.cfg.xmask();
        if vaddr % len as u64 != 0 {
            return Err(Trap::exception(AccessKind::Write.misaligned_fault(), vaddr));
        }
        let ctx = self.data_ctx();
        // the try-store comes first so a store fault is reported even when
        // the reservation is already gone
        let paddr = translate::translate(self, vaddr, AccessKind::Write, ctx)?;
        self.check_phys(paddr, len as u64, AccessKind::Write, ctx, vaddr, Pma::RESERVABLE)?;

        let tag = paddr & !(self.cfg.reservation_bytes - 1);
        let held = self.state.reservation == tag
            && self.reservations.holds(self.cfg.hart_id, tag);
        self.state.atomic_code = AtomicCode::Sc;
        self.state.clear_reservation();
        self.reservations.clear(self.cfg.hart_id);
        if !held {
            return Ok(false);
        }
        let mut buf = value.to_le_bytes();
        if self.big_endian(ctx) {
            buf[..len as usize].reverse();
        }
        self.domain
            .write(paddr, &buf[..len as usize])
            .map_err(|_| Trap::exception(Exception::StoreAccessFault, vaddr))?;
        self.reservations
            .observe_store(paddr, len as u64, self.cfg.reservation_bytes);
        Ok(true)
    }

    /// Atomic memory operation: load, combine, store under the domain's
    /// atomicity guarantee; returns the old value zero-extended
    pub fn amo(
        &mut self,
        vaddr: u64,
        len: u32,
        code: AtomicCode,
        f: impl Fn(u64) -> u64,
    ) -> Result<u64, Trap> {
        let vaddr = vaddr & self.cfg.xmask();
        if vaddr % len as u64 != 0 {
            return Err(Trap::exception(AccessKind::Write.misaligned_fault(), vaddr));
        }
        let ctx = self.data_ctx();
        let paddr = translate::translate(self, vaddr, AccessKind::Write, ctx)?;
        self.check_phys(paddr, len as u64, AccessKind::Write, ctx, vaddr, Pma::ATOMIC)?;
        self.state.atomic_code = code;
        let mask = crate::state::width_mask(len * 8);
        let big = self.big_endian(ctx);
        let fix = |raw: u64| {
            if big {
                let mut bytes = raw.to_le_bytes();
                bytes[..len as usize].reverse();
                u64::from_le_bytes(bytes) & mask
            } else {
                raw & mask
            }
        };
        let mut op = |raw: u64| fix(f(fix(raw)));
        let old = self
            .domain
            .rmw(paddr, len as usize, &mut op)
            .map_err(|_| Trap::exception(Exception::StoreAccessFault, vaddr))?;
        self.reservations
            .observe_store(paddr, len as u64, self.cfg.reservation_bytes);
        Ok(fix(old))
    }

    /// Cache block operations; permission gating runs through the envcfg
    /// chain before the line address is probed like a store
    pub fn cbo(&mut self, vaddr: u64, op: decoder::Op) -> Result<(), Trap> {
        use decoder::Op;
        let mode = self.state.mode;
        let menv = EnvCfgFlags::from_bits_truncate(self.csrs.menvcfg);
        let senv = EnvCfgFlags::from_bits_truncate(self.csrs.senvcfg);
        let henv = EnvCfgFlags::from_bits_truncate(self.csrs.henvcfg);

        let allowed = |flags: fn(EnvCfgFlags) -> bool| -> Result<(), Trap> {
            if mode.level() < 3 && !flags(menv) {
                return Err(self.illegal_instruction("cbo disabled by menvcfg", false));
            }
            if mode.is_virtual() && !flags(henv) {
                return Err(self.illegal_instruction("cbo disabled by henvcfg", true));
            }
            if mode.level() < 1 && !flags(senv) {
                return Err(self.illegal_instruction("cbo disabled by senvcfg", false));
            }
            Ok(())
        };
        match op {
            Op::CboClean | Op::CboFlush => allowed(|e| e.contains(EnvCfgFlags::CBCFE))?,
            Op::CboInval => allowed(|e| e.cbo_inval_enabled())?,
            Op::CboZero => allowed(|e| e.contains(EnvCfgFlags::CBZE))?,
            _ => unreachable!("not a cache block operation"),
        }

        let block = self.cfg.cache_block_bytes;
        let line = (vaddr & self.cfg.xmask()) & !(block - 1);
        let ctx = self.data_ctx();
        let paddr = translate::translate(self, line, AccessKind::Write, ctx)?;
        self.check_phys(paddr, block, AccessKind::Write, ctx, line, Pma::empty())?;
        if op == Op::CboZero {
            let zeros = vec![0u8; block as usize];
            self.domain
                .write(paddr, &zeros)
                .map_err(|_| Trap::exception(Exception::StoreAccessFault, line))?;
            self.reservations
                .observe_store(paddr, block, self.cfg.reservation_bytes);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparse_mem_roundtrip() {
        let mem = SparseMem::new(1 << 20);
        mem.write(0x1000, &[1, 2, 3, 4]).unwrap();
        let mut buf = [0u8; 4];
        mem.read(0x1000, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
        assert_eq!(
            mem.read(1 << 21, &mut buf),
            Err(MemError::Unmapped { addr: 1 << 21 })
        );
        // page straddling write
        mem.write(0x1ffe, &[9, 8, 7, 6]).unwrap();
        mem.read(0x2000, &mut buf[..2]).unwrap();
        assert_eq!(&buf[..2], &[7, 6]);
    }

    #[test]
    fn test_rmw_returns_old_value() {
        let mem = SparseMem::new(1 << 20);
        mem.write(0x100, &42u64.to_le_bytes()).unwrap();
        let old = mem.rmw(0x100, 8, &mut |v| v + 1).unwrap();
        assert_eq!(old, 42);
        let mut buf = [0u8; 8];
        mem.read(0x100, &mut buf).unwrap();
        assert_eq!(u64::from_le_bytes(buf), 43);
    }

    #[test]
    fn test_reservation_board() {
        let board = ReservationBoard::new();
        board.set(0, 0x1000);
        board.set(1, 0x2000);
        assert!(board.holds(0, 0x1000));
        // a store inside hart 0's line kills only that reservation
        board.observe_store(0x1008, 4, 64);
        assert!(!board.holds(0, 0x1000));
        assert!(board.holds(1, 0x2000));
    }
}
