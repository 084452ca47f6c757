//! The silikon riscv hart simulation engine
//!
//! A [`Hart`] owns the architectural state of one riscv hart and executes
//! decoded instructions against a shared physical [`mem::MemDomain`].
//! Each hart is driven from a single host thread; the suspension points a
//! scheduler may interleave at are the block boundaries reported by
//! [`Hart::step`].
//!
//! The crate splits along the architecture's own seams: the CSR bank
//! ([`csr`]), the privilege and trap machine ([`trap`]), the memory
//! subsystem ([`mem`]), the per-opcode emitters ([`morph`]) and the vector
//! engine ([`vector`]).

mod block;
mod checkpoint;
#[cfg(test)]
mod scenarios;
pub mod config;
pub mod csr;
pub mod extension;
pub mod mem;
mod morph;
pub mod state;
pub mod trap;
pub mod vector;

pub use block::{BlockState, VlClass};
pub use checkpoint::Checkpoint;
pub use config::Config;
pub use morph::Flow;
pub use trap::Trap;

use config::ConfigError;
use csr::Csrs;
use decoder::{DecodeCtx, InstrInfo};
use extension::ExtensionTable;
use mem::tlb::Tlbs;
use mem::{MemDomain, ReservationBoard};
use riscv::isa::Architecture;
use state::{AtomicCode, HartState};
use std::sync::Arc;

/// Outcome of one [`Hart::step`]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StepOutcome {
    /// An instruction retired
    Executed,
    /// The instruction was annulled by a trap; the PC is at the handler
    Trapped,
    /// The hart is stalled (WFI, reset, debug) and made no progress
    Stalled,
}

/// A morphed block: the decoded instructions from a block entry point up
/// to the first instruction that may transfer control or observe external
/// state
#[derive(Debug, Clone)]
pub struct TranslatedBlock {
    pub pc: u64,
    pub instrs: Vec<InstrInfo>,
}

pub struct Hart {
    pub cfg: Config,
    pub state: HartState,
    pub csrs: Csrs,
    /// Assumptions established for the currently executing block
    pub block: BlockState,
    pub hooks: ExtensionTable,
    pub(crate) tlbs: Tlbs,
    pub(crate) domain: Arc<dyn MemDomain>,
    pub(crate) reservations: Arc<ReservationBoard>,
    /// Features currently enabled; starts as the configured set and
    /// changes only through writable `misa` letters
    pub(crate) enabled: Architecture,
    /// Whether the next instruction begins a new translated block
    block_boundary: bool,
}

impl Hart {
    pub fn new(cfg: Config, domain: Arc<dyn MemDomain>) -> Result<Self, ConfigError> {
        Self::new_shared(cfg, domain, ReservationBoard::new())
    }

    /// Construct a hart sharing its reservation board with others on the
    /// same memory domain
    pub fn new_shared(
        cfg: Config,
        domain: Arc<dyn MemDomain>,
        reservations: Arc<ReservationBoard>,
    ) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Hart {
            state: HartState::new(&cfg),
            csrs: Csrs::new(&cfg),
            block: BlockState::default(),
            hooks: ExtensionTable::default(),
            tlbs: Tlbs::default(),
            domain,
            reservations,
            enabled: cfg.arch,
            block_boundary: true,
            cfg,
        })
    }

    pub fn decode_ctx(&self) -> DecodeCtx {
        DecodeCtx {
            arch: self.enabled,
            xlen: self.cfg.xlen,
        }
    }

    /// Execute one instruction, taking a pending interrupt first.
    ///
    /// Interrupts are sampled only here, at the instruction boundary, so an
    /// instruction body is never preempted.
    pub fn step(&mut self) -> StepOutcome {
        self.state.atomic_code = AtomicCode::None;
        if let Some(interrupt) = self.pending_interrupt() {
            self.end_block();
            self.take_trap(Trap::Interrupt(interrupt), self.state.pc);
            return StepOutcome::Trapped;
        }
        if self.state.is_disabled() {
            return StepOutcome::Stalled;
        }

        let pc = self.state.pc;
        if self.block_boundary {
            self.start_block(pc);
        }
        let word = match self.fetch_insn(pc) {
            Ok(word) => word,
            Err(trap) => {
                self.deliver(trap, pc);
                return StepOutcome::Trapped;
            }
        };
        let info = decoder::decode(word, pc, &self.decode_ctx());
        match morph::dispatch(self, &info) {
            Ok(flow) => {
                match flow {
                    Flow::Next => {
                        self.state.pc = pc.wrapping_add(info.bytes as u64) & self.cfg.xmask();
                    }
                    Flow::Jump(target) => {
                        self.state.pc = target & self.cfg.xmask();
                        self.end_block();
                    }
                    Flow::Stop => {
                        self.state.pc = pc.wrapping_add(info.bytes as u64) & self.cfg.xmask();
                        self.end_block();
                    }
                }
                self.retire();
                StepOutcome::Executed
            }
            Err(trap) => {
                // the instruction is annulled; none of its side effects
                // are observed
                self.deliver(trap, pc);
                StepOutcome::Trapped
            }
        }
    }

    /// Run until `limit` instructions executed or the hart stalls
    pub fn run(&mut self, limit: u64) -> u64 {
        let mut executed = 0;
        while executed < limit {
            match self.step() {
                StepOutcome::Stalled => break,
                _ => executed += 1,
            }
        }
        executed
    }

    fn retire(&mut self) {
        if self.csrs.mcountinhibit & 1 == 0 {
            self.csrs.mcycle = self.csrs.mcycle.wrapping_add(1);
        }
        if self.csrs.mcountinhibit & 0b100 == 0 {
            self.csrs.minstret = self.csrs.minstret.wrapping_add(1);
        }
    }

    /// Route a trap through the first-exception filter and deliver it
    fn deliver(&mut self, trap: Trap, pc: u64) {
        let trap = self.hooks.filter_exception(&trap, pc).unwrap_or(trap);
        self.end_block();
        self.take_trap(trap, pc);
    }

    /// Translation entry point: decode instructions from `pc` up to and
    /// including the first one that ends the block.
    ///
    /// The walk is bounded; a block never crosses a control transfer, a
    /// CSR write flagged `end_block`, or an instruction that can observe
    /// external state.
    pub fn morph(&mut self, pc: u64) -> Result<TranslatedBlock, Trap> {
        const MAX_BLOCK_INSTRS: usize = 64;
        let mut instrs = Vec::new();
        let mut cur = pc;
        loop {
            let word = self.fetch_insn(cur)?;
            let info = decoder::decode(word, cur, &self.decode_ctx());
            let ends = info.is_illegal() || morph::ends_block(&info);
            cur = cur.wrapping_add(info.bytes as u64) & self.cfg.xmask();
            instrs.push(info);
            if ends || instrs.len() >= MAX_BLOCK_INSTRS {
                break;
            }
        }
        log::trace!("morphed block at {:#x}: {} instructions", pc, instrs.len());
        Ok(TranslatedBlock { pc, instrs })
    }

    /// Begin a block at `pc`: the new block state inherits the invariants
    /// that survive control transfer from the previous one
    pub fn start_block(&mut self, pc: u64) {
        let prev = std::mem::take(&mut self.block);
        self.block = BlockState::link(prev, pc);
        self.block_boundary = false;
    }

    /// Leave the current block; the state detaches from its predecessor
    /// and the next instruction enters a fresh one
    pub fn end_block(&mut self) {
        self.block.unlink();
        self.block_boundary = true;
    }

    /// Mark the floating point unit dirty; elided when the block already
    /// knows it is
    pub(crate) fn dirty_fs(&mut self) {
        if self.block.fs_dirty {
            return;
        }
        let mut mstatus = self.csrs.mstatus();
        mstatus.set_fs(riscv::csr::ExtState::Dirty);
        self.csrs.mstatus = mstatus.0;
        self.block.fs_dirty = true;
    }

    /// Mark the vector unit dirty
    pub(crate) fn dirty_vs(&mut self) {
        if self.block.vs_dirty {
            return;
        }
        let mut mstatus = self.csrs.mstatus();
        mstatus.set_vs(riscv::csr::ExtState::Dirty);
        self.csrs.mstatus = mstatus.0;
        self.block.vs_dirty = true;
    }

    /// OR per-instruction floating point flags into `fflags`
    pub(crate) fn accumulate_fflags(&mut self, flags: softfloat::Flags) {
        if flags.is_empty() {
            return;
        }
        self.csrs.fcsr |= flags.bits() as u64;
        self.dirty_fs();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::{MemDomain, SparseMem};
    use decoder::Op;

    fn hart_with(program: &[u32]) -> Hart {
        let mem = SparseMem::shared(1 << 24);
        let mut bytes = Vec::new();
        for word in program {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        mem.write(0x8000, &bytes).unwrap();
        let mut cfg = Config::rv64();
        cfg.reset_vector = 0x8000;
        cfg.pmp_entries = 0;
        Hart::new(cfg, mem).unwrap()
    }

    #[test]
    fn test_add_scenario() {
        // add x3, x1, x2 across the sign-bit boundary
        let mut hart = hart_with(&[0x0020_81b3]);
        hart.state.set_x(1, 0x8000_0000_0000_0000);
        hart.state.set_x(2, 1);
        let mie_before = hart.csrs.mstatus;
        assert_eq!(hart.step(), StepOutcome::Executed);
        assert_eq!(hart.state.x(3), 0x8000_0000_0000_0001);
        assert_eq!(hart.csrs.mstatus, mie_before, "mstatus is untouched by ALU ops");
        assert_eq!(hart.csrs.minstret, 1);
    }

    #[test]
    fn test_illegal_instruction_traps_to_m() {
        let mut hart = hart_with(&[0xffff_ffff]);
        hart.csrs.mtvec = 0x100;
        let pc = hart.state.pc;
        assert_eq!(hart.step(), StepOutcome::Trapped);
        assert_eq!(hart.csrs.mcause, 2);
        assert_eq!(hart.csrs.mepc, pc);
        assert_eq!(hart.state.pc, 0x100);
    }

    #[test]
    fn test_morph_stops_at_branch() {
        // addi x1, x0, 1; beq x0, x0, 8; addi x2, x0, 2
        let mut hart = hart_with(&[0x0010_0093, 0x0000_0463, 0x0020_0113]);
        let block = hart.morph(hart.state.pc).unwrap();
        assert_eq!(block.instrs.len(), 2);
        assert_eq!(block.instrs[0].op, Op::Addi);
        assert_eq!(block.instrs[1].op, Op::Beq);
    }

    #[test]
    fn test_wfi_stalls_until_interrupt() {
        let mut hart = hart_with(&[0x1050_0073]);
        hart.cfg.wfi = config::WfiPolicy::Wait;
        assert_eq!(hart.step(), StepOutcome::Executed);
        assert_eq!(hart.step(), StepOutcome::Stalled);
        // an incoming interrupt clears the stall even while disabled
        hart.update_interrupt(riscv::trap::Interrupt::MachineTimer, true);
        assert!(!hart.state.is_disabled());
    }
}
