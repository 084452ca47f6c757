//! The privilege and trap machine
//!
//! Raised exceptions and sampled interrupts are routed here: delegation
//! picks the target mode, the target's trap CSRs are written, the status
//! stack bits are shuffled and the PC moves to the trap vector.
//! The return instructions undo the transition from the stack bits.

use crate::Hart;
use riscv::csr::{HstatusFlags, InterruptBits, MstatusFlags, XtvecData};
use riscv::isa::Architecture;
use riscv::mode::PrivilegeMode;
use riscv::trap::{Exception, Interrupt, TrapEvent};

/// An architectural trap in flight.
///
/// This is a value, not a host error: raising one is normal operation and
/// it is consumed by [`Hart::take_trap`] at the instruction boundary.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Trap {
    Exception {
        cause: Exception,
        /// Value for the target's `xtval` register
        tval: u64,
        /// Guest physical address (shifted right by 2) for guest page faults
        tval2: u64,
    },
    Interrupt(Interrupt),
}

impl Trap {
    pub fn exception(cause: Exception, tval: u64) -> Self {
        Trap::Exception {
            cause,
            tval,
            tval2: 0,
        }
    }

    pub fn illegal() -> Self {
        Trap::exception(Exception::IllegalInstruction, 0)
    }

    pub fn virtual_instruction() -> Self {
        Trap::exception(Exception::VirtualInstruction, 0)
    }

    pub fn guest_page_fault(cause: Exception, gva: u64, gpa: u64) -> Self {
        debug_assert!(cause.is_guest_page_fault());
        Trap::Exception {
            cause,
            tval: gva,
            tval2: gpa >> 2,
        }
    }
}

/// The mode a trap is taken into
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum TrapTarget {
    Machine,
    Supervisor,
    VirtualSupervisor,
}

impl Hart {
    /// Raise an Illegal Instruction, or a Virtual Instruction when the
    /// operation failed only because the hart is virtualised.
    ///
    /// `virt_cause` states whether a non-virtualised hart at the same base
    /// privilege would have been allowed to do this.
    pub(crate) fn illegal_instruction(&self, reason: &str, virt_cause: bool) -> Trap {
        log::warn!(
            "illegal instruction at {:#x} ({}): {}",
            self.state.pc,
            self.state.mode.name(),
            reason
        );
        if virt_cause && self.state.mode.is_virtual() {
            Trap::virtual_instruction()
        } else {
            Trap::illegal()
        }
    }

    /// Pick the privilege mode a trap is delivered to
    fn trap_target(&self, event: TrapEvent) -> TrapTarget {
        if self.state.mode == PrivilegeMode::Machine {
            return TrapTarget::Machine;
        }
        let (code, medeleg, hdeleg) = match event {
            TrapEvent::Exception(exc) => (exc.code(), self.csrs.medeleg, self.csrs.hedeleg),
            TrapEvent::Interrupt(int) => (int.code(), self.csrs.mideleg, self.csrs.hideleg),
        };
        let bit = 1u64 << code;
        if self.csrs_enabled(Architecture::S) && medeleg & bit != 0 {
            // the VS interrupt causes are always handled below HS when the
            // hypervisor is present; everything else consults hedeleg/hideleg
            let to_vs = match event {
                TrapEvent::Interrupt(int) => matches!(
                    int,
                    Interrupt::VirtualSupervisorSoftware
                        | Interrupt::VirtualSupervisorTimer
                        | Interrupt::VirtualSupervisorExternal
                ),
                TrapEvent::Exception(_) => self.state.mode.is_virtual() && hdeleg & bit != 0,
            };
            if to_vs && self.csrs_enabled(Architecture::H) {
                TrapTarget::VirtualSupervisor
            } else {
                TrapTarget::Supervisor
            }
        } else {
            TrapTarget::Machine
        }
    }

    fn csrs_enabled(&self, feature: Architecture) -> bool {
        self.enabled.contains(feature)
    }

    /// Whether this exception writes a guest virtual address to `xtval`
    fn tval_is_address(cause: Exception) -> bool {
        matches!(
            cause,
            Exception::InstructionAddressMisaligned
                | Exception::InstructionAccessFault
                | Exception::Breakpoint
                | Exception::LoadAddressMisaligned
                | Exception::LoadAccessFault
                | Exception::StoreAddressMisaligned
                | Exception::StoreAccessFault
                | Exception::InstructionPageFault
                | Exception::LoadPageFault
                | Exception::StorePageFault
                | Exception::InstructionGuestPageFault
                | Exception::LoadGuestPageFault
                | Exception::StoreGuestPageFault
        )
    }

    /// Deliver a trap: route it, write the target trap CSRs, stack the
    /// interrupt enables and jump to the trap vector.
    ///
    /// The faulting instruction has been annulled by the caller; `pc` is
    /// the address written to the target `xepc`.
    pub fn take_trap(&mut self, trap: Trap, pc: u64) {
        let (event, tval, tval2) = match &trap {
            Trap::Exception { cause, tval, tval2 } => {
                (TrapEvent::Exception(*cause), *tval, *tval2)
            }
            Trap::Interrupt(int) => (TrapEvent::Interrupt(*int), 0, 0),
        };
        let target = self.trap_target(event);
        let cause = event.to_cause(self.cfg.xlen);
        let int_code = match event {
            TrapEvent::Interrupt(int) => Some(int.code()),
            TrapEvent::Exception(_) => None,
        };
        let from_mode = self.state.mode;
        let from_virt = from_mode.is_virtual();
        let gva = from_virt
            && matches!(event, TrapEvent::Exception(cause) if Self::tval_is_address(cause));

        log::debug!(
            "trap {:?} at {:#x}: {} -> {:?}",
            event,
            pc,
            from_mode.name(),
            target
        );

        // any trap entry tears down an in-flight reservation
        self.state.clear_reservation();
        self.state.disable.remove(crate::state::DisableReason::RESTART_WFI);

        match target {
            TrapTarget::Machine => {
                self.csrs.mepc = pc;
                self.csrs.mcause = cause;
                self.csrs.mtval = tval;
                self.csrs.mtval2 = tval2;
                let mut mstatus = self.csrs.mstatus();
                let mie = mstatus.contains(MstatusFlags::MIE);
                mstatus.set(MstatusFlags::MPIE, mie);
                mstatus.set(MstatusFlags::MIE, false);
                mstatus.set_mpp(from_mode.encoding());
                if self.cfg.arch.contains(Architecture::H) {
                    mstatus.set(MstatusFlags::MPV, from_virt);
                    mstatus.set(MstatusFlags::GVA, gva);
                }
                self.csrs.mstatus = mstatus.0;
                self.state.mode = PrivilegeMode::Machine;
                self.state.pc = XtvecData::parse(self.csrs.mtvec).target(int_code);
            }
            TrapTarget::Supervisor => {
                self.csrs.sepc = pc;
                self.csrs.scause = cause;
                self.csrs.stval = tval;
                let mut mstatus = self.csrs.mstatus();
                let sie = mstatus.contains(MstatusFlags::SIE);
                mstatus.set(MstatusFlags::SPIE, sie);
                mstatus.set(MstatusFlags::SIE, false);
                mstatus.set(MstatusFlags::SPP, from_mode.level() > 0);
                self.csrs.mstatus = mstatus.0;
                if self.cfg.arch.contains(Architecture::H) {
                    self.csrs.htval = tval2;
                    let mut hstatus = HstatusFlags::from_bits_truncate(self.csrs.hstatus);
                    hstatus.set(HstatusFlags::SPV, from_virt);
                    hstatus.set(HstatusFlags::GVA, gva);
                    if from_virt {
                        hstatus.set(HstatusFlags::SPVP, from_mode.level() > 0);
                    }
                    self.csrs.hstatus =
                        (self.csrs.hstatus & !HstatusFlags::all().bits()) | hstatus.bits();
                }
                self.state.mode = PrivilegeMode::Supervisor;
                self.state.pc = XtvecData::parse(self.csrs.stvec).target(int_code);
            }
            TrapTarget::VirtualSupervisor => {
                // the VS interrupt causes are presented with their S names
                let cause = match event {
                    TrapEvent::Interrupt(int) => {
                        let code = int.code() - 1;
                        (1 << (self.cfg.xbits() - 1)) | code as u64
                    }
                    TrapEvent::Exception(_) => cause,
                };
                self.csrs.vsepc = pc;
                self.csrs.vscause = cause;
                self.csrs.vstval = tval;
                let mut vsstatus = riscv::csr::Mstatus(self.csrs.vsstatus);
                let sie = vsstatus.contains(MstatusFlags::SIE);
                vsstatus.set(MstatusFlags::SPIE, sie);
                vsstatus.set(MstatusFlags::SIE, false);
                vsstatus.set(MstatusFlags::SPP, from_mode.level() > 0);
                self.csrs.vsstatus = vsstatus.0;
                self.state.mode = PrivilegeMode::VirtualSupervisor;
                self.state.pc =
                    XtvecData::parse(self.csrs.vstvec).target(int_code.map(|c| c - 1));
            }
        }
        self.hooks.notify_trap(event, pc);
    }

    /// MRET: return from a machine-mode trap handler
    pub(crate) fn mret(&mut self) -> Result<u64, Trap> {
        if self.state.mode != PrivilegeMode::Machine {
            return Err(self.illegal_instruction("mret outside M-mode", false));
        }
        let mut mstatus = self.csrs.mstatus();
        let mpp = mstatus.mpp();
        let mpv = mstatus.contains(MstatusFlags::MPV);
        let new_mode = PrivilegeMode::from_encoding(mpp, mpv && mpp != 3);
        let mpie = mstatus.contains(MstatusFlags::MPIE);
        mstatus.set(MstatusFlags::MIE, mpie);
        mstatus.set(MstatusFlags::MPIE, true);
        mstatus.set_mpp(self.least_privileged_encoding());
        mstatus.set(MstatusFlags::MPV, false);
        if new_mode != PrivilegeMode::Machine {
            mstatus.set(MstatusFlags::MPRV, false);
        }
        self.csrs.mstatus = mstatus.0;
        self.state.mode = new_mode;
        log::debug!("mret to {:#x} in {}", self.csrs.mepc, new_mode.name());
        Ok(self.csrs.mepc & !1)
    }

    /// SRET: return from a supervisor trap handler; trapped by
    /// `mstatus.TSR` and, in VS-mode, `hstatus.VTSR`
    pub(crate) fn sret(&mut self) -> Result<u64, Trap> {
        let mode = self.state.mode;
        match mode {
            PrivilegeMode::Supervisor => {
                if self.csrs.mstatus().contains(MstatusFlags::TSR) {
                    return Err(self.illegal_instruction("sret with mstatus.TSR set", false));
                }
                let mut mstatus = self.csrs.mstatus();
                let spp = mstatus.contains(MstatusFlags::SPP);
                let spie = mstatus.contains(MstatusFlags::SPIE);
                mstatus.set(MstatusFlags::SIE, spie);
                mstatus.set(MstatusFlags::SPIE, true);
                mstatus.set(MstatusFlags::SPP, false);
                mstatus.set(MstatusFlags::MPRV, false);
                self.csrs.mstatus = mstatus.0;
                let spv = HstatusFlags::from_bits_truncate(self.csrs.hstatus)
                    .contains(HstatusFlags::SPV);
                let new_mode = if spv && self.csrs_enabled(Architecture::H) {
                    self.csrs.hstatus &= !HstatusFlags::SPV.bits();
                    PrivilegeMode::from_encoding(spp as u8, true)
                } else {
                    PrivilegeMode::from_encoding(spp as u8, false)
                };
                self.state.mode = new_mode;
                Ok(self.csrs.sepc & !1)
            }
            PrivilegeMode::VirtualSupervisor => {
                if HstatusFlags::from_bits_truncate(self.csrs.hstatus)
                    .contains(HstatusFlags::VTSR)
                {
                    return Err(self.illegal_instruction("sret with hstatus.VTSR set", true));
                }
                let mut vsstatus = riscv::csr::Mstatus(self.csrs.vsstatus);
                let spp = vsstatus.contains(MstatusFlags::SPP);
                let spie = vsstatus.contains(MstatusFlags::SPIE);
                vsstatus.set(MstatusFlags::SIE, spie);
                vsstatus.set(MstatusFlags::SPIE, true);
                vsstatus.set(MstatusFlags::SPP, false);
                self.csrs.vsstatus = vsstatus.0;
                self.state.mode = PrivilegeMode::from_encoding(spp as u8, true);
                Ok(self.csrs.vsepc & !1)
            }
            _ => Err(self.illegal_instruction("sret outside S-mode", false)),
        }
    }

    /// The encoding MPP resets to after MRET: the least privileged
    /// implemented mode
    fn least_privileged_encoding(&self) -> u8 {
        if self.cfg.arch.contains(Architecture::U) {
            0
        } else {
            3
        }
    }

    /// Reset the hart: mode M, interrupts off, PC at the reset vector
    pub fn reset(&mut self) {
        self.state.disable.remove(crate::state::DisableReason::RESET);
        self.state.mode = PrivilegeMode::Machine;
        let mut mstatus = self.csrs.mstatus();
        mstatus.set(MstatusFlags::MIE, false);
        mstatus.set(MstatusFlags::MPRV, false);
        self.csrs.mstatus = mstatus.0;
        self.state.pc = self.cfg.reset_vector;
        self.state.clear_reservation();
        self.end_block();
        self.tlbs.flush_all();
        self.hooks.notify_reset();
        log::debug!("hart {} reset to {:#x}", self.cfg.hart_id, self.state.pc);
    }

    /// The highest-priority interrupt that is pending, enabled and not
    /// masked by the current mode, if any
    pub fn pending_interrupt(&self) -> Option<Interrupt> {
        let pending = InterruptBits::from_bits_truncate(
            self.csrs.mip | (self.csrs.hvip & InterruptBits::VS_MASK.bits()),
        );
        let enabled = InterruptBits::from_bits_truncate(self.csrs.mie);
        let ready = pending & enabled;
        if ready.is_empty() {
            return None;
        }
        let mstatus = self.csrs.mstatus();
        let mode = self.state.mode;

        let m_pending = ready & !InterruptBits::from_bits_truncate(self.csrs.mideleg);
        let m_enabled = mode != PrivilegeMode::Machine
            || mstatus.contains(MstatusFlags::MIE);
        if m_enabled {
            if let Some(int) = highest(m_pending) {
                return Some(int);
            }
        }

        let s_pending = ready
            & InterruptBits::from_bits_truncate(self.csrs.mideleg)
            & !InterruptBits::from_bits_truncate(self.csrs.hideleg);
        let s_enabled = mode.level() < 1
            || mode.is_virtual()
            || (mode == PrivilegeMode::Supervisor && mstatus.contains(MstatusFlags::SIE));
        if s_enabled {
            if let Some(int) = highest(s_pending) {
                return Some(int);
            }
        }

        if mode.is_virtual() {
            let vs_pending = ready & InterruptBits::from_bits_truncate(self.csrs.hideleg);
            let vsstatus = riscv::csr::Mstatus(self.csrs.vsstatus);
            let vs_enabled = mode == PrivilegeMode::VirtualUser
                || vsstatus.contains(MstatusFlags::SIE);
            if vs_enabled {
                if let Some(int) = highest(vs_pending) {
                    return Some(int);
                }
            }
        }
        None
    }

    /// External interrupt-controller input: drive a `mip` bit
    pub fn update_interrupt(&mut self, interrupt: Interrupt, level: bool) {
        if level {
            self.csrs.mip |= interrupt.bit();
        } else {
            self.csrs.mip &= !interrupt.bit();
        }
        if level && self.state.disable.intersects(crate::state::DisableReason::RESTART_WFI) {
            self.state.disable.remove(crate::state::DisableReason::RESTART_WFI);
        }
    }
}

/// The architected priority order: MEI, MSI, MTI, SEI, SSI, STI, SGEI,
/// VSEI, VSSI, VSTI
fn highest(bits: InterruptBits) -> Option<Interrupt> {
    const ORDER: [(InterruptBits, Interrupt); 10] = [
        (InterruptBits::MEIP, Interrupt::MachineExternal),
        (InterruptBits::MSIP, Interrupt::MachineSoftware),
        (InterruptBits::MTIP, Interrupt::MachineTimer),
        (InterruptBits::SEIP, Interrupt::SupervisorExternal),
        (InterruptBits::SSIP, Interrupt::SupervisorSoftware),
        (InterruptBits::STIP, Interrupt::SupervisorTimer),
        (InterruptBits::SGEIP, Interrupt::SupervisorGuestExternal),
        (InterruptBits::VSEIP, Interrupt::VirtualSupervisorExternal),
        (InterruptBits::VSSIP, Interrupt::VirtualSupervisorSoftware),
        (InterruptBits::VSTIP, Interrupt::VirtualSupervisorTimer),
    ];
    ORDER
        .iter()
        .find(|(bit, _)| bits.contains(*bit))
        .map(|(_, int)| *int)
}
