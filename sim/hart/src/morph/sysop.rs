//! System instruction emitters: environment calls, returns, waits, fences
//! and CSR access

use super::{EmitResult, Flow, MorphState};
use crate::config::WfiPolicy;
use crate::csr::{self, CsrFlags};
use crate::mem::tlb::Stage;
use crate::state::DisableReason;
use crate::trap::Trap;
use decoder::{CsrUpdate, Op};
use riscv::csr::{HstatusFlags, MstatusFlags};
use riscv::mode::PrivilegeMode;
use riscv::trap::Exception;

pub(super) fn emit(ms: &mut MorphState) -> EmitResult {
    match ms.info.op {
        Op::Ecall => {
            let cause = match ms.hart.state.mode {
                PrivilegeMode::User | PrivilegeMode::VirtualUser => Exception::EnvCallFromUMode,
                PrivilegeMode::Supervisor => Exception::EnvCallFromSMode,
                PrivilegeMode::VirtualSupervisor => Exception::EnvCallFromVsMode,
                _ => Exception::EnvCallFromMMode,
            };
            Err(Trap::exception(cause, 0))
        }
        Op::Ebreak => Err(Trap::exception(Exception::Breakpoint, ms.info.pc)),
        Op::Mret => {
            let target = ms.hart.mret()?;
            Ok(Flow::Jump(target))
        }
        Op::Sret => {
            let target = ms.hart.sret()?;
            Ok(Flow::Jump(target))
        }
        Op::Mnret | Op::Dret => {
            // resumable NMIs and the debug module are not configured
            Err(ms.illegal("return instruction without its extension"))
        }
        Op::Wfi => wfi(ms),
        Op::Fence => Ok(Flow::Stop),
        Op::FenceI => {
            // no decoded-block cache exists to invalidate yet; the block
            // boundary alone provides the ordering
            Ok(Flow::Stop)
        }
        Op::SfenceVma | Op::SinvalVma => sfence_vma(ms),
        Op::SfenceWInval | Op::SfenceInvalIr => {
            // ordering-only halves of the Svinval sequence
            require_supervisor(ms)?;
            Ok(Flow::Stop)
        }
        Op::HfenceVvma => hfence(ms, Stage::Vs1),
        Op::HfenceGvma => hfence(ms, Stage::Vs2),
        _ => unreachable!(),
    }
}

fn wfi(ms: &mut MorphState) -> EmitResult {
    let mode = ms.hart.state.mode;
    let mstatus = ms.hart.csrs.mstatus();
    if mode.level() < 3 && mstatus.contains(MstatusFlags::TW) {
        return Err(ms.hart.illegal_instruction("wfi with mstatus.TW set", false));
    }
    if mode.is_virtual()
        && HstatusFlags::from_bits_truncate(ms.hart.csrs.hstatus).contains(HstatusFlags::VTW)
    {
        return Err(ms.hart.illegal_instruction("wfi with hstatus.VTW set", true));
    }
    if ms.hart.cfg.wfi == WfiPolicy::Wait && ms.hart.pending_interrupt().is_none() {
        ms.hart.state.disable |= DisableReason::WFI;
    }
    Ok(Flow::Stop)
}

/// SFENCE.VMA needs supervisor privilege and is trapped by TVM/VTVM
fn require_supervisor(ms: &MorphState) -> Result<(), Trap> {
    let mode = ms.hart.state.mode;
    if mode.level() < 1 {
        return Err(ms
            .hart
            .illegal_instruction("supervisor fence from user mode", mode.is_virtual()));
    }
    Ok(())
}

fn sfence_vma(ms: &mut MorphState) -> EmitResult {
    require_supervisor(ms)?;
    let mode = ms.hart.state.mode;
    let mstatus = ms.hart.csrs.mstatus();
    match mode {
        PrivilegeMode::Supervisor if mstatus.contains(MstatusFlags::TVM) => {
            return Err(ms.hart.illegal_instruction("sfence.vma with mstatus.TVM set", false));
        }
        PrivilegeMode::VirtualSupervisor
            if HstatusFlags::from_bits_truncate(ms.hart.csrs.hstatus)
                .contains(HstatusFlags::VTVM) =>
        {
            return Err(ms.hart.illegal_instruction("sfence.vma with hstatus.VTVM set", true));
        }
        _ => {}
    }

    let vaddr = operand(ms, 1);
    let asid = operand(ms, 2);
    let stage = if mode.is_virtual() { Stage::Vs1 } else { Stage::Hs };
    invalidate(ms, stage, vaddr.map(|a| a >> 12), asid.map(|a| a as u16));
    Ok(Flow::Stop)
}

fn hfence(ms: &mut MorphState, stage: Stage) -> EmitResult {
    let mode = ms.hart.state.mode;
    if mode.is_virtual() {
        return Err(ms.hart.illegal_instruction("hfence from virtual mode", true));
    }
    if mode.level() < 1 {
        return Err(ms.hart.illegal_instruction("hfence from user mode", false));
    }
    if mode == PrivilegeMode::Supervisor
        && stage == Stage::Vs2
        && ms.hart.csrs.mstatus().contains(MstatusFlags::TVM)
    {
        return Err(ms.hart.illegal_instruction("hfence.gvma with mstatus.TVM set", false));
    }
    let addr = operand(ms, 1);
    let id = operand(ms, 2);
    // hfence.gvma names guest physical addresses shifted right by two
    let vpn = addr.map(|a| if stage == Stage::Vs2 { (a << 2) >> 12 } else { a >> 12 });
    invalidate(ms, stage, vpn, id.map(|a| a as u16));
    Ok(Flow::Stop)
}

/// A fence operand register; x0 means "all"
fn operand(ms: &MorphState, i: usize) -> Option<u64> {
    let desc = ms.info.r[i];
    if desc.index() == 0 {
        None
    } else {
        Some(ms.hart.state.x(desc.index()))
    }
}

fn invalidate(ms: &mut MorphState, stage: Stage, vpn: Option<u64>, asid: Option<u16>) {
    log::trace!("fence {:?}: vpn {:?} asid {:?}", stage, vpn, asid);
    ms.hart.tlbs.get_mut(stage).invalidate(vpn, asid);
    ms.hart.hooks.notify_tlb_invalidate();
}

pub(super) fn csr(ms: &mut MorphState) -> EmitResult {
    let info = ms.info;
    let immediate = info.op == Op::Csrri;
    let src = if immediate {
        info.imm as u64
    } else {
        ms.hart.state.x(info.r[1].index())
    };
    // read-set/read-clear with a zero source never writes; read-write with
    // x0 as destination never reads
    let writes = match info.csr_update {
        CsrUpdate::ReadWrite => true,
        _ => {
            if immediate {
                info.imm != 0
            } else {
                info.r[1].index() != 0
            }
        }
    };
    let reads = info.csr_update != CsrUpdate::ReadWrite || info.r[0].index() != 0;

    let attrs = csr::check_access(ms.hart, info.csr, writes)?;
    let old = if reads || writes {
        csr::read(ms.hart, attrs)
    } else {
        0
    };
    if writes {
        let value = match info.csr_update {
            CsrUpdate::ReadWrite => src,
            CsrUpdate::ReadSet => old | src,
            CsrUpdate::ReadClear => old & !src,
            CsrUpdate::None => unreachable!(),
        };
        csr::write(ms.hart, attrs, value);
        if attrs.flags.contains(CsrFlags::FP_STATE) {
            ms.hart.dirty_fs();
        }
        if attrs.flags.contains(CsrFlags::VEC_STATE) {
            ms.hart.dirty_vs();
        }
    }
    if reads {
        ms.set_xd(old);
    }
    if writes && attrs.flags.contains(CsrFlags::END_BLOCK) {
        Ok(Flow::Stop)
    } else {
        Ok(Flow::Next)
    }
}
