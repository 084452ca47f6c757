//! End-to-end scenarios exercising whole instructions against a sparse
//! test memory

use crate::config::{Config, MisalignedPolicy};
use crate::mem::{MemDomain, ReservationBoard, SparseMem};
use crate::state::NO_RESERVATION;
use crate::{Hart, StepOutcome};
use riscv::csr::{addr, EnvCfgFlags, HstatusFlags, MstatusFlags};
use riscv::mem::EntryFlags;
use riscv::mode::PrivilegeMode;
use std::sync::Arc;

const BASE: u64 = 0x8000;

fn machine(program: &[u32]) -> (Hart, Arc<SparseMem>) {
    let mem = SparseMem::shared(1 << 24);
    load_program(&mem, BASE, program);
    let mut cfg = Config::rv64();
    cfg.reset_vector = BASE;
    cfg.pmp_entries = 0;
    let hart = Hart::new(cfg, mem.clone()).unwrap();
    (hart, mem)
}

fn load_program(mem: &SparseMem, at: u64, program: &[u32]) {
    let mut bytes = Vec::new();
    for word in program {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    mem.write(at, &bytes).unwrap();
}

fn step_ok(hart: &mut Hart) {
    assert_eq!(hart.step(), StepOutcome::Executed);
}

#[test]
fn test_csr_write_read_law() {
    // csrrw x5, mscratch, x6
    let (mut hart, _) = machine(&[0x3403_12f3]);
    hart.state.set_x(6, 0xdead_beef);
    step_ok(&mut hart);
    assert_eq!(hart.csrs.mscratch, 0xdead_beef);
    assert_eq!(hart.state.x(5), 0, "previous value was zero");
    // mtvec masks the reserved mode bit: write mode 2, bit 1 reads back 0
    let attrs = crate::csr::lookup(addr::MTVEC).unwrap();
    crate::csr::write(&mut hart, attrs, 0x1002);
    assert_eq!(crate::csr::read(&hart, attrs), 0x1000);
}

#[test]
fn test_vsetvli_scenario() {
    // vsetvli x1, x0, e32,m2,ta,ma on VLEN=128 -> vl = 8
    let (mut hart, _) = machine(&[0x0d10_70d7]);
    step_ok(&mut hart);
    assert_eq!(hart.csrs.vl, 8);
    assert_eq!(hart.state.x(1), 8);
    let vtype = hart.csrs.vtype();
    assert_eq!(vtype.vsew(), 2);
    assert_eq!(vtype.svlmul(), 1);
    assert!(!vtype.vill(64));
}

#[test]
fn test_vsetvli_keep_vl_roundtrip() {
    // vsetvli x1, x2, vtypei ; vsetvli x0, x0, vtypei (same type)
    let (mut hart, _) = machine(&[0x0d11_70d7, 0x0d10_7057]);
    hart.state.set_x(2, 5);
    step_ok(&mut hart);
    assert_eq!(hart.csrs.vl, 5);
    step_ok(&mut hart);
    assert_eq!(hart.csrs.vl, 5, "rs1=x0 rd=x0 preserves vl");
}

#[test]
fn test_vsetvli_illegal_sets_vill() {
    // e64 with LMUL=1/8 leaves no whole element on VLEN=128
    let vtypei = 0b000_011_101u32; // vsew=3, vlmul=-3
    let word = 0x0000_7057 | (vtypei << 20) | (0 << 15);
    let (mut hart, _) = machine(&[word]);
    step_ok(&mut hart);
    assert!(hart.csrs.vtype().vill(64));
    assert_eq!(hart.csrs.vl, 0);
}

#[test]
fn test_fadd_nan_boxing_scenario() {
    // fadd.s f0, f1, f2 with frm=RTZ; FLEN=64 so the result is boxed
    let (mut hart, _) = machine(&[0x0020_f053]);
    hart.csrs.fcsr = 1 << 5; // frm = RTZ
    hart.state.set_f(1, 32, 1.5f32.to_bits() as u64);
    hart.state.set_f(2, 32, 1.5f32.to_bits() as u64);
    step_ok(&mut hart);
    assert_eq!(
        hart.state.f_raw(0),
        0xffff_ffff_0000_0000 | 3.0f32.to_bits() as u64
    );
    assert_eq!(hart.csrs.fcsr & 0x1f, 0, "exact sum raises no flags");
    assert_eq!(hart.csrs.mstatus().fs(), riscv::csr::ExtState::Dirty);
}

#[test]
fn test_fp_write_redirties_after_status_clear() {
    // two fadd.s in a row; software lowers FS to Clean in between
    let (mut hart, _) = machine(&[0x0020_f053, 0x0020_f053]);
    step_ok(&mut hart);
    assert_eq!(hart.csrs.mstatus().fs(), riscv::csr::ExtState::Dirty);

    let attrs = crate::csr::lookup(addr::MSTATUS).unwrap();
    let mut mstatus = hart.csrs.mstatus();
    mstatus.set_fs(riscv::csr::ExtState::Clean);
    crate::csr::write(&mut hart, attrs, mstatus.0);
    assert_eq!(hart.csrs.mstatus().fs(), riscv::csr::ExtState::Clean);

    step_ok(&mut hart);
    assert_eq!(
        hart.csrs.mstatus().fs(),
        riscv::csr::ExtState::Dirty,
        "an fp register write must raise FS back to Dirty"
    );
}

#[test]
fn test_block_state_links_across_jumps() {
    // fadd.s f0, f1, f2 ; j +4 ; fadd.s f0, f1, f2
    let (mut hart, _) = machine(&[0x0020_f053, 0x0040_006f, 0x0020_f053]);
    step_ok(&mut hart);
    assert_eq!(hart.block.pc, BASE);
    assert!(hart.block.fs_dirty);
    assert!(hart.block.is_boxed(0, 32));
    step_ok(&mut hart);
    step_ok(&mut hart);
    // the jump ended the first block; the one entered at the target links
    // back and inherits the register-file invariants
    assert_eq!(hart.block.pc, BASE + 8);
    assert!(hart.block.prev.is_some());
    assert!(hart.block.fs_dirty);
    assert!(hart.block.is_boxed(0, 32));
}

#[test]
fn test_fp_reserved_dynamic_rm_traps() {
    // fadd.s with rm=dyn while frm holds a reserved value
    let (mut hart, _) = machine(&[0x0020_f053]);
    hart.csrs.fcsr = 5 << 5;
    hart.csrs.mtvec = 0x100;
    assert_eq!(hart.step(), StepOutcome::Trapped);
    assert_eq!(hart.csrs.mcause, 2);
}

#[test]
fn test_pmp_store_fault_scenario() {
    // sw x4, 0(x2) from S-mode against a locked read-only NAPOT region
    let mem = SparseMem::shared(1 << 24);
    load_program(&mem, BASE, &[0x0041_2023]);
    let mut cfg = Config::rv64();
    cfg.reset_vector = BASE;
    cfg.pmp_entries = 16;
    let mut hart = Hart::new(cfg, mem).unwrap();
    // entry 0: [0x1000, 0x1100) read-only, locked
    hart.csrs.pmpcfg[0] = (3 << 3) | crate::mem::pmp::PMP_R | crate::mem::pmp::PMP_LOCK;
    hart.csrs.pmpaddr[0] = (0x1000 >> 2) | ((0x100 / 8) - 1);
    // entry 1: let supervisor run from the program region
    hart.csrs.pmpcfg[1] = (3 << 3) | 0b111;
    hart.csrs.pmpaddr[1] = (BASE >> 2) | ((0x1000 / 8) - 1);
    hart.state.mode = PrivilegeMode::Supervisor;
    hart.state.set_x(2, 0x1000);
    hart.state.set_x(4, 42);
    assert_eq!(hart.step(), StepOutcome::Trapped);
    assert_eq!(hart.csrs.mcause, 7, "store access fault");
    assert_eq!(hart.csrs.mtval, 0x1000);
    assert_eq!(hart.csrs.mstatus().mpp(), 1, "trapped from S");
}

#[test]
fn test_lr_sc_remote_store_scenario() {
    let mem = SparseMem::shared(1 << 24);
    let board = ReservationBoard::new();
    // hart 0: lr.w x1, (x2) ; sc.w x3, x4, (x2)
    load_program(&mem, BASE, &[0x1001_22af, 0x1841_21af]);
    let mut cfg = Config::rv64();
    cfg.reset_vector = BASE;
    cfg.pmp_entries = 0;
    let mut hart0 = Hart::new_shared(cfg.clone(), mem.clone(), board.clone()).unwrap();
    cfg.hart_id = 1;
    let mut hart1 = Hart::new_shared(cfg, mem, board).unwrap();

    hart0.state.set_x(2, 0x4000);
    hart0.state.set_x(4, 7);
    step_ok(&mut hart0);
    assert_ne!(hart0.state.reservation, NO_RESERVATION);
    // the other hart stores into the same line
    hart1.store_data(0x4004, 4, 99).unwrap();
    step_ok(&mut hart0);
    assert_eq!(hart0.state.x(3), 1, "sc must fail after the remote store");
}

#[test]
fn test_lr_sc_success() {
    let (mut hart, mem) = machine(&[0x1001_22af, 0x1841_21af]);
    mem.write(0x4000, &21u32.to_le_bytes()).unwrap();
    hart.state.set_x(2, 0x4000);
    hart.state.set_x(4, 7);
    step_ok(&mut hart);
    assert_eq!(hart.state.x(1), 21);
    step_ok(&mut hart);
    assert_eq!(hart.state.x(3), 0, "sc succeeds");
    let mut buf = [0u8; 4];
    mem.read(0x4000, &mut buf).unwrap();
    assert_eq!(u32::from_le_bytes(buf), 7);
    assert_eq!(hart.state.reservation, NO_RESERVATION);
}

#[test]
fn test_amoadd_returns_old_value() {
    // amoadd.w x5, x6, (x7)
    let (mut hart, mem) = machine(&[0x0063_a2af]);
    mem.write(0x4000, &40u32.to_le_bytes()).unwrap();
    hart.state.set_x(7, 0x4000);
    hart.state.set_x(6, 2);
    step_ok(&mut hart);
    assert_eq!(hart.state.x(5), 40);
    let mut buf = [0u8; 4];
    mem.read(0x4000, &mut buf).unwrap();
    assert_eq!(u32::from_le_bytes(buf), 42);
}

#[test]
fn test_virtual_instruction_scenario() {
    // sfence.vma from VS-mode with hstatus.VTVM=1 -> cause 22 into HS
    let (mut hart, _) = machine(&[0x1200_0073]);
    hart.csrs.medeleg = 1 << 22;
    hart.csrs.hstatus = HstatusFlags::VTVM.bits();
    hart.csrs.stvec = 0x2000;
    hart.state.mode = PrivilegeMode::VirtualSupervisor;
    assert_eq!(hart.step(), StepOutcome::Trapped);
    assert_eq!(hart.csrs.scause, 22);
    assert_eq!(hart.state.mode, PrivilegeMode::Supervisor);
    assert_eq!(hart.state.pc, 0x2000);
    assert!(
        HstatusFlags::from_bits_truncate(hart.csrs.hstatus).contains(HstatusFlags::SPV),
        "the trap records that it came from a virtual mode"
    );
}

#[test]
fn test_delegated_ecall() {
    let (mut hart, _) = machine(&[0x0000_0073]);
    hart.csrs.medeleg = 1 << 8;
    hart.csrs.stvec = 0x3000;
    hart.state.mode = PrivilegeMode::User;
    assert_eq!(hart.step(), StepOutcome::Trapped);
    assert_eq!(hart.csrs.scause, 8);
    assert_eq!(hart.state.mode, PrivilegeMode::Supervisor);
    assert_eq!(hart.csrs.sepc, BASE);
    assert!(!hart.csrs.mstatus().contains(MstatusFlags::SPP));
}

#[test]
fn test_mret_restores_mode() {
    let (mut hart, _) = machine(&[0x3020_0073]);
    let mut mstatus = hart.csrs.mstatus();
    mstatus.set_mpp(0);
    mstatus.set(MstatusFlags::MPIE, true);
    mstatus.set(MstatusFlags::MPRV, true);
    hart.csrs.mstatus = mstatus.0;
    hart.csrs.mepc = 0x5000;
    step_ok(&mut hart);
    assert_eq!(hart.state.mode, PrivilegeMode::User);
    assert_eq!(hart.state.pc, 0x5000);
    let mstatus = hart.csrs.mstatus();
    assert!(mstatus.contains(MstatusFlags::MIE));
    assert!(
        !mstatus.contains(MstatusFlags::MPRV),
        "leaving M clears MPRV"
    );
}

#[test]
fn test_wfi_tw_traps_from_s() {
    let (mut hart, _) = machine(&[0x1050_0073]);
    let mut mstatus = hart.csrs.mstatus();
    mstatus.set(MstatusFlags::TW, true);
    hart.csrs.mstatus = mstatus.0;
    hart.state.mode = PrivilegeMode::Supervisor;
    assert_eq!(hart.step(), StepOutcome::Trapped);
    assert_eq!(hart.csrs.mcause, 2);
}

#[test]
fn test_misaligned_load_traps() {
    // lw x5, 1(x6)
    let (mut hart, _) = machine(&[0x0013_2283]);
    hart.state.set_x(6, 0x4000);
    assert_eq!(hart.step(), StepOutcome::Trapped);
    assert_eq!(hart.csrs.mcause, 4);
    assert_eq!(hart.csrs.mtval, 0x4001);
}

#[test]
fn test_misaligned_load_emulated_when_configured() {
    let mem = SparseMem::shared(1 << 24);
    load_program(&mem, BASE, &[0x0013_2283]);
    mem.write(0x4001, &0x0102_0304u32.to_le_bytes()).unwrap();
    let mut cfg = Config::rv64();
    cfg.reset_vector = BASE;
    cfg.pmp_entries = 0;
    cfg.misaligned = MisalignedPolicy::Emulate;
    let mut hart = Hart::new(cfg, mem).unwrap();
    hart.state.set_x(6, 0x4000);
    step_ok(&mut hart);
    assert_eq!(hart.state.x(5), 0x0102_0304);
}

/// Write one Sv39 leaf mapping into a fresh page table
fn map_page(mem: &SparseMem, root: u64, vaddr: u64, paddr: u64, flags: EntryFlags) {
    let vpn = [
        (vaddr >> 12) & 0x1ff,
        (vaddr >> 21) & 0x1ff,
        (vaddr >> 30) & 0x1ff,
    ];
    // two levels of pointers rooted at `root`, tables at fixed offsets
    let l1 = root + 0x1000;
    let l0 = root + 0x2000;
    let entry = |target: u64, flags: u64| ((target >> 12) << 10) | flags;
    mem.write(root + vpn[2] * 8, &entry(l1, 1).to_le_bytes()).unwrap();
    mem.write(l1 + vpn[1] * 8, &entry(l0, 1).to_le_bytes()).unwrap();
    mem.write(
        l0 + vpn[0] * 8,
        &entry(paddr, flags.bits() | 1).to_le_bytes(),
    )
    .unwrap();
}

#[test]
fn test_sv39_translation_and_sfence() {
    // lw x5, 0(x6) from S-mode through an Sv39 mapping
    let (mut hart, mem) = machine(&[0x0003_2283, 0x0003_2283]);
    let root = 0x10_0000u64;
    map_page(
        &mem,
        root,
        0x4000_0000,
        0x5000,
        EntryFlags::Read | EntryFlags::Write | EntryFlags::Accessed | EntryFlags::Dirty,
    );
    mem.write(0x5008, &77u32.to_le_bytes()).unwrap();
    // M-mode runs the program untranslated; MPRV redirects data accesses
    let mut mstatus = hart.csrs.mstatus();
    mstatus.set(MstatusFlags::MPRV, true);
    mstatus.set_mpp(1);
    hart.csrs.mstatus = mstatus.0;
    hart.csrs.satp = (8u64 << 60) | (root >> 12);
    hart.state.set_x(6, 0x4000_0008);
    step_ok(&mut hart);
    assert_eq!(hart.state.x(5), 77);

    // after remapping, a stale translation may be served until SFENCE.VMA
    map_page(
        &mem,
        root,
        0x4000_0000,
        0x6000,
        EntryFlags::Read | EntryFlags::Accessed | EntryFlags::Dirty,
    );
    mem.write(0x6008, &88u32.to_le_bytes()).unwrap();
    hart.tlbs.get_mut(crate::mem::tlb::Stage::Hs).invalidate(Some(0x4000_0008 >> 12), None);
    step_ok(&mut hart);
    assert_eq!(hart.state.x(5), 88, "invalidation exposes the new mapping");
}

#[test]
fn test_page_fault_without_a_bit() {
    let mem = SparseMem::shared(1 << 24);
    load_program(&mem, BASE, &[0x0003_2283]);
    let mut cfg = Config::rv64();
    cfg.reset_vector = BASE;
    cfg.pmp_entries = 0;
    cfg.update_pte_a_d = false;
    let mut hart = Hart::new(cfg, mem.clone()).unwrap();
    let root = 0x10_0000u64;
    map_page(&mem, root, 0x4000_0000, 0x5000, EntryFlags::Read);
    let mut mstatus = hart.csrs.mstatus();
    mstatus.set(MstatusFlags::MPRV, true);
    mstatus.set_mpp(1);
    hart.csrs.mstatus = mstatus.0;
    hart.csrs.satp = (8u64 << 60) | (root >> 12);
    hart.state.set_x(6, 0x4000_0000);
    assert_eq!(hart.step(), StepOutcome::Trapped);
    assert_eq!(hart.csrs.mcause, 13, "clear A bit faults when updating is off");
}

#[test]
fn test_vadd_masked_with_tail() {
    // vsetvli x1, x0, e32,m1,ta,ma (vtypei 0xd0) then vadd.vv v1, v3, v2, v0.t
    let word = 0x0d00_70d7;
    let (mut hart, _) = machine(&[word, 0x0021_80d7]);
    step_ok(&mut hart);
    assert_eq!(hart.csrs.vl, 4);
    for idx in 0..4 {
        crate::vector::set_elem(&mut hart, 2, idx, 32, 10 + idx);
        crate::vector::set_elem(&mut hart, 3, idx, 32, 100);
        crate::vector::set_elem(&mut hart, 1, idx, 32, 7);
    }
    // mask selects elements 0 and 2
    hart.state.vreg[0] = 0b0101;
    step_ok(&mut hart);
    assert_eq!(crate::vector::get_elem(&hart, 1, 0, 32), 110);
    assert_eq!(
        crate::vector::get_elem(&hart, 1, 1, 32),
        0xffff_ffff,
        "inactive element filled with ones under vma"
    );
    assert_eq!(crate::vector::get_elem(&hart, 1, 2, 32), 112);
    assert_eq!(hart.csrs.vstart, 0);
}

#[test]
fn test_vector_vstart_at_vl_skips_body() {
    let (mut hart, _) = machine(&[0x0d00_70d7, 0x0221_80d7]);
    step_ok(&mut hart);
    for idx in 0..4 {
        crate::vector::set_elem(&mut hart, 1, idx, 32, 0x55);
        crate::vector::set_elem(&mut hart, 2, idx, 32, 1);
        crate::vector::set_elem(&mut hart, 3, idx, 32, 2);
    }
    hart.csrs.vstart = 4; // == vl
    step_ok(&mut hart);
    for idx in 0..4 {
        assert_eq!(
            crate::vector::get_elem(&hart, 1, 0, 32),
            0x55,
            "body skipped, active elements untouched (idx {idx})"
        );
    }
    assert_eq!(hart.csrs.vstart, 0, "vstart returns to zero");
}

#[test]
fn test_vector_load_fault_only_first() {
    // vsetvli e8,m1 over 16 elements, then vle8ff.v v4, (x10)
    let (mut hart, mem) = machine(&[0x0c00_70d7, 0x0305_0207]);
    hart.state.set_x(2, 0);
    step_ok(&mut hart);
    assert_eq!(hart.csrs.vl, 16);
    // place the data so that element 8 crosses into unmapped space
    let edge = (1 << 24) - 8;
    mem.write(edge, &[9u8; 8]).unwrap();
    hart.state.set_x(10, edge);
    assert_eq!(hart.step(), StepOutcome::Executed, "no trap is raised");
    assert_eq!(hart.csrs.vl, 8, "vl truncated at the faulting element");
    assert_eq!(crate::vector::get_elem(&hart, 4, 0, 8), 9);
}

#[test]
fn test_vector_reduction() {
    // vsetvli e32,m1 then vredsum.vs v1, v2, v3
    let (mut hart, _) = machine(&[0x0d00_70d7, 0x0221_a0d7]);
    step_ok(&mut hart);
    for idx in 0..4 {
        crate::vector::set_elem(&mut hart, 2, idx, 32, idx + 1);
    }
    crate::vector::set_elem(&mut hart, 3, 0, 32, 100);
    step_ok(&mut hart);
    assert_eq!(
        crate::vector::get_elem(&hart, 1, 0, 32),
        110,
        "100 + 1 + 2 + 3 + 4"
    );
}

#[test]
fn test_cbo_zero() {
    // cbo.zero (x6)
    let (mut hart, mem) = machine(&[0x0043_200f]);
    mem.write(0x4000, &[0xaa; 64]).unwrap();
    hart.csrs.menvcfg = EnvCfgFlags::CBZE.bits();
    hart.state.set_x(6, 0x4010);
    step_ok(&mut hart);
    let mut buf = [0u8; 64];
    mem.read(0x4000, &mut buf).unwrap();
    assert_eq!(buf, [0u8; 64], "the whole aligned line is zeroed");
}

#[test]
fn test_cbo_gating() {
    let (mut hart, _) = machine(&[0x0043_200f]);
    hart.state.mode = PrivilegeMode::Supervisor;
    hart.state.set_x(6, 0x4000);
    // menvcfg.CBZE is clear, so S-mode use is illegal
    assert_eq!(hart.step(), StepOutcome::Trapped);
    assert_eq!(hart.csrs.mcause, 2);
}

#[test]
fn test_interrupt_preempts_at_boundary() {
    let (mut hart, _) = machine(&[0x0010_0093, 0x0010_0093]);
    let mut mstatus = hart.csrs.mstatus();
    mstatus.set(MstatusFlags::MIE, true);
    hart.csrs.mstatus = mstatus.0;
    hart.csrs.mie = riscv::csr::InterruptBits::MTIP.bits();
    hart.csrs.mtvec = 0x101; // vectored
    step_ok(&mut hart);
    hart.update_interrupt(riscv::trap::Interrupt::MachineTimer, true);
    assert_eq!(hart.step(), StepOutcome::Trapped);
    assert_eq!(hart.csrs.mcause, (1 << 63) | 7);
    assert_eq!(hart.state.pc, 0x100 + 4 * 7, "vectored interrupt entry");
}
