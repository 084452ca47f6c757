//! System, CSR, fence and cache-management encodings

use crate::info::{CsrUpdate, FenceSet, InstrInfo, Op, RegDesc};
use crate::{funct3, funct7, rd, rs1, rs2, DecodeCtx};
use riscv::isa::Architecture;

pub(crate) fn system(info: &mut InstrInfo, word: u32, ctx: &DecodeCtx) {
    match funct3(word) {
        0 => privileged(info, word, ctx),
        1 | 2 | 3 => csr(info, word, ctx, false),
        5 | 6 | 7 => csr(info, word, ctx, true),
        4 => hypervisor_ldst(info, word, ctx),
        _ => {}
    }
}

fn privileged(info: &mut InstrInfo, word: u32, ctx: &DecodeCtx) {
    if rd(word) != 0 {
        return;
    }
    match funct7(word) {
        0b0000000 => {
            if rs1(word) != 0 {
                return;
            }
            match rs2(word) {
                0 => {
                    info.op = Op::Ecall;
                    info.arch = Architecture::I;
                }
                1 => {
                    info.op = Op::Ebreak;
                    info.arch = Architecture::I;
                }
                _ => {}
            }
        }
        0b0001000 if rs1(word) == 0 => match rs2(word) {
            2 => {
                info.op = Op::Sret;
                info.arch = Architecture::S;
            }
            5 => {
                info.op = Op::Wfi;
                info.arch = Architecture::I;
            }
            _ => {}
        },
        0b0011000 if rs1(word) == 0 && rs2(word) == 2 => {
            info.op = Op::Mret;
            info.arch = Architecture::I;
        }
        0b0111000 if rs1(word) == 0 && rs2(word) == 2 => {
            info.op = Op::Mnret;
            info.arch = Architecture::I;
        }
        0b0111101 if rs1(word) == 0 && rs2(word) == 2 => {
            info.op = Op::Dret;
            info.arch = Architecture::I;
        }
        0b0001001 => fence_vma(info, word, ctx, Op::SfenceVma, Architecture::S),
        0b0001011 => fence_vma(info, word, ctx, Op::SinvalVma, Architecture::S | Architecture::SVINVAL),
        0b0001100 if rs1(word) == 0 => match rs2(word) {
            0 => {
                info.op = Op::SfenceWInval;
                info.arch = Architecture::S | Architecture::SVINVAL;
            }
            1 => {
                info.op = Op::SfenceInvalIr;
                info.arch = Architecture::S | Architecture::SVINVAL;
            }
            _ => {}
        },
        0b0010001 => fence_vma(info, word, ctx, Op::HfenceVvma, Architecture::H),
        0b0110001 => fence_vma(info, word, ctx, Op::HfenceGvma, Architecture::H),
        0b0010011 => fence_vma(
            info,
            word,
            ctx,
            Op::HfenceVvma,
            Architecture::H | Architecture::SVINVAL,
        ),
        0b0110011 => fence_vma(
            info,
            word,
            ctx,
            Op::HfenceGvma,
            Architecture::H | Architecture::SVINVAL,
        ),
        _ => {}
    }
}

fn fence_vma(info: &mut InstrInfo, word: u32, ctx: &DecodeCtx, op: Op, arch: Architecture) {
    info.op = op;
    info.arch = arch;
    info.r[1] = RegDesc::xreg(rs1(word), ctx.xbits());
    info.r[2] = RegDesc::xreg(rs2(word), ctx.xbits());
}

fn csr(info: &mut InstrInfo, word: u32, ctx: &DecodeCtx, immediate: bool) {
    info.op = if immediate { Op::Csrri } else { Op::Csrr };
    info.arch = Architecture::ZICSR;
    info.csr = ((word >> 20) & 0xfff) as u16;
    info.r[0] = RegDesc::xreg(rd(word), ctx.xbits());
    if immediate {
        info.imm = rs1(word) as i64;
    } else {
        info.r[1] = RegDesc::xreg(rs1(word), ctx.xbits());
    }
    info.csr_update = match funct3(word) & 0b11 {
        1 => CsrUpdate::ReadWrite,
        2 => CsrUpdate::ReadSet,
        3 => CsrUpdate::ReadClear,
        _ => unreachable!(),
    };
}

fn hypervisor_ldst(info: &mut InstrInfo, word: u32, ctx: &DecodeCtx) {
    let f7 = funct7(word);
    let x = ctx.xbits();
    if f7 & 1 == 0 {
        // loads: rs2 selects the width variant
        let (bits, uns, lvx) = match (f7 >> 1, rs2(word)) {
            (0b011000, 0) => (8, false, false),
            (0b011000, 1) => (8, true, false),
            (0b011001, 0) => (16, false, false),
            (0b011001, 1) => (16, true, false),
            (0b011001, 3) => (16, true, true),
            (0b011010, 0) => (32, false, false),
            (0b011010, 1) if ctx.is_rv64() => (32, true, false),
            (0b011010, 3) => (32, true, true),
            (0b011011, 0) if ctx.is_rv64() => (64, false, false),
            _ => return,
        };
        info.op = if lvx { Op::Hlvx } else { Op::Hlv };
        info.arch = Architecture::H;
        info.r[0] = RegDesc::xreg(rd(word), x);
        info.r[1] = RegDesc::xreg(rs1(word), x);
        info.mem_bits = bits;
        info.uns_ext = uns;
    } else {
        if rd(word) != 0 {
            return;
        }
        let bits = match f7 >> 1 {
            0b011000 => 8,
            0b011001 => 16,
            0b011010 => 32,
            0b011011 if ctx.is_rv64() => 64,
            _ => return,
        };
        info.op = Op::Hsv;
        info.arch = Architecture::H;
        info.r[0] = RegDesc::xreg(rs2(word), x);
        info.r[1] = RegDesc::xreg(rs1(word), x);
        info.mem_bits = bits;
    }
}

pub(crate) fn misc_mem(info: &mut InstrInfo, word: u32, ctx: &DecodeCtx) {
    match funct3(word) {
        0 => {
            // the fm field (fence.tso) adds ordering we model as a full fence
            info.op = Op::Fence;
            info.arch = Architecture::I;
            info.pred = FenceSet::from_bits_truncate(((word >> 24) & 0xf) as u8);
            info.succ = FenceSet::from_bits_truncate(((word >> 20) & 0xf) as u8);
        }
        1 => {
            info.op = Op::FenceI;
            info.arch = Architecture::ZIFENCEI;
        }
        2 => {
            if rd(word) != 0 {
                return;
            }
            let (op, arch) = match (word >> 20) & 0xfff {
                0 => (Op::CboInval, Architecture::ZICBOM),
                1 => (Op::CboClean, Architecture::ZICBOM),
                2 => (Op::CboFlush, Architecture::ZICBOM),
                4 => (Op::CboZero, Architecture::ZICBOZ),
                _ => return,
            };
            info.op = op;
            info.arch = arch;
            info.r[1] = RegDesc::xreg(rs1(word), ctx.xbits());
        }
        _ => {}
    }
}
