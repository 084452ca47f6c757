//! Instruction decoder for the silikon hart simulator
//!
//! The decoder maps a 16 or 32 bit instruction word to an [`InstrInfo`]
//! record: an operation tag from a closed enumeration plus operand
//! descriptors, immediates and modifier fields.
//! Decoding is pure; the hart configuration is only consulted to resolve
//! encodings that are ambiguous between extension variants (mainly in the
//! compressed instruction space).
//!
//! Unmatched encodings decode to [`Op::Last`]; raising the Illegal
//! Instruction exception for them is the dispatcher's job, not ours.

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

mod base;
mod compressed;
mod disasm;
mod float;
mod info;
mod system;
mod vector;

pub use disasm::disassemble;
pub use info::{AqRl, CsrUpdate, FenceSet, InstrInfo, Op, RegClass, RegDesc};

use riscv::isa::{Architecture, Xlen};

/// The configuration slice the decoder needs from the hart
#[derive(Debug, Copy, Clone)]
pub struct DecodeCtx {
    /// Implemented features; used to disambiguate encodings, not to raise
    /// faults (an absent feature still decodes, the dispatcher traps)
    pub arch: Architecture,
    pub xlen: Xlen,
}

impl DecodeCtx {
    pub(crate) fn xbits(&self) -> u32 {
        self.xlen.bits()
    }

    pub(crate) fn is_rv64(&self) -> bool {
        self.xlen == Xlen::Rv64
    }
}

/// Decode one instruction word at `pc`.
///
/// `word` must hold the full 32 bits starting at `pc`; for a compressed
/// instruction only the low 16 are inspected.
pub fn decode(word: u32, pc: u64, ctx: &DecodeCtx) -> InstrInfo {
    let info = if word & 0b11 == 0b11 {
        base::decode_32(word, pc, ctx)
    } else {
        compressed::decode_16(word as u16, pc, ctx)
    };
    if info.is_illegal() {
        log::trace!("no encoding matches {:#010x} at {:#x}", word, pc);
    }
    info
}

// field extraction helpers shared by the decode modules

pub(crate) fn rd(word: u32) -> u32 {
    (word >> 7) & 0x1f
}

pub(crate) fn rs1(word: u32) -> u32 {
    (word >> 15) & 0x1f
}

pub(crate) fn rs2(word: u32) -> u32 {
    (word >> 20) & 0x1f
}

pub(crate) fn rs3(word: u32) -> u32 {
    word >> 27
}

pub(crate) fn funct3(word: u32) -> u32 {
    (word >> 12) & 0b111
}

pub(crate) fn funct7(word: u32) -> u32 {
    word >> 25
}

pub(crate) fn imm_i(word: u32) -> i64 {
    (word as i32 >> 20) as i64
}

pub(crate) fn imm_s(word: u32) -> i64 {
    let imm = ((word >> 7) & 0x1f) | ((word >> 25) << 5);
    ((imm as i32) << 20 >> 20) as i64
}

pub(crate) fn imm_b(word: u32) -> i64 {
    let imm = ((word >> 7) & 0x1e)
        | ((word >> 20) & 0x7e0)
        | ((word << 4) & 0x800)
        | ((word >> 19) & 0x1000);
    ((imm as i32) << 19 >> 19) as i64
}

pub(crate) fn imm_u(word: u32) -> i64 {
    (word & 0xffff_f000) as i32 as i64
}

pub(crate) fn imm_j(word: u32) -> i64 {
    let imm = ((word >> 20) & 0x7fe)
        | ((word >> 9) & 0x800)
        | (word & 0xf_f000)
        | ((word >> 11) & 0x10_0000);
    ((imm as i32) << 11 >> 11) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> DecodeCtx {
        DecodeCtx {
            arch: Architecture::rv64gc()
                | Architecture::V
                | Architecture::H
                | Architecture::ZBA
                | Architecture::ZBB
                | Architecture::ZBS
                | Architecture::ZICOND,
            xlen: Xlen::Rv64,
        }
    }

    #[test]
    fn test_add() {
        // add x3, x1, x2
        let info = decode(0x0020_81b3, 0x1000, &ctx());
        assert_eq!(info.op, Op::Add);
        assert_eq!(info.r[0], RegDesc::xreg(3, 64));
        assert_eq!(info.r[1], RegDesc::xreg(1, 64));
        assert_eq!(info.r[2], RegDesc::xreg(2, 64));
        assert_eq!(info.bytes, 4);
    }

    #[test]
    fn test_addw_narrows_operands() {
        // addw x3, x1, x2
        let info = decode(0x0020_81bb, 0, &ctx());
        assert_eq!(info.op, Op::Add);
        assert_eq!(info.r[0].bits(), 32);
        assert!(info.arch.contains(Architecture::XLEN64));
    }

    #[test]
    fn test_loads() {
        // lw x5, 16(x6)
        let info = decode(0x0103_2283, 0, &ctx());
        assert_eq!(info.op, Op::Load);
        assert_eq!(info.mem_bits, 32);
        assert!(!info.uns_ext);
        assert_eq!(info.imm, 16);
        // lbu x5, -1(x6)
        let info = decode(0xfff3_4283, 0, &ctx());
        assert_eq!(info.op, Op::Load);
        assert_eq!(info.mem_bits, 8);
        assert!(info.uns_ext);
        assert_eq!(info.imm, -1);
        // fld f1, 8(x2)
        let info = decode(0x0081_3087, 0, &ctx());
        assert_eq!(info.op, Op::Load);
        assert_eq!(info.r[0], RegDesc::freg(1, 64));
        assert_eq!(info.mem_bits, 64);
    }

    #[test]
    fn test_branch_target() {
        // beq x1, x2, +8
        let info = decode(0x0020_8463, 0x80000000, &ctx());
        assert_eq!(info.op, Op::Beq);
        assert_eq!(info.tgt, 0x80000008);
    }

    #[test]
    fn test_csr() {
        // csrrw x5, mstatus, x6
        let info = decode(0x3003_12f3, 0, &ctx());
        assert_eq!(info.op, Op::Csrr);
        assert_eq!(info.csr, 0x300);
        assert_eq!(info.csr_update, CsrUpdate::ReadWrite);
        // csrrsi x0, fflags, 2
        let info = decode(0x0011_6073, 0, &ctx());
        assert_eq!(info.op, Op::Csrri);
        assert_eq!(info.csr, 0x001);
        assert_eq!(info.imm, 2);
        assert_eq!(info.csr_update, CsrUpdate::ReadSet);
    }

    #[test]
    fn test_unknown_decodes_to_last() {
        let info = decode(0xffff_ffff, 0, &ctx());
        assert!(info.is_illegal());
        let info = decode(0x0000_0000, 0, &ctx());
        assert!(info.is_illegal(), "the all-zero word is a defined illegal instruction");
    }

    #[test]
    fn test_amo() {
        // amoadd.w x5, x6, (x7)
        let info = decode(0x0063_a2af, 0, &ctx());
        assert_eq!(info.op, Op::Amoadd);
        assert_eq!(info.mem_bits, 32);
        // lr.d.aq x5, (x7)
        let info = decode(0x1403_b2af, 0, &ctx());
        assert_eq!(info.op, Op::Lr);
        assert_eq!(info.mem_bits, 64);
        assert_eq!(info.aqrl, AqRl::Acquire);
    }

    #[test]
    fn test_fence() {
        // fence rw, w
        let info = decode(0x0310_000f, 0, &ctx());
        assert_eq!(info.op, Op::Fence);
        assert_eq!(info.pred, FenceSet::R | FenceSet::W);
        assert_eq!(info.succ, FenceSet::W);
    }

    #[test]
    fn test_vsetvli() {
        // vsetvli x1, x2, e32,m2,ta,ma  (vtypei = 0xd1)
        let word = 0x0d11_70d7;
        let info = decode(word, 0, &ctx());
        assert_eq!(info.op, Op::Vsetvli);
        assert_eq!(info.imm, 0xd1);
        assert_eq!(info.r[0], RegDesc::xreg(1, 64));
        assert_eq!(info.r[1], RegDesc::xreg(2, 64));
    }

    #[test]
    fn test_vadd_masked() {
        // vadd.vv v1, v2, v3, v0.t
        let info = decode(0x0021_80d7, 0, &ctx());
        assert_eq!(info.op, Op::Vadd);
        assert_eq!(info.r[0], RegDesc::vreg(1));
        assert_eq!(info.r[1], RegDesc::vreg(3));
        assert_eq!(info.r[2], RegDesc::vreg(2));
        assert_eq!(info.mask, RegDesc::vreg(0));
        // unmasked variant has the vm bit set
        let info = decode(0x0221_80d7, 0, &ctx());
        assert!(!info.mask.is_some());
    }
}
