//! Scalar floating point encodings

use crate::info::{InstrInfo, Op, RegDesc};
use crate::{funct3, funct7, rd, rs1, rs2, rs3, DecodeCtx};
use riscv::fp::RmDesc;
use riscv::isa::Architecture;

/// Format field of an OP-FP instruction: operand width and the feature that
/// provides arithmetic on it; binary128 is unsupported and stays illegal
fn fmt(code: u32) -> Option<(u32, Architecture)> {
    match code & 0b11 {
        0b00 => Some((32, Architecture::F)),
        0b01 => Some((64, Architecture::D)),
        0b10 => Some((16, Architecture::ZFH)),
        _ => None,
    }
}

pub(crate) fn madd(info: &mut InstrInfo, word: u32, _ctx: &DecodeCtx) {
    let Some((bits, arch)) = fmt(word >> 25) else {
        return;
    };
    info.op = match word & 0x7f {
        0x43 => Op::Fmadd,
        0x47 => Op::Fmsub,
        0x4b => Op::Fnmsub,
        _ => Op::Fnmadd,
    };
    info.arch = arch;
    info.r[0] = RegDesc::freg(rd(word), bits);
    info.r[1] = RegDesc::freg(rs1(word), bits);
    info.r[2] = RegDesc::freg(rs2(word), bits);
    info.r[3] = RegDesc::freg(rs3(word), bits);
    info.rm = RmDesc::from_field(funct3(word));
}

pub(crate) fn op_fp(info: &mut InstrInfo, word: u32, ctx: &DecodeCtx) {
    let f7 = funct7(word);
    let Some((bits, arch)) = fmt(f7) else {
        return;
    };
    let f3 = funct3(word);
    let x = ctx.xbits();
    match f7 >> 2 {
        0b00000 | 0b00001 | 0b00010 | 0b00011 => {
            info.op = match f7 >> 2 {
                0b00000 => Op::Fadd,
                0b00001 => Op::Fsub,
                0b00010 => Op::Fmul,
                _ => Op::Fdiv,
            };
            info.arch = arch;
            info.r[0] = RegDesc::freg(rd(word), bits);
            info.r[1] = RegDesc::freg(rs1(word), bits);
            info.r[2] = RegDesc::freg(rs2(word), bits);
            info.rm = RmDesc::from_field(f3);
        }
        0b01011 if rs2(word) == 0 => {
            info.op = Op::Fsqrt;
            info.arch = arch;
            info.r[0] = RegDesc::freg(rd(word), bits);
            info.r[1] = RegDesc::freg(rs1(word), bits);
            info.rm = RmDesc::from_field(f3);
        }
        0b00100 => {
            info.op = match f3 {
                0 => Op::Fsgnj,
                1 => Op::Fsgnjn,
                2 => Op::Fsgnjx,
                _ => return,
            };
            info.arch = arch;
            info.r[0] = RegDesc::freg(rd(word), bits);
            info.r[1] = RegDesc::freg(rs1(word), bits);
            info.r[2] = RegDesc::freg(rs2(word), bits);
        }
        0b00101 => {
            info.op = match f3 {
                0 => Op::Fmin,
                1 => Op::Fmax,
                _ => return,
            };
            info.arch = arch;
            info.r[0] = RegDesc::freg(rd(word), bits);
            info.r[1] = RegDesc::freg(rs1(word), bits);
            info.r[2] = RegDesc::freg(rs2(word), bits);
        }
        0b10100 => {
            info.op = match f3 {
                2 => Op::Feq,
                1 => Op::Flt,
                0 => Op::Fle,
                _ => return,
            };
            info.arch = arch;
            info.r[0] = RegDesc::xreg(rd(word), x);
            info.r[1] = RegDesc::freg(rs1(word), bits);
            info.r[2] = RegDesc::freg(rs2(word), bits);
        }
        0b11100 if rs2(word) == 0 => {
            match f3 {
                0 => {
                    info.op = Op::FmvX;
                    // moving a half needs only Zfhmin
                    info.arch = if bits == 16 { Architecture::ZFHMIN } else { arch };
                    if bits == 64 {
                        info.arch |= Architecture::XLEN64;
                    }
                    info.r[0] = RegDesc::xreg(rd(word), x);
                    info.r[1] = RegDesc::freg(rs1(word), bits);
                }
                1 => {
                    info.op = Op::Fclass;
                    info.arch = arch;
                    info.r[0] = RegDesc::xreg(rd(word), x);
                    info.r[1] = RegDesc::freg(rs1(word), bits);
                }
                _ => {}
            }
        }
        0b11110 if rs2(word) == 0 && f3 == 0 => {
            info.op = Op::FmvF;
            info.arch = if bits == 16 { Architecture::ZFHMIN } else { arch };
            if bits == 64 {
                info.arch |= Architecture::XLEN64;
            }
            info.r[0] = RegDesc::freg(rd(word), bits);
            info.r[1] = RegDesc::xreg(rs1(word), x);
        }
        0b11000 => {
            // float to integer
            let (int_bits, uns) = match rs2(word) {
                0 => (32, false),
                1 => (32, true),
                2 if ctx.is_rv64() => (64, false),
                3 if ctx.is_rv64() => (64, true),
                _ => return,
            };
            info.op = Op::FcvtX;
            info.arch = arch;
            if int_bits == 64 {
                info.arch |= Architecture::XLEN64;
            }
            let mut dst = RegDesc::xreg(rd(word), int_bits);
            if uns {
                dst = dst.unsigned();
            }
            info.r[0] = dst;
            info.r[1] = RegDesc::freg(rs1(word), bits);
            info.rm = RmDesc::from_field(f3);
        }
        0b11010 => {
            // integer to float
            let (int_bits, uns) = match rs2(word) {
                0 => (32, false),
                1 => (32, true),
                2 if ctx.is_rv64() => (64, false),
                3 if ctx.is_rv64() => (64, true),
                _ => return,
            };
            info.op = Op::FcvtF;
            info.arch = arch;
            if int_bits == 64 {
                info.arch |= Architecture::XLEN64;
            }
            info.r[0] = RegDesc::freg(rd(word), bits);
            let mut src = RegDesc::xreg(rs1(word), int_bits);
            if uns {
                src = src.unsigned();
            }
            info.r[1] = src;
            info.rm = RmDesc::from_field(f3);
        }
        0b01000 => {
            // float to float
            let Some((src_bits, src_arch)) = fmt(rs2(word)) else {
                return;
            };
            if src_bits == bits {
                return;
            }
            info.op = Op::FcvtFF;
            // conversions touching binary16 only need Zfhmin
            info.arch = if bits == 16 || src_bits == 16 {
                Architecture::ZFHMIN | (arch | src_arch) & Architecture::D
            } else {
                arch | src_arch
            };
            info.r[0] = RegDesc::freg(rd(word), bits);
            info.r[1] = RegDesc::freg(rs1(word), src_bits);
            info.rm = RmDesc::from_field(f3);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decode, DecodeCtx};
    use riscv::isa::Xlen;

    fn ctx() -> DecodeCtx {
        DecodeCtx {
            arch: Architecture::rv64gc() | Architecture::ZFH,
            xlen: Xlen::Rv64,
        }
    }

    #[test]
    fn test_fadd_s() {
        // fadd.s f0, f1, f2, rtz
        let info = decode(0x0020_9053, 0, &ctx());
        assert_eq!(info.op, Op::Fadd);
        assert_eq!(info.r[0], RegDesc::freg(0, 32));
        assert_eq!(info.r[1], RegDesc::freg(1, 32));
        assert_eq!(info.r[2], RegDesc::freg(2, 32));
        assert_eq!(info.rm, RmDesc::Rtz);
        assert_eq!(info.arch, Architecture::F);
    }

    #[test]
    fn test_fmadd_d() {
        // fmadd.d f1, f2, f3, f4, dyn
        let info = decode(0x2231_70c3, 0, &ctx());
        assert_eq!(info.op, Op::Fmadd);
        assert_eq!(info.r[3], RegDesc::freg(4, 64));
        assert_eq!(info.rm, RmDesc::Current);
        assert_eq!(info.arch, Architecture::D);
    }

    #[test]
    fn test_fcvt() {
        // fcvt.w.s x1, f2, rtz
        let info = decode(0xc001_10d3, 0, &ctx());
        assert_eq!(info.op, Op::FcvtX);
        assert_eq!(info.r[0].bits(), 32);
        assert!(!info.r[0].is_unsigned());
        // fcvt.lu.s x1, f2, rtz
        let info = decode(0xc031_10d3, 0, &ctx());
        assert_eq!(info.r[0].bits(), 64);
        assert!(info.r[0].is_unsigned());
        // fcvt.d.s f1, f2 (widening, rm ignored)
        let info = decode(0x4201_00d3, 0, &ctx());
        assert_eq!(info.op, Op::FcvtFF);
        assert_eq!(info.r[0].bits(), 64);
        assert_eq!(info.r[1].bits(), 32);
        // fcvt.s.h needs only Zfhmin
        let info = decode(0x4021_00d3, 0, &ctx());
        assert_eq!(info.op, Op::FcvtFF);
        assert_eq!(info.arch, Architecture::ZFHMIN);
        assert_eq!(info.r[1].bits(), 16);
    }

    #[test]
    fn test_quad_is_illegal() {
        // fadd.q would be funct7 fmt 0b11
        let info = decode(0x0600_0053, 0, &ctx());
        assert!(info.is_illegal());
    }

    #[test]
    fn test_reserved_rm_decodes() {
        // fadd.s with rm=5 decodes (dispatch raises the trap)
        let info = decode(0x0020_d053, 0, &ctx());
        assert_eq!(info.op, Op::Fadd);
        assert!(info.rm.is_reserved());
    }
}
