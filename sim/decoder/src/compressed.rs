//! Compressed (C extension) encodings
//!
//! Every compressed instruction is an alias of a 32-bit base instruction,
//! so decoding expands it to the same operation tag with `bytes = 2` and
//! the C feature added to the requirement set.

use crate::info::{InstrInfo, Op, RegDesc};
use crate::DecodeCtx;
use riscv::isa::Architecture;

/// The register fields of the three-bit compressed formats map to x8-x15
fn creg(bits: u16) -> u32 {
    8 + (bits & 0b111) as u32
}

fn bit(word: u16, n: u32) -> u16 {
    (word >> n) & 1
}

fn sign_extend(value: u16, bits: u32) -> i64 {
    ((value as i64) << (64 - bits)) >> (64 - bits)
}

pub(crate) fn decode_16(word: u16, pc: u64, ctx: &DecodeCtx) -> InstrInfo {
    let mut info = InstrInfo::undecoded(pc, word as u32);
    info.arch = Architecture::C;
    let funct3 = word >> 13;
    match word & 0b11 {
        0b00 => quadrant0(&mut info, word, funct3, ctx),
        0b01 => quadrant1(&mut info, word, funct3, ctx),
        0b10 => quadrant2(&mut info, word, funct3, ctx),
        _ => unreachable!("32-bit encodings are handled by the caller"),
    }
    if info.op != Op::Last {
        info.arch |= Architecture::C;
    }
    info
}

fn quadrant0(info: &mut InstrInfo, word: u16, funct3: u16, ctx: &DecodeCtx) {
    let x = ctx.xbits();
    let rd_c = creg(word >> 2);
    let rs1_c = creg(word >> 7);
    match funct3 {
        0b000 => {
            // c.addi4spn
            let imm = ((bit(word, 12) as i64) << 5)
                | ((bit(word, 11) as i64) << 4)
                | ((bit(word, 10) as i64) << 9)
                | ((bit(word, 9) as i64) << 8)
                | ((bit(word, 8) as i64) << 7)
                | ((bit(word, 7) as i64) << 6)
                | ((bit(word, 6) as i64) << 2)
                | ((bit(word, 5) as i64) << 3);
            if imm == 0 {
                return;
            }
            info.op = Op::Addi;
            info.arch = Architecture::I;
            info.r[0] = RegDesc::xreg(rd_c, x);
            info.r[1] = RegDesc::xreg(2, x);
            info.imm = imm;
        }
        0b001 => {
            // c.fld
            info.op = Op::Load;
            info.arch = Architecture::D;
            info.r[0] = RegDesc::freg(rd_c, 64);
            info.r[1] = RegDesc::xreg(rs1_c, x);
            info.imm = uimm_8byte(word);
            info.mem_bits = 64;
        }
        0b010 => {
            info.op = Op::Load;
            info.arch = Architecture::I;
            info.r[0] = RegDesc::xreg(rd_c, x);
            info.r[1] = RegDesc::xreg(rs1_c, x);
            info.imm = uimm_4byte(word);
            info.mem_bits = 32;
        }
        0b011 => {
            if ctx.is_rv64() {
                // c.ld
                info.op = Op::Load;
                info.arch = Architecture::I | Architecture::XLEN64;
                info.r[0] = RegDesc::xreg(rd_c, x);
                info.mem_bits = 64;
            } else {
                // c.flw
                info.op = Op::Load;
                info.arch = Architecture::F;
                info.r[0] = RegDesc::freg(rd_c, 32);
                info.mem_bits = 32;
            }
            info.r[1] = RegDesc::xreg(rs1_c, x);
            info.imm = if ctx.is_rv64() { uimm_8byte(word) } else { uimm_4byte(word) };
        }
        0b101 => {
            info.op = Op::Store;
            info.arch = Architecture::D;
            info.r[0] = RegDesc::freg(rd_c, 64);
            info.r[1] = RegDesc::xreg(rs1_c, x);
            info.imm = uimm_8byte(word);
            info.mem_bits = 64;
        }
        0b110 => {
            info.op = Op::Store;
            info.arch = Architecture::I;
            info.r[0] = RegDesc::xreg(rd_c, x);
            info.r[1] = RegDesc::xreg(rs1_c, x);
            info.imm = uimm_4byte(word);
            info.mem_bits = 32;
        }
        0b111 => {
            if ctx.is_rv64() {
                info.op = Op::Store;
                info.arch = Architecture::I | Architecture::XLEN64;
                info.r[0] = RegDesc::xreg(rd_c, x);
                info.mem_bits = 64;
                info.imm = uimm_8byte(word);
            } else {
                info.op = Op::Store;
                info.arch = Architecture::F;
                info.r[0] = RegDesc::freg(rd_c, 32);
                info.mem_bits = 32;
                info.imm = uimm_4byte(word);
            }
            info.r[1] = RegDesc::xreg(rs1_c, x);
        }
        _ => {}
    }
}

/// The scaled offset of c.lw/c.sw/c.flw
fn uimm_4byte(word: u16) -> i64 {
    (((bit(word, 12) as i64) << 5)
        | ((bit(word, 11) as i64) << 4)
        | ((bit(word, 10) as i64) << 3)
        | ((bit(word, 6) as i64) << 2)
        | ((bit(word, 5) as i64) << 6)) as i64
}

/// The scaled offset of c.ld/c.sd/c.fld
fn uimm_8byte(word: u16) -> i64 {
    (((bit(word, 12) as i64) << 5)
        | ((bit(word, 11) as i64) << 4)
        | ((bit(word, 10) as i64) << 3)
        | ((bit(word, 6) as i64) << 7)
        | ((bit(word, 5) as i64) << 6)) as i64
}

fn quadrant1(info: &mut InstrInfo, word: u16, funct3: u16, ctx: &DecodeCtx) {
    let x = ctx.xbits();
    let rd = ((word >> 7) & 0x1f) as u32;
    let imm6 = sign_extend((bit(word, 12) << 5) | ((word >> 2) & 0x1f), 6);
    match funct3 {
        0b000 => {
            // c.nop / c.addi
            info.op = Op::Addi;
            info.arch = Architecture::I;
            info.r[0] = RegDesc::xreg(rd, x);
            info.r[1] = RegDesc::xreg(rd, x);
            info.imm = imm6;
        }
        0b001 => {
            if ctx.is_rv64() {
                // c.addiw
                if rd == 0 {
                    return;
                }
                info.op = Op::Addi;
                info.arch = Architecture::I | Architecture::XLEN64;
                info.r[0] = RegDesc::xreg(rd, 32);
                info.r[1] = RegDesc::xreg(rd, 32);
                info.imm = imm6;
            } else {
                // c.jal
                info.op = Op::Jal;
                info.arch = Architecture::I;
                info.r[0] = RegDesc::xreg(1, x);
                info.tgt = info.pc.wrapping_add(cj_target(word) as u64);
            }
        }
        0b010 => {
            // c.li
            info.op = Op::Addi;
            info.arch = Architecture::I;
            info.r[0] = RegDesc::xreg(rd, x);
            info.r[1] = RegDesc::xreg(0, x);
            info.imm = imm6;
        }
        0b011 => {
            if rd == 2 {
                // c.addi16sp
                let imm = sign_extend(
                    (bit(word, 12) << 9)
                        | (bit(word, 6) << 4)
                        | (bit(word, 5) << 6)
                        | (bit(word, 4) << 8)
                        | (bit(word, 3) << 7)
                        | (bit(word, 2) << 5),
                    10,
                );
                if imm == 0 {
                    return;
                }
                info.op = Op::Addi;
                info.arch = Architecture::I;
                info.r[0] = RegDesc::xreg(2, x);
                info.r[1] = RegDesc::xreg(2, x);
                info.imm = imm;
            } else {
                // c.lui
                if imm6 == 0 {
                    return;
                }
                info.op = Op::Lui;
                info.arch = Architecture::I;
                info.r[0] = RegDesc::xreg(rd, x);
                info.imm = imm6 << 12;
            }
        }
        0b100 => {
            let rd_c = creg(word >> 7);
            let rs2_c = creg(word >> 2);
            match (word >> 10) & 0b11 {
                0b00 => {
                    // c.srli
                    let shamt = (bit(word, 12) << 5) | ((word >> 2) & 0x1f);
                    if !ctx.is_rv64() && shamt >= 32 {
                        return;
                    }
                    info.op = Op::Srli;
                    info.arch = Architecture::I;
                    info.r[0] = RegDesc::xreg(rd_c, x);
                    info.r[1] = RegDesc::xreg(rd_c, x);
                    info.imm = shamt as i64;
                }
                0b01 => {
                    let shamt = (bit(word, 12) << 5) | ((word >> 2) & 0x1f);
                    if !ctx.is_rv64() && shamt >= 32 {
                        return;
                    }
                    info.op = Op::Srai;
                    info.arch = Architecture::I;
                    info.r[0] = RegDesc::xreg(rd_c, x);
                    info.r[1] = RegDesc::xreg(rd_c, x);
                    info.imm = shamt as i64;
                }
                0b10 => {
                    info.op = Op::Andi;
                    info.arch = Architecture::I;
                    info.r[0] = RegDesc::xreg(rd_c, x);
                    info.r[1] = RegDesc::xreg(rd_c, x);
                    info.imm = imm6;
                }
                0b11 => {
                    let wide = bit(word, 12) == 1;
                    let (op, bits, arch) = match ((word >> 5) & 0b11, wide) {
                        (0b00, false) => (Op::Sub, x, Architecture::I),
                        (0b01, false) => (Op::Xor, x, Architecture::I),
                        (0b10, false) => (Op::Or, x, Architecture::I),
                        (0b11, false) => (Op::And, x, Architecture::I),
                        (0b00, true) if ctx.is_rv64() => {
                            (Op::Sub, 32, Architecture::I | Architecture::XLEN64)
                        }
                        (0b01, true) if ctx.is_rv64() => {
                            (Op::Add, 32, Architecture::I | Architecture::XLEN64)
                        }
                        _ => return,
                    };
                    info.op = op;
                    info.arch = arch;
                    info.r[0] = RegDesc::xreg(rd_c, bits);
                    info.r[1] = RegDesc::xreg(rd_c, bits);
                    info.r[2] = RegDesc::xreg(rs2_c, bits);
                }
                _ => unreachable!(),
            }
        }
        0b101 => {
            info.op = Op::Jal;
            info.arch = Architecture::I;
            info.r[0] = RegDesc::xreg(0, x);
            info.tgt = info.pc.wrapping_add(cj_target(word) as u64);
        }
        0b110 | 0b111 => {
            let rs1_c = creg(word >> 7);
            let imm = sign_extend(
                (bit(word, 12) << 8)
                    | (bit(word, 11) << 4)
                    | (bit(word, 10) << 3)
                    | (bit(word, 6) << 7)
                    | (bit(word, 5) << 6)
                    | (bit(word, 4) << 2)
                    | (bit(word, 3) << 1)
                    | (bit(word, 2) << 5),
                9,
            );
            info.op = if funct3 == 0b110 { Op::Beq } else { Op::Bne };
            info.arch = Architecture::I;
            info.r[0] = RegDesc::xreg(rs1_c, x);
            info.r[1] = RegDesc::xreg(0, x);
            info.tgt = info.pc.wrapping_add(imm as u64);
        }
        _ => unreachable!(),
    }
}

/// The sign-extended target offset of c.j/c.jal
fn cj_target(word: u16) -> i64 {
    sign_extend(
        (bit(word, 12) << 11)
            | (bit(word, 11) << 4)
            | (bit(word, 10) << 9)
            | (bit(word, 9) << 8)
            | (bit(word, 8) << 10)
            | (bit(word, 7) << 6)
            | (bit(word, 6) << 7)
            | (bit(word, 5) << 3)
            | (bit(word, 4) << 2)
            | (bit(word, 3) << 1)
            | (bit(word, 2) << 5),
        12,
    )
}

fn quadrant2(info: &mut InstrInfo, word: u16, funct3: u16, ctx: &DecodeCtx) {
    let x = ctx.xbits();
    let rd = ((word >> 7) & 0x1f) as u32;
    let rs2 = ((word >> 2) & 0x1f) as u32;
    match funct3 {
        0b000 => {
            let shamt = (bit(word, 12) << 5) | ((word >> 2) & 0x1f);
            if !ctx.is_rv64() && shamt >= 32 {
                return;
            }
            info.op = Op::Slli;
            info.arch = Architecture::I;
            info.r[0] = RegDesc::xreg(rd, x);
            info.r[1] = RegDesc::xreg(rd, x);
            info.imm = shamt as i64;
        }
        0b001 => {
            // c.fldsp
            info.op = Op::Load;
            info.arch = Architecture::D;
            info.r[0] = RegDesc::freg(rd, 64);
            info.r[1] = RegDesc::xreg(2, x);
            info.imm = ldsp_uimm(word);
            info.mem_bits = 64;
        }
        0b010 => {
            if rd == 0 {
                return;
            }
            info.op = Op::Load;
            info.arch = Architecture::I;
            info.r[0] = RegDesc::xreg(rd, x);
            info.r[1] = RegDesc::xreg(2, x);
            info.imm = lwsp_uimm(word);
            info.mem_bits = 32;
        }
        0b011 => {
            if ctx.is_rv64() {
                if rd == 0 {
                    return;
                }
                info.op = Op::Load;
                info.arch = Architecture::I | Architecture::XLEN64;
                info.r[0] = RegDesc::xreg(rd, x);
                info.mem_bits = 64;
                info.imm = ldsp_uimm(word);
            } else {
                info.op = Op::Load;
                info.arch = Architecture::F;
                info.r[0] = RegDesc::freg(rd, 32);
                info.mem_bits = 32;
                info.imm = lwsp_uimm(word);
            }
            info.r[1] = RegDesc::xreg(2, x);
        }
        0b100 => {
            if bit(word, 12) == 0 {
                if rs2 == 0 {
                    // c.jr
                    if rd == 0 {
                        return;
                    }
                    info.op = Op::Jalr;
                    info.arch = Architecture::I;
                    info.r[0] = RegDesc::xreg(0, x);
                    info.r[1] = RegDesc::xreg(rd, x);
                } else {
                    // c.mv
                    info.op = Op::Mv;
                    info.arch = Architecture::I;
                    info.r[0] = RegDesc::xreg(rd, x);
                    info.r[1] = RegDesc::xreg(rs2, x);
                }
            } else if rs2 == 0 {
                if rd == 0 {
                    info.op = Op::Ebreak;
                    info.arch = Architecture::I;
                } else {
                    // c.jalr
                    info.op = Op::Jalr;
                    info.arch = Architecture::I;
                    info.r[0] = RegDesc::xreg(1, x);
                    info.r[1] = RegDesc::xreg(rd, x);
                }
            } else {
                // c.add
                info.op = Op::Add;
                info.arch = Architecture::I;
                info.r[0] = RegDesc::xreg(rd, x);
                info.r[1] = RegDesc::xreg(rd, x);
                info.r[2] = RegDesc::xreg(rs2, x);
            }
        }
        0b101 => {
            info.op = Op::Store;
            info.arch = Architecture::D;
            info.r[0] = RegDesc::freg(rs2, 64);
            info.r[1] = RegDesc::xreg(2, x);
            info.imm = sdsp_uimm(word);
            info.mem_bits = 64;
        }
        0b110 => {
            info.op = Op::Store;
            info.arch = Architecture::I;
            info.r[0] = RegDesc::xreg(rs2, x);
            info.r[1] = RegDesc::xreg(2, x);
            info.imm = swsp_uimm(word);
            info.mem_bits = 32;
        }
        0b111 => {
            if ctx.is_rv64() {
                info.op = Op::Store;
                info.arch = Architecture::I | Architecture::XLEN64;
                info.r[0] = RegDesc::xreg(rs2, x);
                info.mem_bits = 64;
                info.imm = sdsp_uimm(word);
            } else {
                info.op = Op::Store;
                info.arch = Architecture::F;
                info.r[0] = RegDesc::freg(rs2, 32);
                info.mem_bits = 32;
                info.imm = swsp_uimm(word);
            }
            info.r[1] = RegDesc::xreg(2, x);
        }
        _ => unreachable!(),
    }
}

fn lwsp_uimm(word: u16) -> i64 {
    (((bit(word, 12) as i64) << 5)
        | ((bit(word, 6) as i64) << 4)
        | ((bit(word, 5) as i64) << 3)
        | ((bit(word, 4) as i64) << 2)
        | ((bit(word, 3) as i64) << 7)
        | ((bit(word, 2) as i64) << 6)) as i64
}

fn ldsp_uimm(word: u16) -> i64 {
    (((bit(word, 12) as i64) << 5)
        | ((bit(word, 6) as i64) << 4)
        | ((bit(word, 5) as i64) << 3)
        | ((bit(word, 4) as i64) << 8)
        | ((bit(word, 3) as i64) << 7)
        | ((bit(word, 2) as i64) << 6)) as i64
}

fn swsp_uimm(word: u16) -> i64 {
    (((bit(word, 12) as i64) << 5)
        | ((bit(word, 11) as i64) << 4)
        | ((bit(word, 10) as i64) << 3)
        | ((bit(word, 9) as i64) << 2)
        | ((bit(word, 8) as i64) << 7)
        | ((bit(word, 7) as i64) << 6)) as i64
}

fn sdsp_uimm(word: u16) -> i64 {
    (((bit(word, 12) as i64) << 5)
        | ((bit(word, 11) as i64) << 4)
        | ((bit(word, 10) as i64) << 3)
        | ((bit(word, 9) as i64) << 8)
        | ((bit(word, 8) as i64) << 7)
        | ((bit(word, 7) as i64) << 6)) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode;
    use riscv::isa::Xlen;

    fn ctx() -> DecodeCtx {
        DecodeCtx {
            arch: Architecture::rv64gc(),
            xlen: Xlen::Rv64,
        }
    }

    #[test]
    fn test_c_addi() {
        // c.addi x8, -1: 000 1 01000 11111 01
        let word = 0b000_1_01000_11111_01;
        let info = decode(word as u32, 0, &ctx());
        assert_eq!(info.op, Op::Addi);
        assert_eq!(info.bytes, 2);
        assert_eq!(info.imm, -1);
        assert_eq!(info.r[0].index(), 8);
        assert!(info.arch.contains(Architecture::C));
    }

    #[test]
    fn test_c_lw() {
        // c.lw x9, 4(x10): 010 010 010 10 001 00
        let word = 0b010_000_010_10_001_00u16;
        let info = decode(word as u32, 0, &ctx());
        assert_eq!(info.op, Op::Load);
        assert_eq!(info.mem_bits, 32);
        assert_eq!(info.r[0].index(), 9);
        assert_eq!(info.r[1].index(), 10);
        assert_eq!(info.imm, 4);
    }

    #[test]
    fn test_c_jr() {
        // c.jr x1: 100 0 00001 00000 10
        let word = 0b100_0_00001_00000_10u16;
        let info = decode(word as u32, 0, &ctx());
        assert_eq!(info.op, Op::Jalr);
        assert_eq!(info.r[0].index(), 0);
        assert_eq!(info.r[1].index(), 1);
    }

    #[test]
    fn test_c_subw() {
        // c.subw x8, x9: 100 1 11 000 00 001 01
        let word = 0b100_1_11_000_00_001_01u16;
        let info = decode(word as u32, 0, &ctx());
        assert_eq!(info.op, Op::Sub);
        assert_eq!(info.r[0].bits(), 32);
        assert_eq!(info.r[2].index(), 9);
    }

    #[test]
    fn test_c_illegal() {
        let info = decode(0, 0, &ctx());
        assert!(info.is_illegal());
    }
}
