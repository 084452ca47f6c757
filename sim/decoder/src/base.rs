//! Top level 32-bit decode: base integer, M, A and the scalar bit
//! manipulation extensions; floating point, vector and system encodings are
//! delegated to their own modules

use crate::info::{AqRl, InstrInfo, Op, RegDesc};
use crate::{float, funct3, funct7, imm_b, imm_i, imm_j, imm_s, imm_u, rd, rs1, rs2, system, vector, DecodeCtx};
use riscv::isa::Architecture;

pub(crate) fn decode_32(word: u32, pc: u64, ctx: &DecodeCtx) -> InstrInfo {
    let mut info = InstrInfo::undecoded(pc, word);
    match word & 0x7f {
        0x03 => load(&mut info, word, ctx),
        0x07 => load_fp(&mut info, word, ctx),
        0x0f => system::misc_mem(&mut info, word, ctx),
        0x13 => op_imm(&mut info, word, ctx),
        0x17 => {
            info.op = Op::Auipc;
            info.arch = Architecture::I;
            info.r[0] = RegDesc::xreg(rd(word), ctx.xbits());
            info.imm = imm_u(word);
        }
        0x1b if ctx.is_rv64() => op_imm_32(&mut info, word, ctx),
        0x23 => store(&mut info, word, ctx),
        0x27 => store_fp(&mut info, word, ctx),
        0x2f => amo(&mut info, word, ctx),
        0x33 => op(&mut info, word, ctx),
        0x37 => {
            info.op = Op::Lui;
            info.arch = Architecture::I;
            info.r[0] = RegDesc::xreg(rd(word), ctx.xbits());
            info.imm = imm_u(word);
        }
        0x3b if ctx.is_rv64() => op_32(&mut info, word, ctx),
        0x43 | 0x47 | 0x4b | 0x4f => float::madd(&mut info, word, ctx),
        0x53 => float::op_fp(&mut info, word, ctx),
        0x57 => vector::op_v(&mut info, word, ctx),
        0x63 => branch(&mut info, word, ctx),
        0x67 if funct3(word) == 0 => {
            info.op = Op::Jalr;
            info.arch = Architecture::I;
            info.r[0] = RegDesc::xreg(rd(word), ctx.xbits());
            info.r[1] = RegDesc::xreg(rs1(word), ctx.xbits());
            info.imm = imm_i(word);
        }
        0x6f => {
            info.op = Op::Jal;
            info.arch = Architecture::I;
            info.r[0] = RegDesc::xreg(rd(word), ctx.xbits());
            info.tgt = pc.wrapping_add(imm_j(word) as u64);
        }
        0x73 => system::system(&mut info, word, ctx),
        _ => {}
    }
    info
}

/// Fill in a three-register operation of the given width
fn binop(info: &mut InstrInfo, word: u32, op: Op, arch: Architecture, bits: u32) {
    info.op = op;
    info.arch = arch;
    info.r[0] = RegDesc::xreg(rd(word), bits);
    info.r[1] = RegDesc::xreg(rs1(word), bits);
    info.r[2] = RegDesc::xreg(rs2(word), bits);
}

/// Fill in a register-immediate operation of the given width
fn immop(info: &mut InstrInfo, word: u32, op: Op, arch: Architecture, bits: u32, imm: i64) {
    info.op = op;
    info.arch = arch;
    info.r[0] = RegDesc::xreg(rd(word), bits);
    info.r[1] = RegDesc::xreg(rs1(word), bits);
    info.imm = imm;
}

fn load(info: &mut InstrInfo, word: u32, ctx: &DecodeCtx) {
    let f3 = funct3(word);
    let (bits, uns, arch) = match f3 {
        0 => (8, false, Architecture::I),
        1 => (16, false, Architecture::I),
        2 => (32, false, Architecture::I),
        3 if ctx.is_rv64() => (64, false, Architecture::I | Architecture::XLEN64),
        4 => (8, true, Architecture::I),
        5 => (16, true, Architecture::I),
        6 if ctx.is_rv64() => (32, true, Architecture::I | Architecture::XLEN64),
        _ => return,
    };
    info.op = Op::Load;
    info.arch = arch;
    info.r[0] = RegDesc::xreg(rd(word), ctx.xbits());
    info.r[1] = RegDesc::xreg(rs1(word), ctx.xbits());
    info.imm = imm_i(word);
    info.mem_bits = bits;
    info.uns_ext = uns;
}

fn store(info: &mut InstrInfo, word: u32, ctx: &DecodeCtx) {
    let f3 = funct3(word);
    let (bits, arch) = match f3 {
        0 => (8, Architecture::I),
        1 => (16, Architecture::I),
        2 => (32, Architecture::I),
        3 if ctx.is_rv64() => (64, Architecture::I | Architecture::XLEN64),
        _ => return,
    };
    info.op = Op::Store;
    info.arch = arch;
    info.r[0] = RegDesc::xreg(rs2(word), ctx.xbits());
    info.r[1] = RegDesc::xreg(rs1(word), ctx.xbits());
    info.imm = imm_s(word);
    info.mem_bits = bits;
}

fn load_fp(info: &mut InstrInfo, word: u32, ctx: &DecodeCtx) {
    let (bits, arch) = match funct3(word) {
        1 => (16, Architecture::ZFHMIN),
        2 => (32, Architecture::F),
        3 => (64, Architecture::D),
        0 | 5 | 6 | 7 => return vector::load_store_v(info, word, ctx, false),
        _ => return,
    };
    info.op = Op::Load;
    info.arch = arch;
    info.r[0] = RegDesc::freg(rd(word), bits);
    info.r[1] = RegDesc::xreg(rs1(word), ctx.xbits());
    info.imm = imm_i(word);
    info.mem_bits = bits;
}

fn store_fp(info: &mut InstrInfo, word: u32, ctx: &DecodeCtx) {
    let (bits, arch) = match funct3(word) {
        1 => (16, Architecture::ZFHMIN),
        2 => (32, Architecture::F),
        3 => (64, Architecture::D),
        0 | 5 | 6 | 7 => return vector::load_store_v(info, word, ctx, true),
        _ => return,
    };
    info.op = Op::Store;
    info.arch = arch;
    info.r[0] = RegDesc::freg(rs2(word), bits);
    info.r[1] = RegDesc::xreg(rs1(word), ctx.xbits());
    info.imm = imm_s(word);
    info.mem_bits = bits;
}

fn branch(info: &mut InstrInfo, word: u32, ctx: &DecodeCtx) {
    let op = match funct3(word) {
        0 => Op::Beq,
        1 => Op::Bne,
        4 => Op::Blt,
        5 => Op::Bge,
        6 => Op::Bltu,
        7 => Op::Bgeu,
        _ => return,
    };
    info.op = op;
    info.arch = Architecture::I;
    info.r[0] = RegDesc::xreg(rs1(word), ctx.xbits());
    info.r[1] = RegDesc::xreg(rs2(word), ctx.xbits());
    info.tgt = info.pc.wrapping_add(imm_b(word) as u64);
}

fn amo(info: &mut InstrInfo, word: u32, ctx: &DecodeCtx) {
    let bits = match funct3(word) {
        2 => 32,
        3 if ctx.is_rv64() => 64,
        _ => return,
    };
    let op = match word >> 27 {
        0b00010 if rs2(word) == 0 => Op::Lr,
        0b00011 => Op::Sc,
        0b00001 => Op::Amoswap,
        0b00000 => Op::Amoadd,
        0b00100 => Op::Amoxor,
        0b01100 => Op::Amoand,
        0b01000 => Op::Amoor,
        0b10000 => Op::Amomin,
        0b10100 => Op::Amomax,
        0b11000 => Op::Amominu,
        0b11100 => Op::Amomaxu,
        _ => return,
    };
    info.op = op;
    info.arch = Architecture::A;
    if bits == 64 {
        info.arch |= Architecture::XLEN64;
    }
    info.r[0] = RegDesc::xreg(rd(word), ctx.xbits());
    info.r[1] = RegDesc::xreg(rs1(word), ctx.xbits());
    info.r[2] = RegDesc::xreg(rs2(word), ctx.xbits());
    info.mem_bits = bits;
    info.aqrl = AqRl::from_bits(word & (1 << 26) != 0, word & (1 << 25) != 0);
}

fn op_imm(info: &mut InstrInfo, word: u32, ctx: &DecodeCtx) {
    let x = ctx.xbits();
    let imm = imm_i(word);
    match funct3(word) {
        0 => immop(info, word, Op::Addi, Architecture::I, x, imm),
        2 => immop(info, word, Op::Slti, Architecture::I, x, imm),
        3 => immop(info, word, Op::Sltiu, Architecture::I, x, imm),
        4 => immop(info, word, Op::Xori, Architecture::I, x, imm),
        6 => immop(info, word, Op::Ori, Architecture::I, x, imm),
        7 => immop(info, word, Op::Andi, Architecture::I, x, imm),
        1 => {
            let shamt = shamt(word, ctx);
            match word >> 26 {
                0b000000 if shamt_ok(word, ctx) => {
                    immop(info, word, Op::Slli, Architecture::I, x, shamt)
                }
                0b001010 if shamt_ok(word, ctx) => {
                    immop(info, word, Op::Bseti, Architecture::ZBS, x, shamt)
                }
                0b010010 if shamt_ok(word, ctx) => {
                    immop(info, word, Op::Bclri, Architecture::ZBS, x, shamt)
                }
                0b011010 if shamt_ok(word, ctx) => {
                    immop(info, word, Op::Binvi, Architecture::ZBS, x, shamt)
                }
                0b011000 => {
                    let op = match rs2(word) {
                        0 => Op::Clz,
                        1 => Op::Ctz,
                        2 => Op::Cpop,
                        4 => Op::SextB,
                        5 => Op::SextH,
                        _ => return,
                    };
                    immop(info, word, op, Architecture::ZBB, x, 0);
                }
                _ => {}
            }
        }
        5 => {
            let shamt = shamt(word, ctx);
            let imm12 = (word >> 20) & 0xfff;
            // fixed-immediate Zbb encodings take priority over the shift shapes
            if imm12 == 0b0010_1000_0111 {
                return immop(info, word, Op::OrcB, Architecture::ZBB, x, 0);
            }
            let rev8_imm = if ctx.is_rv64() { 0b0110_1011_1000 } else { 0b0110_1001_1000 };
            if imm12 == rev8_imm {
                return immop(info, word, Op::Rev8, Architecture::ZBB, x, 0);
            }
            match word >> 26 {
                0b000000 if shamt_ok(word, ctx) => {
                    immop(info, word, Op::Srli, Architecture::I, x, shamt)
                }
                0b010000 if shamt_ok(word, ctx) => {
                    immop(info, word, Op::Srai, Architecture::I, x, shamt)
                }
                0b011000 if shamt_ok(word, ctx) => {
                    immop(info, word, Op::Rori, Architecture::ZBB, x, shamt)
                }
                0b010010 if shamt_ok(word, ctx) => {
                    immop(info, word, Op::Bexti, Architecture::ZBS, x, shamt)
                }
                _ => {}
            }
        }
        _ => unreachable!(),
    }
}

/// Shift amount of an immediate shift; 6 bits on RV64, 5 on RV32
fn shamt(word: u32, ctx: &DecodeCtx) -> i64 {
    let mask = if ctx.is_rv64() { 0x3f } else { 0x1f };
    ((word >> 20) & mask) as i64
}

/// On RV32, bit 25 must be clear in every immediate shift encoding
fn shamt_ok(word: u32, ctx: &DecodeCtx) -> bool {
    ctx.is_rv64() || word & (1 << 25) == 0
}

fn op_imm_32(info: &mut InstrInfo, word: u32, _ctx: &DecodeCtx) {
    let rv64 = Architecture::I | Architecture::XLEN64;
    match funct3(word) {
        0 => immop(info, word, Op::Addi, rv64, 32, imm_i(word)),
        1 => match word >> 26 {
            0b000000 if funct7(word) == 0 => {
                immop(info, word, Op::Slli, rv64, 32, ((word >> 20) & 0x1f) as i64)
            }
            0b000010 => {
                // slli.uw: zero-extends the 32-bit source into a 64-bit shift
                immop(
                    info,
                    word,
                    Op::SlliUw,
                    Architecture::ZBA | Architecture::XLEN64,
                    64,
                    ((word >> 20) & 0x3f) as i64,
                )
            }
            _ => {}
        },
        5 => match funct7(word) {
            0b0000000 => immop(info, word, Op::Srli, rv64, 32, ((word >> 20) & 0x1f) as i64),
            0b0100000 => immop(info, word, Op::Srai, rv64, 32, ((word >> 20) & 0x1f) as i64),
            0b0110000 => immop(
                info,
                word,
                Op::Rori,
                Architecture::ZBB | Architecture::XLEN64,
                32,
                ((word >> 20) & 0x1f) as i64,
            ),
            _ => {}
        },
        _ => {}
    }
}

fn op(info: &mut InstrInfo, word: u32, ctx: &DecodeCtx) {
    let x = ctx.xbits();
    let f3 = funct3(word);
    match funct7(word) {
        0b0000000 => {
            let op = match f3 {
                0 => Op::Add,
                1 => Op::Sll,
                2 => Op::Slt,
                3 => Op::Sltu,
                4 => Op::Xor,
                5 => Op::Srl,
                6 => Op::Or,
                7 => Op::And,
                _ => unreachable!(),
            };
            binop(info, word, op, Architecture::I, x);
        }
        0b0100000 => {
            let op = match f3 {
                0 => Op::Sub,
                5 => Op::Sra,
                4 => Op::Xnor,
                6 => Op::Orn,
                7 => Op::Andn,
                _ => return,
            };
            let arch = if matches!(op, Op::Sub | Op::Sra) {
                Architecture::I
            } else {
                Architecture::ZBB
            };
            binop(info, word, op, arch, x);
        }
        0b0000001 => {
            let op = match f3 {
                0 => Op::Mul,
                1 => Op::Mulh,
                2 => Op::Mulhsu,
                3 => Op::Mulhu,
                4 => Op::Div,
                5 => Op::Divu,
                6 => Op::Rem,
                7 => Op::Remu,
                _ => unreachable!(),
            };
            binop(info, word, op, Architecture::M, x);
        }
        0b0010000 => {
            let sh_n = match f3 {
                2 => 1,
                4 => 2,
                6 => 3,
                _ => return,
            };
            binop(info, word, Op::Shadd, Architecture::ZBA, x);
            info.sh_n = sh_n;
        }
        0b0110000 => {
            let op = match f3 {
                1 => Op::Rol,
                5 => Op::Ror,
                _ => return,
            };
            binop(info, word, op, Architecture::ZBB, x);
        }
        0b0000101 => {
            let (op, arch) = match f3 {
                1 => (Op::Clmul, Architecture::ZBC),
                2 => (Op::Clmulr, Architecture::ZBC),
                3 => (Op::Clmulh, Architecture::ZBC),
                4 => (Op::Min, Architecture::ZBB),
                5 => (Op::Minu, Architecture::ZBB),
                6 => (Op::Max, Architecture::ZBB),
                7 => (Op::Maxu, Architecture::ZBB),
                _ => return,
            };
            binop(info, word, op, arch, x);
        }
        0b0100100 => {
            let op = match f3 {
                1 => Op::Bclr,
                5 => Op::Bext,
                _ => return,
            };
            binop(info, word, op, Architecture::ZBS, x);
        }
        0b0010100 => {
            if f3 == 1 {
                binop(info, word, Op::Bset, Architecture::ZBS, x);
            }
        }
        0b0110100 => {
            if f3 == 1 {
                binop(info, word, Op::Binv, Architecture::ZBS, x);
            }
        }
        0b0000100 if !ctx.is_rv64() => {
            if f3 == 4 && rs2(word) == 0 {
                binop(info, word, Op::ZextH, Architecture::ZBB, x);
                info.r[2] = RegDesc::NONE;
            }
        }
        0b0000111 => {
            let op = match f3 {
                5 => Op::CzeroEqz,
                7 => Op::CzeroNez,
                _ => return,
            };
            binop(info, word, op, Architecture::ZICOND, x);
        }
        _ => {}
    }
}

fn op_32(info: &mut InstrInfo, word: u32, _ctx: &DecodeCtx) {
    let rv64 = Architecture::I | Architecture::XLEN64;
    let f3 = funct3(word);
    match funct7(word) {
        0b0000000 => {
            let op = match f3 {
                0 => Op::Add,
                1 => Op::Sll,
                5 => Op::Srl,
                _ => return,
            };
            binop(info, word, op, rv64, 32);
        }
        0b0100000 => {
            let op = match f3 {
                0 => Op::Sub,
                5 => Op::Sra,
                _ => return,
            };
            binop(info, word, op, rv64, 32);
        }
        0b0000001 => {
            let op = match f3 {
                0 => Op::Mul,
                4 => Op::Div,
                5 => Op::Divu,
                6 => Op::Rem,
                7 => Op::Remu,
                _ => return,
            };
            binop(info, word, op, Architecture::M | Architecture::XLEN64, 32);
        }
        0b0010000 => {
            // shNadd.uw: the first source is zero-extended from 32 bits
            let sh_n = match f3 {
                2 => 1,
                4 => 2,
                6 => 3,
                _ => return,
            };
            binop(info, word, Op::Shadd, Architecture::ZBA | Architecture::XLEN64, 64);
            info.sh_n = sh_n;
            info.uns_ext = true;
        }
        0b0000100 => match f3 {
            0 => {
                binop(info, word, Op::AddUw, Architecture::ZBA | Architecture::XLEN64, 64);
            }
            4 if rs2(word) == 0 => {
                binop(info, word, Op::ZextH, Architecture::ZBB | Architecture::XLEN64, 64);
                info.r[2] = RegDesc::NONE;
            }
            _ => {}
        },
        0b0110000 => {
            let op = match f3 {
                1 => Op::Rol,
                5 => Op::Ror,
                _ => return,
            };
            binop(info, word, op, Architecture::ZBB | Architecture::XLEN64, 32);
        }
        _ => {}
    }
}
