//! Integer ALU emitters: base arithmetic, the M extension and the bit
//! manipulation groups

use super::{EmitResult, Flow, MorphState};
use decoder::Op;

pub(super) fn base(ms: &mut MorphState) -> EmitResult {
    let imm = ms.imm() as u64;
    let value = match ms.info.op {
        Op::Mv => ms.src(1),
        Op::Add => ms.src(1).wrapping_add(ms.src(2)),
        Op::Sub => ms.src(1).wrapping_sub(ms.src(2)),
        Op::And => ms.src(1) & ms.src(2),
        Op::Or => ms.src(1) | ms.src(2),
        Op::Xor => ms.src(1) ^ ms.src(2),
        Op::Sll => ms.src(1) << (ms.src(2) & ms.shamt_mask()),
        Op::Srl => ms.src(1) >> (ms.src(2) & ms.shamt_mask()),
        Op::Sra => (ms.src_signed(1) >> (ms.src(2) & ms.shamt_mask())) as u64,
        Op::Slt => (ms.src_signed(1) < ms.src_signed(2)) as u64,
        Op::Sltu => (ms.src(1) < ms.src(2)) as u64,
        Op::Addi => ms.src(1).wrapping_add(imm),
        Op::Andi => ms.src(1) & imm,
        Op::Ori => ms.src(1) | imm,
        Op::Xori => ms.src(1) ^ imm,
        Op::Slti => (ms.src_signed(1) < ms.imm()) as u64,
        Op::Sltiu => (ms.src(1) < imm & ms.hart.cfg.xmask()) as u64,
        Op::Slli => ms.src(1) << (imm & ms.shamt_mask()),
        Op::Srli => ms.src(1) >> (imm & ms.shamt_mask()),
        Op::Srai => (ms.src_signed(1) >> (imm & ms.shamt_mask())) as u64,
        Op::Lui => imm,
        Op::Auipc => ms.info.pc.wrapping_add(imm),
        _ => unreachable!(),
    };
    ms.set_xd(value);
    Ok(Flow::Next)
}

pub(super) fn muldiv(ms: &mut MorphState) -> EmitResult {
    let narrow = ms.info.r[0].bits() == 32;
    let a = ms.src(1);
    let b = ms.src(2);
    let sa = ms.src_signed(1);
    let sb = ms.src_signed(2);
    let xbits = ms.hart.cfg.xbits();
    let value = match ms.info.op {
        Op::Mul => a.wrapping_mul(b),
        Op::Mulh => ((sa as i128 * sb as i128) >> xbits) as u64,
        Op::Mulhu => ((a as u128 * b as u128) >> xbits) as u64,
        Op::Mulhsu => ((sa as i128).wrapping_mul(b as i128) >> xbits) as u64,
        Op::Div => {
            if sb == 0 {
                u64::MAX
            } else if narrow && sa == i32::MIN as i64 && sb == -1 {
                sa as u64
            } else if !narrow && sa == i64::MIN && sb == -1 {
                sa as u64
            } else {
                sa.wrapping_div(sb) as u64
            }
        }
        Op::Divu => {
            if b == 0 {
                u64::MAX
            } else {
                a / b
            }
        }
        Op::Rem => {
            if sb == 0 {
                sa as u64
            } else if (narrow && sa == i32::MIN as i64 && sb == -1)
                || (!narrow && sa == i64::MIN && sb == -1)
            {
                0
            } else {
                sa.wrapping_rem(sb) as u64
            }
        }
        Op::Remu => {
            if b == 0 {
                a
            } else {
                a % b
            }
        }
        _ => unreachable!(),
    };
    ms.set_xd(value);
    Ok(Flow::Next)
}

/// Carry-less multiply of the low halves
fn clmul(a: u64, b: u64) -> u64 {
    let mut out = 0u64;
    for i in 0..64 {
        if b & (1 << i) != 0 {
            out ^= a.wrapping_shl(i);
        }
    }
    out
}

fn clmulh(a: u64, b: u64) -> u64 {
    let mut out = 0u64;
    for i in 1..64 {
        if b & (1 << i) != 0 {
            out ^= a >> (64 - i);
        }
    }
    out
}

fn clmulr(a: u64, b: u64) -> u64 {
    let mut out = 0u64;
    for i in 0..64 {
        if b & (1 << i) != 0 {
            out ^= a >> (63 - i);
        }
    }
    out
}

pub(super) fn bitmanip(ms: &mut MorphState) -> EmitResult {
    let bits = ms.info.r[0].bits();
    let xbits = ms.hart.cfg.xbits();
    let imm = ms.imm() as u64;
    let value = match ms.info.op {
        Op::Shadd => {
            // shNadd, with the .uw variant zero-extending the index
            let index = if ms.info.uns_ext {
                ms.hart.state.x(ms.info.r[1].index()) & 0xffff_ffff
            } else {
                ms.src(1)
            };
            (index << ms.info.sh_n).wrapping_add(ms.src(2))
        }
        Op::AddUw => (ms.hart.state.x(ms.info.r[1].index()) & 0xffff_ffff).wrapping_add(ms.src(2)),
        Op::SlliUw => (ms.hart.state.x(ms.info.r[1].index()) & 0xffff_ffff) << imm,
        Op::Andn => ms.src(1) & !ms.src(2),
        Op::Orn => ms.src(1) | !ms.src(2),
        Op::Xnor => !(ms.src(1) ^ ms.src(2)),
        Op::Rol | Op::Ror | Op::Rori => {
            let shamt = match ms.info.op {
                Op::Rori => imm as u32,
                _ => (ms.src(2) & ms.shamt_mask()) as u32,
            };
            if bits == 32 {
                let a = ms.src(1) as u32;
                let rotated = if ms.info.op == Op::Rol {
                    a.rotate_left(shamt)
                } else {
                    a.rotate_right(shamt)
                };
                rotated as u64
            } else if ms.info.op == Op::Rol {
                ms.src(1).rotate_left(shamt)
            } else {
                ms.src(1).rotate_right(shamt)
            }
        }
        Op::Clz => {
            if bits == 32 {
                (ms.src(1) as u32).leading_zeros() as u64
            } else {
                ms.src(1).leading_zeros() as u64
            }
        }
        Op::Ctz => {
            if bits == 32 {
                (ms.src(1) as u32).trailing_zeros() as u64
            } else {
                ms.src(1).trailing_zeros() as u64
            }
        }
        Op::Cpop => {
            if bits == 32 {
                (ms.src(1) as u32).count_ones() as u64
            } else {
                ms.src(1).count_ones() as u64
            }
        }
        Op::Min => ms.src_signed(1).min(ms.src_signed(2)) as u64,
        Op::Max => ms.src_signed(1).max(ms.src_signed(2)) as u64,
        Op::Minu => ms.src(1).min(ms.src(2)),
        Op::Maxu => ms.src(1).max(ms.src(2)),
        Op::SextB => ms.src(1) as u8 as i8 as i64 as u64,
        Op::SextH => ms.src(1) as u16 as i16 as i64 as u64,
        Op::ZextH => ms.src(1) & 0xffff,
        Op::OrcB => {
            let mut out = 0u64;
            for byte in 0..(xbits / 8) {
                if ms.src(1) >> (byte * 8) & 0xff != 0 {
                    out |= 0xffu64 << (byte * 8);
                }
            }
            out
        }
        Op::Rev8 => {
            if xbits == 32 {
                (ms.src(1) as u32).swap_bytes() as u64
            } else {
                ms.src(1).swap_bytes()
            }
        }
        Op::Clmul => clmul(ms.src(1), ms.src(2)),
        Op::Clmulh => clmulh(ms.src(1), ms.src(2)),
        Op::Clmulr => clmulr(ms.src(1), ms.src(2)),
        Op::Bclr | Op::Bclri => {
            let index = bext_index(ms, imm);
            ms.src(1) & !(1 << index)
        }
        Op::Bset | Op::Bseti => {
            let index = bext_index(ms, imm);
            ms.src(1) | (1 << index)
        }
        Op::Binv | Op::Binvi => {
            let index = bext_index(ms, imm);
            ms.src(1) ^ (1 << index)
        }
        Op::Bext | Op::Bexti => {
            let index = bext_index(ms, imm);
            (ms.src(1) >> index) & 1
        }
        Op::CzeroEqz => {
            if ms.src(2) == 0 {
                0
            } else {
                ms.src(1)
            }
        }
        Op::CzeroNez => {
            if ms.src(2) != 0 {
                0
            } else {
                ms.src(1)
            }
        }
        _ => unreachable!(),
    };
    ms.set_xd(value);
    Ok(Flow::Next)
}

/// Bit index of the single-bit instructions: rs2 or the immediate, masked
/// to the operand width
fn bext_index(ms: &MorphState, imm: u64) -> u64 {
    let index = match ms.info.op {
        Op::Bclri | Op::Bseti | Op::Binvi | Op::Bexti => imm,
        _ => ms.src(2),
    };
    index & ms.shamt_mask()
}
