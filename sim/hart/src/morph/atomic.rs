//! Atomic instruction emitters
//!
//! AMOs are emitted as a single read-modify-write under the memory
//! domain's atomicity guarantee; the hart's `atomic_code` names the active
//! phase so an external bus model can arbitrate.

use super::{EmitResult, Flow, MorphState};
use crate::state::AtomicCode;
use decoder::Op;

/// Sign-extend a memory word of `bits` into a register image
fn sext(value: u64, bits: u32) -> u64 {
    let shift = 64 - bits;
    (((value << shift) as i64) >> shift) as u64
}

pub(super) fn emit(ms: &mut MorphState) -> EmitResult {
    let addr = ms.src(1);
    let bits = ms.info.mem_bits;
    let len = bits / 8;

    match ms.info.op {
        Op::Lr => {
            let value = ms.hart.lr(addr, len)?;
            ms.set_xd(sext(value, bits));
        }
        Op::Sc => {
            let value = ms.hart.state.x(ms.info.r[2].index());
            let success = ms.hart.sc(addr, len, value)?;
            ms.set_xd(if success { 0 } else { 1 });
        }
        _ => {
            let code = match ms.info.op {
                Op::Amoswap => AtomicCode::Swap,
                Op::Amoadd => AtomicCode::Add,
                Op::Amoxor => AtomicCode::Xor,
                Op::Amoand => AtomicCode::And,
                Op::Amoor => AtomicCode::Or,
                Op::Amomin => AtomicCode::Min,
                Op::Amomax => AtomicCode::Max,
                Op::Amominu => AtomicCode::Minu,
                Op::Amomaxu => AtomicCode::Maxu,
                _ => unreachable!(),
            };
            let src = ms.hart.state.x(ms.info.r[2].index());
            let op = ms.info.op;
            let old = ms.hart.amo(addr, len, code, move |mem| {
                combine(op, mem, src, bits)
            })?;
            ms.set_xd(sext(old, bits));
        }
    }
    // atomics are block boundaries: another hart may need to observe them
    Ok(Flow::Stop)
}

fn combine(op: Op, mem: u64, src: u64, bits: u32) -> u64 {
    let src = src & crate::state::width_mask(bits);
    let smem = sext(mem, bits) as i64;
    let ssrc = sext(src, bits) as i64;
    match op {
        Op::Amoswap => src,
        Op::Amoadd => mem.wrapping_add(src),
        Op::Amoxor => mem ^ src,
        Op::Amoand => mem & src,
        Op::Amoor => mem | src,
        Op::Amomin => {
            if smem <= ssrc {
                mem
            } else {
                src
            }
        }
        Op::Amomax => {
            if smem >= ssrc {
                mem
            } else {
                src
            }
        }
        Op::Amominu => mem.min(src),
        Op::Amomaxu => mem.max(src),
        _ => unreachable!(),
    }
}
