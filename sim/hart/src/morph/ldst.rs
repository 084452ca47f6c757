//! Load, store, hypervisor access and cache-management emitters

use super::{EmitResult, Flow, MorphState};
use decoder::{Op, RegClass};

/// Sign- or zero-extend a loaded value into a register image
fn extend(value: u64, bits: u32, unsigned: bool) -> u64 {
    if unsigned {
        value
    } else {
        let shift = 64 - bits;
        (((value << shift) as i64) >> shift) as u64
    }
}

pub(super) fn load_store(ms: &mut MorphState) -> EmitResult {
    let addr = ms.src(1).wrapping_add(ms.imm() as u64);
    let bits = ms.info.mem_bits;
    let len = bits / 8;
    let is_store = ms.info.op == Op::Store;
    match (is_store, ms.info.r[0].class()) {
        (false, RegClass::X) => {
            let value = ms.hart.load_data(addr, len)?;
            ms.set_xd(extend(value, bits, ms.info.uns_ext));
        }
        (false, RegClass::F) => {
            let value = ms.hart.load_data(addr, len)?;
            ms.set_fd(value);
        }
        (true, RegClass::X) => {
            let value = ms.hart.state.x(ms.info.r[0].index());
            ms.hart.store_data(addr, len, value)?;
        }
        (true, RegClass::F) => {
            // stores forward the raw register bits, box included
            let value = ms.hart.state.f_raw(ms.info.r[0].index());
            ms.hart.store_data(addr, len, value)?;
        }
        _ => unreachable!(),
    }
    Ok(Flow::Next)
}

pub(super) fn hypervisor(ms: &mut MorphState) -> EmitResult {
    let addr = ms.src(1);
    let bits = ms.info.mem_bits;
    let len = bits / 8;
    match ms.info.op {
        Op::Hlv | Op::Hlvx => {
            let value = ms
                .hart
                .hyp_load(addr, len, ms.info.op == Op::Hlvx)?;
            ms.set_xd(extend(value, bits, ms.info.uns_ext));
        }
        Op::Hsv => {
            let value = ms.hart.state.x(ms.info.r[0].index());
            ms.hart.hyp_store(addr, len, value)?;
        }
        _ => unreachable!(),
    }
    Ok(Flow::Next)
}

pub(super) fn cbo(ms: &mut MorphState) -> EmitResult {
    let addr = ms.src(1);
    ms.hart.cbo(addr, ms.info.op)?;
    // a cache management operation can touch externally visible state
    Ok(Flow::Stop)
}
