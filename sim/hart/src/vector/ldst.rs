//! Vector loads and stores
//!
//! All variants funnel through one element loop that computes per-element
//! addresses: unit-stride and strided accesses scale the element index,
//! indexed accesses add an offset vector element, and segmented accesses
//! repeat per field.
//! A trap raised after element zero either truncates `vl` (fault-only-first
//! loads) or records the element index in `vstart` so the instruction can
//! resume precisely after the trap returns.

use super::*;
use crate::morph::{EmitResult, Flow, MorphState};
use crate::trap::Trap;

pub(super) fn emit(ms: &mut MorphState) -> EmitResult {
    let store = matches!(
        ms.info.op,
        Op::VStore | Op::VStoreStrided | Op::VStoreIndexed
    );
    if ms.info.whole {
        return whole(ms, store);
    }
    let ctx = vctx(ms)?;
    if ms.info.mask_ls {
        return mask_ldst(ms, ctx, store);
    }

    let indexed = matches!(ms.info.op, Op::VLoadIndexed | Op::VStoreIndexed);
    let data_eew = if indexed { ctx.sew } else { ms.info.eew };
    let data_emul = emul_x8(&ctx, data_eew)
        .map_err(|_| ms.illegal("vector access EMUL out of range"))?;
    let nf = ms.info.nf as u64;
    let group_regs = (data_emul / 8).max(1) as u64;
    if nf * group_regs > 8 {
        return Err(ms.illegal("segment register group exceeds eight registers"));
    }
    let data_reg = ms.info.r[0].index();
    check_align(ms, data_reg, data_emul)?;
    if data_reg as u64 + nf * group_regs > 32 {
        return Err(ms.illegal("segment register group exceeds the register file"));
    }
    if !store {
        check_mask_overlap(ms, data_reg)?;
    }

    let index_reg = if indexed {
        let idx_emul = emul_x8(&ctx, ms.info.eew)
            .map_err(|_| ms.illegal("index EMUL out of range"))?;
        let reg = ms.info.r[2].index();
        check_align(ms, reg, idx_emul)?;
        if !store {
            check_overlap(ms, data_reg, data_emul, reg, idx_emul)?;
        }
        Some(reg)
    } else {
        None
    };

    let base = ms.hart.state.x(ms.info.r[1].index());
    let elem_bytes = data_eew as u64 / 8;
    let stride = match ms.info.op {
        Op::VLoadStrided | Op::VStoreStrided => ms.hart.state.x(ms.info.r[2].index()),
        // unit stride packs the fields of all segments back to back
        Op::VLoad | Op::VStore => nf * elem_bytes,
        _ => 0,
    };
    let ff = ms.info.ff && ms.hart.cfg.fault_only_first;

    let mut idx = ctx.vstart;
    while idx < ctx.vl {
        if handle_inactive_segments(ms, &ctx, data_reg, data_eew, nf, group_regs, idx, store) {
            idx += 1;
            continue;
        }
        let elem_base = match index_reg {
            Some(reg) => base.wrapping_add(get_elem(ms.hart, reg, idx, ms.info.eew)),
            None => base.wrapping_add(idx * stride),
        };
        for seg in 0..nf {
            let addr = elem_base.wrapping_add(seg * elem_bytes);
            let reg = data_reg + (seg * group_regs) as u32;
            let result = if store {
                let value = get_elem(ms.hart, reg, idx, data_eew);
                ms.hart.store_data(addr, data_eew / 8, value)
            } else {
                ms.hart
                    .load_data(addr, data_eew / 8)
                    .map(|value| set_elem(ms.hart, reg, idx, data_eew, value))
            };
            if let Err(trap) = result {
                return element_fault(ms, trap, idx, ff);
            }
        }
        idx += 1;
    }

    if !store {
        // vl may have been truncated by a fault-only-first element
        let ctx = VCtx {
            vl: ms.hart.csrs.vl,
            ..ctx
        };
        for seg in 0..nf {
            tail_fill(ms, &ctx, data_reg + (seg * group_regs) as u32, data_eew);
        }
    }
    complete(ms);
    Ok(Flow::Stop)
}

/// Inactive-element handling for every segment destination
fn handle_inactive_segments(
    ms: &mut MorphState,
    ctx: &VCtx,
    data_reg: u32,
    data_eew: u32,
    nf: u64,
    group_regs: u64,
    idx: u64,
    store: bool,
) -> bool {
    if active(ms, idx) {
        return false;
    }
    if !store && ctx.vma && ms.hart.cfg.agnostic_ones {
        for seg in 0..nf {
            set_elem(ms.hart, data_reg + (seg * group_regs) as u32, idx, data_eew, u64::MAX);
        }
    }
    true
}

/// A trap raised while processing element `idx`
fn element_fault(ms: &mut MorphState, trap: Trap, idx: u64, ff: bool) -> EmitResult {
    if ff && idx > 0 {
        // fault-only-first: commit the elements before the fault and
        // shrink vl instead of trapping
        log::trace!("fault-only-first truncates vl to {}", idx);
        ms.hart.csrs.vl = idx;
        ms.hart.block.invalidate_vtype();
        complete(ms);
        return Ok(Flow::Stop);
    }
    // precise resume point for the trap handler
    ms.hart.csrs.vstart = idx;
    ms.hart.block.vstart_zero = false;
    Err(trap)
}

/// vlm.v/vsm.v: one mask-layout register, EEW 8, ceil(vl/8) bytes
fn mask_ldst(ms: &mut MorphState, ctx: VCtx, store: bool) -> EmitResult {
    let reg = ms.info.r[0].index();
    let base = ms.hart.state.x(ms.info.r[1].index());
    let bytes = ctx.vl.div_ceil(8);
    let start = ctx.vstart;
    for idx in start..bytes {
        let addr = base.wrapping_add(idx);
        let result = if store {
            let value = get_elem(ms.hart, reg, idx, 8);
            ms.hart.store_data(addr, 1, value)
        } else {
            ms.hart
                .load_data(addr, 1)
                .map(|value| set_elem(ms.hart, reg, idx, 8, value))
        };
        if let Err(trap) = result {
            return element_fault(ms, trap, idx, false);
        }
    }
    if !store && ms.hart.cfg.agnostic_ones {
        // the rest of the register is tail, always agnostic
        for idx in bytes..ms.hart.cfg.vlenb() {
            set_elem(ms.hart, reg, idx, 8, 0xff);
        }
    }
    complete(ms);
    Ok(Flow::Stop)
}

/// Whole-register loads and stores ignore vtype; the element count is
/// taken from the encoding alone
fn whole(ms: &mut MorphState, store: bool) -> EmitResult {
    let reg = ms.info.r[0].index();
    let count = ms.info.nf as u32;
    if !count.is_power_of_two() || reg % count != 0 {
        return Err(ms.illegal("whole-register group misaligned"));
    }
    let eew = if store { 8 } else { ms.info.eew };
    let base = ms.hart.state.x(ms.info.r[1].index());
    let elems = count as u64 * ms.hart.cfg.vlen as u64 / eew as u64;
    let bytes = eew / 8;
    for idx in ms.hart.csrs.vstart..elems {
        let addr = base.wrapping_add(idx * bytes as u64);
        let result = if store {
            let value = get_elem(ms.hart, reg, idx, eew);
            ms.hart.store_data(addr, bytes, value)
        } else {
            ms.hart
                .load_data(addr, bytes)
                .map(|value| set_elem(ms.hart, reg, idx, eew, value))
        };
        if let Err(trap) = result {
            return element_fault(ms, trap, idx, false);
        }
    }
    complete(ms);
    Ok(Flow::Stop)
}
