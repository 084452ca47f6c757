//! Mask-register operations

use super::*;
use crate::morph::{EmitResult, Flow, MorphState};

pub(super) fn emit(ms: &mut MorphState) -> EmitResult {
    let ctx = vctx(ms)?;
    match ms.info.op {
        Op::Vmand | Op::Vmnand | Op::Vmandn | Op::Vmxor | Op::Vmor | Op::Vmnor | Op::Vmorn
        | Op::Vmxnor => logical(ms, ctx),
        Op::Vcpop | Op::Vfirst => scan(ms, ctx),
        Op::Vmsbf | Op::Vmsif | Op::Vmsof => set_first(ms, ctx),
        Op::Viota => iota(ms, ctx),
        Op::Vid => id(ms, ctx),
        _ => unreachable!(),
    }
}

/// The mask-to-mask logicals; always unmasked, one bit per element
fn logical(ms: &mut MorphState, ctx: VCtx) -> EmitResult {
    let dest = ms.info.r[0].index();
    let b_reg = ms.info.r[1].index();
    let a_reg = ms.info.r[2].index();
    let op = ms.info.op;
    for idx in ctx.vstart..ctx.vl {
        let a = get_mask_elem(ms.hart, a_reg, idx);
        let b = get_mask_elem(ms.hart, b_reg, idx);
        let bit = match op {
            Op::Vmand => a && b,
            Op::Vmnand => !(a && b),
            Op::Vmandn => a && !b,
            Op::Vmxor => a != b,
            Op::Vmor => a || b,
            Op::Vmnor => !(a || b),
            Op::Vmorn => a || !b,
            Op::Vmxnor => a == b,
            _ => unreachable!(),
        };
        set_mask_elem(ms.hart, dest, idx, bit);
    }
    mask_tail_fill(ms, &ctx, dest);
    complete(ms);
    Ok(Flow::Next)
}

/// vcpop.m and vfirst.m write an integer register
fn scan(ms: &mut MorphState, ctx: VCtx) -> EmitResult {
    if ctx.vstart != 0 {
        return Err(ms.illegal("mask scan with nonzero vstart"));
    }
    let src = ms.info.r[2].index();
    let mut count = 0u64;
    let mut first = -1i64;
    for idx in 0..ctx.vl {
        if !active(ms, idx) {
            continue;
        }
        if get_mask_elem(ms.hart, src, idx) {
            count += 1;
            if first < 0 {
                first = idx as i64;
            }
        }
    }
    let value = if ms.info.op == Op::Vcpop {
        count
    } else {
        first as u64
    };
    ms.set_xd(value);
    complete(ms);
    Ok(Flow::Next)
}

/// vmsbf/vmsif/vmsof: the before/including/only views of the first set bit
fn set_first(ms: &mut MorphState, ctx: VCtx) -> EmitResult {
    if ctx.vstart != 0 {
        return Err(ms.illegal("set-first with nonzero vstart"));
    }
    let dest = ms.info.r[0].index();
    let src = ms.info.r[2].index();
    if ms.info.mask.is_some() && dest == 0 {
        return Err(ms.illegal("masked destination overlaps the mask register"));
    }
    if dest == src {
        return Err(ms.illegal("set-first destination overlaps its source"));
    }
    let op = ms.info.op;
    let mut seen = false;
    for idx in 0..ctx.vl {
        if !active(ms, idx) {
            if ctx.vma && ms.hart.cfg.agnostic_ones {
                set_mask_elem(ms.hart, dest, idx, true);
            }
            continue;
        }
        let hit = get_mask_elem(ms.hart, src, idx) && !seen;
        let bit = match op {
            Op::Vmsbf => !seen && !hit,
            Op::Vmsif => !seen,
            Op::Vmsof => hit,
            _ => unreachable!(),
        };
        if hit {
            seen = true;
        }
        set_mask_elem(ms.hart, dest, idx, bit);
    }
    mask_tail_fill(ms, &ctx, dest);
    complete(ms);
    Ok(Flow::Next)
}

/// viota.m: running count of set mask bits below each element
fn iota(ms: &mut MorphState, ctx: VCtx) -> EmitResult {
    if ctx.vstart != 0 {
        return Err(ms.illegal("viota with nonzero vstart"));
    }
    let dest = ms.info.r[0].index();
    let src = ms.info.r[2].index();
    check_align(ms, dest, ctx.lmul_x8)?;
    check_mask_overlap(ms, dest)?;
    if dest == src {
        return Err(ms.illegal("viota destination overlaps its source"));
    }
    let sew = ctx.sew;
    let mut count = 0u64;
    for idx in 0..ctx.vl {
        if handle_inactive(ms, &ctx, dest, sew, idx) {
            continue;
        }
        set_elem(ms.hart, dest, idx, sew, count & crate::state::width_mask(sew));
        if get_mask_elem(ms.hart, src, idx) {
            count += 1;
        }
    }
    tail_fill(ms, &ctx, dest, sew);
    complete(ms);
    Ok(Flow::Next)
}

/// vid.v: element indices
fn id(ms: &mut MorphState, ctx: VCtx) -> EmitResult {
    let dest = ms.info.r[0].index();
    check_align(ms, dest, ctx.lmul_x8)?;
    check_mask_overlap(ms, dest)?;
    let sew = ctx.sew;
    for idx in ctx.vstart..ctx.vl {
        if handle_inactive(ms, &ctx, dest, sew, idx) {
            continue;
        }
        set_elem(ms.hart, dest, idx, sew, idx & crate::state::width_mask(sew));
    }
    tail_fill(ms, &ctx, dest, sew);
    complete(ms);
    Ok(Flow::Next)
}
