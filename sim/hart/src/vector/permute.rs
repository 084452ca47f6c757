//! Vector permutation: scalar moves, whole-register moves, slides,
//! gathers and compression

use super::*;
use crate::morph::{EmitResult, Flow, MorphState};
use crate::state::width_mask;

pub(super) fn emit(ms: &mut MorphState) -> EmitResult {
    match ms.info.op {
        Op::VmvrV => return whole_move(ms),
        _ => {}
    }
    let ctx = vctx(ms)?;
    match ms.info.op {
        Op::Vmvxs => {
            // reads element zero even when vl is zero
            let value = get_elem(ms.hart, ms.info.r[2].index(), 0, ctx.sew);
            ms.set_xd(sext(value, ctx.sew) as u64);
            complete(ms);
            Ok(Flow::Next)
        }
        Op::Vmvsx | Op::Vfmvsf => {
            let dest = ms.info.r[0].index();
            if ctx.vstart < ctx.vl {
                let value = match ms.info.op {
                    Op::Vmvsx => ms.hart.state.x(ms.info.r[1].index()),
                    _ => ms.hart.state.f(ms.info.r[1].index(), ctx.sew),
                };
                set_elem(ms.hart, dest, 0, ctx.sew, value & width_mask(ctx.sew));
                // everything above element zero is tail
                let tail_ctx = VCtx { vl: 1, ..ctx };
                tail_fill(ms, &tail_ctx, dest, ctx.sew);
            }
            complete(ms);
            Ok(Flow::Next)
        }
        Op::Vfmvfs => {
            let value = get_elem(ms.hart, ms.info.r[2].index(), 0, ctx.sew);
            let desc = ms.info.r[0];
            ms.hart.state.set_f(desc.index(), ctx.sew, value);
            ms.hart.block.clear_boxed(desc.index());
            ms.hart.dirty_fs();
            complete(ms);
            Ok(Flow::Next)
        }
        Op::Vslideup | Op::Vslide1up | Op::Vfslide1up => slide_up(ms, ctx),
        Op::Vslidedown | Op::Vslide1down | Op::Vfslide1down => slide_down(ms, ctx),
        Op::Vrgather | Op::Vrgatherei16 => gather(ms, ctx),
        Op::Vcompress => compress(ms, ctx),
        _ => unreachable!(),
    }
}

/// vmv<nr>r.v: copy whole register groups, ignoring vtype
fn whole_move(ms: &mut MorphState) -> EmitResult {
    let count = ms.info.nf as u32;
    let dest = ms.info.r[0].index();
    let src = ms.info.r[2].index();
    if dest % count != 0 || src % count != 0 {
        return Err(ms.illegal("whole-register group misaligned"));
    }
    let bytes = count as u64 * ms.hart.cfg.vlenb();
    for idx in ms.hart.csrs.vstart..bytes {
        let value = get_elem(ms.hart, src, idx, 8);
        set_elem(ms.hart, dest, idx, 8, value);
    }
    complete(ms);
    Ok(Flow::Next)
}

/// The slide amount: rs1/uimm for vslideup/down, the constant one for the
/// slide1 forms
fn slide_offset(ms: &MorphState) -> u64 {
    match ms.info.op {
        Op::Vslide1up | Op::Vslide1down | Op::Vfslide1up | Op::Vfslide1down => 1,
        _ => match src_b(ms) {
            SrcB::Scalar(value) => value,
            SrcB::Imm(imm) => imm as u64,
            SrcB::Vector(_) => unreachable!("slides take a scalar offset"),
        },
    }
}

/// The value slid into the vacated edge element of a slide1 variant
fn slide1_fill(ms: &MorphState, sew: u32) -> u64 {
    match ms.info.op {
        Op::Vfslide1up | Op::Vfslide1down => ms.hart.state.f(ms.info.r[1].index(), sew),
        _ => ms.hart.state.x(ms.info.r[1].index()) & width_mask(sew),
    }
}

fn slide_up(ms: &mut MorphState, ctx: VCtx) -> EmitResult {
    let dest = ms.info.r[0].index();
    let src = ms.info.r[2].index();
    check_align(ms, dest, ctx.lmul_x8)?;
    check_align(ms, src, ctx.lmul_x8)?;
    check_mask_overlap(ms, dest)?;
    if dest == src {
        return Err(ms.illegal("slide-up destination overlaps its source"));
    }
    let offset = slide_offset(ms);
    let sew = ctx.sew;
    let is_slide1 = matches!(ms.info.op, Op::Vslide1up | Op::Vfslide1up);
    let start = ctx.vstart.max(offset);
    for idx in start..ctx.vl {
        if handle_inactive(ms, &ctx, dest, sew, idx) {
            continue;
        }
        let value = get_elem(ms.hart, src, idx - offset, sew);
        set_elem(ms.hart, dest, idx, sew, value);
    }
    if is_slide1 && ctx.vstart == 0 && ctx.vl > 0 && !handle_inactive(ms, &ctx, dest, sew, 0) {
        set_elem(ms.hart, dest, 0, sew, slide1_fill(ms, sew));
    }
    tail_fill(ms, &ctx, dest, sew);
    complete(ms);
    Ok(Flow::Next)
}

fn slide_down(ms: &mut MorphState, ctx: VCtx) -> EmitResult {
    let dest = ms.info.r[0].index();
    let src = ms.info.r[2].index();
    check_align(ms, dest, ctx.lmul_x8)?;
    check_align(ms, src, ctx.lmul_x8)?;
    check_mask_overlap(ms, dest)?;
    let offset = slide_offset(ms);
    let sew = ctx.sew;
    let is_slide1 = matches!(ms.info.op, Op::Vslide1down | Op::Vfslide1down);
    for idx in ctx.vstart..ctx.vl {
        if handle_inactive(ms, &ctx, dest, sew, idx) {
            continue;
        }
        let from = idx.checked_add(offset);
        let value = match from {
            // reads past vlmax produce zero
            Some(from) if from < ctx.vlmax => get_elem(ms.hart, src, from, sew),
            _ => 0,
        };
        let value = if is_slide1 && idx == ctx.vl - 1 {
            slide1_fill(ms, sew)
        } else {
            value
        };
        set_elem(ms.hart, dest, idx, sew, value);
    }
    tail_fill(ms, &ctx, dest, sew);
    complete(ms);
    Ok(Flow::Next)
}

fn gather(ms: &mut MorphState, ctx: VCtx) -> EmitResult {
    let dest = ms.info.r[0].index();
    let src = ms.info.r[2].index();
    check_align(ms, dest, ctx.lmul_x8)?;
    check_align(ms, src, ctx.lmul_x8)?;
    check_mask_overlap(ms, dest)?;
    if dest == src {
        return Err(ms.illegal("gather destination overlaps its source"));
    }
    let ei16 = ms.info.op == Op::Vrgatherei16;
    let index_src = src_b(ms);
    if let SrcB::Vector(reg) = index_src {
        let idx_eew = if ei16 { 16 } else { ctx.sew };
        let idx_emul = emul_x8(&ctx, idx_eew)
            .map_err(|_| ms.illegal("gather index EMUL out of range"))?;
        check_align(ms, reg, idx_emul)?;
        if reg == dest {
            return Err(ms.illegal("gather destination overlaps its index vector"));
        }
    }
    let sew = ctx.sew;
    for idx in ctx.vstart..ctx.vl {
        if handle_inactive(ms, &ctx, dest, sew, idx) {
            continue;
        }
        let index = match &index_src {
            SrcB::Vector(reg) => {
                let idx_eew = if ei16 { 16 } else { sew };
                get_elem(ms.hart, *reg, idx, idx_eew)
            }
            SrcB::Scalar(value) => *value,
            SrcB::Imm(imm) => *imm as u64,
        };
        // out-of-range indices read as zero
        let value = if index < ctx.vlmax {
            get_elem(ms.hart, src, index, sew)
        } else {
            0
        };
        set_elem(ms.hart, dest, idx, sew, value);
    }
    tail_fill(ms, &ctx, dest, sew);
    complete(ms);
    Ok(Flow::Next)
}

/// vcompress.vm packs the elements selected by vs1 densely into vd,
/// keeping an internal write pointer
fn compress(ms: &mut MorphState, ctx: VCtx) -> EmitResult {
    if ctx.vstart != 0 {
        return Err(ms.illegal("vcompress with nonzero vstart"));
    }
    let dest = ms.info.r[0].index();
    let src = ms.info.r[2].index();
    let selector = ms.info.r[1].index();
    check_align(ms, dest, ctx.lmul_x8)?;
    check_align(ms, src, ctx.lmul_x8)?;
    if dest == src || dest == selector {
        return Err(ms.illegal("vcompress destination overlaps a source"));
    }
    let sew = ctx.sew;
    let mut write_ptr = 0u64;
    for idx in 0..ctx.vl {
        if !get_mask_elem(ms.hart, selector, idx) {
            continue;
        }
        let value = get_elem(ms.hart, src, idx, sew);
        set_elem(ms.hart, dest, write_ptr, sew, value);
        write_ptr += 1;
    }
    // everything past the packed prefix is tail
    let tail_ctx = VCtx {
        vl: write_ptr,
        ..ctx
    };
    tail_fill(ms, &tail_ctx, dest, sew);
    complete(ms);
    Ok(Flow::Next)
}
