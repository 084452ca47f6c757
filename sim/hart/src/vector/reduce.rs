//! Vector reductions
//!
//! A scalar accumulator is seeded from `vs1[0]`, folded over the active
//! elements of `vs2`, and written to `vd[0]`; everything above element
//! zero of the destination is tail.

use super::*;
use crate::morph::fpu::{self, fp_binop, fp_convert, FpBin};
use crate::morph::{EmitResult, Flow, MorphState};
use crate::state::width_mask;
use softfloat::Flags;

pub(super) fn emit(ms: &mut MorphState) -> EmitResult {
    let ctx = vctx(ms)?;
    if ctx.vstart != 0 {
        return Err(ms.illegal("reduction with nonzero vstart"));
    }
    let op = ms.info.op;
    let widening = matches!(
        op,
        Op::Vwredsumu | Op::Vwredsum | Op::Vfwredusum | Op::Vfwredosum
    );
    let acc_eew = if widening { ctx.sew * 2 } else { ctx.sew };
    if acc_eew > ms.hart.cfg.elen {
        return Err(ms.illegal("reduction accumulator exceeds ELEN"));
    }
    let src = ms.info.r[2].index();
    check_align(ms, src, ctx.lmul_x8)?;

    let float = matches!(
        op,
        Op::Vfredusum | Op::Vfredosum | Op::Vfredmin | Op::Vfredmax | Op::Vfwredusum
            | Op::Vfwredosum
    );
    if float {
        fp_reduce(ms, ctx, acc_eew)
    } else {
        int_reduce(ms, ctx, acc_eew)
    }
}

fn int_reduce(ms: &mut MorphState, ctx: VCtx, acc_eew: u32) -> EmitResult {
    let op = ms.info.op;
    let dest = ms.info.r[0].index();
    let seed_reg = ms.info.r[1].index();
    let src = ms.info.r[2].index();
    let sew = ctx.sew;
    let mut acc = get_elem(ms.hart, seed_reg, 0, acc_eew);
    for idx in 0..ctx.vl {
        if !active(ms, idx) {
            continue;
        }
        let elem = get_elem(ms.hart, src, idx, sew);
        acc = match op {
            Op::Vredsum => acc.wrapping_add(elem),
            Op::Vredand => acc & elem,
            Op::Vredor => acc | elem,
            Op::Vredxor => acc ^ elem,
            Op::Vredminu => acc.min(elem),
            Op::Vredmaxu => acc.max(elem),
            Op::Vredmin => sext(acc, sew).min(sext(elem, sew)) as u64,
            Op::Vredmax => sext(acc, sew).max(sext(elem, sew)) as u64,
            // widening sums extend each element into the accumulator width
            Op::Vwredsumu => acc.wrapping_add(elem),
            Op::Vwredsum => acc.wrapping_add(sext(elem, sew) as u64),
            _ => unreachable!(),
        } & width_mask(acc_eew);
    }
    if ctx.vl > 0 {
        set_elem(ms.hart, dest, 0, acc_eew, acc);
    } else {
        // an empty reduction copies the seed
        let seed = get_elem(ms.hart, seed_reg, 0, acc_eew);
        set_elem(ms.hart, dest, 0, acc_eew, seed);
    }
    reduce_tail(ms, &ctx, dest, acc_eew);
    complete(ms);
    Ok(Flow::Next)
}

fn fp_reduce(ms: &mut MorphState, ctx: VCtx, acc_eew: u32) -> EmitResult {
    super::fparith::check_fp_sew(ms, ctx.sew)?;
    if acc_eew != ctx.sew {
        super::fparith::check_fp_sew(ms, acc_eew)?;
    }
    let rm = fpu::resolve_rm(ms)?;
    let op = ms.info.op;
    let dest = ms.info.r[0].index();
    let seed_reg = ms.info.r[1].index();
    let src = ms.info.r[2].index();
    let sew = ctx.sew;
    let version = fpu::min_max_version(ms);
    let mut flags = Flags::empty();
    let mut acc = get_elem(ms.hart, seed_reg, 0, acc_eew);
    for idx in 0..ctx.vl {
        if !active(ms, idx) {
            continue;
        }
        let mut elem = get_elem(ms.hart, src, idx, sew);
        if acc_eew != sew {
            let (widened, widen_flags) = fp_convert(acc_eew, sew, elem, rm);
            elem = widened;
            flags |= widen_flags;
        }
        let kind = match op {
            Op::Vfredusum | Op::Vfredosum | Op::Vfwredusum | Op::Vfwredosum => FpBin::Add,
            Op::Vfredmin => FpBin::Min,
            _ => FpBin::Max,
        };
        let (value, elem_flags) = fp_binop(acc_eew, kind, acc, elem, rm, version);
        acc = value;
        flags |= elem_flags;
    }
    if ctx.vl > 0 {
        set_elem(ms.hart, dest, 0, acc_eew, acc);
    } else {
        let seed = get_elem(ms.hart, seed_reg, 0, acc_eew);
        set_elem(ms.hart, dest, 0, acc_eew, seed);
    }
    ms.hart.accumulate_fflags(flags);
    reduce_tail(ms, &ctx, dest, acc_eew);
    complete(ms);
    Ok(Flow::Next)
}

/// Everything above element zero of a reduction destination is tail
fn reduce_tail(ms: &mut MorphState, ctx: &VCtx, dest: u32, acc_eew: u32) {
    if !(ctx.vta && ms.hart.cfg.agnostic_ones) {
        return;
    }
    let elems = ms.hart.cfg.vlen as u64 / acc_eew as u64;
    for idx in 1..elems {
        set_elem(ms.hart, dest, idx, acc_eew, u64::MAX);
    }
}
