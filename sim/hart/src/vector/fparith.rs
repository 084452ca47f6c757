//! Vector floating point arithmetic
//!
//! Element bodies reuse the width-generic softfloat helpers of the scalar
//! FPU; the flags raised by every element are ORed into one accumulator
//! and folded into `fflags` once per instruction.

use super::*;
use crate::morph::fpu::{
    self, fp_binop, fp_class, fp_cmp, fp_convert, fp_fma, fp_from_int, fp_recip7, fp_rsqrt7,
    fp_sqrt, fp_to_int, FpBin, FpCmp,
};
use crate::morph::{EmitResult, Flow, MorphState};
use crate::state::width_mask;
use crate::trap::Trap;
use riscv::csr::ExtState;
use riscv::isa::Architecture;
use softfloat::{Flags, IntWidth, Rounding};

pub(super) fn handles(op: Op) -> bool {
    matches!(
        op,
        Op::Vfadd | Op::Vfsub | Op::Vfrsub | Op::Vfmul | Op::Vfdiv | Op::Vfrdiv | Op::Vfmin
            | Op::Vfmax | Op::Vfsgnj | Op::Vfsgnjn | Op::Vfsgnjx | Op::Vfmerge | Op::Vmfeq
            | Op::Vmfne | Op::Vmflt | Op::Vmfle | Op::Vmfgt | Op::Vmfge | Op::Vfmadd
            | Op::Vfnmadd | Op::Vfmsub | Op::Vfnmsub | Op::Vfmacc | Op::Vfnmacc | Op::Vfmsac
            | Op::Vfnmsac | Op::Vfwadd | Op::Vfwsub | Op::VfwaddW | Op::VfwsubW | Op::Vfwmul
            | Op::Vfwmacc | Op::Vfwnmacc | Op::Vfwmsac | Op::Vfwnmsac | Op::Vfsqrt
            | Op::Vfrsqrte7 | Op::Vfrece7 | Op::Vfclass | Op::VfcvtXuF | Op::VfcvtXF
            | Op::VfcvtFXu | Op::VfcvtFX | Op::VfwcvtXuF | Op::VfwcvtXF | Op::VfwcvtFXu
            | Op::VfwcvtFX | Op::VfwcvtFF | Op::VfncvtXuF | Op::VfncvtXF | Op::VfncvtFXu
            | Op::VfncvtFX | Op::VfncvtFF
    )
}

/// Check the SEW has floating point support in this configuration
pub(super) fn check_fp_sew(ms: &MorphState, sew: u32) -> Result<(), Trap> {
    let ok = match sew {
        16 => ms.hart.enabled.contains(Architecture::ZFH),
        32 => ms.hart.enabled.contains(Architecture::F),
        64 => ms.hart.enabled.contains(Architecture::D),
        _ => false,
    };
    if !ok {
        return Err(ms.illegal("no floating point support at this SEW"));
    }
    if ms.hart.csrs.mstatus().fs() == ExtState::Off {
        return Err(ms.illegal("floating point unit is off"));
    }
    Ok(())
}

/// The scalar float operand of a .vf form, NaN-box checked at SEW
fn fp_b(ms: &MorphState, sew: u32) -> SrcB {
    let desc = ms.info.r[1];
    match desc.class() {
        RegClass::F => SrcB::Scalar(ms.hart.state.f(desc.index(), sew)),
        _ => src_b(ms),
    }
}

pub(super) fn emit(ms: &mut MorphState) -> EmitResult {
    let ctx = vctx(ms)?;
    check_fp_sew(ms, ctx.sew)?;
    let rm = fpu::resolve_rm(ms)?;
    let op = ms.info.op;
    match op {
        Op::Vmfeq | Op::Vmfne | Op::Vmflt | Op::Vmfle | Op::Vmfgt | Op::Vmfge => {
            compare(ms, ctx)
        }
        Op::Vfmerge => merge(ms, ctx),
        Op::Vfwadd | Op::Vfwsub | Op::VfwaddW | Op::VfwsubW | Op::Vfwmul | Op::Vfwmacc
        | Op::Vfwnmacc | Op::Vfwmsac | Op::Vfwnmsac => widening(ms, ctx, rm),
        Op::VfwcvtXuF | Op::VfwcvtXF | Op::VfwcvtFXu | Op::VfwcvtFX | Op::VfwcvtFF => {
            widening_cvt(ms, ctx, rm)
        }
        Op::VfncvtXuF | Op::VfncvtXF | Op::VfncvtFXu | Op::VfncvtFX | Op::VfncvtFF => {
            narrowing_cvt(ms, ctx, rm)
        }
        Op::Vfsqrt | Op::Vfrsqrte7 | Op::Vfrece7 | Op::Vfclass | Op::VfcvtXuF | Op::VfcvtXF
        | Op::VfcvtFXu | Op::VfcvtFX => unary(ms, ctx, rm),
        _ => element_binop(ms, ctx, rm),
    }
}

fn element_binop(ms: &mut MorphState, ctx: VCtx, rm: Rounding) -> EmitResult {
    let dest = ms.info.r[0].index();
    let a_reg = ms.info.r[2].index();
    check_align(ms, dest, ctx.lmul_x8)?;
    check_align(ms, a_reg, ctx.lmul_x8)?;
    check_mask_overlap(ms, dest)?;
    let sew = ctx.sew;
    let b_src = fp_b(ms, sew);
    if let SrcB::Vector(reg) = b_src {
        check_align(ms, reg, ctx.lmul_x8)?;
    }
    let op = ms.info.op;
    let version = fpu::min_max_version(ms);
    let is_fma = matches!(
        op,
        Op::Vfmadd | Op::Vfnmadd | Op::Vfmsub | Op::Vfnmsub | Op::Vfmacc | Op::Vfnmacc
            | Op::Vfmsac | Op::Vfnmsac
    );
    let mut flags = Flags::empty();
    for idx in ctx.vstart..ctx.vl {
        if handle_inactive(ms, &ctx, dest, sew, idx) {
            continue;
        }
        let a = get_elem(ms.hart, a_reg, idx, sew);
        let b = b_src.elem(ms.hart, idx, sew);
        let (value, elem_flags) = if is_fma {
            let acc = get_elem(ms.hart, dest, idx, sew);
            // vf{n}macc: vd = ±(vs1*vs2) ± vd; vf{n}madd: vd = ±(vs1*vd) ± vs2
            let (x, y, z, neg_prod, neg_add) = match op {
                Op::Vfmacc => (b, a, acc, false, false),
                Op::Vfnmacc => (b, a, acc, true, true),
                Op::Vfmsac => (b, a, acc, false, true),
                Op::Vfnmsac => (b, a, acc, true, false),
                Op::Vfmadd => (b, acc, a, false, false),
                Op::Vfnmadd => (b, acc, a, true, true),
                Op::Vfmsub => (b, acc, a, false, true),
                _ => (b, acc, a, true, false),
            };
            fp_fma(sew, x, y, z, rm, neg_prod, neg_add)
        } else {
            let kind = match op {
                Op::Vfadd => FpBin::Add,
                Op::Vfsub => FpBin::Sub,
                Op::Vfmul => FpBin::Mul,
                Op::Vfdiv => FpBin::Div,
                Op::Vfmin => FpBin::Min,
                Op::Vfmax => FpBin::Max,
                Op::Vfsgnj => FpBin::SgnJ,
                Op::Vfsgnjn => FpBin::SgnJN,
                Op::Vfsgnjx => FpBin::SgnJX,
                // the reversed forms swap the operands
                Op::Vfrsub => FpBin::Sub,
                Op::Vfrdiv => FpBin::Div,
                _ => unreachable!(),
            };
            let (x, y) = match op {
                Op::Vfrsub | Op::Vfrdiv => (b, a),
                _ => (a, b),
            };
            fp_binop(sew, kind, x, y, rm, version)
        };
        flags |= elem_flags;
        set_elem(ms.hart, dest, idx, sew, value);
    }
    ms.hart.accumulate_fflags(flags);
    tail_fill(ms, &ctx, dest, sew);
    complete(ms);
    Ok(Flow::Next)
}

fn compare(ms: &mut MorphState, ctx: VCtx) -> EmitResult {
    let dest = ms.info.r[0].index();
    let a_reg = ms.info.r[2].index();
    check_align(ms, a_reg, ctx.lmul_x8)?;
    let sew = ctx.sew;
    let b_src = fp_b(ms, sew);
    let op = ms.info.op;
    let mut flags = Flags::empty();
    for idx in ctx.vstart..ctx.vl {
        if !active(ms, idx) {
            if ctx.vma && ms.hart.cfg.agnostic_ones {
                set_mask_elem(ms.hart, dest, idx, true);
            }
            continue;
        }
        let a = get_elem(ms.hart, a_reg, idx, sew);
        let b = b_src.elem(ms.hart, idx, sew);
        let (bit, elem_flags) = match op {
            Op::Vmfeq => fp_cmp(sew, FpCmp::Eq, a, b),
            Op::Vmfne => {
                let (eq, flags) = fp_cmp(sew, FpCmp::Eq, a, b);
                (!eq, flags)
            }
            Op::Vmflt => fp_cmp(sew, FpCmp::Lt, a, b),
            Op::Vmfle => fp_cmp(sew, FpCmp::Le, a, b),
            Op::Vmfgt => fp_cmp(sew, FpCmp::Lt, b, a),
            _ => fp_cmp(sew, FpCmp::Le, b, a),
        };
        flags |= elem_flags;
        set_mask_elem(ms.hart, dest, idx, bit);
    }
    ms.hart.accumulate_fflags(flags);
    mask_tail_fill(ms, &ctx, dest);
    complete(ms);
    Ok(Flow::Next)
}

/// vfmerge.vfm / vfmv.v.f
fn merge(ms: &mut MorphState, ctx: VCtx) -> EmitResult {
    let dest = ms.info.r[0].index();
    check_align(ms, dest, ctx.lmul_x8)?;
    let sew = ctx.sew;
    let scalar = ms.hart.state.f(ms.info.r[1].index(), sew);
    let a_reg = ms.info.r[2].index();
    let masked = ms.info.mask.is_some();
    for idx in ctx.vstart..ctx.vl {
        let value = if !masked || get_mask_elem(ms.hart, 0, idx) {
            scalar
        } else {
            get_elem(ms.hart, a_reg, idx, sew)
        };
        set_elem(ms.hart, dest, idx, sew, value);
    }
    tail_fill(ms, &ctx, dest, sew);
    complete(ms);
    Ok(Flow::Next)
}

fn unary(ms: &mut MorphState, ctx: VCtx, rm: Rounding) -> EmitResult {
    let dest = ms.info.r[0].index();
    let src = ms.info.r[2].index();
    check_align(ms, dest, ctx.lmul_x8)?;
    check_align(ms, src, ctx.lmul_x8)?;
    check_mask_overlap(ms, dest)?;
    let sew = ctx.sew;
    let op = ms.info.op;
    let width = IntWidth::of_bits(sew);
    let mut flags = Flags::empty();
    for idx in ctx.vstart..ctx.vl {
        if handle_inactive(ms, &ctx, dest, sew, idx) {
            continue;
        }
        let a = get_elem(ms.hart, src, idx, sew);
        let (value, elem_flags) = match op {
            Op::Vfsqrt => fp_sqrt(sew, a, rm),
            Op::Vfrsqrte7 => fp_rsqrt7(sew, a),
            Op::Vfrece7 => fp_recip7(sew, a, rm),
            Op::Vfclass => (fp_class(sew, a), Flags::empty()),
            Op::VfcvtXuF => fp_to_int(sew, a, width, false, rm),
            Op::VfcvtXF => fp_to_int(sew, a, width, true, rm),
            Op::VfcvtFXu => fp_from_int(sew, a, false, rm),
            Op::VfcvtFX => fp_from_int(sew, sext(a, sew) as u64, true, rm),
            _ => unreachable!(),
        };
        flags |= elem_flags;
        set_elem(ms.hart, dest, idx, sew, value & width_mask(sew));
    }
    ms.hart.accumulate_fflags(flags);
    tail_fill(ms, &ctx, dest, sew);
    complete(ms);
    Ok(Flow::Next)
}

/// Widening arithmetic: destination and (for the .w forms) first source
/// at 2*SEW
fn widening(ms: &mut MorphState, ctx: VCtx, rm: Rounding) -> EmitResult {
    let sew = ctx.sew;
    let wide = sew * 2;
    if wide > ms.hart.cfg.elen {
        return Err(ms.illegal("widening result exceeds ELEN"));
    }
    check_fp_sew(ms, wide)?;
    let wide_emul = emul_x8(&ctx, wide).map_err(|_| ms.illegal("widening EMUL out of range"))?;
    let dest = ms.info.r[0].index();
    let a_reg = ms.info.r[2].index();
    check_align(ms, dest, wide_emul)?;
    check_mask_overlap(ms, dest)?;
    let op = ms.info.op;
    let a_wide = matches!(op, Op::VfwaddW | Op::VfwsubW);
    let a_eew = if a_wide { wide } else { sew };
    let a_emul = if a_wide { wide_emul } else { ctx.lmul_x8 };
    check_align(ms, a_reg, a_emul)?;
    check_overlap(ms, dest, wide_emul, a_reg, a_emul)?;
    let b_src = fp_b(ms, sew);
    if let SrcB::Vector(reg) = b_src {
        check_align(ms, reg, ctx.lmul_x8)?;
        check_overlap(ms, dest, wide_emul, reg, ctx.lmul_x8)?;
    }
    let version = fpu::min_max_version(ms);
    let mut flags = Flags::empty();
    for idx in ctx.vstart..ctx.vl {
        if handle_inactive(ms, &ctx, dest, wide, idx) {
            continue;
        }
        // widen each operand exactly, then operate at 2*SEW
        let a_raw = get_elem(ms.hart, a_reg, idx, a_eew);
        let (a, widen_flags_a) = if a_wide {
            (a_raw, Flags::empty())
        } else {
            fp_convert(wide, sew, a_raw, rm)
        };
        let (b, widen_flags_b) = fp_convert(wide, sew, b_src.elem(ms.hart, idx, sew), rm);
        flags |= widen_flags_a | widen_flags_b;
        let (value, elem_flags) = match op {
            Op::Vfwadd | Op::VfwaddW => fp_binop(wide, FpBin::Add, a, b, rm, version),
            Op::Vfwsub | Op::VfwsubW => fp_binop(wide, FpBin::Sub, a, b, rm, version),
            Op::Vfwmul => fp_binop(wide, FpBin::Mul, a, b, rm, version),
            Op::Vfwmacc | Op::Vfwnmacc | Op::Vfwmsac | Op::Vfwnmsac => {
                let acc = get_elem(ms.hart, dest, idx, wide);
                let (neg_prod, neg_add) = match op {
                    Op::Vfwmacc => (false, false),
                    Op::Vfwnmacc => (true, true),
                    Op::Vfwmsac => (false, true),
                    _ => (true, false),
                };
                fp_fma(wide, b, a, acc, rm, neg_prod, neg_add)
            }
            _ => unreachable!(),
        };
        flags |= elem_flags;
        set_elem(ms.hart, dest, idx, wide, value);
    }
    ms.hart.accumulate_fflags(flags);
    tail_fill(ms, &ctx, dest, wide);
    complete(ms);
    Ok(Flow::Next)
}

fn widening_cvt(ms: &mut MorphState, ctx: VCtx, rm: Rounding) -> EmitResult {
    let sew = ctx.sew;
    let wide = sew * 2;
    if wide > ms.hart.cfg.elen {
        return Err(ms.illegal("widening result exceeds ELEN"));
    }
    let wide_emul = emul_x8(&ctx, wide).map_err(|_| ms.illegal("widening EMUL out of range"))?;
    let dest = ms.info.r[0].index();
    let src = ms.info.r[2].index();
    check_align(ms, dest, wide_emul)?;
    check_align(ms, src, ctx.lmul_x8)?;
    check_overlap(ms, dest, wide_emul, src, ctx.lmul_x8)?;
    check_mask_overlap(ms, dest)?;
    let op = ms.info.op;
    // float source widths need support on their float side only
    if matches!(op, Op::VfwcvtXuF | Op::VfwcvtXF | Op::VfwcvtFF) {
        check_fp_sew(ms, sew)?;
    }
    if matches!(op, Op::VfwcvtFXu | Op::VfwcvtFX | Op::VfwcvtFF) {
        check_fp_sew(ms, wide)?;
    }
    let width = IntWidth::of_bits(wide);
    let mut flags = Flags::empty();
    for idx in ctx.vstart..ctx.vl {
        if handle_inactive(ms, &ctx, dest, wide, idx) {
            continue;
        }
        let a = get_elem(ms.hart, src, idx, sew);
        let (value, elem_flags) = match op {
            Op::VfwcvtXuF => fp_to_int(sew, a, width, false, rm),
            Op::VfwcvtXF => fp_to_int(sew, a, width, true, rm),
            Op::VfwcvtFXu => fp_from_int(wide, a, false, rm),
            Op::VfwcvtFX => fp_from_int(wide, sext(a, sew) as u64, true, rm),
            Op::VfwcvtFF => fp_convert(wide, sew, a, rm),
            _ => unreachable!(),
        };
        flags |= elem_flags;
        set_elem(ms.hart, dest, idx, wide, value & width_mask(wide));
    }
    ms.hart.accumulate_fflags(flags);
    tail_fill(ms, &ctx, dest, wide);
    complete(ms);
    Ok(Flow::Next)
}

fn narrowing_cvt(ms: &mut MorphState, ctx: VCtx, rm: Rounding) -> EmitResult {
    let sew = ctx.sew;
    let wide = sew * 2;
    if wide > ms.hart.cfg.elen {
        return Err(ms.illegal("narrowing source exceeds ELEN"));
    }
    let wide_emul = emul_x8(&ctx, wide).map_err(|_| ms.illegal("narrowing EMUL out of range"))?;
    let dest = ms.info.r[0].index();
    let src = ms.info.r[2].index();
    check_align(ms, dest, ctx.lmul_x8)?;
    check_align(ms, src, wide_emul)?;
    check_overlap(ms, dest, ctx.lmul_x8, src, wide_emul)?;
    check_mask_overlap(ms, dest)?;
    let op = ms.info.op;
    if matches!(op, Op::VfncvtXuF | Op::VfncvtXF | Op::VfncvtFF) {
        check_fp_sew(ms, wide)?;
    }
    if matches!(op, Op::VfncvtFXu | Op::VfncvtFX | Op::VfncvtFF) {
        check_fp_sew(ms, sew)?;
    }
    let width = IntWidth::of_bits(sew);
    let mut flags = Flags::empty();
    for idx in ctx.vstart..ctx.vl {
        if handle_inactive(ms, &ctx, dest, sew, idx) {
            continue;
        }
        let a = get_elem(ms.hart, src, idx, wide);
        let (value, elem_flags) = match op {
            Op::VfncvtXuF => fp_to_int(wide, a, width, false, rm),
            Op::VfncvtXF => fp_to_int(wide, a, width, true, rm),
            Op::VfncvtFXu => fp_from_int(sew, a, false, rm),
            Op::VfncvtFX => fp_from_int(sew, sext(a, wide) as u64, true, rm),
            Op::VfncvtFF => fp_convert(sew, wide, a, rm),
            _ => unreachable!(),
        };
        flags |= elem_flags;
        set_elem(ms.hart, dest, idx, sew, value & width_mask(sew));
    }
    ms.hart.accumulate_fflags(flags);
    tail_fill(ms, &ctx, dest, sew);
    complete(ms);
    Ok(Flow::Next)
}
