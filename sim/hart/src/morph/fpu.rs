//! Scalar floating point emitters
//!
//! The width-generic helpers here are shared with the vector engine; they
//! dispatch on the operand width to the matching softfloat format and
//! report the raised flags back for accumulation into `fflags`.

use super::{EmitResult, Flow, MorphState};
use crate::trap::Trap;
use decoder::Op;
use riscv::fp::RmDesc;
use softfloat::{Flags, Float, IntWidth, MinMaxVersion, Rounding, F16, F32, F64};

/// Resolve the instruction's rounding mode descriptor, validating the
/// dynamic `frm` value when `CURRENT` is selected
pub(crate) fn resolve_rm(ms: &mut MorphState) -> Result<Rounding, Trap> {
    match ms.info.rm {
        RmDesc::Rne | RmDesc::None => Ok(Rounding::NearestEven),
        RmDesc::Rtz => Ok(Rounding::TowardZero),
        RmDesc::Rdn => Ok(Rounding::Down),
        RmDesc::Rup => Ok(Rounding::Up),
        RmDesc::Rmm => Ok(Rounding::NearestMaxMag),
        RmDesc::Rod => Ok(Rounding::Odd),
        RmDesc::Bad5 | RmDesc::Bad6 => Err(ms.illegal("reserved rounding mode")),
        RmDesc::Current => {
            let frm = ms.hart.csrs.frm();
            let resolved = match RmDesc::from_frm(frm) {
                Some(RmDesc::Rne) => Rounding::NearestEven,
                Some(RmDesc::Rtz) => Rounding::TowardZero,
                Some(RmDesc::Rdn) => Rounding::Down,
                Some(RmDesc::Rup) => Rounding::Up,
                Some(RmDesc::Rmm) => Rounding::NearestMaxMag,
                _ => return Err(ms.illegal("reserved dynamic rounding mode")),
            };
            ms.hart.block.rm_checked = true;
            Ok(resolved)
        }
    }
}

/// Two-operand arithmetic kinds shared between scalar and vector
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum FpBin {
    Add,
    Sub,
    Mul,
    Div,
    Min,
    Max,
    SgnJ,
    SgnJN,
    SgnJX,
}

fn binop<const E: u32, const F: u32>(
    kind: FpBin,
    a: u64,
    b: u64,
    rm: Rounding,
    version: MinMaxVersion,
) -> (u64, Flags) {
    let x = Float::<E, F>::from_bits(a);
    let y = Float::<E, F>::from_bits(b);
    let (result, flags) = match kind {
        FpBin::Add => x.add(y, rm),
        FpBin::Sub => x.sub(y, rm),
        FpBin::Mul => x.mul(y, rm),
        FpBin::Div => x.div(y, rm),
        FpBin::Min => x.min_max(y, false, version),
        FpBin::Max => x.min_max(y, true, version),
        FpBin::SgnJ => {
            let sign = y.bits() & Float::<E, F>::SIGN_BIT;
            (Float::from_bits((x.bits() & !Float::<E, F>::SIGN_BIT) | sign), Flags::empty())
        }
        FpBin::SgnJN => {
            let sign = !y.bits() & Float::<E, F>::SIGN_BIT;
            (Float::from_bits((x.bits() & !Float::<E, F>::SIGN_BIT) | sign), Flags::empty())
        }
        FpBin::SgnJX => {
            (Float::from_bits(x.bits() ^ (y.bits() & Float::<E, F>::SIGN_BIT)), Flags::empty())
        }
    };
    (result.bits(), flags)
}

pub(crate) fn fp_binop(
    bits: u32,
    kind: FpBin,
    a: u64,
    b: u64,
    rm: Rounding,
    version: MinMaxVersion,
) -> (u64, Flags) {
    match bits {
        16 => binop::<5, 10>(kind, a, b, rm, version),
        32 => binop::<8, 23>(kind, a, b, rm, version),
        64 => binop::<11, 52>(kind, a, b, rm, version),
        _ => unreachable!("unsupported float width {bits}"),
    }
}

/// Fused multiply-add covering all four sign variants:
/// `(-1)^neg_prod * (a*b) + (-1)^neg_add * c`
pub(crate) fn fp_fma(
    bits: u32,
    a: u64,
    b: u64,
    c: u64,
    rm: Rounding,
    neg_prod: bool,
    neg_add: bool,
) -> (u64, Flags) {
    fn go<const E: u32, const F: u32>(
        a: u64,
        b: u64,
        c: u64,
        rm: Rounding,
        neg_prod: bool,
        neg_add: bool,
    ) -> (u64, Flags) {
        let mut x = Float::<E, F>::from_bits(a);
        let mut z = Float::<E, F>::from_bits(c);
        if neg_prod {
            x = x.negate();
        }
        if neg_add {
            z = z.negate();
        }
        let (result, flags) = x.fma(Float::from_bits(b), z, rm);
        (result.bits(), flags)
    }
    match bits {
        16 => go::<5, 10>(a, b, c, rm, neg_prod, neg_add),
        32 => go::<8, 23>(a, b, c, rm, neg_prod, neg_add),
        64 => go::<11, 52>(a, b, c, rm, neg_prod, neg_add),
        _ => unreachable!(),
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum FpCmp {
    Eq,
    Lt,
    Le,
}

pub(crate) fn fp_cmp(bits: u32, kind: FpCmp, a: u64, b: u64) -> (bool, Flags) {
    fn go<const E: u32, const F: u32>(kind: FpCmp, a: u64, b: u64) -> (bool, Flags) {
        let x = Float::<E, F>::from_bits(a);
        let y = Float::<E, F>::from_bits(b);
        match kind {
            FpCmp::Eq => x.eq_quiet(y),
            FpCmp::Lt => x.lt(y),
            FpCmp::Le => x.le(y),
        }
    }
    match bits {
        16 => go::<5, 10>(kind, a, b),
        32 => go::<8, 23>(kind, a, b),
        64 => go::<11, 52>(kind, a, b),
        _ => unreachable!(),
    }
}

pub(crate) fn fp_sqrt(bits: u32, a: u64, rm: Rounding) -> (u64, Flags) {
    match bits {
        16 => {
            let (r, f) = F16::from_bits(a).sqrt(rm);
            (r.bits(), f)
        }
        32 => {
            let (r, f) = F32::from_bits(a).sqrt(rm);
            (r.bits(), f)
        }
        64 => {
            let (r, f) = F64::from_bits(a).sqrt(rm);
            (r.bits(), f)
        }
        _ => unreachable!(),
    }
}

pub(crate) fn fp_class(bits: u32, a: u64) -> u64 {
    match bits {
        16 => F16::from_bits(a).classify(),
        32 => F32::from_bits(a).classify(),
        64 => F64::from_bits(a).classify(),
        _ => unreachable!(),
    }
}

pub(crate) fn fp_to_int(
    bits: u32,
    a: u64,
    width: IntWidth,
    signed: bool,
    rm: Rounding,
) -> (u64, Flags) {
    match bits {
        16 => F16::from_bits(a).to_int(width, signed, rm),
        32 => F32::from_bits(a).to_int(width, signed, rm),
        64 => F64::from_bits(a).to_int(width, signed, rm),
        _ => unreachable!(),
    }
}

pub(crate) fn fp_from_int(bits: u32, value: u64, signed: bool, rm: Rounding) -> (u64, Flags) {
    fn go<const E: u32, const F: u32>(value: u64, signed: bool, rm: Rounding) -> (u64, Flags) {
        let (r, f) = if signed {
            Float::<E, F>::from_i64(value as i64, rm)
        } else {
            Float::<E, F>::from_u64(value, rm)
        };
        (r.bits(), f)
    }
    match bits {
        16 => go::<5, 10>(value, signed, rm),
        32 => go::<8, 23>(value, signed, rm),
        64 => go::<11, 52>(value, signed, rm),
        _ => unreachable!(),
    }
}

pub(crate) fn fp_convert(dst_bits: u32, src_bits: u32, a: u64, rm: Rounding) -> (u64, Flags) {
    fn from<const E: u32, const F: u32>(dst_bits: u32, a: u64, rm: Rounding) -> (u64, Flags) {
        let x = Float::<E, F>::from_bits(a);
        match dst_bits {
            16 => {
                let (r, f) = x.convert::<5, 10>(rm);
                (r.bits(), f)
            }
            32 => {
                let (r, f) = x.convert::<8, 23>(rm);
                (r.bits(), f)
            }
            64 => {
                let (r, f) = x.convert::<11, 52>(rm);
                (r.bits(), f)
            }
            _ => unreachable!(),
        }
    }
    match src_bits {
        16 => from::<5, 10>(dst_bits, a, rm),
        32 => from::<8, 23>(dst_bits, a, rm),
        64 => from::<11, 52>(dst_bits, a, rm),
        _ => unreachable!(),
    }
}

pub(crate) fn fp_recip7(bits: u32, a: u64, rm: Rounding) -> (u64, Flags) {
    fn go<const E: u32, const F: u32>(a: u64, rm: Rounding) -> (u64, Flags) {
        let (r, f) = Float::<E, F>::from_bits(a).recip_estimate7(rm);
        (r.bits(), f)
    }
    match bits {
        16 => go::<5, 10>(a, rm),
        32 => go::<8, 23>(a, rm),
        64 => go::<11, 52>(a, rm),
        _ => unreachable!(),
    }
}

pub(crate) fn fp_rsqrt7(bits: u32, a: u64) -> (u64, Flags) {
    fn go<const E: u32, const F: u32>(a: u64) -> (u64, Flags) {
        let (r, f) = Float::<E, F>::from_bits(a).rsqrt_estimate7();
        (r.bits(), f)
    }
    match bits {
        16 => go::<5, 10>(a),
        32 => go::<8, 23>(a),
        64 => go::<11, 52>(a),
        _ => unreachable!(),
    }
}

/// The min/max semantics revision this hart implements
pub(crate) fn min_max_version(ms: &MorphState) -> MinMaxVersion {
    if ms.hart.cfg.legacy_min_max {
        MinMaxVersion::V2_2
    } else {
        MinMaxVersion::V2_3
    }
}

pub(super) fn emit(ms: &mut MorphState) -> EmitResult {
    let op = ms.info.op;
    let bits = ms.info.r[0].bits();
    match op {
        Op::Fadd | Op::Fsub | Op::Fmul | Op::Fdiv | Op::Fmin | Op::Fmax | Op::Fsgnj
        | Op::Fsgnjn | Op::Fsgnjx => {
            let rm = resolve_rm(ms)?;
            let kind = match op {
                Op::Fadd => FpBin::Add,
                Op::Fsub => FpBin::Sub,
                Op::Fmul => FpBin::Mul,
                Op::Fdiv => FpBin::Div,
                Op::Fmin => FpBin::Min,
                Op::Fmax => FpBin::Max,
                Op::Fsgnj => FpBin::SgnJ,
                Op::Fsgnjn => FpBin::SgnJN,
                _ => FpBin::SgnJX,
            };
            let version = min_max_version(ms);
            let (value, flags) = fp_binop(bits, kind, ms.f(1), ms.f(2), rm, version);
            ms.set_fd(value);
            ms.hart.accumulate_fflags(flags);
        }
        Op::Fsqrt => {
            let rm = resolve_rm(ms)?;
            let (value, flags) = fp_sqrt(bits, ms.f(1), rm);
            ms.set_fd(value);
            ms.hart.accumulate_fflags(flags);
        }
        Op::Fmadd | Op::Fmsub | Op::Fnmadd | Op::Fnmsub => {
            let rm = resolve_rm(ms)?;
            let (neg_prod, neg_add) = match op {
                Op::Fmadd => (false, false),
                Op::Fmsub => (false, true),
                Op::Fnmadd => (true, true),
                _ => (true, false),
            };
            let (value, flags) = fp_fma(bits, ms.f(1), ms.f(2), ms.f(3), rm, neg_prod, neg_add);
            ms.set_fd(value);
            ms.hart.accumulate_fflags(flags);
        }
        Op::Feq | Op::Flt | Op::Fle => {
            let bits = ms.info.r[1].bits();
            let kind = match op {
                Op::Feq => FpCmp::Eq,
                Op::Flt => FpCmp::Lt,
                _ => FpCmp::Le,
            };
            let (result, flags) = fp_cmp(bits, kind, ms.f(1), ms.f(2));
            ms.set_xd(result as u64);
            ms.hart.accumulate_fflags(flags);
        }
        Op::Fclass => {
            let bits = ms.info.r[1].bits();
            let value = fp_class(bits, ms.f(1));
            ms.set_xd(value);
        }
        Op::FmvX => {
            // the move reads the raw low bits, without a NaN-box check
            let bits = ms.info.r[1].bits();
            let raw = ms.hart.state.f_raw(ms.info.r[1].index());
            let value = raw & crate::state::width_mask(bits);
            let shift = 64 - bits;
            ms.set_xd((((value << shift) as i64) >> shift) as u64);
        }
        Op::FmvF | Op::Fmv => {
            let value = ms.hart.state.x(ms.info.r[1].index());
            ms.set_fd(value & crate::state::width_mask(bits));
        }
        Op::FcvtX => {
            let rm = resolve_rm(ms)?;
            let src_bits = ms.info.r[1].bits();
            let width = if ms.info.r[0].bits() == 32 {
                IntWidth::W32
            } else {
                IntWidth::W64
            };
            let signed = !ms.info.r[0].is_unsigned();
            let (value, flags) = fp_to_int(src_bits, ms.f(1), width, signed, rm);
            ms.set_xd(value);
            ms.hart.accumulate_fflags(flags);
        }
        Op::FcvtF => {
            let rm = resolve_rm(ms)?;
            let src = ms.info.r[1];
            let signed = !src.is_unsigned();
            let raw = ms.hart.state.x(src.index());
            let value = match (src.bits(), signed) {
                (32, true) => raw as u32 as i32 as i64 as u64,
                (32, false) => raw & 0xffff_ffff,
                _ => raw,
            };
            let (value, flags) = fp_from_int(bits, value, signed, rm);
            ms.set_fd(value);
            ms.hart.accumulate_fflags(flags);
        }
        Op::FcvtFF => {
            let rm = resolve_rm(ms)?;
            let src_bits = ms.info.r[1].bits();
            let (value, flags) = fp_convert(bits, src_bits, ms.f(1), rm);
            ms.set_fd(value);
            ms.hart.accumulate_fflags(flags);
        }
        _ => unreachable!(),
    }
    Ok(Flow::Next)
}
