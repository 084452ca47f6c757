//! 7-bit reciprocal and reciprocal square-root estimates
//!
//! The vector extension defines two estimate instructions whose results are
//! specified to a precision of 7 significand bits via interval tables.
//! The tables here are computed from the defining intervals with integer
//! arithmetic: each entry is the estimate function evaluated at the
//! midpoint of its input interval and rounded to 7 fraction bits.

use crate::round::isqrt;
use crate::{Flags, Float, Rounding};

/// `round(256 / sqrt(x_mid)) - 128` for table index `idx`.
///
/// The index combines the low exponent bit with the top six significand
/// bits; because the bias of every supported format is odd, an odd biased
/// exponent selects an input in `[1,2)` and an even one an input in `[2,4)`.
fn rsqrt7_entry(idx: u32) -> u64 {
    let exp_lsb = idx >> 6;
    let sig6 = (idx & 63) as u128;
    // x_mid as a fraction num/den over the interval midpoint
    let (num, den): (u128, u128) = if exp_lsb == 1 {
        (2 * sig6 + 129, 128)
    } else {
        (2 * (2 * sig6 + 129), 128)
    };
    // 256 / sqrt(num/den) = 256 * sqrt(den * num) / num
    let root = isqrt((den * num) << 40); // sqrt(den*num) * 2^20
    let denom = num << 20;
    let est = (256 * root + denom / 2) / denom;
    (est - 128) as u64
}

/// `round(256 / x_mid) - 128` for the top seven significand bits
fn recip7_entry(sig7: u32) -> u64 {
    let denom = 2 * sig7 as u64 + 257;
    let est = (65536 * 2 + denom) / (2 * denom);
    est - 128
}

impl<const E: u32, const F: u32> Float<E, F> {
    /// Estimate `1 / sqrt(self)` to 7 significand bits
    pub fn rsqrt_estimate7(self) -> (Self, Flags) {
        if self.is_nan() {
            let flags = if self.is_signaling_nan() {
                Flags::NV
            } else {
                Flags::empty()
            };
            return (Self::CANONICAL_NAN, flags);
        }
        if self.is_zero() {
            return (Self::signed_inf(self.sign()), Flags::DZ);
        }
        if self.sign() {
            // includes negative infinity
            return (Self::CANONICAL_NAN, Flags::NV);
        }
        if self.is_infinite() {
            return (Self::ZERO, Flags::empty());
        }

        let u = self.unpack();
        let idx = (((u.exp & 1) as u32) << 6) | ((u.sig >> (F - 6)) & 0x3f) as u32;
        let out_exp = (3 * Self::BIAS - 1 - u.exp) / 2;
        let out_frac = rsqrt7_entry(idx) << (F - 7);
        (Float(((out_exp as u64) << F) | out_frac), Flags::empty())
    }

    /// Estimate `1 / self` to 7 significand bits
    pub fn recip_estimate7(self, rm: Rounding) -> (Self, Flags) {
        if self.is_nan() {
            let flags = if self.is_signaling_nan() {
                Flags::NV
            } else {
                Flags::empty()
            };
            return (Self::CANONICAL_NAN, flags);
        }
        if self.is_zero() {
            return (Self::signed_inf(self.sign()), Flags::DZ);
        }
        if self.is_infinite() {
            return (Self::signed_zero(self.sign()), Flags::empty());
        }

        let u = self.unpack();
        let out_exp = 2 * Self::BIAS - 1 - u.exp;
        if out_exp >= Self::INF_EXP {
            // the input was subnormal with more than one leading zero; the
            // estimate overflows and rounds like any overflowing result
            let result = crate::round::overflow_result(u.sign, rm);
            return (result, Flags::OF | Flags::NX);
        }

        let sig7 = ((u.sig >> (F - 7)) & 0x7f) as u32;
        let est = recip7_entry(sig7);
        if out_exp <= 0 {
            // subnormal output: materialize the implicit bit and shift
            let sig = (0x80 | est) << (F - 7);
            let shifted = sig >> (1 - out_exp);
            return (Float(if u.sign { Self::SIGN_BIT } else { 0 } | shifted), Flags::empty());
        }
        let sign_bits = if u.sign { Self::SIGN_BIT } else { 0 };
        (
            Float(sign_bits | ((out_exp as u64) << F) | (est << (F - 7))),
            Flags::empty(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::F32;

    fn f32b(v: f32) -> F32 {
        F32::from_bits(v.to_bits() as u64)
    }

    fn f32v(v: F32) -> f32 {
        f32::from_bits(v.bits() as u32)
    }

    #[test]
    fn test_rsqrt7_specials() {
        let (r, flags) = f32b(0.0).rsqrt_estimate7();
        assert!(r.is_infinite() && !r.sign());
        assert_eq!(flags, Flags::DZ);
        let (r, flags) = f32b(-0.0).rsqrt_estimate7();
        assert!(r.is_infinite() && r.sign());
        assert_eq!(flags, Flags::DZ);
        let (r, flags) = f32b(-1.0).rsqrt_estimate7();
        assert!(r.is_nan());
        assert_eq!(flags, Flags::NV);
        let (r, flags) = f32b(f32::INFINITY).rsqrt_estimate7();
        assert!(r.is_zero());
        assert!(flags.is_empty());
    }

    #[test]
    fn test_rsqrt7_precision() {
        // relative error must stay within 2^-7 across several decades
        for v in [0.25f32, 0.5, 1.0, 1.5, 2.0, 3.0, 4.0, 100.0, 1e-30, 1e30] {
            let (r, flags) = f32b(v).rsqrt_estimate7();
            assert!(flags.is_empty());
            let estimate = f32v(r);
            let exact = 1.0 / v.sqrt();
            let rel = ((estimate - exact) / exact).abs();
            assert!(rel < 1.0 / 128.0, "rsqrt7({v}) = {estimate}, want ~{exact}");
        }
    }

    #[test]
    fn test_recip7_specials() {
        let (r, flags) = f32b(0.0).recip_estimate7(Rounding::NearestEven);
        assert!(r.is_infinite() && !r.sign());
        assert_eq!(flags, Flags::DZ);
        let (r, flags) = f32b(f32::NEG_INFINITY).recip_estimate7(Rounding::NearestEven);
        assert!(r.is_zero() && r.sign());
        assert!(flags.is_empty());
        // a deeply subnormal input overflows; direction depends on rounding mode
        let tiny = F32::from_bits(1);
        let (r, flags) = tiny.recip_estimate7(Rounding::NearestEven);
        assert!(r.is_infinite());
        assert_eq!(flags, Flags::OF | Flags::NX);
        let (r, _) = tiny.recip_estimate7(Rounding::TowardZero);
        assert_eq!(r.bits(), F32::MAX_FINITE.bits());
    }

    #[test]
    fn test_recip7_precision() {
        for v in [0.5f32, 1.0, 1.25, 2.0, 3.0, -7.0, 1e20, -1e-20] {
            let (r, flags) = f32b(v).recip_estimate7(Rounding::NearestEven);
            assert!(flags.is_empty());
            let estimate = f32v(r);
            let exact = 1.0 / v;
            let rel = ((estimate - exact) / exact).abs();
            assert!(rel < 1.0 / 128.0, "recip7({v}) = {estimate}, want ~{exact}");
        }
    }

    #[test]
    fn test_recip7_subnormal_output() {
        // the largest normal's reciprocal lands in the subnormal range
        let (r, flags) = F32::MAX_FINITE.recip_estimate7(Rounding::NearestEven);
        assert!(flags.is_empty());
        assert!(r.is_subnormal());
        let estimate = f32v(r);
        let exact = 1.0 / f32::MAX;
        assert!((estimate - exact).abs() / exact < 1.0 / 64.0);
    }
}
