//! Conversions between floating point formats and to/from integers
//!
//! Integer conversion results follow the RISC-V convention for invalid
//! inputs: NaN and positive overflow produce the maximum representable
//! value, negative overflow produces the minimum (zero for unsigned), and
//! the invalid flag suppresses inexact.

use crate::round::{round_pack, shift_right_jam128};
use crate::{Flags, Float, Rounding};

/// Target width of an integer conversion
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum IntWidth {
    W8,
    W16,
    W32,
    W64,
}

impl IntWidth {
    pub fn bits(self) -> u32 {
        match self {
            IntWidth::W8 => 8,
            IntWidth::W16 => 16,
            IntWidth::W32 => 32,
            IntWidth::W64 => 64,
        }
    }

    pub fn of_bits(bits: u32) -> Self {
        match bits {
            8 => IntWidth::W8,
            16 => IntWidth::W16,
            32 => IntWidth::W32,
            _ => IntWidth::W64,
        }
    }
}

fn int_round_increment(rm: Rounding, sign: bool, round_bits: u128, lsb: u128) -> bool {
    match rm {
        Rounding::NearestEven => round_bits > 4 || (round_bits == 4 && lsb == 1),
        Rounding::NearestMaxMag => round_bits >= 4,
        Rounding::TowardZero | Rounding::Odd => false,
        Rounding::Down => sign && round_bits != 0,
        Rounding::Up => !sign && round_bits != 0,
    }
}

impl<const E: u32, const F: u32> Float<E, F> {
    /// Convert to another floating point format.
    ///
    /// Widening conversions are exact except that signaling NaNs are
    /// quieted (raising invalid); narrowing conversions round.
    pub fn convert<const E2: u32, const F2: u32>(self, rm: Rounding) -> (Float<E2, F2>, Flags) {
        if self.is_nan() {
            let flags = if self.is_signaling_nan() {
                Flags::NV
            } else {
                Flags::empty()
            };
            return (Float::CANONICAL_NAN, flags);
        }
        if self.is_infinite() {
            return (Float::signed_inf(self.sign()), Flags::empty());
        }
        if self.is_zero() {
            return (Float::signed_zero(self.sign()), Flags::empty());
        }
        let u = self.unpack();
        let exp = u.exp - Self::BIAS + Float::<E2, F2>::BIAS;
        // reposition the significand to the target working width (three
        // round bits below the target fraction)
        let sig = if F2 + 3 >= F {
            (u.sig as u128) << (F2 + 3 - F)
        } else {
            shift_right_jam128(u.sig as u128, F - F2 - 3)
        };
        let mut flags = Flags::empty();
        let result = round_pack::<E2, F2>(u.sign, exp, sig as u64, rm, &mut flags);
        (result, flags)
    }

    /// Convert to an integer of the given width and signedness.
    ///
    /// The result is returned in the low `width` bits; the caller decides
    /// how to extend it into a register.
    pub fn to_int(self, width: IntWidth, signed: bool, rm: Rounding) -> (u64, Flags) {
        let bits = width.bits();
        let max: u64 = if signed {
            (1 << (bits - 1)) - 1
        } else if bits == 64 {
            u64::MAX
        } else {
            (1 << bits) - 1
        };
        let min: u64 = if signed { 1 << (bits - 1) } else { 0 };

        if self.is_nan() {
            return (max, Flags::NV);
        }
        if self.is_infinite() {
            return (if self.sign() { min } else { max }, Flags::NV);
        }
        if self.is_zero() {
            return (0, Flags::empty());
        }

        let u = self.unpack();
        let e = u.exp - Self::BIAS;
        if e >= bits as i32 {
            return (if u.sign { min } else { max }, Flags::NV);
        }

        // fixed point magnitude with three round bits
        let shift = e - F as i32 + 3;
        let mag = if shift >= 0 {
            (u.sig as u128) << shift
        } else {
            shift_right_jam128(u.sig as u128, (-shift) as u32)
        };
        let round_bits = mag & 7;
        let mut int_mag = mag >> 3;
        if int_round_increment(rm, u.sign, round_bits, int_mag & 1) {
            int_mag += 1;
        }

        let inexact = if round_bits != 0 { Flags::NX } else { Flags::empty() };
        if u.sign {
            if !signed {
                if int_mag != 0 {
                    return (0, Flags::NV);
                }
                return (0, inexact);
            }
            if int_mag > 1 << (bits - 1) {
                return (min, Flags::NV);
            }
            ((int_mag as u64).wrapping_neg() & width_mask(bits), inexact)
        } else {
            if int_mag > max as u128 {
                return (max, Flags::NV);
            }
            (int_mag as u64, inexact)
        }
    }

    /// Convert a signed integer; the value must already be sign-extended to 64 bits
    pub fn from_i64(value: i64, rm: Rounding) -> (Self, Flags) {
        if value < 0 {
            Self::from_magnitude(true, value.unsigned_abs(), rm)
        } else {
            Self::from_magnitude(false, value as u64, rm)
        }
    }

    pub fn from_u64(value: u64, rm: Rounding) -> (Self, Flags) {
        Self::from_magnitude(false, value, rm)
    }

    fn from_magnitude(sign: bool, mag: u64, rm: Rounding) -> (Self, Flags) {
        if mag == 0 {
            return (Self::ZERO, Flags::empty());
        }
        let lead = 63 - mag.leading_zeros();
        let exp = Self::BIAS + lead as i32;
        // bring the leading bit to position F+3
        let sig = if lead <= F + 3 {
            (mag as u128) << (F + 3 - lead)
        } else {
            shift_right_jam128(mag as u128, lead - (F + 3))
        };
        let mut flags = Flags::empty();
        let result = round_pack(sign, exp, sig as u64, rm, &mut flags);
        (result, flags)
    }
}

fn width_mask(bits: u32) -> u64 {
    if bits == 64 {
        u64::MAX
    } else {
        (1 << bits) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Bf16, F16, F32, F64};

    fn f32b(v: f32) -> F32 {
        F32::from_bits(v.to_bits() as u64)
    }

    #[test]
    fn test_widen_is_exact() {
        let (wide, flags) = f32b(1.5).convert::<11, 52>(Rounding::NearestEven);
        assert_eq!(wide.bits(), 1.5f64.to_bits());
        assert!(flags.is_empty());
        // a signaling NaN is quieted with NV
        let (wide, flags) = F32::from_bits(0x7f80_0001).convert::<11, 52>(Rounding::NearestEven);
        assert_eq!(wide.bits(), F64::CANONICAL_NAN.bits());
        assert_eq!(flags, Flags::NV);
    }

    #[test]
    fn test_narrow_rounds() {
        let (narrow, flags) = F64::from_bits(1.1f64.to_bits()).convert::<8, 23>(Rounding::NearestEven);
        assert_eq!(narrow.bits(), 1.1f32.to_bits() as u64);
        assert_eq!(flags, Flags::NX);
        // overflow to infinity
        let (narrow, flags) = F64::from_bits(1e300f64.to_bits()).convert::<8, 23>(Rounding::NearestEven);
        assert!(narrow.is_infinite());
        assert!(flags.contains(Flags::OF));
        // f32 -> bf16 truncates the fraction
        let (bf, _) = f32b(1.0 + 1.0 / 256.0).convert::<8, 7>(Rounding::TowardZero);
        assert_eq!(bf.bits(), 0x3f80);
        let _: Bf16 = bf;
    }

    #[test]
    fn test_f16_roundtrip_through_f32() {
        for bits in [0x3c00u64, 0xbc00, 0x0001, 0x7bff, 0x3555] {
            let (wide, flags) = F16::from_bits(bits).convert::<8, 23>(Rounding::NearestEven);
            assert!(flags.is_empty(), "widening must be exact");
            let (back, flags) = wide.convert::<5, 10>(Rounding::NearestEven);
            assert!(flags.is_empty());
            assert_eq!(back.bits(), bits);
        }
    }

    #[test]
    fn test_to_int() {
        assert_eq!(f32b(3.7).to_int(IntWidth::W32, true, Rounding::TowardZero), (3, Flags::NX));
        assert_eq!(
            f32b(3.7).to_int(IntWidth::W32, true, Rounding::NearestEven),
            (4, Flags::NX)
        );
        assert_eq!(
            f32b(-3.7).to_int(IntWidth::W32, true, Rounding::TowardZero),
            (0xffff_fffd, Flags::NX)
        );
        assert_eq!(f32b(2.0).to_int(IntWidth::W32, true, Rounding::NearestEven), (2, Flags::empty()));
        // NaN and overflow produce the RISC-V indeterminate values
        assert_eq!(
            F32::CANONICAL_NAN.to_int(IntWidth::W32, true, Rounding::TowardZero),
            (0x7fff_ffff, Flags::NV)
        );
        assert_eq!(
            f32b(f32::INFINITY).negate().to_int(IntWidth::W32, true, Rounding::TowardZero),
            (0x8000_0000, Flags::NV)
        );
        assert_eq!(f32b(-1.0).to_int(IntWidth::W32, false, Rounding::TowardZero), (0, Flags::NV));
        // negative fractions truncating to zero are merely inexact
        assert_eq!(f32b(-0.4).to_int(IntWidth::W32, false, Rounding::TowardZero), (0, Flags::NX));
        // 2^31 overflows i32 but not u32
        assert_eq!(
            f32b(2147483648.0).to_int(IntWidth::W32, true, Rounding::TowardZero),
            (0x7fff_ffff, Flags::NV)
        );
        assert_eq!(
            f32b(2147483648.0).to_int(IntWidth::W32, false, Rounding::TowardZero),
            (0x8000_0000, Flags::empty())
        );
        // i32::MIN is representable
        assert_eq!(
            f32b(-2147483648.0).to_int(IntWidth::W32, true, Rounding::TowardZero),
            (0x8000_0000, Flags::empty())
        );
    }

    #[test]
    fn test_from_int() {
        let (r, flags) = F32::from_i64(-42, Rounding::NearestEven);
        assert_eq!(r.bits(), (-42.0f32).to_bits() as u64);
        assert!(flags.is_empty());
        // u64::MAX is inexact in binary32
        let (r, flags) = F32::from_u64(u64::MAX, Rounding::NearestEven);
        assert_eq!(r.bits(), (u64::MAX as f32).to_bits() as u64);
        assert_eq!(flags, Flags::NX);
        let (r, _) = F64::from_i64(i64::MIN, Rounding::NearestEven);
        assert_eq!(r.bits(), (i64::MIN as f64).to_bits());
    }
}
