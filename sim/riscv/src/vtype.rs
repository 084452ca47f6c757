//! The vector type register
//!
//! `vtype` configures how the vector register file is interpreted: the
//! element width SEW, the register group multiplier LMUL (including the
//! fractional settings), and the tail/mask agnostic policy bits.
//! The register can only be written through the `VSETVLI`/`VSETIVLI`/
//! `VSETVL` instructions; an unsupported configuration sets the `vill` bit
//! instead of trapping.

/// View over a raw `vtype` register value.
///
/// ```text
///  XLEN-1                  8   7    6   5     3 2      0
/// ┌──────┬─────────────────────┬─────┬──────────┬───────┐
/// │ vill │      reserved       │ vma │ vta vsew │ vlmul │
/// └──────┴─────────────────────┴─────┴──────────┴───────┘
/// ```
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct VType(pub u64);

impl VType {
    /// The all-invalid value installed by an unsupported configuration
    /// (vill set, everything else zero)
    pub fn ill(xlen_bits: u32) -> Self {
        VType(1 << (xlen_bits - 1))
    }

    pub fn vill(self, xlen_bits: u32) -> bool {
        self.0 >> (xlen_bits - 1) & 1 != 0
    }

    /// Signed 3-bit register group multiplier field.
    ///
    /// `0..=3` encode LMUL 1/2/4/8, `-3..=-1` encode LMUL 1/8, 1/4, 1/2 and
    /// `-4` is reserved.
    pub fn svlmul(self) -> i32 {
        ((self.0 as u32) << 29) as i32 >> 29
    }

    /// The vsew field; element width is `8 << vsew`
    pub fn vsew(self) -> u32 {
        ((self.0 >> 3) & 0b111) as u32
    }

    /// Selected element width in bits, if the vsew encoding is not reserved
    pub fn sew(self) -> Option<u32> {
        match self.vsew() {
            sew @ 0..=3 => Some(8 << sew),
            _ => None,
        }
    }

    /// Tail agnostic policy bit
    pub fn vta(self) -> bool {
        self.0 >> 6 & 1 != 0
    }

    /// Mask agnostic policy bit
    pub fn vma(self) -> bool {
        self.0 >> 7 & 1 != 0
    }

    /// Value of the always-zero reserved field
    pub fn reserved(self, xlen_bits: u32) -> u64 {
        (self.0 & !(1 << (xlen_bits - 1))) >> 8
    }

    /// LMUL multiplied by 8, so that fractional settings stay integral.
    ///
    /// Returns `None` for the reserved `vlmul=0b100` encoding.
    pub fn lmul_x8(self) -> Option<u32> {
        match self.svlmul() {
            -4 => None,
            svlmul => Some(1 << (svlmul + 3)),
        }
    }

    /// Maximum vector length for this configuration: `VLEN * LMUL / SEW`
    pub fn vlmax(self, vlen_bits: u32) -> Option<u64> {
        let sew = self.sew()?;
        let lmul_x8 = self.lmul_x8()?;
        Some((vlen_bits as u64 * lmul_x8 as u64) / (sew as u64 * 8))
    }

    /// Check this configuration against the hart's vector parameters.
    ///
    /// A configuration is unsupported if a reserved field is set, SEW
    /// exceeds ELEN, a fractional LMUL is selected without support for it,
    /// the `SEW/LMUL` ratio exceeds ELEN, or the ratio leaves no whole
    /// element in a register group (vlmax of zero).
    pub fn is_legal(self, xlen_bits: u32, vlen_bits: u32, elen_bits: u32, fractional_lmul: bool) -> bool {
        if self.vill(xlen_bits) || self.reserved(xlen_bits) != 0 {
            return false;
        }
        let Some(sew) = self.sew() else {
            return false;
        };
        let Some(lmul_x8) = self.lmul_x8() else {
            return false;
        };
        if sew > elen_bits {
            return false;
        }
        if lmul_x8 < 8 && !fractional_lmul {
            return false;
        }
        // fractional groups must keep SEW/LMUL within ELEN; vlmax alone
        // does not catch this once VLEN exceeds ELEN
        if sew as u64 * 8 > lmul_x8 as u64 * elen_bits as u64 {
            return false;
        }
        match self.vlmax(vlen_bits) {
            Some(vlmax) => vlmax > 0,
            None => false,
        }
    }

    /// Assemble a vtype value from its fields
    pub fn encode(svlmul: i32, vsew: u32, vta: bool, vma: bool) -> Self {
        VType(
            (svlmul as u64 & 0b111)
                | ((vsew as u64 & 0b111) << 3)
                | ((vta as u64) << 6)
                | ((vma as u64) << 7),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vlmax() {
        // e32, m2 on VLEN=128: 128 * 2 / 32 = 8
        let vtype = VType::encode(1, 2, true, true);
        assert_eq!(vtype.vlmax(128), Some(8));
        assert!(vtype.vta());
        assert!(vtype.vma());
        // e64, mf2 on VLEN=128: 128 / 2 / 64 = 1
        let vtype = VType::encode(-1, 3, false, false);
        assert_eq!(vtype.vlmax(128), Some(1));
    }

    #[test]
    fn test_illegal_configurations() {
        // reserved vlmul
        assert!(!VType::encode(-4, 2, false, false).is_legal(64, 128, 64, true));
        // SEW > ELEN
        assert!(!VType::encode(0, 3, false, false).is_legal(64, 128, 32, true));
        // fractional LMUL without support
        assert!(!VType::encode(-1, 0, false, false).is_legal(64, 128, 64, false));
        // SEW/LMUL ratio leaving no element: e64 mf8 on VLEN=128
        assert!(!VType::encode(-3, 3, false, false).is_legal(64, 128, 64, true));
        // reserved field set
        assert!(!VType(0x100).is_legal(64, 128, 64, true));
        // vill set
        assert!(!VType::ill(64).is_legal(64, 128, 64, true));
        // plain e32 m1
        assert!(VType::encode(0, 2, false, false).is_legal(64, 128, 64, true));
    }

    #[test]
    fn test_ratio_limit_with_wide_vlen() {
        // VLEN=256, ELEN=64: e32 mf4 gives SEW/LMUL = 128 > ELEN, yet the
        // register group still holds whole elements
        let vtype = VType::encode(-2, 2, false, false);
        assert_eq!(vtype.vlmax(256), Some(2));
        assert!(!vtype.is_legal(64, 256, 64, true));
        // e32 mf2 sits exactly at the SEW/LMUL = ELEN limit
        assert!(VType::encode(-1, 2, false, false).is_legal(64, 256, 64, true));
        // e64 mf2 breaks the limit even on VLEN=128
        assert!(!VType::encode(-1, 3, false, false).is_legal(64, 128, 64, true));
    }

    #[test]
    fn test_vill_is_xlen_relative() {
        let vtype = VType::ill(32);
        assert!(vtype.vill(32));
        assert!(!vtype.vill(64));
    }
}
