//! Floating point control definitions
//!
//! The dynamic rounding mode and the accrued exception flags live in the
//! `fcsr` register; every floating point instruction additionally carries a
//! static rounding mode field whose encodings are defined here.

use bitflags::bitflags;

bitflags! {
    /// The accrued exception flags held in `fflags` / `fcsr[4:0]`
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
    pub struct FFlags: u64 {
        /// Inexact
        const NX = 1 << 0;
        /// Underflow
        const UF = 1 << 1;
        /// Overflow
        const OF = 1 << 2;
        /// Divide by zero
        const DZ = 1 << 3;
        /// Invalid operation
        const NV = 1 << 4;
    }
}

/// The rounding mode descriptor carried by a decoded instruction.
///
/// Encodings 5 and 6 of the instruction `rm` field are reserved; they decode
/// to the `Bad5`/`Bad6` markers so the dispatcher can raise
/// Illegal Instruction, and encoding 7 selects the dynamic mode in
/// `fcsr.frm`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum RmDesc {
    /// Instruction has no rounding mode field
    #[default]
    None,
    /// Round using the current `fcsr.frm` value
    Current,
    /// Round to nearest, ties to even
    Rne,
    /// Round towards zero
    Rtz,
    /// Round towards negative infinity
    Rdn,
    /// Round towards positive infinity
    Rup,
    /// Round to nearest, ties away from zero
    Rmm,
    /// Round to odd (jamming); only reachable through narrowing vector conversions
    Rod,
    /// Reserved encoding 5
    Bad5,
    /// Reserved encoding 6
    Bad6,
}

impl RmDesc {
    /// Decode the 3-bit `rm` instruction field
    pub fn from_field(rm: u32) -> Self {
        match rm & 0b111 {
            0 => RmDesc::Rne,
            1 => RmDesc::Rtz,
            2 => RmDesc::Rdn,
            3 => RmDesc::Rup,
            4 => RmDesc::Rmm,
            5 => RmDesc::Bad5,
            6 => RmDesc::Bad6,
            _ => RmDesc::Current,
        }
    }

    /// Decode a value written to `fcsr.frm`; reserved values return `None`
    pub fn from_frm(frm: u64) -> Option<Self> {
        match frm & 0b111 {
            0 => Some(RmDesc::Rne),
            1 => Some(RmDesc::Rtz),
            2 => Some(RmDesc::Rdn),
            3 => Some(RmDesc::Rup),
            4 => Some(RmDesc::Rmm),
            _ => None,
        }
    }

    pub fn is_reserved(self) -> bool {
        matches!(self, RmDesc::Bad5 | RmDesc::Bad6)
    }
}

/// Result bits of the FCLASS instruction
pub mod fclass {
    pub const NEG_INFINITY: u64 = 1 << 0;
    pub const NEG_NORMAL: u64 = 1 << 1;
    pub const NEG_SUBNORMAL: u64 = 1 << 2;
    pub const NEG_ZERO: u64 = 1 << 3;
    pub const POS_ZERO: u64 = 1 << 4;
    pub const POS_SUBNORMAL: u64 = 1 << 5;
    pub const POS_NORMAL: u64 = 1 << 6;
    pub const POS_INFINITY: u64 = 1 << 7;
    pub const SIGNALING_NAN: u64 = 1 << 8;
    pub const QUIET_NAN: u64 = 1 << 9;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rm_field_decode() {
        assert_eq!(RmDesc::from_field(0), RmDesc::Rne);
        assert_eq!(RmDesc::from_field(4), RmDesc::Rmm);
        assert_eq!(RmDesc::from_field(7), RmDesc::Current);
        assert!(RmDesc::from_field(5).is_reserved());
        assert!(RmDesc::from_field(6).is_reserved());
    }

    #[test]
    fn test_frm_reserved() {
        assert_eq!(RmDesc::from_frm(2), Some(RmDesc::Rdn));
        assert_eq!(RmDesc::from_frm(5), None);
        assert_eq!(RmDesc::from_frm(6), None);
        assert_eq!(RmDesc::from_frm(7), None);
    }
}
