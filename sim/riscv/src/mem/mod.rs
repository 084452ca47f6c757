//! Data structures and definitions for page-based virtual addressing
//!
//! # Virtual Addressing Basics
//!
//! The paged translation schemes partition a virtual address into a series
//! of virtual page number (VPN) segments and a page offset.
//! Each VPN segment indexes one level of the page table hierarchy; the page
//! offset is carried over into the physical address untranslated.
//!
//! ```text
//! 38           30 29          21 20          12 11            0
//! ┌──────────────┬──────────────┬──────────────┬───────────────┐
//! │    VPN[2]    │    VPN[1]    │    VPN[0]    │  page offset  │
//! └──────────────┴──────────────┴──────────────┴───────────────┘
//!      9bits          9bits          9bits           12bits
//!                      Sv39 Virtual Address
//! ```
//!
//! Sv32 uses two levels of 10-bit segments with 4-byte entries; Sv39, Sv48
//! and Sv57 use three to five levels of 9-bit segments with 8-byte entries.
//! When the hypervisor extension performs G-stage translation, the root page
//! table is four times larger and the top segment gains two extra bits
//! (Sv32x4, Sv39x4, ...).

mod pte;

pub use pte::*;

use crate::csr::VmMode;
use static_assertions::const_assert;

/// How large each page of simulated memory is
pub const PAGESIZE: u64 = 4096;
const_assert!(PAGESIZE.is_power_of_two());

/// The number of bits in the page offset
pub const PAGE_OFFSET_BITS: u32 = 12;

/// The kind of memory access being performed, as distinguished by the
/// permission and fault model
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum AccessKind {
    Read,
    Write,
    Execute,
}

impl AccessKind {
    /// The page-fault exception corresponding to this access kind
    pub fn page_fault(self) -> crate::trap::Exception {
        match self {
            AccessKind::Read => crate::trap::Exception::LoadPageFault,
            AccessKind::Write => crate::trap::Exception::StorePageFault,
            AccessKind::Execute => crate::trap::Exception::InstructionPageFault,
        }
    }

    /// The access-fault exception corresponding to this access kind
    pub fn access_fault(self) -> crate::trap::Exception {
        match self {
            AccessKind::Read => crate::trap::Exception::LoadAccessFault,
            AccessKind::Write => crate::trap::Exception::StoreAccessFault,
            AccessKind::Execute => crate::trap::Exception::InstructionAccessFault,
        }
    }

    /// The guest-page-fault exception corresponding to this access kind
    pub fn guest_page_fault(self) -> crate::trap::Exception {
        match self {
            AccessKind::Read => crate::trap::Exception::LoadGuestPageFault,
            AccessKind::Write => crate::trap::Exception::StoreGuestPageFault,
            AccessKind::Execute => crate::trap::Exception::InstructionGuestPageFault,
        }
    }

    /// The misaligned-address exception corresponding to this access kind
    pub fn misaligned_fault(self) -> crate::trap::Exception {
        match self {
            AccessKind::Read => crate::trap::Exception::LoadAddressMisaligned,
            AccessKind::Write => crate::trap::Exception::StoreAddressMisaligned,
            AccessKind::Execute => crate::trap::Exception::InstructionAddressMisaligned,
        }
    }
}

/// Table walk geometry of one translation scheme
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PagingGeometry {
    /// Number of page table levels
    pub levels: u32,
    /// Bits per VPN segment
    pub vpn_bits: u32,
    /// Size of one page table entry in bytes
    pub pte_bytes: u64,
    /// Total virtual address bits (before any G-stage widening)
    pub va_bits: u32,
}

impl PagingGeometry {
    /// Geometry for the given translation mode; `None` for [`VmMode::Bare`]
    pub fn of(mode: VmMode) -> Option<PagingGeometry> {
        match mode {
            VmMode::Bare => None,
            VmMode::Sv32 => Some(PagingGeometry {
                levels: 2,
                vpn_bits: 10,
                pte_bytes: 4,
                va_bits: 32,
            }),
            VmMode::Sv39 => Some(PagingGeometry {
                levels: 3,
                vpn_bits: 9,
                pte_bytes: 8,
                va_bits: 39,
            }),
            VmMode::Sv48 => Some(PagingGeometry {
                levels: 4,
                vpn_bits: 9,
                pte_bytes: 8,
                va_bits: 48,
            }),
            VmMode::Sv57 => Some(PagingGeometry {
                levels: 5,
                vpn_bits: 9,
                pte_bytes: 8,
                va_bits: 57,
            }),
        }
    }

    /// The VPN segment indexing the page table at `level`
    /// (level counts down from `levels - 1` at the root to 0 at the leaf)
    pub fn vpn_segment(&self, vaddr: u64, level: u32, widened: bool) -> u64 {
        let shift = PAGE_OFFSET_BITS + level * self.vpn_bits;
        let mut bits = self.vpn_bits;
        if widened && level == self.levels - 1 {
            // the root of a G-stage table covers a 2-bit wider address space
            bits += 2;
        }
        (vaddr >> shift) & ((1 << bits) - 1)
    }

    /// Check that the upper bits of `vaddr` are a sign extension of the
    /// topmost translated bit, as required for the Sv39 and larger schemes.
    /// G-stage addresses are zero-extended instead.
    pub fn va_in_range(&self, vaddr: u64, widened: bool) -> bool {
        if widened {
            vaddr >> (self.va_bits + 2) == 0
        } else if self.va_bits >= 64 {
            true
        } else {
            let shift = self.va_bits - 1;
            let upper = vaddr as i64 >> shift;
            upper == 0 || upper == -1
        }
    }

    /// Alignment requirement in bits for a leaf mapping at `level`
    pub fn superpage_bits(&self, level: u32) -> u32 {
        PAGE_OFFSET_BITS + level * self.vpn_bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sv39_segments() {
        let geom = PagingGeometry::of(VmMode::Sv39).unwrap();
        let vaddr = 0x0000_003f_ffff_f000u64;
        assert_eq!(geom.vpn_segment(vaddr, 0, false), 0x1ff);
        assert_eq!(geom.vpn_segment(vaddr, 1, false), 0x1ff);
        assert_eq!(geom.vpn_segment(vaddr, 2, false), 0xff);
    }

    #[test]
    fn test_va_range_checks() {
        let geom = PagingGeometry::of(VmMode::Sv39).unwrap();
        assert!(geom.va_in_range(0x0000_003f_ffff_ffff, false));
        assert!(geom.va_in_range(0xffff_ffc0_0000_0000, false));
        assert!(!geom.va_in_range(0x0000_0040_0000_0000, false));
        // G-stage: zero extension, two extra bits
        assert!(geom.va_in_range(0x0000_00ff_ffff_ffff, true));
        assert!(!geom.va_in_range(0x0000_0100_0000_0000, true));
    }

    #[test]
    fn test_widened_root_segment() {
        let geom = PagingGeometry::of(VmMode::Sv39).unwrap();
        // bits 38:30 are 0x1ff and the widened bits 40:39 are set
        let gpa = 0x0000_01ff_c000_0000u64;
        assert_eq!(geom.vpn_segment(gpa, 2, true), 0x7ff);
        assert_eq!(geom.vpn_segment(gpa, 2, false), 0x1ff);
    }
}
