//! Hart construction parameters
//!
//! A [`Config`] is consulted once when a hart is created; everything that
//! can change afterwards (writable `misa` bits, `mstatus` fields) lives in
//! the CSR state instead.

use riscv::isa::{Architecture, Xlen};
use thiserror::Error;

/// What to do with a load or store that is not naturally aligned
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MisalignedPolicy {
    /// Raise an address-misaligned exception
    Trap,
    /// Split the access into byte accesses (atomics still trap)
    Emulate,
}

/// Behavior of the WFI instruction
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum WfiPolicy {
    /// Complete immediately
    Nop,
    /// Stall the hart until an interrupt becomes pending
    Wait,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Integer register width
    pub xlen: Xlen,
    /// Floating point register width: 0, 32 or 64
    pub flen: u32,
    /// Vector register width in bits (power of two, >= 8)
    pub vlen: u32,
    /// Maximum vector element width
    pub elen: u32,
    /// Implemented features
    pub arch: Architecture,
    /// `misa` letters that may be cleared and set again at runtime
    pub writable_misa: Architecture,
    /// Number of implemented PMP entries (0..=64)
    pub pmp_entries: u32,
    /// Granularity of LR/SC reservations in bytes (power of two)
    pub reservation_bytes: u64,
    /// Cache block size for the Zicbom/Zicboz operations
    pub cache_block_bytes: u64,
    pub misaligned: MisalignedPolicy,
    pub wfi: WfiPolicy,
    /// Whether the page table walker sets A/D bits itself instead of
    /// raising a page fault when they are clear
    pub update_pte_a_d: bool,
    /// Whether `vsetvl{i}` with `rs1=x0, rd=x0` preserves the current `vl`
    /// (the alternative sets it to the new vlmax)
    pub vsetvl_x0_keeps_vl: bool,
    /// Whether fractional LMUL settings are accepted
    pub fractional_lmul: bool,
    /// Whether tail-agnostic and mask-agnostic policies overwrite with
    /// all-ones (agnostic) instead of leaving elements undisturbed
    pub agnostic_ones: bool,
    /// Whether fault-only-first loads are allowed to truncate `vl`
    pub fault_only_first: bool,
    /// Use the 2.2-revision FMIN/FMAX semantics (any NaN operand poisons
    /// the result) instead of the 2.3/IEEE-2019 ones
    pub legacy_min_max: bool,
    /// PC loaded on reset
    pub reset_vector: u64,
    /// PC loaded on debug entry
    pub debug_vector: u64,
    /// Value reported by `mhartid`
    pub hart_id: u64,
}

impl Config {
    /// A fully featured RV64 configuration used by most tests
    pub fn rv64() -> Self {
        Config {
            xlen: Xlen::Rv64,
            flen: 64,
            vlen: 128,
            elen: 64,
            arch: Architecture::rv64gc()
                | Architecture::V
                | Architecture::H
                | Architecture::ZBA
                | Architecture::ZBB
                | Architecture::ZBS
                | Architecture::ZBC
                | Architecture::ZICOND
                | Architecture::ZICBOM
                | Architecture::ZICBOZ
                | Architecture::SVINVAL,
            writable_misa: Architecture::empty(),
            pmp_entries: 16,
            reservation_bytes: 64,
            cache_block_bytes: 64,
            misaligned: MisalignedPolicy::Trap,
            wfi: WfiPolicy::Nop,
            update_pte_a_d: true,
            vsetvl_x0_keeps_vl: true,
            fractional_lmul: true,
            agnostic_ones: true,
            fault_only_first: true,
            legacy_min_max: false,
            reset_vector: 0x8000_0000,
            debug_vector: 0x800,
            hart_id: 0,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.flen, 0 | 32 | 64) {
            return Err(ConfigError::BadFlen(self.flen));
        }
        if self.arch.contains(Architecture::D) && self.flen < 64 {
            return Err(ConfigError::FlenTooSmall);
        }
        if self.arch.contains(Architecture::F) && self.flen < 32 {
            return Err(ConfigError::FlenTooSmall);
        }
        if self.arch.contains(Architecture::V) {
            if !self.vlen.is_power_of_two() || self.vlen < 8 {
                return Err(ConfigError::BadVlen(self.vlen));
            }
            if !matches!(self.elen, 8 | 16 | 32 | 64) || self.elen > self.vlen {
                return Err(ConfigError::BadElen(self.elen));
            }
        }
        if self.arch.contains(Architecture::H) && !self.arch.contains(Architecture::S) {
            return Err(ConfigError::HypervisorNeedsS);
        }
        if self.pmp_entries > 64 {
            return Err(ConfigError::TooManyPmpEntries(self.pmp_entries));
        }
        if !self.reservation_bytes.is_power_of_two() || !self.cache_block_bytes.is_power_of_two() {
            return Err(ConfigError::BadGranularity);
        }
        Ok(())
    }

    /// XLEN mask for architecturally visible X register bits
    pub fn xmask(&self) -> u64 {
        self.xlen.mask()
    }

    pub fn xbits(&self) -> u32 {
        self.xlen.bits()
    }

    /// Bytes in one vector register
    pub fn vlenb(&self) -> u64 {
        self.vlen as u64 / 8
    }
}

/// A malformed configuration is a caller error, reported before any hart
/// state exists; it never turns into an architectural trap
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    #[error("unsupported FLEN {0}")]
    BadFlen(u32),
    #[error("FLEN too small for the configured float extensions")]
    FlenTooSmall,
    #[error("VLEN {0} is not a power of two >= 8")]
    BadVlen(u32),
    #[error("ELEN {0} is not a valid element width")]
    BadElen(u32),
    #[error("the hypervisor extension requires S-mode")]
    HypervisorNeedsS,
    #[error("at most 64 PMP entries are supported, got {0}")]
    TooManyPmpEntries(u32),
    #[error("reservation and cache block sizes must be powers of two")]
    BadGranularity,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert_eq!(Config::rv64().validate(), Ok(()));
    }

    #[test]
    fn test_validation_catches_mismatches() {
        let mut cfg = Config::rv64();
        cfg.flen = 32;
        assert_eq!(cfg.validate(), Err(ConfigError::FlenTooSmall));
        let mut cfg = Config::rv64();
        cfg.vlen = 96;
        assert_eq!(cfg.validate(), Err(ConfigError::BadVlen(96)));
        let mut cfg = Config::rv64();
        cfg.arch.remove(Architecture::S);
        assert_eq!(cfg.validate(), Err(ConfigError::HypervisorNeedsS));
    }
}
