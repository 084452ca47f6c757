//! Physical memory attributes
//!
//! Beyond protection, each physical range has fixed attributes deciding
//! whether it backs cacheable RAM, device registers, or nothing at all.
//! A derived model refines the default classification through the
//! extension hook table; the built-in default treats the whole space as
//! idempotent main memory so bare configurations just work.

use bitflags::bitflags;

bitflags! {
    /// Attribute set of one physical range
    #[derive(Debug, Copy, Clone, Eq, PartialEq)]
    pub struct Pma: u8 {
        /// Reads/writes are served at all (clear = access fault)
        const MAPPED = 1 << 0;
        /// May be cached; cache management operations apply
        const CACHEABLE = 1 << 1;
        /// Reads are idempotent; speculative access is harmless
        const IDEMPOTENT = 1 << 2;
        /// LR/SC reservations may target this range
        const RESERVABLE = 1 << 3;
        /// AMOs are supported by the backing store
        const ATOMIC = 1 << 4;
        /// Device range: accesses have side effects and end a block
        const DEVICE = 1 << 5;
    }
}

impl Pma {
    /// Main memory: everything allowed
    pub fn ram() -> Self {
        Pma::MAPPED | Pma::CACHEABLE | Pma::IDEMPOTENT | Pma::RESERVABLE | Pma::ATOMIC
    }

    /// A device region: mapped, nothing else
    pub fn device() -> Self {
        Pma::MAPPED | Pma::DEVICE
    }

    /// An unmapped hole
    pub fn unmapped() -> Self {
        Pma::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classes() {
        assert!(Pma::ram().contains(Pma::RESERVABLE | Pma::ATOMIC));
        assert!(!Pma::device().contains(Pma::IDEMPOTENT));
        assert!(!Pma::unmapped().contains(Pma::MAPPED));
    }
}
