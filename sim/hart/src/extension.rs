//! Derived-model extension hooks
//!
//! A derived model registers one hook table under an opaque id; the hart
//! visits the tables in registration order so the outcome is deterministic.
//! Query hooks return `Option` and the first non-`None` answer wins;
//! notification hooks are delivered to every table.

use crate::mem::pma::Pma;
use crate::trap::Trap;
use riscv::mem::AccessKind;
use riscv::mode::PrivilegeMode;
use riscv::trap::TrapEvent;

/// Callbacks a derived model may implement; every method has a default so
/// implementors override only what they need
#[allow(unused_variables)]
pub trait ExtensionHooks: Send {
    /// A trap was delivered (after the CSR updates)
    fn on_trap(&mut self, event: TrapEvent, epc: u64) {}

    /// The hart was reset
    fn on_reset(&mut self) {}

    /// First look at a raised exception; returning a trap replaces it
    fn filter_exception(&mut self, trap: &Trap, pc: u64) -> Option<Trap> {
        None
    }

    /// Physical memory attributes of a range; `None` falls through
    fn pma(&self, addr: u64, len: u64) -> Option<Pma> {
        None
    }

    /// Refine a positive PMP match; `None` keeps the architectural verdict
    fn refine_pmp(&self, addr: u64, kind: AccessKind, mode: PrivilegeMode) -> Option<bool> {
        None
    }

    /// Validate a loaded page table entry; `Some(false)` forces a page fault
    fn validate_pte(&self, pte_addr: u64, pte: u64) -> Option<bool> {
        None
    }

    /// A cached translation was dropped
    fn on_tlb_invalidate(&mut self) {}

    /// Value of the `time` CSR, when the platform provides a timer
    fn read_time(&self) -> Option<u64> {
        None
    }
}

/// The registered hook tables of one hart
#[derive(Default)]
pub struct ExtensionTable {
    entries: Vec<(u32, Box<dyn ExtensionHooks>)>,
}

impl ExtensionTable {
    /// Register a hook table; the id only needs to be unique per hart
    pub fn register(&mut self, id: u32, hooks: Box<dyn ExtensionHooks>) {
        debug_assert!(
            self.entries.iter().all(|(other, _)| *other != id),
            "duplicate extension id"
        );
        self.entries.push((id, hooks));
    }

    pub fn deregister(&mut self, id: u32) {
        self.entries.retain(|(other, _)| *other != id);
    }

    pub(crate) fn notify_trap(&mut self, event: TrapEvent, epc: u64) {
        for (_, hooks) in &mut self.entries {
            hooks.on_trap(event, epc);
        }
    }

    pub(crate) fn notify_reset(&mut self) {
        for (_, hooks) in &mut self.entries {
            hooks.on_reset();
        }
    }

    pub(crate) fn notify_tlb_invalidate(&mut self) {
        for (_, hooks) in &mut self.entries {
            hooks.on_tlb_invalidate();
        }
    }

    pub(crate) fn filter_exception(&mut self, trap: &Trap, pc: u64) -> Option<Trap> {
        for (_, hooks) in &mut self.entries {
            if let Some(replacement) = hooks.filter_exception(trap, pc) {
                return Some(replacement);
            }
        }
        None
    }

    pub(crate) fn pma(&self, addr: u64, len: u64) -> Option<Pma> {
        self.entries.iter().find_map(|(_, hooks)| hooks.pma(addr, len))
    }

    pub(crate) fn refine_pmp(
        &self,
        addr: u64,
        kind: AccessKind,
        mode: PrivilegeMode,
    ) -> Option<bool> {
        self.entries
            .iter()
            .find_map(|(_, hooks)| hooks.refine_pmp(addr, kind, mode))
    }

    pub(crate) fn validate_pte(&self, pte_addr: u64, pte: u64) -> Option<bool> {
        self.entries
            .iter()
            .find_map(|(_, hooks)| hooks.validate_pte(pte_addr, pte))
    }

    pub(crate) fn read_time(&self) -> Option<u64> {
        self.entries.iter().find_map(|(_, hooks)| hooks.read_time())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DeviceWindow;

    impl ExtensionHooks for DeviceWindow {
        fn pma(&self, addr: u64, _len: u64) -> Option<Pma> {
            (0x1000_0000..0x1000_1000)
                .contains(&addr)
                .then(Pma::device)
        }
    }

    #[test]
    fn test_first_answer_wins_in_registration_order() {
        struct AllRam;
        impl ExtensionHooks for AllRam {
            fn pma(&self, _: u64, _: u64) -> Option<Pma> {
                Some(Pma::ram())
            }
        }
        let mut table = ExtensionTable::default();
        table.register(1, Box::new(DeviceWindow));
        table.register(2, Box::new(AllRam));
        assert_eq!(table.pma(0x1000_0000, 4), Some(Pma::device()));
        assert_eq!(table.pma(0x2000_0000, 4), Some(Pma::ram()));
        table.deregister(1);
        assert_eq!(table.pma(0x1000_0000, 4), Some(Pma::ram()));
    }
}
