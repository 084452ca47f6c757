//! Translation lookaside buffers
//!
//! One buffer per translation stage: HS-level (`satp`), VS stage 1
//! (`vsatp`) and VS stage 2 (`hgatp`).
//! Entries are installed per 4 KiB page even when the mapping came from a
//! superpage leaf, so a lookup never has to probe multiple levels.

use riscv::mem::EntryFlags;
use std::collections::HashMap;

/// The translation stage a buffer caches
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Stage {
    /// HS-level translation through `satp`
    Hs,
    /// VS stage 1 translation through `vsatp`
    Vs1,
    /// G-stage translation through `hgatp` (keyed by VMID)
    Vs2,
}

/// Privilege class an entry was filled for; user and supervisor accesses
/// keep separate entries so a flush can stay selective
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PrivClass {
    User,
    Supervisor,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
struct TlbKey {
    vpn: u64,
    /// ASID for stage 1 buffers, VMID for the G-stage
    asid: u16,
    class: PrivClass,
}

#[derive(Debug, Copy, Clone)]
pub struct TlbEntry {
    pub ppn: u64,
    pub flags: EntryFlags,
    /// Entries from global mappings survive ASID-selective flushes
    pub global: bool,
    /// Whether the walk already observed the dirty bit set
    pub dirty: bool,
}

#[derive(Debug, Default)]
pub struct Tlb {
    map: HashMap<TlbKey, TlbEntry>,
}

impl Tlb {
    pub fn lookup(&self, vpn: u64, asid: u16, class: PrivClass) -> Option<&TlbEntry> {
        self.map.get(&TlbKey { vpn, asid, class }).or_else(|| {
            // global mappings are installed under ASID 0 and match any
            self.map
                .get(&TlbKey { vpn, asid: 0, class })
                .filter(|entry| entry.global)
        })
    }

    pub fn install(&mut self, vpn: u64, asid: u16, class: PrivClass, entry: TlbEntry) {
        let asid = if entry.global { 0 } else { asid };
        self.map.insert(TlbKey { vpn, asid, class }, entry);
    }

    /// SFENCE.VMA semantics: drop entries matching the optional virtual
    /// page and ASID filters; global entries ignore the ASID filter
    pub fn invalidate(&mut self, vpn: Option<u64>, asid: Option<u16>) {
        self.map.retain(|key, entry| {
            if let Some(vpn) = vpn {
                if key.vpn != vpn {
                    return true;
                }
            }
            if let Some(asid) = asid {
                // an ASID-filtered fence leaves global mappings alone
                if entry.global || key.asid != asid {
                    return true;
                }
            }
            false
        });
    }

    pub fn flush(&mut self) {
        self.map.clear();
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }
}

/// The three buffers of a hart
#[derive(Debug, Default)]
pub struct Tlbs {
    hs: Tlb,
    vs1: Tlb,
    vs2: Tlb,
}

impl Tlbs {
    pub fn get(&self, stage: Stage) -> &Tlb {
        match stage {
            Stage::Hs => &self.hs,
            Stage::Vs1 => &self.vs1,
            Stage::Vs2 => &self.vs2,
        }
    }

    pub fn get_mut(&mut self, stage: Stage) -> &mut Tlb {
        match stage {
            Stage::Hs => &mut self.hs,
            Stage::Vs1 => &mut self.vs1,
            Stage::Vs2 => &mut self.vs2,
        }
    }

    pub fn flush(&mut self, stage: Stage) {
        self.get_mut(stage).flush();
    }

    pub fn flush_all(&mut self) {
        self.hs.flush();
        self.vs1.flush();
        self.vs2.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(global: bool) -> TlbEntry {
        TlbEntry {
            ppn: 0x80042,
            flags: EntryFlags::Read | EntryFlags::Valid,
            global,
            dirty: false,
        }
    }

    #[test]
    fn test_lookup_by_asid() {
        let mut tlb = Tlb::default();
        tlb.install(0x10, 7, PrivClass::Supervisor, entry(false));
        assert!(tlb.lookup(0x10, 7, PrivClass::Supervisor).is_some());
        assert!(tlb.lookup(0x10, 8, PrivClass::Supervisor).is_none());
        assert!(tlb.lookup(0x10, 7, PrivClass::User).is_none());
    }

    #[test]
    fn test_global_matches_any_asid() {
        let mut tlb = Tlb::default();
        tlb.install(0x10, 7, PrivClass::Supervisor, entry(true));
        assert!(tlb.lookup(0x10, 3, PrivClass::Supervisor).is_some());
    }

    #[test]
    fn test_selective_invalidate() {
        let mut tlb = Tlb::default();
        tlb.install(0x10, 7, PrivClass::Supervisor, entry(false));
        tlb.install(0x11, 7, PrivClass::Supervisor, entry(false));
        tlb.install(0x10, 8, PrivClass::Supervisor, entry(false));
        // page filter only
        tlb.invalidate(Some(0x10), None);
        assert!(tlb.lookup(0x10, 7, PrivClass::Supervisor).is_none());
        assert!(tlb.lookup(0x10, 8, PrivClass::Supervisor).is_none());
        assert!(tlb.lookup(0x11, 7, PrivClass::Supervisor).is_some());
        // asid filter only
        tlb.install(0x10, 7, PrivClass::Supervisor, entry(false));
        tlb.invalidate(None, Some(7));
        assert!(tlb.lookup(0x10, 7, PrivClass::Supervisor).is_none());
        assert!(tlb.lookup(0x11, 7, PrivClass::Supervisor).is_none());
    }

    #[test]
    fn test_asid_filter_spares_global_entries() {
        let mut tlb = Tlb::default();
        tlb.install(0x20, 5, PrivClass::Supervisor, entry(true));
        tlb.invalidate(None, Some(5));
        assert!(tlb.lookup(0x20, 5, PrivClass::Supervisor).is_some());
        tlb.invalidate(None, None);
        assert!(tlb.lookup(0x20, 5, PrivClass::Supervisor).is_none());
    }
}
