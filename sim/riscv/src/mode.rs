//! Privilege modes of a hart
//!
//! The base specification defines the Machine, Supervisor and User privilege
//! levels.
//! With the hypervisor extension, Supervisor becomes HS and two *virtual*
//! modes VS and VU are added; the virtualisation bit V is implicit in which
//! variant is active.
//! Debug mode sits above everything and is entered through the debug module
//! only.

/// The privilege mode a hart is currently executing in.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PrivilegeMode {
    /// User mode (V=0)
    User,
    /// Supervisor mode; called HS when the hypervisor extension is present (V=0)
    Supervisor,
    /// Virtual user mode (V=1)
    VirtualUser,
    /// Virtual supervisor mode (V=1)
    VirtualSupervisor,
    /// Machine mode
    Machine,
    /// Debug mode
    Debug,
}

impl PrivilegeMode {
    /// The two-bit encoding of this mode as stored in `mstatus.MPP` or reported by `mnstatus.MNPP`
    pub fn encoding(self) -> u8 {
        match self {
            PrivilegeMode::User | PrivilegeMode::VirtualUser => 0,
            PrivilegeMode::Supervisor | PrivilegeMode::VirtualSupervisor => 1,
            PrivilegeMode::Machine => 3,
            // debug mode reports the mode it was entered from, not itself;
            // callers must not ask for an encoding of Debug
            PrivilegeMode::Debug => unreachable!("debug mode has no MPP encoding"),
        }
    }

    /// Construct a mode from its `MPP`/`SPP` encoding and the saved virtualisation bit
    pub fn from_encoding(enc: u8, virt: bool) -> Self {
        match (enc, virt) {
            (0, false) => PrivilegeMode::User,
            (0, true) => PrivilegeMode::VirtualUser,
            (1, false) => PrivilegeMode::Supervisor,
            (1, true) => PrivilegeMode::VirtualSupervisor,
            (3, _) => PrivilegeMode::Machine,
            _ => PrivilegeMode::User,
        }
    }

    /// Whether the virtualisation bit V is set in this mode
    pub fn is_virtual(self) -> bool {
        matches!(
            self,
            PrivilegeMode::VirtualUser | PrivilegeMode::VirtualSupervisor
        )
    }

    /// The non-virtual mode this mode maps onto (VS behaves like S, VU like U)
    pub fn base(self) -> Self {
        match self {
            PrivilegeMode::VirtualUser => PrivilegeMode::User,
            PrivilegeMode::VirtualSupervisor => PrivilegeMode::Supervisor,
            other => other,
        }
    }

    /// Numeric privilege level used for "at least as privileged as" checks.
    ///
    /// Virtual modes compare like their base modes; a separate
    /// [`is_virtual`](Self::is_virtual) check decides between Illegal and
    /// Virtual Instruction exceptions.
    pub fn level(self) -> u8 {
        match self.base() {
            PrivilegeMode::User => 0,
            PrivilegeMode::Supervisor => 1,
            PrivilegeMode::Machine => 3,
            PrivilegeMode::Debug => 4,
            _ => unreachable!(),
        }
    }

    /// Short lowercase name as used in log messages
    pub fn name(self) -> &'static str {
        match self {
            PrivilegeMode::User => "u",
            PrivilegeMode::Supervisor => "s",
            PrivilegeMode::VirtualUser => "vu",
            PrivilegeMode::VirtualSupervisor => "vs",
            PrivilegeMode::Machine => "m",
            PrivilegeMode::Debug => "debug",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_roundtrip() {
        for (mode, enc, virt) in [
            (PrivilegeMode::User, 0, false),
            (PrivilegeMode::Supervisor, 1, false),
            (PrivilegeMode::VirtualUser, 0, true),
            (PrivilegeMode::VirtualSupervisor, 1, true),
            (PrivilegeMode::Machine, 3, false),
        ] {
            assert_eq!(mode.encoding(), enc);
            assert_eq!(PrivilegeMode::from_encoding(enc, virt), mode);
        }
    }

    #[test]
    fn test_levels_are_ordered() {
        assert!(PrivilegeMode::User.level() < PrivilegeMode::Supervisor.level());
        assert!(PrivilegeMode::Supervisor.level() < PrivilegeMode::Machine.level());
        assert_eq!(
            PrivilegeMode::VirtualSupervisor.level(),
            PrivilegeMode::Supervisor.level()
        );
    }
}
