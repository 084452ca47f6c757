//! Trap cause codes
//!
//! The cause of a trap is written to the `mcause`/`scause`/`vscause`
//! register of the mode the trap is taken into.
//! The most significant bit of the register distinguishes interrupts from
//! exceptions, the remaining bits hold the cause code.

use crate::isa::Xlen;

/// An exception cause code as written to `xcause`
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Exception {
    InstructionAddressMisaligned,
    InstructionAccessFault,
    IllegalInstruction,
    Breakpoint,
    LoadAddressMisaligned,
    LoadAccessFault,
    StoreAddressMisaligned,
    StoreAccessFault,
    EnvCallFromUMode,
    EnvCallFromSMode,
    EnvCallFromVsMode,
    EnvCallFromMMode,
    InstructionPageFault,
    LoadPageFault,
    StorePageFault,
    InstructionGuestPageFault,
    LoadGuestPageFault,
    VirtualInstruction,
    StoreGuestPageFault,
    Unknown(u32),
}

impl Exception {
    pub fn code(self) -> u32 {
        match self {
            Exception::InstructionAddressMisaligned => 0,
            Exception::InstructionAccessFault => 1,
            Exception::IllegalInstruction => 2,
            Exception::Breakpoint => 3,
            Exception::LoadAddressMisaligned => 4,
            Exception::LoadAccessFault => 5,
            Exception::StoreAddressMisaligned => 6,
            Exception::StoreAccessFault => 7,
            Exception::EnvCallFromUMode => 8,
            Exception::EnvCallFromSMode => 9,
            Exception::EnvCallFromVsMode => 10,
            Exception::EnvCallFromMMode => 11,
            Exception::InstructionPageFault => 12,
            Exception::LoadPageFault => 13,
            Exception::StorePageFault => 15,
            Exception::InstructionGuestPageFault => 20,
            Exception::LoadGuestPageFault => 21,
            Exception::VirtualInstruction => 22,
            Exception::StoreGuestPageFault => 23,
            Exception::Unknown(code) => code,
        }
    }

    /// Whether this exception writes the faulting guest physical address to `xtval2`/`htval`
    pub fn is_guest_page_fault(self) -> bool {
        matches!(
            self,
            Exception::InstructionGuestPageFault
                | Exception::LoadGuestPageFault
                | Exception::StoreGuestPageFault
        )
    }
}

impl From<u32> for Exception {
    fn from(value: u32) -> Self {
        match value {
            0 => Exception::InstructionAddressMisaligned,
            1 => Exception::InstructionAccessFault,
            2 => Exception::IllegalInstruction,
            3 => Exception::Breakpoint,
            4 => Exception::LoadAddressMisaligned,
            5 => Exception::LoadAccessFault,
            6 => Exception::StoreAddressMisaligned,
            7 => Exception::StoreAccessFault,
            8 => Exception::EnvCallFromUMode,
            9 => Exception::EnvCallFromSMode,
            10 => Exception::EnvCallFromVsMode,
            11 => Exception::EnvCallFromMMode,
            12 => Exception::InstructionPageFault,
            13 => Exception::LoadPageFault,
            15 => Exception::StorePageFault,
            20 => Exception::InstructionGuestPageFault,
            21 => Exception::LoadGuestPageFault,
            22 => Exception::VirtualInstruction,
            23 => Exception::StoreGuestPageFault,
            other => Exception::Unknown(other),
        }
    }
}

/// An interrupt cause code as written to `xcause` with the top bit set
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Interrupt {
    SupervisorSoftware,
    VirtualSupervisorSoftware,
    MachineSoftware,
    SupervisorTimer,
    VirtualSupervisorTimer,
    MachineTimer,
    SupervisorExternal,
    VirtualSupervisorExternal,
    MachineExternal,
    SupervisorGuestExternal,
    Unknown(u32),
}

impl Interrupt {
    pub fn code(self) -> u32 {
        match self {
            Interrupt::SupervisorSoftware => 1,
            Interrupt::VirtualSupervisorSoftware => 2,
            Interrupt::MachineSoftware => 3,
            Interrupt::SupervisorTimer => 5,
            Interrupt::VirtualSupervisorTimer => 6,
            Interrupt::MachineTimer => 7,
            Interrupt::SupervisorExternal => 9,
            Interrupt::VirtualSupervisorExternal => 10,
            Interrupt::MachineExternal => 11,
            Interrupt::SupervisorGuestExternal => 12,
            Interrupt::Unknown(code) => code,
        }
    }

    /// The `mip`/`mie` bit this interrupt corresponds to
    pub fn bit(self) -> u64 {
        1 << self.code()
    }
}

impl From<u32> for Interrupt {
    fn from(value: u32) -> Self {
        match value {
            1 => Interrupt::SupervisorSoftware,
            2 => Interrupt::VirtualSupervisorSoftware,
            3 => Interrupt::MachineSoftware,
            5 => Interrupt::SupervisorTimer,
            6 => Interrupt::VirtualSupervisorTimer,
            7 => Interrupt::MachineTimer,
            9 => Interrupt::SupervisorExternal,
            10 => Interrupt::VirtualSupervisorExternal,
            11 => Interrupt::MachineExternal,
            12 => Interrupt::SupervisorGuestExternal,
            other => Interrupt::Unknown(other),
        }
    }
}

/// An indication of the event that caused a trap to trigger
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TrapEvent {
    Interrupt(Interrupt),
    Exception(Exception),
}

impl TrapEvent {
    /// Encode this event into an `xcause` register value
    pub fn to_cause(self, xlen: Xlen) -> u64 {
        match self {
            TrapEvent::Interrupt(int) => (1 << (xlen.bits() - 1)) | int.code() as u64,
            TrapEvent::Exception(exc) => exc.code() as u64,
        }
    }

    /// Decode an `xcause` register value
    pub fn from_cause(cause: u64, xlen: Xlen) -> Self {
        let interrupt_bit = 1 << (xlen.bits() - 1);
        if cause & interrupt_bit != 0 {
            TrapEvent::Interrupt(Interrupt::from((cause & !interrupt_bit) as u32))
        } else {
            TrapEvent::Exception(Exception::from(cause as u32))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cause_roundtrip() {
        for exc in [
            Exception::IllegalInstruction,
            Exception::StoreAccessFault,
            Exception::VirtualInstruction,
            Exception::StoreGuestPageFault,
        ] {
            let cause = TrapEvent::Exception(exc).to_cause(Xlen::Rv64);
            assert_eq!(TrapEvent::from_cause(cause, Xlen::Rv64), TrapEvent::Exception(exc));
        }
        let cause = TrapEvent::Interrupt(Interrupt::SupervisorTimer).to_cause(Xlen::Rv32);
        assert_eq!(cause, 0x8000_0005);
    }

    #[test]
    fn test_guest_page_fault_codes() {
        assert_eq!(Exception::StoreGuestPageFault.code(), 23);
        assert!(Exception::LoadGuestPageFault.is_guest_page_fault());
        assert!(!Exception::LoadPageFault.is_guest_page_fault());
    }
}
