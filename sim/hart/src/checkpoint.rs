//! Save and restore of the architectural state
//!
//! A checkpoint carries the register files plus every CSR the registry
//! does not flag `no_save_restore`; restoring replays the CSR values
//! through the ordinary write path so masks and clamps keep applying.

use crate::csr::{self, CsrFlags};
use crate::state::DisableReason;
use crate::Hart;
use riscv::mode::PrivilegeMode;

#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub pc: u64,
    pub mode: PrivilegeMode,
    pub disable: DisableReason,
    xreg: [u64; 32],
    freg: [u64; 32],
    vreg: Vec<u8>,
    vl: u64,
    vtype: u64,
    csrs: Vec<(u16, u64)>,
}

impl Hart {
    pub fn save(&self) -> Checkpoint {
        let mut xreg = [0u64; 32];
        let mut freg = [0u64; 32];
        for i in 0..32 {
            xreg[i as usize] = self.state.x(i);
            freg[i as usize] = self.state.f_raw(i);
        }
        let csrs = csr::all()
            .filter(|attrs| {
                attrs.write.is_some()
                    && !attrs.flags.contains(CsrFlags::NO_SAVE_RESTORE)
                    && csr::is_present(self, attrs)
            })
            .map(|attrs| (attrs.number, (attrs.read)(self, attrs)))
            .collect();
        Checkpoint {
            pc: self.state.pc,
            mode: self.state.mode,
            disable: self.state.disable,
            xreg,
            freg,
            vreg: self.state.vreg.clone(),
            vl: self.csrs.vl,
            vtype: self.csrs.vtype,
            csrs,
        }
    }

    pub fn restore(&mut self, checkpoint: &Checkpoint) {
        self.state.pc = checkpoint.pc;
        self.state.mode = checkpoint.mode;
        self.state.disable = checkpoint.disable;
        self.state.clear_reservation();
        for i in 0..32 {
            self.state.set_x(i, checkpoint.xreg[i as usize]);
            self.state.set_f_raw(i, checkpoint.freg[i as usize]);
        }
        self.state.vreg.clone_from(&checkpoint.vreg);
        self.csrs.vl = checkpoint.vl;
        self.csrs.vtype = checkpoint.vtype;
        for &(number, value) in &checkpoint.csrs {
            let attrs = csr::lookup(number).expect("checkpoint holds registered CSRs only");
            csr::write(self, attrs, value);
        }
        // stale translations must not survive into the restored state
        self.tlbs.flush_all();
        self.block = Default::default();
        self.block_boundary = true;
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::mem::SparseMem;
    use crate::Hart;

    #[test]
    fn test_save_restore_roundtrip() {
        let mut hart = Hart::new(Config::rv64(), SparseMem::shared(1 << 20)).unwrap();
        hart.state.set_x(5, 0xdead_beef);
        hart.state.set_f(3, 32, 0x4040_0000);
        hart.csrs.mscratch = 0x1234;
        hart.csrs.mtvec = 0x8000_0000;
        hart.csrs.fcsr = 0x23;
        let checkpoint = hart.save();

        hart.state.set_x(5, 0);
        hart.csrs.mscratch = 0;
        hart.csrs.fcsr = 0;
        hart.restore(&checkpoint);

        assert_eq!(hart.state.x(5), 0xdead_beef);
        assert_eq!(hart.state.f(3, 32), 0x4040_0000);
        assert_eq!(hart.csrs.mscratch, 0x1234);
        assert_eq!(hart.csrs.mtvec, 0x8000_0000);
        assert_eq!(hart.csrs.fcsr, 0x23, "fcsr is restored as one unit");
    }
}
