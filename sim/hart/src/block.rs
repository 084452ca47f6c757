//! Per-block translation state
//!
//! While a block of instructions is being morphed, the emitter accumulates
//! knowledge that is invariant for the rest of the block: which floating
//! point registers are known to be NaN-boxed, the active SEW/LMUL, whether
//! `vstart` is known to be zero, and whether the FS/VS dirty bits have
//! already been raised.
//! A new block links to its predecessor so inherited assumptions survive
//! block chaining; an instruction that invalidates an assumption clears it
//! here, and the checks it guarded are emitted again.

use riscv::vtype::VType;

/// Known zero/non-zero state of the active vector length
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum VlClass {
    #[default]
    Unknown,
    Zero,
    NonZero,
    Max,
}

/// Assumptions currently established for the block being executed
#[derive(Debug, Clone, Default)]
pub struct BlockState {
    /// Address the block was entered at
    pub pc: u64,
    /// Bitmask of floating point registers known to hold NaN-boxed 32-bit
    /// values (bit per register)
    pub nan_box32: u32,
    /// Same for 16-bit values
    pub nan_box16: u32,
    /// Known active SEW in bits; `None` when vtype may have changed
    pub sew: Option<u32>,
    /// Known active LMUL (times eight)
    pub lmul_x8: Option<u32>,
    pub vl_class: VlClass,
    /// Whether `vstart` is known to be zero
    pub vstart_zero: bool,
    /// Whether `mstatus.FS` is already known dirty, so the write can be elided
    pub fs_dirty: bool,
    /// Same for `mstatus.VS`
    pub vs_dirty: bool,
    /// Whether the dynamic rounding mode has been validated in this block
    pub rm_checked: bool,
    /// The block chain this state was inherited from
    pub prev: Option<Box<BlockState>>,
}

impl BlockState {
    /// Start a new block at `pc`, inheriting the invariants that survive a
    /// control transfer from the predecessor state
    pub fn link(prev: BlockState, pc: u64) -> Self {
        BlockState {
            pc,
            // register-file invariants survive a jump, per-block ones do not
            nan_box32: prev.nan_box32,
            nan_box16: prev.nan_box16,
            sew: prev.sew,
            lmul_x8: prev.lmul_x8,
            vl_class: prev.vl_class,
            vstart_zero: prev.vstart_zero,
            fs_dirty: prev.fs_dirty,
            vs_dirty: prev.vs_dirty,
            rm_checked: false,
            prev: Some(Box::new(prev)),
        }
    }

    /// Detach from the predecessor chain on block exit
    pub fn unlink(&mut self) {
        self.prev = None;
    }

    /// Record that a register now holds a NaN-boxed value of the given width
    pub fn set_boxed(&mut self, index: u32, bits: u32) {
        match bits {
            32 => self.nan_box32 |= 1 << index,
            16 => self.nan_box16 |= 1 << index,
            _ => {}
        }
    }

    /// Record that a register was overwritten with an unknown pattern
    pub fn clear_boxed(&mut self, index: u32) {
        self.nan_box32 &= !(1 << index);
        self.nan_box16 &= !(1 << index);
    }

    pub fn is_boxed(&self, index: u32, bits: u32) -> bool {
        match bits {
            32 => self.nan_box32 & (1 << index) != 0,
            16 => self.nan_box16 & (1 << index) != 0,
            _ => true,
        }
    }

    /// A write to `vtype`/`vl` invalidates the derived vector knowledge
    pub fn invalidate_vtype(&mut self) {
        self.sew = None;
        self.lmul_x8 = None;
        self.vl_class = VlClass::Unknown;
    }

    /// Record the configuration installed by a vset instruction
    pub fn learn_vtype(&mut self, vtype: VType, vl: u64, vlmax: u64) {
        self.sew = vtype.sew();
        self.lmul_x8 = vtype.lmul_x8();
        self.vl_class = if vl == 0 {
            VlClass::Zero
        } else if vl == vlmax {
            VlClass::Max
        } else {
            VlClass::NonZero
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_inherits_register_invariants() {
        let mut first = BlockState {
            pc: 0x1000,
            ..Default::default()
        };
        first.set_boxed(3, 32);
        first.fs_dirty = true;
        first.rm_checked = true;
        let second = BlockState::link(first, 0x2000);
        assert!(second.is_boxed(3, 32));
        assert!(second.fs_dirty);
        assert!(!second.rm_checked, "rm validity does not survive a block end");
        assert_eq!(second.prev.as_ref().unwrap().pc, 0x1000);
    }

    #[test]
    fn test_boxed_tracking() {
        let mut block = BlockState::default();
        block.set_boxed(7, 16);
        assert!(block.is_boxed(7, 16));
        assert!(!block.is_boxed(7, 32));
        block.clear_boxed(7);
        assert!(!block.is_boxed(7, 16));
        // 64-bit values need no box
        assert!(block.is_boxed(7, 64));
    }

    #[test]
    fn test_vtype_knowledge() {
        let mut block = BlockState::default();
        let vtype = VType::encode(1, 2, true, true);
        block.learn_vtype(vtype, 8, 8);
        assert_eq!(block.sew, Some(32));
        assert_eq!(block.lmul_x8, Some(16));
        assert_eq!(block.vl_class, VlClass::Max);
        block.invalidate_vtype();
        assert_eq!(block.sew, None);
        assert_eq!(block.vl_class, VlClass::Unknown);
    }
}
