//! Instruction dispatch
//!
//! Every operation tag maps to one emitter function.
//! Dispatch first validates architectural enablement (static feature
//! presence plus the runtime-dependent parts: writable `misa` letters and
//! the `mstatus.FS`/`VS` unit gates), then the rounding mode when the
//! instruction carries one, and finally runs the emitter body.

mod alu;
mod atomic;
mod branch;
pub(crate) mod fpu;
mod ldst;
mod sysop;

use crate::trap::Trap;
use crate::Hart;
use decoder::{InstrInfo, Op, RegClass};
use riscv::csr::ExtState;
use riscv::isa::Architecture;

/// How execution continues after an emitter
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Flow {
    /// Fall through to the next instruction
    Next,
    /// Control transfer to the given PC; ends the block
    Jump(u64),
    /// Fall through, but the block ends here (WFI, fences, CSR writes
    /// with side effects on translation)
    Stop,
}

pub(crate) type EmitResult = Result<Flow, Trap>;

/// The per-instruction context handed to an emitter
pub(crate) struct MorphState<'a> {
    pub hart: &'a mut Hart,
    pub info: &'a InstrInfo,
}

impl MorphState<'_> {
    /// Source operand `r[i]`, zero-extended; 32-bit operands present
    /// their low half
    pub fn src(&self, i: usize) -> u64 {
        let desc = self.info.r[i];
        debug_assert_eq!(desc.class(), RegClass::X);
        let value = self.hart.state.x(desc.index());
        if desc.bits() == 32 {
            value & 0xffff_ffff
        } else {
            value
        }
    }

    /// Source operand `r[i]` as a signed value of its width
    pub fn src_signed(&self, i: usize) -> i64 {
        let desc = self.info.r[i];
        let value = self.hart.state.x(desc.index());
        if desc.bits() == 32 {
            value as u32 as i32 as i64
        } else {
            value as i64
        }
    }

    /// Write the destination register, truncating and sign-extending
    /// 32-bit results
    pub fn set_xd(&mut self, value: u64) {
        let desc = self.info.r[0];
        debug_assert_eq!(desc.class(), RegClass::X);
        if desc.bits() == 32 {
            self.hart.state.set_x32(desc.index(), value as u32);
        } else {
            self.hart.state.set_x(desc.index(), value);
        }
    }

    /// Shift-amount mask of the destination width
    pub fn shamt_mask(&self) -> u64 {
        if self.info.r[0].bits() == 32 {
            31
        } else {
            63
        }
    }

    /// Floating point source operand `r[i]`, NaN-box checked at its width
    pub fn f(&self, i: usize) -> u64 {
        let desc = self.info.r[i];
        debug_assert_eq!(desc.class(), RegClass::F);
        self.hart.state.f(desc.index(), desc.bits())
    }

    /// Write the floating point destination with NaN boxing, updating the
    /// block's boxed-register knowledge and the dirty bit
    pub fn set_fd(&mut self, value: u64) {
        let desc = self.info.r[0];
        debug_assert_eq!(desc.class(), RegClass::F);
        self.hart.state.set_f(desc.index(), desc.bits(), value);
        self.hart.block.set_boxed(desc.index(), desc.bits());
        self.hart.dirty_fs();
    }

    pub fn imm(&self) -> i64 {
        self.info.imm
    }

    /// Raise Illegal (or Virtual) Instruction for this instruction
    pub fn illegal(&self, reason: &str) -> Trap {
        self.hart.illegal_instruction(reason, false)
    }
}

/// Whether this instruction terminates a translated block: control
/// transfer, privileged transition, or a CSR write with translation side
/// effects (checked at translate time since the CSR number is immediate)
pub(crate) fn ends_block(info: &InstrInfo) -> bool {
    match info.op {
        Op::Jal | Op::Jalr | Op::Beq | Op::Bne | Op::Blt | Op::Bge | Op::Bltu | Op::Bgeu => true,
        Op::Ecall | Op::Ebreak | Op::Mret | Op::Mnret | Op::Sret | Op::Dret | Op::Wfi => true,
        Op::Fence | Op::FenceI | Op::SfenceVma | Op::SinvalVma | Op::SfenceWInval
        | Op::SfenceInvalIr | Op::HfenceVvma | Op::HfenceGvma => true,
        Op::Csrr | Op::Csrri => match crate::csr::lookup(info.csr) {
            Some(attrs) => attrs.flags.contains(crate::csr::CsrFlags::END_BLOCK),
            None => true,
        },
        _ => false,
    }
}

/// Verify that every feature the instruction requires is present and
/// currently enabled
fn instruction_enabled(hart: &Hart, info: &InstrInfo) -> Result<(), Trap> {
    if !hart.enabled.contains(info.arch) {
        return Err(hart.illegal_instruction("required extension absent or disabled", false));
    }
    let fp_needed = info.arch.intersects(
        Architecture::F | Architecture::D | Architecture::ZFH | Architecture::ZFHMIN,
    );
    if fp_needed && hart.csrs.mstatus().fs() == ExtState::Off {
        return Err(hart.illegal_instruction("floating point unit is off", false));
    }
    if info.arch.contains(Architecture::V) && hart.csrs.mstatus().vs() == ExtState::Off {
        return Err(hart.illegal_instruction("vector unit is off", false));
    }
    Ok(())
}

/// Dispatch a decoded instruction to its emitter
pub(crate) fn dispatch(hart: &mut Hart, info: &InstrInfo) -> EmitResult {
    if info.is_illegal() {
        return Err(hart.illegal_instruction("no matching encoding", false));
    }
    instruction_enabled(hart, info)?;
    if info.rm.is_reserved() {
        return Err(hart.illegal_instruction("reserved rounding mode", false));
    }

    let mut ms = MorphState { hart, info };
    match info.op {
        // base integer
        Op::Mv | Op::Add | Op::And | Op::Or | Op::Sll | Op::Slt | Op::Sltu | Op::Sra | Op::Srl
        | Op::Sub | Op::Xor | Op::Addi | Op::Andi | Op::Ori | Op::Slti | Op::Sltiu | Op::Slli
        | Op::Srai | Op::Srli | Op::Xori | Op::Lui | Op::Auipc => alu::base(&mut ms),
        // M extension
        Op::Div | Op::Divu | Op::Mul | Op::Mulh | Op::Mulhsu | Op::Mulhu | Op::Rem | Op::Remu => {
            alu::muldiv(&mut ms)
        }
        // bit manipulation and conditional zero
        Op::Shadd | Op::AddUw | Op::SlliUw | Op::Andn | Op::Orn | Op::Xnor | Op::Rol | Op::Ror
        | Op::Rori | Op::Clz | Op::Ctz | Op::Cpop | Op::Min | Op::Max | Op::Minu | Op::Maxu
        | Op::SextB | Op::SextH | Op::ZextH | Op::OrcB | Op::Rev8 | Op::Clmul | Op::Clmulh
        | Op::Clmulr | Op::Bclr | Op::Bset | Op::Binv | Op::Bext | Op::Bclri | Op::Bseti
        | Op::Binvi | Op::Bexti | Op::CzeroEqz | Op::CzeroNez => alu::bitmanip(&mut ms),
        // control transfer
        Op::Jal | Op::Jalr | Op::Beq | Op::Bge | Op::Bgeu | Op::Blt | Op::Bltu | Op::Bne => {
            branch::emit(&mut ms)
        }
        // memory
        Op::Load | Op::Store => ldst::load_store(&mut ms),
        Op::Hlv | Op::Hlvx | Op::Hsv => ldst::hypervisor(&mut ms),
        Op::CboClean | Op::CboFlush | Op::CboInval | Op::CboZero => ldst::cbo(&mut ms),
        // atomics
        Op::Lr | Op::Sc | Op::Amoadd | Op::Amoand | Op::Amomax | Op::Amomaxu | Op::Amomin
        | Op::Amominu | Op::Amoor | Op::Amoswap | Op::Amoxor => atomic::emit(&mut ms),
        // system
        Op::Ecall | Op::Ebreak | Op::Mret | Op::Mnret | Op::Sret | Op::Dret | Op::Wfi
        | Op::Fence | Op::FenceI | Op::SfenceVma | Op::SinvalVma | Op::SfenceWInval
        | Op::SfenceInvalIr | Op::HfenceVvma | Op::HfenceGvma => sysop::emit(&mut ms),
        Op::Csrr | Op::Csrri => sysop::csr(&mut ms),
        // scalar floating point
        Op::Fmv | Op::FmvX | Op::FmvF | Op::Fadd | Op::Fsub | Op::Fmul | Op::Fdiv | Op::Fsqrt
        | Op::Fsgnj | Op::Fsgnjn | Op::Fsgnjx | Op::Fmin | Op::Fmax | Op::Feq | Op::Flt
        | Op::Fle | Op::Fclass | Op::FcvtX | Op::FcvtF | Op::FcvtFF | Op::Fmadd | Op::Fmsub
        | Op::Fnmadd | Op::Fnmsub => fpu::emit(&mut ms),
        // everything vector
        Op::Last => unreachable!("filtered above"),
        _ => crate::vector::emit(&mut ms),
    }
}
