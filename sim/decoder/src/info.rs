//! The decoded instruction record and its component descriptors

use bitflags::bitflags;
use riscv::fp::RmDesc;
use riscv::isa::Architecture;
use static_assertions::assert_eq_size;

/// A packed operand descriptor naming one architectural register.
///
/// ```text
///  15    13  12  11        8  7      5  4        0
/// ┌─────────┬───┬────────────┬─────────┬──────────┐
/// │ (spare) │ U │ width code │  class  │  index   │
/// └─────────┴───┴────────────┴─────────┴──────────┘
/// ```
///
/// The width code is `log2(bits)`; zero means the operand has no inherent
/// width (vector registers take theirs from `vtype`).
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct RegDesc(u16);

assert_eq_size!(RegDesc, u16);

/// Register file an operand lives in
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RegClass {
    None,
    X,
    F,
    V,
}

impl RegDesc {
    pub const NONE: RegDesc = RegDesc(0);

    const CLASS_SHIFT: u16 = 5;
    const WIDTH_SHIFT: u16 = 8;
    const UNSIGNED: u16 = 1 << 12;

    pub fn xreg(index: u32, bits: u32) -> Self {
        Self::new(RegClass::X, index, bits)
    }

    pub fn freg(index: u32, bits: u32) -> Self {
        Self::new(RegClass::F, index, bits)
    }

    pub fn vreg(index: u32) -> Self {
        Self::new(RegClass::V, index, 0)
    }

    fn new(class: RegClass, index: u32, bits: u32) -> Self {
        debug_assert!(index < 32);
        let class_bits = match class {
            RegClass::None => 0,
            RegClass::X => 1,
            RegClass::F => 2,
            RegClass::V => 3,
        };
        let width_code = match bits {
            0 => 0,
            _ => bits.ilog2() as u16,
        };
        RegDesc(index as u16 | (class_bits << Self::CLASS_SHIFT) | (width_code << Self::WIDTH_SHIFT))
    }

    pub fn unsigned(self) -> Self {
        RegDesc(self.0 | Self::UNSIGNED)
    }

    pub fn is_some(self) -> bool {
        self.class() != RegClass::None
    }

    pub fn class(self) -> RegClass {
        match (self.0 >> Self::CLASS_SHIFT) & 0b111 {
            0 => RegClass::None,
            1 => RegClass::X,
            2 => RegClass::F,
            _ => RegClass::V,
        }
    }

    pub fn index(self) -> u32 {
        (self.0 & 0x1f) as u32
    }

    /// Operand width in bits; zero when the width comes from elsewhere
    pub fn bits(self) -> u32 {
        match (self.0 >> Self::WIDTH_SHIFT) & 0xf {
            0 => 0,
            code => 1 << code,
        }
    }

    pub fn is_unsigned(self) -> bool {
        self.0 & Self::UNSIGNED != 0
    }

    /// The same operand with a different width
    pub fn with_bits(self, bits: u32) -> Self {
        let mut desc = Self::new(self.class(), self.index(), bits);
        desc.0 |= self.0 & Self::UNSIGNED;
        desc
    }
}

impl core::fmt::Debug for RegDesc {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.class() {
            RegClass::None => write!(f, "-"),
            RegClass::X => write!(f, "x{}:{}", self.index(), self.bits()),
            RegClass::F => write!(f, "f{}:{}", self.index(), self.bits()),
            RegClass::V => write!(f, "v{}", self.index()),
        }
    }
}

/// Acquire/release semantics of an atomic instruction
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum AqRl {
    #[default]
    None,
    Release,
    Acquire,
    AcquireRelease,
}

impl AqRl {
    pub fn from_bits(aq: bool, rl: bool) -> Self {
        match (aq, rl) {
            (false, false) => AqRl::None,
            (false, true) => AqRl::Release,
            (true, false) => AqRl::Acquire,
            (true, true) => AqRl::AcquireRelease,
        }
    }
}

bitflags! {
    /// Predecessor/successor sets of a FENCE instruction
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
    pub struct FenceSet: u8 {
        const W = 1 << 0;
        const R = 1 << 1;
        const O = 1 << 2;
        const I = 1 << 3;
    }
}

/// Update semantics of a CSR instruction
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum CsrUpdate {
    #[default]
    None,
    ReadWrite,
    ReadSet,
    ReadClear,
}

/// The closed operation enumeration.
///
/// Width variants of the same operation (`ADD`/`ADDW`, `FADD.S`/`FADD.D`)
/// share one tag; the operand descriptors carry the width.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[allow(clippy::upper_case_acronyms)]
pub enum Op {
    // base integer register and immediate operations
    Mv,
    Add,
    And,
    Or,
    Sll,
    Slt,
    Sltu,
    Sra,
    Srl,
    Sub,
    Xor,
    Addi,
    Andi,
    Ori,
    Slti,
    Sltiu,
    Slli,
    Srai,
    Srli,
    Xori,
    Lui,
    Auipc,

    // control transfer
    Jal,
    Jalr,
    Beq,
    Bge,
    Bgeu,
    Blt,
    Bltu,
    Bne,

    // loads and stores (integer and floating point via operand class)
    Load,
    Store,

    // M extension
    Div,
    Divu,
    Mul,
    Mulh,
    Mulhsu,
    Mulhu,
    Rem,
    Remu,

    // A extension
    Lr,
    Sc,
    Amoadd,
    Amoand,
    Amomax,
    Amomaxu,
    Amomin,
    Amominu,
    Amoor,
    Amoswap,
    Amoxor,

    // system
    Ecall,
    Ebreak,
    Mret,
    Mnret,
    Sret,
    Dret,
    Wfi,
    Fence,
    FenceI,
    SfenceVma,
    SinvalVma,
    SfenceWInval,
    SfenceInvalIr,
    HfenceVvma,
    HfenceGvma,
    Csrr,
    Csrri,

    // hypervisor virtual-machine loads and stores
    Hlv,
    Hlvx,
    Hsv,

    // Zicond
    CzeroEqz,
    CzeroNez,

    // Zicbom / Zicboz
    CboClean,
    CboFlush,
    CboInval,
    CboZero,

    // Zba / Zbb / Zbs / Zbc
    Shadd,
    AddUw,
    SlliUw,
    Andn,
    Orn,
    Xnor,
    Rol,
    Ror,
    Rori,
    Clz,
    Ctz,
    Cpop,
    Min,
    Max,
    Minu,
    Maxu,
    SextB,
    SextH,
    ZextH,
    OrcB,
    Rev8,
    Clmul,
    Clmulh,
    Clmulr,
    Bclr,
    Bset,
    Binv,
    Bext,
    Bclri,
    Bseti,
    Binvi,
    Bexti,

    // scalar floating point
    Fmv,
    FmvX,
    FmvF,
    Fadd,
    Fsub,
    Fmul,
    Fdiv,
    Fsqrt,
    Fsgnj,
    Fsgnjn,
    Fsgnjx,
    Fmin,
    Fmax,
    Feq,
    Flt,
    Fle,
    Fclass,
    FcvtX,
    FcvtF,
    FcvtFF,
    Fmadd,
    Fmsub,
    Fnmadd,
    Fnmsub,

    // vector configuration
    Vsetvl,
    Vsetvli,
    Vsetivli,

    // vector loads and stores
    VLoad,
    VLoadStrided,
    VLoadIndexed,
    VStore,
    VStoreStrided,
    VStoreIndexed,

    // vector integer arithmetic
    Vmerge,
    Vadd,
    Vsub,
    Vrsub,
    Vminu,
    Vmin,
    Vmaxu,
    Vmax,
    Vand,
    Vor,
    Vxor,
    Vadc,
    Vmadc,
    Vsbc,
    Vmsbc,
    Vsll,
    Vsrl,
    Vsra,
    Vnsrl,
    Vnsra,
    Vmseq,
    Vmsne,
    Vmsltu,
    Vmslt,
    Vmsleu,
    Vmsle,
    Vmsgtu,
    Vmsgt,
    Vzext,
    Vsext,

    // vector multiply and divide
    Vdivu,
    Vdiv,
    Vremu,
    Vrem,
    Vmul,
    Vmulhu,
    Vmulhsu,
    Vmulh,
    Vmacc,
    Vnmsac,
    Vmadd,
    Vnmsub,

    // vector widening integer
    Vwaddu,
    Vwadd,
    Vwsubu,
    Vwsub,
    VwadduW,
    VwaddW,
    VwsubuW,
    VwsubW,
    Vwmulu,
    Vwmulsu,
    Vwmul,
    Vwmaccu,
    Vwmacc,
    Vwmaccsu,
    Vwmaccus,

    // vector fixed point
    Vsaddu,
    Vsadd,
    Vssubu,
    Vssub,
    Vaaddu,
    Vaadd,
    Vasubu,
    Vasub,
    Vsmul,
    Vssrl,
    Vssra,
    Vnclipu,
    Vnclip,

    // vector reductions
    Vredsum,
    Vredand,
    Vredor,
    Vredxor,
    Vredminu,
    Vredmin,
    Vredmaxu,
    Vredmax,
    Vwredsumu,
    Vwredsum,

    // vector mask operations
    Vcpop,
    Vfirst,
    Vmsbf,
    Vmsof,
    Vmsif,
    Viota,
    Vid,
    Vmandn,
    Vmand,
    Vmor,
    Vmxor,
    Vmorn,
    Vmnand,
    Vmnor,
    Vmxnor,

    // vector permutation
    Vmvxs,
    Vmvsx,
    Vfmvfs,
    Vfmvsf,
    VmvrV,
    Vslideup,
    Vslidedown,
    Vslide1up,
    Vslide1down,
    Vfslide1up,
    Vfslide1down,
    Vrgather,
    Vrgatherei16,
    Vcompress,

    // vector floating point
    Vfadd,
    Vfsub,
    Vfrsub,
    Vfmul,
    Vfdiv,
    Vfrdiv,
    Vfmin,
    Vfmax,
    Vfsgnj,
    Vfsgnjn,
    Vfsgnjx,
    Vfmerge,
    Vmfeq,
    Vmfne,
    Vmflt,
    Vmfle,
    Vmfgt,
    Vmfge,
    Vfmadd,
    Vfnmadd,
    Vfmsub,
    Vfnmsub,
    Vfmacc,
    Vfnmacc,
    Vfmsac,
    Vfnmsac,
    Vfwadd,
    Vfwsub,
    VfwaddW,
    VfwsubW,
    Vfwmul,
    Vfwmacc,
    Vfwnmacc,
    Vfwmsac,
    Vfwnmsac,
    Vfsqrt,
    Vfrsqrte7,
    Vfrece7,
    Vfclass,
    VfcvtXuF,
    VfcvtXF,
    VfcvtFXu,
    VfcvtFX,
    VfwcvtXuF,
    VfwcvtXF,
    VfwcvtFXu,
    VfwcvtFX,
    VfwcvtFF,
    VfncvtXuF,
    VfncvtXF,
    VfncvtFXu,
    VfncvtFX,
    VfncvtFF,
    Vfredusum,
    Vfredosum,
    Vfredmin,
    Vfredmax,
    Vfwredusum,
    Vfwredosum,

    // KEEP LAST: no encoding matched; the dispatcher raises Illegal Instruction
    Last,
}

/// Everything extracted from one decoded instruction.
///
/// The record is pure data: producing it never touches hart state, and the
/// same word always decodes to the same record under the same configuration.
#[derive(Debug, Clone)]
pub struct InstrInfo {
    /// Address the instruction was fetched from
    pub pc: u64,
    /// The raw instruction word
    pub raw: u32,
    /// Instruction size in bytes (2 or 4)
    pub bytes: u8,
    pub op: Op,
    /// Features that must be present and enabled
    pub arch: Architecture,
    /// Argument registers: destination first, then sources
    pub r: [RegDesc; 4],
    /// Vector mask register (`v0`) or none
    pub mask: RegDesc,
    /// Immediate operand / constant
    pub imm: i64,
    /// Constant branch or jump target
    pub tgt: u64,
    /// Memory access size in bits; zero for vector accesses sized by EEW
    pub mem_bits: u32,
    /// Explicit element width of a vector memory access, or the
    /// source-width divisor of vzext/vsext
    pub eew: u32,
    /// Number of fields of a segmented vector access (1 when not segmented)
    pub nf: u8,
    /// Fault-only-first load
    pub ff: bool,
    /// Whole-register load/store/move
    pub whole: bool,
    /// Mask load/store (`vlm.v`/`vsm.v`)
    pub mask_ls: bool,
    /// Unsigned load / zero-extending variant
    pub uns_ext: bool,
    /// Shift amount carried by shNadd
    pub sh_n: u8,
    pub aqrl: AqRl,
    pub pred: FenceSet,
    pub succ: FenceSet,
    pub rm: RmDesc,
    /// CSR address for Csrr/Csrri
    pub csr: u16,
    pub csr_update: CsrUpdate,
}

impl InstrInfo {
    /// An empty record for the given address; the decoder fills it in
    pub fn undecoded(pc: u64, raw: u32) -> Self {
        InstrInfo {
            pc,
            raw,
            bytes: if raw & 0b11 == 0b11 { 4 } else { 2 },
            op: Op::Last,
            arch: Architecture::empty(),
            r: [RegDesc::NONE; 4],
            mask: RegDesc::NONE,
            imm: 0,
            tgt: 0,
            mem_bits: 0,
            eew: 0,
            nf: 1,
            ff: false,
            whole: false,
            mask_ls: false,
            uns_ext: false,
            sh_n: 0,
            aqrl: AqRl::None,
            pred: FenceSet::empty(),
            succ: FenceSet::empty(),
            rm: RmDesc::None,
            csr: 0,
            csr_update: CsrUpdate::None,
        }
    }

    /// Whether no encoding matched this word
    pub fn is_illegal(&self) -> bool {
        self.op == Op::Last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regdesc_packing() {
        let desc = RegDesc::xreg(17, 64);
        assert_eq!(desc.class(), RegClass::X);
        assert_eq!(desc.index(), 17);
        assert_eq!(desc.bits(), 64);
        assert!(!desc.is_unsigned());
        let desc = RegDesc::freg(3, 16).unsigned();
        assert_eq!(desc.class(), RegClass::F);
        assert_eq!(desc.bits(), 16);
        assert!(desc.is_unsigned());
        let desc = desc.with_bits(32);
        assert_eq!(desc.bits(), 32);
        assert!(desc.is_unsigned(), "with_bits keeps modifiers");
        assert!(!RegDesc::NONE.is_some());
        assert_eq!(RegDesc::vreg(8).bits(), 0);
    }
}
