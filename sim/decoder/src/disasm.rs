//! Textual disassembly of decoded instructions
//!
//! Used by trace logging and by the verbose illegal-instruction reports;
//! the output favors being unambiguous over matching any particular
//! assembler's preferred aliases.

use crate::info::{CsrUpdate, InstrInfo, Op, RegClass, RegDesc};
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

fn reg(desc: RegDesc) -> String {
    match desc.class() {
        RegClass::None => String::from("?"),
        RegClass::X => format!("x{}", desc.index()),
        RegClass::F => format!("f{}", desc.index()),
        RegClass::V => format!("v{}", desc.index()),
    }
}

/// Suffix letter of a scalar memory access width
fn width_letter(bits: u32) -> &'static str {
    match bits {
        8 => "b",
        16 => "h",
        32 => "w",
        64 => "d",
        _ => "?",
    }
}

/// Format suffix of a floating point operation width
fn fp_suffix(bits: u32) -> &'static str {
    match bits {
        16 => "h",
        32 => "s",
        64 => "d",
        _ => "?",
    }
}

fn fence_set(set: crate::info::FenceSet) -> String {
    let mut out = String::new();
    for (flag, c) in [
        (crate::info::FenceSet::I, 'i'),
        (crate::info::FenceSet::O, 'o'),
        (crate::info::FenceSet::R, 'r'),
        (crate::info::FenceSet::W, 'w'),
    ] {
        if set.contains(flag) {
            out.push(c);
        }
    }
    out
}

/// The `.vv`/`.vx`/`.vi`/`.vf` operand suffix of a vector instruction
fn vector_suffix(info: &InstrInfo) -> &'static str {
    match info.r[1].class() {
        RegClass::V => ".vv",
        RegClass::X => ".vx",
        RegClass::F => ".vf",
        RegClass::None => ".vi",
    }
}

fn operands(info: &InstrInfo) -> String {
    let mut parts: Vec<String> = Vec::new();
    for desc in info.r {
        if desc.is_some() {
            parts.push(reg(desc));
        }
    }
    if info.r[1].class() == RegClass::None && matches!(info.op, Op::Vadd | Op::Vrsub | Op::Vand
        | Op::Vor | Op::Vxor | Op::Vrgather | Op::Vslideup | Op::Vslidedown | Op::Vadc
        | Op::Vmadc | Op::Vmerge | Op::Vmseq | Op::Vmsne | Op::Vmsleu | Op::Vmsle | Op::Vmsgtu
        | Op::Vmsgt | Op::Vsaddu | Op::Vsadd | Op::Vsll | Op::Vsrl | Op::Vsra | Op::Vssrl
        | Op::Vssra | Op::Vnsrl | Op::Vnsra | Op::Vnclipu | Op::Vnclip)
    {
        parts.push(format!("{}", info.imm));
    }
    if info.mask.is_some() {
        parts.push(String::from("v0.t"));
    }
    parts.join(",")
}

pub fn disassemble(info: &InstrInfo) -> String {
    match info.op {
        Op::Last => return format!(".insn {:#010x}", info.raw),
        Op::Load => {
            let mnem = match info.r[0].class() {
                RegClass::F => format!("fl{}", width_letter(info.mem_bits)),
                _ => format!(
                    "l{}{}",
                    width_letter(info.mem_bits),
                    if info.uns_ext { "u" } else { "" }
                ),
            };
            return format!("{} {},{}({})", mnem, reg(info.r[0]), info.imm, reg(info.r[1]));
        }
        Op::Store => {
            let mnem = match info.r[0].class() {
                RegClass::F => format!("fs{}", width_letter(info.mem_bits)),
                _ => format!("s{}", width_letter(info.mem_bits)),
            };
            return format!("{} {},{}({})", mnem, reg(info.r[0]), info.imm, reg(info.r[1]));
        }
        Op::Csrr | Op::Csrri => {
            let mnem = match (info.csr_update, info.op == Op::Csrri) {
                (CsrUpdate::ReadWrite, false) => "csrrw",
                (CsrUpdate::ReadSet, false) => "csrrs",
                (CsrUpdate::ReadClear, false) => "csrrc",
                (CsrUpdate::ReadWrite, true) => "csrrwi",
                (CsrUpdate::ReadSet, true) => "csrrsi",
                (CsrUpdate::ReadClear, true) => "csrrci",
                _ => "csr?",
            };
            let src = if info.op == Op::Csrri {
                format!("{}", info.imm)
            } else {
                reg(info.r[1])
            };
            return format!("{} {},{:#x},{}", mnem, reg(info.r[0]), info.csr, src);
        }
        Op::Fence => {
            return format!("fence {},{}", fence_set(info.pred), fence_set(info.succ));
        }
        _ => {}
    }

    let mnemonic: String = match info.op {
        Op::Mv => "mv".into(),
        Op::Jal if !info.r[0].is_some() || info.r[0].index() == 0 => "j".into(),
        Op::Jal => "jal".into(),
        Op::Jalr => "jalr".into(),
        Op::Shadd => format!("sh{}add{}", info.sh_n, if info.uns_ext { ".uw" } else { "" }),
        Op::Fadd | Op::Fsub | Op::Fmul | Op::Fdiv | Op::Fsqrt | Op::Fsgnj | Op::Fsgnjn
        | Op::Fsgnjx | Op::Fmin | Op::Fmax | Op::Fmadd | Op::Fmsub | Op::Fnmadd | Op::Fnmsub => {
            format!("{}.{}", base_name(info.op), fp_suffix(info.r[0].bits()))
        }
        Op::Feq | Op::Flt | Op::Fle | Op::Fclass | Op::FmvX | Op::FcvtX => {
            format!("{}.{}", base_name(info.op), fp_suffix(info.r[1].bits()))
        }
        Op::FmvF | Op::FcvtF => {
            format!("{}.{}", base_name(info.op), fp_suffix(info.r[0].bits()))
        }
        Op::FcvtFF => format!(
            "fcvt.{}.{}",
            fp_suffix(info.r[0].bits()),
            fp_suffix(info.r[1].bits())
        ),
        Op::Lr => format!("lr.{}", width_letter(info.mem_bits)),
        Op::Sc => format!("sc.{}", width_letter(info.mem_bits)),
        Op::Amoadd | Op::Amoand | Op::Amomax | Op::Amomaxu | Op::Amomin | Op::Amominu
        | Op::Amoor | Op::Amoswap | Op::Amoxor => {
            format!("{}.{}", base_name(info.op), width_letter(info.mem_bits))
        }
        Op::VLoad if info.whole => format!("vl{}re{}.v", info.nf, info.eew),
        Op::VStore if info.whole => format!("vs{}r.v", info.nf),
        Op::VLoad if info.mask_ls => "vlm.v".into(),
        Op::VStore if info.mask_ls => "vsm.v".into(),
        Op::VLoad => format!("vle{}{}.v", info.eew, if info.ff { "ff" } else { "" }),
        Op::VLoadStrided => format!("vlse{}.v", info.eew),
        Op::VLoadIndexed => format!("vluxei{}.v", info.eew),
        Op::VStore => format!("vse{}.v", info.eew),
        Op::VStoreStrided => format!("vsse{}.v", info.eew),
        Op::VStoreIndexed => format!("vsuxei{}.v", info.eew),
        Op::Vzext => format!("vzext.vf{}", info.eew),
        Op::Vsext => format!("vsext.vf{}", info.eew),
        Op::VmvrV => format!("vmv{}r.v", info.nf),
        op if base_name(op).starts_with('v')
            && !base_name(op).contains('.')
            && !matches!(op, Op::Vsetvl | Op::Vsetvli | Op::Vsetivli) =>
        {
            format!("{}{}", base_name(op), vector_suffix(info))
        }
        op => base_name(op).into(),
    };

    // the 32-bit arithmetic variants carry a w suffix
    let mnemonic = if info.r[0].class() == RegClass::X
        && info.r[0].bits() == 32
        && matches!(
            info.op,
            Op::Add | Op::Sub | Op::Sll | Op::Srl | Op::Sra | Op::Addi | Op::Slli | Op::Srli
                | Op::Srai | Op::Mul | Op::Div | Op::Divu | Op::Rem | Op::Remu | Op::Rol | Op::Ror
                | Op::Rori
        ) {
        format!("{mnemonic}w")
    } else {
        mnemonic
    };

    let ops = operands(info);
    let mut out = if ops.is_empty() { mnemonic } else { format!("{mnemonic} {ops}") };
    match info.op {
        Op::Addi | Op::Andi | Op::Ori | Op::Xori | Op::Slti | Op::Sltiu | Op::Slli | Op::Srli
        | Op::Srai | Op::Lui | Op::Auipc | Op::Rori | Op::Bclri | Op::Bseti | Op::Binvi
        | Op::Bexti | Op::SlliUw => out = format!("{out},{}", info.imm),
        Op::Beq | Op::Bne | Op::Blt | Op::Bge | Op::Bltu | Op::Bgeu | Op::Jal => {
            out = format!("{out},{:#x}", info.tgt)
        }
        Op::Jalr => out = format!("{out},{}", info.imm),
        Op::Vsetvli | Op::Vsetivli => out = format!("{out},{:#x}", info.imm),
        _ => {}
    }
    out
}

/// Mnemonic stem shared by all width/operand variants of an operation
fn base_name(op: Op) -> &'static str {
    match op {
        Op::Add => "add",
        Op::And => "and",
        Op::Or => "or",
        Op::Sll => "sll",
        Op::Slt => "slt",
        Op::Sltu => "sltu",
        Op::Sra => "sra",
        Op::Srl => "srl",
        Op::Sub => "sub",
        Op::Xor => "xor",
        Op::Addi => "addi",
        Op::Andi => "andi",
        Op::Ori => "ori",
        Op::Slti => "slti",
        Op::Sltiu => "sltiu",
        Op::Slli => "slli",
        Op::Srai => "srai",
        Op::Srli => "srli",
        Op::Xori => "xori",
        Op::Lui => "lui",
        Op::Auipc => "auipc",
        Op::Beq => "beq",
        Op::Bge => "bge",
        Op::Bgeu => "bgeu",
        Op::Blt => "blt",
        Op::Bltu => "bltu",
        Op::Bne => "bne",
        Op::Div => "div",
        Op::Divu => "divu",
        Op::Mul => "mul",
        Op::Mulh => "mulh",
        Op::Mulhsu => "mulhsu",
        Op::Mulhu => "mulhu",
        Op::Rem => "rem",
        Op::Remu => "remu",
        Op::Amoadd => "amoadd",
        Op::Amoand => "amoand",
        Op::Amomax => "amomax",
        Op::Amomaxu => "amomaxu",
        Op::Amomin => "amomin",
        Op::Amominu => "amominu",
        Op::Amoor => "amoor",
        Op::Amoswap => "amoswap",
        Op::Amoxor => "amoxor",
        Op::Ecall => "ecall",
        Op::Ebreak => "ebreak",
        Op::Mret => "mret",
        Op::Mnret => "mnret",
        Op::Sret => "sret",
        Op::Dret => "dret",
        Op::Wfi => "wfi",
        Op::FenceI => "fence.i",
        Op::SfenceVma => "sfence.vma",
        Op::SinvalVma => "sinval.vma",
        Op::SfenceWInval => "sfence.w.inval",
        Op::SfenceInvalIr => "sfence.inval.ir",
        Op::HfenceVvma => "hfence.vvma",
        Op::HfenceGvma => "hfence.gvma",
        Op::Hlv => "hlv",
        Op::Hlvx => "hlvx",
        Op::Hsv => "hsv",
        Op::CzeroEqz => "czero.eqz",
        Op::CzeroNez => "czero.nez",
        Op::CboClean => "cbo.clean",
        Op::CboFlush => "cbo.flush",
        Op::CboInval => "cbo.inval",
        Op::CboZero => "cbo.zero",
        Op::AddUw => "add.uw",
        Op::SlliUw => "slli.uw",
        Op::Andn => "andn",
        Op::Orn => "orn",
        Op::Xnor => "xnor",
        Op::Rol => "rol",
        Op::Ror => "ror",
        Op::Rori => "rori",
        Op::Clz => "clz",
        Op::Ctz => "ctz",
        Op::Cpop => "cpop",
        Op::Min => "min",
        Op::Max => "max",
        Op::Minu => "minu",
        Op::Maxu => "maxu",
        Op::SextB => "sext.b",
        Op::SextH => "sext.h",
        Op::ZextH => "zext.h",
        Op::OrcB => "orc.b",
        Op::Rev8 => "rev8",
        Op::Clmul => "clmul",
        Op::Clmulh => "clmulh",
        Op::Clmulr => "clmulr",
        Op::Bclr => "bclr",
        Op::Bset => "bset",
        Op::Binv => "binv",
        Op::Bext => "bext",
        Op::Bclri => "bclri",
        Op::Bseti => "bseti",
        Op::Binvi => "binvi",
        Op::Bexti => "bexti",
        Op::Fmv => "fmv",
        Op::FmvX => "fmv.x",
        Op::FmvF => "fmv.f",
        Op::Fadd => "fadd",
        Op::Fsub => "fsub",
        Op::Fmul => "fmul",
        Op::Fdiv => "fdiv",
        Op::Fsqrt => "fsqrt",
        Op::Fsgnj => "fsgnj",
        Op::Fsgnjn => "fsgnjn",
        Op::Fsgnjx => "fsgnjx",
        Op::Fmin => "fmin",
        Op::Fmax => "fmax",
        Op::Feq => "feq",
        Op::Flt => "flt",
        Op::Fle => "fle",
        Op::Fclass => "fclass",
        Op::FcvtX => "fcvt.x",
        Op::FcvtF => "fcvt.f",
        Op::FcvtFF => "fcvt",
        Op::Fmadd => "fmadd",
        Op::Fmsub => "fmsub",
        Op::Fnmadd => "fnmadd",
        Op::Fnmsub => "fnmsub",
        Op::Vsetvl => "vsetvl",
        Op::Vsetvli => "vsetvli",
        Op::Vsetivli => "vsetivli",
        Op::Vmerge => "vmerge",
        Op::Vadd => "vadd",
        Op::Vsub => "vsub",
        Op::Vrsub => "vrsub",
        Op::Vminu => "vminu",
        Op::Vmin => "vmin",
        Op::Vmaxu => "vmaxu",
        Op::Vmax => "vmax",
        Op::Vand => "vand",
        Op::Vor => "vor",
        Op::Vxor => "vxor",
        Op::Vadc => "vadc",
        Op::Vmadc => "vmadc",
        Op::Vsbc => "vsbc",
        Op::Vmsbc => "vmsbc",
        Op::Vsll => "vsll",
        Op::Vsrl => "vsrl",
        Op::Vsra => "vsra",
        Op::Vnsrl => "vnsrl",
        Op::Vnsra => "vnsra",
        Op::Vmseq => "vmseq",
        Op::Vmsne => "vmsne",
        Op::Vmsltu => "vmsltu",
        Op::Vmslt => "vmslt",
        Op::Vmsleu => "vmsleu",
        Op::Vmsle => "vmsle",
        Op::Vmsgtu => "vmsgtu",
        Op::Vmsgt => "vmsgt",
        Op::Vzext => "vzext",
        Op::Vsext => "vsext",
        Op::Vdivu => "vdivu",
        Op::Vdiv => "vdiv",
        Op::Vremu => "vremu",
        Op::Vrem => "vrem",
        Op::Vmul => "vmul",
        Op::Vmulhu => "vmulhu",
        Op::Vmulhsu => "vmulhsu",
        Op::Vmulh => "vmulh",
        Op::Vmacc => "vmacc",
        Op::Vnmsac => "vnmsac",
        Op::Vmadd => "vmadd",
        Op::Vnmsub => "vnmsub",
        Op::Vwaddu => "vwaddu",
        Op::Vwadd => "vwadd",
        Op::Vwsubu => "vwsubu",
        Op::Vwsub => "vwsub",
        Op::VwadduW => "vwaddu.w",
        Op::VwaddW => "vwadd.w",
        Op::VwsubuW => "vwsubu.w",
        Op::VwsubW => "vwsub.w",
        Op::Vwmulu => "vwmulu",
        Op::Vwmulsu => "vwmulsu",
        Op::Vwmul => "vwmul",
        Op::Vwmaccu => "vwmaccu",
        Op::Vwmacc => "vwmacc",
        Op::Vwmaccsu => "vwmaccsu",
        Op::Vwmaccus => "vwmaccus",
        Op::Vsaddu => "vsaddu",
        Op::Vsadd => "vsadd",
        Op::Vssubu => "vssubu",
        Op::Vssub => "vssub",
        Op::Vaaddu => "vaaddu",
        Op::Vaadd => "vaadd",
        Op::Vasubu => "vasubu",
        Op::Vasub => "vasub",
        Op::Vsmul => "vsmul",
        Op::Vssrl => "vssrl",
        Op::Vssra => "vssra",
        Op::Vnclipu => "vnclipu",
        Op::Vnclip => "vnclip",
        Op::Vredsum => "vredsum",
        Op::Vredand => "vredand",
        Op::Vredor => "vredor",
        Op::Vredxor => "vredxor",
        Op::Vredminu => "vredminu",
        Op::Vredmin => "vredmin",
        Op::Vredmaxu => "vredmaxu",
        Op::Vredmax => "vredmax",
        Op::Vwredsumu => "vwredsumu",
        Op::Vwredsum => "vwredsum",
        Op::Vcpop => "vcpop",
        Op::Vfirst => "vfirst",
        Op::Vmsbf => "vmsbf",
        Op::Vmsof => "vmsof",
        Op::Vmsif => "vmsif",
        Op::Viota => "viota",
        Op::Vid => "vid",
        Op::Vmandn => "vmandn",
        Op::Vmand => "vmand",
        Op::Vmor => "vmor",
        Op::Vmxor => "vmxor",
        Op::Vmorn => "vmorn",
        Op::Vmnand => "vmnand",
        Op::Vmnor => "vmnor",
        Op::Vmxnor => "vmxnor",
        Op::Vmvxs => "vmv.x.s",
        Op::Vmvsx => "vmv.s.x",
        Op::Vfmvfs => "vfmv.f.s",
        Op::Vfmvsf => "vfmv.s.f",
        Op::VmvrV => "vmvr",
        Op::Vslideup => "vslideup",
        Op::Vslidedown => "vslidedown",
        Op::Vslide1up => "vslide1up",
        Op::Vslide1down => "vslide1down",
        Op::Vfslide1up => "vfslide1up",
        Op::Vfslide1down => "vfslide1down",
        Op::Vrgather => "vrgather",
        Op::Vrgatherei16 => "vrgatherei16",
        Op::Vcompress => "vcompress",
        Op::Vfadd => "vfadd",
        Op::Vfsub => "vfsub",
        Op::Vfrsub => "vfrsub",
        Op::Vfmul => "vfmul",
        Op::Vfdiv => "vfdiv",
        Op::Vfrdiv => "vfrdiv",
        Op::Vfmin => "vfmin",
        Op::Vfmax => "vfmax",
        Op::Vfsgnj => "vfsgnj",
        Op::Vfsgnjn => "vfsgnjn",
        Op::Vfsgnjx => "vfsgnjx",
        Op::Vfmerge => "vfmerge",
        Op::Vmfeq => "vmfeq",
        Op::Vmfne => "vmfne",
        Op::Vmflt => "vmflt",
        Op::Vmfle => "vmfle",
        Op::Vmfgt => "vmfgt",
        Op::Vmfge => "vmfge",
        Op::Vfmadd => "vfmadd",
        Op::Vfnmadd => "vfnmadd",
        Op::Vfmsub => "vfmsub",
        Op::Vfnmsub => "vfnmsub",
        Op::Vfmacc => "vfmacc",
        Op::Vfnmacc => "vfnmacc",
        Op::Vfmsac => "vfmsac",
        Op::Vfnmsac => "vfnmsac",
        Op::Vfwadd => "vfwadd",
        Op::Vfwsub => "vfwsub",
        Op::VfwaddW => "vfwadd.w",
        Op::VfwsubW => "vfwsub.w",
        Op::Vfwmul => "vfwmul",
        Op::Vfwmacc => "vfwmacc",
        Op::Vfwnmacc => "vfwnmacc",
        Op::Vfwmsac => "vfwmsac",
        Op::Vfwnmsac => "vfwnmsac",
        Op::Vfsqrt => "vfsqrt.v",
        Op::Vfrsqrte7 => "vfrsqrt7.v",
        Op::Vfrece7 => "vfrec7.v",
        Op::Vfclass => "vfclass.v",
        Op::VfcvtXuF => "vfcvt.xu.f.v",
        Op::VfcvtXF => "vfcvt.x.f.v",
        Op::VfcvtFXu => "vfcvt.f.xu.v",
        Op::VfcvtFX => "vfcvt.f.x.v",
        Op::VfwcvtXuF => "vfwcvt.xu.f.v",
        Op::VfwcvtXF => "vfwcvt.x.f.v",
        Op::VfwcvtFXu => "vfwcvt.f.xu.v",
        Op::VfwcvtFX => "vfwcvt.f.x.v",
        Op::VfwcvtFF => "vfwcvt.f.f.v",
        Op::VfncvtXuF => "vfncvt.xu.f.w",
        Op::VfncvtXF => "vfncvt.x.f.w",
        Op::VfncvtFXu => "vfncvt.f.xu.w",
        Op::VfncvtFX => "vfncvt.f.x.w",
        Op::VfncvtFF => "vfncvt.f.f.w",
        Op::Vfredusum => "vfredusum",
        Op::Vfredosum => "vfredosum",
        Op::Vfredmin => "vfredmin",
        Op::Vfredmax => "vfredmax",
        Op::Vfwredusum => "vfwredusum",
        Op::Vfwredosum => "vfwredosum",
        Op::Mv => "mv",
        Op::Jal => "jal",
        Op::Jalr => "jalr",
        Op::Load | Op::Store | Op::Csrr | Op::Csrri | Op::Fence | Op::Shadd | Op::Lr | Op::Sc
        | Op::VLoad | Op::VLoadStrided | Op::VLoadIndexed | Op::VStore | Op::VStoreStrided
        | Op::VStoreIndexed | Op::Last => unreachable!("formatted by the caller"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decode, DecodeCtx};
    use riscv::isa::{Architecture, Xlen};

    fn dis(word: u32) -> String {
        let ctx = DecodeCtx {
            arch: Architecture::rv64gc() | Architecture::V | Architecture::ZBA,
            xlen: Xlen::Rv64,
        };
        disassemble(&decode(word, 0x80000000, &ctx))
    }

    #[test]
    fn test_disassembly() {
        assert_eq!(dis(0x0020_81b3), "add x3,x1,x2");
        assert_eq!(dis(0x0103_2283), "lw x5,16(x6)");
        assert_eq!(dis(0xfff3_4283), "lbu x5,-1(x6)");
        assert_eq!(dis(0x0020_8463), "beq x1,x2,0x80000008");
        assert_eq!(dis(0x3003_12f3), "csrrw x5,0x300,x6");
        assert_eq!(dis(0x0020_9053), "fadd.s f0,f1,f2");
        assert_eq!(dis(0x0063_a2af), "amoadd.w x5,x7,x6");
        assert_eq!(dis(0x0205_6207), "vle32.v v4,x10");
        assert_eq!(dis(0x0021_80d7), "vadd.vv v1,v3,v2,v0.t");
        assert_eq!(dis(0xffff_ffff), ".insn 0xffffffff");
    }
}
