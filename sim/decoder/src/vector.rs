//! Vector extension encodings: configuration, memory and the three operand
//! categories of OP-V

use crate::info::{InstrInfo, Op, RegDesc};
use crate::{funct3, rd, rs1, rs2, DecodeCtx};
use riscv::fp::RmDesc;
use riscv::isa::Architecture;

/// Element width selected by the funct3/width field of a vector memory access
fn mem_eew(width: u32) -> Option<u32> {
    match width {
        0 => Some(8),
        5 => Some(16),
        6 => Some(32),
        7 => Some(64),
        _ => None,
    }
}

pub(crate) fn load_store_v(info: &mut InstrInfo, word: u32, ctx: &DecodeCtx, store: bool) {
    let Some(eew) = mem_eew(funct3(word)) else {
        return;
    };
    if word & (1 << 28) != 0 {
        // mew=1 encodes the reserved >64-bit element widths
        return;
    }
    let mop = (word >> 26) & 0b11;
    let nf = (word >> 29) as u8 + 1;
    let vm = word & (1 << 25) != 0;

    info.arch = Architecture::V;
    info.r[0] = RegDesc::vreg(rd(word));
    info.r[1] = RegDesc::xreg(rs1(word), ctx.xbits());
    info.eew = eew;
    info.nf = nf;
    if !vm {
        info.mask = RegDesc::vreg(0);
    }

    match mop {
        0b00 => {
            info.op = if store { Op::VStore } else { Op::VLoad };
            match rs2(word) {
                0b00000 => {}
                0b01000 => {
                    // whole register; the encoded nf is the register count
                    info.whole = true;
                    info.mask = RegDesc::NONE;
                }
                0b01011 => {
                    // vlm.v/vsm.v operate on the mask layout with EEW=8
                    if eew != 8 || nf != 1 {
                        info.op = Op::Last;
                        return;
                    }
                    info.mask_ls = true;
                    info.mask = RegDesc::NONE;
                }
                0b10000 if !store => {
                    info.ff = true;
                }
                _ => {
                    info.op = Op::Last;
                }
            }
        }
        0b10 => {
            info.op = if store { Op::VStoreStrided } else { Op::VLoadStrided };
            info.r[2] = RegDesc::xreg(rs2(word), ctx.xbits());
        }
        _ => {
            // ordered and unordered indexed accesses execute identically here
            info.op = if store { Op::VStoreIndexed } else { Op::VLoadIndexed };
            info.r[2] = RegDesc::vreg(rs2(word));
        }
    }
}

pub(crate) fn op_v(info: &mut InstrInfo, word: u32, ctx: &DecodeCtx) {
    info.arch = Architecture::V;
    let f3 = funct3(word);
    if f3 == 7 {
        return config(info, word, ctx);
    }
    let funct6 = word >> 26;
    let vm = word & (1 << 25) != 0;
    if !vm {
        info.mask = RegDesc::vreg(0);
    }
    match f3 {
        0 => opi(info, word, OpiSrc::Vector, funct6, vm),
        3 => opi(info, word, OpiSrc::Immediate, funct6, vm),
        4 => opi(info, word, OpiSrc::Scalar(ctx.xbits()), funct6, vm),
        2 => opm(info, word, true, funct6, ctx),
        6 => opm(info, word, false, funct6, ctx),
        1 => opf(info, word, true, funct6, ctx),
        5 => opf(info, word, false, funct6, ctx),
        _ => unreachable!(),
    }
}

fn config(info: &mut InstrInfo, word: u32, ctx: &DecodeCtx) {
    let x = ctx.xbits();
    info.r[0] = RegDesc::xreg(rd(word), x);
    if word >> 31 == 0 {
        info.op = Op::Vsetvli;
        info.r[1] = RegDesc::xreg(rs1(word), x);
        info.imm = ((word >> 20) & 0x7ff) as i64;
    } else if word >> 30 == 0b11 {
        info.op = Op::Vsetivli;
        info.imm = ((word >> 20) & 0x3ff) as i64;
        // the unsigned AVL immediate lives in the rs1 field
        info.tgt = rs1(word) as u64;
    } else if (word >> 25) & 0x3f == 0b100000 {
        info.op = Op::Vsetvl;
        info.r[1] = RegDesc::xreg(rs1(word), x);
        info.r[2] = RegDesc::xreg(rs2(word), x);
    }
}

/// Second-source kind of an OPI instruction
enum OpiSrc {
    Vector,
    Immediate,
    Scalar(u32),
}

fn opi(info: &mut InstrInfo, word: u32, src: OpiSrc, funct6: u32, vm: bool) {
    let is_vv = matches!(src, OpiSrc::Vector);
    let is_vi = matches!(src, OpiSrc::Immediate);
    // unsigned 5-bit immediates for shift, slide, gather and register moves
    let uimm = matches!(
        funct6,
        0b001100 | 0b001110 | 0b001111 | 0b100101 | 0b100111 | 0b101000 | 0b101001 | 0b101010
            | 0b101011 | 0b101100 | 0b101101 | 0b101110 | 0b101111
    );
    let op = match funct6 {
        0b000000 => Op::Vadd,
        0b000010 if !is_vi => Op::Vsub,
        0b000011 if !is_vv => Op::Vrsub,
        0b000100 if !is_vi => Op::Vminu,
        0b000101 if !is_vi => Op::Vmin,
        0b000110 if !is_vi => Op::Vmaxu,
        0b000111 if !is_vi => Op::Vmax,
        0b001001 => Op::Vand,
        0b001010 => Op::Vor,
        0b001011 => Op::Vxor,
        0b001100 => Op::Vrgather,
        0b001110 => {
            if is_vv {
                Op::Vrgatherei16
            } else {
                Op::Vslideup
            }
        }
        0b001111 if !is_vv => Op::Vslidedown,
        0b010000 if !vm => Op::Vadc,
        0b010001 => Op::Vmadc,
        0b010010 if !vm && !is_vi => Op::Vsbc,
        0b010011 if !is_vi => Op::Vmsbc,
        0b010111 => Op::Vmerge, // vmv.v.* when unmasked with vs2=0
        0b011000 => Op::Vmseq,
        0b011001 => Op::Vmsne,
        0b011010 if !is_vi => Op::Vmsltu,
        0b011011 if !is_vi => Op::Vmslt,
        0b011100 => Op::Vmsleu,
        0b011101 => Op::Vmsle,
        0b011110 if !is_vv => Op::Vmsgtu,
        0b011111 if !is_vv => Op::Vmsgt,
        0b100000 => Op::Vsaddu,
        0b100001 => Op::Vsadd,
        0b100010 if !is_vi => Op::Vssubu,
        0b100011 if !is_vi => Op::Vssub,
        0b100101 => Op::Vsll,
        0b100111 => {
            if is_vi && vm {
                Op::VmvrV
            } else if !is_vi {
                Op::Vsmul
            } else {
                return;
            }
        }
        0b101000 => Op::Vsrl,
        0b101001 => Op::Vsra,
        0b101010 => Op::Vssrl,
        0b101011 => Op::Vssra,
        0b101100 => Op::Vnsrl,
        0b101101 => Op::Vnsra,
        0b101110 => Op::Vnclipu,
        0b101111 => Op::Vnclip,
        0b110000 if is_vv => Op::Vwredsumu,
        0b110001 if is_vv => Op::Vwredsum,
        _ => return,
    };
    info.op = op;
    info.r[0] = RegDesc::vreg(rd(word));
    info.r[2] = RegDesc::vreg(rs2(word));
    match src {
        OpiSrc::Vector => info.r[1] = RegDesc::vreg(rs1(word)),
        OpiSrc::Scalar(x) => info.r[1] = RegDesc::xreg(rs1(word), x),
        OpiSrc::Immediate => {
            info.imm = if uimm {
                rs1(word) as i64
            } else {
                ((rs1(word) as i64) << 59) >> 59
            };
        }
    }
    if op == Op::VmvrV {
        // the low immediate bits encode the register count
        match info.imm & 0b111 {
            0 | 1 | 3 | 7 => info.nf = info.imm as u8 + 1,
            _ => info.op = Op::Last,
        }
        info.mask = RegDesc::NONE;
    }
}

fn opm(info: &mut InstrInfo, word: u32, is_vv: bool, funct6: u32, ctx: &DecodeCtx) {
    let op = match funct6 {
        0b000000 if is_vv => Op::Vredsum,
        0b000001 if is_vv => Op::Vredand,
        0b000010 if is_vv => Op::Vredor,
        0b000011 if is_vv => Op::Vredxor,
        0b000100 if is_vv => Op::Vredminu,
        0b000101 if is_vv => Op::Vredmin,
        0b000110 if is_vv => Op::Vredmaxu,
        0b000111 if is_vv => Op::Vredmax,
        0b001000 => Op::Vaaddu,
        0b001001 => Op::Vaadd,
        0b001010 => Op::Vasubu,
        0b001011 => Op::Vasub,
        0b001110 if !is_vv => Op::Vslide1up,
        0b001111 if !is_vv => Op::Vslide1down,
        0b010000 => {
            // VWXUNARY0 / vmv.s.x
            return wxunary(info, word, is_vv, ctx);
        }
        0b010010 if is_vv => {
            // VXUNARY0: sign and zero extension of narrower fractions
            let (op, div) = match rs1(word) {
                0b00010 => (Op::Vzext, 8),
                0b00011 => (Op::Vsext, 8),
                0b00100 => (Op::Vzext, 4),
                0b00101 => (Op::Vsext, 4),
                0b00110 => (Op::Vzext, 2),
                0b00111 => (Op::Vsext, 2),
                _ => return,
            };
            info.op = op;
            info.eew = div;
            info.r[0] = RegDesc::vreg(rd(word));
            info.r[2] = RegDesc::vreg(rs2(word));
            return;
        }
        0b010100 if is_vv => {
            let op = match rs1(word) {
                0b00001 => Op::Vmsbf,
                0b00010 => Op::Vmsof,
                0b00011 => Op::Vmsif,
                0b10000 => Op::Viota,
                0b10001 => Op::Vid,
                _ => return,
            };
            info.op = op;
            info.r[0] = RegDesc::vreg(rd(word));
            if op != Op::Vid {
                info.r[2] = RegDesc::vreg(rs2(word));
            }
            return;
        }
        0b010111 if is_vv => {
            if word & (1 << 25) == 0 {
                return;
            }
            Op::Vcompress
        }
        0b011000 if is_vv => Op::Vmandn,
        0b011001 if is_vv => Op::Vmand,
        0b011010 if is_vv => Op::Vmor,
        0b011011 if is_vv => Op::Vmxor,
        0b011100 if is_vv => Op::Vmorn,
        0b011101 if is_vv => Op::Vmnand,
        0b011110 if is_vv => Op::Vmnor,
        0b011111 if is_vv => Op::Vmxnor,
        0b100000 => Op::Vdivu,
        0b100001 => Op::Vdiv,
        0b100010 => Op::Vremu,
        0b100011 => Op::Vrem,
        0b100100 => Op::Vmulhu,
        0b100101 => Op::Vmul,
        0b100110 => Op::Vmulhsu,
        0b100111 => Op::Vmulh,
        0b101001 => Op::Vmadd,
        0b101011 => Op::Vnmsub,
        0b101101 => Op::Vmacc,
        0b101111 => Op::Vnmsac,
        0b110000 => Op::Vwaddu,
        0b110001 => Op::Vwadd,
        0b110010 => Op::Vwsubu,
        0b110011 => Op::Vwsub,
        0b110100 => Op::VwadduW,
        0b110101 => Op::VwaddW,
        0b110110 => Op::VwsubuW,
        0b110111 => Op::VwsubW,
        0b111000 => Op::Vwmulu,
        0b111010 => Op::Vwmulsu,
        0b111011 => Op::Vwmul,
        0b111100 => Op::Vwmaccu,
        0b111101 => Op::Vwmacc,
        0b111110 if !is_vv => Op::Vwmaccus,
        0b111111 => Op::Vwmaccsu,
        _ => return,
    };
    info.op = op;
    info.r[0] = RegDesc::vreg(rd(word));
    info.r[2] = RegDesc::vreg(rs2(word));
    info.r[1] = if is_vv {
        RegDesc::vreg(rs1(word))
    } else {
        RegDesc::xreg(rs1(word), ctx.xbits())
    };
}

fn wxunary(info: &mut InstrInfo, word: u32, is_vv: bool, ctx: &DecodeCtx) {
    let x = ctx.xbits();
    if is_vv {
        let op = match rs1(word) {
            0b00000 => Op::Vmvxs,
            0b10000 => Op::Vcpop,
            0b10001 => Op::Vfirst,
            _ => return,
        };
        info.op = op;
        info.r[0] = RegDesc::xreg(rd(word), x);
        info.r[2] = RegDesc::vreg(rs2(word));
        if op == Op::Vmvxs && info.mask.is_some() {
            info.op = Op::Last;
        }
    } else {
        if rs2(word) != 0 || info.mask.is_some() {
            return;
        }
        info.op = Op::Vmvsx;
        info.r[0] = RegDesc::vreg(rd(word));
        info.r[1] = RegDesc::xreg(rs1(word), x);
    }
}

fn opf(info: &mut InstrInfo, word: u32, is_vv: bool, funct6: u32, _ctx: &DecodeCtx) {
    // every vector float operation rounds with the dynamic mode unless a
    // static-mode conversion variant overrides it below
    let mut rm = RmDesc::Current;
    let op = match funct6 {
        0b000000 => Op::Vfadd,
        0b000001 if is_vv => Op::Vfredusum,
        0b000010 => Op::Vfsub,
        0b000011 if is_vv => Op::Vfredosum,
        0b000100 => Op::Vfmin,
        0b000101 if is_vv => Op::Vfredmin,
        0b000110 => Op::Vfmax,
        0b000111 if is_vv => Op::Vfredmax,
        0b001000 => Op::Vfsgnj,
        0b001001 => Op::Vfsgnjn,
        0b001010 => Op::Vfsgnjx,
        0b001110 if !is_vv => Op::Vfslide1up,
        0b001111 if !is_vv => Op::Vfslide1down,
        0b010000 => {
            // VWFUNARY0 / vfmv.s.f
            if is_vv {
                if rs1(word) != 0 || info.mask.is_some() {
                    return;
                }
                info.op = Op::Vfmvfs;
                info.r[0] = RegDesc::freg(rd(word), 0);
                info.r[2] = RegDesc::vreg(rs2(word));
            } else {
                if rs2(word) != 0 || info.mask.is_some() {
                    return;
                }
                info.op = Op::Vfmvsf;
                info.r[0] = RegDesc::vreg(rd(word));
                info.r[1] = RegDesc::freg(rs1(word), 0);
            }
            return;
        }
        0b010010 if is_vv => {
            let op = match rs1(word) {
                0b00000 => Op::VfcvtXuF,
                0b00001 => Op::VfcvtXF,
                0b00010 => Op::VfcvtFXu,
                0b00011 => Op::VfcvtFX,
                0b00110 => {
                    rm = RmDesc::Rtz;
                    Op::VfcvtXuF
                }
                0b00111 => {
                    rm = RmDesc::Rtz;
                    Op::VfcvtXF
                }
                0b01000 => Op::VfwcvtXuF,
                0b01001 => Op::VfwcvtXF,
                0b01010 => Op::VfwcvtFXu,
                0b01011 => Op::VfwcvtFX,
                0b01100 => Op::VfwcvtFF,
                0b01110 => {
                    rm = RmDesc::Rtz;
                    Op::VfwcvtXuF
                }
                0b01111 => {
                    rm = RmDesc::Rtz;
                    Op::VfwcvtXF
                }
                0b10000 => Op::VfncvtXuF,
                0b10001 => Op::VfncvtXF,
                0b10010 => Op::VfncvtFXu,
                0b10011 => Op::VfncvtFX,
                0b10100 => Op::VfncvtFF,
                0b10101 => {
                    rm = RmDesc::Rod;
                    Op::VfncvtFF
                }
                0b10110 => {
                    rm = RmDesc::Rtz;
                    Op::VfncvtXuF
                }
                0b10111 => {
                    rm = RmDesc::Rtz;
                    Op::VfncvtXF
                }
                _ => return,
            };
            info.op = op;
            info.rm = rm;
            info.r[0] = RegDesc::vreg(rd(word));
            info.r[2] = RegDesc::vreg(rs2(word));
            return;
        }
        0b010011 if is_vv => {
            let op = match rs1(word) {
                0b00000 => Op::Vfsqrt,
                0b00100 => Op::Vfrsqrte7,
                0b00101 => Op::Vfrece7,
                0b10000 => Op::Vfclass,
                _ => return,
            };
            info.op = op;
            info.rm = if op == Op::Vfclass { RmDesc::None } else { RmDesc::Current };
            info.r[0] = RegDesc::vreg(rd(word));
            info.r[2] = RegDesc::vreg(rs2(word));
            return;
        }
        0b010111 => Op::Vfmerge, // vfmv.v.f when unmasked with vs2=0
        0b011000 => Op::Vmfeq,
        0b011001 => Op::Vmfle,
        0b011011 => Op::Vmflt,
        0b011100 => Op::Vmfne,
        0b011101 if !is_vv => Op::Vmfgt,
        0b011111 if !is_vv => Op::Vmfge,
        0b100000 => Op::Vfdiv,
        0b100001 if !is_vv => Op::Vfrdiv,
        0b100100 => Op::Vfmul,
        0b100111 if !is_vv => Op::Vfrsub,
        0b101000 => Op::Vfmadd,
        0b101001 => Op::Vfnmadd,
        0b101010 => Op::Vfmsub,
        0b101011 => Op::Vfnmsub,
        0b101100 => Op::Vfmacc,
        0b101101 => Op::Vfnmacc,
        0b101110 => Op::Vfmsac,
        0b101111 => Op::Vfnmsac,
        0b110000 => Op::Vfwadd,
        0b110001 if is_vv => Op::Vfwredusum,
        0b110010 => Op::Vfwsub,
        0b110011 if is_vv => Op::Vfwredosum,
        0b110100 => Op::VfwaddW,
        0b110110 => Op::VfwsubW,
        0b111000 => Op::Vfwmul,
        0b111100 => Op::Vfwmacc,
        0b111101 => Op::Vfwnmacc,
        0b111110 => Op::Vfwmsac,
        0b111111 => Op::Vfwnmsac,
        _ => return,
    };
    info.op = op;
    info.rm = match op {
        Op::Vfsgnj | Op::Vfsgnjn | Op::Vfsgnjx | Op::Vmfeq | Op::Vmfne | Op::Vmflt | Op::Vmfle
        | Op::Vmfgt | Op::Vmfge | Op::Vfmin | Op::Vfmax | Op::Vfmerge | Op::Vfslide1up
        | Op::Vfslide1down => RmDesc::None,
        _ => rm,
    };
    info.r[0] = RegDesc::vreg(rd(word));
    info.r[2] = RegDesc::vreg(rs2(word));
    info.r[1] = if is_vv {
        RegDesc::vreg(rs1(word))
    } else {
        // scalar float operand; its width is the current SEW
        RegDesc::freg(rs1(word), 0)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decode, DecodeCtx};
    use riscv::isa::Xlen;

    fn ctx() -> DecodeCtx {
        DecodeCtx {
            arch: Architecture::rv64gc() | Architecture::V,
            xlen: Xlen::Rv64,
        }
    }

    #[test]
    fn test_vle32() {
        // vle32.v v4, (x10)
        let info = decode(0x0205_6207, 0, &ctx());
        assert_eq!(info.op, Op::VLoad);
        assert_eq!(info.eew, 32);
        assert_eq!(info.nf, 1);
        assert!(!info.ff && !info.whole);
        // vle32ff.v v4, (x10)
        let info = decode(0x0305_6207, 0, &ctx());
        assert_eq!(info.op, Op::VLoad);
        assert!(info.ff);
        // vl2re32.v v4, (x10)
        let info = decode(0x2285_6207, 0, &ctx());
        assert_eq!(info.op, Op::VLoad);
        assert!(info.whole);
        assert_eq!(info.nf, 2);
    }

    #[test]
    fn test_vlse_vluxei() {
        // vlse64.v v4, (x10), x11
        let info = decode(0x0ab5_7207, 0, &ctx());
        assert_eq!(info.op, Op::VLoadStrided);
        assert_eq!(info.eew, 64);
        assert_eq!(info.r[2], RegDesc::xreg(11, 64));
        // vluxei8.v v4, (x10), v8
        let info = decode(0x0685_0207, 0, &ctx());
        assert_eq!(info.op, Op::VLoadIndexed);
        assert_eq!(info.eew, 8);
        assert_eq!(info.r[2], RegDesc::vreg(8));
    }

    #[test]
    fn test_vmv_family() {
        // vmv.v.i v3, 5  (vmerge unmasked, vs2=0)
        let info = decode(0x5e02_b1d7, 0, &ctx());
        assert_eq!(info.op, Op::Vmerge);
        assert!(!info.mask.is_some());
        assert_eq!(info.imm, 5);
        // vmv.x.s x5, v9
        let info = decode(0x4290_22d7, 0, &ctx());
        assert_eq!(info.op, Op::Vmvxs);
        assert_eq!(info.r[0], RegDesc::xreg(5, 64));
        // vmv2r.v v2, v4
        let info = decode(0x9e40_b157, 0, &ctx());
        assert_eq!(info.op, Op::VmvrV);
        assert_eq!(info.nf, 2);
    }

    #[test]
    fn test_vfncvt_rod() {
        // vfncvt.rod.f.f.w v1, v2
        let info = decode(0x4a2a_90d7, 0, &ctx());
        assert_eq!(info.op, Op::VfncvtFF);
        assert_eq!(info.rm, RmDesc::Rod);
    }

    #[test]
    fn test_vzext() {
        // vzext.vf2 v1, v2
        let info = decode(0x4a23_20d7, 0, &ctx());
        assert_eq!(info.op, Op::Vzext);
        assert_eq!(info.eew, 2);
    }
}
