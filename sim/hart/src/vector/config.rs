//! The vset{i}vl{i} configuration instructions

use super::complete;
use crate::morph::{EmitResult, Flow, MorphState};
use decoder::Op;
use riscv::vtype::VType;

pub(super) fn emit(ms: &mut MorphState) -> EmitResult {
    let (vtype_raw, avl) = match ms.info.op {
        Op::Vsetvli => (ms.info.imm as u64, avl_from_rs1(ms)),
        Op::Vsetivli => (ms.info.imm as u64, Avl::Count(ms.info.tgt)),
        Op::Vsetvl => (
            ms.hart.state.x(ms.info.r[2].index()),
            avl_from_rs1(ms),
        ),
        _ => unreachable!(),
    };

    let cfg = &ms.hart.cfg;
    let vtype = VType(vtype_raw);
    if !vtype.is_legal(cfg.xbits(), cfg.vlen, cfg.elen, cfg.fractional_lmul) {
        // an unsupported configuration installs vill rather than trapping
        ms.hart.csrs.vtype = VType::ill(cfg.xbits()).0;
        ms.hart.csrs.vl = 0;
        ms.hart.block.invalidate_vtype();
        ms.set_xd(0);
        complete(ms);
        return Ok(Flow::Stop);
    }

    let vlmax = vtype.vlmax(cfg.vlen).unwrap();
    let vl = match avl {
        Avl::Count(avl) => avl.min(vlmax),
        Avl::Max => vlmax,
        Avl::Keep => {
            if ms.hart.cfg.vsetvl_x0_keeps_vl {
                // the ratio must keep the old vl representable
                ms.hart.csrs.vl.min(vlmax)
            } else {
                vlmax
            }
        }
    };

    ms.hart.csrs.vtype = vtype.0;
    ms.hart.csrs.vl = vl;
    ms.hart.block.learn_vtype(vtype, vl, vlmax);
    ms.set_xd(vl);
    complete(ms);
    log::trace!(
        "vset: sew={} lmul_x8={} vl={} (vlmax {})",
        vtype.sew().unwrap(),
        vtype.lmul_x8().unwrap(),
        vl,
        vlmax
    );
    // the installed type invalidates any cached SEW/LMUL assumptions
    Ok(Flow::Stop)
}

enum Avl {
    Count(u64),
    Max,
    Keep,
}

fn avl_from_rs1(ms: &MorphState) -> Avl {
    let rs1 = ms.info.r[1];
    if rs1.index() != 0 {
        Avl::Count(ms.hart.state.x(rs1.index()))
    } else if ms.info.r[0].index() != 0 {
        // rs1=x0 with a real destination requests the maximum
        Avl::Max
    } else {
        // rs1=x0, rd=x0: policy choice between keep and max
        Avl::Keep
    }
}
