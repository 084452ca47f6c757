//! Control transfer emitters

use super::{EmitResult, Flow, MorphState};
use decoder::Op;
use riscv::isa::Architecture;
use riscv::trap::Exception;

pub(super) fn emit(ms: &mut MorphState) -> EmitResult {
    match ms.info.op {
        Op::Jal => {
            let target = ms.info.tgt;
            check_target(ms, target)?;
            let link = ms.info.pc.wrapping_add(ms.info.bytes as u64);
            ms.set_xd(link);
            Ok(Flow::Jump(target))
        }
        Op::Jalr => {
            let target = ms.src(1).wrapping_add(ms.imm() as u64) & !1;
            check_target(ms, target)?;
            let link = ms.info.pc.wrapping_add(ms.info.bytes as u64);
            ms.set_xd(link);
            Ok(Flow::Jump(target))
        }
        _ => {
            let taken = match ms.info.op {
                Op::Beq => ms.src(0) == ms.src(1),
                Op::Bne => ms.src(0) != ms.src(1),
                Op::Blt => ms.src_signed(0) < ms.src_signed(1),
                Op::Bge => ms.src_signed(0) >= ms.src_signed(1),
                Op::Bltu => ms.src(0) < ms.src(1),
                Op::Bgeu => ms.src(0) >= ms.src(1),
                _ => unreachable!(),
            };
            if taken {
                check_target(ms, ms.info.tgt)?;
                Ok(Flow::Jump(ms.info.tgt))
            } else {
                Ok(Flow::Next)
            }
        }
    }
}

/// Without compressed instructions, a target that is not 4-byte aligned
/// raises a misaligned-fetch exception at the transfer
fn check_target(ms: &MorphState, target: u64) -> Result<(), crate::trap::Trap> {
    let align = if ms.hart.enabled.contains(Architecture::C) {
        1
    } else {
        3
    };
    if target & align != 0 {
        return Err(crate::trap::Trap::exception(
            Exception::InstructionAddressMisaligned,
            target,
        ));
    }
    Ok(())
}
