//! Fusion of comparison + JZ/JNZ pairs into conditional branches
//!
//! `cmp t, a, b; jz t, L` becomes the branch on the inverted condition,
//! `jnz` the branch on the condition itself. The comparison is dropped
//! only when the fused branch was its sole consumer.

use crate::passes::Pass;
use crate::{Instruction, IrOp, ProgramMetadata, Subroutine};
use hrl_common::{HrlError, HrlResult};
use log::trace;
use std::collections::HashMap;

pub struct MergeConditionalBranchPass;

/// JZ jumps when the comparison is false, so it takes the inverse.
fn invert(op: IrOp) -> IrOp {
    match op {
        IrOp::Eq => IrOp::Jne,
        IrOp::Ne => IrOp::Je,
        IrOp::Lt => IrOp::Jge,
        IrOp::Le => IrOp::Jgt,
        IrOp::Gt => IrOp::Jle,
        IrOp::Ge => IrOp::Jlt,
        _ => unreachable!("not a comparison: {}", op),
    }
}

/// JNZ jumps when the comparison holds.
fn direct(op: IrOp) -> IrOp {
    match op {
        IrOp::Eq => IrOp::Je,
        IrOp::Ne => IrOp::Jne,
        IrOp::Lt => IrOp::Jlt,
        IrOp::Le => IrOp::Jle,
        IrOp::Gt => IrOp::Jgt,
        IrOp::Ge => IrOp::Jge,
        _ => unreachable!("not a comparison: {}", op),
    }
}

impl Pass for MergeConditionalBranchPass {
    fn name(&self) -> &'static str {
        "merge-conditional-branch"
    }

    fn run_on_subroutine(
        &mut self,
        subroutine: &mut Subroutine,
        _metadata: &mut ProgramMetadata,
    ) -> HrlResult<()> {
        // Uses of every local register across the subroutine; a fused
        // comparison may only disappear when the branch was its one use.
        let mut use_counts: HashMap<i32, usize> = HashMap::new();
        for block in &subroutine.blocks {
            for instruction in &block.instructions {
                for used in instruction.variable_uses() {
                    if used >= 0 {
                        *use_counts.entry(used).or_insert(0) += 1;
                    }
                }
            }
        }

        for block in &mut subroutine.blocks {
            let mut index = 0;
            while index + 1 < block.instructions.len() {
                let current = &block.instructions[index];
                let next = &block.instructions[index + 1];

                let fused = match (current.op().is_comparison(), next.op()) {
                    (true, IrOp::Jz) | (true, IrOp::Jnz)
                        if next.src1() == current.tgt() =>
                    {
                        let merged_op = if next.op() == IrOp::Jz {
                            invert(current.op())
                        } else {
                            direct(current.op())
                        };
                        Some(
                            Instruction::branch(
                                merged_op,
                                next.tgt().clone(),
                                current.src1().clone(),
                                current.src2().clone(),
                            )?,
                        )
                    }
                    _ => None,
                };

                match fused {
                    Some(fused) => {
                        trace!(
                            "[MergeCondBranch] '{}' + '{}' => '{}'",
                            block.instructions[index],
                            block.instructions[index + 1],
                            fused
                        );
                        let comparison_target =
                            block.instructions[index].variable_def().ok_or_else(|| {
                                HrlError::malformed_ir("comparison without a target")
                            })?;
                        block.instructions[index + 1] = fused;
                        if use_counts.get(&comparison_target).copied().unwrap_or(0) == 1 {
                            block.instructions.remove(index);
                        } else {
                            index += 1;
                        }
                    }
                    None => index += 1,
                }
            }
        }
        Ok(())
    }
}
