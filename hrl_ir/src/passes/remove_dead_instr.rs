//! Dead-instruction removal on SSA form
//!
//! Visits the dominator tree bottom-up, accumulating the live set from
//! the operands of side-effecting instructions and from phi incomings,
//! and deletes every effect-free instruction whose target never became
//! live. Requires SSA: a register with one definition is dead exactly
//! when nothing downstream reads it.

use crate::passes::{IrGenOptions, Pass};
use crate::{DominanceInfo, IrOp, ProgramMetadata, Subroutine, Vertex};
use hrl_common::{HrlError, HrlResult};
use log::{debug, trace};
use std::collections::BTreeSet;

pub struct RemoveDeadInstructionsPass {
    options: IrGenOptions,
}

impl RemoveDeadInstructionsPass {
    pub fn new(options: IrGenOptions) -> Self {
        Self { options }
    }
}

impl Pass for RemoveDeadInstructionsPass {
    fn name(&self) -> &'static str {
        "remove-dead-instructions"
    }

    fn run_on_subroutine(
        &mut self,
        subroutine: &mut Subroutine,
        _metadata: &mut ProgramMetadata,
    ) -> HrlResult<()> {
        if !self.options.eliminate_dead_assignment {
            return Ok(());
        }
        if !subroutine.ssa {
            debug!(
                "[RmDeadInstr] '{}' is not in SSA form, skipping dead-assignment elimination",
                subroutine.name()
            );
            return Ok(());
        }
        let dominance = subroutine.dominance.clone().ok_or_else(|| {
            HrlError::ir_construction(format!(
                "dead-instruction removal for '{}' requires dominance information",
                subroutine.name()
            ))
        })?;

        // Phi incomings are uses that cross the dominator-tree order;
        // seed them as live up front.
        let mut live: BTreeSet<i32> = BTreeSet::new();
        for block in &subroutine.blocks {
            for instruction in &block.instructions {
                if instruction.op() == IrOp::Phi {
                    live.extend(instruction.phi_incomings().values().map(|inc| inc.variable));
                }
            }
        }

        visit(subroutine, &dominance, dominance.root, &mut live);
        Ok(())
    }
}

fn visit(subroutine: &mut Subroutine, dominance: &DominanceInfo, vertex: Vertex, live: &mut BTreeSet<i32>) {
    // Children first: everything dominated by this block is downstream.
    for &child in &dominance.children[vertex] {
        visit(subroutine, dominance, child, live);
    }

    let instructions = &mut subroutine.blocks[vertex].instructions;
    let mut index = instructions.len();
    while index > 0 {
        index -= 1;
        let instruction = &instructions[index];

        if instruction.op().has_side_effect() {
            if let Some(defined) = instruction.tgt().local_id() {
                live.insert(defined);
            }
        }
        for used in instruction.variable_uses() {
            if used >= 0 {
                live.insert(used);
            }
        }

        if let Some(defined) = instruction.tgt().local_id() {
            if !live.contains(&defined) {
                debug_assert!(!instruction.op().has_side_effect());
                trace!("[RmDeadInstr] removing '{}'", instruction);
                instructions.remove(index);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::{
        AnalyzeLivenessPass, BuildControlFlowGraphPass, BuildSsaPass, PropagateCopyPass,
        VerifySsaPass,
    };
    use crate::{BasicBlock, Instruction, Operand};

    fn var(id: i32) -> Operand {
        Operand::Variable(id)
    }

    fn run_pipeline(sub: &mut Subroutine) {
        let mut metadata = ProgramMetadata::default();
        BuildControlFlowGraphPass.run_on_subroutine(sub, &mut metadata).unwrap();
        AnalyzeLivenessPass.run_on_subroutine(sub, &mut metadata).unwrap();
        BuildSsaPass.run_on_subroutine(sub, &mut metadata).unwrap();
        PropagateCopyPass.run_on_subroutine(sub, &mut metadata).unwrap();
        RemoveDeadInstructionsPass::new(IrGenOptions::for_speed())
            .run_on_subroutine(sub, &mut metadata)
            .unwrap();
        VerifySsaPass.run_on_subroutine(sub, &mut metadata).unwrap();
    }

    #[test]
    fn unused_definitions_disappear() {
        let mut sub = Subroutine::new(
            "f",
            false,
            false,
            vec![BasicBlock::new("f", vec![
                Instruction::loadi(var(0), 1).unwrap(),
                Instruction::loadi(var(1), 42).unwrap(),
                Instruction::output(var(1)).unwrap(),
                Instruction::ret(None).unwrap(),
            ])],
        );
        run_pipeline(&mut sub);

        let ops: Vec<IrOp> = sub.blocks[0].instructions.iter().map(|i| i.op()).collect();
        assert_eq!(ops, vec![IrOp::Loadi, IrOp::Output, IrOp::Ret]);
    }

    #[test]
    fn copies_become_dead_after_propagation() {
        let mut sub = Subroutine::new(
            "f",
            false,
            false,
            vec![BasicBlock::new("f", vec![
                Instruction::loadi(var(0), 7).unwrap(),
                Instruction::mov(var(1), var(0)).unwrap(),
                Instruction::output(var(1)).unwrap(),
                Instruction::ret(None).unwrap(),
            ])],
        );
        run_pipeline(&mut sub);

        let ops: Vec<IrOp> = sub.blocks[0].instructions.iter().map(|i| i.op()).collect();
        assert_eq!(ops, vec![IrOp::Loadi, IrOp::Output, IrOp::Ret]);
    }

    #[test]
    fn side_effecting_instructions_always_survive() {
        let mut sub = Subroutine::new(
            "f",
            false,
            false,
            vec![BasicBlock::new("f", vec![
                // The call's result is unused but the call itself stays.
                Instruction::call(var(0), Operand::Label("g".into()), None).unwrap(),
                Instruction::ret(None).unwrap(),
            ])],
        );
        let mut metadata = ProgramMetadata::default();
        BuildControlFlowGraphPass.run_on_subroutine(&mut sub, &mut metadata).unwrap();
        AnalyzeLivenessPass.run_on_subroutine(&mut sub, &mut metadata).unwrap();
        BuildSsaPass.run_on_subroutine(&mut sub, &mut metadata).unwrap();
        RemoveDeadInstructionsPass::new(IrGenOptions::for_speed())
            .run_on_subroutine(&mut sub, &mut metadata)
            .unwrap();

        assert_eq!(sub.blocks[0].instructions.len(), 2);
    }

    #[test]
    fn disabled_option_is_a_no_op() {
        let mut sub = Subroutine::new(
            "f",
            false,
            false,
            vec![BasicBlock::new("f", vec![
                Instruction::loadi(var(0), 1).unwrap(),
                Instruction::ret(None).unwrap(),
            ])],
        );
        let mut metadata = ProgramMetadata::default();
        BuildControlFlowGraphPass.run_on_subroutine(&mut sub, &mut metadata).unwrap();
        AnalyzeLivenessPass.run_on_subroutine(&mut sub, &mut metadata).unwrap();
        BuildSsaPass.run_on_subroutine(&mut sub, &mut metadata).unwrap();
        RemoveDeadInstructionsPass::new(IrGenOptions::default())
            .run_on_subroutine(&mut sub, &mut metadata)
            .unwrap();

        assert_eq!(sub.blocks[0].instructions.len(), 2);
    }
}
