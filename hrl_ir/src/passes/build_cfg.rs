//! Control-flow graph construction

use crate::passes::Pass;
use crate::{Cfg, DiGraph, IrOp, ProgramMetadata, Subroutine};
use hrl_common::{HrlError, HrlResult};
use std::collections::HashMap;

/// Links basic blocks into a directed graph by inspecting terminators.
pub struct BuildControlFlowGraphPass;

impl Pass for BuildControlFlowGraphPass {
    fn name(&self) -> &'static str {
        "build-cfg"
    }

    fn run_on_subroutine(
        &mut self,
        subroutine: &mut Subroutine,
        _metadata: &mut ProgramMetadata,
    ) -> HrlResult<()> {
        let mut graph = DiGraph::with_vertices(subroutine.blocks.len());

        let label_to_vertex: HashMap<&str, usize> = subroutine
            .blocks
            .iter()
            .enumerate()
            .map(|(vertex, block)| (block.label(), vertex))
            .collect();

        for (vertex, block) in subroutine.blocks.iter().enumerate() {
            let mut connect_next = false;
            let mut branch_target = None;

            match block.terminator() {
                // Empty blocks fall through.
                None => connect_next = true,
                Some(terminator) => match terminator.op() {
                    IrOp::Je | IrOp::Jne | IrOp::Jgt | IrOp::Jlt | IrOp::Jge | IrOp::Jle
                    | IrOp::Jz | IrOp::Jnz => {
                        connect_next = true;
                        branch_target = terminator.tgt().label();
                    }
                    IrOp::Jmp => {
                        branch_target = terminator.tgt().label();
                    }
                    IrOp::Ret | IrOp::Halt => {}
                    // Calls return to the linear successor; callees are
                    // not part of this graph.
                    _ => connect_next = true,
                },
            }

            if connect_next && vertex + 1 < subroutine.blocks.len() {
                graph.add_edge(vertex, vertex + 1);
            }

            if let Some(target) = branch_target {
                let &target_vertex = label_to_vertex.get(target).ok_or_else(|| {
                    HrlError::ir_construction(format!(
                        "branch target '{}' does not exist in subroutine '{}'",
                        target,
                        subroutine.name()
                    ))
                })?;
                graph.add_edge(vertex, target_vertex);
            }
        }

        subroutine.cfg = Some(Cfg { graph, entry: 0 });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BasicBlock, Instruction, Operand};

    fn run(blocks: Vec<BasicBlock>) -> Subroutine {
        let mut sub = Subroutine::new("f", false, false, blocks);
        let mut metadata = ProgramMetadata::default();
        BuildControlFlowGraphPass
            .run_on_subroutine(&mut sub, &mut metadata)
            .unwrap();
        sub
    }

    fn jz(label: &str, var: i32) -> Instruction {
        Instruction::branch_on(IrOp::Jz, Operand::Label(label.to_string()), Operand::Variable(var))
            .unwrap()
    }

    #[test]
    fn conditional_branch_gets_both_edges() {
        let sub = run(vec![
            BasicBlock::new("f", vec![jz("f.exit", 0)]),
            BasicBlock::new("f.body", vec![
                Instruction::jmp(Operand::Label("f".to_string())).unwrap(),
            ]),
            BasicBlock::new("f.exit", vec![Instruction::ret(None).unwrap()]),
        ]);

        let cfg = sub.cfg.as_ref().unwrap();
        assert_eq!(cfg.entry, 0);
        let mut succs0 = cfg.graph.successors(0).to_vec();
        succs0.sort_unstable();
        assert_eq!(succs0, vec![1, 2]);
        assert_eq!(cfg.graph.successors(1), &[0]);
        assert!(cfg.graph.successors(2).is_empty());
    }

    #[test]
    fn empty_and_call_blocks_fall_through() {
        let sub = run(vec![
            BasicBlock::new("f", vec![]),
            BasicBlock::new("f.XB0", vec![
                Instruction::call(Operand::Variable(0), Operand::Label("g".to_string()), None)
                    .unwrap(),
            ]),
            BasicBlock::new("f.XB1", vec![Instruction::ret(None).unwrap()]),
        ]);

        let cfg = sub.cfg.as_ref().unwrap();
        assert_eq!(cfg.graph.successors(0), &[1]);
        assert_eq!(cfg.graph.successors(1), &[2]);
    }

    #[test]
    fn unknown_target_is_fatal() {
        let mut sub = Subroutine::new(
            "f",
            false,
            false,
            vec![BasicBlock::new("f", vec![
                Instruction::jmp(Operand::Label("nowhere".to_string())).unwrap(),
            ])],
        );
        let mut metadata = ProgramMetadata::default();
        let err = BuildControlFlowGraphPass
            .run_on_subroutine(&mut sub, &mut metadata)
            .unwrap_err();
        assert!(matches!(err, HrlError::IrConstruction { .. }));
    }
}
