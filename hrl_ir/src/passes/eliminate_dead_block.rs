//! Unreachable basic-block removal
//!
//! Depth-first colouring from the entry vertex; unvisited blocks and
//! their CFG vertices disappear, and the survivors are renumbered
//! densely so vertex `i` still names block `i`. Dominance and the
//! def/use maps index removed vertices and are dropped.

use crate::passes::Pass;
use crate::{Cfg, ProgramMetadata, Subroutine};
use hrl_common::{HrlError, HrlResult};
use log::trace;

pub struct EliminateDeadBasicBlockPass;

impl Pass for EliminateDeadBasicBlockPass {
    fn name(&self) -> &'static str {
        "eliminate-dead-basic-block"
    }

    fn run_on_subroutine(
        &mut self,
        subroutine: &mut Subroutine,
        _metadata: &mut ProgramMetadata,
    ) -> HrlResult<()> {
        let cfg = subroutine.cfg.as_ref().ok_or_else(|| {
            HrlError::ir_construction(format!(
                "dead-block elimination for '{}' requires a control-flow graph",
                subroutine.name()
            ))
        })?;

        let reachable = cfg.graph.reachable_from(cfg.entry);
        if reachable.iter().all(|&r| r) {
            return Ok(());
        }

        for (vertex, block) in subroutine.blocks.iter().enumerate() {
            if !reachable[vertex] {
                trace!("[EliminateDeadBB] removing unreachable block '{}'", block.label());
            }
        }

        let (graph, mapping) = cfg.graph.compact(&reachable);
        let entry = mapping[cfg.entry].expect("entry is always reachable");

        let mut kept = reachable.iter();
        subroutine.blocks.retain(|_| *kept.next().expect("one flag per block"));

        subroutine.cfg = Some(Cfg { graph, entry });
        // Stale by construction after renumbering.
        subroutine.dominance = None;
        subroutine.def_map.clear();
        subroutine.use_map.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::BuildControlFlowGraphPass;
    use crate::{BasicBlock, Instruction, Operand};

    #[test]
    fn unreachable_tail_is_removed_and_vertices_renumbered() {
        // f jumps straight to f.live; f.dead sits in between.
        let mut sub = Subroutine::new(
            "f",
            false,
            false,
            vec![
                BasicBlock::new("f", vec![
                    Instruction::jmp(Operand::Label("f.live".to_string())).unwrap(),
                ]),
                BasicBlock::new("f.dead", vec![
                    Instruction::jmp(Operand::Label("f".to_string())).unwrap(),
                ]),
                BasicBlock::new("f.live", vec![Instruction::ret(None).unwrap()]),
            ],
        );
        let mut metadata = ProgramMetadata::default();
        BuildControlFlowGraphPass.run_on_subroutine(&mut sub, &mut metadata).unwrap();
        EliminateDeadBasicBlockPass.run_on_subroutine(&mut sub, &mut metadata).unwrap();

        let labels: Vec<&str> = sub.blocks.iter().map(|b| b.label()).collect();
        assert_eq!(labels, vec!["f", "f.live"]);

        let cfg = sub.cfg.as_ref().unwrap();
        assert_eq!(cfg.entry, 0);
        assert_eq!(cfg.graph.vertex_count(), 2);
        assert_eq!(cfg.graph.successors(0), &[1]);
    }

    #[test]
    fn fully_reachable_subroutine_is_untouched() {
        let mut sub = Subroutine::new(
            "f",
            false,
            false,
            vec![BasicBlock::new("f", vec![Instruction::ret(None).unwrap()])],
        );
        let mut metadata = ProgramMetadata::default();
        BuildControlFlowGraphPass.run_on_subroutine(&mut sub, &mut metadata).unwrap();
        EliminateDeadBasicBlockPass.run_on_subroutine(&mut sub, &mut metadata).unwrap();
        assert_eq!(sub.blocks.len(), 1);
    }
}
