//! Coalescing of empty basic blocks
//!
//! Scanning the block list in reverse, every run of empty blocks maps to
//! the label of the next surviving block below it; branches into the run
//! are retargeted there. An empty block at the very end of the
//! subroutine survives, having nothing to redirect to.

use crate::passes::Pass;
use crate::{Operand, ProgramMetadata, Subroutine};
use hrl_common::HrlResult;
use log::trace;
use std::collections::HashMap;

pub struct StripEmptyBasicBlockPass;

impl Pass for StripEmptyBasicBlockPass {
    fn name(&self) -> &'static str {
        "strip-empty-basic-block"
    }

    fn run_on_subroutine(
        &mut self,
        subroutine: &mut Subroutine,
        metadata: &mut ProgramMetadata,
    ) -> HrlResult<()> {
        // erased label → surviving label below it
        let mut label_map: HashMap<String, String> = HashMap::new();
        let mut last_valid: Option<String> = None;

        for block in subroutine.blocks.iter().rev() {
            match (&last_valid, block.is_empty()) {
                (Some(valid), true) => {
                    label_map.insert(block.label().to_string(), valid.clone());
                }
                _ => last_valid = Some(block.label().to_string()),
            }
        }

        if label_map.is_empty() {
            return Ok(());
        }

        for (from, to) in &label_map {
            trace!("[StripEmptyBB] '{}' coalesces into '{}'", from, to);
            metadata.set_label_alias(from.clone(), to.clone());
        }

        subroutine
            .blocks
            .retain(|block| !label_map.contains_key(block.label()));

        for block in &mut subroutine.blocks {
            for instruction in &mut block.instructions {
                if !instruction.op().is_branch() {
                    continue;
                }
                let Some(target) = instruction.tgt().label() else { continue };
                if let Some(surviving) = label_map.get(target) {
                    *instruction = instruction.with_operands(
                        Operand::Label(surviving.clone()),
                        instruction.src1().clone(),
                        instruction.src2().clone(),
                    )?;
                }
            }
        }

        // Block list changed; CFG and friends are stale.
        subroutine.invalidate_analyses();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BasicBlock, Instruction, IrOp};

    fn jmp(label: &str) -> Instruction {
        Instruction::jmp(Operand::Label(label.to_string())).unwrap()
    }

    #[test]
    fn runs_of_empty_blocks_coalesce_downward() {
        let mut sub = Subroutine::new(
            "f",
            false,
            false,
            vec![
                BasicBlock::new("f", vec![jmp("f.a")]),
                BasicBlock::new("f.a", vec![]),
                BasicBlock::new("f.b", vec![]),
                BasicBlock::new("f.c", vec![Instruction::ret(None).unwrap()]),
            ],
        );
        let mut metadata = ProgramMetadata::default();
        StripEmptyBasicBlockPass
            .run_on_subroutine(&mut sub, &mut metadata)
            .unwrap();

        let labels: Vec<&str> = sub.blocks.iter().map(|b| b.label()).collect();
        assert_eq!(labels, vec!["f", "f.c"]);
        // The branch into the erased run lands on the survivor.
        assert_eq!(sub.blocks[0].instructions[0].tgt().label(), Some("f.c"));
        assert_eq!(metadata.resolve_label("f.a"), "f.c");
        assert_eq!(metadata.resolve_label("f.b"), "f.c");
    }

    #[test]
    fn trailing_empty_block_survives() {
        let mut sub = Subroutine::new(
            "f",
            false,
            false,
            vec![
                BasicBlock::new("f", vec![jmp("f.end")]),
                BasicBlock::new("f.end", vec![]),
            ],
        );
        let mut metadata = ProgramMetadata::default();
        StripEmptyBasicBlockPass
            .run_on_subroutine(&mut sub, &mut metadata)
            .unwrap();

        assert_eq!(sub.blocks.len(), 2);
        assert_eq!(sub.blocks[1].label(), "f.end");
    }

    #[test]
    fn conditional_branches_are_retargeted_too() {
        let mut sub = Subroutine::new(
            "f",
            false,
            false,
            vec![
                BasicBlock::new("f", vec![
                    Instruction::branch_on(
                        IrOp::Jnz,
                        Operand::Label("f.skip".to_string()),
                        Operand::Variable(0),
                    )
                    .unwrap(),
                ]),
                BasicBlock::new("f.skip", vec![]),
                BasicBlock::new("f.done", vec![Instruction::ret(None).unwrap()]),
            ],
        );
        let mut metadata = ProgramMetadata::default();
        StripEmptyBasicBlockPass
            .run_on_subroutine(&mut sub, &mut metadata)
            .unwrap();

        assert_eq!(sub.blocks[0].instructions[0].tgt().label(), Some("f.done"));
    }
}
