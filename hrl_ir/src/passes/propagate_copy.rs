//! Copy propagation over the dominator tree
//!
//! A dominator-tree DFS carries an inherited map from copy destinations
//! to their transitive source roots. Straight-line instructions rewrite
//! their sources through the map; phis substitute their incomings, and a
//! phi whose incomings all collapse to one value becomes a MOV.

use crate::passes::Pass;
use crate::{
    DominanceInfo, Instruction, IrOp, Operand, PhiIncoming, ProgramMetadata, Subroutine, Vertex,
};
use hrl_common::{HrlError, HrlResult};
use log::trace;
use std::collections::{BTreeMap, HashMap};

pub struct PropagateCopyPass;

/// dst → (root source, block defining the root)
type CopyMap = HashMap<i32, (i32, Vertex)>;

impl Pass for PropagateCopyPass {
    fn name(&self) -> &'static str {
        "propagate-copy"
    }

    fn run_on_subroutine(
        &mut self,
        subroutine: &mut Subroutine,
        _metadata: &mut ProgramMetadata,
    ) -> HrlResult<()> {
        let dominance = subroutine.dominance.clone().ok_or_else(|| {
            HrlError::ir_construction(format!(
                "copy propagation for '{}' requires dominance information",
                subroutine.name()
            ))
        })?;

        let labels: Vec<String> =
            subroutine.blocks.iter().map(|b| b.label().to_string()).collect();
        let copies = CopyMap::new();
        visit(subroutine, &dominance, dominance.root, &labels, &copies)
    }
}

fn visit(
    subroutine: &mut Subroutine,
    dominance: &DominanceInfo,
    vertex: Vertex,
    labels: &[String],
    inherited: &CopyMap,
) -> HrlResult<()> {
    let mut copies = inherited.clone();

    for index in 0..subroutine.blocks[vertex].instructions.len() {
        let instruction = &subroutine.blocks[vertex].instructions[index];
        let op = instruction.op();

        if op == IrOp::Mov
            && instruction.tgt().is_local_register()
            && instruction.src1().is_local_register()
        {
            let dst = instruction.tgt().local_id().expect("checked local");
            let src = instruction.src1().local_id().expect("checked local");
            // Chase transitive copies so every entry points at a root.
            let root = copies.get(&src).copied().unwrap_or((src, vertex));
            copies.insert(dst, root);
        } else if op == IrOp::Phi {
            let instruction = &mut subroutine.blocks[vertex].instructions[index];
            let mut substituted: Vec<i32> = Vec::new();
            let remapped: BTreeMap<String, PhiIncoming> = instruction
                .phi_incomings()
                .iter()
                .map(|(pred, incoming)| {
                    let entry = match copies.get(&incoming.variable) {
                        Some(&(root, root_block)) if root != incoming.variable => PhiIncoming {
                            variable: root,
                            def_block: labels[root_block].clone(),
                        },
                        _ => incoming.clone(),
                    };
                    substituted.push(entry.variable);
                    (pred.clone(), entry)
                })
                .collect();
            instruction.set_phi_incomings(remapped);

            // All incomings agree: the phi is a copy of that value.
            if let Some((&first, rest)) = substituted.split_first() {
                if rest.iter().all(|&v| v == first) {
                    let mov = Instruction::mov(
                        instruction.tgt().clone(),
                        Operand::Variable(first),
                    )?;
                    trace!(
                        "[PropCopy] phi in '{}' collapses to '{}'",
                        labels[vertex],
                        mov
                    );
                    *instruction = match instruction.origin() {
                        Some(origin) => mov.with_origin(origin),
                        None => mov,
                    };
                }
            }
        } else {
            let rewrite = |operand: &Operand, copies: &CopyMap| -> Option<Operand> {
                let id = operand.local_id()?;
                let &(root, _) = copies.get(&id)?;
                Some(Operand::Variable(root))
            };
            let new_src1 = rewrite(instruction.src1(), &copies);
            let new_src2 = rewrite(instruction.src2(), &copies);
            if new_src1.is_some() || new_src2.is_some() {
                let instruction = &mut subroutine.blocks[vertex].instructions[index];
                let src1 = new_src1.unwrap_or_else(|| instruction.src1().clone());
                let src2 = new_src2.unwrap_or_else(|| instruction.src2().clone());
                let rewritten =
                    instruction.with_operands(instruction.tgt().clone(), src1, src2)?;
                trace!(
                    "[PropCopy] '{}' => '{}' in '{}'",
                    instruction,
                    rewritten,
                    labels[vertex]
                );
                *instruction = rewritten;
            }
        }
    }

    for &child in &dominance.children[vertex] {
        visit(subroutine, dominance, child, labels, &copies)?;
    }
    Ok(())
}
