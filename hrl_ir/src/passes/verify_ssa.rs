//! SSA verification
//!
//! Two sweeps over the reachable blocks in DFS preorder from the entry:
//! first single-assignment and def-before-use, then the phi-incoming /
//! CFG-predecessor bijection. Any failure is a bug in the SSA builder or
//! in a pass that ran after it, never in the input program.

use crate::passes::Pass;
use crate::{IrOp, ProgramMetadata, Subroutine, Vertex};
use hrl_common::{HrlError, HrlResult};
use std::collections::BTreeSet;

pub struct VerifySsaPass;

impl Pass for VerifySsaPass {
    fn name(&self) -> &'static str {
        "verify-ssa"
    }

    fn run_on_subroutine(
        &mut self,
        subroutine: &mut Subroutine,
        _metadata: &mut ProgramMetadata,
    ) -> HrlResult<()> {
        let cfg = subroutine.cfg.clone().ok_or_else(|| {
            HrlError::ir_construction(format!(
                "SSA verification for '{}' requires a control-flow graph",
                subroutine.name()
            ))
        })?;

        let order = preorder(subroutine, cfg.entry);

        let mut assigned: BTreeSet<i32> = BTreeSet::new();
        for &vertex in &order {
            verify_assignments_and_uses(subroutine, vertex, &mut assigned)?;
        }

        for &vertex in &order {
            verify_phi_incomings(subroutine, vertex, &assigned)?;
        }

        Ok(())
    }
}

fn preorder(subroutine: &Subroutine, entry: Vertex) -> Vec<Vertex> {
    let graph = &subroutine.cfg.as_ref().expect("checked by the pass").graph;
    let mut visited = vec![false; graph.vertex_count()];
    let mut order = Vec::new();
    let mut stack = vec![entry];
    while let Some(vertex) = stack.pop() {
        if visited[vertex] {
            continue;
        }
        visited[vertex] = true;
        order.push(vertex);
        // Reverse push keeps the first successor first in the preorder.
        for &succ in graph.successors(vertex).iter().rev() {
            if !visited[succ] {
                stack.push(succ);
            }
        }
    }
    order
}

/// Sweep 1: every local target assigned at most once across the
/// subroutine; every local source defined before its use in traversal
/// order.
fn verify_assignments_and_uses(
    subroutine: &Subroutine,
    vertex: Vertex,
    assigned: &mut BTreeSet<i32>,
) -> HrlResult<()> {
    let block = &subroutine.blocks[vertex];
    for instruction in &block.instructions {
        // Phi operands live in the incoming map and are checked against
        // the full assigned set in sweep 2; straight-line uses are
        // checked here.
        if instruction.op() != IrOp::Phi {
            for used in instruction.variable_uses() {
                if used >= 0 && !assigned.contains(&used) {
                    return Err(HrlError::ssa_violation(format!(
                        "v{} in block '{}' is used before assignment",
                        used,
                        block.label()
                    )));
                }
            }
        }

        if let Some(defined) = instruction.variable_def() {
            if defined >= 0 {
                if !assigned.insert(defined) {
                    return Err(HrlError::ssa_violation(format!(
                        "v{} in block '{}' is defined more than once",
                        defined,
                        block.label()
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Sweep 2: a phi's incoming keys are exactly the CFG predecessors of
/// its block, and every incoming register has a definition somewhere.
fn verify_phi_incomings(
    subroutine: &Subroutine,
    vertex: Vertex,
    assigned: &BTreeSet<i32>,
) -> HrlResult<()> {
    let graph = &subroutine.cfg.as_ref().expect("checked by the pass").graph;
    let block = &subroutine.blocks[vertex];

    for instruction in &block.instructions {
        if instruction.op() != IrOp::Phi {
            continue;
        }

        let keys: BTreeSet<&str> = instruction
            .phi_incomings()
            .keys()
            .map(String::as_str)
            .collect();
        let predecessors: BTreeSet<&str> = graph
            .predecessors(vertex)
            .iter()
            .map(|&pred| subroutine.blocks[pred].label())
            .collect();

        if keys != predecessors {
            return Err(HrlError::ssa_violation(format!(
                "phi in block '{}' has incomings {:?} but predecessors {:?}",
                block.label(),
                keys,
                predecessors
            )));
        }

        for incoming in instruction.phi_incomings().values() {
            if !assigned.contains(&incoming.variable) {
                return Err(HrlError::ssa_violation(format!(
                    "phi incoming v{} in block '{}' is never defined",
                    incoming.variable,
                    block.label()
                )));
            }
        }
    }
    Ok(())
}
