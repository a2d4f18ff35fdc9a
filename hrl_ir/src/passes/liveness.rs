//! Per-block liveness analysis
//!
//! DEF and USE come from a single forward scan of each block; IN and OUT
//! from the standard backward dataflow iterated to a fixed point over a
//! post-order DFS of the CFG. Only local registers are tracked.

use crate::passes::Pass;
use crate::{Program, ProgramMetadata, Subroutine};
use hrl_common::{HrlError, HrlResult};
use log::trace;
use std::collections::BTreeSet;
use std::fmt::Write;

pub struct AnalyzeLivenessPass;

impl Pass for AnalyzeLivenessPass {
    fn name(&self) -> &'static str {
        "analyze-liveness"
    }

    fn run_on_subroutine(
        &mut self,
        subroutine: &mut Subroutine,
        _metadata: &mut ProgramMetadata,
    ) -> HrlResult<()> {
        if subroutine.cfg.is_none() {
            return Err(HrlError::ir_construction(format!(
                "liveness for '{}' requires a control-flow graph",
                subroutine.name()
            )));
        }

        calculate_def_use(subroutine);
        calculate_in_out(subroutine);

        for block in &subroutine.blocks {
            trace!(
                "[Liveness] '{}': DEF={:?} USE={:?} IN={:?} OUT={:?}",
                block.label(),
                block.def_set,
                block.use_set,
                block.in_set,
                block.out_set
            );
        }
        Ok(())
    }

    /// Per-block liveness report for the pass manager's extra artifact.
    fn extra_artifact_text(&self, program: &Program) -> Option<String> {
        let mut text = String::new();
        for subroutine in &program.subroutines {
            for block in &subroutine.blocks {
                writeln!(
                    text,
                    "{}/{}: DEF={:?} USE={:?} IN={:?} OUT={:?}",
                    subroutine.name(),
                    block.label(),
                    block.def_set,
                    block.use_set,
                    block.in_set,
                    block.out_set
                )
                .expect("writing to a string");
            }
        }
        Some(text)
    }
}

/// DEF is every local written in the block; USE is every local read
/// before any write in the block. The subroutine-level def/use maps are
/// rebuilt alongside.
fn calculate_def_use(subroutine: &mut Subroutine) {
    subroutine.def_map.clear();
    subroutine.use_map.clear();

    for vertex in 0..subroutine.blocks.len() {
        let mut def_set = BTreeSet::new();
        let mut use_set = BTreeSet::new();

        for instruction in &subroutine.blocks[vertex].instructions {
            for used in instruction.variable_uses() {
                if used >= 0 && !def_set.contains(&used) {
                    use_set.insert(used);
                    subroutine.use_map.entry(used).or_default().insert(vertex);
                }
            }
            if let Some(defined) = instruction.variable_def() {
                if defined >= 0 {
                    def_set.insert(defined);
                    subroutine.def_map.entry(defined).or_default().insert(vertex);
                }
            }
        }

        subroutine.blocks[vertex].def_set = def_set;
        subroutine.blocks[vertex].use_set = use_set;
    }
}

/// Backward iterative dataflow:
/// `OUT[B] = ∪ IN[S]`, `IN[B] = USE[B] ∪ (OUT[B] − DEF[B])`.
fn calculate_in_out(subroutine: &mut Subroutine) {
    let cfg = subroutine.cfg.clone().expect("checked by the pass");
    let order = cfg.graph.post_order_from(cfg.entry);

    for block in &mut subroutine.blocks {
        block.in_set.clear();
        block.out_set.clear();
    }

    let mut changed = true;
    while changed {
        changed = false;

        for &vertex in &order {
            let mut new_out = BTreeSet::new();
            for &succ in cfg.graph.successors(vertex) {
                new_out.extend(subroutine.blocks[succ].in_set.iter().copied());
            }

            let block = &subroutine.blocks[vertex];
            let mut new_in: BTreeSet<i32> = block.use_set.clone();
            new_in.extend(new_out.difference(&block.def_set).copied());

            if new_in != block.in_set || new_out != block.out_set {
                changed = true;
                let block = &mut subroutine.blocks[vertex];
                block.in_set = new_in;
                block.out_set = new_out;
            }
        }
    }
}
