//! SSA construction: phi insertion, renaming, renumbering
//!
//! Phi placement is the Cytron et al. worklist over dominance frontiers.
//! Renaming walks the dominator tree depth-first with one name stack per
//! original variable; phi incomings are rebuilt from scratch during the
//! walk so every CFG predecessor ends up with exactly one entry.
//! Renumbering compacts the resulting ids into a dense range.

use crate::passes::dominance::compute_dominance;
use crate::passes::Pass;
use crate::{DominanceInfo, Instruction, IrOp, Operand, PhiIncoming, ProgramMetadata, Subroutine, Vertex};
use hrl_common::{HrlError, HrlResult};
use log::debug;
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub struct BuildSsaPass;

impl Pass for BuildSsaPass {
    fn name(&self) -> &'static str {
        "build-ssa"
    }

    fn run_on_subroutine(
        &mut self,
        subroutine: &mut Subroutine,
        _metadata: &mut ProgramMetadata,
    ) -> HrlResult<()> {
        let cfg = subroutine.cfg.clone().ok_or_else(|| {
            HrlError::ir_construction(format!(
                "SSA construction for '{}' requires a control-flow graph",
                subroutine.name()
            ))
        })?;

        let dominance = compute_dominance(&cfg.graph, cfg.entry)?;

        let def_map = collect_def_blocks(subroutine);
        insert_phi_functions(subroutine, &def_map, &dominance);
        rename_variables(subroutine, &dominance)?;
        renumber_registers(subroutine);

        debug!(
            "[BuildSsa] subroutine '{}' is in SSA form, {} blocks",
            subroutine.name(),
            subroutine.blocks.len()
        );
        subroutine.dominance = Some(dominance);
        subroutine.ssa = true;
        Ok(())
    }
}

/// Blocks containing a definition, per local register.
fn collect_def_blocks(subroutine: &Subroutine) -> BTreeMap<i32, BTreeSet<Vertex>> {
    let mut def_map: BTreeMap<i32, BTreeSet<Vertex>> = BTreeMap::new();
    for (vertex, block) in subroutine.blocks.iter().enumerate() {
        for instruction in &block.instructions {
            if let Some(defined) = instruction.variable_def() {
                if defined >= 0 {
                    def_map.entry(defined).or_default().insert(vertex);
                }
            }
        }
    }
    def_map
}

/// Cytron et al.: for every variable, push phis into the iterated
/// dominance frontier of its definition blocks. The incoming recorded
/// here (the worklist block with the unrenamed variable) is provisional;
/// renaming replaces it with the per-predecessor reaching name.
fn insert_phi_functions(
    subroutine: &mut Subroutine,
    def_map: &BTreeMap<i32, BTreeSet<Vertex>>,
    dominance: &DominanceInfo,
) {
    let labels: Vec<String> = subroutine.blocks.iter().map(|b| b.label().to_string()).collect();

    for (&variable, def_blocks) in def_map {
        let mut work: Vec<Vertex> = def_blocks.iter().copied().collect();
        let mut has_phi: BTreeSet<Vertex> = BTreeSet::new();

        while let Some(x) = work.pop() {
            for &y in &dominance.frontiers[x] {
                if !has_phi.contains(&y) {
                    let phi = Instruction::phi(variable).expect("phi target is a variable");
                    subroutine.blocks[y].instructions.insert(0, phi);
                    has_phi.insert(y);
                    if !def_blocks.contains(&y) {
                        work.push(y);
                    }
                }

                let incoming = PhiIncoming {
                    variable,
                    def_block: labels[x].clone(),
                };
                phi_for_variable(subroutine, y, variable)
                    .expect("phi was just ensured")
                    .set_phi_incoming(labels[x].clone(), incoming);
            }
        }
    }
}

/// Find the phi defining `variable` in the phi prefix of block `vertex`.
fn phi_for_variable(
    subroutine: &mut Subroutine,
    vertex: Vertex,
    variable: i32,
) -> Option<&mut Instruction> {
    subroutine.blocks[vertex]
        .instructions
        .iter_mut()
        .take_while(|instr| instr.op() == IrOp::Phi)
        .find(|instr| instr.variable_def() == Some(variable))
}

/// One per-variable stack entry: the current SSA name and the block that
/// defined it.
type NameStacks = HashMap<i32, Vec<(i32, Vertex)>>;

/// Phi prefix of every block as (original variable, pre-assigned fresh
/// name) pairs, in instruction order.
type PhiNames = HashMap<Vertex, Vec<(i32, i32)>>;

fn rename_variables(subroutine: &mut Subroutine, dominance: &DominanceInfo) -> HrlResult<()> {
    let labels: Vec<String> = subroutine.blocks.iter().map(|b| b.label().to_string()).collect();

    let mut next_name = subroutine.max_local_register().map_or(0, |max| max + 1);

    // Phi targets are renamed up front: a predecessor can be processed
    // before the phi's own block, and an edge along which the merged
    // variable has no reaching definition records the phi's own name.
    let mut phi_names: PhiNames = HashMap::new();
    for (vertex, block) in subroutine.blocks.iter_mut().enumerate() {
        let mut names = Vec::new();
        for instruction in &mut block.instructions {
            if instruction.op() != IrOp::Phi {
                break;
            }
            let original = instruction.variable_def().expect("phi defines a variable");
            let fresh = take_name(&mut next_name);
            names.push((original, fresh));
            // Incomings are rebuilt from the predecessor walk below.
            instruction.clear_phi_incomings();
            *instruction = instruction.with_operands(
                Operand::Variable(fresh),
                Operand::Null,
                Operand::Null,
            )?;
        }
        phi_names.insert(vertex, names);
    }

    let mut stacks: NameStacks = HashMap::new();

    rename_block(
        subroutine,
        dominance,
        dominance.root,
        &labels,
        &phi_names,
        &mut stacks,
        &mut next_name,
    )
}

fn rename_block(
    subroutine: &mut Subroutine,
    dominance: &DominanceInfo,
    vertex: Vertex,
    labels: &[String],
    phi_names: &PhiNames,
    stacks: &mut NameStacks,
    next_name: &mut i32,
) -> HrlResult<()> {
    let mut pushed: Vec<i32> = Vec::new();

    // Phi targets become the current names at block entry.
    for &(original, fresh) in &phi_names[&vertex] {
        stacks.entry(original).or_default().push((fresh, vertex));
        pushed.push(original);
    }

    for index in 0..subroutine.blocks[vertex].instructions.len() {
        let instruction = &subroutine.blocks[vertex].instructions[index];
        if instruction.op() == IrOp::Phi {
            continue;
        }

        // Uses first, against the pre-instruction stacks.
        let src1 = rename_use(instruction.src1(), stacks, labels, vertex)?;
        let src2 = rename_use(instruction.src2(), stacks, labels, vertex)?;

        // Then the definition gets a fresh name.
        let tgt = match instruction.tgt().local_id() {
            Some(original) => {
                let fresh = take_name(next_name);
                stacks.entry(original).or_default().push((fresh, vertex));
                pushed.push(original);
                Operand::Variable(fresh)
            }
            None => instruction.tgt().clone(),
        };

        let instruction = &mut subroutine.blocks[vertex].instructions[index];
        *instruction = instruction.with_operands(tgt, src1, src2)?;
    }

    // Feed the current names into successor phis, keyed by this block.
    let successors: Vec<Vertex> = subroutine.cfg.as_ref().expect("cfg checked").graph
        .successors(vertex)
        .to_vec();
    for succ in successors {
        for (phi_index, &(original, fresh)) in phi_names[&succ].iter().enumerate() {
            let (name, def_block) = match stacks.get(&original).and_then(|stack| stack.last()) {
                Some(&(name, def_block)) => (name, def_block),
                // No definition of the variable reaches this edge; the
                // merge is only meaningful along the others. The phi's
                // own name fills the slot, and the interpreter leaves
                // the target unset when control arrives this way.
                None => (fresh, succ),
            };
            subroutine.blocks[succ].instructions[phi_index].set_phi_incoming(
                labels[vertex].clone(),
                PhiIncoming {
                    variable: name,
                    def_block: labels[def_block].clone(),
                },
            );
        }
    }

    for &child in &dominance.children[vertex] {
        rename_block(subroutine, dominance, child, labels, phi_names, stacks, next_name)?;
    }

    for original in pushed {
        stacks
            .get_mut(&original)
            .expect("pushed implies a stack")
            .pop();
    }
    Ok(())
}

fn rename_use(
    operand: &Operand,
    stacks: &NameStacks,
    labels: &[String],
    vertex: Vertex,
) -> HrlResult<Operand> {
    match operand.local_id() {
        Some(original) => {
            let &(name, _) = stacks
                .get(&original)
                .and_then(|stack| stack.last())
                .ok_or_else(|| {
                    HrlError::ssa_violation(format!(
                        "v{} used in block '{}' before any definition",
                        original, labels[vertex]
                    ))
                })?;
            Ok(Operand::Variable(name))
        }
        None => Ok(operand.clone()),
    }
}

fn take_name(next_name: &mut i32) -> i32 {
    let name = *next_name;
    *next_name += 1;
    name
}

/// Dense-renumbering table: old id → new id in order of first appearance.
#[derive(Default)]
struct RenumberTable {
    mapping: HashMap<i32, i32>,
    next_id: i32,
}

impl RenumberTable {
    fn renumber(&mut self, old: i32) -> i32 {
        match self.mapping.get(&old) {
            Some(&new_id) => new_id,
            None => {
                let new_id = self.next_id;
                self.next_id += 1;
                self.mapping.insert(old, new_id);
                new_id
            }
        }
    }

    fn remap(&mut self, operand: &Operand) -> Operand {
        match operand.local_id() {
            Some(old) => Operand::Variable(self.renumber(old)),
            None => operand.clone(),
        }
    }
}

/// Compact local register ids to `[0..n)` in order of appearance.
/// Phi incomings are remapped in a second sweep through the same table.
fn renumber_registers(subroutine: &mut Subroutine) {
    let mut table = RenumberTable::default();

    for block in &mut subroutine.blocks {
        for instruction in &mut block.instructions {
            let src1 = table.remap(instruction.src1());
            let src2 = table.remap(instruction.src2());
            let tgt = table.remap(instruction.tgt());
            *instruction = instruction
                .with_operands(tgt, src1, src2)
                .expect("renumbering keeps operand kinds");
        }
    }

    for block in &mut subroutine.blocks {
        for instruction in &mut block.instructions {
            if instruction.op() != IrOp::Phi {
                continue;
            }
            let remapped: BTreeMap<String, PhiIncoming> = instruction
                .phi_incomings()
                .iter()
                .map(|(pred, incoming)| {
                    (
                        pred.clone(),
                        PhiIncoming {
                            variable: table.renumber(incoming.variable),
                            def_block: incoming.def_block.clone(),
                        },
                    )
                })
                .collect();
            instruction.set_phi_incomings(remapped);
        }
    }
}
