//! Program structure: basic blocks, subroutines, CFG and metadata

use crate::{DiGraph, Instruction, Vertex};
use hrl_common::HrBox;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub const DEFAULT_FLOOR_MAX: i32 = 64;

/// A maximal straight-line sequence of instructions with a unique label
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BasicBlock {
    label: String,
    pub instructions: Vec<Instruction>,
    // Liveness sets over local register ids, filled by the analyzer.
    pub def_set: BTreeSet<i32>,
    pub use_set: BTreeSet<i32>,
    pub in_set: BTreeSet<i32>,
    pub out_set: BTreeSet<i32>,
}

impl BasicBlock {
    pub fn new(label: impl Into<String>, instructions: Vec<Instruction>) -> Self {
        Self {
            label: label.into(),
            instructions,
            ..Default::default()
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// The last instruction, which decides the block's outgoing edges.
    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last()
    }
}

/// Control-flow graph of one subroutine. Vertex `i` is `blocks[i]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cfg {
    pub graph: DiGraph,
    pub entry: Vertex,
}

/// Dominator tree and dominance frontiers for one subroutine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DominanceInfo {
    /// Immediate dominator per vertex; `None` for the root and for
    /// unreachable vertices.
    pub idom: Vec<Option<Vertex>>,
    /// Strict dominator-tree children per vertex.
    pub children: Vec<Vec<Vertex>>,
    /// Dominance frontier per vertex.
    pub frontiers: Vec<BTreeSet<Vertex>>,
    pub root: Vertex,
}

impl DominanceInfo {
    /// Whether `a` dominates `b` (reflexively).
    pub fn dominates(&self, a: Vertex, b: Vertex) -> bool {
        let mut current = b;
        loop {
            if current == a {
                return true;
            }
            match self.idom[current] {
                Some(idom) => current = idom,
                None => return false,
            }
        }
    }
}

/// One compiled subroutine: blocks in linear order plus derived analyses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subroutine {
    name: String,
    has_param: bool,
    has_return: bool,
    pub blocks: Vec<BasicBlock>,
    pub cfg: Option<Cfg>,
    pub dominance: Option<DominanceInfo>,
    /// local register → blocks containing a definition
    pub def_map: BTreeMap<i32, BTreeSet<Vertex>>,
    /// local register → blocks containing an upward-exposed use
    pub use_map: BTreeMap<i32, BTreeSet<Vertex>>,
    /// Set once SSA construction has succeeded
    pub ssa: bool,
}

impl Subroutine {
    pub fn new(
        name: impl Into<String>,
        has_param: bool,
        has_return: bool,
        blocks: Vec<BasicBlock>,
    ) -> Self {
        Self {
            name: name.into(),
            has_param,
            has_return,
            blocks,
            cfg: None,
            dominance: None,
            def_map: BTreeMap::new(),
            use_map: BTreeMap::new(),
            ssa: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_param(&self) -> bool {
        self.has_param
    }

    pub fn has_return(&self) -> bool {
        self.has_return
    }

    /// CFG vertex of the linear entry block.
    pub fn entry_vertex(&self) -> Option<Vertex> {
        self.cfg.as_ref().map(|cfg| cfg.entry)
    }

    pub fn block_index(&self, label: &str) -> Option<Vertex> {
        self.blocks.iter().position(|block| block.label() == label)
    }

    /// Largest local register id mentioned anywhere, if any.
    pub fn max_local_register(&self) -> Option<i32> {
        self.blocks
            .iter()
            .flat_map(|block| &block.instructions)
            .flat_map(|instr| {
                instr
                    .variable_def()
                    .into_iter()
                    .chain(instr.variable_uses())
                    .chain(instr.phi_incomings().values().map(|inc| inc.variable))
            })
            .filter(|&id| id >= 0)
            .max()
    }

    /// Drop analyses derived from the block list; structural passes call
    /// this after reshaping blocks.
    pub fn invalidate_analyses(&mut self) {
        self.cfg = None;
        self.dominance = None;
        self.def_map.clear();
        self.use_map.clear();
    }
}

/// Program-wide facts carried alongside the subroutines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramMetadata {
    floor_max: i32,
    floor_inits: BTreeMap<i32, HrBox>,
    label_aliases: HashMap<String, String>,
}

impl Default for ProgramMetadata {
    fn default() -> Self {
        Self::new(DEFAULT_FLOOR_MAX, BTreeMap::new())
    }
}

impl ProgramMetadata {
    pub fn new(floor_max: i32, floor_inits: BTreeMap<i32, HrBox>) -> Self {
        Self {
            floor_max,
            floor_inits,
            label_aliases: HashMap::new(),
        }
    }

    pub fn floor_max(&self) -> i32 {
        self.floor_max
    }

    pub fn floor_inits(&self) -> &BTreeMap<i32, HrBox> {
        &self.floor_inits
    }

    pub fn set_label_alias(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.label_aliases.insert(from.into(), to.into());
    }

    /// Resolve a label through any chain of recorded aliases.
    pub fn resolve_label<'a>(&'a self, label: &'a str) -> &'a str {
        let mut current = label;
        while let Some(next) = self.label_aliases.get(current) {
            current = next;
        }
        current
    }
}

/// The whole compiled program: subroutines in declaration order, the
/// `<global>` initializer among them, plus metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub subroutines: Vec<Subroutine>,
    pub metadata: ProgramMetadata,
}

impl Program {
    pub fn new(subroutines: Vec<Subroutine>, metadata: ProgramMetadata) -> Self {
        Self { subroutines, metadata }
    }

    pub fn subroutine(&self, name: &str) -> Option<&Subroutine> {
        self.subroutines.iter().find(|sub| sub.name() == name)
    }

    pub fn subroutine_mut(&mut self, name: &str) -> Option<&mut Subroutine> {
        self.subroutines.iter_mut().find(|sub| sub.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Operand;

    #[test]
    fn terminator_is_last_instruction() {
        let block = BasicBlock::new(
            "b0",
            vec![
                Instruction::loadi(Operand::Variable(0), 1).unwrap(),
                Instruction::jmp(Operand::Label("b1".to_string())).unwrap(),
            ],
        );
        assert_eq!(block.terminator().unwrap().op(), crate::IrOp::Jmp);
        assert!(BasicBlock::new("e", vec![]).terminator().is_none());
    }

    #[test]
    fn label_alias_chains_resolve() {
        let mut metadata = ProgramMetadata::default();
        metadata.set_label_alias("a", "b");
        metadata.set_label_alias("b", "c");
        assert_eq!(metadata.resolve_label("a"), "c");
        assert_eq!(metadata.resolve_label("c"), "c");
        assert_eq!(metadata.floor_max(), DEFAULT_FLOOR_MAX);
    }

    #[test]
    fn max_local_register_ignores_globals() {
        let block = BasicBlock::new(
            "b0",
            vec![
                Instruction::loadi(Operand::Variable(4), 1).unwrap(),
                Instruction::load(Operand::Variable(2), Operand::Variable(-3)).unwrap(),
            ],
        );
        let sub = Subroutine::new("f", false, false, vec![block]);
        assert_eq!(sub.max_local_register(), Some(4));
    }
}
