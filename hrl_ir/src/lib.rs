//! Intermediate representation and middle-end passes for the HRL compiler
//!
//! The pipeline: the TAC generator lowers the symbol-annotated AST to
//! linear three-address code and partitions it into basic blocks; the
//! pass manager then runs CFG construction, liveness, dominance-based
//! SSA construction with verification, and the SSA-level optimizations.
//! The result is consumed by the IR interpreter or dumped as text and
//! Graphviz.

pub mod dump;
pub mod graph;
pub mod graphviz;
pub mod instruction;
pub mod operand;
pub mod ops;
pub mod passes;
pub mod program;
pub mod tacgen;

pub use dump::{dump_program, dump_subroutine, format_instruction, VariableFormat};
pub use graph::{DiGraph, Vertex};
pub use graphviz::generate_graphviz;
pub use instruction::{Instruction, PhiIncoming};
pub use operand::Operand;
pub use ops::IrOp;
pub use program::{
    BasicBlock, Cfg, DominanceInfo, Program, ProgramMetadata, Subroutine, DEFAULT_FLOOR_MAX,
};
pub use tacgen::{generate, TacGen};
