//! IR interpreter for the HRL virtual machine
//!
//! Executes a lowered (optionally SSA-form) program against the machine
//! model: a bounded floor memory, an input queue, an output queue, one
//! register file per call frame and a shared global store.

pub mod error;
pub mod interpreter;

pub use error::*;
pub use interpreter::*;
