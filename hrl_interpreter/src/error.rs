//! Typed runtime errors of the IR interpreter

use thiserror::Error;

/// Every way an HRL program can stop abnormally. Each variant carries a
/// distinct status for the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("end of input reached")]
    EndOfInput,

    #[error("floor cell {0} is empty")]
    FloorIsEmpty(i32),

    #[error("register {0} is read before assignment")]
    RegisterIsEmpty(String),

    #[error("arithmetic on a zero divisor")]
    ValueIsZero,

    #[error("halt requested")]
    HaltRequested,

    /// The program handed to the interpreter is broken (unknown
    /// subroutine, floor index out of bounds, phi without a matching
    /// predecessor, runtime SSA violation). Always a compiler bug.
    #[error("invalid program: {0}")]
    InvalidProgram(String),
}

impl RuntimeError {
    /// Distinct process exit status per error kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            RuntimeError::EndOfInput => 10,
            RuntimeError::FloorIsEmpty(_) => 11,
            RuntimeError::RegisterIsEmpty(_) => 12,
            RuntimeError::ValueIsZero => 13,
            RuntimeError::HaltRequested => 14,
            RuntimeError::InvalidProgram(_) => 15,
        }
    }
}
