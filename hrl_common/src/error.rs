//! Error handling utilities for the HRL compiler

use thiserror::Error;

/// The main error type for the HRL compiler
#[derive(Error, Debug, Clone)]
pub enum HrlError {
    #[error("Lexical error: {message}")]
    LexError { message: String },

    #[error("Parse error: {message}")]
    ParseError { message: String },

    #[error("Semantic error: {message}")]
    SemanticError { message: String },

    /// An instruction was constructed with operands that violate its
    /// opcode's slot contract. Always a compiler bug.
    #[error("Malformed IR: {message}")]
    MalformedIr { message: String },

    /// The TAC generator or CFG builder hit an impossible program shape
    /// (missing AST child, unmapped symbol, unknown branch target).
    #[error("IR construction error: {message}")]
    IrConstruction { message: String },

    /// The SSA builder or verifier found a broken single-assignment
    /// property or phi/predecessor mismatch.
    #[error("SSA violation: {message}")]
    SsaViolation { message: String },

    #[error("I/O error: {message}")]
    IoError { message: String },
}

/// Result type alias for HRL compiler operations
pub type HrlResult<T> = Result<T, HrlError>;

impl HrlError {
    pub fn lex_error(message: impl Into<String>) -> Self {
        Self::LexError { message: message.into() }
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::ParseError { message: message.into() }
    }

    pub fn semantic_error(message: impl Into<String>) -> Self {
        Self::SemanticError { message: message.into() }
    }

    pub fn malformed_ir(message: impl Into<String>) -> Self {
        Self::MalformedIr { message: message.into() }
    }

    pub fn ir_construction(message: impl Into<String>) -> Self {
        Self::IrConstruction { message: message.into() }
    }

    pub fn ssa_violation(message: impl Into<String>) -> Self {
        Self::SsaViolation { message: message.into() }
    }

    pub fn io_error(message: impl Into<String>) -> Self {
        Self::IoError { message: message.into() }
    }
}
