//! Shared utilities and error types for the HRL compiler
//!
//! This crate provides common functionality used across all compiler components:
//! - Error types and handling utilities
//! - Source location tracking
//! - Diagnostic reporting with filters
//! - The boxed VM value (`HrBox`)

pub mod diagnostics;
pub mod error;
pub mod hrbox;
pub mod span;

pub use diagnostics::*;
pub use error::*;
pub use hrbox::*;
pub use span::*;

/// Name of the synthetic compilation-unit subroutine. It holds floor
/// initializers and global variable initialization, and calls `start`.
pub const GLOBAL_SCOPE_ID: &str = "<global>";

/// Name of the user-level entry point invoked by the global scope.
pub const START_SUBROUTINE: &str = "start";
