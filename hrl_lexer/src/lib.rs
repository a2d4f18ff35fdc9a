//! Lexical analyzer for the HRL language
//!
//! Produces a flat token stream from source text. HRL is an ASCII
//! language; the lexer is a plain byte scanner with one character of
//! lookahead and line-comment support.

pub mod lexer;
pub mod token;

pub use lexer::*;
pub use token::*;
