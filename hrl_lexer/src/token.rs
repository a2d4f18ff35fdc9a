//! Token definitions for the HRL language

use hrl_common::Spanned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Token types in the HRL language
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenType {
    // Literals
    IntegerLiteral(i32),
    CharLiteral(char),
    BooleanLiteral(bool),

    // Identifiers
    Identifier(String),

    // Keywords
    KeywordImport,
    KeywordReturn,
    KeywordLet,
    KeywordInit,
    KeywordFloor,
    KeywordFloorMax,
    KeywordFunction,
    KeywordSub,
    KeywordIf,
    KeywordElse,
    KeywordWhile,
    KeywordFor,
    KeywordBreak,
    KeywordContinue,

    // Operators
    Plus,         // +
    Minus,        // -
    Multiply,     // *
    Divide,       // /
    Modulo,       // %
    Assign,       // =
    Equal,        // ==
    NotEqual,     // !=
    Less,         // <
    LessEqual,    // <=
    Greater,      // >
    GreaterEqual, // >=
    LogicalAnd,   // &&
    LogicalOr,    // ||
    LogicalNot,   // !
    Increment,    // ++
    Decrement,    // --

    // Punctuation
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Semicolon,
    Comma,

    EndOfFile,
}

/// A token with its source span
pub type Token = Spanned<TokenType>;

impl TokenType {
    /// Keyword lookup for a scanned identifier.
    pub fn keyword(text: &str) -> Option<TokenType> {
        let token = match text {
            "import" => TokenType::KeywordImport,
            "return" => TokenType::KeywordReturn,
            "let" => TokenType::KeywordLet,
            "init" => TokenType::KeywordInit,
            "floor" => TokenType::KeywordFloor,
            "floor_max" => TokenType::KeywordFloorMax,
            "function" => TokenType::KeywordFunction,
            "sub" => TokenType::KeywordSub,
            "if" => TokenType::KeywordIf,
            "else" => TokenType::KeywordElse,
            "while" => TokenType::KeywordWhile,
            "for" => TokenType::KeywordFor,
            "break" => TokenType::KeywordBreak,
            "continue" => TokenType::KeywordContinue,
            "true" => TokenType::BooleanLiteral(true),
            "false" => TokenType::BooleanLiteral(false),
            _ => return None,
        };
        Some(token)
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenType::IntegerLiteral(v) => write!(f, "{}", v),
            TokenType::CharLiteral(c) => write!(f, "'{}'", c),
            TokenType::BooleanLiteral(b) => write!(f, "{}", b),
            TokenType::Identifier(name) => write!(f, "{}", name),
            TokenType::KeywordImport => write!(f, "import"),
            TokenType::KeywordReturn => write!(f, "return"),
            TokenType::KeywordLet => write!(f, "let"),
            TokenType::KeywordInit => write!(f, "init"),
            TokenType::KeywordFloor => write!(f, "floor"),
            TokenType::KeywordFloorMax => write!(f, "floor_max"),
            TokenType::KeywordFunction => write!(f, "function"),
            TokenType::KeywordSub => write!(f, "sub"),
            TokenType::KeywordIf => write!(f, "if"),
            TokenType::KeywordElse => write!(f, "else"),
            TokenType::KeywordWhile => write!(f, "while"),
            TokenType::KeywordFor => write!(f, "for"),
            TokenType::KeywordBreak => write!(f, "break"),
            TokenType::KeywordContinue => write!(f, "continue"),
            TokenType::Plus => write!(f, "+"),
            TokenType::Minus => write!(f, "-"),
            TokenType::Multiply => write!(f, "*"),
            TokenType::Divide => write!(f, "/"),
            TokenType::Modulo => write!(f, "%"),
            TokenType::Assign => write!(f, "="),
            TokenType::Equal => write!(f, "=="),
            TokenType::NotEqual => write!(f, "!="),
            TokenType::Less => write!(f, "<"),
            TokenType::LessEqual => write!(f, "<="),
            TokenType::Greater => write!(f, ">"),
            TokenType::GreaterEqual => write!(f, ">="),
            TokenType::LogicalAnd => write!(f, "&&"),
            TokenType::LogicalOr => write!(f, "||"),
            TokenType::LogicalNot => write!(f, "!"),
            TokenType::Increment => write!(f, "++"),
            TokenType::Decrement => write!(f, "--"),
            TokenType::LeftParen => write!(f, "("),
            TokenType::RightParen => write!(f, ")"),
            TokenType::LeftBrace => write!(f, "{{"),
            TokenType::RightBrace => write!(f, "}}"),
            TokenType::LeftBracket => write!(f, "["),
            TokenType::RightBracket => write!(f, "]"),
            TokenType::Semicolon => write!(f, ";"),
            TokenType::Comma => write!(f, ","),
            TokenType::EndOfFile => write!(f, "<eof>"),
        }
    }
}
