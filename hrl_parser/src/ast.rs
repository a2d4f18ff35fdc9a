//! Abstract Syntax Tree definitions for the HRL language

use hrl_common::{Span, Spanned};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type alias for node IDs
pub type NodeId = u32;

/// A complete HRL compilation unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilationUnit {
    pub imports: Vec<Spanned<String>>,
    /// `init floor_max = N;` override, when present
    pub floor_max: Option<i32>,
    pub floor_inits: Vec<FloorInit>,
    /// Top-level `let` declarations (globals)
    pub globals: Vec<VariableDeclaration>,
    pub subroutines: Vec<SubroutineDef>,
    pub span: Span,
}

/// `init floor[idx] = literal;`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloorInit {
    pub index: i32,
    pub value: i32,
    pub is_char: bool,
    pub span: Span,
}

/// Whether a subroutine produces a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubroutineKind {
    /// `function` — always produces a value (0 on fallthrough)
    Function,
    /// `sub` — void
    Subproc,
}

/// A `function` or `sub` definition. Subroutines take at most one
/// parameter: the VM call carries a single argument slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubroutineDef {
    pub name: Spanned<String>,
    pub parameter: Option<Spanned<String>>,
    pub kind: SubroutineKind,
    pub body: Block,
    pub span: Span,
    pub id: NodeId,
}

/// Block of statements
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub statements: Vec<Stmt>,
    pub span: Span,
}

/// Statement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
    pub id: NodeId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StmtKind {
    /// Variable declaration
    Let(VariableDeclaration),
    /// If statement with optional else branch
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    /// While loop
    While { condition: Expr, body: Box<Stmt> },
    /// C-style for loop; init is a `let` or expression statement
    For {
        init: Option<Box<Stmt>>,
        condition: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    /// Return with optional value
    Return(Option<Expr>),
    Break,
    Continue,
    /// Nested block
    Block(Block),
    /// Expression statement
    Expr(Expr),
    /// Empty statement (bare semicolon)
    Empty,
}

/// Variable declaration with optional initializer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableDeclaration {
    pub name: Spanned<String>,
    pub initializer: Option<Expr>,
    pub span: Span,
    pub id: NodeId,
}

/// Expression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expr {
    pub kind: Box<ExprKind>,
    pub span: Span,
    pub id: NodeId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExprKind {
    /// Integer literal; char literals carry their code point with the flag set
    IntegerLiteral { value: i32, is_char: bool },
    /// Boolean literal
    BooleanLiteral(bool),
    /// Variable access
    Variable(Spanned<String>),
    /// `floor[index]`
    FloorAccess { index: Expr },
    /// `name = value`
    Assignment { name: Spanned<String>, value: Expr },
    /// `floor[index] = value`
    FloorAssignment { index: Expr, value: Expr },
    /// Unary negation or logical not
    Unary { op: UnaryOp, operand: Expr },
    /// `name++` / `++name`; the expression's value is the original value
    Increment { name: Spanned<String> },
    /// `name--` / `--name`; the expression's value is the original value
    Decrement { name: Spanned<String> },
    /// Binary operation
    Binary { op: BinaryOp, left: Expr, right: Expr },
    /// Subroutine invocation with at most one argument.
    /// `inbox` and `outbox` are intrinsics resolved during lowering.
    Invocation {
        callee: Spanned<String>,
        argument: Option<Expr>,
    },
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    // Arithmetic
    Add, Sub, Mul, Div, Mod,
    // Comparison
    Eq, Ne, Lt, Le, Gt, Ge,
    // Logical
    And, Or,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg, // -
    Not, // !
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        };
        write!(f, "{}", op)
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Neg => write!(f, "-"),
            UnaryOp::Not => write!(f, "!"),
        }
    }
}
