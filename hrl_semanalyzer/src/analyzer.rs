//! Semantic analysis implementation

use crate::{Symbol, SymbolId, SymbolKind, SymbolTable};
use hrl_common::{Diagnostics, HrlError, HrlResult, Location, Span, START_SUBROUTINE};
use hrl_parser::{
    Block, CompilationUnit, Expr, ExprKind, NodeId, Stmt, StmtKind, SubroutineKind,
    VariableDeclaration,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Names lowered to INPUT/OUTPUT instead of CALL
pub const INTRINSIC_INBOX: &str = "inbox";
pub const INTRINSIC_OUTBOX: &str = "outbox";

// Diagnostic codes for this phase.
const E_DUPLICATE: u32 = 2001;
const E_UNDECLARED: u32 = 2002;
const E_LOOSE_JUMP: u32 = 2003;
const E_BAD_ARITY: u32 = 2004;
const E_UNKNOWN_CALLEE: u32 = 2005;
const E_NO_START: u32 = 2006;
const E_NOT_A_VARIABLE: u32 = 2007;

/// Symbol annotations for a checked compilation unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticInfo {
    pub symbols: SymbolTable,
    /// AST node id → resolved symbol, for every declaration and use site
    pub resolutions: HashMap<NodeId, SymbolId>,
    /// Subroutine node id → its parameter's symbol
    pub param_symbols: HashMap<NodeId, SymbolId>,
}

impl SemanticInfo {
    pub fn symbol_of(&self, node: NodeId) -> Option<&Symbol> {
        self.resolutions.get(&node).map(|&id| self.symbols.get(id))
    }
}

/// Semantic analyzer for one compilation unit
pub struct SemanticAnalyzer {
    file: String,
    symbols: SymbolTable,
    scopes: Vec<HashMap<String, SymbolId>>,
    resolutions: HashMap<NodeId, SymbolId>,
    param_symbols: HashMap<NodeId, SymbolId>,
    diagnostics: Diagnostics,
    loop_depth: usize,
}

impl SemanticAnalyzer {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            symbols: SymbolTable::new(),
            scopes: Vec::new(),
            resolutions: HashMap::new(),
            param_symbols: HashMap::new(),
            diagnostics: Diagnostics::new(),
            loop_depth: 0,
        }
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Two passes: collect subroutine signatures and globals, then resolve
    /// every body. Returns the annotations on success.
    pub fn analyze(mut self, unit: &CompilationUnit) -> HrlResult<(SemanticInfo, Diagnostics)> {
        self.scopes.push(HashMap::new());

        // Pass 1: subroutine signatures, so calls can be checked in any order.
        for sub in &unit.subroutines {
            if self.symbols.lookup_subroutine(&sub.name.value).is_some() {
                self.error(
                    E_DUPLICATE,
                    format!("subroutine '{}' is defined more than once", sub.name.value),
                    sub.name.span,
                );
                continue;
            }
            let kind = SymbolKind::Subroutine {
                has_param: sub.parameter.is_some(),
                has_return: sub.kind == SubroutineKind::Function,
            };
            let id = self.symbols.declare(sub.name.value.clone(), kind, sub.name.span);
            self.resolutions.insert(sub.id, id);
        }

        if self.symbols.lookup_subroutine(START_SUBROUTINE).is_none() {
            self.error(
                E_NO_START,
                format!("no '{}' subroutine defined", START_SUBROUTINE),
                unit.span,
            );
        }

        // Globals live in the outermost scope and are visible everywhere.
        for decl in &unit.globals {
            self.declare_variable(decl, SymbolKind::Global);
            if let Some(init) = &decl.initializer {
                self.resolve_expr(init);
            }
        }

        // Pass 2: subroutine bodies.
        for sub in &unit.subroutines {
            self.scopes.push(HashMap::new());
            if let Some(param) = &sub.parameter {
                let id = self.symbols.declare(param.value.clone(), SymbolKind::Parameter, param.span);
                self.scopes.last_mut().unwrap().insert(param.value.clone(), id);
                self.param_symbols.insert(sub.id, id);
            }
            self.resolve_block(&sub.body);
            self.scopes.pop();
        }

        self.scopes.pop();

        if self.diagnostics.has_errors() {
            let first = self
                .diagnostics
                .messages()
                .iter()
                .find(|d| d.severity == hrl_common::Severity::Error)
                .map(|d| d.message.clone())
                .unwrap_or_default();
            return Err(HrlError::semantic_error(first));
        }

        Ok((
            SemanticInfo {
                symbols: self.symbols,
                resolutions: self.resolutions,
                param_symbols: self.param_symbols,
            },
            self.diagnostics,
        ))
    }

    fn declare_variable(&mut self, decl: &VariableDeclaration, kind: SymbolKind) {
        let scope = self.scopes.last().unwrap();
        if scope.contains_key(&decl.name.value) {
            self.error(
                E_DUPLICATE,
                format!("'{}' is already declared in this scope", decl.name.value),
                decl.name.span,
            );
            return;
        }
        let id = self.symbols.declare(decl.name.value.clone(), kind, decl.name.span);
        self.scopes.last_mut().unwrap().insert(decl.name.value.clone(), id);
        self.resolutions.insert(decl.id, id);
    }

    fn resolve_block(&mut self, block: &Block) {
        self.scopes.push(HashMap::new());
        for stmt in &block.statements {
            self.resolve_stmt(stmt);
        }
        self.scopes.pop();
    }

    fn resolve_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Let(decl) => {
                // Initializer first: `let x = x;` must not see the new x.
                if let Some(init) = &decl.initializer {
                    self.resolve_expr(init);
                }
                self.declare_variable(decl, SymbolKind::Local);
            }
            StmtKind::If { condition, then_branch, else_branch } => {
                self.resolve_expr(condition);
                self.resolve_stmt(then_branch);
                if let Some(else_branch) = else_branch {
                    self.resolve_stmt(else_branch);
                }
            }
            StmtKind::While { condition, body } => {
                self.resolve_expr(condition);
                self.loop_depth += 1;
                self.resolve_stmt(body);
                self.loop_depth -= 1;
            }
            StmtKind::For { init, condition, update, body } => {
                // The init declaration scopes over condition, update and body.
                self.scopes.push(HashMap::new());
                if let Some(init) = init {
                    self.resolve_stmt(init);
                }
                if let Some(condition) = condition {
                    self.resolve_expr(condition);
                }
                if let Some(update) = update {
                    self.resolve_expr(update);
                }
                self.loop_depth += 1;
                self.resolve_stmt(body);
                self.loop_depth -= 1;
                self.scopes.pop();
            }
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.resolve_expr(value);
                }
            }
            StmtKind::Break | StmtKind::Continue => {
                if self.loop_depth == 0 {
                    let what = if matches!(stmt.kind, StmtKind::Break) { "break" } else { "continue" };
                    self.error(
                        E_LOOSE_JUMP,
                        format!("'{}' outside of a loop", what),
                        stmt.span,
                    );
                }
            }
            StmtKind::Block(block) => self.resolve_block(block),
            StmtKind::Expr(expr) => self.resolve_expr(expr),
            StmtKind::Empty => {}
        }
    }

    fn resolve_expr(&mut self, expr: &Expr) {
        match &*expr.kind {
            ExprKind::IntegerLiteral { .. } | ExprKind::BooleanLiteral(_) => {}
            ExprKind::Variable(name) => {
                self.resolve_variable_use(expr.id, &name.value, name.span);
            }
            ExprKind::FloorAccess { index } => self.resolve_expr(index),
            ExprKind::Assignment { name, value } => {
                self.resolve_expr(value);
                self.resolve_variable_use(expr.id, &name.value, name.span);
            }
            ExprKind::FloorAssignment { index, value } => {
                self.resolve_expr(index);
                self.resolve_expr(value);
            }
            ExprKind::Unary { operand, .. } => self.resolve_expr(operand),
            ExprKind::Increment { name } | ExprKind::Decrement { name } => {
                self.resolve_variable_use(expr.id, &name.value, name.span);
            }
            ExprKind::Binary { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }
            ExprKind::Invocation { callee, argument } => {
                if let Some(argument) = argument {
                    self.resolve_expr(argument);
                }
                self.check_invocation(expr.id, callee.value.as_str(), argument.is_some(), callee.span);
            }
        }
    }

    fn resolve_variable_use(&mut self, node: NodeId, name: &str, span: Span) {
        for scope in self.scopes.iter().rev() {
            if let Some(&id) = scope.get(name) {
                self.resolutions.insert(node, id);
                return;
            }
        }
        if self.symbols.lookup_subroutine(name).is_some() {
            self.error(
                E_NOT_A_VARIABLE,
                format!("'{}' is a subroutine, not a variable", name),
                span,
            );
        } else {
            self.error(E_UNDECLARED, format!("'{}' is not declared", name), span);
        }
    }

    fn check_invocation(&mut self, node: NodeId, callee: &str, has_argument: bool, span: Span) {
        match callee {
            INTRINSIC_INBOX => {
                if has_argument {
                    self.error(E_BAD_ARITY, "'inbox' takes no argument", span);
                }
            }
            INTRINSIC_OUTBOX => {
                if !has_argument {
                    self.error(E_BAD_ARITY, "'outbox' requires an argument", span);
                }
            }
            _ => match self.symbols.lookup_subroutine(callee) {
                Some(symbol) => {
                    let SymbolKind::Subroutine { has_param, .. } = symbol.kind else {
                        unreachable!("subroutine lookup returned a non-subroutine");
                    };
                    let id = symbol.id;
                    if has_param != has_argument {
                        let message = if has_param {
                            format!("'{}' requires an argument", callee)
                        } else {
                            format!("'{}' takes no argument", callee)
                        };
                        self.error(E_BAD_ARITY, message, span);
                    }
                    self.resolutions.insert(node, id);
                }
                None => {
                    self.error(
                        E_UNKNOWN_CALLEE,
                        format!("call to undefined subroutine '{}'", callee),
                        span,
                    );
                }
            },
        }
    }

    fn error(&mut self, code: u32, message: impl Into<String>, span: Span) {
        let location = Location::from_span(self.file.clone(), span);
        self.diagnostics.error(code, message, location);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hrl_lexer::Lexer;
    use hrl_parser::Parser;

    fn analyze(source: &str) -> HrlResult<(SemanticInfo, Diagnostics)> {
        let tokens = Lexer::new(source).tokenize().unwrap();
        let unit = Parser::new(tokens).parse_compilation_unit().unwrap();
        SemanticAnalyzer::new("test.hrl").analyze(&unit)
    }

    #[test]
    fn resolves_locals_and_globals() {
        let (info, _) = analyze("let g = 1; function start() { let a = g; outbox(a); }").unwrap();
        let globals: Vec<_> = (0..info.symbols.len() as SymbolId)
            .map(|id| info.symbols.get(id))
            .filter(|s| s.is_global())
            .collect();
        assert_eq!(globals.len(), 1);
        assert_eq!(globals[0].name, "g");
    }

    #[test]
    fn shadowing_in_nested_blocks() {
        let (info, _) = analyze("function start() { let a = 1; { let a = 2; outbox(a); } }").unwrap();
        // Two distinct symbols named "a".
        let count = (0..info.symbols.len() as SymbolId)
            .map(|id| info.symbols.get(id))
            .filter(|s| s.name == "a")
            .count();
        assert_eq!(count, 2);
    }

    #[test]
    fn rejects_undeclared_and_duplicates() {
        assert!(analyze("function start() { outbox(a); }").is_err());
        assert!(analyze("function start() { let a = 1; let a = 2; }").is_err());
        assert!(analyze("function start() {} function start() {}").is_err());
    }

    #[test]
    fn rejects_loose_break() {
        assert!(analyze("function start() { break; }").is_err());
        assert!(analyze("function start() { while (1) { break; } }").is_ok());
    }

    #[test]
    fn checks_invocation_arity() {
        assert!(analyze("function f(x) { return x; } function start() { outbox(f()); }").is_err());
        assert!(analyze("function f() { return 1; } function start() { outbox(f(2)); }").is_err());
        assert!(analyze("function start() { outbox(inbox(1)); }").is_err());
        assert!(analyze("function f(x) { return x; } function start() { outbox(f(1)); }").is_ok());
    }

    #[test]
    fn requires_start() {
        assert!(analyze("function main() { return 0; }").is_err());
    }
}
