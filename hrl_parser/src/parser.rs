//! Parser implementation

use crate::ast::*;
use hrl_common::{HrlError, HrlResult, Position, Span, Spanned};
use hrl_lexer::{Token, TokenType};

/// Parser for the HRL language
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    next_node_id: NodeId,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            next_node_id: 0,
        }
    }

    pub fn parse_compilation_unit(&mut self) -> HrlResult<CompilationUnit> {
        let start_span = self.current_span();
        let mut imports = Vec::new();
        let mut floor_max = None;
        let mut floor_inits = Vec::new();
        let mut globals = Vec::new();
        let mut subroutines = Vec::new();

        while self.check(&TokenType::KeywordImport) {
            self.advance();
            let name = self.expect_identifier()?;
            self.expect_token(TokenType::Semicolon)?;
            imports.push(name);
        }

        loop {
            if self.check(&TokenType::KeywordInit) {
                self.parse_init_statement(&mut floor_max, &mut floor_inits)?;
            } else if self.check(&TokenType::KeywordLet) {
                let decl = self.parse_variable_declaration()?;
                self.expect_token(TokenType::Semicolon)?;
                globals.push(decl);
            } else {
                break;
            }
        }

        while !self.is_at_end() {
            subroutines.push(self.parse_subroutine()?);
        }

        Ok(CompilationUnit {
            imports,
            floor_max,
            floor_inits,
            globals,
            subroutines,
            span: start_span.combine(self.previous_span()),
        })
    }

    /// `init floor_max = N;` or `init floor[idx] = literal;`
    fn parse_init_statement(
        &mut self,
        floor_max: &mut Option<i32>,
        floor_inits: &mut Vec<FloorInit>,
    ) -> HrlResult<()> {
        let start_span = self.current_span();
        self.expect_token(TokenType::KeywordInit)?;

        if self.match_token(&TokenType::KeywordFloorMax) {
            self.expect_token(TokenType::Assign)?;
            let (value, _) = self.expect_integer()?;
            self.expect_token(TokenType::Semicolon)?;
            *floor_max = Some(value);
            return Ok(());
        }

        self.expect_token(TokenType::KeywordFloor)?;
        self.expect_token(TokenType::LeftBracket)?;
        let (index, _) = self.expect_integer()?;
        self.expect_token(TokenType::RightBracket)?;
        self.expect_token(TokenType::Assign)?;
        let (value, is_char) = self.expect_integer()?;
        self.expect_token(TokenType::Semicolon)?;

        floor_inits.push(FloorInit {
            index,
            value,
            is_char,
            span: start_span.combine(self.previous_span()),
        });
        Ok(())
    }

    fn parse_subroutine(&mut self) -> HrlResult<SubroutineDef> {
        let start_span = self.current_span();
        let kind = if self.match_token(&TokenType::KeywordFunction) {
            SubroutineKind::Function
        } else if self.match_token(&TokenType::KeywordSub) {
            SubroutineKind::Subproc
        } else {
            return Err(self.unexpected("'function' or 'sub'"));
        };

        let name = self.expect_identifier()?;
        self.expect_token(TokenType::LeftParen)?;
        let parameter = if self.check(&TokenType::RightParen) {
            None
        } else {
            Some(self.expect_identifier()?)
        };
        self.expect_token(TokenType::RightParen)?;

        let body = self.parse_block()?;

        Ok(SubroutineDef {
            name,
            parameter,
            kind,
            body,
            span: start_span.combine(self.previous_span()),
            id: self.next_node_id(),
        })
    }

    fn parse_block(&mut self) -> HrlResult<Block> {
        let start_span = self.current_span();
        self.expect_token(TokenType::LeftBrace)?;

        let mut statements = Vec::new();
        while !self.check(&TokenType::RightBrace) && !self.is_at_end() {
            statements.push(self.parse_statement()?);
        }
        self.expect_token(TokenType::RightBrace)?;

        Ok(Block {
            statements,
            span: start_span.combine(self.previous_span()),
        })
    }

    fn parse_statement(&mut self) -> HrlResult<Stmt> {
        let start_span = self.current_span();

        if self.check(&TokenType::KeywordLet) {
            let decl = self.parse_variable_declaration()?;
            self.expect_token(TokenType::Semicolon)?;
            return Ok(self.stmt(StmtKind::Let(decl), start_span));
        }

        if self.match_token(&TokenType::KeywordIf) {
            self.expect_token(TokenType::LeftParen)?;
            let condition = self.parse_expression()?;
            self.expect_token(TokenType::RightParen)?;
            let then_branch = Box::new(self.parse_statement()?);
            let else_branch = if self.match_token(&TokenType::KeywordElse) {
                Some(Box::new(self.parse_statement()?))
            } else {
                None
            };
            return Ok(self.stmt(StmtKind::If { condition, then_branch, else_branch }, start_span));
        }

        if self.match_token(&TokenType::KeywordWhile) {
            self.expect_token(TokenType::LeftParen)?;
            let condition = self.parse_expression()?;
            self.expect_token(TokenType::RightParen)?;
            let body = Box::new(self.parse_statement()?);
            return Ok(self.stmt(StmtKind::While { condition, body }, start_span));
        }

        if self.match_token(&TokenType::KeywordFor) {
            return self.parse_for_statement(start_span);
        }

        if self.match_token(&TokenType::KeywordReturn) {
            let value = if self.check(&TokenType::Semicolon) {
                None
            } else {
                Some(self.parse_expression()?)
            };
            self.expect_token(TokenType::Semicolon)?;
            return Ok(self.stmt(StmtKind::Return(value), start_span));
        }

        if self.match_token(&TokenType::KeywordBreak) {
            self.expect_token(TokenType::Semicolon)?;
            return Ok(self.stmt(StmtKind::Break, start_span));
        }

        if self.match_token(&TokenType::KeywordContinue) {
            self.expect_token(TokenType::Semicolon)?;
            return Ok(self.stmt(StmtKind::Continue, start_span));
        }

        if self.check(&TokenType::LeftBrace) {
            let block = self.parse_block()?;
            return Ok(self.stmt(StmtKind::Block(block), start_span));
        }

        if self.match_token(&TokenType::Semicolon) {
            return Ok(self.stmt(StmtKind::Empty, start_span));
        }

        let expr = self.parse_expression()?;
        self.expect_token(TokenType::Semicolon)?;
        Ok(self.stmt(StmtKind::Expr(expr), start_span))
    }

    fn parse_for_statement(&mut self, start_span: Span) -> HrlResult<Stmt> {
        self.expect_token(TokenType::LeftParen)?;

        let init = if self.match_token(&TokenType::Semicolon) {
            None
        } else if self.check(&TokenType::KeywordLet) {
            let init_span = self.current_span();
            let decl = self.parse_variable_declaration()?;
            self.expect_token(TokenType::Semicolon)?;
            Some(Box::new(self.stmt(StmtKind::Let(decl), init_span)))
        } else {
            let init_span = self.current_span();
            let expr = self.parse_expression()?;
            self.expect_token(TokenType::Semicolon)?;
            Some(Box::new(self.stmt(StmtKind::Expr(expr), init_span)))
        };

        let condition = if self.check(&TokenType::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_token(TokenType::Semicolon)?;

        let update = if self.check(&TokenType::RightParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_token(TokenType::RightParen)?;

        let body = Box::new(self.parse_statement()?);
        Ok(self.stmt(StmtKind::For { init, condition, update, body }, start_span))
    }

    fn parse_variable_declaration(&mut self) -> HrlResult<VariableDeclaration> {
        let start_span = self.current_span();
        self.expect_token(TokenType::KeywordLet)?;
        let name = self.expect_identifier()?;
        let initializer = if self.match_token(&TokenType::Assign) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        Ok(VariableDeclaration {
            name,
            initializer,
            span: start_span.combine(self.previous_span()),
            id: self.next_node_id(),
        })
    }

    // Expressions, lowest precedence first.

    fn parse_expression(&mut self) -> HrlResult<Expr> {
        self.parse_assignment()
    }

    /// Assignment is right-associative and targets either a variable or a
    /// floor cell.
    fn parse_assignment(&mut self) -> HrlResult<Expr> {
        // `IDENT = ...` needs two tokens of lookahead to distinguish from
        // a plain variable reference.
        if let TokenType::Identifier(name) = self.peek_type().clone() {
            if self.peek_next_type() == Some(&TokenType::Assign) {
                let start_span = self.current_span();
                let name = Spanned::new(name, start_span);
                self.advance(); // identifier
                self.advance(); // '='
                let value = self.parse_assignment()?;
                return Ok(self.expr(ExprKind::Assignment { name, value }, start_span));
            }
        }

        let expr = self.parse_or()?;

        // `floor[idx] = value` is recognized after the fact.
        if self.check(&TokenType::Assign) {
            if let ExprKind::FloorAccess { index } = *expr.kind {
                let start_span = expr.span;
                self.advance(); // '='
                let value = self.parse_assignment()?;
                return Ok(self.expr(ExprKind::FloorAssignment { index, value }, start_span));
            }
            return Err(self.unexpected("an assignable place before '='"));
        }

        Ok(expr)
    }

    fn parse_or(&mut self) -> HrlResult<Expr> {
        let mut left = self.parse_and()?;
        while self.match_token(&TokenType::LogicalOr) {
            let right = self.parse_and()?;
            left = self.binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> HrlResult<Expr> {
        let mut left = self.parse_equality()?;
        while self.match_token(&TokenType::LogicalAnd) {
            let right = self.parse_equality()?;
            left = self.binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> HrlResult<Expr> {
        let mut left = self.parse_relational()?;
        loop {
            let op = if self.match_token(&TokenType::Equal) {
                BinaryOp::Eq
            } else if self.match_token(&TokenType::NotEqual) {
                BinaryOp::Ne
            } else {
                break;
            };
            let right = self.parse_relational()?;
            left = self.binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> HrlResult<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = if self.match_token(&TokenType::Less) {
                BinaryOp::Lt
            } else if self.match_token(&TokenType::LessEqual) {
                BinaryOp::Le
            } else if self.match_token(&TokenType::Greater) {
                BinaryOp::Gt
            } else if self.match_token(&TokenType::GreaterEqual) {
                BinaryOp::Ge
            } else {
                break;
            };
            let right = self.parse_additive()?;
            left = self.binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> HrlResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = if self.match_token(&TokenType::Plus) {
                BinaryOp::Add
            } else if self.match_token(&TokenType::Minus) {
                BinaryOp::Sub
            } else {
                break;
            };
            let right = self.parse_multiplicative()?;
            left = self.binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> HrlResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = if self.match_token(&TokenType::Multiply) {
                BinaryOp::Mul
            } else if self.match_token(&TokenType::Divide) {
                BinaryOp::Div
            } else if self.match_token(&TokenType::Modulo) {
                BinaryOp::Mod
            } else {
                break;
            };
            let right = self.parse_unary()?;
            left = self.binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> HrlResult<Expr> {
        let start_span = self.current_span();

        if self.match_token(&TokenType::Minus) {
            let operand = self.parse_unary()?;
            return Ok(self.expr(ExprKind::Unary { op: UnaryOp::Neg, operand }, start_span));
        }
        if self.match_token(&TokenType::LogicalNot) {
            let operand = self.parse_unary()?;
            return Ok(self.expr(ExprKind::Unary { op: UnaryOp::Not, operand }, start_span));
        }
        if self.match_token(&TokenType::Increment) {
            let name = self.expect_identifier()?;
            return Ok(self.expr(ExprKind::Increment { name }, start_span));
        }
        if self.match_token(&TokenType::Decrement) {
            let name = self.expect_identifier()?;
            return Ok(self.expr(ExprKind::Decrement { name }, start_span));
        }

        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> HrlResult<Expr> {
        let expr = self.parse_primary()?;

        if self.check(&TokenType::Increment) || self.check(&TokenType::Decrement) {
            if let ExprKind::Variable(name) = &*expr.kind {
                let name = name.clone();
                let start_span = expr.span;
                let kind = if self.match_token(&TokenType::Increment) {
                    ExprKind::Increment { name }
                } else {
                    self.advance();
                    ExprKind::Decrement { name }
                };
                return Ok(self.expr(kind, start_span));
            }
            return Err(self.unexpected("a variable before '++'/'--'"));
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> HrlResult<Expr> {
        let start_span = self.current_span();

        match self.peek_type().clone() {
            TokenType::IntegerLiteral(value) => {
                self.advance();
                Ok(self.expr(ExprKind::IntegerLiteral { value, is_char: false }, start_span))
            }
            TokenType::CharLiteral(c) => {
                self.advance();
                Ok(self.expr(ExprKind::IntegerLiteral { value: c as i32, is_char: true }, start_span))
            }
            TokenType::BooleanLiteral(b) => {
                self.advance();
                Ok(self.expr(ExprKind::BooleanLiteral(b), start_span))
            }
            TokenType::KeywordFloor => {
                self.advance();
                self.expect_token(TokenType::LeftBracket)?;
                let index = self.parse_expression()?;
                self.expect_token(TokenType::RightBracket)?;
                Ok(self.expr(ExprKind::FloorAccess { index }, start_span))
            }
            TokenType::Identifier(name) => {
                let name = Spanned::new(name, start_span);
                self.advance();
                if self.match_token(&TokenType::LeftParen) {
                    let argument = if self.check(&TokenType::RightParen) {
                        None
                    } else {
                        Some(self.parse_expression()?)
                    };
                    self.expect_token(TokenType::RightParen)?;
                    Ok(self.expr(ExprKind::Invocation { callee: name, argument }, start_span))
                } else {
                    Ok(self.expr(ExprKind::Variable(name), start_span))
                }
            }
            TokenType::LeftParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect_token(TokenType::RightParen)?;
                Ok(expr)
            }
            _ => Err(self.unexpected("an expression")),
        }
    }

    // Token plumbing.

    fn next_node_id(&mut self) -> NodeId {
        let id = self.next_node_id;
        self.next_node_id += 1;
        id
    }

    fn stmt(&mut self, kind: StmtKind, start_span: Span) -> Stmt {
        Stmt {
            kind,
            span: start_span.combine(self.previous_span()),
            id: self.next_node_id(),
        }
    }

    fn expr(&mut self, kind: ExprKind, start_span: Span) -> Expr {
        Expr {
            kind: Box::new(kind),
            span: start_span.combine(self.previous_span()),
            id: self.next_node_id(),
        }
    }

    fn binary(&mut self, op: BinaryOp, left: Expr, right: Expr) -> Expr {
        let span = left.span.combine(right.span);
        Expr {
            kind: Box::new(ExprKind::Binary { op, left, right }),
            span,
            id: self.next_node_id(),
        }
    }

    fn peek_type(&self) -> &TokenType {
        self.tokens
            .get(self.current)
            .map(|t| &t.value)
            .unwrap_or(&TokenType::EndOfFile)
    }

    fn peek_next_type(&self) -> Option<&TokenType> {
        self.tokens.get(self.current + 1).map(|t| &t.value)
    }

    fn current_span(&self) -> Span {
        self.tokens
            .get(self.current)
            .map(|t| t.span)
            .unwrap_or_else(|| Span::single(Position::start()))
    }

    fn previous_span(&self) -> Span {
        if self.current == 0 {
            return Span::single(Position::start());
        }
        self.tokens
            .get(self.current - 1)
            .map(|t| t.span)
            .unwrap_or_else(|| Span::single(Position::start()))
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek_type(), TokenType::EndOfFile)
    }

    fn advance(&mut self) {
        if !self.is_at_end() {
            self.current += 1;
        }
    }

    fn check(&self, token_type: &TokenType) -> bool {
        self.peek_type() == token_type
    }

    fn match_token(&mut self, token_type: &TokenType) -> bool {
        if self.check(token_type) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_token(&mut self, token_type: TokenType) -> HrlResult<()> {
        if self.match_token(&token_type) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", token_type)))
        }
    }

    fn expect_identifier(&mut self) -> HrlResult<Spanned<String>> {
        let span = self.current_span();
        if let TokenType::Identifier(name) = self.peek_type().clone() {
            self.advance();
            Ok(Spanned::new(name, span))
        } else {
            Err(self.unexpected("an identifier"))
        }
    }

    /// Integer or char literal; chars carry their code point.
    fn expect_integer(&mut self) -> HrlResult<(i32, bool)> {
        let negative = self.match_token(&TokenType::Minus);
        match self.peek_type().clone() {
            TokenType::IntegerLiteral(value) => {
                self.advance();
                Ok((if negative { -value } else { value }, false))
            }
            TokenType::CharLiteral(c) if !negative => {
                self.advance();
                Ok((c as i32, true))
            }
            _ => Err(self.unexpected("an integer literal")),
        }
    }

    fn unexpected(&self, expected: &str) -> HrlError {
        HrlError::parse_error(format!(
            "expected {} but found '{}' at {}",
            expected,
            self.peek_type(),
            self.current_span()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hrl_lexer::Lexer;

    fn parse(source: &str) -> CompilationUnit {
        let tokens = Lexer::new(source).tokenize().unwrap();
        Parser::new(tokens).parse_compilation_unit().unwrap()
    }

    #[test]
    fn parses_minimal_program() {
        let unit = parse("function start() { outbox(inbox()); }");
        assert_eq!(unit.subroutines.len(), 1);
        let sub = &unit.subroutines[0];
        assert_eq!(sub.name.value, "start");
        assert_eq!(sub.kind, SubroutineKind::Function);
        assert!(sub.parameter.is_none());
        assert_eq!(sub.body.statements.len(), 1);
    }

    #[test]
    fn parses_floor_inits_and_globals() {
        let unit = parse("init floor_max = 16; init floor[0] = 5; init floor[1] = 'A'; let g = 3; sub start() {}");
        assert_eq!(unit.floor_max, Some(16));
        assert_eq!(unit.floor_inits.len(), 2);
        assert_eq!(unit.floor_inits[0].index, 0);
        assert_eq!(unit.floor_inits[0].value, 5);
        assert!(!unit.floor_inits[0].is_char);
        assert!(unit.floor_inits[1].is_char);
        assert_eq!(unit.globals.len(), 1);
        assert_eq!(unit.subroutines[0].kind, SubroutineKind::Subproc);
    }

    #[test]
    fn parses_control_flow() {
        let unit = parse(
            "function start() {
                let n = inbox();
                while (n != 0) {
                    outbox(n);
                    n = n - 1;
                }
                for (let i = 0; i < 3; i++) { if (i > 1) break; else continue; }
            }",
        );
        let body = &unit.subroutines[0].body;
        assert!(matches!(body.statements[1].kind, StmtKind::While { .. }));
        assert!(matches!(body.statements[2].kind, StmtKind::For { .. }));
    }

    #[test]
    fn respects_precedence() {
        let unit = parse("function start() { let x = 1 + 2 * 3 == 7 && true; }");
        let StmtKind::Let(decl) = &unit.subroutines[0].body.statements[0].kind else {
            panic!("expected let");
        };
        let ExprKind::Binary { op: BinaryOp::And, left, .. } = &*decl.initializer.as_ref().unwrap().kind else {
            panic!("expected && at the top");
        };
        assert!(matches!(&*left.kind, ExprKind::Binary { op: BinaryOp::Eq, .. }));
    }

    #[test]
    fn parses_floor_assignment_and_access() {
        let unit = parse("function start() { floor[2] = inbox(); outbox(floor[2]); }");
        let body = &unit.subroutines[0].body;
        let StmtKind::Expr(expr) = &body.statements[0].kind else { panic!() };
        assert!(matches!(&*expr.kind, ExprKind::FloorAssignment { .. }));
    }

    #[test]
    fn rejects_malformed_input() {
        let tokens = Lexer::new("function start() { let = 1; }").tokenize().unwrap();
        assert!(Parser::new(tokens).parse_compilation_unit().is_err());

        let tokens = Lexer::new("function start() { 1 = 2; }").tokenize().unwrap();
        assert!(Parser::new(tokens).parse_compilation_unit().is_err());
    }
}
