//! Lexer implementation for the HRL language

use crate::{Token, TokenType};
use hrl_common::{HrlError, HrlResult, Position, Span, Spanned};

/// Lexer over HRL source text
pub struct Lexer<'a> {
    input: &'a [u8],
    position: usize,
    current_pos: Position,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            position: 0,
            current_pos: Position::start(),
        }
    }

    /// Tokenize the entire input into a vector of tokens, ending with EOF.
    pub fn tokenize(mut self) -> HrlResult<Vec<Token>> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token()?;
            let is_eof = token.value == TokenType::EndOfFile;
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        Ok(tokens)
    }

    fn next_token(&mut self) -> HrlResult<Token> {
        self.skip_whitespace_and_comments();

        let start_pos = self.current_pos;
        if self.is_at_end() {
            return Ok(Spanned::new(TokenType::EndOfFile, Span::single(start_pos)));
        }

        let token_type = match self.current_char() {
            '(' => { self.advance(); TokenType::LeftParen }
            ')' => { self.advance(); TokenType::RightParen }
            '{' => { self.advance(); TokenType::LeftBrace }
            '}' => { self.advance(); TokenType::RightBrace }
            '[' => { self.advance(); TokenType::LeftBracket }
            ']' => { self.advance(); TokenType::RightBracket }
            ';' => { self.advance(); TokenType::Semicolon }
            ',' => { self.advance(); TokenType::Comma }
            '*' => { self.advance(); TokenType::Multiply }
            '/' => { self.advance(); TokenType::Divide }
            '%' => { self.advance(); TokenType::Modulo }

            '+' => {
                self.advance();
                if self.matches('+') { TokenType::Increment } else { TokenType::Plus }
            }
            '-' => {
                self.advance();
                if self.matches('-') { TokenType::Decrement } else { TokenType::Minus }
            }
            '=' => {
                self.advance();
                if self.matches('=') { TokenType::Equal } else { TokenType::Assign }
            }
            '!' => {
                self.advance();
                if self.matches('=') { TokenType::NotEqual } else { TokenType::LogicalNot }
            }
            '<' => {
                self.advance();
                if self.matches('=') { TokenType::LessEqual } else { TokenType::Less }
            }
            '>' => {
                self.advance();
                if self.matches('=') { TokenType::GreaterEqual } else { TokenType::Greater }
            }
            '&' => {
                self.advance();
                if self.matches('&') {
                    TokenType::LogicalAnd
                } else {
                    return Err(HrlError::lex_error(format!(
                        "unexpected character '&' at {}",
                        start_pos
                    )));
                }
            }
            '|' => {
                self.advance();
                if self.matches('|') {
                    TokenType::LogicalOr
                } else {
                    return Err(HrlError::lex_error(format!(
                        "unexpected character '|' at {}",
                        start_pos
                    )));
                }
            }

            '\'' => self.scan_char_literal(start_pos)?,
            c if c.is_ascii_digit() => self.scan_number(start_pos)?,
            c if c.is_ascii_alphabetic() || c == '_' => self.scan_identifier_or_keyword(),

            c => {
                return Err(HrlError::lex_error(format!(
                    "unexpected character '{}' at {}",
                    c, start_pos
                )));
            }
        };

        Ok(Spanned::new(token_type, Span::new(start_pos, self.current_pos)))
    }

    fn scan_number(&mut self, start_pos: Position) -> HrlResult<TokenType> {
        let start = self.position;
        while !self.is_at_end() && self.current_char().is_ascii_digit() {
            self.advance();
        }
        let text = std::str::from_utf8(&self.input[start..self.position]).unwrap();
        let value: i32 = text.parse().map_err(|_| {
            HrlError::lex_error(format!("integer literal '{}' out of range at {}", text, start_pos))
        })?;
        Ok(TokenType::IntegerLiteral(value))
    }

    fn scan_char_literal(&mut self, start_pos: Position) -> HrlResult<TokenType> {
        self.advance(); // opening quote
        if self.is_at_end() {
            return Err(HrlError::lex_error(format!("unterminated character literal at {}", start_pos)));
        }
        let c = self.current_char();
        self.advance();
        if self.is_at_end() || self.current_char() != '\'' {
            return Err(HrlError::lex_error(format!("unterminated character literal at {}", start_pos)));
        }
        self.advance(); // closing quote
        Ok(TokenType::CharLiteral(c))
    }

    fn scan_identifier_or_keyword(&mut self) -> TokenType {
        let start = self.position;
        while !self.is_at_end() {
            let c = self.current_char();
            if c.is_ascii_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
        let text = std::str::from_utf8(&self.input[start..self.position]).unwrap();
        TokenType::keyword(text).unwrap_or_else(|| TokenType::Identifier(text.to_string()))
    }

    fn skip_whitespace_and_comments(&mut self) {
        while !self.is_at_end() {
            let c = self.current_char();
            if c.is_ascii_whitespace() {
                self.advance();
            } else if c == '/' && self.peek_next() == Some('/') {
                while !self.is_at_end() && self.current_char() != '\n' {
                    self.advance();
                }
            } else {
                break;
            }
        }
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    fn current_char(&self) -> char {
        self.input[self.position] as char
    }

    fn peek_next(&self) -> Option<char> {
        self.input.get(self.position + 1).map(|&b| b as char)
    }

    fn matches(&mut self, expected: char) -> bool {
        if !self.is_at_end() && self.current_char() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    fn advance(&mut self) {
        if self.current_char() == '\n' {
            self.current_pos.line += 1;
            self.current_pos.column = 1;
        } else {
            self.current_pos.column += 1;
        }
        self.position += 1;
        self.current_pos.offset = self.position as u32;
    }
}
