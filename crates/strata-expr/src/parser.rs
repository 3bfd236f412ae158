//! Strata Parser - Expression Text Parser
//!
//! Parses function-call notation such as
//! `AVG(SUB(ADD(DIV("a", "b"), 1), 0.5))` into an expression tree.
//! Quoted strings become field references, bare numbers become constants
//! and identifiers name combinators (case-insensitive).
//!
//! Key Features:
//! - Byte-offset positions and offending token on every error
//! - `SHIFT(expr, "-1h")` with Go-style duration literals
//! - Explicit `CONST(n)` and `FIELD("name")` forms
//! - Bounded nesting depth
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::expr::{AggregateOp, BinaryOp, Expr, UnaryOp};
use std::str::FromStr;
use strata_common::utils::parse_duration;
use strata_common::{Result, StrataError};

const MAX_NESTED_CALLS: usize = 128;

// =============================================================================
// Tokens
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Ident(String),
    Str(String),
    Number(f64),
    LParen,
    RParen,
    Comma,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    position: usize,
    text: String,
}

// =============================================================================
// Lexer
// =============================================================================

struct Lexer<'a> {
    src: &'a str,
    idx: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, idx: 0 }
    }

    fn peek_char(&self) -> Option<char> {
        self.src[self.idx..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.src[self.idx..].chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek_char()?;
        self.idx += ch.len_utf8();
        Some(ch)
    }

    fn take_while<F: FnMut(char) -> bool>(&mut self, mut pred: F) {
        while let Some(ch) = self.peek_char() {
            if !pred(ch) {
                break;
            }
            self.bump();
        }
    }

    fn token(&self, kind: TokenKind, start: usize) -> Token {
        Token {
            kind,
            position: start,
            text: self.src[start..self.idx].to_string(),
        }
    }

    fn lex(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            self.take_while(char::is_whitespace);
            let start = self.idx;
            let Some(ch) = self.peek_char() else {
                tokens.push(self.token(TokenKind::Eof, start));
                return Ok(tokens);
            };

            let kind = match ch {
                '(' => {
                    self.bump();
                    TokenKind::LParen
                }
                ')' => {
                    self.bump();
                    TokenKind::RParen
                }
                ',' => {
                    self.bump();
                    TokenKind::Comma
                }
                '"' | '\'' => TokenKind::Str(self.lex_string(ch)?),
                c if c.is_ascii_digit() || c == '.' => TokenKind::Number(self.lex_number()?),
                '-' | '+'
                    if matches!(self.peek_second(), Some(c) if c.is_ascii_digit() || c == '.') =>
                {
                    TokenKind::Number(self.lex_number()?)
                }
                c if c.is_alphabetic() || c == '_' => {
                    self.take_while(|c| c.is_alphanumeric() || c == '_');
                    TokenKind::Ident(self.src[start..self.idx].to_string())
                }
                other => {
                    return Err(StrataError::parse(
                        start,
                        other.to_string(),
                        "unexpected character",
                    ))
                }
            };
            tokens.push(self.token(kind, start));
        }
    }

    fn lex_number(&mut self) -> Result<f64> {
        let start = self.idx;
        if matches!(self.peek_char(), Some('-' | '+')) {
            self.bump();
        }
        self.take_while(|c| c.is_ascii_digit() || c == '.');
        if matches!(self.peek_char(), Some('e' | 'E')) {
            self.bump();
            if matches!(self.peek_char(), Some('-' | '+')) {
                self.bump();
            }
            self.take_while(|c| c.is_ascii_digit());
        }
        let raw = &self.src[start..self.idx];
        raw.parse::<f64>()
            .map_err(|_| StrataError::parse(start, raw, "invalid number"))
    }

    fn lex_string(&mut self, quote: char) -> Result<String> {
        let start = self.idx;
        self.bump();
        let mut out = String::new();
        loop {
            let Some(ch) = self.bump() else {
                return Err(StrataError::parse(
                    start,
                    &self.src[start..],
                    "unterminated string literal",
                ));
            };
            match ch {
                c if c == quote => return Ok(out),
                '\\' => {
                    let escape_at = self.idx - 1;
                    match self.bump() {
                        Some('n') => out.push('\n'),
                        Some('t') => out.push('\t'),
                        Some('r') => out.push('\r'),
                        Some('0') => out.push('\0'),
                        Some('\\') => out.push('\\'),
                        Some('"') => out.push('"'),
                        Some('\'') => out.push('\''),
                        Some('u') => out.push(self.lex_unicode_escape(escape_at)?),
                        _ => {
                            return Err(StrataError::parse(
                                escape_at,
                                &self.src[escape_at..self.idx],
                                "invalid escape sequence",
                            ))
                        }
                    }
                }
                c => out.push(c),
            }
        }
    }

    // `\u{...}` as produced by Rust's debug formatting.
    fn lex_unicode_escape(&mut self, escape_at: usize) -> Result<char> {
        let invalid = |lexer: &Self| {
            StrataError::parse(
                escape_at,
                &lexer.src[escape_at..lexer.idx],
                "invalid unicode escape",
            )
        };
        if self.bump() != Some('{') {
            return Err(invalid(&*self));
        }
        let digits_start = self.idx;
        self.take_while(|c| c.is_ascii_hexdigit());
        let digits = &self.src[digits_start..self.idx];
        if self.bump() != Some('}') {
            return Err(invalid(&*self));
        }
        u32::from_str_radix(digits, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| invalid(&*self))
    }
}

// =============================================================================
// Parser
// =============================================================================

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> &Token {
        // The lexer always terminates the stream with Eof.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn next(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn error(token: &Token, message: impl Into<String>) -> StrataError {
        let text = if token.kind == TokenKind::Eof {
            "<end of input>".to_string()
        } else {
            token.text.clone()
        };
        StrataError::parse(token.position, text, message)
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<()> {
        let token = self.next();
        if token.kind == kind {
            Ok(())
        } else {
            Err(Self::error(&token, format!("expected {}", what)))
        }
    }

    fn parse_root(&mut self) -> Result<Expr> {
        let expr = self.parse_expr()?;
        let trailing = self.peek();
        if trailing.kind != TokenKind::Eof {
            return Err(Self::error(trailing, "unexpected trailing input"));
        }
        Ok(expr)
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        let token = self.next();
        match &token.kind {
            TokenKind::Number(value) => Ok(Expr::Constant(*value)),
            TokenKind::Str(name) => Ok(Expr::Field(name.clone())),
            TokenKind::Ident(name) => {
                self.depth += 1;
                if self.depth > MAX_NESTED_CALLS {
                    return Err(Self::error(&token, "expression nested too deeply"));
                }
                let expr = self.parse_call(&token, name);
                self.depth -= 1;
                expr
            }
            _ => Err(Self::error(&token, "expected expression")),
        }
    }

    fn parse_call(&mut self, ident: &Token, name: &str) -> Result<Expr> {
        self.expect(TokenKind::LParen, "'('")?;
        let upper = name.to_ascii_uppercase();

        let expr = if let Some(op) = aggregate_op(&upper) {
            Expr::aggregate(op, self.parse_expr()?)
        } else if let Some(op) = binary_op(&upper) {
            let left = self.parse_expr()?;
            self.expect(TokenKind::Comma, "','")?;
            Expr::binary(op, left, self.parse_expr()?)
        } else if let Some(op) = unary_op(&upper) {
            Expr::unary(op, self.parse_expr()?)
        } else {
            match upper.as_str() {
                "SHIFT" => {
                    let wrapped = self.parse_expr()?;
                    self.expect(TokenKind::Comma, "','")?;
                    let token = self.next();
                    let offset = match &token.kind {
                        TokenKind::Str(s) => parse_duration(s),
                        _ => None,
                    }
                    .ok_or_else(|| Self::error(&token, "expected duration literal such as \"-1h\""))?;
                    Expr::shifted(wrapped, offset)
                }
                "IF" => {
                    let condition = self.parse_expr()?;
                    self.expect(TokenKind::Comma, "','")?;
                    Expr::if_then(condition, self.parse_expr()?)
                }
                "CONST" => {
                    let token = self.next();
                    match token.kind {
                        TokenKind::Number(value) => Expr::Constant(value),
                        _ => return Err(Self::error(&token, "expected number")),
                    }
                }
                "FIELD" => {
                    let token = self.next();
                    match token.kind {
                        TokenKind::Str(name) => Expr::Field(name),
                        _ => return Err(Self::error(&token, "expected quoted field name")),
                    }
                }
                _ => return Err(Self::error(ident, format!("unknown function '{}'", name))),
            }
        };

        self.expect(TokenKind::RParen, "')'")?;
        Ok(expr)
    }
}

fn aggregate_op(name: &str) -> Option<AggregateOp> {
    Some(match name {
        "SUM" => AggregateOp::Sum,
        "COUNT" => AggregateOp::Count,
        "AVG" => AggregateOp::Avg,
        "MIN" => AggregateOp::Min,
        "MAX" => AggregateOp::Max,
        _ => return None,
    })
}

fn binary_op(name: &str) -> Option<BinaryOp> {
    Some(match name {
        "ADD" => BinaryOp::Add,
        "SUB" => BinaryOp::Sub,
        "MUL" => BinaryOp::Mul,
        "DIV" => BinaryOp::Div,
        "LT" => BinaryOp::Lt,
        "LTE" => BinaryOp::Lte,
        "EQ" => BinaryOp::Eq,
        "NEQ" => BinaryOp::Neq,
        "GTE" => BinaryOp::Gte,
        "GT" => BinaryOp::Gt,
        "AND" => BinaryOp::And,
        "OR" => BinaryOp::Or,
        _ => return None,
    })
}

fn unary_op(name: &str) -> Option<UnaryOp> {
    Some(match name {
        "LN" => UnaryOp::Ln,
        "LOG2" => UnaryOp::Log2,
        "LOG10" => UnaryOp::Log10,
        _ => return None,
    })
}

// =============================================================================
// Entry Points
// =============================================================================

/// Parse expression text into a tree.
pub fn parse(input: &str) -> Result<Expr> {
    let tokens = Lexer::new(input).lex()?;
    let expr = Parser::new(tokens).parse_root()?;
    tracing::trace!(input, parsed = %expr, "parsed expression");
    Ok(expr)
}

impl FromStr for Expr {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self> {
        parse(s)
    }
}

// =============================================================================
// Tests
// =============================================================================
