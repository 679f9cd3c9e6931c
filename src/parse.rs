// Copyright (c) 2019 Georg Brandl.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! Recursive-descent parser producing [`Stmt`]s one at a time.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! expr   := term (('+' | '-') term)*
//! term   := factor (('*' | '/') factor)*
//! factor := NUMBER | '[' expr ']' | VAR | '-' factor | '+' factor
//! value  := ('-' | '+')? (NUMBER | '[' expr ']')
//! ```
//!
//! Command arguments take a `value`, so composite expressions must be
//! bracketed there.

use std::io::Read;
use tracing::warn;

use crate::ast::*;
use crate::error::{Diagnostics, LoadError, SyntaxError};
use crate::lexer::{Lexer, Token, TokenKind};

type ParseResult<T> = Result<T, SyntaxError>;

pub struct Parser<R> {
    lexer: Lexer<R>,
    current: Token,
    // opcode reused by argument-only continuation lines
    last_opcode: Opcode,
}

impl<R: Read> Parser<R> {
    pub fn new(lexer: Lexer<R>) -> Self {
        let current = Token { kind: TokenKind::Eof, literal: None,
                              lexeme: String::new(), line: lexer.line() };
        Parser { lexer, current, last_opcode: Opcode::Nop }
    }

    /// Primes the lookahead with the first meaningful token.
    pub fn init(&mut self) {
        self.advance();
        self.skip_eol();
    }

    pub fn is_at_end(&self) -> bool {
        self.current.kind == TokenKind::Eof
    }

    /// Parses one logical statement.  `Ok(None)` is returned for constructs
    /// that produce no statement (subroutine declarations).
    pub fn next_statement(&mut self) -> ParseResult<Option<Stmt>> {
        let stmt = self.parse_statement()?;
        self.skip_eol();
        Ok(stmt)
    }

    /// Parses the whole input.
    pub fn parse_all(&mut self) -> ParseResult<Vec<Stmt>> {
        self.init();
        let mut stmts = Vec::new();
        while !self.is_at_end() {
            if let Some(stmt) = self.next_statement()? {
                stmts.push(stmt);
            }
        }
        Ok(stmts)
    }

    pub fn lexer(&self) -> &Lexer<R> {
        &self.lexer
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        self.lexer.diagnostics()
    }

    pub fn into_diagnostics(self) -> Diagnostics {
        self.lexer.into_diagnostics()
    }

    // -- private API --

    fn advance(&mut self) {
        loop {
            self.current = self.lexer.next_token();
            // line numbers carry no meaning for us
            if self.current.kind != TokenKind::LineNumber {
                break;
            }
        }
    }

    fn skip_eol(&mut self) {
        while self.current.kind == TokenKind::Eol {
            self.advance();
        }
    }

    fn found(&self) -> String {
        match self.current.kind {
            TokenKind::Eol => "end of line".into(),
            TokenKind::Eof => "end of file".into(),
            _ => self.current.lexeme.clone(),
        }
    }

    /// Records a diagnostic (unless the lexer already did) and fails.
    fn fail<T>(&mut self, message: String) -> ParseResult<T> {
        let line = self.current.line;
        if self.current.kind != TokenKind::Error {
            self.lexer.diagnostics_mut().push(Some(line), message);
        }
        Err(SyntaxError { line })
    }

    fn expect(&mut self, kind: TokenKind, name: &str) -> ParseResult<()> {
        if self.current.kind != kind {
            let msg = format!("Expected '{}' at line {} found '{}'",
                              name, self.current.line, self.found());
            return self.fail(msg);
        }
        self.advance();
        Ok(())
    }

    fn parse_expr(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Plus => Op::Add,
                TokenKind::Minus => Op::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_term()?;
            lhs = Expr::op(op, lhs, rhs);
        }
    }

    fn parse_term(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_factor()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Star => Op::Mul,
                TokenKind::Slash => Op::Div,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_factor()?;
            lhs = Expr::op(op, lhs, rhs);
        }
    }

    fn parse_factor(&mut self) -> ParseResult<Expr> {
        match self.current.kind {
            TokenKind::Plus => {
                self.advance();
                self.parse_factor()
            }
            TokenKind::Minus => {
                self.advance();
                Ok(Expr::negate(self.parse_factor()?))
            }
            TokenKind::Number => {
                let expr = Expr::literal(self.current.real(), self.current.lexeme.clone());
                self.advance();
                Ok(expr)
            }
            TokenKind::LBracket => {
                self.advance();
                let expr = self.parse_expr()?;
                if self.current.kind != TokenKind::RBracket {
                    let msg = format!("Expected ']' at line {}, found '{}'",
                                      self.current.line, self.found());
                    return self.fail(msg);
                }
                self.advance();
                Ok(expr)
            }
            TokenKind::Var => {
                let expr = Expr::par(self.current.lexeme.trim_start_matches('#'));
                self.advance();
                Ok(expr)
            }
            _ => {
                let msg = format!("Unexpected '{}' at line {}, expected NUMBER, '[' or parameter",
                                  self.found(), self.current.line);
                self.fail(msg)
            }
        }
    }

    fn parse_param_value(&mut self) -> ParseResult<Expr> {
        let negative = match self.current.kind {
            TokenKind::Minus => { self.advance(); true }
            TokenKind::Plus => { self.advance(); false }
            _ => false,
        };
        match self.current.kind {
            TokenKind::Number => {
                let value = self.current.real();
                let expr = if negative {
                    Expr::literal(-value, format!("-{}", self.current.lexeme))
                } else {
                    Expr::literal(value, self.current.lexeme.clone())
                };
                self.advance();
                Ok(expr)
            }
            TokenKind::LBracket => {
                self.advance();
                let expr = self.parse_expr()?;
                if self.current.kind != TokenKind::RBracket {
                    let msg = format!("Error in command at line {}, expected ']'", self.current.line);
                    return self.fail(msg);
                }
                self.advance();
                Ok(if negative { Expr::negate(expr) } else { expr })
            }
            _ => {
                let msg = format!("Error in command at line {}, expected NUMBER or '['",
                                  self.current.line);
                self.fail(msg)
            }
        }
    }

    fn parse_arguments(&mut self, cmd: &mut Command) -> ParseResult<()> {
        loop {
            let kind = self.current.kind;
            if kind.is_line_end() || kind.is_command() {
                return Ok(());
            }
            match kind.as_arg() {
                Some(arg) => {
                    self.advance();
                    let value = self.parse_param_value()?;
                    cmd.set_arg(arg, value);
                }
                None => {
                    let msg = format!("Expected argument or command at line {}, found '{}'",
                                      self.current.line, self.found());
                    return self.fail(msg);
                }
            }
        }
    }

    fn parse_statement(&mut self) -> ParseResult<Option<Stmt>> {
        match self.current.kind {
            TokenKind::G(major, minor) => self.parse_command(Opcode::G(major, minor)),
            TokenKind::M(code) => self.parse_command(Opcode::M(code)),
            TokenKind::O(id) => self.parse_subroutine(id),
            TokenKind::Var => {
                let var = self.current.lexeme.trim_start_matches('#').to_string();
                self.advance();
                self.expect(TokenKind::Assign, "=")?;
                let value = self.parse_expr()?;
                Ok(Some(Stmt::Assign(Assign { var, value })))
            }
            _ => {
                // an argument-only line continues the previous command
                if self.last_opcode == Opcode::Nop {
                    warn!(line = self.current.line, "argument line without a preceding command");
                }
                let mut cmd = Command::new(self.last_opcode, "");
                self.parse_arguments(&mut cmd)?;
                Ok(Some(Stmt::Command(cmd)))
            }
        }
    }

    fn parse_command(&mut self, opcode: Opcode) -> ParseResult<Option<Stmt>> {
        self.last_opcode = opcode;
        let mut cmd = Command::new(opcode, self.current.lexeme.to_ascii_uppercase());
        self.advance();
        self.parse_arguments(&mut cmd)?;
        Ok(Some(Stmt::Command(cmd)))
    }

    fn parse_subroutine(&mut self, id: u32) -> ParseResult<Option<Stmt>> {
        let name = self.current.lexeme.clone();
        self.advance();
        match self.current.kind {
            TokenKind::KwSub => {
                // the body is not materialized; skip to the matching `O<id>`
                self.advance();
                while self.current.kind != TokenKind::O(id) && !self.is_at_end() {
                    if self.current.kind == TokenKind::Error {
                        // the lexer already recorded the diagnostic
                        return self.fail(String::new());
                    }
                    self.advance();
                }
                self.advance();
                self.expect(TokenKind::KwEndSub, "endsub")?;
                Ok(None)
            }
            TokenKind::KwEndSub => {
                let msg = format!("'endsub' without a previous subroutine declaration at line {}",
                                  self.current.line);
                self.fail(msg)
            }
            TokenKind::KwCall => {
                self.advance();
                let mut args = Vec::new();
                while !self.current.kind.is_line_end() {
                    args.push(self.parse_expr()?);
                }
                Ok(Some(Stmt::Call(SubCall { id, name, args })))
            }
            _ => {
                let msg = format!("Error at line {}, unexpected '{}', expected 'sub', 'endsub', 'call'",
                                  self.current.line, self.found());
                self.fail(msg)
            }
        }
    }
}

/// Parses a whole program from text, keeping every statement.
pub fn parse(filename: &str, input: &str) -> Result<Program, LoadError> {
    let mut parser = Parser::new(Lexer::from_str(input));
    match parser.parse_all() {
        Ok(statements) => Ok(Program { filename: filename.into(), statements }),
        Err(_) => Err(LoadError::Syntax(parser.into_diagnostics())),
    }
}
