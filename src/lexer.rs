// Copyright (c) 2019 Georg Brandl.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! Pull-based tokenizer for the G-code dialect.
//!
//! The lexer reads bytes from any [`Read`] source through a two-half buffer,
//! so one character can always be pushed back, even right after the active
//! half was switched.  Lexical errors do not abort: they produce a
//! [`TokenKind::Error`] token and a message in the lexer's [`Diagnostics`].

use std::io::{self, Read};

use crate::ast::Arg;
use crate::error::Diagnostics;

const BUF_SIZE: usize = 4096;

/// The kind of a token.  Command tokens carry their code numbers so that
/// `O100` can be compared against another `O100` cheaply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// `G<major>` or `G<major>.<minor>`
    G(u16, Option<u16>),
    /// `M<code>`
    M(u16),
    /// `O<id>`, a subroutine number
    O(u32),
    /// An argument letter (`X Y Z F P R S T`)
    Arg(Arg),
    /// `N<digits>`
    LineNumber,
    /// `#<digits>`
    Var,
    Assign,
    LBracket,
    RBracket,
    Plus,
    Minus,
    Star,
    Slash,
    KwSub,
    KwEndSub,
    KwCall,
    Number,
    Eol,
    Eof,
    Error,
}

impl TokenKind {
    pub fn is_g_command(&self) -> bool {
        matches!(self, TokenKind::G(..))
    }

    pub fn is_m_command(&self) -> bool {
        matches!(self, TokenKind::M(_))
    }

    pub fn is_o_command(&self) -> bool {
        matches!(self, TokenKind::O(_))
    }

    /// True for every token that starts a new command (G, M and O words).
    pub fn is_command(&self) -> bool {
        self.is_g_command() || self.is_m_command() || self.is_o_command()
    }

    pub fn as_arg(&self) -> Option<Arg> {
        match self {
            TokenKind::Arg(a) => Some(*a),
            _ => None,
        }
    }

    /// True for tokens that end a logical line.
    pub fn is_line_end(&self) -> bool {
        matches!(self, TokenKind::Eol | TokenKind::Eof)
    }
}

/// Literal value attached to a token.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Literal {
    Int(u32),
    Real(f64),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub literal: Option<Literal>,
    /// Raw source text of the token.
    pub lexeme: String,
    /// Line on which the token starts; an end-of-line token belongs to the
    /// line it terminates.
    pub line: usize,
}

impl Token {
    /// Numeric value of a `Number` token.
    pub fn real(&self) -> f64 {
        match self.literal {
            Some(Literal::Real(v)) => v,
            Some(Literal::Int(n)) => f64::from(n),
            None => 0.0,
        }
    }
}

/// Two alternately filled halves with single-character pushback.
struct CharSource<R> {
    src: R,
    halves: [Vec<u8>; 2],
    lens: [usize; 2],
    active: usize,
    pos: usize,
    // the inactive half already holds the bytes following the active one
    next_ready: bool,
    primed: bool,
    last_was_eof: bool,
    consumed: u64,
}

fn fill(src: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut n = 0;
    while n < buf.len() {
        match src.read(&mut buf[n..]) {
            Ok(0) => break,
            Ok(k) => n += k,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(n)
}

impl<R: Read> CharSource<R> {
    fn new(src: R) -> Self {
        CharSource {
            src,
            halves: [vec![0; BUF_SIZE], vec![0; BUF_SIZE]],
            lens: [0, 0],
            active: 0,
            pos: 0,
            next_ready: false,
            primed: false,
            last_was_eof: false,
            consumed: 0,
        }
    }

    fn get(&mut self) -> io::Result<Option<u8>> {
        if !self.primed {
            self.primed = true;
            self.lens[0] = fill(&mut self.src, &mut self.halves[0])?;
        }
        if self.pos == self.lens[self.active] && self.lens[self.active] == BUF_SIZE {
            let other = 1 - self.active;
            if !self.next_ready {
                self.lens[other] = fill(&mut self.src, &mut self.halves[other])?;
            }
            self.active = other;
            self.pos = 0;
            self.next_ready = false;
        }
        if self.pos == self.lens[self.active] {
            self.last_was_eof = true;
            return Ok(None);
        }
        let ch = self.halves[self.active][self.pos];
        self.pos += 1;
        self.consumed += 1;
        self.last_was_eof = false;
        Ok(Some(ch))
    }

    fn unget(&mut self) {
        if self.last_was_eof {
            self.last_was_eof = false;
            return;
        }
        if self.consumed == 0 {
            return;
        }
        self.consumed -= 1;
        if self.pos > 0 {
            self.pos -= 1;
        } else {
            // step back into the half we just left; its data is still intact
            self.active = 1 - self.active;
            self.pos = BUF_SIZE - 1;
            self.next_ready = true;
        }
    }
}

/// The G-code tokenizer.
pub struct Lexer<R> {
    source: CharSource<R>,
    line: usize,
    lexeme: String,
    diag: Diagnostics,
    io_error: Option<io::Error>,
    finished: bool,
}

impl<'a> Lexer<&'a [u8]> {
    /// Convenience constructor for in-memory text.
    pub fn from_str(text: &'a str) -> Self {
        Lexer::new(text.as_bytes())
    }
}

impl<R: Read> Lexer<R> {
    pub fn new(reader: R) -> Self {
        Lexer {
            source: CharSource::new(reader),
            line: 1,
            lexeme: String::new(),
            diag: Diagnostics::new(),
            io_error: None,
            finished: false,
        }
    }

    /// Current line number (1-based).
    pub fn line(&self) -> usize {
        self.line
    }

    /// Number of bytes consumed so far.
    pub fn offset(&self) -> u64 {
        self.source.consumed
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diag
    }

    pub fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diag
    }

    pub fn into_diagnostics(self) -> Diagnostics {
        self.diag
    }

    fn getc(&mut self) -> Option<u8> {
        if self.finished {
            return None;
        }
        match self.source.get() {
            Ok(ch) => ch,
            Err(e) => {
                self.finished = true;
                self.io_error = Some(e);
                None
            }
        }
    }

    fn ungetc(&mut self) {
        self.source.unget();
    }

    fn token(&self, kind: TokenKind, literal: Option<Literal>, line: usize) -> Token {
        Token { kind, literal, lexeme: self.lexeme.clone(), line }
    }

    fn error(&mut self, line: usize, message: String) -> Token {
        self.diag.push(Some(line), message);
        self.token(TokenKind::Error, None, line)
    }

    /// Reads a run of decimal digits, appending them to the lexeme.
    fn read_digits(&mut self) -> String {
        let mut digits = String::new();
        while let Some(ch) = self.getc() {
            if ch.is_ascii_digit() {
                digits.push(ch as char);
            } else {
                self.ungetc();
                break;
            }
        }
        self.lexeme.push_str(&digits);
        digits
    }

    /// Reads a run of letters, lower-cased, appending them to the lexeme.
    fn read_word(&mut self, first: u8) -> String {
        let mut word = String::new();
        word.push(first.to_ascii_lowercase() as char);
        while let Some(ch) = self.getc() {
            if ch.is_ascii_alphabetic() {
                word.push(ch.to_ascii_lowercase() as char);
                self.lexeme.push(ch as char);
            } else {
                self.ungetc();
                break;
            }
        }
        word
    }

    fn read_code(&mut self, letter: char, line: usize) -> Result<u32, Token> {
        let digits = self.read_digits();
        if digits.is_empty() {
            return Err(self.error(line, format!("Expected number after '{}' at line {}", letter, line)));
        }
        digits.parse().map_err(|_| {
            self.error(line, format!("Number '{}' too large at line {}", digits, line))
        })
    }

    /// Like `read_code`, for G and M codes.
    fn read_short_code(&mut self, letter: char, line: usize) -> Result<u16, Token> {
        let n = self.read_code(letter, line)?;
        u16::try_from(n).map_err(|_| {
            self.error(line, format!("Number '{}' too large at line {}", n, line))
        })
    }

    fn read_number(&mut self, line: usize) -> Token {
        let mut seen_dot = self.lexeme.ends_with('.');
        while let Some(ch) = self.getc() {
            if ch.is_ascii_digit() || (ch == b'.' && !seen_dot) {
                seen_dot |= ch == b'.';
                self.lexeme.push(ch as char);
            } else {
                self.ungetc();
                break;
            }
        }
        match self.lexeme.parse::<f64>() {
            Ok(v) => self.token(TokenKind::Number, Some(Literal::Real(v)), line),
            Err(_) => {
                let msg = format!("Invalid number '{}' at line {}", self.lexeme, line);
                self.error(line, msg)
            }
        }
    }

    fn skip_comment(&mut self, line: usize) -> Option<Token> {
        loop {
            match self.getc() {
                Some(b')') => return None,
                Some(b'(') => {
                    return Some(self.error(line, format!("Nested comment at line {}", self.line)));
                }
                Some(b'\n') => self.line += 1,
                Some(_) => (),
                None => {
                    return Some(self.error(line, format!("Unterminated comment at line {}", line)));
                }
            }
        }
    }

    /// Returns the next token.  Once the input is exhausted, every further
    /// call returns an end-of-file token.
    pub fn next_token(&mut self) -> Token {
        self.lexeme.clear();
        loop {
            let line = self.line;
            let ch = match self.getc() {
                Some(ch) => ch,
                None => {
                    if let Some(e) = self.io_error.take() {
                        return self.error(line, format!("Read error at line {}: {}", line, e));
                    }
                    return self.token(TokenKind::Eof, None, line);
                }
            };
            if ch == b' ' || ch == b'\t' {
                continue;
            }
            self.lexeme.push(ch as char);

            let kind = match ch.to_ascii_uppercase() {
                b'(' => {
                    if let Some(err) = self.skip_comment(line) {
                        return err;
                    }
                    self.lexeme.clear();
                    continue;
                }
                b'\r' => {
                    if let Some(next) = self.getc() {
                        if next != b'\n' {
                            self.ungetc();
                        }
                    }
                    self.line += 1;
                    TokenKind::Eol
                }
                b'\n' => {
                    self.line += 1;
                    TokenKind::Eol
                }
                b'N' => {
                    return match self.read_code('N', line) {
                        Ok(n) => self.token(TokenKind::LineNumber, Some(Literal::Int(n)), line),
                        Err(err) => err,
                    };
                }
                b'G' => {
                    let major = match self.read_short_code('G', line) {
                        Ok(n) => n,
                        Err(err) => return err,
                    };
                    let mut minor = None;
                    match self.getc() {
                        Some(b'.') => {
                            self.lexeme.push('.');
                            minor = Some(self.read_digits().parse().unwrap_or(0));
                        }
                        Some(_) => self.ungetc(),
                        None => (),
                    }
                    let kind = TokenKind::G(major, minor);
                    return self.token(kind, Some(Literal::Int(major.into())), line);
                }
                b'M' => {
                    return match self.read_short_code('M', line) {
                        Ok(n) => self.token(TokenKind::M(n), Some(Literal::Int(n.into())), line),
                        Err(err) => err,
                    };
                }
                b'O' => {
                    return match self.read_code('O', line) {
                        Ok(n) => self.token(TokenKind::O(n), Some(Literal::Int(n)), line),
                        Err(err) => err,
                    };
                }
                b'#' => {
                    return match self.read_code('#', line) {
                        Ok(n) => self.token(TokenKind::Var, Some(Literal::Int(n)), line),
                        Err(err) => err,
                    };
                }
                b'=' => TokenKind::Assign,
                b'[' => TokenKind::LBracket,
                b']' => TokenKind::RBracket,
                b'+' => TokenKind::Plus,
                b'-' => TokenKind::Minus,
                b'*' => TokenKind::Star,
                b'/' => TokenKind::Slash,
                b'X' => TokenKind::Arg(Arg::X),
                b'Y' => TokenKind::Arg(Arg::Y),
                b'Z' => TokenKind::Arg(Arg::Z),
                b'F' => TokenKind::Arg(Arg::F),
                b'P' => TokenKind::Arg(Arg::P),
                b'R' => TokenKind::Arg(Arg::R),
                b'T' => TokenKind::Arg(Arg::T),
                b'S' => {
                    // `S` is either the spindle argument or the start of `sub`
                    match self.getc() {
                        Some(next) if next.is_ascii_alphabetic() => {
                            self.ungetc();
                            let word = self.read_word(ch);
                            if word == "sub" {
                                TokenKind::KwSub
                            } else {
                                return self.error(line, format!(
                                    "Invalid keyword '{}' detected at line {}", word, line));
                            }
                        }
                        Some(_) => {
                            self.ungetc();
                            TokenKind::Arg(Arg::S)
                        }
                        None => TokenKind::Arg(Arg::S),
                    }
                }
                b'0'..=b'9' | b'.' => return self.read_number(line),
                c if c.is_ascii_alphabetic() => {
                    let word = self.read_word(ch);
                    match word.as_str() {
                        "endsub" => TokenKind::KwEndSub,
                        "call" => TokenKind::KwCall,
                        _ => {
                            return self.error(line, format!(
                                "Invalid keyword '{}' detected at line {}", word, line));
                        }
                    }
                }
                _ => {
                    return self.error(line, format!(
                        "Invalid symbol '{}' detected at line {} (0x{:x})",
                        ch as char, line, ch));
                }
            };
            return self.token(kind, None, line);
        }
    }
}

impl<R: Read> Iterator for Lexer<R> {
    type Item = Token;

    /// Yields tokens up to, but not including, end of file.
    fn next(&mut self) -> Option<Token> {
        let tok = self.next_token();
        if tok.kind == TokenKind::Eof {
            None
        } else {
            Some(tok)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::from_str(src).map(|t| t.kind).collect()
    }

    #[test]
    fn test_commands_and_args() {
        assert_eq!(kinds("G01 X1.5 y-2\n"), vec![
            TokenKind::G(1, None), TokenKind::Arg(Arg::X), TokenKind::Number,
            TokenKind::Arg(Arg::Y), TokenKind::Minus, TokenKind::Number, TokenKind::Eol,
        ]);
        assert_eq!(kinds("G38.2 M5 O100"), vec![
            TokenKind::G(38, Some(2)), TokenKind::M(5), TokenKind::O(100),
        ]);
        assert!(TokenKind::G(38, Some(2)).is_g_command());
        assert!(TokenKind::O(7).is_command());
        assert!(!TokenKind::Arg(Arg::X).is_command());
    }

    #[test]
    fn test_number_lexeme_is_kept() {
        let toks: Vec<_> = Lexer::from_str("X.5 X0.50").collect();
        assert_eq!(toks[1].lexeme, ".5");
        assert_eq!(toks[1].real(), 0.5);
        assert_eq!(toks[3].lexeme, "0.50");
    }

    #[test]
    fn test_s_disambiguation() {
        assert_eq!(kinds("S1000"), vec![TokenKind::Arg(Arg::S), TokenKind::Number]);
        assert_eq!(kinds("O1 sub"), vec![TokenKind::O(1), TokenKind::KwSub]);
        assert_eq!(kinds("O1 ENDSUB O2 Call"), vec![
            TokenKind::O(1), TokenKind::KwEndSub, TokenKind::O(2), TokenKind::KwCall,
        ]);
        let mut lex = Lexer::from_str("sand");
        assert_eq!(lex.next_token().kind, TokenKind::Error);
        assert!(lex.diagnostics().contains("Invalid keyword 'sand' detected at line 1"));
    }

    #[test]
    fn test_code_range() {
        assert_eq!(kinds("G65535 M65535"), vec![TokenKind::G(65535, None), TokenKind::M(65535)]);
        for src in &["G65617", "M65536"] {
            let mut lex = Lexer::from_str(src);
            assert_eq!(lex.next_token().kind, TokenKind::Error);
            assert!(lex.diagnostics().contains("too large at line 1"), "{}", src);
        }
    }

    #[test]
    fn test_line_endings() {
        let toks: Vec<_> = Lexer::from_str("G0\r\nG1\rG2\nG3").collect();
        let eols: Vec<_> = toks.iter().filter(|t| t.kind == TokenKind::Eol)
                               .map(|t| t.line).collect();
        assert_eq!(eols, vec![1, 2, 3]);
        assert_eq!(toks.last().map(|t| t.line), Some(4));
    }

    #[test]
    fn test_comments() {
        assert_eq!(kinds("G0 (move (x)) X1").first(), Some(&TokenKind::G(0, None)));
        let mut lex = Lexer::from_str("G0 (a (b)");
        lex.next_token();
        assert_eq!(lex.next_token().kind, TokenKind::Error);
        assert!(lex.diagnostics().contains("Nested comment at line 1"));

        let mut lex = Lexer::from_str("(never closed");
        assert_eq!(lex.next_token().kind, TokenKind::Error);
        assert!(lex.diagnostics().contains("Unterminated comment"));
    }

    #[test]
    fn test_invalid_symbol() {
        let mut lex = Lexer::from_str("\nG0 $");
        while lex.next_token().kind != TokenKind::Error {}
        assert!(lex.diagnostics().contains("Invalid symbol '$' detected at line 2 (0x24)"));
    }

    #[test]
    fn test_eof_is_sticky() {
        let mut lex = Lexer::from_str("X");
        assert_eq!(lex.next_token().kind, TokenKind::Arg(Arg::X));
        for _ in 0..3 {
            assert_eq!(lex.next_token().kind, TokenKind::Eof);
        }
    }

    #[test]
    fn test_pushback_across_buffer_boundary() {
        // place a token boundary exactly on the end of the first half
        let mut src = " ".repeat(BUF_SIZE - 3);
        src.push_str("G12X3\n");
        let toks: Vec<_> = Lexer::from_str(&src).collect();
        assert_eq!(toks[0].kind, TokenKind::G(12, None));
        assert_eq!(toks[0].lexeme, "G12");
        assert_eq!(toks[1].kind, TokenKind::Arg(Arg::X));
        assert_eq!(toks[2].real(), 3.0);

        let long = "G1 X1\n".repeat(3 * BUF_SIZE / 6 + 7);
        let count = Lexer::from_str(&long).filter(|t| t.kind == TokenKind::Eol).count();
        assert_eq!(count, 3 * BUF_SIZE / 6 + 7);
    }

    #[test]
    fn test_variables_and_line_numbers() {
        let toks: Vec<_> = Lexer::from_str("N10 #12=[1+2]").collect();
        assert_eq!(toks[0].kind, TokenKind::LineNumber);
        assert_eq!(toks[1].kind, TokenKind::Var);
        assert_eq!(toks[1].literal, Some(Literal::Int(12)));
        assert_eq!(toks[1].lexeme, "#12");
    }
}
