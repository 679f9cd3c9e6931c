// Copyright (c) 2019 Georg Brandl.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! Loading and replaying programs.
//!
//! Loading runs once over the parsed statements: assignments go into the
//! symbol table, probe markers are collected, and motion is tracked to find
//! the board outline and the milling depth.  Afterwards the retained
//! statements can be replayed any number of times to follow the tool
//! position.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use strum_macros::{Display, EnumString};
use tracing::debug;

use crate::ast::*;
use crate::error::{LoadError, LoadResult};
use crate::lexer::Lexer;
use crate::parse::Parser;

/// Subroutine number whose calls mark an already probed `(X, Y)` point.
pub const PROBE_MARKER_ID: u32 = 100;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Position { x, y, z }
    }

    /// Applies the axis words of a command, using their cached values.
    fn move_to(&mut self, cmd: &Command) {
        if let Some(x) = cmd.arg_value(Arg::X) {
            self.x = x;
        }
        if let Some(y) = cmd.arg_value(Arg::Y) {
            self.y = y;
        }
        if let Some(z) = cmd.arg_value(Arg::Z) {
            self.z = z;
        }
    }
}

/// Length units selected by G20/G21.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString)]
pub enum Units {
    #[strum(to_string = "inches", serialize = "in")]
    Inches,
    #[strum(to_string = "mm", serialize = "millimeters")]
    Millimeters,
}

impl Default for Units {
    fn default() -> Self { Units::Millimeters }
}

/// Facts collected while loading a program.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgramInfo {
    pub units: Units,
    /// Position after the last statement.
    pub pos: Position,
    pub board_min_x: f64,
    pub board_min_y: f64,
    pub board_max_x: f64,
    pub board_max_y: f64,
    /// Deepest Z of any move below the surface.
    pub mill_depth: Option<f64>,
}

impl Default for ProgramInfo {
    fn default() -> Self {
        ProgramInfo {
            units: Units::default(),
            pos: Position::default(),
            board_min_x: f64::INFINITY,
            board_min_y: f64::INFINITY,
            board_max_x: f64::NEG_INFINITY,
            board_max_y: f64::NEG_INFINITY,
            mill_depth: None,
        }
    }
}

impl ProgramInfo {
    /// True once any point widened the board outline.
    pub fn has_board(&self) -> bool {
        self.board_min_x <= self.board_max_x && self.board_min_y <= self.board_max_y
    }

    pub fn board_width(&self) -> f64 {
        if self.has_board() { self.board_max_x - self.board_min_x } else { 0.0 }
    }

    pub fn board_height(&self) -> f64 {
        if self.has_board() { self.board_max_y - self.board_min_y } else { 0.0 }
    }

    pub fn widen(&mut self, x: f64, y: f64) {
        self.board_min_x = self.board_min_x.min(x);
        self.board_max_x = self.board_max_x.max(x);
        self.board_min_y = self.board_min_y.min(y);
        self.board_max_y = self.board_max_y.max(y);
    }
}

/// Evaluates an expression, caching the result on every visited node.
///
/// Unknown parameters read as zero; division follows IEEE semantics.
pub fn eval_expr(vars: &HashMap<String, f64>, expr: &mut Expr) -> f64 {
    let value = match &mut expr.node {
        Node::Num(_) => return expr.value(),
        Node::Par(name) => vars.get(name.as_str()).copied().unwrap_or(0.0),
        Node::Op(op, lhs, rhs) => {
            let left = eval_expr(vars, lhs);
            let right = eval_expr(vars, rhs);
            match *op {
                Op::Add => left + right,
                Op::Sub => left - right,
                Op::Mul => left * right,
                Op::Div => left / right,
            }
        }
    };
    expr.set_value(value);
    value
}

/// Replay cursor over a statement list.
#[derive(Clone, Debug, Default)]
struct Cursor {
    next: usize,
    current: Option<usize>,
    pos: Position,
}

impl Cursor {
    fn step(&mut self, stmts: &[Stmt]) -> bool {
        self.current = None;
        let stmt = match stmts.get(self.next) {
            Some(stmt) => stmt,
            None => return false,
        };
        if let Stmt::Command(cmd) = stmt {
            self.current = Some(self.next);
            if cmd.is_motion() || cmd.is_drill() {
                self.pos.move_to(cmd);
            }
        }
        self.next += 1;
        true
    }
}

/// Iterator over retained statements with the tool position after each.
pub struct Replay<'a> {
    stmts: &'a [Stmt],
    cursor: Cursor,
}

impl<'a> Iterator for Replay<'a> {
    type Item = (&'a Stmt, Position);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor.next;
        if self.cursor.step(self.stmts) {
            Some((&self.stmts[index], self.cursor.pos))
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.stmts.len() - self.cursor.next;
        (left, Some(left))
    }
}

/// A loaded program.
pub struct Interpreter {
    filename: String,
    statements: Vec<Stmt>,
    // values of numbered parameters, keyed by their digit string
    vars: HashMap<String, f64>,
    info: ProgramInfo,
    probe_points: Vec<Position>,
    cursor: Cursor,
}

impl Interpreter {
    /// Opens and loads a file.
    pub fn open(path: impl AsRef<Path>) -> LoadResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| LoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::load(&path.display().to_string(), file)
    }

    pub fn from_str(filename: &str, text: &str) -> LoadResult<Self> {
        Self::load(filename, text.as_bytes())
    }

    /// Parses and preprocesses a whole program.  The first syntax error
    /// aborts loading; the returned error carries all diagnostics.
    pub fn load<R: Read>(filename: &str, reader: R) -> LoadResult<Self> {
        let mut interp = Interpreter {
            filename: filename.into(),
            statements: Vec::new(),
            vars: HashMap::new(),
            info: ProgramInfo::default(),
            probe_points: Vec::new(),
            cursor: Cursor::default(),
        };
        let mut parser = Parser::new(Lexer::new(reader));
        parser.init();
        while !parser.is_at_end() {
            match parser.next_statement() {
                Ok(Some(stmt)) => interp.preprocess(stmt),
                Ok(None) => (),
                Err(_) => return Err(LoadError::Syntax(parser.into_diagnostics())),
            }
        }
        debug!(file = filename, statements = interp.statements.len(),
               probe_points = interp.probe_points.len(), units = %interp.info.units,
               "program loaded");
        Ok(interp)
    }

    fn preprocess(&mut self, stmt: Stmt) {
        match stmt {
            Stmt::Assign(mut assign) => {
                let value = eval_expr(&self.vars, &mut assign.value);
                self.vars.insert(assign.var, value);
            }
            Stmt::Command(mut cmd) => {
                if cmd.is_a(Opcode::G20) {
                    self.info.units = Units::Inches;
                } else if cmd.is_a(Opcode::G21) {
                    self.info.units = Units::Millimeters;
                } else if cmd.is_drill() {
                    self.eval_args(&mut cmd);
                    self.info.pos.move_to(&cmd);
                    let Position { x, y, .. } = self.info.pos;
                    self.info.widen(x, y);
                } else if cmd.is_motion() {
                    self.eval_args(&mut cmd);
                    self.info.pos.move_to(&cmd);
                    let Position { x, y, z } = self.info.pos;
                    // only moves below the surface count towards the board
                    if z < 0.0 {
                        if self.info.mill_depth.map_or(true, |depth| z < depth) {
                            self.info.mill_depth = Some(z);
                        }
                        self.info.widen(x, y);
                    }
                }
                self.statements.push(Stmt::Command(cmd));
            }
            Stmt::Call(mut call) => {
                if call.id == PROBE_MARKER_ID && call.args.len() >= 2 {
                    let x = eval_expr(&self.vars, &mut call.args[0]);
                    let y = eval_expr(&self.vars, &mut call.args[1]);
                    self.info.widen(x, y);
                    self.probe_points.push(Position::new(x, y, 0.0));
                }
            }
        }
    }

    fn eval_args(&self, cmd: &mut Command) {
        for expr in cmd.args_mut() {
            eval_expr(&self.vars, expr);
        }
    }

    /// Evaluates an expression against the final symbol table.
    pub fn eval(&self, expr: &mut Expr) -> f64 {
        eval_expr(&self.vars, expr)
    }

    pub fn var(&self, name: &str) -> Option<f64> {
        self.vars.get(name).copied()
    }

    pub fn vars(&self) -> &HashMap<String, f64> {
        &self.vars
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn info(&self) -> &ProgramInfo {
        &self.info
    }

    pub fn units(&self) -> Units {
        self.info.units
    }

    pub fn statements(&self) -> &[Stmt] {
        &self.statements
    }

    pub fn statement_count(&self) -> usize {
        self.statements.len()
    }

    pub fn has_statements(&self) -> bool {
        !self.statements.is_empty()
    }

    pub fn probe_points(&self) -> &[Position] {
        &self.probe_points
    }

    pub fn has_probe_points(&self) -> bool {
        !self.probe_points.is_empty()
    }

    // -- replay --

    /// Rewinds the replay cursor to the first statement and the origin.
    pub fn init(&mut self) {
        self.cursor = Cursor::default();
    }

    /// Steps over one statement; returns false once the program is done.
    pub fn advance(&mut self) -> bool {
        self.cursor.step(&self.statements)
    }

    /// The command stepped over by the last `advance`, if it was one.
    pub fn current_command(&self) -> Option<&Command> {
        match self.cursor.current.map(|i| &self.statements[i]) {
            Some(Stmt::Command(cmd)) => Some(cmd),
            _ => None,
        }
    }

    pub fn current_pos(&self) -> Position {
        self.cursor.pos
    }

    /// An independent replay that does not disturb the cursor.
    pub fn replay(&self) -> Replay<'_> {
        Replay { stmts: &self.statements, cursor: Cursor::default() }
    }
}
