// Copyright (c) 2019 Georg Brandl.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! The intermediate representation: expressions and statements.
//!
//! Every node exclusively owns its children, so `clone()` is always a deep,
//! independent copy.  The `Display` implementations render valid G-code that
//! the parser accepts again.

use std::fmt::{self, Display, Formatter};
use itertools::Itertools;
use strum_macros::{Display as StrumDisplay, EnumString};

use crate::util::fmt_num;

/// Decimal places used when rendering computed (non-literal) numbers.
pub const NUM_FIGURES: usize = 4;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Program {
    pub filename: String,
    pub statements: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Assign(Assign),
    Command(Command),
    Call(SubCall),
}

/// `#<n>=<expr>`
#[derive(Clone, Debug, PartialEq)]
pub struct Assign {
    pub var: String,
    pub value: Expr,
}

/// `O<n> call <expr>*`
#[derive(Clone, Debug, PartialEq)]
pub struct SubCall {
    pub id: u32,
    pub name: String,
    pub args: Vec<Expr>,
}

/// A G or M word with its arguments.
#[derive(Clone, Debug, PartialEq)]
pub struct Command {
    pub opcode: Opcode,
    pub name: String,
    // insertion order is rendering order; letters are unique
    args: Vec<(Arg, Expr)>,
    z_formula: Option<String>,
}

/// The instruction a command executes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    G(u16, Option<u16>),
    M(u16),
    /// An argument-only line with no preceding command.
    Nop,
}

impl Opcode {
    pub const G00: Opcode = Opcode::G(0, None);
    pub const G01: Opcode = Opcode::G(1, None);
    pub const G20: Opcode = Opcode::G(20, None);
    pub const G21: Opcode = Opcode::G(21, None);
    pub const G38_2: Opcode = Opcode::G(38, Some(2));
    pub const G81: Opcode = Opcode::G(81, None);
    pub const G82: Opcode = Opcode::G(82, None);

    /// Fixed-depth single point cycles.
    pub fn is_drill(&self) -> bool {
        *self == Opcode::G81 || *self == Opcode::G82
    }

    pub fn is_unit_select(&self) -> bool {
        *self == Opcode::G20 || *self == Opcode::G21
    }
}

impl Display for Opcode {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Opcode::G(n, None) => write!(f, "G{:02}", n),
            Opcode::G(n, Some(m)) => write!(f, "G{:02}.{}", n, m),
            Opcode::M(n) => write!(f, "M{:02}", n),
            Opcode::Nop => Ok(()),
        }
    }
}

/// Argument letters understood on a command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, StrumDisplay, EnumString)]
pub enum Arg {
    X, Y, Z,
    F, P, R,
    S, T,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Op(Op, Box<Expr>, Box<Expr>),
    /// A number, with its source text when it came from the input.
    Num(Option<String>),
    /// A numbered parameter, identified by its digit string.
    Par(String),
}

/// An expression node together with its last evaluated value.
#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub node: Node,
    value: f64,
}

impl Expr {
    pub fn num(value: f64) -> Self {
        Expr { node: Node::Num(None), value }
    }

    /// A number literal that remembers how it was written.
    pub fn literal(value: f64, text: impl Into<String>) -> Self {
        Expr { node: Node::Num(Some(text.into())), value }
    }

    pub fn par(name: impl Into<String>) -> Self {
        Expr { node: Node::Par(name.into()), value: 0.0 }
    }

    pub fn op(op: Op, lhs: Expr, rhs: Expr) -> Self {
        Expr { node: Node::Op(op, Box::new(lhs), Box::new(rhs)), value: 0.0 }
    }

    /// `-x` is represented as `-1 * x`.
    pub fn negate(expr: Expr) -> Self {
        Expr::op(Op::Mul, Expr::num(-1.0), expr)
    }

    /// The cached value: the literal for numbers, otherwise the result of
    /// the last evaluation (zero before any).
    pub fn value(&self) -> f64 {
        self.value
    }

    pub(crate) fn set_value(&mut self, value: f64) {
        self.value = value;
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.node, Node::Op(..))
    }

    pub fn is_number(&self) -> bool {
        matches!(self.node, Node::Num(_))
    }
}

impl Command {
    pub fn new(opcode: Opcode, name: impl Into<String>) -> Self {
        Command { opcode, name: name.into(), args: Vec::new(), z_formula: None }
    }

    /// A command moving to the given XY point.
    pub fn at_xy(opcode: Opcode, name: impl Into<String>, x: f64, y: f64) -> Self {
        let mut cmd = Command::new(opcode, name);
        cmd.set_arg(Arg::X, Expr::num(x));
        cmd.set_arg(Arg::Y, Expr::num(y));
        cmd
    }

    pub fn is_a(&self, opcode: Opcode) -> bool {
        self.opcode == opcode
    }

    pub fn is_drill(&self) -> bool {
        self.opcode.is_drill()
    }

    /// A linear move: anything that is not a drill cycle and names an axis.
    pub fn is_motion(&self) -> bool {
        self.opcode != Opcode::Nop && !self.is_drill()
            && (self.has_arg(Arg::X) || self.has_arg(Arg::Y) || self.has_arg(Arg::Z))
    }

    /// Sets an argument, keeping the original position if it already exists.
    pub fn set_arg(&mut self, arg: Arg, value: Expr) {
        match self.args.iter_mut().find(|(a, _)| *a == arg) {
            Some(slot) => slot.1 = value,
            None => self.args.push((arg, value)),
        }
    }

    pub fn has_arg(&self, arg: Arg) -> bool {
        self.args.iter().any(|(a, _)| *a == arg)
    }

    pub fn arg(&self, arg: Arg) -> Option<&Expr> {
        self.args.iter().find(|(a, _)| *a == arg).map(|(_, e)| e)
    }

    pub fn arg_value(&self, arg: Arg) -> Option<f64> {
        self.arg(arg).map(Expr::value)
    }

    pub fn args(&self) -> impl Iterator<Item = (Arg, &Expr)> {
        self.args.iter().map(|(a, e)| (*a, e))
    }

    pub(crate) fn args_mut(&mut self) -> impl Iterator<Item = &mut Expr> {
        self.args.iter_mut().map(|(_, e)| e)
    }

    pub fn arg_letters(&self) -> String {
        self.args.iter().map(|(a, _)| a.to_string()).collect()
    }

    /// Replaces the rendering of the Z argument with `[formula]`.
    pub fn set_z_formula(&mut self, formula: impl Into<String>) {
        self.z_formula = Some(formula.into());
    }

    pub fn z_formula(&self) -> Option<&str> {
        self.z_formula.as_deref()
    }
}

impl Display for Program {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        for stmt in &self.statements {
            writeln!(f, "{}", stmt)?;
        }
        Ok(())
    }
}

impl Display for Stmt {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Stmt::Assign(a) => write!(f, "{}", a),
            Stmt::Command(c) => write!(f, "{}", c),
            Stmt::Call(c) => write!(f, "{}", c),
        }
    }
}

impl Display for Assign {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "#{}={}", self.var, self.value)
    }
}

impl Display for SubCall {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{} call", self.name)?;
        for arg in &self.args {
            write!(f, " [{}]", arg)?;
        }
        Ok(())
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let mut words = vec![];
        if !self.name.is_empty() {
            words.push(self.name.clone());
        }
        for (arg, value) in &self.args {
            words.push(match (*arg, &self.z_formula) {
                (Arg::Z, Some(formula)) => format!("Z[{}]", formula),
                _ if !value.is_number() => format!("{}[{}]", arg, value),
                _ => format!("{}{}", arg, value),
            });
        }
        if let Some(formula) = &self.z_formula {
            if !self.has_arg(Arg::Z) {
                words.push(format!("Z[{}]", formula));
            }
        }
        write!(f, "{}", words.iter().join(" "))
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match &self.node {
            Node::Num(Some(text)) => write!(f, "{}", text),
            Node::Num(None) => write!(f, "{}", fmt_num(self.value, NUM_FIGURES)),
            Node::Par(name) => write!(f, "#{}", name),
            Node::Op(op, lhs, rhs) => {
                if lhs.is_composite() {
                    write!(f, "[{}] {} ", lhs, op)?;
                } else {
                    write!(f, "{} {} ", lhs, op)?;
                }
                if rhs.is_composite() {
                    write!(f, "[{}]", rhs)
                } else {
                    write!(f, "{}", rhs)
                }
            }
        }
    }
}

impl Display for Op {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", match self {
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
        })
    }
}
