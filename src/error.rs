// Copyright (c) 2019 Georg Brandl.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! Error types and the diagnostic sink shared by lexer, parser and loader.

use std::fmt;
use std::io;
use thiserror::Error;

/// One human-readable diagnostic line.
#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostic {
    pub line: Option<usize>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Append-only collection of diagnostics.
///
/// The lexer owns the sink while a file is being read; the parser and the
/// loader append to it through the lexer, and hand it to the caller as part of
/// a [`LoadError`] when loading fails.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: Option<usize>, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(?line, "{}", message);
        self.entries.push(Diagnostic { line, message });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    /// True if any diagnostic contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.entries.iter().any(|d| d.message.contains(needle))
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{}", entry)?;
        }
        Ok(())
    }
}

/// A statement failed to parse; the reason is in the diagnostics.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("syntax error at line {line}")]
pub struct SyntaxError {
    pub line: usize,
}

/// Errors that abort loading a program.
#[derive(Error, Debug)]
pub enum LoadError {
    /// The input could not be opened or read.
    #[error("Unable to open file: {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    /// A lexical or syntactic error; the diagnostics describe it.
    #[error("{0}")]
    Syntax(Diagnostics),
}

impl LoadError {
    /// The accumulated diagnostic text, if any.
    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        match self {
            LoadError::Syntax(d) => Some(d),
            LoadError::Io { .. } => None,
        }
    }
}

/// Errors raised by the autoleveller.
#[derive(Error, Debug)]
pub enum LevelError {
    /// The loaded program contains no statements.
    #[error("program has no statements to level")]
    Empty,

    /// The configured grid cell size cannot subdivide anything.
    #[error("grid size must be positive and finite, got {0}")]
    InvalidGridSize(f64),

    /// A board bound evaluated to infinity or NaN.
    #[error("board outline is not finite: X {min_x} .. {max_x}, Y {min_y} .. {max_y}")]
    NonFiniteBoard { min_x: f64, min_y: f64, max_x: f64, max_y: f64 },

    /// The board needs more probe cells than a grid may hold.
    #[error("probing grid of {cells_x} x {cells_y} cells exceeds the limit of {limit}")]
    GridTooLarge { cells_x: f64, cells_y: f64, limit: usize },

    /// A cutting move would split into more pieces than a grid may hold,
    /// or one of its ends is not finite.
    #[error("move from ({from_x}, {from_y}) to ({to_x}, {to_y}) cannot be split into grid cells")]
    MoveTooLong { from_x: f64, from_y: f64, to_x: f64, to_y: f64 },

    /// `generate` was called before `run`.
    #[error("nothing to generate, run the split phase first")]
    NotSplit,

    /// The progress listener asked to stop.
    #[error("operation cancelled")]
    Cancelled,

    /// The output file could not be created or flushed.
    #[error("Unable to open file: {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Writing the generated program failed.
    #[error("write error: {0}")]
    Write(#[from] io::Error),
}

pub type LoadResult<T> = Result<T, LoadError>;

pub type LevelResult<T> = Result<T, LevelError>;
