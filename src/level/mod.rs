// Copyright (c) 2019 Georg Brandl.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! Autolevelling: rewriting a program's cutting depth relative to a probed
//! surface.
//!
//! The work runs in two phases.  [`Autoleveller::run`] replays the loaded
//! program, splits milling moves so that no segment crosses more than one
//! grid cell, and attaches a Z formula interpolating the probed height at
//! each segment's end point.  [`Autoleveller::generate`] then writes the
//! result, with a preamble that zeroes Z, declares the probing subroutine
//! and probes every cell a formula refers to.

mod config;
mod generate;
mod grid;

use tracing::{debug, warn};

use crate::ast::{Arg, Command, Stmt};
use crate::error::{LevelError, LevelResult};
use crate::interp::{Interpreter, Position};

pub use self::config::{AutolevelConfig, ConfigOverrides};
pub use self::grid::{Corner, FormulaKind, Grid, ProbeCell, CELL_PARAM_BASE, MAX_GRID_CELLS};

/// Observer for long-running phases.
pub trait ProgressListener {
    /// Called after each processed statement with the running count.
    fn on_progress(&mut self, count: usize);

    /// Checked before each statement; returning true aborts the phase.
    fn is_cancelled(&self) -> bool {
        false
    }
}

impl<F: FnMut(usize)> ProgressListener for F {
    fn on_progress(&mut self, count: usize) {
        self(count)
    }
}

pub(crate) struct Progress<'l> {
    listener: Option<&'l mut dyn ProgressListener>,
    count: usize,
}

impl<'l> Progress<'l> {
    pub(crate) fn new(listener: Option<&'l mut dyn ProgressListener>) -> Self {
        Progress { listener, count: 0 }
    }

    pub(crate) fn check(&self) -> LevelResult<()> {
        match &self.listener {
            Some(listener) if listener.is_cancelled() => Err(LevelError::Cancelled),
            _ => Ok(()),
        }
    }

    pub(crate) fn step(&mut self) {
        self.count += 1;
        if let Some(listener) = self.listener.as_deref_mut() {
            listener.on_progress(self.count);
        }
    }
}

pub struct Autoleveller<'a> {
    interp: &'a Interpreter,
    config: AutolevelConfig,
    grid: Option<Grid>,
    output: Vec<Stmt>,
    has_drill_spots: bool,
    drill_spot_depth: Option<f64>,
}

impl<'a> Autoleveller<'a> {
    pub fn new(interp: &'a Interpreter, config: AutolevelConfig) -> Self {
        Autoleveller {
            interp,
            config,
            grid: None,
            output: Vec::new(),
            has_drill_spots: false,
            drill_spot_depth: None,
        }
    }

    pub fn config(&self) -> &AutolevelConfig {
        &self.config
    }

    /// The grid of the last split, if any.
    pub fn grid(&self) -> Option<&Grid> {
        self.grid.as_ref()
    }

    /// The transformed statements of the last split.
    pub fn output(&self) -> &[Stmt] {
        &self.output
    }

    pub fn has_drill_spots(&self) -> bool {
        self.has_drill_spots
    }

    /// Depth written as `#7`: the Z of the first drill cycle that names one,
    /// else the engraving depth.  `None` without drill cycles.
    pub fn drill_spot_depth(&self) -> Option<f64> {
        if self.has_drill_spots {
            Some(self.drill_spot_depth.unwrap_or(self.config.engraving_depth))
        } else {
            None
        }
    }

    /// Splits the program and attaches Z formulas.  Running again starts
    /// over with a fresh grid.
    pub fn run(&mut self, listener: Option<&mut dyn ProgressListener>) -> LevelResult<&[Stmt]> {
        if !self.interp.has_statements() {
            return Err(LevelError::Empty);
        }
        self.warn_param_collisions();

        let mut grid = Grid::new(self.interp.info(), self.config.grid_size)?;
        let (nx, ny) = grid.dimensions();
        let (cell_w, cell_h) = grid.cell_size();
        debug!(nx, ny, cell_w, cell_h, "probing grid");

        let mut progress = Progress::new(listener);
        let mut output = Vec::with_capacity(self.interp.statement_count());
        let mut has_drill_spots = false;
        let mut drill_spot_depth = None;
        let mut last = Position::default();

        for (stmt, pos) in self.interp.replay() {
            progress.check()?;
            match stmt {
                Stmt::Command(cmd) if cmd.is_drill() => {
                    has_drill_spots = true;
                    if drill_spot_depth.is_none() {
                        drill_spot_depth = cmd.arg_value(Arg::Z);
                    }
                    let mut cmd = cmd.clone();
                    cmd.set_z_formula(level_point(&mut grid, pos, FormulaKind::Point));
                    output.push(Stmt::Command(cmd));
                }
                Stmt::Command(cmd) if cmd.is_motion() && pos.z < 0.0 => {
                    split_move(&mut grid, &mut output, (last.x, last.y), pos, cmd.clone())?;
                }
                other => output.push(other.clone()),
            }
            last = pos;
            progress.step();
        }

        debug!(statements = output.len(), cells = grid.referenced_count(), "split done");
        self.grid = Some(grid);
        self.output = output;
        self.has_drill_spots = has_drill_spots;
        self.drill_spot_depth = drill_spot_depth;
        Ok(&self.output)
    }

    fn warn_param_collisions(&self) {
        for name in self.interp.vars().keys() {
            if name.parse::<u32>().map_or(false, |n| n >= CELL_PARAM_BASE) {
                warn!(param = %name, "program assigns a parameter in the probe cell range");
            }
        }
    }
}

fn level_point(grid: &mut Grid, pos: Position, kind: FormulaKind) -> String {
    if !grid.contains(pos.x, pos.y) {
        warn!(x = pos.x, y = pos.y, "point outside the probing grid, using the nearest cell");
    }
    grid.formula(pos.x, pos.y, kind)
}

/// Splits a cutting move into grid-sized pieces.  Moves with a non-finite end
/// or needing more pieces than a grid has cells are rejected.
fn split_move(grid: &mut Grid, out: &mut Vec<Stmt>, from: (f64, f64), to: Position,
              cmd: Command) -> LevelResult<()> {
    let (cell_w, cell_h) = grid.cell_size();
    let finite = [from.0, from.1, to.x, to.y].iter().all(|v| v.is_finite());
    let cells = ((to.x - from.0).abs() / cell_w).max((to.y - from.1).abs() / cell_h);
    if !finite || cells > MAX_GRID_CELLS as f64 {
        return Err(LevelError::MoveTooLong { from_x: from.0, from_y: from.1, to_x: to.x, to_y: to.y });
    }
    bisect(grid, out, from, to, cmd);
    Ok(())
}

/// Bisects a move from `from` to `to` until both axis distances fit into a
/// cell, emitting the pieces in order.  Only the first piece keeps the feed.
fn bisect(grid: &mut Grid, out: &mut Vec<Stmt>, from: (f64, f64), to: Position, cmd: Command) {
    let (cell_w, cell_h) = grid.cell_size();
    let (dx, dy) = (to.x - from.0, to.y - from.1);
    if dx.abs() > cell_w || dy.abs() > cell_h {
        let mid = Position::new(from.0 + dx / 2.0, from.1 + dy / 2.0, to.z);
        let mut first = Command::at_xy(cmd.opcode, cmd.name.clone(), mid.x, mid.y);
        if let Some(feed) = cmd.arg(Arg::F) {
            first.set_arg(Arg::F, feed.clone());
        }
        let second = Command::at_xy(cmd.opcode, cmd.name, to.x, to.y);
        bisect(grid, out, from, mid, first);
        bisect(grid, out, (mid.x, mid.y), to, second);
    } else {
        let mut cmd = cmd;
        cmd.set_z_formula(level_point(grid, to, FormulaKind::Linear));
        out.push(Stmt::Command(cmd));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::Units;

    fn level(src: &str, grid_size: f64) -> (Interpreter, AutolevelConfig) {
        let interp = Interpreter::from_str("test", src).unwrap();
        let mut config = AutolevelConfig::for_program(interp.info());
        config.grid_size = grid_size;
        (interp, config)
    }

    fn commands(stmts: &[Stmt]) -> Vec<&Command> {
        stmts.iter().filter_map(|s| match s {
            Stmt::Command(c) => Some(c),
            _ => None,
        }).collect()
    }

    #[test]
    fn test_split_long_move() {
        let (interp, config) = level("G21\nG00 X0 Y0 Z5\nG01 X50 Y0 Z-1 F60\n", 10.0);
        let mut lev = Autoleveller::new(&interp, config);
        lev.run(None).unwrap();
        let out = commands(lev.output());
        // G21 and the rapid pass through, the cut becomes 8 pieces of 6.25
        assert_eq!(out.len(), 10);
        assert_eq!(out[0].to_string(), "G21");
        assert_eq!(out[1].to_string(), "G00 X0 Y0 Z5");
        let leaves = &out[2..];
        let mut x = 0.0;
        for (i, leaf) in leaves.iter().enumerate() {
            let to = leaf.arg_value(Arg::X).unwrap();
            assert!((to - x).abs() <= 10.0);
            assert_eq!(to, 6.25 * (i + 1) as f64);
            assert_eq!(leaf.has_arg(Arg::F), i == 0);
            assert!(leaf.z_formula().unwrap().ends_with(" + #3"));
            x = to;
        }
        assert_eq!(x, 50.0);
        assert_eq!(leaves[0].to_string().split(" Z[").next(), Some("G01 X6.25 Y0 F60"));
    }

    #[test]
    fn test_short_move_keeps_args() {
        let (interp, config) = level("G21\nG01 X1 Y1 Z-0.5 F30\n", 5.0);
        let mut lev = Autoleveller::new(&interp, config);
        lev.run(None).unwrap();
        let out = commands(lev.output());
        assert_eq!(out[1].arg_letters(), "XYZF");
        assert!(out[1].to_string().starts_with("G01 X1 Y1 Z["));
        assert!(out[1].to_string().ends_with(" + #3] F30"));
    }

    #[test]
    fn test_moves_above_surface_untouched() {
        let (interp, config) = level("G21\nG01 X0 Y0 Z-1\nG00 Z2\nG00 X40 Y40\n", 5.0);
        let mut lev = Autoleveller::new(&interp, config);
        lev.run(None).unwrap();
        let out = commands(lev.output());
        assert_eq!(out.len(), 4);
        assert_eq!(out[3].to_string(), "G00 X40 Y40");
        assert!(out[3].z_formula().is_none());
    }

    #[test]
    fn test_drill_spots() {
        let (interp, config) =
            level("G20\nG82 X0.5 Y0.5 Z-0.01 R0.1 P0.2\nG82 X1 Y1 Z-0.02\n", 0.2);
        assert_eq!(interp.units(), Units::Inches);
        let mut lev = Autoleveller::new(&interp, config);
        lev.run(None).unwrap();
        let out = commands(lev.output());
        assert!(lev.has_drill_spots());
        assert_eq!(lev.drill_spot_depth(), Some(-0.01));
        assert!(out[1].z_formula().unwrap().ends_with(" + #7"));
        assert!(out[1].to_string().contains(" R0.1 P0.2"));
    }

    #[test]
    fn test_no_drill_spots() {
        let (interp, config) = level("G21\nG01 X0 Y0 Z-1\n", 5.0);
        let mut lev = Autoleveller::new(&interp, config);
        lev.run(None).unwrap();
        assert!(!lev.has_drill_spots());
        assert_eq!(lev.drill_spot_depth(), None);
    }

    #[test]
    fn test_errors() {
        let interp = Interpreter::from_str("empty", "#1=2\n").unwrap();
        let mut lev = Autoleveller::new(&interp, AutolevelConfig::default());
        assert!(matches!(lev.run(None), Err(LevelError::Empty)));

        let (interp, mut config) = level("G21\n", 1.0);
        config.grid_size = 0.0;
        let mut lev = Autoleveller::new(&interp, config);
        assert!(matches!(lev.run(None), Err(LevelError::InvalidGridSize(_))));
    }

    #[test]
    fn test_infinite_coordinate() {
        let (interp, config) = level("G21\nG01 X0 Y0 Z-1\nG01 X[1/0] Y0 Z-1\n", 5.0);
        assert_eq!(interp.info().board_max_x, f64::INFINITY);
        let mut lev = Autoleveller::new(&interp, config);
        assert!(matches!(lev.run(None), Err(LevelError::NonFiniteBoard { .. })));
        assert!(lev.grid().is_none());
    }

    #[test]
    fn test_grid_too_large() {
        let (interp, config) = level("G21\nG01 X0 Y0 Z-1\nG01 X100 Y100\n", 1e-6);
        let mut lev = Autoleveller::new(&interp, config);
        assert!(matches!(lev.run(None), Err(LevelError::GridTooLarge { .. })));

        let (interp, config) = level("G21\nG01 X0 Y0 Z-1\nG01 X1000000000 Y0\n", 5.0);
        let mut lev = Autoleveller::new(&interp, config);
        assert!(matches!(lev.run(None), Err(LevelError::GridTooLarge { .. })));
    }

    #[test]
    fn test_cut_from_far_away() {
        // the rapid never touches the board, so only the cut widens it
        let (interp, config) = level("G21\nG00 X10000000000 Y0 Z1\nG01 X5 Y0 Z-1\n", 5.0);
        let mut lev = Autoleveller::new(&interp, config);
        assert!(matches!(lev.run(None), Err(LevelError::MoveTooLong { .. })));

        let (interp, config) = level("G21\nG00 X[1/0] Y0 Z1\nG01 X5 Y0 Z-1\n", 5.0);
        let mut lev = Autoleveller::new(&interp, config);
        assert!(matches!(lev.run(None), Err(LevelError::MoveTooLong { .. })));
    }

    #[test]
    fn test_program_params_in_cell_range() {
        let (interp, config) = level("#2000=5\nG21\nG01 X0 Y0 Z-1\nG01 X10\n", 5.0);
        assert_eq!(interp.var("2000"), Some(5.0));
        let mut lev = Autoleveller::new(&interp, config);
        lev.run(None).unwrap();
        // cell parameters still start at the base; the clash is only logged
        let grid = lev.grid().unwrap();
        assert_eq!(grid.param(0, 0), Some(CELL_PARAM_BASE));
        assert!(commands(lev.output())[1].z_formula().unwrap().contains("#2000"));
    }

    #[test]
    fn test_progress() {
        let (interp, config) = level("G21\nG00 X0 Y0\nG01 Z-1\nG01 X20\n", 5.0);
        let mut seen = vec![];
        let mut listener = |n: usize| seen.push(n);
        Autoleveller::new(&interp, config).run(Some(&mut listener)).unwrap();
        assert_eq!(seen, vec![1, 2, 3, 4]);
    }
}
