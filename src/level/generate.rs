// Copyright (c) 2019 Georg Brandl.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

use super::{Autoleveller, Grid, Progress, ProgressListener};
use crate::ast::Stmt;
use crate::error::{LevelError, LevelResult};
use crate::interp::{Units, PROBE_MARKER_ID};
use crate::util::fmt_num;

/// Decimal places for configuration constants and probe coordinates.
const FIGURES: usize = 6;

const ZERO_Z: &str = "\
M05\t\t\t(stop motor)
(MSG,PROBE: Position to within 5mm [~0.2 inches] of surface & resume)
M60\t\t\t(pause, wait for resume)
G49\t\t\t(clear any tool offsets)
G92.1\t\t\t(zero co-ordinate offsets)
G91\t\t\t(use relative coordinates)
";

const PROBE_START: &str = "\
G90\t\t\t(back to absolute)
G92 Z0\t\t\t(zero Z)
G00 Z[#1]\t\t(safe height)
(MSG,PROBE: Z-Axis calibrate complete, beginning probe)
";

const PROBE_DONE: &str = "\
G00 Z[#1]\t\t(safe height)
(MSG,PROBE: Probe complete, remove connections & resume)
M60\t\t\t(pause, wait for resume)
(MSG,PROBE: Beginning etch)
";

fn num(v: f64) -> String {
    fmt_num(v, FIGURES)
}

impl<'a> Autoleveller<'a> {
    /// Writes the levelled program.  The preamble goes right after the first
    /// unit selection, or before the first statement if there is none.
    pub fn generate<W: Write>(&self, mut out: W,
                              listener: Option<&mut dyn ProgressListener>) -> LevelResult<()> {
        let grid = self.grid.as_ref().ok_or(LevelError::NotSplit)?;
        let mut progress = Progress::new(listener);

        let has_units = self.output.iter().any(|stmt| is_unit_select(stmt));
        let mut preamble_done = false;
        if !has_units {
            self.write_preamble(&mut out, grid)?;
            preamble_done = true;
        }

        for stmt in &self.output {
            progress.check()?;
            writeln!(out, "{}", stmt)?;
            if !preamble_done && is_unit_select(stmt) {
                self.write_preamble(&mut out, grid)?;
                preamble_done = true;
            }
            progress.step();
        }
        out.flush()?;
        debug!(statements = self.output.len(), probes = grid.referenced_count(),
               "levelled program written");
        Ok(())
    }

    /// Writes the levelled program to a file, replacing it.
    pub fn write_to_path(&self, path: impl AsRef<Path>,
                         listener: Option<&mut dyn ProgressListener>) -> LevelResult<()> {
        let path = path.as_ref();
        let io_error = |source| LevelError::Io { path: path.display().to_string(), source };
        let file = File::create(path).map_err(io_error)?;
        let mut writer = BufWriter::new(file);
        self.generate(&mut writer, listener)?;
        writer.flush().map_err(io_error)
    }

    fn write_preamble<W: Write>(&self, out: &mut W, grid: &Grid) -> LevelResult<()> {
        let cfg = &self.config;
        let unit = match self.interp.units() {
            Units::Inches => "in",
            Units::Millimeters => "mm",
        };
        let (nx, ny) = grid.dimensions();

        writeln!(out)?;
        writeln!(out, "(Processed with pcbprobe)")?;
        writeln!(out)?;
        writeln!(out, "(Grid Cell Size = {}{} )", num(grid.size()), unit)?;
        writeln!(out, "(Grid Cell Count = {} x {} )", nx, ny)?;
        writeln!(out)?;
        writeln!(out, "#1={}\t\t\t(clearance height)", num(cfg.clearance_height))?;
        writeln!(out, "#2={}\t\t\t(traverse height)", num(cfg.traverse_height))?;
        writeln!(out, "#3={}\t\t\t(engraving depth)", num(cfg.engraving_depth))?;
        writeln!(out, "#4={}\t\t\t(probe maximum depth)", num(cfg.probe_max_depth))?;
        writeln!(out, "#5={}\t\t\t(traverse speed)", num(cfg.traverse_speed))?;
        writeln!(out, "#6={}\t\t\t(probe speed)", num(cfg.probe_speed))?;
        if let Some(depth) = self.drill_spot_depth() {
            writeln!(out, "#7={}\t\t\t(drill spot depth)", num(depth))?;
        }
        writeln!(out)?;

        out.write_all(ZERO_Z.as_bytes())?;
        writeln!(out, "G38.2 Z{} F[#6]\t(probe to find worksurface)", num(cfg.initial_probe_z))?;
        out.write_all(PROBE_START.as_bytes())?;
        writeln!(out)?;

        let id = PROBE_MARKER_ID;
        writeln!(out, "(probe routine)")?;
        writeln!(out, "(params: x y traverse_height probe_depth traverse_speed probe_speed)")?;
        writeln!(out, "O{} sub", id)?;
        writeln!(out, "G00 X[#1] Y[#2] Z[#3] F[#5]")?;
        writeln!(out, "G38.2 Z[#4] F[#6]")?;
        writeln!(out, "G00 Z[#3]")?;
        writeln!(out, "O{} endsub", id)?;
        writeln!(out)?;

        for cell in grid.probe_order() {
            writeln!(out, "(PROBE{})", cell)?;
            writeln!(out, "O{} call [{}] [{}] [#2] [#4] [#5] [#6]", id, num(cell.x), num(cell.y))?;
            writeln!(out, "#{} = #5063", cell.param)?;
        }

        writeln!(out)?;
        out.write_all(PROBE_DONE.as_bytes())?;
        writeln!(out)?;
        Ok(())
    }
}

fn is_unit_select(stmt: &Stmt) -> bool {
    matches!(stmt, Stmt::Command(cmd) if cmd.opcode.is_unit_select())
}
