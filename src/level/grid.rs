// Copyright (c) 2019 Georg Brandl.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! The probing grid.
//!
//! The probing rectangle starts half a cell below the board's minimum corner
//! and ends at the maximum corner.  Cell sizes are stretched so that the cell
//! count plus one half spans it exactly; the probe point of each cell is its
//! center, so the last centers land on the board's maximum edges.

use std::fmt;

use crate::ast::NUM_FIGURES;
use crate::error::{LevelError, LevelResult};
use crate::interp::ProgramInfo;
use crate::util::fmt_num;

/// First parameter number handed out to a probed cell.
pub const CELL_PARAM_BASE: u32 = 2000;

/// Upper bound on the number of cells in a grid.
pub const MAX_GRID_CELLS: usize = 1 << 20;

/// Which depth parameter a formula adds to the interpolated surface height.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormulaKind {
    /// Milling moves: engraving depth `#3`.
    Linear,
    /// Drill spots: drill spot depth `#7`.
    Point,
}

impl FormulaKind {
    pub fn depth_param(self) -> &'static str {
        match self {
            FormulaKind::Linear => "#3",
            FormulaKind::Point => "#7",
        }
    }
}

/// A grid cell with its interpolation weight.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Corner {
    pub cell: (usize, usize),
    pub weight: f64,
}

#[derive(Clone, Debug)]
pub struct Grid {
    size: f64,
    origin: (f64, f64),
    cell_w: f64,
    cell_h: f64,
    // highest cell index on each axis
    max_x: usize,
    max_y: usize,
    params: Vec<Option<u32>>,
    next_param: u32,
}

impl Grid {
    /// Lays a grid of nominal `size` over the board outline of `info`.
    pub fn new(info: &ProgramInfo, size: f64) -> LevelResult<Self> {
        if !(size.is_finite() && size > 0.0) {
            return Err(LevelError::InvalidGridSize(size));
        }
        let (min_x, min_y, max_x, max_y) = if info.has_board() {
            (info.board_min_x, info.board_min_y, info.board_max_x, info.board_max_y)
        } else {
            (0.0, 0.0, 0.0, 0.0)
        };
        if ![min_x, min_y, max_x, max_y].iter().all(|v| v.is_finite()) {
            return Err(LevelError::NonFiniteBoard { min_x, min_y, max_x, max_y });
        }
        let span_x = ((max_x - min_x) / size).ceil();
        let span_y = ((max_y - min_y) / size).ceil();
        if (span_x + 1.0) * (span_y + 1.0) > MAX_GRID_CELLS as f64 {
            return Err(LevelError::GridTooLarge {
                cells_x: span_x + 1.0,
                cells_y: span_y + 1.0,
                limit: MAX_GRID_CELLS,
            });
        }
        let cells_x = span_x as usize;
        let cells_y = span_y as usize;
        let origin = (min_x - size / 2.0, min_y - size / 2.0);
        let cell_w = (max_x - origin.0) / (cells_x as f64 + 0.5);
        let cell_h = (max_y - origin.1) / (cells_y as f64 + 0.5);
        Ok(Grid {
            size,
            origin,
            cell_w,
            cell_h,
            max_x: cells_x,
            max_y: cells_y,
            params: vec![None; (cells_x + 1) * (cells_y + 1)],
            next_param: CELL_PARAM_BASE,
        })
    }

    /// The nominal cell size the grid was built from.
    pub fn size(&self) -> f64 {
        self.size
    }

    /// The adjusted cell size on X and Y.
    pub fn cell_size(&self) -> (f64, f64) {
        (self.cell_w, self.cell_h)
    }

    pub fn origin(&self) -> (f64, f64) {
        self.origin
    }

    /// Number of cells on X and Y.
    pub fn dimensions(&self) -> (usize, usize) {
        (self.max_x + 1, self.max_y + 1)
    }

    /// True if the point lies on one of the grid's cells.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let end_x = self.origin.0 + self.cell_w * (self.max_x + 1) as f64;
        let end_y = self.origin.1 + self.cell_h * (self.max_y + 1) as f64;
        (self.origin.0..=end_x).contains(&x) && (self.origin.1..=end_y).contains(&y)
    }

    /// Physical center of a cell, where it is probed.
    pub fn cell_center(&self, gx: usize, gy: usize) -> (f64, f64) {
        (self.origin.0 + gx as f64 * self.cell_w + self.cell_w / 2.0,
         self.origin.1 + gy as f64 * self.cell_h + self.cell_h / 2.0)
    }

    fn index(&self, gx: usize, gy: usize) -> Option<usize> {
        if gx <= self.max_x && gy <= self.max_y {
            Some(gx + gy * (self.max_x + 1))
        } else {
            None
        }
    }

    /// The parameter assigned to a cell, if any formula referenced it.
    pub fn param(&self, gx: usize, gy: usize) -> Option<u32> {
        self.index(gx, gy).and_then(|i| self.params[i])
    }

    /// The parameter for a cell, allocating the next free one on first use.
    /// Out-of-range cells are clamped onto the grid edge.
    pub fn ensure_param(&mut self, gx: usize, gy: usize) -> u32 {
        let gx = gx.min(self.max_x);
        let gy = gy.min(self.max_y);
        let i = gx + gy * (self.max_x + 1);
        match self.params[i] {
            Some(param) => param,
            None => {
                let param = self.next_param;
                self.next_param += 1;
                self.params[i] = Some(param);
                param
            }
        }
    }

    /// Number of cells that have a parameter.
    pub fn referenced_count(&self) -> usize {
        (self.next_param - CELL_PARAM_BASE) as usize
    }

    // cell index and fractional offset along one axis
    fn locate(pos: f64, origin: f64, cell: f64, max: usize) -> (usize, f64) {
        let rel = (pos - origin) / cell;
        let index = rel.floor().max(0.0).min(max as f64);
        (index as usize, (rel - index).max(0.0).min(1.0))
    }

    // the closer neighbour, or the cell itself at the grid edge
    fn neighbour(index: usize, offset: f64, max: usize) -> usize {
        if offset > 0.5 {
            if index < max { index + 1 } else { index }
        } else if index > 0 {
            index - 1
        } else {
            index
        }
    }

    /// The four cells and bilinear weights used to interpolate the surface
    /// at `(x, y)`.  The weights always sum to one; near the grid edge some
    /// of the cells coincide.
    pub fn corners(&self, x: f64, y: f64) -> [Corner; 4] {
        let (cx, os_x) = Self::locate(x, self.origin.0, self.cell_w, self.max_x);
        let (cy, os_y) = Self::locate(y, self.origin.1, self.cell_h, self.max_y);
        let px = Self::neighbour(cx, os_x, self.max_x);
        let py = Self::neighbour(cy, os_y, self.max_y);

        // weight of the own cell: 1 at its center, 1/2 at its border
        let wx = 0.5 + if os_x > 0.5 { 1.0 - os_x } else { os_x };
        let wy = 0.5 + if os_y > 0.5 { 1.0 - os_y } else { os_y };

        [
            Corner { cell: (cx, cy), weight: wx * wy },
            Corner { cell: (px, cy), weight: (1.0 - wx) * wy },
            Corner { cell: (cx, py), weight: wx * (1.0 - wy) },
            Corner { cell: (px, py), weight: (1.0 - wx) * (1.0 - wy) },
        ]
    }

    /// Builds the Z expression for a point, allocating cell parameters as
    /// needed.
    pub fn formula(&mut self, x: f64, y: f64, kind: FormulaKind) -> String {
        let corners = self.corners(x, y);
        let mut out = String::new();
        for corner in &corners {
            let param = self.ensure_param(corner.cell.0, corner.cell.1);
            out.push_str(&format!("{:.3}*#{} + ", corner.weight, param));
        }
        out.push_str(kind.depth_param());
        out
    }

    /// Referenced cells in probing order: rows bottom to top, even rows
    /// left to right and odd rows right to left.
    pub fn probe_order(&self) -> ProbeOrder<'_> {
        ProbeOrder { grid: self, row: 0, step: 0 }
    }
}

/// A referenced cell due for probing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProbeCell {
    pub gx: usize,
    pub gy: usize,
    pub x: f64,
    pub y: f64,
    pub param: u32,
}

impl fmt::Display for ProbeCell {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{},{}] {} {} -> {}", self.gx, self.gy,
               fmt_num(self.x, NUM_FIGURES), fmt_num(self.y, NUM_FIGURES), self.param)
    }
}

pub struct ProbeOrder<'a> {
    grid: &'a Grid,
    row: usize,
    step: usize,
}

impl<'a> Iterator for ProbeOrder<'a> {
    type Item = ProbeCell;

    fn next(&mut self) -> Option<ProbeCell> {
        let grid = self.grid;
        while self.row <= grid.max_y {
            if self.step > grid.max_x {
                self.row += 1;
                self.step = 0;
                continue;
            }
            let gy = self.row;
            let gx = if gy % 2 == 1 { grid.max_x - self.step } else { self.step };
            self.step += 1;
            if let Some(param) = grid.param(gx, gy) {
                let (x, y) = grid.cell_center(gx, gy);
                return Some(ProbeCell { gx, gy, x, y, param });
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board(w: f64, h: f64) -> ProgramInfo {
        let mut info = ProgramInfo::default();
        info.widen(0.0, 0.0);
        info.widen(w, h);
        info
    }

    #[test]
    fn test_geometry() {
        let grid = Grid::new(&board(20.0, 7.0), 5.0).unwrap();
        assert_eq!(grid.dimensions(), (5, 3));
        assert_eq!(grid.origin(), (-2.5, -2.5));
        assert_eq!(grid.cell_size().0, 5.0);
        assert!((grid.cell_size().1 - 9.5 / 2.5).abs() < 1e-12);
        // first center on the minimum edge, last one on the maximum edge
        assert_eq!(grid.cell_center(0, 0), (0.0, grid.origin().1 + grid.cell_size().1 / 2.0));
        let (x, y) = grid.cell_center(4, 2);
        assert!((x - 20.0).abs() < 1e-12 && (y - 7.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_size() {
        for size in &[0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(Grid::new(&board(1.0, 1.0), *size),
                             Err(LevelError::InvalidGridSize(_))));
        }
    }

    #[test]
    fn test_bounds() {
        assert!(matches!(Grid::new(&board(f64::INFINITY, 1.0), 1.0),
                         Err(LevelError::NonFiniteBoard { .. })));

        let grid = Grid::new(&board(1023.0, 1023.0), 1.0).unwrap();
        assert_eq!(grid.dimensions(), (1024, 1024));
        match Grid::new(&board(1024.0, 1023.0), 1.0) {
            Err(LevelError::GridTooLarge { cells_x, cells_y, limit }) => {
                assert_eq!((cells_x, cells_y, limit), (1025.0, 1024.0, MAX_GRID_CELLS));
            }
            other => panic!("unexpected {:?}", other.map(|g| g.dimensions())),
        }
    }

    #[test]
    fn test_weights_sum_to_one() {
        let grid = Grid::new(&board(23.0, 11.0), 4.0).unwrap();
        let mut x = -3.0;
        while x < 27.0 {
            let mut y = -3.0;
            while y < 15.0 {
                let sum: f64 = grid.corners(x, y).iter().map(|c| c.weight).sum();
                assert!((sum - 1.0).abs() < 1e-12, "at {} {}", x, y);
                y += 0.7;
            }
            x += 0.9;
        }
    }

    #[test]
    fn test_cell_center_has_full_weight() {
        let grid = Grid::new(&board(20.0, 20.0), 5.0).unwrap();
        let (x, y) = grid.cell_center(2, 3);
        let corners = grid.corners(x, y);
        assert_eq!(corners[0].cell, (2, 3));
        assert!((corners[0].weight - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_edge_neighbour_falls_back() {
        let grid = Grid::new(&board(10.0, 10.0), 5.0).unwrap();
        // just below the first center: the left neighbour would be -1
        let corners = grid.corners(-0.5, -0.5);
        assert!(corners.iter().all(|c| c.cell == (0, 0)));
        // far outside is clamped onto the grid
        let corners = grid.corners(100.0, 100.0);
        assert!(corners.iter().all(|c| c.cell == (2, 2)));
    }

    #[test]
    fn test_param_allocation() {
        let mut grid = Grid::new(&board(10.0, 10.0), 5.0).unwrap();
        assert_eq!(grid.ensure_param(1, 1), CELL_PARAM_BASE);
        assert_eq!(grid.ensure_param(0, 2), CELL_PARAM_BASE + 1);
        assert_eq!(grid.ensure_param(1, 1), CELL_PARAM_BASE);
        assert_eq!(grid.param(0, 2), Some(CELL_PARAM_BASE + 1));
        assert_eq!(grid.param(2, 2), None);
        assert_eq!(grid.param(3, 0), None);
        assert_eq!(grid.referenced_count(), 2);
    }

    #[test]
    fn test_formula_text() {
        let mut grid = Grid::new(&board(10.0, 10.0), 5.0).unwrap();
        let (x, y) = grid.cell_center(1, 1);
        assert_eq!(grid.formula(x, y, FormulaKind::Linear),
                   "1.000*#2000 + 0.000*#2001 + 0.000*#2002 + 0.000*#2003 + #3");
        assert_eq!(grid.formula(x + 1.25, y, FormulaKind::Point),
                   "0.750*#2000 + 0.250*#2004 + 0.000*#2002 + 0.000*#2005 + #7");
    }

    #[test]
    fn test_probe_order_is_serpentine() {
        let mut grid = Grid::new(&board(10.0, 10.0), 5.0).unwrap();
        for gy in 0..3 {
            for gx in 0..3 {
                grid.ensure_param(gx, gy);
            }
        }
        let order: Vec<_> = grid.probe_order().map(|c| (c.gx, c.gy)).collect();
        assert_eq!(order, vec![(0, 0), (1, 0), (2, 0),
                               (2, 1), (1, 1), (0, 1),
                               (0, 2), (1, 2), (2, 2)]);
    }

    #[test]
    fn test_probe_order_skips_unreferenced() {
        let mut grid = Grid::new(&board(10.0, 10.0), 5.0).unwrap();
        grid.ensure_param(0, 1);
        grid.ensure_param(2, 1);
        let order: Vec<_> = grid.probe_order().map(|c| c.param).collect();
        assert_eq!(order, vec![CELL_PARAM_BASE + 1, CELL_PARAM_BASE]);
    }
}
