// Copyright (c) 2019 Georg Brandl.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! Autolevelling for PCB isolation milling programs written in the
//! [LinuxCNC] dialect of G-Code.
//!
//! Copper boards are never perfectly flat, and isolation cuts are only a
//! fraction of a millimeter deep.  This library rewrites a milling program so
//! that the machine first probes the board surface on a grid, and every cut
//! then follows the probed surface: each Z coordinate becomes a bilinear
//! interpolation of the nearest probe results plus the engraving depth.
//!
//! [LinuxCNC]: http://linuxcnc.org/docs/html/gcode/overview.html
//!
//! ## Basic usage
//!
//! Load a program with `pcbprobe::interp::Interpreter`, then hand it to
//! `pcbprobe::level::Autoleveller` to split the cuts and write the levelled
//! program (the same as the "pcbprobe" binary without its options):
//!
//! ```rust,no_run
//! use pcbprobe::interp::Interpreter;
//! use pcbprobe::level::{AutolevelConfig, Autoleveller};
//!
//! fn main() -> anyhow::Result<()> {
//!     let interp = Interpreter::open("board.ngc")?;
//!     let config = AutolevelConfig::for_program(interp.info());
//!     let mut leveller = Autoleveller::new(&interp, config);
//!     leveller.run(None)?;
//!     leveller.write_to_path("board.probe.ngc", None)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Supported dialect
//!
//! Only the subset that PCB milling tools produce is understood: G and M
//! words, the argument letters X Y Z F P R S T, numbered parameters with
//! arithmetic expressions, and `O<n> sub/endsub/call`.  Subroutine bodies
//! are skipped; calls of `O100` record previously probed points.

pub mod ast;
pub mod error;
pub mod interp;
pub mod lexer;
pub mod level;
pub mod parse;

// internal helpers
pub(crate) mod util;
