// Copyright (c) 2019 Georg Brandl.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

use std::io::Write;

use pcbprobe::ast::{Arg, Stmt};
use pcbprobe::error::LoadError;
use pcbprobe::interp::{Interpreter, Position, Units};

const PROGRAM: &str = "(isolation routing)
G20
#10=0.01
G00 Z0.1
G00 X0.2 Y0.2
G01 Z-[#10] F5
G01 X1.2
G01 Y0.8
G00 Z0.1
G82 X1.5 Y1.5 Z-0.03 R0.05 P0.1
M05
";

#[test]
fn test_load() {
    let interp = Interpreter::from_str("board.ngc", PROGRAM).unwrap();
    assert_eq!(interp.filename(), "board.ngc");
    assert_eq!(interp.units(), Units::Inches);
    assert_eq!(interp.statement_count(), 9);
    assert!(interp.statements().iter().all(|s| matches!(s, Stmt::Command(_))));

    let info = interp.info();
    assert_eq!(info.mill_depth, Some(-0.01));
    assert_eq!((info.board_min_x, info.board_max_x), (0.2, 1.5));
    assert_eq!((info.board_min_y, info.board_max_y), (0.2, 1.5));
    assert_eq!(info.pos, Position::new(1.5, 1.5, -0.03));
}

#[test]
fn test_probe_markers() {
    let src = "G21
O100 call [0] [0] [0.5]
O100 call [10]
O100 call [10] [20]
O100 call
O200 call [5] [5]
";
    let interp = Interpreter::from_str("probe.ngc", src).unwrap();
    assert_eq!(interp.probe_points(), &[Position::new(0.0, 0.0, 0.0),
                                        Position::new(10.0, 20.0, 0.0)]);
    // calls are not retained
    assert_eq!(interp.statement_count(), 1);
    let info = interp.info();
    assert_eq!((info.board_max_x, info.board_max_y), (10.0, 20.0));
}

#[test]
fn test_replay_walks_positions() {
    let mut interp = Interpreter::from_str("board.ngc", PROGRAM).unwrap();
    let mut cuts = vec![];
    interp.init();
    while interp.advance() {
        if let Some(cmd) = interp.current_command() {
            if cmd.is_motion() && interp.current_pos().z < 0.0 {
                cuts.push((cmd.arg_letters(), interp.current_pos()));
            }
        }
    }
    assert_eq!(cuts, vec![
        ("ZF".to_string(), Position::new(0.2, 0.2, -0.01)),
        ("X".to_string(), Position::new(1.2, 0.2, -0.01)),
        ("Y".to_string(), Position::new(1.2, 0.8, -0.01)),
    ]);

    // the cursor and the replay iterator agree, and replay can start over
    let replayed: Vec<_> = interp.replay().map(|(_, pos)| pos).collect();
    assert_eq!(replayed.len(), interp.statement_count());
    assert_eq!(replayed.last(), Some(&interp.current_pos()));
    assert_eq!(interp.replay().map(|(_, pos)| pos).collect::<Vec<_>>(), replayed);
}

#[test]
fn test_replay_uses_values_resolved_at_load() {
    let src = "#1=2\nG01 X[#1 * 3] Y0 Z-1\n#1=100\n";
    let interp = Interpreter::from_str("t.ngc", src).unwrap();
    assert_eq!(interp.var("1"), Some(100.0));
    let (stmt, pos) = interp.replay().next().unwrap();
    assert_eq!(pos.x, 6.0);
    if let Stmt::Command(cmd) = stmt {
        assert_eq!(cmd.arg_value(Arg::X), Some(6.0));
        assert_eq!(cmd.to_string(), "G01 X[#1 * 3] Y0 Z-1");
    }
}

#[test]
fn test_open_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(PROGRAM.as_bytes()).unwrap();
    let interp = Interpreter::open(file.path()).unwrap();
    assert_eq!(interp.statement_count(), 9);
}

#[test]
fn test_load_errors() {
    match Interpreter::from_str("bad.ngc", "G21\nG01 X1\nG01 Y\n") {
        Err(LoadError::Syntax(diag)) => {
            assert!(diag.to_string().contains("Error in command at line 3, expected NUMBER or '['"));
        }
        _ => panic!("expected a syntax error"),
    }
    let dir = tempfile::tempdir().unwrap();
    match Interpreter::open(dir.path().join("missing.ngc")) {
        Err(err @ LoadError::Io { .. }) => assert!(err.diagnostics().is_none()),
        _ => panic!("expected an I/O error"),
    }
}
