use std::env;
use std::process::exit;
use pcbprobe::interp::Interpreter;

fn main() {
    let filename = match env::args().nth(1) {
        Some(name) => name,
        None => {
            eprintln!("usage: pcbprobe-parse <file>");
            exit(2);
        }
    };

    match Interpreter::open(&filename) {
        Err(e) => {
            eprintln!("Parse error: {}", e);
            exit(1);
        }
        Ok(interp) => {
            for stmt in interp.statements() {
                println!("{}", stmt);
            }
            let info = interp.info();
            eprintln!("({} statements, units {}, {} probe points)",
                      interp.statement_count(), info.units, interp.probe_points().len());
            if info.has_board() {
                eprintln!("(board {} x {}, mill depth {:?})",
                          info.board_width(), info.board_height(), info.mill_depth);
            }
        }
    }
}
