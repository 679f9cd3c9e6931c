use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use pcbprobe::interp::Interpreter;
use pcbprobe::level::{AutolevelConfig, Autoleveller, ConfigOverrides};

/// Rewrite a PCB milling program to follow a probed board surface.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Input G-code program
    input: PathBuf,
    /// Output file (default: <input>.probe.ngc)
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// JSON file with autolevelling parameters
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Probing grid cell size
    #[arg(long)]
    grid_size: Option<f64>,
    /// Engraving depth below the surface
    #[arg(long, allow_hyphen_values = true)]
    engraving_depth: Option<f64>,
    /// Height for moves between probe points
    #[arg(long, allow_hyphen_values = true)]
    traverse_height: Option<f64>,
    /// Deepest Z a probe may reach
    #[arg(long, allow_hyphen_values = true)]
    probe_max_depth: Option<f64>,
    #[arg(long)]
    traverse_speed: Option<f64>,
    #[arg(long)]
    probe_speed: Option<f64>,
    /// Print debug output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            grid_size: self.grid_size,
            engraving_depth: self.engraving_depth,
            traverse_height: self.traverse_height,
            probe_max_depth: self.probe_max_depth,
            traverse_speed: self.traverse_speed,
            probe_speed: self.probe_speed,
            ..Default::default()
        }
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let env_filter = EnvFilter::from_default_env().add_directive(level.into());
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn read_overrides(path: &Path) -> Result<ConfigOverrides> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse config {}", path.display()))
}

fn default_output(input: &Path) -> PathBuf {
    input.with_extension("probe.ngc")
}

fn run(cli: Cli) -> Result<()> {
    let interp = match Interpreter::open(&cli.input) {
        Ok(interp) => interp,
        Err(e) => {
            // syntax errors carry one diagnostic per line
            if let Some(diag) = e.diagnostics() {
                eprint!("{}", diag);
            }
            return Err(e).with_context(|| format!("Failed to load {}", cli.input.display()));
        }
    };
    let info = interp.info();
    info!("loaded {} statements ({}), board {:.3} x {:.3}",
          interp.statement_count(), info.units, info.board_width(), info.board_height());

    let mut config = AutolevelConfig::for_program(info);
    let mut overrides = ConfigOverrides::default();
    if let Some(path) = &cli.config {
        overrides = read_overrides(path)?;
    }
    config.apply(&overrides.merge(cli.overrides()));

    let mut leveller = Autoleveller::new(&interp, config);
    leveller.run(None).context("Failed to split program")?;

    let output = cli.output.clone().unwrap_or_else(|| default_output(&cli.input));
    leveller.write_to_path(&output, None)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    let cells = leveller.grid().map_or(0, |grid| grid.referenced_count());
    info!("wrote {} with {} probe points", output.display(), cells);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    run(cli)
}
