//! CLI command definitions for mrsweep.
//!
//! Two commands cover the whole pipeline: `run` executes simulation,
//! reduction, and derived stages in order; `reduce` repeats the latter two
//! over an existing run directory (useful after editing waiting times or
//! when raw data was produced elsewhere).

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Parser;
use tracing::info;

use crate::sweep::{reduce_run, RunSummary, SweepGrid, SweepRunner};

/// Default root directory for run outputs.
const DEFAULT_RESULTS_ROOT: &str = "./results";

/// Magnetoresistance sweep runner: parallel replica simulations with
/// streaming statistical reduction.
#[derive(Parser)]
#[command(name = "mrsweep")]
#[command(about = "Run magnetoresistance parameter sweeps and reduce their observables")]
#[command(version)]
#[command(
    long_about = "mrsweep runs a grid of stochastic spin-transport simulations across a pool \
of worker threads, reduces the per-replica time series into mean/error observables, and \
derives magnetoresistance (GMR) and spin polarization with propagated error.\n\nExample \
usage:\n  mrsweep run --workers 8 --results ./results\n  mrsweep reduce ./results/data_2026-08-29_12-00-00"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the full sweep: simulate every replica, then reduce and derive.
    Run(RunArgs),

    /// Re-run reduction and derived stages over an existing run directory.
    Reduce(ReduceArgs),
}

/// Arguments for `mrsweep run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Number of parallel worker threads.
    #[arg(short, long, default_value = "2")]
    pub workers: usize,

    /// Root directory for run outputs.
    #[arg(short, long, default_value = DEFAULT_RESULTS_ROOT)]
    pub results: PathBuf,

    /// JSON file overriding the default sweep grid.
    #[arg(short, long)]
    pub grid: Option<PathBuf>,
}

/// Arguments for `mrsweep reduce`.
#[derive(Parser, Debug)]
pub struct ReduceArgs {
    /// Existing run directory (containing `raw/` and `grid.json`).
    pub run_dir: PathBuf,

    /// JSON grid file to use instead of the run's own `grid.json`.
    #[arg(short, long)]
    pub grid: Option<PathBuf>,
}

/// Parses CLI arguments from the process environment.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Executes the parsed CLI command.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_sweep(args),
        Commands::Reduce(args) => run_reduce(args),
    }
}

fn run_sweep(args: RunArgs) -> anyhow::Result<()> {
    if args.workers == 0 {
        bail!("at least one worker thread is required");
    }
    let grid = load_grid(args.grid.as_deref())?;
    let runner = SweepRunner::new(grid, args.workers);

    let (summary, run_dir) = runner
        .run(&args.results)
        .context("sweep execution failed")?;
    report(&summary, &run_dir);
    Ok(())
}

fn run_reduce(args: ReduceArgs) -> anyhow::Result<()> {
    let grid_path = args
        .grid
        .clone()
        .unwrap_or_else(|| args.run_dir.join("grid.json"));
    let grid = SweepGrid::from_path(&grid_path)
        .with_context(|| format!("failed to load grid from {}", grid_path.display()))?;

    let mut summary = RunSummary::default();
    reduce_run(&args.run_dir, &grid, &mut summary)
        .context("reduction over existing run failed")?;
    report(&summary, &args.run_dir);
    Ok(())
}

fn load_grid(path: Option<&Path>) -> anyhow::Result<SweepGrid> {
    match path {
        Some(path) => SweepGrid::from_path(path)
            .with_context(|| format!("failed to load grid from {}", path.display())),
        None => Ok(SweepGrid::default()),
    }
}

fn report(summary: &RunSummary, run_dir: &Path) {
    info!(
        run_dir = %run_dir.display(),
        jobs_completed = summary.jobs_completed,
        jobs_failed = summary.jobs_failed,
        quantities_reduced = summary.quantities_reduced,
        reduce_failures = summary.reduce_failures,
        gmr_written = summary.gmr_written,
        gmr_failures = summary.gmr_failures,
        polarization_written = summary.polarization_written,
        polarization_failures = summary.polarization_failures,
        "done"
    );
    if !summary.is_clean() {
        tracing::warn!("run completed with failures; outputs may be partial");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_run_command() {
        let cli = Cli::try_parse_from([
            "mrsweep", "run", "--workers", "8", "--results", "/tmp/out",
        ])
        .expect("valid invocation");

        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.workers, 8);
                assert_eq!(args.results, PathBuf::from("/tmp/out"));
                assert!(args.grid.is_none());
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_cli_parses_reduce_command_with_grid_override() {
        let cli = Cli::try_parse_from([
            "mrsweep",
            "reduce",
            "/data/run",
            "--grid",
            "/data/grid.json",
        ])
        .expect("valid invocation");

        match cli.command {
            Commands::Reduce(args) => {
                assert_eq!(args.run_dir, PathBuf::from("/data/run"));
                assert_eq!(args.grid, Some(PathBuf::from("/data/grid.json")));
            }
            _ => panic!("expected reduce command"),
        }
    }

    #[test]
    fn test_log_level_defaults_to_info() {
        let cli = Cli::try_parse_from(["mrsweep", "run"]).expect("valid invocation");
        assert_eq!(cli.log_level, "info");
    }
}
