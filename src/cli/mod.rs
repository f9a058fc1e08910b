//! Command-line interface for mrsweep.
//!
//! Provides commands for running a full sweep and for re-running the
//! reduction and derived stages over an existing run directory.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli};
