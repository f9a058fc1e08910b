//! Sweep definition and orchestration.
//!
//! `grid` describes the parameter space of one run; `orchestrator` drives
//! the simulate → reduce → derive pipeline over it.

pub mod grid;
pub mod orchestrator;

pub use grid::{Configuration, Field, GridError, SweepGrid};
pub use orchestrator::{reduce_run, RunSummary, SweepError, SweepRunner, PROCESSED_DIR, RAW_DIR};
