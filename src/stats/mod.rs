//! Streaming statistical reduction and derived quantities.
//!
//! This module turns the raw per-replica time series written by simulation
//! jobs into averaged observables:
//!
//! - **RecordStream**: lazy tab-delimited reader over one replica file
//! - **reduce**: merges N replica streams into a running mean/error series,
//!   tolerating streams of unequal length
//! - **derived**: giant-magnetoresistance ratios and spin polarization with
//!   propagated error, computed from pairs of reduced series
//!
//! Reduction runs strictly after the scheduler has drained the jobs that
//! produce the raw files; one reduction pass owns its input streams and its
//! single output stream exclusively.

pub mod derived;
pub mod reduce;
pub mod stream;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during reduction and derived-quantity stages.
///
/// Failures are fatal to one configuration only; the orchestrator continues
/// with the remaining configurations and reports in aggregate.
#[derive(Debug, Error)]
pub enum StatsError {
    /// Not even replica index 0 exists for this quantity.
    #[error("no replica streams for '{base}' in {}", dir.display())]
    NoSuchConfiguration { base: String, dir: PathBuf },

    /// The zero-field reduced series required for a GMR pair is absent;
    /// the baseline must be reduced first.
    #[error("baseline reduced series missing: {}", .0.display())]
    MissingBaseline(PathBuf),

    /// A stream ended before its header row.
    #[error("stream is empty (no header row): {}", .0.display())]
    MissingHeader(PathBuf),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub use derived::{compute_gmr, compute_polarization, Currents, GmrRow, PolarizationRow};
pub use reduce::{reduce_quantity, ReducedRecord};
pub use stream::RecordStream;
