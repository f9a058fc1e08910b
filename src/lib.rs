//! mrsweep: magnetoresistance sweep runner.
//!
//! This library runs a grid of stochastic spin-transport simulations
//! across a pool of worker threads, reduces the per-replica time series
//! into mean/error observables, and derives magnetoresistance and spin
//! polarization series with propagated error.

// Core modules
pub mod cli;
pub mod output;
pub mod scheduler;
pub mod sim;
pub mod stats;
pub mod sweep;

// Re-export commonly used types
pub use scheduler::{JobError, JobHandle, PoolError, WorkerPool};
pub use stats::StatsError;
pub use sweep::{RunSummary, SweepGrid, SweepRunner};
