//! End-to-end sweep orchestration.
//!
//! Enumerates the configuration grid, submits one simulation job per
//! (configuration, statistical replica) to the worker pool, drains the
//! pool with `wait_any`, and then runs the reduction and derived stages
//! strictly after every job has completed. Reduction or derived failures
//! are fatal to their configuration only; the batch continues and reports
//! in aggregate.
//!
//! # Run directory layout
//!
//! ```text
//! <results root>/data_<timestamp>/
//! ├── grid.json                    grid actually used (reloaded by `reduce`)
//! ├── info.txt
//! ├── raw/<config dirs>/           per-replica streams from the jobs
//! └── processed/<config dirs>/     reduced and derived series
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::scheduler::{wait_any, JobHandle, PoolError, WorkerPool};
use crate::sim::{run_replica, SimError};
use crate::stats::{derived, reduce, StatsError};
use crate::sweep::grid::{Configuration, SweepGrid};

/// Subdirectory of a run holding the raw per-replica streams.
pub const RAW_DIR: &str = "raw";
/// Subdirectory of a run holding reduced and derived series.
pub const PROCESSED_DIR: &str = "processed";
/// Quantities reduced for every configuration.
const QUANTITIES: [&str; 4] = ["m", "j", "Nup", "Ndown"];
/// Retry cadence while draining outstanding job handles.
const DRAIN_INTERVAL: Duration = Duration::from_secs(3);

/// Errors that abort a whole sweep (as opposed to one configuration).
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("scheduler error: {0}")]
    Pool(#[from] PoolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize grid metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// Aggregate outcome of one sweep, reported instead of aborting on
/// per-configuration failures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub jobs_completed: usize,
    pub jobs_failed: usize,
    pub quantities_reduced: usize,
    pub reduce_failures: usize,
    pub gmr_written: usize,
    pub gmr_failures: usize,
    pub polarization_written: usize,
    pub polarization_failures: usize,
}

impl RunSummary {
    /// Whether every stage finished without a single failure.
    pub fn is_clean(&self) -> bool {
        self.jobs_failed == 0
            && self.reduce_failures == 0
            && self.gmr_failures == 0
            && self.polarization_failures == 0
    }
}

/// Drives one full sweep: simulate, reduce, derive.
pub struct SweepRunner {
    grid: Arc<SweepGrid>,
    workers: usize,
}

impl SweepRunner {
    pub fn new(grid: SweepGrid, workers: usize) -> Self {
        Self {
            grid: Arc::new(grid),
            workers,
        }
    }

    /// Runs the sweep under `results_root`, returning the aggregate
    /// summary and the created run directory.
    pub fn run(&self, results_root: &Path) -> Result<(RunSummary, PathBuf), SweepError> {
        let run_dir = create_run_dir(results_root)?;
        self.write_metadata(&run_dir)?;
        info!(run_dir = %run_dir.display(), "sweep started");

        let mut summary = RunSummary::default();
        self.execute_jobs(&run_dir.join(RAW_DIR), &mut summary)?;
        reduce_run(&run_dir, &self.grid, &mut summary)?;

        info!(?summary, "sweep finished");
        Ok((summary, run_dir))
    }

    /// Submits every (configuration, replica) job and drains the pool.
    fn execute_jobs(&self, raw_dir: &Path, summary: &mut RunSummary) -> Result<(), SweepError> {
        let configs = self.grid.configurations();
        let mut pool = WorkerPool::new(self.workers)?;
        let mut handles: Vec<JobHandle<Result<Configuration, SimError>>> =
            Vec::with_capacity(configs.len());

        for config in configs {
            let config_dir = raw_dir.join(config.dir_name());
            fs::create_dir_all(&config_dir)?;
            let grid = Arc::clone(&self.grid);
            handles.push(pool.submit(move || {
                run_replica(&grid, &config, &config_dir).map(|()| config)
            })?);
        }

        pool.start()?;
        info!(jobs = handles.len(), workers = self.workers, "jobs submitted");

        while !handles.is_empty() {
            match wait_any(&mut handles, DRAIN_INTERVAL) {
                Some((_, Ok(Ok(config)))) => {
                    info!(%config, "job done");
                    summary.jobs_completed += 1;
                }
                Some((id, Ok(Err(sim_err)))) => {
                    error!(job_id = %id, error = %sim_err, "simulation job failed");
                    summary.jobs_failed += 1;
                }
                Some((id, Err(job_err))) => {
                    error!(job_id = %id, error = %job_err, "job did not run to completion");
                    summary.jobs_failed += 1;
                }
                None => {
                    info!(outstanding = handles.len(), "waiting for jobs");
                }
            }
        }

        pool.shutdown();
        Ok(())
    }

    fn write_metadata(&self, run_dir: &Path) -> Result<(), SweepError> {
        let grid_json = serde_json::to_string_pretty(self.grid.as_ref())?;
        fs::write(run_dir.join("grid.json"), &grid_json)?;
        fs::write(
            run_dir.join("info.txt"),
            format!("{}\t{}\n{}\n", run_dir.display(), RAW_DIR, grid_json),
        )?;
        Ok(())
    }
}

/// Reduction plus derived stages over an existing run directory.
///
/// Usable on its own (the `reduce` CLI command) after the raw stage of a
/// previous run; assumes all simulation jobs for the run have drained.
pub fn reduce_run(
    run_dir: &Path,
    grid: &SweepGrid,
    summary: &mut RunSummary,
) -> Result<(), SweepError> {
    let raw_root = run_dir.join(RAW_DIR);
    let processed_root = run_dir.join(PROCESSED_DIR);
    let representatives = grid.representatives();

    info!(configs = representatives.len(), "reduction stage started");
    for config in &representatives {
        let raw_dir = raw_root.join(config.dir_name());
        let out_dir = processed_root.join(config.dir_name());
        fs::create_dir_all(&out_dir)?;

        for quantity in QUANTITIES {
            match reduce::reduce_quantity(&raw_dir, &out_dir, quantity) {
                Ok(_) => summary.quantities_reduced += 1,
                Err(err) => {
                    error!(%config, quantity, error = %err, "reduction failed");
                    summary.reduce_failures += 1;
                }
            }
        }
    }

    info!("derived stage started");
    for config in &representatives {
        let config_dir = processed_root.join(config.dir_name());

        if !config.is_baseline() {
            let baseline_dir = processed_root.join(config.baseline().dir_name());
            match derived::write_gmr(&config_dir, &baseline_dir, &grid.t_wait) {
                Ok(_) => summary.gmr_written += 1,
                Err(err @ StatsError::MissingBaseline(_)) => {
                    // Ordering dependency: the baseline was not reduced.
                    error!(%config, error = %err, "GMR skipped");
                    summary.gmr_failures += 1;
                }
                Err(err) => {
                    error!(%config, error = %err, "GMR failed");
                    summary.gmr_failures += 1;
                }
            }
        }

        match derived::write_polarization(&config_dir) {
            Ok(_) => summary.polarization_written += 1,
            Err(err) => {
                error!(%config, error = %err, "polarization failed");
                summary.polarization_failures += 1;
            }
        }
    }

    if summary.reduce_failures + summary.gmr_failures + summary.polarization_failures > 0 {
        warn!(
            reduce_failures = summary.reduce_failures,
            gmr_failures = summary.gmr_failures,
            polarization_failures = summary.polarization_failures,
            "some configurations failed; see log for details"
        );
    }
    Ok(())
}

fn create_run_dir(results_root: &Path) -> Result<PathBuf, SweepError> {
    let stamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
    let run_dir = results_root.join(format!("data_{stamp}"));
    fs::create_dir_all(run_dir.join(RAW_DIR))?;
    Ok(run_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_grid() -> SweepGrid {
        SweepGrid {
            stat_replicas: 2,
            current_replicas: 2,
            mcs_init: 5,
            mcs_observation: 10,
            t_wait: vec![2, 4],
            n_sizes: vec![3],
            fields: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
            ..SweepGrid::default()
        }
    }

    #[test]
    fn test_full_sweep_produces_reduced_and_derived_files() {
        let root = tempfile::tempdir().expect("tempdir");
        let runner = SweepRunner::new(tiny_grid(), 2);

        let (summary, run_dir) = runner.run(root.path()).expect("sweep runs");
        assert!(summary.is_clean(), "unexpected failures: {summary:?}");
        // 1 thickness x 2 replicas x 1 Tc x 1 Ts x 2 fields.
        assert_eq!(summary.jobs_completed, 4);
        // 2 representative configs x 4 quantities.
        assert_eq!(summary.quantities_reduced, 8);
        assert_eq!(summary.gmr_written, 1);
        assert_eq!(summary.polarization_written, 2);

        let processed = run_dir.join(PROCESSED_DIR).join("N=3/Tc=0.67/Ts=0.95");
        for quantity in QUANTITIES {
            assert!(processed.join(format!("h=0,0,0/{quantity}.txt")).exists());
            assert!(processed.join(format!("h=1,0,0/{quantity}.txt")).exists());
        }
        assert!(processed.join("h=1,0,0/GMR_tw=2.txt").exists());
        assert!(processed.join("h=1,0,0/GMR_tw=4.txt").exists());
        assert!(processed.join("h=0,0,0/P.txt").exists());
        assert!(run_dir.join("grid.json").exists());
        assert!(run_dir.join("info.txt").exists());
    }

    #[test]
    fn test_reduce_run_counts_missing_configurations_without_aborting() {
        let root = tempfile::tempdir().expect("tempdir");
        let run_dir = root.path().join("data_manual");
        fs::create_dir_all(run_dir.join(RAW_DIR)).expect("mkdir");

        let grid = tiny_grid();
        let mut summary = RunSummary::default();
        // No raw files at all: every quantity fails, the call still succeeds.
        reduce_run(&run_dir, &grid, &mut summary).expect("batch continues");

        assert_eq!(summary.quantities_reduced, 0);
        assert_eq!(summary.reduce_failures, 8);
        assert_eq!(summary.gmr_failures, 1);
        assert_eq!(summary.polarization_failures, 2);
    }
}
