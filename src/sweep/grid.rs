//! Sweep grid: the explicit, immutable parameter space of one run.
//!
//! The grid is constructed once (defaults, or loaded from a JSON file) and
//! passed through the orchestrator; nothing in the crate keeps grid state
//! in module-level statics. Enumerating the grid yields one
//! [`Configuration`] per (film thickness, creation temperature, sampling
//! temperature, field, statistical replica) tuple.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// External magnetic field as a 3-vector.
pub type Field = [f64; 3];

/// Errors that can occur while loading or validating a sweep grid.
#[derive(Debug, Error)]
pub enum GridError {
    #[error("failed to read grid file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse grid file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid grid: {0}")]
    Invalid(String),
}

/// The parameter tuple identifying one simulation setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Statistical replica index within the configuration.
    pub stat_id: u16,
    /// Film thickness in monolayers.
    pub n_layers: u8,
    /// Temperature at which the sample is created.
    pub t_creation: f64,
    /// Temperature at which transport is sampled.
    pub t_sample: f64,
    /// External field.
    pub field: Field,
}

impl Configuration {
    /// Relative directory for this configuration's files, shared by all of
    /// its statistical replicas.
    pub fn dir_name(&self) -> String {
        format!(
            "N={}/Tc={}/Ts={}/h={}",
            self.n_layers,
            self.t_creation,
            self.t_sample,
            field_label(&self.field)
        )
    }

    /// The paired configuration with the field forced to zero; GMR is
    /// computed against this baseline.
    pub fn baseline(&self) -> Configuration {
        Configuration {
            field: [0.0, 0.0, 0.0],
            ..self.clone()
        }
    }

    /// Whether this configuration is its own zero-field baseline.
    pub fn is_baseline(&self) -> bool {
        self.field.iter().all(|component| component.abs() < 1e-12)
    }
}

impl std::fmt::Display for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[stat_id={}; N={}; Tc={}; Ts={}; h={}]",
            self.stat_id,
            self.n_layers,
            self.t_creation,
            self.t_sample,
            field_label(&self.field)
        )
    }
}

fn field_label(field: &Field) -> String {
    format!("{},{},{}", field[0], field[1], field[2])
}

/// Immutable description of one sweep: lattice parameters, replica counts,
/// step counts, and the axes of the configuration grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepGrid {
    /// Linear lattice size.
    pub linear_size: u16,
    /// Interlayer exchange integral.
    pub j2: f64,
    /// Anisotropy per film thickness; entry `n - 1` serves thickness `n`.
    pub deltas: Vec<f64>,
    /// Statistical replicas per configuration (one scheduler job each).
    pub stat_replicas: u16,
    /// Transport-current replica streams written per job.
    pub current_replicas: u16,
    /// Monte Carlo steps for sample initialization.
    pub mcs_init: u64,
    /// Monte Carlo steps of transport observation.
    pub mcs_observation: u64,
    /// Film thickness axis.
    pub n_sizes: Vec<u8>,
    /// Creation temperature axis.
    pub t_creation: Vec<f64>,
    /// Sampling temperature axis.
    pub t_sample: Vec<f64>,
    /// Waiting-time thresholds in steps, sorted ascending.
    pub t_wait: Vec<u64>,
    /// Field axis; must include the zero field for GMR baselines.
    pub fields: Vec<Field>,
    /// Base seed mixed into every replica's RNG stream.
    pub seed: u64,
}

impl Default for SweepGrid {
    fn default() -> Self {
        Self {
            linear_size: 32,
            j2: -0.05,
            deltas: vec![0.5, 0.6, 0.636, 0.7, 0.734, 0.77, 0.816, 0.85, 0.882, 0.9],
            stat_replicas: 2,
            current_replicas: 3,
            mcs_init: 500,
            mcs_observation: 1_000,
            n_sizes: vec![3],
            t_creation: vec![0.67],
            t_sample: vec![0.95],
            t_wait: vec![100, 200],
            fields: vec![
                [0.0, 0.0, 0.0],
                [0.5, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [2.0, 0.0, 0.0],
            ],
            seed: 0x5eed_cafe,
        }
    }
}

impl SweepGrid {
    /// Loads and validates a grid from a JSON file; absent keys fall back
    /// to the defaults.
    pub fn from_path(path: &Path) -> Result<Self, GridError> {
        let content = fs::read_to_string(path)?;
        let grid: SweepGrid = serde_json::from_str(&content)?;
        grid.validate()?;
        Ok(grid)
    }

    /// Checks internal consistency of the axes.
    pub fn validate(&self) -> Result<(), GridError> {
        if self.stat_replicas == 0 || self.current_replicas == 0 {
            return Err(GridError::Invalid(
                "stat_replicas and current_replicas must be at least 1".to_string(),
            ));
        }
        if self.t_wait.is_empty() || !self.t_wait.is_sorted() {
            return Err(GridError::Invalid(
                "t_wait must be non-empty and sorted ascending".to_string(),
            ));
        }
        if self.n_sizes.is_empty() || self.t_creation.is_empty() || self.t_sample.is_empty() {
            return Err(GridError::Invalid(
                "every grid axis needs at least one value".to_string(),
            ));
        }
        for &n in &self.n_sizes {
            if n == 0 || usize::from(n) > self.deltas.len() {
                return Err(GridError::Invalid(format!(
                    "no anisotropy delta for thickness {n}"
                )));
            }
        }
        if self.fields.is_empty() {
            return Err(GridError::Invalid("field axis is empty".to_string()));
        }
        Ok(())
    }

    /// Anisotropy for a film of thickness `n`.
    pub fn delta(&self, n: u8) -> f64 {
        self.deltas[usize::from(n) - 1]
    }

    /// Total simulation steps per replica: observation plus the largest
    /// waiting-time offset.
    pub fn total_steps(&self) -> u64 {
        self.mcs_observation + self.t_wait.last().copied().unwrap_or(0)
    }

    /// Enumerates every (configuration, statistical replica) of the grid.
    pub fn configurations(&self) -> Vec<Configuration> {
        let mut result = Vec::with_capacity(
            self.n_sizes.len()
                * usize::from(self.stat_replicas)
                * self.t_creation.len()
                * self.t_sample.len()
                * self.fields.len(),
        );
        for &n_layers in &self.n_sizes {
            for stat_id in 0..self.stat_replicas {
                for &t_creation in &self.t_creation {
                    for &t_sample in &self.t_sample {
                        for &field in &self.fields {
                            result.push(Configuration {
                                stat_id,
                                n_layers,
                                t_creation,
                                t_sample,
                                field,
                            });
                        }
                    }
                }
            }
        }
        result
    }

    /// One representative (stat_id = 0) per configuration; the reduction
    /// and derived stages iterate these.
    pub fn representatives(&self) -> Vec<Configuration> {
        self.configurations()
            .into_iter()
            .filter(|config| config.stat_id == 0)
            .collect()
    }
}
