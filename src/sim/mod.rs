//! Simulation job: a simplified stochastic two-layer spin-transport model.
//!
//! This is the opaque payload the scheduler executes — one job per
//! (configuration, statistical replica). It is a deliberately reduced
//! stand-in for a full lattice Monte Carlo kernel: two film magnetizations
//! evolve under the external field, an antiferromagnetic interlayer
//! coupling, and thermal noise, and the spin-channel transport currents
//! and electron densities derived from them are streamed to the raw output
//! files the reduction stage consumes.
//!
//! Everything is deterministic given (grid, configuration): the RNG is a
//! seeded ChaCha stream per replica, with an independent stream per
//! transport-current channel.

use std::io;
use std::path::Path;

use rand::{RngExt, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use thiserror::Error;
use tracing::{debug, info};

use crate::output::TableWriter;
use crate::sweep::grid::{Configuration, SweepGrid};

/// Relaxation rate toward the effective field per step.
const RELAX_RATE: f64 = 0.1;
/// Scale of the thermal noise relative to sqrt(T).
const NOISE_SCALE: f64 = 0.05;
/// Shot-noise scale on the per-channel currents.
const CURRENT_NOISE: f64 = 0.01;

/// Errors raised by a simulation job.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("I/O error while writing raw output: {0}")]
    Io(#[from] io::Error),
}

/// One in-memory sample: two coupled film magnetizations plus the RNG
/// streams feeding its observables.
pub struct Sample {
    m1: [f64; 3],
    m2: [f64; 3],
    field: [f64; 3],
    j2: f64,
    delta: f64,
    rng: ChaCha8Rng,
    channel_rngs: Vec<ChaCha8Rng>,
}

impl Sample {
    /// Creates a sample for `config`, seeded deterministically from the
    /// grid seed and the configuration parameters.
    pub fn new(grid: &SweepGrid, config: &Configuration) -> Self {
        let seed = replica_seed(grid.seed, config);
        let channel_rngs = (0..grid.current_replicas)
            .map(|k| ChaCha8Rng::seed_from_u64(seed.wrapping_add(u64::from(k) + 1)))
            .collect();
        Self {
            // Antiparallel ground state of the antiferromagnetic coupling.
            m1: [1.0, 0.0, 0.0],
            m2: [-1.0, 0.0, 0.0],
            field: config.field,
            j2: grid.j2,
            delta: grid.delta(config.n_layers),
            rng: ChaCha8Rng::seed_from_u64(seed),
            channel_rngs,
        }
    }

    /// Advances both films by one Monte Carlo step at temperature `t` and
    /// returns the film magnetizations.
    pub fn step(&mut self, t: f64) -> ([f64; 3], [f64; 3]) {
        let noise = NOISE_SCALE * t.sqrt();
        let m2 = self.m2;
        relax(&mut self.m1, &self.field, self.j2, &m2, self.delta, noise, &mut self.rng);
        let m1 = self.m1;
        relax(&mut self.m2, &self.field, self.j2, &m1, self.delta, noise, &mut self.rng);
        (self.m1, self.m2)
    }

    /// Instantaneous spin-channel currents for channel replica `k`.
    ///
    /// Spin-up electrons pass where both films point along +x, spin-down
    /// where both point along -x; each channel carries independent shot
    /// noise.
    pub fn currents(&mut self, k: usize) -> (f64, f64) {
        let rng = &mut self.channel_rngs[k];
        let up = 0.25 * (1.0 + self.m1[0]) * (1.0 + self.m2[0]);
        let down = 0.25 * (1.0 - self.m1[0]) * (1.0 - self.m2[0]);
        let up_noise: f64 = rng.sample(StandardNormal);
        let down_noise: f64 = rng.sample(StandardNormal);
        (
            (up + CURRENT_NOISE * up_noise).max(0.0),
            (down + CURRENT_NOISE * down_noise).max(0.0),
        )
    }

    /// Per-film spin-up and spin-down electron densities for channel
    /// replica `k`.
    pub fn densities(&mut self, k: usize) -> ([f64; 2], [f64; 2]) {
        let rng = &mut self.channel_rngs[k];
        let mut n_up = [0.0; 2];
        let mut n_down = [0.0; 2];
        for (film, m) in [self.m1, self.m2].iter().enumerate() {
            let jitter: f64 = rng.sample(StandardNormal);
            n_up[film] = 0.5 * (1.0 + m[0]) + CURRENT_NOISE * jitter;
            n_down[film] = 1.0 - n_up[film];
        }
        (n_up, n_down)
    }
}

/// Relaxes one film toward its effective field with thermal noise, keeping
/// the magnetization inside the unit ball.
fn relax(
    m: &mut [f64; 3],
    field: &[f64; 3],
    j2: f64,
    other: &[f64; 3],
    delta: f64,
    noise: f64,
    rng: &mut ChaCha8Rng,
) {
    for axis in 0..3 {
        let h_eff = field[axis] + j2 * other[axis];
        let kick: f64 = rng.sample(StandardNormal);
        let mut next = m[axis] + RELAX_RATE * h_eff + noise * kick;
        if axis == 2 {
            // Anisotropy suppresses out-of-plane response.
            next *= 1.0 - delta;
        }
        m[axis] = next;
    }
    let norm = (m[0] * m[0] + m[1] * m[1] + m[2] * m[2]).sqrt();
    if norm > 1.0 {
        for component in m.iter_mut() {
            *component /= norm;
        }
    }
}

/// Runs one statistical replica of `config` and writes its raw streams
/// into `config_dir`.
///
/// Output files:
///
/// - `m_id=<stat_id>.txt` — one row per observation step
/// - `j_id=<k>.txt`, `Nup_id=<k>.txt`, `Ndown_id=<k>.txt` — one file per
///   current channel (`k = stat_id * current_replicas + channel`), rows
///   starting at the first waiting-time threshold; currents are cumulative
///   sums
pub fn run_replica(
    grid: &SweepGrid,
    config: &Configuration,
    config_dir: &Path,
) -> Result<(), SimError> {
    debug!(%config, "replica started");
    let mut sample = Sample::new(grid, config);

    // Thermalization at the creation temperature, no output.
    for _ in 0..grid.mcs_init {
        sample.step(config.t_creation);
    }

    let mut m_out = TableWriter::create(&config_dir.join(format!("m_id={}.txt", config.stat_id)))?;
    m_out.write_header(&["m1", "m1x", "m1y", "m1z", "m2", "m2x", "m2y", "m2z"])?;

    let channels = usize::from(grid.current_replicas);
    let mut j_out = Vec::with_capacity(channels);
    let mut n_up_out = Vec::with_capacity(channels);
    let mut n_down_out = Vec::with_capacity(channels);
    for channel in 0..channels {
        let idx = usize::from(config.stat_id) * channels + channel;
        let mut j = TableWriter::create(&config_dir.join(format!("j_id={idx}.txt")))?;
        j.write_header(&["j_up", "j_down"])?;
        j_out.push(j);

        let mut up = TableWriter::create(&config_dir.join(format!("Nup_id={idx}.txt")))?;
        up.write_header(&["N_up_1", "N_up_2"])?;
        n_up_out.push(up);

        let mut down = TableWriter::create(&config_dir.join(format!("Ndown_id={idx}.txt")))?;
        down.write_header(&["N_down_1", "N_down_2"])?;
        n_down_out.push(down);
    }

    let observe_from = grid.t_wait.first().copied().unwrap_or(0);
    let mut j_up_cum = vec![0.0f64; channels];
    let mut j_down_cum = vec![0.0f64; channels];

    for mcs in 0..grid.total_steps() {
        let (m1, m2) = sample.step(config.t_sample);
        m_out.write_row(&[
            magnitude(&m1),
            m1[0],
            m1[1],
            m1[2],
            magnitude(&m2),
            m2[0],
            m2[1],
            m2[2],
        ])?;

        if mcs >= observe_from {
            for channel in 0..channels {
                let (up, down) = sample.currents(channel);
                j_up_cum[channel] += up;
                j_down_cum[channel] += down;
                j_out[channel].write_row(&[j_up_cum[channel], j_down_cum[channel]])?;

                let (n_up, n_down) = sample.densities(channel);
                n_up_out[channel].write_row(&[n_up[0], n_up[1]])?;
                n_down_out[channel].write_row(&[n_down[0], n_down[1]])?;
            }
        }
    }

    m_out.finish()?;
    for writer in j_out.into_iter().chain(n_up_out).chain(n_down_out) {
        writer.finish()?;
    }

    info!(%config, "replica finished");
    Ok(())
}

fn magnitude(m: &[f64; 3]) -> f64 {
    (m[0] * m[0] + m[1] * m[1] + m[2] * m[2]).sqrt()
}

/// Mixes the grid seed with every configuration parameter so each replica
/// gets its own deterministic RNG stream.
fn replica_seed(base: u64, config: &Configuration) -> u64 {
    let mut seed = base ^ 0x9e37_79b9_7f4a_7c15;
    for bits in [
        u64::from(config.stat_id),
        u64::from(config.n_layers),
        config.t_creation.to_bits(),
        config.t_sample.to_bits(),
        config.field[0].to_bits(),
        config.field[1].to_bits(),
        config.field[2].to_bits(),
    ] {
        seed = seed.wrapping_mul(0x0100_0000_01b3).rotate_left(17) ^ bits;
    }
    seed
}
