//! Derived ratio quantities: magnetoresistance and spin polarization.
//!
//! Both calculators consume pairs of reduced series row by row. GMR pairs a
//! field-on configuration with its zero-field baseline; polarization pairs
//! the spin-up and spin-down channel densities of one configuration. Error
//! propagation follows relative-error sums; a near-zero denominator yields
//! a non-finite value that is passed through uncorrected.

use std::path::Path;

use ndarray::Array1;
use tracing::info;

use super::stream::RecordStream;
use super::StatsError;
use crate::output::TableWriter;

/// One reduced row of spin-channel currents: `(value, error)` per channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Currents {
    pub up: f64,
    pub up_err: f64,
    pub down: f64,
    pub down_err: f64,
}

impl Currents {
    /// Reads the first four fields of a reduced `j` row; `None` if the row
    /// is too short.
    pub fn from_row(row: &Array1<f64>) -> Option<Self> {
        if row.len() < 4 {
            return None;
        }
        Some(Self {
            up: row[0],
            up_err: row[1],
            down: row[2],
            down_err: row[3],
        })
    }
}

/// One GMR row: ratio below and above the coercive field, with errors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GmrRow {
    pub lower: f64,
    pub lower_err: f64,
    pub upper: f64,
    pub upper_err: f64,
}

/// One polarization row per film, with errors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolarizationRow {
    pub p1: f64,
    pub p1_err: f64,
    pub p2: f64,
    pub p2_err: f64,
}

/// Computes the magnetoresistance ratios from one field-on row and the
/// matching zero-field row.
///
/// ```text
/// lower = (Ju_h + Jd_h)/(Ju_h * Jd_h) * (Ju_0 * Jd_0)/(Ju_0 + Jd_0) - 1
/// upper = 4 * Ju_0 * Jd_0 / [(Ju_h + Jd_h)(Ju_0 + Jd_0)] - 1
/// ```
///
/// Each error is `(ratio + 1)` times the sum of relative errors of the
/// contributing currents and current sums.
pub fn compute_gmr(h: &Currents, zero: &Currents) -> GmrRow {
    let lower = (h.up + h.down) / (h.up * h.down) * (zero.up * zero.down)
        / (zero.up + zero.down)
        - 1.0;
    let lower_err = (lower + 1.0)
        * ((h.up_err + h.down_err) / (h.up + h.down)
            + h.up_err / h.up
            + h.down_err / h.down
            + zero.up_err / zero.up
            + zero.down_err / zero.down
            + (zero.up_err + zero.down_err) / (zero.up + zero.down));

    let upper = 4.0 * (zero.up * zero.down) / ((h.up + h.down) * (zero.up + zero.down)) - 1.0;
    let upper_err = (upper + 1.0)
        * (zero.up_err / zero.up
            + zero.down_err / zero.down
            + (zero.up_err + zero.down_err) / (zero.up + zero.down)
            + (h.up_err + h.down_err) / (h.up + h.down));

    GmrRow {
        lower,
        lower_err,
        upper,
        upper_err,
    }
}

/// Computes per-film polarization `P = (up - down)/(up + down)` from one
/// reduced `Nup` row and one reduced `Ndown` row, each
/// `(N_1, err, N_2, err)`.
///
/// The error is the sum of relative errors of numerator and denominator;
/// its magnitude is what gets written. `None` if either row is too short.
pub fn compute_polarization(up: &Array1<f64>, down: &Array1<f64>) -> Option<PolarizationRow> {
    if up.len() < 4 || down.len() < 4 {
        return None;
    }
    let channel = |u: f64, u_err: f64, d: f64, d_err: f64| {
        let p = (u - d) / (u + d);
        let p_err = (u_err + d_err) / (u - d) + (u_err + d_err) / (u + d);
        (p, p_err)
    };
    let (p1, p1_err) = channel(up[0], up[1], down[0], down[1]);
    let (p2, p2_err) = channel(up[2], up[3], down[2], down[3]);
    Some(PolarizationRow {
        p1,
        p1_err,
        p2,
        p2_err,
    })
}

/// Computes GMR series for one configuration against its baseline and
/// writes one `GMR_tw=<t>.txt` file per waiting-time threshold (values in
/// percent).
///
/// A row enters the stream for threshold `t_w` only once the row index has
/// advanced at least `t_w - t_w_min` steps past the start of observation;
/// `t_wait` must be sorted ascending. Returns the number of paired rows.
///
/// # Errors
///
/// `StatsError::MissingBaseline` if the baseline's reduced `j.txt` is
/// absent (ordering dependency: the baseline must be reduced first).
pub fn write_gmr(
    config_dir: &Path,
    baseline_dir: &Path,
    t_wait: &[u64],
) -> Result<usize, StatsError> {
    let baseline_path = baseline_dir.join("j.txt");
    if !baseline_path.exists() {
        return Err(StatsError::MissingBaseline(baseline_path));
    }

    let mut field = RecordStream::open(&config_dir.join("j.txt"))?;
    let mut baseline = RecordStream::open(&baseline_path)?;
    field
        .read_header()?
        .ok_or_else(|| StatsError::MissingHeader(field.path().to_path_buf()))?;
    baseline
        .read_header()?
        .ok_or_else(|| StatsError::MissingHeader(baseline.path().to_path_buf()))?;

    let t_min = t_wait.first().copied().unwrap_or(0);
    let mut writers = Vec::with_capacity(t_wait.len());
    for tw in t_wait {
        let mut writer = TableWriter::create(&config_dir.join(format!("GMR_tw={tw}.txt")))?;
        writer.write_header(&["GMR_lower", "GMR_lower_err", "GMR_upper", "GMR_upper_err"])?;
        writers.push(writer);
    }

    let mut rows = 0usize;
    loop {
        let (Some(h_row), Some(zero_row)) = (field.next_row()?, baseline.next_row()?) else {
            break;
        };
        let (Some(h), Some(zero)) = (Currents::from_row(&h_row), Currents::from_row(&zero_row))
        else {
            break;
        };
        let gmr = compute_gmr(&h, &zero);

        for (writer, tw) in writers.iter_mut().zip(t_wait) {
            if rows as u64 >= tw - t_min {
                writer.write_row(&[
                    gmr.lower * 100.0,
                    gmr.lower_err * 100.0,
                    gmr.upper * 100.0,
                    gmr.upper_err * 100.0,
                ])?;
            }
        }
        rows += 1;
    }
    for writer in writers {
        writer.finish()?;
    }

    info!(dir = %config_dir.display(), rows, "GMR series written");
    Ok(rows)
}

/// Computes the polarization series for one configuration from its reduced
/// `Nup.txt`/`Ndown.txt` pair and writes `P.txt`. Returns the number of
/// rows written.
pub fn write_polarization(config_dir: &Path) -> Result<usize, StatsError> {
    let mut up = RecordStream::open(&config_dir.join("Nup.txt"))?;
    let mut down = RecordStream::open(&config_dir.join("Ndown.txt"))?;
    up.read_header()?
        .ok_or_else(|| StatsError::MissingHeader(up.path().to_path_buf()))?;
    down.read_header()?
        .ok_or_else(|| StatsError::MissingHeader(down.path().to_path_buf()))?;

    let mut writer = TableWriter::create(&config_dir.join("P.txt"))?;
    writer.write_header(&["P1", "P1_err", "P2", "P2_err"])?;

    let mut rows = 0usize;
    loop {
        let (Some(up_row), Some(down_row)) = (up.next_row()?, down.next_row()?) else {
            break;
        };
        let Some(pol) = compute_polarization(&up_row, &down_row) else {
            break;
        };
        writer.write_row(&[pol.p1, pol.p1_err.abs(), pol.p2, pol.p2_err.abs()])?;
        rows += 1;
    }
    writer.finish()?;

    info!(dir = %config_dir.display(), rows, "polarization series written");
    Ok(rows)
}
