//! Streaming reduction of replica streams into mean/error series.
//!
//! For one quantity name, all consecutively indexed replica files
//! (`<base>_id=0.txt`, `<base>_id=1.txt`, ...) are merged row by row. At
//! each row the mean and error of every field are computed over exactly the
//! streams still live at that row; streams of unequal length are expected
//! and exhausted streams simply drop out of the divisor.
//!
//! The "error" is the biased, un-normalized variance of per-stream
//! residuals around the row mean (no n-1 correction, no square root),
//! matching the statistic downstream consumers were calibrated against.

use std::path::Path;

use ndarray::Array1;
use tracing::{debug, info};

use super::stream::RecordStream;
use super::StatsError;
use crate::output::TableWriter;

/// Per-row aggregate over the streams live at that row.
#[derive(Debug, Clone, PartialEq)]
pub struct ReducedRecord {
    pub mean: Array1<f64>,
    pub error: Array1<f64>,
    /// Number of streams that contributed to this row.
    pub live_streams: usize,
}

/// Opens replica streams at index 0, 1, 2, ... until the next index is
/// missing.
///
/// # Errors
///
/// `StatsError::NoSuchConfiguration` if index 0 itself is absent.
pub fn discover_streams(dir: &Path, base: &str) -> Result<Vec<RecordStream>, StatsError> {
    let mut streams = Vec::new();
    loop {
        let path = dir.join(format!("{base}_id={}.txt", streams.len()));
        if !path.exists() {
            break;
        }
        streams.push(RecordStream::open(&path)?);
    }
    if streams.is_empty() {
        return Err(StatsError::NoSuchConfiguration {
            base: base.to_string(),
            dir: dir.to_path_buf(),
        });
    }
    debug!(base, replicas = streams.len(), "discovered replica streams");
    Ok(streams)
}

/// Strips the header row from every stream and returns one representative
/// header (identical headers across streams are assumed, not verified).
pub fn consume_header(streams: &mut [RecordStream]) -> Result<String, StatsError> {
    let mut representative = None;
    for stream in streams.iter_mut() {
        let header = stream
            .read_header()?
            .ok_or_else(|| StatsError::MissingHeader(stream.path().to_path_buf()))?;
        representative.get_or_insert(header);
    }
    representative.ok_or_else(|| StatsError::MissingHeader(Path::new("").to_path_buf()))
}

/// Reduces the next row across all still-live streams.
///
/// Returns `None` once every stream is exhausted. The divisor is the live
/// stream count at this row, not the original replica count.
pub fn reduce_step(streams: &mut [RecordStream]) -> Result<Option<ReducedRecord>, StatsError> {
    let mut rows: Vec<Array1<f64>> = Vec::with_capacity(streams.len());
    for stream in streams.iter_mut() {
        if let Some(row) = stream.next_row()? {
            rows.push(row);
        }
    }
    if rows.is_empty() {
        return Ok(None);
    }

    let n = rows.len() as f64;
    let width = rows[0].len();

    let mut mean = Array1::<f64>::zeros(width);
    for row in &rows {
        for idx in 0..width.min(row.len()) {
            mean[idx] += row[idx];
        }
    }
    mean.mapv_inplace(|v| v / n);

    let mut error = Array1::<f64>::zeros(width);
    for row in &rows {
        for idx in 0..width.min(row.len()) {
            let residual = row[idx] - mean[idx];
            error[idx] += residual * residual;
        }
    }
    error.mapv_inplace(|v| v / n);

    Ok(Some(ReducedRecord {
        mean,
        error,
        live_streams: rows.len(),
    }))
}

/// Reduces one quantity end to end: discovers the replica streams in
/// `raw_dir`, writes `<base>.txt` into `out_dir` as rows of
/// `mean, error, mean, error, ...`, and returns the number of reduced rows.
pub fn reduce_quantity(raw_dir: &Path, out_dir: &Path, base: &str) -> Result<usize, StatsError> {
    let mut streams = discover_streams(raw_dir, base)?;
    let header = consume_header(&mut streams)?;

    let mut columns = Vec::new();
    for name in header.trim_end().split('\t') {
        columns.push(name.to_string());
        columns.push(format!("{name}_err"));
    }
    let column_refs: Vec<&str> = columns.iter().map(String::as_str).collect();

    let out_path = out_dir.join(format!("{base}.txt"));
    let mut writer = TableWriter::create(&out_path)?;
    writer.write_header(&column_refs)?;

    let mut rows = 0usize;
    let mut interleaved = Vec::new();
    while let Some(record) = reduce_step(&mut streams)? {
        interleaved.clear();
        for idx in 0..record.mean.len() {
            interleaved.push(record.mean[idx]);
            interleaved.push(record.error[idx]);
        }
        writer.write_row(&interleaved)?;
        rows += 1;
    }
    writer.finish()?;

    info!(base, rows, out = %out_path.display(), "quantity reduced");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_replicas(dir: &Path, base: &str, replicas: &[&str]) {
        for (idx, content) in replicas.iter().enumerate() {
            fs::write(dir.join(format!("{base}_id={idx}.txt")), content).expect("write replica");
        }
    }

    #[test]
    fn test_discover_requires_index_zero() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("q_id=1.txt"), "a\n1\n").expect("write file");

        let err = discover_streams(dir.path(), "q").expect_err("index 0 missing");
        assert!(matches!(err, StatsError::NoSuchConfiguration { .. }));
    }

    #[test]
    fn test_discover_stops_at_first_gap() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_replicas(dir.path(), "q", &["a\n1\n", "a\n2\n"]);
        fs::write(dir.path().join("q_id=3.txt"), "a\n9\n").expect("write file");

        let streams = discover_streams(dir.path(), "q").expect("indices 0..2");
        assert_eq!(streams.len(), 2);
    }

    #[test]
    fn test_mean_and_biased_variance_across_streams() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_replicas(
            dir.path(),
            "q",
            &["v\n1\t2\n", "v\n3\t4\n", "v\n5\t6\n"],
        );

        let mut streams = discover_streams(dir.path(), "q").expect("replicas");
        consume_header(&mut streams).expect("headers");

        let record = reduce_step(&mut streams).expect("step").expect("row 0");
        assert_eq!(record.live_streams, 3);
        assert!((record.mean[0] - 3.0).abs() < 1e-12);
        assert!((record.mean[1] - 4.0).abs() < 1e-12);
        // Biased, un-normalized variance: ((1-3)^2 + 0 + (5-3)^2) / 3.
        assert!((record.error[0] - 8.0 / 3.0).abs() < 1e-12);
        assert!((record.error[1] - 8.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_unequal_length_streams_drop_out_of_the_divisor() {
        let dir = tempfile::tempdir().expect("tempdir");
        let long: String =
            "v\n".to_string() + &(1..=10).map(|i| format!("{i}\n")).collect::<String>();
        let short: String =
            "v\n".to_string() + &(1..=5).map(|i| format!("{}\n", i * 10)).collect::<String>();
        write_replicas(dir.path(), "q", &[&long, &short]);

        let mut streams = discover_streams(dir.path(), "q").expect("replicas");
        consume_header(&mut streams).expect("headers");

        for row in 1..=10u32 {
            let record = reduce_step(&mut streams).expect("step").expect("row");
            if row <= 5 {
                assert_eq!(record.live_streams, 2);
            } else {
                // Rows 6..=10 equal the long stream's raw values with error 0.
                assert_eq!(record.live_streams, 1);
                assert!((record.mean[0] - f64::from(row)).abs() < 1e-12);
                assert_eq!(record.error[0], 0.0);
            }
        }
        assert!(reduce_step(&mut streams).expect("step").is_none());
    }

    #[test]
    fn test_reduce_quantity_writes_interleaved_pairs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let raw = dir.path().join("raw");
        let out = dir.path().join("processed");
        fs::create_dir_all(&raw).expect("mkdir");
        fs::create_dir_all(&out).expect("mkdir");
        write_replicas(&raw, "j", &["j_up\tj_down\n2\t1\n", "j_up\tj_down\n4\t3\n"]);

        let rows = reduce_quantity(&raw, &out, "j").expect("reduce");
        assert_eq!(rows, 1);

        let content = fs::read_to_string(out.join("j.txt")).expect("read reduced");
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("j_up\tj_up_err\tj_down\tj_down_err"));
        assert_eq!(lines.next(), Some("3\t1\t2\t1"));
    }
}
