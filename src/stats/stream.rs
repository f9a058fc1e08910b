//! Lazy record streams over raw replica output files.
//!
//! Each stream yields one parsed row per call until EOF or a blank line.
//! Malformed numeric tokens degrade a single value instead of halting a
//! multi-hour run: an overflowing token becomes `f64::MAX`, a non-numeric
//! token becomes `0.0`, each with a diagnostic.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use ndarray::Array1;
use tracing::warn;

/// One raw per-replica output stream: a finite, EOF-terminated lazy
/// sequence of rows of named numeric fields.
///
/// Independent streams may reach EOF at different row indices; once
/// exhausted, a stream stays exhausted.
#[derive(Debug)]
pub struct RecordStream {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    exhausted: bool,
}

impl RecordStream {
    /// Opens the file at `path` for streaming.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            lines: BufReader::new(file).lines(),
            exhausted: false,
        })
    }

    /// Path of the underlying file, for diagnostics.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Consumes and returns the raw header line, `None` if the file is
    /// empty.
    pub fn read_header(&mut self) -> io::Result<Option<String>> {
        match self.lines.next() {
            Some(line) => Ok(Some(line?)),
            None => {
                self.exhausted = true;
                Ok(None)
            }
        }
    }

    /// Reads and parses the next row; `None` at EOF or on a blank line.
    pub fn next_row(&mut self) -> io::Result<Option<Array1<f64>>> {
        if self.exhausted {
            return Ok(None);
        }
        match self.lines.next() {
            Some(line) => {
                let line = line?;
                let trimmed = line.trim_end();
                if trimmed.is_empty() {
                    self.exhausted = true;
                    return Ok(None);
                }
                Ok(Some(parse_row(trimmed, &self.path)))
            }
            None => {
                self.exhausted = true;
                Ok(None)
            }
        }
    }

    /// Whether this stream has reached its end.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

/// Splits one tab-delimited line into numeric fields with recoverable
/// substitution for malformed tokens.
pub(crate) fn parse_row(line: &str, path: &Path) -> Array1<f64> {
    let values: Vec<f64> = line.split('\t').map(|token| parse_field(token, path)).collect();
    Array1::from(values)
}

fn parse_field(token: &str, path: &Path) -> f64 {
    match token.trim().parse::<f64>() {
        Ok(value) if value.is_infinite() => {
            warn!(
                token,
                path = %path.display(),
                "value overflow, substituting f64::MAX"
            );
            f64::MAX
        }
        Ok(value) => value,
        Err(_) => {
            warn!(
                token,
                path = %path.display(),
                "unparsable value, substituting 0.0"
            );
            0.0
        }
    }
}
