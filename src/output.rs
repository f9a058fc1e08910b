//! Tab-delimited table output for raw, reduced, and derived series.
//!
//! Every file in a run shares the same shape: one header row of column
//! names, then rows of floating-point values, all tab-separated with no
//! trailing separator. Writers are buffered and flushed on `finish` or
//! drop.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Buffered writer for one tab-delimited table file.
pub struct TableWriter {
    out: BufWriter<File>,
}

impl TableWriter {
    /// Creates (truncating) the file at `path`.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            out: BufWriter::new(file),
        })
    }

    /// Writes the header row of column names.
    pub fn write_header(&mut self, columns: &[&str]) -> io::Result<()> {
        writeln!(self.out, "{}", columns.join("\t"))
    }

    /// Writes one row of values.
    pub fn write_row(&mut self, values: &[f64]) -> io::Result<()> {
        let mut first = true;
        for value in values {
            if !first {
                self.out.write_all(b"\t")?;
            }
            write!(self.out, "{value}")?;
            first = false;
        }
        self.out.write_all(b"\n")
    }

    /// Flushes and closes the file.
    pub fn finish(mut self) -> io::Result<()> {
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_and_rows_are_tab_delimited() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("table.txt");

        let mut writer = TableWriter::create(&path).expect("create file");
        writer.write_header(&["a", "b"]).expect("write header");
        writer.write_row(&[1.5, -2.0]).expect("write row");
        writer.finish().expect("flush");

        let content = std::fs::read_to_string(&path).expect("read back");
        assert_eq!(content, "a\tb\n1.5\t-2\n");
    }

    #[test]
    fn test_empty_row_is_a_blank_line() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("table.txt");

        let mut writer = TableWriter::create(&path).expect("create file");
        writer.write_row(&[]).expect("write row");
        writer.finish().expect("flush");

        assert_eq!(std::fs::read_to_string(&path).expect("read back"), "\n");
    }
}
