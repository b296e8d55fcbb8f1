//! Infrastructure adapter for writing extracted rows to local CSV artifacts.

use crate::domain::entities::{AccountRow, Strategy};
use crate::domain::errors::{BenchError, Result};
use csv::WriterBuilder;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

const WRITE_BUFFER_BYTES: usize = 128 * 1024;

/// Maps each strategy to its own artifact under the output directory.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    dir: PathBuf,
}

impl OutputLayout {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<dir>/<strategy name>.csv`
    pub fn path_for(&self, strategy: Strategy) -> PathBuf {
        self.dir.join(format!("{}.csv", strategy.name()))
    }
}

/// Append-only CSV artifact owned by exactly one strategy run.
///
/// Records are written as `aid,bid,abalance` with no header row.
pub struct CsvSink {
    path: PathBuf,
    wtr: csv::Writer<BufWriter<File>>,
    rows: u64,
}

impl CsvSink {
    /// Creates (or truncates) the artifact at `path`.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::create(&path)?;
        let wtr = WriterBuilder::new()
            .has_headers(false)
            .from_writer(BufWriter::with_capacity(WRITE_BUFFER_BYTES, file));
        Ok(Self { path, wtr, rows: 0 })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows written so far.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn write_row(&mut self, row: &AccountRow) -> Result<()> {
        self.wtr.serialize(row)?;
        self.rows += 1;
        Ok(())
    }

    pub fn write_batch(&mut self, rows: &[AccountRow]) -> Result<()> {
        for row in rows {
            self.write_row(row)?;
        }
        Ok(())
    }

    /// Flushes everything to disk and returns the row count.
    pub fn finish(mut self) -> Result<u64> {
        self.wtr.flush()?;
        Ok(self.rows)
    }

    /// Hands the raw buffered file to `stream`, which writes already-encoded
    /// CSV bytes and returns how many rows it wrote. The file is flushed
    /// afterwards when `stream` succeeds.
    pub fn pass_through<F>(self, stream: F) -> Result<u64>
    where
        F: FnOnce(&mut dyn Write) -> Result<u64>,
    {
        let mut out = self
            .wtr
            .into_inner()
            .map_err(|e| BenchError::ArtifactError(e.to_string()))?;
        let rows = stream(&mut out)?;
        out.flush()?;
        Ok(self.rows + rows)
    }

    /// Drops buffered output and truncates the artifact to zero length.
    pub fn discard(self) -> Result<()> {
        let Self { path, wtr, .. } = self;
        drop(wtr);
        File::create(&path)?;
        Ok(())
    }
}

/// Counts newline-terminated records in a raw CSV byte stream.
///
/// Only valid for streams whose fields never contain quoted newlines, which
/// holds for the integer-only account rows.
pub struct LineCounter<W> {
    inner: W,
    lines: u64,
    bytes: u64,
}

impl<W: Write> LineCounter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            lines: 0,
            bytes: 0,
        }
    }

    pub fn lines(&self) -> u64 {
        self.lines
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl<W: Write> Write for LineCounter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.lines += buf[..n].iter().filter(|b| **b == b'\n').count() as u64;
        self.bytes += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
