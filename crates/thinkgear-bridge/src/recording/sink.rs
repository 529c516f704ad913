//! Where labelled samples go.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;

use crate::error::BridgeResult;

/// CSV header written before any rows.
pub const CSV_HEADER: [&str; 3] = ["timeMs", "rawEeg", "label"];

/// One raw sample with the label of the step it was recorded in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelledSample {
    /// Milliseconds since the recording started.
    pub time_ms: u64,
    pub raw_eeg: i16,
    pub label: String,
}

/// Destination for recorded samples.
pub trait SampleSink {
    /// # Errors
    /// Returns the underlying write error.
    fn write_sample(&mut self, sample: &LabelledSample) -> BridgeResult<()>;

    /// # Errors
    /// Returns the underlying flush error.
    fn flush(&mut self) -> BridgeResult<()> {
        Ok(())
    }
}

impl SampleSink for Vec<LabelledSample> {
    fn write_sample(&mut self, sample: &LabelledSample) -> BridgeResult<()> {
        self.push(sample.clone());
        Ok(())
    }
}

/// Writes `timeMs,rawEeg,label` rows.
pub struct CsvSampleWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl CsvSampleWriter<File> {
    /// Create `raw-<local timestamp>.csv` in `dir`, creating `dir` if needed.
    ///
    /// Never reuses an existing file: a name already taken gets a `-1`,
    /// `-2`, ... suffix.
    ///
    /// # Errors
    /// Returns I/O or CSV errors.
    pub fn create_in(dir: &Path) -> BridgeResult<(Self, PathBuf)> {
        std::fs::create_dir_all(dir)?;
        let stem = format!("raw-{}", Local::now().format("%Y-%m-%d_%H-%M-%S"));

        let mut attempt = 0_u32;
        let (file, path) = loop {
            let name = if attempt == 0 {
                format!("{stem}.csv")
            } else {
                format!("{stem}-{attempt}.csv")
            };
            let path = dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => break (file, path),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        };

        let writer = Self::from_writer(file)?;
        tracing::info!(path = %path.display(), "Recording to CSV");
        Ok((writer, path))
    }
}

impl<W: Write> CsvSampleWriter<W> {
    /// Wrap `inner` and write the header row.
    ///
    /// # Errors
    /// Returns the CSV error if the header cannot be written.
    pub fn from_writer(inner: W) -> BridgeResult<Self> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(inner);
        writer.write_record(CSV_HEADER)?;
        Ok(Self { writer })
    }

    /// Flush and return the inner writer.
    ///
    /// # Errors
    /// Returns the flush error.
    pub fn into_inner(self) -> BridgeResult<W> {
        self.writer
            .into_inner()
            .map_err(|e| crate::error::BridgeError::Io(e.into_error()))
    }
}

impl<W: Write> SampleSink for CsvSampleWriter<W> {
    fn write_sample(&mut self, sample: &LabelledSample) -> BridgeResult<()> {
        self.writer.serialize(sample)?;
        Ok(())
    }

    fn flush(&mut self) -> BridgeResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}
