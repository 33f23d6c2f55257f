//! CSV recorder for integrated orientation.
//!
//! One header line followed by one `time, x, y, z` line per gyro sample.
//! Time is in seconds relative to the first appended sample.

use crate::error::{KineticError, Result};
use crate::integrator::NS2S;
use crate::types::LogRecord;
use glam::DVec3;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const CSV_HEADER: &str = "Time,Pitch (x),Yaw (y),Roll (z)";

/// Append-only orientation log.
///
/// The file is truncated on open and flushed on [`close`](Self::close) or drop,
/// whichever comes first.
pub struct SampleLogger {
    writer: Option<BufWriter<File>>,
    path: PathBuf,
    initial_timestamp: Option<u64>,
    last_relative: f64,
    records: u64,
}

impl SampleLogger {
    /// Create (or truncate) the log file and write the header.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let unavailable = |source: io::Error| KineticError::LogFileUnavailable {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(unavailable)?;
        }
        let file = File::create(&path).map_err(unavailable)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{CSV_HEADER}").map_err(unavailable)?;

        tracing::info!(?path, "Orientation log opened");
        Ok(Self {
            writer: Some(writer),
            path,
            initial_timestamp: None,
            last_relative: 0.0,
            records: 0,
        })
    }

    /// Write one row for an angle observed at `timestamp_ns`.
    ///
    /// The first call fixes the zero point for all relative times.
    pub fn append(&mut self, timestamp_ns: u64, angle: DVec3) -> Result<LogRecord> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(KineticError::LogFileUnavailable {
                path: self.path.clone(),
                source: io::Error::other("log file already closed"),
            });
        };

        let initial = *self.initial_timestamp.get_or_insert(timestamp_ns);
        let elapsed = timestamp_ns.saturating_sub(initial) as f64 * NS2S;
        // Keep the time column non-decreasing even if the feed reorders.
        let relative_time = elapsed.max(self.last_relative);

        let record = LogRecord {
            relative_time,
            angle,
        };
        writeln!(
            writer,
            "{:?}, {:?}, {:?}, {:?}",
            record.relative_time, angle.x, angle.y, angle.z
        )
        .map_err(|source| KineticError::LogFileUnavailable {
            path: self.path.clone(),
            source,
        })?;

        self.last_relative = relative_time;
        self.records += 1;
        Ok(record)
    }

    /// Flush and release the file. Calling again is a no-op.
    pub fn close(&mut self) -> Result<()> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        writer
            .flush()
            .map_err(|source| KineticError::LogFileUnavailable {
                path: self.path.clone(),
                source,
            })?;
        tracing::info!(path = ?self.path, records = self.records, "Orientation log closed");
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows written so far, excluding the header.
    pub fn records(&self) -> u64 {
        self.records
    }
}

impl Drop for SampleLogger {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(?e, "Failed to flush orientation log");
        }
    }
}
