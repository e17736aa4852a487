//! # Snapshot Logger
//!
//! Writes every produced [`AveragedReading`] as one JSON line, tagged with its
//! stream, into rotating files under the log directory.
//!
//! Files are named `snapshots_<YYYYmmdd_HHMMSS>_<seq>.jsonl`; the sequence
//! number keeps names unique and ordered when two files open in the same second.

use super::types::{AveragedReading, Stream};
use crate::error::Result;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const FILE_PREFIX: &str = "snapshots_";
const FILE_EXTENSION: &str = "jsonl";

/// One line of the log
#[derive(Debug, Serialize)]
struct SnapshotRecord<'a> {
    logged_at: String,
    stream: Stream,
    #[serde(flatten)]
    reading: &'a AveragedReading,
    #[serde(skip_serializing_if = "Option::is_none")]
    calibration_reference: Option<f32>,
}

/// JSONL snapshot log with size-based rotation
pub struct SnapshotLogger {
    dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    writer: Option<BufWriter<File>>,
    records_in_file: usize,
    sequence: u64,
}

impl std::fmt::Debug for SnapshotLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotLogger")
            .field("dir", &self.dir)
            .field("records_in_file", &self.records_in_file)
            .finish_non_exhaustive()
    }
}

impl SnapshotLogger {
    /// Create the logger, making `dir` if needed
    ///
    /// No file is opened until the first record.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn new<P: AsRef<Path>>(dir: P, max_records_per_file: usize, max_files_to_keep: usize) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        info!("Snapshot log directory: {}", dir.display());

        Ok(Self {
            dir,
            max_records_per_file: max_records_per_file.max(1),
            max_files_to_keep: max_files_to_keep.max(1),
            writer: None,
            records_in_file: 0,
            sequence: 0,
        })
    }

    /// Append one reading
    ///
    /// # Errors
    ///
    /// Returns error if serialization or the file write fails
    pub fn record(&mut self, stream: Stream, reading: &AveragedReading, calibration_reference: Option<f32>) -> Result<()> {
        let line = serde_json::to_string(&SnapshotRecord {
            logged_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            stream,
            reading,
            calibration_reference,
        })?;

        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        if let Some(writer) = self.writer.as_mut() {
            writeln!(writer, "{}", line)?;
            writer.flush()?;
            self.records_in_file += 1;
        }

        Ok(())
    }

    /// Log files currently on disk, oldest first
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be read
    pub fn log_files(&self) -> Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_snapshot_file(path))
            .collect();
        files.sort();
        Ok(files)
    }

    fn rotate(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }

        let name = format!(
            "{}{}_{:06}.{}",
            FILE_PREFIX,
            Utc::now().format("%Y%m%d_%H%M%S"),
            self.sequence,
            FILE_EXTENSION
        );
        self.sequence += 1;

        let path = self.dir.join(name);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!("Opened snapshot log {}", path.display());

        self.writer = Some(BufWriter::new(file));
        self.records_in_file = 0;
        self.prune()
    }

    fn prune(&self) -> Result<()> {
        let files = self.log_files()?;
        let excess = files.len().saturating_sub(self.max_files_to_keep);

        for path in files.iter().take(excess) {
            if let Err(e) = fs::remove_file(path) {
                warn!("Failed to remove old snapshot log {}: {}", path.display(), e);
            } else {
                debug!("Removed old snapshot log {}", path.display());
            }
        }

        Ok(())
    }
}

fn is_snapshot_file(path: &Path) -> bool {
    let name_matches = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(FILE_PREFIX));
    name_matches && path.extension().is_some_and(|ext| ext == FILE_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::types::PANEL_COUNT;
    use tempfile::TempDir;

    fn reading(avg: f32) -> AveragedReading {
        AveragedReading {
            irradiance_avg: avg,
            per_panel_avg: [avg; PANEL_COUNT],
            timestamp: "14/03/25 10:15:32".to_string(),
        }
    }

    #[test]
    fn test_no_file_before_first_record() {
        let dir = TempDir::new().unwrap();
        let logger = SnapshotLogger::new(dir.path(), 10, 3).unwrap();
        assert!(logger.log_files().unwrap().is_empty());
    }

    #[test]
    fn test_record_writes_json_line() {
        let dir = TempDir::new().unwrap();
        let mut logger = SnapshotLogger::new(dir.path(), 10, 3).unwrap();

        logger.record(Stream::FiveMinute, &reading(512.5), Some(498.0)).unwrap();
        logger.record(Stream::FifteenSecond, &reading(100.0), None).unwrap();

        let files = logger.log_files().unwrap();
        assert_eq!(files.len(), 1);

        let contents = fs::read_to_string(&files[0]).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["stream"], "five_minute");
        assert_eq!(lines[0]["irradiance_avg"], 512.5);
        assert_eq!(lines[0]["calibration_reference"], 498.0);
        assert_eq!(lines[0]["timestamp"], "14/03/25 10:15:32");
        assert_eq!(lines[0]["per_panel_avg"].as_array().unwrap().len(), PANEL_COUNT);
        assert_eq!(lines[1]["stream"], "fifteen_second");
        assert!(lines[1].get("calibration_reference").is_none());
    }

    #[test]
    fn test_rotates_after_max_records() {
        let dir = TempDir::new().unwrap();
        let mut logger = SnapshotLogger::new(dir.path(), 2, 10).unwrap();

        for i in 0..5 {
            logger.record(Stream::FifteenSecond, &reading(i as f32), None).unwrap();
        }

        let files = logger.log_files().unwrap();
        assert_eq!(files.len(), 3);
        let counts: Vec<usize> = files
            .iter()
            .map(|path| fs::read_to_string(path).unwrap().lines().count())
            .collect();
        assert_eq!(counts, vec![2, 2, 1]);
    }

    #[test]
    fn test_keeps_only_newest_files() {
        let dir = TempDir::new().unwrap();
        let mut logger = SnapshotLogger::new(dir.path(), 1, 2).unwrap();

        for i in 0..5 {
            logger.record(Stream::Radio, &reading(i as f32), None).unwrap();
        }

        let files = logger.log_files().unwrap();
        assert_eq!(files.len(), 2);

        let last: serde_json::Value =
            serde_json::from_str(fs::read_to_string(&files[1]).unwrap().trim()).unwrap();
        assert_eq!(last["irradiance_avg"], 4.0);
    }

    #[test]
    fn test_ignores_unrelated_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("notes.txt"), "keep me").unwrap();

        let mut logger = SnapshotLogger::new(dir.path(), 1, 1).unwrap();
        logger.record(Stream::Radio, &reading(1.0), None).unwrap();
        logger.record(Stream::Radio, &reading(2.0), None).unwrap();

        assert_eq!(logger.log_files().unwrap().len(), 1);
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        let mut logger = SnapshotLogger::new(&nested, 10, 1).unwrap();
        logger.record(Stream::Calibration, &reading(1.0), Some(2.0)).unwrap();
        assert!(nested.is_dir());
    }
}
