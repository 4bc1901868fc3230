use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use common::{ErrorKind, Result};

use crate::DAY_FORMAT;

/// Append-only daily activity log: `<dir>/<YYYY-MM-DD>.txt`, one
/// `HH:MM:SS : message` line per entry.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    dir: PathBuf,
}

impl ActivityLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_for(&self, day: &DateTime<Local>) -> PathBuf {
        self.dir.join(format!("{}.txt", day.format(DAY_FORMAT)))
    }

    pub fn record(&self, msg: &str) -> Result<()> {
        self.record_at(&Local::now(), msg)
    }

    pub fn record_error(&self, kind: ErrorKind, msg: &str) -> Result<()> {
        self.record(&format!("ERROR [{kind}] {msg}"))
    }

    pub fn record_at(&self, at: &DateTime<Local>, msg: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.file_for(at))?;
        writeln!(file, "{} : {msg}", at.format("%H:%M:%S"))?;
        Ok(())
    }
}
