//! Append-only, timestamped log stream for one work item attempt.

use bhunaksha_core::{CrawlTarget, WorkItem};
use chrono::Local;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Timestamp layout of every log line.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Line-oriented log file for one work item.
///
/// Every line is also emitted through `tracing`. The file is a durable
/// trace only; nothing in the crawler reads it back.
#[derive(Debug, Clone)]
pub struct ItemLog {
    path: PathBuf,
}

impl ItemLog {
    /// Log for `item` under `{log_root}/district_{d}/taluka_{t}/village_{index}.txt`.
    #[must_use]
    pub fn for_item(log_root: &Path, target: CrawlTarget, item: &WorkItem) -> Self {
        Self::at(
            log_root
                .join(format!("district_{}", target.district_index))
                .join(format!("taluka_{}", target.taluka_index))
                .join(format!("village_{}.txt", item.index)),
        )
    }

    /// Log at an explicit path.
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File this log appends to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `"{message}: {timestamp}"`.
    pub fn record(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::info!(log = %self.path.display(), "{}", message);

        let line = format!("{}: {}", message, Local::now().format(TIMESTAMP_FORMAT));
        if let Err(e) = self.append(&line) {
            tracing::warn!("Failed to write {}: {}", self.path.display(), e);
        }
    }

    fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }
}
