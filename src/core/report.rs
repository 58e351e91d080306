// FormSnap - core/report.rs
//
// Batch report: the machine-readable record written by `--report`, and the
// human-readable tally printed at the end of every run.
// Writes to any Write trait object.

use crate::core::model::{BatchTally, RunOutcome};
use crate::util::error::HarnessError;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Everything a run did, in processing order.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub tool_version: &'static str,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    /// Path the user supplied (project or batch root).
    pub root: PathBuf,
    pub totals: BatchTally,
    pub projects: Vec<RunOutcome>,
}

impl BatchReport {
    pub fn new(
        root: &Path,
        started_at: DateTime<Local>,
        totals: BatchTally,
        projects: Vec<RunOutcome>,
    ) -> Self {
        Self {
            tool_version: crate::util::constants::APP_VERSION,
            started_at,
            finished_at: Local::now(),
            root: root.to_path_buf(),
            totals,
            projects,
        }
    }

    /// Write the report as pretty-printed JSON.
    pub fn write_json<W: Write>(&self, writer: W, path: &Path) -> Result<(), HarnessError> {
        serde_json::to_writer_pretty(writer, self).map_err(|e| HarnessError::Io {
            path: path.to_path_buf(),
            operation: "write report",
            source: io::Error::from(e),
        })
    }

    /// Create `path` and write the report into it.
    pub fn save(&self, path: &Path) -> Result<(), HarnessError> {
        let file = std::fs::File::create(path).map_err(|source| HarnessError::Io {
            path: path.to_path_buf(),
            operation: "create report",
            source,
        })?;
        self.write_json(io::BufWriter::new(file), path)?;
        tracing::info!(path = %path.display(), "Report written");
        Ok(())
    }
}

const SEPARATOR_WIDTH: usize = 60;

/// Final tally as printed to the console.
pub fn format_summary(tally: &BatchTally) -> String {
    let rule = "=".repeat(SEPARATOR_WIDTH);
    format!(
        "{rule}\nProjects processed: {}\nSuccessful builds:  {}\nFailed builds:      {}\n{rule}",
        tally.projects, tally.succeeded, tally.failed
    )
}
