//! Run summary accounting and the append-only run log.
//!
//! Every terminal event of a run goes through a [`RunReporter`], which
//! bumps the [`RunSummary`] counters and appends one line to the run log.
//! The log is opened once in append mode, so earlier lines are never
//! truncated, and each line is flushed as it is written.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, TimeZone};
use s3_diff_sync_models::{RunSummary, UploadOutcome, UploadStatus};

/// File name timestamp format for run logs.
const RUN_ID_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

/// Returns `{runs_dir}/{timestamp}.log` for a run started at `started`.
#[must_use]
pub fn run_log_path<Tz>(runs_dir: &Path, started: &DateTime<Tz>) -> PathBuf
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    runs_dir.join(format!("{}.log", started.format(RUN_ID_FORMAT)))
}

struct ReporterState {
    sink: Box<dyn Write + Send>,
    summary: RunSummary,
}

/// Accumulates the [`RunSummary`] and writes the run log.
pub struct RunReporter {
    state: Mutex<ReporterState>,
}

impl RunReporter {
    /// Opens (or creates) the run log at `path` for appending.
    ///
    /// Parent directories are created as needed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory or file cannot be created.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            state: Mutex::new(ReporterState {
                sink: Box::new(file),
                summary: RunSummary::default(),
            }),
        })
    }

    /// Reports into an arbitrary writer instead of a file.
    #[must_use]
    pub fn with_sink(sink: impl Write + Send + 'static) -> Self {
        Self {
            state: Mutex::new(ReporterState {
                sink: Box::new(sink),
                summary: RunSummary::default(),
            }),
        }
    }

    /// Records the outcome of one candidate.
    pub fn record(&self, outcome: &UploadOutcome) {
        let line = match &outcome.status {
            UploadStatus::Uploaded => format!("Uploaded: {}", outcome.key),
            UploadStatus::Skipped(_) => format!("Exists: {}", outcome.key),
            UploadStatus::Errored(message) => {
                format!("Error uploading {}: {message}", outcome.key)
            }
        };
        self.update(&line, |summary| summary.record(&outcome.status));
    }

    /// Records a file skipped by an exclusion rule.
    pub fn record_excluded(&self, path: &Path) {
        self.update(&format!("Excluded: {}", path.display()), |summary| {
            summary.skipped_excluded += 1;
        });
    }

    /// Records a directory or entry the walker could not read.
    pub fn record_unreadable(&self, path: Option<&Path>, message: &str) {
        let path = path.map_or_else(|| "?".to_string(), |p| p.display().to_string());
        self.update(&format!("Unreadable: {path}: {message}"), |summary| {
            summary.unreadable += 1;
        });
    }

    /// Records a target skipped because its prefix could not be listed.
    pub fn record_list_failure(&self, prefix: &str, error: &dyn std::fmt::Display) {
        self.update(&format!("Error listing {prefix}: {error}"), |summary| {
            summary.failed_targets += 1;
        });
    }

    /// Appends a free-form line without touching the counters.
    pub fn note(&self, message: &str) {
        self.update(message, |_| {});
    }

    /// Returns the totals so far.
    #[must_use]
    pub fn summary(&self) -> RunSummary {
        self.lock().summary
    }

    /// Writes the closing summary line and returns the final totals.
    #[must_use]
    pub fn finalize(self) -> RunSummary {
        let mut state = self.state.into_inner().unwrap_or_else(PoisonError::into_inner);
        let line = format!("Summary: {}", state.summary);
        write_line(state.sink.as_mut(), &line);
        state.summary
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ReporterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, line: &str, apply: impl FnOnce(&mut RunSummary)) {
        let mut state = self.lock();
        apply(&mut state.summary);
        write_line(state.sink.as_mut(), line);
    }
}

/// Appends one line, logging instead of failing if the sink is broken.
fn write_line(sink: &mut dyn Write, line: &str) {
    if let Err(e) = writeln!(sink, "{line}").and_then(|()| sink.flush()) {
        log::warn!("Failed to write run log line '{line}': {e}");
    }
}
