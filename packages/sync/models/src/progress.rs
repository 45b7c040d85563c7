//! Per-target progress for a sync run.
//!
//! `s3_diff_sync::run` sets the total to the number of targets and
//! advances once per finished target.

use std::sync::Arc;

/// Observer for a run's target-by-target progress.
pub trait ProgressCallback: Send + Sync {
    /// Number of targets in the run.
    fn set_total(&self, total: u64);

    /// `delta` more targets are done.
    fn inc(&self, delta: u64);

    /// Label of the target now being synced.
    fn set_message(&self, msg: String);

    /// The last target is done.
    fn finish(&self, msg: String);
}

/// Discards progress, for library callers and tests with no display.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// [`NullProgress`] in the `Arc` shape `s3_diff_sync::run` takes.
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
