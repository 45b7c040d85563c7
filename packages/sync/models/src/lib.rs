#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Data types for one-way local-to-bucket diff sync.
//!
//! A run is a sequence of [`SyncTarget`]s. For each target the remote keys
//! under its prefix are collected into a [`RemoteKeySet`], every local file
//! becomes a [`Candidate`], and each candidate ends in exactly one
//! [`UploadOutcome`] which is folded into the [`RunSummary`].

pub mod progress;

use std::collections::HashSet;
use std::path::PathBuf;

use strum_macros::Display;

/// One local tree mapped onto one key prefix in the bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTarget {
    /// Human-readable name used in logs (e.g. `"blog 12"`).
    pub label: String,
    /// Key prefix the target's objects live under, always ending in `/`.
    pub prefix: String,
    /// Directory that is walked for candidate files.
    pub local_root: PathBuf,
    /// Directory that remote keys are made relative to.
    ///
    /// Keys for files under [`Self::local_root`] start with
    /// [`Self::prefix`] because `local_root` is `key_root/prefix`.
    pub key_root: PathBuf,
}

/// A local file considered for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Absolute path of the file on disk.
    pub local_path: PathBuf,
    /// Key the file is stored under in the bucket.
    pub remote_key: String,
}

/// Result of checking a [`Candidate`] against the remote key set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Classification {
    /// No object exists under the candidate's key.
    Missing,
    /// An object already exists under the candidate's key.
    Exists,
}

/// Why a candidate was not uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SkipReason {
    /// The key is already present in the bucket.
    AlreadyExists,
}

/// Terminal state of one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadStatus {
    /// The object was written to the bucket.
    Uploaded,
    /// Nothing was written.
    Skipped(SkipReason),
    /// The put (or the local read feeding it) failed.
    Errored(String),
}

/// Outcome of one candidate, keyed by its remote key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    /// Remote key of the candidate.
    pub key: String,
    /// What happened to it.
    pub status: UploadStatus,
}

impl UploadOutcome {
    /// Outcome for a successful put.
    #[must_use]
    pub fn uploaded(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            status: UploadStatus::Uploaded,
        }
    }

    /// Outcome for a candidate whose key is already in the bucket.
    #[must_use]
    pub fn exists(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            status: UploadStatus::Skipped(SkipReason::AlreadyExists),
        }
    }

    /// Outcome for a failed put.
    #[must_use]
    pub fn errored(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            status: UploadStatus::Errored(message.into()),
        }
    }
}

/// Every key present under one prefix.
///
/// Only ever built from a fully consumed listing, so a missing key is an
/// authoritative negative.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteKeySet {
    keys: HashSet<String>,
}

impl RemoteKeySet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a key, returning `false` if it was already present.
    pub fn insert(&mut self, key: impl Into<String>) -> bool {
        self.keys.insert(key.into())
    }

    /// Returns `true` if `key` exists remotely.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if the prefix holds no objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Iterates over the keys in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for RemoteKeySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl<S: Into<String>> Extend<S> for RemoteKeySet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        self.keys.extend(iter.into_iter().map(Into::into));
    }
}

/// Counters accumulated over a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Files that were diffed against the bucket.
    pub total_candidates: u64,
    /// Candidates written to the bucket.
    pub uploaded: u64,
    /// Candidates skipped because their key already existed.
    pub skipped_existing: u64,
    /// Files skipped by an exclusion rule (not candidates).
    pub skipped_excluded: u64,
    /// Candidates whose upload failed.
    pub errored: u64,
    /// Directories or entries the walker could not read.
    pub unreadable: u64,
    /// Targets abandoned because their listing failed.
    pub failed_targets: u64,
}

impl RunSummary {
    /// Folds one candidate outcome into the counters.
    pub const fn record(&mut self, status: &UploadStatus) {
        self.total_candidates += 1;
        match status {
            UploadStatus::Uploaded => self.uploaded += 1,
            UploadStatus::Skipped(SkipReason::AlreadyExists) => self.skipped_existing += 1,
            UploadStatus::Errored(_) => self.errored += 1,
        }
    }

    /// Merge another summary into this one.
    pub const fn merge(&mut self, other: Self) {
        self.total_candidates += other.total_candidates;
        self.uploaded += other.uploaded;
        self.skipped_existing += other.skipped_existing;
        self.skipped_excluded += other.skipped_excluded;
        self.errored += other.errored;
        self.unreadable += other.unreadable;
        self.failed_targets += other.failed_targets;
    }

    /// Counters accumulated since `earlier` was taken.
    #[must_use]
    pub const fn since(&self, earlier: &Self) -> Self {
        Self {
            total_candidates: self.total_candidates.saturating_sub(earlier.total_candidates),
            uploaded: self.uploaded.saturating_sub(earlier.uploaded),
            skipped_existing: self.skipped_existing.saturating_sub(earlier.skipped_existing),
            skipped_excluded: self.skipped_excluded.saturating_sub(earlier.skipped_excluded),
            errored: self.errored.saturating_sub(earlier.errored),
            unreadable: self.unreadable.saturating_sub(earlier.unreadable),
            failed_targets: self.failed_targets.saturating_sub(earlier.failed_targets),
        }
    }

    /// Returns `true` if anything went wrong during the run.
    #[must_use]
    pub const fn has_errors(&self) -> bool {
        self.errored > 0 || self.unreadable > 0 || self.failed_targets > 0
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} candidates: {} uploaded, {} already existed, {} errored; \
             {} excluded, {} unreadable, {} failed targets",
            self.total_candidates,
            self.uploaded,
            self.skipped_existing,
            self.errored,
            self.skipped_excluded,
            self.unreadable,
            self.failed_targets,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_counts_each_status_once() {
        let mut summary = RunSummary::default();
        summary.record(&UploadStatus::Uploaded);
        summary.record(&UploadStatus::Skipped(SkipReason::AlreadyExists));
        summary.record(&UploadStatus::Errored("boom".to_string()));
        summary.record(&UploadStatus::Uploaded);

        assert_eq!(summary.total_candidates, 4);
        assert_eq!(summary.uploaded, 2);
        assert_eq!(summary.skipped_existing, 1);
        assert_eq!(summary.errored, 1);
        assert!(summary.has_errors());
    }

    #[test]
    fn merge_adds_every_counter() {
        let mut a = RunSummary {
            total_candidates: 3,
            uploaded: 1,
            skipped_existing: 2,
            skipped_excluded: 1,
            ..RunSummary::default()
        };
        let b = RunSummary {
            total_candidates: 1,
            errored: 1,
            unreadable: 2,
            failed_targets: 1,
            ..RunSummary::default()
        };
        a.merge(b);

        assert_eq!(a.total_candidates, 4);
        assert_eq!(a.uploaded, 1);
        assert_eq!(a.skipped_existing, 2);
        assert_eq!(a.skipped_excluded, 1);
        assert_eq!(a.errored, 1);
        assert_eq!(a.unreadable, 2);
        assert_eq!(a.failed_targets, 1);

        let delta = a.since(&b);
        assert_eq!(delta.total_candidates, 3);
        assert_eq!(delta.errored, 0);
        assert_eq!(delta.skipped_existing, 2);
    }

    #[test]
    fn remote_key_set_dedupes() {
        let mut set: RemoteKeySet = ["a", "b"].into_iter().collect();
        assert!(!set.insert("a"));
        assert!(set.insert("c"));
        assert_eq!(set.len(), 3);
        assert!(set.contains("b"));
        assert!(!set.contains("d"));
    }

    #[test]
    fn skip_reason_renders_snake_case() {
        assert_eq!(SkipReason::AlreadyExists.to_string(), "already_exists");
    }
}
