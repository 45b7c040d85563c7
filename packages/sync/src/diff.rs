//! Existence check of candidates against a prefix listing.

use s3_diff_sync_models::{Candidate, Classification, RemoteKeySet};

/// Classifies `candidate` by key membership in `remote`.
///
/// No network access; the set was built once for the whole prefix.
#[must_use]
pub fn classify(candidate: &Candidate, remote: &RemoteKeySet) -> Classification {
    if remote.contains(&candidate.remote_key) {
        Classification::Exists
    } else {
        Classification::Missing
    }
}
