//! Uploads of missing candidates.
//!
//! Each candidate becomes exactly one [`UploadOutcome`]; a failed put is
//! recorded as [`UploadStatus::Errored`](s3_diff_sync_models::UploadStatus)
//! and never stops the rest of the batch. Failed uploads are not retried.

use futures::stream::{self, Stream, StreamExt as _};
use s3_diff_sync_models::{Candidate, UploadOutcome};
use s3_diff_sync_store::ObjectStore;

/// Default number of concurrent puts.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Puts candidates into one bucket.
pub struct UploadDispatcher<'a> {
    store: &'a dyn ObjectStore,
    bucket: &'a str,
}

impl<'a> UploadDispatcher<'a> {
    /// Creates a dispatcher writing to `bucket` through `store`.
    #[must_use]
    pub const fn new(store: &'a dyn ObjectStore, bucket: &'a str) -> Self {
        Self { store, bucket }
    }

    /// Uploads one candidate, converting any failure into an outcome.
    pub async fn dispatch(&self, candidate: Candidate) -> UploadOutcome {
        let Candidate {
            local_path,
            remote_key,
        } = candidate;

        match self
            .store
            .put_object(self.bucket, &remote_key, &local_path)
            .await
        {
            Ok(()) => {
                log::info!(
                    "Uploaded {} -> s3://{}/{remote_key}",
                    local_path.display(),
                    self.bucket
                );
                UploadOutcome::uploaded(remote_key)
            }
            Err(e) => {
                log::error!("Error uploading {remote_key}: {e}");
                UploadOutcome::errored(remote_key, e.to_string())
            }
        }
    }

    /// Uploads every candidate with at most `concurrency` puts in flight.
    ///
    /// Candidates are pulled lazily, so at most `concurrency` of them are
    /// held at once. With a limit of 1 outcomes arrive in candidate order;
    /// otherwise they arrive in completion order.
    pub fn dispatch_all<'s, I>(
        &'s self,
        candidates: I,
        concurrency: usize,
    ) -> impl Stream<Item = UploadOutcome> + 's
    where
        I: IntoIterator<Item = Candidate>,
        I::IntoIter: 's,
    {
        stream::iter(candidates)
            .map(move |candidate| self.dispatch(candidate))
            .buffer_unordered(concurrency.max(1))
    }
}
