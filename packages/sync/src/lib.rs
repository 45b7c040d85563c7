#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! One-way diff sync of local directory trees into an S3 bucket.
//!
//! For each [`SyncTarget`] the bucket prefix is listed once, the local
//! tree is walked, and only files whose key is absent from the listing are
//! uploaded. Nothing is ever deleted remotely, and an existing key is never
//! re-uploaded regardless of content.
//!
//! ## Pipeline
//!
//! 1. [`s3_diff_sync_store::list_keys`] drains the prefix listing into a
//!    [`RemoteKeySet`](s3_diff_sync_models::RemoteKeySet).
//! 2. [`walker::walk`] streams local files, dropping excluded names.
//! 3. [`paths::to_key`] maps each file to its key and
//!    [`diff::classify`] checks it against the set.
//! 4. [`dispatch::UploadDispatcher`] uploads the missing ones with bounded
//!    concurrency.
//! 5. [`report::RunReporter`] counts every outcome and appends it to the
//!    run log.
//!
//! Per-file failures never abort a run; they are counted and logged.

pub mod diff;
pub mod dispatch;
pub mod paths;
pub mod report;
pub mod targets;
pub mod walker;

use std::sync::Arc;

use futures::StreamExt as _;
use s3_diff_sync_models::progress::ProgressCallback;
use s3_diff_sync_models::{Candidate, Classification, RunSummary, SyncTarget, UploadOutcome};
use s3_diff_sync_store::ObjectStore;

use crate::dispatch::{DEFAULT_CONCURRENCY, UploadDispatcher};
use crate::report::RunReporter;
use crate::walker::{ExclusionRules, WalkItem};

/// Errors raised while mapping paths or checking targets.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A path mapped to a key outside its expected root.
    #[error("Path {path} is not inside {root}")]
    InvariantViolation {
        /// Offending path (or expected key, for prefix mismatches).
        path: String,
        /// Root it should have been under.
        root: String,
    },

    /// A path has no UTF-8 representation to use as a key.
    #[error("Path {path} is not valid UTF-8")]
    NonUtf8Path {
        /// Lossy rendering of the path.
        path: String,
    },
}

/// Tunables for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Maximum concurrent uploads (values below 1 mean 1).
    pub concurrency: usize,
    /// File names that are never uploaded.
    pub exclusions: ExclusionRules,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            exclusions: ExclusionRules::default(),
        }
    }
}

/// Everything one run needs, built once and passed to each target.
pub struct SyncContext {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    reporter: RunReporter,
    options: SyncOptions,
}

impl SyncContext {
    /// Creates a context for one run.
    #[must_use]
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        reporter: RunReporter,
        options: SyncOptions,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            reporter,
            options,
        }
    }

    /// The run's reporter.
    #[must_use]
    pub const fn reporter(&self) -> &RunReporter {
        &self.reporter
    }

    /// Closes the run log and returns the final totals.
    #[must_use]
    pub fn finalize(self) -> RunSummary {
        self.reporter.finalize()
    }
}

/// Checks that keys under `target.local_root` land under `target.prefix`.
///
/// If they did not, every file would look missing from the listing and be
/// re-uploaded to the wrong place.
fn check_target(target: &SyncTarget) -> Result<(), SyncError> {
    let root_key = paths::to_key(&target.local_root, &target.key_root)?;
    if format!("{root_key}{}", paths::KEY_SEPARATOR) != target.prefix {
        return Err(SyncError::InvariantViolation {
            path: format!("{root_key}{}", paths::KEY_SEPARATOR),
            root: target.prefix.clone(),
        });
    }
    Ok(())
}

/// Syncs one target and returns its share of the run totals.
///
/// A listing failure is recorded against the target and nothing is
/// uploaded for it, since an incomplete listing would make existing
/// objects look missing. Per-file failures are recorded as outcomes.
///
/// # Errors
///
/// Returns [`SyncError::InvariantViolation`] if the target's local root
/// does not map onto its prefix.
pub async fn sync_target(ctx: &SyncContext, target: &SyncTarget) -> Result<RunSummary, SyncError> {
    check_target(target)?;

    let reporter = &ctx.reporter;
    let before = reporter.summary();

    log::info!(
        "Processing {} ({} -> s3://{}/{})",
        target.label,
        target.local_root.display(),
        ctx.bucket,
        target.prefix
    );
    reporter.note(&format!("Processing {}", target.label));

    let listing = s3_diff_sync_store::list_keys(ctx.store.as_ref(), &ctx.bucket, &target.prefix);
    let remote = match listing.await {
        Ok(keys) => keys,
        Err(e) => {
            log::error!("Skipping {}: {e}", target.label);
            reporter.record_list_failure(&target.prefix, &e);
            return Ok(reporter.summary().since(&before));
        }
    };

    let mut files_seen = 0u64;
    let missing = walker::walk(&target.local_root, &ctx.options.exclusions).filter_map(|item| {
        match item {
            WalkItem::Unreadable { path, message } => {
                reporter.record_unreadable(path.as_deref(), &message);
                None
            }
            WalkItem::Excluded(path) => {
                reporter.record_excluded(&path);
                None
            }
            WalkItem::File(path) => {
                files_seen += 1;
                let remote_key = match paths::to_key(&path, &target.key_root) {
                    Ok(key) => key,
                    Err(e) => {
                        log::error!("{e}");
                        reporter.record(&UploadOutcome::errored(
                            path.display().to_string(),
                            e.to_string(),
                        ));
                        return None;
                    }
                };
                let candidate = Candidate {
                    local_path: path,
                    remote_key,
                };
                match diff::classify(&candidate, &remote) {
                    Classification::Exists => {
                        log::debug!("Exists in S3: {}", candidate.remote_key);
                        reporter.record(&UploadOutcome::exists(candidate.remote_key));
                        None
                    }
                    Classification::Missing => Some(candidate),
                }
            }
        }
    });

    let dispatcher = UploadDispatcher::new(ctx.store.as_ref(), &ctx.bucket);
    dispatcher
        .dispatch_all(missing, ctx.options.concurrency)
        .for_each(|outcome| {
            reporter.record(&outcome);
            futures::future::ready(())
        })
        .await;

    if files_seen == 0 {
        log::warn!("No files found in {}", target.local_root.display());
        reporter.note(&format!(
            "No files found in {}",
            target.local_root.display()
        ));
    }

    let summary = reporter.summary().since(&before);
    if summary.skipped_excluded > 0 {
        log::warn!(
            "{}: excluded {} file(s) by name",
            target.label,
            summary.skipped_excluded
        );
    }
    log::info!("{}: {summary}", target.label);

    Ok(summary)
}

/// Syncs every target in order.
///
/// Targets are processed one at a time to bound the number of open store
/// connections. `progress` advances once per finished target.
///
/// # Errors
///
/// Stops at the first target that fails [`sync_target`]'s invariant check.
pub async fn run(
    ctx: &SyncContext,
    targets: &[SyncTarget],
    progress: Option<&Arc<dyn ProgressCallback>>,
) -> Result<RunSummary, SyncError> {
    if let Some(p) = progress {
        p.set_total(targets.len() as u64);
    }

    for target in targets {
        if let Some(p) = progress {
            p.set_message(target.label.clone());
        }
        sync_target(ctx, target).await?;
        if let Some(p) = progress {
            p.inc(1);
        }
    }

    let summary = ctx.reporter.summary();
    if let Some(p) = progress {
        p.finish(format!("Synced {} target(s)", targets.len()));
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::fs;
    use std::path::PathBuf;
    use std::time::Duration;

    use s3_diff_sync_models::progress::null_progress;
    use s3_diff_sync_store::memory::MemoryStore;

    use super::*;

    const BUCKET: &str = "media";

    /// Builds a small install under a fresh temp dir.
    fn install(name: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("s3_diff_sync_lib_{name}"));
        let _ = fs::remove_dir_all(&root);
        let uploads = root.join("wp-content/uploads");
        fs::create_dir_all(uploads.join("2024/05")).unwrap();
        fs::write(uploads.join("2024/05/a.jpg"), b"a").unwrap();
        fs::write(uploads.join("2024/05/b.jpg"), b"b").unwrap();
        fs::write(uploads.join("c.pdf"), b"c").unwrap();
        fs::write(uploads.join("access.htaccess"), b"deny").unwrap();
        fs::write(uploads.join("2024/run-2024.log"), b"log").unwrap();
        let blog = root.join("wp-content/blogs.dir/2/files");
        fs::create_dir_all(&blog).unwrap();
        fs::write(blog.join("d.png"), b"d").unwrap();
        root
    }

    fn context(store: &Arc<MemoryStore>, concurrency: usize) -> SyncContext {
        let store: Arc<dyn ObjectStore> = store.clone();
        SyncContext::new(
            store,
            BUCKET,
            RunReporter::with_sink(std::io::sink()),
            SyncOptions {
                concurrency,
                ..SyncOptions::default()
            },
        )
    }

    fn key_set(store: &MemoryStore) -> BTreeSet<String> {
        store.keys(BUCKET).into_iter().collect()
    }

    fn expected_keys() -> BTreeSet<String> {
        [
            "wp-content/uploads/2024/05/a.jpg",
            "wp-content/uploads/2024/05/b.jpg",
            "wp-content/uploads/c.pdf",
            "wp-content/blogs.dir/2/files/d.png",
        ]
        .into_iter()
        .map(str::to_string)
        .collect()
    }

    #[tokio::test]
    async fn uploads_exactly_the_local_tree_minus_exclusions() {
        let root = install("complete");
        let store = Arc::new(MemoryStore::new().with_page_size(2));
        let ctx = context(&store, 4);

        let targets = targets::discover_targets(&root, None).unwrap().targets;
        let summary = run(&ctx, &targets, Some(&null_progress())).await.unwrap();

        assert_eq!(key_set(&store), expected_keys());
        assert_eq!(summary.total_candidates, 4);
        assert_eq!(summary.uploaded, 4);
        assert_eq!(summary.skipped_excluded, 2);
        assert_eq!(summary.errored, 0);
        assert!(
            !key_set(&store)
                .iter()
                .any(|k| k.contains(".htaccess") || k.contains(".log"))
        );

        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn second_run_uploads_nothing() {
        let root = install("idempotent");
        let store = Arc::new(MemoryStore::new());
        let targets = targets::discover_targets(&root, None).unwrap().targets;

        let first = context(&store, 10);
        run(&first, &targets, None).await.unwrap();
        let puts_after_first = store.put_calls();

        let second = context(&store, 10);
        let summary = run(&second, &targets, None).await.unwrap();

        assert_eq!(store.put_calls(), puts_after_first);
        assert_eq!(summary.uploaded, 0);
        assert_eq!(summary.skipped_existing, 4);
        assert_eq!(summary.total_candidates, 4);

        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn only_missing_keys_are_uploaded() {
        let root = install("partial_remote");
        let store = Arc::new(MemoryStore::new());
        store.insert(BUCKET, "wp-content/uploads/c.pdf", b"old");
        store.insert(BUCKET, "wp-content/uploads/stale.jpg", b"remote only");

        let ctx = context(&store, 2);
        let target = targets::uploads_target(&root);
        let summary = sync_target(&ctx, &target).await.unwrap();

        assert_eq!(summary.uploaded, 2);
        assert_eq!(summary.skipped_existing, 1);
        // Existing object is untouched and remote-only keys are kept.
        assert_eq!(
            store.get(BUCKET, "wp-content/uploads/c.pdf").as_deref(),
            Some(&b"old"[..])
        );
        assert!(store.get(BUCKET, "wp-content/uploads/stale.jpg").is_some());

        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn excluded_files_are_never_uploaded_even_if_remote_is_empty() {
        let root = std::env::temp_dir().join("s3_diff_sync_lib_excluded_only");
        let _ = fs::remove_dir_all(&root);
        let uploads = root.join("wp-content/uploads");
        fs::create_dir_all(&uploads).unwrap();
        fs::write(uploads.join("access.htaccess"), b"x").unwrap();
        fs::write(uploads.join("run-2024.log"), b"x").unwrap();

        let store = Arc::new(MemoryStore::new());
        let ctx = context(&store, 10);
        let summary = sync_target(&ctx, &targets::uploads_target(&root))
            .await
            .unwrap();

        assert!(store.keys(BUCKET).is_empty());
        assert_eq!(store.put_calls(), 0);
        assert_eq!(summary.total_candidates, 0);
        assert_eq!(summary.skipped_excluded, 2);

        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn failed_upload_is_counted_and_the_rest_continue() {
        let root = std::env::temp_dir().join("s3_diff_sync_lib_partial_failure");
        let _ = fs::remove_dir_all(&root);
        let uploads = root.join("wp-content/uploads");
        fs::create_dir_all(&uploads).unwrap();
        for i in 1..=10 {
            fs::write(uploads.join(format!("{i}.jpg")), b"x").unwrap();
        }

        let store = Arc::new(MemoryStore::new());
        store.fail_puts_to("wp-content/uploads/5.jpg");
        let ctx = context(&store, 3);
        let summary = sync_target(&ctx, &targets::uploads_target(&root))
            .await
            .unwrap();

        assert_eq!(summary.total_candidates, 10);
        assert_eq!(summary.uploaded, 9);
        assert_eq!(summary.errored, 1);
        assert_eq!(store.put_calls(), 10);
        assert!(store.get(BUCKET, "wp-content/uploads/5.jpg").is_none());

        let final_summary = ctx.finalize();
        assert_eq!(final_summary.errored, 1);

        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn listing_failure_skips_target_without_uploading() {
        let root = install("list_failure");
        let store = Arc::new(MemoryStore::new());
        store.fail_listing_after(0);

        let ctx = context(&store, 10);
        let targets = targets::discover_targets(&root, None).unwrap().targets;
        let summary = run(&ctx, &targets, None).await.unwrap();

        assert_eq!(summary.failed_targets, targets.len() as u64);
        assert_eq!(summary.total_candidates, 0);
        assert_eq!(store.put_calls(), 0);

        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn pipeline_respects_concurrency_bound() {
        let root = std::env::temp_dir().join("s3_diff_sync_lib_bound");
        let _ = fs::remove_dir_all(&root);
        let uploads = root.join("wp-content/uploads");
        fs::create_dir_all(&uploads).unwrap();
        for i in 0..30 {
            fs::write(uploads.join(format!("{i}.bin")), b"x").unwrap();
        }

        let store = Arc::new(MemoryStore::new().with_put_delay(Duration::from_millis(10)));
        let ctx = context(&store, 3);
        let summary = sync_target(&ctx, &targets::uploads_target(&root))
            .await
            .unwrap();

        assert_eq!(summary.uploaded, 30);
        assert!(store.max_in_flight() <= 3);

        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn empty_target_reports_no_files() {
        let root = std::env::temp_dir().join("s3_diff_sync_lib_empty");
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(root.join("wp-content/uploads")).unwrap();
        let log = root.join("runs").join("run.log");

        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
        let ctx = SyncContext::new(
            store,
            BUCKET,
            RunReporter::open(&log).unwrap(),
            SyncOptions::default(),
        );
        let summary = sync_target(&ctx, &targets::uploads_target(&root))
            .await
            .unwrap();
        assert_eq!(summary, RunSummary::default());
        let _ = ctx.finalize();

        let contents = fs::read_to_string(&log).unwrap();
        assert!(contents.contains("Processing uploads"));
        assert!(contents.contains("No files found in"));
        assert!(contents.contains("Summary: 0 candidates"));

        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn mismatched_prefix_fails_loudly() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
        let ctx = SyncContext::new(
            store,
            BUCKET,
            RunReporter::with_sink(std::io::sink()),
            SyncOptions::default(),
        );
        let target = SyncTarget {
            label: "bad".to_string(),
            prefix: "wp-content/uploads/".to_string(),
            local_root: PathBuf::from("/srv/wp/wp-content/blogs.dir/1"),
            key_root: PathBuf::from("/srv/wp"),
        };

        let err = sync_target(&ctx, &target).await.unwrap_err();
        assert!(matches!(err, SyncError::InvariantViolation { .. }));

        let outside = SyncTarget {
            key_root: PathBuf::from("/elsewhere"),
            ..target
        };
        let err = run(&ctx, &[outside], None).await.unwrap_err();
        assert!(matches!(err, SyncError::InvariantViolation { .. }));
        assert_eq!(ctx.reporter().summary(), RunSummary::default());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unreadable_entry_is_counted_and_siblings_still_upload() {
        let root = std::env::temp_dir().join("s3_diff_sync_lib_dangling");
        let _ = fs::remove_dir_all(&root);
        let uploads = root.join("wp-content/uploads");
        fs::create_dir_all(&uploads).unwrap();
        fs::write(uploads.join("ok.jpg"), b"x").unwrap();
        std::os::unix::fs::symlink(uploads.join("nope"), uploads.join("dangling")).unwrap();

        let store = Arc::new(MemoryStore::new());
        let ctx = context(&store, 4);
        let summary = sync_target(&ctx, &targets::uploads_target(&root))
            .await
            .unwrap();

        assert_eq!(summary.unreadable, 1);
        assert_eq!(summary.uploaded, 1);
        assert_eq!(summary.total_candidates, 1);
        assert!(summary.has_errors());
        assert_eq!(
            store.keys(BUCKET),
            vec!["wp-content/uploads/ok.jpg".to_string()]
        );

        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn unlistable_blogs_dir_still_syncs_uploads() {
        let root = std::env::temp_dir().join("s3_diff_sync_lib_blogs_file");
        let _ = fs::remove_dir_all(&root);
        let uploads = root.join("wp-content/uploads");
        fs::create_dir_all(&uploads).unwrap();
        fs::write(uploads.join("a.jpg"), b"a").unwrap();
        fs::write(root.join("wp-content/blogs.dir"), b"not a dir").unwrap();

        let store = Arc::new(MemoryStore::new());
        let ctx = context(&store, 4);
        let discovery = targets::discover_targets(&root, None).unwrap();
        discovery.report_to(ctx.reporter());
        let summary = run(&ctx, &discovery.targets, None).await.unwrap();

        assert_eq!(
            store.keys(BUCKET),
            vec!["wp-content/uploads/a.jpg".to_string()]
        );
        assert_eq!(summary.uploaded, 1);
        assert_eq!(summary.unreadable, 1);

        let _ = fs::remove_dir_all(&root);
    }
}
