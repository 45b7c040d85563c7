#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for one-way S3 diff sync of WordPress media.
//!
//! Uploads every file under `wp-content/uploads` and each
//! `wp-content/blogs.dir/{blog_id}` that is not already in the bucket.
//! Bucket credentials come from the `S3_UPLOADS_*` environment variables
//! (see [`s3_diff_sync_store::config`]).
//!
//! Exits non-zero when configuration is missing; individual upload
//! failures are reported in the run log and summary but do not change the
//! exit status.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use s3_diff_sync::report::{RunReporter, run_log_path};
use s3_diff_sync::walker::ExclusionRules;
use s3_diff_sync::{SyncContext, SyncOptions, dispatch::DEFAULT_CONCURRENCY, targets};
use s3_diff_sync_cli_utils::IndicatifProgress;
use s3_diff_sync_store::s3::S3Store;
use s3_diff_sync_store::{ObjectStore, StoreConfig};

#[derive(Parser)]
#[command(
    name = "s3_diff_sync",
    about = "Upload local WordPress media that is missing from S3"
)]
struct Cli {
    /// Path to the WordPress install root
    wp_path: PathBuf,
    /// Only sync `wp-content/blogs.dir/<BLOG_ID>`
    blog_id: Option<String>,
    /// Maximum number of concurrent uploads
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,
    /// Directory the timestamped run log is written to
    #[arg(long, default_value = "runs")]
    runs_dir: PathBuf,
    /// Additional file-name substring to exclude (repeatable)
    #[arg(long = "exclude", value_name = "SUBSTRING")]
    excludes: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = s3_diff_sync_cli_utils::init_logger();
    let cli = Cli::parse();

    let config = match StoreConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("S3 not configured: {e}");
            return Err(e.into());
        }
    };

    let wp_path = std::fs::canonicalize(&cli.wp_path)
        .map_err(|e| format!("Cannot resolve {}: {e}", cli.wp_path.display()))?;
    let discovery = targets::discover_targets(&wp_path, cli.blog_id.as_deref())?;

    let log_path = run_log_path(&cli.runs_dir, &chrono::Local::now());
    println!("Logging to {}", log_path.display());
    let reporter = RunReporter::open(&log_path)?;

    let exclusions = cli
        .excludes
        .iter()
        .fold(ExclusionRules::default(), |rules, p| rules.with_pattern(p.as_str()));
    let options = SyncOptions {
        concurrency: cli.concurrency.max(1),
        exclusions,
    };

    if let Some(path) = &config.bucket_path {
        log::info!("Ignoring bucket path '{path}', keys are relative to the install root");
    }
    log::info!(
        "Syncing {} target(s) from {} to s3://{} (concurrency={})",
        discovery.targets.len(),
        wp_path.display(),
        config.bucket,
        options.concurrency
    );

    let store: Arc<dyn ObjectStore> = Arc::new(S3Store::new(&config));
    let ctx = SyncContext::new(store, config.bucket.clone(), reporter, options);
    discovery.report_to(ctx.reporter());

    let start = Instant::now();
    let progress = IndicatifProgress::steps_bar(&multi, "Targets");
    s3_diff_sync::run(&ctx, &discovery.targets, Some(&progress)).await?;
    let summary = ctx.finalize();

    log::info!(
        "Sync complete in {:.1}s: {summary}",
        start.elapsed().as_secs_f64()
    );
    if summary.has_errors() {
        log::warn!("Some files were not synced, see {}", log_path.display());
    }
    println!("Total files processed: {}", summary.total_candidates);

    Ok(())
}
