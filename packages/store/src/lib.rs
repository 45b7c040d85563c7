#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Object store access for diff sync.
//!
//! The engine only needs two operations from a bucket: one page of a
//! prefix listing, and a single-object put from a local file. Both live on
//! the [`ObjectStore`] trait, implemented by [`s3::S3Store`] for real
//! buckets and [`memory::MemoryStore`] for tests.
//!
//! [`list_keys`] drains every listing page for a prefix into a
//! [`RemoteKeySet`].

pub mod config;
pub mod memory;
pub mod s3;

use std::path::Path;

use async_trait::async_trait;
use s3_diff_sync_models::RemoteKeySet;

pub use config::{ConfigError, StoreConfig};

/// Errors returned by object store calls.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A listing page request failed.
    #[error("Failed to list s3://{bucket}/{prefix}: {source}")]
    List {
        /// Bucket name.
        bucket: String,
        /// Key prefix.
        prefix: String,
        /// Underlying SDK error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// `PutObject` failed.
    #[error("Failed to upload s3://{bucket}/{key}: {source}")]
    Upload {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
        /// Underlying SDK error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The local file feeding an upload could not be read.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// Local file path.
        path: String,
        /// Underlying read error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// One page of a prefix listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Keys on this page.
    pub keys: Vec<String>,
    /// Token for the next page, `None` once the listing is exhausted.
    pub next_token: Option<String>,
}

/// The bucket operations diff sync consumes.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetches one page of keys under `prefix`, continuing from
    /// `continuation_token` when given.
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<&str>,
    ) -> Result<ListPage, StoreError>;

    /// Writes the full contents of `source` to `key`.
    async fn put_object(&self, bucket: &str, key: &str, source: &Path) -> Result<(), StoreError>;
}

/// Lists every key under `prefix`.
///
/// Follows continuation tokens until the store reports no further page, so
/// the returned set is complete. An empty prefix yields an empty set.
///
/// # Errors
///
/// Returns [`StoreError::List`] if any page request fails. No partial set
/// is returned in that case.
pub async fn list_keys(
    store: &dyn ObjectStore,
    bucket: &str,
    prefix: &str,
) -> Result<RemoteKeySet, StoreError> {
    log::info!("Listing s3://{bucket}/{prefix}*");

    let mut keys = RemoteKeySet::new();
    let mut continuation_token: Option<String> = None;
    let mut pages = 0u64;

    loop {
        let page = store
            .list_page(bucket, prefix, continuation_token.as_deref())
            .await?;
        pages += 1;
        keys.extend(page.keys);

        match page.next_token {
            Some(token) => continuation_token = Some(token),
            None => break,
        }
    }

    log::info!("  found {} objects in {pages} page(s)", keys.len());
    Ok(keys)
}
