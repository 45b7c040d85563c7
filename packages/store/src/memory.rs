//! In-memory [`ObjectStore`] for tests and local experiments.
//!
//! Keys are kept sorted so listings paginate deterministically. The store
//! can be told to fail specific puts or later listing pages, and it tracks
//! how many puts were in flight at once.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::{ListPage, ObjectStore, StoreError};

const DEFAULT_PAGE_SIZE: usize = 1000;

/// Bucket contents keyed by `(bucket, key)`.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<(String, String), Vec<u8>>>,
    page_size: Option<usize>,
    put_delay: Duration,
    failing_keys: Mutex<HashSet<String>>,
    fail_list_after: Mutex<Option<usize>>,
    list_calls: AtomicUsize,
    put_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryStore {
    /// Creates an empty store returning up to 1000 keys per page.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of keys per listing page (minimum 1).
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size.max(1));
        self
    }

    /// Makes every put sleep for `delay` before completing.
    #[must_use]
    pub const fn with_put_delay(mut self, delay: Duration) -> Self {
        self.put_delay = delay;
        self
    }

    /// Stores an object directly, bypassing [`ObjectStore::put_object`].
    pub fn insert(&self, bucket: &str, key: &str, data: &[u8]) {
        if let Ok(mut objects) = self.objects.lock() {
            objects.insert((bucket.to_string(), key.to_string()), data.to_vec());
        }
    }

    /// Makes puts to `key` fail with [`StoreError::Upload`].
    pub fn fail_puts_to(&self, key: &str) {
        if let Ok(mut failing) = self.failing_keys.lock() {
            failing.insert(key.to_string());
        }
    }

    /// Makes every listing call after the first `calls` fail.
    pub fn fail_listing_after(&self, calls: usize) {
        if let Ok(mut limit) = self.fail_list_after.lock() {
            *limit = Some(calls);
        }
    }

    /// Returns the stored bytes for `key`, if present.
    #[must_use]
    pub fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .ok()?
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Returns every key in `bucket`, sorted.
    #[must_use]
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.objects.lock().map_or_else(
            |_| Vec::new(),
            |objects| {
                objects
                    .keys()
                    .filter(|(b, _)| b == bucket)
                    .map(|(_, k)| k.clone())
                    .collect()
            },
        )
    }

    /// Number of listing calls served so far.
    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Number of put calls received so far, including failed ones.
    #[must_use]
    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    /// Highest number of puts that were running at the same time.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn page_size(&self) -> usize {
        self.page_size.unwrap_or(DEFAULT_PAGE_SIZE)
    }
}

/// Decrements the in-flight counter when a put finishes, however it ends.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, high_water: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        high_water.fetch_max(now, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<&str>,
    ) -> Result<ListPage, StoreError> {
        let call = self.list_calls.fetch_add(1, Ordering::SeqCst);
        let fail_after = self.fail_list_after.lock().ok().and_then(|limit| *limit);
        if fail_after.is_some_and(|limit| call >= limit) {
            return Err(StoreError::List {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
                source: "simulated listing failure".into(),
            });
        }

        let objects = self.objects.lock().map_err(|e| StoreError::List {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            source: e.to_string().into(),
        })?;

        // The token is the last key of the previous page.
        let mut matching = objects
            .keys()
            .filter(|(b, k)| b == bucket && k.starts_with(prefix))
            .map(|(_, k)| k)
            .filter(|k| continuation_token.is_none_or(|token| k.as_str() > token));

        let keys: Vec<String> = matching.by_ref().take(self.page_size()).cloned().collect();
        let next_token = if matching.next().is_some() {
            keys.last().cloned()
        } else {
            None
        };

        Ok(ListPage { keys, next_token })
    }

    async fn put_object(&self, bucket: &str, key: &str, source: &Path) -> Result<(), StoreError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlight::enter(&self.in_flight, &self.max_in_flight);

        let data = tokio::fs::read(source)
            .await
            .map_err(|e| StoreError::Read {
                path: source.display().to_string(),
                source: Box::new(e),
            })?;

        if !self.put_delay.is_zero() {
            tokio::time::sleep(self.put_delay).await;
        }

        let should_fail = self
            .failing_keys
            .lock()
            .is_ok_and(|failing| failing.contains(key));
        if should_fail {
            return Err(StoreError::Upload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                source: "simulated transport failure".into(),
            });
        }

        self.insert(bucket, key, &data);
        Ok(())
    }
}
