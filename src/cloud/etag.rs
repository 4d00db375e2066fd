//! Cache-validation tokens keyed by URL.

use dashmap::DashMap;
use std::sync::Arc;

/// Last-seen ETag per cloud config URL.
///
/// Cloning is cheap and clones share the same underlying map, so one cache
/// built at startup can be handed to every fetcher. Entries live for the
/// life of the process; writes for different URLs never contend on the same
/// shard lock, and concurrent writes for one URL resolve last-write-wins.
#[derive(Clone, Debug, Default)]
pub struct EtagCache {
    inner: Arc<DashMap<String, String>>,
}

impl EtagCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached token for `url`, if a non-empty one is known.
    pub fn get(&self, url: &str) -> Option<String> {
        self.inner
            .get(url)
            .map(|entry| entry.value().clone())
            .filter(|etag| !etag.is_empty())
    }

    /// Record the token returned for `url`, overwriting any previous one.
    pub fn insert(&self, url: &str, etag: &str) {
        self.inner.insert(url.to_string(), etag.to_string());
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
