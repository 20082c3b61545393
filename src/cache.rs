//! Freshness-aware caching of upstream responses.
//!
//! Every upstream integration owns one [`Cached`] instance per logical
//! resource. An entry is served until its `valid_until` instant passes;
//! after that the next lookup fetches a replacement and derives the new
//! expiration from the fetched payload itself, so each integration can
//! encode its provider's publishing cadence.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Result;

/// Current unix timestamp in seconds.
#[must_use]
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

/// Expiration `duration` from now, for resources with a fixed shelf life
/// unrelated to payload content.
#[must_use]
pub fn valid_for(duration: chrono::Duration) -> i64 {
    unix_now() + duration.num_seconds()
}

/// A cached item together with the instant it goes stale (unix seconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub item: T,
    pub valid_until: i64,
}

impl<T> CacheEntry<T> {
    /// Whether the entry is still servable at `now`.
    #[must_use]
    pub fn is_fresh_at(&self, now: i64) -> bool {
        now < self.valid_until
    }
}

/// Fetch strategy for one [`Cached`] instance: how to obtain an item on a
/// cache miss and how long that item stays fresh.
///
/// `valid_until` runs after every successful fetch and returns the unix
/// timestamp at which the new item goes stale. Returning `0` marks the item
/// immediately stale, forcing a refetch on the very next lookup (used when a
/// payload carries no usable timestamp).
#[async_trait]
pub trait FetchSource: Send + Sync {
    type Arg: Send;
    type Item: Clone + Send + Sync;

    async fn fetch(&self, arg: Self::Arg) -> Result<Self::Item>;

    async fn valid_until(&self, key: &str, item: &Self::Item) -> Result<i64>;
}

/// Key/value store serving entries until they expire, refetching through its
/// [`FetchSource`] otherwise.
///
/// Entries are replaced wholesale on refresh and never evicted; key
/// cardinality is bounded by the coordinates and stations seen in practice.
/// Misses on the same key are deduplicated: one fetch is outstanding per key
/// and concurrent callers wait for it, then read the freshly stored entry.
pub struct Cached<S: FetchSource> {
    label: String,
    source: S,
    entries: RwLock<HashMap<String, CacheEntry<S::Item>>>,
    fetch_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S: FetchSource> Cached<S> {
    pub fn new(label: impl Into<String>, source: S) -> Self {
        Self {
            label: label.into(),
            source,
            entries: RwLock::new(HashMap::new()),
            fetch_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the stored entry for `key` while it is fresh; otherwise
    /// fetches a new item with `arg`, computes its expiration, and stores the
    /// replacement entry.
    ///
    /// # Errors
    ///
    /// Fetch and expiration-calculation failures propagate unchanged and
    /// leave the stale-or-absent slot as it was.
    pub async fn get(&self, key: &str, arg: S::Arg) -> Result<CacheEntry<S::Item>> {
        if let Some(entry) = self.fresh_entry(key) {
            debug!(cache = %self.label, key, "cache hit");
            return Ok(entry);
        }

        // One outstanding fetch per key; latecomers wait, then re-check.
        let key_lock = self.key_lock(key);
        let _guard = key_lock.lock().await;
        if let Some(entry) = self.fresh_entry(key) {
            debug!(cache = %self.label, key, "cache hit after in-flight fetch");
            return Ok(entry);
        }

        let started = Instant::now();
        let item = self.source.fetch(arg).await?;
        let valid_until = self.source.valid_until(key, &item).await?;
        let entry = CacheEntry { item, valid_until };
        self.entries
            .write()
            .expect("cache map poisoned")
            .insert(key.to_owned(), entry.clone());
        debug!(
            cache = %self.label,
            key,
            valid_until,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "cache miss, fetched"
        );
        Ok(entry)
    }

    fn fresh_entry(&self, key: &str) -> Option<CacheEntry<S::Item>> {
        let entries = self.entries.read().expect("cache map poisoned");
        entries
            .get(key)
            .filter(|entry| entry.is_fresh_at(unix_now()))
            .cloned()
    }

    fn key_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.fetch_locks.lock().expect("fetch lock map poisoned");
        Arc::clone(locks.entry(key.to_owned()).or_default())
    }
}
