//! Lazily filled, TTL-bounded credential cache.
//!
//! # Purpose
//! Holds derived key pairs and certificate snapshots so the credential store
//! and the derivation path run at most once per key per TTL window.
//!
//! # Concurrency model
//! A single `tokio::sync::Mutex` guards both the lookup and the fill, and is
//! held across the fill future. Fills for the same key are therefore totally
//! ordered and a burst of concurrent misses triggers exactly one computation.
//! The lock is coarse (not per key) because the key space is tiny: a few
//! rotation intervals plus a handful of certificate ids.
//!
//! # Failure and cancellation
//! An entry is inserted only after the fill succeeds. A failed fill, or a
//! caller that drops the pending future, leaves the map untouched, so the
//! next caller simply retries.
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

pub struct CredentialCache<V> {
    name: &'static str,
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
}

impl<V: Clone + Send> CredentialCache<V> {
    /// `name` labels log lines and the fill counter.
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached value for `key`, or run `compute` and cache its
    /// result for the configured TTL.
    ///
    /// Errors from `compute` are returned unchanged and are not cached.
    pub async fn get_or_compute<F, Fut, E>(&self, key: &str, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        if let Some(entry) = entries.get(key)
            && entry.expires_at > now
        {
            return Ok(entry.value.clone());
        }
        // Expired entries are dropped before the fill so a failed refresh
        // cannot keep serving stale material.
        entries.remove(key);

        let value = compute().await?;
        entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        metrics::counter!("anontoken_cache_fills_total", "kind" => self.name).increment(1);
        tracing::debug!(cache = self.name, key, "credential cache filled");
        Ok(value)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
