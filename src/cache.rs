//! Concurrency-safe TTL map.
//!
//! Entries expire lazily (an expired entry is never returned by [`TtlCache::get`])
//! and actively, via a periodic sweep started with [`TtlCache::start_sweeper`].
//! Readers share the lock; writers take it exclusively. No lock is ever held
//! across an await point.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::task::{spawn_periodic, BackgroundTask};

/// Cache operation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Keys must be non-empty.
    #[error("cache key must not be empty")]
    EmptyKey,

    /// No entry under the key.
    #[error("cache key not found")]
    NotFound,

    /// A writer panicked while holding the lock.
    #[error("cache lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

/// A string-keyed map whose entries expire after a TTL.
#[derive(Debug)]
pub struct TtlCache<V> {
    entries: RwLock<HashMap<String, Entry<V>>>,
    default_ttl: Duration,
    clock: SharedClock,
}

impl<V: Clone + Send + Sync + 'static> TtlCache<V> {
    /// Create an empty cache. A `ttl` of zero passed to [`set`](Self::set)
    /// means `default_ttl`.
    pub fn new(default_ttl: Duration, clock: SharedClock) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
            clock,
        }
    }

    /// The TTL applied when `set` is called with zero.
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Entry<V>>>, CacheError> {
        self.entries.read().map_err(|_| CacheError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Entry<V>>>, CacheError> {
        self.entries.write().map_err(|_| CacheError::Poisoned)
    }

    /// Insert or overwrite `key`.
    pub fn set(&self, key: &str, value: V, ttl: Duration) -> Result<(), CacheError> {
        if key.is_empty() {
            return Err(CacheError::EmptyKey);
        }
        let ttl = if ttl.is_zero() { self.default_ttl } else { ttl };
        let now = self.clock.now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        self.write()?
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    /// Look up `key`. Missing and expired entries both yield `None`.
    pub fn get(&self, key: &str) -> Result<Option<V>, CacheError> {
        let now = self.clock.now();
        let entries = self.read()?;
        Ok(entries
            .get(key)
            .filter(|entry| now < entry.expires_at)
            .map(|entry| entry.value.clone()))
    }

    /// Remove `key` whether or not it has expired.
    pub fn delete(&self, key: &str) -> Result<(), CacheError> {
        match self.write()?.remove(key) {
            Some(_) => Ok(()),
            None => Err(CacheError::NotFound),
        }
    }

    /// Remove every entry whose value matches `pred`. Returns the number removed.
    pub fn remove_where<F>(&self, pred: F) -> Result<usize, CacheError>
    where
        F: Fn(&V) -> bool,
    {
        let mut entries = self.write()?;
        let before = entries.len();
        entries.retain(|_, entry| !pred(&entry.value));
        Ok(before - entries.len())
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn entry_count(&self) -> Result<usize, CacheError> {
        Ok(self.read()?.len())
    }

    /// Evict expired entries.
    ///
    /// Expired keys are collected under the shared lock, then removed under the
    /// exclusive lock. An entry is removed only if it still carries the expiry
    /// seen in the first pass, so a key re-set in between survives.
    pub fn sweep_expired(&self) -> Result<usize, CacheError> {
        let expired = self.collect_expired(self.clock.now())?;
        if expired.is_empty() {
            return Ok(0);
        }
        self.evict(expired)
    }

    fn collect_expired(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<(String, DateTime<Utc>)>, CacheError> {
        let entries = self.read()?;
        Ok(entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, entry)| (key.clone(), entry.expires_at))
            .collect())
    }

    fn evict(&self, candidates: Vec<(String, DateTime<Utc>)>) -> Result<usize, CacheError> {
        let mut entries = self.write()?;
        let mut removed = 0;
        for (key, seen_expiry) in candidates {
            let stale = entries
                .get(&key)
                .is_some_and(|entry| entry.expires_at == seen_expiry);
            if stale {
                entries.remove(&key);
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Start a background task that calls [`sweep_expired`](Self::sweep_expired)
    /// every `interval`.
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) -> BackgroundTask {
        let cache = Arc::clone(self);
        spawn_periodic("cache-sweep", interval, move || {
            let cache = Arc::clone(&cache);
            async move {
                match cache.sweep_expired() {
                    Ok(0) => debug!("No expired cache entries to clean up"),
                    Ok(count) => info!(deleted_count = count, "Cleaned up expired cache entries"),
                    Err(e) => warn!(error = %e, "Failed to sweep cache"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};

    fn cache_with_clock() -> (TtlCache<String>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let cache = TtlCache::new(Duration::from_secs(4 * 3600), clock.clone());
        (cache, clock)
    }

    #[test]
    fn test_set_then_get() {
        let (cache, _) = cache_with_clock();
        cache.set("k", "v".to_string(), Duration::from_secs(60)).unwrap();
        assert_eq!(cache.get("k").unwrap(), Some("v".to_string()));
    }

    #[test]
    fn test_get_missing_key() {
        let (cache, _) = cache_with_clock();
        assert_eq!(cache.get("nope").unwrap(), None);
    }

    #[test]
    fn test_empty_key_rejected() {
        let (cache, _) = cache_with_clock();
        assert_eq!(
            cache.set("", "v".to_string(), Duration::from_secs(1)),
            Err(CacheError::EmptyKey)
        );
        assert_eq!(cache.entry_count().unwrap(), 0);
    }

    #[test]
    fn test_entry_expires_at_ttl_boundary() {
        let (cache, clock) = cache_with_clock();
        cache.set("k", "v".to_string(), Duration::from_secs(10)).unwrap();

        clock.advance(chrono::Duration::seconds(9));
        assert!(cache.get("k").unwrap().is_some());

        clock.advance(chrono::Duration::seconds(1));
        assert_eq!(cache.get("k").unwrap(), None);
    }

    #[test]
    fn test_zero_ttl_uses_default() {
        let (cache, clock) = cache_with_clock();
        cache.set("k", "v".to_string(), Duration::ZERO).unwrap();

        clock.advance(chrono::Duration::hours(4) - chrono::Duration::seconds(1));
        assert!(cache.get("k").unwrap().is_some());

        clock.advance(chrono::Duration::seconds(1));
        assert!(cache.get("k").unwrap().is_none());
    }

    #[test]
    fn test_set_overwrites() {
        let (cache, _) = cache_with_clock();
        cache.set("k", "a".to_string(), Duration::from_secs(60)).unwrap();
        cache.set("k", "b".to_string(), Duration::from_secs(60)).unwrap();
        assert_eq!(cache.get("k").unwrap(), Some("b".to_string()));
        assert_eq!(cache.entry_count().unwrap(), 1);
    }

    #[test]
    fn test_delete_is_not_idempotent() {
        let (cache, _) = cache_with_clock();
        cache.set("k", "v".to_string(), Duration::from_secs(60)).unwrap();

        assert_eq!(cache.delete("k"), Ok(()));
        assert_eq!(cache.delete("k"), Err(CacheError::NotFound));
        assert_eq!(cache.entry_count().unwrap(), 0);
    }

    #[test]
    fn test_delete_removes_expired_entry() {
        let (cache, clock) = cache_with_clock();
        cache.set("k", "v".to_string(), Duration::from_secs(1)).unwrap();
        clock.advance(chrono::Duration::seconds(5));
        assert_eq!(cache.delete("k"), Ok(()));
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let (cache, clock) = cache_with_clock();
        cache.set("short", "a".to_string(), Duration::from_secs(5)).unwrap();
        cache.set("long", "b".to_string(), Duration::from_secs(500)).unwrap();

        clock.advance(chrono::Duration::seconds(10));
        assert_eq!(cache.sweep_expired().unwrap(), 1);
        assert_eq!(cache.entry_count().unwrap(), 1);
        assert!(cache.get("long").unwrap().is_some());
    }

    #[test]
    fn test_sweep_spares_entry_reset_between_passes() {
        let (cache, clock) = cache_with_clock();
        cache.set("k", "old".to_string(), Duration::from_secs(5)).unwrap();
        clock.advance(chrono::Duration::seconds(10));

        let seen = cache.collect_expired(clock.now()).unwrap();
        assert_eq!(seen.len(), 1);

        // A Set lands between the read pass and the write pass.
        cache.set("k", "fresh".to_string(), Duration::from_secs(60)).unwrap();

        assert_eq!(cache.evict(seen).unwrap(), 0);
        assert_eq!(cache.get("k").unwrap(), Some("fresh".to_string()));
    }

    #[test]
    fn test_remove_where() {
        let (cache, _) = cache_with_clock();
        cache.set("a", "alice".to_string(), Duration::from_secs(60)).unwrap();
        cache.set("b", "alice".to_string(), Duration::from_secs(60)).unwrap();
        cache.set("c", "bob".to_string(), Duration::from_secs(60)).unwrap();

        assert_eq!(cache.remove_where(|v| v == "alice").unwrap(), 2);
        assert_eq!(cache.get("c").unwrap(), Some("bob".to_string()));
    }

    #[tokio::test]
    async fn test_sweeper_task_evicts() {
        let clock = Arc::new(ManualClock::starting_now());
        let cache = Arc::new(TtlCache::new(Duration::from_secs(60), clock.clone()));
        cache.set("k", "v".to_string(), Duration::from_secs(1)).unwrap();
        clock.advance(chrono::Duration::seconds(2));

        let sweeper = cache.start_sweeper(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(60)).await;
        sweeper.shutdown().await;

        assert_eq!(cache.entry_count().unwrap(), 0);
    }
}
