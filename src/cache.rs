use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::interval;
use tracing::debug;
use crate::clock::Clock;

// Cache entry with absolute expiry
#[derive(Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub hit_rate: f64, // percent, two decimals
    pub size: usize,
}

/// Key/value store where every entry carries its own TTL.
///
/// Expired entries are treated as misses and removed on read; anything never
/// read again is cleaned up by [`cache_sweeper`].
pub struct TtlCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            clock,
        }
    }

    pub fn set(&self, key: impl Into<String>, value: V, ttl: std::time::Duration) {
        let ttl = Duration::from_std(ttl).unwrap_or(Duration::zero());
        let expires_at = self.clock.now() + ttl;
        self.entries.insert(key.into(), CacheEntry { value, expires_at });
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();

        if let Some(entry) = self.entries.get(key) {
            if now < entry.expires_at {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
        }

        // guard from get() must be released before removing
        self.entries.remove_if(key, |_, entry| now >= entry.expires_at);
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.sets.store(0, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    // Remove every expired entry, returns how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| now < entry.expires_at);
        before.saturating_sub(self.entries.len())
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64 * 10_000.0).round() / 100.0
        } else {
            0.0
        };

        CacheStats {
            hits,
            misses,
            sets: self.sets.load(Ordering::Relaxed),
            hit_rate,
            size: self.entries.len(),
        }
    }
}

// Single periodic sweep instead of one timer per set()
pub async fn cache_sweeper<V: Clone>(cache: Arc<TtlCache<V>>, every: std::time::Duration) {
    let mut interval = interval(every);

    loop {
        interval.tick().await;

        let removed = cache.purge_expired();
        if removed > 0 {
            debug!(removed, remaining = cache.len(), "swept expired cache entries");
        }
        crate::metrics::CACHE_SIZE.set(cache.len() as f64);
    }
}
