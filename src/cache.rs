// =============================================================================
// Response Cache: time-boxed keyed store
// =============================================================================
//
// Entries are replaced wholesale on `put` and judged stale only when read:
// a hit requires `now - stored_at < ttl`. Nothing is evicted in the
// background except by an explicit `purge_expired` (driven by the sweeper
// task in `main`).
// =============================================================================

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    payload: V,
    stored_at: i64,
}

/// Thread-safe TTL cache keyed by string.
pub struct ResponseCache<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    ttl_ms: i64,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(ttl_ms: i64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl_ms,
        }
    }

    /// Return the payload for `key` if it was stored less than one TTL ago.
    pub fn get(&self, key: &str, now: i64) -> Option<V> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        if now - entry.stored_at < self.ttl_ms {
            debug!(key, age_ms = now - entry.stored_at, "cache hit");
            Some(entry.payload.clone())
        } else {
            debug!(key, "cache entry stale");
            None
        }
    }

    /// Store `payload` under `key`, overwriting any previous entry.
    pub fn put(&self, key: impl Into<String>, payload: V, now: i64) {
        self.entries.write().insert(
            key.into(),
            CacheEntry {
                payload,
                stored_at: now,
            },
        );
    }

    /// Drop entries that can no longer be served. Returns how many were
    /// removed.
    pub fn purge_expired(&self, now: i64) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| now - entry.stored_at < self.ttl_ms);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: i64 = 5 * 60 * 1000;

    #[test]
    fn hit_just_before_ttl_miss_after() {
        let cache = ResponseCache::new(TTL);
        cache.put("indicators:BTC", 42, 1_000);

        assert_eq!(cache.get("indicators:BTC", 1_000 + TTL - 1), Some(42));
        assert_eq!(cache.get("indicators:BTC", 1_000 + TTL + 1), None);
    }

    #[test]
    fn exactly_ttl_old_is_stale() {
        let cache = ResponseCache::new(TTL);
        cache.put("k", "v".to_string(), 0);
        assert!(cache.get("k", TTL).is_none());
    }

    #[test]
    fn unknown_key_misses() {
        let cache: ResponseCache<u8> = ResponseCache::new(TTL);
        assert!(cache.get("nope", 0).is_none());
    }

    #[test]
    fn put_overwrites_and_refreshes() {
        let cache = ResponseCache::new(TTL);
        cache.put("k", 1, 0);
        cache.put("k", 2, TTL);
        assert_eq!(cache.get("k", TTL + 10), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn stale_entries_persist_until_purged() {
        let cache = ResponseCache::new(TTL);
        cache.put("old", 1, 0);
        cache.put("new", 2, TTL);

        assert!(cache.get("old", TTL + 1).is_none());
        assert_eq!(cache.len(), 2);

        assert_eq!(cache.purge_expired(TTL + 1), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("new", TTL + 1), Some(2));
    }
}
