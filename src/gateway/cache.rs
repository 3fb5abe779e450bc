// =============================================================================
// TTL cache — short-lived caching of exchange responses keyed by symbol
// =============================================================================
//
// Kline series and 24h tickers are re-used across an analysis and across
// scanner sweeps within the same short window; re-fetching on every call
// would burn rate-limit budget for no benefit. Entries expire on read.
// =============================================================================

use std::time::{Duration, Instant};

use dashmap::DashMap;

struct CacheEntry<T> {
    value: T,
    expires_at: Instant,
}

/// A `DashMap`-backed cache where every entry carries its own expiry.
pub struct TtlCache<K, V> {
    entries: DashMap<K, CacheEntry<V>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: std::hash::Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self { entries: DashMap::new(), ttl }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > Instant::now() {
                return Some(entry.value.clone());
            }
        }
        self.entries.remove(key);
        None
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries.insert(key, CacheEntry { value, expires_at: Instant::now() + self.ttl });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_entry_is_returned() {
        let cache: TtlCache<String, i32> = TtlCache::new(Duration::from_secs(30));
        cache.insert("BTCUSDT".to_string(), 42);
        assert_eq!(cache.get(&"BTCUSDT".to_string()), Some(42));
    }

    #[test]
    fn expired_entry_is_evicted_on_read() {
        let cache: TtlCache<String, i32> = TtlCache::new(Duration::from_millis(0));
        cache.insert("BTCUSDT".to_string(), 42);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(&"BTCUSDT".to_string()), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn missing_key_returns_none() {
        let cache: TtlCache<String, i32> = TtlCache::new(Duration::from_secs(30));
        assert_eq!(cache.get(&"ETHUSDT".to_string()), None);
    }
}
