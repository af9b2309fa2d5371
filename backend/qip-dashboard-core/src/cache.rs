// src/cache.rs
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::clock::{span_from_secs, Clock};

pub const DEFAULT_CACHE_TTL_SECS: u64 = 5 * 60;
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 64;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: DateTime<Utc>,
}

/// Read-through cache with a fixed time-to-live. An entry older than the TTL is
/// never handed out; it is dropped on the access that finds it stale.
pub struct TtlCache<K, V> {
    ttl: Duration,
    max_entries: usize,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    pub fn new(ttl_secs: u64, max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl: span_from_secs(ttl_secs),
            max_entries: max_entries.max(1),
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn is_stale(&self, entry: &CacheEntry<V>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(entry.inserted_at) > self.ttl
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let stale = match entries.get(key) {
            Some(entry) if !self.is_stale(entry, now) => {
                debug!("Cache hit for key: {:?}", key);
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if stale {
            debug!("Cache stale for key: {:?}", key);
            entries.remove(key);
        } else {
            debug!("Cache miss for key: {:?}", key);
        }
        None
    }

    pub fn insert(&self, key: K, value: V) {
        let now = self.clock.now();
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.retain(|_, entry| now.signed_duration_since(entry.inserted_at) <= self.ttl);

        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
            }
        }

        entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: now,
            },
        );
    }

    pub fn invalidate(&self, key: &K) {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.remove(key);
    }

    #[cfg(test)]
    pub fn clear(&self) {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        match self.entries.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn cache_with_clock(ttl_secs: u64, max: usize) -> (TtlCache<String, u32>, ManualClock) {
        let clock = ManualClock::new("2026-02-10 09:00:00");
        let cache = TtlCache::new(ttl_secs, max, Arc::new(clock.clone()));
        (cache, clock)
    }

    #[test]
    fn fresh_write_is_returned_until_expiry() {
        let (cache, clock) = cache_with_clock(60, 8);
        cache.insert("employees:february_2026".to_string(), 7);

        clock.advance(Duration::seconds(59));
        assert_eq!(cache.get(&"employees:february_2026".to_string()), Some(7));

        clock.advance(Duration::seconds(1));
        assert_eq!(
            cache.get(&"employees:february_2026".to_string()),
            Some(7),
            "an entry exactly at the TTL boundary is still fresh"
        );
    }

    #[test]
    fn expired_entry_is_never_returned() {
        let (cache, clock) = cache_with_clock(60, 8);
        cache.insert("summary".to_string(), 1);
        clock.advance(Duration::seconds(61));
        assert_eq!(cache.get(&"summary".to_string()), None);
        assert_eq!(cache.len(), 0, "stale entry is dropped on access");
    }

    #[test]
    fn rewrite_resets_age() {
        let (cache, clock) = cache_with_clock(60, 8);
        cache.insert("k".to_string(), 1);
        clock.advance(Duration::seconds(50));
        cache.insert("k".to_string(), 2);
        clock.advance(Duration::seconds(50));
        assert_eq!(cache.get(&"k".to_string()), Some(2));
    }

    #[test]
    fn oldest_entry_evicted_when_full() {
        let (cache, clock) = cache_with_clock(600, 2);
        cache.insert("a".to_string(), 1);
        clock.advance(Duration::seconds(1));
        cache.insert("b".to_string(), 2);
        clock.advance(Duration::seconds(1));
        cache.insert("c".to_string(), 3);

        assert_eq!(cache.get(&"a".to_string()), None);
        assert_eq!(cache.get(&"b".to_string()), Some(2));
        assert_eq!(cache.get(&"c".to_string()), Some(3));
    }

    #[test]
    fn huge_ttl_is_capped_not_wrapped() {
        let (cache, clock) = cache_with_clock(u64::MAX, 8);
        cache.insert("k".to_string(), 1);
        clock.advance(Duration::days(365));
        assert_eq!(cache.get(&"k".to_string()), Some(1));
    }

    #[test]
    fn invalidate_removes_single_key() {
        let (cache, _clock) = cache_with_clock(600, 8);
        cache.insert("a".to_string(), 1);
        cache.insert("b".to_string(), 2);
        cache.invalidate(&"a".to_string());
        assert_eq!(cache.get(&"a".to_string()), None);
        assert_eq!(cache.get(&"b".to_string()), Some(2));
        cache.clear();
        assert_eq!(cache.len(), 0);
    }
}
