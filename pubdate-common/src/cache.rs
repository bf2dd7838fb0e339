//! Bounded, time-limited key/value cache.
//!
//! Entries expire after a fixed TTL. When an insert would push the cache past
//! its ceiling, the older half of the entries (by insertion order) are evicted
//! in one sweep instead of one at a time.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    inserted: Instant,
    seq: u64,
}

/// Thread-safe cache shared by cloning.
///
/// ```
/// use std::time::Duration;
/// use pubdate_common::cache::BoundedCache;
///
/// let cache = BoundedCache::new(Duration::from_secs(60), 4);
/// cache.insert("a", 1);
/// assert_eq!(cache.get(&"a"), Some(1));
/// ```
#[derive(Debug)]
pub struct BoundedCache<K, V>
where
    K: Eq + Hash,
{
    entries: Arc<DashMap<K, Entry<V>>>,
    seq: Arc<AtomicU64>,
    ttl: Duration,
    max_entries: usize,
}

impl<K: Eq + Hash, V> Clone for BoundedCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            seq: Arc::clone(&self.seq),
            ttl: self.ttl,
            max_entries: self.max_entries,
        }
    }
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            seq: Arc::new(AtomicU64::new(0)),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Live value for `key`; expired entries are dropped on the way.
    pub fn get(&self, key: &K) -> Option<V> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.inserted.elapsed() < self.ttl => {
                return Some(entry.value.clone())
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    pub fn insert(&self, key: K, value: V) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            self.purge_oldest_half();
        }
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(
            key,
            Entry {
                value,
                inserted: Instant::now(),
                seq,
            },
        );
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|(_, e)| e.value)
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    fn purge_oldest_half(&self) {
        let mut order: Vec<(u64, K)> = self
            .entries
            .iter()
            .map(|e| (e.value().seq, e.key().clone()))
            .collect();
        order.sort_unstable_by_key(|(seq, _)| *seq);
        let evict = (order.len() / 2).max(1);
        for (_, key) in order.into_iter().take(evict) {
            self.entries.remove(&key);
        }
        tracing::debug!(target: "cache", evicted = evict, "cache.purge");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_exceeds_ceiling_and_keeps_newest() {
        let cache = BoundedCache::new(Duration::from_secs(60), 10);
        for i in 0..25 {
            cache.insert(i, i * 2);
            assert!(cache.len() <= 10);
        }
        assert_eq!(cache.get(&24), Some(48));
        assert_eq!(cache.get(&0), None);
    }

    #[test]
    fn purge_drops_older_half() {
        let cache = BoundedCache::new(Duration::from_secs(60), 4);
        for i in 0..4 {
            cache.insert(i, ());
        }
        cache.insert(99, ());
        assert_eq!(cache.len(), 3);
        assert!(cache.get(&0).is_none());
        assert!(cache.get(&1).is_none());
        assert!(cache.get(&2).is_some());
        assert!(cache.get(&99).is_some());
    }

    #[test]
    fn overwriting_existing_key_does_not_purge() {
        let cache = BoundedCache::new(Duration::from_secs(60), 2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("a", 3);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"a"), Some(3));
    }

    #[test]
    fn zero_ttl_expires_immediately() {
        let cache = BoundedCache::new(Duration::ZERO, 8);
        cache.insert("k", "v");
        assert_eq!(cache.get(&"k"), None);
        assert!(cache.is_empty());
    }
}
