//! Bounded idle-expiring store for per-caller state.
//!
//! Entries unused for longer than the TTL are dropped, and the store never
//! holds more than `capacity` entries (the most idle entry makes room).
//! Backs the rate limiter's bucket map so the set of tracked callers
//! cannot grow without bound.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct TtlCache<K, V> {
    capacity: usize,
    ttl: Duration,
    entries: HashMap<K, Entry<V>>,
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    last_access: Instant,
}

impl<K: Eq + Hash + Clone, V> TtlCache<K, V> {
    /// Create a store holding at most `capacity` entries, each evicted
    /// after `ttl` of idleness.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Fetch the value for `key`, creating it with `make` on first sight.
    ///
    /// Expired entries are purged first; a full store evicts its most idle
    /// entry to make room. The returned entry's idle clock restarts.
    pub fn get_or_insert_with(&mut self, key: K, make: impl FnOnce() -> V) -> &mut V {
        let now = Instant::now();
        self.purge_expired(now);

        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            self.evict_most_idle();
        }

        let entry = self.entries.entry(key).or_insert_with(|| Entry {
            value: make(),
            last_access: now,
        });
        entry.last_access = now;
        &mut entry.value
    }

    /// Number of live entries. Expired entries linger until the next
    /// [`Self::get_or_insert_with`] call.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    fn purge_expired(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| now.duration_since(entry.last_access) < ttl);
    }

    fn evict_most_idle(&mut self) {
        let most_idle = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_access)
            .map(|(key, _)| key.clone());

        if let Some(key) = most_idle {
            self.entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG_TTL: Duration = Duration::from_secs(3600);

    #[test]
    fn test_basic_operations() {
        let mut cache: TtlCache<String, i32> = TtlCache::new(3, LONG_TTL);

        assert_eq!(*cache.get_or_insert_with("a".to_string(), || 1), 1);
        assert_eq!(*cache.get_or_insert_with("b".to_string(), || 2), 2);

        // Existing entries keep their value; the factory does not rerun
        assert_eq!(*cache.get_or_insert_with("a".to_string(), || 99), 1);
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&"a".to_string()));
        assert!(!cache.is_empty());
    }

    #[test]
    fn test_capacity_evicts_most_idle() {
        let mut cache: TtlCache<String, i32> = TtlCache::new(2, LONG_TTL);

        cache.get_or_insert_with("a".to_string(), || 1);
        std::thread::sleep(Duration::from_millis(5));
        cache.get_or_insert_with("b".to_string(), || 2);
        std::thread::sleep(Duration::from_millis(5));

        // Touch "a" so "b" becomes the most idle entry
        cache.get_or_insert_with("a".to_string(), || 1);
        cache.get_or_insert_with("c".to_string(), || 3);

        assert!(cache.contains(&"a".to_string()));
        assert!(!cache.contains(&"b".to_string()));
        assert!(cache.contains(&"c".to_string()));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_idle_entries_expire() {
        let mut cache: TtlCache<String, i32> = TtlCache::new(8, Duration::from_millis(30));

        cache.get_or_insert_with("a".to_string(), || 1);
        std::thread::sleep(Duration::from_millis(40));

        // The next access purges the expired entry and rebuilds it
        assert_eq!(*cache.get_or_insert_with("a".to_string(), || 2), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_mutation_through_reference() {
        let mut cache: TtlCache<String, Vec<i32>> = TtlCache::new(2, LONG_TTL);

        cache.get_or_insert_with("a".to_string(), Vec::new).push(1);
        cache.get_or_insert_with("a".to_string(), Vec::new).push(2);

        assert_eq!(
            cache.get_or_insert_with("a".to_string(), Vec::new).as_slice(),
            &[1, 2]
        );
    }
}
