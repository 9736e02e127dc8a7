//! Read-through cache with a per-entry time-to-live.
//!
//! Backs the administrative read paths that would otherwise refetch rarely
//! changing records from the store on every request. Eviction is lazy: an
//! entry expires on the read that finds it stale; there is no background
//! sweeper thread.

use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Debug)]
pub struct TtlCache<V> {
    ttl: Duration,
    entries: HashMap<String, (V, Instant)>,
}

impl<V> Default for TtlCache<V> {
    fn default() -> Self {
        TtlCache::new(DEFAULT_TTL)
    }
}

impl<V> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        TtlCache { ttl, entries: HashMap::new() }
    }

    /// Value for `key` if it was inserted less than the TTL ago. A stale
    /// entry is evicted and reported as a miss.
    pub fn get(&mut self, key: &str) -> Option<&V> {
        self.get_at(key, Instant::now())
    }

    /// Insert or overwrite unconditionally, refreshing the insertion time.
    pub fn set(&mut self, key: impl Into<String>, value: V) {
        self.set_at(key, value, Instant::now());
    }

    /// Drop every entry whose key starts with `prefix`, or everything when
    /// no prefix is given.
    pub fn invalidate(&mut self, prefix: Option<&str>) {
        match prefix {
            Some(p) => self.entries.retain(|key, _| !key.starts_with(p)),
            None => self.entries.clear(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn get_at(&mut self, key: &str, now: Instant) -> Option<&V> {
        let expired = match self.entries.get(key) {
            Some((_, inserted)) => now.duration_since(*inserted) >= self.ttl,
            None => return None,
        };
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|(value, _)| value)
    }

    fn set_at(&mut self, key: impl Into<String>, value: V, now: Instant) {
        self.entries.insert(key.into(), (value, now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_survives_until_ttl_then_disappears() {
        let mut cache = TtlCache::default();
        let t0 = Instant::now();
        cache.set_at("factory_1", "pump house A", t0);

        assert_eq!(cache.get_at("factory_1", t0 + Duration::from_secs(299)), Some(&"pump house A"));
        assert_eq!(cache.get_at("factory_1", t0 + Duration::from_secs(301)), None);
        // the stale read evicted it
        assert!(cache.is_empty());
    }

    #[test]
    fn expiry_boundary_is_a_miss() {
        let mut cache = TtlCache::new(Duration::from_secs(300));
        let t0 = Instant::now();
        cache.set_at("k", 1, t0);
        assert_eq!(cache.get_at("k", t0 + Duration::from_secs(300)), None);
    }

    #[test]
    fn set_overwrites_and_refreshes_age() {
        let mut cache = TtlCache::new(Duration::from_secs(300));
        let t0 = Instant::now();
        cache.set_at("k", 1, t0);
        cache.set_at("k", 2, t0 + Duration::from_secs(250));

        // old insertion time no longer applies
        assert_eq!(cache.get_at("k", t0 + Duration::from_secs(400)), Some(&2));
    }

    #[test]
    fn prefix_invalidation_spares_other_keys() {
        let mut cache = TtlCache::default();
        cache.set("factory_1", 1);
        cache.set("factory_2", 2);
        cache.set("user_9", 9);

        cache.invalidate(Some("factory_"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("user_9"), Some(&9));

        cache.invalidate(None);
        assert!(cache.is_empty());
    }
}
