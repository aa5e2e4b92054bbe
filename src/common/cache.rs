// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Thread-safe LRU cache with per-entry expiry.
//!
//! Poll tasks write the latest reading of every device under a string key
//! and the exporters read them back. Entries older than their TTL are
//! treated as missing so a stuck collector never serves stale data.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::lock;

struct Entry<V> {
    value: V,
    expires_at: Instant,
    last_used: u64,
}

struct Inner<K, V> {
    entries: HashMap<K, Entry<V>>,
    clock: u64,
}

impl<K, V> Inner<K, V> {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

pub struct LruCache<K, V> {
    capacity: usize,
    inner: Mutex<Inner<K, V>>,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates a cache holding at most `capacity` entries (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(Inner {
                entries: HashMap::with_capacity(capacity),
                clock: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Inserts or replaces `key`, evicting the least recently used entry
    /// when the cache is full.
    pub fn set(&self, key: K, value: V, ttl: Duration) {
        let mut inner = lock(&self.inner);
        let now = Instant::now();
        let last_used = inner.tick();

        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.capacity {
            inner.entries.retain(|_, entry| entry.expires_at > now);
            if inner.entries.len() >= self.capacity {
                let oldest = inner
                    .entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.last_used)
                    .map(|(key, _)| key.clone());
                if let Some(oldest) = oldest {
                    inner.entries.remove(&oldest);
                }
            }
        }

        inner.entries.insert(
            key,
            Entry {
                value,
                expires_at: now + ttl,
                last_used,
            },
        );
    }

    /// Returns a clone of the value if present and not expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = lock(&self.inner);
        let expired = match inner.entries.get(key) {
            None => return None,
            Some(entry) => entry.expires_at <= Instant::now(),
        };
        if expired {
            inner.entries.remove(key);
            return None;
        }
        let last_used = inner.tick();
        inner.entries.get_mut(key).map(|entry| {
            entry.last_used = last_used;
            entry.value.clone()
        })
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        lock(&self.inner).entries.remove(key).map(|entry| entry.value)
    }

    /// Number of stored entries, expired ones included until they are touched.
    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock(&self.inner).entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn test_set_and_get() {
        let cache = LruCache::new(4);
        cache.set("chip-0", 42u32, TTL);
        assert_eq!(cache.get(&"chip-0"), Some(42));
        assert_eq!(cache.get(&"chip-1"), None);
    }

    #[test]
    fn test_replace_keeps_size() {
        let cache = LruCache::new(2);
        cache.set("a", 1, TTL);
        cache.set("a", 2, TTL);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"a"), Some(2));
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = LruCache::new(2);
        cache.set("a", 1, TTL);
        cache.set("b", 2, TTL);
        // touching "a" makes "b" the eviction candidate
        assert_eq!(cache.get(&"a"), Some(1));
        cache.set("c", 3, TTL);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"c"), Some(3));
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let cache = LruCache::new(2);
        cache.set("a", 1, Duration::ZERO);
        assert_eq!(cache.get(&"a"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_expired_entries_evicted_first() {
        let cache = LruCache::new(2);
        cache.set("stale", 1, Duration::ZERO);
        cache.set("fresh", 2, TTL);
        cache.set("new", 3, TTL);
        assert_eq!(cache.get(&"fresh"), Some(2));
        assert_eq!(cache.get(&"new"), Some(3));
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let cache = LruCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.set(1, "x", TTL);
        cache.set(2, "y", TTL);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&2), Some("y"));
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = LruCache::new(4);
        cache.set("a", 1, TTL);
        cache.set("b", 2, TTL);
        assert_eq!(cache.remove(&"a"), Some(1));
        assert_eq!(cache.remove(&"a"), None);
        cache.clear();
        assert!(cache.is_empty());
    }
}
