//! Bounded cache of filled outputs, addressable by key for chaining

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

struct Entries {
    lru: LruCache<String, Vec<u8>>,
    bytes: usize,
}

/// Filled documents kept for later `{"cache_key"}` sources.
///
/// Bounded both by entry count and by total bytes; least recently used
/// outputs go first.
pub struct OutputCache {
    entries: Mutex<Entries>,
    max_bytes: usize,
}

impl OutputCache {
    pub fn new(max_entries: usize, max_bytes: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(Entries {
                lru: LruCache::new(capacity),
                bytes: 0,
            }),
            max_bytes,
        }
    }

    /// Store `data` under a fresh key and return the key, or `None` when the
    /// output alone exceeds the byte budget
    pub fn insert(&self, data: Vec<u8>) -> Option<String> {
        if data.len() > self.max_bytes {
            return None;
        }
        let key = self.unused_key();
        self.put(key.clone(), data);
        Some(key)
    }

    /// Store `data` under `key`, evicting old outputs until it fits.
    /// Outputs larger than the whole budget are dropped.
    pub fn put(&self, key: String, data: Vec<u8>) {
        let size = data.len();
        if size > self.max_bytes {
            return;
        }

        let mut entries = self.entries.lock();
        if let Some(old) = entries.lru.pop(&key) {
            entries.bytes = entries.bytes.saturating_sub(old.len());
        }
        while entries.bytes + size > self.max_bytes {
            match entries.lru.pop_lru() {
                Some((_, evicted)) => entries.bytes = entries.bytes.saturating_sub(evicted.len()),
                None => break,
            }
        }
        if let Some((_, evicted)) = entries.lru.push(key, data) {
            entries.bytes = entries.bytes.saturating_sub(evicted.len());
        }
        entries.bytes += size;
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.lock().lru.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().lru.contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().lru.is_empty()
    }

    /// Bytes currently held
    pub fn total_bytes(&self) -> usize {
        self.entries.lock().bytes
    }

    fn unused_key(&self) -> String {
        let entries = self.entries.lock();
        loop {
            let key = uuid::Uuid::new_v4().to_string();
            if !entries.lru.contains(&key) {
                return key;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_returns_uuid_key() {
        let cache = OutputCache::new(10, 1024);
        let key = cache.insert(vec![1, 2, 3]).unwrap();

        assert_eq!(key.len(), 36);
        assert_eq!(cache.get(&key), Some(vec![1, 2, 3]));
        assert_eq!(cache.total_bytes(), 3);
    }

    #[test]
    fn test_entry_limit_evicts_oldest() {
        let cache = OutputCache::new(2, 1024);
        cache.put("blank".to_string(), vec![1]);
        cache.put("filled".to_string(), vec![2]);
        cache.put("refilled".to_string(), vec![3]);

        assert!(!cache.contains("blank"));
        assert!(cache.contains("filled"));
        assert!(cache.contains("refilled"));
        assert_eq!(cache.total_bytes(), 2);
    }

    #[test]
    fn test_byte_budget_evicts_oldest() {
        let cache = OutputCache::new(10, 100);
        cache.put("a".to_string(), vec![0u8; 30]);
        cache.put("b".to_string(), vec![0u8; 30]);
        cache.put("c".to_string(), vec![0u8; 30]);
        cache.put("d".to_string(), vec![0u8; 30]);

        assert!(!cache.contains("a"));
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.total_bytes(), 90);
    }

    #[test]
    fn test_oversized_output_is_not_cached() {
        let cache = OutputCache::new(10, 50);
        assert_eq!(cache.insert(vec![0u8; 100]), None);
        assert!(cache.is_empty());
        assert_eq!(cache.total_bytes(), 0);
    }

    #[test]
    fn test_replacing_a_key_updates_bytes() {
        let cache = OutputCache::new(10, 1024);
        cache.put("out".to_string(), vec![0u8; 50]);
        cache.put("out".to_string(), vec![0u8; 30]);
        assert_eq!(cache.total_bytes(), 30);
        assert_eq!(cache.len(), 1);
    }
}
