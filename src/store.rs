//! Template store: signature-keyed layouts shared across operations

use crate::model::Template;
use lru::LruCache;
use parking_lot::RwLock;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Concurrent store of templates keyed by blank-document signature.
///
/// Readers take a shared lock and clone an `Arc`, so a reader always sees a
/// whole template. `put` replaces an entry wholesale under the exclusive
/// lock; the least recently written entry is evicted at capacity.
pub struct TemplateStore {
    inner: RwLock<LruCache<String, Arc<Template>>>,
}

impl TemplateStore {
    /// Create an empty store holding at most `capacity` templates
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: RwLock::new(LruCache::new(capacity)),
        }
    }

    /// Look up the template for `signature`
    pub fn get(&self, signature: &str) -> Option<Arc<Template>> {
        self.inner.read().peek(signature).cloned()
    }

    /// Store `template` under `signature`, replacing any previous entry
    pub fn put(&self, signature: String, template: Template) {
        let mut inner = self.inner.write();
        if inner.put(signature.clone(), Arc::new(template)).is_some() {
            tracing::debug!(signature = %signature, "replaced template");
        }
    }

    /// Remove the template for `signature`
    pub fn remove(&self, signature: &str) -> Option<Arc<Template>> {
        self.inner.write().pop(signature)
    }

    /// Check if a template exists for `signature`
    pub fn contains(&self, signature: &str) -> bool {
        self.inner.read().contains(signature)
    }

    /// Stored signatures, most recently written first
    pub fn signatures(&self) -> Vec<String> {
        self.inner.read().iter().map(|(k, _)| k.clone()).collect()
    }

    /// Snapshot of every stored template, most recently written first
    pub fn templates(&self) -> Vec<Arc<Template>> {
        self.inner.read().iter().map(|(_, v)| Arc::clone(v)).collect()
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl Default for TemplateStore {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldKey;
    use crate::model::Region;
    use std::collections::BTreeMap;
    use std::thread;

    fn template(signature: &str, fields: &[FieldKey]) -> Template {
        Template {
            signature: signature.to_string(),
            fields: fields
                .iter()
                .enumerate()
                .map(|(i, k)| (*k, Region::new(0, 100.0, 100.0 + 30.0 * i as f32, 150.0, 20.0)))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn test_store_basic_operations() {
        let store = TemplateStore::new(10);
        assert!(store.is_empty());
        assert!(store.get("v1:a").is_none());

        store.put("v1:a".to_string(), template("v1:a", &[FieldKey::CompanyName]));
        assert_eq!(store.len(), 1);
        assert!(store.contains("v1:a"));
        assert_eq!(
            store.get("v1:a").unwrap().fields.keys().copied().collect::<Vec<_>>(),
            vec![FieldKey::CompanyName]
        );
    }

    #[test]
    fn test_put_replaces_whole_template() {
        let store = TemplateStore::new(10);
        store.put(
            "v1:a".to_string(),
            template("v1:a", &[FieldKey::CompanyName, FieldKey::Phone]),
        );
        store.put("v1:a".to_string(), template("v1:a", &[FieldKey::Email]));

        let stored = store.get("v1:a").unwrap();
        assert_eq!(stored.fields.len(), 1);
        assert!(stored.fields.contains_key(&FieldKey::Email));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_capacity_eviction() {
        let store = TemplateStore::new(2);
        store.put("a".to_string(), template("a", &[]));
        store.put("b".to_string(), template("b", &[]));
        store.put("c".to_string(), template("c", &[]));

        assert!(!store.contains("a"));
        assert_eq!(store.signatures(), vec!["c".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_remove_and_clear() {
        let store = TemplateStore::new(4);
        store.put("a".to_string(), template("a", &[FieldKey::Phone]));
        store.put("b".to_string(), template("b", &[]));

        assert!(store.remove("a").is_some());
        assert!(store.remove("a").is_none());
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_concurrent_readers_never_see_torn_templates() {
        let store = Arc::new(TemplateStore::new(4));
        let small = template("s", &[FieldKey::CompanyName]);
        let large = template("s", &FieldKey::ALL);
        store.put("s".to_string(), small.clone());

        let writer = {
            let store = Arc::clone(&store);
            let (small, large) = (small.clone(), large.clone());
            thread::spawn(move || {
                for i in 0..200 {
                    let next = if i % 2 == 0 { large.clone() } else { small.clone() };
                    store.put("s".to_string(), next);
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                let (small, large) = (small.clone(), large.clone());
                thread::spawn(move || {
                    for _ in 0..200 {
                        let seen = store.get("s").unwrap();
                        assert!(*seen == small || *seen == large);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
