//! Tagged key/value caches.
//!
//! Every expensive derived fact (line indexes, PHP class definitions, …)
//! lives in a [`TaggedCache`].  An entry is stored under a string key and
//! associated with any number of tags, usually the URIs of the files the
//! value was derived from.  Invalidating a tag removes every entry that
//! carries it, so a single "file changed" event can be fanned out to all
//! caches through the [`CacheManager`] without the cache owners knowing
//! anything about file events.
//!
//! There is no eviction policy beyond explicit tag invalidation.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

/// A key/value store with many-to-many key ↔ tag bookkeeping.
///
/// `key_tags` and `tag_keys` always mirror each other: a key appears under
/// a tag in one map exactly when the tag appears under the key in the
/// other, and neither map ever mentions a key that is not in `store`.
#[derive(Debug)]
pub struct TaggedCache<V> {
    name: &'static str,
    store: HashMap<String, V>,
    key_tags: HashMap<String, HashSet<String>>,
    tag_keys: HashMap<String, HashSet<String>>,
}

impl<V> TaggedCache<V> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            store: HashMap::new(),
            key_tags: HashMap::new(),
            tag_keys: HashMap::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Store `value` under `key`, replacing any previous value and tags.
    pub fn set(&mut self, key: &str, value: V, tags: &[&str]) {
        self.delete(key);
        self.store.insert(key.to_string(), value);

        let mut own_tags = HashSet::with_capacity(tags.len());
        for tag in tags {
            own_tags.insert(tag.to_string());
            self.tag_keys
                .entry(tag.to_string())
                .or_default()
                .insert(key.to_string());
        }
        if !own_tags.is_empty() {
            self.key_tags.insert(key.to_string(), own_tags);
        }
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.store.get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.store.contains_key(key)
    }

    /// Remove `key` and detach it from all of its tags.
    ///
    /// Returns `true` when a value was actually removed.
    pub fn delete(&mut self, key: &str) -> bool {
        let removed = self.store.remove(key).is_some();

        if let Some(tags) = self.key_tags.remove(key) {
            for tag in tags {
                if let Some(keys) = self.tag_keys.get_mut(&tag) {
                    keys.remove(key);
                    if keys.is_empty() {
                        self.tag_keys.remove(&tag);
                    }
                }
            }
        }

        removed
    }

    /// Return the cached value for `key`, computing and storing it first
    /// when absent.
    ///
    /// `compute` runs before anything is inserted, so it never observes a
    /// half-written entry.
    pub fn retrieve(&mut self, key: &str, compute: impl FnOnce() -> V, tags: &[&str]) -> &V {
        if !self.store.contains_key(key) {
            let value = compute();
            self.set(key, value, tags);
        }
        &self.store[key]
    }

    /// Remove every entry associated with `tag`.  Returns the number of
    /// removed entries.
    pub fn clear_by_tag(&mut self, tag: &str) -> usize {
        let Some(keys) = self.tag_keys.remove(tag) else {
            return 0;
        };

        let mut removed = 0;
        for key in keys {
            if self.delete(&key) {
                removed += 1;
            }
        }
        if removed > 0 {
            trace!(cache = self.name, tag, removed, "cleared cache entries by tag");
        }
        removed
    }

    pub fn clear(&mut self) {
        self.store.clear();
        self.key_tags.clear();
        self.tag_keys.clear();
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Tags currently attached to `key`.
    pub fn tags_of(&self, key: &str) -> Vec<&str> {
        self.key_tags
            .get(key)
            .map(|tags| tags.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Keys currently carrying `tag`.
    pub fn keys_of(&self, tag: &str) -> Vec<&str> {
        self.tag_keys
            .get(tag)
            .map(|keys| keys.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Check the key ↔ tag bookkeeping.
    pub fn is_consistent(&self) -> bool {
        let tags_ok = self.tag_keys.iter().all(|(tag, keys)| {
            !keys.is_empty()
                && keys.iter().all(|key| {
                    self.store.contains_key(key)
                        && self.key_tags.get(key).is_some_and(|t| t.contains(tag))
                })
        });
        let keys_ok = self.key_tags.iter().all(|(key, tags)| {
            self.store.contains_key(key)
                && tags
                    .iter()
                    .all(|tag| self.tag_keys.get(tag).is_some_and(|k| k.contains(key)))
        });
        tags_ok && keys_ok
    }
}

impl<V: Clone> TaggedCache<V> {
    pub fn get_cloned(&self, key: &str) -> Option<V> {
        self.store.get(key).cloned()
    }
}

/// Anything the [`CacheManager`] can invalidate when a file changes.
pub trait FileAffectedCache: Send {
    fn cache_name(&self) -> &'static str;
    fn invalidate_tag(&mut self, tag: &str) -> usize;
    fn invalidate_all(&mut self);
}

impl<V: Send> FileAffectedCache for TaggedCache<V> {
    fn cache_name(&self) -> &'static str {
        self.name
    }

    fn invalidate_tag(&mut self, tag: &str) -> usize {
        self.clear_by_tag(tag)
    }

    fn invalidate_all(&mut self) {
        self.clear();
    }
}

/// A cache registered with a [`CacheManager`] and shared between owners.
pub struct SharedCache<V> {
    inner: Arc<Mutex<TaggedCache<V>>>,
}

impl<V> Clone for SharedCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: Clone> SharedCache<V> {
    pub fn get(&self, key: &str) -> Option<V> {
        self.inner.lock().get_cloned(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.inner.lock().has(key)
    }

    pub fn set(&self, key: &str, value: V, tags: &[&str]) {
        self.inner.lock().set(key, value, tags);
    }

    pub fn delete(&self, key: &str) -> bool {
        self.inner.lock().delete(key)
    }

    pub fn clear_by_tag(&self, tag: &str) -> usize {
        self.inner.lock().clear_by_tag(tag)
    }

    /// Like [`TaggedCache::retrieve`], but the lock is released while
    /// `compute` runs, so computing one value may consult this cache again.
    /// If a nested call filled `key` in the meantime that value wins and the
    /// freshly computed one is dropped.
    pub fn retrieve(&self, key: &str, compute: impl FnOnce() -> V, tags: &[&str]) -> V {
        if let Some(value) = self.get(key) {
            return value;
        }

        let value = compute();

        let mut cache = self.inner.lock();
        if let Some(existing) = cache.get_cloned(key) {
            return existing;
        }
        cache.set(key, value.clone(), tags);
        value
    }

    pub fn with<R>(&self, f: impl FnOnce(&TaggedCache<V>) -> R) -> R {
        f(&self.inner.lock())
    }
}

/// Registry of every file-affected cache in the process.
///
/// One instance lives in the server [`Context`](crate::context::Context);
/// caches register themselves on creation and are invalidated together.
#[derive(Default)]
pub struct CacheManager {
    caches: Mutex<Vec<Arc<Mutex<dyn FileAffectedCache>>>>,
}

impl CacheManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new cache and register it for file invalidation.
    pub fn register<V: Send + 'static>(&self, name: &'static str) -> SharedCache<V> {
        let inner = Arc::new(Mutex::new(TaggedCache::new(name)));
        let erased: Arc<Mutex<dyn FileAffectedCache>> = inner.clone();
        self.caches.lock().push(erased);
        SharedCache { inner }
    }

    /// Drop every entry tagged with `uri` from every registered cache.
    pub fn invalidate_file(&self, uri: &str) -> usize {
        let caches = self.caches.lock();
        let mut removed = 0;
        for cache in caches.iter() {
            removed += cache.lock().invalidate_tag(uri);
        }
        trace!(uri, removed, "invalidated file in all caches");
        removed
    }

    pub fn clear_all(&self) {
        for cache in self.caches.lock().iter() {
            cache.lock().invalidate_all();
        }
    }

    pub fn cache_names(&self) -> Vec<&'static str> {
        self.caches
            .lock()
            .iter()
            .map(|cache| cache.lock().cache_name())
            .collect()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
