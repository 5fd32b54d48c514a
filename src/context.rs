//! Process-wide services threaded through the server.
//!
//! One [`Context`] is created by the [`Backend`](crate::Backend) and shared
//! by every workspace.  It owns the [`CacheManager`] and the caches that
//! are keyed independently of any single workspace.
use std::sync::Arc;

use crate::cache::{CacheManager, SharedCache};
use crate::located::LineIndex;
use crate::php::ClassDefinition;

pub struct Context {
    pub caches: CacheManager,
    /// Line start tables, keyed and tagged by file URI.
    pub line_indexes: SharedCache<Arc<LineIndex>>,
    /// Resolved PHP classes, keyed by FQCN and tagged by the class file URI.
    pub classes: SharedCache<Arc<ClassDefinition>>,
}

impl Context {
    pub fn new() -> Self {
        let caches = CacheManager::new();
        let line_indexes = caches.register("line_indexes");
        let classes = caches.register("classes");
        Self {
            caches,
            line_indexes,
            classes,
        }
    }

    /// The line index for `uri`, built from `text` on a miss.
    pub fn line_index(&self, uri: &str, text: &str) -> Arc<LineIndex> {
        self.line_indexes
            .retrieve(uri, || Arc::new(LineIndex::new(text)), &[uri])
    }

    /// Drop everything derived from `uri`.
    pub fn invalidate_file(&self, uri: &str) -> usize {
        self.caches.invalidate_file(uri)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
