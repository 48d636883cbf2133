use async_trait::async_trait;
use model::records::{outcome::FileContent, work_item::WorkItem};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

/// Content cache consulted before every fetch.
///
/// Keys are opaque to the engine; they come from the caller's [`CacheKeyFn`].
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Option<FileContent>;
    async fn put(&self, key: &str, value: FileContent);
}

/// Derives cache keys from work items.
pub type CacheKeyFn = Arc<dyn Fn(&WorkItem) -> String + Send + Sync>;

pub fn default_cache_key() -> CacheKeyFn {
    Arc::new(|item: &WorkItem| format!("{}:{}", item.repo.full_name, item.path))
}

/// Process-local cache, mostly useful for tests and one-shot CLI runs.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCache {
    entries: Arc<Mutex<HashMap<String, FileContent>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> Option<FileContent> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    async fn put(&self, key: &str, value: FileContent) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), value);
        }
    }
}
