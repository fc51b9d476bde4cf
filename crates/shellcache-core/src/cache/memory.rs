use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BlobCache, CacheStorage};
use crate::error::StorageResult;
use crate::models::{CachedResponse, Response};

/// In-process cache storage. Nothing outlives the value.
#[derive(Default)]
pub struct MemoryCacheStorage {
    caches: RwLock<HashMap<String, Arc<MemoryBlobCache>>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn cache_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> StorageResult<Arc<dyn BlobCache>> {
        let mut caches = self.caches.write().await;
        let cache = caches
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryBlobCache::new(name)));
        Ok(Arc::clone(cache) as Arc<dyn BlobCache>)
    }

    async fn delete(&self, name: &str) -> StorageResult<bool> {
        // Handles opened earlier keep working but are detached from storage.
        Ok(self.caches.write().await.remove(name).is_some())
    }

    async fn has(&self, name: &str) -> StorageResult<bool> {
        Ok(self.caches.read().await.contains_key(name))
    }
}

pub struct MemoryBlobCache {
    name: String,
    entries: RwLock<BTreeMap<String, CachedResponse>>,
}

impl MemoryBlobCache {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: RwLock::new(BTreeMap::new()),
        }
    }
}

#[async_trait]
impl BlobCache for MemoryBlobCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup(&self, key: &str) -> StorageResult<Option<CachedResponse>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, response: &Response) -> StorageResult<()> {
        let entry = CachedResponse::new(key, response.clone());
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }
}
