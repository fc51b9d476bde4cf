//! Named blob caches.
//!
//! The engine talks to storage through two traits:
//! - `CacheStorage`: opens, deletes and probes caches by name
//! - `BlobCache`: a single named cache of request key → response
//!
//! Two backends ship with the crate: `MemoryCacheStorage` for in-process
//! hosts and tests, and `DiskCacheStorage` which keeps one directory per
//! cache and survives restarts.

pub mod disk;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::models::{CachedResponse, Response};

pub use disk::DiskCacheStorage;
pub use memory::MemoryCacheStorage;

/// One named cache. Every `put` replaces the whole entry.
#[async_trait]
pub trait BlobCache: Send + Sync {
    fn name(&self) -> &str;

    async fn lookup(&self, key: &str) -> StorageResult<Option<CachedResponse>>;

    async fn put(&self, key: &str, response: &Response) -> StorageResult<()>;

    /// Returns whether an entry was removed.
    async fn delete(&self, key: &str) -> StorageResult<bool>;

    async fn keys(&self) -> StorageResult<Vec<String>>;
}

#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open a cache, creating it if needed.
    async fn open(&self, name: &str) -> StorageResult<Arc<dyn BlobCache>>;

    /// Remove a cache and all of its entries. Returns whether it existed.
    async fn delete(&self, name: &str) -> StorageResult<bool>;

    async fn has(&self, name: &str) -> StorageResult<bool>;
}

/// Copy every entry of `from` into `to`, overwriting entries with the same key.
/// Returns the number of entries copied.
pub async fn copy_entries(from: &dyn BlobCache, to: &dyn BlobCache) -> StorageResult<usize> {
    let mut copied = 0;
    for key in from.keys().await? {
        // A key can disappear between listing and reading.
        if let Some(entry) = from.lookup(&key).await? {
            to.put(&key, &entry.response).await?;
            copied += 1;
        }
    }
    Ok(copied)
}
