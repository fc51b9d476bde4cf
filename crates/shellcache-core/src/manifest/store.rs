use std::sync::Arc;

use tracing::debug;

use super::ResourceManifest;
use crate::cache::CacheStorage;
use crate::error::{StorageError, StorageResult};
use crate::models::Response;

/// Key of the single record in the manifest cache.
pub const MANIFEST_RECORD_KEY: &str = "manifest";

/// The last promoted manifest, kept as one record in its own cache.
#[derive(Clone)]
pub struct ManifestStore {
    storage: Arc<dyn CacheStorage>,
    cache_name: String,
}

impl ManifestStore {
    pub fn new(storage: Arc<dyn CacheStorage>, cache_name: impl Into<String>) -> Self {
        Self {
            storage,
            cache_name: cache_name.into(),
        }
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    /// `None` when no install has ever been promoted.
    pub async fn load_persisted(&self) -> StorageResult<Option<ResourceManifest>> {
        let cache = self.storage.open(&self.cache_name).await?;
        let Some(entry) = cache.lookup(MANIFEST_RECORD_KEY).await? else {
            return Ok(None);
        };
        let manifest = ResourceManifest::from_slice(&entry.response.body).map_err(|e| {
            StorageError::CorruptEntry {
                cache: self.cache_name.clone(),
                reason: format!("persisted manifest: {}", e),
            }
        })?;
        Ok(Some(manifest))
    }

    /// Overwrite the record. Call only after promotion has finished.
    pub async fn persist(&self, manifest: &ResourceManifest) -> StorageResult<()> {
        let body = serde_json::to_vec(manifest).map_err(|e| StorageError::CorruptEntry {
            cache: self.cache_name.clone(),
            reason: format!("encoding manifest: {}", e),
        })?;
        let cache = self.storage.open(&self.cache_name).await?;
        cache
            .put(
                MANIFEST_RECORD_KEY,
                &Response::ok(body).with_header("content-type", "application/json"),
            )
            .await?;
        debug!(cache = %self.cache_name, entries = manifest.len(), "Persisted manifest");
        Ok(())
    }
}
