//! On-disk cache storage.
//!
//! Layout: `<root>/<cache name>/<xxh3(key)>.entry`. An entry file is one line
//! of JSON metadata, a newline, then the raw body bytes. Entries are written
//! to a temp file and renamed into place so readers never see half a value.
//! Listing keys reads only the metadata line of each file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};
use xxhash_rust::xxh3::xxh3_128;

use super::{BlobCache, CacheStorage};
use crate::error::{StorageError, StorageResult};
use crate::models::{CachedResponse, Response};

const ENTRY_EXT: &str = "entry";
const TMP_EXT: &str = "tmp";

/// Distinguishes concurrent temp files within one process.
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    url: String,
    status: u16,
    headers: BTreeMap<String, String>,
    cached_at: DateTime<Utc>,
}

pub struct DiskCacheStorage {
    root: PathBuf,
}

impl DiskCacheStorage {
    pub fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .map_err(|e| StorageError::io(format!("creating {}", root.display()), e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn cache_dir(&self, name: &str) -> StorageResult<PathBuf> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    async fn open(&self, name: &str) -> StorageResult<Arc<dyn BlobCache>> {
        let dir = self.cache_dir(name)?;
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::io(format!("opening cache {}", name), e))?;
        Ok(Arc::new(DiskBlobCache {
            name: name.to_string(),
            dir,
        }))
    }

    async fn delete(&self, name: &str) -> StorageResult<bool> {
        let dir = self.cache_dir(name)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(cache = name, "Deleted cache directory");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::io(format!("deleting cache {}", name), e)),
        }
    }

    async fn has(&self, name: &str) -> StorageResult<bool> {
        let dir = self.cache_dir(name)?;
        fs::try_exists(&dir)
            .await
            .map_err(|e| StorageError::io(format!("probing cache {}", name), e))
    }
}

pub struct DiskBlobCache {
    name: String,
    dir: PathBuf,
}

impl DiskBlobCache {
    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{:032x}.{}", xxh3_128(key.as_bytes()), ENTRY_EXT))
    }

    fn corrupt(&self, path: &Path, reason: impl std::fmt::Display) -> StorageError {
        StorageError::CorruptEntry {
            cache: self.name.clone(),
            reason: format!("{}: {}", path.display(), reason),
        }
    }

    /// Split an entry file into its metadata line and body.
    fn decode(&self, path: &Path, raw: Vec<u8>) -> StorageResult<(EntryMeta, Vec<u8>)> {
        let split = raw
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| self.corrupt(path, "missing metadata line"))?;
        let meta: EntryMeta =
            serde_json::from_slice(&raw[..split]).map_err(|e| self.corrupt(path, e))?;
        let body = raw[split + 1..].to_vec();
        Ok((meta, body))
    }

    /// Read the metadata line alone, leaving the body on disk.
    async fn read_meta(&self, path: &Path) -> StorageResult<Option<EntryMeta>> {
        let file = match fs::File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StorageError::io(
                    format!("opening {} in cache {}", path.display(), self.name),
                    e,
                ))
            }
        };
        let mut line = Vec::new();
        BufReader::new(file)
            .read_until(b'\n', &mut line)
            .await
            .map_err(|e| {
                StorageError::io(format!("reading {} in cache {}", path.display(), self.name), e)
            })?;
        if line.pop() != Some(b'\n') {
            return Err(self.corrupt(path, "missing metadata line"));
        }
        let meta = serde_json::from_slice(&line).map_err(|e| self.corrupt(path, e))?;
        Ok(Some(meta))
    }

    async fn read_entry(&self, path: &Path) -> StorageResult<Option<(EntryMeta, Vec<u8>)>> {
        match fs::read(path).await {
            Ok(raw) => self.decode(path, raw).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(
                format!("reading {} in cache {}", path.display(), self.name),
                e,
            )),
        }
    }
}

#[async_trait]
impl BlobCache for DiskBlobCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup(&self, key: &str) -> StorageResult<Option<CachedResponse>> {
        let path = self.entry_path(key);
        let Some((meta, body)) = self.read_entry(&path).await? else {
            return Ok(None);
        };
        if meta.url != key {
            // xxh3 collision; treat as a miss rather than serve the wrong bytes
            warn!(cache = %self.name, key, stored = %meta.url, "Entry key mismatch");
            return Ok(None);
        }
        Ok(Some(CachedResponse {
            url: meta.url,
            response: Response {
                status: meta.status,
                headers: meta.headers,
                body,
            },
            cached_at: meta.cached_at,
        }))
    }

    async fn put(&self, key: &str, response: &Response) -> StorageResult<()> {
        let meta = EntryMeta {
            url: key.to_string(),
            status: response.status,
            headers: response.headers.clone(),
            cached_at: Utc::now(),
        };
        let mut raw = serde_json::to_vec(&meta).map_err(|e| StorageError::CorruptEntry {
            cache: self.name.clone(),
            reason: format!("encoding metadata for {}: {}", key, e),
        })?;
        raw.push(b'\n');
        raw.extend_from_slice(&response.body);

        let path = self.entry_path(key);
        let tmp = path.with_extension(format!(
            "{}.{}",
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed),
            TMP_EXT
        ));
        fs::write(&tmp, &raw)
            .await
            .map_err(|e| StorageError::io(format!("writing {} to cache {}", key, self.name), e))?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(StorageError::io(
                format!("committing {} to cache {}", key, self.name),
                e,
            ));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        match fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::io(
                format!("deleting {} from cache {}", key, self.name),
                e,
            )),
        }
    }

    async fn keys(&self) -> StorageResult<Vec<String>> {
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            // Deleted underneath us: an empty cache
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(format!("listing cache {}", self.name), e)),
        };

        let mut keys = Vec::new();
        loop {
            let next = dir
                .next_entry()
                .await
                .map_err(|e| StorageError::io(format!("listing cache {}", self.name), e))?;
            let Some(entry) = next else { break };
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXT) {
                continue;
            }
            if let Some(meta) = self.read_meta(&path).await? {
                keys.push(meta.url);
            }
        }
        keys.sort();
        Ok(keys)
    }
}
