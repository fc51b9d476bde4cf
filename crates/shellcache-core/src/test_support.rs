//! Fakes shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::cache::{BlobCache, CacheStorage, MemoryCacheStorage};
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::error::{StorageError, StorageResult};
use crate::fetch::{FetchError, Fetcher};
use crate::host::HostControl;
use crate::manifest::{ManifestStore, ResourceManifest};
use crate::models::{CachedResponse, Request, Response};

pub const ORIGIN: &str = "https://app.test";

/// Absolute URL of `key`; `url("")` is the root document.
pub fn url(key: &str) -> String {
    format!("{}/{}", ORIGIN, key)
}

pub fn manifest_of(entries: &[(&str, &str)]) -> ResourceManifest {
    entries.iter().copied().collect()
}

enum Scripted {
    Respond(Response),
    Fail,
}

/// Answers from a per-URL script; anything unscripted is a network failure.
#[derive(Default)]
pub struct FakeFetcher {
    script: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<Vec<Request>>,
}

impl FakeFetcher {
    pub fn respond(&self, url: &str, body: &str) {
        self.respond_with(url, Response::ok(body));
    }

    pub fn respond_with(&self, url: &str, response: Response) {
        self.script
            .lock()
            .unwrap()
            .insert(url.to_string(), Scripted::Respond(response));
    }

    pub fn fail(&self, url: &str) {
        self.script
            .lock()
            .unwrap()
            .insert(url.to_string(), Scripted::Fail);
    }

    pub fn calls(&self) -> Vec<Request> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url == url)
            .count()
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        self.calls.lock().unwrap().push(request.clone());
        match self.script.lock().unwrap().get(&request.url) {
            Some(Scripted::Respond(response)) => Ok(response.clone()),
            Some(Scripted::Fail) | None => {
                Err(FetchError::Transport(format!("offline: {}", request.url)))
            }
        }
    }
}

#[derive(Default)]
pub struct RecordingHost {
    skip_waiting: AtomicUsize,
    claims: AtomicUsize,
}

impl RecordingHost {
    pub fn skip_waiting_calls(&self) -> usize {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    pub fn claim_calls(&self) -> usize {
        self.claims.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HostControl for RecordingHost {
    async fn skip_waiting(&self) {
        self.skip_waiting.fetch_add(1, Ordering::SeqCst);
    }

    async fn claim_clients(&self) {
        self.claims.fetch_add(1, Ordering::SeqCst);
    }
}

/// Memory storage whose named caches can be made to fail every entry write.
/// Deleting whole caches keeps working.
#[derive(Default)]
pub struct FaultyStorage {
    inner: MemoryCacheStorage,
    broken: Arc<Mutex<HashSet<String>>>,
}

impl FaultyStorage {
    pub fn break_writes(&self, name: &str) {
        self.broken.lock().unwrap().insert(name.to_string());
    }

    pub fn heal(&self) {
        self.broken.lock().unwrap().clear();
    }

    pub async fn has_cache(&self, name: &str) -> bool {
        self.inner.has(name).await.unwrap()
    }

    pub async fn cache_names(&self) -> Vec<String> {
        self.inner.cache_names().await
    }
}

#[async_trait]
impl CacheStorage for FaultyStorage {
    async fn open(&self, name: &str) -> StorageResult<Arc<dyn BlobCache>> {
        let inner = self.inner.open(name).await?;
        Ok(Arc::new(FaultyCache {
            inner,
            broken: Arc::clone(&self.broken),
        }))
    }

    async fn delete(&self, name: &str) -> StorageResult<bool> {
        self.inner.delete(name).await
    }

    async fn has(&self, name: &str) -> StorageResult<bool> {
        self.inner.has(name).await
    }
}

struct FaultyCache {
    inner: Arc<dyn BlobCache>,
    broken: Arc<Mutex<HashSet<String>>>,
}

impl FaultyCache {
    fn check(&self) -> StorageResult<()> {
        if self.broken.lock().unwrap().contains(self.inner.name()) {
            Err(StorageError::Unavailable(format!(
                "injected write failure in {}",
                self.inner.name()
            )))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BlobCache for FaultyCache {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn lookup(&self, key: &str) -> StorageResult<Option<CachedResponse>> {
        self.inner.lookup(key).await
    }

    async fn put(&self, key: &str, response: &Response) -> StorageResult<()> {
        self.check()?;
        self.inner.put(key, response).await
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn keys(&self) -> StorageResult<Vec<String>> {
        self.inner.keys().await
    }
}

/// Storage, network and host fakes plus helpers to build engines on them.
pub struct TestBed {
    pub storage: Arc<FaultyStorage>,
    pub fetcher: Arc<FakeFetcher>,
    pub host: Arc<RecordingHost>,
}

impl TestBed {
    pub fn new() -> Self {
        Self {
            storage: Arc::new(FaultyStorage::default()),
            fetcher: Arc::new(FakeFetcher::default()),
            host: Arc::new(RecordingHost::default()),
        }
    }

    pub fn config(&self, core: &[&str]) -> EngineConfig {
        EngineConfig::default()
            .with_origin(ORIGIN)
            .with_core(core.iter().copied())
    }

    pub fn engine(&self, manifest: &[(&str, &str)], core: &[&str]) -> Engine {
        self.engine_with(self.config(core), manifest)
    }

    pub fn engine_with(&self, config: EngineConfig, manifest: &[(&str, &str)]) -> Engine {
        Engine::new(
            &config,
            manifest_of(manifest),
            self.storage.clone(),
            self.fetcher.clone(),
            self.host.clone(),
        )
        .unwrap()
    }

    pub async fn seed(&self, cache: &str, key: &str, body: &str) {
        let cache = self.storage.inner.open(cache).await.unwrap();
        cache.put(key, &Response::ok(body)).await.unwrap();
    }

    pub async fn persist_manifest(&self, entries: &[(&str, &str)]) {
        ManifestStore::new(self.storage.clone(), "app-manifest")
            .persist(&manifest_of(entries))
            .await
            .unwrap();
    }

    /// Sorted (key, body) pairs; empty when the cache does not exist.
    pub async fn cache_contents(&self, name: &str) -> Vec<(String, String)> {
        if !self.storage.has_cache(name).await {
            return Vec::new();
        }
        let cache = self.storage.inner.open(name).await.unwrap();
        let mut out = Vec::new();
        for key in cache.keys().await.unwrap() {
            let entry = cache.lookup(&key).await.unwrap().unwrap();
            out.push((key, String::from_utf8(entry.response.body).unwrap()));
        }
        out.sort();
        out
    }
}
