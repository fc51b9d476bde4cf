//! The offline caching engine.
//!
//! `Engine` wires the three components to the host's events:
//! - `Reconciler`: install (stage the core set) and activate (diff, promote)
//! - `RequestRouter`: serve intercepted requests from cache or network
//! - `ControlHandler`: the `skipWaiting` / `downloadOffline` messages
//!
//! All three share the storage, fetcher and host handles. Methods take
//! `&self`; wrap the engine in an `Arc` to hand it to concurrent tasks.

pub mod control;
pub mod reconciler;
pub mod router;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::cache::CacheStorage;
use crate::config::{CacheNames, EngineConfig};
use crate::error::Result;
use crate::fetch::Fetcher;
use crate::host::HostControl;
use crate::manifest::{CoreSet, ManifestStore, ResourceManifest};
use crate::models::{CachedResponse, Request};
use crate::origin::Origin;

pub use control::{ControlHandler, ControlSignal, FillFailure, FillReport, SignalOutcome};
pub use reconciler::{ActivationMode, ActivationReport, Reconciler};
pub use router::{RequestRouter, ResponseSource, RouteOutcome};

/// Where the engine is in its install/activate cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Idle,
    Installing,
    Staged,
    Bootstrapping,
    Reconciling,
    Active,
    /// An activation failed and every cache was deleted.
    Corrupted,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Installing => "installing",
            LifecycleState::Staged => "staged",
            LifecycleState::Bootstrapping => "bootstrapping",
            LifecycleState::Reconciling => "reconciling",
            LifecycleState::Active => "active",
            LifecycleState::Corrupted => "corrupted",
        };
        f.write_str(name)
    }
}

/// Snapshot of the caches, for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub state: LifecycleState,
    /// Entry count of the persisted manifest, `None` before the first promotion
    pub persisted_manifest_entries: Option<usize>,
    pub manifest_entries: usize,
    pub live_entries: usize,
    pub staging_present: bool,
    /// Manifest keys with nothing in the live cache
    pub missing: Vec<String>,
    pub newest_live_entry: Option<String>,
}

pub struct Engine {
    names: CacheNames,
    storage: Arc<dyn CacheStorage>,
    manifest: Arc<ResourceManifest>,
    manifest_store: ManifestStore,
    reconciler: Reconciler,
    router: RequestRouter,
    control: ControlHandler,
}

impl Engine {
    /// Build an engine for `manifest`. Fails if the origin is malformed or a
    /// core key is missing from the manifest.
    pub fn new(
        config: &EngineConfig,
        manifest: ResourceManifest,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        host: Arc<dyn HostControl>,
    ) -> Result<Self> {
        let origin = Origin::parse(&config.origin)?;
        let core = CoreSet::new(config.core.iter().cloned(), &manifest)?;
        let manifest = Arc::new(manifest);
        let names = config.cache_names.clone();
        let manifest_store = ManifestStore::new(Arc::clone(&storage), names.manifest.clone());

        let reconciler = Reconciler::new(
            origin.clone(),
            names.clone(),
            Arc::clone(&manifest),
            core,
            Arc::clone(&storage),
            Arc::clone(&fetcher),
            Arc::clone(&host),
            manifest_store.clone(),
        )
        .with_skip_waiting_on_install(config.skip_waiting_on_install);

        let router = RequestRouter::new(
            origin.clone(),
            names.live.clone(),
            Arc::clone(&manifest),
            Arc::clone(&storage),
            Arc::clone(&fetcher),
        );

        let control = ControlHandler::new(
            origin,
            names.live.clone(),
            Arc::clone(&manifest),
            Arc::clone(&storage),
            fetcher,
            host,
        );

        Ok(Self {
            names,
            storage,
            manifest,
            manifest_store,
            reconciler,
            router,
            control,
        })
    }

    pub fn manifest(&self) -> &ResourceManifest {
        &self.manifest
    }

    pub fn cache_names(&self) -> &CacheNames {
        &self.names
    }

    pub fn manifest_store(&self) -> &ManifestStore {
        &self.manifest_store
    }

    pub async fn state(&self) -> LifecycleState {
        self.reconciler.state().await
    }

    /// Install event: stage the core set. Returns the number of staged entries.
    pub async fn install(&self) -> Result<usize> {
        self.reconciler.install().await
    }

    /// Activate event: promote staging into the live cache.
    pub async fn activate(&self) -> Result<ActivationReport> {
        self.reconciler.activate().await
    }

    /// Request event.
    pub async fn handle_request(&self, request: &Request) -> Result<RouteOutcome> {
        self.router.handle(request).await
    }

    pub async fn handle_signal(&self, signal: ControlSignal) -> Result<SignalOutcome> {
        self.control.handle(signal).await
    }

    /// Message event carrying one of the control strings.
    pub async fn handle_message(&self, message: &str) -> Result<SignalOutcome> {
        let signal: ControlSignal = message.parse()?;
        self.handle_signal(signal).await
    }

    pub async fn status(&self) -> Result<EngineStatus> {
        let persisted_manifest_entries = if self.storage.has(&self.names.manifest).await? {
            self.manifest_store
                .load_persisted()
                .await?
                .map(|m| m.len())
        } else {
            None
        };

        let mut live_entries = 0;
        let mut newest: Option<CachedResponse> = None;
        if self.storage.has(&self.names.live).await? {
            let live = self.storage.open(&self.names.live).await?;
            for key in live.keys().await? {
                if let Some(entry) = live.lookup(&key).await? {
                    live_entries += 1;
                    if newest.as_ref().map_or(true, |n| entry.cached_at > n.cached_at) {
                        newest = Some(entry);
                    }
                }
            }
        }

        Ok(EngineStatus {
            state: self.state().await,
            persisted_manifest_entries,
            manifest_entries: self.manifest.len(),
            live_entries,
            staging_present: self.storage.has(&self.names.staging).await?,
            missing: self.control.missing_keys().await?,
            newest_live_entry: newest.map(|n| n.age_display()),
        })
    }
}
