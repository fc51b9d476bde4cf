//! Install and activate: staging, diffing and promotion.
//!
//! Install fetches every core resource from the network and writes the lot
//! into the staging cache. Activate compares the current manifest with the
//! persisted one, evicts live entries whose hash changed or that left the
//! manifest, copies staging over what is left, drops staging and records the
//! new manifest. Any failure during activate deletes all three caches.
//!
//! Core resources are restaged on every install even when their hash did not
//! change, while a non-core resource with an unchanged hash keeps its cached
//! bytes across upgrades.

use std::sync::Arc;

use futures::future::try_join_all;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::LifecycleState;
use crate::cache::{copy_entries, CacheStorage};
use crate::config::CacheNames;
use crate::error::{EngineError, Result};
use crate::fetch::Fetcher;
use crate::host::HostControl;
use crate::manifest::{CoreSet, ManifestStore, ResourceManifest};
use crate::models::{Request, Response};
use crate::origin::Origin;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationMode {
    /// No prior manifest: live was rebuilt from staging alone
    Bootstrap,
    /// Prior manifest present: unchanged live entries were kept
    Reconcile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    pub mode: ActivationMode,
    /// Live entries removed by the diff
    pub evicted: usize,
    /// Live entries the diff left in place
    pub kept: usize,
    /// Staged entries copied into live
    pub promoted: usize,
}

pub struct Reconciler {
    origin: Origin,
    names: CacheNames,
    manifest: Arc<ResourceManifest>,
    core: CoreSet,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    host: Arc<dyn HostControl>,
    manifest_store: ManifestStore,
    skip_waiting_on_install: bool,
    state: RwLock<LifecycleState>,
}

impl Reconciler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        origin: Origin,
        names: CacheNames,
        manifest: Arc<ResourceManifest>,
        core: CoreSet,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        host: Arc<dyn HostControl>,
        manifest_store: ManifestStore,
    ) -> Self {
        Self {
            origin,
            names,
            manifest,
            core,
            storage,
            fetcher,
            host,
            manifest_store,
            skip_waiting_on_install: true,
            state: RwLock::new(LifecycleState::Idle),
        }
    }

    pub fn with_skip_waiting_on_install(mut self, enabled: bool) -> Self {
        self.skip_waiting_on_install = enabled;
        self
    }

    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    async fn set_state(&self, next: LifecycleState) {
        let mut state = self.state.write().await;
        let from = *state;
        debug!(from = %from, to = %next, "Lifecycle transition");
        *state = next;
    }

    // ===== Install =====

    /// Stage every core resource. Returns the number of staged entries.
    ///
    /// Nothing is written unless every fetch succeeded.
    pub async fn install(&self) -> Result<usize> {
        let previous = self.state().await;
        self.set_state(LifecycleState::Installing).await;
        if self.skip_waiting_on_install {
            self.host.skip_waiting().await;
        }

        match self.stage_core().await {
            Ok(staged) => {
                self.set_state(LifecycleState::Staged).await;
                info!(staged, "Install complete");
                Ok(staged)
            }
            Err(e) => {
                error!(error = %e, "Install failed");
                self.set_state(previous).await;
                Err(e)
            }
        }
    }

    async fn stage_core(&self) -> Result<usize> {
        let fetches = self.core.keys().iter().map(|key| async move {
            let request = Request::reload(self.origin.url_for(key));
            let response = self
                .fetcher
                .fetch(&request)
                .await
                .and_then(Response::error_for_status)
                .map_err(|e| EngineError::fetch(key.as_str(), e))?;
            Ok::<_, EngineError>((request.url, response))
        });
        let staged = try_join_all(fetches).await?;

        let staging = self.storage.open(&self.names.staging).await?;
        for (url, response) in &staged {
            if let Err(e) = staging.put(url, response).await {
                // Leave no half-written staging behind for activate to promote
                if let Err(cleanup) = self.storage.delete(&self.names.staging).await {
                    warn!(error = %cleanup, "Failed to discard partial staging");
                }
                return Err(e.into());
            }
        }
        Ok(staged.len())
    }

    // ===== Activate =====

    /// Promote staging into live.
    ///
    /// Does not require `Staged`: install may have run in an earlier process,
    /// and staging lives in storage.
    pub async fn activate(&self) -> Result<ActivationReport> {
        let state = self.state().await;
        if state != LifecycleState::Staged {
            debug!(state = %state, "Activating without a staged install in this process");
        }

        match self.promote().await {
            Ok(report) => {
                self.set_state(LifecycleState::Active).await;
                // Serve already-open clients from the new version right away
                self.host.claim_clients().await;
                info!(
                    mode = ?report.mode,
                    evicted = report.evicted,
                    kept = report.kept,
                    promoted = report.promoted,
                    "Activation complete"
                );
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, "Failed to upgrade; deleting all caches");
                self.set_state(LifecycleState::Corrupted).await;
                self.reset().await;
                Err(EngineError::Corrupted(Box::new(e)))
            }
        }
    }

    async fn promote(&self) -> Result<ActivationReport> {
        let prior = self.manifest_store.load_persisted().await?;
        let staging = self.storage.open(&self.names.staging).await?;

        let report = match prior {
            None => {
                self.set_state(LifecycleState::Bootstrapping).await;
                self.storage.delete(&self.names.live).await?;
                let live = self.storage.open(&self.names.live).await?;
                let promoted = copy_entries(staging.as_ref(), live.as_ref()).await?;
                ActivationReport {
                    mode: ActivationMode::Bootstrap,
                    evicted: 0,
                    kept: 0,
                    promoted,
                }
            }
            Some(prior) => {
                self.set_state(LifecycleState::Reconciling).await;
                let live = self.storage.open(&self.names.live).await?;
                let mut evicted = 0;
                let mut kept = 0;
                for url in live.keys().await? {
                    let key = self.origin.stored_key(&url);
                    if self.manifest.is_unchanged_from(&prior, &key) {
                        kept += 1;
                    } else {
                        debug!(key = %key, "Evicting stale entry");
                        live.delete(&url).await?;
                        evicted += 1;
                    }
                }
                let promoted = copy_entries(staging.as_ref(), live.as_ref()).await?;
                ActivationReport {
                    mode: ActivationMode::Reconcile,
                    evicted,
                    kept,
                    promoted,
                }
            }
        };

        self.storage.delete(&self.names.staging).await?;
        self.manifest_store.persist(&self.manifest).await?;
        Ok(report)
    }

    /// Delete all three caches. Errors are logged: there is nothing left to
    /// fall back to.
    async fn reset(&self) {
        for name in [&self.names.live, &self.names.staging, &self.names.manifest] {
            if let Err(e) = self.storage.delete(name).await {
                error!(cache = %name, error = %e, "Failed to delete cache during reset");
            }
        }
    }
}
