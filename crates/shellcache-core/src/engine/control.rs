//! Control messages from the host's messaging channel.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{info, warn};

use crate::cache::{BlobCache, CacheStorage};
use crate::error::{EngineError, Result};
use crate::fetch::Fetcher;
use crate::host::HostControl;
use crate::manifest::ResourceManifest;
use crate::models::{Request, Response};
use crate::origin::Origin;

/// Maximum resources downloaded at once by `downloadOffline`.
pub const MAX_CONCURRENT_FILLS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Activate the waiting version now.
    SkipWaiting,
    /// Fetch every manifest resource the live cache lacks.
    DownloadOffline,
}

impl ControlSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlSignal::SkipWaiting => "skipWaiting",
            ControlSignal::DownloadOffline => "downloadOffline",
        }
    }
}

impl fmt::Display for ControlSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlSignal {
    type Err = EngineError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "skipWaiting" => Ok(ControlSignal::SkipWaiting),
            "downloadOffline" => Ok(ControlSignal::DownloadOffline),
            other => Err(EngineError::UnknownSignal(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FillFailure {
    pub key: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FillReport {
    /// Keys that were missing from live
    pub requested: usize,
    pub stored: usize,
    pub failures: Vec<FillFailure>,
}

impl FillReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalOutcome {
    ActivationRequested,
    Filled(FillReport),
}

pub struct ControlHandler {
    origin: Origin,
    live: String,
    manifest: Arc<ResourceManifest>,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    host: Arc<dyn HostControl>,
}

impl ControlHandler {
    pub fn new(
        origin: Origin,
        live: String,
        manifest: Arc<ResourceManifest>,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        host: Arc<dyn HostControl>,
    ) -> Self {
        Self {
            origin,
            live,
            manifest,
            storage,
            fetcher,
            host,
        }
    }

    pub async fn handle(&self, signal: ControlSignal) -> Result<SignalOutcome> {
        match signal {
            ControlSignal::SkipWaiting => {
                self.host.skip_waiting().await;
                Ok(SignalOutcome::ActivationRequested)
            }
            ControlSignal::DownloadOffline => self.fill_remaining().await.map(SignalOutcome::Filled),
        }
    }

    /// Manifest keys with no entry in the live cache. Does not create the
    /// live cache when it is absent.
    pub async fn missing_keys(&self) -> Result<Vec<String>> {
        let present: HashSet<String> = if self.storage.has(&self.live).await? {
            let live = self.storage.open(&self.live).await?;
            live.keys()
                .await?
                .iter()
                .map(|url| self.origin.stored_key(url))
                .collect()
        } else {
            HashSet::new()
        };

        Ok(self
            .manifest
            .keys()
            .filter(|key| !present.contains(*key))
            .map(str::to_string)
            .collect())
    }

    /// Fetch and store every missing resource, at most
    /// `MAX_CONCURRENT_FILLS` at a time. Each key succeeds or fails on its
    /// own; failures are listed in the report.
    pub async fn fill_remaining(&self) -> Result<FillReport> {
        let missing = self.missing_keys().await?;
        let requested = missing.len();
        let live = self.storage.open(&self.live).await?;

        let results: Vec<(String, std::result::Result<(), String>)> = stream::iter(missing)
            .map(|key| {
                let live = Arc::clone(&live);
                async move {
                    let result = self.fill_one(live.as_ref(), &key).await;
                    (key, result)
                }
            })
            .buffer_unordered(MAX_CONCURRENT_FILLS)
            .collect()
            .await;

        let mut report = FillReport {
            requested,
            ..FillReport::default()
        };
        for (key, result) in results {
            match result {
                Ok(()) => report.stored += 1,
                Err(error) => {
                    warn!(key = %key, error = %error, "Failed to download resource for offline use");
                    report.failures.push(FillFailure { key, error });
                }
            }
        }
        report.failures.sort_by(|a, b| a.key.cmp(&b.key));

        info!(
            requested = report.requested,
            stored = report.stored,
            failed = report.failed(),
            "Offline download finished"
        );
        Ok(report)
    }

    async fn fill_one(&self, live: &dyn BlobCache, key: &str) -> std::result::Result<(), String> {
        let url = self.origin.url_for(key);
        let response = self
            .fetcher
            .fetch(&Request::get(url.as_str()))
            .await
            .and_then(Response::error_for_status)
            .map_err(|e| e.to_string())?;
        live.put(&url, &response).await.map_err(|e| e.to_string())
    }
}
