//! shellcache - offline caching engine for versioned static assets.
//!
//! The host intercepts an application's resource requests and hands them to
//! an [`Engine`]. The engine keeps a manifest-described set of assets in a
//! persistent blob store, moves safely between versions when the manifest
//! changes, and decides per request whether to serve from cache or network.
//!
//! - [`cache`]: named blob caches (memory and disk backends)
//! - [`manifest`]: resource manifests, the core set, the persisted record
//! - [`engine`]: install/activate reconciliation, request routing, control
//! - [`fetch`]: the network seam and a reqwest implementation

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod host;
pub mod manifest;
pub mod models;
pub mod origin;

#[cfg(test)]
mod test_support;

pub use cache::{BlobCache, CacheStorage, DiskCacheStorage, MemoryCacheStorage};
pub use config::{CacheNames, EngineConfig};
pub use engine::{
    ActivationReport, ControlSignal, Engine, EngineStatus, FillReport, LifecycleState,
    ResponseSource, RouteOutcome, SignalOutcome,
};
pub use error::{EngineError, ManifestError, Result, StorageError};
pub use fetch::{FetchError, Fetcher, HttpFetcher};
pub use host::{HostControl, NoopHost};
pub use manifest::{CoreSet, ManifestStore, ResourceManifest};
pub use models::{CacheMode, CachedResponse, Request, Response};
pub use origin::Origin;
