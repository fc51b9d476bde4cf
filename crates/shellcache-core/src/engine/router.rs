//! Per-request serving strategy.
//!
//! | request                        | strategy                      |
//! |--------------------------------|-------------------------------|
//! | not GET, foreign, not listed   | not handled (host default)    |
//! | root document (`"/"`)          | network first, cache fallback |
//! | any other manifest resource    | cache first, fill on miss     |

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::CacheStorage;
use crate::error::{EngineError, Result};
use crate::fetch::Fetcher;
use crate::manifest::{ResourceManifest, ROOT_KEY};
use crate::models::{Request, Response};
use crate::origin::Origin;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Cache,
    Network,
}

impl fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseSource::Cache => f.write_str("cache"),
            ResponseSource::Network => f.write_str("network"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Let the host handle the request itself.
    NotHandled,
    Handled {
        response: Response,
        source: ResponseSource,
    },
}

impl RouteOutcome {
    pub fn response(&self) -> Option<&Response> {
        match self {
            RouteOutcome::NotHandled => None,
            RouteOutcome::Handled { response, .. } => Some(response),
        }
    }

    pub fn source(&self) -> Option<ResponseSource> {
        match self {
            RouteOutcome::NotHandled => None,
            RouteOutcome::Handled { source, .. } => Some(*source),
        }
    }
}

pub struct RequestRouter {
    origin: Origin,
    live: String,
    manifest: Arc<ResourceManifest>,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
}

impl RequestRouter {
    pub fn new(
        origin: Origin,
        live: String,
        manifest: Arc<ResourceManifest>,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            origin,
            live,
            manifest,
            storage,
            fetcher,
        }
    }

    pub async fn handle(&self, request: &Request) -> Result<RouteOutcome> {
        if !request.is_get() {
            return Ok(RouteOutcome::NotHandled);
        }
        let Some(key) = self.origin.resource_key(&request.url) else {
            return Ok(RouteOutcome::NotHandled);
        };
        if !self.manifest.contains(&key) {
            debug!(key = %key, "Not in manifest, passing through");
            return Ok(RouteOutcome::NotHandled);
        }

        if key == ROOT_KEY {
            self.network_first(request, &key).await
        } else {
            self.cache_first(request, &key).await
        }
    }

    async fn network_first(&self, request: &Request, key: &str) -> Result<RouteOutcome> {
        let cache_key = self.origin.canonical_url(&request.url);
        let fetched = self
            .fetcher
            .fetch(request)
            .await
            .and_then(Response::error_for_status);

        match fetched {
            Ok(response) => {
                self.fill(&cache_key, &response).await;
                Ok(RouteOutcome::Handled {
                    response,
                    source: ResponseSource::Network,
                })
            }
            Err(e) => {
                let live = self.storage.open(&self.live).await?;
                match live.lookup(&cache_key).await? {
                    Some(entry) => {
                        debug!(key, error = %e, "Network failed, serving cached copy");
                        Ok(RouteOutcome::Handled {
                            response: entry.into_response(),
                            source: ResponseSource::Cache,
                        })
                    }
                    None => Err(EngineError::fetch(key, e)),
                }
            }
        }
    }

    async fn cache_first(&self, request: &Request, key: &str) -> Result<RouteOutcome> {
        let cache_key = self.origin.canonical_url(&request.url);
        let live = self.storage.open(&self.live).await?;
        if let Some(entry) = live.lookup(&cache_key).await? {
            return Ok(RouteOutcome::Handled {
                response: entry.into_response(),
                source: ResponseSource::Cache,
            });
        }

        let response = self
            .fetcher
            .fetch(request)
            .await
            .map_err(|e| EngineError::fetch(key, e))?;
        // Error statuses go back to the client but never into the cache
        if response.is_ok() {
            self.fill(&cache_key, &response).await;
        }
        Ok(RouteOutcome::Handled {
            response,
            source: ResponseSource::Network,
        })
    }

    /// Store a fresh copy in live. A failed write costs a future cache hit,
    /// not this response.
    async fn fill(&self, cache_key: &str, response: &Response) {
        let result = match self.storage.open(&self.live).await {
            Ok(live) => live.put(cache_key, response).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(key = cache_key, error = %e, "Failed to store response in live cache");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{url, TestBed, ORIGIN};

    const MANIFEST: &[(&str, &str)] = &[
        ("/", "r1"),
        ("index.html", "r1"),
        ("main.dart.js", "m1"),
        ("assets/logo.png", "l1"),
    ];

    #[tokio::test]
    async fn test_non_get_is_not_handled() {
        let bed = TestBed::new();
        let engine = bed.engine(MANIFEST, &[]);
        let outcome = engine
            .handle_request(&Request::new("POST", url("main.dart.js")))
            .await
            .unwrap();
        assert_eq!(outcome, RouteOutcome::NotHandled);
        assert!(bed.fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unlisted_and_foreign_are_not_handled() {
        let bed = TestBed::new();
        let engine = bed.engine(MANIFEST, &[]);
        for target in [url("api/data.json"), "https://cdn.test/main.dart.js".to_string()] {
            let outcome = engine.handle_request(&Request::get(target)).await.unwrap();
            assert_eq!(outcome, RouteOutcome::NotHandled);
        }
        assert!(bed.fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cache_first_fills_on_miss() {
        let bed = TestBed::new();
        bed.fetcher.respond(&url("main.dart.js"), "bundle");
        let engine = bed.engine(MANIFEST, &[]);

        let outcome = engine
            .handle_request(&Request::get(url("main.dart.js")))
            .await
            .unwrap();
        assert_eq!(outcome.source(), Some(ResponseSource::Network));
        assert_eq!(outcome.response().unwrap().body, b"bundle");
        assert_eq!(
            bed.cache_contents("app-cache").await,
            vec![(url("main.dart.js"), "bundle".to_string())]
        );

        // Second request is a hit and skips the network
        let outcome = engine
            .handle_request(&Request::get(url("main.dart.js")))
            .await
            .unwrap();
        assert_eq!(outcome.source(), Some(ResponseSource::Cache));
        assert_eq!(outcome.response().unwrap().body, b"bundle");
        assert_eq!(bed.fetcher.call_count(&url("main.dart.js")), 1);
    }

    #[tokio::test]
    async fn test_cache_busted_request_is_routed_and_keyed_by_full_url() {
        let bed = TestBed::new();
        bed.fetcher.respond(&url("main.dart.js?v=123"), "v123");
        let engine = bed.engine(MANIFEST, &[]);

        let outcome = engine
            .handle_request(&Request::get(url("main.dart.js?v=123")))
            .await
            .unwrap();
        assert_eq!(outcome.response().unwrap().body, b"v123");
        assert_eq!(
            bed.cache_contents("app-cache").await,
            vec![(url("main.dart.js?v=123"), "v123".to_string())]
        );
    }

    #[tokio::test]
    async fn test_fragment_target_is_served_from_fragmentless_entry() {
        let bed = TestBed::new();
        let engine = bed.engine(MANIFEST, &[]);
        bed.seed("app-cache", &url("main.dart.js"), "bundle").await;

        let outcome = engine
            .handle_request(&Request::get(url("main.dart.js#x")))
            .await
            .unwrap();
        assert_eq!(outcome.source(), Some(ResponseSource::Cache));
        assert_eq!(outcome.response().unwrap().body, b"bundle");
        assert!(bed.fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cache_first_error_status_is_returned_not_cached() {
        let bed = TestBed::new();
        bed.fetcher
            .respond_with(&url("assets/logo.png"), Response::new(404, "missing"));
        let engine = bed.engine(MANIFEST, &[]);

        let outcome = engine
            .handle_request(&Request::get(url("assets/logo.png")))
            .await
            .unwrap();
        assert_eq!(outcome.response().unwrap().status, 404);
        assert!(bed.cache_contents("app-cache").await.is_empty());
    }

    #[tokio::test]
    async fn test_cache_first_network_failure_propagates() {
        let bed = TestBed::new();
        bed.fetcher.fail(&url("assets/logo.png"));
        let engine = bed.engine(MANIFEST, &[]);

        let err = engine
            .handle_request(&Request::get(url("assets/logo.png")))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Fetch { ref key, .. } if key == "assets/logo.png"));
    }

    #[tokio::test]
    async fn test_root_forms_use_network_first() {
        let bed = TestBed::new();
        let engine = bed.engine(MANIFEST, &[]);
        let targets = [
            ORIGIN.to_string(),
            format!("{}/", ORIGIN),
            format!("{}/#/settings", ORIGIN),
        ];
        for target in &targets {
            bed.fetcher.respond(target, "fresh");
        }
        // Cached copy must not win while the network is up
        bed.seed("app-cache", &url(""), "stale").await;

        for target in &targets {
            let outcome = engine.handle_request(&Request::get(target.clone())).await.unwrap();
            assert_eq!(outcome.source(), Some(ResponseSource::Network), "{}", target);
            assert_eq!(outcome.response().unwrap().body, b"fresh");
        }
        assert_eq!(
            bed.cache_contents("app-cache").await,
            vec![(url(""), "fresh".to_string())]
        );
    }

    #[tokio::test]
    async fn test_root_falls_back_to_cache_when_offline() {
        let bed = TestBed::new();
        bed.fetcher.fail(&url(""));
        let engine = bed.engine(MANIFEST, &[]);
        bed.seed("app-cache", &url(""), "shell").await;

        let outcome = engine.handle_request(&Request::get(url(""))).await.unwrap();
        assert_eq!(outcome.source(), Some(ResponseSource::Cache));
        assert_eq!(outcome.response().unwrap().body, b"shell");
    }

    #[tokio::test]
    async fn test_root_error_status_falls_back_to_cache() {
        let bed = TestBed::new();
        bed.fetcher.respond_with(&url(""), Response::new(503, "down"));
        let engine = bed.engine(MANIFEST, &[]);
        bed.seed("app-cache", &url(""), "shell").await;

        let outcome = engine.handle_request(&Request::get(url(""))).await.unwrap();
        assert_eq!(outcome.response().unwrap().body, b"shell");
        // The failed response did not replace the cached shell
        assert_eq!(bed.cache_contents("app-cache").await, vec![(url(""), "shell".to_string())]);
    }

    #[tokio::test]
    async fn test_root_offline_without_cache_propagates() {
        let bed = TestBed::new();
        bed.fetcher.fail(&url(""));
        let engine = bed.engine(MANIFEST, &[]);

        let err = engine.handle_request(&Request::get(url(""))).await.unwrap_err();
        assert!(matches!(err, EngineError::Fetch { ref key, .. } if key == "/"));
    }

    #[tokio::test]
    async fn test_fill_failure_still_serves_response() {
        let bed = TestBed::new();
        bed.fetcher.respond(&url("main.dart.js"), "bundle");
        let engine = bed.engine(MANIFEST, &[]);
        bed.seed("app-cache", &url("index.html"), "x").await;
        bed.storage.break_writes("app-cache");

        let outcome = engine
            .handle_request(&Request::get(url("main.dart.js")))
            .await
            .unwrap();
        assert_eq!(outcome.response().unwrap().body, b"bundle");
    }
}
