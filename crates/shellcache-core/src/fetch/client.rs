//! HTTP fetcher backed by reqwest.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Method};
use tracing::{debug, warn};

use super::{FetchError, Fetcher};
use crate::models::{CacheMode, Request, Response};

/// HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    initial_backoff: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        })
    }

    /// Override the first rate-limit backoff; later retries double it.
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    async fn send_once(&self, method: &Method, request: &Request) -> Result<Response, FetchError> {
        let mut builder = self.client.request(method.clone(), &request.url);
        if request.cache_mode == CacheMode::Reload {
            builder = builder
                .header(header::CACHE_CONTROL, "no-cache")
                .header(header::PRAGMA, "no-cache");
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let method = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| FetchError::InvalidRequest(format!("bad method {:?}", request.method)))?;

        let mut retries = 0;
        let mut backoff = self.initial_backoff;

        loop {
            let response = self.send_once(&method, request).await?;
            if response.status != 429 {
                debug!(url = %request.url, status = response.status, bytes = response.body.len(), "Fetched");
                return Ok(response);
            }

            retries += 1;
            if retries > MAX_RATE_LIMIT_RETRIES {
                // Hand the 429 back; callers decide whether that is a failure.
                return Ok(response);
            }
            warn!(url = %request.url, retry = retries, backoff_ms = backoff.as_millis() as u64, "Rate limited, backing off");
            tokio::time::sleep(backoff).await;
            backoff *= 2; // Exponential backoff
        }
    }
}
