//! Network access for the engine.
//!
//! `Fetcher` is the seam the host fills in. `HttpFetcher` is the reqwest-backed
//! implementation used by the reference CLI.

pub mod client;
pub mod error;

use async_trait::async_trait;

use crate::models::{Request, Response};

pub use client::HttpFetcher;
pub use error::FetchError;

/// Performs a network request.
///
/// Any HTTP response, whatever its status, is `Ok`. `Err` means the request
/// never produced a response (DNS, connection, timeout).
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}
