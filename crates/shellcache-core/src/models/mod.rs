//! Request/response models exchanged with the host.
//!
//! - `Request`: an intercepted request (method, URL, cache mode)
//! - `Response`: status, headers and body bytes
//! - `CachedResponse`: a stored response with the time it was cached

pub mod request;
pub mod response;

pub use request::{CacheMode, Request};
pub use response::{CachedResponse, Response};
