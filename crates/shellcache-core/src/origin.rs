//! Mapping between request URLs and resource keys.

use crate::error::ManifestError;
use crate::manifest::ROOT_KEY;

/// Cache-busting query marker stripped before manifest lookup.
const CACHE_BUST_MARKER: &str = "?v=";

/// Scheme + host (+ port) of the application, without a trailing slash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin(String);

impl Origin {
    pub fn parse(origin: &str) -> Result<Self, ManifestError> {
        let trimmed = origin.trim().trim_end_matches('/');
        let rest = trimmed
            .strip_prefix("https://")
            .or_else(|| trimmed.strip_prefix("http://"));
        match rest {
            Some(host) if !host.is_empty() && !host.contains(['/', '?', '#']) => {
                Ok(Self(trimmed.to_string()))
            }
            _ => Err(ManifestError::InvalidOrigin(origin.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Absolute URL for a resource key. The root key maps to `origin/`.
    pub fn url_for(&self, key: &str) -> String {
        if key == ROOT_KEY {
            format!("{}/", self.0)
        } else {
            format!("{}/{}", self.0, key.trim_start_matches('/'))
        }
    }

    /// The part of `url` after `origin/`, or `None` for other origins.
    fn path_of<'a>(&self, url: &'a str) -> Option<&'a str> {
        let rest = url.strip_prefix(self.0.as_str())?;
        if rest.is_empty() {
            Some("")
        } else if let Some(path) = rest.strip_prefix('/') {
            Some(path)
        } else if rest.starts_with('#') {
            Some(rest)
        } else {
            // e.g. "https://app.example.com.evil/" sharing a prefix
            None
        }
    }

    /// Resource key of an intercepted request, used to route it.
    ///
    /// Drops the fragment and the `?v=` cache-busting suffix. The bare origin,
    /// a same-document navigation (`origin/#...`) and an empty path all
    /// become the root key.
    pub fn resource_key(&self, url: &str) -> Option<String> {
        let mut key = self.path_of(url)?;
        if let Some(idx) = key.find('#') {
            key = &key[..idx];
        }
        if let Some(idx) = key.find(CACHE_BUST_MARKER) {
            key = &key[..idx];
        }
        if key.is_empty() {
            return Some(ROOT_KEY.to_string());
        }
        Some(key.to_string())
    }

    /// Resource key of an entry already stored in a cache.
    ///
    /// Unlike `resource_key` the query is kept, so an entry stored under a
    /// cache-busting URL never matches a manifest key. Foreign URLs come back
    /// unchanged, which also never matches.
    pub fn stored_key(&self, url: &str) -> String {
        match self.path_of(url) {
            Some("") => ROOT_KEY.to_string(),
            Some(path) => path.to_string(),
            None => url.to_string(),
        }
    }

    /// Cache key for a request URL: no fragment, and the bare origin gains
    /// its trailing slash.
    pub fn canonical_url(&self, url: &str) -> String {
        let url = match url.find('#') {
            Some(idx) => &url[..idx],
            None => url,
        };
        if url == self.0 {
            format!("{}/", self.0)
        } else {
            url.to_string()
        }
    }
}
