//! Engine configuration.
//!
//! Plain serde data so hosts can embed it in their own config files. Every
//! field has a default.

use serde::{Deserialize, Serialize};

use crate::fetch::client::DEFAULT_TIMEOUT_SECS;

/// Names of the three cache roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheNames {
    /// Working area for an in-progress upgrade
    pub staging: String,
    /// What requests are served from
    pub live: String,
    /// Holds the last promoted manifest
    pub manifest: String,
}

impl Default for CacheNames {
    fn default() -> Self {
        Self {
            staging: "app-temp-cache".to_string(),
            live: "app-cache".to_string(),
            manifest: "app-manifest".to_string(),
        }
    }
}

/// Application shell files staged on every install.
pub const DEFAULT_CORE: &[&str] = &[
    "main.dart.js",
    "index.html",
    "flutter_bootstrap.js",
    "assets/AssetManifest.bin.json",
    "assets/FontManifest.json",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Scheme + host the intercepted requests are resolved against
    pub origin: String,
    pub cache_names: CacheNames,
    /// Resource keys that must be staged before a version can activate
    pub core: Vec<String>,
    /// Ask the host to skip waiting as soon as install starts
    pub skip_waiting_on_install: bool,
    pub request_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:8080".to_string(),
            cache_names: CacheNames::default(),
            core: DEFAULT_CORE.iter().map(|s| s.to_string()).collect(),
            skip_waiting_on_install: true,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl EngineConfig {
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn with_core<I, S>(mut self, core: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.core = core.into_iter().map(Into::into).collect();
        self
    }
}
