//! Resource manifests and the persisted manifest record.
//!
//! A `ResourceManifest` maps each resource key (a path relative to the
//! origin, with `"/"` standing for the root document) to a content hash.
//! The `CoreSet` names the keys an install must stage. `ManifestStore` keeps
//! the last promoted manifest as a single record.

pub mod store;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ManifestError;

pub use store::{ManifestStore, MANIFEST_RECORD_KEY};

/// Resource key of the application root.
pub const ROOT_KEY: &str = "/";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceManifest {
    entries: BTreeMap<String, String>,
}

impl ResourceManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, ManifestError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, ManifestError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_json(&self) -> Result<String, ManifestError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn insert(&mut self, key: impl Into<String>, hash: impl Into<String>) {
        self.entries.insert(key.into(), hash.into());
    }

    pub fn hash(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a resource cached under `prior` can be kept for this manifest:
    /// the key is still listed and its hash has not changed.
    pub fn is_unchanged_from(&self, prior: &ResourceManifest, key: &str) -> bool {
        match (self.hash(key), prior.hash(key)) {
            (Some(current), Some(old)) => current == old,
            _ => false,
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ResourceManifest {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Resource keys required for the application shell to load offline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreSet {
    keys: Vec<String>,
}

impl CoreSet {
    /// Every key must be listed in `manifest`.
    pub fn new<I, S>(keys: I, manifest: &ResourceManifest) -> Result<Self, ManifestError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for key in keys {
            let key = key.into();
            if !manifest.contains(&key) {
                return Err(ManifestError::MissingCoreKey(key));
            }
            if !out.contains(&key) {
                out.push(key);
            }
        }
        Ok(Self { keys: out })
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
