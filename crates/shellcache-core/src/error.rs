//! Error types for the shellcache engine.
//!
//! Storage, fetch and manifest failures each get their own enum so callers can
//! tell a broken store apart from a flaky network. `EngineError` wraps them
//! for the lifecycle, routing and control entry points.

use thiserror::Error;

pub use crate::fetch::FetchError;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Result type alias for blob cache operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Failures of the persistent blob store.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt cache entry in {cache}: {reason}")]
    CorruptEntry { cache: String, reason: String },

    #[error("Invalid cache name: {0:?}")]
    InvalidName(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        StorageError::Io {
            context: context.into(),
            source,
        }
    }
}

/// Failures building or decoding a resource manifest.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to parse manifest: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Core resource {0:?} is not listed in the manifest")]
    MissingCoreKey(String),

    #[error("Invalid origin: {0:?}")]
    InvalidOrigin(String),
}

/// Top-level error for engine entry points.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Fetch failed for {key}: {source}")]
    Fetch {
        key: String,
        #[source]
        source: FetchError,
    },

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Cache state corrupted during activation, all caches were reset: {0}")]
    Corrupted(#[source] Box<EngineError>),

    #[error("Unknown control signal: {0:?}")]
    UnknownSignal(String),
}

impl EngineError {
    pub(crate) fn fetch(key: impl Into<String>, source: FetchError) -> Self {
        EngineError::Fetch {
            key: key.into(),
            source,
        }
    }

    /// True when this error came from the network rather than the store.
    pub fn is_fetch(&self) -> bool {
        matches!(self, EngineError::Fetch { .. })
    }
}
