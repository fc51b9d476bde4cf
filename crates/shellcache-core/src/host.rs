//! Hooks back into the host runtime.

use async_trait::async_trait;
use tracing::debug;

/// Host-side activation controls the engine may request.
#[async_trait]
pub trait HostControl: Send + Sync {
    /// Activate the pending version now instead of waiting for old clients.
    async fn skip_waiting(&self);

    /// Start serving already-open clients from the active version.
    async fn claim_clients(&self);
}

/// A host without activation controls.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHost;

#[async_trait]
impl HostControl for NoopHost {
    async fn skip_waiting(&self) {
        debug!("skip_waiting requested; host has no activation control");
    }

    async fn claim_clients(&self) {
        debug!("claim_clients requested; host has no activation control");
    }
}
