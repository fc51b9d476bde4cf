use async_trait::async_trait;
use shellcache_core::HostControl;
use tracing::info;

/// A command-line host has no waiting clients to skip or claim; it only
/// records that the engine asked.
pub struct LoggingHost;

#[async_trait]
impl HostControl for LoggingHost {
    async fn skip_waiting(&self) {
        info!("Engine requested immediate activation");
    }

    async fn claim_clients(&self) {
        info!("Engine requested client claim");
    }
}
