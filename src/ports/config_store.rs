//! Config store port — the sink-backed store owning `ListenerConfig`
//! records. The manager only ever reads from it.

use async_trait::async_trait;

use crate::domain::ListenerConfig;

/// Read-only access to externally-owned listener configuration.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Load every config currently marked `is_active = true`.
    async fn load_active_configs(&self) -> anyhow::Result<Vec<ListenerConfig>>;
}
