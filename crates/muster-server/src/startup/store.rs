//! Registry store construction

use std::sync::Arc;

use anyhow::Context;
use muster_registry::{
    ExpiryReaper, MemoryRegistryStore, RedisRegistryStore, RegistryStore, StoreKind,
};
use tokio::sync::broadcast;
use tracing::info;

use crate::model::RegistryOptions;

/// Build the configured store. The in-memory store gets an expiry reaper
/// that runs until `shutdown` fires.
pub async fn build_store(
    options: &RegistryOptions,
    shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<Arc<dyn RegistryStore>> {
    match options.store {
        StoreKind::Memory => {
            let store = Arc::new(MemoryRegistryStore::new(options.ttl()));
            ExpiryReaper::new(store.clone(), options.reap_interval()).spawn(shutdown);
            info!(ttl = ?options.ttl(), "Using in-memory registry store");
            Ok(store)
        }
        StoreKind::Redis => {
            let url = options
                .redis_url
                .as_deref()
                .context("registry.redis_url is required for the redis store")?;
            let store = RedisRegistryStore::connect(url, &options.key_prefix, options.ttl())
                .await
                .with_context(|| format!("Failed to connect to Redis at {}", url))?;
            info!(ttl = ?options.ttl(), prefix = %options.key_prefix, "Using Redis registry store");
            Ok(Arc::new(store))
        }
    }
}
