//! Replication runtime
//!
//! Bootstrap, in order:
//! 1. resolve the owner's base URL through discovery, else the fallback URL
//! 2. load the snapshot (bounded retry) and replace the cache with it
//! 3. subscribe to entity events and wait until every consumer is bound
//!
//! A missing source or a failed snapshot degrades instead of failing: the
//! cache starts empty and fills from events.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use muster_bus::{BusError, MessageBus, Readiness, Subscription};
use muster_discovery::InstanceResolver;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::cache::LocalEntityCache;
use crate::error::ReplicationError;
use crate::loader::SnapshotLoader;
use crate::options::ReplicationOptions;
use crate::subscriber::EntityEventSubscriber;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BootstrapStatus {
    Pending,
    /// Snapshot applied from `source`
    Loaded { source: String, entities: usize },
    /// Running on events only
    Degraded { reason: String },
}

pub struct ReplicationRuntime {
    options: ReplicationOptions,
    cache: Arc<LocalEntityCache>,
    loader: SnapshotLoader,
    bus: Arc<dyn MessageBus>,
    resolver: Option<Arc<dyn InstanceResolver>>,
    status: RwLock<BootstrapStatus>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl ReplicationRuntime {
    pub fn new(
        options: ReplicationOptions,
        bus: Arc<dyn MessageBus>,
        resolver: Option<Arc<dyn InstanceResolver>>,
    ) -> Result<Self, ReplicationError> {
        let cache = Arc::new(LocalEntityCache::new(options.merge_policy));
        Self::with_cache(options, cache, bus, resolver)
    }

    /// Use an existing cache instance, for callers that construct it first
    /// and hand it to request handlers.
    pub fn with_cache(
        options: ReplicationOptions,
        cache: Arc<LocalEntityCache>,
        bus: Arc<dyn MessageBus>,
        resolver: Option<Arc<dyn InstanceResolver>>,
    ) -> Result<Self, ReplicationError> {
        let loader = SnapshotLoader::new(options.clone())?;
        Ok(Self {
            options,
            cache,
            loader,
            bus,
            resolver,
            status: RwLock::new(BootstrapStatus::Pending),
            subscriptions: Mutex::new(Vec::new()),
        })
    }

    pub fn cache(&self) -> Arc<LocalEntityCache> {
        self.cache.clone()
    }

    pub fn status(&self) -> BootstrapStatus {
        self.status.read().clone()
    }

    /// Owner base URL: discovered instance first, then the fallback.
    pub fn resolve_source(&self) -> Result<String, ReplicationError> {
        let owner = &self.options.owner_service;
        if let Some(instance) = self
            .resolver
            .as_ref()
            .and_then(|resolver| resolver.resolve_one(owner))
        {
            return Ok(instance.base_url());
        }

        match self.options.fallback_base_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => {
                info!(owner = %owner, fallback = %url, "Owner not discovered, using fallback base URL");
                Ok(url.to_string())
            }
            _ => Err(ReplicationError::NoSource(owner.clone())),
        }
    }

    /// Run the bootstrap sequence. Only bus subscription failures are
    /// returned; snapshot problems degrade.
    pub async fn start(&self) -> Result<BootstrapStatus, ReplicationError> {
        let status = match self.load_snapshot().await {
            Ok((source, entities)) => BootstrapStatus::Loaded { source, entities },
            Err(e) => {
                error!(
                    owner = %self.options.owner_service,
                    "Snapshot unavailable, continuing on events only: {}", e
                );
                BootstrapStatus::Degraded {
                    reason: e.to_string(),
                }
            }
        };

        let subscriber = Arc::new(EntityEventSubscriber::new(self.cache.clone()));
        let subscriptions = subscriber
            .subscribe_all(self.bus.as_ref(), self.options.client_id.as_deref())
            .await?;
        for subscription in &subscriptions {
            subscription.ready().await?;
        }
        self.subscriptions.lock().await.extend(subscriptions);

        info!(status = ?status, cached = self.cache.len(), "Replication ready");
        *self.status.write() = status.clone();
        Ok(status)
    }

    /// True once bootstrap finished and every consumer is bound.
    pub async fn is_ready(&self) -> bool {
        if *self.status.read() == BootstrapStatus::Pending {
            return false;
        }
        let subscriptions = self.subscriptions.lock().await;
        !subscriptions.is_empty() && subscriptions.iter().all(Subscription::is_ready)
    }

    /// Wait until every consumer is bound again, e.g. after a reconnect.
    pub async fn ready(&self) -> Result<(), BusError> {
        let pending: Vec<Readiness> = self
            .subscriptions
            .lock()
            .await
            .iter()
            .map(Subscription::readiness)
            .collect();
        for readiness in pending {
            readiness.wait().await?;
        }
        Ok(())
    }

    /// Merge records updated after `since` without clearing the cache.
    /// Returns how many were applied.
    pub async fn catch_up(&self, since: DateTime<Utc>) -> Result<usize, ReplicationError> {
        let source = self.resolve_source()?;
        let entities = self.loader.load(&source, Some(since)).await?;
        let applied = self.cache.merge(entities);
        info!(source = %source, applied, since = %since, "Caught up from incremental snapshot");
        Ok(applied)
    }

    /// Stop every consumer. In-flight deliveries settle first.
    pub async fn shutdown(&self) {
        let subscriptions: Vec<Subscription> = self.subscriptions.lock().await.drain(..).collect();
        for subscription in subscriptions {
            subscription.close().await;
        }
        info!("Replication consumers stopped");
    }

    async fn load_snapshot(&self) -> Result<(String, usize), ReplicationError> {
        let source = self.resolve_source()?;
        let entities = self.loader.load(&source, None).await?;
        let count = self.cache.apply_snapshot(entities);
        if count == 0 {
            warn!(source = %source, "Snapshot is empty");
        }
        Ok((source, count))
    }
}
