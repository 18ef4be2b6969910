//! In-memory registry store
//!
//! Single-node backend. Each record carries a deadline on the tokio clock;
//! reads skip records past their deadline and [`ExpiryReaper`](crate::ExpiryReaper)
//! removes them in the background.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use muster_api::ServiceInstance;
use tokio::time::Instant;
use tracing::debug;

use crate::store::{RegistryStore, StoreError};

#[derive(Clone, Debug)]
struct Lease {
    instance: ServiceInstance,
    expires_at: Instant,
}

impl Lease {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Registry store backed by a `DashMap` keyed by `name:host:port`.
pub struct MemoryRegistryStore {
    leases: DashMap<String, Lease>,
    ttl: Duration,
}

impl MemoryRegistryStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            leases: DashMap::new(),
            ttl,
        }
    }

    /// Remove every record past its deadline. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.leases.len();
        self.leases.retain(|_, lease| lease.is_live(now));
        before.saturating_sub(self.leases.len())
    }

    /// Number of records held, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.leases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }

    fn collect_live<F>(&self, filter: F) -> Vec<ServiceInstance>
    where
        F: Fn(&ServiceInstance) -> bool,
    {
        let now = Instant::now();
        let mut instances: Vec<ServiceInstance> = self
            .leases
            .iter()
            .filter(|entry| entry.value().is_live(now) && filter(&entry.value().instance))
            .map(|entry| entry.value().instance.clone())
            .collect();
        instances.sort_by(|a, b| a.key().cmp(&b.key()));
        instances
    }
}

impl Default for MemoryRegistryStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(muster_api::DEFAULT_TTL_SECONDS))
    }
}

#[async_trait]
impl RegistryStore for MemoryRegistryStore {
    async fn register(&self, instance: ServiceInstance) -> Result<bool, StoreError> {
        let now = Instant::now();
        let lease = Lease {
            expires_at: now + self.ttl,
            instance,
        };

        // The shard lock held by the entry covers both the check and the write.
        let is_new = match self.leases.entry(lease.instance.key()) {
            Entry::Occupied(mut occupied) => {
                let was_live = occupied.get().is_live(now);
                occupied.insert(lease);
                !was_live
            }
            Entry::Vacant(vacant) => {
                vacant.insert(lease);
                true
            }
        };

        debug!(is_new, ttl_secs = self.ttl.as_secs(), "registry lease refreshed");
        Ok(is_new)
    }

    async fn list_all(&self) -> Result<Vec<ServiceInstance>, StoreError> {
        Ok(self.collect_live(|_| true))
    }

    async fn list_by_name(&self, name: &str) -> Result<Vec<ServiceInstance>, StoreError> {
        Ok(self.collect_live(|instance| instance.name == name))
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(name: &str, host: &str, port: u16) -> ServiceInstance {
        ServiceInstance::new(name, host, port)
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_reports_new_then_refresh() {
        let store = MemoryRegistryStore::new(Duration::from_secs(60));

        assert!(store.register(instance("candidate-svc", "10.0.0.5", 8080)).await.unwrap());
        assert!(!store.register(instance("candidate-svc", "10.0.0.5", 8080)).await.unwrap());
        assert_eq!(store.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_ports_are_distinct_instances() {
        let store = MemoryRegistryStore::new(Duration::from_secs(60));

        assert!(store.register(instance("svc", "10.0.0.5", 8080)).await.unwrap());
        assert!(store.register(instance("svc", "10.0.0.5", 8081)).await.unwrap());
        assert!(store.register(instance("other", "10.0.0.5", 8080)).await.unwrap());

        assert_eq!(store.list_by_name("svc").await.unwrap().len(), 2);
        assert_eq!(store.list_all().await.unwrap().len(), 3);
        assert!(store.list_by_name("missing").await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_lease_counts_as_new() {
        let store = MemoryRegistryStore::new(Duration::from_secs(60));
        store.register(instance("svc", "h", 1)).await.unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;

        // Not yet purged, but no longer live.
        assert_eq!(store.len(), 1);
        assert!(store.list_all().await.unwrap().is_empty());
        assert!(store.register(instance("svc", "h", 1)).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let store = MemoryRegistryStore::new(Duration::from_secs(60));
        store.register(instance("svc", "h", 1)).await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        store.register(instance("svc", "h", 2)).await.unwrap();
        tokio::time::advance(Duration::from_secs(31)).await;

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.list_all().await.unwrap()[0].port, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_listing_is_sorted_by_key() {
        let store = MemoryRegistryStore::default();
        store.register(instance("svc", "10.0.0.9", 80)).await.unwrap();
        store.register(instance("svc", "10.0.0.1", 80)).await.unwrap();

        let hosts: Vec<String> = store
            .list_by_name("svc")
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.host)
            .collect();
        assert_eq!(hosts, vec!["10.0.0.1", "10.0.0.9"]);
        assert_eq!(store.ttl(), Duration::from_secs(60));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_heartbeats_yield_one_new() {
        let store = std::sync::Arc::new(MemoryRegistryStore::new(Duration::from_secs(60)));
        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.register(instance("svc", "h", 1)).await.unwrap()
            }));
        }

        let mut new_count = 0;
        for handle in handles {
            if handle.await.unwrap() {
                new_count += 1;
            }
        }
        assert_eq!(new_count, 1);
        assert_eq!(store.len(), 1);
    }
}
